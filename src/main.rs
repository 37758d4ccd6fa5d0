use std::process::ExitCode;

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use console::style;
use rop_submitter::{JobBundle, SceneSnapshot, Settings, Severity, StepGraph, Submitter};

#[derive(Parser, Debug)]
#[command(name = "rop-bundle", version)]
#[command(about = "Compile a recorded render operator scene into a farm job bundle", long_about = None)]
struct Args {
    /// Scene snapshot (JSON)
    #[arg(long, value_name = "PATH")]
    scene: Utf8PathBuf,

    /// Path of the submitting operator
    #[arg(long)]
    rop: String,

    /// Settings file (TOML)
    #[arg(long, value_name = "PATH")]
    config: Option<Utf8PathBuf>,

    /// More log output, repeat for even more
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the job bundle
    Save {
        /// Bundle directory, instead of a new job history entry
        #[arg(short, long, value_name = "DIR")]
        out: Option<Utf8PathBuf>,
    },
    /// Scan the scene for assets and print them
    Scan,
    /// Print the render steps
    Plan,
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    rop_submitter::logging::init(level).context("Couldn't install the logger")?;

    let settings = Settings::load(args.config.as_deref())?;
    let mut scene = SceneSnapshot::load(&args.scene)?;
    let mut submitter = Submitter::new(settings.submitter.clone());

    let ok = match args.command {
        Command::Save { out: Some(out) } => {
            let bundle = JobBundle::compile(&scene, &args.rop, &settings.submitter)?;
            bundle.write(&out)?;
            println!("{out}");
            true
        }
        Command::Save { out: None } => {
            let result = submitter.save_bundle(&scene, &args.rop, &settings.context());
            if let Ok(dir) = &result {
                println!("{dir}");
            }
            result.is_ok()
        }
        Command::Scan => match submitter.scan_assets(&mut scene, &args.rop) {
            Ok(refs) => {
                print!("{}", serde_yaml::to_string(&refs.to_document())?);
                true
            }
            Err(_) => false,
        },
        Command::Plan => {
            let steps = StepGraph::extract(&scene, &args.rop, &settings.submitter.submitter_node_types)?;
            print_plan(&steps);
            true
        }
    };

    for message in scene.messages() {
        let severity = match message.severity {
            Severity::Message => style(message.severity).green(),
            Severity::Warning => style(message.severity).yellow(),
        };
        eprintln!("{} {}: {}", severity.bold(), message.title, message.text);
    }

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn print_plan(steps: &StepGraph) {
    for step in steps.steps() {
        let deps = steps
            .dependencies(step)
            .map(|dep| dep.name.as_str())
            .collect::<Vec<_>>();

        println!(
            "{} {}",
            style(&step.name).cyan(),
            style(step.frames.expression()).dim()
        );
        if !deps.is_empty() {
            println!("  after {}", deps.join(", "));
        }
    }
}
