//! The adaptor side of a render step: the shared `Houdini` environment that
//! keeps a host session alive between tasks, the per-task run data, and the
//! optional environment that swaps in a locally built adaptor.

use std::fs;

use camino::Utf8Path;
use serde::Deserialize;

use crate::error::SubmitError;
use crate::template::{
    Action, Cancelation, CancelationMode, EmbeddedFile, EnvironmentActions, EnvironmentScript,
    EnvironmentTemplate, JobTemplate, ParameterDefinition,
};

const ADAPTOR: &str = "HoudiniAdaptor";
const ENVIRONMENT_NAME: &str = "Houdini";
const ENVIRONMENT_DESCRIPTION: &str = "Runs Houdini in the background.";
const CONNECTION_FILE: &str = "{{ Session.WorkingDirectory }}/connection.json";

const DEFAULT_OVERRIDE: &str = include_str!("../assets/adaptor_override_environment.yaml");

/// Contents of the `initData` file the adaptor reads when its session starts.
#[derive(Debug, Clone, Copy)]
pub struct InitData<'a> {
    pub render_node: &'a str,
    pub version: &'a str,
    pub ignore_input_nodes: bool,
}

impl InitData<'_> {
    pub fn to_embedded_file(&self) -> EmbeddedFile {
        let data = format!(
            "scene_file: '{{{{Param.HipFile}}}}'\n\
             render_node: '{}'\n\
             version: {}\n\
             ignore_input_nodes: {}\n",
            quote_single(self.render_node),
            self.version,
            self.ignore_input_nodes,
        );

        EmbeddedFile::text("initData", "init-data.yaml", data)
    }
}

/// Escapes a value for a single-quoted YAML scalar.
fn quote_single(value: &str) -> String {
    value.replace('\'', "''")
}

fn adaptor_action(args: &[&str]) -> Action {
    Action {
        command: ADAPTOR.to_string(),
        args: args.iter().map(|arg| arg.to_string()).collect(),
        timeout: None,
        cancelation: Some(Cancelation {
            mode: CancelationMode::NotifyThenTerminate,
        }),
    }
}

/// The environment that starts the adaptor daemon on enter and stops it on
/// exit, carrying `init_data` as its only embedded file.
pub fn render_environment(init_data: EmbeddedFile) -> EnvironmentTemplate {
    let on_enter = adaptor_action(&[
        "daemon",
        "start",
        "--path-mapping-rules",
        "file://{{Session.PathMappingRulesFile}}",
        "--connection-file",
        CONNECTION_FILE,
        "--init-data",
        "file://{{ Env.File.initData }}",
    ]);
    let on_exit = adaptor_action(&["daemon", "stop", "--connection-file", CONNECTION_FILE]);

    EnvironmentTemplate {
        name: ENVIRONMENT_NAME.to_string(),
        description: Some(ENVIRONMENT_DESCRIPTION.to_string()),
        script: Some(EnvironmentScript {
            embedded_files: vec![init_data],
            actions: EnvironmentActions {
                on_enter: Some(on_enter),
                on_exit: Some(on_exit),
            },
        }),
        variables: Default::default(),
    }
}

/// Per-task input of the adaptor. The frame placeholder stays unquoted so
/// the substituted value parses as an integer.
pub fn run_data(render_node: &str) -> EmbeddedFile {
    let data = format!(
        "render_node: {render_node}\n\
         frame: {{{{Task.Param.Frame}}}}\n\
         ignore_input_nodes: true\n"
    );

    EmbeddedFile::text("runData", "run-data.yaml", data)
}

pub fn run_action() -> Action {
    adaptor_action(&[
        "daemon",
        "run",
        "--connection-file",
        CONNECTION_FILE,
        "--run-data",
        "file://{{ Task.File.runData }}",
    ])
}

/// Template fragment that installs the adaptor from submitted wheels.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdaptorOverride {
    parameter_definitions: Vec<ParameterDefinition>,
    environment: EnvironmentTemplate,
}

/// Extends `template` with the adaptor override environment, pointing its
/// first parameter at `wheels`.
///
/// `source` replaces the built-in override template. A wheels path or a
/// configured template that does not exist leaves `template` unchanged.
pub fn apply_adaptor_override(
    template: &mut JobTemplate,
    wheels: &str,
    source: Option<&Utf8Path>,
) -> Result<(), SubmitError> {
    if wheels.is_empty() || !Utf8Path::new(wheels).exists() {
        tracing::debug!(wheels, "adaptor wheels not found, skipping override");
        return Ok(());
    }

    let (origin, text) = match source {
        Some(path) => match fs::read_to_string(path) {
            Ok(text) => (path.to_string(), text),
            Err(err) => {
                tracing::debug!(%path, %err, "adaptor override template unreadable, skipping override");
                return Ok(());
            }
        },
        None => ("(built-in)".to_string(), DEFAULT_OVERRIDE.to_string()),
    };

    let mut fragment: AdaptorOverride =
        serde_yaml::from_str(&text).map_err(|err| SubmitError::AdaptorOverride(origin, err))?;

    if let Some(first) = fragment.parameter_definitions.first_mut() {
        first.default = Some(serde_json::Value::String(wheels.to_string()));
    }

    tracing::debug!(
        wheels,
        environment = %fragment.environment.name,
        "applied adaptor override"
    );

    template
        .parameter_definitions
        .extend(fragment.parameter_definitions);
    template.job_environments.push(fragment.environment);

    Ok(())
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::template::{ParameterType, SPECIFICATION_VERSION};

    fn empty_template() -> JobTemplate {
        JobTemplate {
            specification_version: SPECIFICATION_VERSION.to_string(),
            name: "job".into(),
            description: None,
            parameter_definitions: vec![ParameterDefinition::scene_file("/proj/shot.hip")],
            steps: Vec::new(),
            job_environments: Vec::new(),
        }
    }

    fn temp_dir() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_init_data() {
        let file = InitData {
            render_node: "/out/it's",
            version: "20.5.332",
            ignore_input_nodes: false,
        }
        .to_embedded_file();

        assert_eq!(file.name, "initData");
        assert_eq!(file.filename.as_deref(), Some("init-data.yaml"));
        assert_eq!(
            file.data,
            "scene_file: '{{Param.HipFile}}'\n\
             render_node: '/out/it''s'\n\
             version: 20.5.332\n\
             ignore_input_nodes: false\n"
        );

        let parsed: serde_yaml::Value = serde_yaml::from_str(&file.data).unwrap();
        assert_eq!(parsed["render_node"], "/out/it's");
    }

    #[test]
    fn test_render_environment_actions() {
        let env = render_environment(EmbeddedFile::text("initData", "init-data.yaml", String::new()));
        let actions = &env.script.as_ref().unwrap().actions;

        let on_enter = actions.on_enter.as_ref().unwrap();
        assert_eq!(on_enter.command, "HoudiniAdaptor");
        assert_eq!(&on_enter.args[..2], &["daemon", "start"]);
        assert!(on_enter.args.contains(&"file://{{ Env.File.initData }}".to_string()));

        let on_exit = actions.on_exit.as_ref().unwrap();
        assert_eq!(
            on_exit.args,
            vec!["daemon", "stop", "--connection-file", CONNECTION_FILE]
        );
    }

    #[test]
    fn test_override_built_in() {
        let (_guard, wheels) = temp_dir();
        let mut template = empty_template();

        apply_adaptor_override(&mut template, wheels.as_str(), None).unwrap();

        let defs = &template.parameter_definitions;
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[1].name, "AdaptorWheels");
        assert_eq!(defs[1].kind, ParameterType::Path);
        assert_eq!(defs[1].default, Some(serde_json::Value::String(wheels.to_string())));
        assert_eq!(template.job_environments.len(), 1);
    }

    #[test]
    fn test_override_missing_wheels() {
        let mut template = empty_template();

        apply_adaptor_override(&mut template, "/no/such/wheels", None).unwrap();

        assert_eq!(template, empty_template());
    }

    #[test]
    fn test_override_missing_source() {
        let (_guard, wheels) = temp_dir();
        let mut template = empty_template();

        let source = wheels.join("absent.yaml");
        apply_adaptor_override(&mut template, wheels.as_str(), Some(&source)).unwrap();

        assert_eq!(template, empty_template());
    }

    #[test]
    fn test_override_configured_source() {
        let (_guard, dir) = temp_dir();
        let source = dir.join("override.yaml");
        fs::write(
            &source,
            "parameterDefinitions:\n\
             - name: Wheels\n  type: PATH\n\
             - name: Extra\n  type: STRING\n  default: kept\n\
             environment:\n  name: Custom\n",
        )
        .unwrap();
        let mut template = empty_template();

        apply_adaptor_override(&mut template, dir.as_str(), Some(&source)).unwrap();

        let names = template
            .parameter_definitions
            .iter()
            .map(|def| def.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["HipFile", "Wheels", "Extra"]);
        assert_eq!(
            template.parameter_definitions[2].default,
            Some(serde_json::Value::String("kept".into()))
        );
        assert_eq!(template.job_environments[0].name, "Custom");
    }

    #[test]
    fn test_override_malformed_source() {
        let (_guard, dir) = temp_dir();
        let source = dir.join("override.yaml");
        fs::write(&source, "environment: [").unwrap();
        let mut template = empty_template();

        let result = apply_adaptor_override(&mut template, dir.as_str(), Some(&source));

        assert!(matches!(result, Err(SubmitError::AdaptorOverride(..))));
        assert_eq!(template, empty_template());
    }
}
