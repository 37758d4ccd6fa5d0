//! Submitter settings: built-in defaults, then an optional TOML file, then
//! `ROP_SUBMIT__*` environment variables.

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;
use crate::host::NodeType;

const ENV_PREFIX: &str = "ROP_SUBMIT";
const DEFAULT_SUBMITTER_NAME: &str = "houdini";
const DEFAULT_SUBMITTER_TYPES: &[&str] = &["deadline", "deadline_cloud"];
const DEFAULT_IGNORE_PREFIXES: &[&str] = &["opdef:", "oplib:", "temp:"];
const DEFAULT_IGNORE_PARMS: &[&str] = &["taskgraphfile", "pdg_workingdir", "soho_program"];
const DEFAULT_OUTPUT_PARMS: &[(&str, &str)] = &[
    ("Driver/ifd", "vm_picture"),
    ("Driver/karma", "picture"),
    ("Driver/geometry", "sopoutput"),
    ("Driver/alembic", "filename"),
    ("Sop/filecache", "file"),
    ("Sop/rop_geometry", "sopoutput"),
    ("Sop/rop_alembic", "filename"),
];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub defaults: Defaults,
    pub settings: FarmSettings,
    pub submitter: SubmitterSettings,
}

/// Farm and queue the submitter targets.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub farm_id: String,
    pub queue_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FarmSettings {
    pub storage_profile_id: Option<String>,
    /// Skip the confirmation prompts of the progress dialog.
    pub auto_accept: bool,
    pub job_history_dir: Utf8PathBuf,
}

impl Default for FarmSettings {
    fn default() -> Self {
        Self {
            storage_profile_id: None,
            auto_accept: false,
            job_history_dir: default_job_history_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SubmitterSettings {
    /// Prefix of job history bundle directories.
    pub name: String,
    /// Operator types that submit to the farm and must never be rendered.
    pub submitter_node_types: Vec<String>,
    /// File references with one of these prefixes are not files.
    pub ignore_ref_prefixes: Vec<String>,
    /// Parameters whose references are never scene assets.
    pub ignore_ref_parms: Vec<String>,
    /// Job template fragment used when adaptor wheels are included.
    pub adaptor_override_environment: Option<Utf8PathBuf>,
    pub output_parms: OutputParms,
}

impl Default for SubmitterSettings {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();

        Self {
            name: DEFAULT_SUBMITTER_NAME.to_string(),
            submitter_node_types: owned(DEFAULT_SUBMITTER_TYPES),
            ignore_ref_prefixes: owned(DEFAULT_IGNORE_PREFIXES),
            ignore_ref_parms: owned(DEFAULT_IGNORE_PARMS),
            adaptor_override_environment: None,
            output_parms: OutputParms::default(),
        }
    }
}

/// Maps a qualified operator type (`Driver/ifd`) to the parameter holding
/// its output path. Types without an entry have no inferable output
/// directory.
///
/// Configured entries are added to the built-in table, replacing any entry
/// for the same type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputParms(BTreeMap<String, String>);

impl OutputParms {
    pub fn new(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        Self(entries.into_iter().collect())
    }

    pub fn insert(&mut self, node_type: String, parm: String) {
        self.0.retain(|key, _| !key.eq_ignore_ascii_case(&node_type));
        self.0.insert(node_type, parm);
    }

    /// Some config sources fold key case, so the lookup ignores it.
    pub fn lookup(&self, node_type: &NodeType) -> Option<&str> {
        let key = node_type.name_with_category();
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
            .map(|(_, v)| v.as_str())
    }
}

impl Default for OutputParms {
    fn default() -> Self {
        Self::new(
            DEFAULT_OUTPUT_PARMS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        )
    }
}

impl<'de> Deserialize<'de> for OutputParms {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let entries = BTreeMap::<String, String>::deserialize(deserializer)?;
        let mut parms = Self::default();
        for (node_type, parm) in entries {
            parms.insert(node_type, parm);
        }
        Ok(parms)
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

impl Settings {
    /// Loads the layered settings. `file`, when given, must exist.
    ///
    /// Keys missing from every source keep their built-in defaults.
    pub fn load(file: Option<&Utf8Path>) -> Result<Self, ConfigError> {
        Self::load_from(file, environment())
    }

    fn load_from(file: Option<&Utf8Path>, environment: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(file) = file {
            builder = builder.add_source(File::new(file.as_str(), FileFormat::Toml).required(true));
        }

        let settings = builder
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }

    /// Snapshot of the farm-side settings for one action.
    pub fn context(&self) -> SubmissionContext {
        SubmissionContext {
            farm_id: self.defaults.farm_id.clone(),
            queue_id: self.defaults.queue_id.clone(),
            storage_profile_id: self
                .settings
                .storage_profile_id
                .clone()
                .filter(|id| !id.is_empty()),
            auto_accept: self.settings.auto_accept,
            job_history_dir: self.settings.job_history_dir.clone(),
        }
    }
}

/// Farm context passed explicitly into every orchestrator action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionContext {
    pub farm_id: String,
    pub queue_id: String,
    pub storage_profile_id: Option<String>,
    pub auto_accept: bool,
    pub job_history_dir: Utf8PathBuf,
}

impl SubmissionContext {
    /// Farm and queue ids, both required for any farm call.
    pub fn target(&self) -> Result<(&str, &str), ConfigError> {
        if self.farm_id.is_empty() {
            return Err(ConfigError::Missing("defaults.farm_id"));
        }
        if self.queue_id.is_empty() {
            return Err(ConfigError::Missing("defaults.queue_id"));
        }

        Ok((&self.farm_id, &self.queue_id))
    }
}

fn default_job_history_dir() -> Utf8PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(|home| {
            Utf8PathBuf::from(home)
                .join(".deadline")
                .join("job_history")
                .join("default")
        })
        .unwrap_or_else(|_| Utf8PathBuf::from("job_history"))
}
