use camino::Utf8PathBuf;
use thiserror::Error;

pub use anyhow::Error as ClientError;

/// Top-level error of every submitter action. Whatever reaches the
/// orchestrator boundary is shown to the user verbatim through
/// [`Host::display_message`](crate::Host::display_message).
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("Node '{node}' has no parameter '{parm}'")]
    MissingParameter { node: String, parm: String },

    #[error("Parameter '{parm}' on node '{node}' is not {expected}")]
    WrongParameterType {
        node: String,
        parm: String,
        expected: &'static str,
    },

    #[error("Node '{0}' has no render steps to submit")]
    NoSteps(String),

    #[error("Malformed queue parameter definitions on node '{0}':\n{1}")]
    QueueParameters(String, serde_json::Error),

    #[error("Malformed adaptor override environment {0}:\n{1}")]
    AdaptorOverride(String, serde_yaml::Error),

    #[error("Error while writing the job bundle:\n{0}")]
    Bundle(#[from] BundleError),

    #[error("Error while talking to the farm:\n{0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failures of the render-plan introspection and its parser.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("render: failed to list steps\n\n{0}")]
    Host(String),

    #[error("Malformed render plan line {line}: {reason}: {text:?}")]
    MalformedLine {
        line: usize,
        reason: &'static str,
        text: String,
    },

    #[error("Malformed frame range {0:?}: expected `( f )` or `( start stop step )`")]
    MalformedFrameRange(String),

    #[error("Invalid frame range {start} {stop} {step}: start must not exceed stop and step must be positive")]
    InvalidFrameRange { start: i64, stop: i64, step: i64 },

    #[error("Malformed frame expression {0:?}")]
    MalformedExpression(String),

    #[error("Step '{step}' depends on unknown step id '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("Step id '{0}' is listed twice")]
    DuplicateStep(String),

    #[error("Render plan contains a dependency cycle through step '{0}'")]
    Cycle(String),

    #[error("Render plan references unknown node '{0}'")]
    UnknownNode(String),
}

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("Couldn't write '{0}'.\n{1}")]
    Io(Utf8PathBuf, std::io::Error),

    #[error("Couldn't serialize '{0}'.\n{1}")]
    Yaml(&'static str, serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{0}")]
    Client(#[from] ClientError),

    #[error("Response from '{call}' is missing field '{field}'")]
    MissingField { call: &'static str, field: &'static str },

    #[error("Response from '{call}' has a malformed field '{field}':\n{source}")]
    MalformedField {
        call: &'static str,
        field: &'static str,
        source: serde_json::Error,
    },

    #[error("Asset upload failed:\n{0}")]
    Upload(String),

    #[error("Submission canceled")]
    Canceled,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Couldn't load settings.\n{0}")]
    Load(#[from] config::ConfigError),

    #[error("Setting '{0}' is not set")]
    Missing(&'static str),
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Couldn't read scene snapshot '{0}'.\n{1}")]
    Io(Utf8PathBuf, std::io::Error),

    #[error("Malformed scene snapshot '{0}'.\n{1}")]
    Json(Utf8PathBuf, serde_json::Error),
}
