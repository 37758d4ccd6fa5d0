#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

pub mod assets;
pub mod bundle;
pub mod config;
mod environment;
mod error;
pub mod farm;
pub mod frames;
pub mod graph;
pub mod history;
pub mod host;
#[cfg(feature = "logging")]
pub mod logging;
pub mod params;
pub mod snapshot;
pub mod submit;
pub mod template;

pub use crate::assets::AssetReferences;
pub use crate::bundle::JobBundle;
pub use crate::config::{Settings, SubmissionContext, SubmitterSettings};
pub use crate::error::*;
pub use crate::farm::{FarmClient, ProgressDialog, UploadOutcome};
pub use crate::graph::{RenderStep, StepGraph};
pub use crate::host::{Host, Node, ParmValue, Severity};
pub use crate::snapshot::SceneSnapshot;
pub use crate::submit::{SubmissionState, Submitter};
pub use crate::template::JobTemplate;
