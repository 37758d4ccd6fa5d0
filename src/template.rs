//! Job template documents and the compiler that produces them from a step
//! graph.
//!
//! The documents mirror the external job description schema
//! (`jobtemplate-2023-09`) field for field. This crate only emits them; it
//! does not validate against the schema.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::SubmitterSettings;
use crate::environment::{self, InitData};
use crate::error::SubmitError;
use crate::graph::{RenderStep, StepGraph};
use crate::host::{Host, Node};
use crate::params;

pub const SPECIFICATION_VERSION: &str = "jobtemplate-2023-09";

/// Name of the job parameter holding the scene file.
pub const SCENE_PARAMETER: &str = "HipFile";

/// Name of the per-step task parameter.
pub const FRAME_PARAMETER: &str = "Frame";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobTemplate {
    pub specification_version: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub parameter_definitions: Vec<ParameterDefinition>,
    pub steps: Vec<StepTemplate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub job_environments: Vec<EnvironmentTemplate>,
}

impl JobTemplate {
    pub fn step(&self, name: &str) -> Option<&StepTemplate> {
        self.steps.iter().find(|step| step.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParameterType {
    Int,
    Float,
    String,
    Path,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectType {
    File,
    Directory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataFlow {
    None,
    In,
    Out,
    Inout,
}

/// A job parameter definition. Keys this crate does not model (user
/// interface hints, limits, descriptions) survive a round trip in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParameterType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_type: Option<ObjectType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_flow: Option<DataFlow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ParameterDefinition {
    /// The scene file parameter, defaulting to the open scene.
    pub fn scene_file(path: impl Into<String>) -> Self {
        Self {
            name: SCENE_PARAMETER.to_string(),
            kind: ParameterType::Path,
            object_type: Some(ObjectType::File),
            data_flow: Some(DataFlow::In),
            default: Some(serde_json::Value::String(path.into())),
            extra: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepTemplate {
    pub name: String,
    pub parameter_space: ParameterSpace,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub step_environments: Vec<EnvironmentTemplate>,
    pub script: StepScript,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<StepDependency>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSpace {
    pub task_parameter_definitions: Vec<TaskParameterDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskParameterDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParameterType,
    pub range: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepScript {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedded_files: Vec<EmbeddedFile>,
    pub actions: StepActions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepActions {
    pub on_run: Action,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDependency {
    pub depends_on: String,
}

/// Setup and teardown shared by one or more steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentTemplate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<EnvironmentScript>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentScript {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedded_files: Vec<EmbeddedFile>,
    pub actions: EnvironmentActions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentActions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_enter: Option<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_exit: Option<Action>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmbeddedFileType {
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedFile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(rename = "type")]
    pub kind: EmbeddedFileType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runnable: Option<bool>,
    pub data: String,
}

impl EmbeddedFile {
    pub fn text(name: impl Into<String>, filename: impl Into<String>, data: String) -> Self {
        Self {
            name: name.into(),
            filename: Some(filename.into()),
            kind: EmbeddedFileType::Text,
            runnable: None,
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelation: Option<Cancelation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancelation {
    pub mode: CancelationMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelationMode {
    Terminate,
    /// Ask the process to shut down, kill it after the grace period.
    NotifyThenTerminate,
}

/// Compiles the job template for the submitting operator `node` from its
/// extracted `steps`.
pub fn compile<H>(
    node: &Node<'_, H>,
    steps: &StepGraph,
    settings: &SubmitterSettings,
) -> Result<JobTemplate, SubmitError>
where
    H: Host + ?Sized,
{
    let name = node.eval_str("name")?;
    let description = node.eval_str("description")?;
    let separate_steps = node.eval_bool("separate_steps")?;

    if steps.is_empty() {
        return Err(SubmitError::NoSteps(node.path().to_string()));
    }

    let host = node.host();
    let mut parameter_definitions = params::queue_parameter_definitions(node)?;
    parameter_definitions.push(ParameterDefinition::scene_file(host.scene_file()));

    let version = host.app_version();
    let selected: Vec<&RenderStep> = if separate_steps {
        steps.steps().collect()
    } else {
        steps.first().into_iter().collect()
    };

    let step_templates = selected
        .into_iter()
        .map(|step| {
            let init = InitData {
                render_node: &step.rop,
                version: &version,
                ignore_input_nodes: separate_steps,
            };

            // Siblings only exist in the template when every step is emitted.
            let dependencies = (separate_steps && !step.deps.is_empty()).then(|| {
                steps
                    .dependencies(step)
                    .map(|dep| StepDependency {
                        depends_on: dep.name.clone(),
                    })
                    .collect()
            });

            StepTemplate {
                name: step.name.clone(),
                parameter_space: ParameterSpace {
                    task_parameter_definitions: vec![TaskParameterDefinition {
                        name: FRAME_PARAMETER.to_string(),
                        kind: ParameterType::Int,
                        range: step.frames.frames(),
                    }],
                },
                step_environments: vec![environment::render_environment(init.to_embedded_file())],
                script: StepScript {
                    embedded_files: vec![environment::run_data(&step.rop)],
                    actions: StepActions {
                        on_run: environment::run_action(),
                    },
                },
                dependencies,
            }
        })
        .collect();

    let mut template = JobTemplate {
        specification_version: SPECIFICATION_VERSION.to_string(),
        name,
        description: Some(description).filter(|d| !d.is_empty()),
        parameter_definitions,
        steps: step_templates,
        job_environments: Vec::new(),
    };

    if node.eval_bool("include_adaptor_wheels")? {
        let wheels = node.eval_str("adaptor_wheels")?;
        environment::apply_adaptor_override(
            &mut template,
            &wheels,
            settings.adaptor_override_environment.as_deref(),
        )?;
    }

    tracing::debug!(
        job = %template.name,
        steps = template.steps.len(),
        separate_steps,
        "compiled job template"
    );

    Ok(template)
}
