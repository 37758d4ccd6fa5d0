//! The `parameter_values.yaml` document: scheduling policy read off the
//! submitting operator, followed by values for the farm queue's own
//! parameters.

use serde::{Deserialize, Serialize};

use crate::error::SubmitError;
use crate::host::{Host, Node, ParmValue};
use crate::template::ParameterDefinition;

/// User data key holding the queue's parameter definitions as JSON.
pub const QUEUE_PARAMETER_DEFINITIONS: &str = "queue_parameter_definitions";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterValues {
    pub parameter_values: Vec<ParameterValue>,
}

impl ParameterValues {
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.parameter_values
            .iter()
            .find(|value| value.name == name)
            .map(|value| &value.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterValue {
    pub name: String,
    pub value: serde_json::Value,
}

impl ParameterValue {
    fn new(name: &str, value: impl Into<serde_json::Value>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
        }
    }
}

impl From<ParmValue> for serde_json::Value {
    fn from(value: ParmValue) -> Self {
        match value {
            ParmValue::Int(value) => value.into(),
            ParmValue::Float(value) => value.into(),
            ParmValue::String(value) => value.into(),
        }
    }
}

/// Queue parameter definitions cached on the operator; none when the farm
/// was never refreshed.
pub fn queue_parameter_definitions<H>(
    node: &Node<'_, H>,
) -> Result<Vec<ParameterDefinition>, SubmitError>
where
    H: Host + ?Sized,
{
    let Some(json) = node.user_data(QUEUE_PARAMETER_DEFINITIONS) else {
        return Ok(Vec::new());
    };

    serde_json::from_str(&json)
        .map_err(|err| SubmitError::QueueParameters(node.path().to_string(), err))
}

/// Caches `definitions` on the operator for later compilations.
pub fn store_queue_parameter_definitions<H>(
    host: &mut H,
    rop: &str,
    definitions: &[ParameterDefinition],
) -> Result<(), SubmitError>
where
    H: Host + ?Sized,
{
    let json = serde_json::to_string(definitions)
        .map_err(|err| SubmitError::QueueParameters(rop.to_string(), err))?;
    host.set_user_data(rop, QUEUE_PARAMETER_DEFINITIONS, json);
    Ok(())
}

/// Compiles the parameter values of the submitting operator `node`.
///
/// A queue parameter takes the value of the operator parameter of the same
/// name, falling back to its definition's default. Parameters with neither
/// are left out and resolved by the farm.
pub fn compile<H>(node: &Node<'_, H>) -> Result<ParameterValues, SubmitError>
where
    H: Host + ?Sized,
{
    let mut values = vec![
        ParameterValue::new("deadline:priority", node.eval_int("priority")?),
        ParameterValue::new("deadline:targetTaskRunStatus", node.eval_str("initial_status")?),
        ParameterValue::new("deadline:maxFailedTasksCount", node.eval_int("failed_tasks_limit")?),
        ParameterValue::new("deadline:maxRetriesPerTask", node.eval_int("task_retry_limit")?),
    ];

    for definition in queue_parameter_definitions(node)? {
        let value = match node.host().parm(node.path(), &definition.name) {
            Some(value) => value.into(),
            None => match definition.default {
                Some(default) => default,
                None => {
                    tracing::debug!(parameter = %definition.name, "queue parameter has no value");
                    continue;
                }
            },
        };

        values.push(ParameterValue {
            name: definition.name,
            value,
        });
    }

    Ok(ParameterValues {
        parameter_values: values,
    })
}
