//! The narrow capability surface through which the submitter talks to the
//! host application.
//!
//! Nothing else in the crate knows about scene graphs, parameters or the
//! host's command language. An adapter over the real host binding
//! implements [`Host`]; [`SceneSnapshot`](crate::snapshot::SceneSnapshot)
//! implements it over a recorded scene.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::error::SubmitError;

/// Captured output of the host render planner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderPlan {
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
}

/// Operator type as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeType {
    /// Type name, e.g. `ifd`.
    pub name: String,
    /// Network category, e.g. `Driver`.
    pub category: String,
}

impl NodeType {
    pub fn new(category: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
        }
    }

    /// The qualified type name, e.g. `Driver/ifd`.
    pub fn name_with_category(&self) -> String {
        format!("{}/{}", self.category, self.name)
    }
}

/// An evaluated parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParmValue {
    Int(i64),
    Float(f64),
    String(String),
}

impl ParmValue {
    /// String evaluation, the way the host renders a value for display.
    pub fn as_string(&self) -> String {
        match self {
            ParmValue::Int(value) => value.to_string(),
            ParmValue::Float(value) => value.to_string(),
            ParmValue::String(value) => value.clone(),
        }
    }
}

impl From<i64> for ParmValue {
    fn from(value: i64) -> Self {
        ParmValue::Int(value)
    }
}

impl From<i32> for ParmValue {
    fn from(value: i32) -> Self {
        ParmValue::Int(value.into())
    }
}

impl From<&str> for ParmValue {
    fn from(value: &str) -> Self {
        ParmValue::String(value.to_string())
    }
}

impl From<String> for ParmValue {
    fn from(value: String) -> Self {
        ParmValue::String(value)
    }
}

/// The parameter that owns a scene file reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParmRef {
    pub node: String,
    pub name: String,
}

/// One entry of the host's scene-wide file reference table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReference {
    #[serde(default)]
    pub parm: Option<ParmRef>,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Message,
    Warning,
}

impl Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Message => f.write_str("message"),
            Severity::Warning => f.write_str("warning"),
        }
    }
}

/// A message shown through [`Host::display_message`], as recorded by hosts
/// that have no UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub title: String,
    pub text: String,
    pub severity: Severity,
}

/// Host application capabilities.
pub trait Host {
    /// Runs the render planner (`render -p -c -F <rop>`) against one operator.
    fn render_plan(&self, rop: &str) -> RenderPlan;

    fn node_type(&self, node: &str) -> Option<NodeType>;

    fn parm(&self, node: &str, name: &str) -> Option<ParmValue>;

    /// Evaluates every instance of a multi-parm holding paths.
    fn parm_list(&self, node: &str, name: &str) -> Option<Vec<String>>;

    fn set_parm(&mut self, node: &str, name: &str, value: ParmValue);

    /// Replaces every instance of a multi-parm.
    fn set_parm_list(&mut self, node: &str, name: &str, values: Vec<String>);

    fn user_data(&self, node: &str, key: &str) -> Option<String>;

    fn set_user_data(&mut self, node: &str, key: &str, value: String);

    fn file_references(&self) -> Vec<FileReference>;

    /// Path of the currently open scene file.
    fn scene_file(&self) -> String;

    fn app_version(&self) -> String;

    /// Shows a modal message to the user.
    fn display_message(&self, title: &str, text: &str, severity: Severity);
}

/// A read handle on one operator, with typed evaluation.
pub struct Node<'a, H: Host + ?Sized> {
    host: &'a H,
    path: &'a str,
}

impl<'a, H: Host + ?Sized> Node<'a, H> {
    pub fn new(host: &'a H, path: &'a str) -> Self {
        Self { host, path }
    }

    pub fn path(&self) -> &'a str {
        self.path
    }

    pub fn host(&self) -> &'a H {
        self.host
    }

    pub fn node_type(&self) -> Option<NodeType> {
        self.host.node_type(self.path)
    }

    fn missing(&self, parm: &str) -> SubmitError {
        SubmitError::MissingParameter {
            node: self.path.to_string(),
            parm: parm.to_string(),
        }
    }

    pub fn eval(&self, parm: &str) -> Result<ParmValue, SubmitError> {
        self.host
            .parm(self.path, parm)
            .ok_or_else(|| self.missing(parm))
    }

    pub fn eval_str(&self, parm: &str) -> Result<String, SubmitError> {
        self.eval(parm).map(|value| value.as_string())
    }

    pub fn eval_int(&self, parm: &str) -> Result<i64, SubmitError> {
        match self.eval(parm)? {
            ParmValue::Int(value) => Ok(value),
            _ => Err(SubmitError::WrongParameterType {
                node: self.path.to_string(),
                parm: parm.to_string(),
                expected: "an integer",
            }),
        }
    }

    /// Toggles evaluate to integers, non-zero meaning on.
    pub fn eval_bool(&self, parm: &str) -> Result<bool, SubmitError> {
        self.eval_int(parm).map(|value| value != 0)
    }

    pub fn eval_path_list(&self, parm: &str) -> Result<Vec<String>, SubmitError> {
        self.host
            .parm_list(self.path, parm)
            .ok_or_else(|| self.missing(parm))
    }

    pub fn user_data(&self, key: &str) -> Option<String> {
        self.host.user_data(self.path, key)
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory host for tests.

    use std::cell::RefCell;
    use std::collections::HashMap;

    use super::*;

    #[derive(Default)]
    pub(crate) struct FakeHost {
        pub scene: String,
        pub version: String,
        pub types: HashMap<String, NodeType>,
        pub parms: HashMap<(String, String), ParmValue>,
        pub lists: HashMap<(String, String), Vec<String>>,
        pub user_data: HashMap<(String, String), String>,
        pub references: Vec<FileReference>,
        pub plans: HashMap<String, RenderPlan>,
        pub messages: RefCell<Vec<Message>>,
    }

    impl FakeHost {
        pub(crate) fn new() -> Self {
            Self {
                scene: "/proj/shot.hip".into(),
                version: "20.5.332".into(),
                ..Default::default()
            }
        }

        pub(crate) fn with_node(mut self, path: &str, category: &str, name: &str) -> Self {
            self.types
                .insert(path.to_string(), NodeType::new(category, name));
            self
        }

        pub(crate) fn with_parm(mut self, node: &str, name: &str, value: impl Into<ParmValue>) -> Self {
            self.parms
                .insert((node.to_string(), name.to_string()), value.into());
            self
        }

        pub(crate) fn with_list(mut self, node: &str, name: &str, values: &[&str]) -> Self {
            self.lists.insert(
                (node.to_string(), name.to_string()),
                values.iter().map(|v| v.to_string()).collect(),
            );
            self
        }

        pub(crate) fn with_user_data(mut self, node: &str, key: &str, value: &str) -> Self {
            self.user_data
                .insert((node.to_string(), key.to_string()), value.to_string());
            self
        }

        pub(crate) fn with_reference(mut self, owner: Option<(&str, &str)>, path: &str) -> Self {
            self.references.push(FileReference {
                parm: owner.map(|(node, name)| ParmRef {
                    node: node.to_string(),
                    name: name.to_string(),
                }),
                path: path.to_string(),
            });
            self
        }

        pub(crate) fn with_plan(mut self, rop: &str, stdout: &str) -> Self {
            self.plans.insert(
                rop.to_string(),
                RenderPlan {
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                },
            );
            self
        }

        pub(crate) fn with_failing_plan(mut self, rop: &str, stderr: &str) -> Self {
            self.plans.insert(
                rop.to_string(),
                RenderPlan {
                    stdout: String::new(),
                    stderr: stderr.to_string(),
                },
            );
            self
        }

        /// The submitter node with every parameter the actions read.
        pub(crate) fn with_submitter(self, path: &str) -> Self {
            self.with_node(path, "Driver", "deadline_cloud")
                .with_parm(path, "name", "shot_010")
                .with_parm(path, "description", "")
                .with_parm(path, "separate_steps", 1)
                .with_parm(path, "include_adaptor_wheels", 0)
                .with_parm(path, "adaptor_wheels", "")
                .with_parm(path, "priority", 50)
                .with_parm(path, "initial_status", "READY")
                .with_parm(path, "failed_tasks_limit", 20)
                .with_parm(path, "task_retry_limit", 5)
                .with_parm(path, "farm", "")
                .with_parm(path, "queue", "")
                .with_list(path, "input_filenames", &[])
                .with_list(path, "input_directories", &[])
                .with_list(path, "output_directories", &[])
        }
    }

    impl Host for FakeHost {
        fn render_plan(&self, rop: &str) -> RenderPlan {
            self.plans.get(rop).cloned().unwrap_or_default()
        }

        fn node_type(&self, node: &str) -> Option<NodeType> {
            self.types.get(node).cloned()
        }

        fn parm(&self, node: &str, name: &str) -> Option<ParmValue> {
            self.parms
                .get(&(node.to_string(), name.to_string()))
                .cloned()
        }

        fn parm_list(&self, node: &str, name: &str) -> Option<Vec<String>> {
            self.lists
                .get(&(node.to_string(), name.to_string()))
                .cloned()
        }

        fn set_parm(&mut self, node: &str, name: &str, value: ParmValue) {
            self.parms.insert((node.to_string(), name.to_string()), value);
        }

        fn set_parm_list(&mut self, node: &str, name: &str, values: Vec<String>) {
            self.lists.insert((node.to_string(), name.to_string()), values);
        }

        fn user_data(&self, node: &str, key: &str) -> Option<String> {
            self.user_data
                .get(&(node.to_string(), key.to_string()))
                .cloned()
        }

        fn set_user_data(&mut self, node: &str, key: &str, value: String) {
            self.user_data.insert((node.to_string(), key.to_string()), value);
        }

        fn file_references(&self) -> Vec<FileReference> {
            self.references.clone()
        }

        fn scene_file(&self) -> String {
            self.scene.clone()
        }

        fn app_version(&self) -> String {
            self.version.clone()
        }

        fn display_message(&self, title: &str, text: &str, severity: Severity) {
            self.messages.borrow_mut().push(Message {
                title: title.to_string(),
                text: text.to_string(),
                severity,
            });
        }
    }
}
