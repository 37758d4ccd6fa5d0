//! A host recorded to JSON: operators with their types, parameters and user
//! data, the scene's file references, and the render planner's output for
//! each submitting operator.
//!
//! ```json
//! {
//!   "scene_file": "/proj/shot.hip",
//!   "app_version": "20.5.332",
//!   "nodes": {
//!     "/out/mantra1": {
//!       "type": { "category": "Driver", "name": "ifd" },
//!       "parms": { "vm_picture": "/renders/beauty.$F4.exr" }
//!     }
//!   },
//!   "file_references": [{ "path": "/assets/sky.exr" }],
//!   "render_plans": { "/out/deadline_cloud1": { "stdout": "..." } }
//! }
//! ```

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;
use crate::host::{FileReference, Host, Message, NodeType, ParmValue, RenderPlan, Severity};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SceneSnapshot {
    pub scene_file: String,
    pub app_version: String,
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeSnapshot>,
    #[serde(default)]
    pub file_references: Vec<FileReference>,
    #[serde(default)]
    pub render_plans: BTreeMap<String, RenderPlan>,
    #[serde(skip)]
    messages: RefCell<Vec<Message>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSnapshot {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub parms: BTreeMap<String, ParmValue>,
    #[serde(default)]
    pub lists: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub user_data: BTreeMap<String, String>,
}

impl SceneSnapshot {
    pub fn load(path: &Utf8Path) -> Result<Self, SnapshotError> {
        let text =
            fs::read_to_string(path).map_err(|err| SnapshotError::Io(path.to_path_buf(), err))?;
        serde_json::from_str(&text).map_err(|err| SnapshotError::Json(path.to_path_buf(), err))
    }

    /// Messages displayed so far.
    pub fn messages(&self) -> Vec<Message> {
        self.messages.borrow().clone()
    }

    fn node_mut(&mut self, node: &str) -> Option<&mut NodeSnapshot> {
        let found = self.nodes.get_mut(node);
        if found.is_none() {
            tracing::debug!(node, "write to a node missing from the snapshot ignored");
        }
        found
    }
}

impl Host for SceneSnapshot {
    fn render_plan(&self, rop: &str) -> RenderPlan {
        self.render_plans.get(rop).cloned().unwrap_or_else(|| RenderPlan {
            stdout: String::new(),
            stderr: format!("No render plan recorded for '{rop}'"),
        })
    }

    fn node_type(&self, node: &str) -> Option<NodeType> {
        self.nodes.get(node).map(|n| n.node_type.clone())
    }

    fn parm(&self, node: &str, name: &str) -> Option<ParmValue> {
        self.nodes.get(node)?.parms.get(name).cloned()
    }

    fn parm_list(&self, node: &str, name: &str) -> Option<Vec<String>> {
        self.nodes.get(node)?.lists.get(name).cloned()
    }

    fn set_parm(&mut self, node: &str, name: &str, value: ParmValue) {
        if let Some(node) = self.node_mut(node) {
            node.parms.insert(name.to_string(), value);
        }
    }

    fn set_parm_list(&mut self, node: &str, name: &str, values: Vec<String>) {
        if let Some(node) = self.node_mut(node) {
            node.lists.insert(name.to_string(), values);
        }
    }

    fn user_data(&self, node: &str, key: &str) -> Option<String> {
        self.nodes.get(node)?.user_data.get(key).cloned()
    }

    fn set_user_data(&mut self, node: &str, key: &str, value: String) {
        if let Some(node) = self.node_mut(node) {
            node.user_data.insert(key.to_string(), value);
        }
    }

    fn file_references(&self) -> Vec<FileReference> {
        self.file_references.clone()
    }

    fn scene_file(&self) -> String {
        self.scene_file.clone()
    }

    fn app_version(&self) -> String {
        self.app_version.clone()
    }

    fn display_message(&self, title: &str, text: &str, severity: Severity) {
        match severity {
            Severity::Message => tracing::info!(title, "{text}"),
            Severity::Warning => tracing::warn!(title, "{text}"),
        }

        self.messages.borrow_mut().push(Message {
            title: title.to_string(),
            text: text.to_string(),
            severity,
        });
    }
}
