//! Type-Safe TaskNode Wrapper
//!
//! Typed access to the `properties.task` object of task nodes. The hierarchy
//! layer never reads these properties; the wrapper exists for collaborators that
//! render or toggle task state.
//!
//! # Examples
//!
//! ```rust
//! use nodespace_hierarchy::models::{Node, TaskNode, TaskStatus};
//! use serde_json::json;
//!
//! let node = Node::new(
//!     "task".to_string(),
//!     "Write tests".to_string(),
//!     None,
//!     json!({"task": {"status": "in_progress"}}),
//! );
//! let mut task = TaskNode::from_node(node)?;
//! assert_eq!(task.status(), TaskStatus::InProgress);
//!
//! task.cycle_status();
//! assert!(task.is_completed());
//! # Ok::<(), nodespace_hierarchy::models::ValidationError>(())
//! ```

use crate::models::{Node, ValidationError};
use serde_json::json;
use std::str::FromStr;

/// Task status stored as a string in `properties.task.status`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" | "PENDING" | "OPEN" => Ok(Self::Pending),
            "in_progress" | "inProgress" | "IN_PROGRESS" => Ok(Self::InProgress),
            "completed" | "COMPLETED" | "DONE" => Ok(Self::Completed),
            "cancelled" | "CANCELLED" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid task status: {}", s)),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl TaskStatus {
    /// Checkbox cycle used by the outliner: pending → in progress → completed → pending.
    /// Cancelled tasks are reopened.
    pub fn next(self) -> Self {
        match self {
            Self::Pending => Self::InProgress,
            Self::InProgress => Self::Completed,
            Self::Completed | Self::Cancelled => Self::Pending,
        }
    }
}

/// Type-safe wrapper for task nodes
#[derive(Debug, Clone)]
pub struct TaskNode {
    node: Node,
}

impl TaskNode {
    /// Wrap a node, rejecting anything whose `node_type` is not `"task"`
    pub fn from_node(node: Node) -> Result<Self, ValidationError> {
        if node.node_type != "task" {
            return Err(ValidationError::InvalidNodeType(format!(
                "Expected node_type 'task', got '{}'",
                node.node_type
            )));
        }
        Ok(Self { node })
    }

    pub fn as_node(&self) -> &Node {
        &self.node
    }

    pub fn into_node(self) -> Node {
        self.node
    }

    /// Returns `TaskStatus::Pending` if status is missing or invalid.
    pub fn status(&self) -> TaskStatus {
        self.task_field("status")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or(TaskStatus::Pending)
    }

    pub fn set_status(&mut self, status: TaskStatus) {
        self.set_task_field("status", json!(status.to_string()));
    }

    /// Advance the status one step and return the new value
    pub fn cycle_status(&mut self) -> TaskStatus {
        let next = self.status().next();
        self.set_status(next);
        next
    }

    pub fn is_completed(&self) -> bool {
        self.status() == TaskStatus::Completed
    }

    pub fn due_date(&self) -> Option<String> {
        self.task_field("due_date")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }

    pub fn set_due_date(&mut self, due_date: Option<String>) {
        self.set_task_field("due_date", due_date.map(|d| json!(d)).unwrap_or(json!(null)));
    }

    /// The `properties` payload to hand to `HierarchyMutator::update_properties`
    pub fn properties_update(&self) -> serde_json::Value {
        json!({ "task": self.node.properties.get("task").cloned().unwrap_or(json!({})) })
    }

    fn task_field(&self, key: &str) -> Option<&serde_json::Value> {
        self.node.properties.get("task").and_then(|task| task.get(key))
    }

    fn set_task_field(&mut self, key: &str, value: serde_json::Value) {
        if !self.node.properties.is_object() {
            self.node.properties = json!({});
        }
        if let Some(props) = self.node.properties.as_object_mut() {
            let task = props.entry("task").or_insert_with(|| json!({}));
            if !task.is_object() {
                *task = json!({});
            }
            if let Some(obj) = task.as_object_mut() {
                obj.insert(key.to_string(), value);
            }
        }
        self.node.touch();
    }
}
