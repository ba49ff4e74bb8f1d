//! Data Models
//!
//! - `Node` - Universal persisted node record
//! - `UiState` - Ephemeral per-node view state
//! - Typed wrappers (`TaskNode`, `HeaderNode`) layered on top of `Node`
//!
//! Structural invariants only ever read `id`, `parent_id`, `container_node_id`
//! and `before_sibling_id`; `properties` is opaque to the hierarchy layer.

mod header_node;
mod node;
mod task_node;
mod ui_state;

pub use header_node::{header_level_from_content, HeaderNode, MAX_HEADER_LEVEL};
pub use node::{DeleteResult, Node, NodeUpdate, ValidationError};
pub use task_node::{TaskNode, TaskStatus};
pub use ui_state::{is_placeholder_content, HydrationOptions, UiState};
