//! Ephemeral per-node view state
//!
//! UI state is never persisted. It is attached to every node in the
//! [`NodeStore`](crate::services::NodeStore) at hydration or creation time and is
//! recomputed by structural operations.

use serde::{Deserialize, Serialize};

/// View state tracked alongside each node record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    /// Distance from the nearest loaded root (0 = root)
    pub depth: usize,

    /// Whether children are shown by the view projector
    pub expanded: bool,

    /// Presentation hint: focus this node when it is rendered
    pub auto_focus: bool,

    /// Empty or near-empty content eligible for silent cleanup
    pub is_placeholder: bool,

    /// Header level inherited from hydration options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inherited_header_level: Option<u8>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            depth: 0,
            expanded: true,
            auto_focus: false,
            is_placeholder: false,
            inherited_header_level: None,
        }
    }
}

impl UiState {
    /// UI state for a node created interactively by the mutator
    pub fn for_new_node(depth: usize, content: &str) -> Self {
        Self {
            depth,
            expanded: true,
            auto_focus: true,
            is_placeholder: is_placeholder_content(content),
            inherited_header_level: None,
        }
    }

    /// UI state for a hydrated node
    pub fn from_options(options: &HydrationOptions, content: &str) -> Self {
        Self {
            depth: 0,
            expanded: options.expanded,
            auto_focus: options.auto_focus,
            is_placeholder: is_placeholder_content(content),
            inherited_header_level: options.inherited_header_level,
        }
    }
}

/// Defaults applied to every node of a bulk hydration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HydrationOptions {
    pub expanded: bool,
    pub auto_focus: bool,
    pub inherited_header_level: Option<u8>,
}

impl Default for HydrationOptions {
    fn default() -> Self {
        Self {
            expanded: true,
            auto_focus: false,
            inherited_header_level: None,
        }
    }
}

/// Content with nothing but whitespace or a bare markdown prefix.
///
/// `"# "`, `"- [ ] "` and `"> "` count as placeholders because pressing Enter on a
/// header, task, or quote line creates them before the user types anything.
pub fn is_placeholder_content(content: &str) -> bool {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return true;
    }

    let stripped = trimmed
        .trim_start_matches('#')
        .trim_start_matches('>')
        .trim_start_matches("- [ ]")
        .trim_start_matches("- [x]")
        .trim();
    stripped.is_empty() && trimmed.len() <= 7
}
