//! Type-Safe HeaderNode Wrapper
//!
//! Header level is derived from the markdown prefix of the content (`# ` .. `###### `),
//! falling back to `properties.header.level` for content without a prefix.

use crate::models::{Node, ValidationError};

pub const MAX_HEADER_LEVEL: u8 = 6;

/// Type-safe wrapper for header nodes
#[derive(Debug, Clone)]
pub struct HeaderNode {
    node: Node,
}

impl HeaderNode {
    pub fn from_node(node: Node) -> Result<Self, ValidationError> {
        if node.node_type != "header" {
            return Err(ValidationError::InvalidNodeType(format!(
                "Expected node_type 'header', got '{}'",
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

    /// Header level in `1..=6`. Defaults to 1.
    pub fn level(&self) -> u8 {
        header_level_from_content(&self.node.content)
            .or_else(|| {
                self.node
                    .properties
                    .get("header")
                    .and_then(|h| h.get("level"))
                    .and_then(|v| v.as_u64())
                    .map(|l| l.clamp(1, MAX_HEADER_LEVEL as u64) as u8)
            })
            .unwrap_or(1)
    }

    /// Content without the markdown prefix
    pub fn title(&self) -> &str {
        let content = self.node.content.as_str();
        match header_level_from_content(content) {
            Some(level) => content[level as usize..].trim_start(),
            None => content,
        }
    }
}

/// Parse a `#`-prefix header level. `"## Title"` → `Some(2)`, `"#tag"` → `None`.
pub fn header_level_from_content(content: &str) -> Option<u8> {
    let hashes = content.bytes().take_while(|b| *b == b'#').count();
    if hashes == 0 || hashes > MAX_HEADER_LEVEL as usize {
        return None;
    }
    match content.as_bytes().get(hashes) {
        Some(b' ') | None => Some(hashes as u8),
        _ => None,
    }
}
