//! Mention extraction
//!
//! The markdown engine is an external collaborator; the hierarchy manager only
//! needs to know whether a content edit changed the set of `nodespace://` links,
//! because that is what forces downstream reference indexing to reprocess.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

// Matches both `[@text](nodespace://id)` links and bare `nodespace://node/id` URIs;
// the markdown form contains the bare form, so one pattern covers both.
const MENTION_PATTERN: &str = r"nodespace://(?:node/)?([A-Za-z0-9-]+)";

fn mention_regex() -> &'static Regex {
    static MENTION_REGEX: OnceLock<Regex> = OnceLock::new();
    MENTION_REGEX.get_or_init(|| Regex::new(MENTION_PATTERN).expect("mention pattern is valid"))
}

/// A mention target must be a UUID or a calendar date (`YYYY-MM-DD`).
pub fn is_valid_node_id(node_id: &str) -> bool {
    if uuid::Uuid::parse_str(node_id).is_ok() && node_id.len() == 36 {
        return true;
    }
    chrono::NaiveDate::parse_from_str(node_id, "%Y-%m-%d")
        .map(|date| date.format("%Y-%m-%d").to_string() == node_id)
        .unwrap_or(false)
}

/// Unique mentioned ids in sorted order, excluding `self_id`.
///
/// ```
/// # use nodespace_hierarchy::utils::extract_mentions;
/// let content = "See [@Plan](nodespace://550e8400-e29b-41d4-a716-446655440000) and nodespace://2025-10-24";
/// assert_eq!(extract_mentions(content, None).len(), 2);
/// ```
pub fn extract_mentions(content: &str, self_id: Option<&str>) -> Vec<String> {
    mention_regex()
        .captures_iter(content)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str()))
        .filter(|id| is_valid_node_id(id))
        .filter(|id| Some(*id) != self_id)
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
