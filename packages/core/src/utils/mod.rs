//! Utility functions shared across the crate

mod mentions;

pub use mentions::{extract_mentions, is_valid_node_id};
