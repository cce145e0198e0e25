//! Deterministic JSON serialization for the session file.
//!
//! Keeps the on-disk document diff-friendly:
//! - Sorting object keys alphabetically (via `BTreeMap`)
//! - Using 2-space indentation
//! - Adding trailing newline

mod json;

pub use json::*;
