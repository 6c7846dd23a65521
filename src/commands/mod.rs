//! Command handlers module.
//!
//! - `merge.rs`: similarity ranking of a stored reply
//! - `browse.rs`: windowed list walk over a record file
//! - `config.rs`: configuration display

mod browse;
mod config;
mod merge;

use anyhow::Context;
use serde::de::DeserializeOwned;
use std::path::Path;

pub use browse::{BrowseOptions, cmd_browse};
pub use config::cmd_config;
pub use merge::cmd_merge;

/// Reads and parses a JSON input file.
fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
}
