//! Subcommand implementations

pub mod invoke;
pub mod pipeline;
pub mod remediate;

use anyhow::{Context, Result};
use serde_json::Value;
use std::io::Read;
use std::path::Path;

/// Read a JSON document from a file, or from stdin when the path is `-`
pub fn read_json(path: &Path) -> Result<Value> {
    let content = if path.as_os_str() == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read stdin")?;
        buffer
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?
    };
    serde_json::from_str(&content).with_context(|| format!("{} is not valid JSON", path.display()))
}
