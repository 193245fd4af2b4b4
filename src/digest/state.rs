use crate::digest::paths::DigestPaths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestState {
    pub schema_version: u32,
    pub last_run_epoch_secs: Option<u64>,
    pub last_date_column: Option<String>,
    pub last_store_hash: Option<String>,
    pub last_archived_rows: usize,
    pub active_rows: BTreeMap<String, usize>,
}

impl Default for DigestState {
    fn default() -> Self {
        Self {
            schema_version: 1,
            last_run_epoch_secs: None,
            last_date_column: None,
            last_store_hash: None,
            last_archived_rows: 0,
            active_rows: BTreeMap::new(),
        }
    }
}

pub fn load(paths: &DigestPaths) -> Result<DigestState> {
    let file = &paths.state_file;
    if !file.exists() {
        return Ok(DigestState::default());
    }

    let raw =
        fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    let parsed: DigestState = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", file.display()))?;
    Ok(parsed)
}

pub fn save(paths: &DigestPaths, state: &DigestState) -> Result<PathBuf> {
    let file = paths.state_file.clone();
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let data = serde_json::to_string_pretty(state)?;
    fs::write(&file, format!("{data}\n"))
        .with_context(|| format!("failed to write {}", file.display()))?;
    Ok(file)
}
