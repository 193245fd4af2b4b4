use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

#[derive(Debug, Clone)]
pub struct SnapshotOutcome {
    pub backup_path: PathBuf,
    pub bytes: usize,
    pub pruned: usize,
}

fn sanitize_slug(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_dash = false;
    for ch in input.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
            prev_dash = false;
        } else if !prev_dash {
            out.push('-');
            prev_dash = true;
        }
    }
    out.trim_matches('-').to_string()
}

fn epoch_millis_string() -> Result<String> {
    let millis = std::time::SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before UNIX_EPOCH")?
        .as_millis();
    Ok(format!("{millis:013}"))
}

fn backup_prefix(source_path: &Path) -> String {
    let stem = source_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("store");
    let slug = sanitize_slug(stem);
    if slug.is_empty() {
        "store".to_string()
    } else {
        slug
    }
}

/// Backups of `source_path` in `backups_dir`, oldest first.
pub fn list_backups(backups_dir: &Path, source_path: &Path) -> Result<Vec<PathBuf>> {
    if !backups_dir.exists() {
        return Ok(Vec::new());
    }
    let prefix = format!("{}-", backup_prefix(source_path));
    let mut out = Vec::new();
    for entry in fs::read_dir(backups_dir)
        .with_context(|| format!("failed to read {}", backups_dir.display()))?
    {
        let path = entry?.path();
        let is_ours = path.is_file()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix));
        if is_ours {
            out.push(path);
        }
    }
    // Stamps are fixed-width, so name order is age order.
    out.sort();
    Ok(out)
}

fn prune_backups(backups_dir: &Path, source_path: &Path, keep: usize) -> Result<usize> {
    let backups = list_backups(backups_dir, source_path)?;
    let excess = backups.len().saturating_sub(keep);
    for path in backups.iter().take(excess) {
        fs::remove_file(path).with_context(|| format!("failed to remove {}", path.display()))?;
    }
    Ok(excess)
}

/// Copy the current store aside before it is overwritten, keeping the newest `keep` copies.
pub fn write_backup(
    backups_dir: &Path,
    source_path: &Path,
    keep: usize,
) -> Result<SnapshotOutcome> {
    fs::create_dir_all(backups_dir)
        .with_context(|| format!("failed to create {}", backups_dir.display()))?;

    let raw = fs::read(source_path)
        .with_context(|| format!("failed to read store {}", source_path.display()))?;

    let ext = source_path
        .extension()
        .and_then(|s| s.to_str())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("xlsx");
    let stamp = epoch_millis_string()?;
    let backup_path = backups_dir.join(format!("{}-{stamp}.{ext}", backup_prefix(source_path)));

    fs::write(&backup_path, &raw)
        .with_context(|| format!("failed to write {}", backup_path.display()))?;
    let pruned = prune_backups(backups_dir, source_path, keep)?;

    Ok(SnapshotOutcome {
        backup_path,
        bytes: raw.len(),
        pruned,
    })
}
