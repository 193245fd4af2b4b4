use anyhow::Result;

use crate::commands::CommandReport;
use crate::digest::pipeline::{self, RunOptions};

pub fn run(opts: &RunOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("run");
    let outcome = pipeline::run_once(opts)?;

    report.detail(format!("date_column={}", outcome.date_column));
    report.detail(format!("store_path={}", outcome.store_path.display()));
    report.detail(format!("store.existed={}", outcome.history_existed));
    if outcome.history_unreadable {
        report.detail("store.unreadable=true (history treated as empty)");
    }

    for process in &outcome.tables.processes {
        let prefix = format!("process[{}]", process.name);
        report.detail(format!(
            "{prefix}.sources read={} skipped={}",
            process.sources_read, process.sources_skipped
        ));
        report.detail(format!(
            "{prefix}.observations={} daily_keys={}",
            process.observations, process.daily_keys
        ));
        match process.active_rows {
            Some(rows) => report.detail(format!("{prefix}.active_rows={rows}")),
            None => report.detail(format!("{prefix}.active_rows=none (no table written)")),
        }
        report.detail(format!("{prefix}.archived_rows={}", process.archived_rows));
        if process.collapsed_duplicates > 0 {
            report.detail(format!(
                "{prefix}.collapsed_duplicates={}",
                process.collapsed_duplicates
            ));
        }
        if !process.unparsed_columns.is_empty() {
            report.detail(format!(
                "{prefix}.unparsed_columns={}",
                process.unparsed_columns.join(",")
            ));
        }
        if process.sources_read == 0 && !process.had_history {
            report.detail(format!("{prefix}: no readable source and no history"));
        }
    }

    report.detail(format!("archive.appended={}", outcome.tables.archive_appended));
    if let Some(rows) = outcome.tables.archive_rows {
        report.detail(format!("archive.rows={rows}"));
    }
    if !outcome.tables.legacy_sheets.is_empty() {
        report.detail(format!(
            "passthrough_sheets={}",
            outcome.tables.legacy_sheets.join(",")
        ));
    }

    if outcome.dry_run {
        report.detail("dry_run=true (store not written)");
        return Ok(report);
    }
    if !outcome.written {
        report.detail("nothing to write");
        return Ok(report);
    }
    if let Some(path) = &outcome.backup_path {
        report.detail(format!("backup_path={}", path.display()));
    }
    if let Some(hash) = &outcome.store_hash {
        report.detail(format!("store_sha256={hash}"));
    }
    if let Some(path) = &outcome.state_file {
        report.detail(format!("state_file={}", path.display()));
    }
    Ok(report)
}
