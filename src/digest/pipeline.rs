use crate::digest::aggregate::{DailyAggregate, aggregate_process};
use crate::digest::archive::{ArchiveAccumulator, consolidate};
use crate::digest::audit;
use crate::digest::config::{DigestConfig, load_config};
use crate::digest::dates::{today_column, validate_date_column};
use crate::digest::history::{StoreSnapshot, load_store};
use crate::digest::merge::{MergeRules, merge_process};
use crate::digest::paths::{DigestPaths, resolve_paths};
use crate::digest::snapshot::write_backup;
use crate::digest::state::{self, DigestState};
use crate::digest::table::Table;
use crate::digest::util::{bytes_hash, now_epoch_secs};
use crate::digest::warn::{self, WarnEvent};
use crate::digest::writer::{persist_atomically, render_workbook};
use crate::error::DigestError;
use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// `MM/DD` to use instead of today's date.
    pub date: Option<String>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ProcessSummary {
    pub name: String,
    pub sources_read: usize,
    pub sources_skipped: usize,
    pub observations: usize,
    pub daily_keys: usize,
    pub had_history: bool,
    pub active_rows: Option<usize>,
    pub archived_rows: usize,
    pub collapsed_duplicates: usize,
    pub unparsed_columns: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DigestTables {
    /// Output sheets in write order: processes, archive, pass-through.
    pub sheets: Vec<(String, Table)>,
    pub processes: Vec<ProcessSummary>,
    pub archive_appended: usize,
    pub archive_rows: Option<usize>,
    pub legacy_sheets: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub date_column: String,
    pub store_path: PathBuf,
    pub history_existed: bool,
    pub history_unreadable: bool,
    pub tables: DigestTables,
    pub dry_run: bool,
    pub written: bool,
    pub backup_path: Option<PathBuf>,
    pub store_hash: Option<String>,
    pub state_file: Option<PathBuf>,
}

/// Exclusive for the lifetime of the value; the OS drops the lock with the handle.
struct RunLock {
    _file: File,
}

fn acquire_lock(path: &Path) -> Result<RunLock> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.try_lock_exclusive()
        .map_err(|_| DigestError::StoreLocked(path.to_path_buf()))?;
    Ok(RunLock { _file: file })
}

fn resolve_date_column(cfg: &DigestConfig, requested: Option<&str>) -> Result<String> {
    match requested {
        Some(raw) => Ok(validate_date_column(raw)?),
        None => {
            let today = today_column(cfg.run.timezone.as_deref())?;
            Ok(validate_date_column(&today)?)
        }
    }
}

/// Everything between "sources are read" and "workbook is rendered"; touches no files.
pub fn digest_tables(
    cfg: &DigestConfig,
    aggregates: Vec<(String, DailyAggregate)>,
    mut store: StoreSnapshot,
) -> DigestTables {
    let rules = MergeRules {
        resolved_markers: &cfg.archive.resolved_markers,
        pinned_category: &cfg.sort.pinned_category,
    };
    let mut archive = ArchiveAccumulator::default();
    let mut out = DigestTables::default();

    for (process, aggregate) in aggregates {
        tracing::info!(process = %process, "merging process table");
        let prior = store.take(&process);
        let mut summary = ProcessSummary {
            name: process.clone(),
            sources_read: aggregate.sources_read,
            sources_skipped: aggregate.sources_skipped,
            observations: aggregate.observations,
            daily_keys: aggregate.table.len(),
            had_history: prior.is_some(),
            ..ProcessSummary::default()
        };

        let merged = merge_process(
            &process,
            aggregate.table,
            prior,
            &aggregate.stage_order,
            &rules,
            &mut archive,
        );
        summary.archived_rows = merged.archived_rows;
        summary.collapsed_duplicates = merged.collapsed_duplicates;
        summary.unparsed_columns = merged.unparsed_columns;
        if let Some(table) = merged.table {
            summary.active_rows = Some(table.len());
            out.sheets.push((process, table));
        }
        out.processes.push(summary);
    }

    let archive_sheet = cfg.store.archive_sheet.clone();
    let consolidated = consolidate(store.take(&archive_sheet), archive);
    out.archive_appended = consolidated.appended;
    if let Some(table) = consolidated.table {
        tracing::info!(
            sheet = %archive_sheet,
            appended = consolidated.appended,
            rows = table.len(),
            "consolidated archive"
        );
        out.archive_rows = Some(table.len());
        out.sheets.push((archive_sheet, table));
    }

    for (name, table) in store.into_remaining() {
        tracing::info!(sheet = %name, "keeping pass-through sheet");
        out.legacy_sheets.push(name.clone());
        out.sheets.push((name, table));
    }
    out
}

fn record_run(paths: &DigestPaths, outcome: &RunOutcome) -> Result<PathBuf> {
    let mut state = state::load(paths).unwrap_or_else(|_| DigestState::default());
    state.last_run_epoch_secs = Some(now_epoch_secs()?);
    state.last_date_column = Some(outcome.date_column.clone());
    state.last_store_hash = outcome.store_hash.clone();
    state.last_archived_rows = outcome.tables.archive_appended;
    state.active_rows = outcome
        .tables
        .processes
        .iter()
        .filter_map(|p| p.active_rows.map(|rows| (p.name.clone(), rows)))
        .collect();
    state::save(paths, &state)
}

pub fn run_once(opts: &RunOptions) -> Result<RunOutcome> {
    let paths = resolve_paths()?;
    let cfg = load_config(&paths)?;
    run_with(&paths, &cfg, opts)
}

pub fn run_with(paths: &DigestPaths, cfg: &DigestConfig, opts: &RunOptions) -> Result<RunOutcome> {
    let _lock = acquire_lock(&paths.lock_file)?;
    let date_column = resolve_date_column(cfg, opts.date.as_deref())?;
    tracing::info!(date_column = %date_column, "starting digest run");

    let aggregates: Vec<(String, DailyAggregate)> = cfg
        .processes
        .iter()
        .map(|process| {
            tracing::info!(process = %process.name, "reading daily sources");
            (
                process.name.clone(),
                aggregate_process(process, paths, &date_column),
            )
        })
        .collect();

    let store_path = paths.store_path(&cfg.store.file_name);
    let store = load_store(&store_path);
    let history_existed = store.existed;
    let history_unreadable = store.unreadable;

    let tables = digest_tables(cfg, aggregates, store);
    let mut outcome = RunOutcome {
        date_column,
        store_path,
        history_existed,
        history_unreadable,
        tables,
        dry_run: opts.dry_run,
        written: false,
        backup_path: None,
        store_hash: None,
        state_file: None,
    };

    if opts.dry_run {
        return Ok(outcome);
    }
    if outcome.tables.sheets.is_empty() {
        tracing::info!("no tables to write");
        return Ok(outcome);
    }

    let bytes = render_workbook(&outcome.tables.sheets, &cfg.style)?;

    if cfg.backup.enabled && outcome.store_path.is_file() {
        match write_backup(&paths.backups_dir, &outcome.store_path, cfg.backup.keep) {
            Ok(snapshot) => {
                tracing::info!(
                    path = %snapshot.backup_path.display(),
                    bytes = snapshot.bytes,
                    pruned = snapshot.pruned,
                    "backed up previous store"
                );
                outcome.backup_path = Some(snapshot.backup_path);
            }
            Err(err) => warn::emit(WarnEvent {
                code: "BACKUP_FAILED",
                stage: "write",
                action: "backup-store",
                process: "all",
                target: &outcome.store_path.display().to_string(),
                reason: "continuing-without-backup",
                err: &format!("{err:#}"),
            }),
        }
    }

    tracing::info!(path = %outcome.store_path.display(), "writing summary workbook");
    persist_atomically(&outcome.store_path, &bytes)?;
    outcome.written = true;
    outcome.store_hash = Some(bytes_hash(&bytes));

    match record_run(paths, &outcome) {
        Ok(file) => outcome.state_file = Some(file),
        Err(err) => tracing::warn!(err = %format!("{err:#}"), "failed to save run state"),
    }
    let message = format!(
        "date={} sheets={} archived={}",
        outcome.date_column,
        outcome.tables.sheets.len(),
        outcome.tables.archive_appended
    );
    if let Err(err) = audit::append_event(paths, "run", "ok", &message) {
        tracing::warn!(err = %format!("{err:#}"), "failed to append audit event");
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::aggregate::{ObservationRecord, summarize};
    use crate::digest::schema::{ANNOTATION_COLUMNS, DESCRIPTION, STATUS};
    use crate::digest::table::Cell;

    fn obs(stage: &str, description: &str) -> ObservationRecord {
        ObservationRecord {
            stage: stage.to_string(),
            category: "网络异常".to_string(),
            description: description.to_string(),
            detail: String::new(),
            note: String::new(),
        }
    }

    fn aggregate(records: Vec<ObservationRecord>, stages: &[&str]) -> DailyAggregate {
        DailyAggregate {
            observations: records.len(),
            table: summarize(records, "01/05"),
            stage_order: stages.iter().map(|s| s.to_string()).collect(),
            sources_read: 1,
            sources_skipped: 0,
        }
    }

    fn config(processes: &[&str]) -> DigestConfig {
        let mut cfg = DigestConfig::default();
        cfg.processes.truncate(0);
        for name in processes {
            cfg.processes.push(crate::digest::config::ProcessConfig {
                name: name.to_string(),
                sources: Vec::new(),
            });
        }
        cfg
    }

    #[test]
    fn fresh_store_yields_only_the_daily_rows() {
        let cfg = config(&["p1"]);
        let records = vec![obs("A", "x"), obs("A", "x"), obs("A", "x"), obs("A", "y")];
        let tables = digest_tables(
            &cfg,
            vec![("p1".to_string(), aggregate(records, &["A"]))],
            StoreSnapshot::default(),
        );

        assert_eq!(tables.sheets.len(), 1);
        let (name, table) = &tables.sheets[0];
        assert_eq!(name, "p1");
        assert_eq!(table.len(), 2);
        assert_eq!(table.columns().last().map(String::as_str), Some("01/05"));
        for column in ANNOTATION_COLUMNS {
            assert_eq!(table.text(0, column), "");
        }
        assert!(tables.archive_rows.is_none());
        assert_eq!(tables.archive_appended, 0);
    }

    #[test]
    fn archive_collects_across_processes_and_legacy_passes_through() {
        let cfg = config(&["p1", "p2"]);

        let mut p1 = summarize(vec![obs("A", "fixed-1")], "01/04");
        let idx = p1.ensure_column(STATUS);
        p1.rows_mut()[0][idx] = Cell::text("已修复");
        let mut p2 = summarize(vec![obs("B", "fixed-2"), obs("B", "open")], "01/04");
        let idx = p2.ensure_column(STATUS);
        p2.rows_mut()[0][idx] = Cell::text("已定位 待排期");

        let mut old_archive = Table::new([DESCRIPTION]);
        old_archive.push_row(vec![Cell::text("older")]);
        let legacy = Table::new(["whatever"]);

        let store = StoreSnapshot::from_sheets(vec![
            ("legacy".to_string(), legacy),
            (cfg.store.archive_sheet.clone(), old_archive),
            ("p2".to_string(), p2),
            ("p1".to_string(), p1),
        ]);
        let tables = digest_tables(
            &cfg,
            vec![
                ("p1".to_string(), DailyAggregate::default()),
                ("p2".to_string(), DailyAggregate::default()),
            ],
            store,
        );

        let names: Vec<&str> = tables.sheets.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["p1", "p2", "问题归档", "legacy"]);
        assert_eq!(tables.legacy_sheets, ["legacy"]);
        assert_eq!(tables.archive_appended, 2);

        assert_eq!(tables.sheets[0].1.len(), 0);
        assert_eq!(tables.sheets[1].1.len(), 1);
        let archive = &tables.sheets[2].1;
        let order: Vec<String> = (0..archive.len()).map(|r| archive.text(r, DESCRIPTION)).collect();
        assert_eq!(order, ["older", "fixed-1", "fixed-2"]);
        assert_eq!(archive.text(2, STATUS), "已定位 待排期");
    }

    #[test]
    fn date_override_must_be_padded() {
        let cfg = DigestConfig::default();
        assert_eq!(resolve_date_column(&cfg, Some("12/25")).expect("ok"), "12/25");
        assert!(resolve_date_column(&cfg, Some("2/5")).is_err());
    }

    #[test]
    fn second_lock_holder_is_refused() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("exdigest.lock");
        let first = acquire_lock(&path).expect("first lock");
        let err = acquire_lock(&path).err().expect("second lock refused");
        assert!(matches!(
            err.downcast_ref::<DigestError>(),
            Some(DigestError::StoreLocked(_))
        ));
        drop(first);
        assert!(acquire_lock(&path).is_ok());
    }
}
