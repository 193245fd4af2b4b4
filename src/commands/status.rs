use anyhow::Result;
use std::env;

use crate::commands::CommandReport;
use crate::digest::config::load_config;
use crate::digest::history::load_store;
use crate::digest::paths::resolve_paths;
use crate::digest::state;
use crate::digest::util::file_hash;

include!(concat!(env!("OUT_DIR"), "/exdigest_env_allowlist.rs"));

/// `EXDIGEST_*` variables referenced by the binary that are set in this environment.
pub fn active_env_overrides() -> Vec<String> {
    GENERATED_EXDIGEST_ENV_ALLOWLIST
        .iter()
        .filter(|key| env::var_os(key).is_some())
        .map(|key| key.to_string())
        .collect()
}

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("status");

    report.detail(format!("digest_home={}", paths.digest_home.display()));
    report.detail(format!(
        "config_file={} (exists={})",
        paths.config_file.display(),
        paths.config_file.exists()
    ));
    report.detail(format!("base_dir={}", paths.base_dir.display()));
    report.detail(format!("logs_dir={}", paths.logs_dir.display()));
    report.detail(format!("backups_dir={}", paths.backups_dir.display()));

    let overrides = active_env_overrides();
    if !overrides.is_empty() {
        report.detail(format!("env_overrides={}", overrides.join(",")));
    }

    let cfg = match load_config(&paths) {
        Ok(cfg) => cfg,
        Err(err) => {
            report.issue(format!("config invalid: {err:#}"));
            return Ok(report);
        }
    };

    for process in &cfg.processes {
        let prefix = format!("process[{}]", process.name);
        report.detail(format!("{prefix}.stages={}", process.stage_order().join(",")));
        for source in &process.sources {
            let path = paths.resolve(&source.path);
            report.detail(format!(
                "{prefix}.source stage={} path={} exists={}",
                source.stage,
                path.display(),
                path.is_file()
            ));
        }
    }

    let store_path = paths.store_path(&cfg.store.file_name);
    report.detail(format!("store_path={}", store_path.display()));
    let store = load_store(&store_path);
    if store.unreadable {
        report.issue(format!("store unreadable: {}", store_path.display()));
    } else if store.existed {
        report.detail(format!("store.sheets={}", store.sheet_names().join(",")));
    } else {
        report.detail("store.sheets=none (first run pending)");
    }

    match state::load(&paths) {
        Ok(state) => {
            if let Some(date) = state.last_date_column {
                report.detail(format!("state.last_date_column={date}"));
            }
            if let Some(at) = state.last_run_epoch_secs {
                report.detail(format!("state.last_run_epoch_secs={at}"));
            }
            if let Some(hash) = &state.last_store_hash {
                report.detail(format!("state.last_store_sha256={hash}"));
                if store.existed && !store.unreadable {
                    let current = file_hash(&store_path)?;
                    if &current != hash {
                        report.detail("store edited since last run");
                    }
                }
            }
            report.detail(format!("state.last_archived_rows={}", state.last_archived_rows));
        }
        Err(err) => report.issue(format!("state unreadable: {err:#}")),
    }

    Ok(report)
}
