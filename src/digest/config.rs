use crate::digest::paths::DigestPaths;
use crate::error::DigestError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::env;
use std::fs;

/// Excel refuses sheet names longer than this.
const MAX_SHEET_NAME_CHARS: usize = 31;
const FORBIDDEN_SHEET_CHARS: [char; 7] = ['[', ']', ':', '*', '?', '/', '\\'];
/// Excel's row height ceiling, in points.
const MAX_ROW_HEIGHT: f64 = 409.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub file_name: String,
    pub archive_sheet: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            file_name: "异常概括汇总.xlsx".to_string(),
            archive_sheet: "问题归档".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub resolved_markers: Vec<String>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            resolved_markers: vec!["已修复".to_string(), "已定位".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SortConfig {
    pub pinned_category: String,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            pinned_category: "IT异常".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    pub header_row_height: f64,
    pub data_row_height: f64,
    pub max_column_width: usize,
    pub column_padding: usize,
    pub width_sample_rows: usize,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            header_row_height: 25.0,
            data_row_height: 28.0,
            max_column_width: 60,
            column_padding: 4,
            width_sample_rows: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub enabled: bool,
    pub keep: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            keep: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RunConfig {
    /// IANA zone used to name today's column; local clock when unset.
    pub timezone: Option<String>,
    pub pause_on_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub path: String,
    #[serde(default)]
    pub stage: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    pub name: String,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl ProcessConfig {
    /// Stage labels in declared order, unlabeled sources left out.
    pub fn stage_order(&self) -> Vec<String> {
        self.sources
            .iter()
            .filter(|s| !s.stage.is_empty())
            .map(|s| s.stage.clone())
            .collect()
    }
}

fn source(path: &str, stage: &str) -> SourceConfig {
    SourceConfig {
        path: path.to_string(),
        stage: stage.to_string(),
    }
}

fn default_processes() -> Vec<ProcessConfig> {
    vec![
        ProcessConfig {
            name: "自营采购退货".to_string(),
            sources: vec![
                source(
                    "每日/自营退货订单项目维度退货单.xlsx",
                    "自营退货订单-项目维度退货单",
                ),
                source(
                    "每日/项目维度退货单逆向销售单.xlsx",
                    "项目维度退货单-逆向销售单",
                ),
            ],
        },
        ProcessConfig {
            name: "备件库退货".to_string(),
            sources: vec![
                source(
                    "每日/备件库退货订单项目维度退货单.xlsx",
                    "备件库退货订单-项目维度退货单",
                ),
                source(
                    "每日/备件库项目维度退货单逆向销售单.xlsx",
                    "项目维度退货单-逆向销售单",
                ),
            ],
        },
        ProcessConfig {
            name: "平台零售订单".to_string(),
            sources: vec![
                source("每日/销售订单应收单.xlsx", "销售订单-应收单"),
                source("每日/发货通知单销售出库单.xlsx", "发货通知单-销售出库单"),
                source("每日/销售出库单应收单.xlsx", "销售出库单-应收单"),
            ],
        },
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestConfig {
    pub store: StoreConfig,
    pub archive: ArchiveConfig,
    pub sort: SortConfig,
    pub style: StyleConfig,
    pub backup: BackupConfig,
    pub run: RunConfig,
    pub processes: Vec<ProcessConfig>,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            archive: ArchiveConfig::default(),
            sort: SortConfig::default(),
            style: StyleConfig::default(),
            backup: BackupConfig::default(),
            run: RunConfig::default(),
            processes: default_processes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialDigestConfig {
    store: Option<StoreConfig>,
    archive: Option<ArchiveConfig>,
    sort: Option<SortConfig>,
    style: Option<StyleConfig>,
    backup: Option<BackupConfig>,
    run: Option<RunConfig>,
    processes: Option<Vec<ProcessConfig>>,
}

fn u64_or(raw: Option<String>, fallback: u64) -> u64 {
    raw.and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(fallback)
}

fn bool_or(raw: Option<String>, fallback: bool) -> bool {
    match raw.as_deref().map(str::trim) {
        Some("1" | "true" | "TRUE" | "yes" | "on") => true,
        Some("0" | "false" | "FALSE" | "no" | "off") => false,
        _ => fallback,
    }
}

fn string_or(raw: Option<String>, fallback: &str) -> String {
    match raw {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

/// Comma separated, blank entries dropped; all-blank keeps `fallback`.
fn csv_or(raw: Option<String>, fallback: &[String]) -> Vec<String> {
    let out: Vec<String> = raw
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect();
    if out.is_empty() {
        fallback.to_vec()
    } else {
        out
    }
}

pub(crate) fn env_or_bool(var: &str, fallback: bool) -> bool {
    bool_or(env::var(var).ok(), fallback)
}

fn invalid(message: impl Into<String>) -> anyhow::Error {
    DigestError::InvalidConfig(message.into()).into()
}

fn check_sheet_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid(format!("{kind} cannot be empty")));
    }
    if name.chars().count() > MAX_SHEET_NAME_CHARS {
        return Err(invalid(format!(
            "{kind} `{name}` exceeds {MAX_SHEET_NAME_CHARS} characters"
        )));
    }
    if let Some(bad) = name.chars().find(|c| FORBIDDEN_SHEET_CHARS.contains(c)) {
        return Err(invalid(format!("{kind} `{name}` contains `{bad}`")));
    }
    if name.starts_with('\'') || name.ends_with('\'') {
        return Err(invalid(format!(
            "{kind} `{name}` cannot start or end with an apostrophe"
        )));
    }
    Ok(())
}

/// Names are used verbatim as sheet names, so surrounding whitespace goes before validation.
fn normalize_names(cfg: &mut DigestConfig) {
    cfg.store.file_name = cfg.store.file_name.trim().to_string();
    cfg.store.archive_sheet = cfg.store.archive_sheet.trim().to_string();
    for process in &mut cfg.processes {
        process.name = process.name.trim().to_string();
    }
}

pub fn validate(cfg: &DigestConfig) -> Result<()> {
    if cfg.processes.is_empty() {
        return Err(invalid("at least one [[processes]] entry is required"));
    }
    let archive_sheet = cfg.store.archive_sheet.as_str();
    check_sheet_name("store.archive_sheet", archive_sheet)?;
    if cfg.store.file_name.is_empty() {
        return Err(invalid("store.file_name cannot be empty"));
    }

    let mut seen = BTreeSet::new();
    for process in &cfg.processes {
        let name = process.name.as_str();
        check_sheet_name("process name", name)?;
        if name == archive_sheet {
            return Err(invalid(format!(
                "process name `{name}` collides with the archive sheet"
            )));
        }
        if !seen.insert(name.to_string()) {
            return Err(invalid(format!("duplicate process name `{name}`")));
        }
    }

    if !cfg
        .archive
        .resolved_markers
        .iter()
        .any(|m| !m.trim().is_empty())
    {
        return Err(invalid("archive.resolved_markers needs a non-empty marker"));
    }
    if let Some(tz) = cfg.run.timezone.as_deref() {
        tz.parse::<chrono_tz::Tz>()
            .map_err(|_| invalid(format!("unknown timezone `{tz}`")))?;
    }

    let style = &cfg.style;
    for (key, height) in [
        ("style.header_row_height", style.header_row_height),
        ("style.data_row_height", style.data_row_height),
    ] {
        if !(height > 0.0 && height <= MAX_ROW_HEIGHT) {
            return Err(invalid(format!(
                "{key} must be in (0, {MAX_ROW_HEIGHT}]"
            )));
        }
    }
    for (key, value) in [
        ("style.max_column_width", style.max_column_width),
        ("style.column_padding", style.column_padding),
        ("style.width_sample_rows", style.width_sample_rows),
    ] {
        if value == 0 {
            return Err(invalid(format!("{key} must be >= 1")));
        }
    }
    if cfg.backup.keep == 0 {
        return Err(invalid("backup.keep must be >= 1"));
    }
    Ok(())
}

fn apply_file_config(base: &mut DigestConfig, raw: &str) -> Result<()> {
    let parsed: PartialDigestConfig =
        toml::from_str(raw).map_err(|err| invalid(format!("{err}")))?;
    if let Some(store) = parsed.store {
        base.store = store;
    }
    if let Some(archive) = parsed.archive {
        base.archive = archive;
    }
    if let Some(sort) = parsed.sort {
        base.sort = sort;
    }
    if let Some(style) = parsed.style {
        base.style = style;
    }
    if let Some(backup) = parsed.backup {
        base.backup = backup;
    }
    if let Some(run) = parsed.run {
        base.run = run;
    }
    if let Some(processes) = parsed.processes {
        base.processes = processes;
    }
    Ok(())
}

fn merge_file_config(base: &mut DigestConfig, paths: &DigestPaths) -> Result<()> {
    let path = &paths.config_file;
    if !path.exists() {
        return Ok(());
    }

    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    apply_file_config(base, &raw)
        .with_context(|| format!("failed to parse digest config {}", path.display()))
}

fn apply_overrides(cfg: &mut DigestConfig, lookup: impl Fn(&str) -> Option<String>) {
    cfg.store.archive_sheet = string_or(lookup("EXDIGEST_ARCHIVE_SHEET"), &cfg.store.archive_sheet);
    cfg.archive.resolved_markers =
        csv_or(lookup("EXDIGEST_RESOLVED_MARKERS"), &cfg.archive.resolved_markers);
    if let Some(tz) = lookup("EXDIGEST_TIMEZONE") {
        let tz = tz.trim();
        if !tz.is_empty() {
            cfg.run.timezone = Some(tz.to_string());
        }
    }
    cfg.run.pause_on_error = bool_or(lookup("EXDIGEST_PAUSE_ON_ERROR"), cfg.run.pause_on_error);
    cfg.backup.enabled = bool_or(lookup("EXDIGEST_BACKUP_ENABLED"), cfg.backup.enabled);
    cfg.backup.keep = u64_or(lookup("EXDIGEST_BACKUP_KEEP"), cfg.backup.keep as u64) as usize;
}

pub fn load_config(paths: &DigestPaths) -> Result<DigestConfig> {
    let mut cfg = DigestConfig::default();
    merge_file_config(&mut cfg, paths)?;
    apply_overrides(&mut cfg, |var| env::var(var).ok());
    normalize_names(&mut cfg);
    validate(&cfg)?;
    Ok(cfg)
}
