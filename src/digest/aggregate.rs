use crate::digest::config::ProcessConfig;
use crate::digest::paths::DigestPaths;
use crate::digest::schema::{BusinessKey, KEY_COLUMNS, RAW_TEXT_COLUMNS};
use crate::digest::source::read_source;
use crate::digest::table::{Cell, Table};
use crate::digest::warn::{self, ErrorContext};
use crate::error::DigestError;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One row of a daily file, reduced to the fields that form the business key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservationRecord {
    pub stage: String,
    pub category: String,
    pub description: String,
    pub detail: String,
    pub note: String,
}

impl ObservationRecord {
    pub fn into_key(self) -> BusinessKey {
        BusinessKey([
            self.stage,
            self.category,
            self.description,
            self.detail,
            self.note,
        ])
    }
}

#[derive(Debug, Clone)]
pub struct DailySource {
    pub path: PathBuf,
    pub stage: String,
}

#[derive(Debug, Clone, Default)]
pub struct DailyAggregate {
    /// Key columns plus a single count column named for the run date.
    pub table: Table,
    pub stage_order: Vec<String>,
    pub sources_read: usize,
    pub sources_skipped: usize,
    pub observations: usize,
}

/// Tag every row of `table` with `stage`; absent text fields read as `""`.
pub fn collect_observations(table: &Table, stage: &str) -> Vec<ObservationRecord> {
    let [category, description, detail, note] = RAW_TEXT_COLUMNS.map(|c| table.column_index(c));
    fn field(row: &[Cell], idx: Option<usize>) -> String {
        idx.map(|i| row[i].to_text()).unwrap_or_default()
    }

    table
        .rows()
        .iter()
        .map(|row| ObservationRecord {
            stage: stage.to_string(),
            category: field(row, category),
            description: field(row, description),
            detail: field(row, detail),
            note: field(row, note),
        })
        .collect()
}

/// Count records per business key; rows come out in key order.
pub fn summarize(records: Vec<ObservationRecord>, date_column: &str) -> Table {
    let mut counts: BTreeMap<BusinessKey, u64> = BTreeMap::new();
    for record in records {
        *counts.entry(record.into_key()).or_insert(0) += 1;
    }

    let mut table = Table::new(KEY_COLUMNS.iter().copied().chain([date_column]));
    for (key, count) in counts {
        let mut row: Vec<Cell> = key.0.into_iter().map(Cell::Text).collect();
        row.push(Cell::Number(count as f64));
        table.push_row(row);
    }
    table
}

pub fn aggregate_sources(
    process: &str,
    sources: &[DailySource],
    date_column: &str,
) -> DailyAggregate {
    let mut records = Vec::new();
    let mut out = DailyAggregate::default();

    for source in sources {
        let loaded = if source.path.as_os_str().is_empty() {
            Err(DigestError::SourceUnavailable {
                path: source.path.clone(),
                reason: "empty path".to_string(),
            })
        } else {
            read_source(&source.path)
        };
        match loaded {
            Ok(table) => {
                tracing::info!(
                    process,
                    stage = %source.stage,
                    path = %source.path.display(),
                    rows = table.len(),
                    "read daily source"
                );
                records.extend(collect_observations(&table, &source.stage));
                out.sources_read += 1;
            }
            Err(err) => {
                warn::emit_error(
                    &err,
                    ErrorContext {
                        stage: "aggregate",
                        action: "read-source",
                        process,
                        target: &source.path.display().to_string(),
                        reason: "source-skipped",
                    },
                );
                out.sources_skipped += 1;
            }
        }
    }

    if out.sources_read == 0 {
        return out;
    }

    out.observations = records.len();
    out.stage_order = sources
        .iter()
        .filter(|s| !s.stage.is_empty())
        .map(|s| s.stage.clone())
        .collect();
    out.table = summarize(records, date_column);
    out
}

pub fn aggregate_process(
    process: &ProcessConfig,
    paths: &DigestPaths,
    date_column: &str,
) -> DailyAggregate {
    let sources: Vec<DailySource> = process
        .sources
        .iter()
        .map(|s| DailySource {
            path: if s.path.trim().is_empty() {
                PathBuf::new()
            } else {
                paths.resolve(s.path.trim())
            },
            stage: s.stage.clone(),
        })
        .collect();
    aggregate_sources(&process.name, &sources, date_column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::schema::{CATEGORY, SOURCE_NOTE, STAGE};
    use std::fs;
    use tempfile::tempdir;

    fn record(stage: &str, category: &str, description: &str) -> ObservationRecord {
        ObservationRecord {
            stage: stage.to_string(),
            category: category.to_string(),
            description: description.to_string(),
            detail: String::new(),
            note: String::new(),
        }
    }

    #[test]
    fn summarize_counts_per_key_under_date_column() {
        let table = summarize(
            vec![
                record("A", "IT异常", "超时"),
                record("A", "IT异常", "超时"),
                record("A", "IT异常", "超时"),
                record("B", "网络异常", "断开"),
            ],
            "01/05",
        );
        assert_eq!(table.columns().last().map(String::as_str), Some("01/05"));
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(0, "01/05"), Some(&Cell::Number(3.0)));
        assert_eq!(table.cell(1, "01/05"), Some(&Cell::Number(1.0)));
        assert_eq!(table.text(1, STAGE), "B");
    }

    #[test]
    fn collect_observations_defaults_missing_fields() {
        let mut raw = Table::new([CATEGORY, "unrelated"]);
        raw.push_row(vec![Cell::text("IT异常"), Cell::Number(9.0)]);
        raw.push_row(vec![Cell::Empty, Cell::Empty]);

        let got = collect_observations(&raw, "stage-1");
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].category, "IT异常");
        assert_eq!(got[0].note, "");
        assert_eq!(got[1].category, "");
        assert_eq!(got[1].stage, "stage-1");
    }

    #[test]
    fn missing_sources_are_skipped_and_others_aggregate() {
        let tmp = tempdir().expect("tempdir");
        let present = tmp.path().join("present.csv");
        fs::write(
            &present,
            "异常类型,异常描述,异常信息,异常备注\nIT异常,超时,x,源备注\nIT异常,超时,x,源备注\n",
        )
        .expect("write");

        let sources = vec![
            DailySource {
                path: tmp.path().join("missing.xlsx"),
                stage: "A".to_string(),
            },
            DailySource {
                path: present,
                stage: "B".to_string(),
            },
            DailySource {
                path: PathBuf::new(),
                stage: String::new(),
            },
        ];
        let out = aggregate_sources("p", &sources, "12/25");
        assert_eq!(out.sources_read, 1);
        assert_eq!(out.sources_skipped, 2);
        assert_eq!(out.stage_order, ["A", "B"]);
        assert_eq!(out.table.len(), 1);
        assert_eq!(out.table.text(0, SOURCE_NOTE), "源备注");
        assert_eq!(out.table.cell(0, "12/25"), Some(&Cell::Number(2.0)));
    }

    #[test]
    fn nothing_readable_yields_empty_result() {
        let tmp = tempdir().expect("tempdir");
        let sources = vec![DailySource {
            path: tmp.path().join("missing.csv"),
            stage: "A".to_string(),
        }];
        let out = aggregate_sources("p", &sources, "12/25");
        assert!(out.table.is_empty());
        assert!(out.stage_order.is_empty());
        assert_eq!(out.sources_skipped, 1);
    }
}
