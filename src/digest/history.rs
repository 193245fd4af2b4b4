use crate::digest::schema::fixed_columns;
use crate::digest::table::Table;
use crate::digest::warn::{self, ErrorContext};
use crate::digest::workbook::read_all_sheets;
use crate::error::DigestError;
use std::path::Path;

/// Every table of the persisted workbook, in workbook order.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    sheets: Vec<(String, Table)>,
    pub existed: bool,
    pub unreadable: bool,
}

impl StoreSnapshot {
    pub fn from_sheets(sheets: Vec<(String, Table)>) -> Self {
        Self {
            sheets,
            existed: true,
            unreadable: false,
        }
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Remove and return the named table.
    pub fn take(&mut self, name: &str) -> Option<Table> {
        let idx = self.sheets.iter().position(|(n, _)| n == name)?;
        Some(self.sheets.remove(idx).1)
    }

    /// Whatever has not been taken yet.
    pub fn into_remaining(self) -> Vec<(String, Table)> {
        self.sheets
    }
}

/// Blank key and annotation cells become `""` so they never compare as numbers.
pub fn normalize_loaded(table: &mut Table) {
    for column in fixed_columns() {
        table.coerce_text(column);
    }
}

/// A missing store is an empty history; an unreadable one is reported and treated the same.
pub fn load_store(path: &Path) -> StoreSnapshot {
    if !path.exists() {
        return StoreSnapshot::default();
    }

    tracing::info!(path = %path.display(), "reading summary workbook");
    match read_all_sheets(path) {
        Ok(mut sheets) => {
            for (_, table) in &mut sheets {
                normalize_loaded(table);
            }
            StoreSnapshot::from_sheets(sheets)
        }
        Err(err) => {
            let err = DigestError::HistoryUnreadable {
                path: path.to_path_buf(),
                reason: format!("{err:#}"),
            };
            warn::emit_error(
                &err,
                ErrorContext {
                    stage: "history",
                    action: "load-store",
                    process: "all",
                    target: &path.display().to_string(),
                    reason: "history-treated-as-empty",
                },
            );
            StoreSnapshot {
                sheets: Vec::new(),
                existed: true,
                unreadable: true,
            }
        }
    }
}
