use crate::digest::merge::lay_out;
use crate::digest::table::Table;

/// Rows one process resolved during this run.
#[derive(Debug, Clone)]
pub struct ResolvedBatch {
    pub process: String,
    pub rows: Table,
}

/// Resolved rows collected across every process of a run, in merge order.
#[derive(Debug, Clone, Default)]
pub struct ArchiveAccumulator {
    batches: Vec<ResolvedBatch>,
}

impl ArchiveAccumulator {
    pub fn push(&mut self, process: &str, rows: Table) {
        if rows.is_empty() {
            return;
        }
        self.batches.push(ResolvedBatch {
            process: process.to_string(),
            rows,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.batches.iter().map(|b| b.rows.len()).sum()
    }
}

#[cfg(test)]
impl ArchiveAccumulator {
    pub fn batches(&self) -> &[ResolvedBatch] {
        &self.batches
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConsolidatedArchive {
    /// `None` when no archive existed and nothing was resolved.
    pub table: Option<Table>,
    pub appended: usize,
}

/// Existing archive rows first, then this run's resolved rows. Nothing is deduplicated:
/// resolved rows already left their process tables, so a rerun cannot append them twice.
pub fn consolidate(
    existing: Option<Table>,
    accumulator: ArchiveAccumulator,
) -> ConsolidatedArchive {
    if accumulator.is_empty() {
        return ConsolidatedArchive {
            table: existing,
            appended: 0,
        };
    }

    let appended = accumulator.row_count();
    let mut table = existing.unwrap_or_default();
    for batch in accumulator.batches {
        tracing::info!(
            process = %batch.process,
            rows = batch.rows.len(),
            "appending resolved rows to archive"
        );
        table.append(batch.rows);
    }
    let (table, _) = lay_out(&table, "archive");
    ConsolidatedArchive {
        table: Some(table),
        appended,
    }
}
