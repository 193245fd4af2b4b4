//! Folds one day's aggregate into a process table, moves resolved rows out, and
//! puts what stays into its canonical row and column order.

use crate::digest::archive::ArchiveAccumulator;
use crate::digest::dates::order_newest_first;
use crate::digest::schema::{
    ANNOTATION_COLUMNS, BusinessKey, CATEGORY, KEY_COLUMNS, STAGE, STATUS, fixed_columns,
    is_fixed_column,
};
use crate::digest::table::{Cell, Table};
use crate::digest::warn::{self, ErrorContext, WarnEvent};
use crate::error::DigestError;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub struct MergeRules<'a> {
    pub resolved_markers: &'a [String],
    pub pinned_category: &'a str,
}

impl MergeRules<'_> {
    /// Substring match, so a status with extra commentary around a marker still counts.
    pub fn is_resolved(&self, status: &str) -> bool {
        self.resolved_markers
            .iter()
            .filter(|m| !m.is_empty())
            .any(|m| status.contains(m.as_str()))
    }

    fn is_pinned(&self, category: &str) -> bool {
        category.trim() == self.pinned_category
    }
}

#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    /// `None` when there was neither history nor a daily observation.
    pub table: Option<Table>,
    pub archived_rows: usize,
    pub collapsed_duplicates: usize,
    pub unparsed_columns: Vec<String>,
}

fn key_positions(table: &mut Table) -> [usize; 5] {
    KEY_COLUMNS.map(|c| table.ensure_column(c))
}

fn normalize_keys(table: &mut Table) {
    key_positions(table);
    for column in KEY_COLUMNS {
        table.coerce_text(column);
    }
}

fn backfill_annotations(table: &mut Table) {
    for column in ANNOTATION_COLUMNS {
        table.ensure_column(column);
        table.coerce_text(column);
    }
}

/// Keep the first row per key, filling its blank cells from later duplicates.
fn collapse_duplicates(table: Table, process: &str) -> (Table, usize) {
    let mut table = table;
    let keys = key_positions(&mut table);
    let rows = std::mem::take(table.rows_mut());

    let mut out = Table::new(table.columns().to_vec());
    let mut seen: HashMap<BusinessKey, usize> = HashMap::new();
    let mut collapsed = 0usize;
    for row in rows {
        let key = BusinessKey(keys.map(|idx| row[idx].to_text()));
        if let Some(&at) = seen.get(&key) {
            let kept = &mut out.rows_mut()[at];
            for (slot, cell) in kept.iter_mut().zip(row) {
                if slot.is_blank() && !cell.is_blank() {
                    *slot = cell;
                }
            }
            collapsed += 1;
        } else {
            seen.insert(key, out.len());
            out.push_row(row);
        }
    }

    if collapsed > 0 {
        warn::emit(WarnEvent {
            code: "DUPLICATE_KEY",
            stage: "merge",
            action: "collapse-duplicates",
            process,
            target: &collapsed.to_string(),
            reason: "duplicate-business-key-in-history",
            err: "rows folded into first occurrence",
        });
    }
    (out, collapsed)
}

/// Full outer join on the business key. History keeps its row order, unseen daily
/// keys follow. A daily column that already exists is replaced wholesale.
fn outer_join(prior: Table, daily: &Table) -> Table {
    let mut joined = prior;
    let mut daily = daily.clone();
    let daily_keys = key_positions(&mut daily);

    let value_columns: Vec<(usize, usize)> = daily
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, name)| !KEY_COLUMNS.contains(&name.as_str()))
        .map(|(idx, name)| (idx, joined.ensure_column(name)))
        .collect();
    let joined_keys = key_positions(&mut joined);

    for row in joined.rows_mut() {
        for (_, target) in &value_columns {
            row[*target] = Cell::Empty;
        }
    }

    let mut index: HashMap<BusinessKey, usize> = (0..joined.len())
        .map(|r| (joined.key_at(r, &joined_keys), r))
        .collect();
    let width = joined.columns().len();

    for r in 0..daily.len() {
        let key = daily.key_at(r, &daily_keys);
        let source = &daily.rows()[r];
        match index.get(&key).copied() {
            Some(at) => {
                let target = &mut joined.rows_mut()[at];
                for (from, to) in &value_columns {
                    target[*to] = source[*from].clone();
                }
            }
            None => {
                let mut row = vec![Cell::Empty; width];
                for (slot, value) in joined_keys.iter().zip(key.0.iter()) {
                    row[*slot] = Cell::Text(value.clone());
                }
                for (from, to) in &value_columns {
                    row[*to] = source[*from].clone();
                }
                index.insert(key, joined.len());
                joined.push_row(row);
            }
        }
    }
    joined
}

/// Pinned category first, then declared stage order; unknown stages go last.
/// The sort is stable, so anything tied keeps its incoming order.
pub fn sort_active(table: &mut Table, stage_order: &[String], rules: &MergeRules<'_>) {
    let (Some(stage_idx), Some(category_idx)) =
        (table.column_index(STAGE), table.column_index(CATEGORY))
    else {
        return;
    };

    let mut rank: HashMap<&str, usize> = HashMap::new();
    for (pos, stage) in stage_order.iter().enumerate() {
        rank.entry(stage.as_str()).or_insert(pos);
    }
    let unknown = stage_order.len();

    table.rows_mut().sort_by_cached_key(|row| {
        let pinned = if rules.is_pinned(&row[category_idx].to_text()) {
            0u8
        } else {
            1u8
        };
        let stage = rank
            .get(row[stage_idx].to_text().as_str())
            .copied()
            .unwrap_or(unknown);
        (pinned, stage)
    });
}

/// Key columns, annotation columns, then observation columns newest first.
pub fn lay_out(table: &Table, process: &str) -> (Table, Vec<String>) {
    let rest: Vec<String> = table
        .columns()
        .iter()
        .filter(|c| !is_fixed_column(c))
        .cloned()
        .collect();
    let order = order_newest_first(rest);
    for name in &order.unparsed {
        warn::emit_error(
            &DigestError::DateColumnParse(name.clone()),
            ErrorContext {
                stage: "merge",
                action: "order-columns",
                process,
                target: name,
                reason: "column-kept-last",
            },
        );
    }

    let mut columns: Vec<String> = fixed_columns().map(str::to_string).collect();
    columns.extend(order.ordered);
    (table.select(&columns), order.unparsed)
}

/// Merge `daily` into `prior` for one process, pushing resolved rows onto `archive`.
pub fn merge_process(
    process: &str,
    daily: Table,
    prior: Option<Table>,
    stage_order: &[String],
    rules: &MergeRules<'_>,
    archive: &mut ArchiveAccumulator,
) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();
    let mut daily = daily;
    if !daily.is_empty() {
        normalize_keys(&mut daily);
    }

    let mut merged = match prior {
        None => {
            if daily.is_empty() {
                return outcome;
            }
            daily
        }
        Some(mut prior) => {
            normalize_keys(&mut prior);
            let (prior, collapsed) = collapse_duplicates(prior, process);
            outcome.collapsed_duplicates = collapsed;
            if daily.is_empty() {
                prior
            } else {
                outer_join(prior, &daily)
            }
        }
    };
    backfill_annotations(&mut merged);

    let status_idx = merged.ensure_column(STATUS);
    let resolved = merged.split_off_where(|row| rules.is_resolved(&row[status_idx].to_text()));
    if !resolved.is_empty() {
        tracing::info!(process, rows = resolved.len(), "moving resolved rows to archive");
        outcome.archived_rows = resolved.len();
        archive.push(process, resolved);
    }

    sort_active(&mut merged, stage_order, rules);
    let (table, unparsed) = lay_out(&merged, process);
    outcome.unparsed_columns = unparsed;
    outcome.table = Some(table);
    outcome
}
