use crate::digest::schema::BusinessKey;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Empty cells and empty strings are both blank.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(s) => s.clone(),
            Self::Number(v) => format_number(*v),
            Self::Bool(true) => "TRUE".to_string(),
            Self::Bool(false) => "FALSE".to_string(),
        }
    }
}

pub type Row = Vec<Cell>;

/// Named columns plus rows aligned to them. Every row is exactly as wide as `columns`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut Vec<Row> {
        &mut self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }


    /// Append `name` as a blank column unless it is already present.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(Cell::Empty);
        }
        self.columns.len() - 1
    }

    pub fn push_row(&mut self, mut row: Row) {
        row.resize(self.columns.len(), Cell::Empty);
        self.rows.push(row);
    }

    /// Rewrite every cell of `column` as text; blanks become `""`.
    pub fn coerce_text(&mut self, column: &str) {
        let Some(idx) = self.column_index(column) else {
            return;
        };
        for row in &mut self.rows {
            let text = row[idx].to_text();
            row[idx] = Cell::Text(text);
        }
    }

    pub fn key_at(&self, row: usize, indices: &[usize; 5]) -> BusinessKey {
        let cells = &self.rows[row];
        BusinessKey(indices.map(|idx| cells[idx].to_text()))
    }

    /// Move every row matching `pred` into a new table with the same columns.
    pub fn split_off_where(&mut self, mut pred: impl FnMut(&Row) -> bool) -> Table {
        let mut taken = Table::new(self.columns.clone());
        let (matched, kept): (Vec<Row>, Vec<Row>) =
            std::mem::take(&mut self.rows).into_iter().partition(|row| pred(row));
        self.rows = kept;
        taken.rows = matched;
        taken
    }

    /// Reorder columns to `order`; names missing from `self` come back blank.
    pub fn select(&self, order: &[String]) -> Table {
        let mapping: Vec<Option<usize>> = order.iter().map(|c| self.column_index(c)).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                mapping
                    .iter()
                    .map(|idx| idx.map(|i| row[i].clone()).unwrap_or_default())
                    .collect()
            })
            .collect();
        Table {
            columns: order.to_vec(),
            rows,
        }
    }

    /// Append `other`'s rows, aligning by column name and adding its unseen columns at the end.
    pub fn append(&mut self, other: Table) {
        let mapping: Vec<usize> = other
            .columns
            .iter()
            .map(|c| self.ensure_column(c))
            .collect();
        let width = self.columns.len();
        for row in other.rows {
            let mut aligned = vec![Cell::Empty; width];
            for (cell, idx) in row.into_iter().zip(&mapping) {
                aligned[*idx] = cell;
            }
            self.rows.push(aligned);
        }
    }
}

/// Lookups by column name, for assertions.
#[cfg(test)]
impl Table {
    pub fn cell(&self, row: usize, column: &str) -> Option<&Cell> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    pub fn text(&self, row: usize, column: &str) -> String {
        self.cell(row, column).map(Cell::to_text).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::{Cell, Table};

    fn sample() -> Table {
        let mut t = Table::new(["a", "b"]);
        t.push_row(vec![Cell::text("x"), Cell::Number(2.0)]);
        t.push_row(vec![Cell::text("y")]);
        t
    }

    #[test]
    fn numbers_render_without_trailing_zero() {
        assert_eq!(Cell::Number(3.0).to_text(), "3");
        assert_eq!(Cell::Number(2.5).to_text(), "2.5");
        assert_eq!(Cell::Empty.to_text(), "");
    }

    #[test]
    fn push_row_pads_short_rows() {
        let t = sample();
        assert_eq!(t.rows()[1], vec![Cell::text("y"), Cell::Empty]);
    }

    #[test]
    fn coerce_text_turns_blanks_into_empty_strings() {
        let mut t = sample();
        t.coerce_text("b");
        assert_eq!(t.cell(0, "b"), Some(&Cell::text("2")));
        assert_eq!(t.cell(1, "b"), Some(&Cell::text("")));
    }

    #[test]
    fn append_unions_columns_by_name() {
        let mut left = sample();
        let mut right = Table::new(["c", "a"]);
        right.push_row(vec![Cell::Number(1.0), Cell::text("z")]);
        left.append(right);

        assert_eq!(left.columns(), ["a", "b", "c"]);
        assert_eq!(left.len(), 3);
        assert_eq!(
            left.rows()[2],
            vec![Cell::text("z"), Cell::Empty, Cell::Number(1.0)]
        );
        assert_eq!(left.rows()[0][2], Cell::Empty);
    }

    #[test]
    fn select_reorders_and_fills_missing() {
        let t = sample();
        let order = vec!["b".to_string(), "zz".to_string(), "a".to_string()];
        let out = t.select(&order);
        assert_eq!(
            out.rows()[0],
            vec![Cell::Number(2.0), Cell::Empty, Cell::text("x")]
        );
    }

    #[test]
    fn split_off_where_preserves_order_on_both_sides() {
        let mut t = Table::new(["n"]);
        for n in 0..5 {
            t.push_row(vec![Cell::Number(n as f64)]);
        }
        let odd = t.split_off_where(|row| matches!(row[0], Cell::Number(v) if v as i64 % 2 == 1));
        assert_eq!(odd.rows(), [vec![Cell::Number(1.0)], vec![Cell::Number(3.0)]]);
        assert_eq!(t.len(), 3);
        assert_eq!(t.rows()[2], vec![Cell::Number(4.0)]);
    }
}
