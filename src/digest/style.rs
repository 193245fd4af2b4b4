use crate::digest::config::StyleConfig;
use crate::digest::table::Table;

/// Byte length under GBK, the width measure the summary workbook has always used.
/// `None` when the text has characters GBK cannot represent.
pub fn gbk_len(text: &str) -> Option<usize> {
    let (encoded, _, had_errors) = encoding_rs::GBK.encode(text);
    if had_errors {
        None
    } else {
        Some(encoded.len())
    }
}

/// Widest of the header and the first `width_sample_rows` values, padded and capped.
pub fn column_widths(table: &Table, style: &StyleConfig) -> Vec<f64> {
    table
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let mut widest = gbk_len(name).unwrap_or(name.len());
            for row in table.rows().iter().take(style.width_sample_rows) {
                if let Some(len) = gbk_len(&row[idx].to_text()) {
                    widest = widest.max(len);
                }
            }
            (widest + style.column_padding).min(style.max_column_width) as f64
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::table::Cell;

    #[test]
    fn gbk_len_counts_two_bytes_per_hanzi() {
        assert_eq!(gbk_len("abc"), Some(3));
        assert_eq!(gbk_len("异常"), Some(4));
        assert_eq!(gbk_len("🚀"), None);
    }

    #[test]
    fn widths_pad_and_cap() {
        let style = StyleConfig::default();
        let mut table = Table::new(["环节", "n", "long"]);
        table.push_row(vec![
            Cell::text("短"),
            Cell::Number(12345.0),
            Cell::text("x".repeat(200)),
        ]);
        table.push_row(vec![Cell::text("🚀🚀🚀🚀🚀🚀🚀🚀")]);

        let widths = column_widths(&table, &style);
        assert_eq!(widths, vec![8.0, 9.0, 60.0]);
    }

    #[test]
    fn only_sampled_rows_count() {
        let style = StyleConfig {
            width_sample_rows: 1,
            ..StyleConfig::default()
        };
        let mut table = Table::new(["a"]);
        table.push_row(vec![Cell::text("bb")]);
        table.push_row(vec![Cell::text("cccccccccc")]);
        assert_eq!(column_widths(&table, &style), vec![6.0]);
    }
}
