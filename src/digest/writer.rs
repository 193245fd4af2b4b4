use crate::digest::config::StyleConfig;
use crate::digest::style::column_widths;
use crate::digest::table::{Cell, Table};
use crate::error::DigestError;
use anyhow::{Context, Result};
use rust_xlsxwriter::{Format, FormatAlign, Workbook};
use std::fs;
use std::io::Write;
use std::path::Path;

fn write_sheet(
    workbook: &mut Workbook,
    name: &str,
    table: &Table,
    style: &StyleConfig,
) -> Result<()> {
    let format = Format::new()
        .set_align(FormatAlign::VerticalCenter)
        .set_text_wrap();
    let sheet = workbook.add_worksheet();
    sheet
        .set_name(name)
        .with_context(|| format!("invalid sheet name `{name}`"))?;

    for (col, header) in table.columns().iter().enumerate() {
        sheet.write_string_with_format(0, u16::try_from(col)?, header, &format)?;
    }
    sheet.set_row_height(0, style.header_row_height)?;

    for (idx, row) in table.rows().iter().enumerate() {
        let r = u32::try_from(idx + 1)?;
        sheet.set_row_height(r, style.data_row_height)?;
        for (col, cell) in row.iter().enumerate() {
            let c = u16::try_from(col)?;
            match cell {
                Cell::Empty => sheet.write_blank(r, c, &format)?,
                Cell::Text(s) if s.is_empty() => sheet.write_blank(r, c, &format)?,
                Cell::Text(s) => sheet.write_string_with_format(r, c, s, &format)?,
                Cell::Number(v) => sheet.write_number_with_format(r, c, *v, &format)?,
                Cell::Bool(v) => sheet.write_boolean_with_format(r, c, *v, &format)?,
            };
        }
    }

    for (col, width) in column_widths(table, style).into_iter().enumerate() {
        sheet.set_column_width(u16::try_from(col)?, width)?;
    }
    Ok(())
}

/// Build the whole workbook in memory; nothing touches the destination yet.
pub fn render_workbook(sheets: &[(String, Table)], style: &StyleConfig) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    for (name, table) in sheets {
        write_sheet(&mut workbook, name, table, style)
            .with_context(|| format!("failed to render sheet `{name}`"))?;
    }
    let bytes = workbook
        .save_to_buffer()
        .context("failed to serialize summary workbook")?;
    Ok(bytes)
}

/// Write through a temp file in the same directory, then rename over `path`.
pub fn persist_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let fail = |reason: String| DigestError::WriteFailed {
        path: path.to_path_buf(),
        reason,
    };
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create {}", parent.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|err| fail(err.to_string()))?;
    tmp.write_all(bytes).map_err(|err| fail(err.to_string()))?;
    tmp.as_file()
        .sync_all()
        .map_err(|err| fail(err.to_string()))?;
    tmp.persist(path).map_err(|err| fail(err.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::workbook::read_all_sheets;
    use tempfile::tempdir;

    fn sample() -> Table {
        let mut t = Table::new(["环节", "异常修复", "12/25"]);
        t.push_row(vec![Cell::text("A"), Cell::text(""), Cell::Number(3.0)]);
        t.push_row(vec![Cell::text("B"), Cell::text("已修复"), Cell::Empty]);
        t
    }

    #[test]
    fn rendered_workbook_reads_back_in_sheet_order() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("out").join("summary.xlsx");
        let sheets = vec![
            ("自营采购退货".to_string(), sample()),
            ("问题归档".to_string(), Table::new(["环节"])),
        ];
        let bytes = render_workbook(&sheets, &StyleConfig::default()).expect("render");
        persist_atomically(&path, &bytes).expect("persist");

        let back = read_all_sheets(&path).expect("read back");
        let names: Vec<&str> = back.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["自营采购退货", "问题归档"]);

        let table = &back[0].1;
        assert_eq!(table.columns(), ["环节", "异常修复", "12/25"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(0, "12/25"), Some(&Cell::Number(3.0)));
        assert_eq!(table.cell(0, "异常修复"), Some(&Cell::Empty));
        assert_eq!(table.text(1, "异常修复"), "已修复");
        assert!(back[1].1.is_empty());
    }

    #[test]
    fn invalid_sheet_name_fails_before_any_write() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("summary.xlsx");
        let sheets = vec![("bad[name]".to_string(), sample())];
        assert!(render_workbook(&sheets, &StyleConfig::default()).is_err());
        assert!(!path.exists());
    }
}
