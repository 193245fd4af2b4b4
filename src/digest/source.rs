use crate::digest::table::{Cell, Table};
use crate::digest::workbook::{is_spreadsheet, normalize_headers, read_first_sheet};
use crate::error::DigestError;
use std::borrow::Cow;
use std::fs;
use std::path::Path;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

fn unavailable(path: &Path, reason: impl Into<String>) -> DigestError {
    DigestError::SourceUnavailable {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// UTF-8 (BOM stripped) first, GBK when the bytes are not valid UTF-8.
pub fn decode_text(bytes: &[u8]) -> Option<Cow<'_, str>> {
    if let Some(rest) = bytes.strip_prefix(UTF8_BOM) {
        return std::str::from_utf8(rest).ok().map(Cow::Borrowed);
    }
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Some(Cow::Borrowed(text));
    }
    encoding_rs::GBK.decode_without_bom_handling_and_without_replacement(bytes)
}

fn parse_delimited(text: &str) -> Result<Table, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers: Vec<String> = reader.headers()?.iter().map(ToOwned::to_owned).collect();
    let mut table = Table::new(normalize_headers(&headers));
    for record in reader.records() {
        let record = record?;
        let cells: Vec<Cell> = record
            .iter()
            .map(|field| {
                if field.is_empty() {
                    Cell::Empty
                } else {
                    Cell::text(field)
                }
            })
            .collect();
        if cells.iter().all(Cell::is_blank) {
            continue;
        }
        table.push_row(cells);
    }
    Ok(table)
}

fn read_delimited(path: &Path) -> Result<Table, DigestError> {
    let bytes = fs::read(path).map_err(|err| unavailable(path, err.to_string()))?;
    let text = decode_text(&bytes)
        .ok_or_else(|| unavailable(path, "content is neither UTF-8 nor GBK"))?;
    parse_delimited(&text).map_err(|err| unavailable(path, err.to_string()))
}

/// Load one daily source. Spreadsheets use their first sheet, anything else is read as CSV.
pub fn read_source(path: &Path) -> Result<Table, DigestError> {
    if !path.is_file() {
        return Err(unavailable(path, "file not found"));
    }
    if is_spreadsheet(path) {
        read_first_sheet(path).map_err(|err| unavailable(path, format!("{err:#}")))
    } else {
        read_delimited(path)
    }
}
