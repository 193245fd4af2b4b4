//! `MM/DD` observation column names. Columns carry no year, so ordering is only
//! meaningful within one calendar year.

use crate::error::DigestError;
use anyhow::Result;
use chrono::{Local, NaiveDate, Utc};

/// Leap year so that `02/29` parses.
const PARSE_YEAR: i32 = 2000;

pub fn format_date_column(date: NaiveDate) -> String {
    date.format("%m/%d").to_string()
}

pub fn today_column(timezone: Option<&str>) -> Result<String> {
    let today = match timezone {
        Some(name) => {
            let tz: chrono_tz::Tz = name
                .parse()
                .map_err(|_| DigestError::InvalidConfig(format!("unknown timezone `{name}`")))?;
            Utc::now().with_timezone(&tz).date_naive()
        }
        None => Local::now().date_naive(),
    };
    Ok(format_date_column(today))
}

/// Lenient parse used when ordering existing columns.
pub fn parse_date_column(name: &str) -> Option<NaiveDate> {
    let trimmed = name.trim();
    let (month, day) = trimmed.split_once('/')?;
    let month: u32 = month.parse().ok()?;
    let day: u32 = day.parse().ok()?;
    NaiveDate::from_ymd_opt(PARSE_YEAR, month, day)
}

/// Strict check for a column name we are about to create.
pub fn validate_date_column(raw: &str) -> Result<String, DigestError> {
    let trimmed = raw.trim();
    let well_formed = trimmed.len() == 5
        && trimmed.as_bytes()[2] == b'/'
        && trimmed
            .bytes()
            .enumerate()
            .all(|(i, b)| i == 2 || b.is_ascii_digit());
    if !well_formed || parse_date_column(trimmed).is_none() {
        return Err(DigestError::InvalidDateColumn(raw.to_string()));
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservationOrder {
    /// Dated columns newest first, then the unparsed ones in their incoming order.
    pub ordered: Vec<String>,
    pub unparsed: Vec<String>,
}

pub fn order_newest_first(columns: Vec<String>) -> ObservationOrder {
    let mut dated = Vec::new();
    let mut unparsed = Vec::new();
    for name in columns {
        match parse_date_column(&name) {
            Some(date) => dated.push((date, name)),
            None => unparsed.push(name),
        }
    }
    dated.sort_by(|a, b| b.0.cmp(&a.0));

    let mut ordered: Vec<String> = dated.into_iter().map(|(_, name)| name).collect();
    ordered.extend(unparsed.iter().cloned());
    ObservationOrder { ordered, unparsed }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn formats_zero_padded_month_and_day() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 5).expect("date");
        assert_eq!(format_date_column(date), "01/05");
    }

    #[test]
    fn orders_dates_newest_first() {
        let out = order_newest_first(names(&["12/20", "12/22", "12/21"]));
        assert_eq!(out.ordered, names(&["12/22", "12/21", "12/20"]));
        assert!(out.unparsed.is_empty());
    }

    #[test]
    fn unparsed_columns_trail_in_incoming_order() {
        let out = order_newest_first(names(&["owner note", "01/02", "13/40", "01/09"]));
        assert_eq!(out.ordered, names(&["01/09", "01/02", "owner note", "13/40"]));
        assert_eq!(out.unparsed, names(&["owner note", "13/40"]));
    }

    #[test]
    fn leap_day_parses() {
        assert!(parse_date_column("02/29").is_some());
        assert!(parse_date_column("02/30").is_none());
    }

    #[test]
    fn validate_requires_padded_form() {
        assert_eq!(validate_date_column(" 12/25 ").expect("valid"), "12/25");
        assert!(validate_date_column("1/5").is_err());
        assert!(validate_date_column("12-25").is_err());
        assert!(validate_date_column("00/10").is_err());
    }

    #[test]
    fn today_column_honours_timezone() {
        let col = today_column(Some("Asia/Shanghai")).expect("today");
        assert!(validate_date_column(&col).is_ok());
        assert!(today_column(Some("Nowhere/Land")).is_err());
    }
}
