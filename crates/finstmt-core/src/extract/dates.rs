//! Date parsing for statement text.

use chrono::{Datelike, NaiveDate};

use crate::grammar::patterns::{DATE_ISO, DATE_MONTH_NAME, DATE_US, YEAR_TOKEN};
use crate::models::statement::Period;

/// Year context for dates printed without a year (`01/15`, `Jan 15`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct YearContext {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    fallback: Option<i32>,
}

impl YearContext {
    /// No context: only dates carrying a year parse.
    pub fn none() -> Self {
        Self::default()
    }

    /// Context from the statement period, falling back to the first
    /// four-digit year in `text`.
    pub fn from_statement(period: &Period, text: &str) -> Self {
        Self {
            start: period.start,
            end: period.end,
            fallback: first_year(text),
        }
    }

    /// Year for a yearless date in `month`.
    pub fn year_for(&self, month: u32) -> Option<i32> {
        match (self.start, self.end) {
            (start, Some(end)) => {
                if month > end.month() {
                    Some(start.map_or(end.year() - 1, |s| s.year()))
                } else {
                    Some(end.year())
                }
            }
            (Some(start), None) => {
                if month < start.month() {
                    Some(start.year() + 1)
                } else {
                    Some(start.year())
                }
            }
            (None, None) => self.fallback,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none() && self.fallback.is_none()
    }
}

/// First plausible four-digit year in `text`.
pub fn first_year(text: &str) -> Option<i32> {
    YEAR_TOKEN
        .captures(text)
        .and_then(|caps| caps[1].parse().ok())
}

/// Parse a single date token.
///
/// Accepts ISO, numeric US (month first) and month-name forms. Two-digit
/// years below 70 are 20xx, the rest 19xx.
pub fn parse_date(raw: &str, years: &YearContext) -> Option<NaiveDate> {
    let s = raw.trim();

    if let Some(caps) = DATE_ISO.captures(s) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Some(caps) = DATE_US.captures(s) {
        let month: u32 = caps[1].parse().ok()?;
        let day: u32 = caps[2].parse().ok()?;
        let year = match caps.get(3) {
            Some(y) => parse_year(y.as_str())?,
            None => years.year_for(month)?,
        };
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Some(caps) = DATE_MONTH_NAME.captures(s) {
        let month = month_number(&caps[1])?;
        let day: u32 = caps[2].parse().ok()?;
        let year = match caps.get(3) {
            Some(y) => y.as_str().parse().ok()?,
            None => years.year_for(month)?,
        };
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    None
}

/// Dates outside 1900-2100 are implausible on a statement.
pub fn is_plausible_date(date: &NaiveDate) -> bool {
    (1900..=2100).contains(&date.year())
}

fn parse_year(s: &str) -> Option<i32> {
    let year: i32 = s.parse().ok()?;
    Some(match s.len() {
        2 if year < 70 => 2000 + year,
        2 => 1900 + year,
        _ => year,
    })
}

fn month_number(abbrev: &str) -> Option<u32> {
    let month = match abbrev.to_ascii_lowercase().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_full_dates() {
        let none = YearContext::none();
        assert_eq!(parse_date("01/15/2024", &none), Some(date(2024, 1, 15)));
        assert_eq!(parse_date("1-5-24", &none), Some(date(2024, 1, 5)));
        assert_eq!(parse_date("2024-01-15", &none), Some(date(2024, 1, 15)));
        assert_eq!(parse_date("January 31, 2024", &none), Some(date(2024, 1, 31)));
        assert_eq!(parse_date("Sept. 5 2023", &none), Some(date(2023, 9, 5)));
        assert_eq!(parse_date("12/31/99", &none), Some(date(1999, 12, 31)));
    }

    #[test]
    fn test_yearless_needs_context() {
        assert_eq!(parse_date("01/15", &YearContext::none()), None);
        assert_eq!(parse_date("13/45/2024", &YearContext::none()), None);
    }

    #[test]
    fn test_year_from_period_end() {
        let (period, _) = Period::ordered(date(2023, 12, 15), date(2024, 1, 14));
        let years = YearContext::from_statement(&period, "");
        assert_eq!(parse_date("12/20", &years), Some(date(2023, 12, 20)));
        assert_eq!(parse_date("01/05", &years), Some(date(2024, 1, 5)));
        assert_eq!(parse_date("Jan 3", &years), Some(date(2024, 1, 3)));
    }

    #[test]
    fn test_year_from_text() {
        let years = YearContext::from_statement(&Period::default(), "Statement for 2022 activity");
        assert_eq!(parse_date("03/04", &years), Some(date(2022, 3, 4)));
        assert_eq!(first_year("no year here"), None);
    }

    #[test]
    fn test_plausible_range() {
        assert!(is_plausible_date(&date(2024, 1, 1)));
        assert!(!is_plausible_date(&date(1850, 1, 1)));
    }
}
