//! Utility functions for the statement_forecast crate

/// Normalize a raw header: trim, lower-case, spaces to underscores.
///
/// `" Total Revenue "` becomes `"total_revenue"`.
pub fn normalize_column_name(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

pub mod date_parser {
    //! Period-end date parsing

    use crate::error::{PipelineError, Result};
    use chrono::{NaiveDate, NaiveDateTime};

    const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];
    const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

    /// Parse a period-end date in one of the accepted layouts
    pub fn parse_date(raw: &str) -> Result<NaiveDate> {
        let raw = raw.trim();

        for format in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
                return Ok(date);
            }
        }
        for format in DATETIME_FORMATS {
            if let Ok(datetime) = NaiveDateTime::parse_from_str(raw, format) {
                return Ok(datetime.date());
            }
        }

        Err(PipelineError::MalformedData(format!(
            "Unrecognised date: {:?}",
            raw
        )))
    }

    /// Canonical `YYYY-MM-DD` rendering
    pub fn format_date(date: NaiveDate) -> String {
        date.format("%Y-%m-%d").to_string()
    }
}
