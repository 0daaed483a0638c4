//! Upstream engine adapters.
//!
//! Every adapter implements [`Engine`]: it turns an [`EngineRequest`] into
//! one outbound call and returns the hits and suggestions it found. Scoring,
//! deduplication and time budgets are handled by the caller.

pub mod brave;
pub mod json_api;
pub mod traits;

pub use brave::BraveEngine;
pub use json_api::JsonApiEngine;
pub use traits::{Engine, EngineError, EngineRequest};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Best-effort parse of the date formats upstream APIs commonly return.
pub(crate) fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn parses_common_date_shapes() {
        let rfc = parse_published("2024-03-01T10:20:30+02:00").unwrap();
        assert_eq!(rfc.hour(), 8);

        let naive = parse_published("2024-03-01T10:20:30").unwrap();
        assert_eq!(naive.minute(), 20);

        let date = parse_published("2024-03-01").unwrap();
        assert_eq!(date.day(), 1);

        assert!(parse_published("3 days ago").is_none());
        assert!(parse_published("").is_none());
    }
}
