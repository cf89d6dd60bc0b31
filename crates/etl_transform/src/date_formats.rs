//! Date format detection, narrowed from the teacher's constraint-based type
//! inference engine to the one coercion this system needs: normalise any of
//! a handful of common date spellings to `YYYY-MM-DD`.

use chrono::NaiveDate;

pub struct DateFormatSpec {
    pub pattern: &'static str,
}

/// Candidate formats, ISO first so the common case short-circuits fastest.
pub const DATE_FORMATS: &[DateFormatSpec] = &[
    DateFormatSpec { pattern: "%Y-%m-%d" },
    DateFormatSpec { pattern: "%Y/%m/%d" },
    DateFormatSpec { pattern: "%d/%m/%Y" },
    DateFormatSpec { pattern: "%d-%m-%Y" },
    DateFormatSpec { pattern: "%d.%m.%Y" },
    DateFormatSpec { pattern: "%m/%d/%Y" },
    DateFormatSpec { pattern: "%m-%d-%Y" },
];

/// Try each candidate format in order, returning the first that parses.
pub fn normalise_date(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    for spec in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, spec.pattern) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }
    None
}
