use chrono::{Datelike, NaiveDate, NaiveDateTime};

/// Formats tried in order. Day/month ambiguity resolves US-first for slashes, which is
/// how the supported brokers export.
pub const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d",
    "%d.%m.%y",
    "%d.%m.%Y",
    "%m.%d.%y",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%d/%m/%y",
    "%m/%d/%y",
    "%d-%m-%Y",
];

/// Parsed years outside this range are treated as a format mismatch
const PLAUSIBLE_YEARS: std::ops::RangeInclusive<i32> = 1980..=2100;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("unrecognised date '{0}'")]
pub struct InvalidDate(pub String);

#[derive(Debug, Clone)]
pub struct DateParser {
    formats: Vec<&'static str>,
}

impl Default for DateParser {
    fn default() -> Self {
        DateParser {
            formats: DATE_FORMATS.to_vec(),
        }
    }
}

impl DateParser {
    /// Parser trying only `formats`, in order
    #[allow(dead_code)]
    pub fn with_formats(formats: Vec<&'static str>) -> Self {
        DateParser { formats }
    }

    pub fn parse(&self, value: &str) -> Result<NaiveDate, InvalidDate> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(InvalidDate(value.to_string()));
        }
        self.formats
            .iter()
            .filter_map(|fmt| parse_with(trimmed, fmt))
            .find(|date| PLAUSIBLE_YEARS.contains(&date.year()))
            .ok_or_else(|| InvalidDate(value.to_string()))
    }
}

fn parse_with(value: &str, fmt: &str) -> Option<NaiveDate> {
    if fmt.contains("%H") {
        NaiveDateTime::parse_from_str(value, fmt).ok().map(|dt| dt.date())
    } else {
        NaiveDate::parse_from_str(value, fmt).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_broker_formats() {
        let parser = DateParser::default();
        assert_eq!(parser.parse("2023-09-18 10:39:42").unwrap(), ymd(2023, 9, 18));
        assert_eq!(parser.parse("2024-12-19").unwrap(), ymd(2024, 12, 19));
        assert_eq!(parser.parse("19.12.24").unwrap(), ymd(2024, 12, 19));
        assert_eq!(parser.parse("19.12.2024").unwrap(), ymd(2024, 12, 19));
        assert_eq!(parser.parse(" 12/19/2024 ").unwrap(), ymd(2024, 12, 19));
        assert_eq!(parser.parse("19/12/2024").unwrap(), ymd(2024, 12, 19));
        assert_eq!(parser.parse("19/12/24").unwrap(), ymd(2024, 12, 19));
        assert_eq!(parser.parse("19-12-2024").unwrap(), ymd(2024, 12, 19));
    }

    #[test]
    fn ambiguous_slash_dates_read_month_first() {
        let parser = DateParser::default();
        assert_eq!(parser.parse("05/03/2024").unwrap(), ymd(2024, 5, 3));
    }

    #[test]
    fn rejects_unparseable_dates() {
        let parser = DateParser::default();
        assert_eq!(parser.parse("not a date"), Err(InvalidDate("not a date".to_string())));
        assert!(parser.parse("").is_err());
        assert!(parser.parse("31/31/2024").is_err());
    }

    #[test]
    fn custom_format_order() {
        let parser = DateParser::with_formats(vec!["%d/%m/%Y", "%m/%d/%Y"]);
        assert_eq!(parser.parse("05/03/2024").unwrap(), ymd(2024, 3, 5));
    }
}
