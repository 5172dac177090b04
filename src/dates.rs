use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Days, NaiveDate};
use regex::Regex;
use thiserror::Error;

static DAYS_AGO_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)daysAgo$").unwrap());

/// Start of a report date range, in the reporting API's token vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartDate {
    Today,
    Yesterday,
    DaysAgo(u32),
    On(NaiveDate),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid start date {0:?}: expected today, yesterday, NdaysAgo or YYYY-MM-DD")]
pub struct StartDateError(pub String);

impl StartDate {
    /// Calendar date this token refers to, relative to `today`. Offsets
    /// past the calendar's range clamp to its earliest date.
    pub fn resolve(&self, today: NaiveDate) -> NaiveDate {
        let back = |n: u64| today.checked_sub_days(Days::new(n)).unwrap_or(NaiveDate::MIN);
        match self {
            StartDate::Today => today,
            StartDate::Yesterday => back(1),
            StartDate::DaysAgo(n) => back(u64::from(*n)),
            StartDate::On(date) => *date,
        }
    }
}

impl FromStr for StartDate {
    type Err = StartDateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "today" => return Ok(StartDate::Today),
            "yesterday" => return Ok(StartDate::Yesterday),
            _ => {}
        }
        if let Some(caps) = DAYS_AGO_RE.captures(s) {
            return caps[1]
                .parse::<u32>()
                .map(StartDate::DaysAgo)
                .map_err(|_| StartDateError(s.to_string()));
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(StartDate::On)
            .map_err(|_| StartDateError(s.to_string()))
    }
}

impl fmt::Display for StartDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartDate::Today => f.write_str("today"),
            StartDate::Yesterday => f.write_str("yesterday"),
            StartDate::DaysAgo(n) => write!(f, "{}daysAgo", n),
            StartDate::On(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_relative_tokens() {
        assert_eq!("7daysAgo".parse(), Ok(StartDate::DaysAgo(7)));
        assert_eq!("30daysAgo".parse(), Ok(StartDate::DaysAgo(30)));
        assert_eq!("today".parse(), Ok(StartDate::Today));
        assert_eq!("yesterday".parse(), Ok(StartDate::Yesterday));
    }

    #[test]
    fn parses_literal_date() {
        let d = NaiveDate::from_ymd_opt(2023, 2, 12).unwrap();
        assert_eq!("2023-02-12".parse(), Ok(StartDate::On(d)));
    }

    #[test]
    fn rejects_garbage() {
        assert!("7days".parse::<StartDate>().is_err());
        assert!("2023-13-01".parse::<StartDate>().is_err());
        assert!("".parse::<StartDate>().is_err());
        assert!("-3daysAgo".parse::<StartDate>().is_err());
    }

    #[test]
    fn display_matches_api_tokens() {
        for token in ["today", "yesterday", "7daysAgo", "2023-02-12"] {
            let parsed: StartDate = token.parse().unwrap();
            assert_eq!(parsed.to_string(), token);
        }
    }

    #[test]
    fn resolves_against_today() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        assert_eq!(
            StartDate::DaysAgo(7).resolve(today),
            NaiveDate::from_ymd_opt(2026, 10, 12).unwrap()
        );
        assert_eq!(
            StartDate::Yesterday.resolve(today),
            NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
        );
        assert_eq!(StartDate::Today.resolve(today), today);
    }

    #[test]
    fn huge_offset_clamps() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let start: StartDate = "4000000000daysAgo".parse().unwrap();
        assert_eq!(start.resolve(today), NaiveDate::MIN);
        assert_eq!(StartDate::Yesterday.resolve(NaiveDate::MIN), NaiveDate::MIN);
    }
}
