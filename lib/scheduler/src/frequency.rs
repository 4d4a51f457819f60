//! Frequency expressions.
//!
//! The canonical grammar is `once` or `every [N] <unit>` with unit one of
//! minute, hour, day, week, month or year (singular or plural). A missing
//! `N` means 1. Matching is case-insensitive and ignores surrounding
//! whitespace.

use crate::error::RecurrenceError;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Smallest allowed interval for minute-based frequencies.
pub const MIN_MINUTE_INTERVAL: u32 = 5;

static EVERY: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^every\s?(\d*)\s(minutes?|hours?|days?|weeks?|months?|years?)$").ok()
});

/// Calendar or clock unit of a recurring frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl TimeUnit {
    fn from_word(word: &str) -> Option<Self> {
        match word.trim_end_matches('s') {
            "minute" => Some(Self::Minute),
            "hour" => Some(Self::Hour),
            "day" => Some(Self::Day),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            "year" => Some(Self::Year),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }
}

/// A parsed frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    /// Fires once; no next occurrence.
    Once,
    /// Fires every `count` units.
    Every { count: u32, unit: TimeUnit },
}

impl Frequency {
    /// Returns true if the frequency has occurrences after the first.
    #[must_use]
    pub fn is_recurring(&self) -> bool {
        matches!(self, Self::Every { .. })
    }

    /// Returns true if `expr` is the one-off frequency.
    #[must_use]
    pub fn is_once(expr: &str) -> bool {
        expr.trim().eq_ignore_ascii_case("once")
    }
}

impl FromStr for Frequency {
    type Err = RecurrenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        if normalized == "once" {
            return Ok(Self::Once);
        }

        let parse_err = |reason: &str| RecurrenceError::Parse {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let pattern = EVERY
            .as_ref()
            .ok_or_else(|| parse_err("frequency grammar unavailable"))?;
        let captures = pattern
            .captures(&normalized)
            .ok_or_else(|| parse_err("expected 'once' or 'every [N] <unit>'"))?;

        let count = match captures.get(1).map_or("", |m| m.as_str()) {
            "" => 1,
            digits => digits
                .parse::<u32>()
                .map_err(|_| parse_err("interval out of range"))?,
        };
        if count == 0 {
            return Err(parse_err("interval must be at least 1"));
        }

        let unit = captures
            .get(2)
            .and_then(|m| TimeUnit::from_word(m.as_str()))
            .ok_or_else(|| parse_err("unknown unit"))?;

        if unit == TimeUnit::Minute && count < MIN_MINUTE_INTERVAL {
            return Err(RecurrenceError::TooFrequent {
                input: s.to_string(),
            });
        }

        Ok(Self::Every { count, unit })
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Once => f.write_str("once"),
            Self::Every { count: 1, unit } => write!(f, "every {}", unit.as_str()),
            Self::Every { count, unit } => write!(f, "every {count} {}s", unit.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Result<Frequency, RecurrenceError> {
        s.parse()
    }

    #[test]
    fn once_is_terminal() {
        assert_eq!(parse(" Once ").unwrap(), Frequency::Once);
        assert!(!Frequency::Once.is_recurring());
    }

    #[test]
    fn missing_count_defaults_to_one() {
        assert_eq!(
            parse("every day").unwrap(),
            Frequency::Every {
                count: 1,
                unit: TimeUnit::Day
            }
        );
    }

    #[test]
    fn explicit_count_and_plural_unit() {
        assert_eq!(
            parse("Every 2 Weeks").unwrap(),
            Frequency::Every {
                count: 2,
                unit: TimeUnit::Week
            }
        );
        assert_eq!(
            parse("every5 hours").unwrap(),
            Frequency::Every {
                count: 5,
                unit: TimeUnit::Hour
            }
        );
    }

    #[test]
    fn minute_floor() {
        assert!(parse("every 3 minutes").unwrap_err().is_too_frequent());
        assert!(parse("every minute").unwrap_err().is_too_frequent());
        assert!(parse("every 5 minutes").is_ok());
    }

    #[test]
    fn free_text_is_parse_error() {
        let err = parse("every weekday until june").unwrap_err();
        assert!(matches!(err, RecurrenceError::Parse { ref input, .. } if input == "every weekday until june"));
    }

    #[test]
    fn zero_interval_is_parse_error() {
        assert!(matches!(
            parse("every 0 days"),
            Err(RecurrenceError::Parse { .. })
        ));
    }

    #[test]
    fn display_is_canonical() {
        assert_eq!(parse("every day").unwrap().to_string(), "every day");
        assert_eq!(parse("every 3 months").unwrap().to_string(), "every 3 months");
    }
}
