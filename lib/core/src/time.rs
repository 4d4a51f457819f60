//! Canonical datetime text and timezone helpers.
//!
//! Every boundary that exchanges datetimes as text (command arguments,
//! resolver answers, reminder listings) uses one format: weekday name, ISO
//! date and 24-hour time, e.g. `Thursday, 2023-04-06 18:00:00`, rendered in
//! the actor's IANA timezone.

use crate::error::TimeError;
use chrono::offset::LocalResult;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// The canonical datetime format, in chrono's strftime syntax.
pub const CANONICAL_FORMAT: &str = "%A, %Y-%m-%d %H:%M:%S";

/// Formats accepted when the weekday prefix is missing or wrong.
const LENIENT_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parses an IANA timezone name.
///
/// # Errors
///
/// Returns an error if the name is not a known zone.
pub fn parse_timezone(name: &str) -> Result<Tz, TimeError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| TimeError::UnknownTimezone {
            timezone: name.to_string(),
        })
}

/// Renders an instant in the canonical format in the given timezone.
#[must_use]
pub fn format_canonical(instant: DateTime<Utc>, tz: Tz) -> String {
    instant.with_timezone(&tz).format(CANONICAL_FORMAT).to_string()
}

/// Parses canonical datetime text interpreted in the given timezone.
///
/// The weekday prefix is checked when present; if it is missing or does not
/// match the date, the date and time alone are used. Ambiguous local times
/// (DST fold) resolve to the earlier instant.
///
/// # Errors
///
/// Returns an error if the text cannot be parsed or names a local time that
/// does not exist in `tz`.
pub fn parse_canonical(text: &str, tz: Tz) -> Result<DateTime<Utc>, TimeError> {
    let text = text.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    let naive = parse_naive(text)?;
    localize(naive, tz).ok_or_else(|| TimeError::NonexistentLocalTime {
        input: text.to_string(),
        timezone: tz.name().to_string(),
    })
}

/// Converts a wall-clock time in `tz` to an instant.
///
/// Returns `None` when the local time falls into a DST gap.
#[must_use]
pub fn localize(naive: NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => None,
    }
}

fn parse_naive(text: &str) -> Result<NaiveDateTime, TimeError> {
    let strict_err = match NaiveDateTime::parse_from_str(text, CANONICAL_FORMAT) {
        Ok(naive) => return Ok(naive),
        Err(e) => e,
    };

    let without_weekday = text.split_once(", ").map_or(text, |(_, rest)| rest).trim();
    LENIENT_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(without_weekday, format).ok())
        .ok_or_else(|| TimeError::InvalidDateTime {
            input: text.to_string(),
            reason: strict_err.to_string(),
        })
}
