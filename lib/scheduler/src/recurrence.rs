//! Recurrence calculation.
//!
//! Occurrence `k` of a series is always computed from the original anchor
//! (`anchor + k * step`), never from the previous occurrence, so month-end
//! clamping does not drift: a series anchored on January 31 fires on
//! February 28 (or 29), March 31, April 30 and so on.
//!
//! Minutes and hours are absolute durations. Days, weeks, months and years
//! are calendar steps in the actor's timezone, so "every day at 09:00" stays
//! at 09:00 local time across DST changes. When the stepped local time does
//! not exist (DST gap), the absolute offset from the anchor is used instead.
//!
//! End bounds are inclusive: an occurrence exactly at the end is produced.

use crate::error::RecurrenceError;
use crate::frequency::{Frequency, TimeUnit};
use async_trait::async_trait;
use chime_core::{format_canonical, localize, parse_canonical};
use chrono::{DateTime, Days, Duration, Months, Utc};
use chrono_tz::Tz;

/// How far to expand a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expansion {
    /// Only the next occurrence after the anchor.
    Lazy,
    /// Every occurrence after the anchor up to and including `end`.
    Eager { end: DateTime<Utc> },
}

/// Fallback for frequencies outside the canonical grammar.
///
/// Receives the frequency text and the anchor rendered in the canonical
/// format in `timezone`, and answers with the next occurrence in the same
/// format.
#[async_trait]
pub trait OccurrenceResolver: Send + Sync {
    /// Infers the next occurrence.
    async fn resolve_next(
        &self,
        frequency: &str,
        anchor: &str,
        timezone: &str,
    ) -> Result<String, RecurrenceError>;
}

/// Computes occurrences of a frequency in one timezone.
#[derive(Debug, Clone, Copy)]
pub struct RecurrenceCalculator {
    tz: Tz,
    max_occurrences: usize,
}

impl RecurrenceCalculator {
    /// Creates a calculator for the given timezone.
    #[must_use]
    pub fn new(tz: Tz) -> Self {
        Self {
            tz,
            max_occurrences: 500,
        }
    }

    /// Caps the number of occurrences one eager expansion may produce.
    #[must_use]
    pub fn with_max_occurrences(mut self, max: usize) -> Self {
        self.max_occurrences = max;
        self
    }

    /// Returns the timezone calendar steps are taken in.
    #[must_use]
    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Returns the first occurrence after `anchor`, or `None` for `once` and
    /// when that occurrence lies after `end`.
    ///
    /// # Errors
    ///
    /// Returns [`RecurrenceError::Parse`] for expressions outside the grammar
    /// and [`RecurrenceError::TooFrequent`] below the five-minute floor.
    pub fn next_occurrence(
        &self,
        expr: &str,
        anchor: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Option<DateTime<Utc>>, RecurrenceError> {
        let next = self.occurrences(expr, anchor, Expansion::Lazy)?.into_iter().next();
        Ok(next.filter(|next| end.is_none_or(|end| *next <= end)))
    }

    /// Returns occurrence `k` of the series anchored at `anchor`, or `None`
    /// for `once`, for `k == 0`, and when that occurrence lies after `end`.
    ///
    /// Successive occurrences of one series are computed from the same
    /// anchor with increasing `k`, never from each other.
    ///
    /// # Errors
    ///
    /// As [`Self::next_occurrence`], plus [`RecurrenceError::OutOfRange`]
    /// when the occurrence overflows the calendar.
    pub fn nth_occurrence(
        &self,
        expr: &str,
        anchor: DateTime<Utc>,
        k: u32,
        end: Option<DateTime<Utc>>,
    ) -> Result<Option<DateTime<Utc>>, RecurrenceError> {
        let Frequency::Every { count, unit } = expr.parse::<Frequency>()? else {
            return Ok(None);
        };
        if k == 0 {
            return Ok(None);
        }
        let next = self.nth(expr, count, unit, anchor, k)?;
        Ok(Some(next).filter(|next| end.is_none_or(|end| *next <= end)))
    }

    /// Returns every occurrence after `anchor` up to and including `end`.
    ///
    /// # Errors
    ///
    /// As [`Self::occurrences`].
    pub fn occurrences_in_range(
        &self,
        expr: &str,
        anchor: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, RecurrenceError> {
        self.occurrences(expr, anchor, Expansion::Eager { end })
    }

    /// Expands a frequency after `anchor`. The anchor itself is never
    /// included; the result is strictly increasing.
    ///
    /// # Errors
    ///
    /// Fails on parse errors, below-floor frequencies, date overflow, and
    /// when an eager expansion exceeds the occurrence cap.
    pub fn occurrences(
        &self,
        expr: &str,
        anchor: DateTime<Utc>,
        expansion: Expansion,
    ) -> Result<Vec<DateTime<Utc>>, RecurrenceError> {
        let Frequency::Every { count, unit } = expr.parse::<Frequency>()? else {
            return Ok(Vec::new());
        };

        match expansion {
            Expansion::Lazy => Ok(vec![self.nth(expr, count, unit, anchor, 1)?]),
            Expansion::Eager { end } => {
                let mut series = Vec::new();
                for k in 1u32.. {
                    let next = self.nth(expr, count, unit, anchor, k)?;
                    if next > end {
                        break;
                    }
                    if series.len() == self.max_occurrences {
                        return Err(RecurrenceError::TooManyOccurrences {
                            input: expr.to_string(),
                            limit: self.max_occurrences,
                        });
                    }
                    series.push(next);
                }
                Ok(series)
            }
        }
    }

    /// Like [`Self::next_occurrence`], but consults `resolver` when the
    /// expression is outside the canonical grammar.
    ///
    /// Below-floor frequencies never reach the resolver. A resolver answer
    /// that is not after the anchor is rejected.
    ///
    /// # Errors
    ///
    /// Returns the calculator's error when no resolver is given, and a
    /// resolver or parse error when the fallback fails.
    pub async fn next_occurrence_with_fallback(
        &self,
        expr: &str,
        anchor: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        resolver: Option<&dyn OccurrenceResolver>,
    ) -> Result<Option<DateTime<Utc>>, RecurrenceError> {
        let err = match self.next_occurrence(expr, anchor, end) {
            Ok(next) => return Ok(next),
            Err(err @ RecurrenceError::Parse { .. }) => err,
            Err(err) => return Err(err),
        };
        let Some(resolver) = resolver else {
            return Err(err);
        };

        let anchor_text = format_canonical(anchor, self.tz);
        let answer = resolver
            .resolve_next(expr, &anchor_text, self.tz.name())
            .await?;
        let next = parse_canonical(&answer, self.tz).map_err(|e| RecurrenceError::Resolver {
            reason: e.to_string(),
        })?;
        if next <= anchor {
            return Err(RecurrenceError::Resolver {
                reason: format!("answer '{answer}' is not after '{anchor_text}'"),
            });
        }
        Ok(Some(next).filter(|next| end.is_none_or(|end| *next <= end)))
    }

    fn nth(
        &self,
        expr: &str,
        count: u32,
        unit: TimeUnit,
        anchor: DateTime<Utc>,
        k: u32,
    ) -> Result<DateTime<Utc>, RecurrenceError> {
        let out_of_range = || RecurrenceError::OutOfRange {
            input: expr.to_string(),
        };
        let steps = count.checked_mul(k).ok_or_else(out_of_range)?;

        let absolute = |minutes_per_step: i64| {
            Duration::try_minutes(i64::from(steps) * minutes_per_step)
                .and_then(|offset| anchor.checked_add_signed(offset))
                .ok_or_else(out_of_range)
        };

        let local = anchor.with_timezone(&self.tz).naive_local();
        let stepped = match unit {
            TimeUnit::Minute => return absolute(1),
            TimeUnit::Hour => return absolute(60),
            TimeUnit::Day => local.checked_add_days(Days::new(u64::from(steps))),
            TimeUnit::Week => local.checked_add_days(Days::new(u64::from(steps) * 7)),
            TimeUnit::Month => local.checked_add_months(Months::new(steps)),
            TimeUnit::Year => steps
                .checked_mul(12)
                .and_then(|months| local.checked_add_months(Months::new(months))),
        }
        .ok_or_else(out_of_range)?;

        match localize(stepped, self.tz) {
            Some(next) => Ok(next),
            None => anchor
                .checked_add_signed(stepped - local)
                .ok_or_else(out_of_range),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc() -> RecurrenceCalculator {
        RecurrenceCalculator::new(chrono_tz::UTC)
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn every_day_from_monday_morning() {
        // 2024-03-04 is a Monday.
        let next = utc().next_occurrence("every day", at(2024, 3, 4, 9, 0), None);
        assert_eq!(next.unwrap(), Some(at(2024, 3, 5, 9, 0)));
    }

    #[test]
    fn hourly_series_until_four_pm() {
        let anchor = at(2024, 3, 9, 13, 50);
        let end = at(2024, 3, 9, 16, 0);
        let series = utc().occurrences_in_range("every hour", anchor, end).unwrap();
        assert_eq!(series, vec![at(2024, 3, 9, 14, 50), at(2024, 3, 9, 15, 50)]);

        let next = utc().next_occurrence("every hour", anchor, Some(end)).unwrap();
        assert_eq!(next, Some(at(2024, 3, 9, 14, 50)));
    }

    #[test]
    fn next_past_end_is_not_rescheduled() {
        let anchor = at(2024, 3, 9, 15, 50);
        let end = at(2024, 3, 9, 16, 0);
        assert_eq!(utc().next_occurrence("every hour", anchor, Some(end)).unwrap(), None);
    }

    #[test]
    fn occurrence_exactly_at_end_is_kept() {
        let anchor = at(2024, 3, 9, 15, 0);
        let end = at(2024, 3, 9, 16, 0);
        assert_eq!(
            utc().next_occurrence("every hour", anchor, Some(end)).unwrap(),
            Some(end)
        );
        assert_eq!(
            utc().occurrences_in_range("every hour", anchor, end).unwrap(),
            vec![end]
        );
    }

    #[test]
    fn once_has_no_next() {
        let anchor = at(2024, 3, 9, 15, 0);
        assert_eq!(utc().next_occurrence("once", anchor, None).unwrap(), None);
        assert!(
            utc()
                .occurrences_in_range("once", anchor, anchor + Duration::days(3))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn too_frequent_for_any_anchor() {
        for anchor in [at(2024, 1, 1, 0, 0), at(1999, 12, 31, 23, 59)] {
            let err = utc().next_occurrence("every 3 minutes", anchor, None).unwrap_err();
            assert!(err.is_too_frequent());
        }
    }

    #[test]
    fn next_is_strictly_after_anchor_for_all_units() {
        let anchor = at(2024, 2, 29, 23, 30);
        for expr in [
            "every 5 minutes",
            "every 90 minutes",
            "every hour",
            "every 3 days",
            "every week",
            "every 2 months",
            "every year",
        ] {
            let next = utc().next_occurrence(expr, anchor, None).unwrap().unwrap();
            assert!(next > anchor, "{expr}");
        }
    }

    #[test]
    fn month_end_clamps_without_drift() {
        let anchor = at(2023, 1, 31, 8, 0);
        let series = utc()
            .occurrences_in_range("every month", anchor, at(2023, 5, 1, 0, 0))
            .unwrap();
        assert_eq!(
            series,
            vec![at(2023, 2, 28, 8, 0), at(2023, 3, 31, 8, 0), at(2023, 4, 30, 8, 0)]
        );
    }

    #[test]
    fn nth_occurrence_steps_from_series_anchor() {
        let calc = utc();
        let anchor = at(2024, 1, 31, 8, 0);
        let nth = |k| calc.nth_occurrence("every month", anchor, k, None).unwrap();
        assert_eq!(nth(0), None);
        assert_eq!(nth(1), Some(at(2024, 2, 29, 8, 0)));
        assert_eq!(nth(2), Some(at(2024, 3, 31, 8, 0)));
        assert_eq!(nth(3), Some(at(2024, 4, 30, 8, 0)));

        let bounded = calc
            .nth_occurrence("every month", anchor, 2, Some(at(2024, 3, 30, 0, 0)))
            .unwrap();
        assert_eq!(bounded, None);
        assert_eq!(calc.nth_occurrence("once", anchor, 1, None).unwrap(), None);
    }

    #[test]
    fn months_wrap_year_boundary() {
        let next = utc()
            .next_occurrence("every 3 months", at(2023, 11, 15, 8, 0), None)
            .unwrap();
        assert_eq!(next, Some(at(2024, 2, 15, 8, 0)));
    }

    #[test]
    fn leap_day_yearly_clamps_to_feb_28() {
        let next = utc()
            .next_occurrence("every year", at(2024, 2, 29, 8, 0), None)
            .unwrap();
        assert_eq!(next, Some(at(2025, 2, 28, 8, 0)));
    }

    #[test]
    fn daily_keeps_local_wall_clock_across_dst() {
        let berlin = RecurrenceCalculator::new(chrono_tz::Europe::Berlin);
        // 09:00 CET on Saturday 2024-03-30; DST starts the next night.
        let anchor = at(2024, 3, 30, 8, 0);
        let next = berlin.next_occurrence("every day", anchor, None).unwrap();
        // 09:00 CEST.
        assert_eq!(next, Some(at(2024, 3, 31, 7, 0)));
    }

    #[test]
    fn hourly_is_absolute_across_dst() {
        let berlin = RecurrenceCalculator::new(chrono_tz::Europe::Berlin);
        let anchor = at(2024, 3, 31, 0, 30);
        let next = berlin.next_occurrence("every hour", anchor, None).unwrap();
        assert_eq!(next, Some(at(2024, 3, 31, 1, 30)));
    }

    #[test]
    fn series_is_strictly_increasing_and_bounded() {
        let anchor = at(2024, 1, 1, 0, 0);
        let end = at(2024, 1, 3, 0, 0);
        let series = utc().occurrences_in_range("every 7 hours", anchor, end).unwrap();
        assert!(!series.is_empty());
        assert!(series.windows(2).all(|w| w[0] < w[1]));
        assert!(series.iter().all(|t| *t > anchor && *t <= end));
    }

    #[test]
    fn end_before_anchor_expands_to_nothing() {
        let anchor = at(2024, 1, 2, 0, 0);
        let series = utc()
            .occurrences_in_range("every day", anchor, at(2024, 1, 1, 0, 0))
            .unwrap();
        assert!(series.is_empty());
    }

    #[test]
    fn eager_expansion_is_capped() {
        let calculator = utc().with_max_occurrences(10);
        let anchor = at(2024, 1, 1, 0, 0);
        let err = calculator
            .occurrences_in_range("every 5 minutes", anchor, anchor + Duration::days(1))
            .unwrap_err();
        assert!(matches!(err, RecurrenceError::TooManyOccurrences { limit: 10, .. }));
    }

    struct FixedResolver(&'static str);

    #[async_trait]
    impl OccurrenceResolver for FixedResolver {
        async fn resolve_next(
            &self,
            _frequency: &str,
            _anchor: &str,
            _timezone: &str,
        ) -> Result<String, RecurrenceError> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn fallback_used_for_free_text() {
        let resolver = FixedResolver("Monday, 2024-03-11 09:00:00");
        let next = utc()
            .next_occurrence_with_fallback(
                "every weekday",
                at(2024, 3, 8, 9, 0),
                None,
                Some(&resolver),
            )
            .await
            .unwrap();
        assert_eq!(next, Some(at(2024, 3, 11, 9, 0)));
    }

    #[tokio::test]
    async fn fallback_answer_must_move_forward() {
        let resolver = FixedResolver("Friday, 2024-03-08 09:00:00");
        let err = utc()
            .next_occurrence_with_fallback(
                "every weekday",
                at(2024, 3, 8, 9, 0),
                None,
                Some(&resolver),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RecurrenceError::Resolver { .. }));
    }

    #[tokio::test]
    async fn too_frequent_skips_fallback() {
        let resolver = FixedResolver("Monday, 2024-03-11 09:00:00");
        let err = utc()
            .next_occurrence_with_fallback(
                "every 2 minutes",
                at(2024, 3, 8, 9, 0),
                None,
                Some(&resolver),
            )
            .await
            .unwrap_err();
        assert!(err.is_too_frequent());
    }

    #[tokio::test]
    async fn no_resolver_returns_parse_error() {
        let err = utc()
            .next_occurrence_with_fallback("whenever", at(2024, 3, 8, 9, 0), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RecurrenceError::Parse { .. }));
    }
}
