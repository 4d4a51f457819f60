//! The due-reminder sweep.
//!
//! One tick runs the following steps:
//! 1. Fetch the unclaimed events of the bucket containing "now"
//! 2. Sort them by anchor (then event id)
//! 3. For each event: skip the test actor, claim, reschedule if recurring,
//!    wait until the anchor, deliver, append the audit entry
//!
//! A follow-up is computed from the series anchor and the event's position
//! in the series, and takes the claimed event's place in the actor's list.
//!
//! The claim happens before the wait and the delivery, so a crash after
//! claiming loses that one reminder instead of firing it twice. Every event
//! is isolated: a failure is logged and the tick moves on.

use crate::error::{RecurrenceError, SweepError};
use crate::frequency::Frequency;
use crate::recurrence::{OccurrenceResolver, RecurrenceCalculator};
use chime_conversation::LogEntry;
use chime_core::{Clock, EngineConfig, SweepId};
use chime_notify::{Notifier, Template};
use chime_store::{ActorStore, Event, EventKey, EventStore, TimeBucket};
use rootcause::Report;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// Appended to a recurring reminder whose frequency is below the floor.
pub const TOO_FREQUENT_NOTE: &str =
    "This reminder won't get rescheduled because it has a frequency below 5 minutes.";

/// Appended to a recurring reminder whose follow-up could not be stored.
pub const RESCHEDULE_FAILED_NOTE: &str =
    "I ran into an issue while trying to reschedule this reminder...";

/// Counters for one sweep tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Identifier of the tick.
    pub sweep_id: SweepId,
    /// Bucket that was scanned.
    pub bucket: TimeBucket,
    /// Unclaimed events found.
    pub fetched: usize,
    /// Events left alone (test actor, or already claimed elsewhere).
    pub skipped: usize,
    /// Reminders handed to the notifier.
    pub delivered: usize,
    /// Follow-up occurrences stored.
    pub rescheduled: usize,
    /// Events whose claim or delivery failed.
    pub failed: usize,
}

impl SweepReport {
    fn new(bucket: TimeBucket) -> Self {
        Self {
            sweep_id: SweepId::new(),
            bucket,
            fetched: 0,
            skipped: 0,
            delivered: 0,
            rescheduled: 0,
            failed: 0,
        }
    }
}

/// What rescheduling did for one claimed event.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Reschedule {
    /// The event does not recur or is a pre-expanded child.
    NotApplicable,
    /// The next occurrence was stored.
    Scheduled(EventKey),
    /// The series ended or the next occurrence could not be determined.
    Finished,
    /// The frequency is below the floor.
    TooFrequent,
    /// The next occurrence could not be stored.
    Failed,
}

impl Reschedule {
    fn note(&self) -> Option<&'static str> {
        match self {
            Self::TooFrequent => Some(TOO_FREQUENT_NOTE),
            Self::Failed => Some(RESCHEDULE_FAILED_NOTE),
            Self::NotApplicable | Self::Scheduled(_) | Self::Finished => None,
        }
    }
}

/// Periodic scan that claims and delivers due reminders.
pub struct SchedulerSweep {
    events: Arc<dyn EventStore>,
    actors: Arc<dyn ActorStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    resolver: Option<Arc<dyn OccurrenceResolver>>,
    config: EngineConfig,
    running: Mutex<()>,
}

impl SchedulerSweep {
    /// Creates a sweep.
    #[must_use]
    pub fn new(
        events: Arc<dyn EventStore>,
        actors: Arc<dyn ActorStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            events,
            actors,
            notifier,
            clock,
            resolver: None,
            config,
            running: Mutex::new(()),
        }
    }

    /// Sets the fallback resolver for free-form frequencies.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn OccurrenceResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Runs one tick. Ticks started concurrently in the same process run one
    /// after the other.
    ///
    /// # Errors
    ///
    /// Returns an error only if the bucket scan fails; per-event failures
    /// are logged and counted in the report.
    pub async fn run_once(&self) -> Result<SweepReport, Report<SweepError>> {
        let _running = self.running.lock().await;

        let bucket = TimeBucket::containing(self.clock.now(), self.config.bucket_window());
        let mut report = SweepReport::new(bucket);

        let mut due = self
            .events
            .scan_due_unclaimed(bucket)
            .await
            .map_err(|e| SweepError::ScanFailed {
                bucket,
                reason: e.to_string(),
            })?;
        due.sort_by(|a, b| a.from_ts.cmp(&b.from_ts).then_with(|| a.id.cmp(&b.id)));
        report.fetched = due.len();
        info!(sweep_id = %report.sweep_id, bucket = %bucket, fetched = report.fetched, "sweep started");

        for event in &due {
            self.process(event, &mut report).await;
        }

        info!(
            sweep_id = %report.sweep_id,
            delivered = report.delivered,
            rescheduled = report.rescheduled,
            skipped = report.skipped,
            failed = report.failed,
            "sweep finished"
        );
        Ok(report)
    }

    #[instrument(skip(self, event, report), fields(event_id = %event.id, actor_id = %event.actor_id))]
    async fn process(&self, event: &Event, report: &mut SweepReport) {
        if event.actor_id == self.config.test_actor_id {
            debug!("skipping test actor event");
            report.skipped += 1;
            return;
        }

        match self.events.mark_claimed(&event.key()).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("event already claimed");
                report.skipped += 1;
                return;
            }
            Err(e) => {
                error!(error = %e, "failed to claim event");
                report.failed += 1;
                return;
            }
        }

        let reschedule = self.reschedule(event).await;
        if matches!(reschedule, Reschedule::Scheduled(_)) {
            report.rescheduled += 1;
        }

        self.clock.sleep_until(event.from_ts).await;

        let text = reminder_text(event, &reschedule);
        if let Err(e) = self
            .notifier
            .send_template(&event.actor_id, &Template::reminder(), std::slice::from_ref(&text))
            .await
        {
            error!(error = %e, "reminder delivery failed");
            report.failed += 1;
            return;
        }
        report.delivered += 1;

        let entry = LogEntry::reminder(&text, self.clock.now());
        if let Err(e) = self
            .actors
            .append_conversation(&event.actor_id, std::slice::from_ref(&entry))
            .await
        {
            warn!(error = %e, "failed to append reminder to conversation");
        }
    }

    async fn reschedule(&self, event: &Event) -> Reschedule {
        if !event.reschedule || Frequency::is_once(&event.frequency) {
            return Reschedule::NotApplicable;
        }

        let tz = match self.actors.load(&event.actor_id).await {
            Ok(actor) => actor.and_then(|actor| actor.tz()).unwrap_or(chrono_tz::UTC),
            Err(e) => {
                warn!(error = %e, "failed to load actor, rescheduling in UTC");
                chrono_tz::UTC
            }
        };
        let calculator = RecurrenceCalculator::new(tz)
            .with_max_occurrences(self.config.max_expanded_occurrences);

        let position = event.occurrence.saturating_add(1);
        let next = match calculator.nth_occurrence(
            &event.frequency,
            event.series_anchor,
            position,
            event.to_ts,
        ) {
            Err(RecurrenceError::Parse { .. }) => {
                calculator
                    .next_occurrence_with_fallback(
                        &event.frequency,
                        event.from_ts,
                        event.to_ts,
                        self.resolver.as_deref(),
                    )
                    .await
            }
            computed => computed,
        };
        let next = match next {
            Ok(Some(next)) => next,
            Ok(None) => return Reschedule::Finished,
            Err(RecurrenceError::TooFrequent { .. }) => return Reschedule::TooFrequent,
            Err(e) => {
                warn!(error = %e, frequency = %event.frequency, "could not determine next occurrence");
                return Reschedule::Finished;
            }
        };

        let follow_up = Event::new(
            event.actor_id.clone(),
            event.name.clone(),
            next,
            event.to_ts,
            event.frequency.clone(),
            self.config.bucket_window(),
        )
        .with_series(event.series_anchor, position);
        if let Err(e) = self.events.put(&follow_up).await {
            error!(error = %e, "failed to store next occurrence");
            return Reschedule::Failed;
        }

        let key = follow_up.key();
        if let Err(e) = self
            .actors
            .replace_event(&event.actor_id, &event.key(), &key)
            .await
        {
            warn!(error = %e, "failed to link next occurrence to actor");
        }
        debug!(next = %next, "next occurrence scheduled");
        Reschedule::Scheduled(key)
    }
}

fn reminder_text(event: &Event, reschedule: &Reschedule) -> String {
    if Frequency::is_once(&event.frequency) {
        return event.name.clone();
    }
    match reschedule.note() {
        Some(note) => format!("{}\n{note}", event.name),
        None => format!("{} ({})", event.name, event.frequency),
    }
}
