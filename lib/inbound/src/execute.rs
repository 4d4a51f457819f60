//! Applies validated commands to an actor's reminders.

use crate::error::ExecuteError;
use chime_ai::{Command, ReminderArgs};
use chime_core::EngineConfig;
use chime_scheduler::{Frequency, RecurrenceCalculator};
use chime_store::{Actor, ActorStore, Event, EventKey, EventStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Runs commands against the stores.
pub struct CommandExecutor {
    events: Arc<dyn EventStore>,
    actors: Arc<dyn ActorStore>,
    config: EngineConfig,
}

impl CommandExecutor {
    /// Creates an executor.
    #[must_use]
    pub fn new(
        events: Arc<dyn EventStore>,
        actors: Arc<dyn ActorStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            events,
            actors,
            config,
        }
    }

    /// Runs one command. `upcoming` is the list the command's indices refer
    /// to. `actor` is kept in step with what was written.
    ///
    /// # Errors
    ///
    /// Returns an error if a required write fails or a delete names an
    /// index outside `upcoming`.
    #[instrument(skip(self, actor, upcoming, command), fields(actor_id = %actor.id, command = command.name()))]
    pub async fn execute(
        &self,
        actor: &mut Actor,
        upcoming: &[Event],
        command: &Command,
    ) -> Result<(), ExecuteError> {
        match command {
            Command::Create(args) => self.create(actor, args).await,
            Command::Update(args) => match upcoming.get(args.index) {
                Some(old) => self.update(actor, old, &args.reminder).await,
                None => {
                    debug!(index = args.index, "update of unknown reminder, creating instead");
                    self.create(actor, &args.reminder).await
                }
            },
            Command::Delete(args) => {
                let old = upcoming.get(args.index).ok_or(ExecuteError::UnknownIndex {
                    index: args.index,
                    available: upcoming.len(),
                })?;
                self.delete(actor, old).await
            }
            Command::UpdateTimezone(args) => {
                self.actors.set_timezone(&actor.id, &args.timezone).await?;
                actor.timezone = Some(args.timezone.clone());
                info!(timezone = %args.timezone, "timezone updated");
                Ok(())
            }
            Command::Fetch => Ok(()),
        }
    }

    async fn create(&self, actor: &mut Actor, args: &ReminderArgs) -> Result<(), ExecuteError> {
        let key = self.store_reminder(actor, args).await?;
        self.actors
            .append_events(&actor.id, std::slice::from_ref(&key))
            .await?;
        actor.events.push(key);

        actor.stats.reminders_created += 1;
        if let Err(e) = self.actors.set_stats(&actor.id, &actor.stats).await {
            warn!(error = %e, "failed to save usage stats");
        }
        Ok(())
    }

    async fn update(
        &self,
        actor: &mut Actor,
        old: &Event,
        args: &ReminderArgs,
    ) -> Result<(), ExecuteError> {
        let old_key = old.key();
        for key in old.children.iter().chain(std::iter::once(&old_key)) {
            if let Err(e) = self.events.delete(key).await {
                warn!(error = %e, key = %key, "failed to delete replaced reminder");
            }
        }

        let new_key = self.store_reminder(actor, args).await?;
        let mut keys = actor.events.clone();
        match keys.iter_mut().find(|key| **key == old_key) {
            Some(slot) => *slot = new_key,
            None => keys.push(new_key),
        }
        self.actors.set_events(&actor.id, &keys).await?;
        actor.events = keys;
        Ok(())
    }

    async fn delete(&self, actor: &mut Actor, old: &Event) -> Result<(), ExecuteError> {
        for key in &old.children {
            self.events.delete(key).await?;
        }
        let old_key = old.key();
        if !self.events.delete(&old_key).await? {
            debug!(key = %old_key, "reminder was already gone");
        }

        let keys: Vec<EventKey> = actor
            .events
            .iter()
            .filter(|key| **key != old_key)
            .cloned()
            .collect();
        self.actors.set_events(&actor.id, &keys).await?;
        actor.events = keys;

        actor.stats.reminders_created = actor.stats.reminders_created.saturating_sub(1);
        if let Err(e) = self.actors.set_stats(&actor.id, &actor.stats).await {
            warn!(error = %e, "failed to save usage stats");
        }
        Ok(())
    }

    /// Writes the event(s) for a reminder and returns the key to list on
    /// the actor.
    ///
    /// A recurring reminder with an end date is expanded up front: the
    /// anchor occurrence carries the keys of the following ones and none of
    /// them reschedule. Anything the expansion cannot handle is stored as a
    /// single event the sweep reschedules one step at a time.
    async fn store_reminder(
        &self,
        actor: &Actor,
        args: &ReminderArgs,
    ) -> Result<EventKey, ExecuteError> {
        let window = self.config.bucket_window();
        if let Some(series) = self.expand(actor, args) {
            let children: Vec<Event> = series
                .into_iter()
                .zip(1u32..)
                .map(|(at, occurrence)| {
                    Event::new(
                        actor.id.clone(),
                        args.name.clone(),
                        at,
                        args.to_ts,
                        args.frequency.clone(),
                        window,
                    )
                    .with_reschedule(false)
                    .with_series(args.from_ts, occurrence)
                })
                .collect();
            for child in &children {
                self.events.put(child).await?;
            }
            let parent = Event::new(
                actor.id.clone(),
                args.name.clone(),
                args.from_ts,
                args.to_ts,
                args.frequency.clone(),
                window,
            )
            .with_reschedule(false)
            .with_children(children.iter().map(Event::key).collect());
            self.events.put(&parent).await?;
            debug!(children = parent.children.len(), "reminder expanded");
            return Ok(parent.key());
        }

        let event = Event::new(
            actor.id.clone(),
            args.name.clone(),
            args.from_ts,
            args.to_ts,
            args.frequency.clone(),
            window,
        );
        self.events.put(&event).await?;
        Ok(event.key())
    }

    fn expand(&self, actor: &Actor, args: &ReminderArgs) -> Option<Vec<DateTime<Utc>>> {
        let end = args.to_ts?;
        let frequency = args.frequency.parse::<Frequency>().ok()?;
        if !frequency.is_recurring() {
            return None;
        }
        let calculator = RecurrenceCalculator::new(actor.tz().unwrap_or(chrono_tz::UTC))
            .with_max_occurrences(self.config.max_expanded_occurrences);
        match calculator.occurrences_in_range(&args.frequency, args.from_ts, end) {
            Ok(series) => Some(series),
            Err(e) => {
                debug!(error = %e, "expansion not possible, scheduling lazily");
                None
            }
        }
    }
}
