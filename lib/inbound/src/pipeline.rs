//! The inbound message pipeline.
//!
//! One text message runs the following steps:
//! 1. Load or create the actor
//! 2. Take the actor's lock, then drop replays
//! 3. Ask for consent where required
//! 4. Count usage
//! 5. Onboard, run a slash command, or hand the message to the interpreter
//! 6. Turn requests into commands, run them and confirm
//! 7. Append the turn to the conversation, send the reply, unlock
//!
//! Non-text messages (voice notes, consent buttons, media) are answered
//! directly without taking the lock.

use crate::consent::{consent_from_payload, requires_opt_in};
use crate::dedup::{Admission, DedupGuard};
use crate::error::{ProcessError, TurnError};
use crate::execute::CommandExecutor;
use crate::lock::UserLock;
use crate::reply;
use crate::slash::SlashCommand;
use chime_ai::{
    Command, CommandRequest, FailedAttempt, InterpretContext, Interpretation, Interpreter,
    parse_commands, prompt,
};
use chime_conversation::{EntryKind, HistoryWindow, LogEntry};
use chime_core::{ActorId, Clock, EngineConfig, MessageId, format_canonical, parse_timezone};
use chime_notify::{Notifier, Template};
use chime_store::{Actor, ActorStore, ConsentState, Event, EventStore, StoreError};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rootcause::Report;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// A message received from the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Sender.
    pub actor_id: ActorId,
    /// Channel message id.
    pub message_id: MessageId,
    /// When the channel received the message.
    pub timestamp: DateTime<Utc>,
    /// Content.
    pub body: MessageBody,
}

/// Content of an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    /// Quick-reply button press.
    Button { payload: String },
    /// Voice note.
    Audio,
    /// Anything else the channel can carry (images, stickers, ...).
    Unsupported { kind: String },
}

/// How a message was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// A reply was sent.
    Replied,
    /// Nothing to do (unknown button).
    Ignored,
    /// The actor stayed locked for the whole wait; the message was dropped.
    Busy,
    /// The message was handled before.
    Duplicate,
    /// The consent template was sent instead of an answer.
    ConsentRequested,
    /// Something failed and an apology was sent.
    Failed,
}

/// What a turn answers.
#[derive(Debug, Default)]
struct Reply {
    /// Entries recorded between the user's message and the answer.
    trail: Vec<LogEntry>,
    /// Texts sent back, in order.
    texts: Vec<String>,
    kind: Option<EntryKind>,
}

impl Reply {
    fn chat(text: impl Into<String>) -> Self {
        Self {
            texts: vec![text.into()],
            ..Self::default()
        }
    }

    fn with_kind(mut self, kind: EntryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    fn with_trail(mut self, trail: Vec<LogEntry>) -> Self {
        self.trail = trail;
        self
    }
}

/// Handles inbound messages end to end.
pub struct MessageProcessor {
    events: Arc<dyn EventStore>,
    actors: Arc<dyn ActorStore>,
    notifier: Arc<dyn Notifier>,
    interpreter: Arc<dyn Interpreter>,
    clock: Arc<dyn Clock>,
    lock: UserLock,
    dedup: DedupGuard,
    executor: CommandExecutor,
    history: HistoryWindow,
    config: EngineConfig,
    support_contact: String,
}

impl MessageProcessor {
    /// Creates a processor.
    #[must_use]
    pub fn new(
        events: Arc<dyn EventStore>,
        actors: Arc<dyn ActorStore>,
        notifier: Arc<dyn Notifier>,
        interpreter: Arc<dyn Interpreter>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            lock: UserLock::new(actors.clone(), clock.clone(), &config),
            dedup: DedupGuard::new(actors.clone()),
            executor: CommandExecutor::new(events.clone(), actors.clone(), config.clone()),
            history: HistoryWindow::from_config(&config),
            events,
            actors,
            notifier,
            interpreter,
            clock,
            config,
            support_contact: String::new(),
        }
    }

    /// Sets the address users can write to about their data. It is quoted
    /// in the consent template and the consent confirmation.
    #[must_use]
    pub fn with_support_contact(mut self, contact: impl Into<String>) -> Self {
        self.support_contact = contact.into();
        self
    }

    /// Handles one message.
    ///
    /// # Errors
    ///
    /// Returns an error only when the actor record cannot be read or
    /// created. Every later failure is answered with an apology and
    /// reported as [`ProcessOutcome::Failed`].
    #[instrument(skip(self, message), fields(actor_id = %message.actor_id, message_id = %message.message_id))]
    pub async fn process(
        &self,
        message: InboundMessage,
    ) -> Result<ProcessOutcome, Report<ProcessError>> {
        let actor = match self.load_or_create(&message.actor_id).await {
            Ok(actor) => actor,
            Err(e) => {
                error!(error = %e, "failed to load actor");
                self.send(&message.actor_id, reply::APOLOGY).await;
                return Err(ProcessError::ActorUnavailable {
                    actor_id: message.actor_id,
                    reason: e.to_string(),
                }
                .into());
            }
        };

        let text = match message.body {
            MessageBody::Text(text) => text,
            MessageBody::Audio => {
                self.send(&actor.id, reply::VOICE_UNSUPPORTED).await;
                return Ok(ProcessOutcome::Replied);
            }
            MessageBody::Button { payload } => return Ok(self.button(&actor, &payload).await),
            MessageBody::Unsupported { kind } => {
                debug!(kind = %kind, "unsupported message type");
                self.send(&actor.id, reply::TEXT_ONLY).await;
                return Ok(ProcessOutcome::Replied);
            }
        };

        if let Err(e) = self.lock.acquire(&actor.id).await {
            warn!(error = %e, "dropping message");
            return Ok(ProcessOutcome::Busy);
        }
        let outcome = self
            .text(&actor.id, &message.message_id, message.timestamp, &text)
            .await;
        if let Err(e) = self.lock.unlock(&actor.id).await {
            warn!(error = %e, "failed to release actor lock");
        }
        info!(?outcome, "message processed");
        Ok(outcome)
    }

    async fn load_or_create(&self, id: &ActorId) -> Result<Actor, StoreError> {
        if let Some(actor) = self.actors.load(id).await? {
            return Ok(actor);
        }
        let actor = Actor::new(id.clone(), self.clock.now());
        match self.actors.create(&actor).await {
            Ok(()) => {
                info!("new actor");
                Ok(actor)
            }
            Err(StoreError::AlreadyExists { .. }) => {
                self.actors
                    .load(id)
                    .await?
                    .ok_or_else(|| StoreError::NotFound {
                        key: format!("actor {id}"),
                    })
            }
            Err(e) => Err(e),
        }
    }

    async fn button(&self, actor: &Actor, payload: &str) -> ProcessOutcome {
        let Some(consent) = consent_from_payload(payload) else {
            debug!(payload, "unknown button payload");
            return ProcessOutcome::Ignored;
        };
        if let Err(e) = self.actors.set_consent(&actor.id, consent).await {
            error!(error = %e, "failed to save consent");
            self.fail(actor, &TurnError::from(e)).await;
            return ProcessOutcome::Failed;
        }
        info!(?consent, "consent updated");
        let text = match consent {
            ConsentState::Granted => {
                reply::consent_granted(&self.support_contact, actor.is_set_up())
            }
            ConsentState::Declined | ConsentState::Pending => reply::CONSENT_DECLINED.to_string(),
        };
        self.send(&actor.id, &text).await;
        ProcessOutcome::Replied
    }

    /// Handles a text message while holding the actor's lock.
    async fn text(
        &self,
        actor_id: &ActorId,
        message_id: &MessageId,
        timestamp: DateTime<Utc>,
        text: &str,
    ) -> ProcessOutcome {
        // Another holder may have changed the record while we waited.
        let mut actor = match self.actors.load(actor_id).await {
            Ok(Some(actor)) => actor,
            Ok(None) => {
                error!("actor vanished while locked");
                self.send(actor_id, reply::APOLOGY).await;
                return ProcessOutcome::Failed;
            }
            Err(e) => {
                error!(error = %e, "failed to reload actor");
                self.send(actor_id, reply::APOLOGY).await;
                return ProcessOutcome::Failed;
            }
        };

        match self.dedup.admit(&mut actor, message_id).await {
            Ok(Admission::Accepted) => {}
            Ok(Admission::Duplicate) => return ProcessOutcome::Duplicate,
            Err(e) => {
                error!(error = %e, "failed to record message id");
                self.fail(&actor, &TurnError::from(e)).await;
                return ProcessOutcome::Failed;
            }
        }

        if requires_opt_in(&actor, &self.config) {
            info!("asking for consent");
            if let Err(e) = self
                .notifier
                .send_template(
                    &actor.id,
                    &Template::opt_in(),
                    std::slice::from_ref(&self.support_contact),
                )
                .await
            {
                error!(error = %e, "failed to send consent template");
            }
            return ProcessOutcome::ConsentRequested;
        }

        let now = self.clock.now();
        actor.stats.record_message(now);
        if let Err(e) = self.actors.set_stats(&actor.id, &actor.stats).await {
            warn!(error = %e, "failed to save usage stats");
        }

        let user_entry = LogEntry::user(text, timestamp).with_message_id(message_id.clone());
        let history: Vec<LogEntry> = self
            .history
            .select(&actor.conversation, now)
            .into_iter()
            .cloned()
            .collect();

        let turn = match actor.tz().filter(|_| actor.is_set_up()) {
            None => self.onboard(&mut actor, &history, text).await,
            Some(tz) => match SlashCommand::parse(text) {
                Some(command) => self.slash(&mut actor, tz, command, now).await,
                None => {
                    self.converse(&mut actor, tz, &history, &user_entry, now)
                        .await
                }
            },
        };

        match turn {
            Ok(answer) => self.respond(&mut actor, user_entry, answer).await,
            Err(e) => {
                error!(error = %e, "turn failed");
                self.respond(
                    &mut actor,
                    user_entry,
                    Reply::chat(reply::APOLOGY).with_kind(EntryKind::Error),
                )
                .await;
                self.forward_failure(&actor, &e).await;
                ProcessOutcome::Failed
            }
        }
    }

    async fn onboard(
        &self,
        actor: &mut Actor,
        history: &[LogEntry],
        text: &str,
    ) -> Result<Reply, TurnError> {
        let history: Vec<&LogEntry> = history.iter().collect();
        let onboarding = self.interpreter.onboard(&history, text).await?;

        let mut problems = Vec::new();
        if let Some(name) = onboarding.name.as_deref().map(str::trim) {
            if name.is_empty() {
                problems.push(reply::NAME_MISSING);
            } else if let Err(e) = self.actors.set_name(&actor.id, name).await {
                warn!(error = %e, "failed to save name");
                problems.push(reply::NAME_SAVE_FAILED);
            } else {
                actor.name = Some(name.to_string());
            }
        }
        if let Some(timezone) = onboarding.timezone.as_deref().map(str::trim) {
            match parse_timezone(timezone) {
                Err(e) => {
                    debug!(error = %e, "rejected timezone");
                    problems.push(reply::TIMEZONE_INVALID);
                }
                Ok(tz) => {
                    if let Err(e) = self.actors.set_timezone(&actor.id, tz.name()).await {
                        warn!(error = %e, "failed to save timezone");
                        problems.push(reply::TIMEZONE_SAVE_FAILED);
                    } else {
                        actor.timezone = Some(tz.name().to_string());
                    }
                }
            }
        }

        let mut texts = Vec::new();
        if problems.is_empty() {
            if !onboarding.reply.trim().is_empty() {
                texts.push(onboarding.reply);
            }
        } else {
            texts.push(problems.join("\n"));
        }
        if let Some(name) = actor.name.as_deref().filter(|_| actor.is_set_up()) {
            info!("actor set up");
            texts.push(prompt::intro(name));
        }
        Ok(Reply {
            texts,
            ..Reply::default()
        }
        .with_kind(EntryKind::Setup))
    }

    async fn slash(
        &self,
        actor: &mut Actor,
        tz: Tz,
        command: SlashCommand,
        now: DateTime<Utc>,
    ) -> Result<Reply, TurnError> {
        debug!(?command, "slash command");
        let text = match command {
            SlashCommand::Timezone(None) => reply::timezone_current(tz.name()),
            SlashCommand::Timezone(Some(name)) => match parse_timezone(&name) {
                Err(_) => reply::TIMEZONE_INVALID.to_string(),
                Ok(new_tz) => match self.actors.set_timezone(&actor.id, new_tz.name()).await {
                    Ok(()) => {
                        actor.timezone = Some(new_tz.name().to_string());
                        reply::timezone_updated(new_tz.name())
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to save timezone");
                        reply::SLASH_TIMEZONE_SAVE_FAILED.to_string()
                    }
                },
            },
            SlashCommand::Reminders => reply::slash_reminders(&self.upcoming(actor, now).await?, tz),
            SlashCommand::Name(None) => reply::SLASH_NAME_MISSING.to_string(),
            SlashCommand::Name(Some(name)) => match self.actors.set_name(&actor.id, &name).await {
                Ok(()) => {
                    let text = reply::name_updated(&name);
                    actor.name = Some(name);
                    text
                }
                Err(e) => {
                    warn!(error = %e, "failed to save name");
                    reply::name_save_failed(&name)
                }
            },
        };
        Ok(Reply::chat(text))
    }

    async fn converse(
        &self,
        actor: &mut Actor,
        tz: Tz,
        history: &[LogEntry],
        user_entry: &LogEntry,
        now: DateTime<Utc>,
    ) -> Result<Reply, TurnError> {
        let context = InterpretContext {
            name: actor.name.clone().unwrap_or_default(),
            timezone: tz.name().to_string(),
            sent_at: format_canonical(user_entry.timestamp, tz),
        };
        let mut turn: Vec<&LogEntry> = history.iter().collect();
        match self
            .interpreter
            .interpret(&turn, &user_entry.text, &context)
            .await?
        {
            Interpretation::Reply(mut text) => {
                if reply::mentions_timezone(&user_entry.text) {
                    text.push_str(reply::TIMEZONE_HINT);
                }
                Ok(Reply::chat(text))
            }
            Interpretation::Request(request) => {
                debug!(%request, "request for the engine");
                let request_entry =
                    LogEntry::assistant(&request, now).with_kind(EntryKind::Request);
                turn.push(user_entry);
                turn.push(&request_entry);
                let (output, commands) = self.write_commands(actor, tz, &turn, request, now).await?;
                let command_entry = LogEntry::assistant(output, now).with_kind(EntryKind::Command);
                turn.push(&command_entry);

                let answer = self.run_commands(actor, tz, &turn, &commands, now).await?;
                Ok(answer.with_trail(vec![request_entry.clone(), command_entry.clone()]))
            }
        }
    }

    /// Asks for command text, retrying once with the parse error.
    async fn write_commands(
        &self,
        actor: &Actor,
        tz: Tz,
        turn: &[&LogEntry],
        request: String,
        now: DateTime<Utc>,
    ) -> Result<(String, Vec<Command>), TurnError> {
        let upcoming = self.upcoming(actor, now).await?;
        let mut command_request = CommandRequest {
            request,
            reminders: reply::indexed_reminders(&upcoming, tz),
            retry: None,
        };
        let output = self.interpreter.commands(turn, &command_request).await?;
        match parse_commands(&output, tz) {
            Ok(commands) => Ok((output, commands)),
            Err(e) => {
                warn!(error = %e, "command text rejected, retrying");
                command_request.retry = Some(FailedAttempt {
                    output,
                    error: e.to_string(),
                });
                let output = self.interpreter.commands(turn, &command_request).await?;
                let commands = parse_commands(&output, tz)?;
                Ok((output, commands))
            }
        }
    }

    async fn run_commands(
        &self,
        actor: &mut Actor,
        tz: Tz,
        turn: &[&LogEntry],
        commands: &[Command],
        now: DateTime<Utc>,
    ) -> Result<Reply, TurnError> {
        let upcoming = self.upcoming(actor, now).await?;
        for command in commands {
            if matches!(command, Command::Fetch) {
                let current = self.upcoming(actor, now).await?;
                return Ok(Reply::chat(reply::fetched_reminders(&current, tz)));
            }
            self.executor.execute(actor, &upcoming, command).await?;
        }
        info!(commands = commands.len(), "commands applied");

        let confirmation = match self.interpreter.confirm(turn).await {
            Ok(Some(text)) => text,
            Ok(None) => reply::DONE.to_string(),
            Err(e) => {
                warn!(error = %e, "confirmation failed");
                reply::DONE.to_string()
            }
        };
        Ok(Reply::chat(confirmation))
    }

    /// Upcoming events of the actor, ordered by anchor.
    async fn upcoming(&self, actor: &Actor, now: DateTime<Utc>) -> Result<Vec<Event>, StoreError> {
        let mut events = self.events.batch_get(&actor.events).await?;
        events.retain(|event| event.is_upcoming(now));
        Ok(events)
    }

    /// Records the turn and sends the answer.
    async fn respond(&self, actor: &mut Actor, user_entry: LogEntry, answer: Reply) -> ProcessOutcome {
        let now = self.clock.now();
        let kind = answer.kind.unwrap_or(EntryKind::Chat);
        let mut entries = Vec::with_capacity(answer.trail.len() + answer.texts.len() + 1);
        entries.push(if kind == EntryKind::Setup {
            user_entry.with_kind(kind)
        } else {
            user_entry
        });
        entries.extend(answer.trail);
        entries.extend(
            answer
                .texts
                .iter()
                .map(|text| LogEntry::assistant(text, now).with_kind(kind)),
        );
        if let Err(e) = self.actors.append_conversation(&actor.id, &entries).await {
            warn!(error = %e, "failed to append conversation");
        }
        actor.conversation.extend(entries);

        for text in &answer.texts {
            if let Err(e) = self.notifier.send_text(&actor.id, text).await {
                error!(error = %e, "failed to send reply");
                return ProcessOutcome::Failed;
            }
        }
        ProcessOutcome::Replied
    }

    /// Sends the apology and reports the failure.
    async fn fail(&self, actor: &Actor, error: &TurnError) {
        self.send(&actor.id, reply::APOLOGY).await;
        self.forward_failure(actor, error).await;
    }

    async fn forward_failure(&self, actor: &Actor, error: &TurnError) {
        if !self.config.is_vip(&actor.id) {
            return;
        }
        let Some(operator) = &self.config.operator_id else {
            return;
        };
        let report = format!("Error for {}: {error}", actor.id);
        if let Err(e) = self.notifier.send_text(operator, &report).await {
            warn!(error = %e, "failed to forward failure to operator");
        }
    }

    async fn send(&self, recipient: &ActorId, text: &str) {
        if let Err(e) = self.notifier.send_text(recipient, text).await {
            error!(error = %e, "failed to send message");
        }
    }
}
