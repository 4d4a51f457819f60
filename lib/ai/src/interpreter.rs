//! The interpreter seam between free text and the reminder engine.
//!
//! A message goes through up to three calls: [`Interpreter::interpret`]
//! answers the user or hands a request to the engine, [`Interpreter::commands`]
//! turns that request into command text, and [`Interpreter::confirm`] writes
//! the confirmation once the commands ran. Actors that are not set up yet
//! talk to [`Interpreter::onboard`] instead.

use crate::backend::{LlmBackend, LlmMessage, LlmRequest};
use crate::error::InterpretError;
use crate::prompt;
use async_trait::async_trait;
use chime_conversation::{EntryKind, LogEntry};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

const REPEAT_EVERY: usize = 4;

const CONFIRMATION_PHRASES: &[&str] = &[
    "i'll set up",
    "i'll set a reminder",
    "i will set a reminder",
    "i'll remind you to",
    "i will remind you to",
    "i'll create a reminder",
    "i will create a reminder",
    "i set a reminder",
    "i've just set a reminder",
    "i created a reminder",
    "i've just created a reminder",
    "i scheduled a reminder",
    "i've just scheduled a reminder",
    "reminder set",
    "all set",
    "done!",
];

/// What the interpreter knows about the actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpretContext {
    /// Display name.
    pub name: String,
    /// IANA timezone name.
    pub timezone: String,
    /// Time of the message in the canonical format, in the actor's timezone.
    pub sent_at: String,
}

/// Outcome of [`Interpreter::interpret`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interpretation {
    /// Text to send back as is.
    Reply(String),
    /// A request for the engine, starting with the request marker.
    Request(String),
}

/// Input to [`Interpreter::commands`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    /// The request produced by [`Interpreter::interpret`].
    pub request: String,
    /// Upcoming reminders, one line each, prefixed with their index.
    pub reminders: String,
    /// The previous attempt, when it failed to parse.
    pub retry: Option<FailedAttempt>,
}

/// Command text that did not parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAttempt {
    /// What the interpreter wrote.
    pub output: String,
    /// Why it was rejected.
    pub error: String,
}

/// Outcome of one onboarding turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Onboarding {
    /// Text for the user, without the extracted fields.
    pub reply: String,
    /// Name, when the user gave one.
    pub name: Option<String>,
    /// Timezone, when the user gave one. Not validated.
    pub timezone: Option<String>,
}

/// Turns conversation into replies and command text.
#[async_trait]
pub trait Interpreter: Send + Sync {
    /// Answers a user message.
    async fn interpret(
        &self,
        history: &[&LogEntry],
        message: &str,
        context: &InterpretContext,
    ) -> Result<Interpretation, InterpretError>;

    /// Writes command text for a request.
    async fn commands(
        &self,
        history: &[&LogEntry],
        request: &CommandRequest,
    ) -> Result<String, InterpretError>;

    /// Runs one onboarding turn.
    async fn onboard(
        &self,
        history: &[&LogEntry],
        message: &str,
    ) -> Result<Onboarding, InterpretError>;

    /// Writes a confirmation after commands ran. `None` selects the default.
    async fn confirm(&self, _history: &[&LogEntry]) -> Result<Option<String>, InterpretError> {
        Ok(None)
    }
}

/// [`Interpreter`] backed by a chat model.
pub struct LlmInterpreter {
    backend: Arc<dyn LlmBackend>,
}

impl LlmInterpreter {
    /// Creates an interpreter.
    #[must_use]
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    async fn complete(&self, request: LlmRequest) -> Result<String, InterpretError> {
        let response = self.backend.generate(&request).await?;
        let content = response.content.trim().to_string();
        if content.is_empty() {
            return Err(InterpretError::EmptyResponse);
        }
        Ok(content)
    }

    async fn guard_confirmation(
        &self,
        turns: &[LlmMessage],
        system: &str,
        reply: String,
    ) -> Result<String, InterpretError> {
        if !looks_like_confirmation(&reply) {
            return Ok(reply);
        }
        info!("reply confirms without a request, asking for a rewrite");
        let mut retry = turns.to_vec();
        retry.push(LlmMessage::assistant(reply.clone()));
        retry.push(LlmMessage::user(prompt::REWRITE_AS_REQUEST));
        let rewritten = self
            .complete(LlmRequest::new(retry).with_system(system))
            .await?;
        if has_marker(&rewritten, prompt::REQUEST_MARKER) {
            Ok(rewritten)
        } else {
            Ok(reply)
        }
    }
}

/// Byte offsets where `marker` starts, ignoring ASCII case.
fn marker_offsets<'a>(text: &'a str, marker: &'a str) -> impl Iterator<Item = usize> + 'a {
    let (hay, needle) = (text.as_bytes(), marker.as_bytes());
    (0..=hay.len().saturating_sub(needle.len()))
        .filter(move |&i| hay.get(i..i + needle.len()).is_some_and(|w| w.eq_ignore_ascii_case(needle)))
}

fn has_marker(text: &str, marker: &str) -> bool {
    marker_offsets(text, marker).next().is_some()
}

fn looks_like_confirmation(reply: &str) -> bool {
    let lower = reply.to_lowercase();
    !has_marker(reply, prompt::REQUEST_MARKER) && CONFIRMATION_PHRASES.iter().any(|p| lower.contains(p))
}

/// Conversation turns for the assistant, without command text.
fn chat_turns(history: &[&LogEntry]) -> Vec<LlmMessage> {
    let mut turns = Vec::with_capacity(history.len() + history.len() / REPEAT_EVERY);
    for (i, entry) in history
        .iter()
        .filter(|e| !matches!(e.kind, EntryKind::Command | EntryKind::Setup))
        .enumerate()
    {
        turns.push(LlmMessage::from(*entry));
        if i > 0 && i % REPEAT_EVERY == 0 {
            turns.push(LlmMessage::user(prompt::ASSISTANT_REPEAT));
        }
    }
    turns
}

/// Extracts the request that follows the marker, case-insensitively.
fn request_text(reply: &str) -> Option<String> {
    let start = marker_offsets(reply, prompt::REQUEST_MARKER).next()? + prompt::REQUEST_MARKER.len();
    let summary = reply
        .get(start..)
        .unwrap_or_default()
        .trim_matches(|c| matches!(c, ':' | ',' | ' ' | '\n'));
    Some(format!("{}: {summary}", prompt::REQUEST_MARKER))
}

/// Splits an onboarding answer into reply and fields.
fn parse_onboarding(answer: &str) -> Onboarding {
    let Some((reply, fields)) = answer.split_once(prompt::SETUP_SEPARATOR) else {
        return Onboarding {
            reply: answer.trim().to_string(),
            ..Onboarding::default()
        };
    };
    let mut onboarding = Onboarding {
        reply: reply.trim().to_string(),
        ..Onboarding::default()
    };
    let strip = |s: &str| {
        s.trim_matches(|c| matches!(c, '`' | '"' | '\'' | ',' | ' '))
            .to_string()
    };
    for line in fields.lines() {
        let Some((key, value)) = strip(line).split_once(':').map(|(k, v)| (strip(k), strip(v)))
        else {
            continue;
        };
        match key.to_lowercase().as_str() {
            "name" => onboarding.name = Some(value),
            "timezone" => onboarding.timezone = Some(value),
            _ => {}
        }
    }
    onboarding
}

#[async_trait]
impl Interpreter for LlmInterpreter {
    async fn interpret(
        &self,
        history: &[&LogEntry],
        message: &str,
        context: &InterpretContext,
    ) -> Result<Interpretation, InterpretError> {
        let system = format!(
            "{}\n\nThe user's name is {}, and their timezone is set to {}.",
            prompt::ASSISTANT,
            context.name,
            context.timezone
        );
        let mut turns = chat_turns(history);
        turns.push(LlmMessage::user(format!(
            "{message}\n# Sent on: {}\n",
            context.sent_at
        )));

        let reply = self
            .complete(LlmRequest::new(turns.clone()).with_system(&system))
            .await?;
        let reply = self.guard_confirmation(&turns, &system, reply).await?;
        debug!(reply = %reply, "assistant replied");

        Ok(match request_text(&reply) {
            Some(request) => Interpretation::Request(request),
            None => Interpretation::Reply(reply),
        })
    }

    async fn commands(
        &self,
        history: &[&LogEntry],
        request: &CommandRequest,
    ) -> Result<String, InterpretError> {
        let mut turns: Vec<LlmMessage> = history.iter().map(|e| LlmMessage::from(*e)).collect();
        turns.push(LlmMessage::user(prompt::commands(
            &request.reminders,
            &request.request,
        )));
        if let Some(retry) = &request.retry {
            turns.push(LlmMessage::assistant(retry.output.clone()));
            turns.push(LlmMessage::user(prompt::command_retry(&retry.error)));
        }
        self.complete(LlmRequest::new(turns).with_system(prompt::ASSISTANT))
            .await
    }

    async fn onboard(
        &self,
        history: &[&LogEntry],
        message: &str,
    ) -> Result<Onboarding, InterpretError> {
        let mut turns: Vec<LlmMessage> = history
            .iter()
            .filter(|e| e.kind == EntryKind::Setup)
            .map(|e| LlmMessage::from(*e))
            .collect();
        turns.push(LlmMessage::user(message));
        let answer = self
            .complete(LlmRequest::new(turns).with_system(prompt::SETUP))
            .await?;
        Ok(parse_onboarding(&answer))
    }

    async fn confirm(&self, history: &[&LogEntry]) -> Result<Option<String>, InterpretError> {
        let mut turns = chat_turns(history);
        turns.push(LlmMessage::user(prompt::CONFIRMATION));
        let answer = match self
            .complete(LlmRequest::new(turns).with_system(prompt::ASSISTANT))
            .await
        {
            Ok(answer) => answer,
            Err(InterpretError::EmptyResponse) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(marker_offsets(&answer, prompt::CONFIRMATION_MARKER).last().and_then(|at| {
            let text = answer
                .get(at + prompt::CONFIRMATION_MARKER.len()..)?
                .trim_matches(|c| matches!(c, ',' | ':' | ' '));
            (!text.is_empty()).then(|| text.to_string())
        }))
    }
}

/// Interpreter that answers from queues and records the command requests it
/// receives. Exhausted queues answer with [`InterpretError::EmptyResponse`].
#[derive(Debug, Clone, Default)]
pub struct ScriptedInterpreter {
    state: Arc<Mutex<Script>>,
}

#[derive(Debug, Default)]
struct Script {
    interpretations: VecDeque<Interpretation>,
    commands: VecDeque<String>,
    onboardings: VecDeque<Onboarding>,
    confirmations: VecDeque<String>,
    command_requests: Vec<CommandRequest>,
    messages: Vec<String>,
}

impl ScriptedInterpreter {
    /// Creates an interpreter with empty queues.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut Script) -> R) -> R {
        let mut script = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut script)
    }

    /// Queues an answer for [`Interpreter::interpret`].
    #[must_use]
    pub fn interprets(self, interpretation: Interpretation) -> Self {
        self.with(|s| s.interpretations.push_back(interpretation));
        self
    }

    /// Queues command text for [`Interpreter::commands`].
    #[must_use]
    pub fn writes_commands(self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.with(|s| s.commands.push_back(text));
        self
    }

    /// Queues an onboarding turn.
    #[must_use]
    pub fn onboards(self, onboarding: Onboarding) -> Self {
        self.with(|s| s.onboardings.push_back(onboarding));
        self
    }

    /// Queues a confirmation.
    #[must_use]
    pub fn confirms(self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.with(|s| s.confirmations.push_back(text));
        self
    }

    /// Returns every command request received.
    #[must_use]
    pub fn command_requests(&self) -> Vec<CommandRequest> {
        self.with(|s| s.command_requests.clone())
    }

    /// Returns every message passed to `interpret` or `onboard`.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.with(|s| s.messages.clone())
    }
}

#[async_trait]
impl Interpreter for ScriptedInterpreter {
    async fn interpret(
        &self,
        _history: &[&LogEntry],
        message: &str,
        _context: &InterpretContext,
    ) -> Result<Interpretation, InterpretError> {
        self.with(|s| {
            s.messages.push(message.to_string());
            s.interpretations.pop_front()
        })
        .ok_or(InterpretError::EmptyResponse)
    }

    async fn commands(
        &self,
        _history: &[&LogEntry],
        request: &CommandRequest,
    ) -> Result<String, InterpretError> {
        self.with(|s| {
            s.command_requests.push(request.clone());
            s.commands.pop_front()
        })
        .ok_or(InterpretError::EmptyResponse)
    }

    async fn onboard(
        &self,
        _history: &[&LogEntry],
        message: &str,
    ) -> Result<Onboarding, InterpretError> {
        self.with(|s| {
            s.messages.push(message.to_string());
            s.onboardings.pop_front()
        })
        .ok_or(InterpretError::EmptyResponse)
    }

    async fn confirm(&self, _history: &[&LogEntry]) -> Result<Option<String>, InterpretError> {
        Ok(self.with(|s| s.confirmations.pop_front()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MessageRole, ScriptedBackend};
    use crate::error::LlmError;
    use chrono::Utc;

    fn context() -> InterpretContext {
        InterpretContext {
            name: "Ada".to_string(),
            timezone: "Europe/Paris".to_string(),
            sent_at: "Monday, 2024-03-04 09:00:00".to_string(),
        }
    }

    fn interpreter(backend: &ScriptedBackend) -> LlmInterpreter {
        LlmInterpreter::new(Arc::new(backend.clone()))
    }

    #[tokio::test]
    async fn plain_reply_passes_through() {
        let backend = ScriptedBackend::new(["When should I remind you? 😊"]);
        let result = interpreter(&backend)
            .interpret(&[], "remind me to call mom", &context())
            .await
            .unwrap();
        assert_eq!(
            result,
            Interpretation::Reply("When should I remind you? 😊".to_string())
        );

        let requests = backend.requests();
        let request = &requests[0];
        assert!(request.system.as_deref().unwrap().contains("Europe/Paris"));
        assert!(request.last_content().unwrap().contains("# Sent on: Monday"));
    }

    #[tokio::test]
    async fn marker_turns_reply_into_request() {
        let backend = ScriptedBackend::new(["On it! @Manager: create a reminder at 10"]);
        let result = interpreter(&backend)
            .interpret(&[], "tomorrow at 10", &context())
            .await
            .unwrap();
        assert_eq!(
            result,
            Interpretation::Request("@manager: create a reminder at 10".to_string())
        );
    }

    #[tokio::test]
    async fn premature_confirmation_is_rewritten() {
        let backend = ScriptedBackend::new([
            "Done! I'll remind you to call mom.",
            "@manager: create a reminder to call mom",
        ]);
        let result = interpreter(&backend)
            .interpret(&[], "remind me to call mom at 5", &context())
            .await
            .unwrap();
        assert!(matches!(result, Interpretation::Request(_)));
        assert_eq!(backend.requests().len(), 2);
    }

    #[tokio::test]
    async fn empty_answer_is_error() {
        let backend = ScriptedBackend::new(["   "]);
        let err = interpreter(&backend)
            .interpret(&[], "hi", &context())
            .await
            .unwrap_err();
        assert_eq!(err, InterpretError::EmptyResponse);
    }

    #[tokio::test]
    async fn backend_failure_is_reported() {
        let backend = ScriptedBackend::default();
        backend.push(Err(LlmError::Timeout));
        let err = interpreter(&backend)
            .interpret(&[], "hi", &context())
            .await
            .unwrap_err();
        assert!(matches!(err, InterpretError::Backend { .. }));
    }

    #[tokio::test]
    async fn commands_retry_includes_failed_attempt() {
        let backend = ScriptedBackend::new(["delete(0)"]);
        let request = CommandRequest {
            request: "@manager: delete the gym".to_string(),
            reminders: "- id:0, name:Gym".to_string(),
            retry: Some(FailedAttempt {
                output: "delete(gym)".to_string(),
                error: "bad index".to_string(),
            }),
        };
        let text = interpreter(&backend)
            .commands(&[], &request)
            .await
            .unwrap();
        assert_eq!(text, "delete(0)");

        let requests = backend.requests();
        let sent = &requests[0];
        let roles: Vec<_> = sent.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![MessageRole::User, MessageRole::Assistant, MessageRole::User]
        );
        assert!(sent.last_content().unwrap().contains("bad index"));
    }

    #[tokio::test]
    async fn onboarding_extracts_fields() {
        let backend = ScriptedBackend::new([
            "Thanks Mary! You can now ask me for reminders.\n---\nname: Mary\ntimezone: `America/Los_Angeles`",
        ]);
        let onboarding = interpreter(&backend).onboard(&[], "Mary, LA").await.unwrap();
        assert_eq!(onboarding.reply, "Thanks Mary! You can now ask me for reminders.");
        assert_eq!(onboarding.name.as_deref(), Some("Mary"));
        assert_eq!(onboarding.timezone.as_deref(), Some("America/Los_Angeles"));
    }

    #[tokio::test]
    async fn onboarding_without_fields_is_plain_reply() {
        let backend = ScriptedBackend::new(["Hi! What should I call you?"]);
        let onboarding = interpreter(&backend).onboard(&[], "hello").await.unwrap();
        assert_eq!(onboarding.reply, "Hi! What should I call you?");
        assert_eq!(onboarding.name, None);
    }

    #[tokio::test]
    async fn onboarding_history_keeps_setup_entries_only() {
        let now = Utc::now();
        let setup = LogEntry::assistant("What's your name?", now).with_kind(EntryKind::Setup);
        let chat = LogEntry::user("unrelated", now);
        let backend = ScriptedBackend::new(["ok"]);
        interpreter(&backend)
            .onboard(&[&setup, &chat], "Bob")
            .await
            .unwrap();
        let requests = backend.requests();
        let sent = &requests[0];
        assert_eq!(sent.messages.len(), 2);
        assert_eq!(sent.messages[0].content, "What's your name?");
    }

    #[tokio::test]
    async fn confirmation_follows_marker() {
        let backend = ScriptedBackend::new(["@user: All set for 10 am! 🎉"]);
        assert_eq!(
            interpreter(&backend).confirm(&[]).await.unwrap(),
            Some("All set for 10 am! 🎉".to_string())
        );

        let backend = ScriptedBackend::new(["no marker here"]);
        assert_eq!(interpreter(&backend).confirm(&[]).await.unwrap(), None);
    }

    #[test]
    fn command_entries_are_hidden_from_chat() {
        let now = Utc::now();
        let cmd = LogEntry::assistant("delete(0)", now).with_kind(EntryKind::Command);
        let user = LogEntry::user("hi", now);
        let turns = chat_turns(&[&cmd, &user]);
        assert_eq!(turns, vec![LlmMessage::user("hi")]);
    }

    #[tokio::test]
    async fn scripted_interpreter_records_requests() {
        let scripted = ScriptedInterpreter::new().writes_commands("fetch()");
        let request = CommandRequest {
            request: "@manager: list".to_string(),
            reminders: String::new(),
            retry: None,
        };
        assert_eq!(scripted.commands(&[], &request).await.unwrap(), "fetch()");
        assert_eq!(scripted.command_requests(), vec![request.clone()]);
        assert_eq!(
            scripted.commands(&[], &request).await,
            Err(InterpretError::EmptyResponse)
        );
    }
}
