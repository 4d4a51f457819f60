//! Language-model interpretation for the chime reminder engine.
//!
//! This crate provides:
//!
//! - **Backend**: A chat-completion abstraction with an OpenAI-compatible
//!   HTTP implementation
//! - **Interpreter**: The seam that turns conversation into replies,
//!   requests and command text, with a model-backed implementation
//! - **Commands**: The closed command union and its line parser
//! - **Resolver**: The model fallback for free-form frequencies

pub mod backend;
pub mod command;
pub mod error;
pub mod interpreter;
pub mod openai;
pub mod prompt;
pub mod resolver;

pub use backend::{LlmBackend, LlmMessage, LlmRequest, LlmResponse, MessageRole, ScriptedBackend};
pub use command::{
    Command, DeleteArgs, ReminderArgs, TimezoneArgs, UpdateArgs, parse_commands,
};
pub use error::{CommandError, InterpretError, LlmError};
pub use interpreter::{
    CommandRequest, FailedAttempt, InterpretContext, Interpretation, Interpreter, LlmInterpreter,
    Onboarding, ScriptedInterpreter,
};
pub use openai::{OpenAiBackend, OpenAiConfig};
pub use resolver::LlmOccurrenceResolver;
