//! Advisory suggestions for weaver workflows.
//!
//! An [`Advisor`] sends a workflow to a language model and turns the reply
//! into typed [`Suggestion`]s. It never fails: when no backend is
//! configured, or the backend errors, times out or says nothing usable, the
//! advisor answers with a fixed fallback list. Suggestions never gate
//! execution.

pub mod backend;
pub mod error;
pub mod suggestion;

pub use backend::{ChatMessage, CompletionRequest, LlmBackend, MessageRole, OpenAiBackend};
pub use error::LlmError;
pub use suggestion::{Advisor, Suggestion, SuggestionKind, fallback_suggestions, parse_suggestions};
