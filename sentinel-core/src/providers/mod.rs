//! LLM provider abstraction
//!
//! The intent resolver consumes a single capability — complete a
//! constrained prompt — behind the [`LlmProvider`] trait. The bundled HTTP
//! implementation talks to any OpenAI-compatible chat-completions endpoint
//! (the default deployment is a local Ollama instance).

pub mod http;
pub mod traits;

pub use http::OpenAiCompatProvider;
pub use traits::{CompletionRequest, CompletionResponse, LlmProvider, Message, Role};
