//! OpenAI chat-completions compatible adapter.
//!
//! Serves every provider that speaks `POST {base}/chat/completions`: OpenAI
//! itself, DeepSeek, DashScope's compatible mode, SiliconFlow, and Gemini when it
//! is configured with its `/openai` compatibility base URL.

mod error;
mod provider;
mod request;
mod response;
mod types;

pub use provider::OpenAiChatProvider;
