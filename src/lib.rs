//! 多后端 LLM 路由客户端
//!
//! [`LLMClient`] sends a chat request to a configured provider and, when that
//! provider keeps failing, degrades along a fallback chain. A provider that
//! successfully stood in for another is remembered per context, so later calls
//! go straight to it.
//!
//! ```no_run
//! use dialecta_llm::{ChatMessage, ChatRequest, LLMClient};
//!
//! # fn main() -> Result<(), dialecta_llm::LLMError> {
//! let client = LLMClient::builder()
//!     .config_path("llm/config.json")
//!     .context_id("/work/paper.md")
//!     .build()?;
//! let response = client.chat(
//!     ChatRequest::new(vec![ChatMessage::user("Summarize the argument.")]).provider("deepseek"),
//! )?;
//! println!("{} answered: {}", response.provider, response.content);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod fallback;
pub mod http;
pub mod overrides;
pub mod parallel;
pub mod provider;
pub mod retry;
pub mod types;

pub use client::{LLMClient, LLMClientBuilder};
pub use error::LLMError;
pub use provider::{ConnectionFactory, LLMProvider};
pub use retry::{ErrorKind, classify};
pub use types::*;
