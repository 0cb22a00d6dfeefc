//! Native Gemini `generateContent` adapter.
//!
//! Used for the `gemini` provider whenever its base URL is absent or does not
//! point at Google's OpenAI-compatible surface.

mod error;
mod provider;
mod request;
mod response;
mod types;

pub use provider::GoogleGeminiProvider;
