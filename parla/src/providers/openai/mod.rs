//! `OpenAI`-compatible chat completions backend.

mod client;
mod completion;

pub use client::{OPENAI_API_BASE_URL, OpenAiClient, OpenAiClientBuilder};
