//! `streetlink-arbiter`: language-model arbitration for ambiguous street
//! matches.
//!
//! Implements [`streetlink_linker::Arbiter`] over OpenAI, Gemini and a local
//! Ollama server. Blocking HTTP; the linker supplies the concurrency.

pub mod client;
pub mod config;
pub mod error;
pub mod parse;
pub mod prompt;

pub use client::LlmArbiter;
pub use config::{get_api_key, ArbiterSettings, KeyLookup, KeySource, Provider, ResolvedArbiterConfig};
pub use error::ArbiterError;
