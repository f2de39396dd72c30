//! Gemini Live
//!
//! A client for the Gemini Live bidirectional streaming API that implements
//! the upstream contract from `cubby-core`. Works against both Vertex AI and
//! the Gemini Developer API.

pub mod client;
pub mod config;
pub mod types;

pub use client::{GeminiLiveConnector, GeminiReceiver, GeminiSender, connect};
pub use config::{Backend, LiveConfig};
