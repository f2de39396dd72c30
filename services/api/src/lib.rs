//! Cubby API Library Crate
//!
//! The WebSocket server that relays audio and text between clients and a
//! Gemini Live session, executes the model's tool calls and closes idle
//! sessions. The `api` binary is a thin wrapper around this library.

pub mod config;
pub mod error;
pub mod handlers;
pub mod prompts;
pub mod router;
pub mod state;
pub mod ws;
