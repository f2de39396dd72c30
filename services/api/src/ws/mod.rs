//! WebSocket Session Relay
//!
//! - `protocol`: the JSON envelopes exchanged with the client.
//! - `client_session`: per-connection shared state.
//! - `relay`: the four concurrent activities and their shutdown.
//! - `supervisor`: the inactivity-check activity.
//! - `session`: the axum upgrade handler and socket writer.

pub mod client_session;
pub mod protocol;
pub mod relay;
pub mod session;
mod supervisor;

pub use session::ws_handler;
