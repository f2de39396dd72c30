//! Cubby Core
//!
//! Provider-agnostic building blocks for the realtime voice relay: the tool
//! registry and the storage business tools it dispatches to, the inactivity
//! state machine, and the send/receive contract every upstream streaming
//! session implements.

pub mod generic_types;
pub mod inactivity;
pub mod realtime_api;
pub mod storage;
pub mod tools;

pub use generic_types::{ToolInvocation, ToolResult, UpstreamEvent};
pub use realtime_api::{
    UpstreamConnector, UpstreamError, UpstreamEvents, UpstreamSession, UpstreamSink,
};
pub use tools::{ToolDeclaration, ToolError, ToolRegistry};
