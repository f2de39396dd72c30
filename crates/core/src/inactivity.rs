//! Inactivity Supervisor
//!
//! A per-session state machine that escalates an idle user through
//! `Active → Warned → Terminated`. It only decides; the relay performs the
//! side effects (synthetic prompts, the client `timeout` message, stopping).
//!
//! The warned flag is one-way: once a session has been warned, later user
//! activity pushes the idle clock back but never re-arms the warning, so a
//! following idle stretch past the disconnect threshold terminates without a
//! second nudge.

use anyhow::{Result, ensure};
use std::time::Duration;

/// Prompt injected upstream when the warn threshold is crossed.
pub const WARN_PROMPT: &str = "The user has been silent for a while. Briefly and warmly ask \
    whether they are still there and if there is anything else you can help with.";

/// Prompt injected upstream right before the session is closed.
pub const TERMINATE_PROMPT: &str = "The user has not responded. Politely say goodbye and let \
    them know this session is ending due to inactivity.";

/// Payload of the `timeout` message sent to the client.
pub const TIMEOUT_MESSAGE: &str = "Session ended due to inactivity";

/// Idle thresholds, `warn_after < disconnect_after`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InactivityPolicy {
    warn_after: Duration,
    disconnect_after: Duration,
}

impl InactivityPolicy {
    pub fn new(warn_after: Duration, disconnect_after: Duration) -> Result<Self> {
        ensure!(
            warn_after < disconnect_after,
            "warn threshold ({:?}) must be shorter than disconnect threshold ({:?})",
            warn_after,
            disconnect_after
        );
        Ok(Self {
            warn_after,
            disconnect_after,
        })
    }

    pub fn from_secs(warn_after: u64, disconnect_after: u64) -> Result<Self> {
        Self::new(
            Duration::from_secs(warn_after),
            Duration::from_secs(disconnect_after),
        )
    }

    pub fn warn_after(&self) -> Duration {
        self.warn_after
    }

    pub fn disconnect_after(&self) -> Duration {
        self.disconnect_after
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InactivityState {
    Active,
    Warned,
    Terminated,
}

/// What the caller must do after an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InactivityAction {
    None,
    Warn,
    Terminate,
}

#[derive(Debug, Clone)]
pub struct InactivityMonitor {
    policy: InactivityPolicy,
    state: InactivityState,
}

impl InactivityMonitor {
    pub fn new(policy: InactivityPolicy) -> Self {
        Self {
            policy,
            state: InactivityState::Active,
        }
    }

    pub fn state(&self) -> InactivityState {
        self.state
    }

    pub fn policy(&self) -> &InactivityPolicy {
        &self.policy
    }

    /// Advances the state machine given the current idle time.
    ///
    /// A session is always warned before it is terminated: an idle time that
    /// is already past the disconnect threshold yields `Warn` first and
    /// `Terminate` on the next evaluation.
    pub fn evaluate(&mut self, idle: Duration) -> InactivityAction {
        match self.state {
            InactivityState::Active if idle >= self.policy.warn_after => {
                self.state = InactivityState::Warned;
                InactivityAction::Warn
            }
            InactivityState::Warned if idle >= self.policy.disconnect_after => {
                self.state = InactivityState::Terminated;
                InactivityAction::Terminate
            }
            _ => InactivityAction::None,
        }
    }
}
