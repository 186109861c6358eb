//! Error type shared by the session core.
//!
//! Two families live here:
//! - wiring bugs (`ChannelNotRegistered`, `DispatchDepthExceeded`) that should
//!   surface loudly during development
//! - user-level rejections (`IllegalTransition`, `RequestTimedOut`) that the
//!   controller recovers from locally after warning the user

use std::time::Duration;

use crate::core::session::SessionState;

/// Result alias used across the core.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Publish into a channel nobody ever subscribed to.
    #[error("channel '{channel}' is not registered")]
    ChannelNotRegistered { channel: String },

    /// Nested publishes went deeper than the bus allows.
    #[error("dispatch depth {depth} exceeded while publishing '{channel}'")]
    DispatchDepthExceeded { channel: String, depth: usize },

    /// Action not allowed in the current session state.
    #[error("{action} rejected in state {state}: {reason}")]
    IllegalTransition {
        action: &'static str,
        state: SessionState,
        reason: String,
    },

    /// Segment window requested before any video bounds were set.
    #[error("frame bounds are not set (no video loaded)")]
    BoundsUnset,

    /// A waiting state never received its completion event.
    #[error("{waiting} timed out after {elapsed:?}")]
    RequestTimedOut {
        waiting: SessionState,
        elapsed: Duration,
    },

    /// Failure reported by the backend link while sending.
    #[error("backend link error: {0}")]
    Backend(String),
}

impl Error {
    /// True for errors the controller handles by warning the user and
    /// keeping the session alive.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::IllegalTransition { .. } | Error::RequestTimedOut { .. })
    }

    pub(crate) fn illegal(action: &'static str, state: SessionState, reason: impl Into<String>) -> Self {
        Error::IllegalTransition {
            action,
            state,
            reason: reason.into(),
        }
    }
}

/// Keep bus dispatch alive after a user-level rejection.
pub(crate) fn recover(err: Error) -> Result<()> {
    if err.is_recoverable() { Ok(()) } else { Err(err) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_split() {
        assert!(Error::illegal("propagate", SessionState::NoSession, "nothing loaded").is_recoverable());
        assert!(!Error::ChannelNotRegistered { channel: "x".into() }.is_recoverable());
        assert!(!Error::BoundsUnset.is_recoverable());
    }

    #[test]
    fn test_display_mentions_channel() {
        let e = Error::ChannelNotRegistered { channel: "segmentLoaded".into() };
        assert_eq!(e.to_string(), "channel 'segmentLoaded' is not registered");
    }
}
