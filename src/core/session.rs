//! Session lifecycle state machine.
//!
//! **Ownership**: [`SessionMachine`] is pure data + transition rules. It never
//! publishes, sends or prompts; [`SessionController`](super::controller::SessionController)
//! wraps it and performs the side effects.
//!
//! # States
//!
//! ```text
//! NoSession ──request video──> LoadingData ──video──> LoadedVideoSession / LoadedSession
//!                                   ^                         │
//!                                   └──── request segment ────┘
//! LoadingData ──segment loaded──> SegmentLoaded ──propagate──> Propagating ──done──> SegmentLoaded
//! any ──memory <= 0──> NoMemory ──memory > 0──> (interrupted state)
//! ```
//!
//! # Interruption memory
//!
//! `previous` holds the stable state interrupted by `Propagating` or `NoMemory`
//! and is never itself one of those two. Running out of memory mid-propagation
//! keeps the pre-propagation state in `previous` and remembers the pending
//! propagation separately, so freeing memory resumes `Propagating`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    NoSession,
    LoadedSession,
    LoadedVideoSession,
    LoadingData,
    SegmentLoaded,
    NoMemory,
    Propagating,
}

impl SessionState {
    pub const ALL: [SessionState; 7] = [
        SessionState::NoSession,
        SessionState::LoadedSession,
        SessionState::LoadedVideoSession,
        SessionState::LoadingData,
        SessionState::SegmentLoaded,
        SessionState::NoMemory,
        SessionState::Propagating,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SessionState::NoSession => "NoSession",
            SessionState::LoadedSession => "LoadedSession",
            SessionState::LoadedVideoSession => "LoadedVideoSession",
            SessionState::LoadingData => "LoadingData",
            SessionState::SegmentLoaded => "SegmentLoaded",
            SessionState::NoMemory => "NoMemory",
            SessionState::Propagating => "Propagating",
        }
    }

    /// States that suspend another state and later restore it.
    pub fn is_interruption(&self) -> bool {
        matches!(self, SessionState::NoMemory | SessionState::Propagating)
    }

    /// States waiting on a backend completion event.
    pub fn is_waiting(&self) -> bool {
        matches!(self, SessionState::LoadingData | SessionState::Propagating)
    }

    /// UI directive for this state. Every affordance is set explicitly.
    pub fn affordances(&self) -> Affordances {
        match self {
            SessionState::NoSession => Affordances::locked("No session/video loaded."),
            SessionState::LoadedVideoSession => Affordances {
                category: true,
                timeline_switch: true,
                ..Affordances::locked("")
            }
            .without_reason(),
            SessionState::LoadedSession => Affordances {
                timeline_switch: true,
                ..Affordances::locked("")
            }
            .without_reason(),
            SessionState::SegmentLoaded => Affordances {
                propagate: true,
                save: true,
                save_overlay: true,
                undo: true,
                category: false,
                timeline_switch: true,
                disabled_reason: None,
            },
            SessionState::LoadingData => Affordances::locked("Can't switch segment during loading!"),
            SessionState::NoMemory => Affordances::locked("Memory is zero!"),
            SessionState::Propagating => Affordances::locked("Can't switch segment during propagation!"),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Enabled/disabled status of every session-gated control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Affordances {
    pub propagate: bool,
    pub save: bool,
    pub save_overlay: bool,
    pub undo: bool,
    pub category: bool,
    pub timeline_switch: bool,
    /// Shown when the user tries to switch segment while switching is off.
    pub disabled_reason: Option<String>,
}

impl Affordances {
    /// Everything disabled, timeline switching blocked for `reason`.
    fn locked(reason: &str) -> Self {
        Self {
            propagate: false,
            save: false,
            save_overlay: false,
            undo: false,
            category: false,
            timeline_switch: false,
            disabled_reason: Some(reason.to_string()),
        }
    }

    fn without_reason(mut self) -> Self {
        self.disabled_reason = None;
        self
    }
}

/// Pure session state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMachine {
    current: SessionState,
    previous: Option<SessionState>,
    /// Propagation still running on the backend while we sit in NoMemory.
    propagation_pending: bool,
    /// Where a timed-out LoadingData falls back to.
    loading_fallback: SessionState,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMachine {
    /// App init: NoSession.
    pub fn new() -> Self {
        Self {
            current: SessionState::NoSession,
            previous: None,
            propagation_pending: false,
            loading_fallback: SessionState::NoSession,
        }
    }

    pub fn current(&self) -> SessionState {
        self.current
    }

    /// Interrupted state, only set while in NoMemory or Propagating.
    pub fn previous(&self) -> Option<SessionState> {
        self.previous
    }

    pub fn propagation_pending(&self) -> bool {
        self.propagation_pending
    }

    /// State whose completion event is outstanding, looking through NoMemory.
    pub fn awaiting(&self) -> Option<SessionState> {
        match self.current {
            SessionState::LoadingData | SessionState::Propagating => Some(self.current),
            SessionState::NoMemory if self.propagation_pending => Some(SessionState::Propagating),
            SessionState::NoMemory if self.previous == Some(SessionState::LoadingData) => {
                Some(SessionState::LoadingData)
            }
            _ => None,
        }
    }

    /// Back to NoSession, forgetting every interruption.
    pub fn reset(&mut self) -> SessionState {
        *self = Self::new();
        self.current
    }

    /// A new video or saved session is being requested.
    pub fn begin_video_load(&mut self) -> Result<SessionState> {
        match self.current {
            SessionState::Propagating | SessionState::NoMemory => Err(self.blocked("load video")),
            _ => {
                self.loading_fallback = SessionState::NoSession;
                self.previous = None;
                self.current = SessionState::LoadingData;
                Ok(self.current)
            }
        }
    }

    /// Video metadata arrived.
    pub fn video_loaded(&mut self, resumed: bool) -> Result<SessionState> {
        let target = if resumed {
            SessionState::LoadedSession
        } else {
            SessionState::LoadedVideoSession
        };
        match self.current {
            SessionState::NoSession | SessionState::LoadingData => {
                self.current = target;
                Ok(self.current)
            }
            SessionState::NoMemory
                if matches!(self.previous, Some(SessionState::NoSession | SessionState::LoadingData)) =>
            {
                self.previous = Some(target);
                Ok(self.current)
            }
            state => Err(Error::illegal("video loaded", state, "no video load in progress")),
        }
    }

    /// User asked to switch segment. Rejected without a real category.
    pub fn request_segment(&mut self, has_category: bool) -> Result<SessionState> {
        if !has_category {
            return Err(Error::illegal("switch segment", self.current, "Please add a category!"));
        }
        match self.current {
            SessionState::LoadedSession | SessionState::LoadedVideoSession | SessionState::SegmentLoaded => {
                self.loading_fallback = self.current;
                self.current = SessionState::LoadingData;
                Ok(self.current)
            }
            _ => Err(self.blocked("switch segment")),
        }
    }

    /// Backend finished loading the requested segment.
    pub fn segment_loaded(&mut self) -> Result<SessionState> {
        match self.current {
            SessionState::LoadingData => {
                self.current = SessionState::SegmentLoaded;
                Ok(self.current)
            }
            SessionState::NoMemory if self.previous == Some(SessionState::LoadingData) => {
                self.previous = Some(SessionState::SegmentLoaded);
                Ok(self.current)
            }
            state => Err(Error::illegal("segment loaded", state, "no segment load in progress")),
        }
    }

    pub fn request_propagation(&mut self) -> Result<SessionState> {
        match self.current {
            SessionState::SegmentLoaded => {
                self.previous = Some(self.current);
                self.propagation_pending = true;
                self.current = SessionState::Propagating;
                Ok(self.current)
            }
            _ => Err(self.blocked("propagate")),
        }
    }

    pub fn propagation_finished(&mut self) -> Result<SessionState> {
        match self.current {
            SessionState::Propagating => {
                self.propagation_pending = false;
                self.current = self.previous.take().unwrap_or(SessionState::SegmentLoaded);
                Ok(self.current)
            }
            SessionState::NoMemory if self.propagation_pending => {
                // Stay out of memory; freeing memory now restores `previous`.
                self.propagation_pending = false;
                Ok(self.current)
            }
            state => Err(Error::illegal("propagation finished", state, "no propagation running")),
        }
    }

    /// Free-memory report from the backend.
    pub fn free_memory(&mut self, value: i64) -> SessionState {
        if value <= 0 {
            match self.current {
                SessionState::NoMemory => {}
                SessionState::Propagating => {
                    // previous already holds the pre-propagation state
                    self.current = SessionState::NoMemory;
                }
                state => {
                    self.previous = Some(state);
                    self.current = SessionState::NoMemory;
                }
            }
        } else if self.current == SessionState::NoMemory {
            if self.propagation_pending {
                self.current = SessionState::Propagating;
            } else {
                self.current = self.previous.take().unwrap_or(SessionState::NoSession);
            }
        }
        self.current
    }

    /// Give up on the outstanding request: LoadingData falls back to where
    /// the request was made from, Propagating to its interrupted state.
    pub fn time_out(&mut self) -> Result<SessionState> {
        match self.current {
            SessionState::LoadingData => {
                self.current = self.loading_fallback;
                Ok(self.current)
            }
            SessionState::Propagating => {
                self.propagation_pending = false;
                self.current = self.previous.take().unwrap_or(SessionState::SegmentLoaded);
                Ok(self.current)
            }
            state => Err(Error::illegal("time out", state, "nothing is pending")),
        }
    }

    fn blocked(&self, action: &'static str) -> Error {
        let reason = self
            .current
            .affordances()
            .disabled_reason
            .unwrap_or_else(|| format!("not allowed in {}", self.current));
        Error::illegal(action, self.current, reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine_in(state: SessionState) -> SessionMachine {
        let mut m = SessionMachine::new();
        match state {
            SessionState::NoSession => {}
            SessionState::LoadingData => {
                m.begin_video_load().unwrap();
            }
            SessionState::LoadedVideoSession => {
                m.video_loaded(false).unwrap();
            }
            SessionState::LoadedSession => {
                m.video_loaded(true).unwrap();
            }
            SessionState::SegmentLoaded => {
                m.video_loaded(false).unwrap();
                m.request_segment(true).unwrap();
                m.segment_loaded().unwrap();
            }
            SessionState::Propagating => {
                m = machine_in(SessionState::SegmentLoaded);
                m.request_propagation().unwrap();
            }
            SessionState::NoMemory => {
                m = machine_in(SessionState::LoadedVideoSession);
                m.free_memory(0);
            }
        }
        assert_eq!(m.current(), state);
        m
    }

    #[test]
    fn test_affordances_total() {
        for state in SessionState::ALL {
            let a = state.affordances();
            // Disabled switching always explains itself, enabled never does
            assert_eq!(a.timeline_switch, a.disabled_reason.is_none(), "{state}");
        }
        assert!(SessionState::SegmentLoaded.affordances().propagate);
        assert!(SessionState::LoadedVideoSession.affordances().category);
        assert!(!SessionState::LoadedSession.affordances().category);
        assert!(!SessionState::Propagating.affordances().save);
    }

    #[test]
    fn test_video_loaded_picks_session_kind() {
        let mut m = machine_in(SessionState::LoadingData);
        assert_eq!(m.video_loaded(true).unwrap(), SessionState::LoadedSession);
        let mut m = SessionMachine::new();
        assert_eq!(m.video_loaded(false).unwrap(), SessionState::LoadedVideoSession);
    }

    #[test]
    fn test_segment_without_category_rejected() {
        let mut m = machine_in(SessionState::LoadedVideoSession);
        let before = m.clone();
        let err = m.request_segment(false).unwrap_err();
        assert!(matches!(err, Error::IllegalTransition { action: "switch segment", .. }));
        assert_eq!(m, before);
    }

    #[test]
    fn test_segment_blocked_while_propagating() {
        let mut m = machine_in(SessionState::Propagating);
        let err = m.request_segment(true).unwrap_err();
        match err {
            Error::IllegalTransition { reason, .. } => {
                assert_eq!(reason, "Can't switch segment during propagation!")
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(m.current(), SessionState::Propagating);
    }

    #[test]
    fn test_propagation_round_trip() {
        let mut m = machine_in(SessionState::SegmentLoaded);
        m.request_propagation().unwrap();
        assert_eq!(m.previous(), Some(SessionState::SegmentLoaded));
        assert_eq!(m.propagation_finished().unwrap(), SessionState::SegmentLoaded);
        assert_eq!(m.previous(), None);
    }

    #[test]
    fn test_no_memory_nesting_keeps_first_previous() {
        let mut m = machine_in(SessionState::SegmentLoaded);
        assert_eq!(m.free_memory(-5), SessionState::NoMemory);
        assert_eq!(m.free_memory(0), SessionState::NoMemory);
        assert_eq!(m.previous(), Some(SessionState::SegmentLoaded));
        assert_eq!(m.free_memory(1024), SessionState::SegmentLoaded);
        assert_eq!(m.previous(), None);
    }

    #[test]
    fn test_no_memory_during_propagation() {
        let mut m = machine_in(SessionState::Propagating);
        m.free_memory(0);
        assert_eq!(m.current(), SessionState::NoMemory);
        // Never stores an interruption state as previous
        assert_eq!(m.previous(), Some(SessionState::SegmentLoaded));
        assert_eq!(m.awaiting(), Some(SessionState::Propagating));

        // Memory back while still propagating
        assert_eq!(m.free_memory(10), SessionState::Propagating);
        m.free_memory(0);
        // Propagation ends while out of memory
        assert_eq!(m.propagation_finished().unwrap(), SessionState::NoMemory);
        assert_eq!(m.free_memory(10), SessionState::SegmentLoaded);
    }

    #[test]
    fn test_positive_memory_outside_no_memory_is_noop() {
        let mut m = machine_in(SessionState::LoadedSession);
        assert_eq!(m.free_memory(100), SessionState::LoadedSession);
    }

    #[test]
    fn test_previous_never_interruption() {
        for state in SessionState::ALL {
            let mut m = machine_in(state);
            m.free_memory(0);
            m.free_memory(0);
            if let Some(prev) = m.previous() {
                assert!(!prev.is_interruption(), "{state} -> previous {prev}");
            }
        }
    }

    #[test]
    fn test_transitions_deterministic() {
        type Step = fn(&mut SessionMachine) -> Result<SessionState>;
        let steps: [Step; 7] = [
            |m| m.begin_video_load(),
            |m| m.video_loaded(false),
            |m| m.request_segment(true),
            |m| m.segment_loaded(),
            |m| m.request_propagation(),
            |m| m.propagation_finished(),
            |m| Ok(m.free_memory(0)),
        ];
        for state in SessionState::ALL {
            for step in steps {
                let (mut a, mut b) = (machine_in(state), machine_in(state));
                assert_eq!(step(&mut a), step(&mut b));
                assert_eq!(a, b);
            }
        }
    }

    #[test]
    fn test_segment_loaded_while_out_of_memory() {
        let mut m = machine_in(SessionState::LoadedVideoSession);
        m.request_segment(true).unwrap();
        m.free_memory(0);
        assert_eq!(m.segment_loaded().unwrap(), SessionState::NoMemory);
        assert_eq!(m.free_memory(1), SessionState::SegmentLoaded);
    }

    #[test]
    fn test_time_out_restores() {
        let mut m = machine_in(SessionState::SegmentLoaded);
        m.request_segment(true).unwrap();
        assert_eq!(m.time_out().unwrap(), SessionState::SegmentLoaded);

        let mut m = machine_in(SessionState::Propagating);
        assert_eq!(m.time_out().unwrap(), SessionState::SegmentLoaded);

        let mut m = machine_in(SessionState::LoadingData);
        assert_eq!(m.time_out().unwrap(), SessionState::NoSession);

        assert!(machine_in(SessionState::LoadedSession).time_out().is_err());
    }

    #[test]
    fn test_video_load_blocked_during_propagation() {
        let mut m = machine_in(SessionState::Propagating);
        assert!(m.begin_video_load().is_err());
        let mut m = machine_in(SessionState::SegmentLoaded);
        assert_eq!(m.begin_video_load().unwrap(), SessionState::LoadingData);
    }
}
