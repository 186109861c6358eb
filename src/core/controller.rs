//! Session controller: drives [`SessionMachine`] from bus events.
//!
//! The machine decides; the controller performs the side effects around each
//! decision:
//! - sends the backend request that a transition waits on
//! - resets collaborators (`sessionReset`, `segmentReset`)
//! - announces the new state and its affordances after releasing its lock
//! - warns the user when an action is rejected
//!
//! Backend events that arrive in a state that does not expect them are logged
//! and dropped. A waiting state may be escalated with [`poll_timeouts`] once the
//! configured request timeout has elapsed.
//!
//! [`poll_timeouts`]: SessionController::poll_timeouts

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::core::backend::{BackendLink, ModelParam, Outbound};
use crate::core::backend_events::*;
use crate::core::categories::CategoryRegistry;
use crate::core::event_bus::EventBus;
use crate::core::interactions::InteractionRecorder;
use crate::core::prompt::Prompt;
use crate::core::session::{Affordances, SessionMachine, SessionState};
use crate::core::ui_events::*;
use crate::core::window::FrameRange;
use crate::error::{Error, Result, recover};

pub const ORIGIN: &str = "session";

const RESTORE_QUESTION: &str = "Do you want to reload the client?";

#[derive(Debug)]
struct ControllerState {
    machine: SessionMachine,
    /// Start of the outstanding backend request, if any.
    waiting_since: Option<Instant>,
    /// User confirmed a restore; NoSession once the backend reconnects.
    restore_pending: bool,
    connected: bool,
    /// Segment the backend confirmed; caps the propagation length.
    segment: Option<FrameRange>,
}

#[derive(Clone)]
pub struct SessionController {
    state: Arc<Mutex<ControllerState>>,
    bus: EventBus,
    link: Arc<dyn BackendLink>,
    prompt: Arc<dyn Prompt>,
    categories: CategoryRegistry,
    recorder: InteractionRecorder,
    timeout: Option<Duration>,
}

impl SessionController {
    pub fn new(
        bus: EventBus,
        link: Arc<dyn BackendLink>,
        prompt: Arc<dyn Prompt>,
        categories: CategoryRegistry,
        recorder: InteractionRecorder,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(ControllerState {
                machine: SessionMachine::new(),
                waiting_since: None,
                restore_pending: false,
                connected: true,
                segment: None,
            })),
            bus,
            link,
            prompt,
            categories,
            recorder,
            timeout,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn attach(&self) {
        let bus = &self.bus;

        // User intents
        let this = self.clone();
        bus.subscribe::<VideoRequested, _>(VIDEO_REQUESTED, ORIGIN, move |e| {
            this.request_video(&e.path).or_else(recover)
        });
        let this = self.clone();
        bus.subscribe::<SessionLoadRequested, _>(SESSION_LOAD_REQUESTED, ORIGIN, move |e| {
            this.load_session(&e.path).or_else(recover)
        });
        let this = self.clone();
        bus.subscribe::<TimelineClicked, _>(TIMELINE_CLICKED, ORIGIN, move |e| {
            this.request_segment(e.0).or_else(recover)
        });
        let this = self.clone();
        bus.subscribe::<PropagateClicked, _>(PROPAGATE_CLICKED, ORIGIN, move |_| this.propagate().or_else(recover));
        let this = self.clone();
        bus.subscribe::<SaveClicked, _>(SAVE_CLICKED, ORIGIN, move |e| this.save(e.overlayed).or_else(recover));
        let this = self.clone();
        bus.subscribe::<UndoClicked, _>(UNDO_CLICKED, ORIGIN, move |_| this.undo().or_else(recover));
        let this = self.clone();
        bus.subscribe::<PointDrawn, _>(POINT_DRAWN, ORIGIN, move |e| this.send_point(e).or_else(recover));
        let this = self.clone();
        bus.subscribe::<PathEnded, _>(PATH_ENDED, ORIGIN, move |e| this.end_path(e.frame_index).or_else(recover));
        let this = self.clone();
        bus.subscribe::<KeyPressed, _>(KEY_PRESSED, ORIGIN, move |e| this.on_key(&e.key));
        let this = self.clone();
        bus.subscribe::<SegmentSizeSet, _>(SEGMENT_SIZE_SET, ORIGIN, move |e| this.send_segment_size(e.segment_size));
        let this = self.clone();
        bus.subscribe::<PropagationLengthSet, _>(PROPAGATION_LENGTH_SET, ORIGIN, move |e| {
            this.set_propagation_length(e.length)
        });
        let this = self.clone();
        bus.subscribe::<BorderPropagationSet, _>(BORDER_PROPAGATION_SET, ORIGIN, move |e| {
            this.set_border_propagation(e.enabled)
        });

        // Backend completions
        let this = self.clone();
        bus.subscribe::<VideoLoaded, _>(VIDEO_LOADED, ORIGIN, move |e| this.on_video_loaded(e));
        let this = self.clone();
        bus.subscribe::<SegmentSizePushed, _>(SEGMENT_SIZE_PUSHED, ORIGIN, move |e| {
            this.send_segment_size(e.segment_size)
        });
        let this = self.clone();
        bus.subscribe::<SegmentLoaded, _>(SEGMENT_LOADED, ORIGIN, move |e| this.on_segment_loaded(e.0));
        let this = self.clone();
        bus.subscribe::<PropagationFinished, _>(PROPAGATION_FINISHED, ORIGIN, move |_| {
            this.on_propagation_finished()
        });
        let this = self.clone();
        bus.subscribe::<FreeMemory, _>(FREE_MEMORY, ORIGIN, move |e| this.on_free_memory(e.value));
        let this = self.clone();
        bus.subscribe::<RestoreRequested, _>(RESTORE_REQUESTED, ORIGIN, move |_| this.on_restore_requested());
        let this = self.clone();
        bus.subscribe::<Connection, _>(CONNECTION, ORIGIN, move |e| this.on_connection(e.connected));
    }

    /// Announce the initial NoSession state.
    pub fn start(&self) -> Result<()> {
        let change = {
            let st = self.lock();
            SessionStateChanged {
                state: st.machine.current(),
                previous: st.machine.previous(),
            }
        };
        info!("Session controller started in {}", change.state);
        self.announce(Some(change))
    }

    // ========== Transition plumbing ==========

    /// Run `f` on the machine. Returns the change to announce, if any.
    fn step<F>(&self, new_request: bool, f: F) -> Result<Option<SessionStateChanged>>
    where
        F: FnOnce(&mut SessionMachine) -> Result<SessionState>,
    {
        let mut st = self.lock();
        let before = (st.machine.current(), st.machine.previous());
        f(&mut st.machine)?;
        let after = (st.machine.current(), st.machine.previous());

        st.waiting_since = match st.machine.awaiting() {
            None => None,
            Some(_) if new_request || st.waiting_since.is_none() => Some(Instant::now()),
            Some(_) => st.waiting_since,
        };

        if before == after {
            return Ok(None);
        }
        info!("Session: {} -> {}", before.0, after.0);
        Ok(Some(SessionStateChanged {
            state: after.0,
            previous: after.1,
        }))
    }

    /// Publish state and affordances. Must run without the lock held.
    fn announce(&self, change: Option<SessionStateChanged>) -> Result<()> {
        let Some(change) = change else {
            return Ok(());
        };
        self.bus.publish(SESSION_STATE_CHANGED, &change)?;
        publish_affordances(&self.bus, change.state)
    }

    /// Warn the user about a rejected action and hand the error back.
    fn reject(&self, err: Error) -> Error {
        if let Error::IllegalTransition { action, state, reason } = &err {
            warn!("{} rejected in {}: {}", action, state, reason);
            self.prompt.warn(reason);
        }
        err
    }

    /// Check an affordance of the current state.
    fn gate(&self, action: &'static str, allowed: impl Fn(&Affordances) -> bool) -> Result<SessionState> {
        let state = self.state();
        let affordances = state.affordances();
        if allowed(&affordances) {
            Ok(state)
        } else {
            let reason = affordances
                .disabled_reason
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| format!("Can't {} right now.", action));
            Err(Error::illegal(action, state, reason))
        }
    }

    fn late(&self, event: &str, err: Error) -> Result<()> {
        match err {
            Error::IllegalTransition { state, .. } => {
                warn!("Ignoring {} in state {}", event, state);
                Ok(())
            }
            other => Err(other),
        }
    }

    // ========== User intents ==========

    /// Open a video: reset everything and wait for its metadata.
    pub fn request_video(&self, path: &str) -> Result<()> {
        let change = self
            .step(true, |m| m.begin_video_load())
            .map_err(|e| self.reject(e))?;
        info!("Requesting video {}", path);
        self.lock().segment = None;
        self.bus.publish(SESSION_RESET, &SessionReset)?;
        self.link.send(&Outbound::RequestLoadVideo { path: path.to_string() })?;
        self.announce(change)
    }

    /// Resume a saved session from disk.
    pub fn load_session(&self, path: &str) -> Result<()> {
        let change = self
            .step(true, |m| m.begin_video_load())
            .map_err(|e| self.reject(e))?;
        info!("Loading session {}", path);
        self.lock().segment = None;
        self.bus.publish(SESSION_RESET, &SessionReset)?;
        self.link.send(&Outbound::LoadSession { path: path.to_string() })?;
        self.announce(change)
    }

    /// Switch the active segment. Needs a non-background category.
    pub fn request_segment(&self, range: FrameRange) -> Result<()> {
        let has_category = self.categories.has_category();
        let change = self
            .step(true, |m| m.request_segment(has_category))
            .map_err(|e| self.reject(e))?;
        info!("Requesting segment {}-{}", range.from, range.to);
        self.lock().segment = None;
        self.bus.publish(SEGMENT_RESET, &SegmentReset)?;
        self.link.send(&Outbound::load_segment(range))?;
        self.announce(change)
    }

    pub fn propagate(&self) -> Result<()> {
        let change = self
            .step(true, |m| m.request_propagation())
            .map_err(|e| self.reject(e))?;
        self.link.send(&Outbound::RequestPropagate)?;
        self.announce(change)
    }

    pub fn save(&self, overlayed: bool) -> Result<()> {
        let action = if overlayed { "save overlay" } else { "save" };
        self.gate(action, |a| if overlayed { a.save_overlay } else { a.save })
            .map_err(|e| self.reject(e))?;
        self.link.send(&Outbound::SaveSession { overlayed })
    }

    /// Undo the last stroke on the current frame.
    pub fn undo(&self) -> Result<()> {
        self.gate("undo", |a| a.undo).map_err(|e| self.reject(e))?;
        self.link.send(&Outbound::UndoInteraction {
            frame_index: self.recorder.current_frame(),
        })
    }

    /// Forward a drawn point. Only a loaded segment accepts strokes.
    pub fn send_point(&self, point: &PointDrawn) -> Result<()> {
        self.require_segment("draw")?;
        self.link.send(&Outbound::Point(point.clone()))
    }

    /// Close the stroke and record the frame as interacted.
    pub fn end_path(&self, frame_index: i32) -> Result<()> {
        self.require_segment("end path")?;
        self.link.send(&Outbound::EndPath { frame_index })?;
        self.recorder.record_interaction(frame_index)
    }

    fn require_segment(&self, action: &'static str) -> Result<()> {
        let state = self.state();
        if state == SessionState::SegmentLoaded {
            Ok(())
        } else {
            debug!("Dropping {} in {}", action, state);
            Err(Error::illegal(action, state, "No segment loaded."))
        }
    }

    // ========== Model parameters ==========

    /// Tell the backend the segment size. Sizes pushed by the backend are echoed too.
    pub fn send_segment_size(&self, segment_size: u32) -> Result<()> {
        self.link
            .send(&Outbound::ChangeModelParam(ModelParam::SegmentSize { segment_size }))
    }

    /// Send a user-chosen propagation length, capped to the loaded segment.
    pub fn set_propagation_length(&self, length: i32) -> Result<()> {
        let segment = self.lock().segment;
        let capped = match segment {
            Some(range) => length.min(range.len()).max(1),
            None => length.max(1),
        };
        if capped != length {
            debug!("Propagation length {} capped to {}", length, capped);
        }
        self.link
            .send(&Outbound::ChangeModelParam(ModelParam::PropagationLength { length: capped }))
    }

    pub fn set_border_propagation(&self, on: bool) -> Result<()> {
        info!("Border propagation {}", if on { "on" } else { "off" });
        self.link
            .send(&Outbound::ChangeModelParam(ModelParam::BorderPropagation { on }))
    }

    fn on_key(&self, key: &str) -> Result<()> {
        let panel = match key {
            "u" => return self.undo().or_else(recover),
            "s" => Panel::Settings,
            "f" => Panel::Files,
            "h" => Panel::Help,
            _ => return Ok(()),
        };
        self.bus.publish(PANEL_TOGGLED, &PanelToggled { panel })
    }

    // ========== Backend completions ==========

    fn on_video_loaded(&self, video: &VideoLoaded) -> Result<()> {
        let restore = std::mem::take(&mut self.lock().restore_pending);
        let resumed = video.was_resumed_session;
        let change = match self.step(false, |m| {
            if restore {
                m.reset();
            }
            m.video_loaded(resumed)
        }) {
            Ok(change) => change,
            Err(e) => return self.late(VIDEO_LOADED, e),
        };
        if video.length <= 0 {
            warn!("Video '{}' has no frames, segment switching stays off", video.name);
        }
        info!(
            "Video '{}' loaded: {} frames, {}x{}{}",
            video.name,
            video.length,
            video.width,
            video.height,
            if resumed { " (resumed)" } else { "" }
        );
        self.announce(change)
    }

    fn on_segment_loaded(&self, range: FrameRange) -> Result<()> {
        let change = match self.step(false, |m| m.segment_loaded()) {
            Ok(change) => change,
            Err(e) => return self.late(SEGMENT_LOADED, e),
        };
        self.lock().segment = Some(range);
        self.bus.publish(SEGMENT_ACTIVATED, &SegmentActivated(range))?;
        // Propagation length follows the segment
        self.link.send(&Outbound::ChangeModelParam(ModelParam::PropagationLength {
            length: range.len(),
        }))?;
        self.announce(change)
    }

    fn on_propagation_finished(&self) -> Result<()> {
        match self.step(false, |m| m.propagation_finished()) {
            Ok(change) => self.announce(change),
            Err(e) => self.late(PROPAGATION_FINISHED, e),
        }
    }

    fn on_free_memory(&self, value: i64) -> Result<()> {
        if value <= 0 {
            warn!("Backend reports free memory {}", value);
        }
        let change = self.step(false, |m| Ok(m.free_memory(value)))?;
        self.announce(change)
    }

    fn on_restore_requested(&self) -> Result<()> {
        if !self.prompt.confirm(RESTORE_QUESTION) {
            info!("Restore declined");
            return Ok(());
        }
        info!("Restore confirmed, waiting for backend reconnect");
        {
            let mut st = self.lock();
            st.restore_pending = true;
            st.segment = None;
        }
        self.bus.publish(SESSION_RESET, &SessionReset)?;
        self.link.send(&Outbound::Restore)
    }

    fn on_connection(&self, connected: bool) -> Result<()> {
        let change = {
            let mut st = self.lock();
            st.connected = connected;
            if !connected {
                warn!("Backend link lost");
                return Ok(());
            }
            if !st.restore_pending {
                debug!("Backend link up");
                return Ok(());
            }
            st.restore_pending = false;
            st.waiting_since = None;
            let before = st.machine.current();
            st.machine.reset();
            info!("Session: {} -> NoSession (restored)", before);
            SessionStateChanged {
                state: st.machine.current(),
                previous: None,
            }
        };
        self.announce(Some(change))
    }

    // ========== Timeouts ==========

    /// Escalate an overdue LoadingData or Propagating wait.
    ///
    /// Falls back to the state the request was made from, publishes
    /// `requestTimedOut`, warns the user and returns `RequestTimedOut`.
    /// Time spent in NoMemory counts, but the wait only fails once the
    /// session is back in the waiting state.
    pub fn poll_timeouts(&self, now: Instant) -> Result<()> {
        let Some(limit) = self.timeout else {
            return Ok(());
        };
        let (waiting, restored, elapsed) = {
            let mut st = self.lock();
            let waiting = st.machine.current();
            let Some(since) = st.waiting_since.filter(|_| waiting.is_waiting()) else {
                return Ok(());
            };
            let elapsed = now.saturating_duration_since(since);
            if elapsed < limit {
                return Ok(());
            }
            let restored = st.machine.time_out()?;
            st.waiting_since = None;
            (waiting, restored, elapsed)
        };

        warn!("{} timed out after {:?}, back to {}", waiting, elapsed, restored);
        self.announce(Some(SessionStateChanged {
            state: restored,
            previous: self.previous(),
        }))?;
        self.bus.publish(
            REQUEST_TIMED_OUT,
            &RequestTimedOut {
                waiting,
                restored,
                elapsed_ms: elapsed.as_millis() as u64,
            },
        )?;
        self.prompt
            .warn(&format!("The backend did not answer in time ({}).", waiting));
        Err(Error::RequestTimedOut { waiting, elapsed })
    }

    // ========== Accessors ==========

    pub fn state(&self) -> SessionState {
        self.lock().machine.current()
    }

    pub fn previous(&self) -> Option<SessionState> {
        self.lock().machine.previous()
    }

    pub fn affordances(&self) -> Affordances {
        self.state().affordances()
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    pub fn is_restore_pending(&self) -> bool {
        self.lock().restore_pending
    }
}
