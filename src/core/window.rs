//! Segment window selection on the global timeline.
//!
//! [`compute_window`] is the pure algorithm: given the frame under the pointer,
//! the configured segment size and the video bounds it returns the contiguous
//! range that would become the active segment.
//!
//! [`SegmentWindowSelector`] is the global-timeline model around it: it holds the
//! bounds, the segment size, the switching gesture (press, move, release) and
//! the current highlight, and talks to the rest of the app only through the bus.
//!
//! # Window shape
//!
//! - odd size: symmetric, pointer in the exact center
//! - even size: one extra frame on the right of the pointer
//!
//! Near the ends the window is shifted, not truncated, so it keeps its full
//! width whenever the video has at least `segment_size` frames.
//!
//! Switching is off whenever the session says so or no bounds are known (no
//! video yet, an empty video, or a reset waiting for the backend).

use std::sync::{Arc, Mutex};

use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};

use crate::core::backend_events::*;
use crate::core::event_bus::EventBus;
use crate::core::prompt::Prompt;
use crate::core::session::{Affordances, SessionState};
use crate::core::ui_events::*;
use crate::error::{Error, Result, recover};

pub const ORIGIN: &str = "globalTimeline";

/// Default segment size in frames.
pub const DEFAULT_SEGMENT_SIZE: u32 = 200;

/// Press rejection while the timeline has no domain.
pub const NO_BOUNDS_REASON: &str = "No video loaded!";

/// Inclusive frame range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRange {
    pub from: i32,
    pub to: i32,
}

impl FrameRange {
    pub fn new(from: i32, to: i32) -> Self {
        Self { from, to }
    }

    /// Frame count, 0 for an inverted range.
    pub fn len(&self) -> i32 {
        (self.to - self.from + 1).max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, frame: i32) -> bool {
        frame >= self.from && frame <= self.to
    }
}

/// Split `segment_size` into (left, right) spans around the pointer.
pub fn half_spans(segment_size: u32) -> (i64, i64) {
    let size = segment_size.max(1) as i64;
    if size % 2 == 0 {
        (size / 2 - 1, size / 2)
    } else {
        ((size - 1) / 2, (size - 1) / 2)
    }
}

/// Clamped segment window around `pointer` inside `bounds`.
///
/// Always returns `bounds.from <= from <= to <= bounds.to`. For a pointer
/// inside bounds the width is `min(segment_size, bounds.len())`.
pub fn compute_window(pointer: i32, segment_size: u32, bounds: FrameRange) -> FrameRange {
    let (left, right) = half_spans(segment_size);
    let (first, last) = (bounds.from as i64, bounds.to as i64);
    let pointer = pointer as i64;

    let mut from = pointer - left;
    let mut to = pointer + right;

    // Shift, don't truncate
    if from < first {
        to += first - from;
        from = first;
    }
    if to > last {
        from -= to - last;
        to = last;
    }

    // Window wider than the video: both shifts fired
    from = from.max(first);
    to = to.min(last);

    FrameRange::new(from as i32, to as i32)
}

#[derive(Debug)]
struct TimelineState {
    bounds: Option<FrameRange>,
    segment_size: u32,
    highlighted: Option<FrameRange>,
    /// Press seen, waiting for release.
    switching: bool,
    /// None while switching is allowed.
    disabled_reason: Option<String>,
    actual_segment: Option<FrameRange>,
    interacted_parts: Vec<FrameRange>,
    /// Last state announced by the session controller.
    session: SessionState,
}

impl TimelineState {
    fn new(segment_size: u32) -> Self {
        Self {
            bounds: None,
            segment_size: segment_size.max(1),
            highlighted: None,
            switching: false,
            disabled_reason: Some(String::new()),
            actual_segment: None,
            interacted_parts: Vec::new(),
            session: SessionState::NoSession,
        }
    }

    /// Why switching is off right now, if it is.
    fn blocked_reason(&self) -> Option<String> {
        match (&self.disabled_reason, self.bounds) {
            (Some(reason), _) => Some(reason.clone()),
            (None, None) => Some(NO_BOUNDS_REASON.to_string()),
            (None, Some(_)) => None,
        }
    }

    fn overview(&self) -> GlobalTimelineChanged {
        GlobalTimelineChanged {
            bounds: self.bounds,
            actual_segment: self.actual_segment,
            interacted_parts: self.interacted_parts.clone(),
        }
    }
}

/// Global timeline model: highlight and confirm segment switches.
#[derive(Clone)]
pub struct SegmentWindowSelector {
    state: Arc<Mutex<TimelineState>>,
    bus: EventBus,
    prompt: Arc<dyn Prompt>,
}

impl SegmentWindowSelector {
    pub fn new(bus: EventBus, prompt: Arc<dyn Prompt>, segment_size: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(TimelineState::new(segment_size))),
            bus,
            prompt,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TimelineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Subscribe to the channels this model reacts to.
    pub fn attach(&self) {
        let bus = &self.bus;

        let this = self.clone();
        bus.subscribe::<VideoLoaded, _>(VIDEO_LOADED, ORIGIN, move |e| this.set_bounds(e.frame_range()));
        let this = self.clone();
        bus.subscribe::<SegmentActivated, _>(SEGMENT_ACTIVATED, ORIGIN, move |e| this.set_actual_segment(e.0));
        let this = self.clone();
        bus.subscribe::<SessionParts, _>(SESSION_PARTS, ORIGIN, move |e| this.set_interacted_parts(e.parts.clone()));
        let this = self.clone();
        bus.subscribe::<SegmentSizePushed, _>(SEGMENT_SIZE_PUSHED, ORIGIN, move |e| {
            this.set_segment_size(e.segment_size);
            Ok(())
        });
        let this = self.clone();
        bus.subscribe::<SegmentSizeSet, _>(SEGMENT_SIZE_SET, ORIGIN, move |e| {
            this.set_segment_size(e.segment_size);
            Ok(())
        });
        let this = self.clone();
        bus.subscribe::<Affordances, _>(AFFORDANCE_STATE, ORIGIN, move |a| {
            this.apply_affordances(a);
            Ok(())
        });
        let this = self.clone();
        bus.subscribe::<SessionStateChanged, _>(SESSION_STATE_CHANGED, ORIGIN, move |e| {
            this.lock().session = e.state;
            Ok(())
        });
        let this = self.clone();
        bus.subscribe::<SessionReset, _>(SESSION_RESET, ORIGIN, move |_| this.reset());
        let this = self.clone();
        bus.subscribe::<PointerMoved, _>(POINTER_MOVED, ORIGIN, move |e| this.pointer_moved(e.frame_index));
        let this = self.clone();
        bus.subscribe::<TimelinePressed, _>(TIMELINE_PRESSED, ORIGIN, move |e| {
            this.press(e.frame_index).or_else(recover)
        });
        let this = self.clone();
        bus.subscribe::<TimelineReleased, _>(TIMELINE_RELEASED, ORIGIN, move |_| this.release());
    }

    // ========== Inputs ==========

    /// New video: set the timeline domain and drop everything derived from the old one.
    pub fn set_bounds(&self, bounds: Option<FrameRange>) -> Result<()> {
        let overview = {
            let mut st = self.lock();
            st.bounds = bounds;
            st.highlighted = None;
            st.switching = false;
            st.actual_segment = None;
            st.interacted_parts.clear();
            st.overview()
        };
        info!("Global timeline bounds: {:?}", bounds);
        self.bus.publish(GLOBAL_TIMELINE_CHANGED, &overview)
    }

    pub fn set_segment_size(&self, segment_size: u32) {
        let size = segment_size.max(1);
        self.lock().segment_size = size;
        debug!("Segment size set to {}", size);
    }

    pub fn apply_affordances(&self, affordances: &Affordances) {
        let mut st = self.lock();
        st.disabled_reason = if affordances.timeline_switch {
            None
        } else {
            Some(affordances.disabled_reason.clone().unwrap_or_default())
        };
        if st.disabled_reason.is_some() {
            st.switching = false;
        }
    }

    /// Clear the timeline (video/session reload).
    pub fn reset(&self) -> Result<()> {
        let overview = {
            let mut st = self.lock();
            let size = st.segment_size;
            let reason = st.disabled_reason.take();
            let session = st.session;
            *st = TimelineState::new(size);
            st.disabled_reason = reason;
            st.session = session;
            st.overview()
        };
        self.bus.publish(GLOBAL_TIMELINE_CHANGED, &overview)
    }

    pub fn set_actual_segment(&self, range: FrameRange) -> Result<()> {
        let overview = {
            let mut st = self.lock();
            st.actual_segment = Some(range);
            st.overview()
        };
        self.bus.publish(GLOBAL_TIMELINE_CHANGED, &overview)
    }

    pub fn set_interacted_parts(&self, parts: Vec<FrameRange>) -> Result<()> {
        let overview = {
            let mut st = self.lock();
            st.interacted_parts = parts;
            st.overview()
        };
        self.bus.publish(GLOBAL_TIMELINE_CHANGED, &overview)
    }

    /// Recompute the highlight under the pointer. Ignored while switching is off.
    pub fn pointer_moved(&self, frame: i32) -> Result<()> {
        let window = {
            let mut st = self.lock();
            let bounds = match st.bounds {
                Some(bounds) if st.disabled_reason.is_none() => bounds,
                _ => return Ok(()),
            };
            let window = compute_window(frame, st.segment_size, bounds);
            st.highlighted = Some(window);
            window
        };
        trace!("Pointer at {} highlights {:?}", frame, window);
        self.bus.publish(SEGMENT_WINDOW_HIGHLIGHTED, &SegmentWindowHighlighted(window))
    }

    /// Start the switching gesture. Warns with the disabled reason when off.
    pub fn press(&self, frame: i32) -> Result<()> {
        let blocked = {
            let mut st = self.lock();
            match st.blocked_reason() {
                Some(reason) => Some((st.session, reason)),
                None => {
                    st.switching = true;
                    None
                }
            }
        };
        if let Some((state, reason)) = blocked {
            warn!("Timeline press rejected in {}: {}", state, reason);
            self.prompt.warn(&reason);
            return Err(Error::illegal("switch segment", state, reason));
        }
        self.pointer_moved(frame)
    }

    /// End the gesture: ask for confirmation and publish the chosen range.
    pub fn release(&self) -> Result<()> {
        let window = {
            let mut st = self.lock();
            if !st.switching {
                return Ok(());
            }
            st.switching = false;
            st.highlighted
        };
        let Some(window) = window else {
            return Ok(());
        };

        let question = format!(
            "Do you want to load this segment? ({}-{})\n Any unsaved modification will be lost!",
            window.from, window.to
        );
        if self.prompt.confirm(&question) {
            info!("Segment switch confirmed: {:?}", window);
            self.bus.publish(TIMELINE_CLICKED, &TimelineClicked(window))
        } else {
            debug!("Segment switch cancelled");
            Ok(())
        }
    }

    // ========== Accessors ==========

    pub fn highlighted(&self) -> Option<FrameRange> {
        self.lock().highlighted
    }

    pub fn bounds(&self) -> Option<FrameRange> {
        self.lock().bounds
    }

    pub fn segment_size(&self) -> u32 {
        self.lock().segment_size
    }

    pub fn actual_segment(&self) -> Option<FrameRange> {
        self.lock().actual_segment
    }

    pub fn interacted_parts(&self) -> Vec<FrameRange> {
        self.lock().interacted_parts.clone()
    }

    pub fn is_switching_enabled(&self) -> bool {
        self.lock().blocked_reason().is_none()
    }

    pub fn is_switching(&self) -> bool {
        self.lock().switching
    }

    /// Window the pointer at `frame` would select right now.
    pub fn window_at(&self, frame: i32) -> Result<FrameRange> {
        let st = self.lock();
        let bounds = st.bounds.ok_or(Error::BoundsUnset)?;
        Ok(compute_window(frame, st.segment_size, bounds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::prompt::ScriptedPrompt;
    use proptest::prelude::*;

    #[test]
    fn test_half_spans() {
        assert_eq!(half_spans(200), (99, 100));
        assert_eq!(half_spans(199), (99, 99));
        assert_eq!(half_spans(1), (0, 0));
        assert_eq!(half_spans(2), (0, 1));
    }

    #[test]
    fn test_low_end_shifts_right() {
        let w = compute_window(10, 200, FrameRange::new(0, 999));
        assert_eq!(w, FrameRange::new(0, 199));
    }

    #[test]
    fn test_symmetric_no_clamp() {
        let w = compute_window(500, 199, FrameRange::new(0, 999));
        assert_eq!(w, FrameRange::new(401, 599));
    }

    #[test]
    fn test_range_shorter_than_window() {
        let w = compute_window(25, 200, FrameRange::new(0, 50));
        assert_eq!(w, FrameRange::new(0, 50));
    }

    #[test]
    fn test_high_end_shifts_left() {
        let w = compute_window(995, 200, FrameRange::new(0, 999));
        assert_eq!(w, FrameRange::new(800, 999));
    }

    #[test]
    fn test_offset_bounds() {
        let w = compute_window(100, 10, FrameRange::new(100, 400));
        assert_eq!(w, FrameRange::new(100, 109));
    }

    proptest! {
        #[test]
        fn window_stays_inside_and_keeps_width(
            first in -5_000i32..5_000,
            span in 0i32..3_000,
            size in 1u32..4_000,
            offset in 0i32..3_000,
        ) {
            let bounds = FrameRange::new(first, first + span);
            let pointer = first + offset % (span + 1);
            let w = compute_window(pointer, size, bounds);
            prop_assert!(bounds.from <= w.from);
            prop_assert!(w.from <= w.to);
            prop_assert!(w.to <= bounds.to);
            prop_assert_eq!(w.len() as i64, (size as i64).min(bounds.len() as i64));
        }

        #[test]
        fn window_contains_pointer(
            span in 0i32..2_000,
            size in 1u32..500,
            offset in 0i32..2_000,
        ) {
            let bounds = FrameRange::new(0, span);
            let pointer = offset % (span + 1);
            prop_assert!(compute_window(pointer, size, bounds).contains(pointer));
        }
    }

    fn selector(prompt: Arc<ScriptedPrompt>) -> (EventBus, SegmentWindowSelector, Arc<Mutex<Vec<FrameRange>>>) {
        let bus = EventBus::new();
        let sel = SegmentWindowSelector::new(bus.clone(), prompt, 200);
        sel.attach();
        let clicked = Arc::new(Mutex::new(Vec::new()));
        let c = Arc::clone(&clicked);
        bus.subscribe::<TimelineClicked, _>(TIMELINE_CLICKED, "test", move |e| {
            c.lock().unwrap().push(e.0);
            Ok(())
        });
        bus.subscribe::<SegmentWindowHighlighted, _>(SEGMENT_WINDOW_HIGHLIGHTED, "test", |_| Ok(()));
        bus.subscribe::<GlobalTimelineChanged, _>(GLOBAL_TIMELINE_CHANGED, "test", |_| Ok(()));
        (bus, sel, clicked)
    }

    #[test]
    fn test_gesture_confirmed_publishes_click() {
        let prompt = Arc::new(ScriptedPrompt::accepting());
        let (_bus, sel, clicked) = selector(Arc::clone(&prompt));
        sel.set_bounds(Some(FrameRange::new(0, 999))).unwrap();
        sel.apply_affordances(&SessionState::LoadedVideoSession.affordances());

        sel.press(10).unwrap();
        sel.pointer_moved(500).unwrap();
        assert_eq!(sel.highlighted(), Some(FrameRange::new(401, 600)));
        sel.release().unwrap();

        assert_eq!(*clicked.lock().unwrap(), vec![FrameRange::new(401, 600)]);
        assert_eq!(prompt.questions().len(), 1);
        assert!(!sel.is_switching());
    }

    #[test]
    fn test_gesture_declined() {
        let prompt = Arc::new(ScriptedPrompt::declining());
        let (_bus, sel, clicked) = selector(prompt);
        sel.set_bounds(Some(FrameRange::new(0, 99))).unwrap();
        sel.apply_affordances(&SessionState::SegmentLoaded.affordances());
        sel.press(50).unwrap();
        sel.release().unwrap();
        assert!(clicked.lock().unwrap().is_empty());
    }

    #[test]
    fn test_press_while_disabled_warns() {
        let prompt = Arc::new(ScriptedPrompt::accepting());
        let (_bus, sel, _) = selector(Arc::clone(&prompt));
        sel.set_bounds(Some(FrameRange::new(0, 99))).unwrap();
        sel.apply_affordances(&SessionState::Propagating.affordances());

        assert!(sel.press(10).unwrap_err().is_recoverable());
        assert_eq!(prompt.warnings(), vec!["Can't switch segment during propagation!".to_string()]);
        assert_eq!(sel.highlighted(), None);
        // Moves are ignored too
        sel.pointer_moved(20).unwrap();
        assert_eq!(sel.highlighted(), None);
    }

    #[test]
    fn test_no_bounds_disables_switching() {
        let prompt = Arc::new(ScriptedPrompt::accepting());
        let (_bus, sel, clicked) = selector(Arc::clone(&prompt));
        sel.apply_affordances(&SessionState::LoadedSession.affordances());
        assert!(!sel.is_switching_enabled());

        // Moves are a no-op, a press warns like any other disabled state
        sel.pointer_moved(3).unwrap();
        assert_eq!(sel.highlighted(), None);
        let err = sel.press(3).unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(prompt.warnings(), vec![NO_BOUNDS_REASON.to_string()]);
        sel.release().unwrap();
        assert!(clicked.lock().unwrap().is_empty());

        // Direct window queries still need a domain
        assert_eq!(sel.window_at(3), Err(Error::BoundsUnset));
    }

    #[test]
    fn test_reset_keeps_switching_off_until_new_bounds() {
        let (_bus, sel, _) = selector(Arc::new(ScriptedPrompt::accepting()));
        sel.set_bounds(Some(FrameRange::new(0, 999))).unwrap();
        sel.apply_affordances(&SessionState::SegmentLoaded.affordances());
        assert!(sel.is_switching_enabled());

        sel.reset().unwrap();
        assert!(!sel.is_switching_enabled());
        sel.pointer_moved(400).unwrap();
        assert_eq!(sel.highlighted(), None);

        sel.set_bounds(Some(FrameRange::new(0, 999))).unwrap();
        assert!(sel.is_switching_enabled());
    }

    #[test]
    fn test_empty_video_has_no_domain() {
        let (_bus, sel, _) = selector(Arc::new(ScriptedPrompt::accepting()));
        sel.set_bounds(None).unwrap();
        sel.apply_affordances(&SessionState::LoadedVideoSession.affordances());
        sel.pointer_moved(0).unwrap();
        assert_eq!(sel.highlighted(), None);
        assert!(!sel.is_switching_enabled());
    }

    #[test]
    fn test_even_window_extra_frame_on_right() {
        let w = compute_window(500, 10, FrameRange::new(0, 999));
        assert_eq!((500 - w.from, w.to - 500), (4, 5));
    }

    #[test]
    fn test_new_video_clears_highlight() {
        let (_bus, sel, _) = selector(Arc::new(ScriptedPrompt::accepting()));
        sel.set_bounds(Some(FrameRange::new(0, 999))).unwrap();
        sel.apply_affordances(&SessionState::LoadedVideoSession.affordances());
        sel.pointer_moved(300).unwrap();
        assert!(sel.highlighted().is_some());
        sel.set_bounds(Some(FrameRange::new(0, 10))).unwrap();
        assert_eq!(sel.highlighted(), None);
        assert_eq!(sel.window_at(5).unwrap(), FrameRange::new(0, 10));
    }
}
