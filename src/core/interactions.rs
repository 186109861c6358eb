//! Interaction tracking for the active segment (local timeline model).
//!
//! Owns the set of frames the user has drawn on, the most recent one, the
//! currently shown frame and the propagation progress reported by the backend.
//! It is the only writer of that data; everything else reads snapshots or
//! listens to the render channels.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use log::{debug, trace};

use crate::core::backend_events::*;
use crate::core::event_bus::EventBus;
use crate::core::ui_events::*;
use crate::core::window::FrameRange;
use crate::error::Result;

pub const ORIGIN: &str = "localTimeline";

#[derive(Debug, Default)]
struct RecorderState {
    frames: BTreeSet<i32>,
    last: Option<i32>,
    current: i32,
    segment: Option<FrameRange>,
    propagated: Vec<FrameRange>,
    last_part: Option<FrameRange>,
    next_propagation: Option<FrameRange>,
}

impl RecorderState {
    /// Last interacted wins over plain membership.
    fn mark_for(&self, frame: i32) -> Option<FrameMark> {
        if self.last == Some(frame) {
            Some(FrameMark::LastInteracted)
        } else if self.frames.contains(&frame) {
            Some(FrameMark::Interacted)
        } else {
            None
        }
    }

    fn interacted(&self) -> InteractedFramesChanged {
        let mut drawn = self.frames.clone();
        drawn.extend(self.last);
        let marks = drawn
            .into_iter()
            .filter_map(|frame| self.mark_for(frame).map(|mark| MarkedFrame { frame, mark }))
            .collect();
        InteractedFramesChanged {
            frames: self.frames.iter().copied().collect(),
            last_interacted: self.last,
            marks,
        }
    }

    fn propagation(&self) -> PropagationChanged {
        PropagationChanged {
            parts: self.propagated.clone(),
            last_part: self.last_part,
            next: self.next_propagation,
        }
    }
}

#[derive(Clone)]
pub struct InteractionRecorder {
    state: Arc<Mutex<RecorderState>>,
    bus: EventBus,
}

impl InteractionRecorder {
    pub fn new(bus: EventBus) -> Self {
        Self {
            state: Arc::new(Mutex::new(RecorderState::default())),
            bus,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RecorderState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn attach(&self) {
        let bus = &self.bus;

        let this = self.clone();
        bus.subscribe::<InteractedFramesSnapshot, _>(INTERACTED_FRAMES_SNAPSHOT, ORIGIN, move |e| {
            this.load_interacted_frames(e.frames.iter().copied(), e.last)
        });
        let this = self.clone();
        bus.subscribe::<SegmentActivated, _>(SEGMENT_ACTIVATED, ORIGIN, move |e| this.set_segment(e.0));
        let this = self.clone();
        bus.subscribe::<PropagationProgress, _>(PROPAGATION_PROGRESS, ORIGIN, move |e| {
            this.update_propagated(e.parts.clone(), e.last_part)
        });
        let this = self.clone();
        bus.subscribe::<NextPropagation, _>(NEXT_PROPAGATION, ORIGIN, move |e| this.set_next_propagation(e.range));
        let this = self.clone();
        bus.subscribe::<FrameShown, _>(FRAME_SHOWN, ORIGIN, move |e| this.set_current_frame(e.frame_index));
        let this = self.clone();
        bus.subscribe::<SegmentReset, _>(SEGMENT_RESET, ORIGIN, move |_| this.reset());
        let this = self.clone();
        bus.subscribe::<SessionReset, _>(SESSION_RESET, ORIGIN, move |_| this.reset());
    }

    // ========== Interactions ==========

    /// Mark `frame` as drawn on. Re-adding keeps the set, moves `last`.
    pub fn record_interaction(&self, frame: i32) -> Result<()> {
        let payload = {
            let mut st = self.lock();
            st.frames.insert(frame);
            st.last = Some(frame);
            st.interacted()
        };
        trace!("Interaction on frame {}", frame);
        self.bus.publish(INTERACTED_FRAMES_CHANGED, &payload)
    }

    /// Replace the set with the backend's authoritative copy.
    pub fn load_interacted_frames(&self, frames: impl IntoIterator<Item = i32>, last: Option<i32>) -> Result<()> {
        let payload = {
            let mut st = self.lock();
            st.frames = frames.into_iter().collect();
            st.last = last;
            st.interacted()
        };
        debug!("Loaded {} interacted frames (last {:?})", payload.frames.len(), last);
        self.bus.publish(INTERACTED_FRAMES_CHANGED, &payload)
    }

    /// Forget everything about the current segment.
    pub fn reset(&self) -> Result<()> {
        let (interacted, propagation) = {
            let mut st = self.lock();
            *st = RecorderState::default();
            (st.interacted(), st.propagation())
        };
        self.bus.publish(INTERACTED_FRAMES_CHANGED, &interacted)?;
        self.bus.publish(PROPAGATION_CHANGED, &propagation)
    }

    // ========== Segment & playback ==========

    pub fn set_segment(&self, range: FrameRange) -> Result<()> {
        {
            let mut st = self.lock();
            st.segment = Some(range);
        }
        self.set_current_frame(range.from)
    }

    pub fn set_current_frame(&self, frame: i32) -> Result<()> {
        self.lock().current = frame;
        self.bus
            .publish(CURRENT_FRAME_CHANGED, &CurrentFrameChanged { frame_index: frame })
    }

    // ========== Propagation progress ==========

    /// New propagated parts; clears the pending next-propagation marker.
    pub fn update_propagated(&self, parts: Vec<FrameRange>, last_part: Option<FrameRange>) -> Result<()> {
        let payload = {
            let mut st = self.lock();
            st.propagated = parts;
            st.last_part = last_part.filter(|p| p.to > 0);
            st.next_propagation = None;
            st.propagation()
        };
        self.bus.publish(PROPAGATION_CHANGED, &payload)
    }

    pub fn set_next_propagation(&self, range: Option<FrameRange>) -> Result<()> {
        let payload = {
            let mut st = self.lock();
            st.next_propagation = range;
            st.propagation()
        };
        self.bus.publish(PROPAGATION_CHANGED, &payload)
    }

    // ========== Accessors ==========

    /// Interacted frames, ascending.
    pub fn interacted(&self) -> Vec<i32> {
        self.lock().frames.iter().copied().collect()
    }

    pub fn last_interacted(&self) -> Option<i32> {
        self.lock().last
    }

    pub fn current_frame(&self) -> i32 {
        self.lock().current
    }

    pub fn segment(&self) -> Option<FrameRange> {
        self.lock().segment
    }

    pub fn propagated(&self) -> Vec<FrameRange> {
        self.lock().propagated.clone()
    }

    /// Strongest mark for `frame`, as published with the interacted set.
    pub fn mark_for(&self, frame: i32) -> Option<FrameMark> {
        self.lock().mark_for(frame)
    }
}
