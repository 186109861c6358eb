//! UI events: inputs coming from widgets and render directives going back out.

use serde::{Deserialize, Serialize};

use crate::core::event_bus::EventBus;
use crate::core::session::{Affordances, SessionState};
use crate::core::window::FrameRange;
use crate::error::Result;

// === Input channels (widgets -> core) ===

pub const CATEGORY_ADDED: &str = "categoryAdded";
pub const POINTER_MOVED: &str = "pointerMovedOnTimeline";
pub const TIMELINE_PRESSED: &str = "timelinePressed";
pub const TIMELINE_RELEASED: &str = "timelineReleased";
/// Confirmed segment switch.
pub const TIMELINE_CLICKED: &str = "timelineClicked";
pub const KEY_PRESSED: &str = "keyPressed";
pub const POINT_DRAWN: &str = "pointDrawn";
pub const PATH_ENDED: &str = "pathEnded";
pub const FRAME_SHOWN: &str = "frameShown";
pub const PROPAGATE_CLICKED: &str = "propagateClicked";
pub const SAVE_CLICKED: &str = "saveClicked";
pub const UNDO_CLICKED: &str = "undoClicked";
pub const VIDEO_REQUESTED: &str = "videoRequested";
pub const SESSION_LOAD_REQUESTED: &str = "sessionLoadRequested";
pub const SEGMENT_SIZE_SET: &str = "segmentSizeSet";
pub const PROPAGATION_LENGTH_SET: &str = "propagationLengthSet";
pub const BORDER_PROPAGATION_SET: &str = "borderPropagationSet";

// === Internal channels ===

/// Full reset before a video/session load or a restore.
pub const SESSION_RESET: &str = "sessionReset";
/// Local timeline reset before switching segment.
pub const SEGMENT_RESET: &str = "segmentReset";
/// Segment load accepted by the session controller.
pub const SEGMENT_ACTIVATED: &str = "segmentActivated";

// === Render channels (core -> widgets) ===

pub const AFFORDANCE_STATE: &str = "affordanceState";
pub const SESSION_STATE_CHANGED: &str = "sessionStateChanged";
pub const SEGMENT_WINDOW_HIGHLIGHTED: &str = "segmentWindowHighlighted";
pub const GLOBAL_TIMELINE_CHANGED: &str = "globalTimelineChanged";
pub const INTERACTED_FRAMES_CHANGED: &str = "interactedFramesChanged";
pub const CURRENT_FRAME_CHANGED: &str = "currentFrameChanged";
pub const PROPAGATION_CHANGED: &str = "propagationChanged";
pub const CATEGORIES_CHANGED: &str = "categoriesChanged";
pub const ACTIVE_CATEGORY_CHANGED: &str = "activeCategoryChanged";
pub const PANEL_TOGGLED: &str = "panelToggled";
pub const REQUEST_TIMED_OUT: &str = "requestTimedOut";

/// Every channel a rendering collaborator is expected to listen on.
pub const RENDER_CHANNELS: &[&str] = &[
    AFFORDANCE_STATE,
    SESSION_STATE_CHANGED,
    SEGMENT_WINDOW_HIGHLIGHTED,
    GLOBAL_TIMELINE_CHANGED,
    INTERACTED_FRAMES_CHANGED,
    CURRENT_FRAME_CHANGED,
    PROPAGATION_CHANGED,
    CATEGORIES_CHANGED,
    ACTIVE_CATEGORY_CHANGED,
    PANEL_TOGGLED,
    REQUEST_TIMED_OUT,
];

// === Input payloads ===

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryAdded {
    pub name: String,
}

/// Pointer over the global timeline, already mapped to a frame index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointerMoved {
    pub frame_index: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelinePressed {
    pub frame_index: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineReleased;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineClicked(pub FrameRange);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPressed {
    pub key: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InteractionMode {
    Scribble,
    Click,
}

/// One stroke sample on the image canvas.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointDrawn {
    pub mode: InteractionMode,
    pub x: f32,
    pub y: f32,
    pub object_idx: usize,
    pub frame_index: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathEnded {
    pub frame_index: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameShown {
    pub frame_index: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagateClicked;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveClicked {
    pub overlayed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoClicked;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRequested {
    pub path: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLoadRequested {
    pub path: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentSizeSet {
    pub segment_size: u32,
}

/// Requested propagation length, capped to the loaded segment before sending.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationLengthSet {
    pub length: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorderPropagationSet {
    pub enabled: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionReset;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentReset;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentActivated(pub FrameRange);

// === Render payloads ===

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionStateChanged {
    pub state: SessionState,
    pub previous: Option<SessionState>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SegmentWindowHighlighted(pub FrameRange);

/// Global timeline overview: loaded segment and annotated parts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalTimelineChanged {
    pub bounds: Option<FrameRange>,
    pub actual_segment: Option<FrameRange>,
    pub interacted_parts: Vec<FrameRange>,
}

/// How a frame is drawn on the local timeline. Later variants win.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FrameMark {
    Interacted,
    LastInteracted,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MarkedFrame {
    pub frame: i32,
    pub mark: FrameMark,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractedFramesChanged {
    /// Sorted ascending.
    pub frames: Vec<i32>,
    pub last_interacted: Option<i32>,
    /// One entry per drawn frame with its strongest mark, ascending.
    pub marks: Vec<MarkedFrame>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentFrameChanged {
    pub frame_index: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropagationChanged {
    pub parts: Vec<FrameRange>,
    pub last_part: Option<FrameRange>,
    pub next: Option<FrameRange>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CategoriesChanged {
    pub names: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActiveCategoryChanged {
    pub index: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Panel {
    Settings,
    Files,
    Help,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PanelToggled {
    pub panel: Panel,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestTimedOut {
    pub waiting: SessionState,
    pub restored: SessionState,
    pub elapsed_ms: u64,
}

// === Decoded widget input ===

/// One widget input, tagged by `type`. Used by scripted drivers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UiInput {
    CategoryAdded(CategoryAdded),
    PointerMoved(PointerMoved),
    TimelinePressed(TimelinePressed),
    TimelineReleased,
    TimelineClicked { from: i32, to: i32 },
    KeyPressed(KeyPressed),
    PointDrawn(PointDrawn),
    PathEnded(PathEnded),
    FrameShown(FrameShown),
    PropagateClicked,
    SaveClicked(SaveClicked),
    UndoClicked,
    VideoRequested(VideoRequested),
    SessionLoadRequested(SessionLoadRequested),
    SegmentSizeSet(SegmentSizeSet),
    PropagationLengthSet(PropagationLengthSet),
    BorderPropagationSet(BorderPropagationSet),
}

impl UiInput {
    /// Publish on the matching channel.
    pub fn publish(&self, bus: &EventBus) -> Result<()> {
        match self {
            UiInput::CategoryAdded(e) => bus.publish(CATEGORY_ADDED, e),
            UiInput::PointerMoved(e) => bus.publish(POINTER_MOVED, e),
            UiInput::TimelinePressed(e) => bus.publish(TIMELINE_PRESSED, e),
            UiInput::TimelineReleased => bus.publish(TIMELINE_RELEASED, &TimelineReleased),
            UiInput::TimelineClicked { from, to } => {
                bus.publish(TIMELINE_CLICKED, &TimelineClicked(FrameRange::new(*from, *to)))
            }
            UiInput::KeyPressed(e) => bus.publish(KEY_PRESSED, e),
            UiInput::PointDrawn(e) => bus.publish(POINT_DRAWN, e),
            UiInput::PathEnded(e) => bus.publish(PATH_ENDED, e),
            UiInput::FrameShown(e) => bus.publish(FRAME_SHOWN, e),
            UiInput::PropagateClicked => bus.publish(PROPAGATE_CLICKED, &PropagateClicked),
            UiInput::SaveClicked(e) => bus.publish(SAVE_CLICKED, e),
            UiInput::UndoClicked => bus.publish(UNDO_CLICKED, &UndoClicked),
            UiInput::VideoRequested(e) => bus.publish(VIDEO_REQUESTED, e),
            UiInput::SessionLoadRequested(e) => bus.publish(SESSION_LOAD_REQUESTED, e),
            UiInput::SegmentSizeSet(e) => bus.publish(SEGMENT_SIZE_SET, e),
            UiInput::PropagationLengthSet(e) => bus.publish(PROPAGATION_LENGTH_SET, e),
            UiInput::BorderPropagationSet(e) => bus.publish(BORDER_PROPAGATION_SET, e),
        }
    }
}

/// Shorthand for emitting the affordance directive of `state`.
pub fn publish_affordances(bus: &EventBus, state: SessionState) -> Result<()> {
    let directive: Affordances = state.affordances();
    bus.publish(AFFORDANCE_STATE, &directive)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_widget_inputs() {
        let input: UiInput = serde_json::from_str(r#"{"type":"pointerMoved","frameIndex":42}"#).unwrap();
        assert_eq!(input, UiInput::PointerMoved(PointerMoved { frame_index: 42 }));

        let input: UiInput = serde_json::from_str(
            r#"{"type":"pointDrawn","mode":"scribble","x":1.5,"y":2.0,"objectIdx":1,"frameIndex":3}"#,
        )
        .unwrap();
        match input {
            UiInput::PointDrawn(p) => {
                assert_eq!(p.mode, InteractionMode::Scribble);
                assert_eq!(p.object_idx, 1);
            }
            other => panic!("unexpected {:?}", other),
        }

        let input: UiInput = serde_json::from_str(r#"{"type":"timelineClicked","from":5,"to":9}"#).unwrap();
        assert_eq!(input, UiInput::TimelineClicked { from: 5, to: 9 });

        let input: UiInput = serde_json::from_str(r#"{"type":"borderPropagationSet","enabled":true}"#).unwrap();
        assert_eq!(input, UiInput::BorderPropagationSet(BorderPropagationSet { enabled: true }));
    }

    #[test]
    fn test_render_channels_are_unique() {
        let mut names: Vec<&str> = RENDER_CHANNELS.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), RENDER_CHANNELS.len());
    }
}
