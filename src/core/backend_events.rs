//! Backend-originated events and their bus channels.
//!
//! The backend link collaborator decodes whatever transport it uses into a
//! [`BackendMessage`] and hands it to [`BackendMessage::publish`]; from there on
//! the core only sees bus events.

use serde::{Deserialize, Serialize};

use crate::core::event_bus::EventBus;
use crate::core::window::FrameRange;
use crate::error::Result;

// === Channels ===

pub const VIDEO_LOADED: &str = "videoLoaded";
pub const SEGMENT_LOADED: &str = "segmentLoaded";
pub const PROPAGATION_FINISHED: &str = "propagationFinished";
pub const FREE_MEMORY: &str = "freeMemory";
pub const RESTORE_REQUESTED: &str = "restoreRequested";
pub const INTERACTED_FRAMES_SNAPSHOT: &str = "interactedFramesSnapshot";
pub const CATEGORIES_SNAPSHOT: &str = "categoriesSnapshot";
pub const SEGMENT_SIZE_PUSHED: &str = "segmentSizePushed";
pub const SESSION_PARTS: &str = "sessionParts";
pub const PROPAGATION_PROGRESS: &str = "propagationProgress";
pub const NEXT_PROPAGATION: &str = "nextPropagation";
pub const CONNECTION: &str = "connection";

// === Payloads ===

/// Video metadata. `length` is the frame count.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoLoaded {
    #[serde(default)]
    pub name: String,
    pub length: i32,
    pub height: u32,
    pub width: u32,
    /// Session was resumed from disk rather than opened fresh.
    #[serde(default)]
    pub was_resumed_session: bool,
}

impl VideoLoaded {
    /// Global timeline domain `[0, length - 1]`, none for an empty video.
    pub fn frame_range(&self) -> Option<FrameRange> {
        (self.length > 0).then(|| FrameRange::new(0, self.length - 1))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentLoaded(pub FrameRange);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationFinished;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeMemory {
    pub value: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreRequested;

/// Authoritative interacted set after reconnect or segment reload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractedFramesSnapshot {
    pub frames: Vec<i32>,
    #[serde(default)]
    pub last: Option<i32>,
}

/// Category names as stored by the backend, background excluded or not.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoriesSnapshot {
    pub categories: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentSizePushed {
    pub segment_size: u32,
}

/// Parts of the whole video that already carry annotations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionParts {
    pub parts: Vec<FrameRange>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropagationProgress {
    pub parts: Vec<FrameRange>,
    #[serde(default)]
    pub last_part: Option<FrameRange>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextPropagation {
    #[serde(default)]
    pub range: Option<FrameRange>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub connected: bool,
}

// === Decoded message ===

/// One message from the backend link, tagged by `type`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BackendMessage {
    VideoLoaded(VideoLoaded),
    SegmentLoaded { from: i32, to: i32 },
    PropagationFinished,
    FreeMemory { value: i64 },
    RestoreRequested,
    InteractedFramesSnapshot(InteractedFramesSnapshot),
    CategoriesSnapshot(CategoriesSnapshot),
    #[serde(rename_all = "camelCase")]
    SegmentSize { segment_size: u32 },
    SessionParts(SessionParts),
    PropagationProgress(PropagationProgress),
    NextPropagation(NextPropagation),
    Connection(Connection),
}

impl BackendMessage {
    /// Publish on the matching channel.
    pub fn publish(&self, bus: &EventBus) -> Result<()> {
        match self {
            BackendMessage::VideoLoaded(e) => bus.publish(VIDEO_LOADED, e),
            BackendMessage::SegmentLoaded { from, to } => {
                bus.publish(SEGMENT_LOADED, &SegmentLoaded(FrameRange::new(*from, *to)))
            }
            BackendMessage::PropagationFinished => bus.publish(PROPAGATION_FINISHED, &PropagationFinished),
            BackendMessage::FreeMemory { value } => bus.publish(FREE_MEMORY, &FreeMemory { value: *value }),
            BackendMessage::RestoreRequested => bus.publish(RESTORE_REQUESTED, &RestoreRequested),
            BackendMessage::InteractedFramesSnapshot(e) => bus.publish(INTERACTED_FRAMES_SNAPSHOT, e),
            BackendMessage::CategoriesSnapshot(e) => bus.publish(CATEGORIES_SNAPSHOT, e),
            BackendMessage::SegmentSize { segment_size } => bus.publish(
                SEGMENT_SIZE_PUSHED,
                &SegmentSizePushed {
                    segment_size: *segment_size,
                },
            ),
            BackendMessage::SessionParts(e) => bus.publish(SESSION_PARTS, e),
            BackendMessage::PropagationProgress(e) => bus.publish(PROPAGATION_PROGRESS, e),
            BackendMessage::NextPropagation(e) => bus.publish(NEXT_PROPAGATION, e),
            BackendMessage::Connection(e) => bus.publish(CONNECTION, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_decode_tagged_messages() {
        let msg: BackendMessage = serde_json::from_str(
            r#"{"type":"videoLoaded","length":120,"height":480,"width":640,"wasResumedSession":true}"#,
        )
        .unwrap();
        match msg {
            BackendMessage::VideoLoaded(v) => {
                assert!(v.was_resumed_session);
                assert_eq!(v.frame_range(), Some(FrameRange::new(0, 119)));
            }
            other => panic!("unexpected {:?}", other),
        }

        let msg: BackendMessage = serde_json::from_str(r#"{"type":"propagationFinished"}"#).unwrap();
        assert_eq!(msg, BackendMessage::PropagationFinished);

        let msg: BackendMessage = serde_json::from_str(r#"{"type":"segmentSize","segmentSize":64}"#).unwrap();
        assert_eq!(msg, BackendMessage::SegmentSize { segment_size: 64 });
    }

    #[test]
    fn test_empty_video_has_no_range() {
        let v = VideoLoaded {
            name: String::new(),
            length: 0,
            height: 1,
            width: 1,
            was_resumed_session: false,
        };
        assert_eq!(v.frame_range(), None);
    }

    #[test]
    fn test_publish_routes_to_channel() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        bus.subscribe::<SegmentLoaded, _>(SEGMENT_LOADED, "test", move |e| {
            s.lock().unwrap().push(e.0);
            Ok(())
        });

        BackendMessage::SegmentLoaded { from: 10, to: 20 }.publish(&bus).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![FrameRange::new(10, 20)]);

        // Nobody listens to free memory in this bus
        assert!(BackendMessage::FreeMemory { value: 0 }.publish(&bus).is_err());
    }
}
