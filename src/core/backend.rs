//! Outbound side of the backend link.
//!
//! The core hands [`Outbound`] requests to a [`BackendLink`] and never waits on
//! them: completion comes back later as a bus event (see `backend_events`).

use std::sync::Mutex;

use serde::Serialize;

use crate::core::ui_events::PointDrawn;
use crate::core::window::FrameRange;
use crate::error::Result;

/// Model parameter change, tagged by `param`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "param", rename_all = "camelCase")]
pub enum ModelParam {
    Category { name: String },
    #[serde(rename_all = "camelCase")]
    SegmentSize { segment_size: u32 },
    PropagationLength { length: i32 },
    /// Let propagation run past the segment borders.
    BorderPropagation { on: bool },
}

/// Request sent to the backend, tagged by `type`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Outbound {
    RequestLoadSegment { from: i32, to: i32 },
    RequestPropagate,
    RequestLoadVideo { path: String },
    LoadSession { path: String },
    Point(PointDrawn),
    #[serde(rename_all = "camelCase")]
    EndPath { frame_index: i32 },
    #[serde(rename_all = "camelCase")]
    UndoInteraction { frame_index: i32 },
    SaveSession { overlayed: bool },
    ChangeModelParam(ModelParam),
    Restore,
}

impl Outbound {
    pub fn load_segment(range: FrameRange) -> Self {
        Outbound::RequestLoadSegment {
            from: range.from,
            to: range.to,
        }
    }

    /// Wire name, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Outbound::RequestLoadSegment { .. } => "requestLoadSegment",
            Outbound::RequestPropagate => "requestPropagate",
            Outbound::RequestLoadVideo { .. } => "requestLoadVideo",
            Outbound::LoadSession { .. } => "loadSession",
            Outbound::Point(_) => "point",
            Outbound::EndPath { .. } => "endPath",
            Outbound::UndoInteraction { .. } => "undoInteraction",
            Outbound::SaveSession { .. } => "saveSession",
            Outbound::ChangeModelParam(_) => "changeModelParam",
            Outbound::Restore => "restore",
        }
    }
}

/// Fire-and-forget transport to the processing backend.
pub trait BackendLink: Send + Sync {
    fn send(&self, message: &Outbound) -> Result<()>;
}

/// Keeps every sent message in memory.
#[derive(Debug, Default)]
pub struct RecordingLink {
    sent: Mutex<Vec<Outbound>>,
}

impl RecordingLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Outbound> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Drain the log.
    pub fn take(&self) -> Vec<Outbound> {
        std::mem::take(&mut *self.sent.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl BackendLink for RecordingLink {
    fn send(&self, message: &Outbound) -> Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.clone());
        Ok(())
    }
}
