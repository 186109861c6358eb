//! Render-side sink: records every event published for rendering collaborators.
//!
//! A headless stand-in for the widgets. Subscribing to every render channel also
//! keeps those channels registered, so components can publish before any real
//! widget is attached.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;

use crate::core::event_bus::EventBus;
use crate::core::session::Affordances;
use crate::core::ui_events::*;

pub const ORIGIN: &str = "render";

/// One render event: channel name plus JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderEvent {
    pub channel: String,
    pub payload: Value,
}

#[derive(Clone, Default)]
pub struct RenderLog {
    events: Arc<Mutex<Vec<RenderEvent>>>,
}

impl RenderLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<RenderEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn listen<E: Serialize + Send + Sync + 'static>(&self, bus: &EventBus, channel: &'static str) {
        let events = Arc::clone(&self.events);
        bus.subscribe::<E, _>(channel, ORIGIN, move |payload| {
            let payload = serde_json::to_value(payload).unwrap_or(Value::Null);
            events
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(RenderEvent {
                    channel: channel.to_string(),
                    payload,
                });
            Ok(())
        });
    }

    /// Subscribe to every render channel.
    pub fn attach(&self, bus: &EventBus) {
        self.listen::<Affordances>(bus, AFFORDANCE_STATE);
        self.listen::<SessionStateChanged>(bus, SESSION_STATE_CHANGED);
        self.listen::<SegmentWindowHighlighted>(bus, SEGMENT_WINDOW_HIGHLIGHTED);
        self.listen::<GlobalTimelineChanged>(bus, GLOBAL_TIMELINE_CHANGED);
        self.listen::<InteractedFramesChanged>(bus, INTERACTED_FRAMES_CHANGED);
        self.listen::<CurrentFrameChanged>(bus, CURRENT_FRAME_CHANGED);
        self.listen::<PropagationChanged>(bus, PROPAGATION_CHANGED);
        self.listen::<CategoriesChanged>(bus, CATEGORIES_CHANGED);
        self.listen::<ActiveCategoryChanged>(bus, ACTIVE_CATEGORY_CHANGED);
        self.listen::<PanelToggled>(bus, PANEL_TOGGLED);
        self.listen::<RequestTimedOut>(bus, REQUEST_TIMED_OUT);
    }

    pub fn events(&self) -> Vec<RenderEvent> {
        self.lock().clone()
    }

    /// Drain recorded events.
    pub fn take(&self) -> Vec<RenderEvent> {
        std::mem::take(&mut *self.lock())
    }

    /// Most recent payload seen on `channel`.
    pub fn last(&self, channel: &str) -> Option<Value> {
        self.lock()
            .iter()
            .rev()
            .find(|e| e.channel == channel)
            .map(|e| e.payload.clone())
    }

    pub fn count(&self, channel: &str) -> usize {
        self.lock().iter().filter(|e| e.channel == channel).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::SessionState;

    #[test]
    fn test_registers_every_render_channel() {
        let bus = EventBus::new();
        RenderLog::new().attach(&bus);
        for channel in RENDER_CHANNELS {
            assert!(bus.is_registered(channel), "{channel}");
        }
    }

    #[test]
    fn test_records_payload_json() {
        let bus = EventBus::new();
        let log = RenderLog::new();
        log.attach(&bus);
        publish_affordances(&bus, SessionState::SegmentLoaded).unwrap();
        bus.publish(PANEL_TOGGLED, &PanelToggled { panel: Panel::Help }).unwrap();

        let affordances = log.last(AFFORDANCE_STATE).unwrap();
        assert_eq!(affordances["propagate"], Value::Bool(true));
        assert_eq!(affordances["disabledReason"], Value::Null);
        assert_eq!(log.last(PANEL_TOGGLED).unwrap()["panel"], "help");
        assert_eq!(log.take().len(), 2);
        assert!(log.events().is_empty());
    }
}
