//! Application module - AnnotatorApp and related functionality.
//!
//! Builds the bus, constructs every core component on it and routes decoded
//! input into the right channel:
//! - `render` - headless sink for render channels
//! - `replay` - JSON-lines scripted session driver

pub mod render;
pub mod replay;

use std::sync::Arc;
use std::time::Instant;

use log::{debug, info};

use crate::config::Settings;
use crate::core::backend::BackendLink;
use crate::core::backend_events::BackendMessage;
use crate::core::categories::CategoryRegistry;
use crate::core::controller::SessionController;
use crate::core::event_bus::EventBus;
use crate::core::interactions::InteractionRecorder;
use crate::core::prompt::Prompt;
use crate::core::ui_events::UiInput;
use crate::core::window::SegmentWindowSelector;
use crate::error::Result;

use render::RenderLog;

/// Main application state: one bus, one instance of every component.
pub struct AnnotatorApp {
    bus: EventBus,
    pub controller: SessionController,
    pub timeline: SegmentWindowSelector,
    pub recorder: InteractionRecorder,
    pub categories: CategoryRegistry,
    pub render: RenderLog,
}

impl AnnotatorApp {
    /// Wire every component. Attachment order is dispatch order: models
    /// update from a backend event before the controller announces the
    /// resulting state.
    pub fn new(settings: &Settings, link: Arc<dyn BackendLink>, prompt: Arc<dyn Prompt>) -> Self {
        let bus = EventBus::with_max_depth(settings.max_dispatch_depth);

        let timeline = SegmentWindowSelector::new(bus.clone(), Arc::clone(&prompt), settings.segment_size);
        let recorder = InteractionRecorder::new(bus.clone());
        let categories = CategoryRegistry::new(bus.clone(), Arc::clone(&link), Arc::clone(&prompt));
        let controller = SessionController::new(
            bus.clone(),
            link,
            prompt,
            categories.clone(),
            recorder.clone(),
            settings.request_timeout(),
        );
        let render = RenderLog::new();

        timeline.attach();
        recorder.attach();
        categories.attach();
        controller.attach();
        render.attach(&bus);

        debug!("Bus channels: {:?}", bus.channels());
        Self {
            bus,
            controller,
            timeline,
            recorder,
            categories,
            render,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Announce the initial state.
    pub fn start(&self) -> Result<()> {
        info!("Annotator starting");
        self.controller.start()
    }

    /// Dispatch one decoded backend message.
    pub fn handle_backend(&self, message: &BackendMessage) -> Result<()> {
        debug!("Backend -> {:?}", message);
        message.publish(&self.bus)
    }

    /// Dispatch one decoded widget input.
    pub fn handle_ui(&self, input: &UiInput) -> Result<()> {
        debug!("UI -> {:?}", input);
        input.publish(&self.bus)
    }

    pub fn poll_timeouts(&self, now: Instant) -> Result<()> {
        self.controller.poll_timeouts(now)
    }

    /// Drop every subscription. Components stay alive but hear nothing.
    pub fn shutdown(&self) {
        info!("Annotator shutting down");
        self.bus.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backend::RecordingLink;
    use crate::core::prompt::ScriptedPrompt;
    use crate::core::session::SessionState;
    use crate::core::ui_events::*;
    use crate::error::Error;

    #[test]
    fn test_start_renders_locked_ui() {
        let app = AnnotatorApp::new(
            &Settings::default(),
            Arc::new(RecordingLink::new()),
            Arc::new(ScriptedPrompt::accepting()),
        );
        app.start().unwrap();
        assert_eq!(app.controller.state(), SessionState::NoSession);
        let affordances = app.render.last(AFFORDANCE_STATE).unwrap();
        assert_eq!(affordances["timelineSwitch"], false);
        assert_eq!(affordances["disabledReason"], "No session/video loaded.");
    }

    #[test]
    fn test_segment_size_from_settings() {
        let settings = Settings {
            segment_size: 11,
            ..Settings::default()
        };
        let app = AnnotatorApp::new(
            &settings,
            Arc::new(RecordingLink::new()),
            Arc::new(ScriptedPrompt::accepting()),
        );
        assert_eq!(app.timeline.segment_size(), 11);
    }

    #[test]
    fn test_shutdown_unregisters() {
        let app = AnnotatorApp::new(
            &Settings::default(),
            Arc::new(RecordingLink::new()),
            Arc::new(ScriptedPrompt::accepting()),
        );
        app.shutdown();
        let err = app.handle_ui(&UiInput::PropagateClicked).unwrap_err();
        assert!(matches!(err, Error::ChannelNotRegistered { .. }));
    }
}
