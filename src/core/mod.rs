//! Core session engine - bus, state machine, timelines, categories
//!
//! These modules form the annotation client core, independent of any UI.
//! Components talk to each other only through the [`EventBus`]; the backend
//! is reached through [`BackendLink`] and the user through [`Prompt`].

pub mod backend;
pub mod backend_events;
pub mod categories;
pub mod controller;
pub mod event_bus;
pub mod interactions;
pub mod prompt;
pub mod session;
pub mod ui_events;
pub mod window;

// Re-exports for convenience
pub use backend::{BackendLink, ModelParam, Outbound, RecordingLink};
pub use backend_events::BackendMessage;
pub use categories::CategoryRegistry;
pub use controller::SessionController;
pub use event_bus::{EventBus, SubscriptionId};
pub use interactions::InteractionRecorder;
pub use prompt::{AutoPrompt, Prompt, ScriptedPrompt};
pub use session::{Affordances, SessionMachine, SessionState};
pub use ui_events::{FrameMark, UiInput};
pub use window::{FrameRange, SegmentWindowSelector, compute_window};
