//! MASKFLOW - Session core for interactive video mask annotation
//!
//! Re-exports all modules for use by binary targets.

// Core engine (bus, session machine, timelines, categories)
pub mod core;

// App modules
pub mod app;
pub mod cli;
pub mod config;
pub mod error;

// Re-export commonly used types from core
pub use crate::core::controller::SessionController;
pub use crate::core::event_bus::EventBus;
pub use crate::core::session::{Affordances, SessionState};
pub use crate::core::window::{FrameRange, SegmentWindowSelector, compute_window};
pub use error::{Error, Result};
