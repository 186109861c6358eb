//! Scripted session driver.
//!
//! Reads JSON-lines steps and feeds them to an [`AnnotatorApp`]:
//!
//! ```text
//! {"kind":"backend","msg":{"type":"videoLoaded","length":1000,"height":480,"width":640}}
//! {"kind":"ui","msg":{"type":"categoryAdded","name":"car"}}
//! {"kind":"wait","ms":5000}
//! ```
//!
//! Every outbound backend request and every render event is written back as
//! one JSON line. `wait` advances a virtual clock and polls request timeouts.

use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::json;

use crate::app::AnnotatorApp;
use crate::config::Settings;
use crate::core::backend::{BackendLink, Outbound};
use crate::core::backend_events::BackendMessage;
use crate::core::prompt::AutoPrompt;
use crate::core::session::SessionState;
use crate::core::ui_events::UiInput;
use crate::error::{Error, Result};

/// One script line, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ReplayStep {
    Backend { msg: BackendMessage },
    Ui { msg: UiInput },
    Wait { ms: u64 },
}

pub type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

fn write_line(out: &SharedWriter, value: &serde_json::Value) -> std::io::Result<()> {
    let mut out = out.lock().unwrap_or_else(|e| e.into_inner());
    writeln!(out, "{}", value)
}

/// Backend link that prints each request as a JSON line.
pub struct JsonLinesLink {
    out: SharedWriter,
}

impl JsonLinesLink {
    pub fn new(out: SharedWriter) -> Self {
        Self { out }
    }
}

impl BackendLink for JsonLinesLink {
    fn send(&self, message: &Outbound) -> Result<()> {
        debug!("Sending {}", message.kind());
        write_line(&self.out, &json!({ "to": "backend", "message": message }))
            .map_err(|e| Error::Backend(e.to_string()))
    }
}

/// What happened during a replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    pub steps: usize,
    /// Steps that ended in a recoverable error, such as a request timeout.
    pub rejected: usize,
    pub final_state: SessionState,
}

/// Run a whole script. Wiring bugs abort; user-level rejections are counted.
pub fn run_replay(settings: &Settings, script: impl BufRead, out: SharedWriter) -> anyhow::Result<ReplaySummary> {
    let link = Arc::new(JsonLinesLink::new(Arc::clone(&out)));
    let prompt = Arc::new(AutoPrompt {
        accept: settings.auto_confirm,
    });
    let app = AnnotatorApp::new(settings, link, prompt);
    app.start().context("Failed to start session")?;

    let started = Instant::now();
    let mut elapsed = Duration::ZERO;
    let mut summary = ReplaySummary {
        steps: 0,
        rejected: 0,
        final_state: SessionState::NoSession,
    };
    flush_render(&app, &out)?;

    for (idx, line) in script.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.with_context(|| format!("Failed to read script line {}", line_no))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let step: ReplayStep =
            serde_json::from_str(line).with_context(|| format!("Invalid step on line {}", line_no))?;
        summary.steps += 1;

        let outcome = match &step {
            ReplayStep::Backend { msg } => app.handle_backend(msg),
            ReplayStep::Ui { msg } => app.handle_ui(msg),
            ReplayStep::Wait { ms } => {
                elapsed += Duration::from_millis(*ms);
                app.poll_timeouts(started + elapsed)
            }
        };
        match outcome {
            Ok(()) => {}
            Err(e) if e.is_recoverable() => {
                warn!("Line {}: {}", line_no, e);
                summary.rejected += 1;
            }
            Err(e) => bail!("Line {}: {}", line_no, e),
        }
        flush_render(&app, &out)?;
    }

    summary.final_state = app.controller.state();
    info!(
        "Replay done: {} steps, {} rejected, final state {}",
        summary.steps, summary.rejected, summary.final_state
    );
    app.shutdown();
    Ok(summary)
}

fn flush_render(app: &AnnotatorApp, out: &SharedWriter) -> anyhow::Result<()> {
    for event in app.render.take() {
        write_line(
            out,
            &json!({ "to": "render", "channel": event.channel, "payload": event.payload }),
        )
        .context("Failed to write render event")?;
    }
    Ok(())
}
