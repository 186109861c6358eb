//! User dialog collaborator: yes/no confirmations and warnings.
//!
//! The core never draws dialogs itself. Whatever front end hosts it supplies a
//! [`Prompt`]; headless drivers use [`AutoPrompt`], tests use [`ScriptedPrompt`].

use std::collections::VecDeque;
use std::sync::Mutex;

use log::{info, warn};

pub trait Prompt: Send + Sync {
    /// Ask a yes/no question and block until answered.
    fn confirm(&self, message: &str) -> bool;
    /// Show a warning the user has to acknowledge.
    fn warn(&self, message: &str);
}

/// Answers every confirmation with a fixed value and logs warnings.
#[derive(Debug, Clone, Copy)]
pub struct AutoPrompt {
    pub accept: bool,
}

impl Prompt for AutoPrompt {
    fn confirm(&self, message: &str) -> bool {
        info!("Confirm [{}]: {}", if self.accept { "yes" } else { "no" }, message.replace('\n', " "));
        self.accept
    }

    fn warn(&self, message: &str) {
        warn!("User warning: {}", message);
    }
}

/// Replays queued answers and records every question and warning.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<bool>>,
    fallback: bool,
    questions: Mutex<Vec<String>>,
    warnings: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn accepting() -> Self {
        Self {
            fallback: true,
            ..Self::default()
        }
    }

    pub fn declining() -> Self {
        Self::default()
    }

    /// Queue explicit answers; once drained the fallback answer is used.
    pub fn with_answers(self, answers: impl IntoIterator<Item = bool>) -> Self {
        self.answers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(answers);
        self
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Prompt for ScriptedPrompt {
    fn confirm(&self, message: &str) -> bool {
        self.questions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.to_string());
        self.answers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or(self.fallback)
    }

    fn warn(&self, message: &str) {
        self.warnings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_answers_then_fallback() {
        let p = ScriptedPrompt::accepting().with_answers([false]);
        assert!(!p.confirm("first?"));
        assert!(p.confirm("second?"));
        assert_eq!(p.questions(), vec!["first?", "second?"]);
    }

    #[test]
    fn test_warnings_recorded() {
        let p = ScriptedPrompt::declining();
        p.warn("careful");
        assert!(!p.confirm("sure?"));
        assert_eq!(p.warnings(), vec!["careful"]);
    }
}
