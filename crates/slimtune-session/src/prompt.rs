//! User confirmation and input contract.
//!
//! The coordinator asks before destructive operations (delete snapshot,
//! clear live data, close session) and when it needs a name or a save
//! destination, but it contains no UI code. Presentation layers implement
//! [`Prompter`]; [`AssumeYes`] serves non-interactive callers and
//! [`ScriptedPrompter`] drives tests.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Answer to a confirmation question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Yes,
    No,
    Cancel,
}

/// Dialog surface used by the coordinator.
///
/// Calls happen on the session's serialized context and block it until
/// answered.
pub trait Prompter: Send {
    /// Asks a yes/no(/cancel) question.
    fn confirm(&mut self, title: &str, message: &str) -> Confirmation;

    /// Asks for a line of text. `None` means cancelled.
    fn prompt_text(&mut self, title: &str, message: &str, default: &str) -> Option<String>;

    /// Asks where to save results. `None` means cancelled.
    fn prompt_save_path(&mut self, extension: &str) -> Option<PathBuf>;

    /// Shows an informational or error message.
    fn notify(&mut self, title: &str, message: &str);
}

/// Answers yes to everything and never supplies text or paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Prompter for AssumeYes {
    fn confirm(&mut self, _title: &str, _message: &str) -> Confirmation {
        Confirmation::Yes
    }

    fn prompt_text(&mut self, _title: &str, _message: &str, _default: &str) -> Option<String> {
        None
    }

    fn prompt_save_path(&mut self, _extension: &str) -> Option<PathBuf> {
        None
    }

    fn notify(&mut self, _title: &str, _message: &str) {}
}

/// A queued answer for [`ScriptedPrompter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Confirm(Confirmation),
    Text(Option<String>),
    SavePath(Option<PathBuf>),
}

/// Record of every prompt shown, for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptRecord {
    Confirm { title: String, message: String },
    Text { title: String, default: String },
    SavePath { extension: String },
    Notify { title: String, message: String },
}

/// Prompter answering from a queue.
///
/// When the queue runs dry (or the next answer is of the wrong kind) it
/// falls back to `Cancel` / `None`. Clones share the same queue and log.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPrompter {
    answers: Arc<Mutex<VecDeque<Answer>>>,
    log: Arc<Mutex<Vec<PromptRecord>>>,
}

impl ScriptedPrompter {
    pub fn new(answers: impl IntoIterator<Item = Answer>) -> Self {
        Self {
            answers: Arc::new(Mutex::new(answers.into_iter().collect())),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn push(&self, answer: Answer) {
        if let Ok(mut answers) = self.answers.lock() {
            answers.push_back(answer);
        }
    }

    /// Prompts shown so far.
    pub fn log(&self) -> Vec<PromptRecord> {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    fn record(&self, record: PromptRecord) {
        if let Ok(mut log) = self.log.lock() {
            log.push(record);
        }
    }

    fn next(&self) -> Option<Answer> {
        self.answers.lock().ok().and_then(|mut a| a.pop_front())
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&mut self, title: &str, message: &str) -> Confirmation {
        self.record(PromptRecord::Confirm {
            title: title.to_string(),
            message: message.to_string(),
        });
        match self.next() {
            Some(Answer::Confirm(answer)) => answer,
            _ => Confirmation::Cancel,
        }
    }

    fn prompt_text(&mut self, title: &str, _message: &str, default: &str) -> Option<String> {
        self.record(PromptRecord::Text {
            title: title.to_string(),
            default: default.to_string(),
        });
        match self.next() {
            Some(Answer::Text(text)) => text,
            _ => None,
        }
    }

    fn prompt_save_path(&mut self, extension: &str) -> Option<PathBuf> {
        self.record(PromptRecord::SavePath {
            extension: extension.to_string(),
        });
        match self.next() {
            Some(Answer::SavePath(path)) => path,
            _ => None,
        }
    }

    fn notify(&mut self, title: &str, message: &str) {
        self.record(PromptRecord::Notify {
            title: title.to_string(),
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_answers_in_order() {
        let mut prompter = ScriptedPrompter::new([
            Answer::Confirm(Confirmation::No),
            Answer::Text(Some("renamed".to_string())),
        ]);
        assert_eq!(prompter.confirm("t", "m"), Confirmation::No);
        assert_eq!(
            prompter.prompt_text("t", "m", "old"),
            Some("renamed".to_string())
        );
        // Queue exhausted
        assert_eq!(prompter.confirm("t", "m"), Confirmation::Cancel);
        assert_eq!(prompter.log().len(), 3);
    }

    #[test]
    fn test_mismatched_answer_falls_back() {
        let mut prompter = ScriptedPrompter::new([Answer::Confirm(Confirmation::Yes)]);
        assert_eq!(prompter.prompt_save_path("json"), None);
    }

    #[test]
    fn test_clones_share_log() {
        let prompter = ScriptedPrompter::default();
        let mut clone = prompter.clone();
        clone.notify("Saved", "done");
        assert_eq!(
            prompter.log(),
            vec![PromptRecord::Notify {
                title: "Saved".to_string(),
                message: "done".to_string()
            }]
        );
    }

    #[test]
    fn test_assume_yes() {
        let mut prompter = AssumeYes;
        assert_eq!(prompter.confirm("t", "m"), Confirmation::Yes);
        assert_eq!(prompter.prompt_text("t", "m", "d"), None);
    }
}
