//! User-facing notifications
//!
//! The settlement flow reports outcomes the user must see (denials,
//! failed transactions) through a `Notifier`. The front end decides how
//! to render them; the binary just logs.

use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: Level,
    pub message: String,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, level: Level, message: &str);

    fn error(&self, message: &str) {
        self.notify(Level::Error, message);
    }

    fn success(&self, message: &str) {
        self.notify(Level::Success, message);
    }
}

/// Emits notifications as log events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, level: Level, message: &str) {
        match level {
            Level::Success => tracing::info!(notification = true, "{}", message),
            Level::Error => tracing::warn!(notification = true, "{}", message),
        }
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.seen
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<String> {
        self.notifications()
            .into_iter()
            .filter(|n| n.level == Level::Error)
            .map(|n| n.message)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, level: Level, message: &str) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(Notification {
                level,
                message: message.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_notifier_separates_levels() {
        let notifier = RecordingNotifier::new();
        notifier.success("Order placed");
        notifier.error("Approval failed");

        assert_eq!(notifier.notifications().len(), 2);
        assert_eq!(notifier.errors(), vec!["Approval failed".to_string()]);
    }
}
