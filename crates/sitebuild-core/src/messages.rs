//! User-facing messages collected during a unit of work.
//!
//! Operators see these after the unit of work completes (the CLI prints
//! them). Each message is mirrored to `tracing` as it is added.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{error, info};

/// Severity of a user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Status,
    Error,
}

/// A single user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub level: MessageLevel,
    pub text: String,
}

impl Message {
    pub fn status(text: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Status,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Error,
            text: text.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == MessageLevel::Error
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Unit-of-work message sink. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct Messenger {
    messages: Arc<Mutex<Vec<Message>>>,
}

impl Messenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_status(&self, text: impl Into<String>) {
        self.add(Message::status(text));
    }

    pub fn add_error(&self, text: impl Into<String>) {
        self.add(Message::error(text));
    }

    pub fn add(&self, message: Message) {
        match message.level {
            MessageLevel::Status => info!(message = %message.text, "status"),
            MessageLevel::Error => error!(message = %message.text, "error"),
        }
        self.lock().push(message);
    }

    /// Copy of every message so far, in insertion order.
    pub fn all(&self) -> Vec<Message> {
        self.lock().clone()
    }

    pub fn errors(&self) -> Vec<Message> {
        self.lock().iter().filter(|m| m.is_error()).cloned().collect()
    }

    /// Remove and return every message.
    pub fn drain(&self) -> Vec<Message> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Message>> {
        // A panic while holding the lock cannot leave the Vec inconsistent.
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
