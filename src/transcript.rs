//! Conversation transcript: an ordered list of role-tagged messages
//!
//! The transcript is the single piece of persistent session state. It
//! serializes to a plain JSON array of `{role, content}` objects, with
//! no envelope or version field, so saved files stay readable by hand
//! and by other Ollama-style tooling.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One conversation message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Errors from loading or saving a transcript file
///
/// "File not found" and "malformed JSON" are distinct kinds so callers
/// can report them differently. On any failure the in-memory transcript
/// is left untouched.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transcript file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("malformed transcript JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Ordered sequence of messages
///
/// Invariant: at most one `system` message, and if present it sits at
/// position 0. All mutation goes through methods that preserve this.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last_role(&self) -> Option<Role> {
        self.messages.last().map(|m| m.role)
    }

    /// The current system prompt, if one is set
    pub fn system(&self) -> Option<&str> {
        match self.messages.first() {
            Some(m) if m.role == Role::System => Some(&m.content),
            _ => None,
        }
    }

    /// Set or replace the leading system message
    pub fn set_system(&mut self, prompt: impl Into<String>) {
        let prompt = prompt.into();
        match self.messages.first_mut() {
            Some(m) if m.role == Role::System => m.content = prompt,
            _ => self.messages.insert(0, Message::system(prompt)),
        }
    }

    /// Reset to empty, keeping the system message if one is set
    pub fn clear(&mut self) {
        let system = self.system().map(Message::system);
        self.messages.clear();
        if let Some(m) = system {
            self.messages.push(m);
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    /// Append text to the last assistant message (continuation turns)
    ///
    /// Falls back to pushing a new assistant message if the last entry
    /// is not an assistant message.
    pub fn extend_last_assistant(&mut self, text: &str) {
        match self.messages.last_mut() {
            Some(m) if m.role == Role::Assistant => m.content.push_str(text),
            _ => self.push_assistant(text),
        }
    }

    /// Render the transcript as a JSON array
    pub fn to_json(&self, pretty: bool) -> Result<String, serde_json::Error> {
        if pretty {
            serde_json::to_string_pretty(&self.messages)
        } else {
            serde_json::to_string(&self.messages)
        }
    }

    /// Write the transcript to `path` as a JSON array
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let json = self.to_json(true)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load a transcript from `path`, replacing nothing on failure
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                StoreError::NotFound(path.to_path_buf())
            } else {
                StoreError::Io(e)
            }
        })?;
        let messages: Vec<Message> = serde_json::from_str(&content)?;
        Ok(Self { messages })
    }
}
