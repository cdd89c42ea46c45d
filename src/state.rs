//! UI-agnostic conversation types
//!
//! These are the records the conversation store owns and the front end renders.
//! They don't depend on any specific UI framework.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque message identifier, assigned in increasing order by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub(crate) u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One unit of message content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Part {
    Text(String),
    /// A data URI or a remote URL.
    ImageUrl(String),
}

impl Part {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text(text) => Some(text),
            Part::ImageUrl(_) => None,
        }
    }

    pub fn as_image_url(&self) -> Option<&str> {
        match self {
            Part::ImageUrl(url) => Some(url),
            Part::Text(_) => None,
        }
    }
}

/// A chat message in the conversation log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub parts: Vec<Part>,
    #[serde(default)]
    pub is_pending: bool,
}

impl Message {
    pub(crate) fn user(id: MessageId, parts: Vec<Part>) -> Self {
        Self { id, role: Role::User, parts, is_pending: false }
    }

    pub(crate) fn model(id: MessageId, parts: Vec<Part>) -> Self {
        Self { id, role: Role::Model, parts, is_pending: false }
    }

    pub(crate) fn placeholder(id: MessageId) -> Self {
        Self { id, role: Role::Model, parts: Vec::new(), is_pending: true }
    }

    /// All text parts joined by blank lines.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn image_urls(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(Part::as_image_url)
    }
}
