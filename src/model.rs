//! Notification types shared by the HTTP surface, the queue wire format and
//! the storage layer.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Closed set of notification types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Warning,
    System,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 3] = [Self::Info, Self::Warning, Self::System];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::System => "system",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "system" => Ok(Self::System),
            other => Err(ValidationError::InvalidType(other.to_string())),
        }
    }
}

/// Input shape errors. Never worth retrying.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("room, type, title, body are required")]
    MissingFields,

    #[error("invalid notification type: {0:?}")]
    InvalidType(String),
}

/// A persisted notification. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub room: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Unvalidated creation request, as received over HTTP or the queue.
///
/// Missing JSON keys decode as empty strings so that presence checks can
/// report them instead of failing the decode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    #[serde(default)]
    pub room: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl NotificationPayload {
    pub fn new(
        room: impl Into<String>,
        kind: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            room: room.into(),
            kind: kind.into(),
            title: title.into(),
            body: body.into(),
            created_at: None,
        }
    }

    /// Check that room, type, title and body are all non-empty.
    pub fn check_required(&self) -> Result<(), ValidationError> {
        if self.room.is_empty() || self.kind.is_empty() || self.title.is_empty() || self.body.is_empty()
        {
            return Err(ValidationError::MissingFields);
        }
        Ok(())
    }

    /// Parse into a write request, checking presence first and type second.
    pub fn validate(self) -> Result<NewNotification, ValidationError> {
        self.check_required()?;
        let kind = self.kind.parse()?;
        Ok(NewNotification {
            room: self.room,
            kind,
            title: self.title,
            body: self.body,
            created_at: self.created_at.map(stored_precision),
        })
    }
}

/// Timestamps are kept to the millisecond by every store.
pub fn stored_precision(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(3)
}

/// A validated notification ready to be written.
///
/// The repository assigns the id, and `created_at` when it is absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub room: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub created_at: Option<DateTime<Utc>>,
}
