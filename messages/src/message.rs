//! Message records as read from the local message store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attributed;
use crate::timestamp::{apple_to_datetime, format_iso};

/// Which side of the conversation wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Sent by the local user.
    Outbound,
    /// Received from the other party.
    Inbound,
}

impl Direction {
    pub fn from_outbound(is_outbound: bool) -> Self {
        if is_outbound {
            Self::Outbound
        } else {
            Self::Inbound
        }
    }

    pub fn is_outbound(self) -> bool {
        matches!(self, Self::Outbound)
    }
}

/// One row of the message store.
///
/// Either `text` or `rich_body` usually carries the body; newer rows often
/// leave `text` empty and only store the archived rich-text blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageRecord {
    /// Store row id. Ids grow in arrival order.
    pub id: i64,

    pub text: Option<String>,

    /// Archived rich-text body, base64 in serialized form.
    #[serde(
        alias = "richBody",
        with = "base64_bytes",
        skip_serializing_if = "Option::is_none"
    )]
    pub rich_body: Option<Vec<u8>>,

    /// Nanoseconds since 2001-01-01 UTC.
    #[serde(alias = "timestampRaw")]
    pub timestamp_raw: i64,

    #[serde(alias = "isOutbound")]
    pub is_outbound: bool,

    /// Handle of the other party, when the store knows it.
    pub handle: Option<String>,

    #[serde(alias = "conversationId")]
    pub conversation_id: String,

    /// Group name or other display name for the conversation.
    #[serde(alias = "conversationName", alias = "displayName")]
    pub conversation_name: Option<String>,
}

impl MessageRecord {
    /// Create an inbound record with plain text.
    pub fn new(id: i64, conversation_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id,
            text: Some(text.into()),
            conversation_id: conversation_id.into(),
            ..Self::default()
        }
    }

    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = Some(handle.into());
        self
    }

    pub fn with_timestamp(mut self, raw: i64) -> Self {
        self.timestamp_raw = raw;
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.is_outbound = direction.is_outbound();
        self
    }

    pub fn with_rich_body(mut self, blob: Vec<u8>) -> Self {
        self.text = None;
        self.rich_body = Some(blob);
        self
    }

    pub fn with_conversation_name(mut self, name: impl Into<String>) -> Self {
        self.conversation_name = Some(name.into());
        self
    }

    pub fn direction(&self) -> Direction {
        Direction::from_outbound(self.is_outbound)
    }

    /// Whether the row carries anything a body could be recovered from.
    pub fn has_body(&self) -> bool {
        self.text.as_deref().is_some_and(|text| !text.is_empty()) || self.rich_body.is_some()
    }

    /// Readable body: the plain text when present, otherwise whatever the
    /// rich-text extractor recovers.
    pub fn body(&self) -> Option<String> {
        match self.text.as_deref() {
            Some(text) if !text.is_empty() => Some(text.to_string()),
            _ => self.rich_body.as_deref().and_then(attributed::extract),
        }
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        apple_to_datetime(self.timestamp_raw)
    }

    /// Timestamp as RFC 3339, when the row has one.
    pub fn timestamp_iso(&self) -> Option<String> {
        self.timestamp().map(format_iso)
    }

    /// Best guess at the other party's handle: the row's handle, else the
    /// last `;`-separated segment of the conversation id
    /// (`iMessage;-;+15551234567`).
    pub fn counterpart(&self) -> Option<&str> {
        self.handle
            .as_deref()
            .filter(|handle| !handle.is_empty())
            .or_else(|| conversation_handle(&self.conversation_id))
    }
}

/// Handle embedded in a conversation id, if any.
pub fn conversation_handle(conversation_id: &str) -> Option<&str> {
    conversation_id
        .rsplit(';')
        .next()
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
}

/// At most `max_chars` characters of `text`.
pub fn snippet(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .filter(|encoded| !encoded.is_empty())
            .map(|encoded| STANDARD.decode(encoded).map_err(serde::de::Error::custom))
            .transpose()
    }
}
