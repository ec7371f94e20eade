//! Read-only access to message history.
//!
//! [`MessageStore`] is the seam between the search/evidence code and
//! wherever messages actually live. [`MessageArchive`] is the bundled
//! implementation: an in-memory store loaded from a JSON-lines export.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use oscar_identity::Handle;

use crate::error::{MessageError, Result};
use crate::message::{Direction, MessageRecord};

/// Filters applied by [`MessageStore::recent`]. Every set field must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageQuery {
    /// Only messages exchanged with one of these handles (any spelling).
    pub handles: Vec<String>,

    /// Case-insensitive substring over the handle, conversation id and
    /// conversation name.
    pub contact_pattern: Option<String>,

    /// Only messages at or after this raw timestamp.
    pub since_raw: Option<i64>,

    /// Only messages strictly before this raw timestamp.
    pub before_raw: Option<i64>,

    pub direction: Option<Direction>,

    pub conversation_id: Option<String>,

    /// Maximum number of records returned.
    pub limit: Option<usize>,
}

impl MessageQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handles(mut self, handles: Vec<String>) -> Self {
        self.handles = handles;
        self
    }

    pub fn with_contact_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.contact_pattern = Some(pattern.into());
        self
    }

    pub fn with_since(mut self, raw: i64) -> Self {
        self.since_raw = Some(raw);
        self
    }

    pub fn with_before(mut self, raw: i64) -> Self {
        self.before_raw = Some(raw);
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Compile the query into a reusable predicate.
    pub fn matcher(&self) -> QueryMatcher<'_> {
        let handles = self.handles.iter().map(Handle::parse).collect();
        let pattern = self
            .contact_pattern
            .as_deref()
            .map(str::trim)
            .filter(|pattern| !pattern.is_empty())
            .map(str::to_lowercase);
        QueryMatcher {
            query: self,
            handles,
            pattern,
        }
    }
}

/// A [`MessageQuery`] with its handles parsed once.
#[derive(Debug)]
pub struct QueryMatcher<'a> {
    query: &'a MessageQuery,
    handles: Vec<Handle>,
    pattern: Option<String>,
}

impl QueryMatcher<'_> {
    pub fn matches(&self, record: &MessageRecord) -> bool {
        let query = self.query;
        if !record.has_body() {
            return false;
        }
        if query.since_raw.is_some_and(|since| record.timestamp_raw < since) {
            return false;
        }
        if query.before_raw.is_some_and(|before| record.timestamp_raw >= before) {
            return false;
        }
        if query.direction.is_some_and(|direction| record.direction() != direction) {
            return false;
        }
        if query
            .conversation_id
            .as_deref()
            .is_some_and(|id| record.conversation_id != id)
        {
            return false;
        }
        if !self.handles.is_empty() && !self.matches_handle(record) {
            return false;
        }
        if let Some(pattern) = &self.pattern {
            let fields = [
                record.handle.as_deref(),
                Some(record.conversation_id.as_str()),
                record.conversation_name.as_deref(),
            ];
            let hit = fields
                .into_iter()
                .flatten()
                .any(|field| field.to_lowercase().contains(pattern.as_str()));
            if !hit {
                return false;
            }
        }
        true
    }

    fn matches_handle(&self, record: &MessageRecord) -> bool {
        let Some(raw) = record.handle.as_deref() else {
            return false;
        };
        let candidate = Handle::parse(raw);
        self.handles.iter().any(|wanted| {
            wanted.raw == raw
                || (wanted.kind == candidate.kind
                    && wanted.is_matchable()
                    && wanted.normalized == candidate.normalized)
        })
    }
}

/// Records surrounding one message in its conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Neighbors {
    /// Preceding records, oldest first.
    pub before: Vec<MessageRecord>,
    /// Following records, oldest first.
    pub after: Vec<MessageRecord>,
}

/// Aggregate view of one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub display_name: Option<String>,
    /// Distinct counterpart handles seen in the conversation.
    pub handles: Vec<String>,
    pub message_count: usize,
    pub last_message: MessageRecord,
}

impl ConversationSummary {
    pub fn is_group(&self) -> bool {
        self.handles.len() > 1
    }
}

/// Read-only message history.
///
/// Implementations must be safe to share across threads; every call is an
/// independent scan.
pub trait MessageStore: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Records matching `query` that carry a body, newest first.
    fn recent(&self, query: &MessageQuery) -> Result<Vec<MessageRecord>>;

    /// Up to `count` records on each side of `message_id` in its
    /// conversation, by arrival order. Rows without any body are skipped.
    fn neighbors(&self, message_id: i64, count: usize) -> Result<Neighbors>;

    /// Conversations ordered by their latest message, newest first.
    fn conversations(&self, limit: usize) -> Result<Vec<ConversationSummary>>;
}

/// In-memory message store.
#[derive(Debug, Clone, Default)]
pub struct MessageArchive {
    name: String,

    /// Records in arrival (id) order.
    records: Vec<MessageRecord>,

    /// Conversation id → positions in `records`, ascending.
    by_conversation: HashMap<String, Vec<usize>>,

    /// Message id → position in `records`.
    by_id: HashMap<i64, usize>,
}

impl MessageArchive {
    /// Build an archive from records in any order.
    pub fn from_records(name: impl Into<String>, mut records: Vec<MessageRecord>) -> Self {
        records.sort_by_key(|record| record.id);

        let mut by_conversation: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_id = HashMap::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            by_conversation
                .entry(record.conversation_id.clone())
                .or_default()
                .push(position);
            by_id.insert(record.id, position);
        }

        Self {
            name: name.into(),
            records,
            by_conversation,
            by_id,
        }
    }

    /// Load a JSON-lines export. Blank lines are ignored and malformed lines
    /// are logged and skipped.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(MessageError::SourceUnavailable {
                path: PathBuf::from(path),
            });
        }

        let content = std::fs::read_to_string(path)?;
        let mut records = Vec::new();
        let mut skipped = 0usize;
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<MessageRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    skipped += 1;
                    let error = MessageError::Decode {
                        line: index + 1,
                        reason: e.to_string(),
                    };
                    warn!("Skipping record in {}: {error}", path.display());
                }
            }
        }

        info!(
            "Loaded {} messages from {} ({} skipped)",
            records.len(),
            path.display(),
            skipped
        );
        Ok(Self::from_records(path.display().to_string(), records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[MessageRecord] {
        &self.records
    }

    fn with_body<'a>(
        &'a self,
        positions: impl Iterator<Item = &'a usize>,
        count: usize,
    ) -> Vec<MessageRecord> {
        positions
            .map(|&position| &self.records[position])
            .filter(|record| record.body().is_some())
            .take(count)
            .cloned()
            .collect()
    }
}

impl MessageStore for MessageArchive {
    fn name(&self) -> &str {
        &self.name
    }

    fn recent(&self, query: &MessageQuery) -> Result<Vec<MessageRecord>> {
        let matcher = query.matcher();
        let mut found: Vec<&MessageRecord> = self
            .records
            .iter()
            .filter(|record| matcher.matches(record))
            .collect();
        found.sort_by(|a, b| {
            b.timestamp_raw
                .cmp(&a.timestamp_raw)
                .then_with(|| b.id.cmp(&a.id))
        });
        if let Some(limit) = query.limit {
            found.truncate(limit);
        }
        debug!("{}: {} records matched", self.name, found.len());
        Ok(found.into_iter().cloned().collect())
    }

    fn neighbors(&self, message_id: i64, count: usize) -> Result<Neighbors> {
        let Some(&position) = self.by_id.get(&message_id) else {
            return Ok(Neighbors::default());
        };
        let conversation = &self.records[position].conversation_id;
        let Some(positions) = self.by_conversation.get(conversation) else {
            return Ok(Neighbors::default());
        };
        let split = positions.partition_point(|&p| p < position);

        let mut before = self.with_body(positions[..split].iter().rev(), count);
        before.reverse();
        let after = self.with_body(positions[split..].iter().skip(1), count);

        Ok(Neighbors { before, after })
    }

    fn conversations(&self, limit: usize) -> Result<Vec<ConversationSummary>> {
        let mut summaries: Vec<ConversationSummary> = self
            .by_conversation
            .iter()
            .filter_map(|(conversation_id, positions)| {
                let records: Vec<&MessageRecord> =
                    positions.iter().map(|&p| &self.records[p]).collect();
                let last = records
                    .iter()
                    .max_by_key(|record| (record.timestamp_raw, record.id))?;
                let handles: IndexSet<String> = records
                    .iter()
                    .filter_map(|record| record.handle.clone())
                    .filter(|handle| !handle.is_empty())
                    .collect();
                let display_name = records
                    .iter()
                    .rev()
                    .find_map(|record| record.conversation_name.clone())
                    .filter(|name| !name.trim().is_empty());
                Some(ConversationSummary {
                    conversation_id: conversation_id.clone(),
                    display_name,
                    handles: handles.into_iter().collect(),
                    message_count: records.len(),
                    last_message: (*last).clone(),
                })
            })
            .collect();

        summaries.sort_by(|a, b| {
            b.last_message
                .timestamp_raw
                .cmp(&a.last_message.timestamp_raw)
                .then_with(|| a.conversation_id.cmp(&b.conversation_id))
        });
        summaries.truncate(limit);
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn archive() -> MessageArchive {
        MessageArchive::from_records(
            "test",
            vec![
                MessageRecord::new(3, "chat-a", "third")
                    .with_handle("+15551234567")
                    .with_timestamp(300),
                MessageRecord::new(1, "chat-a", "first")
                    .with_handle("+15551234567")
                    .with_timestamp(100),
                MessageRecord::new(2, "chat-b", "other chat")
                    .with_handle("jane@example.com")
                    .with_timestamp(200)
                    .with_direction(Direction::Outbound)
                    .with_conversation_name("Jane"),
                MessageRecord::new(4, "chat-a", "").with_timestamp(400),
                MessageRecord::new(5, "chat-a", "fifth")
                    .with_handle("+15551234567")
                    .with_timestamp(500),
                MessageRecord::new(6, "chat-a", "sixth")
                    .with_direction(Direction::Outbound)
                    .with_timestamp(600),
            ],
        )
    }

    fn ids(records: &[MessageRecord]) -> Vec<i64> {
        records.iter().map(|record| record.id).collect()
    }

    #[test]
    fn test_recent_is_newest_first_and_skips_empty_rows() {
        let found = archive().recent(&MessageQuery::new()).unwrap();
        assert_eq!(ids(&found), vec![6, 5, 3, 2, 1]);
    }

    #[test]
    fn test_handle_filter_accepts_any_spelling() {
        let query = MessageQuery::new().with_handles(vec!["(555) 123-4567".to_string()]);
        let found = archive().recent(&query).unwrap();
        assert_eq!(ids(&found), vec![5, 3, 1]);
    }

    #[test]
    fn test_time_direction_and_limit_filters() {
        let archive = archive();
        let query = MessageQuery::new().with_since(300).with_before(600);
        assert_eq!(ids(&archive.recent(&query).unwrap()), vec![5, 3]);

        let query = MessageQuery::new().with_direction(Direction::Outbound);
        assert_eq!(ids(&archive.recent(&query).unwrap()), vec![6, 2]);

        let query = MessageQuery::new().with_limit(2);
        assert_eq!(ids(&archive.recent(&query).unwrap()), vec![6, 5]);
    }

    #[test]
    fn test_contact_pattern_searches_names_and_ids() {
        let archive = archive();
        let query = MessageQuery::new().with_contact_pattern("JANE");
        assert_eq!(ids(&archive.recent(&query).unwrap()), vec![2]);

        let query = MessageQuery::new().with_contact_pattern("chat-b");
        assert_eq!(ids(&archive.recent(&query).unwrap()), vec![2]);
    }

    #[test]
    fn test_neighbors_stay_in_conversation() {
        let neighbors = archive().neighbors(3, 1).unwrap();
        assert_eq!(ids(&neighbors.before), vec![1]);
        // Row 4 has no body and is skipped.
        assert_eq!(ids(&neighbors.after), vec![5]);

        let neighbors = archive().neighbors(5, 10).unwrap();
        assert_eq!(ids(&neighbors.before), vec![1, 3]);
        assert_eq!(ids(&neighbors.after), vec![6]);

        assert_eq!(archive().neighbors(99, 3).unwrap(), Neighbors::default());
    }

    #[test]
    fn test_neighbors_skip_unreadable_rich_bodies() {
        let archive = MessageArchive::from_records(
            "test",
            vec![
                MessageRecord::new(1, "chat-a", "first").with_timestamp(100),
                MessageRecord::new(2, "chat-a", "second").with_timestamp(200),
                MessageRecord::new(3, "chat-a", "")
                    .with_rich_body(vec![0x00, 0x01, 0x02])
                    .with_timestamp(300),
                MessageRecord::new(4, "chat-a", "fourth").with_timestamp(400),
            ],
        );
        let neighbors = archive.neighbors(4, 2).unwrap();
        assert_eq!(ids(&neighbors.before), vec![1, 2]);
    }

    #[test]
    fn test_conversations_latest_first() {
        let conversations = archive().conversations(10).unwrap();
        assert_eq!(conversations.len(), 2);
        assert_eq!(conversations[0].conversation_id, "chat-a");
        assert_eq!(conversations[0].message_count, 5);
        assert_eq!(conversations[0].last_message.id, 6);
        assert_eq!(conversations[0].handles, vec!["+15551234567"]);
        assert!(!conversations[0].is_group());
        assert_eq!(conversations[1].display_name.as_deref(), Some("Jane"));

        assert_eq!(archive().conversations(1).unwrap().len(), 1);
    }

    #[test]
    fn test_open_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"id":1,"text":"hello","conversation_id":"c"}"#,
                "\n\nnot json\n",
                r#"{"id":2,"text":"again","conversationId":"c","isOutbound":true}"#,
                "\n"
            ),
        )
        .unwrap();

        let archive = MessageArchive::open(&path).unwrap();
        assert_eq!(archive.len(), 2);
        assert_eq!(archive.records()[1].direction(), Direction::Outbound);
    }

    #[test]
    fn test_open_missing_file() {
        assert!(matches!(
            MessageArchive::open("/no/such/messages.jsonl"),
            Err(MessageError::SourceUnavailable { .. })
        ));
    }
}
