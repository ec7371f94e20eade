use std::sync::Arc;

use oscar_messages::{Direction, MessageQuery, MessageStore};

use super::{EvidenceRecord, RecordSource};
use crate::error::Result;
use crate::evidence::SourceTag;

/// Local message history as evidence records.
///
/// Rows whose body cannot be recovered, or that have no counterpart, are
/// dropped after the window is taken, so a window of `n` can yield fewer
/// than `n` records.
#[derive(Clone)]
pub struct MessageRecords {
    store: Arc<dyn MessageStore>,
}

impl MessageRecords {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }
}

impl std::fmt::Debug for MessageRecords {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRecords")
            .field("store", &self.store.name())
            .finish()
    }
}

impl RecordSource for MessageRecords {
    fn tag(&self) -> SourceTag {
        SourceTag::Messages
    }

    fn name(&self) -> &str {
        self.store.name()
    }

    fn records(&self, direction: Direction, limit: usize) -> Result<Vec<EvidenceRecord>> {
        let query = MessageQuery::new()
            .with_direction(direction)
            .with_limit(limit);
        let rows = self.store.recent(&query)?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let text = row.body()?;
                let handle = row.counterpart()?.to_string();
                Some(EvidenceRecord {
                    handle,
                    alternate_handles: Vec::new(),
                    display_name: None,
                    text,
                    example_text: None,
                    timestamp: row.timestamp(),
                    direction: row.direction(),
                })
            })
            .collect())
    }
}
