//! Record sources that feed the evidence collector.
//!
//! Each adapter flattens its own storage into [`EvidenceRecord`]s. The
//! collector owns the matching, weighting and ranking, so a new source only
//! has to say which handle a record belongs to and which way it went.

mod crm;
mod mail;
mod messages;

pub use crm::{CrmContact, CrmInformation, CrmNote, CrmNotes};
pub use mail::{MailAddress, MailArchive, MailMessage, parse_address_list};
pub use messages::MessageRecords;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use oscar_messages::Direction;

use crate::error::Result;
use crate::evidence::SourceTag;

/// One scannable record, already attributed to a counterpart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceRecord {
    /// Handle the record is attributed to.
    pub handle: String,

    /// Other handles the source knows belong to the same entity.
    pub alternate_handles: Vec<String>,

    /// Name the source gives the counterpart.
    pub display_name: Option<String>,

    /// Text searched for the term.
    pub text: String,

    /// Text shown in examples, when it differs from `text`.
    pub example_text: Option<String>,

    pub timestamp: Option<DateTime<Utc>>,

    pub direction: Direction,
}

impl EvidenceRecord {
    pub fn new(handle: impl Into<String>, text: impl Into<String>, direction: Direction) -> Self {
        Self {
            handle: handle.into(),
            alternate_handles: Vec::new(),
            display_name: None,
            text: text.into(),
            example_text: None,
            timestamp: None,
            direction,
        }
    }

    /// Text to quote in an example.
    pub fn example(&self) -> &str {
        self.example_text.as_deref().unwrap_or(&self.text)
    }
}

/// A read-only supplier of records for one evidence source.
pub trait RecordSource: Send + Sync {
    fn tag(&self) -> SourceTag;

    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Up to `limit` records in `direction`, newest first.
    fn records(&self, direction: Direction, limit: usize) -> Result<Vec<EvidenceRecord>>;
}

impl<R: RecordSource + ?Sized> RecordSource for Arc<R> {
    fn tag(&self) -> SourceTag {
        (**self).tag()
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn records(&self, direction: Direction, limit: usize) -> Result<Vec<EvidenceRecord>> {
        (**self).records(direction, limit)
    }
}
