//! # Messages
//!
//! Message history as plain records.
//!
//! - **attributed**: best-effort text recovery from archived rich-text bodies
//! - **timestamp**: exact conversion of store timestamps to calendar time
//! - **store**: the [`MessageStore`] trait and the JSON-lines [`MessageArchive`]
//!
//! ```text
//! messages.jsonl ──► MessageArchive ──► MessageRecord ──► body()
//!                        │                                  │
//!                 recent / neighbors              text or attributed::extract
//! ```

pub mod attributed;
pub mod error;
pub mod message;
pub mod store;
pub mod timestamp;

pub use attributed::{extract, extract_detailed, Extraction, ExtractionMethod};
pub use error::{MessageError, Result};
pub use message::{conversation_handle, snippet, Direction, MessageRecord};
pub use store::{ConversationSummary, MessageArchive, MessageQuery, MessageStore, Neighbors};
pub use timestamp::{apple_to_datetime, datetime_to_apple, days_before, format_cursor, format_iso, parse_cursor};
