//! # Evidence
//!
//! Who does an informal name refer to? This crate answers by weighing how
//! the name is used across the user's communication history.
//!
//! - **sources**: adapters that flatten message, CRM and mail history into
//!   [`EvidenceRecord`]s
//! - **collector**: whole-word and self-reference scanning of one source
//! - **resolver**: merging directory lookups and evidence into ranked
//!   [`Candidate`]s
//!
//! ```text
//!                 ┌──────────────┐
//!  query ───────► │ ContactIndex │ ── direct match (high) ──┐
//!                 └──────────────┘                          │
//!  MessageRecords ─┐                                        ▼
//!  CrmNotes ───────┼─► EvidenceCollector ─► EvidenceMatch ─► IdentityResolver ─► ResolvedIdentity
//!  MailArchive ────┘
//! ```

pub mod collector;
pub mod error;
pub mod evidence;
pub mod resolver;
pub mod sources;

pub use collector::{CollectorSettings, EvidenceCollector, EvidenceSource};
pub use error::{EvidenceError, Result};
pub use evidence::{
    Confidence, ConfidencePolicy, EvidenceExample, EvidenceKind, EvidenceMatch, SourceTag,
    identity_keys, keys_intersect,
};
pub use resolver::{
    Candidate, DIRECT_MATCH_REASON, IdentityResolver, ResolvedIdentity, ResolverSettings,
};
pub use sources::{
    CrmContact, CrmInformation, CrmNote, CrmNotes, EvidenceRecord, MailAddress, MailArchive,
    MailMessage, MessageRecords, RecordSource, parse_address_list,
};
