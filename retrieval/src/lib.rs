//! # Retrieval
//!
//! Message search and the [`Oscar`] facade that ties contacts, message
//! history and evidence sources together.
//!
//! - **search**: AND-of-terms search with phrases, highlighting, contact
//!   filters and context windows; conversation listing and paging
//! - **mail**: the same search over mail subjects and bodies, with thread
//!   context
//! - **config**: TOML configuration for sources, evidence policy and limits
//! - **engine**: the async facade, loading sources from configuration
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                            Oscar                              │
//! ├───────────────────────────────────────────────────────────────┤
//! │                                                               │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐       │
//! │  │   Contact    │   │   Message    │   │   CRM notes  │       │
//! │  │  directories │   │   archive    │   │   and mail   │       │
//! │  └──────────────┘   └──────────────┘   └──────────────┘       │
//! │         │                  │                   │              │
//! │         ▼                  ▼                   ▼              │
//! │  ┌──────────────┐   ┌──────────────────────────────────┐      │
//! │  │ ContactIndex │──►│ IdentityResolver (evidence)      │      │
//! │  └──────────────┘   └──────────────────────────────────┘      │
//! │         │                          │                          │
//! │         └────────────┬─────────────┘                          │
//! │                      ▼                                        │
//! │              ┌──────────────┐                                 │
//! │              │ SearchEngine │                                 │
//! │              └──────────────┘                                 │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use oscar_retrieval::{Oscar, SearchRequest};
//!
//! let oscar = Oscar::builder()
//!     .with_directory_root("~/exports/contacts")
//!     .with_messages_path("~/exports/messages.jsonl")
//!     .build()
//!     .await?;
//!
//! let who = oscar.resolve("Mandy", true).await?;
//! let hits = oscar
//!     .search(SearchRequest::new("\"flight confirmation\"").with_days_back(7))
//!     .await?;
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod mail;
pub mod search;

pub use config::{EvidenceConfig, OscarConfig, SearchConfig, SourcesConfig};
pub use engine::{Oscar, OscarBuilder, OscarStats};
pub use error::{Result, RetrievalError};
pub use mail::{MailHit, ThreadContext, ThreadMessage};
pub use search::{
    ContactFilter, ContextResponse, ConversationMessage, ConversationOverview, ConversationPage,
    FilterSource, HitContext, SearchEngine, SearchHit, SearchRequest, SearchResponse,
    SearchSource, SearchStatus, parse_query,
};

// Re-export from dependencies for convenience
pub use oscar_evidence::{Candidate, Confidence, ResolvedIdentity, SourceTag};
pub use oscar_identity::ContactSummary;
pub use oscar_messages::{Direction, parse_cursor};
