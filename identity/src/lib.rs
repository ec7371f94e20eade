//! # Identity
//!
//! Handle normalization and contact directory indexing.
//!
//! - **Handles**: phone/email classification and canonical comparison keys
//! - **Contacts**: directory records and the sources that supply them
//! - **ContactIndex**: lazily built forward (handle → name) and reverse
//!   (name → handles) indices over any number of directories
//!
//! ```text
//! DirectorySource ──► ContactRecord ──► ContactIndex
//!   (JSON, memory)                        │      │
//!                                 get_name()    find_handles()
//! ```

pub mod contact;
pub mod error;
pub mod handle;
pub mod index;

pub use contact::{
    discover_directory_files, ContactRecord, DirectorySource, JsonDirectory, MemoryDirectory,
};
pub use error::{IdentityError, Result};
pub use handle::{classify, normalize, normalized_set, same_endpoint, Handle, HandleKind};
pub use index::{ContactIndex, ContactSummary, IndexStats};
