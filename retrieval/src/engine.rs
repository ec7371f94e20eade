//! The `Oscar` facade: contacts, messages and evidence wired together from
//! configuration.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use oscar_evidence::{
    CrmNotes, EvidenceCollector, EvidenceSource, IdentityResolver, MailArchive, MessageRecords,
    ResolvedIdentity, SourceTag,
};
use oscar_identity::{
    ContactIndex, ContactSummary, DirectorySource, IndexStats, JsonDirectory,
    discover_directory_files,
};
use oscar_messages::{MessageArchive, MessageStore};

use crate::config::OscarConfig;
use crate::error::Result;
use crate::search::{
    ContextResponse, ConversationOverview, ConversationPage, SearchEngine, SearchRequest,
    SearchResponse,
};

/// Entry point for identity resolution and message search.
///
/// Record sources are loaded once at construction. The contact index is
/// built on first use and kept until [`Oscar::invalidate_contacts`]. Every
/// query runs on tokio's blocking pool.
pub struct Oscar {
    /// Configuration.
    config: OscarConfig,

    /// Contact directories.
    index: Arc<ContactIndex>,

    /// Directory lookup plus evidence sources.
    resolver: Arc<IdentityResolver>,

    /// Message search and conversation reading.
    search: Arc<SearchEngine>,

    /// Number of messages loaded.
    message_count: usize,

    /// Number of mail messages loaded.
    mail_count: usize,
}

impl Oscar {
    /// Create a new builder.
    pub fn builder() -> OscarBuilder {
        OscarBuilder::new()
    }

    /// Validate the configuration and load every configured source.
    ///
    /// Sources that cannot be read are logged and left out. Only an invalid
    /// configuration or an unreadable directory root fails.
    pub async fn open(config: OscarConfig) -> Result<Self> {
        config.validate()?;
        tokio::task::spawn_blocking(move || Self::load(config)).await?
    }

    fn load(config: OscarConfig) -> Result<Self> {
        info!("Opening Oscar");
        let sources = &config.sources;
        let collector = config.evidence.collector_settings();

        let mut directories: Vec<Arc<dyn DirectorySource>> = Vec::new();
        if let Some(root) = &sources.directory_root {
            for path in discover_directory_files(root)? {
                directories.push(Arc::new(JsonDirectory::new(path)));
            }
        }
        for path in &sources.directory_files {
            directories.push(Arc::new(JsonDirectory::new(path.clone())));
        }

        let mut evidence: Vec<Arc<dyn EvidenceSource>> = Vec::new();

        let archive = match &sources.messages_path {
            Some(path) => MessageArchive::open(path).unwrap_or_else(|e| {
                warn!("Message history unavailable: {e}");
                MessageArchive::default()
            }),
            None => MessageArchive::default(),
        };
        let message_count = archive.len();
        let store: Arc<dyn MessageStore> = Arc::new(archive);
        if sources.messages_path.is_some() {
            evidence.push(Arc::new(
                EvidenceCollector::new(MessageRecords::new(Arc::clone(&store)))
                    .with_settings(collector),
            ));
        }

        if let Some(path) = &sources.crm_notes_path {
            match CrmNotes::open(path) {
                Ok(crm) => {
                    directories.push(Arc::new(crm.clone()));
                    evidence.push(Arc::new(EvidenceCollector::new(crm).with_settings(collector)));
                }
                Err(e) => warn!("CRM notes unavailable: {e}"),
            }
        }

        let mut mail = None;
        let mut mail_count = 0;
        if let Some(path) = &sources.mail_path {
            match MailArchive::open(path) {
                Ok(archive) => {
                    let archive =
                        Arc::new(archive.with_self_addresses(sources.self_addresses.clone()));
                    evidence.push(Arc::new(
                        EvidenceCollector::new(Arc::clone(&archive)).with_settings(collector),
                    ));
                    mail_count = archive.len();
                    mail = Some(archive);
                }
                Err(e) => warn!("Mail history unavailable: {e}"),
            }
        }

        let directory_count = directories.len();
        let index = Arc::new(ContactIndex::new(directories));
        let resolver = Arc::new(
            evidence.into_iter().fold(
                IdentityResolver::new(Arc::clone(&index))
                    .with_settings(config.evidence.resolver_settings()),
                IdentityResolver::with_source,
            ),
        );
        let mut search = SearchEngine::new(store, Arc::clone(&index))
            .with_resolver(Arc::clone(&resolver))
            .with_config(config.search.clone());
        if let Some(archive) = mail {
            search = search.with_mail(archive);
        }
        let search = Arc::new(search);

        info!(
            "Oscar ready: {} contact directories, {} evidence sources, {} messages, {} mail messages",
            directory_count,
            resolver.source_tags().len(),
            message_count,
            mail_count
        );

        Ok(Self {
            config,
            index,
            resolver,
            search,
            message_count,
            mail_count,
        })
    }

    pub fn config(&self) -> &OscarConfig {
        &self.config
    }

    /// Who does `query` refer to?
    pub async fn resolve(&self, query: &str, search_all_sources: bool) -> Result<ResolvedIdentity> {
        let query = query.to_string();
        let resolver = Arc::clone(&self.resolver);
        Ok(
            tokio::task::spawn_blocking(move || resolver.resolve(&query, search_all_sources))
                .await?,
        )
    }

    /// Full-text search over messages and mail.
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        self.with_search(move |search| search.search(&request)).await
    }

    /// Latest conversations first.
    pub async fn list_conversations(&self, limit: Option<usize>) -> Result<Vec<ConversationOverview>> {
        self.with_search(move |search| search.list_conversations(limit))
            .await
    }

    /// A page of the newest conversation with `contact`.
    pub async fn read_conversation(
        &self,
        contact: &str,
        max_messages: Option<usize>,
        before: Option<DateTime<Utc>>,
    ) -> Result<ConversationPage> {
        let contact = contact.to_string();
        self.with_search(move |search| search.read_conversation(&contact, max_messages, before))
            .await
    }

    /// Messages with `contact`, centred on `around` when it matches.
    pub async fn get_context(
        &self,
        contact: &str,
        around: Option<&str>,
        max_messages: Option<usize>,
        days_back: Option<u32>,
    ) -> Result<ContextResponse> {
        let contact = contact.to_string();
        let around = around.map(str::to_string);
        self.with_search(move |search| {
            search.get_context(&contact, around.as_deref(), max_messages, days_back)
        })
        .await
    }

    /// Directory contacts whose names contain `query`.
    pub async fn search_contacts(&self, query: &str) -> Result<Vec<ContactSummary>> {
        let query = query.to_string();
        self.with_search(move |search| search.search_contacts(&query))
            .await
    }

    /// Drop the contact index; the next lookup re-reads every directory.
    pub fn invalidate_contacts(&self) {
        self.index.invalidate();
    }

    /// Get statistics, building the contact index if necessary.
    pub async fn stats(&self) -> Result<OscarStats> {
        let index = Arc::clone(&self.index);
        let contacts = tokio::task::spawn_blocking(move || index.stats()).await?;
        Ok(OscarStats {
            contacts,
            messages: self.message_count,
            mail_messages: self.mail_count,
            evidence_sources: self.resolver.source_tags(),
        })
    }

    async fn with_search<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&SearchEngine) -> T + Send + 'static,
    {
        let search = Arc::clone(&self.search);
        Ok(tokio::task::spawn_blocking(move || f(&search)).await?)
    }
}

impl std::fmt::Debug for Oscar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Oscar")
            .field("index", &self.index)
            .field("resolver", &self.resolver)
            .field("messages", &self.message_count)
            .field("mail", &self.mail_count)
            .finish()
    }
}

/// Builder for [`Oscar`].
#[derive(Debug, Default)]
pub struct OscarBuilder {
    config: OscarConfig,
}

impl OscarBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn with_config(mut self, config: OscarConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the root scanned for contact directory files.
    pub fn with_directory_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config = self.config.with_directory_root(root);
        self
    }

    /// Add a single contact directory file.
    pub fn with_directory_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config = self.config.with_directory_file(path);
        self
    }

    /// Set the JSON-lines message export.
    pub fn with_messages_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config = self.config.with_messages_path(path);
        self
    }

    /// Set the CRM export.
    pub fn with_crm_notes_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config = self.config.with_crm_notes_path(path);
        self
    }

    /// Set the mail export and the user's own addresses.
    pub fn with_mail_path(mut self, path: impl Into<PathBuf>, self_addresses: Vec<String>) -> Self {
        self.config = self.config.with_mail_path(path);
        for address in self_addresses {
            self.config = self.config.with_self_address(address);
        }
        self
    }

    /// Build the facade.
    pub async fn build(self) -> Result<Oscar> {
        Oscar::open(self.config).await
    }
}

/// Statistics about a running facade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OscarStats {
    /// Contact index statistics.
    pub contacts: IndexStats,

    /// Number of messages loaded.
    pub messages: usize,

    /// Number of mail messages loaded.
    #[serde(default)]
    pub mail_messages: usize,

    /// Evidence sources consulted by resolution, in order.
    pub evidence_sources: Vec<SourceTag>,
}
