//! Configuration for the Oscar facade.
//!
//! Loaded from TOML; every field has a default so a partial file (or none at
//! all) is valid.
//!
//! ```toml
//! [sources]
//! directory_root = "~/exports/contacts"
//! messages_path = "~/exports/messages.jsonl"
//! self_addresses = ["me@example.com"]
//!
//! [evidence]
//! scan_window = 5000
//! high_above = 10
//!
//! [search]
//! default_max_results = 20
//! scan_window = 5000
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use oscar_evidence::{CollectorSettings, ConfidencePolicy, ResolverSettings};

use crate::error::{Result, RetrievalError};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OscarConfig {
    /// Where records are read from.
    pub sources: SourcesConfig,

    /// Evidence scanning and confidence policy.
    pub evidence: EvidenceConfig,

    /// Search and conversation limits.
    pub search: SearchConfig,
}

impl OscarConfig {
    /// Create a configuration with default values and no sources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a TOML file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// `<config dir>/oscar/config.toml`, when the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("oscar").join("config.toml"))
    }

    /// Load `path` if given, else the default path if it exists, else the
    /// defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// Reject settings that would make every scan empty or the tiers
    /// inconsistent.
    pub fn validate(&self) -> Result<()> {
        let evidence = &self.evidence;
        if evidence.scan_window == 0 {
            return Err(RetrievalError::Config(
                "evidence.scan_window must be positive".to_string(),
            ));
        }
        if evidence.max_candidates_per_source == 0 {
            return Err(RetrievalError::Config(
                "evidence.max_candidates_per_source must be positive".to_string(),
            ));
        }
        if evidence.medium_above > evidence.high_above {
            return Err(RetrievalError::Config(format!(
                "evidence.medium_above ({}) exceeds evidence.high_above ({})",
                evidence.medium_above, evidence.high_above
            )));
        }

        let search = &self.search;
        if search.default_max_results == 0 || search.max_results_cap == 0 {
            return Err(RetrievalError::Config(
                "search result limits must be positive".to_string(),
            ));
        }
        if search.default_max_results > search.max_results_cap {
            return Err(RetrievalError::Config(format!(
                "search.default_max_results ({}) exceeds search.max_results_cap ({})",
                search.default_max_results, search.max_results_cap
            )));
        }
        if search.scan_window == 0 {
            return Err(RetrievalError::Config(
                "search.scan_window must be positive".to_string(),
            ));
        }
        if search.highlight_delimiter.is_empty() {
            return Err(RetrievalError::Config(
                "search.highlight_delimiter must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the root scanned for contact directory files.
    pub fn with_directory_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sources.directory_root = Some(root.into());
        self
    }

    /// Add a single contact directory file.
    pub fn with_directory_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.directory_files.push(path.into());
        self
    }

    /// Set the JSON-lines message export.
    pub fn with_messages_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.messages_path = Some(path.into());
        self
    }

    /// Set the CRM export.
    pub fn with_crm_notes_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.crm_notes_path = Some(path.into());
        self
    }

    /// Set the mail export.
    pub fn with_mail_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.mail_path = Some(path.into());
        self
    }

    /// Add an address that belongs to the user.
    pub fn with_self_address(mut self, address: impl Into<String>) -> Self {
        self.sources.self_addresses.push(address.into());
        self
    }

    /// Set the evidence configuration.
    pub fn with_evidence(mut self, config: EvidenceConfig) -> Self {
        self.evidence = config;
        self
    }

    /// Set the search configuration.
    pub fn with_search(mut self, config: SearchConfig) -> Self {
        self.search = config;
        self
    }
}

/// Locations of exported records. Unset sources are simply not consulted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Root searched recursively for contact directory JSON files.
    pub directory_root: Option<PathBuf>,

    /// Extra contact directory files.
    pub directory_files: Vec<PathBuf>,

    /// Message history, one JSON record per line.
    pub messages_path: Option<PathBuf>,

    /// CRM contacts with notes (JSON array).
    pub crm_notes_path: Option<PathBuf>,

    /// Mail history (JSON array).
    pub mail_path: Option<PathBuf>,

    /// The user's own mail addresses; mail from these counts as sent.
    pub self_addresses: Vec<String>,
}

/// Evidence scanning and confidence thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceConfig {
    /// Most recent records examined per pass.
    pub scan_window: usize,

    /// Examples kept per match.
    pub max_examples: usize,

    /// Characters kept per example.
    pub snippet_chars: usize,

    /// Hits added for each self-reference.
    pub self_reference_weight: usize,

    /// Counts above this are high confidence.
    pub high_above: usize,

    /// Counts above this are medium confidence.
    pub medium_above: usize,

    /// Matches taken from each source.
    pub max_candidates_per_source: usize,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        let collector = CollectorSettings::default();
        let resolver = ResolverSettings::default();
        Self {
            scan_window: collector.scan_window,
            max_examples: collector.max_examples,
            snippet_chars: collector.snippet_chars,
            self_reference_weight: collector.self_reference_weight,
            high_above: resolver.policy.high_above,
            medium_above: resolver.policy.medium_above,
            max_candidates_per_source: resolver.max_candidates_per_source,
        }
    }
}

impl EvidenceConfig {
    pub fn collector_settings(&self) -> CollectorSettings {
        CollectorSettings {
            scan_window: self.scan_window,
            max_examples: self.max_examples,
            snippet_chars: self.snippet_chars,
            self_reference_weight: self.self_reference_weight,
        }
    }

    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            policy: ConfidencePolicy {
                high_above: self.high_above,
                medium_above: self.medium_above,
            },
            max_candidates_per_source: self.max_candidates_per_source,
        }
    }
}

/// Result limits for search and conversation reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Results returned when a request does not ask for a number.
    pub default_max_results: usize,

    /// Upper bound on requested results.
    pub max_results_cap: usize,

    /// Upper bound on neighbours per side of a hit.
    pub max_context: usize,

    /// Most recent filtered records examined for search terms, per source.
    pub scan_window: usize,

    /// Wrapped around every term occurrence in returned text.
    pub highlight_delimiter: String,

    /// Characters of the last message shown per conversation.
    pub preview_chars: usize,

    pub default_conversations: usize,

    pub max_conversations: usize,

    /// Messages per page when reading a conversation.
    pub default_conversation_messages: usize,

    pub max_conversation_messages: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_max_results: 20,
            max_results_cap: 50,
            max_context: 10,
            scan_window: 5_000,
            highlight_delimiter: "**".to_string(),
            preview_chars: 100,
            default_conversations: 20,
            max_conversations: 50,
            default_conversation_messages: 30,
            max_conversation_messages: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_are_valid() {
        let config = OscarConfig::default();
        config.validate().unwrap();
        assert_eq!(config.evidence.scan_window, 5_000);
        assert_eq!(config.evidence.resolver_settings(), ResolverSettings::default());
        assert_eq!(config.evidence.collector_settings(), CollectorSettings::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
                [sources]
                messages_path = "/data/messages.jsonl"
                self_addresses = ["me@example.com"]

                [evidence]
                high_above = 20
            "#,
        )
        .unwrap();

        let config = OscarConfig::load(&path).unwrap();
        assert_eq!(
            config.sources.messages_path,
            Some(PathBuf::from("/data/messages.jsonl"))
        );
        assert_eq!(config.sources.self_addresses, vec!["me@example.com"]);
        assert_eq!(config.evidence.high_above, 20);
        assert_eq!(config.evidence.medium_above, 3);
        assert_eq!(config.search, SearchConfig::default());
    }

    #[test]
    fn test_validate_rejects_inconsistent_settings() {
        let config = OscarConfig::new().with_evidence(EvidenceConfig {
            scan_window: 0,
            ..EvidenceConfig::default()
        });
        assert!(matches!(config.validate(), Err(RetrievalError::Config(_))));

        let config = OscarConfig::new().with_evidence(EvidenceConfig {
            medium_above: 12,
            ..EvidenceConfig::default()
        });
        assert!(matches!(config.validate(), Err(RetrievalError::Config(_))));

        let config = OscarConfig::new().with_search(SearchConfig {
            default_max_results: 60,
            ..SearchConfig::default()
        });
        assert!(matches!(config.validate(), Err(RetrievalError::Config(_))));

        let config = OscarConfig::new().with_search(SearchConfig {
            scan_window: 0,
            ..SearchConfig::default()
        });
        assert!(matches!(config.validate(), Err(RetrievalError::Config(_))));
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[evidence\nscan_window = ").unwrap();
        assert!(matches!(
            OscarConfig::load(&path),
            Err(RetrievalError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_builders() {
        let config = OscarConfig::new()
            .with_directory_root("/contacts")
            .with_directory_file("/extra.json")
            .with_crm_notes_path("/crm.json")
            .with_mail_path("/mail.json")
            .with_self_address("me@example.com");
        assert_eq!(config.sources.directory_root, Some(PathBuf::from("/contacts")));
        assert_eq!(config.sources.directory_files, vec![PathBuf::from("/extra.json")]);
        assert_eq!(config.sources.crm_notes_path, Some(PathBuf::from("/crm.json")));
        assert_eq!(config.sources.mail_path, Some(PathBuf::from("/mail.json")));
        assert_eq!(config.sources.self_addresses, vec!["me@example.com"]);
    }
}
