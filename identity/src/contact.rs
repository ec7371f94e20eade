//! Contact records and the directories that supply them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{IdentityError, Result};

/// One person (or organization) from a contact directory.
///
/// Keys are accepted in both snake_case and the camelCase used by address
/// book exports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactRecord {
    #[serde(alias = "firstName")]
    pub first_name: Option<String>,

    #[serde(alias = "lastName")]
    pub last_name: Option<String>,

    pub nickname: Option<String>,

    pub organization: Option<String>,

    /// Phone numbers exactly as stored in the directory.
    pub phones: Vec<String>,

    /// Email addresses exactly as stored in the directory.
    pub emails: Vec<String>,

    /// Handles of either kind, for sources that do not separate them.
    pub handles: Vec<String>,
}

impl ContactRecord {
    /// Create a record with a first and last name.
    pub fn named(first: impl Into<String>, last: impl Into<String>) -> Self {
        Self {
            first_name: Some(first.into()),
            last_name: Some(last.into()),
            ..Self::default()
        }
    }

    /// Set the nickname.
    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }

    /// Set the organization.
    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    /// Add a handle of either kind.
    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.handles.push(handle.into());
        self
    }

    pub fn first(&self) -> Option<&str> {
        non_blank(self.first_name.as_deref())
    }

    pub fn last(&self) -> Option<&str> {
        non_blank(self.last_name.as_deref())
    }

    pub fn nick(&self) -> Option<&str> {
        non_blank(self.nickname.as_deref())
    }

    pub fn org(&self) -> Option<&str> {
        non_blank(self.organization.as_deref())
    }

    /// `first last`, else first, else last, else nickname, else organization.
    pub fn display_name(&self) -> Option<String> {
        match (self.first(), self.last()) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (Some(first), None) => Some(first.to_string()),
            (None, Some(last)) => Some(last.to_string()),
            (None, None) => self.nick().or_else(|| self.org()).map(str::to_string),
        }
    }

    /// Every raw handle on the record, phones first.
    pub fn all_handles(&self) -> impl Iterator<Item = &str> {
        self.phones
            .iter()
            .chain(&self.emails)
            .chain(&self.handles)
            .map(String::as_str)
            .filter(|h| !h.trim().is_empty())
    }

    /// Lowercased reverse-index terms for this record.
    pub fn search_terms(&self) -> Vec<String> {
        let mut terms: Vec<String> = [self.first(), self.last(), self.nick(), self.org()]
            .into_iter()
            .flatten()
            .map(str::to_lowercase)
            .collect();

        if let (Some(first), Some(last)) = (self.first(), self.last()) {
            terms.push(format!("{first} {last}").to_lowercase());
            terms.push(format!("{last} {first}").to_lowercase());
        }

        terms
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// A read-only supplier of contact records.
pub trait DirectorySource: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Load every record the directory holds.
    fn load(&self) -> Result<Vec<ContactRecord>>;
}

/// A directory exported as a JSON array of [`ContactRecord`] rows.
#[derive(Debug, Clone)]
pub struct JsonDirectory {
    path: PathBuf,
    name: String,
}

impl JsonDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.display().to_string();
        Self { path, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DirectorySource for JsonDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Vec<ContactRecord>> {
        if !self.path.is_file() {
            return Err(IdentityError::SourceUnavailable {
                path: self.path.clone(),
            });
        }
        let content = std::fs::read_to_string(&self.path)?;
        let records: Vec<ContactRecord> = serde_json::from_str(&content)?;
        debug!("Loaded {} contacts from {}", records.len(), self.name);
        Ok(records)
    }
}

/// An in-memory directory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    name: String,
    records: Vec<ContactRecord>,
}

impl MemoryDirectory {
    pub fn new(name: impl Into<String>, records: Vec<ContactRecord>) -> Self {
        Self {
            name: name.into(),
            records,
        }
    }
}

impl DirectorySource for MemoryDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Vec<ContactRecord>> {
        Ok(self.records.clone())
    }
}

/// Find every directory export under `root`.
///
/// The root's own files come first, followed by files in nested source
/// folders (`root/Sources/<id>/contacts.json`), each level in name order.
pub fn discover_directory_files(root: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(IdentityError::SourceUnavailable {
            path: root.to_path_buf(),
        });
    }

    let mut found: Vec<(usize, PathBuf)> = Vec::new();
    for entry in WalkDir::new(root).max_depth(3).sort_by_file_name() {
        let entry = entry?;
        let is_json = entry
            .path()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if entry.file_type().is_file() && is_json {
            found.push((entry.depth(), entry.into_path()));
        }
    }
    found.sort();

    debug!("Discovered {} directory files under {}", found.len(), root.display());
    Ok(found.into_iter().map(|(_, path)| path).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_display_name_precedence() {
        assert_eq!(
            ContactRecord::named("John", "Smith").display_name().as_deref(),
            Some("John Smith")
        );

        let nick_only = ContactRecord::default()
            .with_nickname("JJ")
            .with_organization("Acme");
        assert_eq!(nick_only.display_name().as_deref(), Some("JJ"));

        let org_only = ContactRecord::default().with_organization("Acme");
        assert_eq!(org_only.display_name().as_deref(), Some("Acme"));

        let blank = ContactRecord {
            first_name: Some("  ".to_string()),
            ..ContactRecord::default()
        };
        assert_eq!(blank.display_name(), None);
    }

    #[test]
    fn test_search_terms_include_permutations() {
        let terms = ContactRecord::named("John", "Smith")
            .with_nickname("Johnny")
            .search_terms();
        assert_eq!(
            terms,
            vec!["john", "smith", "johnny", "john smith", "smith john"]
        );
    }

    #[test]
    fn test_camel_case_rows_deserialize() {
        let json = r#"[{"firstName":"Ada","lastName":"Lovelace","phones":["+15550001111"]}]"#;
        let records: Vec<ContactRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(records[0].first(), Some("Ada"));
        assert_eq!(records[0].all_handles().collect::<Vec<_>>(), vec!["+15550001111"]);
    }

    #[test]
    fn test_discover_orders_root_before_sources() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("Sources").join("abc");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("contacts.json"), "[]").unwrap();
        std::fs::write(dir.path().join("main.json"), "[]").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let files = discover_directory_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("main.json"));
        assert!(files[1].ends_with("Sources/abc/contacts.json"));
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let source = JsonDirectory::new("/definitely/not/here.json");
        assert!(matches!(
            source.load(),
            Err(IdentityError::SourceUnavailable { .. })
        ));
    }
}
