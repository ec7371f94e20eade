use std::cmp::Reverse;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use oscar_identity::{ContactRecord, DirectorySource, IdentityError};
use oscar_messages::Direction;

use super::{EvidenceRecord, RecordSource};
use crate::error::{EvidenceError, Result};
use crate::evidence::SourceTag;

/// A free-form contact detail (`{"type": "email", "value": "..."}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrmInformation {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

/// A note the user wrote on a contact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrmNote {
    pub content: String,
    /// Milliseconds since the Unix epoch.
    pub created: Option<i64>,
}

/// One contact from a CRM export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrmContact {
    pub id: String,

    #[serde(alias = "displayName")]
    pub display_name: Option<String>,

    #[serde(alias = "firstName")]
    pub first_name: Option<String>,

    #[serde(alias = "lastName")]
    pub last_name: Option<String>,

    pub nickname: Option<String>,

    pub organization: Option<String>,

    pub phones: Vec<String>,

    pub emails: Vec<String>,

    pub information: Vec<CrmInformation>,

    pub notes: Vec<CrmNote>,
}

impl CrmContact {
    /// Phones and emails, including those listed under `information`.
    pub fn handles(&self) -> Vec<String> {
        let listed = self
            .information
            .iter()
            .filter(|info| matches!(info.kind.as_str(), "phone" | "email"))
            .map(|info| &info.value);
        let mut handles: Vec<String> = Vec::new();
        for handle in self.phones.iter().chain(&self.emails).chain(listed) {
            let handle = handle.trim();
            if !handle.is_empty() && !handles.iter().any(|h| h == handle) {
                handles.push(handle.to_string());
            }
        }
        handles
    }

    pub fn name(&self) -> Option<String> {
        self.display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .or_else(|| self.to_contact_record().display_name())
    }

    fn to_contact_record(&self) -> ContactRecord {
        ContactRecord {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            nickname: self.nickname.clone(),
            organization: self.organization.clone(),
            handles: self.handles(),
            ..ContactRecord::default()
        }
    }
}

/// Notes from a CRM export (a JSON array of [`CrmContact`]).
///
/// Notes are written by the user, so every note is an outbound record
/// attributed to the contact's first handle. The export doubles as a
/// contact directory.
#[derive(Debug, Clone)]
pub struct CrmNotes {
    name: String,
    path: Option<PathBuf>,
    contacts: Vec<CrmContact>,
}

impl CrmNotes {
    pub fn from_contacts(name: impl Into<String>, contacts: Vec<CrmContact>) -> Self {
        Self {
            name: name.into(),
            path: None,
            contacts,
        }
    }

    /// Load an export file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(EvidenceError::SourceUnavailable {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let contacts: Vec<CrmContact> = serde_json::from_str(&content)?;
        info!("Loaded {} CRM contacts from {}", contacts.len(), path.display());
        Ok(Self {
            name: path.display().to_string(),
            path: Some(path.to_path_buf()),
            contacts,
        })
    }

    pub fn contacts(&self) -> &[CrmContact] {
        &self.contacts
    }
}

impl RecordSource for CrmNotes {
    fn tag(&self) -> SourceTag {
        SourceTag::CrmNotes
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn records(&self, direction: Direction, limit: usize) -> Result<Vec<EvidenceRecord>> {
        if direction != Direction::Outbound {
            return Ok(Vec::new());
        }

        let mut records: Vec<EvidenceRecord> = Vec::new();
        for contact in &self.contacts {
            let handles = contact.handles();
            let Some((handle, alternates)) = handles.split_first() else {
                debug!("CRM contact {} has no handles, skipping its notes", contact.id);
                continue;
            };
            let name = contact.name();
            for note in contact.notes.iter().filter(|note| !note.content.trim().is_empty()) {
                records.push(EvidenceRecord {
                    handle: handle.clone(),
                    alternate_handles: alternates.to_vec(),
                    display_name: name.clone(),
                    text: note.content.clone(),
                    example_text: None,
                    timestamp: note.created.and_then(DateTime::<Utc>::from_timestamp_millis),
                    direction: Direction::Outbound,
                });
            }
        }

        records.sort_by_key(|record| Reverse(record.timestamp));
        records.truncate(limit);
        Ok(records)
    }
}

impl DirectorySource for CrmNotes {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> oscar_identity::Result<Vec<ContactRecord>> {
        if let Some(path) = &self.path
            && !path.is_file()
        {
            return Err(IdentityError::SourceUnavailable { path: path.clone() });
        }
        Ok(self.contacts.iter().map(CrmContact::to_contact_record).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn export() -> &'static str {
        r#"[
            {
                "id": "c1",
                "displayName": "Amanda Jones",
                "firstName": "Amanda",
                "lastName": "Jones",
                "information": [
                    {"type": "phone", "value": "+1 555 000 1111"},
                    {"type": "email", "value": "amanda@example.com"},
                    {"type": "linkedin", "value": "https://example.com/amanda"}
                ],
                "notes": [
                    {"content": "Goes by Mandy with friends", "created": 1700000000000},
                    {"content": "   "}
                ]
            },
            {"id": "c2", "firstName": "Nobody", "notes": [{"content": "no handles here"}]}
        ]"#
    }

    #[test]
    fn test_notes_become_outbound_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crm.json");
        std::fs::write(&path, export()).unwrap();
        let crm = CrmNotes::open(&path).unwrap();

        let records = crm.records(Direction::Outbound, 10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].handle, "+1 555 000 1111");
        assert_eq!(records[0].alternate_handles, vec!["amanda@example.com"]);
        assert_eq!(records[0].display_name.as_deref(), Some("Amanda Jones"));
        assert!(records[0].timestamp.is_some());

        assert!(crm.records(Direction::Inbound, 10).unwrap().is_empty());
    }

    #[test]
    fn test_export_doubles_as_directory() {
        let contacts: Vec<CrmContact> = serde_json::from_str(export()).unwrap();
        let crm = CrmNotes::from_contacts("crm", contacts);
        let records = DirectorySource::load(&crm).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].display_name().as_deref(), Some("Amanda Jones"));
        assert_eq!(
            records[0].all_handles().collect::<Vec<_>>(),
            vec!["+1 555 000 1111", "amanda@example.com"]
        );
    }

    #[test]
    fn test_missing_export() {
        assert!(matches!(
            CrmNotes::open("/no/such/crm.json"),
            Err(EvidenceError::SourceUnavailable { .. })
        ));
    }
}
