//! Evidence and confidence types shared by collectors and the resolver.

use std::fmt;

use serde::{Deserialize, Serialize};

use oscar_identity::normalized_set;

/// Where a piece of evidence came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    /// A contact directory lookup.
    Directory,
    /// Local message history.
    Messages,
    /// Notes attached to CRM contacts.
    CrmNotes,
    /// External mail history.
    Mail,
}

impl SourceTag {
    /// Plural noun for the records this source scans.
    pub fn record_noun(self) -> &'static str {
        match self {
            Self::Directory => "contact entries",
            Self::Messages => "messages",
            Self::CrmNotes => "CRM notes",
            Self::Mail => "emails",
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Directory => "contacts",
            Self::Messages => "messages",
            Self::CrmNotes => "CRM notes",
            Self::Mail => "mail",
        };
        f.write_str(label)
    }
}

/// Coarse certainty of an identity match.
///
/// Variants are declared weakest first so the derived ordering gives
/// `High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

/// Hit-count thresholds for confidence tiers. A count must be strictly
/// above a threshold to reach that tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidencePolicy {
    pub high_above: usize,
    pub medium_above: usize,
}

impl Default for ConfidencePolicy {
    fn default() -> Self {
        Self {
            high_above: 10,
            medium_above: 3,
        }
    }
}

impl ConfidencePolicy {
    pub fn classify(&self, count: usize) -> Confidence {
        if count > self.high_above {
            Confidence::High
        } else if count > self.medium_above {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

/// What kind of signal an example records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    /// The user mentioned the term in something they sent.
    Mention,
    /// The other party used the term to name themselves.
    SelfReference,
}

/// A truncated record that supports a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceExample {
    pub text: String,
    /// RFC 3339 timestamp of the record, when known.
    pub timestamp: Option<String>,
    pub kind: EvidenceKind,
}

/// Hits for one handle within one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceMatch {
    pub source: SourceTag,

    /// Handle the hits were attributed to.
    pub handle: String,

    /// Every handle known to belong to the same entity, `handle` first.
    pub handles: Vec<String>,

    /// Name the source itself gives the entity, if any.
    pub display_name: Option<String>,

    /// Weighted hit count.
    pub count: usize,

    pub examples: Vec<EvidenceExample>,
}

impl EvidenceMatch {
    pub fn new(source: SourceTag, handle: impl Into<String>) -> Self {
        let handle = handle.into();
        Self {
            source,
            handles: vec![handle.clone()],
            handle,
            display_name: None,
            count: 0,
            examples: Vec::new(),
        }
    }

    /// Comparison keys for this match's handles.
    pub fn identity_keys(&self) -> Vec<String> {
        identity_keys(&self.handles)
    }
}

/// Sorted, deduplicated comparison keys for a set of handles.
///
/// Normalized forms are used when any handle is long enough to compare;
/// otherwise the trimmed, lowercased raw strings stand in so opaque ids
/// (group conversation ids and the like) do not all collapse to one key.
pub fn identity_keys<S: AsRef<str>>(handles: &[S]) -> Vec<String> {
    let keys = normalized_set(handles.iter().map(AsRef::as_ref));
    if !keys.is_empty() {
        return keys;
    }
    let mut raw: Vec<String> = handles
        .iter()
        .map(|handle| handle.as_ref().trim().to_lowercase())
        .filter(|handle| !handle.is_empty())
        .collect();
    raw.sort();
    raw.dedup();
    raw
}

/// Whether two sorted key lists share an element.
pub fn keys_intersect(a: &[String], b: &[String]) -> bool {
    a.iter().any(|key| b.binary_search(key).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tiers_are_ordered() {
        assert!(Confidence::High > Confidence::Medium);
        assert!(Confidence::Medium > Confidence::Low);
    }

    #[test]
    fn test_classify_thresholds() {
        let policy = ConfidencePolicy::default();
        assert_eq!(policy.classify(0), Confidence::Low);
        assert_eq!(policy.classify(3), Confidence::Low);
        assert_eq!(policy.classify(4), Confidence::Medium);
        assert_eq!(policy.classify(10), Confidence::Medium);
        assert_eq!(policy.classify(11), Confidence::High);
    }

    #[test]
    fn test_classify_is_monotonic() {
        for policy in [
            ConfidencePolicy::default(),
            ConfidencePolicy {
                high_above: 2,
                medium_above: 1,
            },
            ConfidencePolicy {
                high_above: 0,
                medium_above: 0,
            },
        ] {
            let mut previous = Confidence::Low;
            for count in 0..200 {
                let tier = policy.classify(count);
                assert!(tier >= previous, "tier dropped at {count} under {policy:?}");
                previous = tier;
            }
        }
    }

    #[test]
    fn test_identity_keys_collapse_spellings() {
        let a = identity_keys(&["+15551234567"]);
        let b = identity_keys(&["5551234567", "jane@example.com"]);
        assert_eq!(a, vec!["5551234567"]);
        assert!(keys_intersect(&a, &b));
    }

    #[test]
    fn test_identity_keys_fall_back_to_raw() {
        assert_eq!(identity_keys(&["chat123", " Chat123"]), vec!["chat123"]);
        assert!(!keys_intersect(
            &identity_keys(&["chat123"]),
            &identity_keys(&["chat456"])
        ));
    }

    #[test]
    fn test_serialized_tags_are_snake_case() {
        assert_eq!(serde_json::to_string(&SourceTag::CrmNotes).unwrap(), "\"crm_notes\"");
        assert_eq!(
            serde_json::to_string(&EvidenceKind::SelfReference).unwrap(),
            "\"self_reference\""
        );
        assert_eq!(serde_json::to_string(&Confidence::High).unwrap(), "\"high\"");
    }
}
