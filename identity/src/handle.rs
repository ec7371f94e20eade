//! Handle classification and normalization.
//!
//! Phones and emails arrive in many spellings (`+1 (555) 123-4567`,
//! `5551234567`, ` Jane@Example.com`). Everything that compares handles goes
//! through [`normalize`] so those spellings collapse to one key.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of trailing digits kept for phone numbers.
pub const PHONE_DIGITS: usize = 10;

/// Normalized phones shorter than this are never treated as a match.
pub const MIN_MATCHABLE_DIGITS: usize = 7;

/// Kind of communication endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleKind {
    Phone,
    Email,
}

/// Email if the raw string contains `@`, phone otherwise.
pub fn classify(raw: &str) -> HandleKind {
    if raw.contains('@') {
        HandleKind::Email
    } else {
        HandleKind::Phone
    }
}

/// Canonical comparable form of a handle.
///
/// Phones keep their last ten digits so country-code variants line up;
/// emails are trimmed and lowercased. Applying this twice is the same as
/// applying it once.
pub fn normalize(raw: &str) -> String {
    match classify(raw) {
        HandleKind::Email => raw.trim().to_lowercase(),
        HandleKind::Phone => {
            let digits: Vec<char> = raw.chars().filter(char::is_ascii_digit).collect();
            let start = digits.len().saturating_sub(PHONE_DIGITS);
            digits[start..].iter().collect()
        }
    }
}

/// A raw handle together with its kind and normalized form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle {
    /// The handle exactly as the source provided it.
    pub raw: String,

    pub kind: HandleKind,

    /// Output of [`normalize`] for `raw`.
    pub normalized: String,
}

impl Handle {
    /// Classify and normalize a raw handle string.
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let kind = classify(&raw);
        let normalized = normalize(&raw);
        Self {
            raw,
            kind,
            normalized,
        }
    }

    /// Whether the normalized form is specific enough to compare against
    /// other handles.
    pub fn is_matchable(&self) -> bool {
        match self.kind {
            HandleKind::Email => !self.normalized.is_empty(),
            HandleKind::Phone => self.normalized.len() >= MIN_MATCHABLE_DIGITS,
        }
    }

    /// Whether the handle is reliable enough to be written into an index.
    ///
    /// Phones must carry a full ten digits; anything shorter is usually an
    /// extension or a short code.
    pub fn is_indexable(&self) -> bool {
        match self.kind {
            HandleKind::Email => self.is_matchable(),
            HandleKind::Phone => self.normalized.len() >= PHONE_DIGITS,
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Whether two raw handles refer to the same endpoint.
pub fn same_endpoint(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let a = Handle::parse(a);
    let b = Handle::parse(b);
    a.kind == b.kind && a.is_matchable() && a.normalized == b.normalized
}

/// Sorted, deduplicated normalized forms of `handles`, skipping the ones too
/// short to compare.
pub fn normalized_set<'a>(handles: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut keys: Vec<String> = handles
        .into_iter()
        .map(Handle::parse)
        .filter(Handle::is_matchable)
        .map(|h| h.normalized)
        .collect();
    keys.sort();
    keys.dedup();
    keys
}
