//! Term scanning over one evidence source.
//!
//! Two passes over the most recent records of a source:
//!
//! 1. **Mentions**: outbound records that contain the term as a whole word
//!    count once for the record's counterpart.
//! 2. **Self-references**: inbound records where the sender names
//!    themselves with the term ("this is Mandy", "Mandy here", "it's Mandy",
//!    a trailing "- Mandy") count `self_reference_weight` times.

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use oscar_messages::{Direction, format_iso, snippet};

use crate::error::Result;
use crate::evidence::{EvidenceExample, EvidenceKind, EvidenceMatch, SourceTag};
use crate::sources::{EvidenceRecord, RecordSource};

/// Anything that can be scanned for evidence about a term.
///
/// Implementations must not fail: an unreachable source reports no
/// evidence.
pub trait EvidenceSource: Send + Sync {
    fn tag(&self) -> SourceTag;

    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Matches for `term`, sorted by hit count descending.
    fn scan(&self, term: &str) -> Vec<EvidenceMatch>;
}

/// Bounds and weights for a collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorSettings {
    /// Most recent records examined per pass.
    pub scan_window: usize,

    /// Examples kept per match.
    pub max_examples: usize,

    /// Characters kept per example.
    pub snippet_chars: usize,

    /// Hits added for each self-reference.
    pub self_reference_weight: usize,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            scan_window: 5_000,
            max_examples: 5,
            snippet_chars: 200,
            self_reference_weight: 2,
        }
    }
}

/// The compiled patterns for one term.
#[derive(Debug)]
struct TermPatterns {
    mention: Regex,
    self_reference: Regex,
}

impl TermPatterns {
    fn compile(term: &str) -> Result<Self> {
        let t = regex::escape(term);
        // `\b` only holds next to a word character.
        let start = word_boundary(term.chars().next());
        let end = word_boundary(term.chars().next_back());
        let mention = Regex::new(&format!(r"(?i){start}{t}{end}"))?;
        let self_reference = Regex::new(&format!(
            r"(?im)\bthis is {t}{end}|^\s*{t} here\b|\bit['\x{{2019}}]s {t}{end}|-\s*{t}\s*$"
        ))?;
        Ok(Self {
            mention,
            self_reference,
        })
    }
}

fn word_boundary(edge: Option<char>) -> &'static str {
    if edge.is_some_and(|c| c.is_alphanumeric() || c == '_') {
        r"\b"
    } else {
        ""
    }
}

/// Scans one [`RecordSource`] for a term.
#[derive(Debug, Clone)]
pub struct EvidenceCollector<R> {
    records: R,
    settings: CollectorSettings,
}

impl<R: RecordSource> EvidenceCollector<R> {
    pub fn new(records: R) -> Self {
        Self {
            records,
            settings: CollectorSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: CollectorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &CollectorSettings {
        &self.settings
    }

    /// Weighted hits per counterpart handle, most hits first.
    ///
    /// Errors from the underlying source are logged and produce no matches.
    pub fn collect(&self, term: &str) -> Vec<EvidenceMatch> {
        let term = term.trim();
        if term.is_empty() {
            return Vec::new();
        }
        match self.try_collect(term) {
            Ok(matches) => {
                debug!(
                    "{} ({}): {} candidates for {term:?}",
                    self.records.tag(),
                    self.records.name(),
                    matches.len()
                );
                matches
            }
            Err(e) => {
                warn!(
                    "Evidence source {} unavailable, skipping: {e}",
                    self.records.name()
                );
                Vec::new()
            }
        }
    }

    fn try_collect(&self, term: &str) -> Result<Vec<EvidenceMatch>> {
        let patterns = TermPatterns::compile(term)?;
        let mut tally = Tally::new(self.records.tag(), &self.settings);

        for record in self
            .records
            .records(Direction::Outbound, self.settings.scan_window)?
        {
            if patterns.mention.is_match(&record.text) {
                tally.add(&record, 1, EvidenceKind::Mention);
            }
        }

        for record in self
            .records
            .records(Direction::Inbound, self.settings.scan_window)?
        {
            if patterns.self_reference.is_match(&record.text) {
                tally.add(
                    &record,
                    self.settings.self_reference_weight,
                    EvidenceKind::SelfReference,
                );
            }
        }

        Ok(tally.finish())
    }
}

impl<R: RecordSource> EvidenceSource for EvidenceCollector<R> {
    fn tag(&self) -> SourceTag {
        self.records.tag()
    }

    fn name(&self) -> &str {
        self.records.name()
    }

    fn scan(&self, term: &str) -> Vec<EvidenceMatch> {
        self.collect(term)
    }
}

/// Per-handle accumulator for one scan.
struct Tally<'a> {
    source: SourceTag,
    settings: &'a CollectorSettings,
    matches: IndexMap<String, EvidenceMatch>,
}

impl<'a> Tally<'a> {
    fn new(source: SourceTag, settings: &'a CollectorSettings) -> Self {
        Self {
            source,
            settings,
            matches: IndexMap::new(),
        }
    }

    fn add(&mut self, record: &EvidenceRecord, weight: usize, kind: EvidenceKind) {
        if record.handle.trim().is_empty() {
            return;
        }
        let entry = self
            .matches
            .entry(record.handle.clone())
            .or_insert_with(|| EvidenceMatch::new(self.source, record.handle.clone()));

        for alternate in &record.alternate_handles {
            if !entry.handles.contains(alternate) {
                entry.handles.push(alternate.clone());
            }
        }
        if entry.display_name.is_none() {
            entry.display_name.clone_from(&record.display_name);
        }

        entry.count += weight;
        if entry.examples.len() < self.settings.max_examples {
            entry.examples.push(EvidenceExample {
                text: snippet(record.example(), self.settings.snippet_chars),
                timestamp: record.timestamp.map(format_iso),
                kind,
            });
        }
    }

    fn finish(self) -> Vec<EvidenceMatch> {
        let mut matches: Vec<EvidenceMatch> = self.matches.into_values().collect();
        matches.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.handle.cmp(&b.handle)));
        matches
    }
}
