//! "Who is this?" across the contact directory and every evidence source.
//!
//! Resolution runs in three steps:
//!
//! 1. A direct [`ContactIndex`] lookup yields a high-confidence candidate.
//! 2. Each [`EvidenceSource`] is scanned for the query; a match whose
//!    handles intersect existing candidates is folded into them (joining
//!    candidates it links), the rest become new candidates tiered by
//!    [`ConfidencePolicy`].
//! 3. Candidates are ranked (tier, then hit count) and deduplicated by their
//!    sorted normalized handles.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use oscar_identity::ContactIndex;

use crate::collector::EvidenceSource;
use crate::evidence::{
    Confidence, ConfidencePolicy, EvidenceExample, EvidenceMatch, SourceTag, identity_keys,
    keys_intersect,
};

/// Reason attached to candidates found in the contact directory.
pub const DIRECT_MATCH_REASON: &str = "Direct match in contacts";

/// Ranking and merge policy for the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    pub policy: ConfidencePolicy,

    /// Matches taken from each source, best first.
    pub max_candidates_per_source: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            policy: ConfidencePolicy::default(),
            max_candidates_per_source: 5,
        }
    }
}

/// One possible identity for a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,

    /// Source that first produced the candidate.
    pub source: SourceTag,

    /// Every source that contributed, in merge order.
    pub sources: Vec<SourceTag>,

    pub handles: Vec<String>,

    pub confidence: Confidence,

    pub reason: String,

    /// Summed weighted hit count across sources.
    pub count: usize,

    pub examples: Vec<EvidenceExample>,

    /// Sorted comparison keys of `handles`.
    #[serde(skip)]
    keys: Vec<String>,

    /// Name offered by an evidence source, used when the directory has none.
    #[serde(skip)]
    evidence_name: Option<String>,
}

impl Candidate {
    fn new(source: SourceTag, handles: Vec<String>, confidence: Confidence, reason: String) -> Self {
        let keys = identity_keys(&handles);
        Self {
            name: String::new(),
            source,
            sources: vec![source],
            handles,
            confidence,
            reason,
            count: 0,
            examples: Vec::new(),
            keys,
            evidence_name: None,
        }
    }

    fn dedup_key(&self) -> String {
        self.keys.join(",")
    }

    fn absorb(&mut self, found: EvidenceMatch, query: &str, policy: &ConfidencePolicy) {
        self.count += found.count;
        self.reason.push_str(&format!(
            " + {} hits in {} for \"{query}\"",
            found.count,
            found.source.record_noun()
        ));
        for handle in found.handles {
            if !self.handles.contains(&handle) {
                self.handles.push(handle);
            }
        }
        self.keys = identity_keys(&self.handles);
        self.examples.extend(found.examples);
        if !self.sources.contains(&found.source) {
            self.sources.push(found.source);
        }
        if self.evidence_name.is_none() {
            self.evidence_name = found.display_name;
        }
        self.confidence = self.confidence.max(policy.classify(self.count));
    }

    /// Fold another candidate for the same entity into this one.
    fn join(&mut self, other: Candidate, policy: &ConfidencePolicy) {
        self.count += other.count;
        self.reason.push_str("; ");
        self.reason.push_str(&other.reason);
        for handle in other.handles {
            if !self.handles.contains(&handle) {
                self.handles.push(handle);
            }
        }
        self.keys = identity_keys(&self.handles);
        self.examples.extend(other.examples);
        for source in other.sources {
            if !self.sources.contains(&source) {
                self.sources.push(source);
            }
        }
        if self.evidence_name.is_none() {
            self.evidence_name = other.evidence_name;
        }
        self.confidence = self
            .confidence
            .max(other.confidence)
            .max(policy.classify(self.count));
    }
}

/// Outcome of [`IdentityResolver::resolve`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedIdentity {
    pub query: String,

    /// Ranked, deduplicated candidates.
    pub matches: Vec<Candidate>,

    pub best_match: Option<Candidate>,

    /// Handles of the best match.
    pub handles: Vec<String>,

    pub summary: String,
}

impl ResolvedIdentity {
    pub fn is_found(&self) -> bool {
        self.best_match.is_some()
    }
}

/// Merges directory lookups and evidence into ranked identities.
pub struct IdentityResolver {
    index: Arc<ContactIndex>,
    sources: Vec<Arc<dyn EvidenceSource>>,
    settings: ResolverSettings,
}

impl IdentityResolver {
    pub fn new(index: Arc<ContactIndex>) -> Self {
        Self {
            index,
            sources: Vec::new(),
            settings: ResolverSettings::default(),
        }
    }

    /// Add an evidence source. Sources are merged in the order added.
    pub fn with_source(mut self, source: Arc<dyn EvidenceSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_settings(mut self, settings: ResolverSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn index(&self) -> &Arc<ContactIndex> {
        &self.index
    }

    pub fn source_tags(&self) -> Vec<SourceTag> {
        self.sources.iter().map(|source| source.tag()).collect()
    }

    /// Resolve an informal name to ranked candidate identities.
    ///
    /// With `search_all_sources` unset, a directory hit returns immediately
    /// and sources are scanned one at a time until one produces a
    /// high-confidence candidate. Otherwise every source is scanned
    /// concurrently and all evidence is merged. Never fails; missing sources
    /// only shrink the result.
    pub fn resolve(&self, query: &str, search_all_sources: bool) -> ResolvedIdentity {
        let term = query.trim();
        if term.is_empty() {
            return self.finish(query, Vec::new());
        }

        let mut candidates: Vec<Candidate> = Vec::new();

        if let Some(direct) = self.direct_match(term) {
            candidates.push(direct);
            if !search_all_sources {
                return self.finish(query, candidates);
            }
        }

        if search_all_sources {
            for (tag, matches) in self.scan_all(term) {
                self.merge(&mut candidates, term, tag, matches);
            }
        } else {
            for source in &self.sources {
                let matches = source.scan(term);
                self.merge(&mut candidates, term, source.tag(), matches);
                if candidates.iter().any(|c| c.confidence == Confidence::High) {
                    debug!("High-confidence candidate from {}, stopping early", source.tag());
                    break;
                }
            }
        }

        self.finish(query, candidates)
    }

    fn direct_match(&self, term: &str) -> Option<Candidate> {
        let handles = self.index.find_handles(term);
        if handles.is_empty() {
            return None;
        }
        let mut candidate = Candidate::new(
            SourceTag::Directory,
            handles,
            Confidence::High,
            DIRECT_MATCH_REASON.to_string(),
        );
        candidate.evidence_name = Some(term.to_string());
        Some(candidate)
    }

    /// Scan every source on its own thread, returning results in source order.
    fn scan_all(&self, term: &str) -> Vec<(SourceTag, Vec<EvidenceMatch>)> {
        std::thread::scope(|scope| {
            let running: Vec<_> = self
                .sources
                .iter()
                .map(|source| (source, scope.spawn(move || source.scan(term))))
                .collect();

            running
                .into_iter()
                .filter_map(|(source, handle)| match handle.join() {
                    Ok(matches) => Some((source.tag(), matches)),
                    Err(_) => {
                        warn!("Evidence source {} panicked, ignoring it", source.name());
                        None
                    }
                })
                .collect()
        })
    }

    fn merge(
        &self,
        candidates: &mut Vec<Candidate>,
        term: &str,
        tag: SourceTag,
        matches: Vec<EvidenceMatch>,
    ) {
        let policy = &self.settings.policy;
        for found in matches
            .into_iter()
            .take(self.settings.max_candidates_per_source)
        {
            let keys = found.identity_keys();
            let overlapping: Vec<usize> = candidates
                .iter()
                .enumerate()
                .filter(|(_, candidate)| keys_intersect(&candidate.keys, &keys))
                .map(|(position, _)| position)
                .collect();
            if let Some((&first, rest)) = overlapping.split_first() {
                // The match links candidates that were distinct until now.
                let linked: Vec<Candidate> = rest
                    .iter()
                    .rev()
                    .map(|&position| candidates.remove(position))
                    .collect();
                let target = &mut candidates[first];
                target.absorb(found, term, policy);
                for other in linked.into_iter().rev() {
                    target.join(other, policy);
                }
                continue;
            }

            let reason = format!(
                "\"{term}\" found {} times in {} with this contact",
                found.count,
                tag.record_noun()
            );
            let mut candidate = Candidate::new(
                tag,
                found.handles,
                policy.classify(found.count),
                reason,
            );
            candidate.count = found.count;
            candidate.examples = found.examples;
            candidate.evidence_name = found.display_name;
            candidates.push(candidate);
        }
    }

    fn finish(&self, query: &str, mut candidates: Vec<Candidate>) -> ResolvedIdentity {
        for candidate in &mut candidates {
            candidate.name = self.display_name(candidate);
        }

        candidates.sort_by(|a, b| {
            b.confidence
                .cmp(&a.confidence)
                .then_with(|| b.count.cmp(&a.count))
                .then_with(|| a.keys.cmp(&b.keys))
        });

        let mut seen: HashSet<String> = HashSet::new();
        candidates.retain(|candidate| seen.insert(candidate.dedup_key()));

        let best_match = candidates.first().cloned();
        let handles = best_match
            .as_ref()
            .map(|best| best.handles.clone())
            .unwrap_or_default();
        let summary = self.summarize(query, best_match.as_ref(), candidates.len());

        info!(
            "Resolved {query:?}: {} candidates, best {:?}",
            candidates.len(),
            best_match.as_ref().map(|best| &best.name)
        );

        ResolvedIdentity {
            query: query.to_string(),
            matches: candidates,
            best_match,
            handles,
            summary,
        }
    }

    /// Directory name for any handle, else the source's name, else the
    /// primary handle.
    fn display_name(&self, candidate: &Candidate) -> String {
        candidate
            .handles
            .iter()
            .find_map(|handle| self.index.get_name(handle))
            .or_else(|| candidate.evidence_name.clone())
            .or_else(|| candidate.handles.first().cloned())
            .unwrap_or_default()
    }

    fn summarize(&self, query: &str, best: Option<&Candidate>, total: usize) -> String {
        let Some(best) = best else {
            let mut places = vec![SourceTag::Directory.to_string()];
            places.extend(self.sources.iter().map(|source| source.tag().to_string()));
            places.dedup();
            return format!(
                "Could not find anyone matching \"{query}\" across {}.",
                join_alternatives(&places)
            );
        };

        let mut summary = format!("\"{query}\" most likely refers to {}", best.name);
        if best.confidence == Confidence::High {
            summary.push_str(&format!(" (high confidence: {})", best.reason));
        } else {
            summary.push_str(&format!(" ({} confidence)", best.confidence));
        }
        if total > 1 {
            summary.push_str(&format!(". Found {total} possible matches."));
        }
        summary
    }
}

impl std::fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityResolver")
            .field("index", &self.index)
            .field("sources", &self.source_tags())
            .field("settings", &self.settings)
            .finish()
    }
}

/// `a`, `a or b`, `a, b, or c`.
fn join_alternatives(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [first, second] => format!("{first} or {second}"),
        [rest @ .., last] => format!("{}, or {last}", rest.join(", ")),
    }
}
