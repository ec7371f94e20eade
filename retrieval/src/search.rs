//! Full-text search and conversation reading over message and mail history.
//!
//! Queries are AND-of-terms with case-insensitive substring matching; a
//! double-quoted span is one literal term. Contact filters are resolved
//! through the [`ContactIndex`] first, then the [`IdentityResolver`], and
//! finally fall back to a substring match over handles and conversation
//! names.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use oscar_evidence::{IdentityResolver, MailArchive};
use oscar_identity::{ContactIndex, ContactSummary, Handle, HandleKind, same_endpoint};
use oscar_messages::{
    ConversationSummary, Direction, MessageQuery, MessageRecord, MessageStore,
    conversation_handle, datetime_to_apple, days_before, format_cursor, snippet,
};

use crate::config::SearchConfig;
use crate::mail::{MailHit, MailScan, MailSearcher};

/// Split a query into terms. Double-quoted spans stay whole; everything else
/// splits on whitespace. An unterminated quote runs to the end.
pub fn parse_query(query: &str) -> Vec<String> {
    let mut terms = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in query.chars() {
        if c == '"' {
            flush_term(&mut terms, &mut current);
            in_quotes = !in_quotes;
        } else if c.is_whitespace() && !in_quotes {
            flush_term(&mut terms, &mut current);
        } else {
            current.push(c);
        }
    }
    flush_term(&mut terms, &mut current);
    terms
}

fn flush_term(terms: &mut Vec<String>, current: &mut String) {
    let term = current.trim();
    if !term.is_empty() {
        terms.push(term.to_string());
    }
    current.clear();
}

/// Case-insensitive literal patterns for a set of terms.
#[derive(Debug)]
pub(crate) struct TermMatcher {
    patterns: Vec<Regex>,
}

impl TermMatcher {
    pub(crate) fn compile(terms: &[String]) -> Result<Self, regex::Error> {
        let patterns = terms
            .iter()
            .map(|term| {
                RegexBuilder::new(&regex::escape(term))
                    .case_insensitive(true)
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Every term occurs in `text`.
    pub(crate) fn matches(&self, text: &str) -> bool {
        self.patterns.iter().all(|pattern| pattern.is_match(text))
    }

    /// Wrap every occurrence of every term in `delimiter`, merging
    /// occurrences that overlap or touch.
    pub(crate) fn highlight(&self, text: &str, delimiter: &str) -> String {
        let mut ranges: Vec<(usize, usize)> = self
            .patterns
            .iter()
            .flat_map(|pattern| pattern.find_iter(text).map(|m| (m.start(), m.end())))
            .filter(|(start, end)| start < end)
            .collect();
        ranges.sort_unstable();

        let mut merged: Vec<(usize, usize)> = Vec::with_capacity(ranges.len());
        for (start, end) in ranges {
            match merged.last_mut() {
                Some(last) if start <= last.1 => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }

        let mut out = String::with_capacity(text.len() + merged.len() * 2 * delimiter.len());
        let mut cursor = 0;
        for (start, end) in merged {
            out.push_str(&text[cursor..start]);
            out.push_str(delimiter);
            out.push_str(&text[start..end]);
            out.push_str(delimiter);
            cursor = end;
        }
        out.push_str(&text[cursor..]);
        out
    }
}

/// Which histories a search covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSource {
    Messages,
    Mail,
    #[default]
    All,
}

impl SearchSource {
    pub fn includes_messages(self) -> bool {
        matches!(self, Self::Messages | Self::All)
    }

    pub fn includes_mail(self) -> bool {
        matches!(self, Self::Mail | Self::All)
    }
}

/// Parameters for [`SearchEngine::search`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    pub query: String,

    /// Treat the whole query as a single phrase.
    pub exact_phrase: bool,

    /// Only messages with these handles. Takes precedence over `contact`.
    pub handles: Vec<String>,

    /// Free-form contact: a name, nickname or handle.
    pub contact: Option<String>,

    /// Only messages at or after this time.
    pub since: Option<DateTime<Utc>>,

    /// Only messages from the last `days_back` days.
    pub days_back: Option<u32>,

    pub direction: Option<Direction>,

    /// Neighbours shown on each side of a hit.
    pub context: usize,

    /// Results per source.
    pub max_results: Option<usize>,

    pub sources: SearchSource,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn exact_phrase(mut self) -> Self {
        self.exact_phrase = true;
        self
    }

    pub fn with_handles(mut self, handles: Vec<String>) -> Self {
        self.handles = handles;
        self
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }

    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_days_back(mut self, days: u32) -> Self {
        self.days_back = Some(days);
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn with_context(mut self, context: usize) -> Self {
        self.context = context;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    pub fn with_sources(mut self, sources: SearchSource) -> Self {
        self.sources = sources;
        self
    }

    fn terms(&self) -> Vec<String> {
        if self.exact_phrase {
            let phrase = self.query.trim().trim_matches('"').trim();
            if phrase.is_empty() {
                Vec::new()
            } else {
                vec![phrase.to_string()]
            }
        } else {
            parse_query(&self.query)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Ok,
    /// No terms and no contact filter.
    NothingToSearch,
    /// The terms could not be compiled.
    InvalidQuery,
}

/// How a contact filter was turned into handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterSource {
    /// Handles given directly, or a contact string that is itself a handle.
    Handles,
    /// A contact directory term.
    Directory,
    /// The best match from identity resolution.
    Resolver,
    /// Nothing resolved; substring match over handles and conversation names.
    Pattern,
}

/// A resolved contact filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactFilter {
    pub query: String,
    pub source: FilterSource,
    pub name: Option<String>,
    pub handles: Vec<String>,
}

impl ContactFilter {
    fn message_query(&self) -> MessageQuery {
        if self.handles.is_empty() {
            MessageQuery::new().with_contact_pattern(&self.query)
        } else {
            MessageQuery::new().with_handles(self.handles.clone())
        }
    }
}

/// A message shown in a conversation or as context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: i64,
    pub text: String,
    pub timestamp: Option<String>,
    pub sender: String,
    pub is_from_me: bool,
    /// Set on the message a context window was centred on.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_match: bool,
}

/// Neighbours of a hit, oldest first on both sides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitContext {
    pub before: Vec<ConversationMessage>,
    pub after: Vec<ConversationMessage>,
}

/// One matching message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: i64,

    /// Body with every term occurrence highlighted.
    pub text: String,

    pub timestamp: Option<String>,

    /// `Me`, the contact's name, or their handle.
    pub sender: String,

    pub is_from_me: bool,

    /// Counterpart handle.
    pub contact: Option<String>,

    pub contact_name: Option<String>,

    pub conversation_id: String,

    pub conversation_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<HitContext>,
}

/// Outcome of [`SearchEngine::search`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub status: SearchStatus,
    pub query: String,
    pub terms: Vec<String>,
    pub contact_filter: Option<ContactFilter>,
    /// Hits across every searched source.
    pub total: usize,
    /// Message hits.
    pub results: Vec<SearchHit>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mail_results: Vec<MailHit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SearchResponse {
    fn empty(status: SearchStatus, query: &str, terms: Vec<String>, message: String) -> Self {
        Self {
            status,
            query: query.to_string(),
            terms,
            contact_filter: None,
            total: 0,
            results: Vec::new(),
            mail_results: Vec::new(),
            message: Some(message),
        }
    }
}

/// One row of [`SearchEngine::list_conversations`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationOverview {
    pub conversation_id: String,
    pub display_name: Option<String>,
    /// Counterpart handle of a one-to-one conversation.
    pub contact: Option<String>,
    pub contact_name: Option<String>,
    pub is_group: bool,
    pub participant_count: usize,
    pub message_count: usize,
    /// Start of the latest message.
    pub last_message: String,
    pub last_message_at: Option<String>,
    pub last_from_me: bool,
}

/// A page of one conversation, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationPage {
    pub contact: String,
    pub found: bool,
    pub conversation_id: Option<String>,
    pub display_name: Option<String>,
    pub contact_name: Option<String>,
    pub resolved_handles: Vec<String>,
    pub messages: Vec<ConversationMessage>,
    /// Pass back as `before` to fetch the previous page.
    pub oldest_timestamp: Option<String>,
    pub has_more: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ConversationPage {
    fn not_found(contact: &str, resolved_handles: Vec<String>) -> Self {
        Self {
            contact: contact.to_string(),
            found: false,
            conversation_id: None,
            display_name: None,
            contact_name: None,
            resolved_handles,
            messages: Vec::new(),
            oldest_timestamp: None,
            has_more: false,
            error: Some(format!("No conversation found for contact: {contact}")),
            suggestion: Some(
                "Try a phone number or email address, or list conversations to find the right name"
                    .to_string(),
            ),
        }
    }
}

/// Outcome of [`SearchEngine::get_context`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextResponse {
    pub contact_filter: ContactFilter,
    pub around: Option<String>,
    /// Whether `around` matched a message.
    pub found_match: bool,
    /// Oldest first.
    pub messages: Vec<ConversationMessage>,
}

/// Search, browse and read message history.
pub struct SearchEngine {
    store: Arc<dyn MessageStore>,
    index: Arc<ContactIndex>,
    resolver: Option<Arc<IdentityResolver>>,
    mail: Option<Arc<MailArchive>>,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(store: Arc<dyn MessageStore>, index: Arc<ContactIndex>) -> Self {
        Self {
            store,
            index,
            resolver: None,
            mail: None,
            config: SearchConfig::default(),
        }
    }

    /// Resolve contacts the directory does not know through evidence.
    pub fn with_resolver(mut self, resolver: Arc<IdentityResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Also search mail.
    pub fn with_mail(mut self, mail: Arc<MailArchive>) -> Self {
        self.mail = Some(mail);
        self
    }

    pub fn with_config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    /// Turn a free-form contact into handles.
    ///
    /// A handle is used as-is. Otherwise the directory is asked, then the
    /// resolver; when neither knows the contact the filter falls back to a
    /// substring match.
    pub fn resolve_contact(&self, contact: &str) -> ContactFilter {
        let contact = contact.trim();
        let filter = |source: FilterSource, name: Option<String>, handles: Vec<String>| {
            ContactFilter {
                query: contact.to_string(),
                source,
                name,
                handles,
            }
        };

        if looks_like_handle(contact) {
            let name = self.index.get_name(contact);
            return filter(FilterSource::Handles, name, vec![contact.to_string()]);
        }

        let handles = self.index.find_handles(contact);
        if !handles.is_empty() {
            let name = handles.iter().find_map(|handle| self.index.get_name(handle));
            return filter(FilterSource::Directory, name, handles);
        }

        if let Some(resolver) = &self.resolver
            && let Some(best) = resolver.resolve(contact, false).best_match
            && !best.handles.is_empty()
        {
            debug!("Contact {contact:?} resolved through evidence to {}", best.name);
            return filter(FilterSource::Resolver, Some(best.name), best.handles);
        }

        debug!("Contact {contact:?} not resolved, matching by substring");
        filter(FilterSource::Pattern, None, Vec::new())
    }

    /// Messages containing every term, newest first.
    ///
    /// Only the newest `scan_window` messages that pass the filters are
    /// examined for terms. An empty query with a contact filter lists that contact's latest
    /// messages; with no filter either, nothing is searched.
    pub fn search(&self, request: &SearchRequest) -> SearchResponse {
        let terms = request.terms();

        let contact_filter = if request.handles.is_empty() {
            request
                .contact
                .as_deref()
                .map(str::trim)
                .filter(|contact| !contact.is_empty())
                .map(|contact| self.resolve_contact(contact))
        } else {
            Some(ContactFilter {
                query: request.handles.join(", "),
                source: FilterSource::Handles,
                name: request
                    .handles
                    .iter()
                    .find_map(|handle| self.index.get_name(handle)),
                handles: request.handles.clone(),
            })
        };

        if terms.is_empty() && contact_filter.is_none() {
            return SearchResponse::empty(
                SearchStatus::NothingToSearch,
                &request.query,
                terms,
                "Provide search terms or a contact to search.".to_string(),
            );
        }

        let matcher = match TermMatcher::compile(&terms) {
            Ok(matcher) => matcher,
            Err(e) => {
                warn!("Could not compile search terms {terms:?}: {e}");
                return SearchResponse::empty(
                    SearchStatus::InvalidQuery,
                    &request.query,
                    terms,
                    format!("Could not search for these terms: {e}"),
                );
            }
        };

        let limit = clamp_limit(
            request.max_results,
            self.config.default_max_results,
            self.config.max_results_cap,
        );
        let since = cutoff(request, Utc::now());
        let context = request.context.min(self.config.max_context);

        let results: Vec<SearchHit> = if request.sources.includes_messages() {
            let mut query = contact_filter
                .as_ref()
                .map(ContactFilter::message_query)
                .unwrap_or_default();
            if let Some(since) = since {
                query = query.with_since(since);
            }
            if let Some(direction) = request.direction {
                query = query.with_direction(direction);
            }
            query = query.with_limit(if terms.is_empty() {
                limit
            } else {
                self.config.scan_window
            });

            self.fetch(&query)
                .iter()
                .filter_map(|record| {
                    let body = record.body()?;
                    matcher
                        .matches(&body)
                        .then(|| self.hit(record, &body, &matcher, context))
                })
                .take(limit)
                .collect()
        } else {
            Vec::new()
        };

        let mail_results = match &self.mail {
            Some(mail) if request.sources.includes_mail() => {
                MailSearcher::new(mail, &self.index, &self.config).search(
                    &matcher,
                    &MailScan {
                        contact: contact_filter.as_ref(),
                        since,
                        direction: request.direction,
                        limit,
                        context,
                    },
                )
            }
            _ => Vec::new(),
        };

        debug!(
            "Search {:?} ({} terms) returned {} messages and {} mail",
            request.query,
            terms.len(),
            results.len(),
            mail_results.len()
        );

        SearchResponse {
            status: SearchStatus::Ok,
            query: request.query.clone(),
            terms,
            contact_filter,
            total: results.len() + mail_results.len(),
            results,
            mail_results,
            message: None,
        }
    }

    /// Up to `k` records either side of `message_id` in its conversation,
    /// regardless of any search terms.
    pub fn context_for(&self, message_id: i64, k: usize) -> HitContext {
        let k = k.min(self.config.max_context);
        match self.store.neighbors(message_id, k) {
            Ok(neighbors) => HitContext {
                before: self.messages(&neighbors.before),
                after: self.messages(&neighbors.after),
            },
            Err(e) => {
                warn!("No context for message {message_id}: {e}");
                HitContext::default()
            }
        }
    }

    /// Latest conversations first.
    pub fn list_conversations(&self, limit: Option<usize>) -> Vec<ConversationOverview> {
        let limit = clamp_limit(
            limit,
            self.config.default_conversations,
            self.config.max_conversations,
        );
        match self.store.conversations(limit) {
            Ok(conversations) => conversations
                .iter()
                .map(|summary| self.overview(summary))
                .collect(),
            Err(e) => {
                warn!("Message store {} unavailable: {e}", self.store.name());
                Vec::new()
            }
        }
    }

    /// A page of the newest conversation with `contact`, oldest message
    /// first. `before` pages backwards using a previous page's
    /// `oldest_timestamp`.
    pub fn read_conversation(
        &self,
        contact: &str,
        max_messages: Option<usize>,
        before: Option<DateTime<Utc>>,
    ) -> ConversationPage {
        let contact = contact.trim();
        let filter = self.resolve_contact(contact);
        let Some(conversation) = self.find_conversation(&filter) else {
            debug!("No conversation for {contact:?}");
            return ConversationPage::not_found(contact, filter.handles);
        };

        let limit = clamp_limit(
            max_messages,
            self.config.default_conversation_messages,
            self.config.max_conversation_messages,
        );
        let mut query = MessageQuery::new()
            .with_conversation(&conversation.conversation_id)
            .with_limit(limit.saturating_add(1));
        if let Some(before) = before {
            query = query.with_before(datetime_to_apple(before));
        }

        let mut records = self.fetch(&query);
        let has_more = records.len() > limit;
        records.truncate(limit);
        records.reverse();

        let contact_name = filter.name.clone().or_else(|| {
            conversation
                .handles
                .iter()
                .find_map(|handle| self.index.get_name(handle))
        });

        ConversationPage {
            contact: contact.to_string(),
            found: true,
            conversation_id: Some(conversation.conversation_id.clone()),
            display_name: conversation.display_name.clone(),
            contact_name,
            resolved_handles: filter.handles,
            oldest_timestamp: records
                .first()
                .and_then(MessageRecord::timestamp)
                .map(format_cursor),
            messages: self.messages(&records),
            has_more,
            error: None,
            suggestion: None,
        }
    }

    /// Recent messages with `contact`, or the first (newest) message
    /// matching `around` with `max_messages / 2` neighbours each side.
    pub fn get_context(
        &self,
        contact: &str,
        around: Option<&str>,
        max_messages: Option<usize>,
        days_back: Option<u32>,
    ) -> ContextResponse {
        let filter = self.resolve_contact(contact);
        let limit = clamp_limit(
            max_messages,
            self.config.default_max_results,
            self.config.max_results_cap,
        );
        let around = around.map(str::trim).filter(|around| !around.is_empty());

        let mut query = filter.message_query();
        if let Some(days) = days_back {
            query = query.with_since(days_before(Utc::now(), days));
        }

        if let Some(around) = around {
            let terms = parse_query(around);
            let window = query.clone().with_limit(self.config.scan_window);
            let hit = TermMatcher::compile(&terms).ok().and_then(|matcher| {
                self.fetch(&window).into_iter().find(|record| {
                    record.body().is_some_and(|body| matcher.matches(&body))
                })
            });
            if let Some(hit) = hit {
                let k = (limit / 2).min(self.config.max_context);
                let neighbors = self.store.neighbors(hit.id, k).unwrap_or_else(|e| {
                    warn!("No context for message {}: {e}", hit.id);
                    Default::default()
                });
                let mut messages = self.messages(&neighbors.before);
                if let Some(mut centre) = self.message(&hit) {
                    centre.is_match = true;
                    messages.push(centre);
                }
                messages.extend(self.messages(&neighbors.after));
                return ContextResponse {
                    contact_filter: filter,
                    around: Some(around.to_string()),
                    found_match: true,
                    messages,
                };
            }
            debug!("{around:?} not found, falling back to recent messages");
        }

        let mut records = self.fetch(&query.with_limit(limit));
        records.reverse();
        ContextResponse {
            contact_filter: filter,
            around: around.map(str::to_string),
            found_match: false,
            messages: self.messages(&records),
        }
    }

    /// Directory contacts whose names contain `query`.
    pub fn search_contacts(&self, query: &str) -> Vec<ContactSummary> {
        self.index.search_contacts(query)
    }

    fn fetch(&self, query: &MessageQuery) -> Vec<MessageRecord> {
        self.store.recent(query).unwrap_or_else(|e| {
            warn!("Message store {} unavailable: {e}", self.store.name());
            Vec::new()
        })
    }

    fn find_conversation(&self, filter: &ContactFilter) -> Option<ConversationSummary> {
        let conversations = self
            .store
            .conversations(usize::MAX)
            .unwrap_or_else(|e| {
                warn!("Message store {} unavailable: {e}", self.store.name());
                Vec::new()
            });

        if filter.handles.is_empty() {
            let pattern = filter.query.to_lowercase();
            if pattern.is_empty() {
                return None;
            }
            return conversations.into_iter().find(|conversation| {
                conversation.conversation_id.to_lowercase().contains(&pattern)
                    || conversation
                        .display_name
                        .as_deref()
                        .is_some_and(|name| name.to_lowercase().contains(&pattern))
                    || conversation
                        .handles
                        .iter()
                        .any(|handle| handle.to_lowercase().contains(&pattern))
            });
        }

        let touches = |conversation: &ConversationSummary| {
            conversation_handle(&conversation.conversation_id)
                .into_iter()
                .chain(conversation.handles.iter().map(String::as_str))
                .any(|handle| {
                    filter
                        .handles
                        .iter()
                        .any(|wanted| same_endpoint(handle, wanted))
                })
        };

        // Prefer the one-to-one conversation over groups the contact is in.
        let mut fallback = None;
        for conversation in conversations {
            if !touches(&conversation) {
                continue;
            }
            if !conversation.is_group() {
                return Some(conversation);
            }
            if fallback.is_none() {
                fallback = Some(conversation);
            }
        }
        fallback
    }

    fn overview(&self, summary: &ConversationSummary) -> ConversationOverview {
        let is_group = summary.is_group();
        let contact = if is_group {
            None
        } else {
            summary
                .handles
                .first()
                .cloned()
                .or_else(|| conversation_handle(&summary.conversation_id).map(str::to_string))
        };
        let contact_name = contact
            .as_deref()
            .and_then(|handle| self.index.get_name(handle));
        let last = &summary.last_message;

        ConversationOverview {
            conversation_id: summary.conversation_id.clone(),
            display_name: summary.display_name.clone(),
            contact,
            contact_name,
            is_group,
            participant_count: summary.handles.len(),
            message_count: summary.message_count,
            last_message: snippet(&last.body().unwrap_or_default(), self.config.preview_chars),
            last_message_at: last.timestamp_iso(),
            last_from_me: last.direction().is_outbound(),
        }
    }

    fn hit(
        &self,
        record: &MessageRecord,
        body: &str,
        matcher: &TermMatcher,
        context: usize,
    ) -> SearchHit {
        let contact = record.counterpart().map(str::to_string);
        let contact_name = contact
            .as_deref()
            .and_then(|handle| self.index.get_name(handle));
        SearchHit {
            id: record.id,
            text: matcher.highlight(body, &self.config.highlight_delimiter),
            timestamp: record.timestamp_iso(),
            sender: self.sender(record),
            is_from_me: record.direction().is_outbound(),
            contact,
            contact_name,
            conversation_id: record.conversation_id.clone(),
            conversation_name: record.conversation_name.clone(),
            context: (context > 0).then(|| self.context_for(record.id, context)),
        }
    }

    fn sender(&self, record: &MessageRecord) -> String {
        if record.direction().is_outbound() {
            return "Me".to_string();
        }
        match record.counterpart() {
            Some(handle) => self
                .index
                .get_name(handle)
                .unwrap_or_else(|| handle.to_string()),
            None => "Unknown".to_string(),
        }
    }

    fn message(&self, record: &MessageRecord) -> Option<ConversationMessage> {
        Some(ConversationMessage {
            id: record.id,
            text: record.body()?,
            timestamp: record.timestamp_iso(),
            sender: self.sender(record),
            is_from_me: record.direction().is_outbound(),
            is_match: false,
        })
    }

    fn messages(&self, records: &[MessageRecord]) -> Vec<ConversationMessage> {
        records
            .iter()
            .filter_map(|record| self.message(record))
            .collect()
    }
}

impl std::fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchEngine")
            .field("store", &self.store.name())
            .field("index", &self.index)
            .field("resolver", &self.resolver.is_some())
            .field("mail", &self.mail.as_ref().map(|mail| mail.messages().len()))
            .field("config", &self.config)
            .finish()
    }
}

/// Whether a contact string is a handle rather than a name.
fn looks_like_handle(contact: &str) -> bool {
    let handle = Handle::parse(contact);
    if !handle.is_matchable() {
        return false;
    }
    match handle.kind {
        HandleKind::Email => {
            !contact.contains(char::is_whitespace)
                && contact
                    .split_once('@')
                    .is_some_and(|(user, domain)| !user.is_empty() && domain.contains('.'))
        }
        HandleKind::Phone => contact
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '(' | ')' | '.' | ' ')),
    }
}

/// Requested count, else `default`, never above `cap` or below one.
fn clamp_limit(requested: Option<usize>, default: usize, cap: usize) -> usize {
    requested.unwrap_or(default).clamp(1, cap.max(1))
}

/// The later of `since` and the `days_back` cutoff, as a raw timestamp.
fn cutoff(request: &SearchRequest, now: DateTime<Utc>) -> Option<i64> {
    let since = request.since.map(datetime_to_apple);
    let recent = request.days_back.map(|days| days_before(now, days));
    match (since, recent) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}
