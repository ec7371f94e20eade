//! Mail search: the same terms, filters and highlighting as message search,
//! over subject and body, with thread neighbours as context.

use serde::{Deserialize, Serialize};

use oscar_evidence::{MailArchive, MailMessage, parse_address_list};
use oscar_identity::{ContactIndex, HandleKind, classify, same_endpoint};
use oscar_messages::{Direction, datetime_to_apple, format_iso, snippet};

use crate::config::SearchConfig;
use crate::search::{ContactFilter, TermMatcher};

/// Characters of each thread neighbour shown as context.
const THREAD_SNIPPET_CHARS: usize = 200;

/// One matching mail message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailHit {
    pub id: String,

    pub thread_id: Option<String>,

    /// Subject with every term occurrence highlighted.
    pub subject: String,

    /// Body with every term occurrence highlighted.
    pub text: String,

    pub timestamp: Option<String>,

    /// `Me`, the sender's name, or their address.
    pub sender: String,

    pub is_from_me: bool,

    /// Counterpart address: the sender, or the first recipient of sent mail.
    pub contact: Option<String>,

    pub contact_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ThreadContext>,
}

/// Neighbours of a mail hit in its thread, oldest first on both sides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadContext {
    pub before: Vec<ThreadMessage>,
    pub after: Vec<ThreadMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    pub subject: String,
    pub text: String,
    pub timestamp: Option<String>,
    pub sender: String,
}

/// Options for one pass over a [`MailArchive`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct MailScan<'a> {
    pub contact: Option<&'a ContactFilter>,
    /// Raw cutoff, inclusive.
    pub since: Option<i64>,
    pub direction: Option<Direction>,
    pub limit: usize,
    /// Thread neighbours per side.
    pub context: usize,
}

/// Searches a [`MailArchive`], naming people through the contact index.
pub(crate) struct MailSearcher<'a> {
    archive: &'a MailArchive,
    index: &'a ContactIndex,
    config: &'a SearchConfig,
}

impl<'a> MailSearcher<'a> {
    pub fn new(archive: &'a MailArchive, index: &'a ContactIndex, config: &'a SearchConfig) -> Self {
        Self {
            archive,
            index,
            config,
        }
    }

    /// Mail containing every term in its subject or body, newest first.
    ///
    /// Only the newest `scan_window` messages that pass the filters are
    /// examined for terms.
    pub fn search(&self, matcher: &TermMatcher, scan: &MailScan<'_>) -> Vec<MailHit> {
        let mut candidates: Vec<&MailMessage> = self
            .archive
            .messages()
            .iter()
            .filter(|message| self.passes(message, scan))
            .collect();
        candidates.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));

        candidates
            .into_iter()
            .take(self.config.scan_window)
            .filter(|message| matcher.matches(&searchable(message)))
            .take(scan.limit)
            .map(|message| self.hit(message, matcher, scan.context))
            .collect()
    }

    fn passes(&self, message: &MailMessage, scan: &MailScan<'_>) -> bool {
        if let Some(since) = scan.since
            && message.date.is_none_or(|date| datetime_to_apple(date) < since)
        {
            return false;
        }
        if scan
            .direction
            .is_some_and(|direction| direction.is_outbound() != self.archive.is_from_me(message))
        {
            return false;
        }
        scan.contact
            .is_none_or(|filter| involves(message, filter))
    }

    fn hit(&self, message: &MailMessage, matcher: &TermMatcher, context: usize) -> MailHit {
        let delimiter = &self.config.highlight_delimiter;
        let contact = self.archive.counterparts(message).into_iter().next();
        let contact_name = contact.as_ref().and_then(|address| {
            self.index
                .get_name(&address.address)
                .or_else(|| address.name.clone())
        });

        MailHit {
            id: message.id.clone(),
            thread_id: message.thread_id.clone(),
            subject: matcher.highlight(&message.subject, delimiter),
            text: matcher.highlight(&message.body, delimiter),
            timestamp: message.date.map(format_iso),
            sender: self.sender(message),
            is_from_me: self.archive.is_from_me(message),
            contact: contact.map(|address| address.address),
            contact_name,
            context: (context > 0).then(|| self.thread_context(message, context)),
        }
    }

    fn thread_context(&self, message: &MailMessage, k: usize) -> ThreadContext {
        let Some(thread_id) = message.thread_id.as_deref() else {
            return ThreadContext::default();
        };
        let thread = self.archive.thread(thread_id);
        let Some(position) = thread.iter().position(|other| other.id == message.id) else {
            return ThreadContext::default();
        };
        let shown = |messages: &[&MailMessage]| -> Vec<ThreadMessage> {
            messages
                .iter()
                .map(|other| ThreadMessage {
                    id: other.id.clone(),
                    subject: other.subject.clone(),
                    text: snippet(&other.body, THREAD_SNIPPET_CHARS),
                    timestamp: other.date.map(format_iso),
                    sender: self.sender(other),
                })
                .collect()
        };
        ThreadContext {
            before: shown(&thread[position.saturating_sub(k)..position]),
            after: shown(&thread[position + 1..thread.len().min(position + 1 + k)]),
        }
    }

    fn sender(&self, message: &MailMessage) -> String {
        if self.archive.is_from_me(message) {
            return "Me".to_string();
        }
        match parse_address_list(&message.from).into_iter().next() {
            Some(from) => self
                .index
                .get_name(&from.address)
                .or(from.name)
                .unwrap_or(from.address),
            None => "Unknown".to_string(),
        }
    }
}

fn searchable(message: &MailMessage) -> String {
    format!("{}\n{}", message.subject, message.body)
}

/// Whether `message` was exchanged with the filtered contact.
///
/// Email handles are compared with the addresses on the message; a filter
/// without any falls back to a substring match over the address headers.
fn involves(message: &MailMessage, filter: &ContactFilter) -> bool {
    let emails: Vec<&String> = filter
        .handles
        .iter()
        .filter(|handle| classify(handle) == HandleKind::Email)
        .collect();
    let headers = [&message.from, &message.to, &message.cc];

    if !emails.is_empty() {
        return headers
            .iter()
            .flat_map(|header| parse_address_list(header))
            .any(|address| emails.iter().any(|email| same_endpoint(&address.address, email)));
    }

    let pattern = filter.query.trim().to_lowercase();
    !pattern.is_empty()
        && headers
            .iter()
            .any(|header| header.to_lowercase().contains(&pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::FilterSource;
    use chrono::{TimeZone, Utc};
    use oscar_identity::{ContactRecord, MemoryDirectory};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const ME: &str = "me@example.com";
    const JANE: &str = "Jane <jane@example.com>";

    fn mail(id: &str, from: &str, to: &str, subject: &str, body: &str, day: u32) -> MailMessage {
        MailMessage {
            id: id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            date: Utc.with_ymd_and_hms(2024, 5, day, 9, 0, 0).single(),
            thread_id: Some("trip".to_string()),
            ..MailMessage::default()
        }
    }

    fn archive() -> MailArchive {
        MailArchive::from_messages(
            "mail",
            vec![
                mail("1", ME, JANE, "Lisbon trip", "Flights are booked", 1),
                mail("2", JANE, ME, "Re: Lisbon trip", "Great, hotel next", 2),
                mail("3", ME, "jane@example.com", "Re: Lisbon trip", "Hotel booked too", 3),
                MailMessage {
                    thread_id: None,
                    ..mail("4", "news@airline.com", ME, "Deals", "Cheap flights to Lisbon", 4)
                },
            ],
        )
        .with_self_addresses(vec![ME.to_string()])
    }

    fn index() -> ContactIndex {
        ContactIndex::new(vec![Arc::new(MemoryDirectory::new(
            "contacts",
            vec![ContactRecord::named("Jane", "Doe").with_handle("jane@example.com")],
        ))])
    }

    fn matcher(terms: &[&str]) -> TermMatcher {
        let terms: Vec<String> = terms.iter().map(ToString::to_string).collect();
        TermMatcher::compile(&terms).unwrap()
    }

    fn scan<'a>(contact: Option<&'a ContactFilter>) -> MailScan<'a> {
        MailScan {
            contact,
            since: None,
            direction: None,
            limit: 10,
            context: 0,
        }
    }

    fn ids(hits: &[MailHit]) -> Vec<&str> {
        hits.iter().map(|hit| hit.id.as_str()).collect()
    }

    #[test]
    fn test_terms_match_subject_or_body() {
        let (archive, index, config) = (archive(), index(), SearchConfig::default());
        let searcher = MailSearcher::new(&archive, &index, &config);

        let hits = searcher.search(&matcher(&["lisbon", "booked"]), &scan(None));
        assert_eq!(ids(&hits), vec!["3", "1"]);
        assert_eq!(hits[0].subject, "Re: **Lisbon** trip");
        assert_eq!(hits[0].text, "Hotel **booked** too");
        assert_eq!(hits[0].sender, "Me");
        assert_eq!(hits[0].contact.as_deref(), Some("jane@example.com"));
        assert_eq!(hits[0].contact_name.as_deref(), Some("Jane Doe"));

        let hits = searcher.search(&matcher(&["hotel"]), &scan(None));
        assert_eq!(hits[1].sender, "Jane Doe");
        assert!(!hits[1].is_from_me);
    }

    #[test]
    fn test_filters() {
        let (archive, index, config) = (archive(), index(), SearchConfig::default());
        let searcher = MailSearcher::new(&archive, &index, &config);

        let jane = ContactFilter {
            query: "Jane".to_string(),
            source: FilterSource::Directory,
            name: Some("Jane Doe".to_string()),
            handles: vec!["Jane@Example.com".to_string()],
        };
        let hits = searcher.search(&matcher(&["lisbon"]), &scan(Some(&jane)));
        assert_eq!(ids(&hits), vec!["3", "2", "1"]);

        let airline = ContactFilter {
            query: "airline".to_string(),
            source: FilterSource::Pattern,
            name: None,
            handles: Vec::new(),
        };
        let hits = searcher.search(&matcher(&["lisbon"]), &scan(Some(&airline)));
        assert_eq!(ids(&hits), vec!["4"]);

        let received = MailScan {
            direction: Some(Direction::Inbound),
            ..scan(None)
        };
        assert_eq!(ids(&searcher.search(&matcher(&["lisbon"]), &received)), vec!["4", "2"]);

        let recent = MailScan {
            since: Utc
                .with_ymd_and_hms(2024, 5, 3, 9, 0, 0)
                .single()
                .map(datetime_to_apple),
            limit: 1,
            ..scan(None)
        };
        assert_eq!(ids(&searcher.search(&matcher(&["lisbon"]), &recent)), vec!["4"]);
    }

    #[test]
    fn test_scan_window_and_thread_context() {
        let (archive, index) = (archive(), index());
        let config = SearchConfig {
            scan_window: 2,
            ..SearchConfig::default()
        };
        let searcher = MailSearcher::new(&archive, &index, &config);
        // Mail 1 is outside the two newest messages.
        assert!(searcher.search(&matcher(&["flights are"]), &scan(None)).is_empty());

        let with_context = MailScan {
            context: 1,
            ..scan(None)
        };
        let hits = searcher.search(&matcher(&["hotel booked"]), &with_context);
        let context = hits[0].context.clone().unwrap();
        let before: Vec<&str> = context.before.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(before, vec!["2"]);
        assert_eq!(context.before[0].sender, "Jane Doe");
        assert!(context.after.is_empty());
    }
}
