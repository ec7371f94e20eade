use std::cmp::Reverse;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use oscar_messages::Direction;

use super::{EvidenceRecord, RecordSource};
use crate::error::{EvidenceError, Result};
use crate::evidence::SourceTag;

/// One message from a mail export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailMessage {
    pub id: String,
    /// `From` header, e.g. `Jane Doe <jane@example.com>`.
    pub from: String,
    /// `To` header, comma-separated.
    pub to: String,
    pub cc: String,
    pub subject: String,
    pub body: String,
    pub date: Option<DateTime<Utc>>,
    /// Overrides sender-based direction detection when set.
    pub outbound: Option<bool>,
    /// Messages sharing a thread id form one conversation.
    #[serde(alias = "threadId")]
    pub thread_id: Option<String>,
}

/// Mail history from a JSON export, attributed to counterpart addresses.
///
/// Mail the user sent yields one record per recipient; mail they received
/// yields one record for the sender. Examples quote the subject line.
#[derive(Debug, Clone, Default)]
pub struct MailArchive {
    name: String,
    messages: Vec<MailMessage>,
    self_addresses: Vec<String>,
}

impl MailArchive {
    pub fn from_messages(name: impl Into<String>, messages: Vec<MailMessage>) -> Self {
        Self {
            name: name.into(),
            messages,
            self_addresses: Vec::new(),
        }
    }

    /// Load an export file (a JSON array of [`MailMessage`]).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(EvidenceError::SourceUnavailable {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let messages: Vec<MailMessage> = serde_json::from_str(&content)?;
        info!("Loaded {} mail messages from {}", messages.len(), path.display());
        Ok(Self::from_messages(path.display().to_string(), messages))
    }

    /// Addresses that belong to the user; mail from them counts as sent.
    pub fn with_self_addresses(mut self, addresses: Vec<String>) -> Self {
        self.self_addresses = addresses
            .iter()
            .map(|address| address.trim().to_lowercase())
            .collect();
        self
    }

    pub fn messages(&self) -> &[MailMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Whether the user sent `message`.
    pub fn is_from_me(&self, message: &MailMessage) -> bool {
        let sender = parse_address_list(&message.from).into_iter().next();
        self.direction_of(message, sender.as_ref()).is_outbound()
    }

    /// The other parties: recipients of sent mail, the sender of received
    /// mail.
    pub fn counterparts(&self, message: &MailMessage) -> Vec<MailAddress> {
        self.attribute(message)
            .into_iter()
            .map(|(address, _)| address)
            .collect()
    }

    /// Every message in `thread_id`, oldest first.
    pub fn thread(&self, thread_id: &str) -> Vec<&MailMessage> {
        let mut thread: Vec<&MailMessage> = self
            .messages
            .iter()
            .filter(|message| message.thread_id.as_deref() == Some(thread_id))
            .collect();
        thread.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        thread
    }

    fn is_self(&self, address: &str) -> bool {
        self.self_addresses.iter().any(|own| own == address)
    }

    fn direction_of(&self, message: &MailMessage, sender: Option<&MailAddress>) -> Direction {
        let outbound = message
            .outbound
            .unwrap_or_else(|| sender.is_some_and(|sender| self.is_self(&sender.address)));
        Direction::from_outbound(outbound)
    }

    fn attribute(&self, message: &MailMessage) -> Vec<(MailAddress, Direction)> {
        let sender = parse_address_list(&message.from).into_iter().next();
        match self.direction_of(message, sender.as_ref()) {
            Direction::Outbound => parse_address_list(&message.to)
                .into_iter()
                .chain(parse_address_list(&message.cc))
                .filter(|recipient| !self.is_self(&recipient.address))
                .map(|recipient| (recipient, Direction::Outbound))
                .collect(),
            Direction::Inbound => sender
                .into_iter()
                .map(|sender| (sender, Direction::Inbound))
                .collect(),
        }
    }
}

impl RecordSource for MailArchive {
    fn tag(&self) -> SourceTag {
        SourceTag::Mail
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn records(&self, direction: Direction, limit: usize) -> Result<Vec<EvidenceRecord>> {
        let mut messages: Vec<&MailMessage> = self.messages.iter().collect();
        messages.sort_by_key(|message| Reverse(message.date));

        let mut records = Vec::new();
        for message in messages {
            let text = format!("{}\n{}", message.subject, message.body);
            let example = if message.subject.trim().is_empty() {
                None
            } else {
                Some(message.subject.clone())
            };
            for (counterpart, record_direction) in self.attribute(message) {
                if record_direction != direction {
                    continue;
                }
                records.push(EvidenceRecord {
                    handle: counterpart.address,
                    alternate_handles: Vec::new(),
                    display_name: counterpart.name,
                    text: text.clone(),
                    example_text: example.clone(),
                    timestamp: message.date,
                    direction,
                });
            }
            if records.len() >= limit {
                break;
            }
        }
        records.truncate(limit);
        Ok(records)
    }
}

/// A parsed mailbox from an address header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailAddress {
    pub name: Option<String>,
    /// Lowercased address.
    pub address: String,
}

/// Parse an address header such as `"Doe, Jane" <jane@example.com>, bob@example.com`.
///
/// Entries without an `@` are dropped.
pub fn parse_address_list(header: &str) -> Vec<MailAddress> {
    let mut entries: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in header.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => entries.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    entries.push(current);

    entries
        .iter()
        .filter_map(|entry| parse_mailbox(entry.trim()))
        .collect()
}

fn parse_mailbox(entry: &str) -> Option<MailAddress> {
    let (name, address) = match (entry.find('<'), entry.rfind('>')) {
        (Some(open), Some(close)) if open < close => {
            let name = entry[..open].trim().trim_matches('"').trim();
            let name = (!name.is_empty()).then(|| name.to_string());
            (name, &entry[open + 1..close])
        }
        _ => (None, entry),
    };
    let address = address.trim().to_lowercase();
    address.contains('@').then_some(MailAddress { name, address })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_address_list() {
        let parsed = parse_address_list(r#""Doe, Jane" <Jane@Example.com>, bob@example.com, undisclosed"#);
        assert_eq!(
            parsed,
            vec![
                MailAddress {
                    name: Some("Doe, Jane".to_string()),
                    address: "jane@example.com".to_string(),
                },
                MailAddress {
                    name: None,
                    address: "bob@example.com".to_string(),
                },
            ]
        );
        assert!(parse_address_list("").is_empty());
    }

    fn archive() -> MailArchive {
        MailArchive::from_messages(
            "mail",
            vec![
                MailMessage {
                    id: "1".to_string(),
                    from: "Me <me@example.com>".to_string(),
                    to: "Amanda <amanda@example.com>, me@example.com".to_string(),
                    subject: "Dinner with Mandy".to_string(),
                    body: "Hi Mandy, are we still on?".to_string(),
                    date: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).single(),
                    ..MailMessage::default()
                },
                MailMessage {
                    id: "2".to_string(),
                    from: "Amanda <amanda@example.com>".to_string(),
                    to: "me@example.com".to_string(),
                    subject: "Re: Dinner".to_string(),
                    body: "Sure! - Mandy".to_string(),
                    date: Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).single(),
                    ..MailMessage::default()
                },
            ],
        )
        .with_self_addresses(vec!["Me@Example.com".to_string()])
    }

    #[test]
    fn test_sent_mail_is_attributed_to_recipients() {
        let records = archive().records(Direction::Outbound, 10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].handle, "amanda@example.com");
        assert_eq!(records[0].display_name.as_deref(), Some("Amanda"));
        assert_eq!(records[0].example(), "Dinner with Mandy");
        assert!(records[0].text.contains("are we still on"));
    }

    #[test]
    fn test_counterparts_and_threads() {
        let mut archive = archive();
        archive.messages[0].thread_id = Some("t1".to_string());
        archive.messages[1].thread_id = Some("t1".to_string());

        let sent = &archive.messages()[0];
        assert!(archive.is_from_me(sent));
        let counterparts: Vec<String> = archive
            .counterparts(sent)
            .into_iter()
            .map(|address| address.address)
            .collect();
        assert_eq!(counterparts, vec!["amanda@example.com"]);

        let reply = &archive.messages()[1];
        assert!(!archive.is_from_me(reply));
        let ids: Vec<&str> = archive.thread("t1").iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert!(archive.thread("t2").is_empty());
    }

    #[test]
    fn test_received_mail_is_attributed_to_sender() {
        let records = archive().records(Direction::Inbound, 10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].handle, "amanda@example.com");
        assert_eq!(records[0].direction, Direction::Inbound);
    }

    #[test]
    fn test_without_self_addresses_everything_is_inbound() {
        let archive = MailArchive::from_messages("mail", archive().messages);
        assert!(archive.records(Direction::Outbound, 10).unwrap().is_empty());
        assert_eq!(archive.records(Direction::Inbound, 10).unwrap().len(), 2);
    }
}
