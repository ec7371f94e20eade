use std::path::Path;

use chrono::{TimeDelta, Utc};
use oscar_messages::{Direction, MessageRecord, datetime_to_apple};
use oscar_retrieval::{
    Confidence, FilterSource, Oscar, SearchRequest, SearchSource, SearchStatus, SourceTag,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const AMANDA: &str = "+15550001111";
const AIRLINE: &str = "+15550009999";

fn days_ago(days: i64) -> i64 {
    datetime_to_apple(Utc::now() - TimeDelta::days(days))
}

fn message(id: i64, handle: &str, text: &str, direction: Direction, age_days: i64) -> MessageRecord {
    MessageRecord::new(id, format!("iMessage;-;{handle}"), text)
        .with_handle(handle)
        .with_direction(direction)
        .with_timestamp(days_ago(age_days))
}

fn write_messages(path: &Path, records: &[MessageRecord]) {
    let lines: Vec<String> = records
        .iter()
        .map(|record| serde_json::to_string(record).unwrap())
        .collect();
    std::fs::write(path, lines.join("\n")).unwrap();
}

/// Contacts, messages, CRM notes and mail in a temporary directory.
fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();

    std::fs::create_dir_all(dir.path().join("contacts/Sources/abc")).unwrap();
    std::fs::write(
        dir.path().join("contacts/main.json"),
        r#"[{"firstName": "Amanda", "lastName": "Jones", "phones": ["(555) 000-1111"]}]"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("contacts/Sources/abc/contacts.json"),
        r#"[{"organization": "Skyways", "phones": ["555-000-9999"]}]"#,
    )
    .unwrap();

    let mut records = vec![
        message(1, AIRLINE, "flight confirmation for your March trip", Direction::Inbound, 10),
        message(2, AIRLINE, "FLIGHT CONFIRMATION attached", Direction::Inbound, 6),
        message(3, AIRLINE, "Your flight confirmation is ABC123", Direction::Inbound, 2),
        message(4, AIRLINE, "confirmation of your flight change", Direction::Inbound, 1),
    ];
    for id in 10..22 {
        records.push(message(id, AMANDA, "Mandy, coffee later?", Direction::Outbound, 3));
    }
    write_messages(&dir.path().join("messages.jsonl"), &records);

    std::fs::write(
        dir.path().join("crm.json"),
        r#"[{"id": "c1", "firstName": "Amanda", "lastName": "Jones",
             "information": [{"type": "phone", "value": "+1 555 000 1111"}],
             "notes": [{"content": "Mandy likes window seats"}]}]"#,
    )
    .unwrap();

    std::fs::write(
        dir.path().join("mail.json"),
        r#"[{"id": "m1", "from": "me@example.com", "to": "Mandy Jones <amanda@example.com>",
             "subject": "Hi Mandy", "body": "Photos attached"}]"#,
    )
    .unwrap();

    dir
}

async fn open(dir: &TempDir) -> Oscar {
    Oscar::builder()
        .with_directory_root(dir.path().join("contacts"))
        .with_messages_path(dir.path().join("messages.jsonl"))
        .with_crm_notes_path(dir.path().join("crm.json"))
        .with_mail_path(dir.path().join("mail.json"), vec!["me@example.com".to_string()])
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_recent_exact_phrase_search() {
    let dir = fixture();
    let oscar = open(&dir).await;

    let response = oscar
        .search(
            SearchRequest::new("flight confirmation")
                .exact_phrase()
                .with_days_back(7),
        )
        .await
        .unwrap();

    assert_eq!(response.status, SearchStatus::Ok);
    let ids: Vec<i64> = response.results.iter().map(|hit| hit.id).collect();
    assert_eq!(ids, vec![3, 2]);
    assert_eq!(response.results[0].text, "Your **flight confirmation** is ABC123");
    assert_eq!(response.results[0].sender, "Skyways");
}

#[tokio::test]
async fn test_resolve_across_every_source() {
    let dir = fixture();
    let oscar = open(&dir).await;

    let stats = oscar.stats().await.unwrap();
    assert_eq!(stats.messages, 16);
    assert_eq!(stats.mail_messages, 1);
    assert_eq!(
        stats.evidence_sources,
        vec![SourceTag::Messages, SourceTag::CrmNotes, SourceTag::Mail]
    );

    let resolved = oscar.resolve("Mandy", true).await.unwrap();
    let best = resolved.best_match.clone().unwrap();
    assert_eq!(best.name, "Amanda Jones");
    assert_eq!(best.confidence, Confidence::High);
    assert_eq!(best.count, 13);
    assert_eq!(best.sources, vec![SourceTag::Messages, SourceTag::CrmNotes]);

    // The mail recipient has no phone in common, so it stays separate.
    assert_eq!(resolved.matches.len(), 2);
    assert_eq!(resolved.matches[1].handles, vec!["amanda@example.com"]);
    assert_eq!(resolved.matches[1].name, "Mandy Jones");
    assert_eq!(resolved.matches[1].confidence, Confidence::Low);
}

#[tokio::test]
async fn test_contact_scoped_search_uses_evidence() {
    let dir = fixture();
    let oscar = open(&dir).await;

    let response = oscar
        .search(SearchRequest::new("coffee").with_contact("Mandy").with_max_results(3))
        .await
        .unwrap();
    let filter = response.contact_filter.clone().unwrap();
    assert_eq!(filter.source, FilterSource::Resolver);
    assert_eq!(filter.name.as_deref(), Some("Amanda Jones"));
    assert_eq!(response.results.len(), 3);
    assert!(response.results.iter().all(|hit| hit.sender == "Me"));
}

#[tokio::test]
async fn test_search_reaches_mail() {
    let dir = fixture();
    let oscar = open(&dir).await;

    let response = oscar.search(SearchRequest::new("photos")).await.unwrap();
    assert!(response.results.is_empty());
    assert_eq!(response.total, 1);
    let hit = &response.mail_results[0];
    assert_eq!(hit.id, "m1");
    assert_eq!(hit.subject, "Hi Mandy");
    assert_eq!(hit.text, "**Photos** attached");
    assert_eq!(hit.sender, "Me");
    assert!(hit.is_from_me);
    assert_eq!(hit.contact.as_deref(), Some("amanda@example.com"));

    let response = oscar
        .search(SearchRequest::new("photos").with_sources(SearchSource::Messages))
        .await
        .unwrap();
    assert_eq!(response.total, 0);
    assert!(response.mail_results.is_empty());
}

#[tokio::test]
async fn test_conversations_through_the_facade() {
    let dir = fixture();
    let oscar = open(&dir).await;

    let conversations = oscar.list_conversations(None).await.unwrap();
    assert_eq!(conversations.len(), 2);
    assert_eq!(conversations[0].contact_name.as_deref(), Some("Skyways"));

    let page = oscar.read_conversation("Amanda", Some(5), None).await.unwrap();
    assert!(page.found);
    assert_eq!(page.messages.len(), 5);
    assert!(page.has_more);

    let context = oscar
        .get_context("Skyways", Some("ABC123"), Some(2), None)
        .await
        .unwrap();
    assert!(context.found_match);
    let ids: Vec<i64> = context.messages.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![2, 3, 4]);
}
