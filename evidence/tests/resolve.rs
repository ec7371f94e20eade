use std::sync::Arc;

use oscar_evidence::{
    Confidence, CrmContact, CrmNote, CrmNotes, EvidenceCollector, EvidenceKind, IdentityResolver,
    MessageRecords, SourceTag,
};
use oscar_identity::{ContactIndex, ContactRecord, DirectorySource, MemoryDirectory};
use oscar_messages::{Direction, MessageArchive, MessageRecord};
use pretty_assertions::assert_eq;

const FIRST: &str = "+15550001111";
const SECOND: &str = "+15550002222";
const BYSTANDER: &str = "+15550003333";

/// 100 messages: 12 sent to the first number mention "Mandy", 2 received
/// from the second number are self-introductions, and the rest is filler
/// to a third number.
fn history() -> MessageArchive {
    let mut records = Vec::new();
    for id in 0..100_i64 {
        let (handle, text, direction) = match id {
            0..12 => (FIRST, format!("Mandy, dinner at {id}?"), Direction::Outbound),
            12..14 => (SECOND, format!("hey, it's Mandy ({id})"), Direction::Inbound),
            _ => (BYSTANDER, format!("ordinary message {id}"), Direction::Outbound),
        };
        records.push(
            MessageRecord::new(id, format!("iMessage;-;{handle}"), text)
                .with_handle(handle)
                .with_direction(direction)
                .with_timestamp(id * 1_000_000_000),
        );
    }
    MessageArchive::from_records("history", records)
}

fn messages_source() -> Arc<EvidenceCollector<MessageRecords>> {
    Arc::new(EvidenceCollector::new(MessageRecords::new(Arc::new(history()))))
}

#[test]
fn test_mentions_rank_the_frequent_counterpart_first() {
    let resolver =
        IdentityResolver::new(Arc::new(ContactIndex::empty())).with_source(messages_source());

    let resolved = resolver.resolve("Mandy", true);

    assert_eq!(resolved.matches.len(), 2);
    let best = resolved.best_match.clone().unwrap();
    assert_eq!(best.handles, vec![FIRST]);
    assert_eq!(best.count, 12);
    assert_eq!(best.confidence, Confidence::High);
    assert_eq!(best.examples.len(), 5);
    assert!(best.examples.iter().all(|e| e.kind == EvidenceKind::Mention));

    let runner_up = &resolved.matches[1];
    assert_eq!(runner_up.handles, vec![SECOND]);
    assert_eq!(runner_up.count, 4);
    assert_eq!(runner_up.confidence, Confidence::Medium);
    assert_eq!(runner_up.examples.len(), 2);
    assert!(
        runner_up
            .examples
            .iter()
            .all(|e| e.kind == EvidenceKind::SelfReference)
    );

    assert_eq!(resolved.handles, vec![FIRST]);
    assert!(resolved.summary.starts_with("\"Mandy\" most likely refers to +15550001111"));
    assert!(resolved.summary.ends_with("Found 2 possible matches."));
}

#[test]
fn test_directory_names_evidence_candidates() {
    let index = Arc::new(ContactIndex::new(vec![Arc::new(MemoryDirectory::new(
        "contacts",
        vec![ContactRecord::named("Amanda", "Jones").with_handle("(555) 000-1111")],
    ))]));
    let resolver = IdentityResolver::new(index).with_source(messages_source());

    // "Mandy" is not a directory term, so only evidence can resolve it.
    let resolved = resolver.resolve("Mandy", false);
    let best = resolved.best_match.unwrap();
    assert_eq!(best.name, "Amanda Jones");
    assert_eq!(best.source, SourceTag::Messages);
}

#[test]
fn test_crm_notes_merge_with_message_evidence() {
    let crm = CrmNotes::from_contacts(
        "crm",
        vec![CrmContact {
            id: "c2".to_string(),
            first_name: Some("Mandy".to_string()),
            last_name: Some("Lee".to_string()),
            phones: vec!["555-000-2222".to_string()],
            notes: (0..9)
                .map(|i| CrmNote {
                    content: format!("Mandy prefers mornings ({i})"),
                    created: Some(1_700_000_000_000 + i),
                })
                .collect(),
            ..CrmContact::default()
        }],
    );
    let crm = Arc::new(crm);
    let index = Arc::new(ContactIndex::new(vec![
        Arc::clone(&crm) as Arc<dyn DirectorySource>,
    ]));
    let resolver = IdentityResolver::new(index)
        .with_source(messages_source())
        .with_source(Arc::new(EvidenceCollector::new(CrmNotes::clone(&crm))));

    let resolved = resolver.resolve("mandy", true);

    // The directory finds "Mandy Lee" directly; message and note evidence
    // for the same number fold into that candidate.
    let best = resolved.best_match.unwrap();
    assert_eq!(best.name, "Mandy Lee");
    assert_eq!(best.source, SourceTag::Directory);
    assert_eq!(
        best.sources,
        vec![SourceTag::Directory, SourceTag::Messages, SourceTag::CrmNotes]
    );
    assert_eq!(best.count, 13);
    assert!(best.handles.contains(&"555-000-2222".to_string()));
    assert!(best.handles.contains(&SECOND.to_string()));
    assert_eq!(resolved.matches.len(), 2);
}
