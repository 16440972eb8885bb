use std::sync::Arc;
use std::time::Duration;

use shroud_core::config::LedgerConfig;
use shroud_core::{Address, Category, RecordKind, Severity, ShroudError, Status};
use shroud_session::memory::{MemoryBackend, MemoryLedger, MemorySigner};
use shroud_session::{
    track, wait_until_visible, EncryptionSession, Ledger, PollPolicy, Records, ReportDraft,
    SessionOptions,
};

fn addr(n: u8) -> Address {
    Address::from_bytes([n; 20])
}

const ORG: u8 = 0x02;
const REPLY: u8 = 0x05;
const ALICE: u8 = 0x0a;
const BOB: u8 = 0x0b;
const CAROL: u8 = 0x0c;

fn limits() -> LedgerConfig {
    LedgerConfig {
        poll_interval_ms: 5,
        visibility_timeout_ms: 2_000,
        max_units: 255,
    }
}

fn records_on(ledger: Arc<MemoryLedger>) -> Records {
    let options = SessionOptions {
        contract: addr(0xc0),
        ..SessionOptions::default()
    };
    let session = EncryptionSession::new(Arc::new(MemoryBackend::new()), options);
    Records::new(Arc::new(session), ledger, limits())
}

fn draft(content: &str, reply_to: Option<Address>) -> ReportDraft {
    ReportDraft {
        organization: addr(ORG),
        category: Category::Fraud,
        severity: Severity::High,
        content: content.to_string(),
        reply_to,
    }
}

#[tokio::test]
async fn report_lifecycle() {
    let records = records_on(Arc::new(MemoryLedger::new()));
    let org = MemorySigner::new(addr(ORG));
    let reporter = MemorySigner::new(addr(REPLY));

    // Submit: only the hash of the code reaches the ledger
    let submitted = records
        .submit_report(draft("Invoices are being double-billed.", Some(addr(REPLY))))
        .await
        .unwrap();
    let code = submitted.access_code.expose().to_string();
    assert_eq!(submitted.record.access_hash, Some(submitted.access_code.hash()));

    // Track by code
    let tracked = records.track(&code).await.unwrap();
    assert_eq!(tracked.id, submitted.id);
    assert_eq!(tracked.status(), Some(Status::Submitted));
    assert_eq!(records.read_feedback(&code, &reporter).await.unwrap(), None);

    // Organization reads the report
    let content = records.decrypt_report(submitted.id, &org).await.unwrap();
    assert_eq!(content, "Invoices are being double-billed.");

    // Organization responds
    records
        .update_status(submitted.id, Status::Investigating, Some("We are looking into it."))
        .await
        .unwrap();
    let tracked = records.track(&code).await.unwrap();
    assert_eq!(tracked.status(), Some(Status::Investigating));

    // Reporter reads feedback with the code and their reply address
    let feedback = records.read_feedback(&code, &reporter).await.unwrap();
    assert_eq!(feedback.as_deref(), Some("We are looking into it."));
}

#[tokio::test]
async fn unknown_and_malformed_codes_look_the_same() {
    let ledger = Arc::new(MemoryLedger::new());
    let records = records_on(ledger.clone());
    records.submit_report(draft("report", None)).await.unwrap();

    for input in ["00000000000000000000000000000000", "not a code", ""] {
        let err = track(ledger.as_ref(), input).await.unwrap_err();
        assert!(matches!(err, ShroudError::NotFound), "{input:?}");
        assert_eq!(
            err.user_message(),
            "No record matches this access code. Check your code and try again."
        );
    }
}

#[tokio::test]
async fn tracking_tolerates_case_and_whitespace() {
    let records = records_on(Arc::new(MemoryLedger::new()));
    let submitted = records.submit_report(draft("report", None)).await.unwrap();
    let shouted = format!("  {}  ", submitted.access_code.expose().to_uppercase());

    let tracked = records.track(&shouted).await.unwrap();
    assert_eq!(tracked.id, submitted.id);
}

#[tokio::test]
async fn outsider_cannot_decrypt_report() {
    let records = records_on(Arc::new(MemoryLedger::new()));
    let submitted = records.submit_report(draft("secret", None)).await.unwrap();

    let result = records
        .decrypt_report(submitted.id, &MemorySigner::new(addr(BOB)))
        .await;
    assert!(matches!(result, Err(ShroudError::AccessDenied(_))));
}

#[tokio::test]
async fn feedback_without_reply_address_stays_with_org() {
    let records = records_on(Arc::new(MemoryLedger::new()));
    let submitted = records.submit_report(draft("report", None)).await.unwrap();
    let code = submitted.access_code.expose().to_string();

    records
        .update_status(submitted.id, Status::UnderReview, Some("noted"))
        .await
        .unwrap();

    let outsider = records
        .read_feedback(&code, &MemorySigner::new(addr(BOB)))
        .await;
    assert!(matches!(outsider, Err(ShroudError::AccessDenied(_))));

    let org = records
        .read_feedback(&code, &MemorySigner::new(addr(ORG)))
        .await
        .unwrap();
    assert_eq!(org.as_deref(), Some("noted"));
}

#[tokio::test]
async fn closed_reports_reject_updates() {
    let records = records_on(Arc::new(MemoryLedger::new()));
    let submitted = records.submit_report(draft("report", None)).await.unwrap();

    records
        .update_status(submitted.id, Status::Closed, None)
        .await
        .unwrap();
    let err = records
        .update_status(submitted.id, Status::Investigating, Some("too late"))
        .await
        .unwrap_err();
    assert!(matches!(err, ShroudError::Ledger(_)));
}

#[tokio::test]
async fn oversized_content_is_refused_before_encryption() {
    let records = records_on(Arc::new(MemoryLedger::new()));
    let content = "x".repeat(255 * 4 + 1);

    let err = records.submit_report(draft(&content, None)).await.unwrap_err();
    assert!(matches!(
        err,
        ShroudError::PayloadTooLarge {
            units: 256,
            max: 255
        }
    ));

    // The largest payload that fits is accepted
    let content = "x".repeat(255 * 4);
    assert!(records.submit_report(draft(&content, None)).await.is_ok());
}

#[tokio::test]
async fn submit_waits_for_lagging_ledger() {
    let ledger = Arc::new(MemoryLedger::with_visibility_lag(3));
    let records = records_on(ledger.clone());

    let submitted = records.submit_report(draft("eventually visible", None)).await.unwrap();
    assert_eq!(submitted.record.id, submitted.id);
    assert!(ledger.read(submitted.id).await.unwrap().is_some());
}

#[tokio::test]
async fn visibility_wait_gives_up() {
    let ledger = MemoryLedger::new();
    let policy = PollPolicy {
        interval: Duration::from_millis(5),
        timeout: Duration::from_millis(30),
    };

    let err = wait_until_visible(&ledger, 999, policy).await.unwrap_err();
    assert!(matches!(err, ShroudError::Timeout { .. }));
}

#[tokio::test]
async fn notes_tasks_and_messages_belong_to_their_reader() {
    let records = records_on(Arc::new(MemoryLedger::new()));
    let alice = MemorySigner::new(addr(ALICE));
    let bob = MemorySigner::new(addr(BOB));

    let note = records
        .create_note(addr(ALICE), "Groceries", "personal", vec!["home".into()], "milk, eggs 🥚")
        .await
        .unwrap();
    let task = records
        .create_task(addr(ALICE), "Quarterly review", "prepare slides")
        .await
        .unwrap();
    let message = records
        .send_message(addr(ALICE), addr(BOB), 7, "see you at noon")
        .await
        .unwrap();

    assert_eq!(records.read_content(note, &alice).await.unwrap(), "milk, eggs 🥚");
    assert_eq!(records.read_content(task, &alice).await.unwrap(), "prepare slides");
    assert_eq!(records.read_content(message, &bob).await.unwrap(), "see you at noon");
    assert!(matches!(
        records.read_content(note, &bob).await,
        Err(ShroudError::AccessDenied(_))
    ));

    assert_eq!(records.list_for(&addr(ALICE)).await.unwrap(), vec![note, task]);
    assert_eq!(records.list_for(&addr(BOB)).await.unwrap(), vec![message]);

    let stored = records.ledger().read(message).await.unwrap().unwrap();
    assert_eq!(
        stored.kind,
        RecordKind::Message {
            inbox_id: 7,
            sender: addr(ALICE)
        }
    );
}

#[tokio::test]
async fn status_updates_only_apply_to_reports() {
    let records = records_on(Arc::new(MemoryLedger::new()));
    let task = records
        .create_task(addr(ALICE), "title", "body")
        .await
        .unwrap();

    let err = records
        .update_status(task, Status::Resolved, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ShroudError::Ledger(_)));
}

#[tokio::test]
async fn empty_report_round_trips() {
    let records = records_on(Arc::new(MemoryLedger::new()));
    let submitted = records.submit_report(draft("", None)).await.unwrap();
    assert!(submitted.record.handles.is_empty());

    let content = records
        .decrypt_report(submitted.id, &MemorySigner::new(addr(ORG)))
        .await
        .unwrap();
    assert_eq!(content, "");
}

#[tokio::test]
async fn status_update_is_visible_to_tracking_on_lagging_ledger() {
    let ledger = Arc::new(MemoryLedger::with_visibility_lag(3));
    let records = records_on(ledger.clone());
    let submitted = records.submit_report(draft("report", Some(addr(REPLY)))).await.unwrap();
    let code = submitted.access_code.expose().to_string();

    records
        .update_status(submitted.id, Status::Investigating, Some("on it"))
        .await
        .unwrap();

    let tracked = records.track(&code).await.unwrap();
    assert_eq!(tracked.status(), Some(Status::Investigating));
    let feedback = records
        .read_feedback(&code, &MemorySigner::new(addr(REPLY)))
        .await
        .unwrap();
    assert_eq!(feedback.as_deref(), Some("on it"));
}

#[tokio::test]
async fn shared_note_is_readable_by_its_reader_only() {
    let records = records_on(Arc::new(MemoryLedger::new()));
    let note = records
        .create_note(addr(ALICE), "Plan", "work", vec![], "ship on friday")
        .await
        .unwrap();

    records.share_note(note, addr(ALICE), addr(BOB)).await.unwrap();

    let bob = MemorySigner::new(addr(BOB));
    assert_eq!(records.read_content(note, &bob).await.unwrap(), "ship on friday");
    assert!(matches!(
        records.read_content(note, &MemorySigner::new(addr(CAROL))).await,
        Err(ShroudError::AccessDenied(_))
    ));
    assert_eq!(records.shared_with(&addr(BOB)).await.unwrap(), vec![note]);
    assert!(records.shared_with(&addr(CAROL)).await.unwrap().is_empty());
    assert_eq!(records.list_for(&addr(BOB)).await.unwrap(), Vec::<u64>::new());
}

#[tokio::test]
async fn updated_note_gets_fresh_handles() {
    let records = records_on(Arc::new(MemoryLedger::new()));
    let alice = MemorySigner::new(addr(ALICE));
    let note = records
        .create_note(addr(ALICE), "Draft", "personal", vec![], "first version")
        .await
        .unwrap();
    records.share_note(note, addr(ALICE), addr(BOB)).await.unwrap();
    let before = records.ledger().read(note).await.unwrap().unwrap().handles;

    records
        .update_note(note, addr(ALICE), "second version, a little longer")
        .await
        .unwrap();

    let after = records.ledger().read(note).await.unwrap().unwrap().handles;
    assert!(after.iter().all(|h| !before.contains(h)));
    assert_eq!(
        records.read_content(note, &alice).await.unwrap(),
        "second version, a little longer"
    );
    // Shares carry over to the new ciphertext
    assert_eq!(
        records
            .read_content(note, &MemorySigner::new(addr(BOB)))
            .await
            .unwrap(),
        "second version, a little longer"
    );
}

#[tokio::test]
async fn note_update_waits_for_lagging_ledger() {
    let records = records_on(Arc::new(MemoryLedger::with_visibility_lag(2)));
    let note = records
        .create_note(addr(ALICE), "t", "c", vec![], "old")
        .await
        .unwrap();

    records.update_note(note, addr(ALICE), "new").await.unwrap();
    assert_eq!(
        records
            .read_content(note, &MemorySigner::new(addr(ALICE)))
            .await
            .unwrap(),
        "new"
    );
}

#[tokio::test]
async fn only_the_owner_can_update_or_share_a_note() {
    let records = records_on(Arc::new(MemoryLedger::new()));
    let note = records
        .create_note(addr(ALICE), "t", "c", vec![], "mine")
        .await
        .unwrap();
    let task = records
        .create_task(addr(ALICE), "title", "body")
        .await
        .unwrap();

    assert!(matches!(
        records.share_note(note, addr(BOB), addr(BOB)).await,
        Err(ShroudError::AccessDenied(_))
    ));
    assert!(matches!(
        records.update_note(note, addr(BOB), "hijacked").await,
        Err(ShroudError::AccessDenied(_))
    ));
    assert!(matches!(
        records.update_note(task, addr(ALICE), "not a note").await,
        Err(ShroudError::Ledger(_))
    ));
    assert_eq!(
        records
            .read_content(note, &MemorySigner::new(addr(ALICE)))
            .await
            .unwrap(),
        "mine"
    );
}

#[tokio::test]
async fn reports_cannot_have_their_content_replaced() {
    let records = records_on(Arc::new(MemoryLedger::new()));
    let submitted = records.submit_report(draft("original", None)).await.unwrap();
    let payload = records
        .session()
        .encrypt_text("rewritten", addr(ORG))
        .await
        .unwrap();

    let err = records
        .ledger()
        .replace_content(submitted.id, payload)
        .await
        .unwrap_err();
    assert!(matches!(err, ShroudError::Ledger(_)));
}
