//! Record workflows built on the session and ledger seams
//!
//! Reports are the anonymous path: the ledger keeps only the access-code
//! hash, and the reporter tracks the report by presenting the code. Notes,
//! tasks, and messages are owned records encrypted for a known address; a
//! note's owner may rewrite it (fresh ciphertext) or share it with another
//! reader. Every write and update is polled until the ledger shows it.

use std::sync::Arc;

use shroud_core::config::LedgerConfig;
use shroud_core::{
    Address, Category, EncryptedPayload, RecordId, RecordKind, Severity, ShroudError,
    ShroudResult, Status,
};
use shroud_crypto::{generate_access_code, AccessCode, Signer};

use crate::ledger::{wait_until, wait_until_visible, Ledger, LedgerRecord, NewRecord, PollPolicy};
use crate::progress::Stage;
use crate::session::EncryptionSession;

/// What a reporter fills in
#[derive(Debug, Clone)]
pub struct ReportDraft {
    /// Organization the report is addressed to; the only party able to read it
    pub organization: Address,
    pub category: Category,
    pub severity: Severity,
    pub content: String,
    /// Throwaway address that may read the organization's feedback
    pub reply_to: Option<Address>,
}

/// Result of a submission. The access code is shown once and then dropped.
#[derive(Debug)]
pub struct SubmittedReport {
    pub id: RecordId,
    pub access_code: AccessCode,
    pub record: LedgerRecord,
}

/// Look up a record by a user-supplied access code.
///
/// The code is hashed locally; only the hash reaches the ledger. Malformed
/// and unknown codes both yield [`ShroudError::NotFound`].
pub async fn track(ledger: &dyn Ledger, code_input: &str) -> ShroudResult<LedgerRecord> {
    let code = AccessCode::parse(code_input)?;
    ledger
        .find_by_access_hash(&code.hash())
        .await?
        .ok_or(ShroudError::NotFound)
}

pub struct Records {
    session: Arc<EncryptionSession>,
    ledger: Arc<dyn Ledger>,
    limits: LedgerConfig,
}

impl Records {
    pub fn new(session: Arc<EncryptionSession>, ledger: Arc<dyn Ledger>, limits: LedgerConfig) -> Self {
        Self {
            session,
            ledger,
            limits,
        }
    }

    pub fn session(&self) -> &EncryptionSession {
        &self.session
    }

    pub fn ledger(&self) -> &dyn Ledger {
        self.ledger.as_ref()
    }

    /// Encrypt a report for its organization and register it under a fresh
    /// access code.
    pub async fn submit_report(&self, draft: ReportDraft) -> ShroudResult<SubmittedReport> {
        let access_code = generate_access_code()?;
        let payload = self.encrypt_checked(&draft.content, draft.organization).await?;

        let kind = RecordKind::Report {
            category: draft.category,
            severity: draft.severity,
            status: Status::Submitted,
            public_notes: String::new(),
            reply_to: draft.reply_to,
        };
        let (id, record) = self
            .store(NewRecord {
                kind,
                recipient: draft.organization,
                payload,
                access_hash: Some(access_code.hash()),
            })
            .await?;

        tracing::info!(id, organization = %draft.organization, "report submitted");
        Ok(SubmittedReport {
            id,
            access_code,
            record,
        })
    }

    pub async fn track(&self, code_input: &str) -> ShroudResult<LedgerRecord> {
        track(self.ledger.as_ref(), code_input).await
    }

    /// Decrypt any record's content as the signer.
    pub async fn read_content(&self, id: RecordId, signer: &dyn Signer) -> ShroudResult<String> {
        let record = self.fetch(id).await?;
        self.session.decrypt_text(&record.handles, signer).await
    }

    /// Decrypt a report; only its organization is authorized.
    pub async fn decrypt_report(&self, id: RecordId, organization: &dyn Signer) -> ShroudResult<String> {
        let record = self.fetch(id).await?;
        if record.status().is_none() {
            return Err(ShroudError::Ledger(format!(
                "record {id} is a {}, not a report",
                record.kind.label()
            )));
        }
        self.session.decrypt_text(&record.handles, organization).await
    }

    /// Move a report forward, optionally encrypting feedback for the reporter.
    ///
    /// Feedback is encrypted for the report's `reply_to` address, or for the
    /// organization itself when the reporter left none.
    pub async fn update_status(
        &self,
        id: RecordId,
        status: Status,
        feedback: Option<&str>,
    ) -> ShroudResult<()> {
        let record = self.fetch(id).await?;
        let RecordKind::Report {
            status: current,
            reply_to,
            ..
        } = &record.kind
        else {
            return Err(ShroudError::Ledger(format!(
                "record {id} is a {}, not a report",
                record.kind.label()
            )));
        };
        if current.is_final() {
            return Err(ShroudError::Ledger(format!(
                "report {id} is {current:?} and accepts no changes"
            )));
        }

        let payload = match feedback {
            Some(text) => {
                let reader = reply_to.unwrap_or(record.recipient);
                Some(self.encrypt_checked(text, reader).await?)
            }
            None => None,
        };
        let expected = payload.as_ref().map(|p| p.handles.clone());

        let progress = self.session.progress();
        progress.report(Stage::Submitting);
        self.ledger.update_status(id, status, payload).await?;

        progress.report(Stage::Confirming);
        wait_until(self.ledger.as_ref(), id, self.poll_policy(), |r| {
            r.status() == Some(status) && expected.as_ref().map_or(true, |h| &r.feedback == h)
        })
        .await?;
        progress.report(Stage::Done);
        tracing::info!(id, ?status, "report status updated");
        Ok(())
    }

    /// Reporter side: read the organization's feedback using the access code.
    ///
    /// Returns `None` while no feedback has been attached.
    pub async fn read_feedback(
        &self,
        code_input: &str,
        signer: &dyn Signer,
    ) -> ShroudResult<Option<String>> {
        let record = self.track(code_input).await?;
        let handles = record.feedback_handles();
        if handles.is_empty() {
            return Ok(None);
        }
        self.session.decrypt_text(handles, signer).await.map(Some)
    }

    pub async fn create_note(
        &self,
        owner: Address,
        title: &str,
        category: &str,
        tags: Vec<String>,
        body: &str,
    ) -> ShroudResult<RecordId> {
        let payload = self.encrypt_checked(body, owner).await?;
        let kind = RecordKind::Note {
            title: title.to_string(),
            category: category.to_string(),
            tags,
        };
        self.store_owned(kind, owner, payload).await
    }

    /// Re-encrypt a note's body for its owner and swap in the new handles.
    ///
    /// Readers the note was shared with are granted access to the new
    /// handles as well. The old handles are never written back.
    pub async fn update_note(&self, id: RecordId, owner: Address, body: &str) -> ShroudResult<()> {
        let record = self.owned_note(id, &owner).await?;
        let payload = self.encrypt_checked(body, owner).await?;
        for reader in &record.shared_with {
            self.session.grant(&payload.handles, *reader).await?;
        }
        let expected = payload.handles.clone();

        let progress = self.session.progress();
        progress.report(Stage::Submitting);
        self.ledger.replace_content(id, payload).await?;

        progress.report(Stage::Confirming);
        wait_until(self.ledger.as_ref(), id, self.poll_policy(), |r| r.handles == expected).await?;
        progress.report(Stage::Done);
        tracing::info!(id, units = expected.len(), "note updated");
        Ok(())
    }

    /// Let `reader` decrypt a note owned by `owner`.
    pub async fn share_note(&self, id: RecordId, owner: Address, reader: Address) -> ShroudResult<()> {
        let record = self.owned_note(id, &owner).await?;
        self.session.grant(&record.handles, reader).await?;

        let progress = self.session.progress();
        progress.report(Stage::Submitting);
        self.ledger.share(id, reader).await?;

        progress.report(Stage::Confirming);
        wait_until(self.ledger.as_ref(), id, self.poll_policy(), |r| {
            r.recipient == reader || r.shared_with.contains(&reader)
        })
        .await?;
        progress.report(Stage::Done);
        tracing::info!(id, reader = %reader, "note shared");
        Ok(())
    }

    pub async fn create_task(&self, owner: Address, title: &str, description: &str) -> ShroudResult<RecordId> {
        let payload = self.encrypt_checked(description, owner).await?;
        let kind = RecordKind::Task {
            title: title.to_string(),
        };
        self.store_owned(kind, owner, payload).await
    }

    /// Drop a message into `recipient`'s inbox.
    pub async fn send_message(
        &self,
        sender: Address,
        recipient: Address,
        inbox_id: u64,
        body: &str,
    ) -> ShroudResult<RecordId> {
        let payload = self.encrypt_checked(body, recipient).await?;
        let kind = RecordKind::Message { inbox_id, sender };
        self.store_owned(kind, recipient, payload).await
    }

    /// Records readable by `reader`, oldest first.
    pub async fn list_for(&self, reader: &Address) -> ShroudResult<Vec<RecordId>> {
        self.ledger.records_for(reader).await
    }

    /// Records other owners have shared with `reader`, oldest first.
    pub async fn shared_with(&self, reader: &Address) -> ShroudResult<Vec<RecordId>> {
        self.ledger.shared_with(reader).await
    }

    fn poll_policy(&self) -> PollPolicy {
        PollPolicy::from_config(&self.limits)
    }

    async fn owned_note(&self, id: RecordId, owner: &Address) -> ShroudResult<LedgerRecord> {
        let record = self.fetch(id).await?;
        if !matches!(record.kind, RecordKind::Note { .. }) {
            return Err(ShroudError::Ledger(format!(
                "record {id} is a {}, not a note",
                record.kind.label()
            )));
        }
        if &record.recipient != owner {
            return Err(ShroudError::AccessDenied(format!("{owner} does not own note {id}")));
        }
        Ok(record)
    }

    async fn encrypt_checked(&self, text: &str, recipient: Address) -> ShroudResult<EncryptedPayload> {
        let units = shroud_codec::encode(text);
        if units.len() > self.limits.max_units {
            return Err(ShroudError::PayloadTooLarge {
                units: units.len(),
                max: self.limits.max_units,
            });
        }
        self.session.encrypt(&units, recipient).await
    }

    async fn store_owned(
        &self,
        kind: RecordKind,
        recipient: Address,
        payload: EncryptedPayload,
    ) -> ShroudResult<RecordId> {
        let label = kind.label();
        let (id, _) = self
            .store(NewRecord {
                kind,
                recipient,
                payload,
                access_hash: None,
            })
            .await?;
        tracing::info!(id, kind = label, "record stored");
        Ok(id)
    }

    async fn store(&self, record: NewRecord) -> ShroudResult<(RecordId, LedgerRecord)> {
        let progress = self.session.progress();
        progress.report(Stage::Submitting);
        let id = self.ledger.write(record).await?;

        progress.report(Stage::Confirming);
        let stored = wait_until_visible(self.ledger.as_ref(), id, self.poll_policy()).await?;
        progress.report(Stage::Done);
        Ok((id, stored))
    }

    async fn fetch(&self, id: RecordId) -> ShroudResult<LedgerRecord> {
        self.session.progress().report(Stage::Fetching);
        self.ledger
            .read(id)
            .await?
            .ok_or_else(|| ShroudError::Ledger(format!("record {id} does not exist")))
    }
}
