//! Ledger seam
//!
//! The contract layer is external. Writes are atomic; a write may take a
//! while to become visible to reads, so callers that need to read their own
//! write go through [`wait_until_visible`] instead of sleeping.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use shroud_core::config::LedgerConfig;
use shroud_core::{
    AccessCodeHash, Address, CiphertextHandle, EncryptedPayload, RecordId, RecordKind,
    ShroudError, ShroudResult, Status,
};

/// A record about to be written. Owns the payload so the proof is spent here.
#[derive(Debug)]
pub struct NewRecord {
    pub kind: RecordKind,
    /// Principal the payload was encrypted for
    pub recipient: Address,
    pub payload: EncryptedPayload,
    pub access_hash: Option<AccessCodeHash>,
}

/// A record as read back from the ledger. Input proofs are not stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub id: RecordId,
    pub kind: RecordKind,
    pub recipient: Address,
    /// Ciphertext handles in codec order
    pub handles: Vec<CiphertextHandle>,
    pub access_hash: Option<AccessCodeHash>,
    /// Encrypted feedback, empty until an organization responds
    pub feedback: Vec<CiphertextHandle>,
    /// Readers granted access besides the recipient
    #[serde(default)]
    pub shared_with: Vec<Address>,
    pub submitted_at: u64,
    pub updated_at: u64,
}

impl LedgerRecord {
    pub fn status(&self) -> Option<Status> {
        match &self.kind {
            RecordKind::Report { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Feedback handles, treating an all-zero slot as "no feedback".
    pub fn feedback_handles(&self) -> &[CiphertextHandle] {
        if self.feedback.iter().all(CiphertextHandle::is_zero) {
            &[]
        } else {
            &self.feedback
        }
    }
}

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn write(&self, record: NewRecord) -> ShroudResult<RecordId>;

    async fn read(&self, id: RecordId) -> ShroudResult<Option<LedgerRecord>>;

    async fn find_by_access_hash(&self, hash: &AccessCodeHash) -> ShroudResult<Option<LedgerRecord>>;

    /// Move a report to `status`, optionally attaching encrypted feedback.
    async fn update_status(
        &self,
        id: RecordId,
        status: Status,
        feedback: Option<EncryptedPayload>,
    ) -> ShroudResult<()>;

    /// Swap a record's ciphertext for a freshly encrypted payload. Reports
    /// are immutable and refuse this.
    async fn replace_content(&self, id: RecordId, payload: EncryptedPayload) -> ShroudResult<()>;

    /// Record that `reader` was granted access to `id`.
    async fn share(&self, id: RecordId, reader: Address) -> ShroudResult<()>;

    /// Ids of records whose payload was encrypted for `recipient`.
    async fn records_for(&self, recipient: &Address) -> ShroudResult<Vec<RecordId>>;

    /// Ids of records shared with `reader` by their owners.
    async fn shared_with(&self, reader: &Address) -> ShroudResult<Vec<RecordId>>;
}

/// How often and how long to poll for a write to become visible
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn from_config(config: &LedgerConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.poll_interval_ms),
            timeout: Duration::from_millis(config.visibility_timeout_ms),
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from_config(&LedgerConfig::default())
    }
}

/// Read `id` until the ledger returns it or the policy's timeout elapses.
pub async fn wait_until_visible(
    ledger: &dyn Ledger,
    id: RecordId,
    policy: PollPolicy,
) -> ShroudResult<LedgerRecord> {
    wait_until(ledger, id, policy, |_| true).await
}

/// Read `id` until the returned record satisfies `ready`. Used after updates,
/// where a lagging ledger keeps serving the previous version for a while.
pub async fn wait_until<F>(
    ledger: &dyn Ledger,
    id: RecordId,
    policy: PollPolicy,
    ready: F,
) -> ShroudResult<LedgerRecord>
where
    F: Fn(&LedgerRecord) -> bool + Send,
{
    let poll = async {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            if let Some(record) = ledger.read(id).await?.filter(|r| ready(r)) {
                tracing::debug!(id, attempts, "record visible");
                return Ok(record);
            }
            tokio::time::sleep(policy.interval).await;
        }
    };

    tokio::time::timeout(policy.timeout, poll)
        .await
        .map_err(|_| ShroudError::Timeout {
            operation: "ledger confirmation",
        })?
}
