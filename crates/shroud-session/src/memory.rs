//! In-process stand-ins for the encryption backend, ledger, and wallet
//!
//! The backend "encrypts" by storing each unit under a random-looking handle
//! and enforces the same ACL rule as the real relayer: only the recipient
//! named at encryption time may decrypt. Used by the demo command and tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use shroud_core::{
    AccessCodeHash, Address, EncryptedPayload, RecordId, RecordKind,
    ShroudError, ShroudResult, Status, HANDLE_SIZE,
};
use shroud_crypto::authorization::now_unix_secs;
use shroud_crypto::{KeySource, Signature, Signer, TypedData};

use crate::backend::{
    ClearValue, EncryptedBatch, EncryptedInput, FheBackend, HandleContractPair, UserDecryptRequest,
};
use crate::ledger::{Ledger, LedgerRecord, NewRecord};

/// Units a ledger record can hold (the contract stores the count as a u8)
pub const MAX_STORED_UNITS: usize = u8::MAX as usize;

/// Failure to inject into [`MemoryBackend`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fault {
    #[default]
    None,
    /// `create_encrypted_input` fails
    Unavailable,
    /// `user_decrypt` fails with a network error
    Unreachable,
    /// `user_decrypt` omits the result for the last handle
    DropResult,
    /// `user_decrypt` returns values above 2^64 as decimal strings
    WideValues,
    /// `encrypt` returns one handle fewer than units added
    ShortBatch,
    /// `user_decrypt` sleeps before answering
    Stall(Duration),
}

#[derive(Debug)]
struct Ciphertext {
    value: u32,
    contract: Address,
    allowed: HashSet<Address>,
}

#[derive(Debug, Default)]
struct BackendState {
    ciphertexts: HashMap<Vec<u8>, Ciphertext>,
    issued: u64,
}

fn lock<T>(mutex: &Mutex<T>) -> ShroudResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| ShroudError::Other(anyhow::anyhow!("in-memory state poisoned")))
}

#[derive(Debug, Clone)]
pub struct MemoryBackend {
    state: Arc<Mutex<BackendState>>,
    width: usize,
    fault: Fault,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_handle_width(HANDLE_SIZE)
    }

    /// Backend whose native handles are `width` bytes (1..=32).
    pub fn with_handle_width(width: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(BackendState::default())),
            width: width.clamp(1, HANDLE_SIZE),
            fault: Fault::None,
        }
    }

    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.fault = fault;
        self
    }

    /// Number of ciphertexts stored so far
    pub fn ciphertext_count(&self) -> ShroudResult<usize> {
        Ok(lock(&self.state)?.ciphertexts.len())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl KeySource for MemoryBackend {}

struct MemoryInput {
    state: Arc<Mutex<BackendState>>,
    width: usize,
    contract: Address,
    recipient: Address,
    values: Vec<u32>,
    short: bool,
}

#[async_trait]
impl EncryptedInput for MemoryInput {
    fn add32(&mut self, value: u32) {
        self.values.push(value);
    }

    async fn encrypt(self: Box<Self>) -> ShroudResult<EncryptedBatch> {
        let mut state = lock(&self.state)?;
        let mut handles = Vec::with_capacity(self.values.len());
        let mut proof = Sha256::new();
        proof.update(self.contract.as_bytes());
        proof.update(self.recipient.as_bytes());

        for value in &self.values {
            state.issued += 1;
            let digest = Sha256::new()
                .chain_update(b"shroud-memory-handle")
                .chain_update(state.issued.to_le_bytes())
                .chain_update(self.contract.as_bytes())
                .chain_update(self.recipient.as_bytes())
                .finalize();
            let handle = digest[..self.width].to_vec();
            proof.update(&handle);
            state.ciphertexts.insert(
                handle.clone(),
                Ciphertext {
                    value: *value,
                    contract: self.contract,
                    allowed: HashSet::from([self.recipient]),
                },
            );
            handles.push(handle);
        }

        if self.short {
            handles.pop();
        }

        Ok(EncryptedBatch {
            handles,
            input_proof: proof.finalize().to_vec(),
        })
    }
}

#[async_trait]
impl FheBackend for MemoryBackend {
    fn handle_width(&self) -> usize {
        self.width
    }

    async fn create_encrypted_input(
        &self,
        contract: Address,
        recipient: Address,
    ) -> ShroudResult<Box<dyn EncryptedInput>> {
        if self.fault == Fault::Unavailable {
            return Err(ShroudError::EncryptionBackendUnavailable(
                "encryption engine failed to load".into(),
            ));
        }
        Ok(Box::new(MemoryInput {
            state: Arc::clone(&self.state),
            width: self.width,
            contract,
            recipient,
            values: Vec::new(),
            short: self.fault == Fault::ShortBatch,
        }))
    }

    async fn user_decrypt(
        &self,
        request: UserDecryptRequest,
    ) -> ShroudResult<HashMap<String, ClearValue>> {
        match self.fault {
            Fault::Stall(delay) => tokio::time::sleep(delay).await,
            Fault::Unreachable => {
                return Err(ShroudError::RelayerUnreachable("connection refused".into()))
            }
            _ => {}
        }

        if request.signature.is_empty() {
            return Err(ShroudError::AccessDenied("request is not signed".into()));
        }
        let start: u64 = request.start_timestamp.parse().unwrap_or(0);
        let days: u64 = request.duration_days.parse().unwrap_or(0);
        if start.saturating_add(days.saturating_mul(86_400)) < now_unix_secs() {
            return Err(ShroudError::AccessDenied("authorization expired".into()));
        }

        let state = lock(&self.state)?;
        let mut out = HashMap::with_capacity(request.pairs.len());
        for pair in &request.pairs {
            if !request.contract_addresses.contains(&pair.contract) {
                return Err(ShroudError::AccessDenied(format!(
                    "{} is outside the signed scope",
                    pair.contract
                )));
            }
            let ct = state
                .ciphertexts
                .get(&pair.handle)
                .filter(|ct| ct.contract == pair.contract)
                .ok_or_else(|| {
                    ShroudError::AccessDenied(format!("unknown handle {}", pair.handle_hex()))
                })?;
            if !ct.allowed.contains(&request.user_address) {
                return Err(ShroudError::AccessDenied(format!(
                    "{} may not decrypt {}",
                    request.user_address,
                    pair.handle_hex()
                )));
            }
            let value = match self.fault {
                Fault::WideValues => {
                    ClearValue::BigUint(((1u128 << 64) + u128::from(ct.value)).to_string())
                }
                _ => ClearValue::Uint(u64::from(ct.value)),
            };
            out.insert(pair.handle_hex(), value);
        }

        if self.fault == Fault::DropResult {
            if let Some(last) = request.pairs.last() {
                out.remove(&last.handle_hex());
            }
        }
        Ok(out)
    }

    async fn allow(&self, pairs: &[HandleContractPair], reader: Address) -> ShroudResult<()> {
        let mut state = lock(&self.state)?;
        for pair in pairs {
            let known = state
                .ciphertexts
                .get(&pair.handle)
                .is_some_and(|ct| ct.contract == pair.contract);
            if !known {
                return Err(ShroudError::AccessDenied(format!(
                    "unknown handle {}",
                    pair.handle_hex()
                )));
            }
        }
        for pair in pairs {
            if let Some(ct) = state.ciphertexts.get_mut(&pair.handle) {
                ct.allowed.insert(reader);
            }
        }
        Ok(())
    }
}

/// How a [`MemorySigner`] answers signature requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerBehavior {
    Sign,
    Reject,
    /// No wallet connected: even `address` fails
    Unavailable,
    /// Sign after a delay
    Stall(Duration),
}

#[derive(Debug, Clone)]
pub struct MemorySigner {
    address: Address,
    behavior: SignerBehavior,
}

impl MemorySigner {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            behavior: SignerBehavior::Sign,
        }
    }

    pub fn with_behavior(mut self, behavior: SignerBehavior) -> Self {
        self.behavior = behavior;
        self
    }
}

#[async_trait]
impl Signer for MemorySigner {
    async fn address(&self) -> ShroudResult<Address> {
        if self.behavior == SignerBehavior::Unavailable {
            return Err(ShroudError::SignerUnavailable("no wallet connected".into()));
        }
        Ok(self.address)
    }

    async fn sign_typed_data(&self, data: &TypedData) -> ShroudResult<Signature> {
        match self.behavior {
            SignerBehavior::Unavailable => {
                return Err(ShroudError::SignerUnavailable("no wallet connected".into()))
            }
            SignerBehavior::Reject => return Err(ShroudError::UserRejectedSignature),
            SignerBehavior::Stall(delay) => tokio::time::sleep(delay).await,
            SignerBehavior::Sign => {}
        }
        let digest = Sha256::new()
            .chain_update(self.address.as_bytes())
            .chain_update(data.to_json()?.as_bytes())
            .finalize();
        Ok(Signature::new(digest.to_vec()))
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    records: BTreeMap<RecordId, LedgerRecord>,
    by_hash: HashMap<AccessCodeHash, RecordId>,
    /// Remaining reads before a fresh write shows up
    pending: HashMap<RecordId, u32>,
    /// Previous version served for the remaining reads after an update
    stale: HashMap<RecordId, (LedgerRecord, u32)>,
    last_id: RecordId,
}

impl LedgerState {
    /// What a read of `id` sees right now. Every read counts against the lag.
    fn observe(&mut self, id: RecordId) -> Option<LedgerRecord> {
        if let Some(remaining) = self.pending.get_mut(&id) {
            *remaining -= 1;
            if *remaining == 0 {
                self.pending.remove(&id);
            }
            return None;
        }
        if let Some((previous, remaining)) = self.stale.get_mut(&id) {
            *remaining -= 1;
            let previous = previous.clone();
            if *remaining == 0 {
                self.stale.remove(&id);
            }
            return Some(previous);
        }
        self.records.get(&id).cloned()
    }

    /// Mutable access to `id` for an update; keeps the old version visible
    /// for `lag` reads.
    fn updating(&mut self, id: RecordId, lag: u32) -> ShroudResult<&mut LedgerRecord> {
        let record = self
            .records
            .get_mut(&id)
            .ok_or_else(|| ShroudError::Ledger(format!("record {id} does not exist")))?;
        if lag > 0 {
            self.stale.entry(id).or_insert_with(|| (record.clone(), lag));
        }
        Ok(record)
    }
}

fn check_payload(payload: &EncryptedPayload) -> ShroudResult<()> {
    let units = payload.unit_count();
    if units > MAX_STORED_UNITS {
        return Err(ShroudError::Ledger(format!(
            "{units} handles exceed the {MAX_STORED_UNITS}-handle record limit"
        )));
    }
    if units > 0 && payload.proof.is_empty() {
        return Err(ShroudError::Ledger("input proof missing".into()));
    }
    Ok(())
}

/// Ledger held in memory, with an optional read lag after each write or
/// update.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: tokio::sync::Mutex<LedgerState>,
    lag: u32,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes stay invisible, and updates stay unapplied, for the next
    /// `reads` reads.
    pub fn with_visibility_lag(reads: u32) -> Self {
        Self {
            state: tokio::sync::Mutex::default(),
            lag: reads,
        }
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn write(&self, record: NewRecord) -> ShroudResult<RecordId> {
        check_payload(&record.payload)?;
        let units = record.payload.unit_count();

        let mut state = self.state.lock().await;
        if let Some(hash) = &record.access_hash {
            if state.by_hash.contains_key(hash) {
                return Err(ShroudError::Ledger("access code already registered".into()));
            }
        }

        state.last_id += 1;
        let id = state.last_id;
        let now = now_unix_secs();
        if let Some(hash) = record.access_hash {
            state.by_hash.insert(hash, id);
        }
        if self.lag > 0 {
            state.pending.insert(id, self.lag);
        }
        state.records.insert(
            id,
            LedgerRecord {
                id,
                kind: record.kind,
                recipient: record.recipient,
                handles: record.payload.handles,
                access_hash: record.access_hash,
                feedback: Vec::new(),
                shared_with: Vec::new(),
                submitted_at: now,
                updated_at: now,
            },
        );
        tracing::debug!(id, units, "record written");
        Ok(id)
    }

    async fn read(&self, id: RecordId) -> ShroudResult<Option<LedgerRecord>> {
        Ok(self.state.lock().await.observe(id))
    }

    async fn find_by_access_hash(&self, hash: &AccessCodeHash) -> ShroudResult<Option<LedgerRecord>> {
        let mut state = self.state.lock().await;
        let Some(id) = state.by_hash.get(hash).copied() else {
            return Ok(None);
        };
        Ok(state.observe(id))
    }

    async fn update_status(
        &self,
        id: RecordId,
        status: Status,
        feedback: Option<EncryptedPayload>,
    ) -> ShroudResult<()> {
        if let Some(payload) = &feedback {
            check_payload(payload)?;
        }
        let mut state = self.state.lock().await;
        let current = match state.records.get(&id).map(|r| &r.kind) {
            Some(RecordKind::Report { status, .. }) => *status,
            Some(other) => {
                return Err(ShroudError::Ledger(format!(
                    "record {id} is a {}, not a report",
                    other.label()
                )))
            }
            None => return Err(ShroudError::Ledger(format!("record {id} does not exist"))),
        };
        if current.is_final() {
            return Err(ShroudError::Ledger(format!(
                "report {id} is {current:?} and accepts no changes"
            )));
        }

        let record = state.updating(id, self.lag)?;
        if let RecordKind::Report { status: current, .. } = &mut record.kind {
            *current = status;
        }
        if let Some(payload) = feedback {
            record.feedback = payload.handles;
        }
        record.updated_at = now_unix_secs();
        tracing::debug!(id, ?status, "report status updated");
        Ok(())
    }

    async fn replace_content(&self, id: RecordId, payload: EncryptedPayload) -> ShroudResult<()> {
        check_payload(&payload)?;
        let mut state = self.state.lock().await;
        if let Some(record) = state.records.get(&id) {
            if record.status().is_some() {
                return Err(ShroudError::Ledger(format!("report {id} is immutable")));
            }
        }

        let record = state.updating(id, self.lag)?;
        record.handles = payload.handles;
        record.updated_at = now_unix_secs();
        tracing::debug!(id, units = record.handles.len(), "record content replaced");
        Ok(())
    }

    async fn share(&self, id: RecordId, reader: Address) -> ShroudResult<()> {
        let mut state = self.state.lock().await;
        let record = state.updating(id, self.lag)?;
        if record.recipient != reader && !record.shared_with.contains(&reader) {
            record.shared_with.push(reader);
            record.updated_at = now_unix_secs();
        }
        tracing::debug!(id, reader = %reader, "record shared");
        Ok(())
    }

    async fn records_for(&self, recipient: &Address) -> ShroudResult<Vec<RecordId>> {
        let state = self.state.lock().await;
        Ok(state
            .records
            .values()
            .filter(|r| &r.recipient == recipient && !state.pending.contains_key(&r.id))
            .map(|r| r.id)
            .collect())
    }

    async fn shared_with(&self, reader: &Address) -> ShroudResult<Vec<RecordId>> {
        let state = self.state.lock().await;
        Ok(state
            .records
            .values()
            .filter(|r| r.shared_with.contains(reader) && !state.pending.contains_key(&r.id))
            .map(|r| r.id)
            .collect())
    }
}
