//! Encryption session: units in, handles out, and back again
//!
//! Encrypt:
//! ```text
//! units ─▶ create_encrypted_input(contract, recipient) ─▶ add32 × N ─▶ encrypt()
//!       ─▶ EncryptedPayload { handles (bytes32, in unit order), proof }
//! ```
//!
//! Decrypt:
//! ```text
//! handles ─▶ native width ─▶ build_token + sign ─▶ user_decrypt (one batch)
//!         ─▶ look up each handle in input order ─▶ units
//! ```
//!
//! Either the whole batch succeeds or nothing is returned. Every backend and
//! signer call is bounded by the configured timeout and can be cancelled.
//! Nothing is retried.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use shroud_core::config::ShroudConfig;
use shroud_core::hex::pad_handle_hex;
use shroud_core::{Address, CiphertextHandle, EncryptedPayload, InputProof, ShroudError, ShroudResult};
use shroud_crypto::{build_token, sign, AuthorizationPolicy, Signer};

use crate::backend::{ClearValue, FheBackend, HandleContractPair, UserDecryptRequest};
use crate::progress::{Progress, Stage};
use crate::slot::BackendSlot;

/// Per-session settings
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Contract every encrypted batch is bound to
    pub contract: Address,
    /// Bound on each backend or signer call
    pub timeout: Duration,
    pub policy: AuthorizationPolicy,
}

impl SessionOptions {
    pub fn from_config(config: &ShroudConfig) -> Self {
        Self {
            contract: config.backend.contract_address,
            timeout: Duration::from_secs(config.backend.timeout_secs),
            policy: AuthorizationPolicy::from_config(&config.authorization, &config.backend),
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&ShroudConfig::default())
    }
}

pub struct EncryptionSession {
    backend: Arc<dyn FheBackend>,
    options: SessionOptions,
    progress: Progress,
}

impl EncryptionSession {
    pub fn new(backend: Arc<dyn FheBackend>, options: SessionOptions) -> Self {
        Self {
            backend,
            options,
            progress: Progress::none(),
        }
    }

    /// Build a session on the backend held in `slot`, initializing it if needed.
    pub async fn from_slot<F, Fut>(
        slot: &BackendSlot,
        init: F,
        options: SessionOptions,
    ) -> ShroudResult<Self>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ShroudResult<Arc<dyn FheBackend>>>,
    {
        let backend = slot.init(init).await?;
        Ok(Self::new(backend, options))
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub fn contract(&self) -> Address {
        self.options.contract
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Encrypt `units` for `recipient` as one batch.
    ///
    /// The recipient is fixed here; only that principal can later decrypt.
    pub async fn encrypt(&self, units: &[u32], recipient: Address) -> ShroudResult<EncryptedPayload> {
        self.encrypt_with_cancel(units, recipient, &CancellationToken::new())
            .await
    }

    /// Like [`encrypt`](Self::encrypt), abandoning the batch when `cancel` fires.
    pub async fn encrypt_with_cancel(
        &self,
        units: &[u32],
        recipient: Address,
        cancel: &CancellationToken,
    ) -> ShroudResult<EncryptedPayload> {
        self.progress.report(Stage::Initializing);
        let mut input = self
            .guard(
                cancel,
                "encryption setup",
                self.backend
                    .create_encrypted_input(self.options.contract, recipient),
            )
            .await
            .map_err(unavailable)?;

        self.progress.report(Stage::Encrypting);
        for unit in units {
            input.add32(*unit);
        }
        let batch = self
            .guard(cancel, "encryption", input.encrypt())
            .await
            .map_err(unavailable)?;

        if batch.handles.len() != units.len() {
            return Err(ShroudError::EncryptionBackendUnavailable(format!(
                "backend returned {} handles for {} units",
                batch.handles.len(),
                units.len()
            )));
        }
        let handles = batch
            .handles
            .iter()
            .map(|raw| CiphertextHandle::from_backend_bytes(raw))
            .collect::<ShroudResult<Vec<_>>>()?;

        tracing::info!(
            units = units.len(),
            recipient = %recipient,
            contract = %self.options.contract,
            "content encrypted"
        );
        self.progress.report(Stage::Done);
        Ok(EncryptedPayload {
            handles,
            proof: InputProof::new(batch.input_proof),
        })
    }

    /// Decrypt `handles` stored under `contract` as the signer's account.
    pub async fn decrypt(
        &self,
        handles: &[CiphertextHandle],
        contract: Address,
        signer: &dyn Signer,
    ) -> ShroudResult<Vec<u32>> {
        self.decrypt_with_cancel(handles, contract, signer, &CancellationToken::new())
            .await
    }

    /// Like [`decrypt`](Self::decrypt), abandoning the attempt when `cancel` fires.
    ///
    /// The token and its keypair are dropped with the attempt; a new call
    /// builds fresh ones.
    pub async fn decrypt_with_cancel(
        &self,
        handles: &[CiphertextHandle],
        contract: Address,
        signer: &dyn Signer,
        cancel: &CancellationToken,
    ) -> ShroudResult<Vec<u32>> {
        if handles.is_empty() {
            return Ok(Vec::new());
        }

        let pairs = native_pairs(handles, contract, self.backend.handle_width())?;

        self.progress.report(Stage::Signing);
        let request = build_token(self.backend.as_ref(), &[contract], &self.options.policy)?;
        let token = self.guard(cancel, "signature", sign(request, signer)).await?;
        let requester = token.signer;

        self.progress.report(Stage::Requesting);
        let results = self
            .guard(
                cancel,
                "user decryption",
                self.backend.user_decrypt(UserDecryptRequest::new(pairs.clone(), token)),
            )
            .await?;

        self.progress.report(Stage::Decrypting);
        let units = collect_in_order(&results, handles, &pairs)?;
        tracing::info!(units = units.len(), requester = %requester, "content decrypted");
        self.progress.report(Stage::Done);
        Ok(units)
    }

    pub async fn encrypt_text(&self, text: &str, recipient: Address) -> ShroudResult<EncryptedPayload> {
        self.encrypt(&shroud_codec::encode(text), recipient).await
    }

    /// Decrypt handles bound to this session's contract and decode them to text.
    pub async fn decrypt_text(
        &self,
        handles: &[CiphertextHandle],
        signer: &dyn Signer,
    ) -> ShroudResult<String> {
        let units = self.decrypt(handles, self.options.contract, signer).await?;
        Ok(shroud_codec::decode(&units))
    }

    /// Let `reader` decrypt `handles` (bound to this session's contract) in
    /// addition to the recipient they were encrypted for.
    pub async fn grant(&self, handles: &[CiphertextHandle], reader: Address) -> ShroudResult<()> {
        if handles.is_empty() {
            return Ok(());
        }
        let pairs = native_pairs(handles, self.options.contract, self.backend.handle_width())?;
        self.guard(
            &CancellationToken::new(),
            "access grant",
            self.backend.allow(&pairs, reader),
        )
        .await?;
        tracing::info!(handles = handles.len(), reader = %reader, "decryption access granted");
        Ok(())
    }

    async fn guard<F, T>(
        &self,
        cancel: &CancellationToken,
        operation: &'static str,
        future: F,
    ) -> ShroudResult<T>
    where
        F: Future<Output = ShroudResult<T>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!(operation, "cancelled");
                Err(ShroudError::Cancelled)
            }
            result = with_timeout(self.options.timeout, future) => match result {
                Ok(inner) => inner,
                Err(_) => {
                    tracing::warn!(operation, timeout = ?self.options.timeout, "timed out");
                    Err(ShroudError::Timeout { operation })
                }
            },
        }
    }
}

impl std::fmt::Debug for EncryptionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionSession")
            .field("options", &self.options)
            .field("progress", &self.progress)
            .finish_non_exhaustive()
    }
}

async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T, tokio::time::error::Elapsed>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future).await
}

/// Encryption-side failures that are not already classified become
/// `EncryptionBackendUnavailable`, so callers see one error for "nothing
/// was encrypted".
fn unavailable(err: ShroudError) -> ShroudError {
    match err {
        ShroudError::EncryptionBackendUnavailable(_)
        | ShroudError::Timeout { .. }
        | ShroudError::Cancelled => err,
        other => ShroudError::EncryptionBackendUnavailable(other.to_string()),
    }
}

fn native_pairs(
    handles: &[CiphertextHandle],
    contract: Address,
    width: usize,
) -> ShroudResult<Vec<HandleContractPair>> {
    handles
        .iter()
        .map(|h| {
            Ok(HandleContractPair {
                handle: h.to_native(width)?,
                contract,
            })
        })
        .collect()
}

fn collect_in_order(
    results: &HashMap<String, ClearValue>,
    handles: &[CiphertextHandle],
    pairs: &[HandleContractPair],
) -> ShroudResult<Vec<u32>> {
    let normalized: HashMap<String, &ClearValue> = results
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v))
        .collect();

    handles
        .iter()
        .zip(pairs)
        .map(|(handle, pair)| {
            let value = normalized
                .get(&pair.handle_hex())
                .or_else(|| normalized.get(&pad_handle_hex(&pair.handle_hex())))
                .ok_or_else(|| {
                    ShroudError::AccessDenied(format!("relayer returned no value for {handle}"))
                })?;
            value.to_unit()
        })
        .collect()
}
