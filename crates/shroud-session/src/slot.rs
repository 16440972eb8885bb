//! Process-wide encryption backend handle
//!
//! Initialized once and reused. The async mutex makes concurrent first calls
//! wait for a single initializer instead of racing to build two backends.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;

use shroud_core::{ShroudError, ShroudResult};

use crate::backend::FheBackend;

pub struct BackendSlot {
    inner: Mutex<Option<Arc<dyn FheBackend>>>,
}

static GLOBAL: BackendSlot = BackendSlot::new();

/// The slot shared by the whole process.
pub fn global() -> &'static BackendSlot {
    &GLOBAL
}

impl BackendSlot {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::const_new(None),
        }
    }

    /// Return the backend, running `init` only if none is stored yet.
    ///
    /// A failed initializer leaves the slot empty and is reported as
    /// `EncryptionBackendUnavailable`. Nothing is retried here.
    pub async fn init<F, Fut>(&self, init: F) -> ShroudResult<Arc<dyn FheBackend>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ShroudResult<Arc<dyn FheBackend>>>,
    {
        let mut guard = self.inner.lock().await;
        if let Some(backend) = guard.as_ref() {
            return Ok(Arc::clone(backend));
        }

        tracing::info!("initializing encryption backend");
        let backend = init().await.map_err(|e| match e {
            ShroudError::EncryptionBackendUnavailable(_) => e,
            other => ShroudError::EncryptionBackendUnavailable(other.to_string()),
        })?;
        *guard = Some(Arc::clone(&backend));
        tracing::info!("encryption backend ready");
        Ok(backend)
    }

    pub async fn get(&self) -> Option<Arc<dyn FheBackend>> {
        self.inner.lock().await.clone()
    }

    /// Drop the stored backend so the next `init` builds a new one.
    pub async fn reset(&self) {
        if self.inner.lock().await.take().is_some() {
            tracing::debug!("encryption backend slot reset");
        }
    }

    pub async fn is_initialized(&self) -> bool {
        self.inner.lock().await.is_some()
    }
}

impl Default for BackendSlot {
    fn default() -> Self {
        Self::new()
    }
}
