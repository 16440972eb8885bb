use std::sync::Arc;

use tokio::sync::watch;

/// Coarse milestones of an encrypt or decrypt flow. Advisory only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Initializing,
    Encrypting,
    Submitting,
    Confirming,
    Fetching,
    Signing,
    Requesting,
    Decrypting,
    Done,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Initializing => "initializing encryption",
            Stage::Encrypting => "encrypting content",
            Stage::Submitting => "submitting to ledger",
            Stage::Confirming => "waiting for confirmation",
            Stage::Fetching => "fetching ciphertext",
            Stage::Signing => "waiting for signature",
            Stage::Requesting => "requesting decryption",
            Stage::Decrypting => "decoding content",
            Stage::Done => "done",
        }
    }
}

/// Publishes stages to the log and, optionally, to a watch channel.
#[derive(Clone, Default)]
pub struct Progress {
    sender: Option<Arc<watch::Sender<Stage>>>,
}

impl Progress {
    /// Log-only progress
    pub fn none() -> Self {
        Self::default()
    }

    pub fn channel() -> (Self, watch::Receiver<Stage>) {
        let (tx, rx) = watch::channel(Stage::Initializing);
        (
            Self {
                sender: Some(Arc::new(tx)),
            },
            rx,
        )
    }

    pub fn report(&self, stage: Stage) {
        tracing::info!(stage = stage.label(), "progress");
        if let Some(tx) = &self.sender {
            tx.send_replace(stage);
        }
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("subscribed", &self.sender.is_some())
            .finish()
    }
}
