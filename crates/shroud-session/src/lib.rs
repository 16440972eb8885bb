//! shroud-session: encryption sessions over an external FHE backend
//!
//! - [`backend`]: the `FheBackend` / `EncryptedInput` seam
//! - [`slot`]: process-wide initialize-once backend handle
//! - [`session`]: encrypt units for a recipient, decrypt handles as a signer
//! - [`ledger`]: the `Ledger` seam and poll-until-visible reads
//! - [`records`]: report, note, task, and message workflows
//! - [`memory`]: in-process backend, ledger, and signer

pub mod backend;
pub mod ledger;
pub mod memory;
pub mod progress;
pub mod records;
pub mod session;
pub mod slot;

pub use backend::{ClearValue, EncryptedBatch, EncryptedInput, FheBackend, UserDecryptRequest};
pub use ledger::{wait_until, wait_until_visible, Ledger, LedgerRecord, NewRecord, PollPolicy};
pub use progress::{Progress, Stage};
pub use records::{track, Records, ReportDraft, SubmittedReport};
pub use session::{EncryptionSession, SessionOptions};
pub use slot::{global, BackendSlot};
