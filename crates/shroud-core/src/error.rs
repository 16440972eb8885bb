use thiserror::Error;

pub type ShroudResult<T> = Result<T, ShroudError>;

#[derive(Debug, Error)]
pub enum ShroudError {
    #[error("encryption backend unavailable: {0}")]
    EncryptionBackendUnavailable(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("relayer unreachable: {0}")]
    RelayerUnreachable(String),

    #[error("malformed ciphertext handle: {0}")]
    MalformedHandle(String),

    #[error("signer unavailable: {0}")]
    SignerUnavailable(String),

    #[error("signature request rejected by user")]
    UserRejectedSignature,

    /// Lookup miss. Deliberately carries no detail so an unknown code and a
    /// malformed code look the same to the caller.
    #[error("not found")]
    NotFound,

    #[error("secure random source unavailable: {0}")]
    EntropyUnavailable(String),

    #[error("{operation} timed out")]
    Timeout { operation: &'static str },

    #[error("operation cancelled")]
    Cancelled,

    #[error("payload of {units} units exceeds the ledger limit of {max}")]
    PayloadTooLarge { units: usize, max: usize },

    #[error("ledger error: {0}")]
    Ledger(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ShroudError {
    /// Text suitable for showing to the end user.
    pub fn user_message(&self) -> String {
        match self {
            ShroudError::EncryptionBackendUnavailable(_) => {
                "The encryption service could not be reached. Nothing was submitted; please try again.".into()
            }
            ShroudError::AccessDenied(_) => {
                "Access denied: this content is not authorized for your account.".into()
            }
            ShroudError::RelayerUnreachable(_) => {
                "Network error: unable to reach the decryption relayer. Check your connection and try again.".into()
            }
            ShroudError::MalformedHandle(detail) => format!("Stored ciphertext is malformed: {detail}"),
            ShroudError::SignerUnavailable(_) => {
                "No wallet is available to sign the decryption request. Connect your wallet and try again.".into()
            }
            ShroudError::UserRejectedSignature => {
                "The signature request was rejected. Sign the decryption request to continue.".into()
            }
            ShroudError::NotFound => {
                "No record matches this access code. Check your code and try again.".into()
            }
            ShroudError::Timeout { operation } => {
                format!("The {operation} step took too long. Please try again.")
            }
            ShroudError::Cancelled => "The operation was cancelled.".into(),
            ShroudError::PayloadTooLarge { max, .. } => {
                format!("Content is too long to store (limit is {} bytes).", max * 4)
            }
            other => format!("Unexpected error: {other}"),
        }
    }

    /// Whether restarting the whole flow from scratch may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ShroudError::RelayerUnreachable(_) | ShroudError::Timeout { .. }
        )
    }
}
