use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, VerifyError>;

/// Infrastructure errors raised by the verification engine.
///
/// These are distinct from [`crate::VerificationFailure`]s: a failure is a
/// verification *outcome* that is collected and reported at a checkpoint,
/// while these errors are fatal immediately and never retried.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to read verification metadata from {path}: {message}")]
    InvalidMetadata { path: PathBuf, message: String },

    #[error("invalid keyring file {path}: {message}")]
    InvalidKeyring { path: PathBuf, message: String },

    #[error("invalid signature file {path}: {message}")]
    InvalidSignatureFile { path: PathBuf, message: String },

    #[error("invalid coordinate pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("signature verification service has been stopped")]
    ServiceStopped,

    #[error("generating a verification file with signature verification requires at least one checksum kind as fallback")]
    SignaturesRequireChecksumFallback,

    #[error("{report}")]
    VerificationFailed { report: String },
}
