//! Dependency artifact verification.
//!
//! Before a downloaded artifact is trusted, it is checked against the
//! project's verification metadata:
//! - [`ChecksumService`]: md5/sha1/sha256/sha512 digests of artifact files
//! - [`SignatureVerificationService`]: detached-signature verification
//!   against a trusted/ignored key set
//! - [`DependencyVerifier`]: the per-artifact decision procedure, built from
//!   the persisted `verification-metadata.xml` document
//! - [`VerificationCoordinator`]: queues artifact events from the fetch
//!   layer, runs verification concurrently and reports aggregated failures
//!   at checkpoints
//! - [`WriteVerificationFile`]: the regeneration mode that produces or
//!   merge-updates the verification document
//!
//! Verification failures (checksum mismatches, signature problems, missing
//! records) are collected and reported together; infrastructure errors
//! ([`VerifyError`]) are fatal immediately.

mod checksum;
mod coordinator;
mod error;
mod metadata;
mod report;
mod signature;
mod verifier;
mod writer;
pub mod xml;

pub use checksum::{Checksum, ChecksumKind, ChecksumService, UnknownChecksumKind};
pub use coordinator::{VerificationCoordinator, VerificationMode};
pub use error::{Result, VerifyError};
pub use metadata::{
    ArtifactVerificationMetadata, ComponentVerificationMetadata,
    DependencyVerificationConfiguration, DependencyVerifierBuilder, IgnoredKey, TrustedKey,
    VerificationCoordinates,
};
pub use signature::{
    key_id, Keyring, SignatureError, SignatureVerificationResult, SignatureVerificationService,
};
pub use verifier::{ArtifactKind, DependencyVerifier, VerificationFailure};
pub use writer::{WriteKind, WriteSummary, WriteVerificationFile};
