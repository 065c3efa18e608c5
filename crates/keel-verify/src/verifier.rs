use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::Path;

use keel_ids::{ModuleComponentArtifactIdentifier, ModuleComponentIdentifier};

use crate::checksum::{ChecksumKind, ChecksumService};
use crate::error::Result;
use crate::metadata::{
    ArtifactVerificationMetadata, ComponentVerificationMetadata,
    DependencyVerificationConfiguration,
};
use crate::signature::{SignatureError, SignatureVerificationService};

/// What kind of file is being verified. Metadata files (poms, module
/// descriptors) can be exempted from verification by configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Metadata,
    Regular,
}

/// A verification outcome for one artifact. Failures are collected, not
/// thrown: the coordinator aggregates them and decides at a checkpoint
/// whether the build dies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerificationFailure {
    /// The artifact has no (or no usable) checksums in the verification
    /// metadata.
    MissingChecksums,
    /// The artifact file disappeared before it could be verified.
    DeletedArtifact,
    ChecksumMismatch {
        kind: ChecksumKind,
        expected: String,
        actual: String,
    },
    SignatureFailure {
        errors: BTreeMap<String, SignatureError>,
    },
    /// Signature verification is enabled but no signature file exists.
    MissingSignature,
    /// Every signature on the artifact was made with a deliberately ignored
    /// key.
    OnlyIgnoredKeys,
}

impl VerificationFailure {
    /// Fatal failures block the build unless lenient mode is active.
    /// `OnlyIgnoredKeys` is advisory: the keys were ignored by explicit
    /// configuration, so it is surfaced without blocking.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, VerificationFailure::OnlyIgnoredKeys)
    }
}

impl fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationFailure::MissingChecksums => {
                write!(f, "checksums are missing from verification metadata")
            }
            VerificationFailure::DeletedArtifact => {
                write!(f, "the artifact file has been deleted from the local cache")
            }
            VerificationFailure::ChecksumMismatch {
                kind,
                expected,
                actual,
            } => write!(
                f,
                "expected a '{kind}' checksum of '{expected}' but was '{actual}'"
            ),
            VerificationFailure::SignatureFailure { errors } => {
                write!(f, "signature verification failed: ")?;
                let mut first = true;
                for (key_id, error) in errors {
                    if !first {
                        write!(f, "; ")?;
                    }
                    first = false;
                    write!(f, "key '{key_id}': {}", error.message())?;
                }
                Ok(())
            }
            VerificationFailure::MissingSignature => write!(f, "the signature file is missing"),
            VerificationFailure::OnlyIgnoredKeys => write!(
                f,
                "the artifact was signed with ignored keys only; checksum verification was used instead"
            ),
        }
    }
}

/// The immutable per-build verification snapshot: global policy plus every
/// component's expected checksums and keys. Built once from the verification
/// document and queried concurrently by verification workers.
#[derive(Debug)]
pub struct DependencyVerifier {
    configuration: DependencyVerificationConfiguration,
    components: HashMap<ModuleComponentIdentifier, ComponentVerificationMetadata>,
    top_level_comments: Vec<String>,
}

impl DependencyVerifier {
    pub(crate) fn new(
        configuration: DependencyVerificationConfiguration,
        components: HashMap<ModuleComponentIdentifier, ComponentVerificationMetadata>,
        top_level_comments: Vec<String>,
    ) -> Self {
        Self {
            configuration,
            components,
            top_level_comments,
        }
    }

    pub fn configuration(&self) -> &DependencyVerificationConfiguration {
        &self.configuration
    }

    pub fn components(&self) -> impl Iterator<Item = &ComponentVerificationMetadata> {
        self.components.values()
    }

    pub fn top_level_comments(&self) -> &[String] {
        &self.top_level_comments
    }

    pub fn find_artifact_metadata(
        &self,
        artifact: &ModuleComponentArtifactIdentifier,
    ) -> Option<&ArtifactVerificationMetadata> {
        self.components
            .get(artifact.component())
            .and_then(|component| {
                component
                    .artifacts
                    .iter()
                    .find(|entry| entry.artifact_name == artifact.file_name())
            })
    }

    /// Verifies one artifact, pushing every failure into `on_failure`.
    ///
    /// Infrastructure problems (unreadable files, malformed signature files,
    /// a stopped signature service) surface as errors; a file that simply no
    /// longer exists is the `DeletedArtifact` failure.
    pub fn verify(
        &self,
        checksums: &ChecksumService,
        signatures: &SignatureVerificationService,
        kind: ArtifactKind,
        artifact: &ModuleComponentArtifactIdentifier,
        file: &Path,
        signature_file: Option<&Path>,
        mut on_failure: impl FnMut(VerificationFailure),
    ) -> Result<()> {
        if kind == ArtifactKind::Metadata && !self.configuration.verify_metadata {
            tracing::debug!(
                target = "keel.verify",
                artifact = %artifact,
                "skipping metadata verification, disabled by configuration"
            );
            return Ok(());
        }
        if !file.exists() {
            on_failure(VerificationFailure::DeletedArtifact);
            return Ok(());
        }

        match self.find_artifact_metadata(artifact) {
            Some(metadata) => self.verify_known_artifact(
                checksums,
                signatures,
                artifact,
                metadata,
                file,
                signature_file,
                &mut on_failure,
            ),
            None => self.verify_unknown_artifact(
                signatures,
                artifact,
                file,
                signature_file,
                &mut on_failure,
            ),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn verify_known_artifact(
        &self,
        checksums: &ChecksumService,
        signatures: &SignatureVerificationService,
        artifact: &ModuleComponentArtifactIdentifier,
        metadata: &ArtifactVerificationMetadata,
        file: &Path,
        signature_file: Option<&Path>,
        on_failure: &mut impl FnMut(VerificationFailure),
    ) -> Result<()> {
        if self.configuration.verify_signatures {
            match existing(signature_file) {
                Some(signature_path) => {
                    // Trusted = per-artifact keys ∪ global rules matching
                    // these coordinates. Union, not override.
                    let (trusted, ignored) =
                        effective_key_sets(&self.configuration, Some(metadata), artifact);
                    let result = signatures.verify(file, signature_path, &trusted, &ignored)?;
                    if result.has_error() {
                        on_failure(VerificationFailure::SignatureFailure {
                            errors: result.error_map(),
                        });
                        return Ok(());
                    }
                    if !result.has_only_ignored_keys() {
                        // Signed by trusted keys only.
                        return Ok(());
                    }
                    // Every signing key was ignored: fall back to checksum
                    // verification below.
                }
                None => {
                    on_failure(VerificationFailure::MissingSignature);
                    return Ok(());
                }
            }
        }

        if metadata.checksums.is_empty() {
            on_failure(VerificationFailure::MissingChecksums);
            return Ok(());
        }
        // Every declared kind must match; each mismatch is reported.
        for checksum in &metadata.checksums {
            let actual = checksums.hash(file, checksum.kind)?;
            if !checksum.matches(&actual) {
                on_failure(VerificationFailure::ChecksumMismatch {
                    kind: checksum.kind,
                    expected: checksum.value.clone(),
                    actual,
                });
            }
        }
        Ok(())
    }

    /// An artifact the metadata store doesn't know. If a signature file
    /// exists we still verify it opportunistically: a trusted signature
    /// passes silently, ignored-only signatures are surfaced. Everything
    /// else ends in `MissingChecksums`.
    fn verify_unknown_artifact(
        &self,
        signatures: &SignatureVerificationService,
        artifact: &ModuleComponentArtifactIdentifier,
        file: &Path,
        signature_file: Option<&Path>,
        on_failure: &mut impl FnMut(VerificationFailure),
    ) -> Result<()> {
        if self.configuration.verify_signatures {
            if let Some(signature_path) = existing(signature_file) {
                let (trusted, ignored) = effective_key_sets(&self.configuration, None, artifact);
                let result = signatures.verify(file, signature_path, &trusted, &ignored)?;
                if !result.has_error() && !result.has_only_ignored_keys() {
                    return Ok(());
                }
                if result.has_only_ignored_keys() {
                    on_failure(VerificationFailure::OnlyIgnoredKeys);
                } else {
                    on_failure(VerificationFailure::SignatureFailure {
                        errors: result.error_map(),
                    });
                    return Ok(());
                }
            }
        }
        on_failure(VerificationFailure::MissingChecksums);
        Ok(())
    }
}

/// Per-artifact key sets used by the writer as well.
pub(crate) fn effective_key_sets(
    configuration: &DependencyVerificationConfiguration,
    metadata: Option<&ArtifactVerificationMetadata>,
    artifact: &ModuleComponentArtifactIdentifier,
) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut trusted = configuration.trusted_key_ids_for(artifact);
    let mut ignored = configuration.ignored_key_ids();
    if let Some(metadata) = metadata {
        trusted.extend(metadata.trusted_pgp_keys.iter().cloned());
        ignored.extend(metadata.ignored_pgp_keys.iter().map(|k| k.key_id.clone()));
    }
    (trusted, ignored)
}

fn existing(path: Option<&Path>) -> Option<&Path> {
    path.filter(|candidate| candidate.exists())
}
