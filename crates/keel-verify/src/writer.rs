//! The `--write-verification-metadata` mode: instead of verifying artifacts
//! against recorded checksums, observe them and (re)generate the
//! verification document.
//!
//! The writer merges with an existing document when present, computes the
//! requested checksum kinds concurrently for every artifact seen, records
//! signature outcomes when the `pgp` kind is requested, and writes entries in
//! deterministic order.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::thread;

use keel_ids::ModuleComponentArtifactIdentifier;

use crate::checksum::{ChecksumKind, ChecksumService};
use crate::error::{Result, VerifyError};
use crate::metadata::{DependencyVerifierBuilder, IgnoredKey};
use crate::signature::SignatureVerificationService;
use crate::verifier::ArtifactKind;
use crate::xml;

const GENERATED_ORIGIN: &str = "Generated by Keel";
const REASON_FAILED: &str = "Signature verification failed!";
const REASON_KEY_MISSING: &str = "A key couldn't be found in the keyring";
const REASON_NOT_SIGNED: &str = "Artifact is not signed";

/// A checksum kind selection for the generator: the four digest kinds plus
/// `pgp`, which asks for signature outcomes to be recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteKind {
    Checksum(ChecksumKind),
    Signatures,
}

impl FromStr for WriteKind {
    type Err = crate::checksum::UnknownChecksumKind;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        if value == "pgp" {
            return Ok(WriteKind::Signatures);
        }
        ChecksumKind::from_str(value).map(WriteKind::Checksum)
    }
}

type SignatureFileSupplier = Box<dyn FnOnce() -> Option<PathBuf> + Send>;

struct WriteEntry {
    kind: ArtifactKind,
    file: PathBuf,
    signature_file: SignatureFileSupplier,
}

impl fmt::Debug for WriteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteEntry")
            .field("kind", &self.kind)
            .field("file", &self.file)
            .finish()
    }
}

#[derive(Default)]
struct EntryOutcome {
    checksums: Vec<(ChecksumKind, String)>,
    verified_keys: BTreeSet<String>,
    failed_keys: BTreeSet<String>,
    missing_keys: BTreeSet<String>,
    has_signature_file: bool,
}

impl EntryOutcome {
    /// Checksums are the fallback: they are written unless the signature
    /// verified cleanly with at least one locally-known key.
    fn requires_checksums(&self) -> bool {
        self.verified_keys.is_empty()
            || !self.failed_keys.is_empty()
            || !self.missing_keys.is_empty()
    }
}

/// What the generation run discovered, for the caller's final summary.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub written_to: PathBuf,
    pub has_missing_signatures: bool,
    pub has_missing_keys: bool,
    pub has_failed_verification: bool,
}

/// Collects artifact events during a write-verification-metadata run and
/// produces the document at build end.
#[derive(Debug)]
pub struct WriteVerificationFile {
    verification_file: PathBuf,
    checksum_kinds: Vec<ChecksumKind>,
    generate_signature_info: bool,
    checksums: ChecksumService,
    signatures: SignatureVerificationService,
    dry_run: bool,
    entries: Mutex<BTreeMap<ModuleComponentArtifactIdentifier, WriteEntry>>,
}

impl WriteVerificationFile {
    /// Validates the requested kinds: unknown kinds are warned about and
    /// skipped, a signatures-only selection is rejected (signatures need a
    /// checksum fallback), and an insecure-only selection draws a warning.
    pub fn new(
        verification_file: impl Into<PathBuf>,
        kinds: &[String],
        signatures: SignatureVerificationService,
        dry_run: bool,
    ) -> Result<Self> {
        let mut checksum_kinds = Vec::new();
        let mut generate_signature_info = false;
        for kind in kinds {
            match kind.parse::<WriteKind>() {
                Ok(WriteKind::Signatures) => generate_signature_info = true,
                Ok(WriteKind::Checksum(kind)) => {
                    if !checksum_kinds.contains(&kind) {
                        checksum_kinds.push(kind);
                    }
                }
                Err(err) => {
                    tracing::warn!(target = "keel.verify", "invalid checksum kind: {err}");
                }
            }
        }
        if generate_signature_info && checksum_kinds.is_empty() {
            return Err(VerifyError::SignaturesRequireChecksumFallback);
        }
        if !generate_signature_info && !checksum_kinds.iter().any(|kind| kind.is_secure()) {
            tracing::warn!(
                target = "keel.verify",
                "the selected checksum kinds are all considered insecure; consider adding sha256 or sha512"
            );
        }
        checksum_kinds.sort();
        Ok(Self {
            verification_file: verification_file.into(),
            checksum_kinds,
            generate_signature_info,
            checksums: ChecksumService::new(),
            signatures,
            dry_run,
            entries: Mutex::new(BTreeMap::new()),
        })
    }

    /// Same inbound event as the verifying coordinator; here it only records
    /// what to hash later.
    pub fn on_artifact(
        &self,
        kind: ArtifactKind,
        artifact: ModuleComponentArtifactIdentifier,
        file: PathBuf,
        signature_file: impl FnOnce() -> Option<PathBuf> + Send + 'static,
    ) {
        lock(&self.entries).entry(artifact).or_insert(WriteEntry {
            kind,
            file,
            signature_file: Box::new(signature_file),
        });
    }

    /// Reads any existing document, computes checksums and signature
    /// outcomes concurrently, registers entries in sorted order and writes
    /// the document (or its dry-run sibling).
    pub fn build_finished(self) -> Result<WriteSummary> {
        let mut builder = DependencyVerifierBuilder::new();
        if self.verification_file.exists() {
            tracing::info!(
                target = "keel.verify",
                file = %self.verification_file.display(),
                "found existing dependency verification metadata, updating"
            );
            xml::read_into(&self.verification_file, &mut builder)?;
        }
        if self.generate_signature_info {
            builder.set_verify_signatures(true);
        }

        let entries = std::mem::take(&mut *lock(&self.entries));
        let outcomes = self.compute_outcomes(&builder, entries);
        let summary = self.register_entries(&mut builder, outcomes);

        let out = if self.dry_run {
            dry_run_file(&self.verification_file)
        } else {
            self.verification_file.clone()
        };
        let verifier = builder.build()?;
        xml::write_to_file(&verifier, &out)?;
        self.signatures.stop();

        let summary = WriteSummary {
            written_to: out,
            ..summary
        };
        print_warnings(&summary);
        Ok(summary)
    }

    fn compute_outcomes(
        &self,
        builder: &DependencyVerifierBuilder,
        entries: BTreeMap<ModuleComponentArtifactIdentifier, WriteEntry>,
    ) -> BTreeMap<ModuleComponentArtifactIdentifier, EntryOutcome> {
        let verify_metadata = builder.verify_metadata();
        let work: VecDeque<(ModuleComponentArtifactIdentifier, WriteEntry)> = entries
            .into_iter()
            .filter(|(_, entry)| {
                // Same skip rule as verification itself.
                !(entry.kind == ArtifactKind::Metadata && !verify_metadata)
            })
            .collect();

        let worker_count = thread::available_parallelism()
            .map(|parallelism| parallelism.get())
            .unwrap_or(1)
            .min(work.len().max(1));
        let work = Mutex::new(work);
        let outcomes: Mutex<BTreeMap<ModuleComponentArtifactIdentifier, EntryOutcome>> =
            Mutex::new(BTreeMap::new());
        thread::scope(|scope| {
            for _ in 0..worker_count {
                scope.spawn(|| loop {
                    let Some((artifact, entry)) = lock(&work).pop_front() else {
                        break;
                    };
                    if !entry.file.exists() {
                        tracing::warn!(
                            target = "keel.verify",
                            file = %entry.file.display(),
                            "cannot compute checksum because the file doesn't exist; it may indicate a corrupt or tampered cache"
                        );
                        continue;
                    }
                    let outcome = self.compute_one(entry);
                    lock(&outcomes).insert(artifact, outcome);
                });
            }
        });
        match outcomes.into_inner() {
            Ok(outcomes) => outcomes,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn compute_one(&self, entry: WriteEntry) -> EntryOutcome {
        let mut outcome = EntryOutcome::default();
        for kind in &self.checksum_kinds {
            match self.checksums.hash(&entry.file, *kind) {
                Ok(value) => outcome.checksums.push((*kind, value)),
                Err(err) => {
                    tracing::debug!(
                        target = "keel.verify",
                        file = %entry.file.display(),
                        "error while hashing: {err}"
                    );
                }
            }
        }
        if self.generate_signature_info {
            if let Some(signature_file) = (entry.signature_file)() {
                if signature_file.exists() {
                    outcome.has_signature_file = true;
                    // Empty trust sets: the generator only wants raw
                    // cryptographic outcomes, trust is decided by whoever
                    // reviews the generated file.
                    match self.signatures.verify(
                        &entry.file,
                        &signature_file,
                        &BTreeSet::new(),
                        &BTreeSet::new(),
                    ) {
                        Ok(result) => {
                            outcome.verified_keys.extend(result.trusted_keys().iter().cloned());
                            outcome
                                .verified_keys
                                .extend(result.not_trusted_keys().iter().cloned());
                            outcome.failed_keys.extend(result.failed_keys().iter().cloned());
                            outcome
                                .missing_keys
                                .extend(result.missing_keys().iter().cloned());
                        }
                        Err(err) => {
                            tracing::warn!(
                                target = "keel.verify",
                                signature = %signature_file.display(),
                                "cannot verify signature file: {err}"
                            );
                            outcome.has_signature_file = false;
                        }
                    }
                }
            }
        }
        outcome
    }

    fn register_entries(
        &self,
        builder: &mut DependencyVerifierBuilder,
        outcomes: BTreeMap<ModuleComponentArtifactIdentifier, EntryOutcome>,
    ) -> WriteSummary {
        let mut summary = WriteSummary::default();
        for (artifact, outcome) in outcomes {
            // Exempted artifacts get no entries at all.
            if builder
                .trusted_artifacts()
                .iter()
                .any(|rule| rule.matches(&artifact))
            {
                continue;
            }
            if outcome.has_signature_file {
                for key in &outcome.failed_keys {
                    summary.has_failed_verification = true;
                    builder.add_ignored_key_for_artifact(
                        &artifact,
                        IgnoredKey::with_reason(key.clone(), REASON_FAILED),
                    );
                }
                for key in &outcome.verified_keys {
                    if !outcome.failed_keys.contains(key) {
                        builder.add_trusted_key_for_artifact(&artifact, key.clone());
                    }
                }
                for key in &outcome.missing_keys {
                    summary.has_missing_keys = true;
                    builder.add_ignored_key(IgnoredKey::with_reason(
                        key.clone(),
                        REASON_KEY_MISSING,
                    ));
                }
            } else if self.generate_signature_info {
                summary.has_missing_signatures = true;
            }

            if !self.generate_signature_info || outcome.requires_checksums() {
                let reason = if !self.generate_signature_info {
                    None
                } else if !outcome.failed_keys.is_empty() {
                    Some(REASON_FAILED.to_string())
                } else if outcome.has_signature_file {
                    Some(REASON_KEY_MISSING.to_string())
                } else {
                    Some(REASON_NOT_SIGNED.to_string())
                };
                for (kind, value) in &outcome.checksums {
                    builder.add_checksum(
                        &artifact,
                        *kind,
                        value.clone(),
                        Some(GENERATED_ORIGIN.to_string()),
                        reason.clone(),
                    );
                }
            }
        }
        summary
    }
}

fn dry_run_file(verification_file: &Path) -> PathBuf {
    let stem = verification_file
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "verification-metadata".to_string());
    verification_file.with_file_name(format!("{stem}.dryrun.xml"))
}

fn print_warnings(summary: &WriteSummary) {
    if summary.has_missing_signatures || summary.has_missing_keys || summary.has_failed_verification
    {
        let mut message =
            String::from("a verification file was generated but some problems were discovered:\n");
        if summary.has_missing_signatures {
            message.push_str("   - some artifacts aren't signed or the signature couldn't be retrieved\n");
        }
        if summary.has_missing_keys {
            message.push_str(
                "   - some keys couldn't be found in the keyring; they were added as ignored keys, review whether this is acceptable\n",
            );
        }
        if summary.has_failed_verification {
            message.push_str(
                "   - some signature verification failed; checksums were generated for those artifacts but you MUST check if there's an actual problem\n",
            );
        }
        tracing::warn!(target = "keel.verify", "{message}");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
