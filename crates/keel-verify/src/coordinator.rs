use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::thread;

use keel_ids::ModuleComponentArtifactIdentifier;

use crate::checksum::ChecksumService;
use crate::error::{Result, VerifyError};
use crate::report::render_report;
use crate::signature::SignatureVerificationService;
use crate::verifier::{ArtifactKind, DependencyVerifier, VerificationFailure};

/// Whether fatal verification failures stop the build or are logged and
/// cleared.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerificationMode {
    Strict,
    Lenient,
}

type SignatureFileSupplier = Box<dyn FnOnce() -> Option<PathBuf> + Send>;

struct PendingVerification {
    kind: ArtifactKind,
    artifact: ModuleComponentArtifactIdentifier,
    file: PathBuf,
    signature_file: SignatureFileSupplier,
}

/// Orchestrates verification of artifacts as the fetch layer reports them.
///
/// Events are enqueued rather than verified synchronously; the queue drains
/// into a worker pool when the consumer is about to read the resolved files
/// ([`artifacts_accessed`]) and at [`build_finished`]. Failures accumulate in
/// a mutex-guarded multimap (several failures for one artifact are all
/// preserved) and are reported at those checkpoints.
///
/// [`artifacts_accessed`]: VerificationCoordinator::artifacts_accessed
/// [`build_finished`]: VerificationCoordinator::build_finished
pub struct VerificationCoordinator {
    verifier: DependencyVerifier,
    checksums: ChecksumService,
    signatures: SignatureVerificationService,
    mode: VerificationMode,
    queue: Mutex<VecDeque<PendingVerification>>,
    seen: Mutex<HashSet<(ArtifactKind, ModuleComponentArtifactIdentifier)>>,
    failures: Mutex<BTreeMap<ModuleComponentArtifactIdentifier, Vec<VerificationFailure>>>,
}

impl VerificationCoordinator {
    pub fn new(
        verifier: DependencyVerifier,
        signatures: SignatureVerificationService,
        mode: VerificationMode,
    ) -> Self {
        Self {
            verifier,
            checksums: ChecksumService::new(),
            signatures,
            mode,
            queue: Mutex::new(VecDeque::new()),
            seen: Mutex::new(HashSet::new()),
            failures: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn verifier(&self) -> &DependencyVerifier {
        &self.verifier
    }

    /// Called by the fetch layer for every artifact it resolves. Duplicate
    /// events for the same (kind, artifact) are dropped; the rest are queued
    /// for the next drain. The signature file supplier runs only when the
    /// artifact is actually verified.
    pub fn on_artifact(
        &self,
        kind: ArtifactKind,
        artifact: ModuleComponentArtifactIdentifier,
        file: PathBuf,
        signature_file: impl FnOnce() -> Option<PathBuf> + Send + 'static,
    ) {
        if !lock(&self.seen).insert((kind, artifact.clone())) {
            return;
        }
        lock(&self.queue).push_back(PendingVerification {
            kind,
            artifact,
            file,
            signature_file: Box::new(signature_file),
        });
    }

    /// Blocks until every verification queued so far has completed, then
    /// reports. `display_name` identifies the consumer in the report, e.g.
    /// `configuration ':compileClasspath'`.
    pub fn artifacts_accessed(&self, display_name: &str) -> Result<()> {
        let pending: Vec<PendingVerification> = lock(&self.queue).drain(..).collect();
        if !pending.is_empty() {
            let worker_count = thread::available_parallelism()
                .map(|parallelism| parallelism.get())
                .unwrap_or(1)
                .min(pending.len());
            let work = Mutex::new(VecDeque::from(pending));
            let errors: Mutex<Vec<VerifyError>> = Mutex::new(Vec::new());
            thread::scope(|scope| {
                for _ in 0..worker_count {
                    scope.spawn(|| loop {
                        let Some(item) = lock(&work).pop_front() else {
                            break;
                        };
                        if let Err(err) = self.verify_one(item) {
                            lock(&errors).push(err);
                        }
                    });
                }
            });
            // Infrastructure errors are fatal immediately; surface the first.
            let mut errors = match errors.into_inner() {
                Ok(errors) => errors,
                Err(poisoned) => poisoned.into_inner(),
            };
            if !errors.is_empty() {
                return Err(errors.remove(0));
            }
        }
        self.report(display_name)
    }

    /// Final checkpoint: drains outstanding work, reports, and stops the
    /// signature verification service.
    pub fn build_finished(&self) -> Result<()> {
        let outcome = self.artifacts_accessed("the build");
        self.signatures.stop();
        outcome
    }

    fn verify_one(&self, item: PendingVerification) -> Result<()> {
        let signature_file = (item.signature_file)();
        let mut collected: Vec<VerificationFailure> = Vec::new();
        self.verifier.verify(
            &self.checksums,
            &self.signatures,
            item.kind,
            &item.artifact,
            &item.file,
            signature_file.as_deref(),
            |failure| collected.push(failure),
        )?;
        if collected.is_empty() {
            return Ok(());
        }
        // Trusted artifacts are verified all the same, but their failures
        // are exempted and never surface.
        if self
            .verifier
            .configuration()
            .is_trusted_artifact(&item.artifact)
        {
            return Ok(());
        }
        lock(&self.failures)
            .entry(item.artifact)
            .or_default()
            .extend(collected);
        Ok(())
    }

    fn report(&self, display_name: &str) -> Result<()> {
        let mut failures = lock(&self.failures);
        if failures.is_empty() {
            return Ok(());
        }
        let has_fatal = failures
            .values()
            .flatten()
            .any(VerificationFailure::is_fatal);
        let report = render_report(display_name, &failures);
        failures.clear();
        if !has_fatal {
            // Advisory-only outcomes are surfaced without stopping the build.
            tracing::warn!(target = "keel.verify", "{report}");
            return Ok(());
        }
        match self.mode {
            VerificationMode::Lenient => {
                tracing::error!(target = "keel.verify", "{report}");
                Ok(())
            }
            VerificationMode::Strict => Err(VerifyError::VerificationFailed { report }),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
