//! Coordinator behavior: queueing, deduplication, concurrent draining,
//! report ordering and strict/lenient outcomes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use keel_ids::{ModuleComponentArtifactIdentifier, ModuleComponentIdentifier};
use keel_verify::{
    ArtifactKind, ChecksumKind, ChecksumService, DependencyVerifierBuilder, Keyring,
    SignatureVerificationService, VerificationCoordinates, VerificationCoordinator,
    VerificationMode, VerifyError,
};

fn artifact_id(group: &str, name: &str, file_name: &str) -> ModuleComponentArtifactIdentifier {
    ModuleComponentArtifactIdentifier::new(
        ModuleComponentIdentifier::new(group, name, "1.0"),
        file_name,
    )
}

fn write_artifact(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

fn no_signatures() -> SignatureVerificationService {
    SignatureVerificationService::with_keyring(Keyring::new())
}

#[test]
fn strict_mode_fails_the_drain_with_the_mismatch_message() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_artifact(dir.path(), "foo-1.0.jar", b"artifact");
    let artifact = artifact_id("org", "foo", "foo-1.0.jar");
    let actual = ChecksumService::new()
        .hash(&file, ChecksumKind::Sha256)
        .unwrap();

    let mut builder = DependencyVerifierBuilder::new();
    builder.add_checksum(&artifact, ChecksumKind::Sha256, "abc123", None, None);
    let coordinator = VerificationCoordinator::new(
        builder.build().unwrap(),
        no_signatures(),
        VerificationMode::Strict,
    );

    coordinator.on_artifact(ArtifactKind::Regular, artifact, file, || None);
    let err = coordinator
        .artifacts_accessed("configuration ':compileClasspath'")
        .unwrap_err();
    let VerifyError::VerificationFailed { report } = err else {
        panic!("expected a verification failure, got {err}");
    };
    assert!(report.contains("Dependency verification failed for configuration ':compileClasspath'"));
    assert!(report.contains(&format!(
        "expected a 'sha256' checksum of 'abc123' but was '{actual}'"
    )));
    assert!(report.contains("foo-1.0.jar (org:foo:1.0)"));
}

#[test]
fn lenient_mode_logs_and_clears_failures() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_artifact(dir.path(), "foo-1.0.jar", b"artifact");
    let artifact = artifact_id("org", "foo", "foo-1.0.jar");

    let mut builder = DependencyVerifierBuilder::new();
    builder.add_checksum(&artifact, ChecksumKind::Sha256, "abc123", None, None);
    let coordinator = VerificationCoordinator::new(
        builder.build().unwrap(),
        no_signatures(),
        VerificationMode::Lenient,
    );

    coordinator.on_artifact(ArtifactKind::Regular, artifact, file, || None);
    coordinator.artifacts_accessed("configuration ':a'").unwrap();
    // Cleared at the checkpoint: a later drain with no new events passes too.
    coordinator.artifacts_accessed("configuration ':b'").unwrap();
}

#[test]
fn duplicate_artifact_events_are_verified_once() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_artifact(dir.path(), "foo-1.0.jar", b"artifact");
    let artifact = artifact_id("org", "foo", "foo-1.0.jar");

    let mut builder = DependencyVerifierBuilder::new();
    builder.add_checksum(&artifact, ChecksumKind::Sha256, "abc123", None, None);
    let coordinator = VerificationCoordinator::new(
        builder.build().unwrap(),
        no_signatures(),
        VerificationMode::Strict,
    );

    for _ in 0..3 {
        coordinator.on_artifact(
            ArtifactKind::Regular,
            artifact.clone(),
            file.clone(),
            || None,
        );
    }
    let err = coordinator.artifacts_accessed("the build").unwrap_err();
    let VerifyError::VerificationFailed { report } = err else {
        panic!("expected a verification failure");
    };
    assert_eq!(report.matches("expected a 'sha256'").count(), 1);
    assert!(report.contains("1 artifact failed verification"));
}

#[test]
fn report_orders_deleted_last_and_missing_checksums_second_to_last() {
    let dir = tempfile::tempdir().unwrap();
    // org.a sorts first alphabetically but is deleted, so it must come last.
    let deleted = artifact_id("org.a", "gone", "gone-1.0.jar");
    let unknown_file = write_artifact(dir.path(), "unknown-1.0.jar", b"u");
    let unknown = artifact_id("org.b", "unknown", "unknown-1.0.jar");
    let mismatch_file = write_artifact(dir.path(), "bad-1.0.jar", b"b");
    let mismatch = artifact_id("org.z", "bad", "bad-1.0.jar");

    let mut builder = DependencyVerifierBuilder::new();
    builder.add_checksum(&deleted, ChecksumKind::Sha256, "abc", None, None);
    builder.add_checksum(&mismatch, ChecksumKind::Sha256, "abc", None, None);
    let coordinator = VerificationCoordinator::new(
        builder.build().unwrap(),
        no_signatures(),
        VerificationMode::Strict,
    );

    coordinator.on_artifact(
        ArtifactKind::Regular,
        deleted,
        dir.path().join("gone-1.0.jar"),
        || None,
    );
    coordinator.on_artifact(ArtifactKind::Regular, unknown, unknown_file, || None);
    coordinator.on_artifact(ArtifactKind::Regular, mismatch, mismatch_file, || None);

    let err = coordinator.artifacts_accessed("the build").unwrap_err();
    let VerifyError::VerificationFailed { report } = err else {
        panic!("expected a verification failure");
    };
    let mismatch_at = report.find("bad-1.0.jar").unwrap();
    let unknown_at = report.find("unknown-1.0.jar").unwrap();
    let deleted_at = report.find("gone-1.0.jar").unwrap();
    assert!(
        mismatch_at < unknown_at && unknown_at < deleted_at,
        "unexpected ordering in report:\n{report}"
    );
}

#[test]
fn trusted_artifact_failures_are_dropped_silently() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_artifact(dir.path(), "foo-1.0.jar", b"artifact");
    let artifact = artifact_id("org", "foo", "foo-1.0.jar");

    let mut builder = DependencyVerifierBuilder::new();
    builder.add_checksum(&artifact, ChecksumKind::Sha256, "abc123", None, None);
    builder.add_trusted_artifact(VerificationCoordinates {
        group: Some("org".to_string()),
        ..Default::default()
    });
    let coordinator = VerificationCoordinator::new(
        builder.build().unwrap(),
        no_signatures(),
        VerificationMode::Strict,
    );

    coordinator.on_artifact(ArtifactKind::Regular, artifact, file, || None);
    coordinator.artifacts_accessed("the build").unwrap();
}

#[test]
fn concurrent_verification_records_every_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mut builder = DependencyVerifierBuilder::new();
    let mut artifacts = Vec::new();
    for index in 0..24 {
        let name = format!("dep{index}");
        let file_name = format!("dep{index}-1.0.jar");
        let file = write_artifact(dir.path(), &file_name, format!("bytes {index}").as_bytes());
        let artifact = artifact_id("org.many", &name, &file_name);
        builder.add_checksum(&artifact, ChecksumKind::Sha256, "abc123", None, None);
        artifacts.push((artifact, file));
    }
    let coordinator = Arc::new(VerificationCoordinator::new(
        builder.build().unwrap(),
        no_signatures(),
        VerificationMode::Strict,
    ));

    let mut handles = Vec::new();
    for (artifact, file) in artifacts {
        let coordinator = Arc::clone(&coordinator);
        handles.push(std::thread::spawn(move || {
            coordinator.on_artifact(ArtifactKind::Regular, artifact, file, || None);
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let err = coordinator.artifacts_accessed("the build").unwrap_err();
    let VerifyError::VerificationFailed { report } = err else {
        panic!("expected a verification failure");
    };
    assert!(report.contains("24 artifacts failed verification"));
    for index in 0..24 {
        assert!(report.contains(&format!("dep{index}-1.0.jar")));
    }
}

#[test]
fn build_finished_stops_the_signature_service() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_artifact(dir.path(), "foo-1.0.jar", b"bytes");
    let sig = write_artifact(dir.path(), "foo-1.0.jar.sig", b"# placeholder\n");
    let artifact = artifact_id("org", "foo", "foo-1.0.jar");

    let mut builder = DependencyVerifierBuilder::new();
    builder.set_verify_signatures(true);
    builder.add_checksum(&artifact, ChecksumKind::Sha256, "abc", None, None);
    let coordinator = VerificationCoordinator::new(
        builder.build().unwrap(),
        no_signatures(),
        VerificationMode::Lenient,
    );

    coordinator.build_finished().unwrap();

    // The service is stopped: a late artifact that needs signature
    // verification surfaces the lifecycle error.
    coordinator.on_artifact(ArtifactKind::Regular, artifact, file, move || {
        Some(sig.clone())
    });
    let err = coordinator.artifacts_accessed("late").unwrap_err();
    assert!(matches!(
        err,
        VerifyError::ServiceStopped | VerifyError::InvalidSignatureFile { .. }
    ));
}
