use std::collections::BTreeMap;
use std::fmt::Write as _;

use keel_ids::ModuleComponentArtifactIdentifier;

use crate::verifier::VerificationFailure;

/// Renders the aggregated failures as a deterministic, human-readable report.
///
/// Ordering is part of the contract: `DeletedArtifact` entries sort last and
/// `MissingChecksums` entries second-to-last, with everything else ordered by
/// component display name, so repeated builds produce identical error
/// messages.
pub(crate) fn render_report(
    display_name: &str,
    failures: &BTreeMap<ModuleComponentArtifactIdentifier, Vec<VerificationFailure>>,
) -> String {
    let mut entries: Vec<(&ModuleComponentArtifactIdentifier, &Vec<VerificationFailure>)> =
        failures.iter().collect();
    entries.sort_by(|(left_id, left), (right_id, right)| {
        rank(left)
            .cmp(&rank(right))
            .then_with(|| left_id.component().to_string().cmp(&right_id.component().to_string()))
            .then_with(|| left_id.file_name().cmp(right_id.file_name()))
    });

    let mut out = String::new();
    let _ = writeln!(out, "Dependency verification failed for {display_name}:");
    let _ = writeln!(
        out,
        "{} artifact{} failed verification:",
        entries.len(),
        if entries.len() == 1 { "" } else { "s" }
    );
    for (artifact, artifact_failures) in entries {
        let combined = artifact_failures
            .iter()
            .map(|failure| failure.to_string())
            .collect::<Vec<_>>()
            .join("; also ");
        let _ = writeln!(out, "  - On artifact {artifact}: {combined}");
    }
    out.push_str(
        "This can indicate that a dependency has been compromised. Please carefully verify the \
         checksums and signatures, and update the dependency verification metadata if the \
         artifacts are legitimate.",
    );
    out
}

fn rank(failures: &[VerificationFailure]) -> u8 {
    failures
        .iter()
        .map(|failure| match failure {
            VerificationFailure::DeletedArtifact => 2,
            VerificationFailure::MissingChecksums => 1,
            _ => 0,
        })
        .max()
        .unwrap_or(0)
}
