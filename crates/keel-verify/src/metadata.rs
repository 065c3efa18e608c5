use std::collections::{BTreeMap, BTreeSet, HashMap};

use keel_ids::{ModuleComponentArtifactIdentifier, ModuleComponentIdentifier};
use regex::Regex;

use crate::checksum::{Checksum, ChecksumKind};
use crate::error::{Result, VerifyError};
use crate::verifier::DependencyVerifier;

/// A key whose signatures are deliberately not evaluated, with an optional
/// human-readable reason carried through the verification document.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IgnoredKey {
    pub key_id: String,
    pub reason: Option<String>,
}

impl IgnoredKey {
    pub fn new(key_id: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            reason: None,
        }
    }

    pub fn with_reason(key_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            reason: Some(reason.into()),
        }
    }
}

/// Coordinate matcher shared by trusted-key and trusted-artifact rules: every
/// populated field must match; with `regex` the fields are full-match
/// anchored patterns instead of literals.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerificationCoordinates {
    pub group: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
    pub file_name: Option<String>,
    pub regex: bool,
}

impl VerificationCoordinates {
    /// At least one coordinate must be populated, and regex patterns must
    /// compile; checked when a builder finalizes or a document is read.
    pub fn validate(&self) -> Result<()> {
        if self.group.is_none()
            && self.name.is_none()
            && self.version.is_none()
            && self.file_name.is_none()
        {
            return Err(VerifyError::InvalidPattern {
                pattern: String::new(),
                message: "a trust rule must constrain at least one coordinate".to_string(),
            });
        }
        if self.regex {
            for pattern in [&self.group, &self.name, &self.version, &self.file_name]
                .into_iter()
                .flatten()
            {
                Regex::new(pattern).map_err(|err| VerifyError::InvalidPattern {
                    pattern: pattern.clone(),
                    message: err.to_string(),
                })?;
            }
        }
        Ok(())
    }

    pub fn matches(&self, artifact: &ModuleComponentArtifactIdentifier) -> bool {
        let component = artifact.component();
        self.matches_field(&self.group, component.group())
            && self.matches_field(&self.name, component.name())
            && self.matches_field(&self.version, component.version())
            && self.matches_field(&self.file_name, artifact.file_name())
    }

    fn matches_field(&self, pattern: &Option<String>, value: &str) -> bool {
        let Some(pattern) = pattern else {
            return true;
        };
        if self.regex {
            // Patterns were validated when the rule was created.
            Regex::new(&format!("^(?:{pattern})$"))
                .map(|regex| regex.is_match(value))
                .unwrap_or(false)
        } else {
            pattern == value
        }
    }
}

/// A trusted signing key, optionally restricted to matching coordinates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrustedKey {
    pub key_id: String,
    pub coordinates: VerificationCoordinates,
}

/// The verification records for one artifact file of a component.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArtifactVerificationMetadata {
    pub artifact_name: String,
    pub checksums: Vec<Checksum>,
    pub trusted_pgp_keys: BTreeSet<String>,
    pub ignored_pgp_keys: BTreeSet<IgnoredKey>,
}

/// All artifact records of one component.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentVerificationMetadata {
    pub component_id: ModuleComponentIdentifier,
    pub artifacts: Vec<ArtifactVerificationMetadata>,
}

/// Global verification policy, loaded once per build from the verification
/// document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DependencyVerificationConfiguration {
    pub verify_metadata: bool,
    pub verify_signatures: bool,
    pub use_key_servers: bool,
    pub key_servers: Vec<String>,
    pub trusted_keys: Vec<TrustedKey>,
    pub ignored_keys: BTreeSet<IgnoredKey>,
    pub trusted_artifacts: Vec<VerificationCoordinates>,
}

impl Default for DependencyVerificationConfiguration {
    fn default() -> Self {
        Self {
            verify_metadata: true,
            verify_signatures: false,
            use_key_servers: true,
            key_servers: Vec::new(),
            trusted_keys: Vec::new(),
            ignored_keys: BTreeSet::new(),
            trusted_artifacts: Vec::new(),
        }
    }
}

impl DependencyVerificationConfiguration {
    /// Whether failures for this artifact are exempted by a trusted-artifact
    /// rule.
    pub fn is_trusted_artifact(&self, artifact: &ModuleComponentArtifactIdentifier) -> bool {
        self.trusted_artifacts
            .iter()
            .any(|rule| rule.matches(artifact))
    }

    /// Key ids trusted for this artifact through global rules.
    pub fn trusted_key_ids_for(
        &self,
        artifact: &ModuleComponentArtifactIdentifier,
    ) -> BTreeSet<String> {
        self.trusted_keys
            .iter()
            .filter(|key| key.coordinates.matches(artifact))
            .map(|key| key.key_id.clone())
            .collect()
    }

    pub fn ignored_key_ids(&self) -> BTreeSet<String> {
        self.ignored_keys
            .iter()
            .map(|key| key.key_id.clone())
            .collect()
    }
}

/// Accumulates verification records during a build (reading an existing
/// document, or a `--write-verification-metadata` run) and finalizes them
/// into an immutable [`DependencyVerifier`].
#[derive(Debug, Default)]
pub struct DependencyVerifierBuilder {
    verify_metadata: Option<bool>,
    verify_signatures: Option<bool>,
    use_key_servers: Option<bool>,
    key_servers: Vec<String>,
    trusted_keys: Vec<TrustedKey>,
    ignored_keys: BTreeSet<IgnoredKey>,
    trusted_artifacts: Vec<VerificationCoordinates>,
    top_level_comments: Vec<String>,
    components: BTreeMap<ModuleComponentIdentifier, BTreeMap<String, ArtifactVerificationMetadata>>,
}

impl DependencyVerifierBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_verify_metadata(&mut self, value: bool) {
        self.verify_metadata = Some(value);
    }

    pub fn set_verify_signatures(&mut self, value: bool) {
        self.verify_signatures = Some(value);
    }

    pub fn set_use_key_servers(&mut self, value: bool) {
        self.use_key_servers = Some(value);
    }

    pub fn verify_signatures(&self) -> bool {
        self.verify_signatures.unwrap_or(false)
    }

    pub fn verify_metadata(&self) -> bool {
        self.verify_metadata.unwrap_or(true)
    }

    pub fn trusted_artifacts(&self) -> &[VerificationCoordinates] {
        &self.trusted_artifacts
    }

    pub fn add_key_server(&mut self, uri: impl Into<String>) {
        let uri = uri.into();
        if !self.key_servers.contains(&uri) {
            self.key_servers.push(uri);
        }
    }

    pub fn add_trusted_key(
        &mut self,
        key_id: impl Into<String>,
        coordinates: VerificationCoordinates,
    ) {
        let key = TrustedKey {
            key_id: key_id.into(),
            coordinates,
        };
        if !self.trusted_keys.contains(&key) {
            self.trusted_keys.push(key);
        }
    }

    pub fn add_ignored_key(&mut self, key: IgnoredKey) {
        self.ignored_keys.insert(key);
    }

    pub fn add_trusted_artifact(&mut self, coordinates: VerificationCoordinates) {
        if !self.trusted_artifacts.contains(&coordinates) {
            self.trusted_artifacts.push(coordinates);
        }
    }

    pub fn add_top_level_comment(&mut self, comment: impl Into<String>) {
        self.top_level_comments.push(comment.into());
    }

    /// Records an expected checksum. A second value for an already-declared
    /// kind becomes an accepted alternative rather than replacing the
    /// original, so regeneration merges instead of clobbering.
    pub fn add_checksum(
        &mut self,
        artifact: &ModuleComponentArtifactIdentifier,
        kind: ChecksumKind,
        value: impl Into<String>,
        origin: Option<String>,
        reason: Option<String>,
    ) {
        let entry = self.artifact_entry(artifact);
        let mut checksum = Checksum::new(kind, value);
        checksum.origin = origin;
        checksum.reason = reason;
        if let Some(existing) = entry.checksums.iter_mut().find(|c| c.kind == kind) {
            if !existing.matches(&checksum.value) {
                existing.alternatives.insert(checksum.value);
            }
            if existing.origin.is_none() {
                existing.origin = checksum.origin;
            }
            if existing.reason.is_none() {
                existing.reason = checksum.reason;
            }
        } else {
            entry.checksums.push(checksum);
        }
    }

    pub fn add_checksum_alternative(
        &mut self,
        artifact: &ModuleComponentArtifactIdentifier,
        kind: ChecksumKind,
        value: impl Into<String>,
    ) {
        let entry = self.artifact_entry(artifact);
        if let Some(existing) = entry.checksums.iter_mut().find(|c| c.kind == kind) {
            let value = value.into();
            if !existing.matches(&value) {
                existing.alternatives.insert(value);
            }
        }
    }

    pub fn add_trusted_key_for_artifact(
        &mut self,
        artifact: &ModuleComponentArtifactIdentifier,
        key_id: impl Into<String>,
    ) {
        self.artifact_entry(artifact)
            .trusted_pgp_keys
            .insert(key_id.into());
    }

    pub fn add_ignored_key_for_artifact(
        &mut self,
        artifact: &ModuleComponentArtifactIdentifier,
        key: IgnoredKey,
    ) {
        self.artifact_entry(artifact).ignored_pgp_keys.insert(key);
    }

    fn artifact_entry(
        &mut self,
        artifact: &ModuleComponentArtifactIdentifier,
    ) -> &mut ArtifactVerificationMetadata {
        self.components
            .entry(artifact.component().clone())
            .or_default()
            .entry(artifact.file_name().to_string())
            .or_insert_with(|| ArtifactVerificationMetadata {
                artifact_name: artifact.file_name().to_string(),
                ..Default::default()
            })
    }

    /// Finalizes an immutable snapshot, validating every trust rule.
    pub fn build(self) -> Result<DependencyVerifier> {
        for key in &self.trusted_keys {
            key.coordinates.validate()?;
        }
        for coordinates in &self.trusted_artifacts {
            coordinates.validate()?;
        }
        let configuration = DependencyVerificationConfiguration {
            verify_metadata: self.verify_metadata.unwrap_or(true),
            verify_signatures: self.verify_signatures.unwrap_or(false),
            use_key_servers: self.use_key_servers.unwrap_or(true),
            key_servers: self.key_servers,
            trusted_keys: self.trusted_keys,
            ignored_keys: self.ignored_keys,
            trusted_artifacts: self.trusted_artifacts,
        };
        let components: HashMap<ModuleComponentIdentifier, ComponentVerificationMetadata> = self
            .components
            .into_iter()
            .map(|(component_id, artifacts)| {
                let metadata = ComponentVerificationMetadata {
                    component_id: component_id.clone(),
                    artifacts: artifacts.into_values().collect(),
                };
                (component_id, metadata)
            })
            .collect();
        Ok(DependencyVerifier::new(
            configuration,
            components,
            self.top_level_comments,
        ))
    }
}
