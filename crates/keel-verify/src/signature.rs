use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::error::{Result, VerifyError};

/// A signing key identity: the lowercase hex SHA-256 fingerprint of the
/// 32-byte public key.
pub fn key_id(key: &VerifyingKey) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// The locally available public keys signatures are checked against.
///
/// A keyring file holds one hex-encoded public key per line; blank lines and
/// `#` comments are skipped.
#[derive(Debug, Default, Clone)]
pub struct Keyring {
    keys: HashMap<String, VerifyingKey>,
}

impl Keyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a public key, returning its fingerprint.
    pub fn add_key(&mut self, key: VerifyingKey) -> String {
        let id = key_id(&key);
        self.keys.insert(id.clone(), key);
        id
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut keyring = Self::new();
        for (index, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let bytes = hex::decode(line).map_err(|err| VerifyError::InvalidKeyring {
                path: path.to_path_buf(),
                message: format!("line {}: {err}", index + 1),
            })?;
            let bytes: [u8; 32] = bytes.try_into().map_err(|_| VerifyError::InvalidKeyring {
                path: path.to_path_buf(),
                message: format!("line {}: a public key must be 32 bytes", index + 1),
            })?;
            let key = VerifyingKey::from_bytes(&bytes).map_err(|err| {
                VerifyError::InvalidKeyring {
                    path: path.to_path_buf(),
                    message: format!("line {}: {err}", index + 1),
                }
            })?;
            keyring.add_key(key);
        }
        Ok(keyring)
    }

    pub fn get(&self, id: &str) -> Option<&VerifyingKey> {
        self.keys.get(id)
    }

    pub fn key_ids(&self) -> BTreeSet<String> {
        self.keys.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// How one signing key failed verification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SignatureError {
    /// The key is not present in the keyring, so the signature could not be
    /// checked.
    MissingKey,
    /// The signature did not match the artifact bytes.
    Failed,
    /// The signature is cryptographically valid but the key is not trusted.
    PassedNotTrusted,
    /// The key was deliberately ignored by configuration.
    IgnoredKey,
}

impl SignatureError {
    pub fn message(self) -> &'static str {
        match self {
            SignatureError::MissingKey => {
                "the key couldn't be found in the keyring so verification couldn't be performed"
            }
            SignatureError::Failed => {
                "the artifact was signed with this key but the signature didn't match"
            }
            SignatureError::PassedNotTrusted => {
                "the artifact was signed with this key but the key is not in your trusted keys"
            }
            SignatureError::IgnoredKey => "the key was ignored",
        }
    }
}

/// Accumulated per-key outcomes for one artifact's signature file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SignatureVerificationResult {
    missing: BTreeSet<String>,
    failed: BTreeSet<String>,
    trusted: BTreeSet<String>,
    not_trusted: BTreeSet<String>,
    ignored: BTreeSet<String>,
}

impl SignatureVerificationResult {
    pub fn missing_key(&mut self, id: String) {
        self.missing.insert(id);
    }

    pub fn verified(&mut self, id: String, is_trusted: bool) {
        if is_trusted {
            self.trusted.insert(id);
        } else {
            self.not_trusted.insert(id);
        }
    }

    pub fn failed(&mut self, id: String) {
        self.failed.insert(id);
    }

    pub fn ignored(&mut self, id: String) {
        self.ignored.insert(id);
    }

    /// True when any key was missing, failed cryptographically, or verified
    /// without being trusted.
    pub fn has_error(&self) -> bool {
        !self.missing.is_empty() || !self.failed.is_empty() || !self.not_trusted.is_empty()
    }

    /// True when the only keys encountered were deliberately ignored ones.
    pub fn has_only_ignored_keys(&self) -> bool {
        !self.ignored.is_empty()
            && self.missing.is_empty()
            && self.failed.is_empty()
            && self.trusted.is_empty()
            && self.not_trusted.is_empty()
    }

    pub fn trusted_keys(&self) -> &BTreeSet<String> {
        &self.trusted
    }

    /// Keys that verified cryptographically without being in the trusted
    /// set. The metadata generator calls with an empty trusted set, so
    /// successful signers land here.
    pub fn not_trusted_keys(&self) -> &BTreeSet<String> {
        &self.not_trusted
    }

    pub fn ignored_keys(&self) -> &BTreeSet<String> {
        &self.ignored
    }

    pub fn missing_keys(&self) -> &BTreeSet<String> {
        &self.missing
    }

    pub fn failed_keys(&self) -> &BTreeSet<String> {
        &self.failed
    }

    /// Every offending key with its error kind, for failure reporting.
    /// Ignored keys are included so a mixed outcome shows the whole picture.
    pub fn error_map(&self) -> BTreeMap<String, SignatureError> {
        let mut errors = BTreeMap::new();
        for id in &self.missing {
            errors.insert(id.clone(), SignatureError::MissingKey);
        }
        for id in &self.failed {
            errors.insert(id.clone(), SignatureError::Failed);
        }
        for id in &self.not_trusted {
            errors.insert(id.clone(), SignatureError::PassedNotTrusted);
        }
        for id in &self.ignored {
            errors.insert(id.clone(), SignatureError::IgnoredKey);
        }
        errors
    }
}

#[derive(Debug)]
enum ServiceState {
    Idle,
    Started(Arc<Keyring>),
    Stopped,
}

/// Verifies detached signature files against the keyring.
///
/// The keyring is loaded lazily on first use and released by [`stop`]; the
/// coordinator stops the service at build-finished, which is the only ordered
/// shutdown requirement of the engine.
///
/// [`stop`]: SignatureVerificationService::stop
pub struct SignatureVerificationService {
    keyring_source: KeyringSource,
    state: Mutex<ServiceState>,
}

enum KeyringSource {
    File(PathBuf),
    Memory(Keyring),
}

impl fmt::Debug for SignatureVerificationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureVerificationService").finish()
    }
}

impl SignatureVerificationService {
    /// A service reading keys from a keyring file on first use.
    pub fn with_keyring_file(path: impl Into<PathBuf>) -> Self {
        Self {
            keyring_source: KeyringSource::File(path.into()),
            state: Mutex::new(ServiceState::Idle),
        }
    }

    /// A service over an in-memory keyring.
    pub fn with_keyring(keyring: Keyring) -> Self {
        Self {
            keyring_source: KeyringSource::Memory(keyring),
            state: Mutex::new(ServiceState::Idle),
        }
    }

    /// Lazy start: the keyring is loaded on first use. The lock only guards
    /// the state transition, never the verification work itself.
    fn keyring(&self) -> Result<Arc<Keyring>> {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let ServiceState::Idle = *state {
            let keyring = match &self.keyring_source {
                KeyringSource::File(path) => {
                    let keyring = Keyring::load(path)?;
                    tracing::debug!(
                        target = "keel.verify",
                        keyring = %path.display(),
                        keys = keyring.len(),
                        "signature verification service started"
                    );
                    keyring
                }
                KeyringSource::Memory(keyring) => keyring.clone(),
            };
            *state = ServiceState::Started(Arc::new(keyring));
        }
        match &*state {
            ServiceState::Started(keyring) => Ok(Arc::clone(keyring)),
            ServiceState::Stopped => Err(VerifyError::ServiceStopped),
            ServiceState::Idle => unreachable!("state initialized above"),
        }
    }

    /// Verifies every signature in `signature_file` against the bytes of
    /// `file`, classifying each signing key as trusted, untrusted, failed,
    /// missing or ignored.
    pub fn verify(
        &self,
        file: &Path,
        signature_file: &Path,
        trusted_keys: &BTreeSet<String>,
        ignored_keys: &BTreeSet<String>,
    ) -> Result<SignatureVerificationResult> {
        let keyring = self.keyring()?;
        let entries = parse_signature_file(signature_file)?;
        let bytes = std::fs::read(file)?;
        let mut result = SignatureVerificationResult::default();
        for (id, signature) in entries {
            if ignored_keys.contains(&id) {
                result.ignored(id);
                continue;
            }
            match keyring.get(&id) {
                None => result.missing_key(id),
                Some(key) => {
                    if key.verify(&bytes, &signature).is_ok() {
                        let is_trusted = trusted_keys.contains(&id);
                        result.verified(id, is_trusted);
                    } else {
                        result.failed(id);
                    }
                }
            }
        }
        Ok(result)
    }

    /// Releases the keyring. Further verification attempts fail with
    /// [`VerifyError::ServiceStopped`].
    pub fn stop(&self) {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !matches!(*state, ServiceState::Stopped) {
            tracing::debug!(
                target = "keel.verify",
                "signature verification service stopped"
            );
            *state = ServiceState::Stopped;
        }
    }
}

/// A detached signature file holds one entry per line:
/// `<key-fingerprint-hex> <signature-hex>`. Blank lines and `#` comments are
/// skipped. A file with no entries is malformed.
fn parse_signature_file(path: &Path) -> Result<Vec<(String, Signature)>> {
    let text = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();
    for (index, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let invalid = |message: String| VerifyError::InvalidSignatureFile {
            path: path.to_path_buf(),
            message: format!("line {}: {message}", index + 1),
        };
        let mut parts = line.split_whitespace();
        let (Some(id), Some(signature), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid(
                "expected '<key-fingerprint> <signature>'".to_string(),
            ));
        };
        let signature_bytes =
            hex::decode(signature).map_err(|err| invalid(err.to_string()))?;
        let signature = Signature::from_slice(&signature_bytes)
            .map_err(|err| invalid(err.to_string()))?;
        entries.push((id.to_ascii_lowercase(), signature));
    }
    if entries.is_empty() {
        return Err(VerifyError::InvalidSignatureFile {
            path: path.to_path_buf(),
            message: "no signatures found".to_string(),
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn signing_key(seed: u8) -> SigningKey {
        SigningKey::from_bytes(&[seed; 32])
    }

    fn write_signature_file(
        path: &Path,
        artifact: &[u8],
        signers: &[&SigningKey],
    ) -> Vec<String> {
        let mut lines = String::new();
        let mut ids = Vec::new();
        for signer in signers {
            let id = key_id(&signer.verifying_key());
            let signature = signer.sign(artifact);
            lines.push_str(&format!("{id} {}\n", hex::encode(signature.to_bytes())));
            ids.push(id);
        }
        std::fs::write(path, lines).unwrap();
        ids
    }

    #[test]
    fn trusted_signature_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("a.jar");
        std::fs::write(&artifact, b"bytes").unwrap();
        let signer = signing_key(1);
        let sig_file = dir.path().join("a.jar.sig");
        let ids = write_signature_file(&sig_file, b"bytes", &[&signer]);

        let mut keyring = Keyring::new();
        keyring.add_key(signer.verifying_key());
        let service = SignatureVerificationService::with_keyring(keyring);

        let trusted: BTreeSet<String> = ids.iter().cloned().collect();
        let result = service
            .verify(&artifact, &sig_file, &trusted, &BTreeSet::new())
            .unwrap();
        assert!(!result.has_error());
        assert!(!result.has_only_ignored_keys());
        assert_eq!(result.trusted_keys(), &trusted);
    }

    #[test]
    fn tampered_artifact_fails() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("a.jar");
        std::fs::write(&artifact, b"tampered").unwrap();
        let signer = signing_key(2);
        let sig_file = dir.path().join("a.jar.sig");
        let ids = write_signature_file(&sig_file, b"original", &[&signer]);

        let mut keyring = Keyring::new();
        keyring.add_key(signer.verifying_key());
        let service = SignatureVerificationService::with_keyring(keyring);

        let result = service
            .verify(
                &artifact,
                &sig_file,
                &ids.iter().cloned().collect(),
                &BTreeSet::new(),
            )
            .unwrap();
        assert!(result.has_error());
        assert_eq!(
            result.error_map().get(&ids[0]),
            Some(&SignatureError::Failed)
        );
    }

    #[test]
    fn unknown_key_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("a.jar");
        std::fs::write(&artifact, b"bytes").unwrap();
        let signer = signing_key(3);
        let sig_file = dir.path().join("a.jar.sig");
        let ids = write_signature_file(&sig_file, b"bytes", &[&signer]);

        let service = SignatureVerificationService::with_keyring(Keyring::new());
        let result = service
            .verify(&artifact, &sig_file, &BTreeSet::new(), &BTreeSet::new())
            .unwrap();
        assert!(result.has_error());
        assert_eq!(
            result.error_map().get(&ids[0]),
            Some(&SignatureError::MissingKey)
        );
    }

    #[test]
    fn only_ignored_keys_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("a.jar");
        std::fs::write(&artifact, b"bytes").unwrap();
        let signer = signing_key(4);
        let sig_file = dir.path().join("a.jar.sig");
        let ids = write_signature_file(&sig_file, b"bytes", &[&signer]);

        let service = SignatureVerificationService::with_keyring(Keyring::new());
        let ignored: BTreeSet<String> = ids.into_iter().collect();
        let result = service
            .verify(&artifact, &sig_file, &BTreeSet::new(), &ignored)
            .unwrap();
        assert!(!result.has_error());
        assert!(result.has_only_ignored_keys());
    }

    #[test]
    fn stopped_service_rejects_verification() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("a.jar");
        std::fs::write(&artifact, b"bytes").unwrap();
        let signer = signing_key(5);
        let sig_file = dir.path().join("a.jar.sig");
        write_signature_file(&sig_file, b"bytes", &[&signer]);

        let service = SignatureVerificationService::with_keyring(Keyring::new());
        service.stop();
        let err = service
            .verify(&artifact, &sig_file, &BTreeSet::new(), &BTreeSet::new())
            .unwrap_err();
        assert!(matches!(err, VerifyError::ServiceStopped));
    }

    #[test]
    fn malformed_signature_file_is_an_infrastructure_error() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("a.jar");
        std::fs::write(&artifact, b"bytes").unwrap();
        let sig_file = dir.path().join("a.jar.sig");
        std::fs::write(&sig_file, "not-a-signature\n").unwrap();

        let service = SignatureVerificationService::with_keyring(Keyring::new());
        let err = service
            .verify(&artifact, &sig_file, &BTreeSet::new(), &BTreeSet::new())
            .unwrap_err();
        assert!(matches!(err, VerifyError::InvalidSignatureFile { .. }));
    }
}
