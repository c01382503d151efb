//! Ed25519 server signing keys.
//!
//! This instance holds one or more Ed25519 key pairs used to sign outbound
//! federation requests. Remote servers verify these signatures using the
//! public keys we would publish at `/_matrix/key/v2/server`.
//!
//! # Key IDs
//! Key IDs follow the Matrix convention: `ed25519:<id>`. Configured keys carry
//! an explicit id; generated keys use the first 6 bytes of the public key,
//! hex-encoded.
//!
//! # Loading
//! Keys are loaded once at startup from config entries of the form
//! `"ed25519 <id> <unpadded-base64-seed>"` and are immutable thereafter.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand_core::OsRng;
use tracing::warn;

use crate::error::FederationError;

/// An Ed25519 signing key pair for this instance.
pub struct ServerKeyPair {
    /// Key ID in the format `ed25519:<id>`.
    pub key_id: String,
    signing_key: SigningKey,
}

impl ServerKeyPair {
    /// Generate a brand-new random Ed25519 key pair with a derived key ID.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let key_id = derive_key_id(signing_key.verifying_key().as_bytes());
        Self { key_id, signing_key }
    }

    /// Parse a config entry: `"ed25519 <id> <unpadded-base64-seed>"`.
    pub fn from_config_entry(entry: &str) -> Result<Self, FederationError> {
        let mut parts = entry.split_whitespace();
        let algo = parts.next().ok_or_else(|| FederationError::KeyLoad(entry.into()))?;
        if algo != "ed25519" {
            return Err(FederationError::KeyLoad(format!("unsupported algorithm '{algo}'")));
        }
        let id = parts.next().ok_or_else(|| FederationError::KeyLoad("missing key id".into()))?;
        let seed_b64 =
            parts.next().ok_or_else(|| FederationError::KeyLoad("missing key seed".into()))?;

        let seed = STANDARD_NO_PAD
            .decode(seed_b64)
            .map_err(|e| FederationError::KeyLoad(format!("bad seed base64: {e}")))?;
        let bytes: [u8; 32] = seed
            .as_slice()
            .try_into()
            .map_err(|_| FederationError::KeyLoad("seed must be exactly 32 bytes".into()))?;

        Ok(Self { key_id: format!("ed25519:{id}"), signing_key: SigningKey::from_bytes(&bytes) })
    }

    /// Return the public verifying key.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Return the public key as an unpadded-base64 string.
    pub fn public_key_base64(&self) -> String {
        STANDARD_NO_PAD.encode(self.signing_key.verifying_key().as_bytes())
    }

    /// Sign arbitrary bytes and return the unpadded-base64 signature.
    pub fn sign_bytes(&self, bytes: &[u8]) -> String {
        let sig = self.signing_key.sign(bytes);
        STANDARD_NO_PAD.encode(sig.to_bytes())
    }

    /// Sign a canonical JSON string and return the unpadded-base64 signature.
    pub fn sign_json(&self, canonical_json: &str) -> String {
        self.sign_bytes(canonical_json.as_bytes())
    }
}

/// Load all signing keys from config entries.
///
/// When no entries are configured, a single ephemeral key is generated so the
/// crawler can still issue signed requests; peers will not be able to verify
/// them against a published key document.
pub fn load_signing_keys(entries: &[String]) -> Result<Vec<ServerKeyPair>, FederationError> {
    if entries.is_empty() {
        warn!("No signing keys configured — generating an ephemeral Ed25519 key pair");
        return Ok(vec![ServerKeyPair::generate()]);
    }
    entries.iter().map(|e| ServerKeyPair::from_config_entry(e)).collect()
}

/// Derive a stable key ID from raw public key bytes.
fn derive_key_id(pubkey_bytes: &[u8]) -> String {
    let fingerprint = hex::encode(&pubkey_bytes[..6]);
    format!("ed25519:{fingerprint}")
}

/// Verify an Ed25519 signature.
///
/// * `pubkey_base64` — unpadded-base64 32-byte verifying key
/// * `sig_base64`    — unpadded-base64 64-byte signature
/// * `message`       — original signed bytes
pub fn verify_signature(
    pubkey_base64: &str,
    sig_base64: &str,
    message: &[u8],
) -> Result<(), FederationError> {
    use ed25519_dalek::Verifier;

    let pubkey_bytes =
        STANDARD_NO_PAD.decode(pubkey_base64).map_err(|_| FederationError::InvalidSignature)?;

    let sig_bytes =
        STANDARD_NO_PAD.decode(sig_base64).map_err(|_| FederationError::InvalidSignature)?;

    let verifying_key = VerifyingKey::from_bytes(
        pubkey_bytes.as_slice().try_into().map_err(|_| FederationError::InvalidSignature)?,
    )
    .map_err(|_| FederationError::InvalidSignature)?;

    let signature = ed25519_dalek::Signature::from_bytes(
        sig_bytes.as_slice().try_into().map_err(|_| FederationError::InvalidSignature)?,
    );

    verifying_key.verify(message, &signature).map_err(|_| FederationError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD_NO_PAD;

    #[test]
    fn round_trip_sign_verify() {
        let kp = ServerKeyPair::generate();
        let msg = b"hello federation";
        let sig = kp.sign_bytes(msg);
        verify_signature(&kp.public_key_base64(), &sig, msg).expect("signature should verify");
    }

    #[test]
    fn config_entry_round_trip() {
        let kp = ServerKeyPair::generate();
        let seed = STANDARD_NO_PAD.encode(kp.signing_key.to_bytes());
        let entry = format!("ed25519 a_ZOeT {seed}");
        let parsed = ServerKeyPair::from_config_entry(&entry).unwrap();
        assert_eq!(parsed.key_id, "ed25519:a_ZOeT");
        assert_eq!(parsed.public_key_base64(), kp.public_key_base64());
    }

    #[test]
    fn rejects_malformed_entries() {
        assert!(ServerKeyPair::from_config_entry("").is_err());
        assert!(ServerKeyPair::from_config_entry("rsa key seed").is_err());
        assert!(ServerKeyPair::from_config_entry("ed25519 key").is_err());
        assert!(ServerKeyPair::from_config_entry("ed25519 key notbase64!!!").is_err());
        assert!(ServerKeyPair::from_config_entry("ed25519 key c2hvcnQ").is_err());
    }

    #[test]
    fn ephemeral_fallback_when_unconfigured() {
        let keys = load_signing_keys(&[]).unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].key_id.starts_with("ed25519:"));
    }

    #[test]
    fn tampered_message_fails() {
        let kp = ServerKeyPair::generate();
        let sig = kp.sign_bytes(b"original");
        assert!(verify_signature(&kp.public_key_base64(), &sig, b"tampered").is_err());
    }
}
