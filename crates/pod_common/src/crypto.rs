//! Signature verification capability
//!
//! The sync core consumes signature checks as an opaque capability so the
//! underlying scheme stays swappable. Keys and signatures travel as base58
//! text, the form they take inside pod documents.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

/// Opaque signature-verification capability consumed by the sync core.
pub trait CryptoService: Send + Sync {
    /// Verify `signature_b58` over `message` with the issuer's base58 public
    /// key. Any decoding failure counts as a failed verification.
    fn verify(&self, pubkey_b58: &str, signature_b58: &str, message: &[u8]) -> bool;
}

/// Ed25519 verification over base58-encoded keys and signatures.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ed25519CryptoService;

impl CryptoService for Ed25519CryptoService {
    fn verify(&self, pubkey_b58: &str, signature_b58: &str, message: &[u8]) -> bool {
        let Some(key) = decode_pubkey(pubkey_b58) else {
            return false;
        };
        let Some(sig) = decode_signature(signature_b58) else {
            return false;
        };
        key.verify(message, &sig).is_ok()
    }
}

fn decode_pubkey(pubkey_b58: &str) -> Option<VerifyingKey> {
    let bytes = bs58::decode(pubkey_b58).into_vec().ok()?;
    let bytes: [u8; 32] = bytes.try_into().ok()?;
    VerifyingKey::from_bytes(&bytes).ok()
}

fn decode_signature(signature_b58: &str) -> Option<Signature> {
    let bytes = bs58::decode(signature_b58).into_vec().ok()?;
    let bytes: [u8; 64] = bytes.try_into().ok()?;
    Some(Signature::from_bytes(&bytes))
}

/// Hex-encoded SHA-256 of `bytes`. Anonymous documents carry this instead of
/// an issuer signature.
pub fn content_hash_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn keypair() -> (SigningKey, String) {
        let signing = SigningKey::generate(&mut rand::rngs::OsRng);
        let pubkey = bs58::encode(signing.verifying_key().as_bytes()).into_string();
        (signing, pubkey)
    }

    #[test]
    fn verify_roundtrip() {
        let (signing, pubkey) = keypair();
        let message = b"hello pod";
        let sig = bs58::encode(signing.sign(message).to_bytes()).into_string();

        let crypto = Ed25519CryptoService;
        assert!(crypto.verify(&pubkey, &sig, message));
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let (signing, pubkey) = keypair();
        let sig = bs58::encode(signing.sign(b"original").to_bytes()).into_string();

        let crypto = Ed25519CryptoService;
        assert!(!crypto.verify(&pubkey, &sig, b"tampered"));
    }

    #[test]
    fn verify_rejects_garbage_encoding() {
        let crypto = Ed25519CryptoService;
        assert!(!crypto.verify("not-base58-0OIl", "also-bad", b"msg"));
        assert!(!crypto.verify("abc", "abc", b"msg"));
    }

    #[test]
    fn content_hash_is_stable() {
        let h1 = content_hash_hex(b"payload");
        let h2 = content_hash_hex(b"payload");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert_ne!(h1, content_hash_hex(b"other"));
    }
}
