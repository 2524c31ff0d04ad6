//! Test keypairs
//!
//! Wraps an Ed25519 keypair with the base58 text forms pod documents carry.

use ed25519_dalek::{Signer, SigningKey};

/// An Ed25519 keypair for signing test documents.
pub struct TestKey {
    signing: SigningKey,
    /// Base58 form of the public key, as it appears in `issuer` fields.
    pub pubkey: String,
}

impl TestKey {
    pub fn generate() -> Self {
        let signing = SigningKey::generate(&mut rand::rngs::OsRng);
        let pubkey = bs58::encode(signing.verifying_key().as_bytes()).into_string();
        Self { signing, pubkey }
    }

    /// Sign `message` and return the base58 signature text.
    pub fn sign_b58(&self, message: &[u8]) -> String {
        bs58::encode(self.signing.sign(message).to_bytes()).into_string()
    }
}
