use ed25519_dalek::{Signer, SigningKey};
use medledger_types::Address;
use rand::rngs::OsRng;
use std::fmt;
use zeroize::Zeroizing;

/// Length of the serialized keypair: 32 secret bytes followed by 32 public bytes.
pub const KEYPAIR_LEN: usize = 64;

/// The process-wide keypair that pays for and signs every submission.
///
/// Constructed once and handed to the recorder; never mutated afterwards.
pub struct SigningIdentity {
    key: SigningKey,
}

impl SigningIdentity {
    /// Build from keypair bytes, checking that the public half matches the secret half.
    pub fn from_keypair_bytes(bytes: &[u8; KEYPAIR_LEN]) -> Result<Self, ed25519_dalek::SignatureError> {
        let key = SigningKey::from_keypair_bytes(bytes)?;
        Ok(Self { key })
    }

    /// Fresh identity from OS randomness.
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Public identity (fee payer address) in ledger encoding.
    pub fn public_identity(&self) -> Address {
        Address::from_bytes(self.key.verifying_key().to_bytes())
    }

    /// Ed25519 signature over `message`.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.key.sign(message).to_bytes()
    }

    /// Serialize as the JSON byte array accepted by the loader.
    pub fn to_keypair_json(&self) -> String {
        let bytes = Zeroizing::new(self.key.to_keypair_bytes());
        let values: Vec<String> = bytes.iter().map(|b| b.to_string()).collect();
        format!("[{}]", values.join(","))
    }

    /// Check a signature produced by this identity.
    pub fn verify(&self, message: &[u8], signature: &[u8; 64]) -> bool {
        use ed25519_dalek::Verifier;
        let signature = ed25519_dalek::Signature::from_bytes(signature);
        self.key.verifying_key().verify(message, &signature).is_ok()
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("public_identity", &self.public_identity().to_string())
            .finish_non_exhaustive()
    }
}
