//! X25519 ephemeral key agreement for pair-verify.

use crate::keys::SharedSecret;
use mediaremote_core::error::CryptoError;
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::ZeroizeOnDrop;

/// Ephemeral X25519 keypair, generated per pair-verify attempt.
///
/// `diffie_hellman` consumes the keypair so the private half cannot outlive
/// the exchange.
#[derive(ZeroizeOnDrop)]
pub struct EphemeralKeyPair {
    #[zeroize(skip)]
    public: [u8; 32],
    secret: [u8; 32],
}

impl EphemeralKeyPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self {
            public: public.to_bytes(),
            secret: secret.to_bytes(),
        }
    }

    /// Build from a known private scalar.
    pub fn from_secret(secret: &[u8; 32]) -> Self {
        let static_secret = StaticSecret::from(*secret);
        let public = PublicKey::from(&static_secret);
        Self {
            public: public.to_bytes(),
            secret: *secret,
        }
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.public
    }

    /// Compute the shared secret with the peer's public key.
    ///
    /// Rejects malformed and low-order peer keys.
    pub fn diffie_hellman(self, peer_public: &[u8]) -> Result<SharedSecret, CryptoError> {
        let peer_public: [u8; 32] =
            peer_public
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: 32,
                    actual: peer_public.len(),
                })?;

        if peer_public.iter().all(|&b| b == 0) {
            return Err(CryptoError::InvalidPublicKey("all zeros".to_string()));
        }

        let static_secret = StaticSecret::from(self.secret);
        let shared = static_secret.diffie_hellman(&PublicKey::from(peer_public));

        if !shared.was_contributory() {
            return Err(CryptoError::InvalidPublicKey(
                "low-order point (shared secret is all zeros)".to_string(),
            ));
        }

        Ok(SharedSecret::new(shared.as_bytes().to_vec()))
    }
}
