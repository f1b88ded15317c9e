//! Controller identity for consistent pairing identifiers.
//!
//! The same identifier and Ed25519 keypair must be presented in pair-setup M5
//! and in every later pair-verify M3, otherwise the peer rejects us.

use mediaremote_crypto::ed25519::IdentityKeyPair;

/// Long-term identity of this controller towards one paired device.
#[derive(Clone)]
pub struct ControllerIdentity {
    /// Identifier bytes sent in the `Identifier` TLV.
    id: Vec<u8>,
    /// Ed25519 keypair (LTSK/LTPK)
    keypair: IdentityKeyPair,
}

impl ControllerIdentity {
    /// Generate a fresh keypair for the given identifier.
    pub fn generate(id: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            keypair: IdentityKeyPair::generate(),
        }
    }

    /// Restore an identity from a persisted seed.
    pub fn from_seed(id: impl Into<Vec<u8>>, seed: &[u8; 32]) -> Self {
        Self {
            id: id.into(),
            keypair: IdentityKeyPair::from_seed(seed),
        }
    }

    /// Identifier bytes for TLV encoding.
    pub fn id(&self) -> &[u8] {
        &self.id
    }

    /// Identifier rendered for logs and error messages.
    pub fn id_display(&self) -> String {
        String::from_utf8_lossy(&self.id).into_owned()
    }

    /// Get the Ed25519 keypair.
    pub fn keypair(&self) -> &IdentityKeyPair {
        &self.keypair
    }

    /// Get the Ed25519 public key (LTPK).
    pub fn public_key(&self) -> [u8; 32] {
        self.keypair.public_key()
    }

    /// Sign a message with the Ed25519 private key.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.keypair.sign(message)
    }

    /// The 32-byte seed the keypair is rebuilt from.
    pub fn seed(&self) -> [u8; 32] {
        self.keypair.seed()
    }
}

impl std::fmt::Debug for ControllerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerIdentity")
            .field("id", &self.id_display())
            .finish_non_exhaustive()
    }
}
