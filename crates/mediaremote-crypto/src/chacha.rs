//! ChaCha20-Poly1305 AEAD for the pairing handshakes and the session channel.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use mediaremote_core::error::CryptoError;
use zeroize::ZeroizeOnDrop;

/// Poly1305 tag length.
pub const TAG_LEN: usize = 16;

/// Nonce label for pair-setup M5 encryption.
pub const PS_MSG05: &[u8] = b"PS-Msg05";
/// Nonce label for pair-setup M6 decryption.
pub const PS_MSG06: &[u8] = b"PS-Msg06";
/// Nonce label for pair-verify M2 decryption.
pub const PV_MSG02: &[u8] = b"PV-Msg02";
/// Nonce label for pair-verify M3 encryption.
pub const PV_MSG03: &[u8] = b"PV-Msg03";

/// One direction of a session: a key with its cached cipher.
///
/// The caller supplies the message counter, so nonce bookkeeping stays with
/// whoever owns the connection.
#[derive(ZeroizeOnDrop)]
pub struct DirectionalCipher {
    key: [u8; 32],
    #[zeroize(skip)]
    cipher: ChaCha20Poly1305,
}

impl DirectionalCipher {
    pub fn new(key: [u8; 32]) -> Self {
        let cipher = ChaCha20Poly1305::new(&key.into());
        Self { key, cipher }
    }

    /// Encrypt with the nonce built from `counter`; no associated data.
    ///
    /// Returns ciphertext with the 16-byte tag appended.
    pub fn seal(&self, counter: u64, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = build_nonce_from_counter(counter);
        self.cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| CryptoError::Encryption(format!("Encryption failed: {}", e)))
    }

    /// Decrypt and authenticate a ciphertext+tag sealed under `counter`.
    pub fn open(&self, counter: u64, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < TAG_LEN {
            return Err(CryptoError::AuthTagMismatch);
        }
        let nonce = build_nonce_from_counter(counter);
        self.cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext)
            .map_err(|_| CryptoError::AuthTagMismatch)
    }
}

/// Build 12-byte nonce from counter: 4 zero bytes then the counter as u64 LE.
pub fn build_nonce_from_counter(counter: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[4..12].copy_from_slice(&counter.to_le_bytes());
    nonce
}

/// Encrypt with explicit 12-byte nonce (for pairing protocols).
///
/// Returns ciphertext with 16-byte auth tag appended.
pub fn encrypt_with_nonce(
    key: &[u8; 32],
    nonce: &[u8; 12],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new(&(*key).into());

    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|e| CryptoError::Encryption(format!("Encryption failed: {}", e)))
}

/// Decrypt with explicit 12-byte nonce (for pairing protocols).
///
/// Any authentication failure, including input shorter than a tag, is
/// `AuthTagMismatch`.
pub fn decrypt_with_nonce(
    key: &[u8; 32],
    nonce: &[u8; 12],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < TAG_LEN {
        return Err(CryptoError::AuthTagMismatch);
    }

    let cipher = ChaCha20Poly1305::new(&(*key).into());

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::AuthTagMismatch)
}

/// Create a 12-byte nonce from a label (right-aligned, left-padded with zeros).
///
/// "PV-Msg02" becomes `\x00\x00\x00\x00PV-Msg02`.
pub fn nonce_from_string(s: &[u8]) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    let len = s.len().min(12);
    let start = 12 - len;
    nonce[start..].copy_from_slice(&s[..len]);
    nonce
}
