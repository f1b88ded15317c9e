//! # mediaremote-crypto
//!
//! Cryptographic primitives for MediaRemote pairing.
//!
//! This crate provides:
//! - TLV8 encoding for the pairing messages
//! - SRP-6a (3072-bit) for pair-setup
//! - Curve25519 ECDH for key agreement
//! - Ed25519 for long-term identities
//! - ChaCha20-Poly1305 for AEAD encryption
//! - HKDF-SHA512 for key derivation
//!
//! All secret material is zeroized on drop.

pub mod chacha;
pub mod curve25519;
pub mod ed25519;
pub mod hkdf;
pub mod keys;
pub mod srp;
pub mod tlv;

pub use chacha::DirectionalCipher;
pub use curve25519::EphemeralKeyPair;
pub use ed25519::IdentityKeyPair;
pub use keys::{EncryptionKey, SessionKeys, SharedSecret};
pub use tlv::{Tlv8, TlvType};
