//! # mediaremote-pairing
//!
//! Pairing and encrypted framing for MediaRemote control channels.
//!
//! This crate implements:
//! - Pair-setup (SRP-6a bootstrap from the device PIN, long-term key exchange)
//! - Pair-verify (ephemeral X25519 with Ed25519 signatures)
//! - Persistent pairing records (`PairingStore`)
//! - The varint + ChaCha20-Poly1305 frame codec used once a session is up
//! - `PairingController`, which ties the pieces together over one connection

mod channel;
mod controller;
mod framer;
mod identity;
mod message;
mod pair_setup;
mod pair_verify;
mod store;
mod traits;
mod transport;

pub use channel::SecureChannel;
pub use controller::PairingController;
pub use framer::{
    decode_varint, encode_varint, FrameCodec, NonceCounter, MAX_FRAME_LEN, MAX_VARINT_LEN,
};
pub use identity::ControllerIdentity;
pub use pair_setup::{PairSetup, PeerIdentity, SetupPhase};
pub use pair_verify::{PairVerify, VerifyPhase};
pub use store::{FileStore, MemoryStore, PairingRecord, PairingStore};
pub use traits::{PairingTransport, PinPrompt, StaticPin, StdinPrompt};
pub use transport::{StreamTransport, MAX_HANDSHAKE_MESSAGE};
