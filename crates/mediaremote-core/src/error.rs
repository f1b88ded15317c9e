//! Error types for the MediaRemote pairing stack.

use thiserror::Error;

/// Primary error type for all pairing and channel operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Pairing error: {0}")]
    Pairing(#[from] PairingError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// The pairing error kind, if this is a pairing failure.
    pub fn pairing(&self) -> Option<&PairingError> {
        match self {
            Error::Pairing(e) => Some(e),
            _ => None,
        }
    }

    /// True when the peer presented an identifier other than the paired one.
    pub fn is_identity_mismatch(&self) -> bool {
        matches!(self, Error::Pairing(PairingError::IdentityMismatch { .. }))
    }
}

/// Errors during Pair-Setup, Pair-Verify and on the encrypted channel.
#[derive(Error, Debug)]
pub enum PairingError {
    /// SRP proof mismatch, almost always a wrong PIN.
    #[error("Authentication failed (wrong PIN?)")]
    AuthenticationFailure,

    #[error("Signature verification failed")]
    SignatureInvalid,

    #[error("Peer identifier mismatch: expected {expected}, got {actual}")]
    IdentityMismatch { expected: String, actual: String },

    #[error("AEAD authentication tag invalid")]
    AeadTagInvalid,

    #[error("Malformed TLV8: {0}")]
    MalformedTlv(String),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Transport closed")]
    TransportClosed,

    #[error("Pairing state mismatch: expected {expected}, got {actual}")]
    StateMismatch { expected: u8, actual: u8 },

    #[error("Missing required TLV type: {0}")]
    MissingTlv(u8),

    #[error("Peer reported error 0x{code:02x}{}", retry_suffix(.retry_delay))]
    PeerError { code: u8, retry_delay: Option<u16> },

    #[error("Invalid pairing state: {0}")]
    InvalidState(String),

    #[error("Pairing store error: {0}")]
    Store(String),
}

/// Cryptographic operation errors.
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Authentication tag mismatch")]
    AuthTagMismatch,

    #[error("Signature verification failed")]
    SignatureInvalid,
}

/// Parsing errors for wire formats.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Truncated input: {0}")]
    Truncated(String),
}

fn retry_suffix(retry_delay: &Option<u16>) -> String {
    match retry_delay {
        Some(delay) => format!(" (retry after {} seconds)", delay),
        None => String::new(),
    }
}

impl From<ParseError> for PairingError {
    fn from(e: ParseError) -> Self {
        PairingError::MalformedTlv(e.to_string())
    }
}

/// Convenience Result type.
pub type Result<T> = std::result::Result<T, Error>;
