//! TLV8 encoding/decoding for pairing messages.
//!
//! TLV8 format: [Type: 1 byte][Length: 1 byte][Value: 0-255 bytes]
//! Values longer than 255 bytes are fragmented across multiple TLVs.
//!
//! Entries keep insertion order. Empty values are not emitted at all, and a
//! tag that reappears without being a 255-byte continuation replaces the
//! earlier value.

use mediaremote_core::error::ParseError;

/// TLV type constants for pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TlvType {
    Method = 0x00,
    Identifier = 0x01,
    Salt = 0x02,
    PublicKey = 0x03,
    Proof = 0x04,
    EncryptedData = 0x05,
    State = 0x06,
    Error = 0x07,
    RetryDelay = 0x08,
    Certificate = 0x09,
    Signature = 0x0A,
    Permissions = 0x0B,
    FragmentData = 0x0C,
    FragmentLast = 0x0D,
    Separator = 0xFF,
}

/// Maximum bytes in a single TLV8 chunk.
const MAX_CHUNK: usize = 255;

/// Ordered TLV8 message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tlv8 {
    items: Vec<(u8, Vec<u8>)>,
}

impl Tlv8 {
    /// Create empty TLV8 message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TLV8 from bytes.
    ///
    /// A chunk of exactly 255 bytes followed by the same tag is a continuation;
    /// anything else starts a new entry.
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        let mut tlv = Self::new();
        let mut i = 0;

        while i < data.len() {
            let typ = data[i];
            let mut value = Vec::new();

            loop {
                // Need at least 2 bytes for type and length
                if i + 2 > data.len() {
                    return Err(ParseError::Truncated("TLV8 header".to_string()));
                }
                let len = data[i + 1] as usize;
                i += 2;

                if i + len > data.len() {
                    return Err(ParseError::Truncated(format!(
                        "TLV8 value (expected {} bytes, got {})",
                        len,
                        data.len() - i
                    )));
                }
                value.extend_from_slice(&data[i..i + len]);
                i += len;

                let continues = len == MAX_CHUNK && data.get(i) == Some(&typ);
                if !continues {
                    break;
                }
            }

            tlv.set_raw(typ, value);
        }

        Ok(tlv)
    }

    /// Encode to bytes.
    ///
    /// Values > 255 bytes are fragmented; empty values produce no bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut result = Vec::new();

        for (typ, value) in &self.items {
            for chunk in value.chunks(MAX_CHUNK) {
                result.push(*typ);
                result.push(chunk.len() as u8);
                result.extend_from_slice(chunk);
            }
        }

        result
    }

    /// Get value for type.
    pub fn get(&self, typ: TlvType) -> Option<&[u8]> {
        self.get_raw(typ as u8)
    }

    /// Get value for raw type.
    pub fn get_raw(&self, typ: u8) -> Option<&[u8]> {
        self.items
            .iter()
            .find(|(t, _)| *t == typ)
            .map(|(_, v)| v.as_slice())
    }

    /// Set value for type.
    ///
    /// Replaces an existing value in place, otherwise appends.
    pub fn set(&mut self, typ: TlvType, value: impl Into<Vec<u8>>) {
        self.set_raw(typ as u8, value);
    }

    /// Set value for raw type.
    pub fn set_raw(&mut self, typ: u8, value: impl Into<Vec<u8>>) {
        let value = value.into();
        match self.items.iter_mut().find(|(t, _)| *t == typ) {
            Some((_, existing)) => *existing = value,
            None => self.items.push((typ, value)),
        }
    }

    /// Builder form of [`Tlv8::set`].
    pub fn with(mut self, typ: TlvType, value: impl Into<Vec<u8>>) -> Self {
        self.set(typ, value);
        self
    }

    /// Check if type is present.
    pub fn contains(&self, typ: TlvType) -> bool {
        self.get(typ).is_some()
    }

    /// Tags in insertion order.
    pub fn types(&self) -> impl Iterator<Item = u8> + '_ {
        self.items.iter().map(|(t, _)| *t)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Get state value (single byte).
    pub fn state(&self) -> Option<u8> {
        self.get(TlvType::State).and_then(|v| v.first().copied())
    }

    /// Get error value (single byte).
    pub fn error(&self) -> Option<u8> {
        self.get(TlvType::Error).and_then(|v| v.first().copied())
    }

    /// Get retry delay value in seconds (for rate limiting).
    /// The value is little-endian encoded (1-2 bytes).
    pub fn retry_delay(&self) -> Option<u16> {
        self.get(TlvType::RetryDelay).map(|v| match v.len() {
            0 => 0,
            1 => v[0] as u16,
            _ => u16::from_le_bytes([v[0], v[1]]),
        })
    }

    /// Get error description string.
    pub fn error_description(&self) -> Option<String> {
        let error_code = self.error()?;
        let error_name = match error_code {
            0x01 => "Unknown",
            0x02 => "Authentication",
            0x03 => "Backoff (rate limited)",
            0x04 => "MaxPeers",
            0x05 => "MaxTries",
            0x06 => "Unavailable",
            0x07 => "Busy",
            _ => "Unknown error code",
        };

        let mut desc = format!("Error 0x{:02x}: {}", error_code, error_name);

        if let Some(delay) = self.retry_delay().filter(|d| *d > 0) {
            desc.push_str(&format!(" (retry after {} seconds)", delay));
        }

        Some(desc)
    }

    /// Create M1 pair-setup request: `{Method=PairSetup, State=1}`.
    pub fn pair_setup_m1() -> Self {
        Self::new()
            .with(TlvType::Method, vec![0x00])
            .with(TlvType::State, vec![0x01])
    }

    /// Create M1 pair-verify request: `{PublicKey, State=1}`.
    pub fn pair_verify_m1(public_key: &[u8; 32]) -> Self {
        Self::new()
            .with(TlvType::PublicKey, public_key.to_vec())
            .with(TlvType::State, vec![0x01])
    }
}
