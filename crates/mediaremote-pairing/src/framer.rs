//! Encrypted framing for the established control channel.
//!
//! ```text
//! +------------------+---------------------------+
//! | varint(len)      | ciphertext + tag (len)     |
//! +------------------+---------------------------+
//! ```
//!
//! - varint: LEB128, 7 data bits per byte, MSB set on all but the last byte
//! - ciphertext: ChaCha20-Poly1305, no associated data, 16-byte tag appended
//! - nonce: 4 zero bytes followed by the direction's counter as u64 LE
//!
//! The codec is sans-IO: bytes go in through [`FrameCodec::feed`] in whatever
//! pieces the transport delivers them, and complete messages come out of
//! [`FrameCodec::next_frame`].

use mediaremote_core::error::{PairingError, Result};
use mediaremote_crypto::chacha::{DirectionalCipher, TAG_LEN};
use mediaremote_crypto::keys::SessionKeys;

/// Longest varint accepted for a 64-bit length.
pub const MAX_VARINT_LEN: usize = 10;

/// Largest ciphertext (including the tag) a frame may declare.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Counter value that is never used as a nonce; the counter wraps to 0 instead.
const COUNTER_WRAP: u64 = 0xFFFF_FFFF;

/// Append `value` as a LEB128 varint.
pub fn encode_varint(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Decode a varint from the start of `buf`.
///
/// Returns `Ok(None)` if `buf` ends before the varint does, otherwise the value
/// and the number of bytes it occupied.
pub fn decode_varint(buf: &[u8]) -> Result<Option<(u64, usize)>> {
    let mut value: u64 = 0;
    for (i, &byte) in buf.iter().enumerate() {
        if i == MAX_VARINT_LEN - 1 && byte > 0x01 {
            return Err(PairingError::MalformedFrame("varint overflows u64".to_string()).into());
        }
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }
    Ok(None)
}

/// Per-direction message counter.
///
/// Yields 0, 1, 2, ... and wraps to 0 right after 0xFFFFFFFE.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NonceCounter {
    next: u64,
}

impl NonceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn starting_at(next: u64) -> Self {
        Self { next }
    }

    /// The value the next message will use.
    pub fn peek(&self) -> u64 {
        self.next
    }

    /// Take the current value and advance.
    pub fn advance(&mut self) -> u64 {
        let current = self.next;
        self.next += 1;
        if self.next == COUNTER_WRAP {
            self.next = 0;
        }
        current
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CodecState {
    Open,
    Closed,
}

/// Frame encoder/decoder for one connection.
pub struct FrameCodec {
    write_cipher: DirectionalCipher,
    read_cipher: DirectionalCipher,
    write_counter: NonceCounter,
    read_counter: NonceCounter,
    buffer: Vec<u8>,
    state: CodecState,
}

impl FrameCodec {
    /// Create a codec from the session keys of a finished pair-verify.
    pub fn new(keys: &SessionKeys) -> Self {
        Self::with_keys(*keys.write_key.as_bytes(), *keys.read_key.as_bytes())
    }

    /// Create a codec with explicit keys.
    ///
    /// The peer side of a connection uses the same keys swapped.
    pub fn with_keys(write_key: [u8; 32], read_key: [u8; 32]) -> Self {
        Self {
            write_cipher: DirectionalCipher::new(write_key),
            read_cipher: DirectionalCipher::new(read_key),
            write_counter: NonceCounter::new(),
            read_counter: NonceCounter::new(),
            buffer: Vec::new(),
            state: CodecState::Open,
        }
    }

    /// Encrypt `plaintext` and return the complete frame.
    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.ensure_open()?;
        if plaintext.len() > MAX_FRAME_LEN - TAG_LEN {
            return Err(PairingError::MalformedFrame(format!(
                "message of {} bytes exceeds frame limit",
                plaintext.len()
            ))
            .into());
        }

        let counter = self.write_counter.advance();
        let ciphertext = self.write_cipher.seal(counter, plaintext)?;

        let mut frame = Vec::with_capacity(MAX_VARINT_LEN + ciphertext.len());
        encode_varint(ciphertext.len() as u64, &mut frame);
        frame.extend_from_slice(&ciphertext);

        tracing::trace!(counter, len = ciphertext.len(), "Sealed frame");
        Ok(frame)
    }

    /// Append received bytes to the receive buffer.
    pub fn feed(&mut self, data: &[u8]) {
        if self.state == CodecState::Open {
            self.buffer.extend_from_slice(data);
        }
    }

    /// Decode the next complete frame, if the buffer holds one.
    ///
    /// A frame that fails authentication, or declares a length above
    /// [`MAX_FRAME_LEN`], closes the codec for good: the buffer is discarded
    /// and every later call fails.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;

        let (len, header_len) = match decode_varint(&self.buffer) {
            Ok(Some(prefix)) => prefix,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.close();
                return Err(e);
            }
        };

        let len = match usize::try_from(len) {
            Ok(len) if len <= MAX_FRAME_LEN => len,
            _ => {
                tracing::warn!(len, "Frame length above limit, closing channel");
                self.close();
                return Err(PairingError::MalformedFrame(format!(
                    "frame length {} exceeds {}",
                    len, MAX_FRAME_LEN
                ))
                .into());
            }
        };

        let total = header_len + len;
        if self.buffer.len() < total {
            return Ok(None);
        }

        let frame: Vec<u8> = self.buffer.drain(..total).skip(header_len).collect();
        let counter = self.read_counter.advance();

        match self.read_cipher.open(counter, &frame) {
            Ok(plaintext) => {
                tracing::trace!(counter, len, "Opened frame");
                Ok(Some(plaintext))
            }
            Err(_) => {
                tracing::warn!(counter, len, "Frame failed authentication, closing channel");
                self.close();
                Err(PairingError::AeadTagInvalid.into())
            }
        }
    }

    /// True if bytes of an incomplete frame are buffered.
    pub fn has_partial_frame(&self) -> bool {
        !self.buffer.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.state == CodecState::Closed
    }

    /// Counter the next outgoing frame will use.
    pub fn write_counter(&self) -> u64 {
        self.write_counter.peek()
    }

    /// Counter the next incoming frame will use.
    pub fn read_counter(&self) -> u64 {
        self.read_counter.peek()
    }

    fn close(&mut self) {
        self.state = CodecState::Closed;
        self.buffer.clear();
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            CodecState::Open => Ok(()),
            CodecState::Closed => Err(PairingError::TransportClosed.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediaremote_core::error::Error;

    const KEY_A: [u8; 32] = [0x0a; 32];
    const KEY_B: [u8; 32] = [0x0b; 32];

    /// Controller and accessory ends of one connection.
    fn codec_pair() -> (FrameCodec, FrameCodec) {
        (
            FrameCodec::with_keys(KEY_A, KEY_B),
            FrameCodec::with_keys(KEY_B, KEY_A),
        )
    }

    mod varint {
        use super::*;

        fn encoded(value: u64) -> Vec<u8> {
            let mut out = Vec::new();
            encode_varint(value, &mut out);
            out
        }

        #[test]
        fn single_byte_values() {
            assert_eq!(encoded(0), vec![0x00]);
            assert_eq!(encoded(1), vec![0x01]);
            assert_eq!(encoded(127), vec![0x7f]);
        }

        #[test]
        fn multi_byte_values() {
            assert_eq!(encoded(128), vec![0x80, 0x01]);
            assert_eq!(encoded(300), vec![0xac, 0x02]);
            assert_eq!(encoded(16384), vec![0x80, 0x80, 0x01]);
        }

        #[test]
        fn max_value_uses_ten_bytes() {
            let bytes = encoded(u64::MAX);
            assert_eq!(bytes.len(), MAX_VARINT_LEN);
            assert_eq!(decode_varint(&bytes).unwrap(), Some((u64::MAX, 10)));
        }

        #[test]
        fn decode_reports_consumed_bytes() {
            assert_eq!(decode_varint(&[0xac, 0x02, 0xff]).unwrap(), Some((300, 2)));
        }

        #[test]
        fn decode_incomplete_returns_none() {
            assert_eq!(decode_varint(&[]).unwrap(), None);
            assert_eq!(decode_varint(&[0x80]).unwrap(), None);
            assert_eq!(decode_varint(&[0xff, 0xff]).unwrap(), None);
        }

        #[test]
        fn decode_rejects_overlong_prefix() {
            let bytes = [0x80u8; 11];
            assert!(matches!(
                decode_varint(&bytes),
                Err(Error::Pairing(PairingError::MalformedFrame(_)))
            ));
        }

        #[test]
        fn decode_rejects_u64_overflow() {
            let mut bytes = vec![0xffu8; 9];
            bytes.push(0x02);
            assert!(decode_varint(&bytes).is_err());
        }
    }

    mod nonce_counter {
        use super::*;

        #[test]
        fn counts_from_zero() {
            let mut counter = NonceCounter::new();
            let values: Vec<u64> = (0..5).map(|_| counter.advance()).collect();
            assert_eq!(values, vec![0, 1, 2, 3, 4]);
            assert_eq!(counter.peek(), 5);
        }

        #[test]
        fn wraps_after_0xfffffffe() {
            let mut counter = NonceCounter::starting_at(0xFFFF_FFFD);
            assert_eq!(counter.advance(), 0xFFFF_FFFD);
            assert_eq!(counter.advance(), 0xFFFF_FFFE);
            assert_eq!(counter.advance(), 0);
            assert_eq!(counter.advance(), 1);
        }

        #[test]
        fn never_yields_0xffffffff() {
            let mut counter = NonceCounter::starting_at(0xFFFF_FFF0);
            for _ in 0..64 {
                assert_ne!(counter.advance(), COUNTER_WRAP);
            }
        }
    }

    mod sealing {
        use super::*;

        #[test]
        fn frame_is_varint_then_ciphertext_and_tag() {
            let (mut controller, _) = codec_pair();
            let frame = controller.seal(b"hello").unwrap();

            assert_eq!(frame[0] as usize, 5 + 16);
            assert_eq!(frame.len(), 1 + 5 + 16);
        }

        #[test]
        fn uses_counter_nonce_without_aad() {
            let (mut controller, _) = codec_pair();
            controller.seal(b"first").unwrap();
            let frame = controller.seal(b"second").unwrap();

            let expected = DirectionalCipher::new(KEY_A).seal(1, b"second").unwrap();
            assert_eq!(&frame[1..], expected.as_slice());
        }

        #[test]
        fn write_counter_increments_per_message() {
            let (mut controller, _) = codec_pair();
            for expected in 0..10 {
                assert_eq!(controller.write_counter(), expected);
                controller.seal(b"x").unwrap();
            }
        }

        #[test]
        fn rejects_message_above_frame_limit() {
            let (mut controller, _) = codec_pair();
            let message = vec![0u8; MAX_FRAME_LEN - TAG_LEN + 1];
            assert!(matches!(
                controller.seal(&message),
                Err(Error::Pairing(PairingError::MalformedFrame(_)))
            ));
            // Nothing was sent, so the counter did not move
            assert_eq!(controller.write_counter(), 0);
            assert!(!controller.is_closed());
        }

        #[test]
        fn large_message_uses_multi_byte_prefix() {
            let (mut controller, mut accessory) = codec_pair();
            let message = vec![0x42u8; 1000];
            let frame = controller.seal(&message).unwrap();

            assert_eq!(decode_varint(&frame).unwrap(), Some((1016, 2)));

            accessory.feed(&frame);
            assert_eq!(accessory.next_frame().unwrap(), Some(message));
        }
    }

    mod receiving {
        use super::*;

        #[test]
        fn decodes_in_arrival_order() {
            let (mut controller, mut accessory) = codec_pair();
            for msg in [&b"one"[..], b"two", b"three"] {
                let frame = accessory.seal(msg).unwrap();
                controller.feed(&frame);
            }

            assert_eq!(controller.next_frame().unwrap(), Some(b"one".to_vec()));
            assert_eq!(controller.next_frame().unwrap(), Some(b"two".to_vec()));
            assert_eq!(controller.next_frame().unwrap(), Some(b"three".to_vec()));
            assert_eq!(controller.next_frame().unwrap(), None);
            assert_eq!(controller.read_counter(), 3);
        }

        #[test]
        fn one_byte_at_a_time() {
            let (mut controller, mut accessory) = codec_pair();
            let frame = accessory.seal(b"fragmented delivery").unwrap();

            for (i, byte) in frame.iter().enumerate() {
                assert_eq!(controller.next_frame().unwrap(), None, "emitted early at byte {}", i);
                controller.feed(&[*byte]);
            }

            assert_eq!(
                controller.next_frame().unwrap(),
                Some(b"fragmented delivery".to_vec())
            );
            assert_eq!(controller.next_frame().unwrap(), None);
            assert!(!controller.has_partial_frame());
        }

        #[test]
        fn partial_frame_is_kept_until_complete() {
            let (mut controller, mut accessory) = codec_pair();
            let first = accessory.seal(b"first").unwrap();
            let second = accessory.seal(b"second").unwrap();

            let mut stream = first.clone();
            stream.extend_from_slice(&second[..4]);
            controller.feed(&stream);

            assert_eq!(controller.next_frame().unwrap(), Some(b"first".to_vec()));
            assert_eq!(controller.next_frame().unwrap(), None);
            assert!(controller.has_partial_frame());

            controller.feed(&second[4..]);
            assert_eq!(controller.next_frame().unwrap(), Some(b"second".to_vec()));
        }

        #[test]
        fn every_tampered_byte_is_rejected() {
            let (_, mut accessory) = codec_pair();
            let frame = accessory.seal(b"integrity protected").unwrap();

            // Byte 0 is the length prefix; flip every ciphertext and tag byte
            for i in 1..frame.len() {
                let mut controller = FrameCodec::with_keys(KEY_A, KEY_B);
                let mut tampered = frame.clone();
                tampered[i] ^= 0x01;
                controller.feed(&tampered);

                assert!(
                    matches!(
                        controller.next_frame(),
                        Err(Error::Pairing(PairingError::AeadTagInvalid))
                    ),
                    "byte {} not detected",
                    i
                );
            }
        }

        #[test]
        fn authentication_failure_closes_codec() {
            let (mut controller, mut accessory) = codec_pair();
            let mut bad = accessory.seal(b"bad").unwrap();
            let last = bad.len() - 1;
            bad[last] ^= 0xff;
            let good = accessory.seal(b"good").unwrap();

            controller.feed(&bad);
            controller.feed(&good);
            assert!(controller.next_frame().is_err());

            assert!(controller.is_closed());
            assert!(!controller.has_partial_frame());
            assert!(matches!(
                controller.next_frame(),
                Err(Error::Pairing(PairingError::TransportClosed))
            ));
            assert!(controller.seal(b"more").is_err());
        }

        #[test]
        fn oversized_length_prefix_closes_codec() {
            let (mut controller, _) = codec_pair();
            let mut prefix = Vec::new();
            encode_varint(MAX_FRAME_LEN as u64 + 1, &mut prefix);

            // Only the prefix arrives; the codec must not wait for the body
            controller.feed(&prefix);
            assert!(matches!(
                controller.next_frame(),
                Err(Error::Pairing(PairingError::MalformedFrame(_)))
            ));
            assert!(controller.is_closed());
            assert!(!controller.has_partial_frame());
        }

        #[test]
        fn u64_max_length_prefix_is_rejected() {
            let (mut controller, _) = codec_pair();
            let mut prefix = Vec::new();
            encode_varint(u64::MAX, &mut prefix);
            controller.feed(&prefix);
            assert!(controller.next_frame().is_err());
            assert!(controller.is_closed());
        }

        #[test]
        fn frame_at_limit_is_accepted() {
            let (mut controller, mut accessory) = codec_pair();
            let message = vec![0x5au8; MAX_FRAME_LEN - TAG_LEN];
            let frame = accessory.seal(&message).unwrap();
            assert_eq!(decode_varint(&frame).unwrap(), Some((MAX_FRAME_LEN as u64, 3)));

            controller.feed(&frame);
            assert_eq!(controller.next_frame().unwrap(), Some(message));
        }

        #[test]
        fn wrong_direction_key_fails() {
            let (mut controller, _) = codec_pair();
            let frame = FrameCodec::with_keys(KEY_A, KEY_B).seal(b"echo").unwrap();
            controller.feed(&frame);
            assert!(controller.next_frame().is_err());
        }

        #[test]
        fn skipped_frame_breaks_counter_sync() {
            let (mut controller, mut accessory) = codec_pair();
            let _dropped = accessory.seal(b"lost").unwrap();
            let frame = accessory.seal(b"arrives").unwrap();

            controller.feed(&frame);
            assert!(matches!(
                controller.next_frame(),
                Err(Error::Pairing(PairingError::AeadTagInvalid))
            ));
        }

        #[test]
        fn session_keys_constructor_matches_explicit_keys() {
            use mediaremote_crypto::keys::SharedSecret;

            let keys = SessionKeys::derive(&SharedSecret::new(vec![0xab; 32])).unwrap();
            let mut controller = FrameCodec::new(&keys);
            let mut accessory =
                FrameCodec::with_keys(*keys.read_key.as_bytes(), *keys.write_key.as_bytes());

            let frame = controller.seal(b"ping").unwrap();
            accessory.feed(&frame);
            assert_eq!(accessory.next_frame().unwrap(), Some(b"ping".to_vec()));
        }
    }
}
