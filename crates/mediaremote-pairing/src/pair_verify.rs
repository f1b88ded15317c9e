//! Pair-verify protocol (M1-M4).
//!
//! Re-authenticates a previously paired device with a fresh X25519 exchange,
//! each side signing both ephemeral keys with its long-term Ed25519 key.
//!
//! ```text
//! controller                               device
//!   M1 {State=1, PublicKey(eph)}    ---->
//!                                   <----  M2 {State=2, PublicKey(eph), EncryptedData}
//!   M3 {State=3, EncryptedData}     ---->
//!                                   <----  M4 {State=4}
//! ```

use mediaremote_core::error::{Error, PairingError, Result};
use mediaremote_crypto::{
    chacha::{decrypt_with_nonce, encrypt_with_nonce, nonce_from_string, PV_MSG02, PV_MSG03},
    curve25519::EphemeralKeyPair,
    ed25519,
    keys::{EncryptionKey, SessionKeys, SharedSecret},
    tlv::{Tlv8, TlvType},
};

use crate::identity::ControllerIdentity;
use crate::message::{parse_response, require, require_array};
use crate::store::PairingRecord;

/// Coarse pair-verify phase, as seen from outside the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyPhase {
    /// Exchanging ephemeral keys (M1/M2).
    Start,
    /// Sending our signature and waiting for the device's confirmation.
    Confirm,
    Done,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairVerifyState {
    Initial,
    M1Sent,
    M2Received,
    M3Sent,
    Complete,
    Failed,
}

/// Pair-verify state machine for one connection attempt.
pub struct PairVerify {
    state: PairVerifyState,
    identity: ControllerIdentity,
    peer_id: Vec<u8>,
    peer_public_key: [u8; 32],
    ephemeral: Option<EphemeralKeyPair>,
    own_ephemeral: [u8; 32],
    peer_ephemeral: Option<[u8; 32]>,
    shared_secret: Option<SharedSecret>,
    session_key: Option<EncryptionKey>,
}

impl PairVerify {
    /// Prepare to verify the device described by `record`.
    pub fn new(record: &PairingRecord) -> Self {
        Self::with_ephemeral(record, EphemeralKeyPair::generate())
    }

    fn with_ephemeral(record: &PairingRecord, ephemeral: EphemeralKeyPair) -> Self {
        Self {
            state: PairVerifyState::Initial,
            identity: record.identity(),
            peer_id: record.peer_id.clone(),
            peer_public_key: record.peer_public_key,
            own_ephemeral: ephemeral.public_key(),
            ephemeral: Some(ephemeral),
            peer_ephemeral: None,
            shared_secret: None,
            session_key: None,
        }
    }

    /// Generate M1 request.
    ///
    /// M1: {PublicKey(32B X25519), State=0x01}
    pub fn generate_m1(&mut self) -> Result<Vec<u8>> {
        self.expect_state(PairVerifyState::Initial, "M1")?;
        self.state = PairVerifyState::M1Sent;
        tracing::debug!("Pair-verify M1");
        Ok(Tlv8::pair_verify_m1(&self.own_ephemeral).encode())
    }

    /// Process M2: complete ECDH and authenticate the device.
    ///
    /// M2: {State=0x02, PublicKey(32B), EncryptedData}
    /// EncryptedData contains TLV: {Identifier, Signature}
    pub fn process_m2(&mut self, response: &[u8]) -> Result<()> {
        self.expect_state(PairVerifyState::M1Sent, "M2")?;
        let result = self.try_process_m2(response);
        self.settle(result, PairVerifyState::M2Received)
    }

    fn try_process_m2(&mut self, response: &[u8]) -> Result<()> {
        let tlv = parse_response(response, 0x02)?;
        let peer_ephemeral = require_array::<32>(&tlv, TlvType::PublicKey)?;
        let encrypted = require(&tlv, TlvType::EncryptedData)?;

        let ephemeral = self
            .ephemeral
            .take()
            .ok_or_else(|| PairingError::InvalidState("ephemeral key already used".to_string()))?;
        let shared_secret = ephemeral.diffie_hellman(&peer_ephemeral)?;
        let session_key = SessionKeys::derive_pair_verify_key(&shared_secret)?;

        let decrypted = decrypt_with_nonce(
            session_key.as_bytes(),
            &nonce_from_string(PV_MSG02),
            encrypted,
        )
        .map_err(|_| PairingError::AeadTagInvalid)?;

        let inner = Tlv8::parse(&decrypted).map_err(PairingError::from)?;
        let peer_id = require(&inner, TlvType::Identifier)?;
        let signature = require(&inner, TlvType::Signature)?;

        if peer_id != self.peer_id.as_slice() {
            return Err(PairingError::IdentityMismatch {
                expected: String::from_utf8_lossy(&self.peer_id).into_owned(),
                actual: String::from_utf8_lossy(peer_id).into_owned(),
            }
            .into());
        }

        // AccessoryEph || AccessoryPairingID || ControllerEph
        let mut message = Vec::with_capacity(32 + peer_id.len() + 32);
        message.extend_from_slice(&peer_ephemeral);
        message.extend_from_slice(peer_id);
        message.extend_from_slice(&self.own_ephemeral);

        ed25519::verify(&self.peer_public_key, &message, signature)
            .map_err(|_| PairingError::SignatureInvalid)?;

        self.peer_ephemeral = Some(peer_ephemeral);
        self.shared_secret = Some(shared_secret);
        self.session_key = Some(session_key);
        Ok(())
    }

    /// Generate M3 request with our signature over both ephemeral keys.
    ///
    /// M3: {State=0x03, EncryptedData}
    /// EncryptedData contains TLV: {Identifier, Signature}
    pub fn generate_m3(&mut self) -> Result<Vec<u8>> {
        self.expect_state(PairVerifyState::M2Received, "M3")?;
        let result = self.try_generate_m3();
        self.settle(result, PairVerifyState::M3Sent)
    }

    fn try_generate_m3(&mut self) -> Result<Vec<u8>> {
        let (peer_ephemeral, session_key) = match (&self.peer_ephemeral, &self.session_key) {
            (Some(eph), Some(key)) => (eph, key),
            _ => {
                return Err(PairingError::InvalidState("M2 not processed".to_string()).into())
            }
        };

        // ControllerEph || ControllerPairingID || AccessoryEph
        let own_id = self.identity.id();
        let mut message = Vec::with_capacity(32 + own_id.len() + 32);
        message.extend_from_slice(&self.own_ephemeral);
        message.extend_from_slice(own_id);
        message.extend_from_slice(peer_ephemeral);

        let inner = Tlv8::new()
            .with(TlvType::Identifier, own_id.to_vec())
            .with(TlvType::Signature, self.identity.sign(&message).to_vec());

        let encrypted = encrypt_with_nonce(
            session_key.as_bytes(),
            &nonce_from_string(PV_MSG03),
            &inner.encode(),
        )?;

        tracing::debug!("Pair-verify M3");
        Ok(Tlv8::new()
            .with(TlvType::State, vec![0x03])
            .with(TlvType::EncryptedData, encrypted)
            .encode())
    }

    /// Process M4 confirmation and hand out the ECDH shared secret.
    ///
    /// M4: {State=0x04}
    pub fn process_m4(&mut self, response: &[u8]) -> Result<SharedSecret> {
        self.expect_state(PairVerifyState::M3Sent, "M4")?;
        let result = self.try_process_m4(response);
        self.settle(result, PairVerifyState::Complete)
    }

    fn try_process_m4(&mut self, response: &[u8]) -> Result<SharedSecret> {
        parse_response(response, 0x04)?;

        let shared_secret = self
            .shared_secret
            .take()
            .ok_or_else(|| PairingError::InvalidState("shared secret missing".to_string()))?;
        self.session_key = None;
        self.peer_ephemeral = None;

        tracing::debug!(peer_id = %String::from_utf8_lossy(&self.peer_id), "Pair-verify complete");
        Ok(shared_secret)
    }

    /// Current phase of the handshake.
    pub fn phase(&self) -> VerifyPhase {
        match self.state {
            PairVerifyState::Initial | PairVerifyState::M1Sent => VerifyPhase::Start,
            PairVerifyState::M2Received | PairVerifyState::M3Sent => VerifyPhase::Confirm,
            PairVerifyState::Complete => VerifyPhase::Done,
            PairVerifyState::Failed => VerifyPhase::Aborted,
        }
    }

    /// Get current step name.
    pub fn state(&self) -> &'static str {
        match self.state {
            PairVerifyState::Initial => "initial",
            PairVerifyState::M1Sent => "m1_sent",
            PairVerifyState::M2Received => "m2_received",
            PairVerifyState::M3Sent => "m3_sent",
            PairVerifyState::Complete => "complete",
            PairVerifyState::Failed => "failed",
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == PairVerifyState::Complete
    }

    /// Abandon the handshake and drop all ephemeral material.
    pub fn abort(&mut self) {
        if self.state != PairVerifyState::Failed {
            tracing::debug!(state = self.state(), "Pair-verify aborted");
        }
        self.state = PairVerifyState::Failed;
        self.ephemeral = None;
        self.peer_ephemeral = None;
        self.shared_secret = None;
        self.session_key = None;
    }

    fn expect_state(&mut self, expected: PairVerifyState, step: &str) -> Result<()> {
        if self.state == expected {
            return Ok(());
        }
        let err = Error::Pairing(PairingError::InvalidState(format!(
            "{} not allowed in state {}",
            step,
            self.state()
        )));
        self.abort();
        Err(err)
    }

    fn settle<T>(&mut self, result: Result<T>, next: PairVerifyState) -> Result<T> {
        match result {
            Ok(value) => {
                self.state = next;
                Ok(value)
            }
            Err(e) => {
                tracing::debug!(error = %e, "Pair-verify step failed");
                self.abort();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
pub(crate) use mock::MockVerifyServer;
