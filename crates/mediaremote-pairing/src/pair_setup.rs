//! Pair-setup protocol (M1-M6).
//!
//! SRP-6a bootstraps trust from the PIN shown on the device, then both sides
//! exchange their long-term Ed25519 keys encrypted under the SRP session key.
//!
//! ```text
//! controller                               device
//!   M1 {Method=0, State=1}          ---->
//!                                   <----  M2 {State=2, Salt, PublicKey(B)}
//!   M3 {State=3, PublicKey(A), Proof(M1)} ---->
//!                                   <----  M4 {State=4, Proof(M2)}
//!   M5 {State=5, EncryptedData}     ---->
//!                                   <----  M6 {State=6, EncryptedData}
//! ```

use mediaremote_core::error::{Error, PairingError, Result};
use mediaremote_crypto::{
    chacha::{decrypt_with_nonce, encrypt_with_nonce, nonce_from_string, PS_MSG05, PS_MSG06},
    ed25519,
    hkdf,
    keys::{EncryptionKey, SessionKeys, SharedSecret},
    srp::{SrpChallenge, SrpClient, SrpProof, N_BYTES, PAIR_SETUP_IDENTITY},
    tlv::{Tlv8, TlvType},
};

use crate::identity::ControllerIdentity;
use crate::message::{parse_response, require, require_array};

/// Coarse pair-setup phase, as seen from outside the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupPhase {
    /// Exchanging M1/M2.
    Start,
    /// Sending the SRP proof, waiting for the device's proof.
    ClientProof,
    /// Sending our encrypted long-term identity.
    DeviceInfo,
    /// Waiting for and checking the device's long-term identity.
    Verify,
    Done,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairSetupState {
    Initial,
    M1Sent,
    M2Received,
    M3Sent,
    M4Received,
    M5Sent,
    Complete,
    Failed,
}

/// The device's long-term identity learned from M6.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    pub id: Vec<u8>,
    pub public_key: [u8; 32],
}

/// Pair-setup state machine.
///
/// Each `generate_*` / `process_*` call advances one step. Any error leaves
/// the machine in the aborted phase and drops the SRP session.
pub struct PairSetup {
    state: PairSetupState,
    challenge: Option<SrpChallenge>,
    srp_client: Option<SrpClient>,
    srp_proof: Option<SrpProof>,
    session_key: Option<EncryptionKey>,
}

impl Default for PairSetup {
    fn default() -> Self {
        Self::new()
    }
}

impl PairSetup {
    pub fn new() -> Self {
        Self {
            state: PairSetupState::Initial,
            challenge: None,
            srp_client: None,
            srp_proof: None,
            session_key: None,
        }
    }

    /// Generate M1 request.
    ///
    /// M1: {Method=0x00, State=0x01}
    pub fn generate_m1(&mut self) -> Result<Vec<u8>> {
        self.expect_state(PairSetupState::Initial, "M1")?;

        self.state = PairSetupState::M1Sent;
        tracing::debug!("Pair-setup M1");
        Ok(Tlv8::pair_setup_m1().encode())
    }

    /// Process M2 response, extracts salt and server public key.
    ///
    /// M2: {State=0x02, Salt(16B), PublicKey(384B)}
    pub fn process_m2(&mut self, response: &[u8]) -> Result<()> {
        self.expect_state(PairSetupState::M1Sent, "M2")?;
        let result = self.try_process_m2(response);
        self.settle(result, PairSetupState::M2Received)
    }

    fn try_process_m2(&mut self, response: &[u8]) -> Result<()> {
        let tlv = parse_response(response, 0x02)?;

        let salt = require_array::<16>(&tlv, TlvType::Salt)?;
        let server_pk_raw = require(&tlv, TlvType::PublicKey)?;

        // Leading zero bytes of B may be stripped on the wire
        if server_pk_raw.len() > N_BYTES {
            return Err(PairingError::MalformedTlv(format!(
                "M2 public key too long: {} (expected <= {})",
                server_pk_raw.len(),
                N_BYTES
            ))
            .into());
        }
        let mut server_public_key = vec![0u8; N_BYTES - server_pk_raw.len()];
        server_public_key.extend_from_slice(server_pk_raw);

        self.challenge = Some(SrpChallenge {
            salt,
            server_public_key,
        });
        Ok(())
    }

    /// Generate M3 request with the client proof for `pin`.
    ///
    /// M3: {State=0x03, PublicKey(384B), Proof(64B)}
    pub fn generate_m3(&mut self, pin: &str) -> Result<Vec<u8>> {
        self.expect_state(PairSetupState::M2Received, "M3")?;
        let result = self.try_generate_m3(pin);
        self.settle(result, PairSetupState::M3Sent)
    }

    fn try_generate_m3(&mut self, pin: &str) -> Result<Vec<u8>> {
        let challenge = self
            .challenge
            .as_ref()
            .ok_or_else(|| PairingError::InvalidState("SRP challenge missing".to_string()))?;

        let srp_client = SrpClient::new(PAIR_SETUP_IDENTITY, pin.as_bytes())?;
        let proof = srp_client.process_challenge(challenge)?;

        let tlv = Tlv8::new()
            .with(TlvType::State, vec![0x03])
            .with(TlvType::PublicKey, srp_client.public_key())
            .with(TlvType::Proof, proof.client_proof.clone());

        self.srp_client = Some(srp_client);
        self.srp_proof = Some(proof);
        tracing::debug!("Pair-setup M3");
        Ok(tlv.encode())
    }

    /// Process M4 response, verifies server proof.
    ///
    /// M4: {State=0x04, Proof(64B)}
    pub fn process_m4(&mut self, response: &[u8]) -> Result<()> {
        self.expect_state(PairSetupState::M3Sent, "M4")?;
        let result = self.try_process_m4(response);
        self.settle(result, PairSetupState::M4Received)
    }

    fn try_process_m4(&mut self, response: &[u8]) -> Result<()> {
        let tlv = parse_response(response, 0x04)?;
        let server_proof = require(&tlv, TlvType::Proof)?;

        let proof = self
            .srp_proof
            .as_ref()
            .ok_or_else(|| PairingError::InvalidState("SRP proof not computed".to_string()))?;

        if !proof.verify_server_proof(server_proof) {
            return Err(PairingError::AuthenticationFailure.into());
        }

        let srp_key = SharedSecret::new(proof.shared_secret.clone());
        self.session_key = Some(SessionKeys::derive_pair_setup_key(&srp_key)?);
        // A is no longer needed once the proofs have been exchanged
        self.srp_client = None;
        Ok(())
    }

    /// Generate M5 request with our encrypted long-term identity.
    ///
    /// M5: {State=0x05, EncryptedData}
    /// EncryptedData contains TLV: {Identifier, PublicKey(Ed25519), Signature}
    pub fn generate_m5(&mut self, identity: &ControllerIdentity) -> Result<Vec<u8>> {
        self.expect_state(PairSetupState::M4Received, "M5")?;
        let result = self.try_generate_m5(identity);
        self.settle(result, PairSetupState::M5Sent)
    }

    fn try_generate_m5(&mut self, identity: &ControllerIdentity) -> Result<Vec<u8>> {
        let (srp_key, session_key) = self.keys()?;

        // iOSDeviceX || iOSDevicePairingID || iOSDeviceLTPK
        let device_x = hkdf::derive_controller_sign_key(srp_key)?;
        let public_key = identity.public_key();
        let mut message = Vec::with_capacity(32 + identity.id().len() + 32);
        message.extend_from_slice(&device_x);
        message.extend_from_slice(identity.id());
        message.extend_from_slice(&public_key);

        let inner = Tlv8::new()
            .with(TlvType::Identifier, identity.id().to_vec())
            .with(TlvType::PublicKey, public_key.to_vec())
            .with(TlvType::Signature, identity.sign(&message).to_vec());

        let encrypted = encrypt_with_nonce(
            session_key.as_bytes(),
            &nonce_from_string(PS_MSG05),
            &inner.encode(),
        )?;

        tracing::debug!(controller_id = %identity.id_display(), "Pair-setup M5");
        Ok(Tlv8::new()
            .with(TlvType::State, vec![0x05])
            .with(TlvType::EncryptedData, encrypted)
            .encode())
    }

    /// Process M6 response and return the device's verified identity.
    ///
    /// M6: {State=0x06, EncryptedData}
    /// EncryptedData contains TLV: {Identifier, PublicKey(Ed25519), Signature}
    pub fn process_m6(&mut self, response: &[u8]) -> Result<PeerIdentity> {
        self.expect_state(PairSetupState::M5Sent, "M6")?;
        let result = self.try_process_m6(response);
        self.settle(result, PairSetupState::Complete)
    }

    fn try_process_m6(&mut self, response: &[u8]) -> Result<PeerIdentity> {
        let tlv = parse_response(response, 0x06)?;
        let encrypted = require(&tlv, TlvType::EncryptedData)?;

        let (srp_key, session_key) = self.keys()?;

        let decrypted = decrypt_with_nonce(
            session_key.as_bytes(),
            &nonce_from_string(PS_MSG06),
            encrypted,
        )
        .map_err(|_| PairingError::AeadTagInvalid)?;

        let inner = Tlv8::parse(&decrypted).map_err(PairingError::from)?;
        let peer_id = require(&inner, TlvType::Identifier)?;
        let peer_pk = require_array::<32>(&inner, TlvType::PublicKey)?;
        let signature = require(&inner, TlvType::Signature)?;

        // AccessoryX || AccessoryPairingID || AccessoryLTPK
        let accessory_x = hkdf::derive_accessory_sign_key(srp_key)?;
        let mut message = Vec::with_capacity(32 + peer_id.len() + 32);
        message.extend_from_slice(&accessory_x);
        message.extend_from_slice(peer_id);
        message.extend_from_slice(&peer_pk);

        ed25519::verify(&peer_pk, &message, signature)
            .map_err(|_| PairingError::SignatureInvalid)?;

        tracing::debug!(peer_id = %String::from_utf8_lossy(peer_id), "Pair-setup M6 verified");
        Ok(PeerIdentity {
            id: peer_id.to_vec(),
            public_key: peer_pk,
        })
    }

    /// Current phase of the handshake.
    pub fn phase(&self) -> SetupPhase {
        match self.state {
            PairSetupState::Initial | PairSetupState::M1Sent => SetupPhase::Start,
            PairSetupState::M2Received | PairSetupState::M3Sent => SetupPhase::ClientProof,
            PairSetupState::M4Received => SetupPhase::DeviceInfo,
            PairSetupState::M5Sent => SetupPhase::Verify,
            PairSetupState::Complete => SetupPhase::Done,
            PairSetupState::Failed => SetupPhase::Aborted,
        }
    }

    /// Get current step name.
    pub fn state(&self) -> &'static str {
        match self.state {
            PairSetupState::Initial => "initial",
            PairSetupState::M1Sent => "m1_sent",
            PairSetupState::M2Received => "m2_received",
            PairSetupState::M3Sent => "m3_sent",
            PairSetupState::M4Received => "m4_received",
            PairSetupState::M5Sent => "m5_sent",
            PairSetupState::Complete => "complete",
            PairSetupState::Failed => "failed",
        }
    }

    /// Check if pairing completed successfully.
    pub fn is_complete(&self) -> bool {
        self.state == PairSetupState::Complete
    }

    /// Abandon the handshake and drop all SRP material.
    pub fn abort(&mut self) {
        if self.state != PairSetupState::Failed {
            tracing::debug!(state = self.state(), "Pair-setup aborted");
        }
        self.state = PairSetupState::Failed;
        self.challenge = None;
        self.srp_client = None;
        self.srp_proof = None;
        self.session_key = None;
    }

    fn keys(&self) -> Result<(&[u8], &EncryptionKey)> {
        match (&self.srp_proof, &self.session_key) {
            (Some(proof), Some(key)) => Ok((&proof.shared_secret, key)),
            _ => Err(PairingError::InvalidState("session key not derived".to_string()).into()),
        }
    }

    fn expect_state(&mut self, expected: PairSetupState, step: &str) -> Result<()> {
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

    fn settle<T>(&mut self, result: Result<T>, next: PairSetupState) -> Result<T> {
        match result {
            Ok(value) => {
                self.state = next;
                if next == PairSetupState::Complete {
                    self.srp_proof = None;
                    self.session_key = None;
                }
                Ok(value)
            }
            Err(e) => {
                tracing::debug!(error = %e, "Pair-setup step failed");
                self.abort();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
pub(crate) use mock::MockSetupServer;
