//! Checks shared by the pair-setup and pair-verify response parsers.

use mediaremote_core::error::{PairingError, Result};
use mediaremote_crypto::tlv::{Tlv8, TlvType};

/// Peer error code for a failed authentication (wrong PIN).
pub(crate) const ERROR_AUTHENTICATION: u8 = 0x02;

/// Parse a peer response and check it carries `expected_state`.
///
/// An `Error` TLV takes precedence over the state check.
pub(crate) fn parse_response(response: &[u8], expected_state: u8) -> Result<Tlv8> {
    let tlv = Tlv8::parse(response).map_err(PairingError::from)?;

    if let Some(code) = tlv.error() {
        tracing::warn!(
            state = expected_state,
            error = %tlv.error_description().unwrap_or_default(),
            "Peer returned error"
        );
        if code == ERROR_AUTHENTICATION {
            return Err(PairingError::AuthenticationFailure.into());
        }
        return Err(PairingError::PeerError {
            code,
            retry_delay: tlv.retry_delay(),
        }
        .into());
    }

    match tlv.state() {
        Some(state) if state == expected_state => Ok(tlv),
        Some(actual) => Err(PairingError::StateMismatch {
            expected: expected_state,
            actual,
        }
        .into()),
        None => Err(PairingError::MissingTlv(TlvType::State as u8).into()),
    }
}

/// Fetch a TLV that must be present.
pub(crate) fn require(tlv: &Tlv8, typ: TlvType) -> Result<&[u8]> {
    tlv.get(typ)
        .ok_or_else(|| PairingError::MissingTlv(typ as u8).into())
}

/// Fetch a TLV that must be exactly `N` bytes long.
pub(crate) fn require_array<const N: usize>(tlv: &Tlv8, typ: TlvType) -> Result<[u8; N]> {
    let value = require(tlv, typ)?;
    value.try_into().map_err(|_| {
        PairingError::MalformedTlv(format!(
            "TLV 0x{:02x} has length {} (expected {})",
            typ as u8,
            value.len(),
            N
        ))
        .into()
    })
}
