//! Pairing controller: the single entry point for securing a connection.
//!
//! Looks up the stored pairing for a device, runs pair-setup when there is
//! none, always runs pair-verify, and hands back a [`SecureChannel`].

use std::sync::Arc;

use mediaremote_core::error::Result;
use mediaremote_crypto::keys::{SessionKeys, SharedSecret};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::channel::SecureChannel;
use crate::identity::ControllerIdentity;
use crate::pair_setup::{PairSetup, PeerIdentity};
use crate::pair_verify::PairVerify;
use crate::store::{PairingRecord, PairingStore};
use crate::traits::{PairingTransport, PinPrompt};
use crate::transport::StreamTransport;

/// Establishes authenticated sessions with devices, one attempt at a time.
pub struct PairingController {
    store: Arc<dyn PairingStore>,
    controller_id: Vec<u8>,
}

impl PairingController {
    /// `controller_id` is the identifier we present in both handshakes.
    pub fn new(store: Arc<dyn PairingStore>, controller_id: impl Into<Vec<u8>>) -> Self {
        Self {
            store,
            controller_id: controller_id.into(),
        }
    }

    pub fn store(&self) -> &Arc<dyn PairingStore> {
        &self.store
    }

    /// Secure `stream` to `device_id`, pairing first if needed.
    ///
    /// Failures are not retried. An identity mismatch removes the stored
    /// pairing; check [`mediaremote_core::Error::is_identity_mismatch`] to
    /// decide whether to prompt for a new pairing.
    pub async fn establish<S>(
        &self,
        stream: S,
        device_id: &str,
        prompt: &dyn PinPrompt,
    ) -> Result<SecureChannel<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut transport = StreamTransport::new(stream);
        let keys = self.authenticate(&mut transport, device_id, prompt).await?;

        let (stream, buffered) = transport.into_parts();
        tracing::info!(device_id, "Secure channel established");
        Ok(SecureChannel::with_buffered(stream, &keys, &buffered))
    }

    /// Run the handshakes over `transport` and derive the session keys.
    pub async fn authenticate<T>(
        &self,
        transport: &mut T,
        device_id: &str,
        prompt: &dyn PinPrompt,
    ) -> Result<SessionKeys>
    where
        T: PairingTransport + ?Sized,
    {
        let record = match self.store.get(device_id)? {
            Some(record) => {
                tracing::debug!(
                    device_id,
                    peer = %record.peer_id_display(),
                    "Using stored pairing"
                );
                record
            }
            None => {
                tracing::info!(device_id, "No stored pairing, starting pair-setup");
                let record = self.pair_setup(transport, prompt).await?;
                self.store.put(device_id, &record)?;
                tracing::info!(device_id, peer = %record.peer_id_display(), "Paired with device");
                record
            }
        };

        let shared_secret = match self.pair_verify(transport, &record).await {
            Ok(secret) => secret,
            Err(e) if e.is_identity_mismatch() => {
                tracing::warn!(
                    device_id,
                    error = %e,
                    "Device identity changed, forgetting pairing"
                );
                if let Err(delete) = self.store.delete(device_id) {
                    tracing::warn!(device_id, error = %delete, "Failed to delete stale pairing");
                }
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(device_id, error = %e, "Pair-verify failed");
                return Err(e);
            }
        };

        Ok(SessionKeys::derive(&shared_secret)?)
    }

    async fn pair_setup<T>(
        &self,
        transport: &mut T,
        prompt: &dyn PinPrompt,
    ) -> Result<PairingRecord>
    where
        T: PairingTransport + ?Sized,
    {
        let identity = ControllerIdentity::generate(self.controller_id.clone());
        let mut setup = PairSetup::new();

        match run_pair_setup(&mut setup, transport, prompt, &identity).await {
            Ok(peer) => Ok(PairingRecord::new(&identity, peer.id, peer.public_key)),
            Err(e) => {
                setup.abort();
                tracing::warn!(error = %e, "Pair-setup failed");
                Err(e)
            }
        }
    }

    async fn pair_verify<T>(
        &self,
        transport: &mut T,
        record: &PairingRecord,
    ) -> Result<SharedSecret>
    where
        T: PairingTransport + ?Sized,
    {
        let mut verify = PairVerify::new(record);

        let result: Result<SharedSecret> = async {
            let m1 = verify.generate_m1()?;
            let m2 = transport.send_verify(&m1).await?;
            verify.process_m2(&m2)?;

            let m3 = verify.generate_m3()?;
            let m4 = transport.send_verify(&m3).await?;
            verify.process_m4(&m4)
        }
        .await;

        if result.is_err() {
            verify.abort();
        }
        result
    }
}

async fn run_pair_setup<T>(
    setup: &mut PairSetup,
    transport: &mut T,
    prompt: &dyn PinPrompt,
    identity: &ControllerIdentity,
) -> Result<PeerIdentity>
where
    T: PairingTransport + ?Sized,
{
    let m1 = setup.generate_m1()?;
    let m2 = transport.send_setup(&m1).await?;
    setup.process_m2(&m2)?;

    let pin = prompt.request_pin().await?;
    let m3 = setup.generate_m3(&pin)?;
    let m4 = transport.send_setup(&m3).await?;
    setup.process_m4(&m4)?;

    let m5 = setup.generate_m5(identity)?;
    let m6 = transport.send_setup(&m5).await?;
    setup.process_m6(&m6)
}
