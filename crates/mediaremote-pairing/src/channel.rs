//! Encrypted control channel returned by a successful pairing.

use mediaremote_core::error::{PairingError, Result};
use mediaremote_crypto::keys::SessionKeys;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::framer::FrameCodec;
use crate::transport::read_error;

const READ_CHUNK: usize = 4096;

/// Authenticated, encrypted message channel over one connection.
///
/// `send` returns once the frame is flushed; `recv` yields messages in arrival
/// order. A frame that fails authentication closes the channel.
pub struct SecureChannel<S> {
    stream: S,
    codec: FrameCodec,
}

impl<S> SecureChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap `stream` with the keys from pair-verify.
    pub fn new(stream: S, keys: &SessionKeys) -> Self {
        Self::from_codec(stream, FrameCodec::new(keys))
    }

    /// Like [`SecureChannel::new`], seeding the receive buffer with bytes
    /// already read from the stream during the handshake.
    pub fn with_buffered(stream: S, keys: &SessionKeys, buffered: &[u8]) -> Self {
        let mut codec = FrameCodec::new(keys);
        codec.feed(buffered);
        Self::from_codec(stream, codec)
    }

    pub fn from_codec(stream: S, codec: FrameCodec) -> Self {
        Self { stream, codec }
    }

    /// Encrypt and write one message.
    pub async fn send(&mut self, message: &[u8]) -> Result<()> {
        let frame = self.codec.seal(message)?;
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Receive the next message.
    ///
    /// Returns `Ok(None)` when the peer closes the connection between frames.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.codec.next_frame() {
                Ok(Some(message)) => return Ok(Some(message)),
                Ok(None) => {}
                Err(e) => {
                    if let Err(shutdown) = self.stream.shutdown().await {
                        tracing::debug!(error = %shutdown, "Shutdown after frame error failed");
                    }
                    return Err(e);
                }
            }

            let n = self.stream.read(&mut chunk).await.map_err(read_error)?;
            if n == 0 {
                if self.codec.has_partial_frame() {
                    return Err(PairingError::TransportClosed.into());
                }
                tracing::debug!("Peer closed secure channel");
                return Ok(None);
            }
            self.codec.feed(&chunk[..n]);
        }
    }

    /// Shut down the write half of the stream.
    pub async fn close(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.codec.is_closed()
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}
