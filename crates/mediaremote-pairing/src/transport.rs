//! Plaintext handshake transport over a byte stream.
//!
//! Each handshake message travels as `varint(len) || tlv8`, the same length
//! prefix the encrypted channel uses afterwards.

use std::io;

use async_trait::async_trait;
use mediaremote_core::error::{Error, PairingError, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::framer::{decode_varint, encode_varint, MAX_VARINT_LEN};
use crate::traits::PairingTransport;

/// Largest handshake message accepted from the peer.
pub const MAX_HANDSHAKE_MESSAGE: usize = 64 * 1024;

const READ_CHUNK: usize = 4096;

/// Map a read failure to the pairing error the caller sees.
///
/// A peer that resets or aborts the connection is reported the same way as
/// one that closes it.
pub(crate) fn read_error(e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => {
            tracing::debug!(error = %e, "Connection dropped by peer");
            PairingError::TransportClosed.into()
        }
        _ => Error::Connection(e),
    }
}

/// [`PairingTransport`] over any async byte stream.
pub struct StreamTransport<S> {
    stream: S,
    buffer: Vec<u8>,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: Vec::new(),
        }
    }

    /// Write one length-prefixed message and flush.
    pub async fn write_message(&mut self, payload: &[u8]) -> Result<()> {
        let mut frame = Vec::with_capacity(MAX_VARINT_LEN + payload.len());
        encode_varint(payload.len() as u64, &mut frame);
        frame.extend_from_slice(payload);

        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read one length-prefixed message, buffering partial reads.
    pub async fn read_message(&mut self) -> Result<Vec<u8>> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(message) = self.take_buffered()? {
                return Ok(message);
            }

            let n = self.stream.read(&mut chunk).await.map_err(read_error)?;
            if n == 0 {
                tracing::debug!(buffered = self.buffer.len(), "Stream closed during handshake");
                return Err(PairingError::TransportClosed.into());
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    fn take_buffered(&mut self) -> Result<Option<Vec<u8>>> {
        let (len, header_len) = match decode_varint(&self.buffer)? {
            Some(prefix) => prefix,
            None => return Ok(None),
        };
        let len = usize::try_from(len)
            .ok()
            .filter(|len| *len <= MAX_HANDSHAKE_MESSAGE)
            .ok_or_else(|| {
                PairingError::MalformedFrame(format!("handshake message of {} bytes", len))
            })?;

        if self.buffer.len() < header_len + len {
            return Ok(None);
        }
        let message = self.buffer[header_len..header_len + len].to_vec();
        self.buffer.drain(..header_len + len);
        Ok(Some(message))
    }

    async fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>> {
        self.write_message(request).await?;
        let response = self.read_message().await?;
        tracing::trace!(sent = request.len(), received = response.len(), "Handshake exchange");
        Ok(response)
    }

    /// Release the stream together with any bytes read past the last message.
    pub fn into_parts(self) -> (S, Vec<u8>) {
        (self.stream, self.buffer)
    }
}

#[async_trait]
impl<S> PairingTransport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send_setup(&mut self, request: &[u8]) -> Result<Vec<u8>> {
        self.exchange(request).await
    }

    async fn send_verify(&mut self, request: &[u8]) -> Result<Vec<u8>> {
        self.exchange(request).await
    }
}

/// Stream whose reads always fail with a fixed error kind.
#[cfg(test)]
pub(crate) struct FailingStream(pub io::ErrorKind);


#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn message_is_varint_prefixed() {
        let (client, mut server) = duplex(1024);
        let mut transport = StreamTransport::new(client);

        transport.write_message(&[0xaa; 200]).await.unwrap();

        let mut received = vec![0u8; 202];
        server.read_exact(&mut received).await.unwrap();
        assert_eq!(&received[..2], &[0xc8, 0x01]);
        assert!(received[2..].iter().all(|b| *b == 0xaa));
    }

    #[tokio::test]
    async fn exchange_returns_reply() {
        let (client, server) = duplex(1024);
        let mut transport = StreamTransport::new(client);
        let mut peer = StreamTransport::new(server);

        let responder = tokio::spawn(async move {
            let request = peer.read_message().await.unwrap();
            assert_eq!(request, b"ping");
            peer.write_message(b"pong").await.unwrap();
        });

        assert_eq!(transport.send_setup(b"ping").await.unwrap(), b"pong");
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn reply_delivered_one_byte_at_a_time() {
        let (client, mut server) = duplex(1024);
        let mut transport = StreamTransport::new(client);

        let writer = tokio::spawn(async move {
            let mut frame = Vec::new();
            encode_varint(300, &mut frame);
            frame.extend_from_slice(&[0x11; 300]);
            for byte in frame {
                server.write_all(&[byte]).await.unwrap();
                server.flush().await.unwrap();
                tokio::task::yield_now().await;
            }
            server
        });

        let message = transport.read_message().await.unwrap();
        assert_eq!(message, vec![0x11; 300]);
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn eof_mid_message_is_transport_closed() {
        let (client, mut server) = duplex(1024);
        let mut transport = StreamTransport::new(client);

        server.write_all(&[0x10, 0x01, 0x02]).await.unwrap();
        drop(server);

        assert!(matches!(
            transport.read_message().await,
            Err(Error::Pairing(PairingError::TransportClosed))
        ));
    }

    #[tokio::test]
    async fn oversized_message_is_rejected() {
        let (client, mut server) = duplex(1024);
        let mut transport = StreamTransport::new(client);

        let mut prefix = Vec::new();
        encode_varint((MAX_HANDSHAKE_MESSAGE + 1) as u64, &mut prefix);
        server.write_all(&prefix).await.unwrap();

        assert!(matches!(
            transport.read_message().await,
            Err(Error::Pairing(PairingError::MalformedFrame(_)))
        ));
    }

    #[tokio::test]
    async fn into_parts_keeps_bytes_read_ahead() {
        let (client, mut server) = duplex(1024);
        let mut transport = StreamTransport::new(client);

        // Reply and the first bytes of the next frame arrive in one write
        server.write_all(&[0x02, 0x0a, 0x0b, 0x05, 0x01]).await.unwrap();

        assert_eq!(transport.read_message().await.unwrap(), vec![0x0a, 0x0b]);
        let (_stream, leftover) = transport.into_parts();
        assert_eq!(leftover, vec![0x05, 0x01]);
    }

    mod read_errors {
        use super::*;

        #[tokio::test]
        async fn connection_reset_is_transport_closed() {
            for kind in [
                io::ErrorKind::ConnectionReset,
                io::ErrorKind::ConnectionAborted,
                io::ErrorKind::BrokenPipe,
                io::ErrorKind::UnexpectedEof,
            ] {
                let mut transport = StreamTransport::new(FailingStream(kind));
                assert!(
                    matches!(
                        transport.send_verify(b"m1").await,
                        Err(Error::Pairing(PairingError::TransportClosed))
                    ),
                    "{:?} not mapped",
                    kind
                );
            }
        }

        #[tokio::test]
        async fn other_io_errors_stay_connection_errors() {
            let stream = FailingStream(io::ErrorKind::PermissionDenied);
            let mut transport = StreamTransport::new(stream);
            assert!(matches!(
                transport.read_message().await,
                Err(Error::Connection(e)) if e.kind() == io::ErrorKind::PermissionDenied
            ));
        }
    }
}
