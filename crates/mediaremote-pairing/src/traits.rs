//! Traits for the handshake transport and the PIN prompt.

use async_trait::async_trait;
use mediaremote_core::error::{Error, Result};

/// Carries handshake messages to the device and returns its replies.
///
/// Requests and responses are raw TLV8 payloads; the envelope is up to the
/// implementation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PairingTransport: Send {
    /// Send a pair-setup message and wait for the reply.
    async fn send_setup(&mut self, request: &[u8]) -> Result<Vec<u8>>;

    /// Send a pair-verify message and wait for the reply.
    async fn send_verify(&mut self, request: &[u8]) -> Result<Vec<u8>>;
}

/// Supplies the PIN shown on the device during pair-setup.
///
/// May take as long as the user needs, but must not block the runtime.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PinPrompt: Send + Sync {
    async fn request_pin(&self) -> Result<String>;
}

/// Prompt that always answers with a fixed PIN.
pub struct StaticPin {
    pin: String,
}

impl StaticPin {
    pub fn new(pin: impl Into<String>) -> Self {
        Self { pin: pin.into() }
    }
}

#[async_trait]
impl PinPrompt for StaticPin {
    async fn request_pin(&self) -> Result<String> {
        Ok(self.pin.clone())
    }
}

/// Prompt that asks on the terminal and reads a line from stdin.
pub struct StdinPrompt {
    message: String,
}

impl StdinPrompt {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Default for StdinPrompt {
    fn default() -> Self {
        Self::new("Enter PIN shown on device: ")
    }
}

#[async_trait]
impl PinPrompt for StdinPrompt {
    async fn request_pin(&self) -> Result<String> {
        let message = self.message.clone();
        let line = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
            use std::io::Write;

            let mut stderr = std::io::stderr();
            stderr.write_all(message.as_bytes())?;
            stderr.flush()?;

            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;
            Ok(line)
        })
        .await
        .map_err(|e| Error::Config(format!("PIN prompt failed: {}", e)))??;

        let pin = line.trim();
        if pin.is_empty() {
            return Err(Error::Config("no PIN entered".to_string()));
        }
        Ok(pin.to_string())
    }
}
