//! # mediaremote-core
//!
//! Core types and error definitions shared across the MediaRemote pairing crates.
//!
//! This crate provides:
//! - Common error types
//! - Controller device identifiers
//! - Controller configuration (persisted identity settings)

pub mod config;
pub mod device;
pub mod error;

pub use config::DeviceConfig;
pub use device::DeviceId;
pub use error::{CryptoError, Error, PairingError, ParseError, Result};
