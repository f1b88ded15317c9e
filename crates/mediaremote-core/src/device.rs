//! Controller device identifiers.

use rand::Rng;
use std::fmt;

/// MAC-style identifier this controller presents to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(pub [u8; 6]);

impl DeviceId {
    /// Generate a random identifier.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 6];
        rand::thread_rng().fill(&mut bytes);
        Self(bytes)
    }

    /// Colon-separated lowercase form, e.g. "58:55:ca:1a:e2:88".
    pub fn to_mac_string(&self) -> String {
        format!(
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_mac_string())
    }
}
