//! Signing digests identifying observed events.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The 32-byte hash of an observation's canonical signing body.
///
/// The digest is both the payload participants sign and the key under which
/// the live consensus reactor for the event is looked up. Two observations
/// with equal digests represent the same logical event.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest([u8; 32]);

impl Digest {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse a digest from a byte slice. Returns `None` on length mismatch.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_full_hex() {
        let d = Digest::new([0x01; 32]);
        assert_eq!(d.to_string(), "01".repeat(32));
    }

    #[test]
    fn from_slice_roundtrip() {
        let d = Digest::new([7u8; 32]);
        assert_eq!(Digest::from_slice(d.as_bytes()), Some(d));
        assert!(Digest::from_slice(&[7u8; 31]).is_none());
    }
}
