//! The versioned roster of identities authorized to attest.

use crate::Address;
use serde::{Deserialize, Serialize};

/// An immutable snapshot of the attesting participant roster.
///
/// A new roster replaces the old one under a strictly larger `index`; a
/// snapshot captured by a consensus reactor at creation time is used for
/// that reactor's entire lifetime, so quorum arithmetic and signature
/// ordering stay internally consistent across rotations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantSet {
    /// Participant addresses in canonical order. A signature's position in a
    /// finalized message is its signer's position in this list.
    keys: Vec<Address>,
    /// Monotonically increasing roster version.
    index: u32,
}

impl ParticipantSet {
    pub fn new(keys: Vec<Address>, index: u32) -> Self {
        Self { keys, index }
    }

    pub fn keys(&self) -> &[Address] {
        &self.keys
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Position of `addr` in the roster, or `None` if it is not a member.
    pub fn key_index(&self, addr: &Address) -> Option<usize> {
        self.keys.iter().position(|k| k == addr)
    }

    pub fn contains(&self, addr: &Address) -> bool {
        self.key_index(addr).is_some()
    }

    /// Minimum number of signatures required to consider an observation
    /// confirmed: `floor(2N / 3) + 1`, tolerating up to `floor((N - 1) / 3)`
    /// byzantine or offline participants.
    pub fn quorum(&self) -> usize {
        self.keys.len() * 2 / 3 + 1
    }
}
