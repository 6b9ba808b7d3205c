//! Fundamental types shared across the Warden attestation network.
//!
//! ## Module overview
//!
//! - [`address`] — 20-byte participant identity (derived from a secp256k1 key).
//! - [`digest`] — 32-byte signing digest identifying one observed event.
//! - [`signature`] — 65-byte recoverable ECDSA signature.
//! - [`time`] — millisecond Unix timestamps, injectable into all pure
//!   state-machine logic.
//! - [`participant_set`] — ordered, versioned roster of attesting identities
//!   with quorum arithmetic.

pub mod address;
pub mod digest;
pub mod participant_set;
pub mod signature;
pub mod time;

pub use address::Address;
pub use digest::Digest;
pub use participant_set::ParticipantSet;
pub use signature::Signature;
pub use time::Timestamp;
