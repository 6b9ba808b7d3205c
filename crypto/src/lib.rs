//! Cryptographic primitives for the Warden attestation network.
//!
//! Attestations are 65-byte recoverable secp256k1 signatures over a keccak-256
//! digest; a signer's identity is the trailing 20 bytes of the keccak-256
//! hash of its uncompressed public key, so verification recovers the signer
//! address directly from `(digest, signature)` without a key registry.
//!
//! ## Module overview
//!
//! - [`hash`] — keccak-256 hashing.
//! - [`keys`] — secret key generation and identity derivation.
//! - [`sign`] — recoverable signing and address recovery.
//! - [`error`] — crypto error types.

pub mod error;
pub mod hash;
pub mod keys;
pub mod sign;

pub use error::CryptoError;
pub use hash::keccak256;
pub use keys::SecretKey;
pub use sign::{address_from_verifying_key, recover_address, sign_digest};
