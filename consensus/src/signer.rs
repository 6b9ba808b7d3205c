//! Signing seam.

use crate::error::SignerError;
use warden_crypto::{sign_digest, SecretKey};
use warden_types::{Address, Digest, Signature};

/// Produces this node's attestation signatures.
///
/// A node without a signer participates as a relay: it tracks consensus and
/// collects foreign signatures but contributes none of its own.
pub trait Signer: Send + Sync {
    /// The participant address this signer signs as.
    fn identity(&self) -> Address;

    /// Sign an observation digest.
    ///
    /// May block on a remote backend (HSM, signing service). The reactor
    /// task runs this on the blocking pool and cuts it off at
    /// `ReactorConfig::signing_deadline`; a call that overruns leaves the
    /// node relaying that round.
    fn sign(&self, digest: &Digest) -> Result<Signature, SignerError>;
}

/// In-process signer backed by a raw secret key.
pub struct KeySigner {
    key: SecretKey,
}

impl KeySigner {
    pub fn new(key: SecretKey) -> Self {
        Self { key }
    }
}

impl Signer for KeySigner {
    fn identity(&self) -> Address {
        self.key.address()
    }

    fn sign(&self, digest: &Digest) -> Result<Signature, SignerError> {
        sign_digest(&self.key, digest).map_err(|e| SignerError::Backend(e.to_string()))
    }
}
