//! The observation model: what participants attest to, and the attestations
//! they exchange over the network.

use serde::{Deserialize, Serialize};
use warden_types::{Address, Digest, Signature};

/// Something a participant can observe on an external system and attest to.
///
/// Two honest participants observing the same event must produce equal
/// [`signing_digest`](Observation::signing_digest) values; the digest is the
/// identity under which a consensus round runs. The
/// [`message_id`](Observation::message_id) is a human-readable key used for
/// storage and deduplication, and must identify the event at least as
/// precisely as the digest does.
pub trait Observation: Clone + Send + Sync + 'static {
    /// Stable storage/deduplication key, e.g. `"2/a1b2…/17"`.
    fn message_id(&self) -> String;

    /// The 32-byte digest participants sign.
    fn signing_digest(&self) -> Digest;
}

/// A participant's signature over an observation digest, as gossiped between
/// nodes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedAttestation {
    /// Claimed signer address. Verified against recovery before use.
    pub addr: Address,
    /// The observation digest being attested.
    pub digest: Digest,
    /// Recoverable signature over `digest`.
    pub signature: Signature,
    /// Storage key of the observation, as claimed by the sender.
    pub message_id: String,
    /// Opaque provenance bytes (e.g. a source transaction hash), carried for
    /// diagnostics only.
    pub tx_metadata: Vec<u8>,
}

/// A collected signature paired with the signer's index in the participant
/// set, the form consumers assemble proofs from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedSignature {
    pub index: u8,
    pub signature: Signature,
}
