//! Network seam: how a reactor puts its own attestation on the wire.

use crate::error::NetworkError;
use crate::observation::SignedAttestation;
use tokio::sync::mpsc;

/// Broadcasts an attestation to the other participants.
///
/// Implementations must not block: a reactor calls this while holding its
/// state lock. Backpressure is reported as [`NetworkError::ChannelFull`] and
/// the send is dropped; the retransmission cycle covers the loss.
pub trait NetworkAdapter: Send + Sync {
    fn broadcast(&self, attestation: &SignedAttestation) -> Result<(), NetworkError>;
}

/// Adapter that forwards attestations into a bounded channel, typically
/// drained by a gossip layer.
pub struct ChannelNetworkAdapter {
    tx: mpsc::Sender<SignedAttestation>,
}

impl ChannelNetworkAdapter {
    pub fn new(tx: mpsc::Sender<SignedAttestation>) -> Self {
        Self { tx }
    }
}

impl NetworkAdapter for ChannelNetworkAdapter {
    fn broadcast(&self, attestation: &SignedAttestation) -> Result<(), NetworkError> {
        self.tx
            .try_send(attestation.clone())
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => NetworkError::ChannelFull,
                mpsc::error::TrySendError::Closed(_) => NetworkError::ChannelClosed,
            })
    }
}
