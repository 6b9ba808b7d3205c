use thiserror::Error;

/// Errors surfaced by the consensus engine itself.
#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("reactor creation refused by {filter} filter: {reason}")]
    CreationRefused {
        filter: &'static str,
        reason: String,
    },

    #[error("cannot broadcast without a signer")]
    NoSigner,

    #[error("cannot broadcast without a network adapter")]
    NoNetworkAdapter,

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors returned by [`NetworkAdapter`](crate::network::NetworkAdapter)
/// implementations.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("broadcast channel full")]
    ChannelFull,

    #[error("broadcast channel closed")]
    ChannelClosed,

    #[error("network backend: {0}")]
    Backend(String),
}

/// Errors returned by [`ConsensusStorage`](crate::storage::ConsensusStorage)
/// implementations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend: {0}")]
    Backend(String),
}

/// Errors returned by [`Signer`](crate::signer::Signer) implementations.
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("signer backend: {0}")]
    Backend(String),
}
