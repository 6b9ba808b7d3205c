//! Per-observation attestation consensus.
//!
//! Participants independently observe events on external systems, sign the
//! event's digest, and gossip the signatures. A [`ConsensusReactor`] tracks
//! one digest from first sighting to finalization or timeout, collecting at
//! most one signature per participant and finalizing once a two-thirds-plus-
//! one quorum has held through a grace period. The [`Manager`] routes
//! observations and attestations to reactors, creates them on demand behind
//! admission filters, and reports outcomes to the application through
//! [`EventHandler`].
//!
//! The engine is deliberately agnostic about what is being observed: anything
//! implementing [`Observation`] can run through it. Signing, networking,
//! persistence and participant-set discovery are injected via the
//! [`Signer`], [`NetworkAdapter`], [`ConsensusStorage`] and
//! [`ParticipantSetProvider`] seams.

pub mod config;
pub mod error;
pub mod filter;
pub mod manager;
pub mod metrics;
pub mod network;
pub mod observation;
pub mod reactor;
pub mod shutdown;
pub mod signer;
pub mod storage;
pub mod task;
pub mod verify;

pub use config::{ManagerConfig, ReactorConfig};
pub use error::{ConsensusError, NetworkError, SignerError, StorageError};
pub use filter::{AdmissionFilter, AdmissionRequest, DedupFilter, SignatureFilter};
pub use manager::{EventHandler, Manager, ParticipantSetProvider, StaticParticipantSetProvider};
pub use metrics::ConsensusMetrics;
pub use network::{ChannelNetworkAdapter, NetworkAdapter};
pub use observation::{IndexedSignature, Observation, SignedAttestation};
pub use reactor::{ConsensusReactor, ReactorState, StateTransition, TransitionSink};
pub use shutdown::Shutdown;
pub use signer::{KeySigner, Signer};
pub use storage::{ConsensusStorage, MemoryStorage};
pub use task::{spawn_reactor, ReactorHandle};
pub use verify::{verify_attestation, RejectReason};
