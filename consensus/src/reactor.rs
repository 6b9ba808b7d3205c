//! The per-observation consensus state machine.
//!
//! A reactor tracks exactly one observation digest from first sighting to a
//! terminal state, collecting one signature per participant and reporting
//! every state change through its transition sink. All methods take `now`
//! explicitly; the driving task supplies the wall clock and tests supply
//! whatever instant they need.

use crate::config::ReactorConfig;
use crate::error::ConsensusError;
use crate::metrics::ConsensusMetrics;
use crate::network::NetworkAdapter;
use crate::observation::{IndexedSignature, Observation, SignedAttestation};
use crate::verify::{verify_attestation, RejectReason};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use warden_types::{Address, Digest, ParticipantSet, Signature, Timestamp};

/// The lifecycle of a consensus round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReactorState {
    /// Created, nothing received yet.
    Initialized,
    /// Foreign attestations seen, no local observation.
    Unobserved,
    /// Observed locally, below quorum.
    Observed,
    /// Quorum of foreign signatures, still no local observation.
    QuorumUnobserved,
    /// Quorum with a local observation; grace period running.
    Quorum,
    /// Terminal: quorum held through the grace period.
    Finalized,
    /// Terminal: gave up before finalization.
    TimedOut,
}

impl ReactorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReactorState::Initialized => "initialized",
            ReactorState::Unobserved => "unobserved",
            ReactorState::Observed => "observed",
            ReactorState::QuorumUnobserved => "quorum_unobserved",
            ReactorState::Quorum => "quorum",
            ReactorState::Finalized => "finalized",
            ReactorState::TimedOut => "timed_out",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReactorState::Finalized | ReactorState::TimedOut)
    }
}

impl fmt::Display for ReactorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change, pushed through the reactor's transition sink as it
/// happens.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateTransition {
    pub from: ReactorState,
    pub to: ReactorState,
    pub digest: Digest,
}

/// Receives transitions synchronously from inside the reactor. Must not
/// block; the manager's sink does a non-blocking enqueue and drops on
/// backpressure.
pub type TransitionSink = Box<dyn Fn(StateTransition) + Send + Sync>;

struct ReactorInner<O: Observation> {
    current: ReactorState,
    /// The state before the most recent transition. For a terminal reactor
    /// this is where the round stood when it gave up.
    previous: ReactorState,
    observation: Option<O>,
    signatures: HashMap<Address, Signature>,
    local_signature: Option<Signature>,
    /// When the first attestation or local observation arrived.
    first_seen: Timestamp,
    /// When the newest signature (foreign or local) was added.
    last_attestation: Timestamp,
    /// When we last broadcast our own attestation.
    last_transmission: Timestamp,
    /// When quorum-with-observation was reached.
    time_quorum: Timestamp,
}

/// Consensus state machine for a single observation digest.
pub struct ConsensusReactor<O: Observation> {
    group: String,
    digest: Digest,
    participants: ParticipantSet,
    config: ReactorConfig,
    /// Address our own signatures are recorded under; `None` for a relay.
    identity: Option<Address>,
    network: Option<Arc<dyn NetworkAdapter>>,
    metrics: Arc<ConsensusMetrics>,
    sink: TransitionSink,
    inner: Mutex<ReactorInner<O>>,
}

impl<O: Observation> ConsensusReactor<O> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        group: impl Into<String>,
        digest: Digest,
        participants: ParticipantSet,
        config: ReactorConfig,
        identity: Option<Address>,
        network: Option<Arc<dyn NetworkAdapter>>,
        metrics: Arc<ConsensusMetrics>,
        sink: TransitionSink,
    ) -> Self {
        Self {
            group: group.into(),
            digest,
            participants,
            config,
            identity,
            network,
            metrics,
            sink,
            inner: Mutex::new(ReactorInner {
                current: ReactorState::Initialized,
                previous: ReactorState::Initialized,
                observation: None,
                signatures: HashMap::new(),
                local_signature: None,
                first_seen: Timestamp::EPOCH,
                last_attestation: Timestamp::EPOCH,
                last_transmission: Timestamp::EPOCH,
                time_quorum: Timestamp::EPOCH,
            }),
        }
    }

    pub fn digest(&self) -> Digest {
        self.digest
    }

    pub fn config(&self) -> &ReactorConfig {
        &self.config
    }

    pub fn participants(&self) -> &ParticipantSet {
        &self.participants
    }

    pub fn state(&self) -> ReactorState {
        self.lock().current
    }

    /// The state before the most recent transition. Lets the manager rebuild
    /// a timeout report for a round whose conclusion notification was lost.
    pub fn previous_state(&self) -> ReactorState {
        self.lock().previous
    }

    pub fn observation(&self) -> Option<O> {
        self.lock().observation.clone()
    }

    pub fn last_attestation(&self) -> Timestamp {
        self.lock().last_attestation
    }

    /// Collected signatures ordered by the signer's index in the participant
    /// set.
    pub fn signatures(&self) -> Vec<IndexedSignature> {
        let inner = self.lock();
        self.participants
            .keys()
            .iter()
            .enumerate()
            .filter_map(|(i, addr)| {
                inner.signatures.get(addr).map(|sig| IndexedSignature {
                    index: i as u8,
                    signature: *sig,
                })
            })
            .collect()
    }

    pub fn has_quorum(&self) -> bool {
        let inner = self.lock();
        self.quorum_reached(&inner)
    }

    /// Feed the node's own observation of the event, together with the local
    /// signature over its digest if one was produced.
    ///
    /// Records and broadcasts the signature and moves the round into an
    /// observed state. Ignored outside of `Initialized`, `Unobserved` and
    /// `QuorumUnobserved`. The caller signs before calling so no signer runs
    /// under the reactor's lock; `None` (no signer, or the signer failed or
    /// missed its deadline) leaves the node relaying this round.
    pub fn submit_local(&self, observation: O, signature: Option<Signature>, now: Timestamp) {
        let mut inner = self.lock();

        match inner.current {
            ReactorState::Initialized
            | ReactorState::Unobserved
            | ReactorState::QuorumUnobserved => {}
            state => {
                tracing::debug!(
                    group = %self.group,
                    digest = %self.digest,
                    state = %state,
                    "ignoring local observation in state"
                );
                return;
            }
        }

        inner.observation = Some(observation);

        if let (Some(identity), Some(signature)) = (self.identity, signature) {
            inner.local_signature = Some(signature);
            inner.signatures.insert(identity, signature);
            self.metrics.signatures_produced.inc();
            if let Err(e) = self.transmit(&mut inner, now) {
                tracing::warn!(
                    group = %self.group,
                    digest = %self.digest,
                    error = %e,
                    "failed to broadcast own attestation"
                );
            }
        }

        match inner.current {
            ReactorState::Initialized => {
                inner.first_seen = now;
                inner.last_attestation = now;
                self.transition(&mut inner, ReactorState::Observed);
            }
            ReactorState::Unobserved => {
                inner.last_attestation = now;
                self.transition(&mut inner, ReactorState::Observed);
            }
            ReactorState::QuorumUnobserved => {
                self.metrics.quorums_reached.with_label_values(&["observed"]).inc();
                inner.time_quorum = now;
                self.transition(&mut inner, ReactorState::Quorum);
                return;
            }
            _ => unreachable!("state filtered above"),
        }

        // Our own signature may have been the quorum-completing one.
        if self.quorum_reached(&inner) && inner.current == ReactorState::Observed {
            self.metrics.quorums_reached.with_label_values(&["observed"]).inc();
            inner.time_quorum = now;
            self.transition(&mut inner, ReactorState::Quorum);
        }
    }

    /// Feed a foreign attestation received from the network.
    ///
    /// Verifies it against the participant set, drops duplicates, and applies
    /// any resulting state change. Attestations arriving after a terminal
    /// state are ignored.
    pub fn submit_foreign(&self, attestation: &SignedAttestation, now: Timestamp) {
        let mut inner = self.lock();
        self.metrics.attestations_received.inc();

        if inner.current.is_terminal() {
            return;
        }

        if let Err(reason) = verify_attestation(attestation, &self.participants) {
            self.reject(attestation, reason);
            return;
        }
        if inner.signatures.contains_key(&attestation.addr) {
            self.reject(attestation, RejectReason::Duplicate);
            return;
        }

        inner
            .signatures
            .insert(attestation.addr, attestation.signature);
        inner.last_attestation = now;

        if inner.current == ReactorState::Initialized {
            inner.first_seen = now;
            self.transition(&mut inner, ReactorState::Unobserved);
        }

        if !self.quorum_reached(&inner) {
            return;
        }
        match inner.current {
            ReactorState::Observed => {
                self.metrics.quorums_reached.with_label_values(&["observed"]).inc();
                inner.time_quorum = now;
                self.transition(&mut inner, ReactorState::Quorum);
            }
            ReactorState::Unobserved => {
                self.metrics
                    .quorums_reached
                    .with_label_values(&["unobserved"])
                    .inc();
                self.transition(&mut inner, ReactorState::QuorumUnobserved);
            }
            _ => {}
        }
    }

    /// Run the timeout checks. Returns `true` once the reactor is in a
    /// terminal state and its driving task can exit.
    pub fn tick(&self, now: Timestamp) -> bool {
        let mut inner = self.lock();

        match inner.current {
            ReactorState::Initialized => {}
            ReactorState::Unobserved | ReactorState::QuorumUnobserved => {
                if inner
                    .first_seen
                    .has_expired(self.config.unobserved_timeout, now)
                {
                    self.give_up(&mut inner);
                }
            }
            ReactorState::Observed => {
                if inner
                    .last_attestation
                    .has_expired(self.config.quorum_timeout, now)
                {
                    self.give_up(&mut inner);
                } else if self.network.is_some()
                    && inner.local_signature.is_some()
                    && inner
                        .last_transmission
                        .has_expired(self.config.retransmit_frequency, now)
                {
                    self.metrics.retransmissions.inc();
                    if let Err(e) = self.transmit(&mut inner, now) {
                        tracing::warn!(
                            group = %self.group,
                            digest = %self.digest,
                            error = %e,
                            "retransmission failed"
                        );
                    }
                }
            }
            ReactorState::Quorum => {
                let full_participation =
                    inner.signatures.len() == self.participants.len();
                if full_participation
                    || inner
                        .time_quorum
                        .has_expired(self.config.quorum_grace_period, now)
                {
                    self.give_up(&mut inner);
                }
            }
            ReactorState::Finalized | ReactorState::TimedOut => return true,
        }

        false
    }

    fn quorum_reached(&self, inner: &MutexGuard<'_, ReactorInner<O>>) -> bool {
        inner.signatures.len() >= self.participants.quorum()
    }

    /// Conclude the round: a quorum round finalizes, anything else times out.
    fn give_up(&self, inner: &mut MutexGuard<'_, ReactorInner<O>>) {
        if inner.current == ReactorState::Quorum {
            self.metrics.reactors_finalized.inc();
            self.transition(inner, ReactorState::Finalized);
        } else {
            self.metrics.reactors_timed_out.inc();
            self.transition(inner, ReactorState::TimedOut);
        }
    }

    fn transition(&self, inner: &mut MutexGuard<'_, ReactorInner<O>>, to: ReactorState) {
        let from = inner.current;
        inner.previous = from;
        inner.current = to;
        tracing::debug!(
            group = %self.group,
            digest = %self.digest,
            from = %from,
            to = %to,
            "reactor state transition"
        );
        (self.sink)(StateTransition {
            from,
            to,
            digest: self.digest,
        });
    }

    fn transmit(
        &self,
        inner: &mut MutexGuard<'_, ReactorInner<O>>,
        now: Timestamp,
    ) -> Result<(), ConsensusError> {
        let identity = self.identity.ok_or(ConsensusError::NoSigner)?;
        let network = self
            .network
            .as_ref()
            .ok_or(ConsensusError::NoNetworkAdapter)?;
        let (signature, message_id) = match (&inner.local_signature, &inner.observation) {
            (Some(sig), Some(obs)) => (*sig, obs.message_id()),
            _ => return Ok(()),
        };

        network.broadcast(&SignedAttestation {
            addr: identity,
            digest: self.digest,
            signature,
            message_id,
            tx_metadata: vec![],
        })?;
        self.metrics.broadcasts.inc();
        inner.last_transmission = now;
        Ok(())
    }

    fn reject(&self, attestation: &SignedAttestation, reason: RejectReason) {
        self.metrics
            .attestations_rejected
            .with_label_values(&[reason.as_str()])
            .inc();
        tracing::debug!(
            group = %self.group,
            digest = %self.digest,
            addr = %attestation.addr,
            reason = %reason,
            "rejected attestation"
        );
    }

    fn lock(&self) -> MutexGuard<'_, ReactorInner<O>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
