//! Drives a reactor: a spawned task that feeds it submissions and ticks.

use crate::observation::{Observation, SignedAttestation};
use crate::reactor::ConsensusReactor;
use crate::shutdown::Shutdown;
use crate::signer::Signer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use warden_types::{Signature, Timestamp};

/// Local observations are produced at most once per digest, so a single slot
/// suffices. Foreign attestations burst when a round is hot.
const LOCAL_CHANNEL_CAPACITY: usize = 1;
const FOREIGN_CHANNEL_CAPACITY: usize = 20;

/// Handle to a running reactor task. Submissions are non-blocking; dropping
/// the handle closes the input channels and the task winds down on its own
/// once the round concludes.
#[derive(Clone)]
pub struct ReactorHandle<O: Observation> {
    pub reactor: Arc<ConsensusReactor<O>>,
    local_tx: mpsc::Sender<O>,
    foreign_tx: mpsc::Sender<SignedAttestation>,
}

impl<O: Observation> ReactorHandle<O> {
    /// Hand the reactor a local observation. Returns `false` if the slot was
    /// already taken or the task has exited.
    pub fn submit_local(&self, observation: O) -> bool {
        self.local_tx.try_send(observation).is_ok()
    }

    /// Hand the reactor a foreign attestation. Returns `false` on
    /// backpressure; retransmissions cover the loss.
    pub fn submit_foreign(&self, attestation: SignedAttestation) -> bool {
        self.foreign_tx.try_send(attestation).is_ok()
    }
}

/// Spawn the task that owns a reactor's event loop.
///
/// The loop multiplexes both input channels with a tick timer sized to half
/// the shortest configured timeout, and exits on shutdown or on the first
/// tick after the reactor reaches a terminal state. Local observations are
/// signed here, off the reactor's lock and bounded by the configured
/// deadline, before being handed to the state machine.
pub fn spawn_reactor<O: Observation>(
    reactor: Arc<ConsensusReactor<O>>,
    signer: Option<Arc<dyn Signer>>,
    shutdown: &Shutdown,
) -> ReactorHandle<O> {
    let (local_tx, mut local_rx) = mpsc::channel(LOCAL_CHANNEL_CAPACITY);
    let (foreign_tx, mut foreign_rx) = mpsc::channel(FOREIGN_CHANNEL_CAPACITY);
    let mut shutdown_rx = shutdown.subscribe();

    let task_reactor = reactor.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(task_reactor.config().tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let deadline = task_reactor.config().signing_deadline;

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                Some(observation) = local_rx.recv() => {
                    let signature =
                        sign_with_deadline(signer.clone(), &task_reactor, deadline).await;
                    task_reactor.submit_local(observation, signature, Timestamp::now());
                }
                Some(attestation) = foreign_rx.recv() => {
                    task_reactor.submit_foreign(&attestation, Timestamp::now());
                }
                _ = ticker.tick() => {
                    if task_reactor.tick(Timestamp::now()) {
                        break;
                    }
                }
            }
        }
    });

    ReactorHandle {
        reactor,
        local_tx,
        foreign_tx,
    }
}

/// Produce the local signature for a reactor's digest without holding its
/// lock. The signer runs on the blocking pool and is cut off at `deadline`;
/// a signer that fails or stalls leaves the node relaying this round.
async fn sign_with_deadline<O: Observation>(
    signer: Option<Arc<dyn Signer>>,
    reactor: &ConsensusReactor<O>,
    deadline: Duration,
) -> Option<Signature> {
    let signer = signer?;
    let digest = reactor.digest();
    let sign = tokio::task::spawn_blocking(move || signer.sign(&digest));
    match tokio::time::timeout(deadline, sign).await {
        Ok(Ok(Ok(signature))) => Some(signature),
        Ok(Ok(Err(e))) => {
            tracing::error!(%digest, error = %e, "signing failed, relaying this round");
            None
        }
        Ok(Err(e)) => {
            tracing::error!(%digest, error = %e, "signing task aborted");
            None
        }
        Err(_) => {
            tracing::error!(%digest, ?deadline, "signer missed its deadline, relaying this round");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReactorConfig;
    use crate::error::SignerError;
    use crate::metrics::ConsensusMetrics;
    use crate::reactor::ReactorState;
    use std::time::Duration;
    use warden_crypto::{keccak256, sign_digest, SecretKey};
    use warden_types::{Address, Digest, ParticipantSet};

    #[derive(Clone, Debug)]
    struct Obs;

    impl Observation for Obs {
        fn message_id(&self) -> String {
            "task/1".into()
        }
        fn signing_digest(&self) -> Digest {
            Digest::new(keccak256(b"task test"))
        }
    }

    fn fast_config() -> ReactorConfig {
        ReactorConfig {
            retransmit_frequency: Duration::from_millis(40),
            quorum_grace_period: Duration::from_millis(40),
            quorum_timeout: Duration::from_millis(40),
            unobserved_timeout: Duration::from_millis(40),
            ..ReactorConfig::default()
        }
    }

    async fn wait_until(deadline: Duration, check: impl Fn() -> bool) -> bool {
        let start = tokio::time::Instant::now();
        loop {
            if check() {
                return true;
            }
            if start.elapsed() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn task_collects_foreign_attestations_and_times_out() {
        let keys: Vec<SecretKey> = (0..4).map(|_| SecretKey::random()).collect();
        let set = ParticipantSet::new(keys.iter().map(|k| k.address()).collect(), 0);
        let digest = Obs.signing_digest();

        let reactor = Arc::new(ConsensusReactor::<Obs>::new(
            "task-test",
            digest,
            set,
            fast_config(),
            None,
            None,
            Arc::new(ConsensusMetrics::new()),
            Box::new(|_| {}),
        ));
        let shutdown = Shutdown::new();
        let handle = spawn_reactor(reactor.clone(), None, &shutdown);

        assert!(handle.submit_foreign(SignedAttestation {
            addr: keys[1].address(),
            digest,
            signature: sign_digest(&keys[1], &digest).unwrap(),
            message_id: Obs.message_id(),
            tx_metadata: vec![],
        }));

        assert!(
            wait_until(Duration::from_secs(2), || {
                reactor.state() == ReactorState::Unobserved
            })
            .await
        );
        // No local observation ever arrives; the round gives up.
        assert!(
            wait_until(Duration::from_secs(2), || {
                reactor.state() == ReactorState::TimedOut
            })
            .await
        );
        assert_eq!(reactor.signatures().len(), 1);
        shutdown.trigger();
    }

    #[tokio::test]
    async fn stalled_signer_degrades_round_to_relay() {
        struct StalledSigner {
            addr: Address,
        }

        impl Signer for StalledSigner {
            fn identity(&self) -> Address {
                self.addr
            }
            fn sign(&self, _digest: &Digest) -> Result<Signature, SignerError> {
                std::thread::sleep(Duration::from_millis(400));
                Err(SignerError::Backend("unreachable".into()))
            }
        }

        let keys: Vec<SecretKey> = (0..4).map(|_| SecretKey::random()).collect();
        let set = ParticipantSet::new(keys.iter().map(|k| k.address()).collect(), 0);
        let digest = Obs.signing_digest();

        let config = ReactorConfig {
            retransmit_frequency: Duration::from_secs(10),
            quorum_grace_period: Duration::from_secs(10),
            quorum_timeout: Duration::from_secs(10),
            unobserved_timeout: Duration::from_secs(10),
            signing_deadline: Duration::from_millis(50),
        };
        let reactor = Arc::new(ConsensusReactor::<Obs>::new(
            "task-test",
            digest,
            set,
            config,
            Some(keys[0].address()),
            None,
            Arc::new(ConsensusMetrics::new()),
            Box::new(|_| {}),
        ));
        let shutdown = Shutdown::new();
        let signer: Arc<dyn Signer> = Arc::new(StalledSigner {
            addr: keys[0].address(),
        });
        let handle = spawn_reactor(reactor.clone(), Some(signer), &shutdown);

        let start = tokio::time::Instant::now();
        assert!(handle.submit_local(Obs));

        // The round proceeds unsigned once the deadline cuts the signer off,
        // well before the signer itself would have returned.
        assert!(
            wait_until(Duration::from_secs(2), || {
                reactor.state() == ReactorState::Observed
            })
            .await
        );
        assert!(start.elapsed() < Duration::from_millis(350));
        assert!(reactor.signatures().is_empty());
        shutdown.trigger();
    }

    #[tokio::test]
    async fn shutdown_stops_the_task() {
        let keys: Vec<SecretKey> = (0..2).map(|_| SecretKey::random()).collect();
        let set = ParticipantSet::new(keys.iter().map(|k| k.address()).collect(), 0);

        let reactor = Arc::new(ConsensusReactor::<Obs>::new(
            "task-test",
            Obs.signing_digest(),
            set,
            ReactorConfig::default(),
            None,
            None,
            Arc::new(ConsensusMetrics::new()),
            Box::new(|_| {}),
        ));
        let shutdown = Shutdown::new();
        let handle = spawn_reactor(reactor, None, &shutdown);
        shutdown.trigger();

        // Once the task has exited, submissions start failing.
        assert!(
            wait_until(Duration::from_secs(2), || !handle.submit_local(Obs)).await
        );
    }
}
