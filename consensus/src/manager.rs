//! The consensus manager: routes observations and attestations to reactors,
//! owns reactor lifecycle, and reports outcomes.

use crate::config::ManagerConfig;
use crate::filter::{AdmissionFilter, AdmissionRequest, DedupFilter, SignatureFilter};
use crate::metrics::ConsensusMetrics;
use crate::network::NetworkAdapter;
use crate::observation::{IndexedSignature, Observation, SignedAttestation};
use crate::reactor::{ConsensusReactor, ReactorState, StateTransition};
use crate::shutdown::Shutdown;
use crate::signer::Signer;
use crate::storage::ConsensusStorage;
use crate::task::{spawn_reactor, ReactorHandle};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use warden_types::{Address, Digest, ParticipantSet};

/// Supplies the participant set consensus currently runs against.
///
/// Queried once per reactor creation; a round keeps the set it was created
/// with even if the provider moves on.
pub trait ParticipantSetProvider: Send + Sync {
    fn current(&self) -> Option<ParticipantSet>;
}

/// Provider backed by a swappable in-memory set.
pub struct StaticParticipantSetProvider {
    set: RwLock<Option<ParticipantSet>>,
}

impl StaticParticipantSetProvider {
    pub fn new(set: ParticipantSet) -> Self {
        Self {
            set: RwLock::new(Some(set)),
        }
    }

    pub fn empty() -> Self {
        Self {
            set: RwLock::new(None),
        }
    }

    pub fn replace(&self, set: ParticipantSet) {
        *self.set.write().unwrap_or_else(|e| e.into_inner()) = Some(set);
    }
}

impl ParticipantSetProvider for StaticParticipantSetProvider {
    fn current(&self) -> Option<ParticipantSet> {
        self.set
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Application callbacks for round outcomes. Invoked from worker tasks and
/// expected to return quickly.
pub trait EventHandler<O: Observation>: Send + Sync {
    /// Quorum reached with a local observation. Signatures keep accumulating
    /// through the grace period after this fires.
    fn on_quorum(&self, observation: &O, signatures: &[IndexedSignature]);

    /// The round concluded successfully; this is the final signature set.
    fn on_finalization(&self, observation: &O, signatures: &[IndexedSignature]);

    /// The round gave up. `previous_state` is where it stood when it did;
    /// `observation` is present only if the event was observed locally.
    fn on_timeout(
        &self,
        previous_state: ReactorState,
        digest: Digest,
        observation: Option<&O>,
        signatures: &[IndexedSignature],
    );
}

enum WorkItem<O: Observation> {
    Local(O),
    Foreign(SignedAttestation),
    Transition(StateTransition),
}

/// Routes work to per-digest reactors and manages their lifecycle.
///
/// All ingress funnels through one bounded work queue drained by a pool of
/// worker tasks. Reactors are created on demand, gated by admission filters,
/// and evicted when their round concludes.
pub struct Manager<O: Observation> {
    group: String,
    config: ManagerConfig,
    signer: Option<Arc<dyn Signer>>,
    /// The signer's address, captured once so reactor creation never calls
    /// into the signer while holding the routing map lock.
    identity: Option<Address>,
    network: Option<Arc<dyn NetworkAdapter>>,
    provider: Arc<dyn ParticipantSetProvider>,
    storage: Arc<dyn ConsensusStorage<O>>,
    handler: Arc<dyn EventHandler<O>>,
    filters: Vec<Box<dyn AdmissionFilter<O>>>,
    metrics: Arc<ConsensusMetrics>,
    reactors: Mutex<HashMap<Digest, ReactorHandle<O>>>,
    work_tx: mpsc::Sender<WorkItem<O>>,
    work_rx: AsyncMutex<mpsc::Receiver<WorkItem<O>>>,
    shutdown: Shutdown,
}

impl<O: Observation> Manager<O> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        group: impl Into<String>,
        config: ManagerConfig,
        signer: Option<Arc<dyn Signer>>,
        network: Option<Arc<dyn NetworkAdapter>>,
        provider: Arc<dyn ParticipantSetProvider>,
        storage: Arc<dyn ConsensusStorage<O>>,
        handler: Arc<dyn EventHandler<O>>,
    ) -> Arc<Self> {
        let (work_tx, work_rx) = mpsc::channel(config.queue_capacity);
        let filters: Vec<Box<dyn AdmissionFilter<O>>> = vec![
            Box::new(DedupFilter::new(storage.clone())),
            Box::new(SignatureFilter),
        ];
        let identity = signer.as_ref().map(|s| s.identity());

        Arc::new(Self {
            group: group.into(),
            config,
            signer,
            identity,
            network,
            provider,
            storage,
            handler,
            filters,
            metrics: Arc::new(ConsensusMetrics::new()),
            reactors: Mutex::new(HashMap::new()),
            work_tx,
            work_rx: AsyncMutex::new(work_rx),
            shutdown: Shutdown::new(),
        })
    }

    /// Spawn the worker pool. Call once.
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        (0..self.config.workers.max(1))
            .map(|id| {
                let manager = self.clone();
                tokio::spawn(async move { manager.worker(id).await })
            })
            .collect()
    }

    /// Stop the worker pool and every reactor task.
    pub fn stop(&self) {
        self.shutdown.trigger();
    }

    pub fn metrics(&self) -> &Arc<ConsensusMetrics> {
        &self.metrics
    }

    /// Number of reactors currently alive.
    pub fn reactor_count(&self) -> usize {
        self.lock_reactors().len()
    }

    /// The live reactor for a digest, if any.
    pub fn reactor(&self, digest: &Digest) -> Option<Arc<ConsensusReactor<O>>> {
        self.lock_reactors().get(digest).map(|h| h.reactor.clone())
    }

    /// Visit every live reactor, e.g. to scan for stalled rounds. The map
    /// lock is held for the duration of the scan; keep `f` cheap.
    pub fn for_each_reactor(&self, mut f: impl FnMut(&Digest, &Arc<ConsensusReactor<O>>)) {
        for (digest, handle) in self.lock_reactors().iter() {
            f(digest, &handle.reactor);
        }
    }

    /// Enqueue a locally observed event. Non-blocking; dropped with a warning
    /// if the work queue is full.
    pub fn submit_local(&self, observation: O) {
        self.enqueue(WorkItem::Local(observation));
    }

    /// Enqueue an attestation received from the network. Non-blocking.
    pub fn submit_foreign(&self, attestation: SignedAttestation) {
        self.enqueue(WorkItem::Foreign(attestation));
    }

    fn enqueue(&self, item: WorkItem<O>) {
        if self.work_tx.try_send(item).is_err() {
            self.metrics.submissions_dropped.inc();
            tracing::warn!(group = %self.group, "work queue full, submission dropped");
        }
    }

    async fn worker(self: Arc<Self>, id: usize) {
        let mut shutdown_rx = self.shutdown.subscribe();
        // Backstop for state transition notifications dropped on a full
        // queue: periodically reap concluded reactors from the reactor state
        // itself, which is authoritative.
        let mut sweep = tokio::time::interval(self.config.reactor.tick_interval());
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::debug!(group = %self.group, worker = id, "consensus worker started");
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                item = async { self.work_rx.lock().await.recv().await } => {
                    match item {
                        Some(item) => self.process(item),
                        None => break,
                    }
                }
                _ = sweep.tick() => self.reap_concluded(),
            }
        }
        tracing::debug!(group = %self.group, worker = id, "consensus worker stopped");
    }

    fn process(&self, item: WorkItem<O>) {
        match item {
            WorkItem::Local(observation) => {
                let digest = observation.signing_digest();
                if let Some(handle) = self.reactor_for(&digest, &observation.message_id(), None)
                {
                    if !handle.submit_local(observation) {
                        tracing::debug!(
                            group = %self.group,
                            digest = %digest,
                            "local observation slot unavailable, dropped"
                        );
                    }
                }
            }
            WorkItem::Foreign(attestation) => {
                let digest = attestation.digest;
                let message_id = attestation.message_id.clone();
                let handle = self.reactor_for(&digest, &message_id, Some(&attestation));
                if let Some(handle) = handle {
                    if !handle.submit_foreign(attestation) {
                        self.metrics.submissions_dropped.inc();
                        tracing::debug!(
                            group = %self.group,
                            digest = %digest,
                            "foreign attestation queue full, dropped"
                        );
                    }
                }
            }
            WorkItem::Transition(transition) => self.handle_transition(transition),
        }
    }

    /// Look up the reactor for `digest`, creating one if admission passes.
    ///
    /// The map lock is held across admission and creation so a digest can
    /// never get two live reactors.
    fn reactor_for(
        &self,
        digest: &Digest,
        message_id: &str,
        attestation: Option<&SignedAttestation>,
    ) -> Option<ReactorHandle<O>> {
        // A terminal reactor still in the map means its conclusion
        // notification was dropped; settle it before deciding anything else
        // for this digest.
        let stale = {
            let mut reactors = self.lock_reactors();
            match reactors.get(digest) {
                Some(handle) if !handle.reactor.state().is_terminal() => {
                    return Some(handle.clone());
                }
                Some(_) => {
                    let handle = reactors.remove(digest);
                    self.metrics.live_reactors.set(reactors.len() as i64);
                    handle
                }
                None => None,
            }
        };
        if let Some(handle) = stale {
            tracing::warn!(
                group = %self.group,
                digest = %digest,
                "conclusion notification was dropped, recovering from reactor state"
            );
            let previous = handle.reactor.previous_state();
            self.conclude(handle, previous);
        }

        let mut reactors = self.lock_reactors();
        // Another worker may have created the reactor while the map lock was
        // released for the recovery above.
        if let Some(handle) = reactors.get(digest) {
            return Some(handle.clone());
        }

        let Some(participants) = self.provider.current() else {
            tracing::warn!(
                group = %self.group,
                digest = %digest,
                "no participant set, cannot create reactor"
            );
            return None;
        };

        let request = AdmissionRequest {
            digest,
            message_id,
            attestation,
            participants: &participants,
        };
        for filter in &self.filters {
            if let Err(e) = filter.admit(&request) {
                self.metrics.creations_refused.inc();
                tracing::debug!(group = %self.group, digest = %digest, error = %e, "reactor creation refused");
                return None;
            }
        }

        let sink = {
            let work_tx = self.work_tx.clone();
            let metrics = self.metrics.clone();
            let group = self.group.clone();
            Box::new(move |transition: StateTransition| {
                if work_tx.try_send(WorkItem::Transition(transition)).is_err() {
                    metrics.notifications_dropped.inc();
                    tracing::warn!(
                        group = %group,
                        digest = %transition.digest,
                        "work queue full, state transition notification dropped"
                    );
                }
            })
        };

        let reactor = Arc::new(ConsensusReactor::new(
            self.group.clone(),
            *digest,
            participants,
            self.config.reactor.clone(),
            self.identity,
            self.network.clone(),
            self.metrics.clone(),
            sink,
        ));
        let handle = spawn_reactor(reactor, self.signer.clone(), &self.shutdown);
        reactors.insert(*digest, handle.clone());
        self.metrics.reactors_created.inc();
        self.metrics.live_reactors.set(reactors.len() as i64);
        tracing::debug!(group = %self.group, digest = %digest, "reactor created");
        Some(handle)
    }

    fn handle_transition(&self, transition: StateTransition) {
        match transition.to {
            ReactorState::Quorum => {
                // A terminal notification processed by another worker may
                // have evicted the reactor already; its finalization write
                // covers ours.
                let Some(handle) = self
                    .lock_reactors()
                    .get(&transition.digest)
                    .cloned()
                else {
                    tracing::warn!(
                        group = %self.group,
                        digest = %transition.digest,
                        "quorum notification for evicted reactor, skipping"
                    );
                    return;
                };
                let observation = handle
                    .reactor
                    .observation()
                    .expect("quorum state requires a local observation");
                let signatures = handle.reactor.signatures();
                tracing::info!(
                    group = %self.group,
                    message_id = %observation.message_id(),
                    signatures = signatures.len(),
                    "quorum reached"
                );
                self.persist(&observation, &signatures);
                self.handler.on_quorum(&observation, &signatures);
            }
            ReactorState::Finalized | ReactorState::TimedOut => {
                // The recovery sweep may have settled this digest before the
                // queued notification was processed.
                let Some(handle) = self.evict(&transition.digest) else {
                    tracing::debug!(
                        group = %self.group,
                        digest = %transition.digest,
                        "conclusion already handled, skipping"
                    );
                    return;
                };
                self.conclude(handle, transition.from);
            }
            to => {
                tracing::debug!(
                    group = %self.group,
                    digest = %transition.digest,
                    from = %transition.from,
                    to = %to,
                    "reactor progressed"
                );
            }
        }
    }

    /// Run a concluded reactor's terminal side effects. `previous` is the
    /// state the round was in when it gave up.
    fn conclude(&self, handle: ReactorHandle<O>, previous: ReactorState) {
        match handle.reactor.state() {
            ReactorState::Finalized => {
                let observation = handle
                    .reactor
                    .observation()
                    .expect("finalized state requires a local observation");
                let signatures = handle.reactor.signatures();
                tracing::info!(
                    group = %self.group,
                    message_id = %observation.message_id(),
                    signatures = signatures.len(),
                    "observation finalized"
                );
                self.persist(&observation, &signatures);
                self.handler.on_finalization(&observation, &signatures);
            }
            ReactorState::TimedOut => {
                let digest = handle.reactor.digest();
                let observation = handle.reactor.observation();
                let signatures = handle.reactor.signatures();
                tracing::info!(
                    group = %self.group,
                    digest = %digest,
                    previous = %previous,
                    signatures = signatures.len(),
                    "consensus round timed out"
                );
                self.handler
                    .on_timeout(previous, digest, observation.as_ref(), &signatures);
            }
            state => {
                tracing::error!(
                    group = %self.group,
                    digest = %handle.reactor.digest(),
                    state = %state,
                    "conclusion requested for a reactor that has not concluded"
                );
            }
        }
    }

    /// Evict and conclude every reactor that reached a terminal state but is
    /// still mapped: its conclusion notification was dropped on a full queue.
    /// The reactor state carries everything the notification did, so the
    /// outcome is re-derived instead of lost.
    fn reap_concluded(&self) {
        let stale: Vec<ReactorHandle<O>> = {
            let mut reactors = self.lock_reactors();
            let concluded: Vec<Digest> = reactors
                .iter()
                .filter(|(_, handle)| handle.reactor.state().is_terminal())
                .map(|(digest, _)| *digest)
                .collect();
            let handles = concluded
                .iter()
                .filter_map(|digest| reactors.remove(digest))
                .collect();
            self.metrics.live_reactors.set(reactors.len() as i64);
            handles
        };
        for handle in stale {
            tracing::warn!(
                group = %self.group,
                digest = %handle.reactor.digest(),
                "conclusion notification was dropped, recovering from reactor state"
            );
            let previous = handle.reactor.previous_state();
            self.conclude(handle, previous);
        }
    }

    /// Remove a concluded reactor from the routing map, if still present.
    fn evict(&self, digest: &Digest) -> Option<ReactorHandle<O>> {
        let mut reactors = self.lock_reactors();
        let handle = reactors.remove(digest);
        if handle.is_some() {
            self.metrics.live_reactors.set(reactors.len() as i64);
        }
        handle
    }

    fn persist(&self, observation: &O, signatures: &[IndexedSignature]) {
        if let Err(e) = self.storage.store(observation, signatures) {
            tracing::error!(
                group = %self.group,
                message_id = %observation.message_id(),
                error = %e,
                "failed to persist quorum result"
            );
        }
    }

    fn lock_reactors(&self) -> std::sync::MutexGuard<'_, HashMap<Digest, ReactorHandle<O>>> {
        self.reactors.lock().unwrap_or_else(|e| e.into_inner())
    }
}
