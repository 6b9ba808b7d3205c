//! Prometheus instrumentation for the consensus engine.

use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, IntCounter, IntCounterVec, IntGauge, Registry,
};

/// All counters and gauges the engine maintains, registered against a
/// per-instance registry so independent managers never collide.
pub struct ConsensusMetrics {
    registry: Registry,

    pub attestations_received: IntCounter,
    pub attestations_rejected: IntCounterVec,
    pub signatures_produced: IntCounter,
    pub broadcasts: IntCounter,
    pub retransmissions: IntCounter,
    pub quorums_reached: IntCounterVec,
    pub reactors_created: IntCounter,
    pub reactors_finalized: IntCounter,
    pub reactors_timed_out: IntCounter,
    pub creations_refused: IntCounter,
    pub submissions_dropped: IntCounter,
    pub notifications_dropped: IntCounter,
    pub live_reactors: IntGauge,
}

impl ConsensusMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let attestations_received = register_int_counter_with_registry!(
            "warden_attestations_received_total",
            "Foreign attestations handed to a reactor",
            registry
        )
        .expect("register attestations_received");

        let attestations_rejected = register_int_counter_vec_with_registry!(
            "warden_attestations_rejected_total",
            "Foreign attestations rejected, by reason",
            &["reason"],
            registry
        )
        .expect("register attestations_rejected");

        let signatures_produced = register_int_counter_with_registry!(
            "warden_signatures_produced_total",
            "Local signatures produced over observation digests",
            registry
        )
        .expect("register signatures_produced");

        let broadcasts = register_int_counter_with_registry!(
            "warden_attestations_broadcast_total",
            "Own attestations handed to the network adapter",
            registry
        )
        .expect("register broadcasts");

        let retransmissions = register_int_counter_with_registry!(
            "warden_retransmissions_total",
            "Re-broadcasts triggered while waiting for quorum",
            registry
        )
        .expect("register retransmissions");

        let quorums_reached = register_int_counter_vec_with_registry!(
            "warden_quorums_reached_total",
            "Quorums reached, by whether the event was observed locally",
            &["kind"],
            registry
        )
        .expect("register quorums_reached");

        let reactors_created = register_int_counter_with_registry!(
            "warden_reactors_created_total",
            "Consensus reactors created",
            registry
        )
        .expect("register reactors_created");

        let reactors_finalized = register_int_counter_with_registry!(
            "warden_reactors_finalized_total",
            "Reactors that reached finalization",
            registry
        )
        .expect("register reactors_finalized");

        let reactors_timed_out = register_int_counter_with_registry!(
            "warden_reactors_timed_out_total",
            "Reactors that gave up before finalization",
            registry
        )
        .expect("register reactors_timed_out");

        let creations_refused = register_int_counter_with_registry!(
            "warden_reactor_creations_refused_total",
            "Reactor creations refused by an admission filter",
            registry
        )
        .expect("register creations_refused");

        let submissions_dropped = register_int_counter_with_registry!(
            "warden_submissions_dropped_total",
            "Observations or attestations dropped because a queue was full",
            registry
        )
        .expect("register submissions_dropped");

        let notifications_dropped = register_int_counter_with_registry!(
            "warden_notifications_dropped_total",
            "State transition notifications dropped because the queue was full",
            registry
        )
        .expect("register notifications_dropped");

        let live_reactors = register_int_gauge_with_registry!(
            "warden_live_reactors",
            "Reactors currently tracked by the manager",
            registry
        )
        .expect("register live_reactors");

        Self {
            registry,
            attestations_received,
            attestations_rejected,
            signatures_produced,
            broadcasts,
            retransmissions,
            quorums_reached,
            reactors_created,
            reactors_finalized,
            reactors_timed_out,
            creations_refused,
            submissions_dropped,
            notifications_dropped,
            live_reactors,
        }
    }

    /// The registry all engine metrics are registered against, for scraping.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for ConsensusMetrics {
    fn default() -> Self {
        Self::new()
    }
}
