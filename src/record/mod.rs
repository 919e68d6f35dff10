//! Name record aggregate: all per-name state (value list, demand
//! estimation, replica votes, active-set handoff) and its synchronized
//! public API. One record is the unit of mutual exclusion; independent
//! records are mutated fully in parallel.

mod demand;
mod transition;
mod values;
mod votes;
mod wire;

use std::collections::HashSet;
use std::fmt;
use std::mem;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::external::{ReachabilityOracle, ReplicaPlacement};
use crate::utils::GnsError;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use serde::{Deserialize, Serialize};

pub use demand::ReplicaStats;
pub use transition::{PaxosEpoch, TransitionStage};
pub use values::UpdateOperation;

use demand::DemandEstimator;
use transition::ActiveSetTransition;
use votes::ReplicaVoteTally;
use wire::RecordWire;

/// Name server (and client proxy) ID type.
pub type NodeId = u32;

/// Record type key distinguishing co-located record types for one name.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
pub enum RecordKey {
    #[serde(rename = "EdgeRecord")]
    Edge,
    #[serde(rename = "CoreRecord")]
    Core,
    #[serde(rename = "GroupRecord")]
    Group,
}

impl RecordKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKey::Edge => "EdgeRecord",
            RecordKey::Core => "CoreRecord",
            RecordKey::Group => "GroupRecord",
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration parameters struct.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordConfig {
    /// Window size of all demand-smoothing moving averages.
    pub moving_avg_window_size: usize,

    /// Multiplier from update inter-arrival rate to cache TTL in seconds.
    pub ttl_constant: f64,

    /// Number of active replicas chosen at bootstrap selection.
    pub min_replica: usize,

    /// Total number of name servers in the deployment.
    pub num_nameservers: u32,

    /// Total number of client proxies, for request attribution arrays.
    pub num_lns: u32,
}

impl Default for RecordConfig {
    fn default() -> Self {
        RecordConfig {
            moving_avg_window_size: 20,
            ttl_constant: 0.5,
            min_replica: 3,
            num_nameservers: 3,
            num_lns: 0,
        }
    }
}

/// The state of one name record. All access goes through the owning
/// `NameRecord`'s lock; methods here assume exclusive (or shared, for
/// reads) access has already been granted.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordState {
    /// Name (host/domain) this record resolves.
    pub(crate) name: String,

    /// Which of the co-located record types this is.
    pub(crate) record_key: RecordKey,

    /// Consistent-hash-assigned primary servers; never mutated after
    /// construction except wholesale replace by the placement layer.
    pub(crate) primary_nameservers: HashSet<NodeId>,

    /// True if the local server is one of the primaries.
    pub(crate) primary_replica: bool,

    /// Current values of this record.
    pub(crate) values_list: Vec<String>,

    /// Point-in-time backup taken at handoff, retrievable only by the
    /// exact old paxos id that produced it.
    pub(crate) old_values_list: Vec<String>,

    /// Set by primaries once deletion is decided; the record is purged
    /// after its active group is torn down.
    pub(crate) marked_for_removal: bool,

    /// Active-set membership/epoch handoff state machine.
    pub(crate) transition: ActiveSetTransition,

    /// Demand estimation state.
    pub(crate) demand: DemandEstimator,

    /// Replica-selection vote tally; present iff this is a primary.
    pub(crate) votes: Option<ReplicaVoteTally>,
}

impl RecordState {
    fn new(
        name: String,
        record_key: RecordKey,
        values: Option<Vec<String>>,
        primaries: HashSet<NodeId>,
        local_id: NodeId,
        config: &RecordConfig,
    ) -> Self {
        let primary_replica = primaries.contains(&local_id);
        let initial_values = values.unwrap_or_default();

        let active = votes::initial_actives(
            &primaries,
            config.min_replica,
            &name,
            config.num_nameservers,
        );
        pf_debug!("record '{}' initial actives: {:?}", name, active);

        // epoch ids every primary derives identically with no coordination
        let transition = ActiveSetTransition::initial(
            active,
            primaries.clone(),
            format!("{}-{}-2", name, record_key),
            format!("{}-{}-1", name, record_key),
        );

        RecordState {
            demand: DemandEstimator::new(config, primary_replica),
            votes: primary_replica.then(ReplicaVoteTally::new),
            old_values_list: initial_values.clone(),
            values_list: initial_values,
            marked_for_removal: false,
            primary_nameservers: primaries,
            primary_replica,
            name,
            record_key,
            transition,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record_key(&self) -> RecordKey {
        self.record_key
    }

    pub fn is_primary_replica(&self) -> bool {
        self.primary_replica
    }

    pub fn primary_nameservers(&self) -> &HashSet<NodeId> {
        &self.primary_nameservers
    }

    pub fn contains_primary(&self, id: NodeId) -> bool {
        self.primary_nameservers.contains(&id)
    }

    /// Wholesale replace of the primary set, on behalf of the placement
    /// layer (which also decides the local primary flag's fate).
    pub fn replace_primary_nameservers(&mut self, primaries: HashSet<NodeId>) {
        self.primary_nameservers = primaries;
    }

    /// The primary with the smallest id.
    pub fn smallest_primary(&self) -> Option<NodeId> {
        self.primary_nameservers.iter().copied().min()
    }

    /// A pseudo-random but deterministically chosen primary for this name,
    /// identical on every server: the coordinator for this record's
    /// updates, voting, and aggregation.
    pub fn main_primary(&self) -> Option<NodeId> {
        if self.primary_nameservers.is_empty() {
            return None;
        }
        let mut ids: Vec<NodeId> =
            self.primary_nameservers.iter().copied().collect();
        ids.sort_unstable();
        let mut rng = StdRng::seed_from_u64(votes::name_seed(&self.name));
        Some(ids[rng.gen_range(0..ids.len())])
    }

    pub fn active_nameservers(&self) -> &HashSet<NodeId> {
        &self.transition.active
    }

    pub fn old_active_nameservers(&self) -> &HashSet<NodeId> {
        &self.transition.old_active
    }

    pub fn contains_active(&self, id: NodeId) -> bool {
        self.transition.active.contains(&id)
    }

    pub fn num_active(&self) -> usize {
        self.transition.active.len()
    }

    /// All servers involved with this record: active union primary.
    pub fn all_nameservers(&self) -> HashSet<NodeId> {
        self.transition
            .active
            .union(&self.primary_nameservers)
            .copied()
            .collect()
    }

    pub fn replace_active_nameservers(&mut self, actives: HashSet<NodeId>) {
        self.transition.active = actives;
    }

    /// Returns false if the server already was an active replica.
    pub fn add_active_nameserver(&mut self, id: NodeId) -> bool {
        self.transition.active.insert(id)
    }

    /// Removes an active replica, forgetting its reported stats first so
    /// its absence next round is not misread as a demand drop.
    pub fn remove_active_nameserver(&mut self, id: NodeId) -> bool {
        self.demand.remove_replica_stats(id);
        self.transition.active.remove(&id)
    }

    pub fn values(&self) -> &[String] {
        &self.values_list
    }

    /// The pre-handoff value backup, released only to the exact old epoch
    /// that produced it.
    pub fn old_values(&self, old_paxos_id: &str) -> Option<&[String]> {
        if self.transition.old_active_paxos_id.as_deref() == Some(old_paxos_id)
        {
            Some(&self.old_values_list)
        } else {
            None
        }
    }

    /// Applies one update operation to the value list. Returns true iff
    /// the list changed.
    pub fn update_values_list(
        &mut self,
        new_values: &[String],
        old_values: &[String],
        op: UpdateOperation,
    ) -> bool {
        values::apply_update(&mut self.values_list, new_values, old_values, op)
    }

    pub fn increment_lookup_request(&mut self) {
        self.demand.total_lookup_request += 1;
    }

    pub fn increment_update_request(&mut self) {
        self.demand.total_update_request += 1;
    }

    pub fn total_lookup_request(&self) -> u64 {
        self.demand.total_lookup_request
    }

    pub fn total_update_request(&self) -> u64 {
        self.demand.total_update_request
    }

    /// Feeds an update's arrival time into demand estimation; returns the
    /// recomputed TTL. `increment_update_request` must be called first.
    pub fn record_update(&mut self, timestamp: i64) -> i32 {
        self.demand.record_update(timestamp)
    }

    /// Feeds a lookup's arrival time into demand estimation; returns the
    /// recomputed lookup rate. `increment_lookup_request` must be called
    /// first.
    pub fn record_lookup(&mut self, timestamp: i64) -> f64 {
        self.demand.record_lookup(timestamp)
    }

    pub fn ttl(&self) -> i32 {
        self.demand.time_to_live
    }

    pub fn set_ttl(&mut self, ttl: i32) {
        self.demand.time_to_live = ttl;
    }

    pub fn update_rate(&self) -> f64 {
        self.demand.update_rate
    }

    pub fn lookup_rate(&self) -> f64 {
        self.demand.lookup_rate
    }

    /// Stores the latest {read, write} frequencies reported by an active
    /// replica. No-op at non-primaries.
    pub fn add_replica_stats(&mut self, id: NodeId, read: i64, write: i64) {
        self.demand.add_replica_stats(id, read, write);
    }

    /// Cumulative aggregate lookup frequency across the active set; call
    /// once per ordinary polling interval.
    pub fn read_stats(&mut self) -> Result<f64, GnsError> {
        self.demand.read_stats()
    }

    /// Cumulative aggregate update frequency across the active set.
    pub fn write_stats(&mut self) -> Result<f64, GnsError> {
        self.demand.write_stats()
    }

    /// Snapshot aggregate lookup frequency, for consensus-driven
    /// aggregation rounds.
    pub fn read_stats_snapshot(&mut self) -> Result<f64, GnsError> {
        self.demand.read_stats_snapshot()
    }

    /// Snapshot aggregate update frequency, for consensus-driven
    /// aggregation rounds.
    pub fn write_stats_snapshot(&mut self) -> Result<f64, GnsError> {
        self.demand.write_stats_snapshot()
    }

    pub fn read_avg(&self) -> Result<i64, GnsError> {
        self.demand.read_avg()
    }

    pub fn write_avg(&self) -> Result<i64, GnsError> {
        self.demand.write_avg()
    }

    /// Attributes requests to the originating client proxy. Kept separate
    /// from replica-selection votes: this counts demand, not suitability.
    pub fn add_lns_request_count(&mut self, lns: NodeId, count: u64) {
        self.demand.add_lns_request_count(lns, count);
    }

    /// Dense per-proxy request counts, indexed by proxy id.
    pub fn lns_request_counts(&self) -> Vec<u64> {
        self.demand.lns_request_counts()
    }

    /// Accumulates a vote proposing `id` as a future active replica.
    pub fn add_replica_selection_vote(
        &mut self,
        id: NodeId,
        weight: u64,
    ) -> Result<(), GnsError> {
        match self.votes.as_mut() {
            Some(tally) => {
                tally.add_vote(id, weight);
                Ok(())
            }
            None => logged_err!(
                "record '{}': replica votes tracked only at primaries",
                self.name
            ),
        }
    }

    /// Up to `count` highest-voted eligible servers (non-primary,
    /// reachable); may return fewer than requested.
    pub fn highest_voted_replicas(
        &self,
        count: usize,
        oracle: &dyn ReachabilityOracle,
    ) -> Result<HashSet<NodeId>, GnsError> {
        match self.votes.as_ref() {
            Some(tally) => Ok(tally.select_top_replicas(
                count,
                &self.primary_nameservers,
                oracle,
            )),
            None => logged_err!(
                "record '{}': replica votes tracked only at primaries",
                self.name
            ),
        }
    }

    /// Demotes the current active group and installs the proposed set, not
    /// yet confirmed running. Primaries only; the actual membership change
    /// happens in the consensus layer under `new_paxos_id`.
    pub fn propose_new_active_set(
        &mut self,
        new_actives: HashSet<NodeId>,
        new_paxos_id: String,
    ) -> Result<(), GnsError> {
        if !self.primary_replica {
            return logged_err!(
                "record '{}': active set proposed at a non-primary",
                self.name
            );
        }
        pf_debug!(
            "record '{}': proposing actives {:?} under {}",
            self.name,
            new_actives,
            new_paxos_id
        );
        self.transition.propose_new_active_set(new_actives, new_paxos_id);
        Ok(())
    }

    /// Has the old group named by `paxos_id` stopped? Stale ids answer
    /// yes: that epoch already ended.
    pub fn is_old_group_stopped(&self, paxos_id: &str) -> bool {
        self.transition.is_old_group_stopped(paxos_id)
    }

    /// Confirmed stop of the old group; stale ids are no-ops. Returns
    /// whether the id matched.
    pub fn on_old_group_stopped(&mut self, paxos_id: &str) -> bool {
        self.transition.on_old_group_stopped(paxos_id)
    }

    /// Confirmed start of the proposed group. Returns whether the id
    /// matched.
    pub fn on_new_group_started(&mut self, paxos_id: &str) -> bool {
        self.transition.on_new_group_started(paxos_id)
    }

    /// Teardown of the currently active group (removal, or re-proposal
    /// under failure): demotes it and snapshots the value list as the
    /// old-epoch backup. Returns whether the id matched.
    pub fn on_current_group_fully_stopped(&mut self, paxos_id: &str) -> bool {
        if self.transition.on_current_group_fully_stopped(paxos_id) {
            self.old_values_list = mem::take(&mut self.values_list);
            pf_debug!(
                "record '{}': active group {} fully stopped",
                self.name,
                paxos_id
            );
            true
        } else {
            false
        }
    }

    /// Resumes service after a full stop: installs a fresh running active
    /// group and seeds its value list.
    pub fn on_new_group_started_with_value(
        &mut self,
        actives: HashSet<NodeId>,
        paxos_id: String,
        values: Vec<String>,
    ) {
        self.transition
            .on_new_group_started_with_membership(actives, paxos_id);
        self.values_list = values;
    }

    /// Classifies an in-flight paxos instance id against this record's
    /// epochs.
    pub fn classify(&self, paxos_id: &str) -> PaxosEpoch {
        self.transition.classify(paxos_id)
    }

    /// Current handoff stage. The error stage is reported, not panicked
    /// on: availability beats crashing over a flag anomaly.
    pub fn transition_stage(&self) -> TransitionStage {
        let stage = self.transition.stage();
        if stage == TransitionStage::BothActiveRunningError {
            pf_error!(
                "record '{}': both old and new active groups marked running",
                self.name
            );
        }
        stage
    }

    pub fn active_paxos_id(&self) -> Option<&str> {
        self.transition.active_paxos_id.as_deref()
    }

    pub fn old_active_paxos_id(&self) -> Option<&str> {
        self.transition.old_active_paxos_id.as_deref()
    }

    pub fn is_active_running(&self) -> bool {
        self.transition.active_running
    }

    pub fn is_marked_for_removal(&self) -> bool {
        self.marked_for_removal
    }

    /// Flags the record for removal once its active group is torn down.
    pub fn mark_for_removal(&mut self) {
        self.marked_for_removal = true;
    }
}

/// A name record behind its own reader-writer lock: the unit of
/// concurrency and serialization. The inherent methods below each acquire
/// the lock for the duration of one call; call sites spanning several
/// steps hold a scoped guard from `read()`/`write()` instead, which is
/// released on every exit path when dropped.
#[derive(Debug)]
pub struct NameRecord {
    inner: RwLock<RecordState>,
}

impl NameRecord {
    /// Creates a record for a name with optional initial values, given its
    /// externally computed primary set.
    pub fn new(
        name: impl Into<String>,
        record_key: RecordKey,
        values: Option<Vec<String>>,
        primaries: HashSet<NodeId>,
        local_id: NodeId,
        config: &RecordConfig,
    ) -> Self {
        NameRecord {
            inner: RwLock::new(RecordState::new(
                name.into(),
                record_key,
                values,
                primaries,
                local_id,
                config,
            )),
        }
    }

    /// Creates a record, obtaining the primary set from the placement
    /// collaborator.
    pub fn with_placement(
        name: impl Into<String>,
        record_key: RecordKey,
        values: Option<Vec<String>>,
        placement: &dyn ReplicaPlacement,
        local_id: NodeId,
        config: &RecordConfig,
    ) -> Self {
        let name = name.into();
        let primaries = placement.primary_replicas(&name);
        Self::new(name, record_key, values, primaries, local_id, config)
    }

    /// Acquires this record's lock shared, for multi-step reads.
    pub fn read(&self) -> RwLockReadGuard<'_, RecordState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquires this record's lock exclusive, for multi-step operations
    /// that must not interleave with conflicting proposals.
    pub fn write(&self) -> RwLockWriteGuard<'_, RecordState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> String {
        self.read().name.clone()
    }

    pub fn record_key(&self) -> RecordKey {
        self.read().record_key
    }

    pub fn is_primary_replica(&self) -> bool {
        self.read().primary_replica
    }

    pub fn primary_nameservers(&self) -> HashSet<NodeId> {
        self.read().primary_nameservers.clone()
    }

    pub fn contains_primary(&self, id: NodeId) -> bool {
        self.read().contains_primary(id)
    }

    pub fn replace_primary_nameservers(&self, primaries: HashSet<NodeId>) {
        self.write().replace_primary_nameservers(primaries);
    }

    pub fn smallest_primary(&self) -> Option<NodeId> {
        self.read().smallest_primary()
    }

    pub fn main_primary(&self) -> Option<NodeId> {
        self.read().main_primary()
    }

    pub fn active_nameservers(&self) -> HashSet<NodeId> {
        self.read().transition.active.clone()
    }

    pub fn old_active_nameservers(&self) -> HashSet<NodeId> {
        self.read().transition.old_active.clone()
    }

    pub fn contains_active(&self, id: NodeId) -> bool {
        self.read().contains_active(id)
    }

    pub fn num_active(&self) -> usize {
        self.read().num_active()
    }

    pub fn all_nameservers(&self) -> HashSet<NodeId> {
        self.read().all_nameservers()
    }

    pub fn replace_active_nameservers(&self, actives: HashSet<NodeId>) {
        self.write().replace_active_nameservers(actives);
    }

    pub fn add_active_nameserver(&self, id: NodeId) -> bool {
        self.write().add_active_nameserver(id)
    }

    pub fn remove_active_nameserver(&self, id: NodeId) -> bool {
        self.write().remove_active_nameserver(id)
    }

    pub fn values(&self) -> Vec<String> {
        self.read().values_list.clone()
    }

    pub fn old_values(&self, old_paxos_id: &str) -> Option<Vec<String>> {
        self.read().old_values(old_paxos_id).map(<[String]>::to_vec)
    }

    pub fn update_values_list(
        &self,
        new_values: &[String],
        old_values: &[String],
        op: UpdateOperation,
    ) -> bool {
        self.write().update_values_list(new_values, old_values, op)
    }

    pub fn increment_lookup_request(&self) {
        self.write().increment_lookup_request();
    }

    pub fn increment_update_request(&self) {
        self.write().increment_update_request();
    }

    pub fn total_lookup_request(&self) -> u64 {
        self.read().total_lookup_request()
    }

    pub fn total_update_request(&self) -> u64 {
        self.read().total_update_request()
    }

    pub fn record_update(&self, timestamp: i64) -> i32 {
        self.write().record_update(timestamp)
    }

    pub fn record_lookup(&self, timestamp: i64) -> f64 {
        self.write().record_lookup(timestamp)
    }

    pub fn ttl(&self) -> i32 {
        self.read().ttl()
    }

    pub fn set_ttl(&self, ttl: i32) {
        self.write().set_ttl(ttl);
    }

    pub fn update_rate(&self) -> f64 {
        self.read().update_rate()
    }

    pub fn lookup_rate(&self) -> f64 {
        self.read().lookup_rate()
    }

    pub fn add_replica_stats(&self, id: NodeId, read: i64, write: i64) {
        self.write().add_replica_stats(id, read, write);
    }

    pub fn read_stats(&self) -> Result<f64, GnsError> {
        self.write().read_stats()
    }

    pub fn write_stats(&self) -> Result<f64, GnsError> {
        self.write().write_stats()
    }

    pub fn read_stats_snapshot(&self) -> Result<f64, GnsError> {
        self.write().read_stats_snapshot()
    }

    pub fn write_stats_snapshot(&self) -> Result<f64, GnsError> {
        self.write().write_stats_snapshot()
    }

    pub fn read_avg(&self) -> Result<i64, GnsError> {
        self.read().read_avg()
    }

    pub fn write_avg(&self) -> Result<i64, GnsError> {
        self.read().write_avg()
    }

    pub fn add_lns_request_count(&self, lns: NodeId, count: u64) {
        self.write().add_lns_request_count(lns, count);
    }

    pub fn lns_request_counts(&self) -> Vec<u64> {
        self.read().lns_request_counts()
    }

    pub fn add_replica_selection_vote(
        &self,
        id: NodeId,
        weight: u64,
    ) -> Result<(), GnsError> {
        self.write().add_replica_selection_vote(id, weight)
    }

    pub fn highest_voted_replicas(
        &self,
        count: usize,
        oracle: &dyn ReachabilityOracle,
    ) -> Result<HashSet<NodeId>, GnsError> {
        self.read().highest_voted_replicas(count, oracle)
    }

    pub fn propose_new_active_set(
        &self,
        new_actives: HashSet<NodeId>,
        new_paxos_id: String,
    ) -> Result<(), GnsError> {
        self.write().propose_new_active_set(new_actives, new_paxos_id)
    }

    pub fn is_old_group_stopped(&self, paxos_id: &str) -> bool {
        self.read().is_old_group_stopped(paxos_id)
    }

    pub fn on_old_group_stopped(&self, paxos_id: &str) -> bool {
        self.write().on_old_group_stopped(paxos_id)
    }

    pub fn on_new_group_started(&self, paxos_id: &str) -> bool {
        self.write().on_new_group_started(paxos_id)
    }

    pub fn on_current_group_fully_stopped(&self, paxos_id: &str) -> bool {
        self.write().on_current_group_fully_stopped(paxos_id)
    }

    pub fn on_new_group_started_with_value(
        &self,
        actives: HashSet<NodeId>,
        paxos_id: String,
        values: Vec<String>,
    ) {
        self.write()
            .on_new_group_started_with_value(actives, paxos_id, values);
    }

    pub fn classify(&self, paxos_id: &str) -> PaxosEpoch {
        self.read().classify(paxos_id)
    }

    pub fn transition_stage(&self) -> TransitionStage {
        self.read().transition_stage()
    }

    pub fn active_paxos_id(&self) -> Option<String> {
        self.read().transition.active_paxos_id.clone()
    }

    pub fn old_active_paxos_id(&self) -> Option<String> {
        self.read().transition.old_active_paxos_id.clone()
    }

    pub fn is_active_running(&self) -> bool {
        self.read().is_active_running()
    }

    pub fn is_marked_for_removal(&self) -> bool {
        self.read().is_marked_for_removal()
    }

    pub fn mark_for_removal(&self) {
        self.write().mark_for_removal();
    }

    /// Serializes the record to its persisted/wire JSON form.
    pub fn to_json(&self) -> Result<String, GnsError> {
        Ok(serde_json::to_string(&self.read().to_wire())?)
    }

    /// Rebuilds a record from its persisted/wire JSON form. Missing
    /// required fields fail the whole deserialization.
    pub fn from_json(
        json: &str,
        config: &RecordConfig,
    ) -> Result<Self, GnsError> {
        let wire: RecordWire = serde_json::from_str(json)?;
        Ok(NameRecord {
            inner: RwLock::new(RecordState::from_wire(wire, config)),
        })
    }
}

#[cfg(test)]
mod record_tests {
    use super::*;
    use crate::external::GroupConsensus;
    use std::cell::RefCell;
    use std::sync::Arc;
    use std::thread;

    struct AllReachable;
    impl ReachabilityOracle for AllReachable {
        fn unreachable(&self, _id: NodeId) -> bool {
            false
        }
    }

    struct StaticPlacement(HashSet<NodeId>);
    impl ReplicaPlacement for StaticPlacement {
        fn primary_replicas(&self, _name: &str) -> HashSet<NodeId> {
            self.0.clone()
        }
    }

    fn test_config() -> RecordConfig {
        RecordConfig {
            moving_avg_window_size: 4,
            ttl_constant: 2.0,
            min_replica: 3,
            num_nameservers: 20,
            num_lns: 2,
        }
    }

    fn primary_record() -> NameRecord {
        NameRecord::new(
            "example.com",
            RecordKey::Edge,
            Some(vec!["10.0.0.1".into()]),
            HashSet::from([1, 3, 5]),
            1, // local server is a primary
            &test_config(),
        )
    }

    #[test]
    fn construction_invariants() {
        let record = primary_record();
        assert!(record.is_primary_replica());
        assert_eq!(
            record.active_paxos_id().as_deref(),
            Some("example.com-EdgeRecord-2")
        );
        assert_eq!(
            record.old_active_paxos_id().as_deref(),
            Some("example.com-EdgeRecord-1")
        );
        // neither group confirmed running yet
        assert_eq!(record.transition_stage(), TransitionStage::NoActiveRunning);
        // bootstrap actives never overlap primaries
        let actives = record.active_nameservers();
        assert_eq!(actives.len(), 3);
        assert!(actives.is_disjoint(&record.primary_nameservers()));
        assert_eq!(record.old_active_nameservers(), HashSet::from([1, 3, 5]));
        assert_eq!(record.values(), vec!["10.0.0.1".to_string()]);
    }

    #[test]
    fn with_placement_uses_collaborator() {
        let placement = StaticPlacement(HashSet::from([2, 4]));
        let record = NameRecord::with_placement(
            "example.org",
            RecordKey::Core,
            None,
            &placement,
            7,
            &test_config(),
        );
        assert_eq!(record.primary_nameservers(), HashSet::from([2, 4]));
        assert!(!record.is_primary_replica());
    }

    #[test]
    fn primary_only_state_gated() {
        let record = NameRecord::new(
            "example.com",
            RecordKey::Edge,
            None,
            HashSet::from([1, 3, 5]),
            2, // not a primary
            &test_config(),
        );
        assert!(record.add_replica_selection_vote(0, 10).is_err());
        assert!(record.highest_voted_replicas(2, &AllReachable).is_err());
        assert!(record.read_stats().is_err());
        assert!(record
            .propose_new_active_set(HashSet::from([9]), "x-1".into())
            .is_err());
    }

    #[test]
    fn vote_selection_through_record() -> Result<(), GnsError> {
        let record = primary_record();
        for (id, votes) in
            [(0, 10), (1, 15), (2, 4), (3, 7), (4, 1), (5, 11), (6, 3)]
        {
            record.add_replica_selection_vote(id, votes)?;
        }
        let selected = record.highest_voted_replicas(2, &AllReachable)?;
        assert_eq!(selected, HashSet::from([0, 2]));
        Ok(())
    }

    #[test]
    fn handoff_with_value_snapshot() -> Result<(), GnsError> {
        let record = primary_record();
        let first_active = record.active_paxos_id().unwrap();
        assert!(record.on_new_group_started(&first_active));
        assert_eq!(record.transition_stage(), TransitionStage::ActiveRunning);

        record.propose_new_active_set(
            HashSet::from([7, 8, 9]),
            "example.com-EdgeRecord-3".into(),
        )?;
        assert_eq!(
            record.transition_stage(),
            TransitionStage::OldActiveRunning
        );

        assert!(record.on_old_group_stopped(&first_active));
        assert_eq!(record.transition_stage(), TransitionStage::NoActiveRunning);
        assert!(record.on_new_group_started("example.com-EdgeRecord-3"));
        assert_eq!(record.transition_stage(), TransitionStage::ActiveRunning);

        // tear the current group down entirely, e.g. for removal
        record.update_values_list(
            &["10.9.9.9".to_string()],
            &[],
            UpdateOperation::ReplaceAll,
        );
        assert!(record.on_current_group_fully_stopped("example.com-EdgeRecord-3"));
        assert_eq!(record.transition_stage(), TransitionStage::NoActiveRunning);
        assert!(record.values().is_empty());
        // backup released only to the exact stopped epoch
        assert_eq!(
            record.old_values("example.com-EdgeRecord-3"),
            Some(vec!["10.9.9.9".to_string()])
        );
        assert_eq!(record.old_values("example.com-EdgeRecord-2"), None);

        // resume service with a fresh seeded group
        record.on_new_group_started_with_value(
            HashSet::from([2, 6]),
            "example.com-EdgeRecord-4".into(),
            vec!["10.9.9.9".into()],
        );
        assert_eq!(record.transition_stage(), TransitionStage::ActiveRunning);
        assert_eq!(record.classify("example.com-EdgeRecord-4"), PaxosEpoch::Current);
        assert_eq!(record.classify(&first_active), PaxosEpoch::Neither);
        Ok(())
    }

    #[test]
    fn scoped_guard_spans_steps() -> Result<(), GnsError> {
        let record = primary_record();
        record.add_replica_selection_vote(0, 10)?;
        record.add_replica_selection_vote(6, 3)?;

        // read the current actives and propose their replacement without
        // releasing the record in between
        let mut state = record.write();
        let chosen = state.highest_voted_replicas(2, &AllReachable)?;
        state.propose_new_active_set(chosen.clone(), "example.com-EdgeRecord-3".into())?;
        assert_eq!(state.active_nameservers(), &chosen);
        drop(state);

        assert_eq!(record.active_nameservers(), chosen);
        Ok(())
    }

    #[test]
    fn demand_flow_through_record() {
        let record = primary_record();
        for ts in [0, 2000, 3000] {
            record.increment_update_request();
            record.record_update(ts);
        }
        assert_eq!(record.total_update_request(), 3);
        // window holds gaps 2000, 1000 -> rate 1.5s -> ttl round(3.0)
        assert_eq!(record.ttl(), 3);

        record.add_lns_request_count(0, 5);
        record.add_lns_request_count(1, 2);
        assert_eq!(record.lns_request_counts(), vec![5, 2]);
    }

    #[test]
    fn records_mutate_in_parallel() {
        let record = Arc::new(primary_record());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let record = Arc::clone(&record);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    record.increment_lookup_request();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(record.total_lookup_request(), 400);
    }

    #[test]
    fn record_config_parsing() -> Result<(), GnsError> {
        let config_str = Some("ttl_constant = 1.5\nmin_replica = 5");
        let config = parsed_config!(config_str => RecordConfig;
                                    moving_avg_window_size, ttl_constant,
                                    min_replica, num_nameservers, num_lns)?;
        assert_eq!(config.ttl_constant, 1.5);
        assert_eq!(config.min_replica, 5);
        assert_eq!(config.moving_avg_window_size, 20);
        Ok(())
    }

    /// Consensus stub recording the control calls a driver would make.
    struct LoggingConsensus(RefCell<Vec<String>>);
    impl GroupConsensus for LoggingConsensus {
        fn create_group(
            &self,
            paxos_id: &str,
            members: &HashSet<NodeId>,
            _initial_state: &[u8],
        ) -> Result<(), GnsError> {
            self.0
                .borrow_mut()
                .push(format!("create {} x{}", paxos_id, members.len()));
            Ok(())
        }
        fn stop_group(&self, paxos_id: &str) -> Result<(), GnsError> {
            self.0.borrow_mut().push(format!("stop {}", paxos_id));
            Ok(())
        }
        fn propose(
            &self,
            paxos_id: &str,
            _payload: &[u8],
        ) -> Result<(), GnsError> {
            self.0.borrow_mut().push(format!("propose {}", paxos_id));
            Ok(())
        }
    }

    #[test]
    fn reconfiguration_round_against_consensus() -> Result<(), GnsError> {
        let record = primary_record();
        let consensus = LoggingConsensus(RefCell::new(Vec::new()));

        // bring the bootstrap group up
        let first = record.active_paxos_id().unwrap();
        consensus.create_group(&first, &record.active_nameservers(), b"seed")?;
        assert!(record.on_new_group_started(&first));

        // demand shifts; a new set wins the vote
        for (id, votes) in [(7, 30), (8, 22), (0, 4)] {
            record.add_replica_selection_vote(id, votes)?;
        }
        let chosen = record.highest_voted_replicas(2, &AllReachable)?;
        assert_eq!(chosen, HashSet::from([7, 8]));

        let next = "example.com-EdgeRecord-3".to_string();
        record.propose_new_active_set(chosen.clone(), next.clone())?;
        consensus.stop_group(&first)?;
        assert_eq!(
            record.transition_stage(),
            TransitionStage::OldActiveRunning
        );

        // stop confirmation arrives, possibly duplicated by the network
        assert!(record.on_old_group_stopped(&first));
        assert!(record.on_old_group_stopped(&first));
        assert_eq!(record.transition_stage(), TransitionStage::NoActiveRunning);

        consensus.create_group(
            &next,
            &chosen,
            record.values().join(",").as_bytes(),
        )?;
        assert!(record.on_new_group_started(&next));
        assert_eq!(record.transition_stage(), TransitionStage::ActiveRunning);

        assert_eq!(
            *consensus.0.borrow(),
            vec![
                format!("create {} x3", first),
                format!("stop {}", first),
                format!("create {} x2", next),
            ]
        );
        Ok(())
    }

    #[test]
    fn marked_for_removal_flow() {
        let record = primary_record();
        assert!(!record.is_marked_for_removal());
        record.mark_for_removal();
        assert!(record.is_marked_for_removal());
    }
}
