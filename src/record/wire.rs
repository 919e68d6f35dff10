//! Persisted/wire form of a name record: a JSON object with named fields,
//! shared by the storage backend and server-to-server record transfer.

use std::collections::HashMap;

use crate::record::demand::{DemandEstimator, ReplicaStats};
use crate::record::transition::ActiveSetTransition;
use crate::record::votes::ReplicaVoteTally;
use crate::record::{NodeId, RecordConfig, RecordKey, RecordState};
use crate::utils::MovingAverage;

use serde::{Deserialize, Serialize};

/// Serde mirror of a record's full state. Every field is required except
/// `activePaxosID` (absent means no group currently active) and the two
/// aggregate moving averages (present only when the serializing server
/// is/was a primary).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct RecordWire {
    pub(crate) name: String,
    #[serde(rename = "recordkey")]
    pub(crate) record_key: RecordKey,
    #[serde(rename = "timeToLive")]
    pub(crate) time_to_live: i32,
    #[serde(rename = "valuesList")]
    pub(crate) values_list: Vec<String>,
    #[serde(rename = "oldValuesList")]
    pub(crate) old_values_list: Vec<String>,
    #[serde(rename = "primary")]
    pub(crate) primary_nameservers: Vec<NodeId>,
    #[serde(rename = "active")]
    pub(crate) active_nameservers: Vec<NodeId>,
    #[serde(rename = "oldactive")]
    pub(crate) old_active_nameservers: Vec<NodeId>,
    #[serde(rename = "activeRunning")]
    pub(crate) active_running: bool,
    #[serde(rename = "oldActiveRunning")]
    pub(crate) old_active_running: bool,
    #[serde(
        rename = "activePaxosID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub(crate) active_paxos_id: Option<String>,
    #[serde(rename = "oldActivePaxosID")]
    pub(crate) old_active_paxos_id: String,
    #[serde(rename = "markedForRemoval")]
    pub(crate) marked_for_removal: bool,
    #[serde(rename = "primaryReplica")]
    pub(crate) primary_replica: bool,
    #[serde(rename = "nameserverVotesMap")]
    pub(crate) nameserver_votes_map: HashMap<NodeId, u64>,
    #[serde(rename = "lnsRequestsCount")]
    pub(crate) lns_requests_count: HashMap<NodeId, u64>,
    #[serde(rename = "totalLookupRequest")]
    pub(crate) total_lookup_request: u64,
    #[serde(rename = "totalUpdateRequest")]
    pub(crate) total_update_request: u64,
    #[serde(rename = "nameServerStatsMap")]
    pub(crate) name_server_stats_map: HashMap<NodeId, ReplicaStats>,
    #[serde(rename = "totalAggregateReadFrequency")]
    pub(crate) total_aggregate_read_frequency: i64,
    #[serde(rename = "totalAggregateWriteFrequency")]
    pub(crate) total_aggregate_write_frequency: i64,
    #[serde(rename = "previousAggregateReadFrequency")]
    pub(crate) previous_aggregate_read_frequency: i64,
    #[serde(rename = "previousAggregateWriteFrequency")]
    pub(crate) previous_aggregate_write_frequency: i64,
    #[serde(rename = "lookupRate")]
    pub(crate) lookup_rate: f64,
    #[serde(rename = "updateRate")]
    pub(crate) update_rate: f64,
    #[serde(rename = "lastLookupTimestamp")]
    pub(crate) last_lookup_timestamp: i64,
    #[serde(rename = "lastUpdateTimestamp")]
    pub(crate) last_update_timestamp: i64,
    #[serde(rename = "movingAverageLookups")]
    pub(crate) moving_average_lookups: Vec<i64>,
    #[serde(rename = "movingAverageUpdates")]
    pub(crate) moving_average_updates: Vec<i64>,
    #[serde(
        rename = "movingAvgAggregateLookupFrequency",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub(crate) moving_avg_aggregate_lookup_frequency: Option<Vec<i64>>,
    #[serde(
        rename = "movingAvgAggregateUpdateFrequency",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub(crate) moving_avg_aggregate_update_frequency: Option<Vec<i64>>,
}

fn sorted(ids: impl IntoIterator<Item = NodeId>) -> Vec<NodeId> {
    let mut ids: Vec<NodeId> = ids.into_iter().collect();
    ids.sort_unstable();
    ids
}

impl RecordState {
    pub(crate) fn to_wire(&self) -> RecordWire {
        RecordWire {
            name: self.name.clone(),
            record_key: self.record_key,
            time_to_live: self.demand.time_to_live,
            values_list: self.values_list.clone(),
            old_values_list: self.old_values_list.clone(),
            primary_nameservers: sorted(
                self.primary_nameservers.iter().copied(),
            ),
            active_nameservers: sorted(
                self.transition.active.iter().copied(),
            ),
            old_active_nameservers: sorted(
                self.transition.old_active.iter().copied(),
            ),
            active_running: self.transition.active_running,
            old_active_running: self.transition.old_active_running,
            active_paxos_id: self.transition.active_paxos_id.clone(),
            old_active_paxos_id: self
                .transition
                .old_active_paxos_id
                .clone()
                .unwrap_or_default(),
            marked_for_removal: self.marked_for_removal,
            primary_replica: self.primary_replica,
            nameserver_votes_map: self
                .votes
                .as_ref()
                .map(|tally| tally.votes().clone())
                .unwrap_or_default(),
            lns_requests_count: self.demand.lns_requests_count.clone(),
            total_lookup_request: self.demand.total_lookup_request,
            total_update_request: self.demand.total_update_request,
            name_server_stats_map: self
                .demand
                .primary
                .as_ref()
                .map(|prim| prim.replica_stats.clone())
                .unwrap_or_default(),
            total_aggregate_read_frequency: self
                .demand
                .total_aggregate_read_frequency,
            total_aggregate_write_frequency: self
                .demand
                .total_aggregate_write_frequency,
            previous_aggregate_read_frequency: self
                .demand
                .previous_aggregate_read_frequency,
            previous_aggregate_write_frequency: self
                .demand
                .previous_aggregate_write_frequency,
            lookup_rate: self.demand.lookup_rate,
            update_rate: self.demand.update_rate,
            last_lookup_timestamp: self.demand.last_lookup_timestamp,
            last_update_timestamp: self.demand.last_update_timestamp,
            moving_average_lookups: self.demand.moving_avg_lookups.samples(),
            moving_average_updates: self.demand.moving_avg_updates.samples(),
            moving_avg_aggregate_lookup_frequency: self
                .demand
                .primary
                .as_ref()
                .map(|prim| prim.agg_lookup_freq.samples()),
            moving_avg_aggregate_update_frequency: self
                .demand
                .primary
                .as_ref()
                .map(|prim| prim.agg_update_freq.samples()),
        }
    }

    /// Rebuilds record state from its wire form. The moving-average window
    /// and TTL constant come from local configuration, as they did when
    /// the record was first created.
    pub(crate) fn from_wire(
        wire: RecordWire,
        config: &RecordConfig,
    ) -> RecordState {
        let window = config.moving_avg_window_size;
        let primary_replica = wire.primary_replica;

        let mut demand = DemandEstimator::new(config, primary_replica);
        demand.time_to_live = wire.time_to_live;
        demand.total_lookup_request = wire.total_lookup_request;
        demand.total_update_request = wire.total_update_request;
        demand.total_aggregate_read_frequency =
            wire.total_aggregate_read_frequency;
        demand.total_aggregate_write_frequency =
            wire.total_aggregate_write_frequency;
        demand.previous_aggregate_read_frequency =
            wire.previous_aggregate_read_frequency;
        demand.previous_aggregate_write_frequency =
            wire.previous_aggregate_write_frequency;
        demand.lns_requests_count = wire.lns_requests_count;
        demand.moving_avg_lookups =
            MovingAverage::from_samples(wire.moving_average_lookups, window);
        demand.moving_avg_updates =
            MovingAverage::from_samples(wire.moving_average_updates, window);
        demand.last_lookup_timestamp = wire.last_lookup_timestamp;
        demand.last_update_timestamp = wire.last_update_timestamp;
        demand.lookup_rate = wire.lookup_rate;
        demand.update_rate = wire.update_rate;
        if let Some(prim) = demand.primary.as_mut() {
            prim.replica_stats = wire.name_server_stats_map;
            if let Some(samples) = wire.moving_avg_aggregate_lookup_frequency {
                prim.agg_lookup_freq =
                    MovingAverage::from_samples(samples, window);
            }
            if let Some(samples) = wire.moving_avg_aggregate_update_frequency {
                prim.agg_update_freq =
                    MovingAverage::from_samples(samples, window);
            }
        }

        let transition = ActiveSetTransition {
            active: wire.active_nameservers.into_iter().collect(),
            old_active: wire.old_active_nameservers.into_iter().collect(),
            active_running: wire.active_running,
            old_active_running: wire.old_active_running,
            active_paxos_id: wire.active_paxos_id,
            old_active_paxos_id: if wire.old_active_paxos_id.is_empty() {
                None
            } else {
                Some(wire.old_active_paxos_id)
            },
        };

        RecordState {
            name: wire.name,
            record_key: wire.record_key,
            primary_nameservers: wire
                .primary_nameservers
                .into_iter()
                .collect(),
            primary_replica,
            values_list: wire.values_list,
            old_values_list: wire.old_values_list,
            marked_for_removal: wire.marked_for_removal,
            transition,
            demand,
            votes: primary_replica
                .then(|| ReplicaVoteTally::from_votes(wire.nameserver_votes_map)),
        }
    }
}
