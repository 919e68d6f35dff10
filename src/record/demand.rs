//! Per-record demand estimation: inter-arrival moving averages, aggregate
//! read/write statistics across the active set, and the derived cache TTL.

use std::collections::HashMap;

use crate::record::{NodeId, RecordConfig};
use crate::utils::{GnsError, MovingAverage};

use serde::{Deserialize, Serialize};

/// Read/write frequency reported by one active replica.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub struct ReplicaStats {
    pub read: i64,
    pub write: i64,
}

/// Demand state tracked only at primary replicas: per-replica reported
/// stats and the smoothed aggregate frequencies derived from them.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PrimaryDemand {
    /// Latest {read, write} frequencies reported by each active replica.
    pub(crate) replica_stats: HashMap<NodeId, ReplicaStats>,

    /// Moving average over aggregate lookup frequency deltas.
    pub(crate) agg_lookup_freq: MovingAverage,

    /// Moving average over aggregate update frequency deltas.
    pub(crate) agg_update_freq: MovingAverage,
}

/// Converts raw lookup/update events and periodically-reported per-replica
/// statistics into smoothed rates and a cache TTL.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DemandEstimator {
    /// Multiplier from update inter-arrival rate (secs) to TTL (secs).
    ttl_constant: f64,

    /// Number of client proxies, sizing the dense request-count array.
    num_lns: usize,

    /// Derived cache TTL in seconds. 0 means no caching.
    pub(crate) time_to_live: i32,

    /// Count of lookups served locally.
    pub(crate) total_lookup_request: u64,

    /// Count of updates applied locally.
    pub(crate) total_update_request: u64,

    pub(crate) total_aggregate_read_frequency: i64,
    pub(crate) total_aggregate_write_frequency: i64,
    pub(crate) previous_aggregate_read_frequency: i64,
    pub(crate) previous_aggregate_write_frequency: i64,

    /// Request counts attributed to each originating client proxy.
    pub(crate) lns_requests_count: HashMap<NodeId, u64>,

    /// Moving average of inter-arrival time between updates, millisecs.
    pub(crate) moving_avg_updates: MovingAverage,

    /// Moving average of inter-arrival time between lookups, millisecs.
    pub(crate) moving_avg_lookups: MovingAverage,

    pub(crate) last_update_timestamp: i64,
    pub(crate) last_lookup_timestamp: i64,

    /// Average inter-arrival time between updates, seconds.
    pub(crate) update_rate: f64,

    /// Average inter-arrival time between lookups, seconds.
    pub(crate) lookup_rate: f64,

    /// Present iff the local server is a primary for this name.
    pub(crate) primary: Option<PrimaryDemand>,
}

impl DemandEstimator {
    /// Creates a fresh estimator; primary-only state is allocated only when
    /// `primary_replica` is set.
    pub(crate) fn new(config: &RecordConfig, primary_replica: bool) -> Self {
        let window = config.moving_avg_window_size;
        DemandEstimator {
            ttl_constant: config.ttl_constant,
            num_lns: config.num_lns as usize,
            time_to_live: 0,
            total_lookup_request: 0,
            total_update_request: 0,
            total_aggregate_read_frequency: 0,
            total_aggregate_write_frequency: 0,
            previous_aggregate_read_frequency: 0,
            previous_aggregate_write_frequency: 0,
            lns_requests_count: HashMap::new(),
            moving_avg_updates: MovingAverage::new(window),
            moving_avg_lookups: MovingAverage::new(window),
            last_update_timestamp: 0,
            last_lookup_timestamp: 0,
            update_rate: 0.0,
            lookup_rate: 0.0,
            primary: primary_replica.then(|| PrimaryDemand {
                replica_stats: HashMap::new(),
                agg_lookup_freq: MovingAverage::new(window),
                agg_update_freq: MovingAverage::new(window),
            }),
        }
    }

    /// Feeds the inter-arrival time between this and the last update, then
    /// recomputes `update_rate` and the TTL from the smoothed average.
    /// Expects `total_update_request` to have been incremented already; the
    /// first update ever only records its timestamp. Returns the TTL.
    pub(crate) fn record_update(&mut self, timestamp: i64) -> i32 {
        if self.total_update_request == 1 {
            self.last_update_timestamp = timestamp;
        } else {
            let interarrival = timestamp - self.last_update_timestamp;
            self.moving_avg_updates.add(interarrival);
            self.update_rate = self.moving_avg_updates.average() / 1000.0;
            self.time_to_live =
                (self.update_rate * self.ttl_constant).round() as i32;
            self.last_update_timestamp = timestamp;
        }
        self.time_to_live
    }

    /// Feeds the inter-arrival time between this and the last lookup, then
    /// recomputes `lookup_rate`. Same first-event contract as
    /// `record_update`; no TTL side effect. Returns the lookup rate.
    pub(crate) fn record_lookup(&mut self, timestamp: i64) -> f64 {
        if self.total_lookup_request == 1 {
            self.last_lookup_timestamp = timestamp;
        } else {
            let interarrival = timestamp - self.last_lookup_timestamp;
            self.moving_avg_lookups.add(interarrival);
            self.lookup_rate = self.moving_avg_lookups.average() / 1000.0;
            self.last_lookup_timestamp = timestamp;
        }
        self.lookup_rate
    }

    /// Stores the latest stats reported by an active replica. No-op at
    /// non-primaries.
    pub(crate) fn add_replica_stats(
        &mut self,
        id: NodeId,
        read: i64,
        write: i64,
    ) {
        if let Some(prim) = self.primary.as_mut() {
            prim.replica_stats.insert(id, ReplicaStats { read, write });
        }
    }

    /// Forgets a departing replica's stats, first subtracting its last-known
    /// contribution from the previous aggregates so its absence in the next
    /// round is not misread as a frequency drop.
    pub(crate) fn remove_replica_stats(&mut self, id: NodeId) {
        let removed = self
            .primary
            .as_mut()
            .and_then(|prim| prim.replica_stats.remove(&id));
        if let Some(stats) = removed {
            if self.previous_aggregate_read_frequency != 0 {
                self.previous_aggregate_read_frequency -= stats.read;
            }
            if self.previous_aggregate_write_frequency != 0 {
                self.previous_aggregate_write_frequency -= stats.write;
            }
        }
    }

    /// Cumulative aggregate read frequency: local lookups plus everything
    /// reported by active replicas. The delta since the previous round is
    /// accumulated into `previous` and fed to the moving average, whose
    /// current value is returned. Call once per ordinary polling interval.
    pub(crate) fn read_stats(&mut self) -> Result<f64, GnsError> {
        let local = self.total_lookup_request as i64;
        let prim = match self.primary.as_mut() {
            Some(prim) => prim,
            None => {
                return logged_err!(
                    "aggregate read stats queried on a non-primary record"
                )
            }
        };
        let mut total = local;
        for stats in prim.replica_stats.values() {
            total += stats.read;
        }
        self.total_aggregate_read_frequency = total;
        let current = total - self.previous_aggregate_read_frequency;
        pf_debug!(
            "aggregate read: total {} previous {} current {}",
            total,
            self.previous_aggregate_read_frequency,
            current
        );
        self.previous_aggregate_read_frequency += current;
        prim.agg_lookup_freq.add(current);
        Ok(prim.agg_lookup_freq.average())
    }

    /// Cumulative aggregate write frequency; see `read_stats`.
    pub(crate) fn write_stats(&mut self) -> Result<f64, GnsError> {
        let local = self.total_update_request as i64;
        let prim = match self.primary.as_mut() {
            Some(prim) => prim,
            None => {
                return logged_err!(
                    "aggregate write stats queried on a non-primary record"
                )
            }
        };
        let mut total = local;
        for stats in prim.replica_stats.values() {
            total += stats.write;
        }
        self.total_aggregate_write_frequency = total;
        let current = total - self.previous_aggregate_write_frequency;
        pf_debug!(
            "aggregate write: total {} previous {} current {}",
            total,
            self.previous_aggregate_write_frequency,
            current
        );
        self.previous_aggregate_write_frequency += current;
        prim.agg_update_freq.add(current);
        Ok(prim.agg_update_freq.average())
    }

    /// Snapshot aggregate read frequency, used when the numbers arrive via
    /// consensus-decided aggregation rather than ordinary polling: only the
    /// replica-reported sum counts, and `previous` is overwritten with the
    /// new total rather than accumulated.
    pub(crate) fn read_stats_snapshot(&mut self) -> Result<f64, GnsError> {
        let prim = match self.primary.as_mut() {
            Some(prim) => prim,
            None => {
                return logged_err!(
                    "aggregate read stats queried on a non-primary record"
                )
            }
        };
        let mut total = 0;
        for stats in prim.replica_stats.values() {
            total += stats.read;
        }
        self.total_aggregate_read_frequency = total;
        pf_debug!(
            "aggregate read (snapshot): total {} previous {}",
            total,
            self.previous_aggregate_read_frequency
        );
        prim.agg_lookup_freq
            .add(total - self.previous_aggregate_read_frequency);
        self.previous_aggregate_read_frequency = total;
        Ok(prim.agg_lookup_freq.average())
    }

    /// Snapshot aggregate write frequency; see `read_stats_snapshot`.
    pub(crate) fn write_stats_snapshot(&mut self) -> Result<f64, GnsError> {
        let prim = match self.primary.as_mut() {
            Some(prim) => prim,
            None => {
                return logged_err!(
                    "aggregate write stats queried on a non-primary record"
                )
            }
        };
        let mut total = 0;
        for stats in prim.replica_stats.values() {
            total += stats.write;
        }
        self.total_aggregate_write_frequency = total;
        pf_debug!(
            "aggregate write (snapshot): total {} previous {}",
            total,
            self.previous_aggregate_write_frequency
        );
        prim.agg_update_freq
            .add(total - self.previous_aggregate_write_frequency);
        self.previous_aggregate_write_frequency = total;
        Ok(prim.agg_update_freq.average())
    }

    /// Rounded moving average of aggregate lookup frequency.
    pub(crate) fn read_avg(&self) -> Result<i64, GnsError> {
        match self.primary.as_ref() {
            Some(prim) => Ok(prim.agg_lookup_freq.average().round() as i64),
            None => logged_err!(
                "aggregate read average queried on a non-primary record"
            ),
        }
    }

    /// Rounded moving average of aggregate update frequency.
    pub(crate) fn write_avg(&self) -> Result<i64, GnsError> {
        match self.primary.as_ref() {
            Some(prim) => Ok(prim.agg_update_freq.average().round() as i64),
            None => logged_err!(
                "aggregate write average queried on a non-primary record"
            ),
        }
    }

    /// Attributes `count` requests to the originating client proxy.
    pub(crate) fn add_lns_request_count(&mut self, lns: NodeId, count: u64) {
        *self.lns_requests_count.entry(lns).or_insert(0) += count;
    }

    /// Dense per-proxy request counts, indexed by proxy id. Counts for ids
    /// beyond the configured proxy population are dropped.
    pub(crate) fn lns_request_counts(&self) -> Vec<u64> {
        let mut counts = vec![0; self.num_lns];
        for (&lns, &count) in &self.lns_requests_count {
            if (lns as usize) < counts.len() {
                counts[lns as usize] = count;
            }
        }
        counts
    }
}
