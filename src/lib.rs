//! Gnscore: demand-adaptive replica coordination core for a distributed
//! name service. Each name record independently estimates its read/write
//! demand, tallies weighted votes for future replica placements, and runs
//! the state machine that hands a record off from its old active replica
//! set to a newly selected one without losing updates.

#[macro_use]
pub mod utils;

pub mod external;
pub mod record;

pub use crate::utils::{logger_init, GnsError, MovingAverage, ME};

pub use crate::external::{GroupConsensus, ReachabilityOracle, ReplicaPlacement};

pub use crate::record::{
    NameRecord, NodeId, PaxosEpoch, RecordConfig, RecordKey, RecordState,
    ReplicaStats, TransitionStage, UpdateOperation,
};
