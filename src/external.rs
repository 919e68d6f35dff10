//! Interfaces to external collaborators of the record engine: the
//! reachability oracle, the consistent-hash placement of primaries, and the
//! consensus service backing each active replica group.
//!
//! Nothing in this crate blocks on these; the reconfiguration driver waits
//! for remote evidence and then calls back into the record's `on_*` handlers.

use std::collections::HashSet;

use crate::record::NodeId;
use crate::utils::GnsError;

/// Liveness view over the name server population, fed by an external ping
/// subsystem.
pub trait ReachabilityOracle {
    /// True if the server is currently considered unreachable (i.e., its
    /// measured ping latency is at the unreachable sentinel). Unreachable
    /// servers are never selected as active replicas.
    fn unreachable(&self, id: NodeId) -> bool;
}

/// Consistent-hash placement of a name's primary replicas. Computed outside
/// this crate; every server must derive the identical set for a given name.
pub trait ReplicaPlacement {
    fn primary_replicas(&self, name: &str) -> HashSet<NodeId>;
}

/// Consensus service replicating opaque payloads among a named membership.
/// Group instances are keyed by opaque paxos-instance-id strings; decided
/// values and stop/start confirmations flow back through the driver into
/// the owning record's `on_*` handlers.
pub trait GroupConsensus {
    /// Creates a consensus group among `members`, seeded with an initial
    /// replicated state.
    fn create_group(
        &self,
        paxos_id: &str,
        members: &HashSet<NodeId>,
        initial_state: &[u8],
    ) -> Result<(), GnsError>;

    /// Asks the group to run its stop protocol; confirmation arrives later.
    fn stop_group(&self, paxos_id: &str) -> Result<(), GnsError>;

    /// Proposes a payload for replication within the group.
    fn propose(&self, paxos_id: &str, payload: &[u8]) -> Result<(), GnsError>;
}
