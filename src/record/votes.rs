//! Replica-selection vote tally and deterministic bootstrap selection of a
//! record's initial active set.

use std::collections::{HashMap, HashSet};

use crate::external::ReachabilityOracle;
use crate::record::NodeId;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Accumulated votes proposing servers as future active replicas for one
/// record. Tracked only at primary replicas.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ReplicaVoteTally {
    votes: HashMap<NodeId, u64>,
}

impl ReplicaVoteTally {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_votes(votes: HashMap<NodeId, u64>) -> Self {
        ReplicaVoteTally { votes }
    }

    pub(crate) fn votes(&self) -> &HashMap<NodeId, u64> {
        &self.votes
    }

    /// Accumulates `weight` onto the server's tally.
    pub(crate) fn add_vote(&mut self, id: NodeId, weight: u64) {
        *self.votes.entry(id).or_insert(0) += weight;
    }

    /// Greedily selects up to `count` distinct servers with the highest
    /// accumulated votes, skipping primaries and servers the reachability
    /// oracle reports unreachable. Returns a short set (possibly empty) if
    /// fewer eligible candidates exist; ties resolve by map encounter order.
    pub(crate) fn select_top_replicas(
        &self,
        count: usize,
        primaries: &HashSet<NodeId>,
        oracle: &dyn ReachabilityOracle,
    ) -> HashSet<NodeId> {
        let mut replicas = HashSet::new();

        for _ in 0..count {
            let mut best: Option<(NodeId, u64)> = None;
            for (&id, &votes) in &self.votes {
                if oracle.unreachable(id) || primaries.contains(&id) {
                    continue;
                }
                if replicas.contains(&id) {
                    continue;
                }
                if best.map_or(true, |(_, best_votes)| votes > best_votes) {
                    best = Some((id, votes));
                }
            }

            match best {
                Some((id, _)) => replicas.insert(id),
                None => break, // eligible candidates exhausted
            };

            if replicas.len() == self.votes.len() {
                break;
            }
        }

        replicas
    }
}

/// Stable hash of a name. All servers must derive identical seeds from the
/// same name, across processes and builds, so this cannot be the std
/// `RandomState`-keyed hasher.
pub(crate) fn name_seed(name: &str) -> u64 {
    name.bytes()
        .fold(0u64, |hash, byte| hash.wrapping_mul(31).wrapping_add(byte as u64))
}

/// Bootstrap selection of a record's initial active replicas, run at record
/// creation before any votes exist. The generator is seeded from a hash of
/// the name so that every primary computes the same set with no
/// coordination. Draws are bounded: if the non-primary population cannot
/// satisfy `count`, a short set is returned and a warning logged.
pub(crate) fn initial_actives(
    primaries: &HashSet<NodeId>,
    count: usize,
    name: &str,
    num_nameservers: u32,
) -> HashSet<NodeId> {
    let mut actives = HashSet::with_capacity(count);
    if num_nameservers == 0 {
        pf_warn!("initial active selection for '{}' with no servers", name);
        return actives;
    }

    let mut rng = StdRng::seed_from_u64(name_seed(name));
    let max_draws = 64 * count.max(1);
    let mut draws = 0;
    while actives.len() < count && draws < max_draws {
        draws += 1;
        let id = rng.gen_range(0..num_nameservers);
        if !primaries.contains(&id) {
            actives.insert(id);
        }
    }

    if actives.len() < count {
        pf_warn!(
            "initial actives for '{}' degraded: {} of {} selected",
            name,
            actives.len(),
            count
        );
    }
    actives
}

#[cfg(test)]
mod votes_tests {
    use super::*;

    struct AllReachable;
    impl ReachabilityOracle for AllReachable {
        fn unreachable(&self, _id: NodeId) -> bool {
            false
        }
    }

    struct Unreachable(Vec<NodeId>);
    impl ReachabilityOracle for Unreachable {
        fn unreachable(&self, id: NodeId) -> bool {
            self.0.contains(&id)
        }
    }

    fn seeded_tally() -> ReplicaVoteTally {
        let mut tally = ReplicaVoteTally::new();
        for (id, votes) in
            [(0, 10), (1, 15), (2, 4), (3, 7), (4, 1), (5, 11), (6, 3)]
        {
            tally.add_vote(id, votes);
        }
        tally
    }

    #[test]
    fn vote_accumulation() {
        let mut tally = ReplicaVoteTally::new();
        tally.add_vote(3, 5);
        tally.add_vote(3, 2);
        assert_eq!(tally.votes().get(&3), Some(&7));
    }

    #[test]
    fn primaries_excluded_from_selection() {
        let tally = seeded_tally();
        let primaries = HashSet::from([1, 3, 5]);

        let selected =
            tally.select_top_replicas(2, &primaries, &AllReachable);
        // highest eligible non-primary weights are 0:10 and 2:4
        assert_eq!(selected, HashSet::from([0, 2]));

        // primaries never appear no matter how many are requested
        let selected =
            tally.select_top_replicas(9, &primaries, &AllReachable);
        assert_eq!(selected, HashSet::from([0, 2, 4, 6]));
    }

    #[test]
    fn unreachable_excluded_from_selection() {
        let tally = seeded_tally();
        let primaries = HashSet::from([1, 3, 5]);

        let selected =
            tally.select_top_replicas(2, &primaries, &Unreachable(vec![0]));
        assert_eq!(selected, HashSet::from([2, 6]));
    }

    #[test]
    fn exhaustion_returns_short_set() {
        let tally = seeded_tally();
        let primaries: HashSet<NodeId> = (0..=6).collect();
        let selected =
            tally.select_top_replicas(3, &primaries, &AllReachable);
        assert!(selected.is_empty());

        let empty = ReplicaVoteTally::new();
        assert!(empty
            .select_top_replicas(3, &HashSet::new(), &AllReachable)
            .is_empty());
    }

    #[test]
    fn name_seed_is_stable() {
        assert_eq!(name_seed("example.com"), name_seed("example.com"));
        assert_ne!(name_seed("example.com"), name_seed("example.org"));
    }

    #[test]
    fn initial_actives_deterministic() {
        let primaries = HashSet::from([5, 10, 15]);
        let first = initial_actives(&primaries, 3, "example.com", 20);
        let second = initial_actives(&primaries, 3, "example.com", 20);
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert!(first.is_disjoint(&primaries));
    }

    #[test]
    fn initial_actives_bounded_when_population_too_small() {
        // every server is a primary: nothing eligible, must not hang
        let primaries: HashSet<NodeId> = (0..3).collect();
        let actives = initial_actives(&primaries, 3, "example.com", 3);
        assert!(actives.is_empty());

        // only one eligible candidate for a count of three
        let primaries: HashSet<NodeId> = HashSet::from([0, 1]);
        let actives = initial_actives(&primaries, 3, "example.com", 3);
        assert_eq!(actives, HashSet::from([2]));

        assert!(initial_actives(&HashSet::new(), 2, "x", 0).is_empty());
    }
}
