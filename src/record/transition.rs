//! State machine governing the handoff of one record from its old active
//! replica group to a newly selected one.

use std::collections::HashSet;
use std::mem;

use crate::record::NodeId;

/// Classification of a paxos instance id against the record's epochs, used
/// by the message-routing layer to decide whether an incoming
/// consensus-decided message still matters.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PaxosEpoch {
    /// The id names the current active group.
    Current,
    /// The id names the previous active group, retained until its stop is
    /// confirmed.
    Old,
    /// The id names a fully retired epoch; evidence carrying it is stale.
    Neither,
}

/// Stage of the old-active to new-active handoff, projected from the two
/// running flags.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TransitionStage {
    /// Steady state: the new group is serving.
    ActiveRunning,
    /// A new set is proposed but the old group has not yet confirmed its
    /// stop; wait.
    OldActiveRunning,
    /// Both groups are stopped; safe to start the new group.
    NoActiveRunning,
    /// Both groups claim to be running. Never produced by legal
    /// transitions; surfaced to operators, blocks automated reconfiguration.
    BothActiveRunningError,
}

/// Membership and epoch state for a record's active replica groups. Value
/// snapshots taken at handoff live with the owning record, which calls in
/// here for the matching membership/epoch bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ActiveSetTransition {
    /// Most recently computed active replica set.
    pub(crate) active: HashSet<NodeId>,

    /// Previous active replica set, retained until confirmed stopped.
    pub(crate) old_active: HashSet<NodeId>,

    /// Whether the current active group accepts/serves operations.
    pub(crate) active_running: bool,

    /// Whether the previous active group is still serving.
    pub(crate) old_active_running: bool,

    /// Paxos instance id backing the current active set; `None` between a
    /// full stop and the next start.
    pub(crate) active_paxos_id: Option<String>,

    /// Paxos instance id that backed the old active set.
    pub(crate) old_active_paxos_id: Option<String>,
}

impl ActiveSetTransition {
    /// Initial state for a fresh record: neither group running yet, with
    /// the deterministic epoch ids every primary derives independently.
    pub(crate) fn initial(
        active: HashSet<NodeId>,
        old_active: HashSet<NodeId>,
        active_paxos_id: String,
        old_active_paxos_id: String,
    ) -> Self {
        ActiveSetTransition {
            active,
            old_active,
            active_running: false,
            old_active_running: false,
            active_paxos_id: Some(active_paxos_id),
            old_active_paxos_id: Some(old_active_paxos_id),
        }
    }

    /// Demotes the current active fields into the old-active fields and
    /// installs the proposed set as the new active with its group not yet
    /// confirmed running.
    pub(crate) fn propose_new_active_set(
        &mut self,
        new_actives: HashSet<NodeId>,
        new_paxos_id: String,
    ) {
        self.old_active_running = self.active_running;
        self.old_active = mem::replace(&mut self.active, new_actives);
        self.old_active_paxos_id = self.active_paxos_id.take();
        self.active_paxos_id = Some(new_paxos_id);
        self.active_running = false;
    }

    /// Records the confirmed stop of the old group. A non-matching id is
    /// stale evidence of an epoch that already ended and changes nothing.
    /// Returns whether the id matched.
    pub(crate) fn on_old_group_stopped(&mut self, paxos_id: &str) -> bool {
        if self.old_active_paxos_id.as_deref() == Some(paxos_id) {
            self.old_active_running = false;
            true
        } else {
            false
        }
    }

    /// Query form: has the old group named by `paxos_id` stopped? A
    /// non-matching id means that epoch already ended, so the answer is yes.
    pub(crate) fn is_old_group_stopped(&self, paxos_id: &str) -> bool {
        if self.old_active_paxos_id.as_deref() == Some(paxos_id) {
            !self.old_active_running
        } else {
            true
        }
    }

    /// Records the confirmed start of the proposed group. Returns whether
    /// the id matched.
    pub(crate) fn on_new_group_started(&mut self, paxos_id: &str) -> bool {
        if self.active_paxos_id.as_deref() == Some(paxos_id) {
            self.active_running = true;
            true
        } else {
            false
        }
    }

    /// Handles the teardown of the *currently active* group (record removal
    /// or re-proposal under failure): demotes its membership and epoch into
    /// the old-active fields and leaves the active side unset with both
    /// groups stopped. Returns whether the id matched; the owning record
    /// snapshots its value list on a match.
    pub(crate) fn on_current_group_fully_stopped(
        &mut self,
        paxos_id: &str,
    ) -> bool {
        if self.active_paxos_id.as_deref() == Some(paxos_id) {
            self.old_active_paxos_id = self.active_paxos_id.take();
            self.old_active = mem::take(&mut self.active);
            self.old_active_running = false;
            self.active_running = false;
            true
        } else {
            false
        }
    }

    /// Installs a fresh active group as running, resuming service after a
    /// full stop.
    pub(crate) fn on_new_group_started_with_membership(
        &mut self,
        actives: HashSet<NodeId>,
        paxos_id: String,
    ) {
        self.active = actives;
        self.active_paxos_id = Some(paxos_id);
        self.active_running = true;
    }

    /// Classifies an in-flight paxos instance id against the record's
    /// current and old epochs.
    pub(crate) fn classify(&self, paxos_id: &str) -> PaxosEpoch {
        if self.active_paxos_id.as_deref() == Some(paxos_id) {
            PaxosEpoch::Current
        } else if self.old_active_paxos_id.as_deref() == Some(paxos_id) {
            PaxosEpoch::Old
        } else {
            PaxosEpoch::Neither
        }
    }

    /// Projects the two running flags onto the handoff stage. Pure; the
    /// owning record logs the error stage with its name attached.
    pub(crate) fn stage(&self) -> TransitionStage {
        match (self.active_running, self.old_active_running) {
            (false, true) => TransitionStage::OldActiveRunning,
            (false, false) => TransitionStage::NoActiveRunning,
            (true, false) => TransitionStage::ActiveRunning,
            (true, true) => TransitionStage::BothActiveRunningError,
        }
    }
}

#[cfg(test)]
mod transition_tests {
    use super::*;

    fn running_transition() -> ActiveSetTransition {
        let mut t = ActiveSetTransition::initial(
            HashSet::from([4, 5, 6]),
            HashSet::from([1, 2, 3]),
            "n-Edge-2".into(),
            "n-Edge-1".into(),
        );
        assert!(t.on_new_group_started("n-Edge-2"));
        t
    }

    #[test]
    fn legal_handoff_sequence() {
        let mut t = running_transition();
        assert_eq!(t.stage(), TransitionStage::ActiveRunning);

        t.propose_new_active_set(HashSet::from([7, 8, 9]), "n-Edge-3".into());
        assert_eq!(t.stage(), TransitionStage::OldActiveRunning);
        assert_eq!(t.old_active, HashSet::from([4, 5, 6]));

        assert!(t.on_old_group_stopped("n-Edge-2"));
        assert_eq!(t.stage(), TransitionStage::NoActiveRunning);

        assert!(t.on_new_group_started("n-Edge-3"));
        assert_eq!(t.stage(), TransitionStage::ActiveRunning);
        assert_eq!(t.active, HashSet::from([7, 8, 9]));
    }

    #[test]
    fn stale_confirmations_are_noops() {
        let mut t = running_transition();
        t.propose_new_active_set(HashSet::from([7]), "n-Edge-3".into());

        // a retransmission for an epoch already rotated out
        assert!(!t.on_old_group_stopped("n-Edge-1"));
        assert_eq!(t.stage(), TransitionStage::OldActiveRunning);
        assert!(t.is_old_group_stopped("n-Edge-1")); // stale id: ended

        assert!(t.on_old_group_stopped("n-Edge-2"));
        // duplicate stop confirmation: same result, still matched
        assert!(t.on_old_group_stopped("n-Edge-2"));
        assert_eq!(t.stage(), TransitionStage::NoActiveRunning);
        assert!(t.is_old_group_stopped("n-Edge-2"));

        // start confirmation for the wrong epoch changes nothing
        assert!(!t.on_new_group_started("n-Edge-2"));
        assert_eq!(t.stage(), TransitionStage::NoActiveRunning);
    }

    #[test]
    fn classify_tracks_rotations() {
        let mut t = running_transition();
        assert_eq!(t.classify("n-Edge-2"), PaxosEpoch::Current);
        assert_eq!(t.classify("n-Edge-1"), PaxosEpoch::Old);
        assert_eq!(t.classify("n-Edge-9"), PaxosEpoch::Neither);

        t.propose_new_active_set(HashSet::from([7]), "n-Edge-3".into());
        assert_eq!(t.classify("n-Edge-3"), PaxosEpoch::Current);
        assert_eq!(t.classify("n-Edge-2"), PaxosEpoch::Old);
        // rotated out twice: no longer recognized at all
        assert_eq!(t.classify("n-Edge-1"), PaxosEpoch::Neither);
    }

    #[test]
    fn current_group_teardown_unsets_active() {
        let mut t = running_transition();
        assert!(!t.on_current_group_fully_stopped("n-Edge-9"));
        assert!(t.active_running);

        assert!(t.on_current_group_fully_stopped("n-Edge-2"));
        assert_eq!(t.stage(), TransitionStage::NoActiveRunning);
        assert_eq!(t.active_paxos_id, None);
        assert!(t.active.is_empty());
        assert_eq!(t.old_active_paxos_id.as_deref(), Some("n-Edge-2"));
        assert_eq!(t.old_active, HashSet::from([4, 5, 6]));
        assert_eq!(t.classify("n-Edge-2"), PaxosEpoch::Old);

        t.on_new_group_started_with_membership(
            HashSet::from([1, 9]),
            "n-Edge-3".into(),
        );
        assert_eq!(t.stage(), TransitionStage::ActiveRunning);
        assert_eq!(t.classify("n-Edge-3"), PaxosEpoch::Current);
    }

    #[test]
    fn both_running_is_error_stage() {
        let mut t = running_transition();
        // no legal call sequence produces this; force the flags directly
        t.old_active_running = true;
        assert_eq!(t.stage(), TransitionStage::BothActiveRunningError);
    }
}
