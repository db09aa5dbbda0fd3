//! Portal target registry.
//!
//! Maps portal target ids to the element instance whose native view hosts
//! portal contents, and tracks which portals are attached to a target and
//! which are still waiting for theirs. The reconciler owns one registry and
//! reads and writes it only inside a commit, so lookups are consistent for
//! the whole commit.

use indexmap::IndexMap;

use crate::error::UsageError;
use crate::hash::HashMap;
use crate::node::PortalTargetId;
use crate::InstanceId;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct PendingPortal {
    attempts: u32,
    parked: bool,
}

/// What happened to a portal that still has no target after a retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RetryOutcome {
    /// Keep retrying on later commits.
    Retry,
    /// Retry budget used up just now; resolves once the target registers.
    Parked,
    /// Already parked.
    Waiting,
}

#[derive(Debug, Default)]
pub(crate) struct PortalRegistry {
    targets: HashMap<PortalTargetId, InstanceId>,
    /// Resolved portals in the order they attached.
    attached: IndexMap<InstanceId, PortalTargetId>,
    pending: IndexMap<InstanceId, PendingPortal>,
    /// Portals created through the imperative API, by target.
    imperative: HashMap<PortalTargetId, InstanceId>,
}

impl PortalRegistry {
    pub(crate) fn register_target(&mut self, target: PortalTargetId, element: InstanceId) -> Result<(), UsageError> {
        match self.targets.get(&target) {
            Some(existing) if *existing != element => Err(UsageError::DuplicatePortalTarget {
                target: target.to_string(),
            }),
            _ => {
                self.targets.insert(target, element);
                Ok(())
            }
        }
    }

    /// Removes `target` if `element` holds it and returns the portals that were
    /// attached to it, now pending again.
    pub(crate) fn unregister_target(&mut self, target: &str, element: InstanceId) -> Vec<InstanceId> {
        if self.targets.get(target) != Some(&element) {
            return Vec::new();
        }
        self.targets.remove(target);
        let detached: Vec<InstanceId> = self
            .attached
            .iter()
            .filter(|&(_, attached_to)| &**attached_to == target)
            .map(|(portal, _)| *portal)
            .collect();
        for portal in &detached {
            self.attached.shift_remove(portal);
            self.pending.insert(*portal, PendingPortal::default());
        }
        detached
    }

    pub(crate) fn target(&self, target: &str) -> Option<InstanceId> {
        self.targets.get(target).copied()
    }

    pub(crate) fn add_pending(&mut self, portal: InstanceId) {
        self.attached.shift_remove(&portal);
        self.pending.insert(portal, PendingPortal::default());
    }

    pub(crate) fn pending(&self) -> Vec<InstanceId> {
        self.pending.keys().copied().collect()
    }

    pub(crate) fn is_pending(&self, portal: InstanceId) -> bool {
        self.pending.contains_key(&portal)
    }

    pub(crate) fn attach(&mut self, portal: InstanceId, target: PortalTargetId) {
        self.pending.shift_remove(&portal);
        self.attached.insert(portal, target);
    }

    /// Portals attached to `target`, in attach order.
    pub(crate) fn attached_to(&self, target: &str) -> Vec<InstanceId> {
        self.attached
            .iter()
            .filter(|&(_, attached_to)| &**attached_to == target)
            .map(|(portal, _)| *portal)
            .collect()
    }

    pub(crate) fn note_attempt(&mut self, portal: InstanceId, limit: u32) -> RetryOutcome {
        let Some(entry) = self.pending.get_mut(&portal) else {
            return RetryOutcome::Waiting;
        };
        if entry.parked {
            return RetryOutcome::Waiting;
        }
        entry.attempts += 1;
        if entry.attempts >= limit {
            entry.parked = true;
            RetryOutcome::Parked
        } else {
            RetryOutcome::Retry
        }
    }

    /// Forgets a portal that unmounted.
    pub(crate) fn remove(&mut self, portal: InstanceId) {
        self.pending.shift_remove(&portal);
        self.attached.shift_remove(&portal);
        self.imperative.retain(|_, existing| *existing != portal);
    }

    pub(crate) fn imperative(&self, target: &str) -> Option<InstanceId> {
        self.imperative.get(target).copied()
    }

    pub(crate) fn insert_imperative(&mut self, target: PortalTargetId, portal: InstanceId) -> Result<(), UsageError> {
        if self.imperative.contains_key(&target) {
            return Err(UsageError::DuplicatePortal {
                target: target.to_string(),
            });
        }
        self.imperative.insert(target, portal);
        Ok(())
    }
}
