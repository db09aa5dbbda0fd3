use crate::bridge::{Mutation, PlatformBridge, ViewId};
use crate::hash::HashSet;

use super::instance::{InstanceId, InstanceKind};
use super::Reconciler;

impl<B: PlatformBridge> Reconciler<B> {
    /// Diffs the native child list of every touched host against what the
    /// bridge last saw. Detaches of all hosts are emitted before any placement.
    /// A host whose earlier placement was rejected sends its full list.
    pub(super) fn sync_hosts(&mut self) {
        let hosts: Vec<InstanceId> = self.stale_hosts.drain(..).collect();
        let mut detaches = Vec::new();
        let mut placements = Vec::new();
        for host in hosts {
            self.sync_host(host, &mut detaches, &mut placements);
        }
        self.mutations.extend(detaches);
        self.mutations.extend(placements);
    }

    fn sync_host(&mut self, host: InstanceId, detaches: &mut Vec<Mutation>, placements: &mut Vec<Mutation>) {
        let resync = self.resync.remove(&host);
        let Some(instance) = self.arena.get(host) else {
            return;
        };
        let Some(parent) = instance.host_view() else {
            return;
        };

        let mut next = Vec::new();
        for child in instance.children() {
            self.flatten(child, &mut next);
        }
        if let InstanceKind::Element(element) = &instance.kind {
            if let Some(target) = &element.portal_target {
                if self.portals.target(target) == Some(host) {
                    for portal in self.portals.attached_to(target) {
                        self.flatten_contents(portal, &mut next);
                    }
                }
            }
        }

        let prev: Vec<ViewId> = instance
            .native()
            .unwrap_or_default()
            .iter()
            .filter(|view| !self.deleted.contains(*view))
            .copied()
            .collect();
        let prev_set: HashSet<ViewId> = prev.iter().copied().collect();
        let next_set: HashSet<ViewId> = next.iter().copied().collect();

        for view in &prev {
            if !next_set.contains(view) {
                detaches.push(Mutation::Detach { child: *view });
                self.removed_from.insert(*view, host);
            }
        }
        let kept_before = prev.iter().filter(|view| next_set.contains(*view));
        let kept_after = next.iter().filter(|view| prev_set.contains(*view));
        let resend = resync && !(prev.is_empty() && next.is_empty());
        if resend || kept_before.ne(kept_after) {
            placements.push(Mutation::SetChildren {
                parent,
                children: next.clone(),
            });
        } else {
            for (index, view) in next.iter().enumerate() {
                if !prev_set.contains(view) {
                    placements.push(Mutation::Attach {
                        child: *view,
                        parent,
                        index,
                    });
                }
            }
        }

        if let Some(native) = self.arena.get_mut(host).and_then(|instance| instance.native_mut()) {
            *native = next;
        }
    }

    /// Appends the top-level native views under `id`. Portals contribute
    /// nothing in place; their contents belong to the target's host.
    fn flatten(&self, id: InstanceId, out: &mut Vec<ViewId>) {
        let Some(instance) = self.arena.get(id) else {
            return;
        };
        match &instance.kind {
            InstanceKind::Element(element) => out.push(element.view),
            InstanceKind::Portal(_) => {}
            _ => {
                for child in instance.children() {
                    self.flatten(child, out);
                }
            }
        }
    }

    fn flatten_contents(&self, portal: InstanceId, out: &mut Vec<ViewId>) {
        if let Some(instance) = self.arena.get(portal) {
            for child in instance.children() {
                self.flatten(child, out);
            }
        }
    }
}
