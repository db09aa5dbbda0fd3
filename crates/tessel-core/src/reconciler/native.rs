use crate::bridge::{Mutation, PlatformBridge, ViewId};
use crate::error::BridgeError;

use super::instance::{InstanceId, InstanceKind};
use super::Reconciler;

impl<B: PlatformBridge> Reconciler<B> {
    /// Records an operation the native side did not apply. Nothing is resent
    /// right away: the next update touching the affected views repairs them.
    pub(super) fn note_rejected(&mut self, mutation: &Mutation, error: &BridgeError) {
        match mutation {
            Mutation::Create { view, .. } => {
                if let Some(InstanceKind::Element(element)) = self.element_kind_mut(*view) {
                    element.create_rejected = true;
                }
            }
            Mutation::Update { view, diff } => {
                if let Some(InstanceKind::Element(element)) = self.element_kind_mut(*view) {
                    element.unsynced.extend(diff.keys().map(str::to_owned));
                }
            }
            Mutation::Delete { view } => {
                self.resync_host_of_removed(*view);
                // An unknown view is already gone natively.
                if !matches!(error, BridgeError::UnknownView { .. }) {
                    self.retry_deletes.push(*view);
                }
            }
            Mutation::Detach { child } => self.resync_host_of_removed(*child),
            Mutation::Attach { parent, .. } | Mutation::SetChildren { parent, .. } => {
                if let Some(host) = self.host_of_view(*parent) {
                    self.resync.insert(host);
                }
            }
        }
    }

    /// Queues a fresh create for an element whose create was rejected, and
    /// makes both its own host and the host holding its view resend their
    /// full child lists.
    pub(super) fn recreate_view(&mut self, id: InstanceId) {
        self.resync.insert(id);
        self.stale_hosts.insert(id);
        if let Some(host) = self.parent(id).and_then(|parent| self.host_for_children_of(parent)) {
            self.resync.insert(host);
            self.stale_hosts.insert(host);
        }
    }

    fn resync_host_of_removed(&mut self, view: ViewId) {
        if let Some(host) = self.removed_from.get(&view).copied() {
            self.resync.insert(host);
        }
    }

    fn host_of_view(&self, view: ViewId) -> Option<InstanceId> {
        self.roots.get(&view).or_else(|| self.views.get(&view)).copied()
    }

    fn element_kind_mut(&mut self, view: ViewId) -> Option<&mut InstanceKind> {
        let id = self.views.get(&view).copied()?;
        self.arena.get_mut(id).map(|instance| &mut instance.kind)
    }
}
