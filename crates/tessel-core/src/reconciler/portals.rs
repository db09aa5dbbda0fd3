use crate::bridge::PlatformBridge;
use crate::error::CommitError;
use crate::portal::RetryOutcome;

use super::instance::{InstanceId, InstanceKind};
use super::Reconciler;

impl<B: PlatformBridge> Reconciler<B> {
    /// Registers the portal targets of elements mounted or retargeted since the last call.
    pub(super) fn register_targets(&mut self, errors: &mut Vec<CommitError>) {
        for element in std::mem::take(&mut self.new_targets) {
            let target = match self.arena.get(element).map(|i| &i.kind) {
                Some(InstanceKind::Element(instance)) => instance.portal_target.clone(),
                _ => None,
            };
            let Some(target) = target else {
                continue;
            };
            if let Err(err) = self.portals.register_target(target, element) {
                log::error!("{err}");
                errors.push(err.into());
            }
        }
    }

    /// Mounts the contents of pending portals whose target is registered.
    /// Contents may declare further targets and portals, so resolution
    /// repeats until a round attaches nothing. Portals left over count one
    /// retry attempt.
    pub(super) fn resolve_portals(&mut self, errors: &mut Vec<CommitError>) {
        loop {
            let mut attached = 0;
            for portal in self.portals.pending() {
                if self.try_attach(portal, errors) {
                    attached += 1;
                }
            }
            if attached == 0 {
                break;
            }
            self.register_targets(errors);
        }

        let limit = self.config.portal_retry_limit;
        for portal in self.portals.pending() {
            let target = match self.arena.get(portal).map(|i| &i.kind) {
                Some(InstanceKind::Portal(instance)) => instance.target.clone(),
                _ => {
                    self.portals.remove(portal);
                    continue;
                }
            };
            match self.portals.note_attempt(portal, limit) {
                RetryOutcome::Retry => self.retry_portals = true,
                RetryOutcome::Parked => {
                    log::warn!("portal target `{target}` is still missing after {limit} commits; waiting for it to register")
                }
                RetryOutcome::Waiting => {}
            }
        }
    }

    fn try_attach(&mut self, portal: InstanceId, errors: &mut Vec<CommitError>) -> bool {
        let (target, desc) = match self.arena.get(portal).map(|i| &i.kind) {
            Some(InstanceKind::Portal(instance)) => (instance.target.clone(), instance.children_desc.clone()),
            _ => {
                self.portals.remove(portal);
                return false;
            }
        };
        let Some(element) = self.portals.target(&target) else {
            return false;
        };
        if !self.arena.contains_key(element) {
            return false;
        }
        self.portals.attach(portal, target.clone());
        if let Some(InstanceKind::Portal(instance)) = self.arena.get_mut(portal).map(|i| &mut i.kind) {
            instance.host = Some(element);
        }
        log::debug!("portal attached to `{target}`");
        if let Err(error) = self.reconcile_children(portal, &desc) {
            self.handle_render_error(Some(portal), error, errors);
        }
        self.stale_hosts.insert(element);
        true
    }

    /// Drops `element`'s registration of `target`. Attached portals go back
    /// to pending and their contents unmount. `delete_contents` is false when
    /// the element's own view is going away and takes the contents with it.
    pub(super) fn release_target(&mut self, target: &str, element: InstanceId, delete_contents: bool) {
        let portals = self.portals.unregister_target(target, element);
        if portals.is_empty() {
            return;
        }
        log::debug!("portal target `{target}` unregistered; {} portals pending again", portals.len());
        for portal in portals {
            self.clear_contents(portal, delete_contents);
        }
        if delete_contents {
            self.stale_hosts.insert(element);
        }
    }

    /// Unmounts a portal's contents and queues it for resolution against its current target.
    pub(super) fn detach_portal(&mut self, portal: InstanceId) {
        if let Some(host) = self.clear_contents(portal, true) {
            self.stale_hosts.insert(host);
        }
        self.portals.add_pending(portal);
    }

    fn clear_contents(&mut self, portal: InstanceId, delete_native: bool) -> Option<InstanceId> {
        let children = self.arena.get(portal)?.children();
        for child in children {
            self.unmount(child, delete_native);
        }
        match self.arena.get_mut(portal).map(|i| &mut i.kind) {
            Some(InstanceKind::Portal(instance)) => {
                instance.children.clear();
                instance.host.take()
            }
            _ => None,
        }
    }
}
