use std::rc::Rc;

use crate::bridge::{Mutation, PlatformBridge};
use crate::error::{RenderError, UsageError};
use crate::hash::{HashMap, HashSet};
use crate::node::Node;
use crate::Key;

use super::instance::{InstanceId, InstanceKind};
use super::Reconciler;

impl<B: PlatformBridge> Reconciler<B> {
    /// Re-walks a dirty instance from its stored description.
    pub(super) fn rewalk(&mut self, id: InstanceId) -> Result<(), RenderError> {
        self.visited.insert(id);
        let Some(instance) = self.arena.get(id) else {
            return Ok(());
        };
        match &instance.kind {
            InstanceKind::Root(root) => {
                let desc = root.desc.clone();
                self.reconcile_children(id, std::slice::from_ref(&desc))
            }
            InstanceKind::Component(_) => self.rerender(id),
            InstanceKind::Portal(portal) => {
                if portal.host.is_none() {
                    return Ok(());
                }
                let desc = portal.children_desc.clone();
                self.reconcile_children(id, &desc)
            }
            InstanceKind::Boundary(boundary) => {
                if boundary.reset.replace(false) && boundary.error.is_some() {
                    self.retry_boundary(id)
                } else {
                    let desc = boundary.child_desc.clone();
                    self.update_boundary_child(id, &desc)
                }
            }
            InstanceKind::Element(_) | InstanceKind::Fragment(_) => Ok(()),
        }
    }

    /// Brings a mounted, compatible instance up to date with `node`.
    fn update(&mut self, id: InstanceId, node: &Node) -> Result<(), RenderError> {
        match node {
            Node::Element(element) => {
                let Some(InstanceKind::Element(instance)) = self.arena.get_mut(id).map(|i| &mut i.kind) else {
                    return Ok(());
                };
                let view = instance.view;
                let recreate = std::mem::take(&mut instance.create_rejected);
                let mutation = if recreate {
                    instance.unsynced.clear();
                    Some(Mutation::Create {
                        view,
                        view_type: element.tag.to_string(),
                        props: element.props.clone(),
                    })
                } else {
                    let mut diff = instance.props.diff(&element.props);
                    if let Some(interceptor) = self.interceptors.get(element.tag.as_ref()) {
                        interceptor.intercept(&instance.props, &element.props, &mut diff);
                    }
                    for key in instance.unsynced.drain(..) {
                        match element.props.get(&key) {
                            Some(value) => diff.set(key, value.clone()),
                            None => diff.reset(key),
                        }
                    }
                    (!diff.is_empty()).then_some(Mutation::Update { view, diff })
                };
                instance.props = element.props.clone();
                let retarget = instance.portal_target != element.portal_target;
                let old_target = if retarget {
                    std::mem::replace(&mut instance.portal_target, element.portal_target.clone())
                } else {
                    None
                };
                if let Some(mutation) = mutation {
                    self.mutations.push(mutation);
                }
                if recreate {
                    self.recreate_view(id);
                }
                if retarget {
                    if let Some(old) = old_target {
                        self.release_target(&old, id, true);
                    }
                    if element.portal_target.is_some() {
                        self.new_targets.push(id);
                    }
                }
                self.reconcile_children(id, &element.children)
            }
            Node::Component(component) => {
                let Some(InstanceKind::Component(instance)) = self.arena.get_mut(id).map(|i| &mut i.kind) else {
                    return Ok(());
                };
                let skip = match component.memo {
                    Some(props_eq) => props_eq(&*instance.props, &*component.props),
                    None => false,
                };
                instance.props = Rc::clone(&component.props);
                instance.render = component.render.clone();
                instance.memo = component.memo;
                if skip && !self.pass_dirty.contains(&id) {
                    return Ok(());
                }
                if skip && self.visited.contains(&id) {
                    return Ok(());
                }
                self.rerender(id)
            }
            Node::Fragment(fragment) => self.reconcile_children(id, &fragment.children),
            Node::Portal(portal) => {
                let Some(InstanceKind::Portal(instance)) = self.arena.get_mut(id).map(|i| &mut i.kind) else {
                    return Ok(());
                };
                instance.children_desc = portal.children.clone();
                if instance.target != portal.target {
                    instance.target = portal.target.clone();
                    self.detach_portal(id);
                    return Ok(());
                }
                if instance.host.is_none() {
                    return Ok(());
                }
                self.reconcile_children(id, &portal.children)
            }
            Node::Boundary(boundary) => {
                let Some(InstanceKind::Boundary(instance)) = self.arena.get_mut(id).map(|i| &mut i.kind) else {
                    return Ok(());
                };
                instance.child_desc = (*boundary.child).clone();
                instance.fallback = boundary.fallback.clone();
                match instance.error.clone() {
                    Some(error) => {
                        let fallback = self.render_fallback(id, &error)?;
                        let child = self.child_slot(id);
                        let (kept, result) = self.reconcile_slot(child, &fallback, id);
                        self.set_single_child(id, kept);
                        result
                    }
                    None => self.update_boundary_child(id, &boundary.child),
                }
            }
        }
    }

    /// Renders a component again and reconciles its output against the previous output.
    /// A failed render keeps the previous output mounted.
    fn rerender(&mut self, id: InstanceId) -> Result<(), RenderError> {
        let rendered = self.render_component(id)?;
        let previous = self.child_slot(id);
        let (kept, result) = self.reconcile_slot(previous, &rendered, id);
        self.set_single_child(id, kept);
        result
    }

    /// Reconciles one child position. Returns the instance now occupying the
    /// position (the old one when its update or replacement failed) and the outcome.
    fn reconcile_slot(
        &mut self,
        old: Option<InstanceId>,
        node: &Node,
        parent: InstanceId,
    ) -> (Option<InstanceId>, Result<(), RenderError>) {
        match old {
            Some(old) if self.arena.get(old).is_some_and(|instance| instance.is_compatible(node)) => {
                (Some(old), self.update(old, node))
            }
            Some(old) => self.replace(old, node, parent),
            None => {
                self.touch(parent);
                match self.mount(node, parent) {
                    Ok(id) => (Some(id), Ok(())),
                    Err(error) => (None, Err(error)),
                }
            }
        }
    }

    /// Mounts `node` in place of `old`. The old subtree is only unmounted once
    /// the new one mounted; its deletes are moved ahead of the new creates.
    fn replace(&mut self, old: InstanceId, node: &Node, parent: InstanceId) -> (Option<InstanceId>, Result<(), RenderError>) {
        let mark = self.mutations.len();
        match self.mount(node, parent) {
            Ok(id) => {
                let before = self.mutations.len();
                self.unmount(old, true);
                let deletes = self.mutations.len() - before;
                self.mutations[mark..].rotate_right(deletes);
                self.touch(parent);
                (Some(id), Ok(()))
            }
            Err(error) => (Some(old), Err(error)),
        }
    }

    pub(super) fn check_keys(&self, parent: InstanceId, children: &[Node]) -> Result<(), RenderError> {
        let mut seen: HashSet<Key> = HashSet::default();
        for child in children {
            if let Some(key) = child.key() {
                if !seen.insert(key) {
                    return Err(UsageError::DuplicateKey {
                        key,
                        parent: self.describe(parent),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Matches `children` against the mounted children of `parent` by key.
    /// An unkeyed child matches the old child at the same index when that
    /// one is unkeyed too. Unmatched old children are
    /// unmounted before anything new mounts. Every position is processed even
    /// after a failure; the first failure is returned.
    pub(super) fn reconcile_children(&mut self, parent: InstanceId, children: &[Node]) -> Result<(), RenderError> {
        self.check_keys(parent, children)?;
        let old_children = match self.arena.get(parent) {
            Some(instance) => instance.children(),
            None => return Ok(()),
        };

        let mut keyed: HashMap<Key, InstanceId> = HashMap::default();
        for child in &old_children {
            if let Some(key) = self.arena.get(*child).and_then(|instance| instance.key) {
                keyed.insert(key, *child);
            }
        }
        let mut matched: Vec<Option<InstanceId>> = Vec::with_capacity(children.len());
        let mut used: HashSet<InstanceId> = HashSet::default();
        for (index, node) in children.iter().enumerate() {
            let candidate = match node.key() {
                Some(key) => keyed.get(&key).copied(),
                None => old_children
                    .get(index)
                    .copied()
                    .filter(|old| self.arena.get(*old).is_some_and(|instance| instance.key.is_none())),
            };
            let candidate = candidate.filter(|old| used.insert(*old));
            matched.push(candidate);
        }

        for old in &old_children {
            if !used.contains(old) {
                self.unmount(*old, true);
            }
        }

        let mut next = Vec::with_capacity(children.len());
        let mut first_error = None;
        for (node, old) in children.iter().zip(matched) {
            let (kept, result) = self.reconcile_slot(old, node, parent);
            if let Some(kept) = kept {
                next.push(kept);
            }
            if let Err(error) = result {
                first_error.get_or_insert(error);
            }
        }
        if let Some(instance) = self.arena.get_mut(parent) {
            instance.set_children(next);
        }
        self.touch(parent);
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Tears down `id` and its subtree, children before parents.
    ///
    /// `delete_native` asks for a delete of the subtree's top native views.
    /// Views below a deleted view are removed by the native side.
    pub(super) fn unmount(&mut self, id: InstanceId, delete_native: bool) {
        let Some(instance) = self.arena.get(id) else {
            return;
        };
        let children = instance.children();
        let child_delete = match &instance.kind {
            InstanceKind::Element(_) => false,
            InstanceKind::Portal(_) | InstanceKind::Root(_) => true,
            _ => delete_native,
        };
        for child in children {
            self.unmount(child, child_delete);
        }

        let Some(instance) = self.arena.remove(id) else {
            return;
        };
        let parent = instance.parent;
        self.scheduler.forget(id);
        self.visited.remove(&id);
        self.resync.remove(&id);
        match instance.kind {
            InstanceKind::Component(mut component) => component.hooks.dispose(),
            InstanceKind::Element(element) => {
                if let Some(target) = &element.portal_target {
                    self.release_target(target, id, false);
                }
                if delete_native {
                    self.mutations.push(Mutation::Delete { view: element.view });
                    self.deleted.insert(element.view);
                    if let Some(host) = parent.and_then(|parent| self.host_for_children_of(parent)) {
                        self.removed_from.insert(element.view, host);
                    }
                }
                self.views.remove(&element.view);
            }
            InstanceKind::Portal(portal) => {
                self.portals.remove(id);
                if let Some(host) = portal.host {
                    self.stale_hosts.insert(host);
                }
            }
            InstanceKind::Root(root) => {
                self.roots.shift_remove(&root.container);
            }
            InstanceKind::Fragment(_) | InstanceKind::Boundary(_) => {}
        }
        self.stale_hosts.shift_remove(&id);
    }

    // Error boundaries

    /// Hands a render error to the nearest boundary at or above `start` that
    /// is not already showing its fallback. Fallback failures travel further up.
    pub(super) fn capture(&mut self, start: Option<InstanceId>, mut error: RenderError) -> Result<(), RenderError> {
        let mut current = start;
        loop {
            if error.is_usage() {
                return Err(error);
            }
            let Some(boundary) = self.nearest_boundary(current) else {
                return Err(error);
            };
            if let Some(child) = self.child_slot(boundary) {
                self.unmount(child, true);
                self.set_single_child(boundary, None);
            }
            match self.show_fallback(boundary, error) {
                Ok(()) => return Ok(()),
                Err(next) => {
                    error = next;
                    current = self.parent(boundary);
                }
            }
        }
    }

    fn nearest_boundary(&self, start: Option<InstanceId>) -> Option<InstanceId> {
        let mut current = start;
        while let Some(id) = current {
            let instance = self.arena.get(id)?;
            if let InstanceKind::Boundary(boundary) = &instance.kind {
                if boundary.error.is_none() {
                    return Some(id);
                }
            }
            current = instance.parent;
        }
        None
    }

    /// Records `error` on an empty boundary and mounts its fallback.
    pub(super) fn show_fallback(&mut self, boundary: InstanceId, error: RenderError) -> Result<(), RenderError> {
        log::error!("error boundary caught: {error}");
        self.captured += 1;
        let fallback = self.render_fallback(boundary, &error)?;
        if let Some(InstanceKind::Boundary(instance)) = self.arena.get_mut(boundary).map(|i| &mut i.kind) {
            instance.error = Some(error);
            instance.reset.set(false);
        }
        self.touch(boundary);
        let child = self.mount(&fallback, boundary)?;
        self.set_single_child(boundary, Some(child));
        Ok(())
    }

    /// Clears a boundary's error and mounts the original child again.
    fn retry_boundary(&mut self, boundary: InstanceId) -> Result<(), RenderError> {
        let desc = match self.arena.get_mut(boundary).map(|i| &mut i.kind) {
            Some(InstanceKind::Boundary(instance)) => {
                instance.error = None;
                instance.child_desc.clone()
            }
            _ => return Ok(()),
        };
        if let Some(fallback) = self.child_slot(boundary) {
            self.unmount(fallback, true);
            self.set_single_child(boundary, None);
        }
        self.touch(boundary);
        match self.mount(&desc, boundary) {
            Ok(child) => {
                self.set_single_child(boundary, Some(child));
                Ok(())
            }
            Err(error) if error.is_usage() => Err(error),
            Err(error) => self.show_fallback(boundary, error),
        }
    }

    /// Reconciles a healthy boundary's child, switching to the fallback on failure.
    fn update_boundary_child(&mut self, boundary: InstanceId, desc: &Node) -> Result<(), RenderError> {
        let child = self.child_slot(boundary);
        let (kept, result) = self.reconcile_slot(child, desc, boundary);
        self.set_single_child(boundary, kept);
        match result {
            Err(error) if !error.is_usage() => {
                if let Some(child) = self.child_slot(boundary) {
                    self.unmount(child, true);
                    self.set_single_child(boundary, None);
                }
                self.touch(boundary);
                self.show_fallback(boundary, error)
            }
            other => other,
        }
    }

    fn child_slot(&self, id: InstanceId) -> Option<InstanceId> {
        self.arena.get(id).and_then(|instance| instance.children().first().copied())
    }

    fn set_single_child(&mut self, id: InstanceId, child: Option<InstanceId>) {
        if let Some(instance) = self.arena.get_mut(id) {
            instance.set_children(child.into_iter().collect());
        }
    }
}
