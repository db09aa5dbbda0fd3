use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use indexmap::IndexSet;

use crate::bridge::{Mutation, PlatformBridge};
use crate::error::{panic_message, RenderError};
use crate::hooks::{HookList, RenderContext};
use crate::node::{Node, RenderFn, RenderResult};
use crate::scheduler::BoundaryReset;

use super::instance::{
    BoundaryInstance, ComponentInstance, ElementInstance, FragmentInstance, Instance, InstanceId, InstanceKind,
    PortalInstance,
};
use super::Reconciler;

impl<B: PlatformBridge> Reconciler<B> {
    /// Mounts `node` under `parent`. Either the whole subtree mounts or
    /// nothing does: a failure unmounts the partial subtree and drops the
    /// mutations it queued.
    pub(super) fn mount(&mut self, node: &Node, parent: InstanceId) -> Result<InstanceId, RenderError> {
        let mark = self.mutations.len();
        let id = self.insert_instance(node, Some(parent));
        match self.mount_contents(id, node) {
            Ok(()) => Ok(id),
            Err(error) => {
                self.unmount(id, false);
                self.mutations.truncate(mark);
                Err(error)
            }
        }
    }

    fn insert_instance(&mut self, node: &Node, parent: Option<InstanceId>) -> InstanceId {
        let kind = match node {
            Node::Element(element) => {
                let view = self.adapter.allocate_view();
                self.mutations.push(Mutation::Create {
                    view,
                    view_type: element.tag.to_string(),
                    props: element.props.clone(),
                });
                InstanceKind::Element(ElementInstance {
                    view,
                    tag: element.tag.clone(),
                    props: element.props.clone(),
                    children: Vec::new(),
                    native: Vec::new(),
                    portal_target: element.portal_target.clone(),
                    unsynced: IndexSet::new(),
                    create_rejected: false,
                })
            }
            Node::Component(component) => InstanceKind::Component(ComponentInstance {
                ty: component.ty,
                props: Rc::clone(&component.props),
                render: component.render.clone(),
                memo: component.memo,
                hooks: HookList::new(),
                rendered: None,
            }),
            Node::Fragment(_) => InstanceKind::Fragment(FragmentInstance { children: Vec::new() }),
            Node::Portal(portal) => InstanceKind::Portal(PortalInstance {
                target: portal.target.clone(),
                children_desc: portal.children.clone(),
                children: Vec::new(),
                host: None,
            }),
            Node::Boundary(boundary) => InstanceKind::Boundary(BoundaryInstance {
                child_desc: (*boundary.child).clone(),
                fallback: boundary.fallback.clone(),
                child: None,
                error: None,
                reset: Default::default(),
            }),
        };
        let id = self.arena.insert(Instance {
            parent,
            key: node.key(),
            node_type: node.node_type(),
            kind,
        });
        if let Some(InstanceKind::Element(element)) = self.arena.get(id).map(|i| &i.kind) {
            self.views.insert(element.view, id);
            self.stale_hosts.insert(id);
        }
        id
    }

    fn mount_contents(&mut self, id: InstanceId, node: &Node) -> Result<(), RenderError> {
        match node {
            Node::Element(element) => {
                self.mount_children(id, &element.children)?;
                if element.portal_target.is_some() {
                    self.new_targets.push(id);
                }
                Ok(())
            }
            Node::Fragment(fragment) => self.mount_children(id, &fragment.children),
            Node::Component(_) => {
                let rendered = self.render_component(id)?;
                let child = self.mount(&rendered, id)?;
                if let Some(instance) = self.arena.get_mut(id) {
                    instance.push_child(child);
                }
                Ok(())
            }
            Node::Portal(_) => {
                self.portals.add_pending(id);
                Ok(())
            }
            Node::Boundary(boundary) => match self.mount(&boundary.child, id) {
                Ok(child) => {
                    if let Some(instance) = self.arena.get_mut(id) {
                        instance.push_child(child);
                    }
                    Ok(())
                }
                Err(error) if error.is_usage() => Err(error),
                Err(error) => self.show_fallback(id, error),
            },
        }
    }

    /// Mounts each child in order, recording it on `parent` as it goes so a
    /// failure part-way leaves `parent` consistent for the caller's cleanup.
    fn mount_children(&mut self, parent: InstanceId, children: &[Node]) -> Result<(), RenderError> {
        self.check_keys(parent, children)?;
        for child in children {
            let id = self.mount(child, parent)?;
            if let Some(instance) = self.arena.get_mut(parent) {
                instance.push_child(id);
            }
        }
        Ok(())
    }

    /// Runs a component's render function against its hook list.
    pub(super) fn render_component(&mut self, id: InstanceId) -> RenderResult {
        self.visited.insert(id);
        let (name, props, render, mut hooks) = match self.arena.get_mut(id).map(|i| &mut i.kind) {
            Some(InstanceKind::Component(component)) => (
                component.ty.name(),
                Rc::clone(&component.props),
                component.render.clone(),
                mem::take(&mut component.hooks),
            ),
            _ => return Err(RenderError::failed("render requested for a non-component instance")),
        };
        let catch = self.config.catch_panics;
        let result = match render {
            RenderFn::Stateless(render) => guard_render(catch, name, || render(&*props)),
            RenderFn::Stateful(render) => {
                let mut cx = RenderContext::new(
                    name,
                    id,
                    &mut hooks,
                    self.scheduler.handle(),
                    self.stores.clone(),
                    self.config.strict_hooks,
                );
                let result = guard_render(catch, name, || render(&*props, &mut cx));
                let outcome = cx.finish(result.is_ok());
                self.queue_effects(outcome.effects);
                match outcome.violation {
                    Some(violation) => Err(violation.into()),
                    None => result,
                }
            }
        };
        if let Some(InstanceKind::Component(component)) = self.arena.get_mut(id).map(|i| &mut i.kind) {
            component.hooks = hooks;
        }
        result
    }

    pub(super) fn boundary_reset(&self, boundary: InstanceId) -> Option<BoundaryReset> {
        match &self.arena.get(boundary)?.kind {
            InstanceKind::Boundary(instance) => Some(BoundaryReset {
                scheduler: self.scheduler.handle(),
                boundary,
                requested: Rc::clone(&instance.reset),
            }),
            _ => None,
        }
    }

    /// Produces the fallback description for a boundary holding `error`.
    pub(super) fn render_fallback(&self, boundary: InstanceId, error: &RenderError) -> RenderResult {
        let Some(InstanceKind::Boundary(instance)) = self.arena.get(boundary).map(|i| &i.kind) else {
            return Err(RenderError::failed("fallback requested for a non-boundary instance"));
        };
        let Some(reset) = self.boundary_reset(boundary) else {
            return Err(RenderError::failed("fallback requested for a non-boundary instance"));
        };
        let fallback = instance.fallback.clone();
        guard_render(self.config.catch_panics, "ErrorBoundary", || Ok(fallback(error, reset)))
    }
}

fn guard_render(catch: bool, component: &'static str, render: impl FnOnce() -> RenderResult) -> RenderResult {
    if !catch {
        return render();
    }
    panic::catch_unwind(AssertUnwindSafe(render)).unwrap_or_else(|payload| {
        Err(RenderError::Panicked {
            component,
            message: panic_message(payload.as_ref()),
        })
    })
}
