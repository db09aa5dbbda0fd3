use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;

use indexmap::IndexSet;

use crate::bridge::ViewId;
use crate::error::RenderError;
use crate::hooks::HookList;
use crate::node::{ComponentType, FallbackRender, Node, NodeType, PortalTargetId, PropsEq, RenderFn};
use crate::props::Props;
use crate::Key;

slotmap::new_key_type! {
    /// Generational handle to a mounted instance. Stale handles never alias a newer instance.
    pub struct InstanceId;
}

/// Mounted counterpart of a [`Node`].
pub(crate) struct Instance {
    pub(crate) parent: Option<InstanceId>,
    pub(crate) key: Option<Key>,
    pub(crate) node_type: NodeType,
    pub(crate) kind: InstanceKind,
}

pub(crate) enum InstanceKind {
    Root(RootInstance),
    Element(ElementInstance),
    Component(ComponentInstance),
    Fragment(FragmentInstance),
    Portal(PortalInstance),
    Boundary(BoundaryInstance),
}

/// Host-owned container a tree is rendered into.
pub(crate) struct RootInstance {
    pub(crate) container: ViewId,
    pub(crate) desc: Node,
    pub(crate) children: Vec<InstanceId>,
    pub(crate) native: Vec<ViewId>,
}

pub(crate) struct ElementInstance {
    pub(crate) view: ViewId,
    pub(crate) tag: Rc<str>,
    pub(crate) props: Props,
    pub(crate) children: Vec<InstanceId>,
    /// Native children as last sent to the bridge, portal contributions included.
    pub(crate) native: Vec<ViewId>,
    pub(crate) portal_target: Option<PortalTargetId>,
    /// Props whose native value is unknown because their update was rejected.
    pub(crate) unsynced: IndexSet<String>,
    /// The native side rejected the create; the next update creates the view again.
    pub(crate) create_rejected: bool,
}

pub(crate) struct ComponentInstance {
    pub(crate) ty: ComponentType,
    pub(crate) props: Rc<dyn Any>,
    pub(crate) render: RenderFn,
    pub(crate) memo: Option<PropsEq>,
    pub(crate) hooks: HookList,
    pub(crate) rendered: Option<InstanceId>,
}

pub(crate) struct FragmentInstance {
    pub(crate) children: Vec<InstanceId>,
}

pub(crate) struct PortalInstance {
    pub(crate) target: PortalTargetId,
    pub(crate) children_desc: Vec<Node>,
    pub(crate) children: Vec<InstanceId>,
    /// Target element the contents are mounted under, once resolved.
    pub(crate) host: Option<InstanceId>,
}

pub(crate) struct BoundaryInstance {
    pub(crate) child_desc: Node,
    pub(crate) fallback: FallbackRender,
    pub(crate) child: Option<InstanceId>,
    pub(crate) error: Option<RenderError>,
    pub(crate) reset: Rc<Cell<bool>>,
}

impl Instance {
    pub(crate) fn is_compatible(&self, node: &Node) -> bool {
        self.key == node.key() && self.node_type == node.node_type()
    }

    /// Logical child instances, in order. Portal contents count as the portal's children.
    pub(crate) fn children(&self) -> Vec<InstanceId> {
        match &self.kind {
            InstanceKind::Root(root) => root.children.clone(),
            InstanceKind::Element(element) => element.children.clone(),
            InstanceKind::Component(component) => component.rendered.into_iter().collect(),
            InstanceKind::Fragment(fragment) => fragment.children.clone(),
            InstanceKind::Portal(portal) => portal.children.clone(),
            InstanceKind::Boundary(boundary) => boundary.child.into_iter().collect(),
        }
    }

    /// Replaces the child list of list-shaped instances.
    pub(crate) fn set_children(&mut self, children: Vec<InstanceId>) {
        match &mut self.kind {
            InstanceKind::Root(root) => root.children = children,
            InstanceKind::Element(element) => element.children = children,
            InstanceKind::Fragment(fragment) => fragment.children = children,
            InstanceKind::Portal(portal) => portal.children = children,
            InstanceKind::Component(component) => component.rendered = children.first().copied(),
            InstanceKind::Boundary(boundary) => boundary.child = children.first().copied(),
        }
    }

    /// Appends to list-shaped instances; sets the single child of components and boundaries.
    pub(crate) fn push_child(&mut self, child: InstanceId) {
        match &mut self.kind {
            InstanceKind::Root(root) => root.children.push(child),
            InstanceKind::Element(element) => element.children.push(child),
            InstanceKind::Fragment(fragment) => fragment.children.push(child),
            InstanceKind::Portal(portal) => portal.children.push(child),
            InstanceKind::Component(component) => component.rendered = Some(child),
            InstanceKind::Boundary(boundary) => boundary.child = Some(child),
        }
    }

    /// The native view children attach to, for hosts.
    pub(crate) fn host_view(&self) -> Option<ViewId> {
        match &self.kind {
            InstanceKind::Root(root) => Some(root.container),
            InstanceKind::Element(element) => Some(element.view),
            _ => None,
        }
    }

    pub(crate) fn native(&self) -> Option<&[ViewId]> {
        match &self.kind {
            InstanceKind::Root(root) => Some(&root.native),
            InstanceKind::Element(element) => Some(&element.native),
            _ => None,
        }
    }

    pub(crate) fn native_mut(&mut self) -> Option<&mut Vec<ViewId>> {
        match &mut self.kind {
            InstanceKind::Root(root) => Some(&mut root.native),
            InstanceKind::Element(element) => Some(&mut element.native),
            _ => None,
        }
    }

    pub(crate) fn describe(&self) -> String {
        match &self.kind {
            InstanceKind::Root(root) => format!("root {}", root.container),
            InstanceKind::Element(element) => format!("`{}` {}", element.tag, element.view),
            InstanceKind::Component(component) => format!("`{}`", component.ty.name()),
            InstanceKind::Fragment(_) => "fragment".to_owned(),
            InstanceKind::Portal(portal) => format!("portal to `{}`", portal.target),
            InstanceKind::Boundary(_) => "error boundary".to_owned(),
        }
    }
}
