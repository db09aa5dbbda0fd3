//! Declarative node descriptions.
//!
//! A [`Node`] is what render functions return. It is an immutable, cheaply
//! cloneable description; mounted state (native view ids, hook lists, the
//! cached rendered subtree) lives in the reconciler's instance arena.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use crate::error::RenderError;
use crate::hash::key_of;
use crate::hooks::RenderContext;
use crate::props::{ElementProps, PropValue, Props};
use crate::scheduler::BoundaryReset;
use crate::Key;

pub type RenderResult = Result<Node, RenderError>;

/// Target identifier shared by portals and portal targets.
pub type PortalTargetId = Rc<str>;

pub(crate) type StatelessRender = Rc<dyn Fn(&dyn Any) -> RenderResult>;
pub(crate) type StatefulRender = Rc<dyn Fn(&dyn Any, &mut RenderContext<'_>) -> RenderResult>;
pub(crate) type PropsEq = fn(&dyn Any, &dyn Any) -> bool;
pub(crate) type FallbackRender = Rc<dyn Fn(&RenderError, BoundaryReset) -> Node>;

#[derive(Clone)]
pub enum Node {
    Element(ElementNode),
    Component(ComponentNode),
    Fragment(FragmentNode),
    Portal(PortalNode),
    Boundary(BoundaryNode),
}

/// Variant discriminant of a [`Node`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Element,
    Component,
    Fragment,
    Portal,
    Boundary,
}

/// Concrete type of a node. Two nodes are compatible update targets iff their
/// types and keys are equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeType {
    Element(Rc<str>),
    Component(ComponentType),
    Fragment,
    Portal,
    Boundary,
}

/// Identity of a component: its display name plus the type of its render function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ComponentType {
    name: &'static str,
    id: TypeId,
}

impl ComponentType {
    pub fn of<F: 'static>(name: &'static str) -> Self {
        Self {
            name,
            id: TypeId::of::<F>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Node {
    pub fn element(tag: impl Into<Rc<str>>) -> ElementNode {
        ElementNode::new(tag)
    }

    /// Builds an element from a typed prop schema.
    pub fn host<P: ElementProps>(props: &P) -> ElementNode {
        ElementNode::new(P::TAG).props(props.to_props())
    }

    /// A native `Text` element carrying a `text` prop.
    pub fn text(text: impl Into<String>) -> Node {
        ElementNode::new("Text").prop("text", text.into()).into()
    }

    pub fn fragment<I>(children: I) -> Node
    where
        I: IntoIterator,
        I::Item: Into<Node>,
    {
        Node::Fragment(FragmentNode {
            key: None,
            children: children.into_iter().map(Into::into).collect(),
        })
    }

    pub fn empty() -> Node {
        Node::Fragment(FragmentNode::default())
    }

    /// Renders `children` into the container registered under `target`.
    /// In place it contributes nothing to its parent's native children.
    pub fn portal<I>(target: impl Into<PortalTargetId>, children: I) -> Node
    where
        I: IntoIterator,
        I::Item: Into<Node>,
    {
        Node::Portal(PortalNode {
            key: None,
            target: target.into(),
            children: children.into_iter().map(Into::into).collect(),
        })
    }

    /// A component without hooks: a pure function of its props.
    pub fn stateless<P, F>(name: &'static str, props: P, render: F) -> ComponentNode
    where
        P: 'static,
        F: Fn(&P) -> RenderResult + 'static,
    {
        let render: StatelessRender = Rc::new(move |props: &dyn Any| match props.downcast_ref::<P>() {
            Some(props) => render(props),
            None => Err(RenderError::failed(format!("`{name}` received props of the wrong type"))),
        });
        ComponentNode {
            ty: ComponentType::of::<F>(name),
            key: None,
            props: Rc::new(props),
            render: RenderFn::Stateless(render),
            memo: None,
        }
    }

    /// A component that owns a hook list.
    pub fn stateful<P, F>(name: &'static str, props: P, render: F) -> ComponentNode
    where
        P: 'static,
        F: Fn(&P, &mut RenderContext<'_>) -> RenderResult + 'static,
    {
        let render: StatefulRender =
            Rc::new(move |props: &dyn Any, cx: &mut RenderContext<'_>| match props.downcast_ref::<P>() {
                Some(props) => render(props, cx),
                None => Err(RenderError::failed(format!("`{name}` received props of the wrong type"))),
            });
        ComponentNode {
            ty: ComponentType::of::<F>(name),
            key: None,
            props: Rc::new(props),
            render: RenderFn::Stateful(render),
            memo: None,
        }
    }

    /// Catches render failures in `child` and shows `fallback` instead.
    pub fn error_boundary<F>(child: impl Into<Node>, fallback: F) -> Node
    where
        F: Fn(&RenderError, BoundaryReset) -> Node + 'static,
    {
        Node::Boundary(BoundaryNode {
            key: None,
            child: Box::new(child.into()),
            fallback: Rc::new(fallback),
        })
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Element(_) => NodeKind::Element,
            Node::Component(_) => NodeKind::Component,
            Node::Fragment(_) => NodeKind::Fragment,
            Node::Portal(_) => NodeKind::Portal,
            Node::Boundary(_) => NodeKind::Boundary,
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            Node::Element(element) => NodeType::Element(element.tag.clone()),
            Node::Component(component) => NodeType::Component(component.ty),
            Node::Fragment(_) => NodeType::Fragment,
            Node::Portal(_) => NodeType::Portal,
            Node::Boundary(_) => NodeType::Boundary,
        }
    }

    pub fn key(&self) -> Option<Key> {
        match self {
            Node::Element(element) => element.key,
            Node::Component(component) => component.key,
            Node::Fragment(fragment) => fragment.key,
            Node::Portal(portal) => portal.key,
            Node::Boundary(boundary) => boundary.key,
        }
    }

    pub fn with_key<K: Hash + ?Sized>(self, key: &K) -> Node {
        self.with_raw_key(Some(key_of(key)))
    }

    pub(crate) fn with_raw_key(mut self, key: Option<Key>) -> Node {
        match &mut self {
            Node::Element(element) => element.key = key,
            Node::Component(component) => component.key = key,
            Node::Fragment(fragment) => fragment.key = key,
            Node::Portal(portal) => portal.key = key,
            Node::Boundary(boundary) => boundary.key = key,
        }
        self
    }

    /// True iff `other` may update the instance mounted for `self`:
    /// same variant, same concrete type, same key.
    pub fn is_compatible(&self, other: &Node) -> bool {
        self.key() == other.key() && self.node_type() == other.node_type()
    }

    /// Direct children of element, fragment and portal nodes.
    /// Components and boundaries produce their children by rendering.
    pub fn children(&self) -> &[Node] {
        match self {
            Node::Element(element) => &element.children,
            Node::Fragment(fragment) => &fragment.children,
            Node::Portal(portal) => &portal.children,
            Node::Component(_) | Node::Boundary(_) => &[],
        }
    }

    /// Depth-first, parent-before-children walk over the described tree.
    pub fn walk(&self, visit: &mut impl FnMut(&Node, usize)) {
        fn go(node: &Node, depth: usize, visit: &mut impl FnMut(&Node, usize)) {
            visit(node, depth);
            if let Node::Boundary(boundary) = node {
                go(&boundary.child, depth + 1, visit);
            }
            for child in node.children() {
                go(child, depth + 1, visit);
            }
        }
        go(self, 0, visit);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Element(element) => element.fmt(f),
            Node::Component(component) => component.fmt(f),
            Node::Fragment(fragment) => f
                .debug_struct("Fragment")
                .field("key", &fragment.key)
                .field("children", &fragment.children)
                .finish(),
            Node::Portal(portal) => f
                .debug_struct("Portal")
                .field("key", &portal.key)
                .field("target", &portal.target)
                .field("children", &portal.children)
                .finish(),
            Node::Boundary(boundary) => f
                .debug_struct("Boundary")
                .field("key", &boundary.key)
                .field("child", &boundary.child)
                .finish(),
        }
    }
}

/// Native primitive with props and children.
#[derive(Clone, Debug)]
pub struct ElementNode {
    pub(crate) tag: Rc<str>,
    pub(crate) key: Option<Key>,
    pub(crate) props: Props,
    pub(crate) children: Vec<Node>,
    pub(crate) portal_target: Option<PortalTargetId>,
}

impl ElementNode {
    pub fn new(tag: impl Into<Rc<str>>) -> Self {
        Self {
            tag: tag.into(),
            key: None,
            props: Props::new(),
            children: Vec::new(),
            portal_target: None,
        }
    }

    pub fn key<K: Hash + ?Sized>(mut self, key: &K) -> Self {
        self.key = Some(key_of(key));
        self
    }

    pub fn prop(mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.props.insert(key, value);
        self
    }

    /// Merges `props` over the current ones.
    pub fn props(mut self, props: Props) -> Self {
        for (key, value) in props.iter() {
            self.props.insert(key, value.clone());
        }
        self
    }

    pub fn child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Node>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }

    /// Registers this element's native view as the container for portals
    /// declaring `target`.
    pub fn portal_target(mut self, target: impl Into<PortalTargetId>) -> Self {
        self.portal_target = Some(target.into());
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn get_props(&self) -> &Props {
        &self.props
    }

    /// Fails when a prop the native side cannot default is absent.
    pub fn require(&self, prop: &str) -> Result<&PropValue, crate::UsageError> {
        self.props
            .get(prop)
            .ok_or_else(|| crate::UsageError::MissingProp {
                tag: self.tag.to_string(),
                prop: prop.to_owned(),
            })
    }
}

impl From<ElementNode> for Node {
    fn from(element: ElementNode) -> Self {
        Node::Element(element)
    }
}

#[derive(Clone)]
pub(crate) enum RenderFn {
    Stateless(StatelessRender),
    Stateful(StatefulRender),
}

/// A component invocation: props plus the render function producing its subtree.
#[derive(Clone)]
pub struct ComponentNode {
    pub(crate) ty: ComponentType,
    pub(crate) key: Option<Key>,
    pub(crate) props: Rc<dyn Any>,
    pub(crate) render: RenderFn,
    pub(crate) memo: Option<PropsEq>,
}

impl ComponentNode {
    pub fn key<K: Hash + ?Sized>(mut self, key: &K) -> Self {
        self.key = Some(key_of(key));
        self
    }

    /// Skip re-rendering when the new props equal the mounted ones and the
    /// instance has no pending update of its own.
    pub fn memo<P: PartialEq + 'static>(mut self) -> Self {
        fn props_eq<P: PartialEq + 'static>(old: &dyn Any, new: &dyn Any) -> bool {
            match (old.downcast_ref::<P>(), new.downcast_ref::<P>()) {
                (Some(old), Some(new)) => old == new,
                _ => false,
            }
        }
        self.memo = Some(props_eq::<P>);
        self
    }

    pub fn component_type(&self) -> ComponentType {
        self.ty
    }

    pub fn is_stateful(&self) -> bool {
        matches!(self.render, RenderFn::Stateful(_))
    }
}

impl fmt::Debug for ComponentNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.ty.name)
            .field("key", &self.key)
            .field("stateful", &self.is_stateful())
            .finish()
    }
}

impl From<ComponentNode> for Node {
    fn from(component: ComponentNode) -> Self {
        Node::Component(component)
    }
}

#[derive(Clone, Debug, Default)]
pub struct FragmentNode {
    pub(crate) key: Option<Key>,
    pub(crate) children: Vec<Node>,
}

impl From<FragmentNode> for Node {
    fn from(fragment: FragmentNode) -> Self {
        Node::Fragment(fragment)
    }
}

#[derive(Clone, Debug)]
pub struct PortalNode {
    pub(crate) key: Option<Key>,
    pub(crate) target: PortalTargetId,
    pub(crate) children: Vec<Node>,
}

impl PortalNode {
    pub fn target(&self) -> &str {
        &self.target
    }
}

#[derive(Clone)]
pub struct BoundaryNode {
    pub(crate) key: Option<Key>,
    pub(crate) child: Box<Node>,
    pub(crate) fallback: FallbackRender,
}

impl<T: Into<Node>> From<Option<T>> for Node {
    fn from(node: Option<T>) -> Self {
        node.map(Into::into).unwrap_or_else(Node::empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(props: &String) -> RenderResult {
        Ok(Node::text(props.clone()))
    }

    fn title(props: &String) -> RenderResult {
        Ok(Node::text(props.to_uppercase()))
    }

    #[test]
    fn compatibility_requires_same_type_and_key() {
        let view_a: Node = Node::element("View").key("a").into();
        let view_a2: Node = Node::element("View").key("a").prop("x", 1).into();
        let view_b: Node = Node::element("View").key("b").into();
        let text_a: Node = Node::element("Text").key("a").into();

        assert!(view_a.is_compatible(&view_a2));
        assert!(!view_a.is_compatible(&view_b));
        assert!(!view_a.is_compatible(&text_a));
        assert!(!view_a.is_compatible(&Node::empty()));
    }

    #[test]
    fn components_are_typed_by_their_render_function() {
        let a: Node = Node::stateless("Label", "a".to_string(), label).into();
        let b: Node = Node::stateless("Label", "b".to_string(), label).into();
        let c: Node = Node::stateless("Title", "c".to_string(), title).into();
        assert!(a.is_compatible(&b));
        assert!(!a.is_compatible(&c));
        assert_eq!(a.kind(), NodeKind::Component);
    }

    #[test]
    fn walk_visits_parents_before_children() {
        let tree: Node = Node::element("View")
            .child(Node::text("a"))
            .child(Node::fragment([Node::text("b"), Node::text("c")]))
            .into();
        let mut seen = Vec::new();
        tree.walk(&mut |node, depth| seen.push((node.kind(), depth)));
        assert_eq!(
            seen,
            vec![
                (NodeKind::Element, 0),
                (NodeKind::Element, 1),
                (NodeKind::Fragment, 1),
                (NodeKind::Element, 2),
                (NodeKind::Element, 2),
            ]
        );
    }

    #[test]
    fn require_reports_missing_props() {
        let element = Node::element("Image").prop("width", 10);
        assert!(element.require("width").is_ok());
        let err = element.require("source").unwrap_err();
        assert_eq!(err.to_string(), "`Image` is missing required prop `source`");
    }
}
