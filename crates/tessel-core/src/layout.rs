//! Contract with an external layout engine.
//!
//! The core never computes geometry. It hands the engine a snapshot of the
//! mounted native tree and gets one frame per view back.

use crate::bridge::ViewId;
use crate::hash::HashMap;
use crate::props::Props;

/// Mounted native view as seen by a layout engine.
#[derive(Clone, Debug, PartialEq)]
pub struct LayoutNode {
    pub view: ViewId,
    pub view_type: String,
    pub props: Props,
    pub children: Vec<LayoutNode>,
}

impl LayoutNode {
    /// Visits this node and its descendants depth-first, parents first.
    pub fn walk(&self, visit: &mut impl FnMut(&LayoutNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    /// Number of nodes in this subtree, including this one.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(LayoutNode::node_count).sum::<usize>()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Frame {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Frame {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }
}

pub type FrameMap = HashMap<ViewId, Frame>;

pub trait LayoutEngine {
    fn compute(&mut self, root: &LayoutNode) -> FrameMap;
}

impl<F> LayoutEngine for F
where
    F: FnMut(&LayoutNode) -> FrameMap,
{
    fn compute(&mut self, root: &LayoutNode) -> FrameMap {
        self(root)
    }
}
