use tessel_core::{Frame, FrameMap, LayoutEngine, LayoutNode};

/// Minimal vertical stack layout for tests.
///
/// Every view gets its parent's width. A view's height comes from its
/// `height` prop, or the sum of its children's heights, or `row_height`
/// for leaves. Children stack top to bottom inside their parent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StackLayout {
    pub width: f32,
    pub row_height: f32,
}

impl Default for StackLayout {
    fn default() -> Self {
        Self {
            width: 320.0,
            row_height: 20.0,
        }
    }
}

impl StackLayout {
    pub fn new(width: f32, row_height: f32) -> Self {
        Self { width, row_height }
    }

    fn height(&self, node: &LayoutNode) -> f32 {
        if let Some(height) = node.props.get("height").and_then(|value| value.as_float()) {
            return height as f32;
        }
        if node.children.is_empty() {
            return self.row_height;
        }
        node.children.iter().map(|child| self.height(child)).sum()
    }

    fn place(&self, node: &LayoutNode, x: f32, y: f32, frames: &mut FrameMap) {
        frames.insert(node.view, Frame::new(x, y, self.width, self.height(node)));
        let mut cursor = y;
        for child in &node.children {
            self.place(child, x, cursor, frames);
            cursor += self.height(child);
        }
    }
}

impl LayoutEngine for StackLayout {
    fn compute(&mut self, root: &LayoutNode) -> FrameMap {
        let mut frames = FrameMap::default();
        self.place(root, 0.0, 0.0, &mut frames);
        frames
    }
}
