use std::sync::Arc;

use tessel_core::{CommitError, CommitReport, FrameMap, Node, Renderer, RendererConfig, RootId, StoreRegistry, ViewId};

use super::{ManualScheduler, RecordingBridge, StackLayout};

/// Container id the rule renders into.
pub const TEST_CONTAINER: ViewId = ViewId(0);

/// Upper bound on flushes in [`RenderTestRule::pump_until_idle`].
const MAX_PUMPS: usize = 64;

/// Headless harness for driving a [`Renderer`] in tests.
///
/// Owns a renderer backed by a [`RecordingBridge`] and a
/// [`ManualScheduler`], and flushes only when asked.
pub struct RenderTestRule {
    renderer: Renderer<RecordingBridge>,
    scheduler: Arc<ManualScheduler>,
    root: Option<RootId>,
}

impl RenderTestRule {
    pub fn new() -> Self {
        Self::with_config(RendererConfig::default())
    }

    pub fn with_config(config: RendererConfig) -> Self {
        Self::with_parts(RecordingBridge::new(), config, StoreRegistry::new())
    }

    pub fn with_parts(bridge: RecordingBridge, config: RendererConfig, stores: StoreRegistry) -> Self {
        let scheduler = Arc::new(ManualScheduler::new());
        Self {
            renderer: Renderer::with_config(bridge, scheduler.clone(), config, stores),
            scheduler,
            root: None,
        }
    }

    /// Renders `content` into the test container, replacing what was there.
    pub fn set_content(&mut self, content: impl Into<Node>) -> Result<(), CommitError> {
        match self.root {
            Some(root) => self.renderer.update_root(root, content).map(|_| ()),
            None => {
                self.root = Some(self.renderer.render(TEST_CONTAINER, content)?);
                Ok(())
            }
        }
    }

    /// Flushes while the renderer keeps asking for flushes, up to a fixed bound.
    /// Returns the reports of the flushes that ran.
    pub fn pump_until_idle(&mut self) -> Result<Vec<CommitReport>, CommitError> {
        let mut reports = Vec::new();
        while self.scheduler.take_request() {
            if reports.len() == MAX_PUMPS {
                log::warn!("still requesting flushes after {MAX_PUMPS} pumps");
                break;
            }
            reports.push(self.renderer.flush()?);
        }
        Ok(reports)
    }

    pub fn unmount(&mut self) -> Result<(), CommitError> {
        if let Some(root) = self.root.take() {
            self.renderer.unmount_root(root)?;
        }
        Ok(())
    }

    pub fn root(&self) -> Option<RootId> {
        self.root
    }

    pub fn renderer(&self) -> &Renderer<RecordingBridge> {
        &self.renderer
    }

    pub fn scheduler(&self) -> &ManualScheduler {
        &self.scheduler
    }

    /// Runs `f` against the recording bridge. Panics if called mid-commit.
    pub fn bridge<R>(&self, f: impl FnOnce(&RecordingBridge) -> R) -> R {
        match self.renderer.with_bridge(f) {
            Ok(value) => value,
            Err(err) => panic!("bridge unavailable: {err}"),
        }
    }

    pub fn bridge_mut<R>(&self, f: impl FnOnce(&mut RecordingBridge) -> R) -> R {
        match self.renderer.with_bridge_mut(f) {
            Ok(value) => value,
            Err(err) => panic!("bridge unavailable: {err}"),
        }
    }

    /// Flips the recording bridge's readiness. Becoming ready tells the
    /// renderer, so held-back updates request a flush again.
    pub fn set_bridge_ready(&self, ready: bool) {
        self.bridge_mut(|bridge| bridge.set_ready(ready));
        if ready {
            self.renderer.bridge_ready();
        }
    }

    /// Indented dump of the native tree under the test container.
    pub fn dump(&self) -> String {
        self.bridge(|bridge| bridge.dump(TEST_CONTAINER))
    }

    /// Lays out the mounted tree with `layout`.
    pub fn layout(&self, mut layout: StackLayout) -> Option<FrameMap> {
        let root = self.root?;
        self.renderer.compute_layout(root, &mut layout)
    }
}

impl Default for RenderTestRule {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience helper for tests that only need temporary access to a
/// [`RenderTestRule`].
pub fn run_test_render<R>(f: impl FnOnce(&mut RenderTestRule) -> R) -> R {
    let mut rule = RenderTestRule::new();
    f(&mut rule)
}
