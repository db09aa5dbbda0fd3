//! In-memory native side shared by the unit tests.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::hash::HashMap;
use crate::{
    BridgeError, FlushScheduler, Mutation, PlatformBridge, PropDiff, Props, Renderer, RendererConfig, StoreRegistry,
    ViewId,
};

pub(crate) const ROOT: ViewId = ViewId(0);

#[derive(Default)]
pub(crate) struct TestBridge {
    pub(crate) not_ready: bool,
    pub(crate) batches: Vec<Vec<Mutation>>,
    open: Option<Vec<Mutation>>,
    views: HashMap<ViewId, (String, Props)>,
    children: HashMap<ViewId, Vec<ViewId>>,
    parents: HashMap<ViewId, ViewId>,
    /// Operation name that fails while set.
    pub(crate) fail: Option<&'static str>,
    /// Every operation received, shareable with components under test.
    pub(crate) journal: Rc<RefCell<Vec<String>>>,
}

impl TestBridge {
    pub(crate) fn last_batch(&self) -> &[Mutation] {
        self.batches.last().map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn count(&self, operation: &str) -> usize {
        self.last_batch()
            .iter()
            .filter(|mutation| mutation.operation() == operation)
            .count()
    }

    pub(crate) fn live_views(&self) -> usize {
        self.views.len()
    }

    pub(crate) fn props(&self, view: ViewId) -> Option<&Props> {
        self.views.get(&view).map(|(_, props)| props)
    }

    pub(crate) fn children_of(&self, view: ViewId) -> Vec<ViewId> {
        self.children.get(&view).cloned().unwrap_or_default()
    }

    /// Compact rendering of the native subtree under `parent`, e.g. `Row[Text:a,Text:b]`.
    pub(crate) fn tree(&self, parent: ViewId) -> String {
        self.children_of(parent)
            .iter()
            .map(|child| self.describe(*child))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn describe(&self, view: ViewId) -> String {
        let Some((view_type, props)) = self.views.get(&view) else {
            return format!("?{view}");
        };
        let mut out = match props.get("text").and_then(|text| text.as_str()) {
            Some(text) => format!("{view_type}:{text}"),
            None => view_type.clone(),
        };
        let children = self.tree(view);
        if !children.is_empty() {
            out.push('[');
            out.push_str(&children);
            out.push(']');
        }
        out
    }

    fn record(&mut self, mutation: Mutation) -> Result<(), BridgeError> {
        let operation = mutation.operation();
        self.journal.borrow_mut().push(mutation.to_string());
        let batch = self.open.as_mut().ok_or(BridgeError::NoBatch)?;
        batch.push(mutation);
        if self.fail == Some(operation) {
            return Err(BridgeError::Failed {
                operation,
                message: "injected".to_owned(),
            });
        }
        Ok(())
    }

    fn unlink(&mut self, child: ViewId) {
        if let Some(parent) = self.parents.remove(&child) {
            if let Some(siblings) = self.children.get_mut(&parent) {
                siblings.retain(|sibling| *sibling != child);
            }
        }
    }

    fn remove_subtree(&mut self, view: ViewId) {
        for child in self.children.remove(&view).unwrap_or_default() {
            self.parents.remove(&child);
            self.remove_subtree(child);
        }
        self.views.remove(&view);
    }
}

impl PlatformBridge for TestBridge {
    fn is_ready(&self) -> bool {
        !self.not_ready
    }

    fn start_batch(&mut self) -> Result<(), BridgeError> {
        if self.fail == Some("start_batch") {
            return Err(BridgeError::Failed {
                operation: "start_batch",
                message: "injected".to_owned(),
            });
        }
        self.open = Some(Vec::new());
        Ok(())
    }

    fn create_view(&mut self, view: ViewId, view_type: &str, props: &Props) -> Result<(), BridgeError> {
        self.record(Mutation::Create {
            view,
            view_type: view_type.to_owned(),
            props: props.clone(),
        })?;
        self.views.insert(view, (view_type.to_owned(), props.clone()));
        Ok(())
    }

    fn update_view(&mut self, view: ViewId, diff: &PropDiff) -> Result<(), BridgeError> {
        self.record(Mutation::Update {
            view,
            diff: diff.clone(),
        })?;
        let (_, props) = self.views.get_mut(&view).ok_or(BridgeError::UnknownView { view })?;
        props.apply_diff(diff);
        Ok(())
    }

    fn delete_view(&mut self, view: ViewId) -> Result<(), BridgeError> {
        self.record(Mutation::Delete { view })?;
        self.unlink(view);
        self.remove_subtree(view);
        Ok(())
    }

    fn attach_view(&mut self, child: ViewId, parent: ViewId, index: usize) -> Result<(), BridgeError> {
        self.record(Mutation::Attach { child, parent, index })?;
        self.unlink(child);
        let siblings = self.children.entry(parent).or_default();
        let index = index.min(siblings.len());
        siblings.insert(index, child);
        self.parents.insert(child, parent);
        Ok(())
    }

    fn detach_view(&mut self, child: ViewId) -> Result<(), BridgeError> {
        self.record(Mutation::Detach { child })?;
        self.unlink(child);
        Ok(())
    }

    fn set_children(&mut self, parent: ViewId, children: &[ViewId]) -> Result<(), BridgeError> {
        self.record(Mutation::SetChildren {
            parent,
            children: children.to_vec(),
        })?;
        for child in self.children.remove(&parent).unwrap_or_default() {
            self.parents.remove(&child);
        }
        for child in children {
            self.unlink(*child);
            self.parents.insert(*child, parent);
        }
        self.children.insert(parent, children.to_vec());
        Ok(())
    }

    fn commit_batch(&mut self) -> Result<(), BridgeError> {
        let batch = self.open.take().ok_or(BridgeError::NoBatch)?;
        self.batches.push(batch);
        Ok(())
    }

    fn cancel_batch(&mut self) {
        self.open = None;
    }
}

/// Counts flush requests instead of scheduling anything.
#[derive(Default)]
pub(crate) struct CountingFlush(AtomicUsize);

impl CountingFlush {
    pub(crate) fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl FlushScheduler for CountingFlush {
    fn schedule_flush(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) fn renderer() -> (Renderer<TestBridge>, Arc<CountingFlush>) {
    renderer_with(RendererConfig::default())
}

/// Routes `log` output through the test harness; `RUST_LOG=tessel_core=trace` shows commits.
pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub(crate) fn renderer_with(config: RendererConfig) -> (Renderer<TestBridge>, Arc<CountingFlush>) {
    init_logging();
    let flush = Arc::new(CountingFlush::default());
    let renderer = Renderer::with_config(TestBridge::default(), flush.clone(), config, StoreRegistry::new());
    (renderer, flush)
}

/// Runs `f` against the bridge, panicking if the renderer is mid-commit.
pub(crate) fn bridge<R>(renderer: &Renderer<TestBridge>, f: impl FnOnce(&TestBridge) -> R) -> R {
    renderer.with_bridge(f).expect("renderer busy")
}
