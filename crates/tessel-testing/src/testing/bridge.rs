use std::collections::BTreeMap;

use tessel_core::{BridgeError, Mutation, PlatformBridge, PropDiff, PropValue, Props, ViewId};

/// A native view as the recording bridge sees it.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedView {
    pub view_type: String,
    pub props: Props,
    pub parent: Option<ViewId>,
    pub children: Vec<ViewId>,
}

/// In-memory [`PlatformBridge`] that keeps every committed batch and a
/// model of the native tree the batches produced.
///
/// Failures can be injected per operation to exercise the core's handling
/// of a misbehaving native side.
#[derive(Debug, Default)]
pub struct RecordingBridge {
    ready: Option<bool>,
    batches: Vec<Vec<Mutation>>,
    open: Option<Vec<Mutation>>,
    views: BTreeMap<ViewId, RecordedView>,
    containers: BTreeMap<ViewId, Vec<ViewId>>,
    failing: Option<&'static str>,
    tunnel_calls: Vec<(String, String, Props)>,
}

impl RecordingBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold commits back until [`RecordingBridge::set_ready`] flips this again.
    pub fn not_ready() -> Self {
        Self {
            ready: Some(false),
            ..Self::default()
        }
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = Some(ready);
    }

    /// Makes every call of `operation` fail until cleared with `None`.
    pub fn fail_on(&mut self, operation: Option<&'static str>) {
        self.failing = operation;
    }

    pub fn batches(&self) -> &[Vec<Mutation>] {
        &self.batches
    }

    pub fn last_batch(&self) -> &[Mutation] {
        self.batches.last().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Occurrences of `operation` (e.g. `"create_view"`) across every batch.
    pub fn total(&self, operation: &str) -> usize {
        self.batches
            .iter()
            .flatten()
            .filter(|mutation| mutation.operation() == operation)
            .count()
    }

    pub fn clear_batches(&mut self) {
        self.batches.clear();
    }

    pub fn view(&self, view: ViewId) -> Option<&RecordedView> {
        self.views.get(&view)
    }

    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    pub fn children(&self, parent: ViewId) -> Vec<ViewId> {
        match self.views.get(&parent) {
            Some(view) => view.children.clone(),
            None => self.containers.get(&parent).cloned().unwrap_or_default(),
        }
    }

    pub fn tunnel_calls(&self) -> &[(String, String, Props)] {
        &self.tunnel_calls
    }

    /// One line per view, indented by depth: `Text text="a"`.
    pub fn dump(&self, container: ViewId) -> String {
        let mut out = String::new();
        for child in self.children(container) {
            self.dump_view(child, 0, &mut out);
        }
        out
    }

    fn dump_view(&self, view: ViewId, depth: usize, out: &mut String) {
        let Some(recorded) = self.views.get(&view) else {
            return;
        };
        out.push_str(&"  ".repeat(depth));
        out.push_str(&recorded.view_type);
        for (key, value) in recorded.props.iter() {
            out.push_str(&format!(" {key}={value}"));
        }
        out.push('\n');
        for child in &recorded.children {
            self.dump_view(*child, depth + 1, out);
        }
    }

    fn record(&mut self, mutation: Mutation) -> Result<(), BridgeError> {
        let operation = mutation.operation();
        let batch = self.open.as_mut().ok_or(BridgeError::NoBatch)?;
        batch.push(mutation);
        if self.failing == Some(operation) {
            return Err(BridgeError::Failed {
                operation,
                message: "injected failure".to_owned(),
            });
        }
        Ok(())
    }

    /// Child list of a view, or of a host container when `parent` is not a view.
    fn siblings_mut(&mut self, parent: ViewId) -> &mut Vec<ViewId> {
        match self.views.get_mut(&parent) {
            Some(view) => &mut view.children,
            None => self.containers.entry(parent).or_default(),
        }
    }

    fn unlink(&mut self, child: ViewId) {
        let parent = self.views.get_mut(&child).and_then(|view| view.parent.take());
        if let Some(parent) = parent {
            self.siblings_mut(parent).retain(|sibling| *sibling != child);
        }
    }

    fn drop_subtree(&mut self, view: ViewId) {
        if let Some(removed) = self.views.remove(&view) {
            for child in removed.children {
                self.drop_subtree(child);
            }
        }
    }
}

impl PlatformBridge for RecordingBridge {
    fn is_ready(&self) -> bool {
        self.ready.unwrap_or(true)
    }

    fn start_batch(&mut self) -> Result<(), BridgeError> {
        if self.failing == Some("start_batch") {
            return Err(BridgeError::Failed {
                operation: "start_batch",
                message: "injected failure".to_owned(),
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
        self.views.insert(
            view,
            RecordedView {
                view_type: view_type.to_owned(),
                props: props.clone(),
                parent: None,
                children: Vec::new(),
            },
        );
        Ok(())
    }

    fn update_view(&mut self, view: ViewId, diff: &PropDiff) -> Result<(), BridgeError> {
        self.record(Mutation::Update {
            view,
            diff: diff.clone(),
        })?;
        let recorded = self.views.get_mut(&view).ok_or(BridgeError::UnknownView { view })?;
        recorded.props.apply_diff(diff);
        Ok(())
    }

    fn delete_view(&mut self, view: ViewId) -> Result<(), BridgeError> {
        self.record(Mutation::Delete { view })?;
        self.unlink(view);
        self.drop_subtree(view);
        Ok(())
    }

    fn attach_view(&mut self, child: ViewId, parent: ViewId, index: usize) -> Result<(), BridgeError> {
        self.record(Mutation::Attach { child, parent, index })?;
        if !self.views.contains_key(&child) {
            return Err(BridgeError::UnknownView { view: child });
        }
        self.unlink(child);
        let siblings = self.siblings_mut(parent);
        let index = index.min(siblings.len());
        siblings.insert(index, child);
        if let Some(view) = self.views.get_mut(&child) {
            view.parent = Some(parent);
        }
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
        for child in children {
            self.unlink(*child);
        }
        let previous = std::mem::replace(self.siblings_mut(parent), children.to_vec());
        for child in previous {
            if let Some(view) = self.views.get_mut(&child) {
                view.parent = None;
            }
        }
        for child in children {
            if let Some(view) = self.views.get_mut(child) {
                view.parent = Some(parent);
            }
        }
        Ok(())
    }

    fn commit_batch(&mut self) -> Result<(), BridgeError> {
        let batch = self.open.take().ok_or(BridgeError::NoBatch)?;
        log::trace!("recorded batch of {} mutations", batch.len());
        self.batches.push(batch);
        Ok(())
    }

    fn cancel_batch(&mut self) {
        self.open = None;
    }

    fn tunnel(&mut self, component_type: &str, method: &str, params: &Props) -> Result<PropValue, BridgeError> {
        self.tunnel_calls
            .push((component_type.to_owned(), method.to_owned(), params.clone()));
        match (component_type, method) {
            ("Echo", _) => Ok(PropValue::from(params.clone())),
            _ => Err(BridgeError::UnknownTunnel {
                component_type: component_type.to_owned(),
                method: method.to_owned(),
            }),
        }
    }
}
