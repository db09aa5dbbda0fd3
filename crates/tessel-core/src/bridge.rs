//! Translation from reconciler mutation intents to native view operations.
//!
//! The reconciler records an ordered [`Mutation`] list per commit. The
//! [`BridgeAdapter`] forwards that list to a [`PlatformBridge`] inside a
//! single `start_batch`/`commit_batch` pair. A failed operation does not
//! abort the batch: it is recorded as a [`FailedMutation`]. The reconciler
//! remembers what the native side rejected, and the next update touching the
//! same views sends the in-memory state again.

use std::fmt;

use crate::config::RendererConfig;
use crate::error::BridgeError;
use crate::hash::HashSet;
use crate::props::{PropDiff, PropValue, Props};

/// Native view identifier. Allocated by the core and stable until the view is deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(pub u64);

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Mutation {
    Create {
        view: ViewId,
        view_type: String,
        props: Props,
    },
    Update {
        view: ViewId,
        diff: PropDiff,
    },
    /// Deletes `view` and, natively, its whole subtree.
    Delete {
        view: ViewId,
    },
    Attach {
        child: ViewId,
        parent: ViewId,
        index: usize,
    },
    Detach {
        child: ViewId,
    },
    /// Replaces the full ordered child list of `parent`.
    SetChildren {
        parent: ViewId,
        children: Vec<ViewId>,
    },
}

impl Mutation {
    pub fn operation(&self) -> &'static str {
        match self {
            Mutation::Create { .. } => "create_view",
            Mutation::Update { .. } => "update_view",
            Mutation::Delete { .. } => "delete_view",
            Mutation::Attach { .. } => "attach_view",
            Mutation::Detach { .. } => "detach_view",
            Mutation::SetChildren { .. } => "set_children",
        }
    }

    /// The view the operation targets: the created, updated, deleted or moved view,
    /// or the parent for [`Mutation::SetChildren`].
    pub fn view(&self) -> ViewId {
        match self {
            Mutation::Create { view, .. } | Mutation::Update { view, .. } | Mutation::Delete { view } => *view,
            Mutation::Attach { child, .. } | Mutation::Detach { child } => *child,
            Mutation::SetChildren { parent, .. } => *parent,
        }
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutation::Create { view, view_type, props } => write!(f, "create {view} {view_type} {props}"),
            Mutation::Update { view, diff } => {
                write!(f, "update {view} [")?;
                for (index, key) in diff.keys().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(key)?;
                }
                f.write_str("]")
            }
            Mutation::Delete { view } => write!(f, "delete {view}"),
            Mutation::Attach { child, parent, index } => write!(f, "attach {child} -> {parent}[{index}]"),
            Mutation::Detach { child } => write!(f, "detach {child}"),
            Mutation::SetChildren { parent, children } => {
                write!(f, "set_children {parent} [")?;
                for (index, child) in children.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{child}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// The native backend as seen by the core.
///
/// Operations are issued between [`PlatformBridge::start_batch`] and
/// [`PlatformBridge::commit_batch`]; a backend may buffer them and apply the
/// whole batch atomically on commit. Deleting a view deletes its subtree.
pub trait PlatformBridge {
    /// Commits are held back while this returns `false`.
    fn is_ready(&self) -> bool {
        true
    }

    fn start_batch(&mut self) -> Result<(), BridgeError>;

    fn create_view(&mut self, view: ViewId, view_type: &str, props: &Props) -> Result<(), BridgeError>;

    fn update_view(&mut self, view: ViewId, diff: &PropDiff) -> Result<(), BridgeError>;

    fn delete_view(&mut self, view: ViewId) -> Result<(), BridgeError>;

    fn attach_view(&mut self, child: ViewId, parent: ViewId, index: usize) -> Result<(), BridgeError>;

    fn detach_view(&mut self, child: ViewId) -> Result<(), BridgeError>;

    fn set_children(&mut self, parent: ViewId, children: &[ViewId]) -> Result<(), BridgeError>;

    fn commit_batch(&mut self) -> Result<(), BridgeError>;

    fn cancel_batch(&mut self);

    /// Imperative escape hatch bypassing the declarative tree.
    fn tunnel(&mut self, component_type: &str, method: &str, params: &Props) -> Result<PropValue, BridgeError> {
        let _ = params;
        Err(BridgeError::UnknownTunnel {
            component_type: component_type.to_owned(),
            method: method.to_owned(),
        })
    }
}

/// A single operation the native side rejected.
#[derive(Clone, Debug, PartialEq)]
pub struct FailedMutation {
    pub mutation: Mutation,
    pub error: BridgeError,
}

/// Outcome of one [`BridgeAdapter::dispatch`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DispatchOutcome {
    pub dispatched: usize,
    pub failed: Vec<FailedMutation>,
}

/// Per-element-type hook that may rewrite a prop diff before dispatch.
pub trait PropDiffInterceptor {
    /// `old` and `new` are the element's full prop maps; `diff` is the computed change set.
    fn intercept(&self, old: &Props, new: &Props, diff: &mut PropDiff);
}

impl<F> PropDiffInterceptor for F
where
    F: Fn(&Props, &Props, &mut PropDiff),
{
    fn intercept(&self, old: &Props, new: &Props, diff: &mut PropDiff) {
        self(old, new, diff)
    }
}

/// Owns the platform bridge and the view id counter.
pub struct BridgeAdapter<B> {
    bridge: B,
    next_view: u64,
    containers: HashSet<ViewId>,
    trace: bool,
    batches: u64,
}

impl<B: PlatformBridge> BridgeAdapter<B> {
    pub fn new(bridge: B, config: &RendererConfig) -> Self {
        Self {
            bridge,
            next_view: 1,
            containers: HashSet::default(),
            trace: config.trace_mutations,
            batches: 0,
        }
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    pub fn bridge_mut(&mut self) -> &mut B {
        &mut self.bridge
    }

    pub fn is_ready(&self) -> bool {
        self.bridge.is_ready()
    }

    /// Next free view id. Host-owned root containers are never handed out.
    pub fn allocate_view(&mut self) -> ViewId {
        loop {
            let view = ViewId(self.next_view);
            self.next_view += 1;
            if !self.containers.contains(&view) {
                return view;
            }
        }
    }

    /// Marks a host-owned container id so the allocator skips it.
    pub fn reserve_container(&mut self, view: ViewId) {
        self.containers.insert(view);
    }

    pub fn release_container(&mut self, view: ViewId) {
        self.containers.remove(&view);
    }

    /// Batches committed so far.
    pub fn batches(&self) -> u64 {
        self.batches
    }

    /// Sends `mutations` as one native batch. An empty list sends nothing.
    pub fn dispatch(&mut self, mutations: &[Mutation]) -> Result<DispatchOutcome, BridgeError> {
        let mut outcome = DispatchOutcome::default();
        if mutations.is_empty() {
            return Ok(outcome);
        }
        if let Err(err) = self.bridge.start_batch() {
            self.bridge.cancel_batch();
            return Err(err);
        }
        for mutation in mutations {
            if self.trace {
                log::trace!("{mutation}");
            }
            match self.apply(mutation) {
                Ok(()) => outcome.dispatched += 1,
                Err(error) => {
                    log::warn!("{} failed for view {}: {error}", mutation.operation(), mutation.view());
                    outcome.failed.push(FailedMutation {
                        mutation: mutation.clone(),
                        error,
                    });
                }
            }
        }
        self.bridge.commit_batch()?;
        self.batches += 1;
        Ok(outcome)
    }

    pub fn tunnel(&mut self, component_type: &str, method: &str, params: &Props) -> Result<PropValue, BridgeError> {
        self.bridge.tunnel(component_type, method, params)
    }

    fn apply(&mut self, mutation: &Mutation) -> Result<(), BridgeError> {
        match mutation {
            Mutation::Create { view, view_type, props } => self.bridge.create_view(*view, view_type, props),
            Mutation::Update { view, diff } => self.bridge.update_view(*view, diff),
            Mutation::Delete { view } => self.bridge.delete_view(*view),
            Mutation::Attach { child, parent, index } => self.bridge.attach_view(*child, *parent, *index),
            Mutation::Detach { child } => self.bridge.detach_view(*child),
            Mutation::SetChildren { parent, children } => self.bridge.set_children(*parent, children),
        }
    }
}

impl<B> fmt::Debug for BridgeAdapter<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeAdapter")
            .field("next_view", &self.next_view)
            .field("batches", &self.batches)
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/bridge_tests.rs"]
mod tests;
