//! Public entry point tying the reconciler, scheduler and bridge together.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::bridge::{PlatformBridge, PropDiffInterceptor, ViewId};
use crate::config::RendererConfig;
use crate::error::{BridgeError, CommitError};
use crate::layout::{FrameMap, LayoutEngine, LayoutNode};
use crate::node::{Node, PortalTargetId};
use crate::platform::FlushScheduler;
use crate::props::{PropValue, Props};
use crate::reconciler::{CommitReport, InstanceId, Reconciler};
use crate::scheduler::Scheduler;
use crate::store::StoreRegistry;

/// Handle to a tree rendered into a host container.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RootId(InstanceId);

impl RootId {
    pub fn instance(&self) -> InstanceId {
        self.0
    }
}

/// Owns the mounted trees of one native surface.
///
/// Commits run when the host calls [`Renderer::flush`] after its
/// [`FlushScheduler`] fired, or synchronously for immediate-priority updates.
/// A commit never nests: calls made while one is running return
/// [`CommitError::Reentrant`] and the work stays queued.
pub struct Renderer<B: PlatformBridge + 'static> {
    reconciler: Rc<RefCell<Reconciler<B>>>,
    scheduler: Scheduler,
}

impl<B: PlatformBridge + 'static> Renderer<B> {
    pub fn new(bridge: B, host: Arc<dyn FlushScheduler>) -> Self {
        Self::with_config(bridge, host, RendererConfig::default(), StoreRegistry::new())
    }

    pub fn with_config(bridge: B, host: Arc<dyn FlushScheduler>, config: RendererConfig, stores: StoreRegistry) -> Self {
        let scheduler = Scheduler::new(host);
        let reconciler = Rc::new(RefCell::new(Reconciler::new(bridge, scheduler.clone(), stores, config)));
        let weak = Rc::downgrade(&reconciler);
        let handle = scheduler.handle();
        scheduler.set_flusher(move || {
            let Some(reconciler) = weak.upgrade() else {
                return;
            };
            let Ok(mut reconciler) = reconciler.try_borrow_mut() else {
                handle.request_flush();
                return;
            };
            if let Err(err) = reconciler.commit() {
                log::error!("immediate flush failed: {err}");
            }
        });
        Self { reconciler, scheduler }
    }

    fn reconciler(&self) -> Result<RefMut<'_, Reconciler<B>>, CommitError> {
        self.reconciler.try_borrow_mut().map_err(|_| CommitError::Reentrant)
    }

    fn inspect(&self) -> Option<Ref<'_, Reconciler<B>>> {
        self.reconciler.try_borrow().ok()
    }

    /// Renders `node` into `container` and commits. Rendering into a
    /// container that already has a root updates that root.
    pub fn render(&self, container: ViewId, node: impl Into<Node>) -> Result<RootId, CommitError> {
        let mut reconciler = self.reconciler()?;
        let root = reconciler.set_root(container, node.into());
        reconciler.commit()?;
        Ok(RootId(root))
    }

    pub fn update_root(&self, root: RootId, node: impl Into<Node>) -> Result<CommitReport, CommitError> {
        let mut reconciler = self.reconciler()?;
        reconciler.update_root(root.0, node.into())?;
        reconciler.commit()
    }

    /// Unmounts everything rendered into `root` and dispatches the deletes.
    pub fn unmount_root(&self, root: RootId) -> Result<CommitReport, CommitError> {
        let mut reconciler = self.reconciler()?;
        reconciler.remove_root(root.0)?;
        reconciler.commit()
    }

    /// Runs one commit over every pending update.
    pub fn flush(&self) -> Result<CommitReport, CommitError> {
        self.reconciler()?.commit()
    }

    /// Tells the renderer the bridge became ready. Updates held back while it
    /// was not ready get a fresh flush request.
    pub fn bridge_ready(&self) {
        self.scheduler.resume();
    }

    pub fn roots(&self) -> Vec<(ViewId, RootId)> {
        self.inspect()
            .map(|reconciler| reconciler.roots().map(|(view, root)| (view, RootId(root))).collect())
            .unwrap_or_default()
    }

    // Portals

    /// Creates a portal rendering `children` into the container registered as `target`.
    pub fn create_portal<I>(&self, target: impl Into<PortalTargetId>, children: I) -> Result<CommitReport, CommitError>
    where
        I: IntoIterator,
        I::Item: Into<Node>,
    {
        let mut reconciler = self.reconciler()?;
        reconciler.create_portal(target.into(), children.into_iter().map(Into::into).collect())?;
        reconciler.commit()
    }

    pub fn update_portal_children<I>(&self, target: &str, children: I) -> Result<CommitReport, CommitError>
    where
        I: IntoIterator,
        I::Item: Into<Node>,
    {
        let mut reconciler = self.reconciler()?;
        reconciler.update_portal_children(target, children.into_iter().map(Into::into).collect())?;
        reconciler.commit()
    }

    pub fn remove_portal(&self, target: &str) -> Result<CommitReport, CommitError> {
        let mut reconciler = self.reconciler()?;
        reconciler.remove_portal(target)?;
        reconciler.commit()
    }

    /// Native container registered under `target`, if one is mounted.
    pub fn portal_target_view(&self, target: &str) -> Option<ViewId> {
        self.inspect()?.portal_target_view(target)
    }

    // Bridge

    /// Calls a custom native method outside the mutation stream.
    pub fn tunnel(&self, component_type: &str, method: &str, params: &Props) -> Result<PropValue, BridgeError> {
        match self.reconciler.try_borrow_mut() {
            Ok(mut reconciler) => reconciler.tunnel(component_type, method, params),
            Err(_) => Err(BridgeError::Failed {
                operation: "tunnel",
                message: "renderer is committing".to_owned(),
            }),
        }
    }

    /// Rewrites prop diffs for elements with `tag` before they reach the bridge.
    pub fn register_prop_interceptor(
        &self,
        tag: impl Into<String>,
        interceptor: impl PropDiffInterceptor + 'static,
    ) -> Result<(), CommitError> {
        self.reconciler()?.register_interceptor(tag, Box::new(interceptor));
        Ok(())
    }

    pub fn with_bridge<R>(&self, f: impl FnOnce(&B) -> R) -> Result<R, CommitError> {
        let reconciler = self.reconciler.try_borrow().map_err(|_| CommitError::Reentrant)?;
        Ok(f(reconciler.bridge()))
    }

    pub fn with_bridge_mut<R>(&self, f: impl FnOnce(&mut B) -> R) -> Result<R, CommitError> {
        Ok(f(self.reconciler()?.bridge_mut()))
    }

    // Introspection

    pub fn config(&self) -> Option<RendererConfig> {
        self.inspect().map(|reconciler| reconciler.config().clone())
    }

    pub fn instance_count(&self) -> usize {
        self.inspect().map(|reconciler| reconciler.instance_count()).unwrap_or_default()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn has_pending(&self) -> bool {
        self.scheduler.has_pending()
    }

    /// Native children of a mounted view or root container, as last sent to the bridge.
    pub fn native_children(&self, view: ViewId) -> Option<Vec<ViewId>> {
        self.inspect()?.native_children(view)
    }

    pub fn view_props(&self, view: ViewId) -> Option<(Rc<str>, Props)> {
        self.inspect()?.view_props(view)
    }

    // Layout

    pub fn layout_tree(&self, root: RootId) -> Option<LayoutNode> {
        self.inspect()?.layout_tree(root.0)
    }

    /// Runs `engine` over the mounted native tree of `root`.
    pub fn compute_layout(&self, root: RootId, engine: &mut impl LayoutEngine) -> Option<FrameMap> {
        let tree = self.layout_tree(root)?;
        Some(engine.compute(&tree))
    }
}

impl<B: PlatformBridge + 'static> fmt::Debug for Renderer<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("instances", &self.instance_count())
            .field("scheduler", &self.scheduler)
            .finish()
    }
}
