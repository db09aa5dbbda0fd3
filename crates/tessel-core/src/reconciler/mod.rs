//! The reconciler: mounted instance arena, tree walks and the commit loop.
//!
//! A commit drains the scheduler's dirty set, walks each dirty instance that
//! an earlier walk in the same pass did not already reach, registers portal
//! targets, resolves pending portals and brings every touched host's native
//! child list up to date. Render-phase updates add passes. The mutations of
//! all passes go out as one native batch, then the queued effects run.

mod diff;
mod host;
mod instance;
mod mount;
mod native;
mod portals;

use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use slotmap::SlotMap;

use crate::bridge::{BridgeAdapter, FailedMutation, Mutation, PlatformBridge, PropDiffInterceptor, ViewId};
use crate::config::RendererConfig;
use crate::error::{BridgeError, CommitError, RenderError, UsageError};
use crate::hash::{HashMap, HashSet};
use crate::hooks::{EffectRequest, PendingEffect};
use crate::layout::LayoutNode;
use crate::node::{Node, NodeType, PortalTargetId};
use crate::portal::PortalRegistry;
use crate::props::{PropValue, Props};
use crate::scheduler::Scheduler;
use crate::store::StoreRegistry;

pub use instance::InstanceId;
pub(crate) use instance::{Instance, InstanceKind, PortalInstance, RootInstance};

/// Summary of one commit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommitReport {
    /// Render passes run.
    pub passes: usize,
    /// Dirty instances walked as independent roots.
    pub walked: usize,
    /// Mutations the bridge accepted.
    pub dispatched: usize,
    /// Mutations the bridge rejected.
    pub failed: Vec<FailedMutation>,
    /// Native batches sent.
    pub batches: usize,
    pub effects_run: usize,
    pub effect_errors: usize,
    /// Render errors caught by error boundaries.
    pub captured: usize,
    /// Nothing ran because the bridge was not ready.
    pub deferred: bool,
}

impl CommitReport {
    pub fn is_empty(&self) -> bool {
        self.walked == 0 && self.dispatched == 0 && self.failed.is_empty() && self.effects_run == 0
    }
}

pub(crate) struct Reconciler<B> {
    arena: SlotMap<InstanceId, Instance>,
    adapter: BridgeAdapter<B>,
    scheduler: Scheduler,
    stores: StoreRegistry,
    config: RendererConfig,
    portals: PortalRegistry,
    interceptors: HashMap<String, Box<dyn PropDiffInterceptor>>,
    roots: IndexMap<ViewId, InstanceId>,
    views: HashMap<ViewId, InstanceId>,
    mutations: Vec<Mutation>,
    deleted: HashSet<ViewId>,
    stale_hosts: IndexSet<InstanceId>,
    /// Hosts whose next sync resends the full child list.
    resync: HashSet<InstanceId>,
    /// Host each view was detached or deleted from in the current batch.
    removed_from: HashMap<ViewId, InstanceId>,
    retry_deletes: Vec<ViewId>,
    effects: IndexMap<(InstanceId, usize), PendingEffect>,
    pass_dirty: HashSet<InstanceId>,
    visited: HashSet<InstanceId>,
    new_targets: Vec<InstanceId>,
    captured: usize,
    retry_portals: bool,
}

impl<B: PlatformBridge> Reconciler<B> {
    pub(crate) fn new(bridge: B, scheduler: Scheduler, stores: StoreRegistry, config: RendererConfig) -> Self {
        Self {
            arena: SlotMap::with_key(),
            adapter: BridgeAdapter::new(bridge, &config),
            scheduler,
            stores,
            config,
            portals: PortalRegistry::default(),
            interceptors: HashMap::default(),
            roots: IndexMap::new(),
            views: HashMap::default(),
            mutations: Vec::new(),
            deleted: HashSet::default(),
            stale_hosts: IndexSet::new(),
            resync: HashSet::default(),
            removed_from: HashMap::default(),
            retry_deletes: Vec::new(),
            effects: IndexMap::new(),
            pass_dirty: HashSet::default(),
            visited: HashSet::default(),
            new_targets: Vec::new(),
            captured: 0,
            retry_portals: false,
        }
    }

    pub(crate) fn bridge(&self) -> &B {
        self.adapter.bridge()
    }

    pub(crate) fn bridge_mut(&mut self) -> &mut B {
        self.adapter.bridge_mut()
    }

    pub(crate) fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub(crate) fn instance_count(&self) -> usize {
        self.arena.len()
    }

    pub(crate) fn register_interceptor(&mut self, tag: impl Into<String>, interceptor: Box<dyn PropDiffInterceptor>) {
        self.interceptors.insert(tag.into(), interceptor);
    }

    pub(crate) fn tunnel(&mut self, component_type: &str, method: &str, params: &Props) -> Result<PropValue, BridgeError> {
        self.adapter.tunnel(component_type, method, params)
    }

    // Roots

    /// Creates the root for `container`, or replaces its description.
    pub(crate) fn set_root(&mut self, container: ViewId, node: Node) -> InstanceId {
        if let Some(&root) = self.roots.get(&container) {
            if let Some(InstanceKind::Root(instance)) = self.arena.get_mut(root).map(|i| &mut i.kind) {
                instance.desc = node;
            }
            self.scheduler.mark_dirty(root);
            return root;
        }
        self.adapter.reserve_container(container);
        let root = self.arena.insert(Instance {
            parent: None,
            key: None,
            node_type: NodeType::Fragment,
            kind: InstanceKind::Root(RootInstance {
                container,
                desc: node,
                children: Vec::new(),
                native: Vec::new(),
            }),
        });
        self.roots.insert(container, root);
        self.scheduler.mark_dirty(root);
        root
    }

    pub(crate) fn update_root(&mut self, root: InstanceId, node: Node) -> Result<(), UsageError> {
        match self.arena.get_mut(root).map(|i| &mut i.kind) {
            Some(InstanceKind::Root(instance)) => {
                instance.desc = node;
                self.scheduler.mark_dirty(root);
                Ok(())
            }
            _ => Err(UsageError::UnknownRoot),
        }
    }

    /// Unmounts everything rendered into `root` and forgets the container.
    pub(crate) fn remove_root(&mut self, root: InstanceId) -> Result<(), UsageError> {
        let container = match self.arena.get(root).map(|i| &i.kind) {
            Some(InstanceKind::Root(instance)) => instance.container,
            _ => return Err(UsageError::UnknownRoot),
        };
        self.unmount(root, true);
        self.roots.shift_remove(&container);
        self.adapter.release_container(container);
        Ok(())
    }

    pub(crate) fn roots(&self) -> impl Iterator<Item = (ViewId, InstanceId)> + '_ {
        self.roots.iter().map(|(container, root)| (*container, *root))
    }

    // Imperative portals

    pub(crate) fn create_portal(&mut self, target: PortalTargetId, children: Vec<Node>) -> Result<InstanceId, UsageError> {
        if self.portals.imperative(&target).is_some() {
            return Err(UsageError::DuplicatePortal {
                target: target.to_string(),
            });
        }
        let portal = self.arena.insert(Instance {
            parent: None,
            key: None,
            node_type: NodeType::Portal,
            kind: InstanceKind::Portal(PortalInstance {
                target: target.clone(),
                children_desc: children,
                children: Vec::new(),
                host: None,
            }),
        });
        self.portals.insert_imperative(target, portal)?;
        self.portals.add_pending(portal);
        Ok(portal)
    }

    pub(crate) fn update_portal_children(&mut self, target: &str, children: Vec<Node>) -> Result<(), UsageError> {
        let portal = self.imperative_portal(target)?;
        if let Some(InstanceKind::Portal(instance)) = self.arena.get_mut(portal).map(|i| &mut i.kind) {
            instance.children_desc = children;
        }
        self.scheduler.mark_dirty(portal);
        Ok(())
    }

    pub(crate) fn remove_portal(&mut self, target: &str) -> Result<(), UsageError> {
        let portal = self.imperative_portal(target)?;
        self.unmount(portal, true);
        Ok(())
    }

    fn imperative_portal(&self, target: &str) -> Result<InstanceId, UsageError> {
        self.portals.imperative(target).ok_or_else(|| UsageError::UnknownPortal {
            target: target.to_owned(),
        })
    }

    pub(crate) fn portal_target_view(&self, target: &str) -> Option<ViewId> {
        let element = self.portals.target(target)?;
        self.arena.get(element)?.host_view()
    }

    // Commit

    pub(crate) fn commit(&mut self) -> Result<CommitReport, CommitError> {
        let mut report = CommitReport::default();
        if !self.adapter.is_ready() {
            log::debug!("bridge not ready; deferring the commit");
            self.scheduler.defer();
            report.deferred = true;
            return Ok(report);
        }
        self.scheduler.begin_commit();
        self.retry_portals = false;
        self.captured = 0;
        self.mutations.extend(self.retry_deletes.drain(..).map(|view| Mutation::Delete { view }));
        let mut errors: Vec<CommitError> = Vec::new();
        loop {
            self.render_phase(&mut report, &mut errors);
            let mutations = std::mem::take(&mut self.mutations);
            match self.adapter.dispatch(&mutations) {
                Ok(outcome) => {
                    if outcome.dispatched > 0 || !outcome.failed.is_empty() {
                        report.batches += 1;
                    }
                    report.dispatched += outcome.dispatched;
                    for failed in &outcome.failed {
                        self.note_rejected(&failed.mutation, &failed.error);
                    }
                    report.failed.extend(outcome.failed);
                }
                Err(err) => {
                    log::error!("native batch failed: {err}");
                    for mutation in &mutations {
                        self.note_rejected(mutation, &err);
                    }
                    errors.push(CommitError::Batch(err));
                }
            }
            self.deleted.clear();
            self.removed_from.clear();
            self.run_effects(&mut report);
            if !self.scheduler.take_immediate() || !self.scheduler.has_pending() {
                break;
            }
        }
        report.captured = self.captured;
        self.scheduler.end_commit();
        if self.retry_portals {
            self.scheduler.handle().request_flush();
        }
        log::debug!(
            "commit: {} passes, {} walked, {} dispatched, {} failed, {} effects, {} captured",
            report.passes,
            report.walked,
            report.dispatched,
            report.failed.len(),
            report.effects_run,
            report.captured
        );
        match errors.into_iter().next() {
            Some(error) => Err(error),
            None => Ok(report),
        }
    }

    fn render_phase(&mut self, report: &mut CommitReport, errors: &mut Vec<CommitError>) {
        let limit = self.config.max_render_passes;
        let mut passes = 0;
        loop {
            if passes == limit {
                let dropped = self.scheduler.take_dirty();
                log::error!("giving up after {limit} render passes; dropping {} updates", dropped.len());
                errors.push(UsageError::RenderLoop { limit }.into());
                break;
            }
            passes += 1;
            self.run_pass(report, errors);
            if !self.scheduler.has_pending() {
                break;
            }
        }
        report.passes += passes;
    }

    fn run_pass(&mut self, report: &mut CommitReport, errors: &mut Vec<CommitError>) {
        let dirty = self.scheduler.take_dirty();
        let mut ordered: Vec<(usize, InstanceId)> = dirty
            .into_iter()
            .filter(|id| self.arena.contains_key(*id))
            .map(|id| (self.depth(id), id))
            .collect();
        ordered.sort_by_key(|(depth, _)| *depth);
        self.pass_dirty = ordered.iter().map(|(_, id)| *id).collect();
        self.visited.clear();

        for (_, id) in ordered {
            if self.visited.contains(&id) || !self.arena.contains_key(id) {
                continue;
            }
            report.walked += 1;
            if let Err(error) = self.rewalk(id) {
                let parent = self.parent(id);
                self.handle_render_error(parent, error, errors);
            }
        }

        self.register_targets(errors);
        self.resolve_portals(errors);
        self.sync_hosts();
        self.pass_dirty.clear();
    }

    /// Routes an error that escaped a walk: usage errors go to the caller,
    /// render errors to the nearest error boundary at or above `start`.
    fn handle_render_error(&mut self, start: Option<InstanceId>, error: RenderError, errors: &mut Vec<CommitError>) {
        if error.is_usage() {
            log::error!("{error}");
            errors.push(error.into());
            return;
        }
        if let Err(fatal) = self.capture(start, error) {
            log::error!("render failed with no error boundary to catch it: {fatal}");
            errors.push(fatal.into());
        }
    }

    // Effects

    fn queue_effects(&mut self, requests: Vec<EffectRequest>) {
        for request in requests {
            match request {
                EffectRequest::Run(pending) => {
                    let key = (pending.instance, pending.slot);
                    self.effects.shift_remove(&key);
                    self.effects.insert(key, pending);
                }
                EffectRequest::Skip { instance, slot } => {
                    self.effects.shift_remove(&(instance, slot));
                }
            }
        }
    }

    fn run_effects(&mut self, report: &mut CommitReport) {
        let catch = self.config.catch_panics;
        let pending: Vec<PendingEffect> = self.effects.drain(..).map(|(_, effect)| effect).collect();
        for effect in pending {
            let Some(instance) = self.arena.get_mut(effect.instance) else {
                continue;
            };
            let InstanceKind::Component(component) = &mut instance.kind else {
                continue;
            };
            if !component.hooks.is_alive() {
                continue;
            }
            report.effects_run += 1;
            let name = component.ty.name();
            if let Err(err) = component.hooks.run_effect(effect, catch) {
                report.effect_errors += 1;
                log::error!("effect in `{name}` failed: {err}");
            }
        }
    }

    // Tree helpers

    fn parent(&self, id: InstanceId) -> Option<InstanceId> {
        self.arena.get(id).and_then(|instance| instance.parent)
    }

    fn depth(&self, id: InstanceId) -> usize {
        let mut depth = 0;
        let mut current = self.parent(id);
        while let Some(parent) = current {
            depth += 1;
            current = self.parent(parent);
        }
        depth
    }

    /// The host whose native child list contains the views of `id`'s children.
    fn host_for_children_of(&self, id: InstanceId) -> Option<InstanceId> {
        let mut current = Some(id);
        while let Some(candidate) = current {
            let instance = self.arena.get(candidate)?;
            match &instance.kind {
                InstanceKind::Root(_) | InstanceKind::Element(_) => return Some(candidate),
                InstanceKind::Portal(portal) => return portal.host,
                _ => current = instance.parent,
            }
        }
        None
    }

    /// Marks the host of `id`'s children for a native child list sync.
    fn touch(&mut self, id: InstanceId) {
        if let Some(host) = self.host_for_children_of(id) {
            self.stale_hosts.insert(host);
        }
    }

    fn describe(&self, id: InstanceId) -> String {
        self.arena
            .get(id)
            .map(Instance::describe)
            .unwrap_or_else(|| "an unmounted instance".to_owned())
    }

    // Layout

    pub(crate) fn layout_tree(&self, root: InstanceId) -> Option<LayoutNode> {
        let instance = self.arena.get(root)?;
        let InstanceKind::Root(root) = &instance.kind else {
            return None;
        };
        Some(LayoutNode {
            view: root.container,
            view_type: "Root".to_owned(),
            props: Props::new(),
            children: root.native.iter().filter_map(|view| self.layout_node(*view)).collect(),
        })
    }

    fn layout_node(&self, view: ViewId) -> Option<LayoutNode> {
        let id = self.views.get(&view)?;
        let InstanceKind::Element(element) = &self.arena.get(*id)?.kind else {
            return None;
        };
        Some(LayoutNode {
            view,
            view_type: element.tag.to_string(),
            props: element.props.clone(),
            children: element
                .native
                .iter()
                .filter_map(|child| self.layout_node(*child))
                .collect(),
        })
    }

    pub(crate) fn native_children(&self, view: ViewId) -> Option<Vec<ViewId>> {
        if let Some(root) = self.roots.get(&view) {
            return self.arena.get(*root)?.native().map(<[ViewId]>::to_vec);
        }
        let id = self.views.get(&view)?;
        self.arena.get(*id)?.native().map(<[ViewId]>::to_vec)
    }

    pub(crate) fn view_props(&self, view: ViewId) -> Option<(Rc<str>, Props)> {
        let id = self.views.get(&view)?;
        match &self.arena.get(*id)?.kind {
            InstanceKind::Element(element) => Some((element.tag.clone(), element.props.clone())),
            _ => None,
        }
    }
}
