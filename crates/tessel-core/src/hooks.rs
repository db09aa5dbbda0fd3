//! Per-instance hook storage and the render-time hook API.
//!
//! A stateful component owns a [`HookList`]: an ordered list of [`Hook`]
//! slots addressed by call order. Every render walks the list from slot zero
//! through a [`RenderContext`]; each `use_*` call claims the next slot. The
//! kind and value type found at a slot must match the call, and the final
//! slot count must match the previous render. Violations are usage errors in
//! strict mode; relaxed mode resets the slot and warns.
//!
//! Effects are not run during render. A render records what it wants to run
//! and the reconciler runs the latest request per slot after the native batch
//! has been dispatched.

use std::any::Any;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::error::{panic_message, EffectError, HookKind, UsageError};
use crate::scheduler::{Priority, SchedulerHandle};
use crate::store::{Store, StoreRegistry, Subscription};
use crate::InstanceId;

pub type EffectResult = Result<Option<Cleanup>, EffectError>;

type EffectFn = Box<dyn FnOnce(EffectScope) -> EffectResult>;

/// Runs `f`, turning a panic into [`EffectError::Panicked`] when `catch` is set.
pub(crate) fn run_guarded<R>(catch: bool, f: impl FnOnce() -> Result<R, EffectError>) -> Result<R, EffectError> {
    if !catch {
        return f();
    }
    panic::catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(EffectError::Panicked(panic_message(payload.as_ref()))))
}

/// Teardown returned by an effect. Runs before the effect re-runs and on unmount.
pub struct Cleanup(Box<dyn FnOnce() -> Result<(), EffectError>>);

impl Cleanup {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Cleanup(Box::new(move || {
            f();
            Ok(())
        }))
    }

    pub fn fallible(f: impl FnOnce() -> Result<(), EffectError> + 'static) -> Self {
        Cleanup(Box::new(f))
    }

    /// Cleanups are always guarded: they may run from `Drop`.
    pub(crate) fn run(self, component: &'static str) {
        if let Err(err) = run_guarded(true, self.0) {
            log::error!("effect cleanup in `{component}` failed: {err}");
        }
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup")
    }
}

/// Handed to every effect run.
#[derive(Clone)]
pub struct EffectScope {
    alive: Rc<Cell<bool>>,
}

impl EffectScope {
    /// Convenience for the common "return a cleanup" case.
    pub fn on_cleanup(&self, f: impl FnOnce() + 'static) -> EffectResult {
        Ok(Some(Cleanup::new(f)))
    }

    /// False once the owning component has unmounted. Deferred work started by
    /// an effect should check this before touching component state.
    pub fn is_mounted(&self) -> bool {
        self.alive.get()
    }

    /// A flag that follows the component's mounted state, for moving into callbacks.
    pub fn mounted_flag(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.alive)
    }
}

impl fmt::Debug for EffectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectScope").field("mounted", &self.alive.get()).finish()
    }
}

struct StateCell<T> {
    value: RefCell<T>,
    owner: InstanceId,
    scheduler: SchedulerHandle,
    alive: Rc<Cell<bool>>,
}

/// Value plus setter returned by [`RenderContext::use_state`].
pub struct StateHandle<T> {
    cell: Rc<StateCell<T>>,
}

impl<T> Clone for StateHandle<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<T: 'static> StateHandle<T> {
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.cell.value.borrow().clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.cell.value.borrow())
    }

    pub fn set(&self, value: T)
    where
        T: PartialEq,
    {
        self.set_with_priority(value, Priority::Normal);
    }

    /// Like [`StateHandle::set`], but flushes synchronously.
    pub fn set_immediate(&self, value: T)
    where
        T: PartialEq,
    {
        self.set_with_priority(value, Priority::Immediate);
    }

    /// Stores `value` right away; schedules the owner only if it changed.
    pub fn set_with_priority(&self, value: T, priority: Priority)
    where
        T: PartialEq,
    {
        {
            let mut current = self.cell.value.borrow_mut();
            if *current == value {
                return;
            }
            *current = value;
        }
        if self.cell.alive.get() {
            self.cell.scheduler.schedule_update(self.cell.owner, priority);
        }
    }

    pub fn update(&self, f: impl FnOnce(&T) -> T)
    where
        T: PartialEq,
    {
        let next = f(&self.cell.value.borrow());
        self.set(next);
    }
}

impl<T: fmt::Debug> fmt::Debug for StateHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StateHandle").field(&self.cell.value.borrow()).finish()
    }
}

/// State driven by a reducer, see [`RenderContext::use_reducer`].
pub struct ReducerHandle<S, A> {
    state: StateHandle<S>,
    reducer: Rc<dyn Fn(&S, A) -> S>,
}

impl<S, A> Clone for ReducerHandle<S, A> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            reducer: Rc::clone(&self.reducer),
        }
    }
}

impl<S: PartialEq + 'static, A> ReducerHandle<S, A> {
    pub fn state(&self) -> S
    where
        S: Clone,
    {
        self.state.get()
    }

    pub fn with<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        self.state.with(f)
    }

    pub fn dispatch(&self, action: A) {
        let next = self.state.with(|state| (self.reducer)(state, action));
        self.state.set(next);
    }
}

/// Mutable box returned by [`RenderContext::use_ref`]. Writes never re-render.
pub struct RefHandle<T> {
    cell: Rc<RefCell<T>>,
}

impl<T> Clone for RefHandle<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<T> RefHandle<T> {
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.cell.borrow().clone()
    }

    pub fn set(&self, value: T) {
        *self.cell.borrow_mut() = value;
    }

    pub fn borrow(&self) -> Ref<'_, T> {
        self.cell.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.cell.borrow_mut()
    }
}

impl<T: fmt::Debug> fmt::Debug for RefHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RefHandle").field(&self.cell.borrow()).finish()
    }
}

pub(crate) struct EffectSlot {
    component: &'static str,
    /// Dependencies captured the last time the effect actually ran.
    last_run: Option<Box<dyn Any>>,
    ran: bool,
    cleanup: Option<Cleanup>,
}

impl EffectSlot {
    fn new(component: &'static str) -> Self {
        Self {
            component,
            last_run: None,
            ran: false,
            cleanup: None,
        }
    }

    fn deps_unchanged<D: PartialEq + 'static>(&self, deps: &D) -> bool {
        self.ran
            && self
                .last_run
                .as_ref()
                .and_then(|last| last.downcast_ref::<D>())
                .is_some_and(|last| last == deps)
    }
}

impl Drop for EffectSlot {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup.run(self.component);
        }
    }
}

struct MemoSlot<T, D> {
    deps: D,
    value: T,
}

pub(crate) struct StoreSlot {
    identity: usize,
    _subscription: Subscription,
}

pub(crate) enum Hook {
    State(Rc<dyn Any>),
    Effect(EffectSlot),
    Memo(Box<dyn Any>),
    Ref(Rc<dyn Any>),
    Store(StoreSlot),
}

impl Hook {
    pub(crate) fn kind(&self) -> HookKind {
        match self {
            Hook::State(_) => HookKind::State,
            Hook::Effect(_) => HookKind::Effect,
            Hook::Memo(_) => HookKind::Memo,
            Hook::Ref(_) => HookKind::Ref,
            Hook::Store(_) => HookKind::Store,
        }
    }
}

/// Ordered hook slots of one component instance.
pub(crate) struct HookList {
    slots: Vec<Hook>,
    committed_len: Option<usize>,
    alive: Rc<Cell<bool>>,
}

impl Default for HookList {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            committed_len: None,
            alive: Rc::new(Cell::new(true)),
        }
    }
}

impl HookList {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn kinds(&self) -> Vec<HookKind> {
        self.slots.iter().map(Hook::kind).collect()
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.get()
    }

    /// Drops slots claimed by a render whose output was discarded.
    pub(crate) fn rollback(&mut self) {
        let keep = self.committed_len.unwrap_or(0);
        self.slots.truncate(keep);
    }

    /// Marks the instance unmounted and releases every slot in order,
    /// running effect cleanups and dropping store subscriptions.
    pub(crate) fn dispose(&mut self) {
        self.alive.set(false);
        for hook in self.slots.drain(..) {
            drop(hook);
        }
    }

    /// Runs one pending effect against its slot.
    pub(crate) fn run_effect(&mut self, pending: PendingEffect, catch: bool) -> Result<(), EffectError> {
        let alive = Rc::clone(&self.alive);
        let Some(Hook::Effect(slot)) = self.slots.get_mut(pending.slot) else {
            return Ok(());
        };
        if let Some(cleanup) = slot.cleanup.take() {
            cleanup.run(slot.component);
        }
        slot.ran = true;
        slot.last_run = pending.deps;
        let run = pending.run;
        let scope = EffectScope { alive };
        let cleanup = run_guarded(catch, move || run(scope))?;
        slot.cleanup = cleanup;
        Ok(())
    }
}

impl Drop for HookList {
    fn drop(&mut self) {
        if self.alive.get() && !self.slots.is_empty() {
            self.dispose();
        }
    }
}

impl fmt::Debug for HookList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookList")
            .field("kinds", &self.kinds())
            .field("committed_len", &self.committed_len)
            .finish()
    }
}

/// An effect run requested by a render, executed after the batch dispatch.
pub(crate) struct PendingEffect {
    pub(crate) instance: InstanceId,
    pub(crate) slot: usize,
    deps: Option<Box<dyn Any>>,
    run: EffectFn,
}

impl fmt::Debug for PendingEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingEffect")
            .field("instance", &self.instance)
            .field("slot", &self.slot)
            .finish()
    }
}

#[derive(Debug)]
pub(crate) enum EffectRequest {
    Run(PendingEffect),
    /// The latest render found the deps unchanged; drop an earlier pending run.
    Skip { instance: InstanceId, slot: usize },
}

/// Result of one render as far as hooks are concerned.
pub(crate) struct RenderOutcome {
    pub(crate) effects: Vec<EffectRequest>,
    pub(crate) violation: Option<UsageError>,
}

enum Claim {
    /// Slot exists with the requested kind.
    Found,
    /// No slot yet at this index; the hook should append one.
    Vacant,
    /// Strict-mode mismatch; return a detached value and keep the stored slot.
    Detached,
}

/// Per-render handle passed to stateful render functions.
pub struct RenderContext<'a> {
    component: &'static str,
    instance: InstanceId,
    hooks: &'a mut HookList,
    cursor: usize,
    scheduler: SchedulerHandle,
    stores: StoreRegistry,
    effects: Vec<EffectRequest>,
    violation: Option<UsageError>,
    strict: bool,
}

impl<'a> RenderContext<'a> {
    pub(crate) fn new(
        component: &'static str,
        instance: InstanceId,
        hooks: &'a mut HookList,
        scheduler: SchedulerHandle,
        stores: StoreRegistry,
        strict: bool,
    ) -> Self {
        Self {
            component,
            instance,
            hooks,
            cursor: 0,
            scheduler,
            stores,
            effects: Vec::new(),
            violation: None,
            strict,
        }
    }

    pub fn component_name(&self) -> &'static str {
        self.component
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance
    }

    /// True during the instance's first render.
    pub fn is_first_render(&self) -> bool {
        self.hooks.committed_len.is_none()
    }

    /// The registry the renderer was built with.
    pub fn stores(&self) -> &StoreRegistry {
        &self.stores
    }

    /// Marks this component dirty without touching any state.
    pub fn schedule_update(&self, priority: Priority) {
        self.scheduler.schedule_update(self.instance, priority);
    }

    pub fn use_state<T: 'static>(&mut self, init: impl FnOnce() -> T) -> StateHandle<T> {
        let index = self.cursor;
        self.cursor += 1;
        match self.claim(index, HookKind::State) {
            Claim::Detached => return StateHandle { cell: self.state_cell(init()) },
            Claim::Vacant => {}
            Claim::Found => {
                if let Hook::State(stored) = &self.hooks.slots[index] {
                    if let Ok(cell) = Rc::clone(stored).downcast::<StateCell<T>>() {
                        return StateHandle { cell };
                    }
                }
                if self.type_changed(index, HookKind::State) {
                    return StateHandle { cell: self.state_cell(init()) };
                }
            }
        }
        let cell = self.state_cell(init());
        self.store_slot(index, Hook::State(cell.clone()));
        StateHandle { cell }
    }

    pub fn use_reducer<S, A, R>(&mut self, reducer: R, init: impl FnOnce() -> S) -> ReducerHandle<S, A>
    where
        S: 'static,
        R: Fn(&S, A) -> S + 'static,
    {
        let state = self.use_state(init);
        ReducerHandle {
            state,
            reducer: Rc::new(reducer),
        }
    }

    /// Runs `effect` after the commit on mount and whenever `deps` differs
    /// from the deps of the last run.
    pub fn use_effect<D, F>(&mut self, deps: D, effect: F)
    where
        D: PartialEq + 'static,
        F: FnOnce(EffectScope) -> EffectResult + 'static,
    {
        let index = self.cursor;
        self.cursor += 1;
        match self.claim(index, HookKind::Effect) {
            Claim::Detached => return,
            Claim::Vacant => self.store_slot(index, Hook::Effect(EffectSlot::new(self.component))),
            Claim::Found => {
                if let Hook::Effect(slot) = &self.hooks.slots[index] {
                    if slot.deps_unchanged(&deps) {
                        self.effects.push(EffectRequest::Skip {
                            instance: self.instance,
                            slot: index,
                        });
                        return;
                    }
                }
            }
        }
        self.effects.push(EffectRequest::Run(PendingEffect {
            instance: self.instance,
            slot: index,
            deps: Some(Box::new(deps)),
            run: Box::new(effect),
        }));
    }

    /// Runs `effect` after every commit that re-rendered this component.
    pub fn use_effect_always<F>(&mut self, effect: F)
    where
        F: FnOnce(EffectScope) -> EffectResult + 'static,
    {
        let index = self.cursor;
        self.cursor += 1;
        match self.claim(index, HookKind::Effect) {
            Claim::Detached => return,
            Claim::Vacant => self.store_slot(index, Hook::Effect(EffectSlot::new(self.component))),
            Claim::Found => {}
        }
        self.effects.push(EffectRequest::Run(PendingEffect {
            instance: self.instance,
            slot: index,
            deps: None,
            run: Box::new(effect),
        }));
    }

    pub fn use_memo<T, D>(&mut self, deps: D, compute: impl FnOnce() -> T) -> T
    where
        T: Clone + 'static,
        D: PartialEq + 'static,
    {
        let index = self.cursor;
        self.cursor += 1;
        match self.claim(index, HookKind::Memo) {
            Claim::Detached => return compute(),
            Claim::Vacant => {}
            Claim::Found => {
                let mut typed = false;
                if let Hook::Memo(stored) = &mut self.hooks.slots[index] {
                    if let Some(slot) = stored.downcast_mut::<MemoSlot<T, D>>() {
                        typed = true;
                        if slot.deps == deps {
                            return slot.value.clone();
                        }
                    }
                }
                if !typed && self.type_changed(index, HookKind::Memo) {
                    return compute();
                }
            }
        }
        let value = compute();
        self.store_slot(
            index,
            Hook::Memo(Box::new(MemoSlot {
                deps,
                value: value.clone(),
            })),
        );
        value
    }

    /// Keeps the same `Rc` to `callback` until `deps` changes.
    pub fn use_callback<F, D>(&mut self, deps: D, callback: F) -> Rc<F>
    where
        F: 'static,
        D: PartialEq + 'static,
    {
        self.use_memo(deps, move || Rc::new(callback))
    }

    pub fn use_ref<T: 'static>(&mut self, init: impl FnOnce() -> T) -> RefHandle<T> {
        let index = self.cursor;
        self.cursor += 1;
        match self.claim(index, HookKind::Ref) {
            Claim::Detached => {
                return RefHandle {
                    cell: Rc::new(RefCell::new(init())),
                }
            }
            Claim::Vacant => {}
            Claim::Found => {
                if let Hook::Ref(stored) = &self.hooks.slots[index] {
                    if let Ok(cell) = Rc::clone(stored).downcast::<RefCell<T>>() {
                        return RefHandle { cell };
                    }
                }
                if self.type_changed(index, HookKind::Ref) {
                    return RefHandle {
                        cell: Rc::new(RefCell::new(init())),
                    };
                }
            }
        }
        let cell = Rc::new(RefCell::new(init()));
        self.store_slot(index, Hook::Ref(cell.clone()));
        RefHandle { cell }
    }

    /// Reads `store` and re-renders this component whenever it notifies.
    pub fn use_store<T: Clone + 'static>(&mut self, store: &Store<T>) -> T {
        let index = self.cursor;
        self.cursor += 1;
        match self.claim(index, HookKind::Store) {
            Claim::Detached => return store.get(),
            Claim::Found => {
                if let Hook::Store(slot) = &self.hooks.slots[index] {
                    if slot.identity == store.identity() {
                        return store.get();
                    }
                }
            }
            Claim::Vacant => {}
        }
        let scheduler = self.scheduler.clone();
        let owner = self.instance;
        let alive = Rc::clone(&self.hooks.alive);
        let subscription = store.subscribe(move |_| {
            if alive.get() {
                scheduler.schedule_update(owner, Priority::Normal);
            }
            Ok(())
        });
        self.store_slot(
            index,
            Hook::Store(StoreSlot {
                identity: store.identity(),
                _subscription: subscription,
            }),
        );
        store.get()
    }

    /// Validates the final hook count and hands the render's requests to the
    /// reconciler. A failed render keeps the previous hook list and drops its
    /// effect requests.
    pub(crate) fn finish(mut self, succeeded: bool) -> RenderOutcome {
        if !succeeded && self.violation.is_none() {
            self.hooks.rollback();
            return RenderOutcome {
                effects: Vec::new(),
                violation: None,
            };
        }
        if self.violation.is_none() {
            if let Some(expected) = self.hooks.committed_len {
                if expected != self.cursor {
                    let error = UsageError::HookCountChanged {
                        component: self.component,
                        expected,
                        actual: self.cursor,
                    };
                    if self.strict {
                        self.violation = Some(error);
                    } else {
                        log::warn!("{error}; keeping the new hook list");
                        self.hooks.slots.truncate(self.cursor);
                    }
                }
            }
        }
        if self.violation.is_some() {
            self.hooks.rollback();
            self.effects.clear();
        } else {
            self.hooks.committed_len = Some(self.cursor);
        }
        RenderOutcome {
            effects: self.effects,
            violation: self.violation,
        }
    }

    fn claim(&mut self, index: usize, requested: HookKind) -> Claim {
        if self.violation.is_some() {
            return Claim::Detached;
        }
        let previous = match self.hooks.slots.get(index) {
            None => return Claim::Vacant,
            Some(hook) if hook.kind() == requested => return Claim::Found,
            Some(hook) => hook.kind(),
        };
        let error = UsageError::HookKindChanged {
            component: self.component,
            index,
            previous,
            requested,
        };
        if self.strict {
            self.violation = Some(error);
            Claim::Detached
        } else {
            log::warn!("{error}; resetting the slot");
            Claim::Vacant
        }
    }

    /// Reports a value-type mismatch at a slot of the right kind. Returns true
    /// when the caller should hand out a detached value.
    fn type_changed(&mut self, index: usize, kind: HookKind) -> bool {
        let error = UsageError::HookTypeChanged {
            component: self.component,
            index,
            kind,
        };
        if self.strict {
            if self.violation.is_none() {
                self.violation = Some(error);
            }
            true
        } else {
            log::warn!("{error}; resetting the slot");
            false
        }
    }

    fn store_slot(&mut self, index: usize, hook: Hook) {
        if index < self.hooks.slots.len() {
            self.hooks.slots[index] = hook;
        } else {
            self.hooks.slots.push(hook);
        }
    }

    fn state_cell<T: 'static>(&self, value: T) -> Rc<StateCell<T>> {
        Rc::new(StateCell {
            value: RefCell::new(value),
            owner: self.instance,
            scheduler: self.scheduler.clone(),
            alive: Rc::clone(&self.hooks.alive),
        })
    }
}

impl fmt::Debug for RenderContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("component", &self.component)
            .field("cursor", &self.cursor)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/hooks_tests.rs"]
mod tests;
