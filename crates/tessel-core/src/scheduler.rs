use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use indexmap::IndexSet;

use crate::platform::FlushScheduler;
use crate::InstanceId;

/// Urgency of a scheduled update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Priority {
    /// Flush synchronously. Inside a running commit this adds another pass to it.
    Immediate,
    /// Coalesce with every other update requested before the host flushes.
    #[default]
    Normal,
}

type Flusher = Box<dyn Fn()>;

struct SchedulerInner {
    host: Arc<dyn FlushScheduler>,
    dirty: RefCell<IndexSet<InstanceId>>,
    flush_requested: Cell<bool>,
    immediate: Cell<bool>,
    in_commit: Cell<bool>,
    flusher: RefCell<Option<Rc<Flusher>>>,
}

impl SchedulerInner {
    fn new(host: Arc<dyn FlushScheduler>) -> Self {
        Self {
            host,
            dirty: RefCell::new(IndexSet::new()),
            flush_requested: Cell::new(false),
            immediate: Cell::new(false),
            in_commit: Cell::new(false),
            flusher: RefCell::new(None),
        }
    }

    fn request_flush(&self) {
        if self.in_commit.get() || self.flush_requested.replace(true) {
            return;
        }
        self.host.schedule_flush();
    }

    fn schedule_update(&self, id: InstanceId, priority: Priority) {
        self.dirty.borrow_mut().insert(id);
        match priority {
            Priority::Normal => self.request_flush(),
            Priority::Immediate if self.in_commit.get() => self.immediate.set(true),
            Priority::Immediate => {
                let flusher = self.flusher.borrow().clone();
                match flusher {
                    Some(flush) => flush(),
                    None => self.request_flush(),
                }
            }
        }
    }
}

/// Dirty-set and flush bookkeeping shared by a renderer and every hook it hands out.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(host: Arc<dyn FlushScheduler>) -> Self {
        Self {
            inner: Rc::new(SchedulerInner::new(host)),
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle(Rc::downgrade(&self.inner))
    }

    pub fn has_pending(&self) -> bool {
        !self.inner.dirty.borrow().is_empty()
    }

    /// Whether a host flush has been requested and not yet started.
    pub fn flush_requested(&self) -> bool {
        self.inner.flush_requested.get()
    }

    /// Installs the synchronous flush used by [`Priority::Immediate`] updates.
    pub(crate) fn set_flusher(&self, flusher: impl Fn() + 'static) {
        *self.inner.flusher.borrow_mut() = Some(Rc::new(Box::new(flusher)));
    }

    /// Marks `id` dirty without asking the host for a flush; the caller flushes itself.
    pub(crate) fn mark_dirty(&self, id: InstanceId) {
        self.inner.dirty.borrow_mut().insert(id);
    }

    pub(crate) fn take_dirty(&self) -> Vec<InstanceId> {
        self.inner.dirty.borrow_mut().drain(..).collect()
    }

    /// Drops an unmounted instance from the dirty set.
    pub(crate) fn forget(&self, id: InstanceId) {
        self.inner.dirty.borrow_mut().shift_remove(&id);
    }

    /// A commit was held back because the bridge is not ready. The dirty set
    /// stays queued and the next update asks the host for a flush again.
    pub(crate) fn defer(&self) {
        self.inner.flush_requested.set(false);
    }

    /// Asks the host for a flush if updates are queued.
    pub(crate) fn resume(&self) {
        if self.has_pending() {
            self.inner.request_flush();
        }
    }

    pub(crate) fn begin_commit(&self) {
        self.inner.in_commit.set(true);
        self.inner.flush_requested.set(false);
        self.inner.immediate.set(false);
    }

    /// Returns and clears the "immediate update arrived mid-commit" flag.
    pub(crate) fn take_immediate(&self) -> bool {
        self.inner.immediate.replace(false)
    }

    pub(crate) fn end_commit(&self) {
        self.inner.in_commit.set(false);
        self.resume();
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("dirty", &self.inner.dirty.borrow().len())
            .field("flush_requested", &self.inner.flush_requested.get())
            .field("in_commit", &self.inner.in_commit.get())
            .finish()
    }
}

/// Non-owning scheduler reference held by hooks, stores and boundaries.
///
/// Every call is a no-op once the renderer is gone.
#[derive(Clone)]
pub struct SchedulerHandle(Weak<SchedulerInner>);

impl SchedulerHandle {
    pub fn schedule_update(&self, id: InstanceId, priority: Priority) {
        if let Some(inner) = self.0.upgrade() {
            inner.schedule_update(id, priority);
        }
    }

    pub fn request_flush(&self) {
        if let Some(inner) = self.0.upgrade() {
            inner.request_flush();
        }
    }

    pub fn is_dirty(&self, id: InstanceId) -> bool {
        self.0
            .upgrade()
            .map(|inner| inner.dirty.borrow().contains(&id))
            .unwrap_or(false)
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SchedulerHandle").field(&self.is_alive()).finish()
    }
}

/// Passed to an error boundary's fallback. Calling [`BoundaryReset::reset`]
/// clears the captured error and retries the original child on the next flush.
#[derive(Clone, Debug)]
pub struct BoundaryReset {
    pub(crate) scheduler: SchedulerHandle,
    pub(crate) boundary: InstanceId,
    pub(crate) requested: Rc<Cell<bool>>,
}

impl BoundaryReset {
    pub fn reset(&self) {
        self.requested.set(true);
        self.scheduler.schedule_update(self.boundary, Priority::Normal);
    }
}
