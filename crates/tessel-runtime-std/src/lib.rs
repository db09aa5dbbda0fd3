//! Standard host services backed by Rust's `std` library.
//!
//! This crate provides a concrete [`FlushScheduler`] for hosts that run on
//! a `std` thread. Applications can construct a [`StdHost`] to get a
//! [`Renderer`] wired to a [`StdFlushScheduler`], then either poll
//! [`StdHost::run_pending`] from their event loop or await
//! [`StdHost::next_flush`] from an executor. When a flush finds the bridge
//! not ready the host parks its scheduler, and [`StdHost::bridge_ready`]
//! resumes it.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::task::{Context, Poll, Waker};

use futures_task::ArcWake;
use tessel_core::{
    CommitError, CommitReport, FlushScheduler, PlatformBridge, Renderer, RendererConfig, StoreRegistry,
};

type FlushWaker = Arc<dyn Fn() + Send + Sync + 'static>;

#[derive(Default)]
struct FlushState {
    requested: bool,
    /// Set while the bridge is not ready. Requests are recorded but nobody is woken.
    parked: bool,
    requests: u64,
    task: Option<Waker>,
}

/// Flush scheduler for hosts running the renderer on a `std` thread.
///
/// A request sets a flag and wakes the host, either through a registered
/// callback or through the task awaiting [`StdFlushScheduler::next_flush`].
/// While parked, requests accumulate silently and are handed out on
/// [`StdFlushScheduler::unpark`].
pub struct StdFlushScheduler {
    state: Mutex<FlushState>,
    flush_waker: RwLock<Option<FlushWaker>>,
}

impl StdFlushScheduler {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FlushState::default()),
            flush_waker: RwLock::new(None),
        }
    }

    fn state(&self) -> MutexGuard<'_, FlushState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consumes a pending request. Always `false` while parked.
    pub fn take_flush_request(&self) -> bool {
        let mut state = self.state();
        !state.parked && std::mem::take(&mut state.requested)
    }

    pub fn is_flush_requested(&self) -> bool {
        self.state().requested
    }

    /// Requests received so far, parked ones included.
    pub fn requests(&self) -> u64 {
        self.state().requests
    }

    pub fn is_parked(&self) -> bool {
        self.state().parked
    }

    /// Holds requests back until [`StdFlushScheduler::unpark`].
    pub fn park(&self) {
        self.state().parked = true;
    }

    /// Resumes handing out requests, waking the host if one arrived while parked.
    pub fn unpark(&self) {
        let task = {
            let mut state = self.state();
            if !std::mem::replace(&mut state.parked, false) || !state.requested {
                return;
            }
            state.task.take()
        };
        self.wake(task);
    }

    /// Registers a callback invoked whenever a flush is requested, e.g. to
    /// post a message to the UI thread's event loop.
    pub fn set_flush_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        *self.flush_waker.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(waker));
    }

    pub fn clear_flush_waker(&self) {
        *self.flush_waker.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// A [`Waker`] that requests a flush when woken. Lets async work running
    /// elsewhere poke the renderer without holding a reference to it.
    pub fn waker(self: &Arc<Self>) -> Waker {
        futures_task::waker(Arc::clone(self))
    }

    /// Resolves once an unparked flush request is pending, consuming it.
    pub fn next_flush(self: &Arc<Self>) -> FlushSignal {
        FlushSignal {
            scheduler: Arc::clone(self),
        }
    }

    fn wake(&self, task: Option<Waker>) {
        let callback = self.flush_waker.read().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(callback) = callback {
            callback();
        }
        if let Some(task) = task {
            task.wake();
        }
    }
}

impl Default for StdFlushScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StdFlushScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("StdFlushScheduler")
            .field("requested", &state.requested)
            .field("parked", &state.parked)
            .field("requests", &state.requests)
            .finish()
    }
}

impl FlushScheduler for StdFlushScheduler {
    fn schedule_flush(&self) {
        let task = {
            let mut state = self.state();
            state.requested = true;
            state.requests += 1;
            if state.parked {
                return;
            }
            state.task.take()
        };
        self.wake(task);
    }
}

impl ArcWake for StdFlushScheduler {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.schedule_flush();
    }
}

/// Future returned by [`StdFlushScheduler::next_flush`].
#[derive(Debug)]
pub struct FlushSignal {
    scheduler: Arc<StdFlushScheduler>,
}

impl Future for FlushSignal {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut state = self.scheduler.state();
        if !state.parked && std::mem::take(&mut state.requested) {
            return Poll::Ready(());
        }
        state.task = Some(cx.waker().clone());
        Poll::Pending
    }
}

/// A renderer bundled with the standard flush scheduler.
pub struct StdHost<B: PlatformBridge + 'static> {
    scheduler: Arc<StdFlushScheduler>,
    renderer: Renderer<B>,
}

impl<B: PlatformBridge + 'static> StdHost<B> {
    /// Creates a host with configuration read from the environment.
    pub fn new(bridge: B) -> Self {
        Self::with_config(bridge, RendererConfig::from_env(), StoreRegistry::new())
    }

    pub fn with_config(bridge: B, config: RendererConfig, stores: StoreRegistry) -> Self {
        let scheduler = Arc::new(StdFlushScheduler::new());
        let renderer = Renderer::with_config(bridge, scheduler.clone(), config, stores);
        Self { scheduler, renderer }
    }

    pub fn renderer(&self) -> &Renderer<B> {
        &self.renderer
    }

    /// Returns the scheduler implementation.
    pub fn scheduler(&self) -> Arc<StdFlushScheduler> {
        Arc::clone(&self.scheduler)
    }

    /// Registers a callback to be called when the renderer requests a flush.
    pub fn set_flush_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        self.scheduler.set_flush_waker(waker);
    }

    pub fn clear_flush_waker(&self) {
        self.scheduler.clear_flush_waker();
    }

    /// Flushes if a flush was requested since the last call. A flush the
    /// bridge was not ready for parks the scheduler until
    /// [`StdHost::bridge_ready`].
    pub fn run_pending(&self) -> Result<Option<CommitReport>, CommitError> {
        if !self.scheduler.take_flush_request() {
            return Ok(None);
        }
        let report = self.renderer.flush()?;
        if report.deferred {
            log::debug!("bridge not ready; parking flush requests");
            self.scheduler.park();
        } else {
            log::trace!("host flush: {} mutations dispatched", report.dispatched);
        }
        Ok(Some(report))
    }

    /// Call once the native side is ready again after a deferred flush.
    pub fn bridge_ready(&self) {
        self.scheduler.unpark();
        self.renderer.bridge_ready();
    }

    /// Waits for the next flush request. Pair with [`Renderer::flush`].
    pub fn next_flush(&self) -> FlushSignal {
        self.scheduler.next_flush()
    }
}

impl<B: PlatformBridge + 'static> fmt::Debug for StdHost<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdHost")
            .field("scheduler", &self.scheduler)
            .field("renderer", &self.renderer)
            .finish()
    }
}
