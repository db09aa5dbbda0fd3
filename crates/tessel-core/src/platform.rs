//! Host integration hooks.
//!
//! The renderer never drives its own event loop. When updates are pending it
//! asks the host, through a [`FlushScheduler`], to call
//! [`crate::Renderer::flush`] at the next idle point. The request must be
//! asynchronous with respect to the caller: implementations record it and
//! return. A flush that finds the bridge not ready is deferred; the host
//! calls [`crate::Renderer::bridge_ready`] once the native side can take
//! batches again.

/// Requests a later flush from the host.
///
/// Implementations must be safe to share across threads so a host can wake
/// its UI thread from elsewhere.
pub trait FlushScheduler: Send + Sync {
    /// Ask the host to call `flush` on the renderer's thread soon.
    fn schedule_flush(&self);
}

/// Scheduler for hosts that flush on their own cadence.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFlushScheduler;

impl FlushScheduler for NoopFlushScheduler {
    fn schedule_flush(&self) {}
}
