//! Virtual tree reconciliation runtime for the Tessel UI framework.

pub mod bridge;
pub mod config;
pub mod error;
pub mod hash;
pub mod hooks;
pub mod layout;
pub mod node;
pub mod platform;
pub(crate) mod portal;
pub mod props;
pub(crate) mod reconciler;
pub mod renderer;
pub mod scheduler;
pub mod store;

pub use bridge::{
    BridgeAdapter, DispatchOutcome, FailedMutation, Mutation, PlatformBridge, PropDiffInterceptor, ViewId,
};
pub use config::RendererConfig;
pub use error::{BridgeError, CommitError, EffectError, HookKind, RenderError, UsageError};
pub use hooks::{Cleanup, EffectResult, EffectScope, ReducerHandle, RefHandle, RenderContext, StateHandle};
pub use layout::{Frame, FrameMap, LayoutEngine, LayoutNode};
pub use node::{
    BoundaryNode, ComponentNode, ComponentType, ElementNode, FragmentNode, Node, NodeKind, NodeType, PortalNode,
    PortalTargetId, RenderResult,
};
pub use platform::{FlushScheduler, NoopFlushScheduler};
pub use props::{ElementProps, PropChange, PropDiff, PropValue, Props};
pub use reconciler::{CommitReport, InstanceId};
pub use renderer::{Renderer, RootId};
pub use scheduler::{BoundaryReset, Priority, Scheduler, SchedulerHandle};
pub use store::{Store, StoreRegistry, Subscription};

/// Sibling key: the hash of any `Hash` value.
pub type Key = u64;

#[cfg(test)]
#[path = "tests/test_bridge.rs"]
pub(crate) mod test_bridge;

#[cfg(test)]
#[path = "tests/reconciler_tests.rs"]
mod reconciler_tests;

#[cfg(test)]
#[path = "tests/renderer_tests.rs"]
mod renderer_tests;
