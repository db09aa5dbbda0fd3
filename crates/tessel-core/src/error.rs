use std::any::Any;
use std::fmt;

use thiserror::Error;

use crate::bridge::ViewId;
use crate::Key;

/// Hook variants, used to report order violations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookKind {
    State,
    Effect,
    Memo,
    Ref,
    Store,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookKind::State => "state",
            HookKind::Effect => "effect",
            HookKind::Memo => "memo",
            HookKind::Ref => "ref",
            HookKind::Store => "store",
        };
        f.write_str(name)
    }
}

/// Programmer errors. Never retried, never caught by error boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("hook #{index} in `{component}` was `{previous}` on the previous render but is called as `{requested}` now")]
    HookKindChanged {
        component: &'static str,
        index: usize,
        previous: HookKind,
        requested: HookKind,
    },
    #[error("hook #{index} ({kind}) in `{component}` changed its value type between renders")]
    HookTypeChanged {
        component: &'static str,
        index: usize,
        kind: HookKind,
    },
    #[error("`{component}` called {actual} hooks but called {expected} on the previous render")]
    HookCountChanged {
        component: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("duplicate key {key:#018x} among the children of {parent}")]
    DuplicateKey { key: Key, parent: String },
    #[error("portal target `{target}` is already registered")]
    DuplicatePortalTarget { target: String },
    #[error("a portal for target `{target}` already exists")]
    DuplicatePortal { target: String },
    #[error("no portal exists for target `{target}`")]
    UnknownPortal { target: String },
    #[error("`{tag}` is missing required prop `{prop}`")]
    MissingProp { tag: String, prop: String },
    #[error("root is not mounted")]
    UnknownRoot,
    #[error("updates kept invalidating the tree after {limit} render passes")]
    RenderLoop { limit: usize },
}

/// Failure raised while producing a component's output.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("{message}")]
    Failed { message: String },
    #[error("`{component}` panicked while rendering: {message}")]
    Panicked {
        component: &'static str,
        message: String,
    },
    #[error(transparent)]
    Usage(#[from] UsageError),
}

impl RenderError {
    pub fn failed(message: impl fmt::Display) -> Self {
        RenderError::Failed {
            message: message.to_string(),
        }
    }

    /// Usage errors bypass error boundaries.
    pub fn is_usage(&self) -> bool {
        matches!(self, RenderError::Usage(_))
    }
}

/// Failure inside an effect, an effect cleanup, or a store listener.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EffectError {
    #[error("{0}")]
    Failed(String),
    #[error("panicked: {0}")]
    Panicked(String),
}

impl EffectError {
    pub fn failed(message: impl fmt::Display) -> Self {
        EffectError::Failed(message.to_string())
    }
}

/// Failure reported by the platform bridge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("bridge is not ready")]
    NotReady,
    #[error("view {view} does not exist on the native side")]
    UnknownView { view: ViewId },
    #[error("no batch is open")]
    NoBatch,
    #[error("no tunnel handler for `{component_type}.{method}`")]
    UnknownTunnel {
        component_type: String,
        method: String,
    },
    #[error("{operation} failed: {message}")]
    Failed {
        operation: &'static str,
        message: String,
    },
}

/// Error surfaced by a commit to its caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommitError {
    #[error(transparent)]
    Usage(#[from] UsageError),
    #[error("render failed with no error boundary to catch it: {0}")]
    Render(RenderError),
    #[error("native batch failed: {0}")]
    Batch(BridgeError),
    #[error("renderer is already committing")]
    Reentrant,
}

impl From<RenderError> for CommitError {
    fn from(error: RenderError) -> Self {
        match error {
            RenderError::Usage(usage) => CommitError::Usage(usage),
            other => CommitError::Render(other),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_render_errors_convert_to_usage_commit_errors() {
        let usage = UsageError::UnknownRoot;
        let commit: CommitError = RenderError::from(usage.clone()).into();
        assert_eq!(commit, CommitError::Usage(usage));

        let commit: CommitError = RenderError::failed("boom").into();
        assert!(matches!(commit, CommitError::Render(RenderError::Failed { .. })));
    }

    #[test]
    fn hook_errors_describe_the_slot() {
        let error = UsageError::HookKindChanged {
            component: "Counter",
            index: 1,
            previous: HookKind::State,
            requested: HookKind::Effect,
        };
        assert_eq!(
            error.to_string(),
            "hook #1 in `Counter` was `state` on the previous render but is called as `effect` now"
        );
    }
}
