//! Error Taxonomy
//!
//! This module defines the two error layers of the evaluator:
//!
//! - `BodyError`: an opaque error produced by a module's own body. The
//!   evaluator never inspects these; it only records and forwards them.
//! - `EvalError`: everything the evaluator itself can report, including a
//!   body failure wrapped with the module that produced it, and the
//!   "skipped" errors handed to modules that never ran because a
//!   dependency failed.
//!
//! # Cloning
//!
//! A module's terminal outcome fans out to every dependent through its
//! completion signal, so errors must be cheaply cloneable. Both types wrap
//! their payload in an `Arc` to make `Clone` a pointer copy.
//!
//! # Skip Chains
//!
//! When `root -> a -> b` fails at `b`, `a` receives
//! `Skipped { module: a, dependency: b }` whose source is `b`'s body error,
//! and `root` receives `Skipped { module: root, dependency: a }` whose
//! source is `a`'s skip error. `origin()` walks this chain back to the
//! failure that started it, so hosts can always name the module that
//! actually broke rather than reporting an unknown failure.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::graph::ModuleId;

/// The terminal outcome of one module's evaluation.
pub type Outcome = Result<(), EvalError>;

/// An error raised by a module body.
///
/// Bodies are host-provided callables; whatever they fail with is wrapped
/// here without interpretation. Use [`BodyError::new`] to wrap a concrete
/// error type, or [`BodyError::msg`] for a plain message.
#[derive(Clone)]
pub struct BodyError(Arc<dyn std::error::Error + Send + Sync + 'static>);

impl BodyError {
    /// Wrap a concrete error value.
    pub fn new<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Arc::new(err))
    }

    /// Create a body error from a plain message.
    pub fn msg(msg: impl Into<String>) -> Self {
        Self(Arc::new(Message(msg.into())))
    }
}

impl fmt::Display for BodyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for BodyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl std::error::Error for BodyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

/// A message-only error payload for [`BodyError::msg`].
#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Message {}

/// Errors reported by the evaluator.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    /// The module's own body failed, either synchronously or after a resume.
    #[error("module `{module}` failed during evaluation")]
    Body {
        /// The module whose body raised the error.
        module: ModuleId,
        /// The error the body raised.
        #[source]
        source: BodyError,
    },

    /// The module never ran because a direct dependency failed.
    #[error("module `{module}` skipped: dependency `{dependency}` failed")]
    Skipped {
        /// The module that was skipped.
        module: ModuleId,
        /// The direct dependency whose failure caused the skip.
        dependency: ModuleId,
        /// The dependency's own terminal error.
        #[source]
        source: Arc<EvalError>,
    },

    /// The root or one of its transitive dependencies is not registered.
    #[error("module not registered: `{0}`")]
    UnknownModule(ModuleId),

    /// A module with this identity is already registered.
    #[error("module already registered: `{0}`")]
    DuplicateModule(ModuleId),

    /// The evaluator was dropped while a completion signal was still awaited.
    #[error("module graph was discarded before evaluation finished")]
    Discarded,
}

impl EvalError {
    /// Walk a chain of skip errors back to the failure that started it.
    ///
    /// For non-skip errors this returns `self`.
    pub fn origin(&self) -> &EvalError {
        let mut err = self;
        while let EvalError::Skipped { source, .. } = err {
            err = source.as_ref();
        }
        err
    }

    /// The module this error is attributed to, if any.
    pub fn module(&self) -> Option<&ModuleId> {
        match self {
            EvalError::Body { module, .. } | EvalError::Skipped { module, .. } => Some(module),
            EvalError::UnknownModule(id) | EvalError::DuplicateModule(id) => Some(id),
            EvalError::Discarded => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_error_from_message() {
        let err = BodyError::msg("boom");
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn body_error_wraps_concrete_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = BodyError::new(io);
        assert_eq!(err.to_string(), "missing");
    }

    #[test]
    fn origin_walks_skip_chain() {
        let b_err = EvalError::Body {
            module: ModuleId::from("b"),
            source: BodyError::msg("b exploded"),
        };
        let a_err = EvalError::Skipped {
            module: ModuleId::from("a"),
            dependency: ModuleId::from("b"),
            source: Arc::new(b_err),
        };
        let root_err = EvalError::Skipped {
            module: ModuleId::from("root"),
            dependency: ModuleId::from("a"),
            source: Arc::new(a_err),
        };

        let origin = root_err.origin();
        match origin {
            EvalError::Body { module, .. } => assert_eq!(module.as_str(), "b"),
            other => panic!("expected body error at origin, got {other:?}"),
        }
    }

    #[test]
    fn skip_error_names_failed_dependency() {
        let err = EvalError::Skipped {
            module: ModuleId::from("root"),
            dependency: ModuleId::from("a"),
            source: Arc::new(EvalError::Body {
                module: ModuleId::from("a"),
                source: BodyError::msg("nope"),
            }),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("root"));
        assert!(rendered.contains("a"));
    }

    #[test]
    fn module_attribution() {
        let err = EvalError::UnknownModule(ModuleId::from("ghost"));
        assert_eq!(err.module().map(ModuleId::as_str), Some("ghost"));
        assert_eq!(EvalError::Discarded.module(), None);
    }
}
