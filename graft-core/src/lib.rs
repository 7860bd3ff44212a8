//! Graft Core
//!
//! This crate provides the core module-graph evaluator for the Graft
//! runtime. It consumes a statically resolved dependency graph (produced by
//! an external parser/linker) plus one asynchronous body per module, and
//! drives the graph to full evaluation while honoring suspension points at
//! top level in module bodies.
//!
//! # Guarantees
//!
//! - A module's body begins only after every statically declared dependency
//!   has reached `Evaluated` (cycle back edges excepted).
//! - Every module's body runs at most once, regardless of how many
//!   dependents share it or how many times `evaluate` is called.
//! - Start order among unrelated modules follows the depth-first post-order
//!   of the graph, never completion order; a suspended module blocks only
//!   its own dependents, never its siblings.
//! - A graph with no wait points anywhere evaluates fully inline in a
//!   single scheduling pass, matching a purely synchronous module system.
//! - Errors propagate through completion signals to every transitive
//!   dependent, without retries; skipped modules name the dependency whose
//!   failure stopped them.
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `graph`: module records, dependency edges, and the deterministic
//!   post-order traversal
//! - `eval`: the evaluator, its wake plumbing, and completion signals
//!
//! # Example
//!
//! ```rust,ignore
//! use graft_core::{Evaluator, ModuleBody};
//!
//! let mut evaluator = Evaluator::new();
//! evaluator.register("./config.mjs", [] as [&str; 0], ModuleBody::new(|| async {
//!     // top-level awaits are legal here
//!     Ok(())
//! }))?;
//! evaluator.register("./main.mjs", ["./config.mjs"], ModuleBody::from_fn(|| Ok(())))?;
//!
//! evaluator.evaluate("./main.mjs").await?;
//! ```

pub mod error;
pub mod eval;
pub mod graph;

pub use error::{BodyError, EvalError, Outcome};
pub use eval::{CompletionSignal, Evaluation, Evaluator, YieldPolicy};
pub use graph::{EvalState, ModuleBody, ModuleId};
