//! Module Graph
//!
//! This module implements the static side of the evaluator: module records,
//! their dependency edges, and the deterministic traversal order.
//!
//! # Overview
//!
//! The graph is a directed graph keyed by module identity:
//!
//! - Nodes are [`ModuleRecord`]s: identity, declaration-ordered dependency
//!   list, evaluation state, body, and completion channel.
//! - Edges are identity references, never structural containment. Records
//!   refer to their dependencies by [`ModuleId`] and the evaluator resolves
//!   them through its registry, so cyclic graphs need no special ownership.
//!
//! # Design Decisions
//!
//! 1. Dependency lists are `IndexSet`s: duplicates collapse (a diamond
//!    evaluates its shared target once) while declaration order is kept,
//!    which is what makes the traversal deterministic.
//!
//! 2. The post-order walk in [`order`] is computed per `evaluate` call over
//!    the registry, rather than cached on the records, because the registry
//!    may grow between calls.

mod body;
mod order;
mod record;

pub use body::{BodyFuture, ModuleBody};
pub use order::{post_order, EvalOrder};
pub use record::{EvalState, ModuleId, ModuleRecord};
