//! Evaluation Engine
//!
//! This module implements the dynamic side of the system: the evaluator
//! that drives module bodies, the wake plumbing that routes asynchronous
//! resumptions back to the right module, and the completion signals hosts
//! and dependents gate on.
//!
//! # Concepts
//!
//! ## Evaluator
//!
//! The [`Evaluator`] owns every module record and is the only writer of
//! module state. `evaluate(root)` returns a future that drives the graph
//! reachable from the root to completion.
//!
//! ## Completion Signals
//!
//! Each module has exactly one [`CompletionSignal`], resolved once with the
//! module's terminal outcome. Dependents gate on these signals, never on
//! wall-clock order, and hosts may query them by identity for diagnostics.
//!
//! ## Yield Policy
//!
//! Whether the evaluator yields to the host event loop between
//! synchronously-chained completions is a configurable [`YieldPolicy`],
//! since the contract deliberately leaves both choices legal.

mod evaluator;
mod signal;
mod wake;

pub use evaluator::{Evaluation, Evaluator, YieldPolicy};
pub use signal::CompletionSignal;
