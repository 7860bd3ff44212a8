//! Completion Signals
//!
//! A completion signal is the single-resolution future dependents and hosts
//! gate on: it resolves once when its module reaches `Evaluated`, or with an
//! error once the module reaches `Errored`.
//!
//! # Single Writer, Many Readers
//!
//! Signals are clones of a `tokio::sync::watch` receiver whose sender lives
//! in the module's record. Only the evaluator ever writes, exactly once;
//! any number of dependents, bodies, and host diagnostics may hold clones
//! and await the outcome independently.

use std::fmt;

use tokio::sync::watch;

use crate::error::{EvalError, Outcome};

/// A handle to one module's terminal outcome.
#[derive(Clone)]
pub struct CompletionSignal {
    rx: watch::Receiver<Option<Outcome>>,
}

impl CompletionSignal {
    pub(crate) fn new(rx: watch::Receiver<Option<Outcome>>) -> Self {
        Self { rx }
    }

    /// The outcome, if the module has already reached a terminal state.
    pub fn try_result(&self) -> Option<Outcome> {
        self.rx.borrow().clone()
    }

    /// Whether the module has reached a terminal state.
    pub fn is_resolved(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Wait for the module's terminal outcome.
    ///
    /// Resolves with `Ok(())` when the module reaches `Evaluated`, or the
    /// propagated [`EvalError`] when it reaches `Errored`. If the evaluator
    /// is dropped before the module resolves, this returns
    /// [`EvalError::Discarded`].
    pub async fn wait(&mut self) -> Outcome {
        loop {
            if let Some(outcome) = self.rx.borrow_and_update().clone() {
                return outcome;
            }
            if self.rx.changed().await.is_err() {
                // Sender dropped: the graph was discarded, unless the
                // outcome landed just before the drop.
                return self
                    .rx
                    .borrow()
                    .clone()
                    .unwrap_or(Err(EvalError::Discarded));
            }
        }
    }
}

impl fmt::Debug for CompletionSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSignal")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
