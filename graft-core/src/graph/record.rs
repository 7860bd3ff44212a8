//! Module Records
//!
//! This module defines the per-module bookkeeping the evaluator owns: the
//! module's identity, its statically declared dependencies, its evaluation
//! state, and the single-resolution completion channel dependents gate on.
//!
//! # Ownership
//!
//! Records are owned exclusively by the evaluator once registered. Nothing
//! outside the evaluator mutates them; hosts observe a module only through
//! its completion signal and the read-only `state` query.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexSet;
use tokio::sync::watch;

use crate::error::Outcome;
use crate::graph::body::{BodyFuture, ModuleBody};

/// Identity of a module, as resolved by the external linker.
///
/// Specifiers are interned behind an `Arc<str>`, so cloning an id is a
/// pointer copy. Equality and hashing follow the specifier text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(Arc<str>);

impl ModuleId {
    /// Create a module id from a specifier.
    pub fn new(specifier: impl AsRef<str>) -> Self {
        Self(Arc::from(specifier.as_ref()))
    }

    /// The specifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ModuleId {
    fn from(specifier: &str) -> Self {
        Self::new(specifier)
    }
}

impl From<String> for ModuleId {
    fn from(specifier: String) -> Self {
        Self(Arc::from(specifier))
    }
}

impl From<&ModuleId> for ModuleId {
    fn from(id: &ModuleId) -> Self {
        id.clone()
    }
}

impl std::borrow::Borrow<str> for ModuleId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Evaluation state of one module.
///
/// The legal transitions are
/// `Unlinked -> Evaluating -> Suspended -> Evaluating -> Evaluated`
/// (a body may suspend and resume any number of times) or a transition
/// to `Errored` from `Unlinked` (skip propagation) or `Evaluating`
/// (body failure). A body that never suspends goes
/// `Evaluating -> Evaluated` synchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalState {
    /// Registered, body not yet started.
    Unlinked,

    /// The body is currently being driven between wait points.
    Evaluating,

    /// The body reached an asynchronous wait point and yielded.
    Suspended,

    /// The body ran to completion, including all awaited work.
    Evaluated,

    /// The body failed, or a dependency's failure propagated here.
    Errored,
}

impl EvalState {
    /// Whether this state is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, EvalState::Evaluated | EvalState::Errored)
    }

    /// Whether the body has been entered at least once.
    pub fn is_started(self) -> bool {
        !matches!(self, EvalState::Unlinked)
    }
}

/// One module's record in the evaluator's registry.
pub struct ModuleRecord {
    /// Identity of this module.
    id: ModuleId,

    /// Dependencies in declaration order, duplicates collapsed.
    dependencies: IndexSet<ModuleId>,

    /// Current evaluation state.
    state: EvalState,

    /// The body, present until the module starts.
    body: Option<ModuleBody>,

    /// The in-flight body future, present while Evaluating or Suspended.
    in_flight: Option<BodyFuture>,

    /// Single-writer side of the completion channel.
    outcome_tx: watch::Sender<Option<Outcome>>,

    /// Template receiver cloned for every completion signal handed out.
    outcome_rx: watch::Receiver<Option<Outcome>>,
}

impl ModuleRecord {
    /// Create a record for a module with the given dependencies and body.
    ///
    /// Dependency order is preserved as declared; duplicate declarations
    /// collapse, so diamond dependencies evaluate their target exactly once.
    pub fn new(
        id: ModuleId,
        dependencies: impl IntoIterator<Item = ModuleId>,
        body: ModuleBody,
    ) -> Self {
        let (outcome_tx, outcome_rx) = watch::channel(None);
        Self {
            id,
            dependencies: dependencies.into_iter().collect(),
            state: EvalState::Unlinked,
            body: Some(body),
            in_flight: None,
            outcome_tx,
            outcome_rx,
        }
    }

    /// The module's identity.
    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    /// Declaration-ordered, deduplicated dependencies.
    pub fn dependencies(&self) -> &IndexSet<ModuleId> {
        &self.dependencies
    }

    /// Current evaluation state.
    pub fn state(&self) -> EvalState {
        self.state
    }

    /// The terminal outcome, once resolved.
    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome_rx.borrow().clone()
    }

    /// A fresh receiver on the completion channel.
    pub(crate) fn subscribe(&self) -> watch::Receiver<Option<Outcome>> {
        self.outcome_rx.clone()
    }

    /// Mark the body as entered (or re-entered after a resume).
    pub(crate) fn mark_evaluating(&mut self) {
        debug_assert!(!self.state.is_terminal());
        self.state = EvalState::Evaluating;
    }

    /// Mark the body as parked at a wait point.
    pub(crate) fn mark_suspended(&mut self) {
        debug_assert_eq!(self.state, EvalState::Evaluating);
        self.state = EvalState::Suspended;
    }

    /// Take the body to start it. Returns `None` once started.
    pub(crate) fn take_body(&mut self) -> Option<ModuleBody> {
        self.body.take()
    }

    /// Park the in-flight future across a suspension.
    pub(crate) fn store_in_flight(&mut self, fut: BodyFuture) {
        self.in_flight = Some(fut);
    }

    /// Take the in-flight future to resume it.
    pub(crate) fn take_in_flight(&mut self) -> Option<BodyFuture> {
        self.in_flight.take()
    }

    /// Resolve the completion channel and enter the matching terminal state.
    ///
    /// The channel resolves exactly once; a second call is a logic error.
    pub(crate) fn resolve(&mut self, outcome: Outcome) {
        debug_assert!(!self.state.is_terminal(), "module resolved twice");
        self.state = match outcome {
            Ok(()) => EvalState::Evaluated,
            Err(_) => EvalState::Errored,
        };
        self.in_flight = None;
        self.body = None;
        // Send only fails with no receivers; we always hold one ourselves.
        let _ = self.outcome_tx.send(Some(outcome));
    }
}

impl fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}
