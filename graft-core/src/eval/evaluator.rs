//! Module Graph Evaluator
//!
//! The evaluator owns the module registry and drives a dependency graph to
//! full evaluation, honoring top-level suspension inside module bodies.
//!
//! # Algorithm
//!
//! `evaluate(root)` computes the depth-first post-order from the root, then
//! runs a cooperative drive loop inside the returned future's `poll`:
//!
//! 1. Scan the post-order sequence front-to-back for unstarted modules.
//!    A module starts once every dependency is `Evaluated` (back edges into
//!    a cycle are exempt); a module with an `Errored` dependency is resolved
//!    as skipped without running its body.
//! 2. Starting a module polls its body once, immediately. A body that
//!    completes on that first poll evaluates fully inline, so a graph with
//!    no wait points anywhere finishes in a single scheduling pass with no
//!    yields.
//! 3. A body that returns `Pending` is marked `Suspended`; its waker parks
//!    the module identity on the wake queue. Woken modules are re-polled
//!    one at a time in wake order, so a resumed body runs to its next wait
//!    point without interleaving other modules' statements.
//! 4. When no further progress is possible, the loop parks. A cyclic
//!    subgraph in mutual suspension simply never completes: no detection,
//!    no speculative resolution, no timeout.
//!
//! # Single Thread
//!
//! Everything runs on the thread polling the `Evaluation` future. There is
//! no parallel body execution; concurrency is purely the interleaving of
//! suspension and resumption.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::error::{EvalError, Outcome};
use crate::eval::signal::CompletionSignal;
use crate::eval::wake::{ModuleWaker, WakeQueue};
use crate::graph::{post_order, BodyFuture, EvalOrder, EvalState, ModuleBody, ModuleId, ModuleRecord};

/// Whether the drive loop yields to the host between module completions.
///
/// The underlying contract deliberately leaves this open, so it is a
/// configurable policy rather than a fixed behavior. Final states and start
/// order are identical under either choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum YieldPolicy {
    /// Synchronously chained completions run in one poll with no yield.
    /// This is bit-identical with a purely synchronous module system when
    /// no module in the graph ever suspends.
    #[default]
    Inline,

    /// Yield one host event-loop turn after each module body completes.
    YieldBetweenCompletions,
}

/// Readiness of an unstarted module during the start pass.
enum Readiness {
    /// Every dependency accounted for; the body may start.
    Ready,
    /// Some dependency has not completed yet.
    Blocked,
    /// A direct dependency errored; the module must be skipped.
    DepFailed {
        dependency: ModuleId,
        error: EvalError,
    },
}

/// The module graph evaluator.
///
/// Hosts register each module once (identity, resolved dependency list,
/// body) and then call [`evaluate`](Evaluator::evaluate) on a root. The
/// registry persists across `evaluate` calls: a module evaluated by one
/// call is simply observed as complete by the next, so every module's body
/// runs at most once for the lifetime of the evaluator. Dropping the
/// evaluator discards the whole graph; outstanding completion signals then
/// resolve with [`EvalError::Discarded`].
pub struct Evaluator {
    /// All registered modules, keyed by identity.
    registry: IndexMap<ModuleId, ModuleRecord>,

    /// Shared queue of modules woken by their awaited operations.
    wake: Arc<WakeQueue>,

    /// Yield behavior between completions.
    policy: YieldPolicy,
}

impl Evaluator {
    /// Create an evaluator with the default [`YieldPolicy::Inline`].
    pub fn new() -> Self {
        Self::with_policy(YieldPolicy::default())
    }

    /// Create an evaluator with an explicit yield policy.
    pub fn with_policy(policy: YieldPolicy) -> Self {
        Self {
            registry: IndexMap::new(),
            wake: WakeQueue::new(),
            policy,
        }
    }

    /// The configured yield policy.
    pub fn policy(&self) -> YieldPolicy {
        self.policy
    }

    /// Number of registered modules.
    pub fn module_count(&self) -> usize {
        self.registry.len()
    }

    /// Register a module with its resolved dependencies and body.
    ///
    /// Dependencies are in declaration order; duplicates collapse. Returns
    /// the module's completion signal, or
    /// [`EvalError::DuplicateModule`] if the identity is already taken.
    pub fn register<I, D>(
        &mut self,
        id: I,
        dependencies: D,
        body: ModuleBody,
    ) -> Result<CompletionSignal, EvalError>
    where
        I: Into<ModuleId>,
        D: IntoIterator,
        D::Item: Into<ModuleId>,
    {
        let id = id.into();
        if self.registry.contains_key(&id) {
            return Err(EvalError::DuplicateModule(id));
        }

        let record = ModuleRecord::new(
            id.clone(),
            dependencies.into_iter().map(Into::into),
            body,
        );
        let signal = CompletionSignal::new(record.subscribe());
        debug!(module = %id, dependencies = record.dependencies().len(), "module registered");
        self.registry.insert(id, record);
        Ok(signal)
    }

    /// The completion signal of a registered module, by identity.
    pub fn signal(&self, id: &str) -> Option<CompletionSignal> {
        self.registry
            .get(id)
            .map(|record| CompletionSignal::new(record.subscribe()))
    }

    /// The current evaluation state of a registered module.
    pub fn state(&self, id: &str) -> Option<EvalState> {
        self.registry.get(id).map(ModuleRecord::state)
    }

    /// Evaluate the graph reachable from `root`.
    ///
    /// The returned future resolves when the root (and transitively
    /// everything it needs) reaches `Evaluated`, or with the first
    /// propagated error. An unknown root or unknown dependency resolves
    /// with [`EvalError::UnknownModule`] before any body runs.
    pub fn evaluate(&mut self, root: impl Into<ModuleId>) -> Evaluation<'_> {
        let root = root.into();
        let order = post_order(&self.registry, &root);
        if let Ok(order) = &order {
            debug!(root = %root, modules = order.len(), "evaluation started");
        }
        Evaluation {
            evaluator: self,
            root,
            order,
        }
    }

    /// One turn of the drive loop; the body of `Evaluation::poll`.
    fn drive(&mut self, root: &ModuleId, order: &EvalOrder, cx: &mut Context<'_>) -> Poll<Outcome> {
        self.wake.set_outer(cx.waker());

        loop {
            let mut progressed = false;

            // Start pass: unstarted modules, in post-order.
            for idx in 0..order.sequence().len() {
                let id = &order.sequence()[idx];
                if self.registry[id].state() != EvalState::Unlinked {
                    continue;
                }
                match self.readiness(id, idx, order) {
                    Readiness::Blocked => {}
                    Readiness::DepFailed { dependency, error } => {
                        debug!(module = %id, dependency = %dependency, "module skipped after dependency failure");
                        let skip = EvalError::Skipped {
                            module: id.clone(),
                            dependency,
                            source: Arc::new(error),
                        };
                        self.registry[id].resolve(Err(skip));
                        progressed = true;
                    }
                    Readiness::Ready => {
                        let completed = self.start_module(id.clone());
                        progressed = true;
                        if completed && self.policy == YieldPolicy::YieldBetweenCompletions {
                            return self.yield_turn(root, cx);
                        }
                    }
                }
            }

            // Resume pass: woken suspended modules, one at a time in wake
            // order. Consuming wakes singly means a yield between
            // completions leaves later wakes queued for the next turn.
            while let Some(id) = self.wake.pop() {
                if self.registry.get(&id).map(ModuleRecord::state) != Some(EvalState::Suspended) {
                    continue; // stale wake
                }
                if self.resume_module(&id) {
                    progressed = true;
                    if self.policy == YieldPolicy::YieldBetweenCompletions {
                        return self.yield_turn(root, cx);
                    }
                }
            }

            if !progressed {
                break;
            }
        }

        match self.registry[root].outcome() {
            Some(outcome) => Poll::Ready(outcome),
            None => Poll::Pending,
        }
    }

    /// Classify whether an unstarted module can begin its body.
    fn readiness(&self, id: &ModuleId, idx: usize, order: &EvalOrder) -> Readiness {
        let record = &self.registry[id];
        for dep in record.dependencies() {
            let dep_record = &self.registry[dep];
            match dep_record.state() {
                EvalState::Evaluated => {}
                EvalState::Errored => {
                    let error = dep_record
                        .outcome()
                        .and_then(Result::err)
                        .unwrap_or(EvalError::Discarded);
                    return Readiness::DepFailed {
                        dependency: dep.clone(),
                        error,
                    };
                }
                _ => {
                    // A dependency at an equal or higher post-order index
                    // is a back edge into a cycle; it is not waited on.
                    let back_edge = order.index_of(dep).is_some_and(|d| d >= idx);
                    if !back_edge {
                        return Readiness::Blocked;
                    }
                }
            }
        }
        Readiness::Ready
    }

    /// Enter a module's body for the first time.
    ///
    /// Returns `true` if the body reached a terminal state on this poll.
    fn start_module(&mut self, id: ModuleId) -> bool {
        let record = &mut self.registry[&id];
        record.mark_evaluating();
        let Some(body) = record.take_body() else {
            return false;
        };
        debug!(module = %id, "module body started");
        self.poll_body(&id, body.into_future())
    }

    /// Resume a suspended module's body after its awaited operation woke it.
    fn resume_module(&mut self, id: &ModuleId) -> bool {
        let record = &mut self.registry[id];
        let Some(fut) = record.take_in_flight() else {
            return false;
        };
        record.mark_evaluating();
        debug!(module = %id, "module body resumed");
        self.poll_body(id, fut)
    }

    /// Poll one body a single step, atomically with respect to other bodies.
    fn poll_body(&mut self, id: &ModuleId, mut fut: BodyFuture) -> bool {
        let waker = ModuleWaker::waker(id.clone(), Arc::clone(&self.wake));
        let mut body_cx = Context::from_waker(&waker);
        trace!(module = %id, "polling module body");

        match fut.as_mut().poll(&mut body_cx) {
            Poll::Ready(Ok(())) => {
                debug!(module = %id, "module evaluated");
                self.registry[id].resolve(Ok(()));
                true
            }
            Poll::Ready(Err(source)) => {
                debug!(module = %id, error = %source, "module body failed");
                let error = EvalError::Body {
                    module: id.clone(),
                    source,
                };
                self.registry[id].resolve(Err(error));
                true
            }
            Poll::Pending => {
                trace!(module = %id, "module suspended at wait point");
                let record = &mut self.registry[id];
                record.mark_suspended();
                record.store_in_flight(fut);
                false
            }
        }
    }

    /// Finish if the root resolved, otherwise yield one host turn.
    fn yield_turn(&self, root: &ModuleId, cx: &mut Context<'_>) -> Poll<Outcome> {
        if let Some(outcome) = self.registry[root].outcome() {
            return Poll::Ready(outcome);
        }
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("modules", &self.registry.len())
            .field("policy", &self.policy)
            .finish()
    }
}

/// The future returned by [`Evaluator::evaluate`].
///
/// Single-threaded by construction: bodies are not `Send`, so this future
/// must be polled on one thread (a current-thread runtime or a local set).
pub struct Evaluation<'a> {
    evaluator: &'a mut Evaluator,
    root: ModuleId,
    order: Result<EvalOrder, EvalError>,
}

impl Future for Evaluation<'_> {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let order = match &this.order {
            Ok(order) => order,
            Err(error) => return Poll::Ready(Err(error.clone())),
        };
        this.evaluator.drive(&this.root, order, cx)
    }
}

impl std::fmt::Debug for Evaluation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluation")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::task::noop_waker;
    use std::cell::RefCell;
    use std::rc::Rc;

    const NO_DEPS: [&str; 0] = [];

    fn poll_once(evaluation: &mut Evaluation<'_>) -> Poll<Outcome> {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        Pin::new(evaluation).poll(&mut cx)
    }

    /// A body that appends its tag to a shared log when it runs.
    fn logging_body(log: &Rc<RefCell<Vec<&'static str>>>, tag: &'static str) -> ModuleBody {
        let log = Rc::clone(log);
        ModuleBody::from_fn(move || {
            log.borrow_mut().push(tag);
            Ok(())
        })
    }

    #[test]
    fn register_rejects_duplicates() {
        let mut evaluator = Evaluator::new();
        evaluator
            .register("a", NO_DEPS, ModuleBody::empty())
            .unwrap();
        let err = evaluator
            .register("a", NO_DEPS, ModuleBody::empty())
            .unwrap_err();
        assert!(matches!(err, EvalError::DuplicateModule(id) if id.as_str() == "a"));
        assert_eq!(evaluator.module_count(), 1);
    }

    #[test]
    fn unknown_root_resolves_without_running_anything() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut evaluator = Evaluator::new();
        evaluator
            .register("a", NO_DEPS, logging_body(&log, "A"))
            .unwrap();

        let mut evaluation = evaluator.evaluate("ghost");
        match poll_once(&mut evaluation) {
            Poll::Ready(Err(EvalError::UnknownModule(id))) => assert_eq!(id.as_str(), "ghost"),
            other => panic!("expected unknown module, got {other:?}"),
        }
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn sync_chain_completes_in_one_pass() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut evaluator = Evaluator::new();
        evaluator
            .register("b", NO_DEPS, logging_body(&log, "B"))
            .unwrap();
        evaluator
            .register("a", ["b"], logging_body(&log, "A"))
            .unwrap();
        evaluator
            .register("root", ["a"], logging_body(&log, "ROOT"))
            .unwrap();

        let mut evaluation = evaluator.evaluate("root");
        assert!(matches!(poll_once(&mut evaluation), Poll::Ready(Ok(()))));
        assert_eq!(*log.borrow(), vec!["B", "A", "ROOT"]);

        assert_eq!(evaluator.state("root"), Some(EvalState::Evaluated));
        assert_eq!(evaluator.state("a"), Some(EvalState::Evaluated));
        assert_eq!(evaluator.state("b"), Some(EvalState::Evaluated));
    }

    #[test]
    fn signals_resolve_for_every_module() {
        let mut evaluator = Evaluator::new();
        evaluator
            .register("dep", NO_DEPS, ModuleBody::empty())
            .unwrap();
        let root_signal = evaluator
            .register("root", ["dep"], ModuleBody::empty())
            .unwrap();

        let mut evaluation = evaluator.evaluate("root");
        assert!(matches!(poll_once(&mut evaluation), Poll::Ready(Ok(()))));

        assert!(root_signal.is_resolved());
        let dep_signal = evaluator.signal("dep").expect("dep is registered");
        assert!(matches!(dep_signal.try_result(), Some(Ok(()))));
        assert!(evaluator.signal("ghost").is_none());
    }

    #[test]
    fn bodies_run_at_most_once_across_evaluations() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut evaluator = Evaluator::new();
        evaluator
            .register("shared", NO_DEPS, logging_body(&log, "S"))
            .unwrap();
        evaluator
            .register("first", ["shared"], logging_body(&log, "F"))
            .unwrap();
        evaluator
            .register("second", ["shared"], logging_body(&log, "G"))
            .unwrap();

        let mut evaluation = evaluator.evaluate("first");
        assert!(matches!(poll_once(&mut evaluation), Poll::Ready(Ok(()))));
        let mut evaluation = evaluator.evaluate("second");
        assert!(matches!(poll_once(&mut evaluation), Poll::Ready(Ok(()))));

        assert_eq!(*log.borrow(), vec!["S", "F", "G"]);
    }

    #[test]
    fn evaluating_an_already_evaluated_root_is_immediate() {
        let mut evaluator = Evaluator::new();
        evaluator
            .register("root", NO_DEPS, ModuleBody::empty())
            .unwrap();

        let mut evaluation = evaluator.evaluate("root");
        assert!(matches!(poll_once(&mut evaluation), Poll::Ready(Ok(()))));
        let mut evaluation = evaluator.evaluate("root");
        assert!(matches!(poll_once(&mut evaluation), Poll::Ready(Ok(()))));
    }

    #[test]
    fn failing_body_errors_the_module() {
        let mut evaluator = Evaluator::new();
        evaluator
            .register(
                "bad",
                NO_DEPS,
                ModuleBody::from_fn(|| Err(crate::error::BodyError::msg("exploded"))),
            )
            .unwrap();

        let mut evaluation = evaluator.evaluate("bad");
        match poll_once(&mut evaluation) {
            Poll::Ready(Err(EvalError::Body { module, .. })) => assert_eq!(module.as_str(), "bad"),
            other => panic!("expected body error, got {other:?}"),
        }
        assert_eq!(evaluator.state("bad"), Some(EvalState::Errored));
    }

    #[test]
    fn yield_policy_defers_completion_to_later_polls() {
        let mut evaluator = Evaluator::with_policy(YieldPolicy::YieldBetweenCompletions);
        evaluator
            .register("b", NO_DEPS, ModuleBody::empty())
            .unwrap();
        evaluator
            .register("a", ["b"], ModuleBody::empty())
            .unwrap();
        evaluator
            .register("root", ["a"], ModuleBody::empty())
            .unwrap();

        let mut evaluation = evaluator.evaluate("root");
        // One completion per poll: b, then a, then root resolves the call.
        assert!(poll_once(&mut evaluation).is_pending());
        assert!(poll_once(&mut evaluation).is_pending());
        assert!(matches!(poll_once(&mut evaluation), Poll::Ready(Ok(()))));
    }
}
