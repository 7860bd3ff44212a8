//! Evaluation Order
//!
//! Computes the deterministic depth-first post-order walk the evaluator
//! follows: every dependency is visited before its dependent, following
//! dependency declarations in source order.
//!
//! # Cycles
//!
//! The walk neither detects nor rejects cycles. A dependency edge pointing
//! back into the current traversal stack is simply skipped, which places the
//! cycle's entry module after the modules it reaches. The evaluator uses the
//! resulting indices to tell back edges apart from forward edges: for an
//! acyclic edge the dependency always sits at a lower post-order index than
//! its dependent, so a dependency at an equal or higher index must be a back
//! edge and is not waited on before the body starts.
//!
//! # Determinism
//!
//! The walk is iterative (an explicit frame stack, no recursion) and visits
//! dependencies strictly in declaration order, so the same graph always
//! produces the same sequence. Diamond dependencies are visited once; the
//! first path to reach a module claims it.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::error::EvalError;
use crate::graph::record::{ModuleId, ModuleRecord};

/// The evaluation order for one `evaluate` call.
#[derive(Debug, Clone)]
pub struct EvalOrder {
    /// Modules in depth-first post-order from the root.
    sequence: Vec<ModuleId>,

    /// Position of each module in `sequence`.
    index: HashMap<ModuleId, usize>,
}

impl EvalOrder {
    /// Modules in post-order; the root is always last.
    pub fn sequence(&self) -> &[ModuleId] {
        &self.sequence
    }

    /// Position of a module in the sequence, if it is reachable.
    pub fn index_of(&self, id: &ModuleId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Number of modules reachable from the root.
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    /// Whether the order is empty (never true for a valid root).
    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

/// One frame of the iterative depth-first walk.
struct Frame {
    id: ModuleId,
    /// Index of the next dependency to visit.
    next_dep: usize,
}

/// Compute the depth-first post-order from `root` over the registry.
///
/// Fails with [`EvalError::UnknownModule`] if the root or any reachable
/// dependency is not registered; in that case no order is produced and no
/// module state changes.
pub fn post_order(
    registry: &IndexMap<ModuleId, ModuleRecord>,
    root: &ModuleId,
) -> Result<EvalOrder, EvalError> {
    if !registry.contains_key(root) {
        return Err(EvalError::UnknownModule(root.clone()));
    }

    let mut sequence = Vec::new();
    let mut index = HashMap::new();
    let mut discovered = HashSet::new();
    let mut frames = vec![Frame {
        id: root.clone(),
        next_dep: 0,
    }];
    discovered.insert(root.clone());

    while let Some(frame) = frames.last_mut() {
        let record = &registry[&frame.id];

        if let Some(dep) = record.dependencies().get_index(frame.next_dep) {
            frame.next_dep += 1;

            if !registry.contains_key(dep) {
                return Err(EvalError::UnknownModule(dep.clone()));
            }
            // Already-finished modules and back edges are both skipped here;
            // the evaluator distinguishes them by post-order index.
            if discovered.insert(dep.clone()) {
                frames.push(Frame {
                    id: dep.clone(),
                    next_dep: 0,
                });
            }
        } else if let Some(done) = frames.pop() {
            index.insert(done.id.clone(), sequence.len());
            sequence.push(done.id);
        }
    }

    Ok(EvalOrder { sequence, index })
}
