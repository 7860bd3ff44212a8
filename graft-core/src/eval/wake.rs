//! Wake Plumbing
//!
//! Each started module body is polled with its own waker. When the
//! asynchronous operation a body awaits resolves, the waker enqueues that
//! module's identity on a shared queue and wakes the outer evaluation task;
//! the drive loop then resumes exactly that module. This reproduces
//! "resumption runs to the next wait point atomically" without any
//! per-module task spawning.

use std::collections::VecDeque;
use std::sync::Arc;
use std::task::Waker;

use futures_util::task::ArcWake;
use parking_lot::Mutex;

use crate::graph::ModuleId;

/// Shared queue of woken module identities plus the outer task's waker.
#[derive(Default)]
pub(crate) struct WakeQueue {
    woken: Mutex<VecDeque<ModuleId>>,
    outer: Mutex<Option<Waker>>,
}

impl WakeQueue {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Enqueue a woken module, collapsing duplicate wakes.
    fn push(&self, id: ModuleId) {
        let mut woken = self.woken.lock();
        if !woken.contains(&id) {
            woken.push_back(id);
        }
    }

    /// Take the next woken module, in wake order.
    ///
    /// The drive loop consumes wakes one at a time so that a yield between
    /// completions leaves later wakes queued for the next turn.
    pub(crate) fn pop(&self) -> Option<ModuleId> {
        self.woken.lock().pop_front()
    }

    /// Remember the outer task's waker for the next out-of-band wake.
    pub(crate) fn set_outer(&self, waker: &Waker) {
        let mut outer = self.outer.lock();
        match outer.as_mut() {
            Some(existing) => existing.clone_from(waker),
            None => *outer = Some(waker.clone()),
        }
    }

    /// Wake the outer task, if one is parked.
    fn wake_outer(&self) {
        if let Some(waker) = self.outer.lock().as_ref() {
            waker.wake_by_ref();
        }
    }
}

/// The waker handed to one module's body future.
pub(crate) struct ModuleWaker {
    id: ModuleId,
    queue: Arc<WakeQueue>,
}

impl ModuleWaker {
    /// Build a task waker for the given module.
    pub(crate) fn waker(id: ModuleId, queue: Arc<WakeQueue>) -> Waker {
        futures_util::task::waker(Arc::new(Self { id, queue }))
    }
}

impl ArcWake for ModuleWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.queue.push(arc_self.id.clone());
        arc_self.queue.wake_outer();
    }
}
