use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::rc::Rc;

use crate::clock::ClockKind;
use crate::coroutine::scope::Scope;
use crate::executor::Executor;
use crate::handle::Handle;
use crate::id::Id;
use crate::time_queue::Phase;

/// Everything a [`Handle`] may need to reach. Handles hold a weak reference
/// to it, which doubles as the liveness witness: once the scheduler is gone,
/// every handle operation degrades to a defined no-op.
pub(crate) struct Shared {
    pub(crate) exec: RefCell<Executor>,
    /// Handle requests issued while the executor is mid-resumption; applied
    /// between resumptions.
    pub(crate) control: RefCell<VecDeque<Control>>,
}

pub(crate) enum Control {
    Stop(Id),
    Release(Id),
}

/// Single-threaded cooperative coroutine scheduler. The host owns the frame
/// loop and calls [`update`](Scheduler::update) once per frame (or once per
/// phase/clock pair it uses); coroutines whose suspensions have elapsed run
/// inside that call.
///
/// Cloning yields another reference to the same scheduler.
#[derive(Clone)]
pub struct Scheduler {
    pub(crate) shared: Rc<Shared>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            shared: Rc::new(Shared {
                exec: RefCell::new(Executor::new()),
                control: RefCell::new(VecDeque::new()),
            }),
        }
    }

    /// Launch a root coroutine and run it to its first suspension point. A
    /// body without suspension points completes here, and its result can be
    /// taken from the returned handle right away.
    pub fn start<C, F, T>(&self, f: C) -> Handle<T>
    where
        C: FnOnce(Scope) -> F,
        F: Future<Output = T> + 'static,
        T: 'static,
    {
        let (tx, rx) = oneshot::channel();
        let id = self
            .shared
            .exec
            .borrow_mut()
            .start_root(f, tx, &self.shared.control);
        Handle::new(id, Rc::downgrade(&self.shared), rx)
    }

    /// Drain the default queue once.
    pub fn update(&self) {
        self.update_with(Phase::DEFAULT, ClockKind::DEFAULT);
    }

    /// Drain the queue of one `(phase, clock)` pair once. The drain compares
    /// deadlines against a single snapshot of `clock` taken on entry.
    pub fn update_with(&self, phase: Phase, clock: ClockKind) {
        self.shared
            .exec
            .borrow_mut()
            .update(phase, clock, &self.shared.control);
    }

    /// Install (or replace) the time source behind `clock`. The function
    /// returns seconds and must be monotonic.
    pub fn set_clock(&self, clock: ClockKind, f: impl FnMut() -> f64 + 'static) {
        self.shared.exec.borrow_mut().set_clock(clock, f);
    }

    /// True when no coroutine is live.
    pub fn is_idle(&self) -> bool {
        self.shared.exec.borrow().live_coroutines() == 0
    }
}

thread_local! {
    static GLOBAL: Scheduler = Scheduler::new();
}

/// The calling thread's shared scheduler instance. Created lazily on first
/// use and torn down when the thread exits.
pub fn global() -> Scheduler {
    GLOBAL.with(Scheduler::clone)
}
