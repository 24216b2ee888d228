use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use crate::channel::{QueueSender, Sender};
use crate::coroutine::all::AwaitAll;
use crate::coroutine::any::{AwaitAny, AwaitOn};
use crate::coroutine::function_coroutine::FunctionCoroutine;
use crate::coroutine::wait::{Wait, WaitUntil, WaitWhile};
use crate::coroutine::{CoroStatus, NewCoroutine, YieldMsg};
use crate::handle::{CoroHandle, HandleTuple};
use crate::id::{Id, IdSource};

/// The first parameter of every coroutine. It is the coroutine's line back to
/// the scheduler: suspension points, child coroutines and combinators are all
/// built from it.
pub struct Scope {
    id: Id,
    ids: Rc<IdSource>,
    yield_tx: Sender<YieldMsg>,
    spawn_tx: QueueSender<NewCoroutine>,
}

impl Scope {
    pub(crate) fn new(
        id: Id,
        ids: Rc<IdSource>,
        yield_tx: Sender<YieldMsg>,
        spawn_tx: QueueSender<NewCoroutine>,
    ) -> Self {
        Self {
            id,
            ids,
            yield_tx,
            spawn_tx,
        }
    }

    /// Scopes are only ever cloned to hand one to a child coroutine; user
    /// code never holds two scopes of the same coroutine.
    fn child_scope(&self, id: Id) -> Scope {
        Scope {
            id,
            ids: Rc::clone(&self.ids),
            yield_tx: self.yield_tx.clone(),
            spawn_tx: self.spawn_tx.clone(),
        }
    }

    pub(crate) fn yield_status(&mut self, status: CoroStatus) {
        self.yield_tx.send(YieldMsg {
            id: self.id,
            status,
        });
    }

    /// Suspends until the next update of the default queue.
    pub fn next_tick(&mut self) -> Wait<'_> {
        Wait::new(self, 0.0)
    }

    /// Suspends for `duration`, measured on the default clock. Resolution is
    /// whatever the host's update cadence is; a delay shorter than one frame
    /// resumes on the next frame.
    pub fn wait(&mut self, duration: Duration) -> Wait<'_> {
        Wait::new(self, duration.as_secs_f64())
    }

    /// Same as [`wait`](Self::wait), but in raw seconds. Useful with custom
    /// clocks whose unit is not wall time.
    pub fn wait_secs(&mut self, delay: f64) -> Wait<'_> {
        Wait::new(self, delay)
    }

    /// Re-checks `pred` on every default tick and resumes once it holds.
    /// Completes without suspending when it already holds.
    pub fn wait_until<P: FnMut() -> bool>(&mut self, pred: P) -> WaitUntil<'_, P> {
        WaitUntil::new(self, pred)
    }

    /// Counterpart of [`wait_until`](Self::wait_until): resumes once `pred`
    /// stops holding.
    pub fn wait_while<P: FnMut() -> bool>(&mut self, pred: P) -> WaitWhile<'_, P> {
        WaitWhile::new(self, pred)
    }

    /// Resolves once every coroutine behind `handles` has finished, yielding
    /// their results as a tuple in argument order regardless of finishing
    /// order. If any child panicked, the first such failure (in argument
    /// order) is rethrown here, after all children completed.
    pub fn all<H: HandleTuple>(&mut self, handles: H) -> AwaitAll<'_, H> {
        AwaitAll::new(self, handles)
    }

    /// Resolves once the first coroutine behind `handles` finishes. The
    /// remaining children are stopped on the spot, before this coroutine
    /// resumes. Yields a tuple of `Option`s with the finisher populated; a
    /// panicked finisher rethrows here.
    pub fn any<H: HandleTuple>(&mut self, handles: H) -> AwaitAny<'_, H> {
        AwaitAny::new(self, handles)
    }

    /// Resolves once the single coroutine behind `handle` finishes, yielding
    /// its result. A panicked child rethrows here.
    pub fn on<T>(&mut self, handle: CoroHandle<T>) -> AwaitOn<'_, T> {
        AwaitOn::new(self, handle)
    }

    /// Start a child coroutine. It first runs when this coroutine reaches
    /// its next suspension point, and is torn down with this coroutine.
    pub fn start<C, F, T>(&mut self, f: C) -> CoroHandle<T>
    where
        C: FnOnce(Scope) -> F,
        F: Future<Output = T> + 'static,
        T: 'static,
    {
        self.spawn(f, Some(self.id))
    }

    /// Start a detached coroutine. It outlives this coroutine and runs to
    /// completion on its own; only scheduler teardown stops it.
    pub fn start_forget<C, F, T>(&mut self, f: C)
    where
        C: FnOnce(Scope) -> F,
        F: Future<Output = T> + 'static,
        T: 'static,
    {
        let _ = self.spawn(f, None);
    }

    fn spawn<C, F, T>(&mut self, f: C, owned_by: Option<Id>) -> CoroHandle<T>
    where
        C: FnOnce(Scope) -> F,
        F: Future<Output = T> + 'static,
        T: 'static,
    {
        let id = self.ids.allocate();
        let (tx, rx) = oneshot::channel();
        let future = f(self.child_scope(id));
        let coroutine = FunctionCoroutine::new(id, self.yield_tx.clone(), Some(tx), future);
        self.spawn_tx.send(NewCoroutine {
            id,
            coroutine: Box::pin(coroutine),
            owned_by,
        });
        CoroHandle::waiting(id, rx)
    }
}
