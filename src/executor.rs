use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::rc::Rc;

use log::{debug, trace, warn};
use tinyset::SetU64;

use crate::channel::{QueueReceiver, Receiver};
use crate::clock::{ClockKind, ClockRegistry};
use crate::coroutine::function_coroutine::FunctionCoroutine;
use crate::coroutine::scope::Scope;
use crate::coroutine::{CoroStatus, HeapCoro, NewCoroutine, Outcome, YieldMsg};
use crate::handle::State;
use crate::id::{Id, IdSource};
use crate::scheduler::Control;
use crate::time_queue::{Cursor, Phase, TimeQueue, IMMEDIATE};

const ERR_WRONGAWAIT: &str = "A coroutine yielded without notifying the scheduler
of the reason. That is most likely because it awaits a
future which is not part of this library.";

/// A suspension on one time queue. Present exactly while the owning
/// coroutine sits in that queue.
struct WaitRecord {
    phase: Phase,
    clock: ClockKind,
    cursor: Cursor,
}

/// Bookkeeping for a coroutine started from the outside. Kept while the
/// external handle is alive so it can query state after the coroutine
/// finished; erased once it is both released and no longer running.
struct RootEntry {
    state: State,
    released: bool,
}

/// Owns every live coroutine and drives their resumptions. The public face
/// of this type is [`Scheduler`](crate::scheduler::Scheduler).
pub(crate) struct Executor {
    ids: Rc<IdSource>,
    coroutines: HashMap<Id, HeapCoro>,
    roots: HashMap<Id, RootEntry>,
    /// Children started through a coroutine's scope; torn down with it.
    owned: HashMap<Id, SetU64>,
    is_awaited_by: HashMap<Id, Id>,
    waiting_on_all: HashMap<Id, SetU64>,
    waiting_on_any: HashMap<Id, SetU64>,
    waiting: HashMap<Id, WaitRecord>,
    queues: HashMap<(Phase, ClockKind), TimeQueue>,
    clocks: ClockRegistry,
    yield_rx: Receiver<YieldMsg>,
    spawn_rx: QueueReceiver<NewCoroutine>,
}

impl Executor {
    pub(crate) fn new() -> Self {
        Self {
            ids: Rc::new(IdSource::new()),
            coroutines: HashMap::new(),
            roots: HashMap::new(),
            owned: HashMap::new(),
            is_awaited_by: HashMap::new(),
            waiting_on_all: HashMap::new(),
            waiting_on_any: HashMap::new(),
            waiting: HashMap::new(),
            queues: HashMap::new(),
            clocks: ClockRegistry::new(),
            yield_rx: Receiver::new(),
            spawn_rx: QueueReceiver::new(),
        }
    }

    pub(crate) fn set_clock(&mut self, kind: ClockKind, f: impl FnMut() -> f64 + 'static) {
        self.clocks.install(kind, f);
    }

    /// Materialize a root coroutine and run it up to its first suspension
    /// point, together with any children it spawns on the way. A body
    /// without suspension points finishes before this returns.
    pub(crate) fn start_root<F, T>(
        &mut self,
        f: impl FnOnce(Scope) -> F,
        result_tx: oneshot::Sender<Outcome<T>>,
        control: &RefCell<VecDeque<Control>>,
    ) -> Id
    where
        F: Future<Output = T> + 'static,
        T: 'static,
    {
        let id = self.ids.allocate();
        let scope = Scope::new(
            id,
            Rc::clone(&self.ids),
            self.yield_rx.sender(),
            self.spawn_rx.sender(),
        );
        let future = f(scope);
        let coroutine = FunctionCoroutine::new(id, self.yield_rx.sender(), Some(result_tx), future);
        self.coroutines.insert(id, Box::pin(coroutine));
        self.roots.insert(
            id,
            RootEntry {
                state: State::Running,
                released: false,
            },
        );
        debug!("started root coroutine {id:?}");

        let mut ready = VecDeque::from([id]);
        self.run_ready(&mut ready, control);
        id
    }

    /// One drain of the `(phase, clock)` queue: snapshot `now`, then resume
    /// every waiter whose deadline passed, interleaved with the same-tick
    /// work their resumptions trigger (spawned children, resolved
    /// combinators). Waits registered during the drain go to a later update.
    pub(crate) fn update(
        &mut self,
        phase: Phase,
        clock: ClockKind,
        control: &RefCell<VecDeque<Control>>,
    ) {
        let now = self.clocks.now(clock);
        let queue = self.queues.entry((phase, clock)).or_default();
        queue.setup_drain(now);
        trace!("update {phase:?}/{clock:?} at {now}");

        let mut ready = VecDeque::new();
        loop {
            if let Some(id) = ready.pop_front() {
                self.resume(id, &mut ready, control);
                continue;
            }
            let popped = match self.queues.get_mut(&(phase, clock)) {
                Some(queue) => queue.pop_ready(),
                None => None,
            };
            match popped {
                Some((_, id)) => {
                    self.waiting.remove(&id);
                    self.resume(id, &mut ready, control);
                }
                None => break,
            }
        }
    }

    fn run_ready(&mut self, ready: &mut VecDeque<Id>, control: &RefCell<VecDeque<Control>>) {
        while let Some(id) = ready.pop_front() {
            self.resume(id, ready, control);
        }
    }

    /// Resume one coroutine, collect whatever it spawned, and file it
    /// according to the status it yielded. Deferred handle requests are
    /// applied afterwards, between resumptions.
    fn resume(&mut self, id: Id, ready: &mut VecDeque<Id>, control: &RefCell<VecDeque<Control>>) {
        // Torn down earlier in this same pass (a lost race, a stopped root).
        let Some(coroutine) = self.coroutines.get_mut(&id) else {
            return;
        };
        coroutine.as_mut().resume();

        while let Some(new_coro) = self.spawn_rx.try_recv() {
            let NewCoroutine {
                id: child,
                coroutine,
                owned_by,
            } = new_coro;
            self.coroutines.insert(child, coroutine);
            if let Some(owner) = owned_by {
                self.owned.entry(owner).or_default().insert(child.to_bits());
            }
            ready.push_back(child);
        }

        let YieldMsg { id: yielded, status } = self.yield_rx.receive().expect(ERR_WRONGAWAIT);
        debug_assert_eq!(yielded, id);

        match status {
            CoroStatus::Done { panicked } => self.mark_as_done(id, panicked, ready),
            CoroStatus::Wait {
                delay,
                phase,
                clock,
            } => {
                let deadline = if delay <= 0.0 {
                    IMMEDIATE
                } else {
                    self.clocks.now(clock) + delay
                };
                let cursor = self
                    .queues
                    .entry((phase, clock))
                    .or_default()
                    .insert(deadline, id);
                self.waiting.insert(
                    id,
                    WaitRecord {
                        phase,
                        clock,
                        cursor,
                    },
                );
            }
            CoroStatus::All(set) => {
                let mut live = SetU64::new();
                for bits in set {
                    if self.coroutines.contains_key(&Id::from_bits(bits)) {
                        live.insert(bits);
                    }
                }
                if live.is_empty() {
                    // Every child already finished; join on the spot.
                    ready.push_back(id);
                } else {
                    for bits in live.iter() {
                        self.is_awaited_by.insert(Id::from_bits(bits), id);
                    }
                    self.waiting_on_all.insert(id, live);
                }
            }
            CoroStatus::Any(set) => {
                let mut live = SetU64::new();
                let mut finished = false;
                for bits in set {
                    if self.coroutines.contains_key(&Id::from_bits(bits)) {
                        live.insert(bits);
                    } else {
                        finished = true;
                    }
                }
                if finished || live.is_empty() {
                    // The race already has a winner; the rest lose now.
                    for bits in live {
                        self.cancel(Id::from_bits(bits));
                    }
                    ready.push_back(id);
                } else {
                    for bits in live.iter() {
                        self.is_awaited_by.insert(Id::from_bits(bits), id);
                    }
                    self.waiting_on_any.insert(id, live);
                }
            }
        }

        self.drain_control(control);
    }

    /// A coroutine finished. Clean up what it owned, then either record the
    /// terminal state (roots) or notify the awaiting parent (children).
    fn mark_as_done(&mut self, id: Id, panicked: bool, ready: &mut VecDeque<Id>) {
        self.coroutines.remove(&id);

        if let Some(owned) = self.owned.remove(&id) {
            for bits in owned {
                self.cancel(Id::from_bits(bits));
            }
        }

        if let Some(entry) = self.roots.get_mut(&id) {
            entry.state = if panicked {
                State::Failed
            } else {
                State::Succeeded
            };
            if entry.released {
                self.roots.remove(&id);
                if panicked {
                    warn!("detached coroutine {id:?} panicked");
                }
            }
            return;
        }

        if let Some(parent) = self.is_awaited_by.remove(&id) {
            if let Some(mut others) = self.waiting_on_any.remove(&parent) {
                others.remove(id.to_bits());
                // This child won the race; the others are torn down before
                // the parent gets to observe the result.
                for bits in others {
                    let loser = Id::from_bits(bits);
                    self.is_awaited_by.remove(&loser);
                    self.cancel(loser);
                }
                ready.push_back(parent);
            }
            if let Some(others) = self.waiting_on_all.get_mut(&parent) {
                others.remove(id.to_bits());
                if others.is_empty() {
                    self.waiting_on_all.remove(&parent);
                    ready.push_back(parent);
                }
            }
        }
    }

    /// Tear a coroutine down in place: its wait record leaves its queue, and
    /// everything it owns is torn down with it.
    fn cancel(&mut self, id: Id) {
        if self.coroutines.remove(&id).is_none() {
            return;
        }
        trace!("cancelling coroutine {id:?}");

        if let Some(record) = self.waiting.remove(&id) {
            if let Some(queue) = self.queues.get_mut(&(record.phase, record.clock)) {
                queue.remove(record.cursor);
            }
        }

        self.is_awaited_by.remove(&id);
        for set in [
            self.waiting_on_all.remove(&id),
            self.waiting_on_any.remove(&id),
        ]
        .into_iter()
        .flatten()
        {
            for bits in set {
                let child = Id::from_bits(bits);
                if self.is_awaited_by.get(&child) == Some(&id) {
                    self.is_awaited_by.remove(&child);
                }
            }
        }

        if let Some(owned) = self.owned.remove(&id) {
            for bits in owned {
                self.cancel(Id::from_bits(bits));
            }
        }

        if let Some(entry) = self.roots.get_mut(&id) {
            entry.state = State::Stopped;
            if entry.released {
                self.roots.remove(&id);
            }
        }
    }

    /// External cancellation through a handle. Synchronous: by the time this
    /// returns, the coroutine and its whole suspension tree are gone.
    pub(crate) fn stop_root(&mut self, id: Id) {
        let Some(entry) = self.roots.get(&id) else {
            return;
        };
        if entry.state == State::Running {
            debug!("stopping root coroutine {id:?}");
            self.cancel(id);
        }
    }

    /// The external handle let go of the coroutine. The entry survives until
    /// the coroutine stops running, then disappears.
    pub(crate) fn release(&mut self, id: Id) {
        if let Some(entry) = self.roots.get_mut(&id) {
            entry.released = true;
            if entry.state != State::Running {
                self.roots.remove(&id);
            }
        }
    }

    pub(crate) fn root_state(&self, id: Id) -> Option<State> {
        self.roots.get(&id).map(|entry| entry.state)
    }

    fn drain_control(&mut self, control: &RefCell<VecDeque<Control>>) {
        loop {
            let msg = control.borrow_mut().pop_front();
            match msg {
                Some(Control::Stop(id)) => self.stop_root(id),
                Some(Control::Release(id)) => self.release(id),
                None => break,
            }
        }
    }

    // Introspection for the facade and the tests.

    pub(crate) fn live_coroutines(&self) -> usize {
        self.coroutines.len()
    }

    pub(crate) fn pending_waits(&self) -> usize {
        self.queues.values().map(TimeQueue::len).sum()
    }

    pub(crate) fn bookkeeping_empty(&self) -> bool {
        self.owned.is_empty()
            && self.is_awaited_by.is_empty()
            && self.waiting_on_all.is_empty()
            && self.waiting_on_any.is_empty()
            && self.waiting.is_empty()
    }
}
