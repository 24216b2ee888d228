use std::panic::resume_unwind;
use std::rc::Weak;

use oneshot::TryRecvError;
use tinyset::SetU64;

use crate::coroutine::Outcome;
use crate::id::Id;
use crate::scheduler::{Control, Shared};

/// Externally observable lifecycle of a root coroutine.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum State {
    Running,
    Succeeded,
    Failed,
    Stopped,
}

/// In-coroutine view of a child coroutine started with
/// [`Scope::start`](crate::coroutine::scope::Scope::start). Await it through
/// `on`, `all` or `any`; the child itself lives in the scheduler and is torn
/// down together with the coroutine that started it.
pub struct CoroHandle<T> {
    state: HandleState<T>,
}

enum HandleState<T> {
    Waiting {
        id: Id,
        receiver: oneshot::Receiver<Outcome<T>>,
    },
    Done(Outcome<T>),
    Canceled,
    Consumed,
}

/// Where a set of handles currently stands, used by the combinator futures
/// to decide between resolving and suspending.
#[doc(hidden)]
pub enum Status {
    Done,
    StillWaiting(SetU64),
    Canceled,
    Consumed,
}

impl Status {
    fn combine(self, f: impl FnOnce() -> Status) -> Status {
        match self {
            Status::Done => f(),
            Status::StillWaiting(mut waiting) => match f() {
                Status::Done => Status::StillWaiting(waiting),
                Status::StillWaiting(more) => {
                    waiting.extend(more);
                    Status::StillWaiting(waiting)
                }
                status => status,
            },
            _ => self,
        }
    }
}

impl<T> CoroHandle<T> {
    pub(crate) fn waiting(id: Id, receiver: oneshot::Receiver<Outcome<T>>) -> Self {
        Self {
            state: HandleState::Waiting { id, receiver },
        }
    }

    pub(crate) fn update_status(&mut self) -> Status {
        match &mut self.state {
            HandleState::Waiting { id, receiver } => {
                let id = id.to_bits();
                match receiver.try_recv() {
                    Ok(outcome) => {
                        self.state = HandleState::Done(outcome);
                        Status::Done
                    }
                    Err(TryRecvError::Empty) => {
                        let mut set = SetU64::new();
                        set.insert(id);
                        Status::StillWaiting(set)
                    }
                    Err(TryRecvError::Disconnected) => {
                        self.state = HandleState::Canceled;
                        Status::Canceled
                    }
                }
            }
            HandleState::Done(_) => Status::Done,
            HandleState::Canceled => Status::Canceled,
            HandleState::Consumed => Status::Consumed,
        }
    }

    /// Id of the still-running child, if it has neither finished nor been
    /// torn down.
    pub(crate) fn waiting_id(&self) -> Option<Id> {
        match &self.state {
            HandleState::Waiting { id, .. } => Some(*id),
            _ => None,
        }
    }

    /// Take the child's result. Rethrows the child's panic if it failed.
    pub(crate) fn take(&mut self) -> T {
        self.update_status();
        match std::mem::replace(&mut self.state, HandleState::Consumed) {
            HandleState::Done(Ok(value)) => value,
            HandleState::Done(Err(payload)) => resume_unwind(payload),
            HandleState::Waiting { .. } => {
                panic!("coroutine result taken before the coroutine finished")
            }
            HandleState::Canceled => panic!("awaited a coroutine that was already stopped"),
            HandleState::Consumed => panic!("coroutine result taken twice"),
        }
    }

    /// Take the child's result if it finished; `None` if it is still running
    /// or was torn down. Rethrows the child's panic if it failed.
    pub(crate) fn try_take(&mut self) -> Option<T> {
        self.update_status();
        if !matches!(self.state, HandleState::Done(_)) {
            return None;
        }
        match std::mem::replace(&mut self.state, HandleState::Consumed) {
            HandleState::Done(Ok(value)) => Some(value),
            HandleState::Done(Err(payload)) => resume_unwind(payload),
            _ => unreachable!(),
        }
    }
}

/// A tuple of [`CoroHandle`]s awaited as one unit by
/// [`Scope::all`](crate::coroutine::scope::Scope::all) and
/// [`Scope::any`](crate::coroutine::scope::Scope::any). Implemented for
/// tuples up to arity 8; the empty tuple joins immediately.
pub trait HandleTuple {
    /// Tuple of child results, in argument order.
    type Output;
    /// Tuple of `Option`al child results, in argument order.
    type AnyOutput;

    #[doc(hidden)]
    fn update_status(&mut self) -> Status;
    #[doc(hidden)]
    fn take_all(&mut self) -> Self::Output;
    #[doc(hidden)]
    fn take_any(&mut self) -> Self::AnyOutput;
    #[doc(hidden)]
    fn ids(&self) -> SetU64;
}

impl<T> HandleTuple for CoroHandle<T> {
    type Output = T;
    type AnyOutput = Option<T>;

    fn update_status(&mut self) -> Status {
        self.update_status()
    }

    fn take_all(&mut self) -> T {
        self.take()
    }

    fn take_any(&mut self) -> Option<T> {
        self.try_take()
    }

    fn ids(&self) -> SetU64 {
        let mut set = SetU64::new();
        if let Some(id) = self.waiting_id() {
            set.insert(id.to_bits());
        }
        set
    }
}

impl HandleTuple for () {
    type Output = ();
    type AnyOutput = ();

    fn update_status(&mut self) -> Status {
        Status::Done
    }

    fn take_all(&mut self) {}

    fn take_any(&mut self) {}

    fn ids(&self) -> SetU64 {
        SetU64::new()
    }
}

macro_rules! impl_handle_tuple {
    ($first: ident $(, $param: ident)*) => {
        #[allow(non_snake_case)]
        impl<$first: HandleTuple, $($param: HandleTuple),*> HandleTuple for ($first, $($param,)*) {
            type Output = ($first::Output, $($param::Output,)*);
            type AnyOutput = ($first::AnyOutput, $($param::AnyOutput,)*);

            fn update_status(&mut self) -> Status {
                let ($first, $($param,)*) = self;
                $first.update_status()$(.combine(|| $param.update_status()))*
            }

            fn take_all(&mut self) -> Self::Output {
                let ($first, $($param,)*) = self;
                ($first.take_all(), $($param.take_all(),)*)
            }

            fn take_any(&mut self) -> Self::AnyOutput {
                let ($first, $($param,)*) = self;
                ($first.take_any(), $($param.take_any(),)*)
            }

            fn ids(&self) -> SetU64 {
                let ($first, $($param,)*) = self;
                let mut set = $first.ids();
                $(set.extend($param.ids());)*
                set
            }
        }
    };
}

impl_handle_tuple!(H1);
impl_handle_tuple!(H1, H2);
impl_handle_tuple!(H1, H2, H3);
impl_handle_tuple!(H1, H2, H3, H4);
impl_handle_tuple!(H1, H2, H3, H4, H5);
impl_handle_tuple!(H1, H2, H3, H4, H5, H6);
impl_handle_tuple!(H1, H2, H3, H4, H5, H6, H7);
impl_handle_tuple!(H1, H2, H3, H4, H5, H6, H7, H8);

/// Owning reference to a root coroutine started with
/// [`Scheduler::start`](crate::scheduler::Scheduler::start). Move-only;
/// dropping it stops the coroutine. Every operation is a defined no-op (or
/// returns empty) once the scheduler itself is gone.
pub struct Handle<T> {
    id: Id,
    shared: Weak<Shared>,
    receiver: Option<oneshot::Receiver<Outcome<T>>>,
}

impl<T> Handle<T> {
    pub(crate) fn new(id: Id, shared: Weak<Shared>, receiver: oneshot::Receiver<Outcome<T>>) -> Self {
        Self {
            id,
            shared,
            receiver: Some(receiver),
        }
    }

    /// Stop the coroutine now. Its pending waits and every child it owns are
    /// torn down with it. No-op once it reached a terminal state.
    ///
    /// When called from inside a coroutine while the scheduler is mid-update,
    /// the request is applied right after the current resumption.
    pub fn stop(&self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        match shared.exec.try_borrow_mut() {
            Ok(mut exec) => exec.stop_root(self.id),
            Err(_) => shared.control.borrow_mut().push_back(Control::Stop(self.id)),
        };
    }

    /// True once the coroutine can no longer make progress: it returned,
    /// panicked, was stopped, or its scheduler is gone.
    pub fn is_down(&self) -> bool {
        !matches!(self.state(), Some(State::Running))
    }

    /// Current lifecycle state, or `None` when the scheduler is gone.
    pub fn state(&self) -> Option<State> {
        let shared = self.shared.upgrade()?;
        let exec = shared.exec.try_borrow().ok()?;
        exec.root_state(self.id)
    }

    /// Take the coroutine's return value. Yields the value exactly once for
    /// a coroutine that returned; rethrows the captured panic exactly once
    /// for one that failed; returns `None` while it is still running, after
    /// the result was taken, after a stop, or when the scheduler is gone.
    pub fn take_result(&mut self) -> Option<T> {
        self.shared.upgrade()?;
        let receiver = self.receiver.as_ref()?;
        match receiver.try_recv() {
            Ok(outcome) => {
                self.receiver = None;
                match outcome {
                    Ok(value) => Some(value),
                    Err(payload) => resume_unwind(payload),
                }
            }
            // The coroutine was torn down before it could produce a value.
            Err(TryRecvError::Disconnected) => {
                self.receiver = None;
                None
            }
            Err(TryRecvError::Empty) => None,
        }
    }

    /// Give the coroutine up without stopping it: it keeps running to
    /// completion and the scheduler drops its record once it finishes.
    pub fn forget(mut self) {
        if let Some(shared) = self.shared.upgrade() {
            match shared.exec.try_borrow_mut() {
                Ok(mut exec) => exec.release(self.id),
                Err(_) => shared
                    .control
                    .borrow_mut()
                    .push_back(Control::Release(self.id)),
            }
        }
        // Defuse the drop below.
        self.id = Id::INVALID;
    }
}

impl<T> Drop for Handle<T> {
    fn drop(&mut self) {
        if self.id == Id::INVALID {
            return;
        }
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        match shared.exec.try_borrow_mut() {
            Ok(mut exec) => {
                exec.stop_root(self.id);
                exec.release(self.id);
            }
            Err(_) => {
                let mut control = shared.control.borrow_mut();
                control.push_back(Control::Stop(self.id));
                control.push_back(Control::Release(self.id));
            }
        };
    }
}
