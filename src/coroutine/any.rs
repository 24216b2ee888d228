use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project::pin_project;

use crate::coroutine::scope::Scope;
use crate::coroutine::{CoroState, CoroStatus};
use crate::handle::{CoroHandle, HandleTuple, Status};

/// Races a tuple of child coroutines; see
/// [`Scope::any`](crate::coroutine::scope::Scope::any).
#[must_use = "futures do nothing unless you `.await` or poll them"]
#[pin_project]
pub struct AwaitAny<'a, H: HandleTuple> {
    scope: &'a mut Scope,
    handles: H,
    state: CoroState,
}

impl<'a, H: HandleTuple> AwaitAny<'a, H> {
    pub(crate) fn new(scope: &'a mut Scope, handles: H) -> Self {
        AwaitAny {
            scope,
            handles,
            state: CoroState::Running,
        }
    }
}

impl<H: HandleTuple> Future for AwaitAny<'_, H> {
    type Output = H::AnyOutput;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context) -> Poll<Self::Output> {
        let this = self.project();
        match this.state {
            // Resumed once a child finished; the executor tore the other
            // children down before scheduling this resumption.
            CoroState::Halted => {
                *this.state = CoroState::Running;
                Poll::Ready(this.handles.take_any())
            }
            CoroState::Running => {
                *this.state = CoroState::Halted;
                let set = this.handles.ids();
                this.scope.yield_status(CoroStatus::Any(set));
                Poll::Pending
            }
        }
    }
}

/// Awaits a single child coroutine; see
/// [`Scope::on`](crate::coroutine::scope::Scope::on).
#[must_use = "futures do nothing unless you `.await` or poll them"]
#[pin_project]
pub struct AwaitOn<'a, T> {
    scope: &'a mut Scope,
    handle: CoroHandle<T>,
    state: CoroState,
}

impl<'a, T> AwaitOn<'a, T> {
    pub(crate) fn new(scope: &'a mut Scope, handle: CoroHandle<T>) -> Self {
        AwaitOn {
            scope,
            handle,
            state: CoroState::Running,
        }
    }
}

impl<T> Future for AwaitOn<'_, T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context) -> Poll<Self::Output> {
        let this = self.project();
        match this.state {
            CoroState::Halted => {
                *this.state = CoroState::Running;
                Poll::Ready(this.handle.take())
            }
            CoroState::Running => match this.handle.update_status() {
                Status::Done => Poll::Ready(this.handle.take()),
                Status::StillWaiting(set) => {
                    *this.state = CoroState::Halted;
                    this.scope.yield_status(CoroStatus::All(set));
                    Poll::Pending
                }
                Status::Canceled => panic!("awaited a coroutine that was already stopped"),
                Status::Consumed => panic!("coroutine result taken twice"),
            },
        }
    }
}
