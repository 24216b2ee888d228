use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project::pin_project;

use crate::coroutine::scope::Scope;
use crate::coroutine::{CoroState, CoroStatus};
use crate::handle::{HandleTuple, Status};

/// Joins a tuple of child coroutines; see
/// [`Scope::all`](crate::coroutine::scope::Scope::all).
#[must_use = "futures do nothing unless you `.await` or poll them"]
#[pin_project]
pub struct AwaitAll<'a, H: HandleTuple> {
    scope: &'a mut Scope,
    handles: H,
    state: CoroState,
}

impl<'a, H: HandleTuple> AwaitAll<'a, H> {
    pub(crate) fn new(scope: &'a mut Scope, handles: H) -> Self {
        AwaitAll {
            scope,
            handles,
            state: CoroState::Running,
        }
    }
}

impl<H: HandleTuple> Future for AwaitAll<'_, H> {
    type Output = H::Output;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context) -> Poll<Self::Output> {
        let this = self.project();
        match this.state {
            // Only resumed once every child has finished.
            CoroState::Halted => {
                *this.state = CoroState::Running;
                Poll::Ready(this.handles.take_all())
            }
            CoroState::Running => match this.handles.update_status() {
                Status::Done => Poll::Ready(this.handles.take_all()),
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
