use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project::pin_project;

use crate::clock::ClockKind;
use crate::coroutine::scope::Scope;
use crate::coroutine::{CoroState, CoroStatus};
use crate::time_queue::Phase;

/// Suspension until a deadline on one `(phase, clock)` queue. A zero delay
/// means the next update of that queue.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Wait<'a> {
    scope: &'a mut Scope,
    delay: f64,
    phase: Phase,
    clock: ClockKind,
    state: CoroState,
}

impl<'a> Wait<'a> {
    pub(crate) fn new(scope: &'a mut Scope, delay: f64) -> Self {
        Wait {
            scope,
            delay,
            phase: Phase::DEFAULT,
            clock: ClockKind::DEFAULT,
            state: CoroState::Running,
        }
    }

    /// Wait in another update pass instead of the default one.
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    /// Measure the delay against another clock.
    pub fn with_clock(mut self, clock: ClockKind) -> Self {
        self.clock = clock;
        self
    }
}

impl Future for Wait<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context) -> Poll<Self::Output> {
        match self.state {
            // The executor only polls again once the deadline has passed.
            CoroState::Halted => {
                self.state = CoroState::Running;
                Poll::Ready(())
            }
            CoroState::Running => {
                self.state = CoroState::Halted;
                let status = CoroStatus::Wait {
                    delay: self.delay,
                    phase: self.phase,
                    clock: self.clock,
                };
                self.scope.yield_status(status);
                Poll::Pending
            }
        }
    }
}

/// Polls a predicate on every default tick until it holds.
#[must_use = "futures do nothing unless you `.await` or poll them"]
#[pin_project]
pub struct WaitUntil<'a, P> {
    scope: &'a mut Scope,
    pred: P,
}

impl<'a, P: FnMut() -> bool> WaitUntil<'a, P> {
    pub(crate) fn new(scope: &'a mut Scope, pred: P) -> Self {
        WaitUntil { scope, pred }
    }
}

impl<P: FnMut() -> bool> Future for WaitUntil<'_, P> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context) -> Poll<Self::Output> {
        let this = self.project();
        if (this.pred)() {
            return Poll::Ready(());
        }
        this.scope.yield_status(CoroStatus::Wait {
            delay: 0.0,
            phase: Phase::DEFAULT,
            clock: ClockKind::DEFAULT,
        });
        Poll::Pending
    }
}

/// Polls a predicate on every default tick until it stops holding.
#[must_use = "futures do nothing unless you `.await` or poll them"]
#[pin_project]
pub struct WaitWhile<'a, P> {
    scope: &'a mut Scope,
    pred: P,
}

impl<'a, P: FnMut() -> bool> WaitWhile<'a, P> {
    pub(crate) fn new(scope: &'a mut Scope, pred: P) -> Self {
        WaitWhile { scope, pred }
    }
}

impl<P: FnMut() -> bool> Future for WaitWhile<'_, P> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context) -> Poll<Self::Output> {
        let this = self.project();
        if !(this.pred)() {
            return Poll::Ready(());
        }
        this.scope.yield_status(CoroStatus::Wait {
            delay: 0.0,
            phase: Phase::DEFAULT,
            clock: ClockKind::DEFAULT,
        });
        Poll::Pending
    }
}
