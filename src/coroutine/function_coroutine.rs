use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project::pin_project;

use crate::channel::Sender;
use crate::coroutine::{CoroStatus, Coroutine, Outcome, YieldMsg};
use crate::id::Id;

/// Wraps a user future so the executor can drive it. A resumption polls the
/// future once with a no-op waker; a suspension point inside will have
/// published its status already, while a return (or an unwind, which is
/// caught here) sends the outcome to the owning handle and publishes `Done`.
#[pin_project]
pub(crate) struct FunctionCoroutine<F: Future> {
    #[pin]
    future: F,
    id: Id,
    yield_tx: Sender<YieldMsg>,
    result_tx: Option<oneshot::Sender<Outcome<F::Output>>>,
}

impl<F: Future> FunctionCoroutine<F> {
    pub(crate) fn new(
        id: Id,
        yield_tx: Sender<YieldMsg>,
        result_tx: Option<oneshot::Sender<Outcome<F::Output>>>,
        future: F,
    ) -> Self {
        Self {
            future,
            id,
            yield_tx,
            result_tx,
        }
    }
}

impl<F: Future> Coroutine for FunctionCoroutine<F> {
    fn resume(self: Pin<&mut Self>) {
        let this = self.project();
        let waker = waker::create();
        let mut cx = Context::from_waker(&waker);

        let mut future = this.future;
        let polled = catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx)));

        match polled {
            Ok(Poll::Pending) => {
                // The suspension point published its status during the poll.
            }
            Ok(Poll::Ready(value)) => {
                if let Some(tx) = this.result_tx.take() {
                    let _ = tx.send(Ok(value));
                }
                this.yield_tx.send(YieldMsg {
                    id: *this.id,
                    status: CoroStatus::Done { panicked: false },
                });
            }
            Err(payload) => {
                if let Some(tx) = this.result_tx.take() {
                    let _ = tx.send(Err(payload));
                }
                this.yield_tx.send(YieldMsg {
                    id: *this.id,
                    status: CoroStatus::Done { panicked: true },
                });
            }
        }
    }
}

mod waker {
    use std::task::{RawWaker, RawWakerVTable, Waker};

    pub fn create() -> Waker {
        // Safety: The waker points to a vtable with functions that do nothing.
        // Doing nothing is memory-safe.
        unsafe { Waker::from_raw(RAW_WAKER) }
    }

    const RAW_WAKER: RawWaker = RawWaker::new(std::ptr::null(), &VTABLE);
    const VTABLE: RawWakerVTable = RawWakerVTable::new(clone, do_nothing, do_nothing, do_nothing);

    unsafe fn clone(_: *const ()) -> RawWaker {
        RAW_WAKER
    }
    unsafe fn do_nothing(_: *const ()) {}
}
