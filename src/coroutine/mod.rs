//! The coroutine side of the crate: the [`Scope`](scope::Scope) handed to
//! every coroutine body, the suspension futures built from it, and the
//! wrapper that lets the executor drive a plain `async` block.

use std::pin::Pin;

use tinyset::SetU64;

use crate::clock::ClockKind;
use crate::id::Id;
use crate::time_queue::Phase;

pub mod all;
pub mod any;
pub(crate) mod function_coroutine;
pub mod scope;
pub mod wait;

/// Payload of a coroutine body that unwound instead of returning. Held until
/// whoever awaits the coroutine observes the failure, then rethrown once.
pub(crate) type PanicPayload = Box<dyn std::any::Any + Send + 'static>;

/// What a finished coroutine hands to whoever awaits it.
pub(crate) type Outcome<T> = Result<T, PanicPayload>;

/// A suspendable unit of execution. Resuming advances it to its next
/// suspension point and publishes exactly one [`YieldMsg`].
pub(crate) trait Coroutine {
    fn resume(self: Pin<&mut Self>);
}

pub(crate) type HeapCoro = Pin<Box<dyn Coroutine>>;

/// Whether a suspension future is freshly created or woken back up. The
/// executor only re-polls a coroutine once the condition it yielded on has
/// been met, so a future in the `Halted` state knows its wait is over.
#[derive(PartialEq, Eq, Clone, Copy)]
pub(crate) enum CoroState {
    Halted,
    Running,
}

/// Published by a coroutine after every resumption.
pub(crate) struct YieldMsg {
    pub id: Id,
    pub status: CoroStatus,
}

/// How a coroutine left its latest resumption.
pub(crate) enum CoroStatus {
    /// Suspended; resume during the first update of the `(phase, clock)`
    /// queue whose snapshot time has reached the deadline.
    Wait {
        delay: f64,
        phase: Phase,
        clock: ClockKind,
    },
    /// Suspended until every coroutine in the set has finished.
    All(SetU64),
    /// Suspended until one coroutine in the set finishes; the others are
    /// stopped at that moment.
    Any(SetU64),
    /// Finished. `panicked` is true when the body unwound.
    Done { panicked: bool },
}

/// A freshly spawned coroutine, queued by a [`Scope`](scope::Scope) during a
/// resumption and collected by the executor right after the poll returns.
pub(crate) struct NewCoroutine {
    pub id: Id,
    pub coroutine: HeapCoro,
    /// Owning coroutine; its teardown cancels this one. `None` detaches.
    pub owned_by: Option<Id>,
}
