use std::cell::Cell;

/// Identifier of a coroutine. `0` is reserved as the invalid sentinel, so a
/// defused handle can be told apart from a live one.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub(crate) struct Id(u64);

impl Id {
    pub(crate) const INVALID: Id = Id(0);

    pub(crate) const fn to_bits(self) -> u64 {
        self.0
    }

    pub(crate) const fn from_bits(bits: u64) -> Self {
        Id(bits)
    }
}

/// Hands out ids, starting at 1. Ids are never reused for the lifetime of the
/// scheduler, so a stale id can never alias a live coroutine.
pub(crate) struct IdSource {
    next: Cell<u64>,
}

impl IdSource {
    pub(crate) fn new() -> Self {
        Self { next: Cell::new(1) }
    }

    pub(crate) fn allocate(&self) -> Id {
        let id = self.next.get();
        self.next.set(id + 1);
        Id(id)
    }
}
