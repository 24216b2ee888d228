use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

// Single receiver, multiple sender channels for talking back to the executor
// from inside a poll. The slot channel has a capacity of 1: a coroutine
// publishes exactly one status per resumption and the executor reads it back
// right after.

pub(crate) struct Receiver<T> {
    channel: Rc<Cell<Option<T>>>,
}

pub(crate) struct Sender<T> {
    channel: Rc<Cell<Option<T>>>,
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            channel: Rc::clone(&self.channel),
        }
    }
}

impl<T> Receiver<T> {
    pub(crate) fn new() -> Self {
        Self {
            channel: Rc::new(Cell::new(None)),
        }
    }

    pub(crate) fn receive(&self) -> Option<T> {
        self.channel.replace(None)
    }

    pub(crate) fn sender(&self) -> Sender<T> {
        Sender {
            channel: Rc::clone(&self.channel),
        }
    }
}

impl<T> Sender<T> {
    pub(crate) fn send(&self, val: T) {
        let prev = self.channel.replace(Some(val));
        debug_assert!(prev.is_none(), "status slot written twice in one resumption");
    }
}

// Unbounded variant for messages that can pile up during a single poll, such
// as a coroutine spawning several children before suspending.

pub(crate) struct QueueReceiver<T> {
    channel: Rc<RefCell<VecDeque<T>>>,
}

pub(crate) struct QueueSender<T> {
    channel: Rc<RefCell<VecDeque<T>>>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            channel: Rc::clone(&self.channel),
        }
    }
}

impl<T> QueueReceiver<T> {
    pub(crate) fn new() -> Self {
        Self {
            channel: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    pub(crate) fn try_recv(&self) -> Option<T> {
        self.channel.borrow_mut().pop_front()
    }

    pub(crate) fn sender(&self) -> QueueSender<T> {
        QueueSender {
            channel: Rc::clone(&self.channel),
        }
    }
}

impl<T> QueueSender<T> {
    pub(crate) fn send(&self, val: T) {
        self.channel.borrow_mut().push_back(val);
    }
}
