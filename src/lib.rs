//! Cooperative coroutines for update-driven applications.
//!
//! The host owns the frame loop and calls [`Scheduler::update`] once per
//! frame (or once per phase/clock pair it uses). Coroutines are plain
//! `async` functions taking a [`Scope`] as their first parameter; they
//! suspend on frame boundaries or timed deadlines, spawn children, and
//! compose through `all`/`any` with structured teardown.
//!
//! ```
//! use frametick::prelude::*;
//!
//! let scheduler = Scheduler::new();
//! let mut handle = scheduler.start(|mut s: Scope| async move {
//!     s.next_tick().await;
//!     21 * 2
//! });
//!
//! scheduler.update();
//! assert_eq!(handle.take_result(), Some(42));
//! ```
//!
//! [`Scope`]: crate::coroutine::scope::Scope

mod channel;
mod clock;
mod executor;
mod id;
mod time_queue;

pub mod coroutine;
pub mod handle;
pub mod scheduler;

pub use clock::ClockKind;
pub use scheduler::Scheduler;
pub use time_queue::Phase;

pub mod prelude {
    #[doc(hidden)]
    pub use crate::clock::ClockKind;
    #[doc(hidden)]
    pub use crate::coroutine::scope::Scope;
    #[doc(hidden)]
    pub use crate::handle::{CoroHandle, Handle, State};
    #[doc(hidden)]
    pub use crate::scheduler::{global, Scheduler};
    #[doc(hidden)]
    pub use crate::time_queue::Phase;
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::cell::RefCell;
    use std::future::Future;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::pin::Pin;
    use std::rc::Rc;

    use crate::clock::ClockKind;
    use crate::coroutine::scope::Scope;
    use crate::handle::{CoroHandle, Handle, State};
    use crate::scheduler::Scheduler;
    use crate::time_queue::Phase;

    fn delayed_value<T: 'static>(s: &mut Scope, value: T, delay: f64) -> CoroHandle<T> {
        s.start(move |mut s: Scope| async move {
            s.wait_secs(delay).await;
            value
        })
    }

    /// Install a manually driven default clock and return its dial.
    fn manual_clock(scheduler: &Scheduler) -> Rc<Cell<f64>> {
        let time = Rc::new(Cell::new(0.0f64));
        let dial = Rc::clone(&time);
        scheduler.set_clock(ClockKind::DEFAULT, move || dial.get());
        time
    }

    #[test]
    fn single_delayed_value() {
        let scheduler = Scheduler::new();
        let mut handle = scheduler.start(|mut s: Scope| async move {
            let pending = delayed_value(&mut s, 42u32, 0.0);
            s.on(pending).await
        });

        scheduler.update();
        assert!(handle.is_down());
        assert_eq!(handle.state(), Some(State::Succeeded));
        assert_eq!(handle.take_result(), Some(42));
    }

    #[test]
    fn zero_delay_defers_to_next_update() {
        let scheduler = Scheduler::new();
        let count = Rc::new(Cell::new(0u32));
        let seen = Rc::clone(&count);
        let handle = scheduler.start(|mut s: Scope| async move {
            s.next_tick().await;
            seen.set(seen.get() + 1);
            s.next_tick().await;
            seen.set(seen.get() + 2);
        });

        assert_eq!(count.get(), 0);
        scheduler.update();
        assert_eq!(count.get(), 1);
        scheduler.update();
        assert_eq!(count.get(), 3);
        assert!(handle.is_down());
    }

    #[test]
    fn all_preserves_argument_order() {
        let scheduler = Scheduler::new();
        let mut handle = scheduler.start(|mut s: Scope| async move {
            let a = delayed_value(&mut s, 1u32, 0.0);
            let b = delayed_value(&mut s, 2u32, 0.0);
            let c = delayed_value(&mut s, 3u32, 0.0);
            s.all((a, b, c)).await
        });

        scheduler.update();
        assert_eq!(handle.take_result(), Some((1, 2, 3)));
    }

    #[test]
    fn all_of_nothing_joins_synchronously() {
        let scheduler = Scheduler::new();
        let mut handle = scheduler.start(|mut s: Scope| async move { s.all(()).await });
        assert_eq!(handle.take_result(), Some(()));
    }

    #[test]
    fn any_yields_winner_and_stops_losers() {
        let scheduler = Scheduler::new();
        let time = manual_clock(&scheduler);
        let mut handle = scheduler.start(|mut s: Scope| async move {
            let slow = delayed_value(&mut s, 10u32, 0.02);
            let fast = delayed_value(&mut s, 20u32, 0.0);
            s.any((slow, fast)).await
        });

        assert_eq!(scheduler.shared.exec.borrow().pending_waits(), 2);
        time.set(0.0);
        scheduler.update();

        // The loser's wait left its queue the moment the race resolved, and
        // its result channel reports the teardown.
        assert_eq!(handle.take_result(), Some((None, Some(20))));
        assert_eq!(scheduler.shared.exec.borrow().pending_waits(), 0);
        assert!(scheduler.is_idle());
    }

    #[test]
    fn stop_halts_progress_immediately() {
        let scheduler = Scheduler::new();
        let count = Rc::new(Cell::new(0u32));
        let seen = Rc::clone(&count);
        let handle = scheduler.start(|mut s: Scope| async move {
            loop {
                s.next_tick().await;
                seen.set(seen.get() + 1);
            }
        });

        for _ in 0..5 {
            scheduler.update();
        }
        assert_eq!(count.get(), 5);
        assert!(!handle.is_down());

        handle.stop();
        assert!(handle.is_down());
        assert_eq!(handle.state(), Some(State::Stopped));

        scheduler.update();
        assert_eq!(count.get(), 5);
    }

    #[test]
    fn stop_cascades_through_the_suspension_tree() {
        let scheduler = Scheduler::new();
        let handle = scheduler.start(|mut s: Scope| async move {
            let a = s.start(|mut s: Scope| async move {
                s.wait_secs(10.0).await;
            });
            let b = s.start(|mut s: Scope| async move {
                s.wait_secs(20.0).await;
            });
            s.all((a, b)).await;
        });

        {
            let exec = scheduler.shared.exec.borrow();
            assert_eq!(exec.pending_waits(), 2);
            assert_eq!(exec.live_coroutines(), 3);
        }

        handle.stop();
        assert!(handle.is_down());
        {
            let exec = scheduler.shared.exec.borrow();
            assert_eq!(exec.pending_waits(), 0);
            assert_eq!(exec.live_coroutines(), 0);
            assert!(exec.bookkeeping_empty());
        }
    }

    #[test]
    fn dropping_a_handle_stops_the_coroutine() {
        let scheduler = Scheduler::new();
        let count = Rc::new(Cell::new(0u32));
        let seen = Rc::clone(&count);
        {
            let _handle = scheduler.start(|mut s: Scope| async move {
                loop {
                    s.next_tick().await;
                    seen.set(seen.get() + 1);
                }
            });
            scheduler.update();
        }

        assert_eq!(count.get(), 1);
        scheduler.update();
        assert_eq!(count.get(), 1);
        assert!(scheduler.is_idle());
    }

    #[test]
    fn forgotten_coroutine_runs_to_completion() {
        let scheduler = Scheduler::new();
        let count = Rc::new(Cell::new(0u32));
        let seen = Rc::clone(&count);
        scheduler
            .start(|mut s: Scope| async move {
                for _ in 0..3 {
                    s.next_tick().await;
                    seen.set(seen.get() + 1);
                }
            })
            .forget();

        for _ in 0..4 {
            scheduler.update();
        }
        assert_eq!(count.get(), 3);
        assert!(scheduler.is_idle());
    }

    #[test]
    fn take_result_is_one_shot() {
        let scheduler = Scheduler::new();
        let mut handle = scheduler.start(|_s: Scope| async move { 7u32 });

        assert_eq!(handle.state(), Some(State::Succeeded));
        assert_eq!(handle.take_result(), Some(7));
        assert_eq!(handle.take_result(), None);
        assert!(handle.is_down());
    }

    #[test]
    fn take_result_while_running_is_empty() {
        let scheduler = Scheduler::new();
        let mut handle = scheduler.start(|mut s: Scope| async move {
            s.next_tick().await;
            1u32
        });
        assert_eq!(handle.take_result(), None);
        scheduler.update();
        assert_eq!(handle.take_result(), Some(1));
    }

    #[test]
    fn captured_panic_rethrows_once() {
        let scheduler = Scheduler::new();
        let mut handle: Handle<()> = scheduler.start(|mut s: Scope| async move {
            s.next_tick().await;
            panic!("boom");
        });

        scheduler.update();
        assert_eq!(handle.state(), Some(State::Failed));

        let unwind = catch_unwind(AssertUnwindSafe(|| handle.take_result()));
        let payload = unwind.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"boom"));

        assert_eq!(handle.take_result(), None);
        assert!(handle.is_down());
    }

    #[test]
    fn all_joins_before_rethrowing_a_failure() {
        let scheduler = Scheduler::new();
        let sibling_done = Rc::new(Cell::new(false));
        let done = Rc::clone(&sibling_done);
        let mut handle: Handle<()> = scheduler.start(|mut s: Scope| async move {
            let failing = s.start(|mut s: Scope| async move {
                s.next_tick().await;
                panic!("child failed");
            });
            let steady = s.start(|mut s: Scope| async move {
                for _ in 0..2 {
                    s.next_tick().await;
                }
                done.set(true);
            });
            s.all((failing, steady)).await;
        });

        scheduler.update();
        // One child already failed, but the join waits for its sibling.
        assert!(!handle.is_down());
        scheduler.update();
        assert!(sibling_done.get());
        assert_eq!(handle.state(), Some(State::Failed));

        let unwind = catch_unwind(AssertUnwindSafe(|| handle.take_result()));
        assert_eq!(unwind.unwrap_err().downcast_ref::<&str>(), Some(&"child failed"));
    }

    #[test]
    fn any_rethrows_a_winning_failure() {
        let scheduler = Scheduler::new();
        let mut handle: Handle<()> = scheduler.start(|mut s: Scope| async move {
            let doomed = s.start(|mut s: Scope| async move {
                s.next_tick().await;
                panic!("lost anyway");
            });
            let slow = s.start(|mut s: Scope| async move {
                for _ in 0..10 {
                    s.next_tick().await;
                }
            });
            s.any((doomed, slow)).await;
        });

        scheduler.update();
        assert_eq!(handle.state(), Some(State::Failed));
        let unwind = catch_unwind(AssertUnwindSafe(|| handle.take_result()));
        assert_eq!(unwind.unwrap_err().downcast_ref::<&str>(), Some(&"lost anyway"));
        assert!(scheduler.is_idle());
    }

    #[test]
    fn distinct_deadlines_resume_in_order() {
        let scheduler = Scheduler::new();
        let time = manual_clock(&scheduler);
        let order = Rc::new(RefCell::new(Vec::new()));

        for (tag, delay) in [(0u32, 0.3), (1, 0.1), (2, 0.2)] {
            let order = Rc::clone(&order);
            scheduler
                .start(move |mut s: Scope| async move {
                    s.wait_secs(delay).await;
                    order.borrow_mut().push(tag);
                })
                .forget();
        }

        time.set(1.0);
        scheduler.update();
        assert_eq!(*order.borrow(), vec![1, 2, 0]);
    }

    #[test]
    fn equal_deadlines_resume_in_start_order() {
        let scheduler = Scheduler::new();
        let time = manual_clock(&scheduler);
        let order = Rc::new(RefCell::new(Vec::new()));

        for tag in 0..4u32 {
            let order = Rc::clone(&order);
            scheduler
                .start(move |mut s: Scope| async move {
                    s.wait_secs(0.5).await;
                    order.borrow_mut().push(tag);
                })
                .forget();
        }

        time.set(0.5);
        scheduler.update();
        assert_eq!(*order.borrow(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn phases_drain_independently() {
        const POST: Phase = Phase(1);
        let scheduler = Scheduler::new();
        let count = Rc::new(Cell::new(0u32));
        let seen = Rc::clone(&count);
        let handle = scheduler.start(|mut s: Scope| async move {
            s.next_tick().with_phase(POST).await;
            seen.set(seen.get() + 1);
        });

        scheduler.update();
        scheduler.update();
        assert_eq!(count.get(), 0);

        scheduler.update_with(POST, ClockKind::DEFAULT);
        assert_eq!(count.get(), 1);
        assert!(handle.is_down());
    }

    #[test]
    fn custom_clock_drives_timed_waits() {
        const GAME: ClockKind = ClockKind(1);
        let scheduler = Scheduler::new();
        let time = Rc::new(Cell::new(0.0f64));
        let dial = Rc::clone(&time);
        scheduler.set_clock(GAME, move || dial.get());

        let done = Rc::new(Cell::new(false));
        let seen = Rc::clone(&done);
        scheduler
            .start(|mut s: Scope| async move {
                s.wait_secs(5.0).with_clock(GAME).await;
                seen.set(true);
            })
            .forget();

        scheduler.update_with(Phase::DEFAULT, GAME);
        assert!(!done.get());

        time.set(4.9);
        scheduler.update_with(Phase::DEFAULT, GAME);
        assert!(!done.get());

        time.set(5.1);
        scheduler.update_with(Phase::DEFAULT, GAME);
        assert!(done.get());
    }

    #[test]
    fn wait_until_polls_every_tick() {
        let scheduler = Scheduler::new();
        let flag = Rc::new(Cell::new(false));
        let probe = Rc::clone(&flag);
        let done = Rc::new(Cell::new(false));
        let seen = Rc::clone(&done);
        scheduler
            .start(|mut s: Scope| async move {
                s.wait_until(move || probe.get()).await;
                seen.set(true);
            })
            .forget();

        for _ in 0..3 {
            scheduler.update();
        }
        assert!(!done.get());

        flag.set(true);
        scheduler.update();
        assert!(done.get());
    }

    #[test]
    fn wait_until_completes_synchronously_when_already_true() {
        let scheduler = Scheduler::new();
        let mut handle = scheduler.start(|mut s: Scope| async move {
            s.wait_until(|| true).await;
            1u32
        });
        assert_eq!(handle.take_result(), Some(1));
    }

    #[test]
    fn wait_while_holds_until_predicate_clears() {
        let scheduler = Scheduler::new();
        let busy = Rc::new(Cell::new(true));
        let probe = Rc::clone(&busy);
        let done = Rc::new(Cell::new(false));
        let seen = Rc::clone(&done);
        scheduler
            .start(|mut s: Scope| async move {
                s.wait_while(move || probe.get()).await;
                seen.set(true);
            })
            .forget();

        scheduler.update();
        assert!(!done.get());

        busy.set(false);
        scheduler.update();
        assert!(done.get());
    }

    #[test]
    fn handle_operations_survive_scheduler_teardown() {
        let scheduler = Scheduler::new();
        let mut handle = scheduler.start(|mut s: Scope| async move {
            s.next_tick().await;
            5u32
        });

        drop(scheduler);
        assert!(handle.is_down());
        assert_eq!(handle.state(), None);
        assert_eq!(handle.take_result(), None);
        handle.stop();
    }

    #[test]
    #[should_panic]
    fn awaiting_a_foreign_future_aborts() {
        let scheduler = Scheduler::new();
        let _ = scheduler.start(|_s: Scope| async move {
            std::future::pending::<()>().await;
        });
    }

    fn fib(mut s: Scope, n: u64) -> Pin<Box<dyn Future<Output = u64>>> {
        Box::pin(async move {
            if n < 2 {
                s.next_tick().await;
                return n;
            }
            let a = s.start(move |s| fib(s, n - 1));
            let b = s.start(move |s| fib(s, n - 2));
            let (x, y) = s.all((a, b)).await;
            x + y
        })
    }

    #[test]
    fn fibonacci_stress_with_mid_flight_cancellation() {
        let scheduler = Scheduler::new();
        let mut handles = Vec::new();
        for _ in 0..200 {
            handles.push(scheduler.start(move |s| fib(s, 10)));
        }

        for handle in handles.iter().skip(1).step_by(2) {
            handle.stop();
        }

        for _ in 0..3 {
            scheduler.update();
        }

        for (index, handle) in handles.iter_mut().enumerate() {
            if index % 2 == 1 {
                assert_eq!(handle.state(), Some(State::Stopped));
                assert_eq!(handle.take_result(), None);
            } else {
                assert_eq!(handle.state(), Some(State::Succeeded));
                assert_eq!(handle.take_result(), Some(55));
            }
        }

        assert!(scheduler.is_idle());
        assert!(scheduler.shared.exec.borrow().bookkeeping_empty());
    }

    #[test]
    fn coroutines_can_spawn_during_a_resumption() {
        let scheduler = Scheduler::new();
        let count = Rc::new(Cell::new(0u32));
        let seen = Rc::clone(&count);
        scheduler
            .start(|mut s: Scope| async move {
                for _ in 0..3 {
                    let tick = Rc::clone(&seen);
                    s.start_forget(move |mut s: Scope| async move {
                        s.next_tick().await;
                        tick.set(tick.get() + 1);
                    });
                    s.next_tick().await;
                }
            })
            .forget();

        for _ in 0..5 {
            scheduler.update();
        }
        assert_eq!(count.get(), 3);
        assert!(scheduler.is_idle());
    }
}
