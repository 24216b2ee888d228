use std::time::Duration;

use frametick::prelude::*;

fn main() {
    let scheduler = Scheduler::new();

    let mut handle = scheduler.start(|mut s: Scope| async move {
        let work = s.start(|mut s: Scope| async move {
            for _ in 0..5 {
                s.next_tick().await;
            }
            "all five frames done"
        });
        let deadline = s.start(|mut s: Scope| async move {
            s.wait(Duration::from_millis(50)).await;
        });

        match s.any((work, deadline)).await {
            (Some(outcome), _) => println!("work won: {outcome}"),
            (None, Some(())) => println!("timed out"),
            _ => unreachable!(),
        }
    });

    while !handle.is_down() {
        scheduler.update();
        std::thread::sleep(Duration::from_millis(16));
    }
    let _ = handle.take_result();
}
