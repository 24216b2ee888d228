use std::time::Duration;

use frametick::prelude::*;

fn main() {
    let scheduler = Scheduler::new();

    scheduler
        .start(|mut s: Scope| async move {
            let mut beats = 0u32;
            loop {
                s.wait(Duration::from_millis(200)).await;
                beats += 1;
                println!("beat {beats}");
            }
        })
        .forget();

    // A host frame loop at roughly 60 updates per second.
    for _ in 0..120 {
        scheduler.update();
        std::thread::sleep(Duration::from_millis(16));
    }
}
