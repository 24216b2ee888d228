use std::collections::HashMap;
use std::time::Instant;

/// Selects one of the host's time sources. The zero value is the default
/// clock, pre-installed with a monotonic wall clock; the host defines further
/// kinds (scaled game time, audio time, ...) and installs them with
/// [`Scheduler::set_clock`](crate::scheduler::Scheduler::set_clock).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct ClockKind(pub u8);

impl ClockKind {
    pub const DEFAULT: ClockKind = ClockKind(0);
}

/// Clock functions return the current time in seconds. They must be
/// monotonic; nothing else is assumed about their rate or origin.
pub(crate) struct ClockRegistry {
    clocks: HashMap<ClockKind, Box<dyn FnMut() -> f64>>,
}

impl ClockRegistry {
    pub(crate) fn new() -> Self {
        let epoch = Instant::now();
        let mut clocks: HashMap<ClockKind, Box<dyn FnMut() -> f64>> = HashMap::new();
        clocks.insert(
            ClockKind::DEFAULT,
            Box::new(move || epoch.elapsed().as_secs_f64()),
        );
        Self { clocks }
    }

    pub(crate) fn install(&mut self, kind: ClockKind, f: impl FnMut() -> f64 + 'static) {
        self.clocks.insert(kind, Box::new(f));
    }

    /// Sample a clock. Sampling a kind that was never installed is a bug in
    /// the host.
    pub(crate) fn now(&mut self, kind: ClockKind) -> f64 {
        match self.clocks.get_mut(&kind) {
            Some(f) => f(),
            None => panic!("no clock function installed for {kind:?}"),
        }
    }
}
