use std::thread;
use std::time::{Duration, Instant};

use calibration_core::{Clock, MonotonicInstant};

/// Clock that can report how much time it has seen pass.
pub trait SessionClock: Clock {
    fn elapsed(&self) -> Duration;
}

/// Point on the simulated timeline.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct VirtualInstant(Duration);

impl MonotonicInstant for VirtualInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

/// Clock whose delays complete instantly by advancing virtual time.
#[derive(Debug, Default)]
pub struct SimulatedClock {
    now: Duration,
}

impl SessionClock for SimulatedClock {
    fn elapsed(&self) -> Duration {
        self.now
    }
}

impl Clock for SimulatedClock {
    type Instant = VirtualInstant;

    fn now(&self) -> VirtualInstant {
        VirtualInstant(self.now)
    }

    fn delay(&mut self, duration: Duration) {
        self.now = self.now.saturating_add(duration);
    }
}

#[derive(Clone, Copy, Debug)]
pub struct HostInstant(Instant);

impl MonotonicInstant for HostInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        self.0.saturating_duration_since(earlier.0)
    }
}

/// Wall-clock time with blocking sleeps.
#[derive(Debug)]
pub struct HostClock {
    started: Instant,
}

impl HostClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl SessionClock for HostClock {
    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Clock for HostClock {
    type Instant = HostInstant;

    fn now(&self) -> HostInstant {
        HostInstant(Instant::now())
    }

    fn delay(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}
