//! Collaborators the calibration logic talks to.
//!
//! Nothing in this crate touches hardware or wall-clock time directly. Firmware
//! and host targets provide a [`Transport`] for register writes and message
//! retrieval, an [`ObjectDirectory`] for address lookup, a [`Clock`] for the poll
//! delay, and a [`DiagnosticsSink`] for log output. [`DeviceLink`] bundles them
//! so the poller, sequencer, and orchestrator share one handle.

use core::time::Duration;

use crate::diagnostics::{DiagnosticEvent, DiagnosticsSink};
use crate::objects::ObjectDirectory;

/// Register transport and message source for one device.
pub trait Transport {
    /// Transport-specific failure.
    type Error;

    /// Writes `data` starting at register `address`.
    ///
    /// # Errors
    ///
    /// Returns the transport's error when the bus write fails.
    fn write_register(&mut self, address: u16, data: &[u8]) -> Result<(), Self::Error>;

    /// Returns the number of messages waiting in the device queue.
    fn pending_message_count(&mut self) -> u16;

    /// Reads the next message into `buf`, returning its length (0 when none).
    fn read_message(&mut self, buf: &mut [u8]) -> usize;

    /// Discards any messages already queued on the device.
    ///
    /// # Errors
    ///
    /// Returns the transport's error when the queue cannot be cleared.
    fn reset_messages(&mut self) -> Result<(), Self::Error>;
}

impl<T> Transport for &mut T
where
    T: Transport + ?Sized,
{
    type Error = T::Error;

    fn write_register(&mut self, address: u16, data: &[u8]) -> Result<(), Self::Error> {
        (**self).write_register(address, data)
    }

    fn pending_message_count(&mut self) -> u16 {
        (**self).pending_message_count()
    }

    fn read_message(&mut self, buf: &mut [u8]) -> usize {
        (**self).read_message(buf)
    }

    fn reset_messages(&mut self) -> Result<(), Self::Error> {
        (**self).reset_messages()
    }
}

/// Trait implemented by monotonic instant wrappers.
pub trait MonotonicInstant: Copy {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

/// Time source and blocking delay used by the poll loop.
pub trait Clock {
    type Instant: MonotonicInstant;

    /// Returns the current instant.
    fn now(&self) -> Self::Instant;

    /// Blocks for `duration`.
    fn delay(&mut self, duration: Duration);
}

impl<C> Clock for &mut C
where
    C: Clock + ?Sized,
{
    type Instant = C::Instant;

    fn now(&self) -> Self::Instant {
        (**self).now()
    }

    fn delay(&mut self, duration: Duration) {
        (**self).delay(duration);
    }
}

/// How long a phase may wait for its status message.
pub const DEFAULT_PHASE_TIMEOUT: Duration = Duration::from_secs(30);

/// Sleep between message queue polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Timing knobs for the poll loop.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TimingConfig {
    phase_timeout: Duration,
    poll_interval: Duration,
}

impl TimingConfig {
    /// Creates a configuration with explicit values.
    #[must_use]
    pub const fn new(phase_timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            phase_timeout,
            poll_interval,
        }
    }

    /// Returns a copy with a different phase timeout.
    #[must_use]
    pub const fn with_phase_timeout(mut self, phase_timeout: Duration) -> Self {
        self.phase_timeout = phase_timeout;
        self
    }

    /// Returns a copy with a different poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    #[must_use]
    pub const fn phase_timeout(&self) -> Duration {
        self.phase_timeout
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PHASE_TIMEOUT, DEFAULT_POLL_INTERVAL)
    }
}

/// Everything needed to talk to one device.
pub struct DeviceLink<T, D, C, S> {
    pub(crate) transport: T,
    pub(crate) directory: D,
    pub(crate) clock: C,
    pub(crate) sink: S,
    pub(crate) timing: TimingConfig,
}

impl<T, D, C, S> DeviceLink<T, D, C, S>
where
    T: Transport,
    D: ObjectDirectory,
    C: Clock,
    S: DiagnosticsSink,
{
    /// Bundles the collaborators with the default timing.
    #[must_use]
    pub fn new(transport: T, directory: D, clock: C, sink: S) -> Self {
        Self {
            transport,
            directory,
            clock,
            sink,
            timing: TimingConfig::default(),
        }
    }

    /// Replaces the timing configuration.
    #[must_use]
    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    #[must_use]
    pub fn timing(&self) -> TimingConfig {
        self.timing
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    #[must_use]
    pub fn directory(&self) -> &D {
        &self.directory
    }

    #[must_use]
    pub fn clock(&self) -> &C {
        &self.clock
    }

    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Consumes the link and returns its parts.
    pub fn into_parts(self) -> (T, D, C, S) {
        (self.transport, self.directory, self.clock, self.sink)
    }

    pub(crate) fn emit(&mut self, event: &DiagnosticEvent) {
        self.sink.emit(event);
    }
}
