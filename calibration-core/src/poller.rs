//! Blocking wait for a status message from a specific object.

use core::fmt;
use core::time::Duration;

use crate::diagnostics::{DiagnosticEvent, DiagnosticsSink};
use crate::link::{Clock, DeviceLink, MonotonicInstant, Transport};
use crate::objects::{ObjectDirectory, ObjectType};
use crate::status::{GoldenReferenceState, StatusMessage, StatusSource};

/// Size of the buffer each message is read into, report ID included.
pub const MAX_MESSAGE_LEN: usize = 10;

/// No message from the awaited object arrived in time.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PollTimeout {
    pub object: ObjectType,
    pub waited: Duration,
}

impl fmt::Display for PollTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "timeout waiting for {} after {:?}",
            self.object, self.waited
        )
    }
}

/// Polls the message queue until `expected` reports a state or `timeout` elapses.
///
/// The elapsed time is checked before every queue query, so a message is never
/// accepted once the deadline has passed. Within one batch the first matching
/// message wins; anything queued behind it stays on the device. T6 messages are
/// decoded and reported but never end the wait. Messages whose report ID the
/// directory does not know are reported at verbose level and skipped, as are
/// messages with no payload.
///
/// # Errors
///
/// Returns [`PollTimeout`] once more than `timeout` has elapsed without a
/// message from `expected`.
pub fn await_message<T, D, C, S>(
    link: &mut DeviceLink<T, D, C, S>,
    expected: ObjectType,
    timeout: Duration,
) -> Result<GoldenReferenceState, PollTimeout>
where
    T: Transport,
    D: ObjectDirectory,
    C: Clock,
    S: DiagnosticsSink,
{
    let started = link.clock.now();

    loop {
        let waited = link.clock.now().saturating_duration_since(started);
        if waited > timeout {
            link.emit(&DiagnosticEvent::PollTimedOut {
                object: expected,
                waited,
            });
            return Err(PollTimeout {
                object: expected,
                waited,
            });
        }

        let count = link.transport.pending_message_count();
        for _ in 0..count {
            let mut buf = [0u8; MAX_MESSAGE_LEN];
            let len = link.transport.read_message(&mut buf).min(MAX_MESSAGE_LEN);
            if len == 0 {
                continue;
            }

            let Some(object) = link.directory.object_type_of(buf[0]) else {
                link.emit(&DiagnosticEvent::unknown_report(buf[0], &buf[1..len]));
                continue;
            };
            let payload = &buf[1..len];
            link.emit(&DiagnosticEvent::message_received(object, payload));

            let Some(&raw) = payload.first() else {
                continue;
            };

            if object == expected {
                let state = GoldenReferenceState::from_raw(raw);
                link.emit(&DiagnosticEvent::GoldenReference(state));
                return Ok(state);
            }

            if let Some(StatusMessage::CommandProcessor(status)) =
                StatusSource::from_object(object).map(|source| StatusMessage::decode(source, raw))
            {
                link.emit(&DiagnosticEvent::CommandProcessor(status));
            }
        }

        let interval = link.timing.poll_interval();
        link.clock.delay(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{DiagnosticLevel, DiagnosticsLog};
    use crate::link::TimingConfig;
    use crate::objects::{ObjectEntry, ObjectTable};
    use core::cell::Cell;
    use heapless::{Deque, Vec};

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    struct Ticks(u64);

    impl MonotonicInstant for Ticks {
        fn saturating_duration_since(&self, earlier: Self) -> Duration {
            Duration::from_millis(self.0.saturating_sub(earlier.0))
        }
    }

    #[derive(Default)]
    struct StepClock {
        now_ms: Cell<u64>,
        delays: u32,
    }

    impl Clock for StepClock {
        type Instant = Ticks;

        fn now(&self) -> Ticks {
            Ticks(self.now_ms.get())
        }

        fn delay(&mut self, duration: Duration) {
            self.delays += 1;
            let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
            self.now_ms.set(self.now_ms.get().saturating_add(ms));
        }
    }

    #[derive(Default)]
    struct Queue {
        messages: Deque<Vec<u8, 12>, 8>,
        queries: u32,
    }

    impl Queue {
        fn push(&mut self, bytes: &[u8]) {
            let message = Vec::from_slice(bytes).expect("message fits");
            self.messages.push_back(message).expect("queue has room");
        }
    }

    impl Transport for Queue {
        type Error = ();

        fn write_register(&mut self, _: u16, _: &[u8]) -> Result<(), ()> {
            Ok(())
        }

        fn pending_message_count(&mut self) -> u16 {
            self.queries += 1;
            u16::try_from(self.messages.len()).unwrap_or(u16::MAX)
        }

        fn read_message(&mut self, buf: &mut [u8]) -> usize {
            let Some(message) = self.messages.pop_front() else {
                return 0;
            };
            let len = message.len().min(buf.len());
            buf[..len].copy_from_slice(&message[..len]);
            len
        }

        fn reset_messages(&mut self) -> Result<(), ()> {
            self.messages.clear();
            Ok(())
        }
    }

    fn directory() -> ObjectTable<4> {
        let mut table = ObjectTable::new();
        table
            .push(ObjectEntry::new(ObjectType::GEN_COMMANDPROCESSOR_T6, 0x89, 6, 0, 1))
            .expect("room");
        table
            .push(ObjectEntry::new(ObjectType::SPT_GOLDENREFERENCES_T66, 0xF1, 4, 0, 1))
            .expect("room");
        table
    }

    type TestLink = DeviceLink<Queue, ObjectTable<4>, StepClock, DiagnosticsLog<16>>;

    fn link(queue: Queue) -> TestLink {
        DeviceLink::new(
            queue,
            directory(),
            StepClock::default(),
            DiagnosticsLog::new(),
        )
    }

    #[test]
    fn returns_first_golden_reference_message() {
        let mut queue = Queue::default();
        queue.push(&[2, 0x02]);
        queue.push(&[2, 0x44]);
        let mut link = link(queue);

        let state = await_message(
            &mut link,
            ObjectType::SPT_GOLDENREFERENCES_T66,
            Duration::from_secs(30),
        )
        .expect("message arrives");

        assert_eq!(state.to_raw(), 0x02);
        assert_eq!(link.transport().messages.len(), 1);
        assert_eq!(link.clock().delays, 0);
    }

    #[test]
    fn times_out_after_deadline_passes() {
        let mut link = link(Queue::default())
            .with_timing(TimingConfig::default().with_phase_timeout(Duration::from_secs(3)));

        let err = await_message(
            &mut link,
            ObjectType::SPT_GOLDENREFERENCES_T66,
            Duration::from_secs(3),
        )
        .expect_err("nothing arrives");

        assert_eq!(err.waited, Duration::from_secs(4));
        assert_eq!(link.transport().queries, 4);
        let last = link.sink().latest().expect("timeout recorded");
        assert!(matches!(last.event, DiagnosticEvent::PollTimedOut { .. }));
    }

    #[test]
    fn command_processor_messages_do_not_end_wait() {
        let mut queue = Queue::default();
        queue.push(&[1, 0x10]);
        queue.push(&[9, 0xAA]);
        queue.push(&[2]);
        queue.push(&[2, 0x20]);
        let mut link = link(queue);

        let state = await_message(
            &mut link,
            ObjectType::SPT_GOLDENREFERENCES_T66,
            Duration::from_secs(30),
        )
        .expect("message arrives");

        assert!(state.sequence_done);
        let saw_t6 = link.sink().oldest_first().any(|record| {
            matches!(record.event, DiagnosticEvent::CommandProcessor(status) if status.calibrating)
        });
        assert!(saw_t6);
    }

    #[test]
    fn unknown_report_ids_are_logged_before_skipping() {
        let mut queue = Queue::default();
        queue.push(&[0x30, 0x44, 0x01]);
        queue.push(&[2, 0x02]);
        let mut link = link(queue);

        let state = await_message(
            &mut link,
            ObjectType::SPT_GOLDENREFERENCES_T66,
            Duration::from_secs(30),
        )
        .expect("message arrives");

        assert_eq!(state.to_raw(), 0x02);
        let first = link.sink().oldest_first().next().expect("event recorded");
        assert_eq!(first.level, DiagnosticLevel::Verbose);
        match &first.event {
            DiagnosticEvent::UnknownReport { report_id, payload } => {
                assert_eq!(*report_id, 0x30);
                assert_eq!(payload.as_slice(), &[0x44, 0x01]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
