//! Diagnostic events emitted while calibrating.
//!
//! Events are strongly typed so tests can assert on them, and each one renders
//! to the single human-readable line an operator expects to see on a console.
//! Sinks decide where the lines go: [`DiagnosticsLog`] keeps a fixed-size
//! history in memory, `DefmtSink` (behind the `defmt` feature) forwards to the
//! target logger, and host tools provide their own. No calibration decision
//! ever depends on a sink.

use core::fmt;
use core::time::Duration;

use heapless::{HistoryBuf, Vec};

use crate::objects::ObjectType;
use crate::orchestrator::{CalibrationPhase, FailureKind};
use crate::poller::MAX_MESSAGE_LEN;
use crate::sequencer::{ControlCommand, ExpectedOutcome};
use crate::status::{CommandProcessorStatus, GoldenReferenceState};

/// Longest payload carried by a message after its report ID.
pub const MAX_PAYLOAD_LEN: usize = MAX_MESSAGE_LEN - 1;

/// Payload bytes following the report ID of a message.
pub type MessagePayload = Vec<u8, MAX_PAYLOAD_LEN>;

/// Identifier assigned to each recorded event.
pub type EventId = u32;

/// Severity attached to an event.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DiagnosticLevel {
    Verbose,
    Info,
    Warn,
    Error,
}

impl fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DiagnosticLevel::Verbose => "verbose",
            DiagnosticLevel::Info => "info",
            DiagnosticLevel::Warn => "warn",
            DiagnosticLevel::Error => "error",
        })
    }
}

/// Observable step of a calibration run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DiagnosticEvent {
    PhaseStarted(CalibrationPhase),
    ControlWritten {
        address: u16,
        command: ControlCommand,
    },
    MessageReceived {
        object: ObjectType,
        payload: MessagePayload,
    },
    /// A message whose report ID no object in the directory owns.
    UnknownReport {
        report_id: u8,
        payload: MessagePayload,
    },
    CommandProcessor(CommandProcessorStatus),
    GoldenReference(GoldenReferenceState),
    PollTimedOut {
        object: ObjectType,
        waited: Duration,
    },
    StateMismatch {
        expected: ExpectedOutcome,
        actual: GoldenReferenceState,
    },
    CalibrationComplete,
    CalibrationFailed {
        phase: Option<CalibrationPhase>,
        kind: FailureKind,
    },
}

impl DiagnosticEvent {
    /// Builds a message event, truncating the payload to the message buffer size.
    #[must_use]
    pub fn message_received(object: ObjectType, payload: &[u8]) -> Self {
        DiagnosticEvent::MessageReceived {
            object,
            payload: truncated(payload),
        }
    }

    /// Builds an event for a message nobody claims, truncating like
    /// [`Self::message_received`].
    #[must_use]
    pub fn unknown_report(report_id: u8, payload: &[u8]) -> Self {
        DiagnosticEvent::UnknownReport {
            report_id,
            payload: truncated(payload),
        }
    }

    #[must_use]
    pub const fn level(&self) -> DiagnosticLevel {
        match self {
            DiagnosticEvent::MessageReceived { .. } | DiagnosticEvent::UnknownReport { .. } => {
                DiagnosticLevel::Verbose
            }
            DiagnosticEvent::PhaseStarted(_)
            | DiagnosticEvent::ControlWritten { .. }
            | DiagnosticEvent::CommandProcessor(_)
            | DiagnosticEvent::GoldenReference(_)
            | DiagnosticEvent::CalibrationComplete => DiagnosticLevel::Info,
            DiagnosticEvent::PollTimedOut { .. } | DiagnosticEvent::StateMismatch { .. } => {
                DiagnosticLevel::Warn
            }
            DiagnosticEvent::CalibrationFailed { .. } => DiagnosticLevel::Error,
        }
    }
}

impl fmt::Display for DiagnosticEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticEvent::PhaseStarted(phase) => f.write_str(phase.progress_label()),
            DiagnosticEvent::ControlWritten { address, command } => {
                write!(f, "writing {command} to ctrl register 0x{address:04X}")
            }
            DiagnosticEvent::MessageReceived { object, payload } => {
                write!(f, "message from {object}:")?;
                write_payload(f, payload)
            }
            DiagnosticEvent::UnknownReport { report_id, payload } => {
                write!(f, "message from unknown report ID 0x{report_id:02X}:")?;
                write_payload(f, payload)
            }
            DiagnosticEvent::CommandProcessor(status) => status.fmt(f),
            DiagnosticEvent::GoldenReference(state) => state.fmt(f),
            DiagnosticEvent::PollTimedOut { object, waited } => {
                write!(f, "timeout waiting for {object} after {waited:?}")
            }
            DiagnosticEvent::StateMismatch { expected, actual } => {
                write!(
                    f,
                    "failed to enter correct state: expected {expected}, got {actual}"
                )
            }
            DiagnosticEvent::CalibrationComplete => f.write_str("Done"),
            DiagnosticEvent::CalibrationFailed { phase, kind } => match phase {
                Some(phase) => write!(f, "calibration failed during {phase}: {kind}"),
                None => write!(f, "calibration failed: {kind}"),
            },
        }
    }
}

fn truncated(payload: &[u8]) -> MessagePayload {
    let len = payload.len().min(MAX_PAYLOAD_LEN);
    Vec::from_slice(&payload[..len]).unwrap_or_default()
}

fn write_payload(f: &mut fmt::Formatter<'_>, payload: &[u8]) -> fmt::Result {
    for byte in payload {
        write!(f, " {byte:02X}")?;
    }
    Ok(())
}

/// Receiver for diagnostic events.
pub trait DiagnosticsSink {
    fn emit(&mut self, event: &DiagnosticEvent);
}

impl<S> DiagnosticsSink for &mut S
where
    S: DiagnosticsSink + ?Sized,
{
    fn emit(&mut self, event: &DiagnosticEvent) {
        (**self).emit(event);
    }
}

/// Sink that discards every event.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopSink;

impl NoopSink {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl DiagnosticsSink for NoopSink {
    fn emit(&mut self, _: &DiagnosticEvent) {}
}

/// Total number of diagnostic entries retained in memory.
pub const DIAGNOSTICS_RING_CAPACITY: usize = 64;

/// Event stored in the diagnostics ring.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DiagnosticRecord {
    pub id: EventId,
    pub level: DiagnosticLevel,
    pub event: DiagnosticEvent,
}

/// Records diagnostic events into a fixed-size ring buffer.
pub struct DiagnosticsLog<const CAPACITY: usize = DIAGNOSTICS_RING_CAPACITY> {
    ring: HistoryBuf<DiagnosticRecord, CAPACITY>,
    next_event_id: EventId,
}

impl<const CAPACITY: usize> DiagnosticsLog<CAPACITY> {
    /// Creates an empty log.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Returns the recorded events in chronological order.
    pub fn oldest_first(&self) -> impl Iterator<Item = &DiagnosticRecord> + '_ {
        self.ring.oldest_ordered()
    }

    /// Returns the most recent record, if available.
    #[must_use]
    pub fn latest(&self) -> Option<&DiagnosticRecord> {
        self.ring.recent()
    }

    /// Returns the number of records currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` when no records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Returns the number of events recorded since creation, including evicted ones.
    #[must_use]
    pub fn total_recorded(&self) -> EventId {
        self.next_event_id
    }

    /// Records an event and returns its identifier.
    pub fn record(&mut self, event: DiagnosticEvent) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(DiagnosticRecord {
            id,
            level: event.level(),
            event,
        });

        id
    }
}

impl<const CAPACITY: usize> Default for DiagnosticsLog<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAPACITY: usize> DiagnosticsSink for DiagnosticsLog<CAPACITY> {
    fn emit(&mut self, event: &DiagnosticEvent) {
        self.record(event.clone());
    }
}

/// Forwards events to the `defmt` logger at a matching level.
#[cfg(feature = "defmt")]
#[derive(Copy, Clone, Debug, Default)]
pub struct DefmtSink;

#[cfg(feature = "defmt")]
impl DiagnosticsSink for DefmtSink {
    fn emit(&mut self, event: &DiagnosticEvent) {
        let line = defmt::Display2Format(event);
        match event.level() {
            DiagnosticLevel::Verbose => defmt::trace!("gr: {}", line),
            DiagnosticLevel::Info => defmt::info!("gr: {}", line),
            DiagnosticLevel::Warn => defmt::warn!("gr: {}", line),
            DiagnosticLevel::Error => defmt::error!("gr: {}", line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::FcalState;
    use core::fmt::Write;
    use heapless::String;

    fn render(event: &DiagnosticEvent) -> String<96> {
        let mut out = String::new();
        write!(out, "{event}").expect("rendering fits");
        out
    }

    #[test]
    fn log_assigns_sequential_ids() {
        let mut log = DiagnosticsLog::<4>::new();
        assert!(log.is_empty());

        let first = log.record(DiagnosticEvent::PhaseStarted(CalibrationPhase::Prime));
        let second = log.record(DiagnosticEvent::CalibrationComplete);

        assert_eq!(first, 0);
        assert_eq!(second, 1);
        assert_eq!(log.len(), 2);

        let latest = log.latest().expect("latest record");
        assert_eq!(latest.event, DiagnosticEvent::CalibrationComplete);
        assert_eq!(latest.level, DiagnosticLevel::Info);
    }

    #[test]
    fn log_evicts_oldest_records_when_full() {
        let mut log = DiagnosticsLog::<2>::new();
        log.emit(&DiagnosticEvent::PhaseStarted(CalibrationPhase::Prime));
        log.emit(&DiagnosticEvent::PhaseStarted(CalibrationPhase::Generate));
        log.emit(&DiagnosticEvent::PhaseStarted(CalibrationPhase::Store));

        let ids: Vec<EventId, 2> = log.oldest_first().map(|record| record.id).collect();
        assert_eq!(ids.as_slice(), &[1, 2]);
        assert_eq!(log.total_recorded(), 3);
    }

    #[test]
    fn message_payload_is_truncated_to_buffer() {
        let event = DiagnosticEvent::message_received(
            ObjectType::SPT_GOLDENREFERENCES_T66,
            &[0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0xEE, 0xEE],
        );
        match event {
            DiagnosticEvent::MessageReceived { payload, .. } => {
                assert_eq!(payload.len(), MAX_PAYLOAD_LEN);
                assert_eq!(payload[0], 0x02);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn renders_operator_lines() {
        assert_eq!(
            render(&DiagnosticEvent::PhaseStarted(CalibrationPhase::Generate)).as_str(),
            "Generating"
        );
        assert_eq!(
            render(&DiagnosticEvent::message_received(
                ObjectType::SPT_GOLDENREFERENCES_T66,
                &[0x44, 0x00]
            ))
            .as_str(),
            "message from T66: 44 00"
        );
        assert_eq!(
            render(&DiagnosticEvent::unknown_report(0xF0, &[0x44])).as_str(),
            "message from unknown report ID 0xF0: 44"
        );
        assert_eq!(
            render(&DiagnosticEvent::PollTimedOut {
                object: ObjectType::SPT_GOLDENREFERENCES_T66,
                waited: Duration::from_secs(31),
            })
            .as_str(),
            "timeout waiting for T66 after 31s"
        );
        assert_eq!(
            render(&DiagnosticEvent::CalibrationFailed {
                phase: Some(CalibrationPhase::Generate),
                kind: FailureKind::StateMismatch,
            })
            .as_str(),
            "calibration failed during generate: state mismatch"
        );
    }

    #[test]
    fn levels_follow_event_severity() {
        let mismatch = DiagnosticEvent::StateMismatch {
            expected: CalibrationPhase::Generate.expected(),
            actual: GoldenReferenceState::from_raw(FcalState::Generated.to_raw()),
        };
        assert_eq!(mismatch.level(), DiagnosticLevel::Warn);
        let t6 = ObjectType::GEN_COMMANDPROCESSOR_T6;
        assert_eq!(
            DiagnosticEvent::message_received(t6, &[0x10]).level(),
            DiagnosticLevel::Verbose
        );
        assert_eq!(
            DiagnosticEvent::unknown_report(0xF0, &[]).level(),
            DiagnosticLevel::Verbose
        );
        assert!(DiagnosticLevel::Error > DiagnosticLevel::Info);
    }

    #[test]
    fn noop_sink_accepts_every_event() {
        let mut sink = NoopSink::new();
        sink.emit(&DiagnosticEvent::CalibrationComplete);
        sink.emit(&DiagnosticEvent::unknown_report(0xF0, &[0x44]));
    }

    #[cfg(feature = "defmt")]
    #[test]
    fn defmt_feature_covers_sink_and_event_types() {
        fn assert_format<T: defmt::Format>() {}
        fn assert_sink<S: DiagnosticsSink + Copy + Default>() {}

        assert_sink::<DefmtSink>();
        assert_format::<DiagnosticLevel>();
        assert_format::<ObjectType>();
        assert_format::<GoldenReferenceState>();
        assert_format::<CalibrationPhase>();
        assert_format::<FailureKind>();
    }
}
