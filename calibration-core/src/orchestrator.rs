//! Prime, generate, store: the full golden reference calibration.

use core::fmt;
use core::time::Duration;

use crate::diagnostics::{DiagnosticEvent, DiagnosticsSink};
use crate::link::{Clock, DeviceLink, Transport};
use crate::objects::{ObjectDirectory, ObjectType};
use crate::sequencer::{ControlCommand, ExpectedOutcome, PhaseError, run_phase};
use crate::status::{FcalState, GoldenReferenceState, StateBit};

/// Instance of the T66 object the calibration targets.
pub const GOLDEN_REFERENCE_INSTANCE: u8 = 0;

/// `errno`-style codes returned by [`GoldenReferenceCalibration::run_status`].
pub const STATUS_OK: i32 = 0;
pub const STATUS_STATE_MISMATCH: i32 = -1;
pub const STATUS_OBJECT_NOT_FOUND: i32 = -2;
pub const STATUS_IO: i32 = -5;
pub const STATUS_TIMEOUT: i32 = -110;

/// One step of the calibration sequence.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CalibrationPhase {
    Prime,
    Generate,
    Store,
}

impl CalibrationPhase {
    /// Phases in execution order.
    pub const ALL: [CalibrationPhase; 3] = [
        CalibrationPhase::Prime,
        CalibrationPhase::Generate,
        CalibrationPhase::Store,
    ];

    #[must_use]
    pub const fn command(self) -> ControlCommand {
        match self {
            CalibrationPhase::Prime => ControlCommand::PRIME,
            CalibrationPhase::Generate => ControlCommand::GENERATE,
            CalibrationPhase::Store => ControlCommand::STORE,
        }
    }

    /// State the device must report once the phase completes.
    #[must_use]
    pub const fn expected(self) -> ExpectedOutcome {
        match self {
            CalibrationPhase::Prime => ExpectedOutcome::new(FcalState::Primed, StateBit::Primed),
            CalibrationPhase::Generate => {
                ExpectedOutcome::new(FcalState::Generated, StateBit::CalibrationPass)
            }
            CalibrationPhase::Store => {
                ExpectedOutcome::new(FcalState::Idle, StateBit::SequenceDone)
            }
        }
    }

    /// Progress line printed when the phase starts.
    #[must_use]
    pub const fn progress_label(self) -> &'static str {
        match self {
            CalibrationPhase::Prime => "Priming",
            CalibrationPhase::Generate => "Generating",
            CalibrationPhase::Store => "Storing",
        }
    }

    #[must_use]
    pub const fn running_state(self) -> CalibrationState {
        match self {
            CalibrationPhase::Prime => CalibrationState::Priming,
            CalibrationPhase::Generate => CalibrationState::Generating,
            CalibrationPhase::Store => CalibrationState::Storing,
        }
    }
}

impl fmt::Display for CalibrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CalibrationPhase::Prime => "prime",
            CalibrationPhase::Generate => "generate",
            CalibrationPhase::Store => "store",
        })
    }
}

/// Category of a calibration failure, without the transport error payload.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FailureKind {
    Io,
    ObjectNotFound,
    Timeout,
    StateMismatch,
}

impl FailureKind {
    #[must_use]
    pub const fn status_code(self) -> i32 {
        match self {
            FailureKind::Io => STATUS_IO,
            FailureKind::ObjectNotFound => STATUS_OBJECT_NOT_FOUND,
            FailureKind::Timeout => STATUS_TIMEOUT,
            FailureKind::StateMismatch => STATUS_STATE_MISMATCH,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::Io => "i/o error",
            FailureKind::ObjectNotFound => "object not found",
            FailureKind::Timeout => "timeout",
            FailureKind::StateMismatch => "state mismatch",
        })
    }
}

/// Lifecycle of a calibration run.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CalibrationState {
    #[default]
    Idle,
    Priming,
    Generating,
    Storing,
    Done,
    Failed {
        phase: Option<CalibrationPhase>,
        kind: FailureKind,
    },
}

impl CalibrationState {
    /// Returns `true` while a phase is in progress.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(
            self,
            CalibrationState::Priming | CalibrationState::Generating | CalibrationState::Storing
        )
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            CalibrationState::Done | CalibrationState::Failed { .. }
        )
    }
}

/// Why a calibration run stopped.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CalibrationError<E> {
    /// The transport failed to reset the queue or write a register.
    Io(E),
    /// The device does not expose the object.
    ObjectNotFound(ObjectType),
    /// No status arrived within the phase timeout.
    Timeout {
        phase: CalibrationPhase,
        waited: Duration,
    },
    /// The device reported a state other than the one the phase requires.
    StateMismatch {
        phase: CalibrationPhase,
        expected: ExpectedOutcome,
        actual: GoldenReferenceState,
    },
}

impl<E> CalibrationError<E> {
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            CalibrationError::Io(_) => FailureKind::Io,
            CalibrationError::ObjectNotFound(_) => FailureKind::ObjectNotFound,
            CalibrationError::Timeout { .. } => FailureKind::Timeout,
            CalibrationError::StateMismatch { .. } => FailureKind::StateMismatch,
        }
    }

    /// Phase that failed. `Io` errors carry no phase since they may occur before the first.
    #[must_use]
    pub const fn phase(&self) -> Option<CalibrationPhase> {
        match self {
            CalibrationError::Timeout { phase, .. }
            | CalibrationError::StateMismatch { phase, .. } => Some(*phase),
            CalibrationError::Io(_) | CalibrationError::ObjectNotFound(_) => None,
        }
    }

    #[must_use]
    pub const fn status_code(&self) -> i32 {
        self.kind().status_code()
    }
}

impl<E> PhaseError<E> {
    /// Attaches the phase the error occurred in.
    pub fn in_phase(self, phase: CalibrationPhase) -> CalibrationError<E> {
        match self {
            PhaseError::Io(err) => CalibrationError::Io(err),
            PhaseError::Timeout(timeout) => CalibrationError::Timeout {
                phase,
                waited: timeout.waited,
            },
            PhaseError::StateMismatch { expected, actual } => CalibrationError::StateMismatch {
                phase,
                expected,
                actual,
            },
        }
    }
}

impl<E: fmt::Display> fmt::Display for CalibrationError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationError::Io(err) => write!(f, "i/o error: {err}"),
            CalibrationError::ObjectNotFound(object) => write!(f, "{object} not found"),
            CalibrationError::Timeout { phase, waited } => {
                write!(f, "{phase} timed out after {waited:?}")
            }
            CalibrationError::StateMismatch {
                phase,
                expected,
                actual,
            } => write!(f, "{phase} failed: expected {expected}, got {actual}"),
        }
    }
}

/// Drives the three calibration phases against one device.
pub struct GoldenReferenceCalibration<T, D, C, S> {
    link: DeviceLink<T, D, C, S>,
    state: CalibrationState,
}

impl<T, D, C, S> GoldenReferenceCalibration<T, D, C, S>
where
    T: Transport,
    D: ObjectDirectory,
    C: Clock,
    S: DiagnosticsSink,
{
    pub fn new(link: DeviceLink<T, D, C, S>) -> Self {
        Self {
            link,
            state: CalibrationState::Idle,
        }
    }

    #[must_use]
    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn link(&self) -> &DeviceLink<T, D, C, S> {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut DeviceLink<T, D, C, S> {
        &mut self.link
    }

    pub fn into_link(self) -> DeviceLink<T, D, C, S> {
        self.link
    }

    /// Runs prime, generate and store in order, stopping at the first failure.
    ///
    /// The device message queue is cleared before anything is written. A later
    /// phase is never attempted once an earlier one fails. The run can be
    /// repeated; each call starts again from [`CalibrationState::Idle`].
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::Io`] when the queue reset or a register
    /// write fails, [`CalibrationError::ObjectNotFound`] when the directory has
    /// no T66 object, and the timeout or state mismatch of the phase that
    /// stopped the run.
    pub fn run(&mut self) -> Result<(), CalibrationError<T::Error>> {
        self.state = CalibrationState::Idle;

        match self.execute() {
            Ok(()) => {
                self.state = CalibrationState::Done;
                self.link.emit(&DiagnosticEvent::CalibrationComplete);
                Ok(())
            }
            Err(err) => {
                let phase = match self.state {
                    CalibrationState::Priming => Some(CalibrationPhase::Prime),
                    CalibrationState::Generating => Some(CalibrationPhase::Generate),
                    CalibrationState::Storing => Some(CalibrationPhase::Store),
                    _ => None,
                };
                let kind = err.kind();
                self.state = CalibrationState::Failed { phase, kind };
                self.link.emit(&DiagnosticEvent::CalibrationFailed { phase, kind });
                Err(err)
            }
        }
    }

    /// Same as [`Self::run`], reduced to a status code (0 on success).
    pub fn run_status(&mut self) -> i32 {
        match self.run() {
            Ok(()) => STATUS_OK,
            Err(err) => err.status_code(),
        }
    }

    fn execute(&mut self) -> Result<(), CalibrationError<T::Error>> {
        self.link
            .transport
            .reset_messages()
            .map_err(CalibrationError::Io)?;

        let object = ObjectType::SPT_GOLDENREFERENCES_T66;
        let address = self
            .link
            .directory
            .address_of(object, GOLDEN_REFERENCE_INSTANCE)
            .ok_or(CalibrationError::ObjectNotFound(object))?;

        for phase in CalibrationPhase::ALL {
            self.state = phase.running_state();
            self.link.emit(&DiagnosticEvent::PhaseStarted(phase));
            run_phase(&mut self.link, address, phase.command(), phase.expected())
                .map_err(|err| err.in_phase(phase))?;
        }

        Ok(())
    }
}
