//! One calibration phase: write the T66 control register, wait for the status
//! message, and check it against the phase's expected outcome.

use core::fmt;
use core::ops::BitOr;

use crate::diagnostics::{DiagnosticEvent, DiagnosticsSink};
use crate::link::{Clock, DeviceLink, Transport};
use crate::objects::{ObjectDirectory, ObjectType};
use crate::poller::{PollTimeout, await_message};
use crate::status::{FcalState, GoldenReferenceState, StateBit};

/// Offset of the CTRL register within the T66 object.
pub const CONTROL_REGISTER_OFFSET: u16 = 0;

/// Value written to the T66 CTRL register.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlCommand(u8);

impl ControlCommand {
    pub const ENABLE: Self = Self(1 << 0);
    pub const RPTEN: Self = Self(1 << 1);
    pub const PRIME: Self = Self(1 << 2);
    pub const GENERATE: Self = Self(1 << 3);
    /// Store reuses both command bits.
    pub const STORE: Self = Self(Self::PRIME.0 | Self::GENERATE.0);
    pub const TESTONINIT: Self = Self(1 << 4);
    pub const TESTONCAL: Self = Self(1 << 5);

    /// Mask covering the 2-bit FCALCMD field.
    pub const FCALCMD_MASK: u8 = Self::STORE.0;

    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` when every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Adds the enable and report-enable bits every phase write carries.
    #[must_use]
    pub const fn with_reporting(self) -> Self {
        Self(self.0 | Self::ENABLE.0 | Self::RPTEN.0)
    }

    /// Decodes the FCALCMD field.
    #[must_use]
    pub const fn fcal_command(self) -> FcalCommand {
        match self.0 & Self::FCALCMD_MASK {
            0 => FcalCommand::None,
            bits if bits == Self::PRIME.0 => FcalCommand::Prime,
            bits if bits == Self::GENERATE.0 => FcalCommand::Generate,
            _ => FcalCommand::Store,
        }
    }
}

impl BitOr for ControlCommand {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X} (", self.0)?;
        let mut first = true;
        let flags = [
            (Self::ENABLE, "ENABLE"),
            (Self::RPTEN, "RPTEN"),
            (Self::TESTONINIT, "TESTONINIT"),
            (Self::TESTONCAL, "TESTONCAL"),
        ];
        for (flag, label) in flags {
            if self.contains(flag) {
                if !first {
                    f.write_str(" ")?;
                }
                f.write_str(label)?;
                first = false;
            }
        }
        if let Some(label) = self.fcal_command().label() {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(label)?;
        }
        f.write_str(")")
    }
}

/// Decoded FCALCMD field of the CTRL register.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FcalCommand {
    None,
    Prime,
    Generate,
    Store,
}

impl FcalCommand {
    #[must_use]
    pub const fn label(self) -> Option<&'static str> {
        match self {
            FcalCommand::None => None,
            FcalCommand::Prime => Some("PRIME"),
            FcalCommand::Generate => Some("GENERATE"),
            FcalCommand::Store => Some("STORE"),
        }
    }
}

/// State a phase must leave the object in to count as successful.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ExpectedOutcome {
    pub fcal_state: FcalState,
    pub required: StateBit,
}

impl ExpectedOutcome {
    #[must_use]
    pub const fn new(fcal_state: FcalState, required: StateBit) -> Self {
        Self {
            fcal_state,
            required,
        }
    }

    /// Exact phase indicator match plus the required bit.
    #[must_use]
    pub const fn is_satisfied_by(&self, state: GoldenReferenceState) -> bool {
        state.fcal_state as u8 == self.fcal_state as u8 && state.has(self.required)
    }
}

impl fmt::Display for ExpectedOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} with {}", self.fcal_state, self.required)
    }
}

/// Failure of a single phase.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PhaseError<E> {
    /// The control register write failed.
    Io(E),
    /// No T66 message arrived before the phase timeout.
    Timeout(PollTimeout),
    /// The device answered with the wrong state.
    StateMismatch {
        expected: ExpectedOutcome,
        actual: GoldenReferenceState,
    },
}

impl<E> From<PollTimeout> for PhaseError<E> {
    fn from(value: PollTimeout) -> Self {
        PhaseError::Timeout(value)
    }
}

impl<E: fmt::Display> fmt::Display for PhaseError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseError::Io(err) => write!(f, "control write failed: {err}"),
            PhaseError::Timeout(timeout) => timeout.fmt(f),
            PhaseError::StateMismatch { expected, actual } => {
                write!(f, "expected {expected}, got {actual}")
            }
        }
    }
}

/// Writes `command` to the T66 object at `object_address` and validates the reply.
///
/// The enable and report-enable bits are always added to `command`. Exactly one
/// register write and one poll happen per call.
///
/// # Errors
///
/// Returns [`PhaseError::Io`] when the register write fails,
/// [`PhaseError::Timeout`] when no T66 message arrives within the configured
/// phase timeout, and [`PhaseError::StateMismatch`] when the reported state does
/// not satisfy `expected`.
pub fn run_phase<T, D, C, S>(
    link: &mut DeviceLink<T, D, C, S>,
    object_address: u16,
    command: ControlCommand,
    expected: ExpectedOutcome,
) -> Result<(), PhaseError<T::Error>>
where
    T: Transport,
    D: ObjectDirectory,
    C: Clock,
    S: DiagnosticsSink,
{
    let command = command.with_reporting();
    let address = object_address.wrapping_add(CONTROL_REGISTER_OFFSET);

    link.emit(&DiagnosticEvent::ControlWritten { address, command });
    link.transport
        .write_register(address, &[command.bits()])
        .map_err(PhaseError::Io)?;

    let timeout = link.timing.phase_timeout();
    let actual = await_message(link, ObjectType::SPT_GOLDENREFERENCES_T66, timeout)?;

    if expected.is_satisfied_by(actual) {
        Ok(())
    } else {
        link.emit(&DiagnosticEvent::StateMismatch { expected, actual });
        Err(PhaseError::StateMismatch { expected, actual })
    }
}
