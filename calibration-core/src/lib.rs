#![no_std]

// Golden reference (T66) calibration for maXTouch touch controllers.
//
// Prime, generate and store run against collaborators the caller hands in
// through [`DeviceLink`]: a register transport with its message queue, an
// object directory, a clock and a diagnostics sink. Firmware wires those to
// the I2C bus and a hardware timer; the host emulator wires them to a
// simulated device.

pub mod diagnostics;
pub mod link;
pub mod objects;
pub mod orchestrator;
pub mod poller;
pub mod sequencer;
pub mod status;

pub use diagnostics::{DiagnosticEvent, DiagnosticLevel, DiagnosticsLog, DiagnosticsSink, NoopSink};
pub use link::{Clock, DeviceLink, MonotonicInstant, TimingConfig, Transport};
pub use objects::{ObjectDirectory, ObjectEntry, ObjectTable, ObjectType};
pub use orchestrator::{
    CalibrationError, CalibrationPhase, CalibrationState, FailureKind, GoldenReferenceCalibration,
};
pub use poller::{PollTimeout, await_message};
pub use sequencer::{ControlCommand, ExpectedOutcome, PhaseError, run_phase};
pub use status::{
    CommandProcessorStatus, FcalState, GoldenReferenceState, StateBit, StatusMessage, StatusSource,
};
