//! Decoders for the status bytes reported by the T6 and T66 objects.
//!
//! Decoding is pure and total: every byte maps to a structured view and the
//! view re-encodes to the bits it was decoded from. Human-readable rendering
//! lives in the `Display` impls so callers can route it wherever they log.

use core::fmt;

use crate::objects::ObjectType;

/// Status flags reported by the T6 command processor.
#[allow(clippy::struct_excessive_bools)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommandProcessorStatus {
    pub communication_error: bool,
    pub config_error: bool,
    pub calibrating: bool,
    pub signal_error: bool,
    pub overflow: bool,
    pub reset: bool,
}

impl CommandProcessorStatus {
    pub const COMSERR: u8 = 1 << 2;
    pub const CFGERR: u8 = 1 << 3;
    pub const CAL: u8 = 1 << 4;
    pub const SIGERR: u8 = 1 << 5;
    pub const OFL: u8 = 1 << 6;
    pub const RESET: u8 = 1 << 7;

    /// Decodes the first payload byte of a T6 message. Bits 0-1 are ignored.
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        Self {
            communication_error: raw & Self::COMSERR != 0,
            config_error: raw & Self::CFGERR != 0,
            calibrating: raw & Self::CAL != 0,
            signal_error: raw & Self::SIGERR != 0,
            overflow: raw & Self::OFL != 0,
            reset: raw & Self::RESET != 0,
        }
    }

    /// Re-encodes the recognised flags.
    #[must_use]
    pub const fn to_raw(self) -> u8 {
        let mut raw = 0;
        if self.communication_error {
            raw |= Self::COMSERR;
        }
        if self.config_error {
            raw |= Self::CFGERR;
        }
        if self.calibrating {
            raw |= Self::CAL;
        }
        if self.signal_error {
            raw |= Self::SIGERR;
        }
        if self.overflow {
            raw |= Self::OFL;
        }
        if self.reset {
            raw |= Self::RESET;
        }
        raw
    }
}

impl fmt::Display for CommandProcessorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("T6 status:")?;
        let labels = [
            (self.communication_error, "COMSERR"),
            (self.config_error, "CFGERR"),
            (self.calibrating, "CAL"),
            (self.signal_error, "SIGERR"),
            (self.overflow, "OFL"),
            (self.reset, "RESET"),
        ];
        for (set, label) in labels {
            if set {
                write!(f, " {label}")?;
            }
        }
        Ok(())
    }
}

/// Phase indicator held in bits 1-2 of the T66 state byte.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FcalState {
    Idle,
    Primed,
    Generated,
    /// Both bits set; not produced by a well-behaved device.
    Reserved,
}

impl FcalState {
    pub const MASK: u8 = GoldenReferenceState::PRIMED | GoldenReferenceState::GENERATED;

    /// Extracts the phase indicator, ignoring every bit outside [`Self::MASK`].
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        match raw & Self::MASK {
            0 => FcalState::Idle,
            GoldenReferenceState::PRIMED => FcalState::Primed,
            GoldenReferenceState::GENERATED => FcalState::Generated,
            _ => FcalState::Reserved,
        }
    }

    /// Returns the bits this state occupies under [`Self::MASK`].
    #[must_use]
    pub const fn to_raw(self) -> u8 {
        match self {
            FcalState::Idle => 0,
            FcalState::Primed => GoldenReferenceState::PRIMED,
            FcalState::Generated => GoldenReferenceState::GENERATED,
            FcalState::Reserved => Self::MASK,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            FcalState::Idle => "Idle",
            FcalState::Primed => "Primed",
            FcalState::Generated => "Generated",
            FcalState::Reserved => "Reserved",
        }
    }
}

impl fmt::Display for FcalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single named bit of the T66 state byte.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StateBit {
    BadStoredData,
    Primed,
    Generated,
    SequenceError,
    SequenceTimeout,
    SequenceDone,
    CalibrationPass,
    CalibrationFail,
}

impl StateBit {
    #[must_use]
    pub const fn mask(self) -> u8 {
        match self {
            StateBit::BadStoredData => GoldenReferenceState::BADSTOREDATA,
            StateBit::Primed => GoldenReferenceState::PRIMED,
            StateBit::Generated => GoldenReferenceState::GENERATED,
            StateBit::SequenceError => GoldenReferenceState::FCALSEQERR,
            StateBit::SequenceTimeout => GoldenReferenceState::FCALSEQTO,
            StateBit::SequenceDone => GoldenReferenceState::FCALSEQDONE,
            StateBit::CalibrationPass => GoldenReferenceState::FCALPASS,
            StateBit::CalibrationFail => GoldenReferenceState::FCALFAIL,
        }
    }

    /// Device-side name of the bit.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            StateBit::BadStoredData => "BADSTOREDATA",
            StateBit::Primed => "PRIMED",
            StateBit::Generated => "GENERATED",
            StateBit::SequenceError => "FCALSEQERR",
            StateBit::SequenceTimeout => "FCALSEQTO",
            StateBit::SequenceDone => "FCALSEQDONE",
            StateBit::CalibrationPass => "FCALPASS",
            StateBit::CalibrationFail => "FCALFAIL",
        }
    }
}

impl fmt::Display for StateBit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Decoded T66 golden reference state.
#[allow(clippy::struct_excessive_bools)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GoldenReferenceState {
    pub bad_stored_data: bool,
    pub fcal_state: FcalState,
    pub sequence_error: bool,
    pub sequence_timeout: bool,
    pub sequence_done: bool,
    pub calibration_pass: bool,
    pub calibration_fail: bool,
}

impl GoldenReferenceState {
    pub const BADSTOREDATA: u8 = 1 << 0;
    pub const PRIMED: u8 = 1 << 1;
    pub const GENERATED: u8 = 1 << 2;
    pub const FCALSEQERR: u8 = 1 << 3;
    pub const FCALSEQTO: u8 = 1 << 4;
    pub const FCALSEQDONE: u8 = 1 << 5;
    pub const FCALPASS: u8 = 1 << 6;
    pub const FCALFAIL: u8 = 1 << 7;

    /// Decodes the first payload byte of a T66 message.
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        Self {
            bad_stored_data: raw & Self::BADSTOREDATA != 0,
            fcal_state: FcalState::from_raw(raw),
            sequence_error: raw & Self::FCALSEQERR != 0,
            sequence_timeout: raw & Self::FCALSEQTO != 0,
            sequence_done: raw & Self::FCALSEQDONE != 0,
            calibration_pass: raw & Self::FCALPASS != 0,
            calibration_fail: raw & Self::FCALFAIL != 0,
        }
    }

    /// Re-encodes the state into the byte it was decoded from.
    #[must_use]
    pub const fn to_raw(self) -> u8 {
        let mut raw = self.fcal_state.to_raw();
        if self.bad_stored_data {
            raw |= Self::BADSTOREDATA;
        }
        if self.sequence_error {
            raw |= Self::FCALSEQERR;
        }
        if self.sequence_timeout {
            raw |= Self::FCALSEQTO;
        }
        if self.sequence_done {
            raw |= Self::FCALSEQDONE;
        }
        if self.calibration_pass {
            raw |= Self::FCALPASS;
        }
        if self.calibration_fail {
            raw |= Self::FCALFAIL;
        }
        raw
    }

    /// Returns `true` when `bit` is set in the encoded state.
    #[must_use]
    pub const fn has(self, bit: StateBit) -> bool {
        self.to_raw() & bit.mask() != 0
    }
}

impl fmt::Display for GoldenReferenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T66 state: {:02X}", self.to_raw())?;
        let flags = [
            StateBit::CalibrationFail,
            StateBit::CalibrationPass,
            StateBit::SequenceDone,
            StateBit::SequenceTimeout,
            StateBit::SequenceError,
        ];
        for bit in flags {
            if self.has(bit) {
                write!(f, " {bit}")?;
            }
        }
        write!(f, " {}", self.fcal_state)?;
        if self.bad_stored_data {
            write!(f, " {}", StateBit::BadStoredData)?;
        }
        Ok(())
    }
}

/// Objects whose status bytes this module can decode.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusSource {
    CommandProcessor,
    GoldenReference,
}

impl StatusSource {
    /// Maps an object type to its status source, if it has one.
    #[must_use]
    pub const fn from_object(object: ObjectType) -> Option<Self> {
        match object {
            ObjectType::GEN_COMMANDPROCESSOR_T6 => Some(StatusSource::CommandProcessor),
            ObjectType::SPT_GOLDENREFERENCES_T66 => Some(StatusSource::GoldenReference),
            _ => None,
        }
    }

    #[must_use]
    pub const fn object(self) -> ObjectType {
        match self {
            StatusSource::CommandProcessor => ObjectType::GEN_COMMANDPROCESSOR_T6,
            StatusSource::GoldenReference => ObjectType::SPT_GOLDENREFERENCES_T66,
        }
    }
}

/// Structured view of a status byte from either source.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusMessage {
    CommandProcessor(CommandProcessorStatus),
    GoldenReference(GoldenReferenceState),
}

impl StatusMessage {
    #[must_use]
    pub const fn decode(source: StatusSource, raw: u8) -> Self {
        match source {
            StatusSource::CommandProcessor => {
                StatusMessage::CommandProcessor(CommandProcessorStatus::from_raw(raw))
            }
            StatusSource::GoldenReference => {
                StatusMessage::GoldenReference(GoldenReferenceState::from_raw(raw))
            }
        }
    }

    #[must_use]
    pub const fn source(&self) -> StatusSource {
        match self {
            StatusMessage::CommandProcessor(_) => StatusSource::CommandProcessor,
            StatusMessage::GoldenReference(_) => StatusSource::GoldenReference,
        }
    }
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusMessage::CommandProcessor(status) => status.fmt(f),
            StatusMessage::GoldenReference(state) => state.fmt(f),
        }
    }
}
