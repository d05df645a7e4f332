//! Simulated maXTouch device that answers T66 control writes.

use std::collections::VecDeque;
use std::fmt;
use std::ops::RangeInclusive;

use calibration_core::objects::{INFO_HEADER_LEN, OBJECT_ENTRY_LEN};
use calibration_core::sequencer::FcalCommand;
use calibration_core::{
    ControlCommand, GoldenReferenceState, ObjectDirectory, ObjectTable, ObjectType, Transport,
};

/// Behaviour of the simulated device.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeviceProfile {
    Pass,
    Fail,
    Silent,
    Missing,
    ResetError,
    Chatty,
}

impl DeviceProfile {
    pub const ALL: [DeviceProfile; 6] = [
        DeviceProfile::Pass,
        DeviceProfile::Fail,
        DeviceProfile::Silent,
        DeviceProfile::Missing,
        DeviceProfile::ResetError,
        DeviceProfile::Chatty,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            DeviceProfile::Pass => "pass",
            DeviceProfile::Fail => "fail",
            DeviceProfile::Silent => "silent",
            DeviceProfile::Missing => "missing",
            DeviceProfile::ResetError => "reset-error",
            DeviceProfile::Chatty => "chatty",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            DeviceProfile::Pass => "every phase succeeds",
            DeviceProfile::Fail => "generate reports FCALFAIL",
            DeviceProfile::Silent => "never reports T66 status",
            DeviceProfile::Missing => "object table has no T66",
            DeviceProfile::ResetError => "message queue reset fails",
            DeviceProfile::Chatty => "T6 and T9 messages around every T66 answer",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        Self::ALL
            .into_iter()
            .find(|profile| profile.tag().eq_ignore_ascii_case(tag))
            .ok_or_else(|| format!("Unknown device profile `{tag}`"))
    }
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

struct ObjectLayout {
    object: ObjectType,
    address: u16,
    size: u8,
    instances: u8,
    report_ids: u8,
}

const OBJECT_LAYOUT: [ObjectLayout; 4] = [
    ObjectLayout {
        object: ObjectType::GEN_COMMANDPROCESSOR_T6,
        address: 0x0089,
        size: 6,
        instances: 1,
        report_ids: 1,
    },
    ObjectLayout {
        object: ObjectType::GEN_POWERCONFIG_T7,
        address: 0x008F,
        size: 4,
        instances: 1,
        report_ids: 0,
    },
    ObjectLayout {
        object: ObjectType::TOUCH_MULTITOUCHSCREEN_T9,
        address: 0x0093,
        size: 47,
        instances: 2,
        report_ids: 10,
    },
    ObjectLayout {
        object: ObjectType::SPT_GOLDENREFERENCES_T66,
        address: 0x00F1,
        size: 5,
        instances: 1,
        report_ids: 1,
    },
];

const FAMILY_ID: u8 = 0xA4;
const VARIANT_ID: u8 = 0x02;
const FIRMWARE_VERSION: u8 = 0x10;
const FIRMWARE_BUILD: u8 = 0xAA;
const MATRIX_X: u8 = 24;
const MATRIX_Y: u8 = 14;

/// Info block the device exposes for `profile`.
pub fn info_block(profile: DeviceProfile) -> Vec<u8> {
    let objects: Vec<&ObjectLayout> = OBJECT_LAYOUT
        .iter()
        .filter(|layout| {
            profile != DeviceProfile::Missing
                || layout.object != ObjectType::SPT_GOLDENREFERENCES_T66
        })
        .collect();

    let mut block = Vec::with_capacity(INFO_HEADER_LEN + objects.len() * OBJECT_ENTRY_LEN);
    block.extend_from_slice(&[
        FAMILY_ID,
        VARIANT_ID,
        FIRMWARE_VERSION,
        FIRMWARE_BUILD,
        MATRIX_X,
        MATRIX_Y,
        u8::try_from(objects.len()).unwrap_or(u8::MAX),
    ]);
    for layout in objects {
        let [low, high] = layout.address.to_le_bytes();
        block.extend_from_slice(&[
            layout.object.id(),
            low,
            high,
            layout.size - 1,
            layout.instances - 1,
            layout.report_ids,
        ]);
    }
    block
}

/// Errors surfaced through the simulated transport.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeviceError {
    ResetRejected,
    UnmappedWrite(u16),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::ResetRejected => f.write_str("message queue reset rejected"),
            DeviceError::UnmappedWrite(address) => {
                write!(f, "write to unmapped register 0x{address:04X}")
            }
        }
    }
}

impl std::error::Error for DeviceError {}

const STATE_PRIMED: u8 = GoldenReferenceState::PRIMED;
const STATE_GENERATED_PASS: u8 = GoldenReferenceState::GENERATED | GoldenReferenceState::FCALPASS;
const STATE_GENERATED_FAIL: u8 = GoldenReferenceState::GENERATED | GoldenReferenceState::FCALFAIL;
const STATE_STORED: u8 = GoldenReferenceState::FCALSEQDONE;

const T6_CALIBRATING: u8 = 0x10;
const T6_IDLE: u8 = 0x00;
const T9_TOUCH_DETECT: u8 = 0x80;

/// Device model driven by register writes.
pub struct SimulatedDevice {
    profile: DeviceProfile,
    registers: Vec<RangeInclusive<u16>>,
    t66_address: Option<u16>,
    t66_report: Option<u8>,
    t6_report: Option<u8>,
    t9_report: Option<u8>,
    queue: VecDeque<Vec<u8>>,
    state: Option<GoldenReferenceState>,
    writes: usize,
}

impl SimulatedDevice {
    /// Builds a device whose registers and report IDs follow `table`.
    pub fn new(profile: DeviceProfile, table: &ObjectTable) -> Self {
        let registers = table
            .entries()
            .iter()
            .map(|entry| {
                let len = entry.size() * entry.instances();
                entry.start_address..=entry.start_address.saturating_add(len - 1)
            })
            .collect();
        let first_report = |object| table.report_ids(object).map(|range| *range.start());

        Self {
            profile,
            registers,
            t66_address: table.address_of(ObjectType::SPT_GOLDENREFERENCES_T66, 0),
            t66_report: first_report(ObjectType::SPT_GOLDENREFERENCES_T66),
            t6_report: first_report(ObjectType::GEN_COMMANDPROCESSOR_T6),
            t9_report: first_report(ObjectType::TOUCH_MULTITOUCHSCREEN_T9),
            queue: VecDeque::new(),
            state: None,
            writes: 0,
        }
    }

    /// Last T66 state the device reported.
    pub fn golden_reference_state(&self) -> Option<GoldenReferenceState> {
        self.state
    }

    pub fn register_writes(&self) -> usize {
        self.writes
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    fn answer(&self, command: ControlCommand) -> Option<u8> {
        if self.profile == DeviceProfile::Silent {
            return None;
        }
        match command.fcal_command() {
            FcalCommand::None => None,
            FcalCommand::Prime => Some(STATE_PRIMED),
            FcalCommand::Generate if self.profile == DeviceProfile::Fail => {
                Some(STATE_GENERATED_FAIL)
            }
            FcalCommand::Generate => Some(STATE_GENERATED_PASS),
            FcalCommand::Store => Some(STATE_STORED),
        }
    }

    fn push(&mut self, report: Option<u8>, payload: &[u8]) {
        if let Some(report) = report {
            let mut message = Vec::with_capacity(payload.len() + 1);
            message.push(report);
            message.extend_from_slice(payload);
            self.queue.push_back(message);
        }
    }

    fn control_written(&mut self, value: u8) {
        let command = ControlCommand::from_bits(value);
        let Some(state) = self.answer(command) else {
            return;
        };
        let chatty = self.profile == DeviceProfile::Chatty;

        if chatty {
            self.push(self.t6_report, &[T6_CALIBRATING]);
            self.push(self.t9_report, &[T9_TOUCH_DETECT, 0x40, 0x20, 0x00]);
        }
        if command.contains(ControlCommand::RPTEN) {
            self.push(self.t66_report, &[state]);
        }
        if chatty {
            self.push(self.t6_report, &[T6_IDLE]);
        }
        self.state = Some(GoldenReferenceState::from_raw(state));
    }
}

impl Transport for SimulatedDevice {
    type Error = DeviceError;

    fn write_register(&mut self, address: u16, data: &[u8]) -> Result<(), DeviceError> {
        if !self.registers.iter().any(|range| range.contains(&address)) {
            return Err(DeviceError::UnmappedWrite(address));
        }
        self.writes += 1;
        if Some(address) == self.t66_address
            && let Some(&value) = data.first()
        {
            self.control_written(value);
        }
        Ok(())
    }

    fn pending_message_count(&mut self) -> u16 {
        u16::try_from(self.queue.len()).unwrap_or(u16::MAX)
    }

    fn read_message(&mut self, buf: &mut [u8]) -> usize {
        let Some(message) = self.queue.pop_front() else {
            return 0;
        };
        let len = message.len().min(buf.len());
        buf[..len].copy_from_slice(&message[..len]);
        len
    }

    fn reset_messages(&mut self) -> Result<(), DeviceError> {
        if self.profile == DeviceProfile::ResetError {
            return Err(DeviceError::ResetRejected);
        }
        self.queue.clear();
        Ok(())
    }
}
