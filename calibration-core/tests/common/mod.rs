#![allow(dead_code)]

use core::fmt;
use core::time::Duration;
use std::collections::VecDeque;

use calibration_core::diagnostics::DiagnosticsLog;
use calibration_core::{
    Clock, DeviceLink, GoldenReferenceCalibration, MonotonicInstant, ObjectEntry, ObjectTable,
    ObjectType, Transport,
};

pub const REPORT_T6: u8 = 1;
pub const REPORT_T9: u8 = 2;
pub const REPORT_T66: u8 = 22;
pub const T66_ADDRESS: u16 = 0x00F1;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct MockInstant(u64);

impl MockInstant {
    pub fn micros(value: u64) -> Self {
        Self(value)
    }
}

impl MonotonicInstant for MockInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

/// Clock whose delay advances time instantly.
#[derive(Debug, Default)]
pub struct MockClock {
    now: u64,
    pub delays: Vec<Duration>,
}

impl MockClock {
    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.now)
    }
}

impl Clock for MockClock {
    type Instant = MockInstant;

    fn now(&self) -> MockInstant {
        MockInstant::micros(self.now)
    }

    fn delay(&mut self, duration: Duration) {
        self.delays.push(duration);
        self.now += u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MockError {
    WriteRejected,
    ResetRejected,
}

impl fmt::Display for MockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MockError::WriteRejected => f.write_str("write rejected"),
            MockError::ResetRejected => f.write_str("reset rejected"),
        }
    }
}

/// Scripted device: each register write releases the next batch of messages.
#[derive(Debug, Default)]
pub struct MockDevice {
    responses: VecDeque<Vec<Vec<u8>>>,
    queue: VecDeque<Vec<u8>>,
    pub writes: Vec<(u16, Vec<u8>)>,
    pub reset_fails: bool,
    pub write_fails: bool,
    pub resets: u32,
    pub count_queries: u32,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the messages released by the next unanswered write.
    pub fn respond(mut self, messages: &[&[u8]]) -> Self {
        self.responses.push_back(messages.iter().map(|message| message.to_vec()).collect());
        self
    }

    /// Places a message on the device queue immediately.
    pub fn preload(mut self, message: &[u8]) -> Self {
        self.queue.push_back(message.to_vec());
        self
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn written_bytes(&self) -> Vec<u8> {
        self.writes
            .iter()
            .flat_map(|(_, data)| data.iter().copied())
            .collect()
    }
}

impl Transport for MockDevice {
    type Error = MockError;

    fn write_register(&mut self, address: u16, data: &[u8]) -> Result<(), MockError> {
        if self.write_fails {
            return Err(MockError::WriteRejected);
        }
        self.writes.push((address, data.to_vec()));
        if let Some(batch) = self.responses.pop_front() {
            self.queue.extend(batch);
        }
        Ok(())
    }

    fn pending_message_count(&mut self) -> u16 {
        self.count_queries += 1;
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

    fn reset_messages(&mut self) -> Result<(), MockError> {
        self.resets += 1;
        if self.reset_fails {
            return Err(MockError::ResetRejected);
        }
        self.queue.clear();
        Ok(())
    }
}

/// T6, T7, two T9 instances and T66, laid out like a small maXTouch part.
pub fn object_table() -> ObjectTable {
    let mut table = ObjectTable::new();
    table
        .push(ObjectEntry::new(ObjectType::GEN_COMMANDPROCESSOR_T6, 0x0089, 6, 0, 1))
        .expect("T6 fits");
    table
        .push(ObjectEntry::new(ObjectType::GEN_POWERCONFIG_T7, 0x0090, 2, 0, 0))
        .expect("T7 fits");
    table
        .push(ObjectEntry::new(ObjectType::TOUCH_MULTITOUCHSCREEN_T9, 0x0093, 46, 1, 10))
        .expect("T9 fits");
    table
        .push(ObjectEntry::new(ObjectType::SPT_GOLDENREFERENCES_T66, T66_ADDRESS, 4, 0, 1))
        .expect("T66 fits");
    table
}

/// Same layout without the golden reference object.
pub fn object_table_without_t66() -> ObjectTable {
    let mut table = ObjectTable::new();
    table
        .push(ObjectEntry::new(ObjectType::GEN_COMMANDPROCESSOR_T6, 0x0089, 6, 0, 1))
        .expect("T6 fits");
    table
        .push(ObjectEntry::new(ObjectType::TOUCH_MULTITOUCHSCREEN_T9, 0x0093, 46, 1, 10))
        .expect("T9 fits");
    table
}

pub type MockLink = DeviceLink<MockDevice, ObjectTable, MockClock, DiagnosticsLog>;
pub type MockCalibration =
    GoldenReferenceCalibration<MockDevice, ObjectTable, MockClock, DiagnosticsLog>;

pub fn link(device: MockDevice) -> MockLink {
    link_with_table(device, object_table())
}

pub fn link_with_table(device: MockDevice, table: ObjectTable) -> MockLink {
    DeviceLink::new(device, table, MockClock::default(), DiagnosticsLog::new())
}

pub fn calibration(device: MockDevice) -> MockCalibration {
    GoldenReferenceCalibration::new(link(device))
}

/// Rendered diagnostic lines, oldest first.
pub fn lines(log: &DiagnosticsLog) -> Vec<String> {
    log.oldest_first()
        .map(|record| record.event.to_string())
        .collect()
}
