use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use calibration_core::objects::InfoHeader;
use calibration_core::{
    CalibrationState, DeviceLink, GoldenReferenceCalibration, ObjectDirectory, ObjectTable,
    ObjectType, TimingConfig,
};

use crate::clock::{HostClock, SessionClock, SimulatedClock};
use crate::console::{ConsoleSink, TranscriptLogger, TranscriptRole, format_record};
use crate::device::{DeviceProfile, SimulatedDevice, info_block};
use crate::grammar::{SessionCommand, parse_command};

pub const HELP_TOPICS: &[(&str, &str)] = &[
    (
        "calibrate",
        "calibrate                  - run prime, generate and store against the device",
    ),
    (
        "profile",
        "profile <tag>              - switch the simulated device behaviour",
    ),
    (
        "timeout",
        "timeout <secs>             - set the per-phase status timeout",
    ),
    (
        "verbose",
        "verbose on|off             - show every received message",
    ),
    (
        "history",
        "history                    - list recorded diagnostics",
    ),
    (
        "status",
        "status                     - describe the device and the last run",
    ),
    (
        "help",
        "help [topic]               - show help for a command",
    ),
];

/// Startup options for a session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub profile: DeviceProfile,
    pub timing: TimingConfig,
    pub realtime: bool,
    pub verbose: bool,
    pub transcript: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            profile: DeviceProfile::Pass,
            timing: TimingConfig::default(),
            realtime: false,
            verbose: false,
            transcript: None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct RunSummary {
    profile: DeviceProfile,
    state: CalibrationState,
    status: i32,
    elapsed: Duration,
}

pub struct Session {
    profile: DeviceProfile,
    header: InfoHeader,
    table: ObjectTable,
    device: SimulatedDevice,
    sink: ConsoleSink,
    timing: TimingConfig,
    realtime: bool,
    transcript: Option<TranscriptLogger>,
    started_at: Instant,
    runs: usize,
    last_run: Option<RunSummary>,
    closed: bool,
}

impl Session {
    pub fn new(config: SessionConfig) -> io::Result<Self> {
        let (header, table, device) = load_device(config.profile)?;
        let transcript = match &config.transcript {
            Some(path) => Some(TranscriptLogger::create(
                path,
                "maXTouch golden reference calibration emulator transcript",
            )?),
            None => None,
        };

        Ok(Self {
            profile: config.profile,
            header,
            table,
            device,
            sink: ConsoleSink::new(config.verbose),
            timing: config.timing,
            realtime: config.realtime,
            transcript,
            started_at: Instant::now(),
            runs: 0,
            last_run: None,
            closed: false,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Status code of the most recent calibration, if one ran.
    pub fn last_status(&self) -> Option<i32> {
        self.last_run.map(|run| run.status)
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let elapsed = self.started_at.elapsed();
        self.record(elapsed, TranscriptRole::Host, &[trimmed.to_string()])?;

        let lines = match parse_command(trimmed) {
            Ok(SessionCommand::Calibrate) => self.calibrate(),
            Ok(SessionCommand::Profile(profile)) => self.switch_profile(profile)?,
            Ok(SessionCommand::Timeout(timeout)) => {
                self.timing = self.timing.with_phase_timeout(timeout);
                vec![format!("Phase timeout set to {timeout:?}")]
            }
            Ok(SessionCommand::Verbose(verbose)) => {
                self.sink.set_verbose(verbose);
                vec![format!(
                    "Verbose output {}",
                    if verbose { "on" } else { "off" }
                )]
            }
            Ok(SessionCommand::History) => self.history(),
            Ok(SessionCommand::Status) => self.status(),
            Ok(SessionCommand::Help(topic)) => help(topic.as_deref()),
            Ok(SessionCommand::Exit) => {
                self.closed = true;
                vec!["Session closed.".to_string()]
            }
            Err(err) => vec![format!("ERR syntax {err}")],
        };

        self.record(self.started_at.elapsed(), TranscriptRole::Emulator, &lines)?;
        Ok(lines)
    }

    /// Runs one calibration against the current device.
    pub fn calibrate(&mut self) -> Vec<String> {
        if self.realtime {
            self.calibrate_with(HostClock::new())
        } else {
            self.calibrate_with(SimulatedClock::default())
        }
    }

    fn calibrate_with<C: SessionClock>(&mut self, clock: C) -> Vec<String> {
        self.runs += 1;
        let mut lines = vec![format!(
            "Calibration #{} on `{}` device (phase timeout {:?}, poll interval {:?})",
            self.runs,
            self.profile,
            self.timing.phase_timeout(),
            self.timing.poll_interval()
        )];

        let link = DeviceLink::new(
            &mut self.device,
            &self.table,
            clock,
            &mut self.sink,
        )
        .with_timing(self.timing);
        let mut calibration = GoldenReferenceCalibration::new(link);
        let result = calibration.run();
        let state = calibration.state();
        let (_, _, clock, _) = calibration.into_link().into_parts();
        let elapsed = clock.elapsed();

        lines.extend(self.sink.take_lines());
        let status = match result {
            Ok(()) => {
                lines.push(format!("OK calibration complete in {elapsed:?}"));
                0
            }
            Err(err) => {
                let status = err.status_code();
                lines.push(format!("ERR {err} (status {status})"));
                status
            }
        };

        self.last_run = Some(RunSummary {
            profile: self.profile,
            state,
            status,
            elapsed,
        });
        lines
    }

    fn switch_profile(&mut self, profile: DeviceProfile) -> io::Result<Vec<String>> {
        let (header, table, device) = load_device(profile)?;
        self.profile = profile;
        self.header = header;
        self.table = table;
        self.device = device;
        Ok(vec![format!(
            "Device profile set to `{profile}` ({})",
            profile.description()
        )])
    }

    fn history(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .sink
            .history()
            .map(|record| format_record(record.id, record.level, &record.event))
            .collect();
        if lines.is_empty() {
            return vec!["No diagnostics recorded".to_string()];
        }
        lines.push(format!(
            "{} of {} events retained",
            lines.len(),
            self.sink.total_recorded()
        ));
        lines
    }

    fn status(&self) -> Vec<String> {
        let header = &self.header;
        let mut lines = vec![
            format!("Profile: {} ({})", self.profile, self.profile.description()),
            format!(
                "Device: family 0x{:02X} variant 0x{:02X} firmware {}.{}.{:02X}, matrix {}x{}, {} objects",
                header.family_id,
                header.variant_id,
                header.version >> 4,
                header.version & 0x0F,
                header.build,
                header.matrix_x_size,
                header.matrix_y_size,
                self.table.len()
            ),
        ];

        let t66 = ObjectType::SPT_GOLDENREFERENCES_T66;
        lines.push(match self.table.address_of(t66, 0) {
            Some(address) => format!("{t66} at 0x{address:04X}"),
            None => format!("{t66} not present"),
        });
        if let Some(state) = self.device.golden_reference_state() {
            lines.push(state.to_string());
        }
        lines.push(format!(
            "Register writes: {}, queued messages: {}",
            self.device.register_writes(),
            self.device.pending()
        ));
        lines.push(format!(
            "Timing: phase timeout {:?}, poll interval {:?}, {} clock",
            self.timing.phase_timeout(),
            self.timing.poll_interval(),
            if self.realtime { "host" } else { "simulated" }
        ));
        lines.push(format!(
            "Verbose: {}",
            if self.sink.verbose() { "on" } else { "off" }
        ));
        lines.push(match self.last_run {
            Some(run) => format!(
                "Last run: {:?} on `{}` (status {}) after {:?}",
                run.state, run.profile, run.status, run.elapsed
            ),
            None => "Last run: none".to_string(),
        });
        lines
    }

    fn record(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        lines: &[String],
    ) -> io::Result<()> {
        if let Some(transcript) = self.transcript.as_mut() {
            for line in lines {
                transcript.append_line(elapsed, role, line)?;
            }
        }
        Ok(())
    }
}

fn load_device(
    profile: DeviceProfile,
) -> io::Result<(InfoHeader, ObjectTable, SimulatedDevice)> {
    let (header, table) = ObjectTable::parse(&info_block(profile))
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;
    let device = SimulatedDevice::new(profile, &table);
    Ok((header, table, device))
}

fn help(topic: Option<&str>) -> Vec<String> {
    match topic {
        None => {
            let mut lines = vec!["Commands:".to_string()];
            lines.extend(HELP_TOPICS.iter().map(|(_, usage)| format!("  {usage}")));
            lines.push("  exit | quit                - leave the session".to_string());
            lines.push(format!(
                "Profiles: {}",
                DeviceProfile::ALL.map(DeviceProfile::tag).join(", ")
            ));
            lines
        }
        Some(topic) => match HELP_TOPICS.iter().find(|(name, _)| *name == topic) {
            Some((_, usage)) => vec![(*usage).to_string()],
            None => vec![format!("ERR unknown help topic `{topic}`")],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(profile: DeviceProfile) -> Session {
        Session::new(SessionConfig {
            profile,
            ..SessionConfig::default()
        })
        .expect("session starts")
    }

    #[test]
    fn pass_profile_calibrates_successfully() {
        let mut session = session(DeviceProfile::Pass);
        let lines = session.handle_command("calibrate").expect("io");

        assert_eq!(session.last_status(), Some(0));
        for progress in ["Priming", "Generating", "Storing", "Done"] {
            assert!(
                lines.iter().any(|line| line.ends_with(progress)),
                "missing `{progress}` in {lines:?}"
            );
        }
        assert!(lines.last().is_some_and(|line| line.starts_with("OK")));
    }

    #[test]
    fn failure_profiles_report_status_codes() {
        let cases = [
            (DeviceProfile::Fail, -1),
            (DeviceProfile::Missing, -2),
            (DeviceProfile::ResetError, -5),
            (DeviceProfile::Silent, -110),
        ];
        for (profile, expected) in cases {
            let mut session = session(profile);
            let lines = session.calibrate();
            assert_eq!(
                session.last_status(),
                Some(expected),
                "{profile}: {lines:?}"
            );
        }
    }

    #[test]
    fn chatty_device_still_calibrates() {
        let mut session = session(DeviceProfile::Chatty);
        session.handle_command("verbose on").expect("io");
        let lines = session.handle_command("cal").expect("io");

        assert_eq!(session.last_status(), Some(0));
        assert!(lines.iter().any(|line| line.contains("T6 status: CAL")));
        assert!(lines.iter().any(|line| line.contains("message from T9")));
    }

    #[test]
    fn timeout_and_profile_commands_reconfigure_session() {
        let mut session = session(DeviceProfile::Pass);
        session.handle_command("profile silent").expect("io");
        session.handle_command("timeout 3").expect("io");
        let lines = session.handle_command("calibrate").expect("io");

        assert_eq!(session.last_status(), Some(-110));
        assert!(
            lines.iter().any(|line| line.contains("after 4s")),
            "{lines:?}"
        );
    }

    #[test]
    fn exit_closes_session_and_bad_input_reports_syntax() {
        let mut session = session(DeviceProfile::Pass);
        let lines = session.handle_command("frobnicate").expect("io");
        assert!(lines[0].starts_with("ERR syntax"));
        assert!(!session.is_closed());

        session.handle_command("exit").expect("io");
        assert!(session.is_closed());
    }

    #[test]
    fn status_and_history_describe_the_last_run() {
        let mut session = session(DeviceProfile::Fail);
        assert_eq!(
            session.handle_command("history").expect("io"),
            vec!["No diagnostics recorded"]
        );

        session.handle_command("calibrate").expect("io");
        let status = session.handle_command("status").expect("io");
        assert!(status.iter().any(|line| line == "T66 at 0x00F1"));
        assert!(status.iter().any(|line| line.starts_with("T66 state: 84")));
        assert!(status.iter().any(|line| line.contains("(status -1)")));

        let history = session.handle_command("history").expect("io");
        let summary = history.last().expect("summary line");
        assert!(summary.ends_with("events retained"));
    }
}
