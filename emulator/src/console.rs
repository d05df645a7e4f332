use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::mem;
use std::path::Path;
use std::time::Duration;

use calibration_core::diagnostics::{DiagnosticLevel, DiagnosticRecord};
use calibration_core::{DiagnosticEvent, DiagnosticsLog, DiagnosticsSink};

/// Collects operator-facing lines and keeps the full event history.
pub struct ConsoleSink {
    history: DiagnosticsLog,
    pending: Vec<String>,
    verbose: bool,
}

impl ConsoleSink {
    pub fn new(verbose: bool) -> Self {
        Self {
            history: DiagnosticsLog::new(),
            pending: Vec::new(),
            verbose,
        }
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Lines produced since the last call.
    pub fn take_lines(&mut self) -> Vec<String> {
        mem::take(&mut self.pending)
    }

    pub fn history(&self) -> impl Iterator<Item = &DiagnosticRecord> + '_ {
        self.history.oldest_first()
    }

    pub fn total_recorded(&self) -> u32 {
        self.history.total_recorded()
    }
}

impl DiagnosticsSink for ConsoleSink {
    fn emit(&mut self, event: &DiagnosticEvent) {
        let id = self.history.record(event.clone());
        let level = event.level();
        if self.verbose || level > DiagnosticLevel::Verbose {
            self.pending.push(format_record(id, level, event));
        }
    }
}

pub fn format_record(id: u32, level: DiagnosticLevel, event: &DiagnosticEvent) -> String {
    format!("#{id:<4} [{level}] {event}")
}

/// Who produced a transcript line.
#[derive(Clone, Copy, Debug)]
pub enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

/// Append-only session transcript.
pub struct TranscriptLogger {
    writer: BufWriter<File>,
}

impl TranscriptLogger {
    pub fn create(path: &Path, header: &str) -> io::Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };
        writeln!(logger.writer, "# {header}")?;
        writeln!(
            logger.writer,
            "# Timestamps are milliseconds since session start"
        )?;
        writeln!(logger.writer)?;
        logger.writer.flush()?;
        Ok(logger)
    }

    pub fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calibration_core::CalibrationPhase;
    use calibration_core::ObjectType;

    #[test]
    fn verbose_events_are_hidden_unless_enabled() {
        let mut sink = ConsoleSink::new(false);
        sink.emit(&DiagnosticEvent::message_received(
            ObjectType::SPT_GOLDENREFERENCES_T66,
            &[0x02],
        ));
        sink.emit(&DiagnosticEvent::PhaseStarted(CalibrationPhase::Prime));

        assert_eq!(sink.take_lines(), vec!["#1    [info] Priming".to_string()]);
        assert_eq!(sink.total_recorded(), 2);

        sink.set_verbose(true);
        sink.emit(&DiagnosticEvent::message_received(
            ObjectType::SPT_GOLDENREFERENCES_T66,
            &[0x02],
        ));
        assert_eq!(
            sink.take_lines(),
            vec!["#2    [verbose] message from T66: 02".to_string()]
        );
        assert!(sink.take_lines().is_empty());
    }

    #[test]
    fn transcript_lines_carry_role_and_timestamp() {
        let path = std::env::temp_dir().join(format!(
            "calibration-emulator-transcript-{}.log",
            std::process::id()
        ));
        let mut transcript = TranscriptLogger::create(&path, "test transcript").expect("create");
        transcript
            .append_line(Duration::from_millis(42), TranscriptRole::Host, "calibrate")
            .expect("append");
        drop(transcript);

        let contents = fs::read_to_string(&path).expect("read back");
        let _ = fs::remove_file(&path);
        assert!(contents.starts_with("# test transcript\n"));
        assert!(contents.contains("[+    42 ms] HOST> calibrate"));
    }
}
