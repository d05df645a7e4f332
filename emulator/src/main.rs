mod clock;
mod console;
mod device;
mod grammar;
mod session;

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use device::DeviceProfile;
use session::{Session, SessionConfig};

const USAGE: &str = "Usage: calibration-emulator [--profile <pass|fail|silent|missing|reset-error|chatty>] \
[--timeout <secs>] [--realtime] [--verbose] [--transcript <path>] [--run]";

struct Options {
    config: SessionConfig,
    run_once: bool,
}

fn main() -> io::Result<()> {
    let options = parse_options(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut session = Session::new(options.config)?;

    if options.run_once {
        for line in session.handle_command("calibrate")? {
            writeln!(writer, "{line}")?;
        }
        writer.flush()?;
        let code = match session.last_status() {
            Some(0) => 0,
            _ => 1,
        };
        process::exit(code);
    }

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let mut line = String::new();

    writeln!(
        writer,
        "maXTouch golden reference emulator ready. Type `help` for commands or `exit` to quit."
    )?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let responses = session.handle_command(&line)?;
        for response in responses {
            writeln!(writer, "{response}")?;
        }

        if session.is_closed() {
            break;
        }
    }

    Ok(())
}

fn parse_options(mut args: impl Iterator<Item = String>) -> Result<Options, String> {
    let mut options = Options {
        config: SessionConfig::default(),
        run_once: false,
    };

    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => {
                (flag.to_string(), Some(value.to_string()))
            }
            _ => (arg.clone(), None),
        };
        let mut value = |name: &str| {
            inline
                .clone()
                .or_else(|| args.next())
                .ok_or_else(|| format!("Expected value after {name}"))
        };

        match flag.as_str() {
            "--profile" => options.config.profile = DeviceProfile::from_tag(&value("--profile")?)?,
            "--timeout" => {
                let raw = value("--timeout")?;
                let secs = raw
                    .parse::<u64>()
                    .map_err(|_| format!("Invalid timeout `{raw}`, expected whole seconds"))?;
                options.config.timing = options
                    .config
                    .timing
                    .with_phase_timeout(Duration::from_secs(secs));
            }
            "--transcript" => {
                options.config.transcript = Some(PathBuf::from(value("--transcript")?));
            }
            "--realtime" => options.config.realtime = true,
            "--verbose" => options.config.verbose = true,
            "--run" => options.run_once = true,
            other if !other.starts_with('-') => {
                options.config.profile = DeviceProfile::from_tag(other)?;
            }
            other => return Err(format!("Unknown option `{other}`")),
        }
    }

    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Options, String> {
        parse_options(args.iter().map(|arg| (*arg).to_string()))
    }

    #[test]
    fn defaults_to_simulated_pass_profile() {
        let options = parse(&[]).expect("parses");
        assert_eq!(options.config.profile, DeviceProfile::Pass);
        assert!(!options.config.realtime);
        assert!(!options.run_once);
        assert_eq!(
            options.config.timing.phase_timeout(),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn accepts_separate_and_inline_values() {
        let options = parse(&[
            "--profile",
            "fail",
            "--timeout=5",
            "--transcript",
            "out/session.log",
            "--verbose",
            "--run",
        ])
        .expect("parses");
        assert_eq!(options.config.profile, DeviceProfile::Fail);
        assert_eq!(
            options.config.timing.phase_timeout(),
            Duration::from_secs(5)
        );
        assert_eq!(
            options.config.transcript,
            Some(PathBuf::from("out/session.log"))
        );
        assert!(options.config.verbose);
        assert!(options.run_once);
    }

    #[test]
    fn bare_tag_selects_profile() {
        let options = parse(&["chatty"]).expect("parses");
        assert_eq!(options.config.profile, DeviceProfile::Chatty);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse(&["--profile"]).is_err());
        assert!(parse(&["--timeout", "soon"]).is_err());
        assert!(parse(&["--bogus"]).is_err());
        assert!(parse(&["weird"]).is_err());
    }
}
