//! Parser for interactive session commands.

use std::fmt;
use std::time::Duration;

use winnow::ascii::{Caseless, digit1, space0, space1};
use winnow::combinator::{alt, delimited, opt, preceded};
use winnow::prelude::*;
use winnow::token::{literal, take_while};

use crate::device::DeviceProfile;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SessionCommand {
    Calibrate,
    Profile(DeviceProfile),
    Timeout(Duration),
    Verbose(bool),
    History,
    Status,
    Help(Option<String>),
    Exit,
}

/// Input that did not match any command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandSyntaxError {
    pub input: String,
    pub offset: usize,
}

impl fmt::Display for CommandSyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "could not parse `{}` at column {}",
            self.input,
            self.offset + 1
        )
    }
}

pub fn parse_command(line: &str) -> Result<SessionCommand, CommandSyntaxError> {
    delimited(space0, command, space0)
        .parse(line)
        .map_err(|err| CommandSyntaxError {
            input: line.to_string(),
            offset: err.offset(),
        })
}

fn command(input: &mut &str) -> ModalResult<SessionCommand> {
    alt((
        calibrate, profile, timeout, verbose, history, status, help, exit,
    ))
    .parse_next(input)
}

fn word<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '-').parse_next(input)
}

fn calibrate(input: &mut &str) -> ModalResult<SessionCommand> {
    alt((literal(Caseless("calibrate")), literal(Caseless("cal"))))
        .value(SessionCommand::Calibrate)
        .parse_next(input)
}

fn profile(input: &mut &str) -> ModalResult<SessionCommand> {
    preceded(
        (literal(Caseless("profile")), space1),
        word.verify_map(|tag| DeviceProfile::from_tag(tag).ok()),
    )
    .map(SessionCommand::Profile)
    .parse_next(input)
}

fn timeout(input: &mut &str) -> ModalResult<SessionCommand> {
    preceded(
        (literal(Caseless("timeout")), space1),
        digit1.verify_map(|digits: &str| digits.parse::<u64>().ok()),
    )
    .map(|secs| SessionCommand::Timeout(Duration::from_secs(secs)))
    .parse_next(input)
}

fn verbose(input: &mut &str) -> ModalResult<SessionCommand> {
    preceded(
        (literal(Caseless("verbose")), space1),
        alt((
            literal(Caseless("on")).value(true),
            literal(Caseless("off")).value(false),
        )),
    )
    .map(SessionCommand::Verbose)
    .parse_next(input)
}

fn history(input: &mut &str) -> ModalResult<SessionCommand> {
    literal(Caseless("history"))
        .value(SessionCommand::History)
        .parse_next(input)
}

fn status(input: &mut &str) -> ModalResult<SessionCommand> {
    literal(Caseless("status"))
        .value(SessionCommand::Status)
        .parse_next(input)
}

fn help(input: &mut &str) -> ModalResult<SessionCommand> {
    preceded(literal(Caseless("help")), opt(preceded(space1, word)))
        .map(|topic: Option<&str>| SessionCommand::Help(topic.map(str::to_ascii_lowercase)))
        .parse_next(input)
}

fn exit(input: &mut &str) -> ModalResult<SessionCommand> {
    alt((literal(Caseless("exit")), literal(Caseless("quit"))))
        .value(SessionCommand::Exit)
        .parse_next(input)
}
