//! Command grammar for the emulator REPL.

use core::fmt;

use cdi_core::calibration::SelectorError;
use winnow::ModalResult;
use winnow::ascii::{dec_uint, space0, space1};
use winnow::combinator::{alt, eof, opt, preceded, terminated};
use winnow::prelude::*;

/// Parsed REPL command.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Command {
    Help,
    Status,
    /// Dump the whole map, or one bucket.
    Map { bucket: Option<u8> },
    /// Raw selector positions: advance start, max advance, gradient, min retard.
    Select([u8; 4]),
    Valve(bool),
    Limiter(bool),
    Run { rpm: u32, revs: Option<u32> },
    Stall,
    Log,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CommandError {
    /// Input did not match the grammar; `offset` is where parsing stopped.
    Syntax { offset: usize },
    Selector(SelectorError),
    Argument(&'static str),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Syntax { offset } => write!(f, "syntax at column {}", offset + 1),
            CommandError::Selector(err) => write!(f, "{err}"),
            CommandError::Argument(detail) => write!(f, "argument {detail}"),
        }
    }
}

impl From<SelectorError> for CommandError {
    fn from(err: SelectorError) -> Self {
        CommandError::Selector(err)
    }
}

/// Parses one trimmed command line.
pub fn parse(line: &str) -> Result<Command, CommandError> {
    terminated(command, (space0, eof))
        .parse(line)
        .map_err(|err| CommandError::Syntax {
            offset: err.offset(),
        })
}

fn command(input: &mut &str) -> ModalResult<Command> {
    alt((
        "help".value(Command::Help),
        "status".value(Command::Status),
        "stall".value(Command::Stall),
        "log".value(Command::Log),
        map_command,
        select_command,
        preceded(("valve", space1), switch).map(Command::Valve),
        preceded(("limiter", space1), switch).map(Command::Limiter),
        run_command,
    ))
    .parse_next(input)
}

fn switch(input: &mut &str) -> ModalResult<bool> {
    alt(("on".value(true), "off".value(false))).parse_next(input)
}

fn map_command(input: &mut &str) -> ModalResult<Command> {
    preceded("map", opt(preceded(space1, dec_uint)))
        .map(|bucket| Command::Map { bucket })
        .parse_next(input)
}

fn select_command(input: &mut &str) -> ModalResult<Command> {
    preceded(
        "select",
        (
            preceded(space1, dec_uint),
            preceded(space1, dec_uint),
            preceded(space1, dec_uint),
            preceded(space1, dec_uint),
        ),
    )
    .map(|(start, max, gradient, retard)| Command::Select([start, max, gradient, retard]))
    .parse_next(input)
}

fn run_command(input: &mut &str) -> ModalResult<Command> {
    preceded(
        "run",
        (
            preceded(space1, dec_uint),
            opt(preceded(space1, dec_uint)),
        ),
    )
    .map(|(rpm, revs)| Command::Run { rpm, revs })
    .parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_keywords_parse() {
        assert_eq!(parse("help"), Ok(Command::Help));
        assert_eq!(parse("status"), Ok(Command::Status));
        assert_eq!(parse("stall "), Ok(Command::Stall));
        assert_eq!(parse("log"), Ok(Command::Log));
        assert_eq!(parse("map"), Ok(Command::Map { bucket: None }));
    }

    #[test]
    fn arguments_are_decoded() {
        assert_eq!(parse("map 40"), Ok(Command::Map { bucket: Some(40) }));
        assert_eq!(parse("select 1 2 1 0"), Ok(Command::Select([1, 2, 1, 0])));
        assert_eq!(parse("valve off"), Ok(Command::Valve(false)));
        assert_eq!(parse("limiter  on"), Ok(Command::Limiter(true)));
        assert_eq!(
            parse("run 9800"),
            Ok(Command::Run {
                rpm: 9_800,
                revs: None
            })
        );
        assert_eq!(
            parse("run 4000 25"),
            Ok(Command::Run {
                rpm: 4_000,
                revs: Some(25)
            })
        );
    }

    #[test]
    fn malformed_lines_report_where_parsing_stopped() {
        assert!(matches!(parse("select 1 2 1"), Err(CommandError::Syntax { .. })));
        assert!(matches!(parse("valve maybe"), Err(CommandError::Syntax { .. })));
        assert!(matches!(parse("statusx"), Err(CommandError::Syntax { .. })));
        assert!(matches!(parse("map 300"), Err(CommandError::Syntax { .. })));
        assert!(matches!(parse("reboot"), Err(CommandError::Syntax { .. })));
    }
}
