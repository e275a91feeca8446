//! Line grammar for the interactive console.
//!
//! ```text
//! press <duration>      hold the button, e.g. `press 120ms`, `press 4s`
//! wait <duration>       let simulated time pass
//! calibrate             start a calibration run
//! status                recording, tone, button and calibration state
//! files                 list stored log files
//! dump <name>           decode a log file
//! rm <name>             delete a log file
//! journal               print new journal entries
//! help [topic]
//! ```
//!
//! Keywords are case-insensitive. A bare duration is in milliseconds.

use core::fmt;

use winnow::ascii::{Caseless, digit1, space0, space1};
use winnow::combinator::{alt, delimited, opt, preceded};
use winnow::prelude::*;
use winnow::token::take_while;

/// Parsed console command borrowing from the input line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConsoleCommand<'a> {
    Press(u32),
    Wait(u32),
    Calibrate,
    Status,
    Files,
    Dump(&'a str),
    Remove(&'a str),
    Journal,
    Help(Option<&'a str>),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConsoleError {
    Empty,
    /// Parsing stopped at this byte offset.
    Syntax { offset: usize },
}

impl fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleError::Empty => f.write_str("empty command"),
            ConsoleError::Syntax { offset } => write!(f, "syntax error at column {}", offset + 1),
        }
    }
}

/// Parses one console line.
///
/// # Errors
///
/// Returns [`ConsoleError::Empty`] for blank lines and
/// [`ConsoleError::Syntax`] for anything the grammar rejects.
pub fn parse_command(line: &str) -> Result<ConsoleCommand<'_>, ConsoleError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Err(ConsoleError::Empty);
    }
    command.parse(line).map_err(|error| ConsoleError::Syntax {
        offset: error.offset(),
    })
}

fn command<'i>(input: &mut &'i str) -> ModalResult<ConsoleCommand<'i>> {
    delimited(
        space0,
        alt((
            preceded((Caseless("press"), space1), duration).map(ConsoleCommand::Press),
            preceded((Caseless("wait"), space1), duration).map(ConsoleCommand::Wait),
            Caseless("calibrate").value(ConsoleCommand::Calibrate),
            Caseless("status").value(ConsoleCommand::Status),
            Caseless("files").value(ConsoleCommand::Files),
            preceded((Caseless("dump"), space1), name).map(ConsoleCommand::Dump),
            preceded((Caseless("rm"), space1), name).map(ConsoleCommand::Remove),
            Caseless("journal").value(ConsoleCommand::Journal),
            preceded(Caseless("help"), opt(preceded(space1, name))).map(ConsoleCommand::Help),
        )),
        space0,
    )
    .parse_next(input)
}

fn duration(input: &mut &str) -> ModalResult<u32> {
    (
        digit1.parse_to::<u32>(),
        opt(alt((
            Caseless("ms").value(1u32),
            Caseless("s").value(1_000u32),
        ))),
    )
        .verify_map(|(value, scale)| value.checked_mul(scale.unwrap_or(1)))
        .parse_next(input)
}

fn name<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    take_while(1.., |c: char| !c.is_whitespace()).parse_next(input)
}

const TOPICS: &[(&str, &str)] = &[
    ("press", "press <duration>  hold the button, e.g. `press 120ms` or `press 4s`"),
    ("wait", "wait <duration>  advance simulated time"),
    ("calibrate", "calibrate  start a calibration run"),
    ("status", "status  show recording, tone, button and calibration state"),
    ("files", "files  list stored log files"),
    ("dump", "dump <name>  decode the records of a log file"),
    ("rm", "rm <name>  delete a log file"),
    ("journal", "journal  print journal entries recorded since the last call"),
    ("help", "help [topic]  show this summary or details for one command"),
];

/// One-line summary of every command.
pub const HELP_SUMMARY: &str =
    "commands: press wait calibrate status files dump rm journal help";

/// Help text for `topic`, or the summary when no topic is given.
#[must_use]
pub fn help_text(topic: Option<&str>) -> Option<&'static str> {
    let Some(topic) = topic else {
        return Some(HELP_SUMMARY);
    };
    TOPICS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(topic))
        .map(|(_, text)| *text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_durations_with_units() {
        assert_eq!(parse_command("press 120ms"), Ok(ConsoleCommand::Press(120)));
        assert_eq!(parse_command("PRESS 4s"), Ok(ConsoleCommand::Press(4_000)));
        assert_eq!(parse_command("  wait 250  "), Ok(ConsoleCommand::Wait(250)));
    }

    #[test]
    fn parses_names_and_keywords() {
        assert_eq!(
            parse_command("dump /mpulog3.bin"),
            Ok(ConsoleCommand::Dump("/mpulog3.bin"))
        );
        assert_eq!(parse_command("rm mpulog1.bin\r\n"), Ok(ConsoleCommand::Remove("mpulog1.bin")));
        assert_eq!(parse_command("files"), Ok(ConsoleCommand::Files));
        assert_eq!(parse_command("help"), Ok(ConsoleCommand::Help(None)));
        assert_eq!(parse_command("help dump"), Ok(ConsoleCommand::Help(Some("dump"))));
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!(parse_command("   "), Err(ConsoleError::Empty));
        assert!(matches!(parse_command("press"), Err(ConsoleError::Syntax { .. })));
        assert!(matches!(parse_command("press 10h"), Err(ConsoleError::Syntax { .. })));
        assert!(matches!(parse_command("statusx"), Err(ConsoleError::Syntax { .. })));
        assert!(matches!(parse_command("wait 5000000s"), Err(ConsoleError::Syntax { .. })));
    }

    #[test]
    fn help_topics_resolve() {
        assert_eq!(help_text(None), Some(HELP_SUMMARY));
        assert!(help_text(Some("Press")).is_some_and(|text| text.starts_with("press")));
        assert_eq!(help_text(Some("reboot")), None);
    }
}
