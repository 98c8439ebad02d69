use clap::{builder::ValueParser, Arg, ArgAction, ArgMatches, Command};
use std::str::FromStr;
use tracing::Level;

pub const ARG_VERBOSE: &str = "verbose";
pub const ARG_LOG_LEVEL: &str = "log-level";

/// Accepts a level name in any case (`warn`, `INFO`, ...).
#[must_use]
pub fn log_level_parser() -> ValueParser {
    ValueParser::from(|value: &str| -> std::result::Result<Level, String> {
        Level::from_str(value.trim())
            .map_err(|_| format!("unknown log level '{value}', expected error|warn|info|debug|trace"))
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_VERBOSE)
                .short('v')
                .long(ARG_VERBOSE)
                .help("Raise log verbosity; repeat for more (-v warn, -vv info, -vvv debug, -vvvv trace)")
                .global(true)
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new(ARG_LOG_LEVEL)
                .long(ARG_LOG_LEVEL)
                .help("Log level; takes precedence over -v (default: error)")
                .env("GATEHOUSE_LOG_LEVEL")
                .global(true)
                .value_parser(log_level_parser()),
        )
}

/// `None` leaves the subscriber at its default of `ERROR`.
#[must_use]
pub fn level(matches: &ArgMatches) -> Option<Level> {
    if let Some(level) = matches.get_one::<Level>(ARG_LOG_LEVEL) {
        return Some(*level);
    }
    match matches.get_count(ARG_VERBOSE) {
        0 => None,
        1 => Some(Level::WARN),
        2 => Some(Level::INFO),
        3 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    }
}
