pub mod check;
pub mod dump;
pub mod run;

pub use check::handle_check_command;
pub use dump::handle_dump_command;
pub use run::handle_run_command;

use crate::error::{CliError, CliResult};
use clap::ArgMatches;

/// Reads a required string argument.
pub fn required_arg<'a>(matches: &'a ArgMatches, name: &str) -> CliResult<&'a str> {
    let value = matches.value_of(name).ok_or_else(|| CliError::ParseError {
        field: name.to_string(),
        message: format!("--{} is not specified.", name),
    })?;
    if value.trim().is_empty() {
        return Err(CliError::ParseError {
            field: name.to_string(),
            message: format!("--{} cannot be empty.", name),
        });
    }
    Ok(value)
}
