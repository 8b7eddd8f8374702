use clap::{App, Arg, SubCommand};
use std::error::Error;

mod commands;
mod error;

use commands::*;
use error::CliError;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let matches = App::new("tocsin")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Alarm classification and notification service")
        .subcommand(
            SubCommand::with_name("run")
                .about("Run the alarm service")
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .value_name("FILE")
                        .help("Path to the .toml or .json configuration")
                        .required(true),
                )
                .arg(
                    Arg::new("events")
                        .short('e')
                        .long("events")
                        .value_name("FILE")
                        .help("JSON-lines event file; reads standard input when omitted")
                        .required(false),
                ),
        )
        .subcommand(
            SubCommand::with_name("check")
                .about("Validate a configuration file")
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .value_name("FILE")
                        .help("Path to the .toml or .json configuration")
                        .required(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("dump")
                .about("Print the ids held in a Problem Memory dump")
                .arg(
                    Arg::new("path")
                        .short('p')
                        .long("path")
                        .value_name("FILE")
                        .help("Path to the dump file")
                        .required(true),
                ),
        )
        .get_matches();

    let result: Result<(), Box<dyn Error>> = match matches.subcommand() {
        Some(("run", sub_matches)) => handle_run_command(sub_matches).await.map_err(Into::into),
        Some(("check", sub_matches)) => {
            handle_check_command(sub_matches).await.map_err(Into::into)
        }
        Some(("dump", sub_matches)) => handle_dump_command(sub_matches).await.map_err(Into::into),
        Some((cmd, _)) => Err(CliError::UnknownCommand(cmd.to_string()).into()),
        None => Err(CliError::NoCommand.into()),
    };

    if let Err(err) = result {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }

    Ok(())
}
