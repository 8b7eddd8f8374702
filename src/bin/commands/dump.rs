use super::required_arg;
use crate::error::CliResult;
use clap::ArgMatches;
use std::path::Path;
use tocsin::judge::ProblemMemory;

pub async fn handle_dump_command(matches: &ArgMatches) -> CliResult<()> {
    let path = required_arg(matches, "path")?;
    let ids = ProblemMemory::load(Path::new(path))?;

    if ids.is_empty() {
        println!("No open problems in {}", path);
        return Ok(());
    }
    println!("{} open problems in {}:", ids.len(), path);
    for id in ids {
        println!("  {}", id);
    }
    Ok(())
}
