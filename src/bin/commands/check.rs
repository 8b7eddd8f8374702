use super::required_arg;
use crate::error::{CliError, CliResult};
use clap::ArgMatches;
use tocsin::config::AlarmConfig;

pub async fn handle_check_command(matches: &ArgMatches) -> CliResult<()> {
    let path = required_arg(matches, "config")?;
    let config = AlarmConfig::load(path)?;
    config.validate().map_err(CliError::ConfigError)?;

    println!("✅ Configuration {} is valid", path);
    println!("📋 Strategies: {}", config.strategies.len());
    for entry in &config.strategies {
        println!(
            "   - {} '{}' priority {}, {} notifications, {} windows",
            entry.strategy.id,
            entry.strategy.name,
            entry.strategy.priority,
            entry.notifications.len(),
            entry.strategy.windows.len()
        );
    }
    println!("🔧 Maintenance endpoints: {}", config.maintenance.len());
    println!("📁 Problem dump: {}", config.judge.dump_path.display());
    println!("🔔 Notifier: {}", config.notify.executable);
    Ok(())
}
