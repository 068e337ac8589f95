use std::fmt::Write;

use anyhow::Result;
use clap::Subcommand;

use crate::{
    background::storage::{
        config::{load_config, save_config},
        entities::Config,
        store::KeyValueStore,
    },
    utils::rate::Rate,
};

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    #[command(about = "Print the tracked patterns and the rate")]
    Show,
    #[command(about = "Set the debt charged per minute. Only future time is charged at the new rate")]
    Rate {
        #[arg(help = "Currency per minute, e.g. 0.01 or $0.01")]
        rate: Rate,
    },
    #[command(about = "Track pages whose URL matches a regular expression")]
    Add {
        #[arg(help = "Regular expression, e.g. news\\.ycombinator\\.com")]
        pattern: String,
    },
    #[command(about = "Stop tracking a pattern")]
    Remove { pattern: String },
    #[command(about = "Restore the default patterns and rate")]
    Reset,
}

fn render_config(config: &Config) -> Result<String> {
    let mut output = String::new();
    writeln!(output, "Rate\t{}/min", config.rate)?;
    if config.blackholes.is_empty() {
        writeln!(output, "No tracked patterns")?;
    }
    for blackhole in &config.blackholes {
        writeln!(output, "Pattern\t{}", blackhole.url)?;
    }
    Ok(output)
}

/// Edits are read-modify-write on the stored configuration. A running host picks them up on
/// its next reload.
pub async fn process_config_command(
    store: &impl KeyValueStore,
    command: ConfigCommand,
) -> Result<String> {
    let mut config = load_config(store).await;
    match command {
        ConfigCommand::Show => return render_config(&config),
        ConfigCommand::Rate { rate } => config.set_rate(rate),
        ConfigCommand::Add { pattern } => config.add_pattern(&pattern)?,
        ConfigCommand::Remove { pattern } => config.remove_pattern(&pattern)?,
        ConfigCommand::Reset => config = Config::default(),
    }
    save_config(store, &config).await?;
    render_config(&config)
}
