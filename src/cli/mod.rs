pub mod archive;
pub mod options;
pub mod report;

use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    sync::Arc,
};

use anyhow::Result;
use archive::{archive_now, delete_month};
use clap::{Parser, Subcommand};
use options::{process_config_command, ConfigCommand};
use report::{history, report, show};
use tracing::level_filters::LevelFilter;

use crate::{
    background::{start_host, storage::store::FileStore, DEFAULT_CHECK_INTERVAL},
    utils::{
        clock::{Clock, DefaultClock},
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX, HOST_PREFIX},
        time::parse_month_key,
    },
};

#[derive(Parser, Debug)]
#[command(name = "blackhole-debt", version, long_about = None)]
#[command(about = "Turns time spent on distracting websites into a monthly debt", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Show time and debt of the current month")]
    Report,
    #[command(about = "List previous months, most recent first")]
    History,
    #[command(about = "Show every site of one month")]
    Show {
        #[arg(value_parser = month_arg, help = "Month as YYYY-MM")]
        month: String,
    },
    #[command(about = "Delete a previous month for good")]
    Delete {
        #[arg(value_parser = month_arg, help = "Month as YYYY-MM")]
        month: String,
        #[arg(long, short, help = "Don't ask for confirmation")]
        yes: bool,
    },
    #[command(about = "Archive the current month now instead of waiting for it to end")]
    Archive {
        #[arg(long, short, help = "Don't ask for confirmation")]
        yes: bool,
    },
    #[command(about = "Show or change tracked sites and the rate")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    #[command(
        about = "Run the native messaging host directly in current console. Used for debugging"
    )]
    Serve,
}

fn month_arg(value: &str) -> Result<String> {
    parse_month_key(value)
}

/// Asks a yes/no question on the terminal. Anything but an explicit yes is a no.
fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(
        answer.trim().to_lowercase().as_str(),
        "y" | "yes"
    ))
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let dir = args.dir.map_or_else(create_application_default_path, Ok)?;
    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    let prefix = match args.commands {
        Commands::Serve => HOST_PREFIX,
        _ => CLI_PREFIX,
    };
    enable_logging(prefix, &dir.join("logs"), logging_level, args.log)?;

    if let Commands::Serve = args.commands {
        return start_host(dir, DEFAULT_CHECK_INTERVAL).await;
    }

    let store = Arc::new(FileStore::new(dir)?);
    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);

    let output = match args.commands {
        Commands::Report => report(&store, clock).await?,
        Commands::History => history(&store, clock).await?,
        Commands::Show { month } => show(&store, clock, &month).await?,
        Commands::Delete { month, yes } => {
            if !yes && !confirm(&format!("Delete all data of {month}?"))? {
                return Ok(());
            }
            delete_month(&store, clock, &month).await?
        }
        Commands::Archive { yes } => {
            if !yes && !confirm("Archive the current month?")? {
                return Ok(());
            }
            archive_now(&store, clock).await?
        }
        Commands::Config { command } => process_config_command(&store, command).await?,
        Commands::Serve => return Ok(()),
    };
    print!("{output}");
    Ok(())
}
