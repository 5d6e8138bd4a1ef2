use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use rollcall_cli::commands::{export, logs, push, replay, status};
use rollcall_cli::store::open_log_store;
use rollcall_cli::{Cli, Commands, Config, LogsAction};
use rollcall_core::{ReportOptions, SessionLogStore, SystemClock};

/// Load config and open the configured log store.
fn open_store(cli: &Cli) -> Result<(Arc<dyn SessionLogStore>, Config, ReportOptions)> {
    let config = load_config(cli)?;
    let options = config
        .report_options()
        .context("invalid report_utc_offset_hours")?;
    let logs = open_log_store(&config, Arc::new(SystemClock))?;
    Ok((logs, config, options))
}

fn load_config(cli: &Cli) -> Result<Config> {
    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // try_init so a subscriber installed by a test harness is left alone
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let mut stdout = std::io::stdout().lock();

    match &cli.command {
        Some(Commands::Status) => {
            let (logs, config, options) = open_store(&cli)?;
            status::run(&mut stdout, &config, logs.as_ref(), &options)?;
        }
        Some(Commands::Logs(action)) => {
            let (logs, _config, options) = open_store(&cli)?;
            match action {
                LogsAction::List { json } => {
                    logs::list(&mut stdout, logs.as_ref(), &options, *json)?;
                }
                LogsAction::Show { id, json } => {
                    logs::show(&mut stdout, logs.as_ref(), &options, id, *json)?;
                }
                LogsAction::Delete { id } => logs::delete(&mut stdout, logs.as_ref(), id)?,
            }
        }
        Some(Commands::Export(args)) => {
            let (logs, _config, options) = open_store(&cli)?;
            export::run(&mut stdout, args, logs.as_ref(), &options)?;
        }
        Some(Commands::Push(args)) => {
            let (logs, config, _options) = open_store(&cli)?;
            push::run(&mut stdout, args, &config, logs)?;
        }
        Some(Commands::Replay(args)) => {
            // Replay supplies its own clock to the store.
            let config = load_config(&cli)?;
            let options = config
                .report_options()
                .context("invalid report_utc_offset_hours")?;
            replay::run(&mut stdout, args, &config, options)?;
        }
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
