use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ft_cli::commands::{history, ignore, track, window};
use ft_cli::desktop::GnomeSource;
use ft_cli::{Cli, Commands, Config, IgnoreAction};

fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
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
    // try_init: tests may have installed a subscriber already.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    match &cli.command {
        Some(Commands::Window) => {
            window::run(&GnomeSource::new())?;
        }
        Some(Commands::Track {
            submit,
            dry_run,
            save,
        }) => {
            let config = load_config(cli.config.as_deref())?;
            track::run(&config, *submit, *dry_run, *save)?;
        }
        Some(Commands::Ignore(action)) => {
            let config = load_config(cli.config.as_deref())?;
            let path = &config.ignore_path;
            match action {
                IgnoreAction::List => ignore::list(path)?,
                IgnoreAction::Add { application } => ignore::add(path, application)?,
                IgnoreAction::Remove { application } => ignore::remove(path, application)?,
                IgnoreAction::Scan { seconds } => {
                    ignore::scan(&GnomeSource::new(), path, *seconds, std::io::stdin().lock())?;
                }
            }
        }
        Some(Commands::History {
            limit,
            sessions,
            json,
        }) => {
            let config = load_config(cli.config.as_deref())?;
            let Some(db_path) = &config.database_path else {
                bail!("no database_path configured; the store sink is disabled");
            };
            let db = ft_db::Database::open(db_path).context("failed to open database")?;
            if *sessions {
                history::run_sessions(&db, *limit, *json)?;
            } else {
                history::run(&db, *limit, *json)?;
            }
        }
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
