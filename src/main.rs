//! Market Regimes - Main Entry Point

use clap::Parser;
use market_regimes::cli::{cmd_config, cmd_info, cmd_run, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "market_regimes=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { data, config, output, no_decompose, n_jobs } => {
            cmd_run(&data, config.as_deref(), output.as_deref(), no_decompose, n_jobs)?;
        }
        Commands::Config { output } => {
            cmd_config(output.as_deref())?;
        }
        Commands::Info { data } => {
            cmd_info(&data)?;
        }
    }

    Ok(())
}
