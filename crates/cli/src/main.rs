mod args;
mod output;
mod runner;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use args::{Cli, Commands};
use output::print_report;
use runner::{run_scrape, run_worker, LogSettings};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is not an error.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Scrape(args) => {
            let format = args.output_format.clone();
            let logs = LogSettings {
                verbose: cli.verbose,
                json: cli.log_json,
            };
            let report = run_scrape(args, logs).await?;
            print_report(&report, &format)?;
            // Children and background tasks go down with the process.
            std::process::exit(0);
        }
        Commands::Worker(args) => run_worker(args).await?,
    }

    Ok(())
}

/// Logs go to stderr; a worker's stdout carries its IPC channel.
fn init_logging(verbose: u8, json: bool) {
    let log_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}
