mod config;
mod discover;
mod emit;
mod history;
mod metrics;
mod pipeline;
mod sanitize;
mod timestamp;

use clap::Parser;
use std::path::PathBuf;

/// Stateless metrics collector for CloudBerry Backup: reads the plan
/// documents and history log from the data directory, then emits
/// scollector-style newline-delimited JSON on stdout. Diagnostics go to
/// stderr only. Meant to be run periodically by an external scheduler;
/// one pass per invocation.
#[derive(Parser, Debug)]
#[command(name = "cloudberry-collector", version, about)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "collector.toml")]
    config: PathBuf,

    /// CloudBerry data directory (overrides config)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Also report per-file operations from each job's last run
    #[arg(long)]
    files: bool,

    /// Drop the host tag from all emitted points
    #[arg(long)]
    no_host: bool,

    /// Extra logging (per-plan queries, skipped rows)
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    // Logs must stay off stdout: that stream is the metric data itself.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(if cli.verbose { "debug" } else { "info" })
        });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let mut settings = match config::load(&cli.config) {
        Ok(config) => config.collector,
        Err(e) => {
            tracing::error!(error = %e, "cannot load configuration");
            std::process::exit(1);
        }
    };
    if let Some(dir) = cli.data_dir {
        settings.data_dir = dir;
    }
    if cli.files {
        settings.report_file_operations = true;
    }
    if cli.no_host {
        settings.omit_host = true;
    }

    tracing::debug!(?settings, "starting collection pass");

    let stdout = std::io::stdout();
    if let Err(e) = pipeline::run(&settings, stdout.lock()) {
        tracing::error!(error = %e, "collection aborted");
        std::process::exit(1);
    }
}
