use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use idscan_core::Rect;

mod commands;
mod config;
mod live;

use config::Config;

#[derive(Parser)]
#[command(
    name = "idscan",
    about = "Capture student ID cards, binarize them for OCR and extract their fields",
    version
)]
struct Cli {
    /// Config file (default: the per-user idscan.toml, if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract card fields from OCR text
    Extract {
        /// Text file; reads stdin when omitted
        file: Option<PathBuf>,

        /// Print the extraction as JSON
        #[arg(long)]
        json: bool,
    },

    /// Scan a single image
    Scan {
        /// Image file (JPEG, PNG, ...)
        image: PathBuf,

        /// Region to read as X,Y,W,H (default: the centered scan area)
        #[arg(short, long)]
        region: Option<Rect>,

        /// Do not write files or index the scan
        #[arg(long)]
        no_save: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interactive capture loop over a directory of frames
    Live {
        /// Directory of frame images, replayed in name order
        #[arg(short, long)]
        frames: PathBuf,

        /// Delay between frames in milliseconds
        #[arg(long, default_value_t = 100)]
        interval_ms: u64,
    },

    /// Scan every image dropped into a directory
    Watch {
        /// Directory to watch
        dir: PathBuf,
    },

    /// List recent scans
    History {
        /// Number of scans to show
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: u32,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Extract { file, json } => commands::extract(file.as_deref(), json),
        Commands::Scan { image, region, no_save, json } => {
            commands::scan(&config, image, region, !no_save, json).await
        }
        Commands::Live { frames, interval_ms } => {
            let ctx = commands::AppContext::from_config(&config).await?;
            live::live(&ctx, &frames, Duration::from_millis(interval_ms)).await?;
            Ok(())
        }
        Commands::Watch { dir } => commands::watch(&config, dir).await,
        Commands::History { limit, json } => commands::history(&config, limit, json).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn scan_arguments() {
        let cli = Cli::try_parse_from(["idscan", "scan", "card.jpg", "--region", "10,20,300,150", "--no-save"]).unwrap();
        match cli.command {
            Commands::Scan { image, region, no_save, json } => {
                assert_eq!(image, PathBuf::from("card.jpg"));
                assert_eq!(region, Some(Rect::new(10, 20, 300, 150)));
                assert!(no_save);
                assert!(!json);
            }
            _ => panic!("expected scan"),
        }
    }

    #[test]
    fn bad_region_is_rejected() {
        assert!(Cli::try_parse_from(["idscan", "scan", "card.jpg", "--region", "10,20"]).is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["idscan", "history", "-n", "5", "--config", "x.toml", "-v"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(cli.command, Commands::History { limit: 5, json: false }));
    }
}
