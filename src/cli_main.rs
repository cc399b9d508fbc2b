use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use crate::cli::{Cli, Commands};
use crate::commands::{cutout, read_fits, run_batch_command, CutoutRequest};
use crate::config::Config;
use crate::wcs::SkyPoint;

pub fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();

    // Load configuration from file or use defaults
    let mut config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)
            .with_context(|| format!("Failed to load config file: {}", config_path))?
    } else {
        Config::default()
    };

    match cli.command {
        Commands::Cutout {
            fits_path,
            ra_start,
            dec_start,
            ra_end,
            dec_end,
            object,
            record,
            output,
            min_size,
            json,
            format,
        } => {
            config.merge_with_cli(output, min_size, None, json);
            config
                .validate()
                .context("Configuration validation failed")?;

            let request = CutoutRequest {
                fits_path: PathBuf::from(fits_path),
                start: SkyPoint::new(ra_start, dec_start),
                end: SkyPoint::new(ra_end, dec_end),
                object,
                record: record.map(PathBuf::from),
            };
            cutout(&config, &request, &format)?;
        }
        Commands::Batch {
            root,
            output,
            workers,
            min_size,
            json,
            format,
        } => {
            config.merge_with_cli(output, min_size, workers, json);
            config
                .validate()
                .context("Configuration validation failed")?;

            run_batch_command(&config, Path::new(&root), &format)?;
        }
        Commands::ReadFits { path, format } => {
            read_fits(Path::new(&path), &format)?;
        }
    }

    Ok(())
}
