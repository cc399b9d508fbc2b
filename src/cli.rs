use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "trail-cutout")]
#[command(about = "Cut out asteroid trails from FITS exposures and measure their brightness", long_about = None)]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Cut out one trail from one exposure
    Cutout {
        /// Path to the FITS exposure
        fits_path: String,

        /// Start position right ascension in degrees
        #[arg(long, allow_hyphen_values = true)]
        ra_start: f64,

        /// Start position declination in degrees
        #[arg(long, allow_hyphen_values = true)]
        dec_start: f64,

        /// End position right ascension in degrees
        #[arg(long, allow_hyphen_values = true)]
        ra_end: f64,

        /// End position declination in degrees
        #[arg(long, allow_hyphen_values = true)]
        dec_end: f64,

        /// Object identifier, used as the output subdirectory
        #[arg(long, default_value = "unknown")]
        object: String,

        /// Observation record to take time and magnitude from
        #[arg(long)]
        record: Option<String>,

        /// Output directory (overrides config)
        #[arg(short, long)]
        output: Option<String>,

        /// Minimum cutout side in pixels (overrides config)
        #[arg(long)]
        min_size: Option<f64>,

        /// Also write a JSON summary next to the cutout
        #[arg(long)]
        json: bool,

        /// Output format for the summary printed to stdout (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Process every observation record below a directory
    Batch {
        /// Root directory holding one subdirectory per object
        root: String,

        /// Output directory (overrides config)
        #[arg(short, long)]
        output: Option<String>,

        /// Worker threads (default: all cores)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Minimum cutout side in pixels (overrides config)
        #[arg(long)]
        min_size: Option<f64>,

        /// Also write a JSON summary next to each cutout
        #[arg(long)]
        json: bool,

        /// Output format for the run report (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the astrometry and seeing of a FITS file
    ReadFits {
        /// Path to the FITS file
        path: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}
