pub mod cli;
pub mod commands;
pub mod config;
pub mod cutout;
pub mod error;
pub mod fits_image;
pub mod metadata;
pub mod models;
pub mod output;
pub mod pipeline;
pub mod profile;
pub mod record_index;
pub mod stats;
pub mod streak_view;
pub mod trail;
pub mod wcs;

// Main entry point
pub mod cli_main;

// Re-export commonly used items
pub use error::{TrailError, TrailResult};
pub use fits_image::FitsImage;
pub use pipeline::{TrailPipeline, TrailProduct};
pub use wcs::{CelestialWcs, PixelPoint, SkyPoint};
