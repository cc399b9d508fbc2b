use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for trail cutout runs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Geometry and sampling parameters
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Where and what to write
    #[serde(default)]
    pub output: OutputConfig,
    /// How observation records map onto exposures
    #[serde(default)]
    pub observation: ObservationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Smallest cutout side in pixels (default: 100)
    pub min_cutout_size: f64,
    /// Multiplier applied to the larger endpoint span (default: 1.5)
    pub size_factor: f64,
    /// Fixed border added to the scaled span, in pixels (default: 50)
    pub margin: f64,
    /// Mask half-width as a multiple of the seeing FWHM in pixels (default: 2.0)
    pub mask_width_multiplier: f64,
    /// Number of points in the brightness profile (default: 100)
    pub profile_samples: usize,
    /// Display window is median ± this many standard deviations (default: 2.0)
    pub display_sigma: f64,
    /// Profile band is intensity ± this many standard deviations (default: 1.0)
    pub band_sigma: f64,
    /// Rotated streak view spans ± this many FWHM around the midpoint (default: 4.0)
    pub streak_crop_factor: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root directory for cutout products (default: "cutouts")
    pub directory: Option<String>,
    /// Write the cutout FITS file (default: true)
    pub fits: Option<bool>,
    /// Write the plain-text metadata file (default: true)
    pub metadata: Option<bool>,
    /// Write the PNG preview (default: true)
    pub preview: Option<bool>,
    /// Write a JSON summary with geometry, statistics and profile (default: false)
    pub summary_json: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationConfig {
    /// Observatory code the end positions were computed for (default: "I41")
    pub location: Option<String>,
    /// Exposure length as human readable time (default: "30s")
    pub exposure: Option<String>,
    /// Suffix of science file names listed in observation records (default: "sciimg.fits")
    pub science_suffix: Option<String>,
    /// Suffix of the image actually processed (default: "scimrefdiffimg.fits")
    pub image_suffix: Option<String>,
    /// Number of worker threads for batch runs (default: num_cpus)
    pub workers: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_cutout_size: 100.0,
            size_factor: 1.5,
            margin: 50.0,
            mask_width_multiplier: 2.0,
            profile_samples: 100,
            display_sigma: 2.0,
            band_sigma: 1.0,
            streak_crop_factor: 4.0,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: Some("cutouts".to_string()),
            fits: Some(true),
            metadata: Some(true),
            preview: Some(true),
            summary_json: Some(false),
        }
    }
}

impl Default for ObservationConfig {
    fn default() -> Self {
        Self {
            location: Some("I41".to_string()),
            exposure: Some("30s".to_string()),
            science_suffix: Some("sciimg.fits".to_string()),
            image_suffix: Some("scimrefdiffimg.fits".to_string()),
            workers: None,
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Config = toml_edit::de::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_string = toml_edit::ser::to_string_pretty(self)
            .context("Failed to serialize configuration to TOML")?;

        std::fs::write(&path, toml_string)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Merge configuration with command line arguments, prioritizing CLI values
    pub fn merge_with_cli(
        &mut self,
        output_dir: Option<String>,
        min_cutout_size: Option<f64>,
        workers: Option<usize>,
        summary_json: bool,
    ) {
        if let Some(dir) = output_dir {
            self.output.directory = Some(dir);
        }

        if let Some(size) = min_cutout_size {
            self.pipeline.min_cutout_size = size;
        }

        if let Some(n) = workers {
            self.observation.workers = Some(n);
        }

        if summary_json {
            self.output.summary_json = Some(true);
        }
    }

    pub fn get_output_directory(&self) -> String {
        self.output
            .directory
            .clone()
            .unwrap_or_else(|| "cutouts".to_string())
    }

    pub fn writes_fits(&self) -> bool {
        self.output.fits.unwrap_or(true)
    }

    pub fn writes_metadata(&self) -> bool {
        self.output.metadata.unwrap_or(true)
    }

    pub fn writes_preview(&self) -> bool {
        self.output.preview.unwrap_or(true)
    }

    pub fn writes_summary_json(&self) -> bool {
        self.output.summary_json.unwrap_or(false)
    }

    pub fn get_location(&self) -> String {
        self.observation
            .location
            .clone()
            .unwrap_or_else(|| "I41".to_string())
    }

    pub fn get_exposure(&self) -> Duration {
        let exposure = self.observation.exposure.as_deref().unwrap_or("30s");
        humantime::parse_duration(exposure).unwrap_or(Duration::from_secs(30))
    }

    pub fn get_science_suffix(&self) -> &str {
        self.observation
            .science_suffix
            .as_deref()
            .unwrap_or("sciimg.fits")
    }

    pub fn get_image_suffix(&self) -> &str {
        self.observation
            .image_suffix
            .as_deref()
            .unwrap_or("scimrefdiffimg.fits")
    }

    pub fn get_workers(&self) -> Option<usize> {
        self.observation.workers
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let p = &self.pipeline;

        if p.min_cutout_size.is_nan() || p.min_cutout_size < 1.0 {
            return Err(anyhow::anyhow!(
                "min_cutout_size must be at least 1 pixel, got: {}",
                p.min_cutout_size
            ));
        }

        if p.size_factor.is_nan() || p.size_factor < 1.0 {
            return Err(anyhow::anyhow!(
                "size_factor must be 1.0 or greater, got: {}",
                p.size_factor
            ));
        }

        if p.margin.is_nan() || p.margin < 0.0 {
            return Err(anyhow::anyhow!("margin must not be negative, got: {}", p.margin));
        }

        if p.mask_width_multiplier.is_nan() || p.mask_width_multiplier <= 0.0 {
            return Err(anyhow::anyhow!(
                "mask_width_multiplier must be positive, got: {}",
                p.mask_width_multiplier
            ));
        }

        if p.profile_samples < 2 {
            return Err(anyhow::anyhow!(
                "profile_samples must be at least 2, got: {}",
                p.profile_samples
            ));
        }

        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(p.display_sigma) || !positive(p.streak_crop_factor) || p.band_sigma.is_nan() || p.band_sigma < 0.0 {
            return Err(anyhow::anyhow!(
                "display_sigma and streak_crop_factor must be positive and band_sigma non-negative"
            ));
        }

        if let Some(ref exposure) = self.observation.exposure {
            humantime::parse_duration(exposure)
                .with_context(|| format!("Invalid exposure format: {}", exposure))?;
        }

        if self.get_workers() == Some(0) {
            return Err(anyhow::anyhow!("workers must be greater than 0"));
        }

        if self.get_science_suffix().is_empty() || self.get_image_suffix().is_empty() {
            return Err(anyhow::anyhow!("File name suffixes must not be empty"));
        }

        Ok(())
    }
}
