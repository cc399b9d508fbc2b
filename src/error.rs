use thiserror::Error;

/// Failures local to one (image, trail) pair.
///
/// Each variant aborts the pair it was raised for and nothing else; the batch
/// driver logs it with the source identifier and moves on to the next pair.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrailError {
    #[error("Invalid astrometry: {0}")]
    InvalidAstrometry(String),

    #[error("Image data has shape {shape:?}, expected exactly two non-singleton axes")]
    DimensionalityError { shape: Vec<usize> },

    #[error("Selection is empty: {0}")]
    EmptySelection(String),

    #[error("Degenerate trail: start and end positions coincide ({separation_px:.3e} px apart)")]
    DegenerateTrail { separation_px: f64 },

    #[error("Required header keyword {0} not found in any HDU")]
    MissingHeader(&'static str),
}

impl TrailError {
    /// Short machine-friendly name of the failure kind, used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            TrailError::InvalidAstrometry(_) => "invalid_astrometry",
            TrailError::DimensionalityError { .. } => "dimensionality_error",
            TrailError::EmptySelection(_) => "empty_selection",
            TrailError::DegenerateTrail { .. } => "degenerate_trail",
            TrailError::MissingHeader(_) => "missing_header",
        }
    }
}

pub type TrailResult<T> = std::result::Result<T, TrailError>;
