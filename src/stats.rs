use serde::{Deserialize, Serialize};

use crate::error::{TrailError, TrailResult};

/// Location and spread of the pixels under a trail mask.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RobustStats {
    pub median: f64,
    /// Population standard deviation (no Bessel correction).
    pub std_dev: f64,
    /// Number of finite pixels the estimate is based on.
    pub count: usize,
}

impl RobustStats {
    /// Median and standard deviation of the finite values in `values`.
    ///
    /// Non-finite pixels (masked regions of difference images) are skipped.
    pub fn estimate(values: impl IntoIterator<Item = f32>) -> TrailResult<Self> {
        let mut finite: Vec<f64> = values
            .into_iter()
            .filter(|v| v.is_finite())
            .map(f64::from)
            .collect();

        if finite.is_empty() {
            return Err(TrailError::EmptySelection(
                "mask selects no finite pixels".to_string(),
            ));
        }

        finite.sort_by(|a, b| a.total_cmp(b));
        let n = finite.len();
        let median = if n % 2 == 1 {
            finite[n / 2]
        } else {
            (finite[n / 2 - 1] + finite[n / 2]) / 2.0
        };

        let mean = finite.iter().sum::<f64>() / n as f64;
        let variance = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;

        Ok(Self {
            median,
            std_dev: variance.sqrt(),
            count: n,
        })
    }

    /// Intensity window `median ± sigma·std` used for display scaling.
    pub fn display_range(&self, sigma: f64) -> (f64, f64) {
        (
            self.median - sigma * self.std_dev,
            self.median + sigma * self.std_dev,
        )
    }
}
