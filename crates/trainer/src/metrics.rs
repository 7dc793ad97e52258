//! Regression metrics

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub rows: usize,
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    /// Coefficient of determination; 0 when the target is constant
    pub r2: f64,
}

impl Metrics {
    pub fn compute(actual: &[f64], predicted: &[f64]) -> Self {
        let rows = actual.len().min(predicted.len());
        if rows == 0 {
            return Self {
                rows,
                mse: 0.0,
                rmse: 0.0,
                mae: 0.0,
                r2: 0.0,
            };
        }

        let n = rows as f64;
        let pairs = || actual.iter().zip(predicted);
        let mse = pairs().map(|(a, p)| (a - p).powi(2)).sum::<f64>() / n;
        let mae = pairs().map(|(a, p)| (a - p).abs()).sum::<f64>() / n;

        let mean = actual[..rows].iter().sum::<f64>() / n;
        let total = actual[..rows].iter().map(|a| (a - mean).powi(2)).sum::<f64>();
        let r2 = if total > 0.0 { 1.0 - mse * n / total } else { 0.0 };

        Self {
            rows,
            mse,
            rmse: mse.sqrt(),
            mae,
            r2,
        }
    }
}

/// Root mean squared error.
pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    Metrics::compute(actual, predicted).rmse
}
