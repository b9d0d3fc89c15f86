//! Ordinary least squares with a bias term
//!
//! Solves the centered, variance-scaled normal equations by Gauss-Jordan
//! elimination with partial pivoting. Columns that are constant, or linearly
//! dependent on earlier columns, get a zero weight instead of failing the fit.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::errors::{PricingError, PricingResult};

/// Pivots below this are treated as linear dependence (the scaled system has a unit diagonal)
const PIVOT_TOLERANCE: f64 = 1e-10;
/// Relative variance below which a column counts as constant
const CONSTANT_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
pub struct LinearFit {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    /// Column indices that received a zero weight because they carried no independent signal
    pub dropped_columns: Vec<usize>,
}

impl LinearFit {
    pub fn predict(&self, row: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(row)
                .map(|(c, x)| c * x)
                .sum::<f64>()
    }
}

/// In-sample goodness of fit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitMetrics {
    pub r_squared: f64,
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
}

/// Fit `y ≈ intercept + Σ coef_j * x_j`.
///
/// Requires at least one more row than columns.
pub fn fit_ols(rows: &[Vec<f64>], targets: &[f64]) -> PricingResult<LinearFit> {
    if rows.len() != targets.len() {
        return Err(PricingError::regression(format!(
            "{} feature rows but {} targets",
            rows.len(),
            targets.len()
        )));
    }
    if rows.is_empty() {
        return Err(PricingError::NoTrainingData);
    }

    let width = rows[0].len();
    if rows.iter().any(|r| r.len() != width) {
        return Err(PricingError::regression("feature rows have differing widths"));
    }
    if rows.iter().flatten().chain(targets).any(|v| !v.is_finite()) {
        return Err(PricingError::regression("training data contains non-finite values"));
    }

    let n = rows.len();
    let parameters = width + 1;
    if n < parameters {
        return Err(PricingError::InsufficientSamples {
            samples: n,
            parameters,
        });
    }

    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    let x = Array2::from_shape_vec((n, width), flat)
        .map_err(|e| PricingError::regression(format!("design matrix: {}", e)))?;
    let y = Array1::from(targets.to_vec());

    let x_mean = x
        .mean_axis(Axis(0))
        .ok_or(PricingError::NoTrainingData)?;
    let y_mean = y.mean().ok_or(PricingError::NoTrainingData)?;

    // Centered cross-products
    let centered = &x - &x_mean;
    let xtx = centered.t().dot(&centered);
    let xty = centered.t().dot(&(&y - y_mean));

    let nf = n as f64;
    let (active, mut dropped_columns): (Vec<usize>, Vec<usize>) = (0..width).partition(|&j| {
        let variance = xtx[[j, j]] / nf;
        variance > CONSTANT_TOLERANCE * (1.0 + x_mean[j] * x_mean[j])
    });

    // Scale active columns to unit variance so the pivot tolerance is meaningful
    let scale: Vec<f64> = active.iter().map(|&j| xtx[[j, j]].sqrt()).collect();
    let m = active.len();
    let mut aug = Array2::<f64>::zeros((m, m + 1));
    for (a, &j) in active.iter().enumerate() {
        for (b, &k) in active.iter().enumerate() {
            aug[[a, b]] = xtx[[j, k]] / (scale[a] * scale[b]);
        }
        aug[[a, m]] = xty[j] / scale[a];
    }

    let mut solution = vec![0.0; m];
    let mut pivots: Vec<(usize, usize)> = Vec::new();
    let mut pivot_row = 0;
    for col in 0..m {
        let best = (pivot_row..m)
            .max_by(|&a, &b| aug[[a, col]].abs().total_cmp(&aug[[b, col]].abs()))
            .unwrap_or(pivot_row);
        if aug[[best, col]].abs() < PIVOT_TOLERANCE {
            dropped_columns.push(active[col]);
            continue;
        }
        if best != pivot_row {
            for c in 0..=m {
                aug.swap((pivot_row, c), (best, c));
            }
        }

        let pivot = aug[[pivot_row, col]];
        aug.row_mut(pivot_row).mapv_inplace(|v| v / pivot);
        let pivot_values = aug.row(pivot_row).to_owned();
        for other in 0..m {
            if other == pivot_row {
                continue;
            }
            let factor = aug[[other, col]];
            if factor != 0.0 {
                aug.row_mut(other).scaled_add(-factor, &pivot_values);
            }
        }
        pivots.push((col, pivot_row));
        pivot_row += 1;
    }
    for (col, row) in pivots {
        solution[col] = aug[[row, m]];
    }

    let mut coefficients = vec![0.0; width];
    for (a, &j) in active.iter().enumerate() {
        coefficients[j] = solution[a] / scale[a];
    }
    dropped_columns.sort_unstable();

    let intercept = y_mean - Array1::from(coefficients.clone()).dot(&x_mean);

    Ok(LinearFit {
        intercept,
        coefficients,
        dropped_columns,
    })
}

/// R², MSE, RMSE and MAE of `predicted` against `actual`.
///
/// With a constant target R² is 1.0 for a perfect fit and 0.0 otherwise.
pub fn evaluate(actual: &[f64], predicted: &[f64]) -> FitMetrics {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return FitMetrics {
            r_squared: 0.0,
            mse: 0.0,
            rmse: 0.0,
            mae: 0.0,
        };
    }
    let nf = n as f64;
    let mean = actual[..n].iter().sum::<f64>() / nf;

    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    let mut abs_err = 0.0;
    for (y, p) in actual.iter().zip(predicted) {
        let residual = y - p;
        ss_res += residual * residual;
        abs_err += residual.abs();
        ss_tot += (y - mean) * (y - mean);
    }

    let r_squared = if ss_tot <= 1e-12 {
        if ss_res <= 1e-12 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    };
    let mse = ss_res / nf;

    FitMetrics {
        r_squared,
        mse,
        rmse: mse.sqrt(),
        mae: abs_err / nf,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic(n: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| {
                let i = i as f64;
                vec![i, (i * i) % 7.0, (i * 3.0) % 5.0]
            })
            .collect();
        let targets = rows
            .iter()
            .map(|r| 0.5 + 0.1 * r[0] - 0.2 * r[1] + 0.05 * r[2])
            .collect();
        (rows, targets)
    }

    #[test]
    fn test_recovers_exact_linear_relationship() {
        let (rows, targets) = synthetic(20);
        let fit = fit_ols(&rows, &targets).unwrap();

        assert!((fit.intercept - 0.5).abs() < 1e-8);
        assert!((fit.coefficients[0] - 0.1).abs() < 1e-8);
        assert!((fit.coefficients[1] + 0.2).abs() < 1e-8);
        assert!((fit.coefficients[2] - 0.05).abs() < 1e-8);
        assert!(fit.dropped_columns.is_empty());

        let predicted: Vec<f64> = rows.iter().map(|r| fit.predict(r)).collect();
        let metrics = evaluate(&targets, &predicted);
        assert!((metrics.r_squared - 1.0).abs() < 1e-9);
        assert!(metrics.mse < 1e-18);
    }

    #[test]
    fn test_constant_column_gets_zero_weight() {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64, 4.0]).collect();
        let targets: Vec<f64> = (0..10).map(|i| 2.0 + 0.3 * i as f64).collect();

        let fit = fit_ols(&rows, &targets).unwrap();
        assert_eq!(fit.coefficients[1], 0.0);
        assert_eq!(fit.dropped_columns, vec![1]);
        assert!((fit.coefficients[0] - 0.3).abs() < 1e-10);
        assert!((fit.intercept - 2.0).abs() < 1e-10);
    }

    #[test]
    fn test_collinear_columns_still_fit() {
        let rows: Vec<Vec<f64>> = (0..12)
            .map(|i| vec![i as f64, 2.0 * i as f64])
            .collect();
        let targets: Vec<f64> = (0..12).map(|i| 1.0 + 3.0 * i as f64).collect();

        let fit = fit_ols(&rows, &targets).unwrap();
        assert_eq!(fit.dropped_columns, vec![1]);
        for (row, y) in rows.iter().zip(&targets) {
            assert!((fit.predict(row) - y).abs() < 1e-8);
        }
    }

    #[test]
    fn test_requires_more_rows_than_columns() {
        let rows = vec![vec![1.0, 2.0], vec![2.0, 1.0]];
        let targets = vec![1.0, 1.1];
        match fit_ols(&rows, &targets) {
            Err(PricingError::InsufficientSamples {
                samples,
                parameters,
            }) => {
                assert_eq!(samples, 2);
                assert_eq!(parameters, 3);
            }
            other => panic!("expected InsufficientSamples, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_empty_and_mismatched_input() {
        assert!(matches!(fit_ols(&[], &[]), Err(PricingError::NoTrainingData)));
        assert!(fit_ols(&[vec![1.0]], &[1.0, 2.0]).is_err());
        assert!(fit_ols(&[vec![f64::NAN], vec![1.0]], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_metrics_on_known_residuals() {
        let actual = [1.0, 2.0, 3.0, 4.0];
        let predicted = [1.5, 2.0, 2.5, 4.0];
        let m = evaluate(&actual, &predicted);

        // residuals: -0.5, 0, 0.5, 0
        assert!((m.mse - 0.125).abs() < 1e-12);
        assert!((m.rmse - 0.125f64.sqrt()).abs() < 1e-12);
        assert!((m.mae - 0.25).abs() < 1e-12);
        // ss_tot = 5.0, ss_res = 0.5
        assert!((m.r_squared - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_constant_target_r_squared_convention() {
        let perfect = evaluate(&[1.0, 1.0, 1.0], &[1.0, 1.0, 1.0]);
        assert_eq!(perfect.r_squared, 1.0);

        let imperfect = evaluate(&[1.0, 1.0, 1.0], &[1.2, 0.9, 1.0]);
        assert_eq!(imperfect.r_squared, 0.0);
    }
}
