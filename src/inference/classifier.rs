//! Multinomial logistic regression fitted once at startup
//!
//! Features are standardized with the training split's mean and standard
//! deviation, then the softmax model is fitted with full-batch gradient
//! descent under an L2 penalty (`C` is the inverse regularization strength).
//! Every step is a fixed-order sum over a seeded split, so two fits with the
//! same settings produce bit-identical parameters.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use thiserror::Error;

use crate::models::{FEATURE_COUNT, FEATURE_NAMES};

pub const CLASS_COUNT: usize = 3;

/// Model construction failed; the service must not start
#[derive(Debug, Error, PartialEq)]
pub enum FatalInitError {
    #[error("training set is empty")]
    EmptyDataset,

    #[error("{features} feature rows but {labels} labels")]
    ShapeMismatch { features: usize, labels: usize },

    #[error("label {0} is outside the known classes")]
    InvalidLabel(usize),

    #[error("training data contains a non-finite value")]
    NonFiniteInput,

    #[error("feature {0} has zero variance in the training split")]
    DegenerateFeature(&'static str),

    #[error("model parameters diverged during training")]
    Diverged,

    #[error("held-out accuracy {accuracy:.3} is below the required {required:.3}")]
    AccuracyBelowThreshold { accuracy: f64, required: f64 },
}

#[derive(Debug, Clone)]
pub struct TrainingSettings {
    pub seed: u64,
    pub test_fraction: f64,
    pub learning_rate: f64,
    pub max_iter: usize,
    pub tolerance: f64,
    pub inverse_regularization: f64,
    pub min_accuracy: f64,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            seed: 42,
            test_fraction: 0.25,
            learning_rate: 0.5,
            max_iter: 1000,
            tolerance: 1e-6,
            inverse_regularization: 1.0,
            min_accuracy: 0.85,
        }
    }
}

/// Summary of the startup fit, reported by the health route
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub seed: u64,
    pub train_samples: usize,
    pub test_samples: usize,
    pub iterations: usize,
    pub converged: bool,
    pub holdout_accuracy: f64,
}

/// Fitted parameters. Never mutated after `fit` returns.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierModel {
    mean: [f64; FEATURE_COUNT],
    scale: [f64; FEATURE_COUNT],
    weights: [[f64; FEATURE_COUNT]; CLASS_COUNT],
    bias: [f64; CLASS_COUNT],
    report: TrainingReport,
}

impl ClassifierModel {
    /// Split, fit, and score against the held-out samples
    pub fn fit(
        features: &[[f64; FEATURE_COUNT]],
        labels: &[usize],
        settings: &TrainingSettings,
    ) -> Result<Self, FatalInitError> {
        if features.len() != labels.len() {
            return Err(FatalInitError::ShapeMismatch {
                features: features.len(),
                labels: labels.len(),
            });
        }
        if let Some(&bad) = labels.iter().find(|&&label| label >= CLASS_COUNT) {
            return Err(FatalInitError::InvalidLabel(bad));
        }
        if features.iter().flatten().any(|v| !v.is_finite()) {
            return Err(FatalInitError::NonFiniteInput);
        }

        let (train, test) = split_indices(features.len(), settings.test_fraction, settings.seed);
        if train.is_empty() {
            return Err(FatalInitError::EmptyDataset);
        }

        let (mean, scale) = standardization(features, &train)?;
        let mut model = Self {
            mean,
            scale,
            weights: [[0.0; FEATURE_COUNT]; CLASS_COUNT],
            bias: [0.0; CLASS_COUNT],
            report: TrainingReport {
                seed: settings.seed,
                train_samples: train.len(),
                test_samples: test.len(),
                iterations: 0,
                converged: false,
                holdout_accuracy: 0.0,
            },
        };

        let standardized: Vec<[f64; FEATURE_COUNT]> =
            train.iter().map(|&i| model.standardize(&features[i])).collect();
        let targets: Vec<usize> = train.iter().map(|&i| labels[i]).collect();
        model.gradient_descent(&standardized, &targets, settings);

        let finite = model.weights.iter().flatten().chain(model.bias.iter()).all(|v| v.is_finite());
        if !finite {
            return Err(FatalInitError::Diverged);
        }

        // An empty hold-out leaves nothing to score; accept the fit as is.
        let accuracy = if test.is_empty() {
            1.0
        } else {
            let correct = test
                .iter()
                .filter(|&&i| model.predict(&features[i]) == labels[i])
                .count();
            correct as f64 / test.len() as f64
        };
        model.report.holdout_accuracy = accuracy;

        if accuracy < settings.min_accuracy {
            return Err(FatalInitError::AccuracyBelowThreshold {
                accuracy,
                required: settings.min_accuracy,
            });
        }

        Ok(model)
    }

    pub fn report(&self) -> &TrainingReport {
        &self.report
    }

    /// Class with the highest probability; ties resolve to the lower id
    pub fn predict(&self, x: &[f64; FEATURE_COUNT]) -> usize {
        let scores = self.decision_function(x);
        let mut best = 0;
        for k in 1..CLASS_COUNT {
            if scores[k] > scores[best] {
                best = k;
            }
        }
        best
    }

    pub fn predict_proba(&self, x: &[f64; FEATURE_COUNT]) -> [f64; CLASS_COUNT] {
        softmax(self.decision_function(x))
    }

    fn decision_function(&self, x: &[f64; FEATURE_COUNT]) -> [f64; CLASS_COUNT] {
        self.scores(&self.standardize(x))
    }

    fn standardize(&self, x: &[f64; FEATURE_COUNT]) -> [f64; FEATURE_COUNT] {
        let mut z = [0.0; FEATURE_COUNT];
        for j in 0..FEATURE_COUNT {
            z[j] = (x[j] - self.mean[j]) / self.scale[j];
        }
        z
    }

    fn scores(&self, z: &[f64; FEATURE_COUNT]) -> [f64; CLASS_COUNT] {
        let mut out = self.bias;
        for (k, row) in self.weights.iter().enumerate() {
            out[k] += row.iter().zip(z).map(|(w, v)| w * v).sum::<f64>();
        }
        out
    }

    fn gradient_descent(
        &mut self,
        samples: &[[f64; FEATURE_COUNT]],
        targets: &[usize],
        settings: &TrainingSettings,
    ) {
        let n = samples.len() as f64;
        let penalty = 1.0 / (settings.inverse_regularization * n);

        for iteration in 0..settings.max_iter {
            let mut grad_w = [[0.0; FEATURE_COUNT]; CLASS_COUNT];
            let mut grad_b = [0.0; CLASS_COUNT];

            for (z, &target) in samples.iter().zip(targets) {
                let p = softmax(self.scores(z));
                for k in 0..CLASS_COUNT {
                    let err = p[k] - if k == target { 1.0 } else { 0.0 };
                    grad_b[k] += err;
                    for j in 0..FEATURE_COUNT {
                        grad_w[k][j] += err * z[j];
                    }
                }
            }

            let mut max_grad: f64 = 0.0;
            for k in 0..CLASS_COUNT {
                grad_b[k] /= n;
                max_grad = max_grad.max(grad_b[k].abs());
                for j in 0..FEATURE_COUNT {
                    grad_w[k][j] = grad_w[k][j] / n + penalty * self.weights[k][j];
                    max_grad = max_grad.max(grad_w[k][j].abs());
                }
            }

            for k in 0..CLASS_COUNT {
                self.bias[k] -= settings.learning_rate * grad_b[k];
                for j in 0..FEATURE_COUNT {
                    self.weights[k][j] -= settings.learning_rate * grad_w[k][j];
                }
            }

            self.report.iterations = iteration + 1;
            if max_grad < settings.tolerance {
                self.report.converged = true;
                break;
            }
        }
    }
}

/// Seeded shuffle, then the first `ceil(n * test_fraction)` indices are held out
fn split_indices(n: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));
    let test_len = ((n as f64) * test_fraction.clamp(0.0, 1.0)).ceil() as usize;
    let train = indices.split_off(test_len.min(n));
    (train, indices)
}

fn standardization(
    features: &[[f64; FEATURE_COUNT]],
    train: &[usize],
) -> Result<([f64; FEATURE_COUNT], [f64; FEATURE_COUNT]), FatalInitError> {
    let n = train.len() as f64;
    let mut mean = [0.0; FEATURE_COUNT];
    let mut scale = [0.0; FEATURE_COUNT];

    for j in 0..FEATURE_COUNT {
        mean[j] = train.iter().map(|&i| features[i][j]).sum::<f64>() / n;
        let variance = train.iter().map(|&i| (features[i][j] - mean[j]).powi(2)).sum::<f64>() / n;
        if variance <= f64::EPSILON {
            return Err(FatalInitError::DegenerateFeature(FEATURE_NAMES[j]));
        }
        scale[j] = variance.sqrt();
    }

    Ok((mean, scale))
}

fn softmax(scores: [f64; CLASS_COUNT]) -> [f64; CLASS_COUNT] {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp = scores.map(|s| (s - max).exp());
    let sum: f64 = exp.iter().sum();
    exp.map(|e| e / sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::dataset::{label, IRIS_FEATURES};

    fn iris_labels() -> Vec<usize> {
        (0..IRIS_FEATURES.len()).map(label).collect()
    }

    fn fit_default() -> ClassifierModel {
        ClassifierModel::fit(&IRIS_FEATURES, &iris_labels(), &TrainingSettings::default()).unwrap()
    }

    #[test]
    fn split_holds_out_a_quarter() {
        let (train, test) = split_indices(150, 0.25, 42);
        assert_eq!(test.len(), 38);
        assert_eq!(train.len(), 112);
        let mut all: Vec<usize> = train.iter().chain(&test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..150).collect::<Vec<_>>());
    }

    #[test]
    fn split_is_seeded() {
        assert_eq!(split_indices(150, 0.25, 42), split_indices(150, 0.25, 42));
    }

    #[test]
    fn fitting_twice_yields_identical_parameters() {
        assert_eq!(fit_default(), fit_default());
    }

    #[test]
    fn classifies_reference_samples() {
        let model = fit_default();
        assert_eq!(model.predict(&[5.1, 3.5, 1.4, 0.2]), 0);
        assert_eq!(model.predict(&[5.9, 3.0, 4.2, 1.5]), 1);
        assert_eq!(model.predict(&[6.9, 3.1, 5.4, 2.1]), 2);
    }

    #[test]
    fn borderline_sample_splits_between_versicolor_and_virginica() {
        let model = fit_default();
        let x = [6.0, 3.0, 4.8, 1.8];
        assert!(matches!(model.predict(&x), 1 | 2));
        let p = model.predict_proba(&x);
        assert!((p[1] - p[2]).abs() < 0.3, "{p:?}");
    }

    #[test]
    fn probabilities_form_a_distribution() {
        let model = fit_default();
        for x in IRIS_FEATURES.iter().chain(&[[0.0; 4], [40.0, 0.0, 90.0, 0.0]]) {
            let p = model.predict_proba(x);
            assert!(p.iter().all(|v| *v >= 0.0));
            assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn report_describes_the_fit() {
        let report = fit_default().report().clone();
        assert_eq!(report.seed, 42);
        assert_eq!(report.train_samples + report.test_samples, 150);
        assert!(report.iterations > 0);
        assert!(report.holdout_accuracy >= 0.85);
    }

    #[test]
    fn unreachable_accuracy_is_fatal() {
        let settings = TrainingSettings { min_accuracy: 1.01, ..Default::default() };
        let err = ClassifierModel::fit(&IRIS_FEATURES, &iris_labels(), &settings).unwrap_err();
        assert!(matches!(err, FatalInitError::AccuracyBelowThreshold { .. }));
    }

    #[test]
    fn constant_feature_is_fatal() {
        let rows = vec![[1.0, 2.0, 3.0, 4.0]; 8];
        let labels = vec![0, 1, 2, 0, 1, 2, 0, 1];
        let err = ClassifierModel::fit(&rows, &labels, &TrainingSettings::default()).unwrap_err();
        assert_eq!(err, FatalInitError::DegenerateFeature("sepal_length"));
    }

    #[test]
    fn malformed_inputs_are_fatal() {
        let settings = TrainingSettings::default();
        assert_eq!(
            ClassifierModel::fit(&[], &[], &settings).unwrap_err(),
            FatalInitError::EmptyDataset
        );
        assert_eq!(
            ClassifierModel::fit(&IRIS_FEATURES, &[0], &settings).unwrap_err(),
            FatalInitError::ShapeMismatch { features: 150, labels: 1 }
        );
        assert_eq!(
            ClassifierModel::fit(&[[1.0, 1.0, 1.0, 1.0]], &[7], &settings).unwrap_err(),
            FatalInitError::InvalidLabel(7)
        );
        assert_eq!(
            ClassifierModel::fit(&[[f64::NAN, 1.0, 1.0, 1.0]], &[0], &settings).unwrap_err(),
            FatalInitError::NonFiniteInput
        );
    }
}
