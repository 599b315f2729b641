//! Inference service shared by all request handlers

use tracing::info;

use super::classifier::{ClassifierModel, FatalInitError, TrainingReport, TrainingSettings, CLASS_COUNT};
use super::dataset::{label, IRIS_FEATURES};
use crate::models::{class_name, FeatureVector, PredictionResult, ProbabilityResult};

/// Owns the immutable classifier. Handlers hold it behind an `Arc` and call
/// it without locking.
#[derive(Debug)]
pub struct InferenceService {
    model: ClassifierModel,
}

impl InferenceService {
    /// Fit the model on the embedded dataset. Runs once, before the listener
    /// is bound; an error here aborts startup.
    pub fn initialize(settings: &TrainingSettings) -> Result<Self, FatalInitError> {
        let labels: Vec<usize> = (0..IRIS_FEATURES.len()).map(label).collect();
        let model = ClassifierModel::fit(&IRIS_FEATURES, &labels, settings)?;

        let report = model.report();
        info!(
            seed = report.seed,
            iterations = report.iterations,
            converged = report.converged,
            holdout_accuracy = report.holdout_accuracy,
            "Classifier trained on {} samples ({} held out)",
            report.train_samples,
            report.test_samples
        );

        Ok(Self::from_model(model))
    }

    pub fn from_model(model: ClassifierModel) -> Self {
        Self { model }
    }

    pub fn predict(&self, vector: &FeatureVector) -> usize {
        self.model.predict(&vector.as_array())
    }

    /// Probabilities aligned with class ids 0, 1, 2
    pub fn predict_probabilities(&self, vector: &FeatureVector) -> [f64; CLASS_COUNT] {
        self.model.predict_proba(&vector.as_array())
    }

    pub fn class_id_to_name(id: usize) -> &'static str {
        class_name(id)
    }

    pub fn classify(&self, vector: &FeatureVector) -> PredictionResult {
        PredictionResult::new(self.predict(vector))
    }

    pub fn classify_with_probabilities(&self, vector: &FeatureVector) -> ProbabilityResult {
        let probabilities = self.predict_probabilities(vector);
        ProbabilityResult {
            prediction: self.classify(vector),
            probabilities,
        }
    }

    pub fn model_info(&self) -> &TrainingReport {
        self.model.report()
    }
}
