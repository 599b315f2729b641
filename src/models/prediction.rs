//! Prediction models

use serde::Serialize;

/// Iris species keyed by class id
pub const CLASS_NAMES: [&str; 3] = ["setosa", "versicolor", "virginica"];

/// Resolve a class id to its species name, `"unknown"` outside the closed set
pub fn class_name(class_id: usize) -> &'static str {
    CLASS_NAMES.get(class_id).copied().unwrap_or("unknown")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub class_id: usize,
    pub class_name: &'static str,
}

impl PredictionResult {
    pub fn new(class_id: usize) -> Self {
        Self {
            class_id,
            class_name: class_name(class_id),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbabilityResult {
    #[serde(flatten)]
    pub prediction: PredictionResult,
    pub probabilities: [f64; 3],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_ids_and_defaults_the_rest() {
        assert_eq!(class_name(0), "setosa");
        assert_eq!(class_name(1), "versicolor");
        assert_eq!(class_name(2), "virginica");
        assert_eq!(class_name(3), "unknown");
        assert_eq!(class_name(usize::MAX), "unknown");
    }

    #[test]
    fn serializes_as_flat_object() {
        let value = serde_json::to_value(PredictionResult::new(2)).unwrap();
        assert_eq!(value, serde_json::json!({"class_id": 2, "class_name": "virginica"}));
    }
}
