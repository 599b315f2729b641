//! Feature vector model

use serde::Serialize;
use validator::Validate;

/// Number of features the classifier consumes
pub const FEATURE_COUNT: usize = 4;

/// Request field names, in model input order
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] =
    ["sepal_length", "sepal_width", "petal_length", "petal_width"];

/// Validated classifier input. Built only through `validation::validate`
/// or `FeatureVector::new`, immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Validate)]
pub struct FeatureVector {
    #[validate(range(min = 0.0))]
    sepal_length: f64,
    #[validate(range(min = 0.0))]
    sepal_width: f64,
    #[validate(range(min = 0.0))]
    petal_length: f64,
    #[validate(range(min = 0.0))]
    petal_width: f64,
}

impl FeatureVector {
    /// Build without range checks; callers run `validate()` before exposing it.
    pub(crate) fn from_parts(values: [f64; FEATURE_COUNT]) -> Self {
        let [sepal_length, sepal_width, petal_length, petal_width] = values;
        Self { sepal_length, sepal_width, petal_length, petal_width }
    }

    /// Checked constructor for callers that already hold numbers
    pub fn new(values: [f64; FEATURE_COUNT]) -> Result<Self, crate::validation::ValidationError> {
        crate::validation::validate_values(values)
    }

    pub fn as_array(&self) -> [f64; FEATURE_COUNT] {
        [self.sepal_length, self.sepal_width, self.petal_length, self.petal_width]
    }
}
