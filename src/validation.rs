//! Feature payload validation
//!
//! Turns a raw JSON payload into a [`FeatureVector`], reporting every
//! offending field in one pass. Presence and type are checked against the
//! raw value; range checks go through the `validator` rules declared on
//! [`FeatureVector`].

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use validator::Validate;

use crate::models::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};

/// Constraint a field failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    Missing,
    NotNumeric,
    BelowMinimum,
    InvalidJson,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub constraint: Constraint,
    pub message: String,
}

impl FieldViolation {
    fn new(field: &str, constraint: Constraint) -> Self {
        let message = match constraint {
            Constraint::Missing => format!("{field} is required"),
            Constraint::NotNumeric => format!("{field} must be a number"),
            Constraint::BelowMinimum => format!("{field} must be greater than or equal to 0"),
            Constraint::InvalidJson => "request body is not valid JSON".to_string(),
        };
        Self {
            field: field.to_string(),
            constraint,
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{} invalid field(s)", violations.len())]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    /// Violation for a body that could not be parsed at all
    pub fn invalid_json() -> Self {
        Self {
            violations: vec![FieldViolation::new("body", Constraint::InvalidJson)],
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.violations.iter().map(|v| v.field.as_str())
    }
}

/// Validate a raw request payload
pub fn validate(raw: &Value) -> Result<FeatureVector, ValidationError> {
    let object = raw.as_object();
    let mut violations = Vec::new();
    let mut values = [0.0; FEATURE_COUNT];

    for (i, name) in FEATURE_NAMES.iter().enumerate() {
        match object.and_then(|o| o.get(*name)) {
            None | Some(Value::Null) => violations.push(FieldViolation::new(name, Constraint::Missing)),
            Some(value) => match value.as_f64().filter(|v| v.is_finite()) {
                Some(v) => values[i] = v,
                None => violations.push(FieldViolation::new(name, Constraint::NotNumeric)),
            },
        }
    }

    // Absent fields sit at 0.0 and never trip the range rule.
    violations.extend(range_violations(&FeatureVector::from_parts(values)));

    if violations.is_empty() {
        return Ok(FeatureVector::from_parts(values));
    }

    violations.sort_by_key(|v| field_position(&v.field));
    Err(ValidationError { violations })
}

/// Validate numbers that are already typed
pub fn validate_values(values: [f64; FEATURE_COUNT]) -> Result<FeatureVector, ValidationError> {
    let mut violations: Vec<FieldViolation> = FEATURE_NAMES
        .iter()
        .zip(values)
        .filter(|(_, v)| !v.is_finite())
        .map(|(name, _)| FieldViolation::new(name, Constraint::NotNumeric))
        .collect();

    let sanitized = values.map(|v| if v.is_finite() { v } else { 0.0 });
    let vector = FeatureVector::from_parts(sanitized);
    violations.extend(range_violations(&vector));

    if violations.is_empty() {
        Ok(vector)
    } else {
        violations.sort_by_key(|v| field_position(&v.field));
        Err(ValidationError { violations })
    }
}

fn range_violations(candidate: &FeatureVector) -> Vec<FieldViolation> {
    match candidate.validate() {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .field_errors()
            .keys()
            .map(|field| FieldViolation::new(field, Constraint::BelowMinimum))
            .collect(),
    }
}

fn field_position(field: &str) -> usize {
    FEATURE_NAMES
        .iter()
        .position(|name| *name == field)
        .unwrap_or(FEATURE_COUNT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid() -> Value {
        json!({
            "sepal_length": 5.1,
            "sepal_width": 3.5,
            "petal_length": 1.4,
            "petal_width": 0.2
        })
    }

    #[test]
    fn accepts_well_formed_payload() {
        let vector = validate(&valid()).unwrap();
        assert_eq!(vector.as_array(), [5.1, 3.5, 1.4, 0.2]);
    }

    #[test]
    fn accepts_integers_and_zero() {
        let raw = json!({"sepal_length": 5, "sepal_width": 0, "petal_length": 1, "petal_width": 0.0});
        assert_eq!(validate(&raw).unwrap().as_array(), [5.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn negative_value_tags_exact_field() {
        for name in FEATURE_NAMES {
            let mut raw = valid();
            raw[name] = json!(-1.0);
            let err = validate(&raw).unwrap_err();
            assert_eq!(err.violations.len(), 1, "{name}");
            assert_eq!(err.violations[0].field, name);
            assert_eq!(err.violations[0].constraint, Constraint::BelowMinimum);
        }
    }

    #[test]
    fn empty_payload_tags_all_four_fields() {
        let err = validate(&json!({"invalid": "data"})).unwrap_err();
        assert_eq!(err.fields().collect::<Vec<_>>(), FEATURE_NAMES.to_vec());
        assert!(err.violations.iter().all(|v| v.constraint == Constraint::Missing));
    }

    #[test]
    fn non_object_payload_counts_as_missing() {
        let err = validate(&json!([1, 2, 3, 4])).unwrap_err();
        assert_eq!(err.violations.len(), FEATURE_COUNT);
    }

    #[test]
    fn reports_every_violation_in_field_order() {
        let raw = json!({
            "sepal_length": "long",
            "sepal_width": null,
            "petal_length": -0.5,
            "petal_width": true
        });
        let err = validate(&raw).unwrap_err();
        let got: Vec<_> = err
            .violations
            .iter()
            .map(|v| (v.field.as_str(), v.constraint))
            .collect();
        assert_eq!(
            got,
            vec![
                ("sepal_length", Constraint::NotNumeric),
                ("sepal_width", Constraint::Missing),
                ("petal_length", Constraint::BelowMinimum),
                ("petal_width", Constraint::NotNumeric),
            ]
        );
    }

    #[test]
    fn typed_values_reject_nan_and_negatives() {
        let err = validate_values([f64::NAN, 1.0, -2.0, 0.0]).unwrap_err();
        let got: Vec<_> = err.violations.iter().map(|v| v.constraint).collect();
        assert_eq!(got, vec![Constraint::NotNumeric, Constraint::BelowMinimum]);
        assert!(FeatureVector::new([6.9, 3.1, 5.4, 2.1]).is_ok());
    }

    #[test]
    fn violations_serialize_with_snake_case_constraints() {
        let err = validate(&json!({})).unwrap_err();
        let value = serde_json::to_value(&err.violations[0]).unwrap();
        assert_eq!(value["constraint"], "missing");
        assert_eq!(value["field"], "sepal_length");
    }
}
