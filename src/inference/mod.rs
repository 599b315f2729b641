//! Iris classifier: embedded dataset, startup fit, and the shared service

pub mod classifier;
pub mod dataset;
pub mod service;

pub use classifier::{ClassifierModel, FatalInitError, TrainingReport, TrainingSettings};
pub use service::InferenceService;
