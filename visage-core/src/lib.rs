//! Face detection, training and recognition.
//!
//! This crate provides an OpenCV-compatible cascade classifier, an optional YuNet ONNX
//! detector, the crop arithmetic that turns detections into normalized samples, and the
//! Eigenface/Fisherface recognizers with their training and recognition pipelines.

/// Boosted cascade classifier (Haar and LBP).
pub mod cascade;
/// `path;label` training lists.
pub mod dataset;
/// The face detector trait and its implementations.
pub mod detector;
/// Typed failures that map to exit statuses.
pub mod error;
/// Integer rectangles.
pub mod geometry;
/// Classifying faces in frames.
pub mod recognition;
/// PCA/LDA and the subspace recognizers.
pub mod recognizer;
/// Face circle and crop rectangle.
pub mod region;
/// Normalized face samples.
pub mod sample;
/// Building training sets and fitting models.
pub mod training;
/// YuNet ONNX detector backend.
pub mod yunet;

pub use cascade::{CascadeClassifier, CascadeParams, FeatureType};
pub use dataset::{DEFAULT_SEPARATOR, DatasetEntry, read_dataset};
pub use detector::{CascadeDetector, FaceDetector, YuNetFaceDetector, build_detector};
pub use error::{VisageError, find_visage_error};
pub use geometry::Rect;
pub use recognition::{FaceIdentifier, FaceObservation, Identification, Identity, analyze_frame};
pub use recognizer::{
    EigenFaceRecognizer, FaceRecognizer, FisherFaceRecognizer, ModelKind, Prediction,
};
pub use region::FaceRegion;
pub use sample::{detection_frame, prepare_query_sample, prepare_training_sample};
pub use training::{
    SkipReason, SkippedImage, TrainedModels, TrainingReport, TrainingSet, collect_samples,
    train_models,
};
pub use yunet::YuNetDetector;
