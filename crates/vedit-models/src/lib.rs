//! Shared data models for the VidEdit backend.
//!
//! This crate provides Serde-serializable types for:
//! - Cut requests and their validation
//! - Keyframe sets and alignment results
//! - Extraction outcomes with a fixed method enum
//! - Stream-copy compatibility reports
//! - Quality metrics, grading and pipeline reports
//! - Encoding configuration

pub mod compat;
pub mod cut;
pub mod encoding;
pub mod extraction;
pub mod quality;

// Re-export common types
pub use compat::CompatibilityReport;
pub use cut::{CutRequest, CutValidationError};
pub use encoding::EncodingConfig;
pub use extraction::{
    AlignmentResult, ExtractionMethod, ExtractionOutcome, KeyframeSet, KeyframeSource,
};
pub use quality::{
    assess_quality, grade_psnr, grade_ssim, QualityAssessment, QualityGrade, QualityMetrics,
    QualityPipelineReport, QualityStep, QualityStepAnalysis, QualityVerdict,
};
