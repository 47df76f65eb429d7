//! Quality metrics, grading thresholds and pipeline reports.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// SSIM grade boundaries (excellent / good / fair, poor below).
pub const SSIM_EXCELLENT: f64 = 0.99;
pub const SSIM_GOOD: f64 = 0.95;
pub const SSIM_FAIR: f64 = 0.90;

/// PSNR grade boundaries in dB (excellent / good / fair, poor below).
pub const PSNR_EXCELLENT: f64 = 45.0;
pub const PSNR_GOOD: f64 = 35.0;
pub const PSNR_FAIR: f64 = 25.0;

/// Grade for a single quality metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum QualityGrade {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl fmt::Display for QualityGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QualityGrade::Excellent => "excellent",
            QualityGrade::Good => "good",
            QualityGrade::Fair => "fair",
            QualityGrade::Poor => "poor",
        };
        write!(f, "{}", s)
    }
}

/// Overall verdict combining the per-metric grades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum QualityVerdict {
    /// Both metrics excellent: visually indistinguishable from source
    LosslessQuality,
    /// Minor degradation, still high fidelity
    NearLossless,
    /// Visible quality loss
    Lossy,
}

impl fmt::Display for QualityVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QualityVerdict::LosslessQuality => "lossless_quality",
            QualityVerdict::NearLossless => "near_lossless",
            QualityVerdict::Lossy => "lossy",
        };
        write!(f, "{}", s)
    }
}

/// Measured similarity between an original and a processed file.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QualityMetrics {
    /// Structural similarity, 0.0..=1.0 (1.0 = identical)
    pub ssim: Option<f64>,
    /// Peak signal-to-noise ratio in dB
    pub psnr: Option<f64>,
    /// Perceptual quality score, only when the tool build supports it
    pub vmaf: Option<f64>,
    /// processed size / original size
    pub file_size_ratio: f64,
    /// Wall-clock time of the comparison, in seconds
    pub processing_time_secs: f64,
}

/// Graded interpretation of [`QualityMetrics`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QualityAssessment {
    pub ssim_grade: Option<QualityGrade>,
    pub psnr_grade: Option<QualityGrade>,
    pub overall: QualityVerdict,
}

/// Grade an SSIM score against the fixed thresholds.
pub fn grade_ssim(ssim: f64) -> QualityGrade {
    if ssim >= SSIM_EXCELLENT {
        QualityGrade::Excellent
    } else if ssim >= SSIM_GOOD {
        QualityGrade::Good
    } else if ssim >= SSIM_FAIR {
        QualityGrade::Fair
    } else {
        QualityGrade::Poor
    }
}

/// Grade a PSNR score in dB against the fixed thresholds.
pub fn grade_psnr(psnr: f64) -> QualityGrade {
    if psnr >= PSNR_EXCELLENT {
        QualityGrade::Excellent
    } else if psnr >= PSNR_GOOD {
        QualityGrade::Good
    } else if psnr >= PSNR_FAIR {
        QualityGrade::Fair
    } else {
        QualityGrade::Poor
    }
}

/// Combine per-metric grades into an assessment.
///
/// Lossless requires every measured metric to grade excellent; any poor
/// metric makes the verdict lossy; everything in between is near-lossless.
/// With no measured metrics at all the verdict is lossy, since nothing
/// supports a stronger claim.
pub fn assess_quality(metrics: &QualityMetrics) -> QualityAssessment {
    let ssim_grade = metrics.ssim.map(grade_ssim);
    let psnr_grade = metrics.psnr.map(grade_psnr);

    let grades: Vec<QualityGrade> = ssim_grade.iter().chain(psnr_grade.iter()).copied().collect();

    let overall = if grades.is_empty() || grades.contains(&QualityGrade::Poor) {
        QualityVerdict::Lossy
    } else if grades.iter().all(|g| *g == QualityGrade::Excellent) {
        QualityVerdict::LosslessQuality
    } else {
        QualityVerdict::NearLossless
    };

    QualityAssessment {
        ssim_grade,
        psnr_grade,
        overall,
    }
}

/// One original -> processed step of a processing chain.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QualityStep {
    /// File the step started from
    pub original: PathBuf,
    /// File the step produced
    pub processed: PathBuf,
    /// Operation label (e.g. "trim", "concat")
    pub operation: String,
}

/// Analysis of a single pipeline step.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QualityStepAnalysis {
    pub step: QualityStep,
    pub metrics: QualityMetrics,
    pub assessment: QualityAssessment,
}

/// Aggregate report over a whole processing chain.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QualityPipelineReport {
    /// Number of steps analyzed
    pub processing_steps: usize,
    /// Per-step metrics and grades, in chain order
    pub step_analysis: Vec<QualityStepAnalysis>,
    /// Steps whose verdict was lossless quality
    pub lossless_steps: usize,
    /// Steps whose verdict was lossy
    pub lossy_steps: usize,
    /// Actionable suggestions derived from the per-step verdicts
    pub recommendations: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(ssim: Option<f64>, psnr: Option<f64>) -> QualityMetrics {
        QualityMetrics {
            ssim,
            psnr,
            vmaf: None,
            file_size_ratio: 1.0,
            processing_time_secs: 0.5,
        }
    }

    #[test]
    fn test_ssim_grading_thresholds() {
        assert_eq!(grade_ssim(1.0), QualityGrade::Excellent);
        assert_eq!(grade_ssim(0.99), QualityGrade::Excellent);
        assert_eq!(grade_ssim(0.97), QualityGrade::Good);
        assert_eq!(grade_ssim(0.92), QualityGrade::Fair);
        assert_eq!(grade_ssim(0.85), QualityGrade::Poor);
    }

    #[test]
    fn test_psnr_grading_thresholds() {
        assert_eq!(grade_psnr(50.0), QualityGrade::Excellent);
        assert_eq!(grade_psnr(45.0), QualityGrade::Excellent);
        assert_eq!(grade_psnr(40.0), QualityGrade::Good);
        assert_eq!(grade_psnr(30.0), QualityGrade::Fair);
        assert_eq!(grade_psnr(20.0), QualityGrade::Poor);
    }

    #[test]
    fn test_excellent_metrics_grade_lossless() {
        let assessment = assess_quality(&metrics(Some(0.99), Some(50.0)));
        assert_eq!(assessment.ssim_grade, Some(QualityGrade::Excellent));
        assert_eq!(assessment.psnr_grade, Some(QualityGrade::Excellent));
        assert_eq!(assessment.overall, QualityVerdict::LosslessQuality);
    }

    #[test]
    fn test_poor_metrics_grade_lossy() {
        let assessment = assess_quality(&metrics(Some(0.85), Some(20.0)));
        assert_eq!(assessment.ssim_grade, Some(QualityGrade::Poor));
        assert_eq!(assessment.psnr_grade, Some(QualityGrade::Poor));
        assert_eq!(assessment.overall, QualityVerdict::Lossy);
    }

    #[test]
    fn test_mixed_metrics_grade_near_lossless() {
        let assessment = assess_quality(&metrics(Some(0.99), Some(40.0)));
        assert_eq!(assessment.overall, QualityVerdict::NearLossless);
    }

    #[test]
    fn test_single_poor_metric_dominates() {
        let assessment = assess_quality(&metrics(Some(0.99), Some(20.0)));
        assert_eq!(assessment.overall, QualityVerdict::Lossy);
    }

    #[test]
    fn test_no_metrics_is_lossy() {
        let assessment = assess_quality(&metrics(None, None));
        assert_eq!(assessment.ssim_grade, None);
        assert_eq!(assessment.psnr_grade, None);
        assert_eq!(assessment.overall, QualityVerdict::Lossy);
    }

    #[test]
    fn test_verdict_display() {
        assert_eq!(QualityVerdict::LosslessQuality.to_string(), "lossless_quality");
        assert_eq!(QualityVerdict::Lossy.to_string(), "lossy");
        assert_eq!(QualityGrade::Excellent.to_string(), "excellent");
    }
}
