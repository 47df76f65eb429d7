//! Cut request definition and validation.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from cut request validation.
///
/// These are precondition violations. The engine rejects the request
/// before any external tool is invoked.
#[derive(Debug, Error, PartialEq)]
pub enum CutValidationError {
    #[error("cut bounds must be finite numbers (start={start}, end={end})")]
    NonFinite { start: f64, end: f64 },

    #[error("cut start must be >= 0, got {0}")]
    NegativeStart(f64),

    #[error("cut end ({end}) must be greater than start ({start})")]
    EmptyRange { start: f64, end: f64 },
}

/// A request to extract the interval `[start_secs, end_secs)` from a
/// source media file into `output`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CutRequest {
    /// Path to the source media file
    pub source: PathBuf,

    /// Requested start of the cut, in seconds
    pub start_secs: f64,

    /// Requested end of the cut, in seconds (exclusive)
    pub end_secs: f64,

    /// Path the finished clip is written to
    pub output: PathBuf,

    /// Snap the cut bounds to nearby keyframes when within snapping range
    #[serde(default)]
    pub force_keyframe_snap: bool,

    /// Allow the partial re-encode ("smart cut") tier for non-aligned cuts
    #[serde(default = "default_allow_smart_cut")]
    pub allow_smart_cut: bool,
}

fn default_allow_smart_cut() -> bool {
    true
}

impl CutRequest {
    /// Create a request with default flags (snapping off, smart cut on).
    pub fn new(
        source: impl AsRef<Path>,
        start_secs: f64,
        end_secs: f64,
        output: impl AsRef<Path>,
    ) -> Self {
        Self {
            source: source.as_ref().to_path_buf(),
            start_secs,
            end_secs,
            output: output.as_ref().to_path_buf(),
            force_keyframe_snap: false,
            allow_smart_cut: true,
        }
    }

    /// Enable keyframe snapping.
    pub fn with_keyframe_snap(mut self) -> Self {
        self.force_keyframe_snap = true;
        self
    }

    /// Disable the smart cut tier.
    pub fn without_smart_cut(mut self) -> Self {
        self.allow_smart_cut = false;
        self
    }

    /// Requested duration in seconds.
    pub fn duration(&self) -> f64 {
        self.end_secs - self.start_secs
    }

    /// Check the request preconditions: bounds finite, non-negative,
    /// and `end > start`.
    pub fn validate(&self) -> Result<(), CutValidationError> {
        if !self.start_secs.is_finite() || !self.end_secs.is_finite() {
            return Err(CutValidationError::NonFinite {
                start: self.start_secs,
                end: self.end_secs,
            });
        }
        if self.start_secs < 0.0 {
            return Err(CutValidationError::NegativeStart(self.start_secs));
        }
        if self.end_secs <= self.start_secs {
            return Err(CutValidationError::EmptyRange {
                start: self.start_secs,
                end: self.end_secs,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_request() {
        let req = CutRequest::new("in.mp4", 1.0, 3.0, "out.mp4");
        assert!(req.validate().is_ok());
        assert!((req.duration() - 2.0).abs() < f64::EPSILON);
        assert!(req.allow_smart_cut);
        assert!(!req.force_keyframe_snap);
    }

    #[test]
    fn test_end_must_exceed_start() {
        let req = CutRequest::new("in.mp4", 3.0, 3.0, "out.mp4");
        assert_eq!(
            req.validate(),
            Err(CutValidationError::EmptyRange {
                start: 3.0,
                end: 3.0
            })
        );
    }

    #[test]
    fn test_negative_start_rejected() {
        let req = CutRequest::new("in.mp4", -1.0, 3.0, "out.mp4");
        assert_eq!(req.validate(), Err(CutValidationError::NegativeStart(-1.0)));
    }

    #[test]
    fn test_non_finite_rejected() {
        let req = CutRequest::new("in.mp4", f64::NAN, 3.0, "out.mp4");
        assert!(matches!(
            req.validate(),
            Err(CutValidationError::NonFinite { .. })
        ));
    }

    #[test]
    fn test_builder_flags() {
        let req = CutRequest::new("in.mp4", 0.0, 1.0, "out.mp4")
            .with_keyframe_snap()
            .without_smart_cut();
        assert!(req.force_keyframe_snap);
        assert!(!req.allow_smart_cut);
    }
}
