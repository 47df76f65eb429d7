//! Keyframe, alignment and extraction result types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a keyframe set was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum KeyframeSource {
    /// Exact ffprobe keyframe-only scan
    ExactScan,
    /// Full frame scan filtered to intra-coded frames
    FrameScan,
    /// Estimated from duration at a fixed GOP interval, not from the
    /// actual encoding
    SyntheticEstimate,
    /// All detection strategies failed
    Unavailable,
}

impl KeyframeSource {
    /// Whether the timestamps reflect the real encoding.
    pub fn is_measured(&self) -> bool {
        matches!(self, KeyframeSource::ExactScan | KeyframeSource::FrameScan)
    }
}

/// Ordered, deduplicated keyframe timestamps for one source file.
///
/// An empty set means no reliable keyframe information was available;
/// callers must treat the request as unaligned.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct KeyframeSet {
    /// Timestamps in seconds, monotonically non-decreasing
    pub timestamps: Vec<f64>,
    /// Detection strategy that produced the timestamps
    pub source: KeyframeSource,
}

impl KeyframeSet {
    /// Build a set from raw timestamps, sorting and deduplicating.
    pub fn new(mut timestamps: Vec<f64>, source: KeyframeSource) -> Self {
        timestamps.retain(|t| t.is_finite() && *t >= 0.0);
        timestamps.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        timestamps.dedup();
        Self { timestamps, source }
    }

    /// The empty set produced when every strategy failed.
    pub fn unavailable() -> Self {
        Self {
            timestamps: Vec::new(),
            source: KeyframeSource::Unavailable,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Timestamps as a slice, for the alignment evaluator.
    pub fn as_slice(&self) -> &[f64] {
        &self.timestamps
    }
}

/// Result of classifying a cut interval against a keyframe set.
///
/// When snapping was not requested the effective bounds equal the
/// requested bounds regardless of the aligned flags.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct AlignmentResult {
    /// Start bound to actually cut at, in seconds
    pub effective_start: f64,
    /// End bound to actually cut at, in seconds
    pub effective_end: f64,
    /// Whether the effective start sits on a keyframe within tolerance
    pub start_aligned: bool,
    /// Whether the effective end sits on a keyframe within tolerance
    pub end_aligned: bool,
}

impl AlignmentResult {
    /// Both edges aligned: the cut qualifies for stream copy.
    pub fn keyframe_aligned(&self) -> bool {
        self.start_aligned && self.end_aligned
    }

    /// Effective duration in seconds.
    pub fn duration(&self) -> f64 {
        self.effective_end - self.effective_start
    }
}

/// Extraction strategy that produced (or failed to produce) the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Direct stream copy, zero re-encoding
    StreamCopy,
    /// Partial re-encode bounded by the bracketing keyframes
    SmartCut,
    /// Full re-encode of the requested span at high quality
    ReEncoded,
    /// Last-resort encoder fallback
    FallbackEncoded,
    /// All tiers exhausted
    Failed,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::StreamCopy => "stream_copy",
            ExtractionMethod::SmartCut => "smart_cut",
            ExtractionMethod::ReEncoded => "re_encoded",
            ExtractionMethod::FallbackEncoded => "fallback_encoded",
            ExtractionMethod::Failed => "failed",
        }
    }

    /// Whether this method leaves the compressed stream untouched or
    /// near-untouched.
    pub fn preserves_quality(&self) -> bool {
        matches!(self, ExtractionMethod::StreamCopy | ExtractionMethod::SmartCut)
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Final record of one extraction call.
///
/// Constructed once per call and returned to the caller; never mutated
/// after construction.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractionOutcome {
    /// Whether any tier produced the output file
    pub success: bool,
    /// Tier that produced the output, or `Failed`
    pub method_used: ExtractionMethod,
    /// True only for lossless / near-lossless methods
    pub quality_preserved: bool,
    /// Whether the cut bounds were keyframe-aligned within tolerance
    pub keyframe_aligned: bool,
    /// Total wall-clock time for the call, in seconds
    pub processing_time_secs: f64,
    /// Size of the finished output file in bytes (0 on failure)
    pub output_size_bytes: u64,
    /// Why tiers were skipped or failed, plus quality notes, in order
    pub warnings: Vec<String>,
}

impl ExtractionOutcome {
    /// Successful outcome for the given tier.
    pub fn succeeded(
        method: ExtractionMethod,
        keyframe_aligned: bool,
        processing_time_secs: f64,
        output_size_bytes: u64,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            success: true,
            method_used: method,
            quality_preserved: method.preserves_quality(),
            keyframe_aligned,
            processing_time_secs,
            output_size_bytes,
            warnings,
        }
    }

    /// Outcome after all tiers were exhausted.
    pub fn failed(
        keyframe_aligned: bool,
        processing_time_secs: f64,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            success: false,
            method_used: ExtractionMethod::Failed,
            quality_preserved: false,
            keyframe_aligned,
            processing_time_secs,
            output_size_bytes: 0,
            warnings,
        }
    }
}
