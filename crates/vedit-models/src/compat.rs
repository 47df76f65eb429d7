//! Stream-copy compatibility report.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Prediction of whether lossless (stream copy) operations will succeed
/// for a media file, derived from one probe of its metadata.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CompatibilityReport {
    /// Codecs and container are all in the known copy-friendly sets
    pub compatible: bool,
    /// Video codec name, if a video stream exists
    pub video_codec: Option<String>,
    /// Audio codec name, if an audio stream exists
    pub audio_codec: Option<String>,
    /// Container format name as reported by the probe
    pub container_format: String,
    /// Whether the video stream uses B-frames. B-frames complicate
    /// frame-accurate lossless cutting but do not make it impossible,
    /// so this only adds a warning.
    pub has_b_frames: bool,
    /// Human-readable notes about compatibility hazards
    pub warnings: Vec<String>,
}
