//! Lossless-compatibility prediction.
//!
//! One metadata probe decides whether stream-copy operations are likely
//! to succeed for a file: codecs and container must all be in the known
//! copy-friendly sets. B-frames are reported as a hazard warning only.

use std::path::Path;
use tracing::debug;
use vedit_models::CompatibilityReport;

use crate::error::MediaResult;
use crate::probe::{probe_media, MediaProbe};

/// Video codecs that remux cleanly into the supported containers.
const COPY_FRIENDLY_VIDEO_CODECS: &[&str] = &["h264", "hevc", "vp8", "vp9", "av1", "mpeg4"];

/// Audio codecs that remux cleanly.
const COPY_FRIENDLY_AUDIO_CODECS: &[&str] = &["aac", "mp3", "opus", "vorbis", "flac", "ac3"];

/// Container formats known to support stream-copied cuts. Matched
/// against the comma-separated alias list ffprobe reports.
const COPY_FRIENDLY_CONTAINERS: &[&str] = &["mp4", "mov", "m4a", "matroska", "mkv", "webm"];

/// Predict whether lossless operations will succeed for a file.
pub async fn check_compatibility(path: impl AsRef<Path>) -> MediaResult<CompatibilityReport> {
    let path = path.as_ref();
    let probe = probe_media(path).await?;
    let report = build_report(&probe);

    debug!(
        path = %path.display(),
        compatible = report.compatible,
        video_codec = ?report.video_codec,
        audio_codec = ?report.audio_codec,
        container = %report.container_format,
        "compatibility checked"
    );

    Ok(report)
}

/// Classify probed metadata against the copy-friendly sets.
fn build_report(probe: &MediaProbe) -> CompatibilityReport {
    let mut warnings = Vec::new();

    let video_ok = match probe.video_codec.as_deref() {
        Some(codec) if COPY_FRIENDLY_VIDEO_CODECS.contains(&codec) => true,
        Some(codec) => {
            warnings.push(format!(
                "video codec '{}' is not stream-copy friendly; cuts will re-encode",
                codec
            ));
            false
        }
        None => {
            warnings.push("no video stream found".to_string());
            false
        }
    };

    // A missing audio stream is fine; an exotic one is not
    let audio_ok = match probe.audio_codec.as_deref() {
        None => true,
        Some(codec) if COPY_FRIENDLY_AUDIO_CODECS.contains(&codec) => true,
        Some(codec) => {
            warnings.push(format!(
                "audio codec '{}' is not stream-copy friendly",
                codec
            ));
            false
        }
    };

    let container_ok = probe
        .container_format
        .split(',')
        .map(str::trim)
        .any(|token| COPY_FRIENDLY_CONTAINERS.contains(&token));
    if !container_ok {
        warnings.push(format!(
            "container '{}' is not known to support lossless cuts",
            probe.container_format
        ));
    }

    if probe.has_b_frames {
        warnings.push(
            "source uses B-frames; frame-accurate lossless cuts may shift to keyframe boundaries"
                .to_string(),
        );
    }

    CompatibilityReport {
        compatible: video_ok && audio_ok && container_ok,
        video_codec: probe.video_codec.clone(),
        audio_codec: probe.audio_codec.clone(),
        container_format: probe.container_format.clone(),
        has_b_frames: probe.has_b_frames,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h264_aac_mp4() -> MediaProbe {
        MediaProbe {
            container_format: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
            duration: Some(10.0),
            video_codec: Some("h264".to_string()),
            audio_codec: Some("aac".to_string()),
            has_b_frames: false,
        }
    }

    #[test]
    fn test_h264_aac_mp4_is_compatible() {
        let report = build_report(&h264_aac_mp4());
        assert!(report.compatible);
        assert!(report.warnings.is_empty());
        assert!(!report.has_b_frames);
    }

    #[test]
    fn test_b_frames_warn_but_stay_compatible() {
        let probe = MediaProbe {
            has_b_frames: true,
            ..h264_aac_mp4()
        };
        let report = build_report(&probe);
        assert!(report.compatible);
        assert!(!report.warnings.is_empty());
        assert!(report.warnings[0].contains("B-frames"));
    }

    #[test]
    fn test_exotic_video_codec_is_incompatible() {
        let probe = MediaProbe {
            video_codec: Some("mpeg2video".to_string()),
            ..h264_aac_mp4()
        };
        let report = build_report(&probe);
        assert!(!report.compatible);
        assert!(report.warnings.iter().any(|w| w.contains("mpeg2video")));
    }

    #[test]
    fn test_exotic_container_is_incompatible() {
        let probe = MediaProbe {
            container_format: "avi".to_string(),
            ..h264_aac_mp4()
        };
        let report = build_report(&probe);
        assert!(!report.compatible);
    }

    #[test]
    fn test_missing_audio_stream_is_fine() {
        let probe = MediaProbe {
            audio_codec: None,
            ..h264_aac_mp4()
        };
        let report = build_report(&probe);
        assert!(report.compatible);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_missing_video_stream_is_incompatible() {
        let probe = MediaProbe {
            video_codec: None,
            ..h264_aac_mp4()
        };
        let report = build_report(&probe);
        assert!(!report.compatible);
    }

    #[test]
    fn test_matroska_alias_matches() {
        let probe = MediaProbe {
            container_format: "matroska,webm".to_string(),
            ..h264_aac_mp4()
        };
        assert!(build_report(&probe).compatible);
    }
}
