//! Keyframe detection.
//!
//! Three strategies of decreasing precision, first success wins:
//! an exact keyframe-only scan, a full frame scan filtered to I-frames,
//! and a synthetic estimate derived from the file duration. Total
//! failure yields an empty set; this function never errors.

use std::path::Path;
use tracing::{debug, warn};
use vedit_models::{KeyframeSet, KeyframeSource};

use crate::error::MediaResult;
use crate::probe::{get_duration, run_ffprobe};

/// Timeout for the keyframe-only scan. Demuxers serve this from the
/// index, so it should be fast even for long files.
const EXACT_SCAN_TIMEOUT_SECS: u64 = 10;

/// Timeout for the full frame scan, which decodes frame headers for the
/// whole file.
const FRAME_SCAN_TIMEOUT_SECS: u64 = 60;

/// Assumed GOP size for the synthetic estimate, in seconds.
pub const SYNTHETIC_GOP_INTERVAL_SECS: f64 = 2.0;

/// Locate keyframe timestamps in a source file.
///
/// Never fails: exhaustion of all strategies is reported as an empty
/// [`KeyframeSet`] with source [`KeyframeSource::Unavailable`].
pub async fn locate_keyframes(path: impl AsRef<Path>) -> KeyframeSet {
    let path = path.as_ref();

    match exact_scan(path).await {
        Ok(timestamps) if !timestamps.is_empty() => {
            let set = KeyframeSet::new(timestamps, KeyframeSource::ExactScan);
            debug!(path = %path.display(), count = set.len(), "exact keyframe scan succeeded");
            return set;
        }
        Ok(_) => debug!(path = %path.display(), "exact keyframe scan returned no rows"),
        Err(e) => debug!(path = %path.display(), error = %e, "exact keyframe scan failed"),
    }

    match frame_scan(path).await {
        Ok(timestamps) if !timestamps.is_empty() => {
            let set = KeyframeSet::new(timestamps, KeyframeSource::FrameScan);
            debug!(path = %path.display(), count = set.len(), "frame-type scan succeeded");
            return set;
        }
        Ok(_) => debug!(path = %path.display(), "frame-type scan found no I-frames"),
        Err(e) => debug!(path = %path.display(), error = %e, "frame-type scan failed"),
    }

    match get_duration(path).await {
        Ok(Some(duration)) => {
            let timestamps = synthetic_series(duration);
            warn!(
                path = %path.display(),
                duration_secs = duration,
                interval_secs = SYNTHETIC_GOP_INTERVAL_SECS,
                "keyframe detection failed, using synthetic estimate not derived from the encoding"
            );
            KeyframeSet::new(timestamps, KeyframeSource::SyntheticEstimate)
        }
        Ok(None) => {
            warn!(path = %path.display(), "all keyframe strategies exhausted, duration unknown");
            KeyframeSet::unavailable()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "all keyframe strategies exhausted");
            KeyframeSet::unavailable()
        }
    }
}

/// Ask ffprobe for keyframe packets only.
async fn exact_scan(path: &Path) -> MediaResult<Vec<f64>> {
    let stdout = run_ffprobe(
        &[
            "-select_streams",
            "v:0",
            "-skip_frame",
            "nokey",
            "-show_entries",
            "frame=pts_time",
            "-of",
            "csv=p=0",
        ],
        path,
        EXACT_SCAN_TIMEOUT_SECS,
    )
    .await?;

    Ok(parse_timestamp_rows(&stdout))
}

/// Scan every frame's timestamp and picture type, keep the I-frames.
async fn frame_scan(path: &Path) -> MediaResult<Vec<f64>> {
    let stdout = run_ffprobe(
        &[
            "-select_streams",
            "v:0",
            "-show_entries",
            "frame=pts_time,pict_type",
            "-of",
            "csv=p=0",
        ],
        path,
        FRAME_SCAN_TIMEOUT_SECS,
    )
    .await?;

    Ok(parse_frame_type_rows(&stdout))
}

/// Parse one timestamp per CSV row, skipping blank, `N/A` and
/// unparseable rows.
fn parse_timestamp_rows(stdout: &str) -> Vec<f64> {
    stdout
        .lines()
        .filter_map(|line| line.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != "N/A")
        .filter_map(|v| v.parse::<f64>().ok())
        .collect()
}

/// Parse `pts_time,pict_type` CSV rows, keeping intra-coded frames.
fn parse_frame_type_rows(stdout: &str) -> Vec<f64> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut fields = line.split(',');
            let ts = fields.next()?.trim();
            let pict_type = fields.next()?.trim();
            if pict_type != "I" || ts.is_empty() || ts == "N/A" {
                return None;
            }
            ts.parse::<f64>().ok()
        })
        .collect()
}

/// Emit a timestamp every GOP interval, starting at 0.0, strictly below
/// the duration.
fn synthetic_series(duration: f64) -> Vec<f64> {
    if duration <= 0.0 {
        return Vec::new();
    }
    let count = (duration / SYNTHETIC_GOP_INTERVAL_SECS).ceil() as usize;
    (0..count)
        .map(|i| i as f64 * SYNTHETIC_GOP_INTERVAL_SECS)
        .filter(|t| *t < duration)
        .collect()
}
