//! FFprobe metadata queries.

use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Timeout for metadata probes. These read headers only and should be
/// near-instant; a stuck probe means a damaged file or a hung tool.
const PROBE_TIMEOUT_SECS: u64 = 15;

/// Stream and container metadata for one media file.
#[derive(Debug, Clone)]
pub struct MediaProbe {
    /// Container format name as reported by ffprobe, possibly a
    /// comma-separated alias list (e.g. "mov,mp4,m4a,3gp,3g2,mj2")
    pub container_format: String,
    /// Container duration in seconds, when known
    pub duration: Option<f64>,
    /// First video stream's codec name
    pub video_codec: Option<String>,
    /// First audio stream's codec name
    pub audio_codec: Option<String>,
    /// Whether the video stream uses B-frames
    pub has_b_frames: bool,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    has_b_frames: Option<i64>,
}

/// Probe a media file's stream and container metadata.
pub async fn probe_media(path: impl AsRef<Path>) -> MediaResult<MediaProbe> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    let stdout = run_ffprobe(
        &[
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ],
        path,
        PROBE_TIMEOUT_SECS,
    )
    .await?;

    parse_probe_output(&stdout)
}

/// Get a file's duration in seconds via a minimal format-only query.
///
/// Returns `Ok(None)` when the probe succeeds but the container does not
/// report a duration.
pub async fn get_duration(path: impl AsRef<Path>) -> MediaResult<Option<f64>> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    let stdout = run_ffprobe(
        &[
            "-show_entries",
            "format=duration",
            "-of",
            "default=nokey=1:noprint_wrappers=1",
        ],
        path,
        PROBE_TIMEOUT_SECS,
    )
    .await?;

    Ok(parse_duration_output(&stdout))
}

/// Run ffprobe with `-v error` plus the given arguments and return stdout.
pub(crate) async fn run_ffprobe(
    args: &[&str],
    path: &Path,
    timeout_secs: u64,
) -> MediaResult<String> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let mut command = Command::new("ffprobe");
    command
        .args(["-v", "error"])
        .args(args)
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(path = %path.display(), args = ?args, "running ffprobe");

    let timeout = std::time::Duration::from_secs(timeout_secs);
    let output = tokio::time::timeout(timeout, command.output())
        .await
        .map_err(|_| MediaError::Timeout(timeout_secs))??;

    if !output.status.success() {
        return Err(MediaError::ffprobe_failed(
            "ffprobe exited with non-zero status",
            Some(String::from_utf8_lossy(&output.stderr).to_string()),
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Parse the JSON body of a full metadata probe.
fn parse_probe_output(stdout: &str) -> MediaResult<MediaProbe> {
    let probe: FfprobeOutput = serde_json::from_str(stdout)?;

    let format = probe.format.as_ref();
    let container_format = format
        .and_then(|f| f.format_name.clone())
        .unwrap_or_default();
    let duration = format
        .and_then(|f| f.duration.as_ref())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| *d > 0.0);

    let video = probe.streams.iter().find(|s| s.codec_type == "video");
    let audio = probe.streams.iter().find(|s| s.codec_type == "audio");

    Ok(MediaProbe {
        container_format,
        duration,
        video_codec: video.and_then(|s| s.codec_name.clone()),
        audio_codec: audio.and_then(|s| s.codec_name.clone()),
        has_b_frames: video.and_then(|s| s.has_b_frames).unwrap_or(0) > 0,
    })
}

/// Parse the single-value output of a duration query.
fn parse_duration_output(stdout: &str) -> Option<f64> {
    let value = stdout.trim();
    if value.is_empty() || value == "N/A" {
        return None;
    }
    value.parse::<f64>().ok().filter(|d| *d > 0.0)
}
