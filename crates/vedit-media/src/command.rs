//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};
use vedit_models::EncodingConfig;

use crate::error::{MediaError, MediaResult};
use crate::progress::FfmpegProgress;

/// How many trailing stderr lines are kept for diagnostics. The tail goes
/// to logs only, never into caller-visible results.
const STDERR_TAIL_LINES: usize = 12;

/// Builder for FFmpeg invocations with one input and one output file.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path
    output: PathBuf,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
        }
    }

    /// Add an input argument (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add an output argument (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set seek position before the input. Seeks to the nearest keyframe
    /// at or before the position, which is what stream copy needs.
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    /// Set output duration.
    pub fn duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format!("{:.3}", seconds))
    }

    /// Copy all streams without re-encoding.
    pub fn codec_copy(self) -> Self {
        self.output_arg("-c").output_arg("copy")
    }

    /// Shift timestamps so the output starts at zero. Required after
    /// seeking with stream copy to avoid negative timestamps.
    pub fn avoid_negative_ts(self) -> Self {
        self.output_arg("-avoid_negative_ts").output_arg("make_zero")
    }

    /// Move the moov atom up front for streamable MP4 output.
    pub fn faststart(self) -> Self {
        self.output_arg("-movflags").output_arg("+faststart")
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set audio filter.
    pub fn audio_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-af").output_arg(filter)
    }

    /// Apply an encoding configuration (codec, preset, CRF, audio).
    pub fn encode_with(self, encoding: &EncodingConfig) -> Self {
        self.output_args(encoding.to_ffmpeg_args())
    }

    /// Input file path.
    pub fn input_path(&self) -> &Path {
        &self.input
    }

    /// Output file path.
    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Build the full argument list.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-v".to_string(),
            "error".to_string(),
            // Progress key=value stream on stderr
            "-progress".to_string(),
            "pipe:2".to_string(),
        ];

        args.extend(self.input_args.clone());
        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());
        args.extend(self.output_args.clone());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands.
///
/// Every run is bounded by a timeout; there is no mid-invocation
/// cancellation beyond letting the timeout fire and killing the process.
pub struct FfmpegRunner {
    timeout_secs: u64,
}

impl FfmpegRunner {
    /// Create a runner with the given timeout.
    pub fn with_timeout(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }

    /// Run a command to completion, verifying it produced output.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_with_progress(cmd, |_| {}).await
    }

    /// Run a command, feeding parsed progress updates to a callback.
    ///
    /// Succeeds only if the process exits zero within the timeout AND the
    /// output file exists with non-zero size.
    pub async fn run_with_progress<F>(&self, cmd: &FfmpegCommand, on_progress: F) -> MediaResult<()>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let args = cmd.build_args();
        debug!(command = %args.join(" "), "running ffmpeg");

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child.stderr.take().ok_or_else(|| {
            MediaError::ffmpeg_failed("stderr not captured", None, None)
        })?;
        let mut reader = BufReader::new(stderr).lines();

        // Stderr carries both the -progress stream and error lines; parse
        // the former, keep a tail of the latter for the logs.
        let stderr_task = tokio::spawn(async move {
            let mut tail: Vec<String> = Vec::new();
            let mut current = FfmpegProgress::default();

            while let Ok(Some(line)) = reader.next_line().await {
                if let Some(progress) = parse_progress_line(&line, &mut current) {
                    on_progress(progress);
                } else if !line.trim().is_empty() {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.remove(0);
                    }
                    tail.push(line);
                }
            }
            tail
        });

        let status = self.wait_for_completion(&mut child).await;
        let tail = stderr_task.await.unwrap_or_default();

        let status = match status {
            Ok(status) => status,
            Err(e) => {
                if !tail.is_empty() {
                    warn!(stderr_tail = %tail.join(" | "), "ffmpeg did not complete");
                }
                return Err(e);
            }
        };

        if !status.success() {
            warn!(
                exit_code = ?status.code(),
                stderr_tail = %tail.join(" | "),
                "ffmpeg exited with non-zero status"
            );
            return Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                Some(tail.join("\n")),
                status.code(),
            ));
        }

        verify_output(cmd.output_path()).await
    }

    /// Wait for the child, killing it if the timeout fires.
    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<std::process::ExitStatus> {
        let timeout = std::time::Duration::from_secs(self.timeout_secs);
        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!(
                    timeout_secs = self.timeout_secs,
                    "ffmpeg timed out, killing process"
                );
                let _ = child.kill().await;
                Err(MediaError::Timeout(self.timeout_secs))
            }
        }
    }
}

/// Check that a completed command actually produced a usable file.
async fn verify_output(path: &Path) -> MediaResult<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) | Err(_) => Err(MediaError::MissingOutput(path.to_path_buf())),
    }
}

/// Parse one line of FFmpeg's `-progress` key=value output.
///
/// Returns a snapshot to publish when the line terminates a progress
/// block (`progress=continue` / `progress=end`); other recognized keys
/// update the accumulator and return `None`.
fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> Option<FfmpegProgress> {
    let (key, value) = line.trim().split_once('=')?;

    match key {
        "frame" => {
            if let Ok(frame) = value.parse() {
                current.frame = frame;
            }
        }
        "fps" => {
            if let Ok(fps) = value.parse() {
                current.fps = fps;
            }
        }
        "out_time_ms" | "out_time_us" => {
            // Both keys are microseconds in practice; ffmpeg emits
            // out_time_ms with microsecond precision for compatibility.
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_ms = us / 1000;
            }
        }
        "speed" => {
            if value != "N/A" {
                if let Some(speed) = value.strip_suffix('x').and_then(|s| s.parse().ok()) {
                    current.speed = speed;
                }
            }
        }
        "progress" => {
            if value == "end" {
                current.is_complete = true;
            }
            return Some(current.clone());
        }
        _ => {}
    }

    None
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_copy_command_args() {
        let cmd = FfmpegCommand::new("input.mp4", "output.mp4")
            .seek(2.0)
            .duration(2.0)
            .codec_copy()
            .avoid_negative_ts()
            .faststart();

        let args = cmd.build_args();
        let joined = args.join(" ");

        // -ss must come before -i for keyframe seeking
        let ss_pos = args.iter().position(|a| a == "-ss").unwrap();
        let i_pos = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss_pos < i_pos);

        assert!(joined.contains("-c copy"));
        assert!(joined.contains("-avoid_negative_ts make_zero"));
        assert!(joined.contains("-movflags +faststart"));
        assert!(args.contains(&"2.000".to_string()));
    }

    #[test]
    fn test_encode_command_args() {
        let encoding = EncodingConfig::quality();
        let cmd = FfmpegCommand::new("input.mp4", "output.mp4")
            .seek(1.5)
            .duration(2.0)
            .encode_with(&encoding);

        let args = cmd.build_args();
        assert!(args.contains(&"-c:v".to_string()));
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"-crf".to_string()));
        assert!(args.contains(&"18".to_string()));
        assert!(args.contains(&"-c:a".to_string()));
        assert!(args.contains(&"aac".to_string()));
    }

    #[test]
    fn test_filters_land_after_input() {
        let cmd = FfmpegCommand::new("in.mp4", "out.mp4")
            .video_filter("trim=start=1.5:end=3.5,setpts=PTS-STARTPTS")
            .audio_filter("atrim=start=1.5:end=3.5,asetpts=PTS-STARTPTS");

        let args = cmd.build_args();
        let i_pos = args.iter().position(|a| a == "-i").unwrap();
        let vf_pos = args.iter().position(|a| a == "-vf").unwrap();
        let af_pos = args.iter().position(|a| a == "-af").unwrap();
        assert!(i_pos < vf_pos);
        assert!(i_pos < af_pos);
    }

    #[test]
    fn test_progress_parsing() {
        let mut progress = FfmpegProgress::default();

        assert!(parse_progress_line("frame=42", &mut progress).is_none());
        assert_eq!(progress.frame, 42);

        parse_progress_line("out_time_ms=5000000", &mut progress);
        assert_eq!(progress.out_time_ms, 5000);

        parse_progress_line("speed=1.5x", &mut progress);
        assert!((progress.speed - 1.5).abs() < 0.01);

        let snapshot = parse_progress_line("progress=end", &mut progress);
        assert!(snapshot.is_some());
        assert!(progress.is_complete);
    }

    #[test]
    fn test_progress_ignores_na_speed() {
        let mut progress = FfmpegProgress::default();
        parse_progress_line("speed=N/A", &mut progress);
        assert_eq!(progress.speed, 0.0);
    }
}
