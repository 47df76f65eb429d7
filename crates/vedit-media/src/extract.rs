//! Clip extraction with a tiered lossless-first fallback chain.
//!
//! Tiers, in fixed priority order:
//! 1. stream copy, only when the cut is keyframe-aligned
//! 2. smart cut: partial re-encode bounded by the bracketing keyframes
//! 3. full re-encode of the requested span at high quality
//! 4. last-resort fallback encoder
//!
//! Every tier renders into a staging directory and is moved to the
//! caller's output path only on success, so a failed or interrupted
//! run never leaves a partial file at the caller-visible path.

use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};
use vedit_models::{
    AlignmentResult, CutRequest, EncodingConfig, ExtractionMethod, ExtractionOutcome, KeyframeSet,
};

use crate::alignment::{evaluate_alignment, find_nearest_keyframe, ALIGNMENT_TOLERANCE_SECS};
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::move_file;
use crate::keyframes::locate_keyframes;

/// Stream copy remuxes without decoding and should be near-instant.
const STREAM_COPY_TIMEOUT_SECS: u64 = 60;
/// Smart cut re-encodes at most a few GOPs.
const SMART_CUT_TIMEOUT_SECS: u64 = 180;
/// Full re-encode of the requested span.
const RE_ENCODE_TIMEOUT_SECS: u64 = 300;
/// Last-resort encode, same ceiling as the full re-encode.
const FALLBACK_TIMEOUT_SECS: u64 = 300;

/// Extraction tiers in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    StreamCopy,
    SmartCut,
    ReEncode,
    Fallback,
}

impl Tier {
    const ORDER: [Tier; 4] = [Tier::StreamCopy, Tier::SmartCut, Tier::ReEncode, Tier::Fallback];

    fn method(self) -> ExtractionMethod {
        match self {
            Tier::StreamCopy => ExtractionMethod::StreamCopy,
            Tier::SmartCut => ExtractionMethod::SmartCut,
            Tier::ReEncode => ExtractionMethod::ReEncoded,
            Tier::Fallback => ExtractionMethod::FallbackEncoded,
        }
    }

    fn label(self) -> &'static str {
        self.method().as_str()
    }
}

/// Extract the requested interval from a source file, trying each tier
/// until one produces the output.
///
/// Returns `Err` only for precondition violations (invalid request,
/// missing source) raised before any external tool runs. Expected
/// failures (probe problems, tier failures, total exhaustion) are
/// folded into the returned [`ExtractionOutcome`].
pub async fn extract_clip(
    request: &CutRequest,
    encoding: &EncodingConfig,
) -> MediaResult<ExtractionOutcome> {
    request.validate()?;
    if !request.source.exists() {
        return Err(MediaError::FileNotFound(request.source.clone()));
    }

    let started = Instant::now();
    info!(
        source = %request.source.display(),
        output = %request.output.display(),
        start_secs = request.start_secs,
        end_secs = request.end_secs,
        snap = request.force_keyframe_snap,
        smart_cut = request.allow_smart_cut,
        "starting clip extraction"
    );

    let keyframes = locate_keyframes(&request.source).await;
    let alignment = evaluate_alignment(
        request.start_secs,
        request.end_secs,
        keyframes.as_slice(),
        ALIGNMENT_TOLERANCE_SECS,
        request.force_keyframe_snap,
    );

    debug!(
        keyframes = keyframes.len(),
        keyframe_source = ?keyframes.source,
        keyframe_aligned = alignment.keyframe_aligned(),
        effective_start = alignment.effective_start,
        effective_end = alignment.effective_end,
        "cut classified"
    );

    // All tiers stage here; dropped on every exit path
    let staging = tempfile::tempdir()?;
    let mut warnings: Vec<String> = Vec::new();

    for tier in Tier::ORDER {
        if let Some(reason) = tier_skip_reason(tier, request, &keyframes, &alignment) {
            debug!(tier = tier.label(), reason = %reason, "tier skipped");
            warnings.push(reason);
            continue;
        }

        let staged = staging.path().join(staging_name(tier, &request.output));
        match run_tier(tier, request, encoding, &keyframes, &alignment, &staged).await {
            Ok(()) => {
                move_file(&staged, &request.output).await?;
                let output_size_bytes = tokio::fs::metadata(&request.output)
                    .await
                    .map(|m| m.len())
                    .unwrap_or(0);

                if let Some(note) = quality_note(tier) {
                    warnings.push(note.to_string());
                }

                let outcome = ExtractionOutcome::succeeded(
                    tier.method(),
                    alignment.keyframe_aligned(),
                    started.elapsed().as_secs_f64(),
                    output_size_bytes,
                    warnings,
                );
                info!(
                    method = tier.label(),
                    output_size_bytes,
                    elapsed_secs = outcome.processing_time_secs,
                    "clip extraction succeeded"
                );
                return Ok(outcome);
            }
            Err(e) => {
                warn!(tier = tier.label(), error = %e, "tier failed, advancing");
                warnings.push(format!("{} failed: {}", tier.label(), e));
            }
        }
    }

    warn!(
        source = %request.source.display(),
        "all extraction tiers exhausted"
    );
    Ok(ExtractionOutcome::failed(
        alignment.keyframe_aligned(),
        started.elapsed().as_secs_f64(),
        warnings,
    ))
}

/// Why a tier does not apply to this request, if it doesn't.
fn tier_skip_reason(
    tier: Tier,
    request: &CutRequest,
    keyframes: &KeyframeSet,
    alignment: &AlignmentResult,
) -> Option<String> {
    match tier {
        Tier::StreamCopy if !alignment.keyframe_aligned() => Some(
            "stream copy skipped: cut points are not keyframe-aligned".to_string(),
        ),
        Tier::SmartCut if !request.allow_smart_cut => {
            Some("smart cut skipped: disabled by request".to_string())
        }
        Tier::SmartCut if keyframes.is_empty() => {
            Some("smart cut skipped: no keyframe information available".to_string())
        }
        _ => None,
    }
}

/// Quality note attached to a successful tier's outcome. Stream copy is
/// the only method that carries none.
fn quality_note(tier: Tier) -> Option<&'static str> {
    match tier {
        Tier::StreamCopy => None,
        Tier::SmartCut => {
            Some("smart cut re-encoded the span between the bracketing keyframes; quality loss is minimal")
        }
        Tier::ReEncode => Some("full re-encode of the requested span; source stream data not preserved"),
        Tier::Fallback => Some("fallback encoder used; quality loss is possible"),
    }
}

/// Staging file name for a tier, preserving the output extension so the
/// muxer is inferred correctly.
fn staging_name(tier: Tier, output: &Path) -> String {
    let ext = output
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mp4");
    format!("{}.{}", tier.label(), ext)
}

/// Dispatch one tier. Uniform signature so the selector loop stays a
/// plain ordered walk.
async fn run_tier(
    tier: Tier,
    request: &CutRequest,
    encoding: &EncodingConfig,
    keyframes: &KeyframeSet,
    alignment: &AlignmentResult,
    staged: &Path,
) -> MediaResult<()> {
    match tier {
        Tier::StreamCopy => stream_copy(request, alignment, staged).await,
        Tier::SmartCut => smart_cut(request, keyframes, staged).await,
        Tier::ReEncode => re_encode(request, encoding, staged).await,
        Tier::Fallback => fallback_encode(request, staged).await,
    }
}

/// Tier 1: remux the aligned span without re-encoding.
async fn stream_copy(
    request: &CutRequest,
    alignment: &AlignmentResult,
    staged: &Path,
) -> MediaResult<()> {
    let cmd = FfmpegCommand::new(&request.source, staged)
        .seek(alignment.effective_start)
        .duration(alignment.duration())
        .codec_copy()
        .avoid_negative_ts()
        .faststart();

    FfmpegRunner::with_timeout(STREAM_COPY_TIMEOUT_SECS)
        .run(&cmd)
        .await
}

/// Keyframes bracketing a cut: the keyframe at or before `start` and
/// the keyframe at or after `end`. The pre-keyframe is clamped to the
/// start so trim offsets can never go negative.
fn smart_cut_bounds(start: f64, end: f64, keyframes: &[f64]) -> (f64, f64) {
    let pre = find_nearest_keyframe(start, keyframes, true)
        .unwrap_or(0.0)
        .min(start);
    let post = find_nearest_keyframe(end, keyframes, false)
        .unwrap_or(end)
        .max(end);
    (pre, post)
}

/// Tier 2: decode from the pre-keyframe and re-encode only the
/// requested span, keeping audio in sync via matching trim filters.
///
/// If the precise-trim invocation fails, retries once with a plain
/// seek+duration invocation at the same quality target before giving
/// up the tier. Exact frame accuracy is best-effort on codecs with
/// open GOPs.
async fn smart_cut(request: &CutRequest, keyframes: &KeyframeSet, staged: &Path) -> MediaResult<()> {
    let (pre, post) = smart_cut_bounds(request.start_secs, request.end_secs, keyframes.as_slice());
    let trim_start = request.start_secs - pre;
    let trim_end = request.end_secs - pre;
    let encoding = EncodingConfig::smart_cut();

    debug!(
        pre_keyframe = pre,
        post_keyframe = post,
        trim_start,
        trim_end,
        "smart cut bounds computed"
    );

    let runner = FfmpegRunner::with_timeout(SMART_CUT_TIMEOUT_SECS);

    let precise = FfmpegCommand::new(&request.source, staged)
        .seek(pre)
        .video_filter(format!(
            "trim=start={:.3}:end={:.3},setpts=PTS-STARTPTS",
            trim_start, trim_end
        ))
        .audio_filter(format!(
            "atrim=start={:.3}:end={:.3},asetpts=PTS-STARTPTS",
            trim_start, trim_end
        ))
        .encode_with(&encoding)
        .faststart();

    match runner.run(&precise).await {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!(error = %e, "precise smart cut failed, retrying with direct seek");
            let direct = FfmpegCommand::new(&request.source, staged)
                .seek(request.start_secs)
                .duration(request.duration())
                .encode_with(&encoding)
                .faststart();
            runner.run(&direct).await
        }
    }
}

/// Tier 3: re-encode the full requested span with the injected
/// high-quality configuration.
async fn re_encode(
    request: &CutRequest,
    encoding: &EncodingConfig,
    staged: &Path,
) -> MediaResult<()> {
    let cmd = FfmpegCommand::new(&request.source, staged)
        .seek(request.start_secs)
        .duration(request.duration())
        .encode_with(encoding)
        .avoid_negative_ts()
        .faststart();

    FfmpegRunner::with_timeout(RE_ENCODE_TIMEOUT_SECS)
        .run(&cmd)
        .await
}

/// Tier 4: alternate encoder first, then a flag-free invocation that
/// lets the tool pick its own defaults.
async fn fallback_encode(request: &CutRequest, staged: &Path) -> MediaResult<()> {
    let runner = FfmpegRunner::with_timeout(FALLBACK_TIMEOUT_SECS);

    let alternate = FfmpegCommand::new(&request.source, staged)
        .seek(request.start_secs)
        .duration(request.duration())
        .output_arg("-c:v")
        .output_arg(vedit_models::encoding::FALLBACK_VIDEO_CODEC)
        .output_arg("-q:v")
        .output_arg("2")
        .output_arg("-c:a")
        .output_arg(vedit_models::encoding::DEFAULT_AUDIO_CODEC);

    match runner.run(&alternate).await {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!(error = %e, "alternate encoder failed, trying tool defaults");
            let defaults = FfmpegCommand::new(&request.source, staged)
                .seek(request.start_secs)
                .duration(request.duration());
            runner.run(&defaults).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vedit_models::KeyframeSource;

    fn aligned_result() -> AlignmentResult {
        AlignmentResult {
            effective_start: 2.0,
            effective_end: 4.0,
            start_aligned: true,
            end_aligned: true,
        }
    }

    fn unaligned_result() -> AlignmentResult {
        AlignmentResult {
            effective_start: 1.5,
            effective_end: 3.5,
            start_aligned: false,
            end_aligned: false,
        }
    }

    fn keyframes() -> KeyframeSet {
        KeyframeSet::new(vec![0.0, 2.0, 4.0, 6.0, 8.0], KeyframeSource::ExactScan)
    }

    #[test]
    fn test_stream_copy_requires_alignment() {
        let request = CutRequest::new("in.mp4", 2.0, 4.0, "out.mp4");
        assert!(tier_skip_reason(Tier::StreamCopy, &request, &keyframes(), &aligned_result()).is_none());

        let request = CutRequest::new("in.mp4", 1.5, 3.5, "out.mp4");
        assert!(tier_skip_reason(Tier::StreamCopy, &request, &keyframes(), &unaligned_result()).is_some());
    }

    #[test]
    fn test_smart_cut_requires_opt_in_and_keyframes() {
        let request = CutRequest::new("in.mp4", 1.5, 3.5, "out.mp4");
        assert!(tier_skip_reason(Tier::SmartCut, &request, &keyframes(), &unaligned_result()).is_none());

        let disabled = request.clone().without_smart_cut();
        assert!(tier_skip_reason(Tier::SmartCut, &disabled, &keyframes(), &unaligned_result()).is_some());

        assert!(tier_skip_reason(
            Tier::SmartCut,
            &request,
            &KeyframeSet::unavailable(),
            &unaligned_result()
        )
        .is_some());
    }

    #[test]
    fn test_re_encode_and_fallback_are_unconditional() {
        let request = CutRequest::new("in.mp4", 1.5, 3.5, "out.mp4").without_smart_cut();
        assert!(tier_skip_reason(Tier::ReEncode, &request, &KeyframeSet::unavailable(), &unaligned_result()).is_none());
        assert!(tier_skip_reason(Tier::Fallback, &request, &KeyframeSet::unavailable(), &unaligned_result()).is_none());
    }

    #[test]
    fn test_smart_cut_bounds() {
        let k = [0.0, 2.0, 4.0, 6.0, 8.0];
        let (pre, post) = smart_cut_bounds(1.5, 3.5, &k);
        assert_eq!(pre, 0.0);
        assert_eq!(post, 4.0);

        // Offsets relative to the pre-keyframe
        assert!((1.5 - pre - 1.5).abs() < f64::EPSILON);
        assert!((3.5 - pre - 3.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_smart_cut_bounds_clamp_to_request() {
        // First keyframe is after the requested start; pre must not
        // exceed the start or trim offsets would go negative
        let k = [2.0, 4.0];
        let (pre, post) = smart_cut_bounds(1.0, 5.0, &k);
        assert_eq!(pre, 1.0);
        assert_eq!(post, 5.0);
    }

    #[test]
    fn test_quality_note_only_absent_for_stream_copy() {
        assert!(quality_note(Tier::StreamCopy).is_none());
        assert!(quality_note(Tier::SmartCut).is_some());
        assert!(quality_note(Tier::ReEncode).is_some());
        assert!(quality_note(Tier::Fallback).is_some());
    }

    #[test]
    fn test_staging_name_keeps_extension() {
        assert_eq!(staging_name(Tier::StreamCopy, Path::new("clip.mkv")), "stream_copy.mkv");
        assert_eq!(staging_name(Tier::ReEncode, Path::new("clip")), "re_encoded.mp4");
    }

    #[tokio::test]
    async fn test_invalid_request_fails_fast() {
        let request = CutRequest::new("in.mp4", 3.0, 1.0, "out.mp4");
        let err = extract_clip(&request, &EncodingConfig::quality())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::InvalidCut(_)));
    }

    #[tokio::test]
    async fn test_missing_source_fails_fast() {
        let request = CutRequest::new("/nonexistent/video.mp4", 0.0, 2.0, "out.mp4");
        let err = extract_clip(&request, &EncodingConfig::quality())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
