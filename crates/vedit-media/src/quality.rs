//! Post-hoc quality analysis via FFmpeg's comparison filters.
//!
//! SSIM and PSNR come from the `ssim`/`psnr` filters' summary lines;
//! VMAF is computed only when the local build ships `libvmaf`. The
//! numeric computation is entirely the tool's; this module invokes,
//! parses and grades.

use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info, warn};
use vedit_models::{
    assess_quality, QualityMetrics, QualityPipelineReport, QualityStep, QualityStepAnalysis,
    QualityVerdict,
};

use crate::error::{MediaError, MediaResult};

/// Timeout for one comparison run over a pair of files.
const COMPARE_TIMEOUT_SECS: u64 = 120;

/// Timeout for the filter-capability query.
const FILTER_QUERY_TIMEOUT_SECS: u64 = 10;

/// Measure similarity between an original and a processed file.
///
/// Comparing a file against itself yields SSIM 1.0 and a file-size
/// ratio of 1.0 exactly.
pub async fn analyze_quality(
    original: impl AsRef<Path>,
    processed: impl AsRef<Path>,
) -> MediaResult<QualityMetrics> {
    let original = original.as_ref();
    let processed = processed.as_ref();

    for path in [original, processed] {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
    }

    let started = Instant::now();

    let original_size = tokio::fs::metadata(original).await?.len();
    let processed_size = tokio::fs::metadata(processed).await?.len();
    let file_size_ratio = if original_size > 0 {
        processed_size as f64 / original_size as f64
    } else {
        0.0
    };

    let ssim_log = run_comparison(processed, original, "ssim").await?;
    let ssim = parse_ssim(&ssim_log);
    if ssim.is_none() {
        warn!(log_tail = %tail(&ssim_log), "no SSIM summary found in filter output");
    }

    let psnr_log = run_comparison(processed, original, "psnr").await?;
    let psnr = parse_psnr(&psnr_log);
    if psnr.is_none() {
        warn!(log_tail = %tail(&psnr_log), "no PSNR summary found in filter output");
    }

    let vmaf = if ffmpeg_has_filter("libvmaf").await.unwrap_or(false) {
        match run_comparison(processed, original, "libvmaf").await {
            Ok(log) => parse_vmaf(&log),
            Err(e) => {
                debug!(error = %e, "VMAF comparison failed, continuing without it");
                None
            }
        }
    } else {
        None
    };

    let metrics = QualityMetrics {
        ssim,
        psnr,
        vmaf,
        file_size_ratio,
        processing_time_secs: started.elapsed().as_secs_f64(),
    };

    info!(
        original = %original.display(),
        processed = %processed.display(),
        ssim = ?metrics.ssim,
        psnr = ?metrics.psnr,
        vmaf = ?metrics.vmaf,
        file_size_ratio = metrics.file_size_ratio,
        "quality analysis complete"
    );

    Ok(metrics)
}

/// Analyze a whole processing chain step by step and aggregate the
/// verdicts into a report with recommendations.
pub async fn generate_quality_report(steps: &[QualityStep]) -> MediaResult<QualityPipelineReport> {
    let mut step_analysis = Vec::with_capacity(steps.len());

    for step in steps {
        let metrics = analyze_quality(&step.original, &step.processed).await?;
        let assessment = assess_quality(&metrics);
        step_analysis.push(QualityStepAnalysis {
            step: step.clone(),
            metrics,
            assessment,
        });
    }

    Ok(summarize_pipeline(step_analysis))
}

/// Fold per-step analyses into the aggregate report.
fn summarize_pipeline(step_analysis: Vec<QualityStepAnalysis>) -> QualityPipelineReport {
    let lossless_steps = step_analysis
        .iter()
        .filter(|a| a.assessment.overall == QualityVerdict::LosslessQuality)
        .count();
    let lossy_steps = step_analysis
        .iter()
        .filter(|a| a.assessment.overall == QualityVerdict::Lossy)
        .count();

    let mut recommendations = Vec::new();
    if lossy_steps > 0 {
        recommendations.push(format!(
            "{} step(s) showed visible quality loss; align cut points to keyframes so stream copy can be used",
            lossy_steps
        ));
        for analysis in &step_analysis {
            if analysis.assessment.overall == QualityVerdict::Lossy {
                recommendations.push(format!(
                    "step '{}' degraded quality (ssim {:?}, psnr {:?})",
                    analysis.step.operation, analysis.metrics.ssim, analysis.metrics.psnr
                ));
            }
        }
    } else if !step_analysis.is_empty() {
        recommendations
            .push("processing chain preserves quality; no changes needed".to_string());
    }

    QualityPipelineReport {
        processing_steps: step_analysis.len(),
        lossless_steps,
        lossy_steps,
        step_analysis,
        recommendations,
    }
}

/// Run one comparison filter over a (distorted, reference) pair and
/// return the tool's log output.
///
/// The summary lines print at info level, so verbosity must not be
/// lowered here the way it is for transcodes.
async fn run_comparison(distorted: &Path, reference: &Path, filter: &str) -> MediaResult<String> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

    let mut command = Command::new("ffmpeg");
    command
        .args(["-hide_banner", "-nostats"])
        .arg("-i")
        .arg(distorted)
        .arg("-i")
        .arg(reference)
        .args(["-lavfi", filter, "-f", "null", "-"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(filter, distorted = %distorted.display(), reference = %reference.display(), "running comparison");

    let timeout = std::time::Duration::from_secs(COMPARE_TIMEOUT_SECS);
    let output = tokio::time::timeout(timeout, command.output())
        .await
        .map_err(|_| MediaError::Timeout(COMPARE_TIMEOUT_SECS))??;

    if !output.status.success() {
        return Err(MediaError::ffmpeg_failed(
            format!("{} comparison failed", filter),
            Some(String::from_utf8_lossy(&output.stderr).to_string()),
            output.status.code(),
        ));
    }

    // Filter summaries land on stderr
    Ok(String::from_utf8_lossy(&output.stderr).to_string())
}

/// Whether the local FFmpeg build ships a filter.
pub async fn ffmpeg_has_filter(name: &str) -> MediaResult<bool> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

    let timeout = std::time::Duration::from_secs(FILTER_QUERY_TIMEOUT_SECS);
    let output = tokio::time::timeout(
        timeout,
        Command::new("ffmpeg")
            .args(["-hide_banner", "-filters"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| MediaError::Timeout(FILTER_QUERY_TIMEOUT_SECS))??;

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .any(|line| line.split_whitespace().any(|tok| tok == name)))
}

/// Pull the `All:` value out of the ssim filter's summary line:
/// `[Parsed_ssim_0 @ ...] SSIM Y:0.98 ... All:0.987654 (19.1)`
fn parse_ssim(log: &str) -> Option<f64> {
    log.lines()
        .rev()
        .find(|line| line.contains("SSIM") && line.contains("All:"))
        .and_then(|line| extract_metric(line, "All:"))
}

/// Pull the `average:` value out of the psnr filter's summary line:
/// `[Parsed_psnr_0 @ ...] PSNR y:... average:43.21 min:... max:...`
///
/// Identical inputs report `inf`, which grades as excellent.
fn parse_psnr(log: &str) -> Option<f64> {
    log.lines()
        .rev()
        .find(|line| line.contains("PSNR") && line.contains("average:"))
        .and_then(|line| extract_metric(line, "average:"))
}

/// Pull the score out of libvmaf's `VMAF score: 93.5` line.
fn parse_vmaf(log: &str) -> Option<f64> {
    log.lines()
        .rev()
        .find(|line| line.contains("VMAF score"))
        .and_then(|line| line.rsplit(':').next())
        .and_then(|v| v.trim().parse::<f64>().ok())
}

/// Parse the number following `key` within a summary line. `inf` maps
/// to positive infinity.
fn extract_metric(line: &str, key: &str) -> Option<f64> {
    let rest = &line[line.find(key)? + key.len()..];
    let value = rest.split_whitespace().next()?;
    if value == "inf" {
        return Some(f64::INFINITY);
    }
    value.parse::<f64>().ok()
}

/// Last line of a log, for warning context.
fn tail(log: &str) -> &str {
    log.lines().last().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use vedit_models::{QualityAssessment, QualityGrade};

    const SSIM_IDENTICAL: &str =
        "[Parsed_ssim_0 @ 0x5593] SSIM Y:1.000000 (inf) U:1.000000 (inf) V:1.000000 (inf) All:1.000000 (inf)";
    const SSIM_DEGRADED: &str =
        "[Parsed_ssim_0 @ 0x5593] SSIM Y:0.987654 (19.1) U:0.99 (20.0) V:0.99 (20.0) All:0.987654 (19.1)";
    const PSNR_IDENTICAL: &str =
        "[Parsed_psnr_0 @ 0x5593] PSNR y:inf u:inf v:inf average:inf min:inf max:inf";
    const PSNR_DEGRADED: &str =
        "[Parsed_psnr_0 @ 0x5593] PSNR y:42.1 u:44.0 v:44.2 average:43.210000 min:40.0 max:48.0";

    #[test]
    fn test_parse_ssim_identical_is_exactly_one() {
        assert_eq!(parse_ssim(SSIM_IDENTICAL), Some(1.0));
    }

    #[test]
    fn test_parse_ssim_degraded() {
        let v = parse_ssim(SSIM_DEGRADED).unwrap();
        assert!((v - 0.987654).abs() < 1e-9);
    }

    #[test]
    fn test_parse_psnr_infinite_for_identical() {
        assert_eq!(parse_psnr(PSNR_IDENTICAL), Some(f64::INFINITY));
    }

    #[test]
    fn test_parse_psnr_degraded() {
        let v = parse_psnr(PSNR_DEGRADED).unwrap();
        assert!((v - 43.21).abs() < 1e-9);
    }

    #[test]
    fn test_parse_takes_last_summary_line() {
        let log = format!("noise\n{}\nmore noise\n{}", SSIM_DEGRADED, SSIM_IDENTICAL);
        assert_eq!(parse_ssim(&log), Some(1.0));
    }

    #[test]
    fn test_parse_missing_summary_is_none() {
        assert_eq!(parse_ssim("frame=100 fps=30"), None);
        assert_eq!(parse_psnr(""), None);
        assert_eq!(parse_vmaf("no score here"), None);
    }

    #[test]
    fn test_parse_vmaf_score() {
        let log = "[libvmaf @ 0x55] VMAF score: 93.517342";
        let v = parse_vmaf(log).unwrap();
        assert!((v - 93.517342).abs() < 1e-9);
    }

    fn analysis(operation: &str, ssim: f64, psnr: f64) -> QualityStepAnalysis {
        let metrics = QualityMetrics {
            ssim: Some(ssim),
            psnr: Some(psnr),
            vmaf: None,
            file_size_ratio: 1.0,
            processing_time_secs: 0.1,
        };
        let assessment: QualityAssessment = assess_quality(&metrics);
        QualityStepAnalysis {
            step: QualityStep {
                original: "a.mp4".into(),
                processed: "b.mp4".into(),
                operation: operation.to_string(),
            },
            metrics,
            assessment,
        }
    }

    #[test]
    fn test_summarize_counts_verdicts() {
        let report = summarize_pipeline(vec![
            analysis("trim", 1.0, f64::INFINITY),
            analysis("concat", 0.85, 20.0),
        ]);
        assert_eq!(report.processing_steps, 2);
        assert_eq!(report.lossless_steps, 1);
        assert_eq!(report.lossy_steps, 1);
        assert!(report.recommendations.iter().any(|r| r.contains("concat")));
    }

    #[test]
    fn test_summarize_all_lossless() {
        let report = summarize_pipeline(vec![analysis("trim", 1.0, f64::INFINITY)]);
        assert_eq!(report.lossy_steps, 0);
        assert_eq!(report.recommendations.len(), 1);
        assert!(report.recommendations[0].contains("preserves quality"));
    }

    #[test]
    fn test_grading_of_parsed_identical_metrics() {
        let metrics = QualityMetrics {
            ssim: parse_ssim(SSIM_IDENTICAL),
            psnr: parse_psnr(PSNR_IDENTICAL),
            vmaf: None,
            file_size_ratio: 1.0,
            processing_time_secs: 0.1,
        };
        let assessment = assess_quality(&metrics);
        assert_eq!(assessment.ssim_grade, Some(QualityGrade::Excellent));
        assert_eq!(assessment.psnr_grade, Some(QualityGrade::Excellent));
        assert_eq!(assessment.overall, QualityVerdict::LosslessQuality);
    }
}
