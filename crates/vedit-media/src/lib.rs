#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper implementing the lossless extraction engine.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with per-invocation timeouts
//! - Keyframe detection with tiered fallback strategies
//! - Tolerance-based cut-point alignment and optional snapping
//! - A lossless-first extraction chain (stream copy, smart cut,
//!   re-encode, fallback encode)
//! - Stream-copy compatibility prediction and SSIM/PSNR/VMAF quality
//!   analysis
//!
//! The engine holds no long-lived state; every call is pure with
//! respect to its filesystem inputs and outputs and safe to run
//! concurrently against distinct output paths.

pub mod alignment;
pub mod command;
pub mod compat;
pub mod error;
pub mod extract;
pub mod fs_utils;
pub mod keyframes;
pub mod probe;
pub mod progress;
pub mod quality;

pub use alignment::{
    evaluate_alignment, find_nearest_keyframe, ALIGNMENT_TOLERANCE_SECS, SNAP_TOLERANCE_SECS,
};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use compat::check_compatibility;
pub use error::{MediaError, MediaResult};
pub use extract::extract_clip;
pub use keyframes::{locate_keyframes, SYNTHETIC_GOP_INTERVAL_SECS};
pub use probe::{get_duration, probe_media, MediaProbe};
pub use progress::FfmpegProgress;
pub use quality::{analyze_quality, ffmpeg_has_filter, generate_quality_report};
