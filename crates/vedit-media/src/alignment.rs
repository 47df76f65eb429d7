//! Cut-point alignment against a keyframe set.

use tracing::debug;
use vedit_models::AlignmentResult;

/// Strict tolerance for classifying an edge as keyframe-aligned, in
/// seconds. An aligned pair of edges qualifies for stream copy.
pub const ALIGNMENT_TOLERANCE_SECS: f64 = 0.1;

/// Looser bound used when the caller opts into snapping: a near-miss
/// edge within this distance is moved onto the keyframe.
pub const SNAP_TOLERANCE_SECS: f64 = 1.0;

/// Find the keyframe nearest to `timestamp`.
///
/// With `prefer_before`, returns the greatest keyframe at or before the
/// timestamp, falling back to the first keyframe when none precedes it.
/// Mirrored for `prefer_before = false`. Returns `None` only for an
/// empty keyframe list; callers must then treat the cut as unaligned.
pub fn find_nearest_keyframe(timestamp: f64, keyframes: &[f64], prefer_before: bool) -> Option<f64> {
    if keyframes.is_empty() {
        return None;
    }

    if prefer_before {
        keyframes
            .iter()
            .rev()
            .find(|k| **k <= timestamp)
            .or_else(|| keyframes.first())
            .copied()
    } else {
        keyframes
            .iter()
            .find(|k| **k >= timestamp)
            .or_else(|| keyframes.last())
            .copied()
    }
}

/// Classify a requested `[start, end)` interval against a keyframe set,
/// optionally snapping near-miss edges onto keyframes.
///
/// The start edge is measured against its nearest-before keyframe and
/// the end edge against its nearest-after keyframe. Snapping moves an
/// edge in the content-preserving direction (start earlier, end later,
/// via the same preferred-direction lookup) and only within
/// [`SNAP_TOLERANCE_SECS`]; the aligned flags are then recomputed with
/// the strict tolerance. Without `snap` the effective bounds always
/// equal the requested bounds.
pub fn evaluate_alignment(
    start: f64,
    end: f64,
    keyframes: &[f64],
    tolerance: f64,
    snap: bool,
) -> AlignmentResult {
    let mut effective_start = start;
    let mut effective_end = end;

    if snap {
        if let Some(k) = find_nearest_keyframe(start, keyframes, true) {
            if (start - k).abs() <= SNAP_TOLERANCE_SECS {
                effective_start = k;
            }
        }
        if let Some(k) = find_nearest_keyframe(end, keyframes, false) {
            if (end - k).abs() <= SNAP_TOLERANCE_SECS {
                effective_end = k;
            }
        }

        // Snapping must never collapse the interval
        if effective_end <= effective_start {
            effective_start = start;
            effective_end = end;
        }

        if effective_start != start || effective_end != end {
            debug!(
                requested_start = start,
                requested_end = end,
                effective_start,
                effective_end,
                "snapped cut bounds to keyframes"
            );
        }
    }

    let start_aligned = find_nearest_keyframe(effective_start, keyframes, true)
        .map(|k| (effective_start - k).abs() <= tolerance)
        .unwrap_or(false);
    let end_aligned = find_nearest_keyframe(effective_end, keyframes, false)
        .map(|k| (effective_end - k).abs() <= tolerance)
        .unwrap_or(false);

    AlignmentResult {
        effective_start,
        effective_end,
        start_aligned,
        end_aligned,
    }
}
