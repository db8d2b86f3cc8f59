//! Value adjustment arithmetic.
//!
//! Every brightness/contrast/volume path in the engine funnels through
//! [`compute_from_percent`]: map a percentage into the display's value range,
//! apply an optional signed offset, clamp.  Keyboard-key increments go
//! through [`filled_chiclet_value`] instead of plain addition so repeated
//! presses land on human-perceptible marks even on non-uniform hardware
//! scales.

/// Threshold table for filled-chiclet stepping, ascending.
pub const FILLED_CHICLET_THRESHOLDS: [i64; 17] = [
    0, 6, 12, 19, 25, 31, 37, 44, 50, 56, 62, 69, 75, 81, 87, 94, 100,
];

/// The canonical keyboard-key step; only this offset snaps to the table.
const CHICLET_STEP: i64 = 6;

/// Clamps `value` into `[min, max]`.
pub fn cap(value: i64, min: i64, max: i64) -> i64 {
    value.max(min).min(max)
}

/// Maps a percent position into `[min, max]`, applies `offset`, clamps.
///
/// `value = round(min + percent/100 * (max - min)) + offset`, clamped to
/// `[min, max]` after the offset is applied.
pub fn compute_from_percent(percent: f64, min: i64, max: i64, offset: i64) -> i64 {
    let raw = (min as f64 + percent / 100.0 * (max - min) as f64).round() as i64 + offset;
    cap(raw, min, max)
}

/// Percent position of `value` within `[min, max]`, clamped to 0–100.
pub fn percent_of(value: i64, min: i64, max: i64) -> f64 {
    if max <= min {
        return 0.0;
    }
    (((value - min) as f64 / (max - min) as f64) * 100.0).clamp(0.0, 100.0)
}

/// Applies a stepping offset to `value`.
///
/// Offsets other than exactly ±6 are plain addition.  For ±6, the result
/// snaps to the threshold nearest `value + offset`; if that threshold equals
/// the current value (the step would not move), the adjacent threshold in
/// the direction of travel is used instead so repeated presses always make
/// progress.  Callers clamp the result to the display's range.
pub fn filled_chiclet_value(value: i64, offset: i64) -> i64 {
    let target = value + offset;
    if offset.abs() != CHICLET_STEP {
        return target;
    }

    let mut index = 0usize;
    let mut best_distance = i64::MAX;
    for (i, threshold) in FILLED_CHICLET_THRESHOLDS.iter().enumerate() {
        let distance = (threshold - target).abs();
        if distance < best_distance {
            best_distance = distance;
            index = i;
        }
    }

    let last = FILLED_CHICLET_THRESHOLDS.len() as i64 - 1;
    let step = if offset < 0 { -1 } else { 1 };
    let neighbor = cap(index as i64 + step, 0, last) as usize;

    let snapped = FILLED_CHICLET_THRESHOLDS[index];
    if snapped == value {
        FILLED_CHICLET_THRESHOLDS[neighbor]
    } else {
        snapped
    }
}

/// Levenshtein edit distance between two strings.
///
/// Used to match the default audio output device name to the closest display
/// name when resolving volume/mute targets.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_from_percent_hits_range_endpoints() {
        for (min, max) in [(0, 100), (10, 90), (23, 77), (0, 255)] {
            assert_eq!(compute_from_percent(0.0, min, max, 0), min);
            assert_eq!(compute_from_percent(100.0, min, max, 0), max);
        }
    }

    #[test]
    fn test_compute_from_percent_midpoint_maps_to_midpoint() {
        assert_eq!(compute_from_percent(50.0, 10, 90, 0), 50);
        assert_eq!(compute_from_percent(50.0, 0, 100, 0), 50);
    }

    #[test]
    fn test_compute_from_percent_clamps_after_offset() {
        assert_eq!(compute_from_percent(100.0, 0, 100, 20), 100);
        assert_eq!(compute_from_percent(0.0, 10, 90, -50), 10);
        assert_eq!(compute_from_percent(50.0, 0, 100, 7), 57);
    }

    #[test]
    fn test_chiclet_non_canonical_offset_is_plain_addition() {
        assert_eq!(filled_chiclet_value(50, 1), 51);
        assert_eq!(filled_chiclet_value(50, -10), 40);
        assert_eq!(filled_chiclet_value(13, 5), 18);
    }

    #[test]
    fn test_chiclet_step_snaps_to_nearest_threshold() {
        // 6 + 6 = 12, which is itself a threshold and differs from current.
        assert_eq!(filled_chiclet_value(6, 6), 12);
        // 15 + 6 = 21 → nearest threshold 19.
        assert_eq!(filled_chiclet_value(15, 6), 19);
        // 15 - 6 = 9 → nearest thresholds 6 and 12 equidistant; first wins.
        assert_eq!(filled_chiclet_value(15, -6), 6);
    }

    #[test]
    fn test_chiclet_step_always_moves_off_a_threshold() {
        // For every interior threshold, a step in either direction moves.
        for (i, &threshold) in FILLED_CHICLET_THRESHOLDS.iter().enumerate() {
            let up = filled_chiclet_value(threshold, 6);
            let down = filled_chiclet_value(threshold, -6);
            if i + 1 < FILLED_CHICLET_THRESHOLDS.len() {
                assert!(up > threshold, "+6 from {threshold} stuck at {up}");
            }
            if i > 0 {
                assert!(down < threshold, "-6 from {threshold} stuck at {down}");
            }
        }
    }

    #[test]
    fn test_chiclet_step_pinned_at_domain_boundaries() {
        assert_eq!(filled_chiclet_value(100, 6), 100);
        assert_eq!(filled_chiclet_value(0, -6), 0);
    }

    #[test]
    fn test_percent_of_degenerate_range_is_zero() {
        assert_eq!(percent_of(50, 100, 100), 0.0);
        assert_eq!(percent_of(50, 100, 0), 0.0);
    }

    #[test]
    fn test_levenshtein_basics() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("DELL U2720Q", "DELL U2720Q Audio"), 6);
    }
}
