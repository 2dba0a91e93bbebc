//! Mappings from raw deviations onto the 0–10 sub-score scale.
//!
//! Both curves are piecewise linear between fixed breakpoints. The
//! breakpoints are the documented contract; interpolation inside each
//! band is linear.

/// Maps a percentage increase onto `[0, 10]`.
///
/// Bands: ≤5% → 0, 5–15% → up to 3, 15–30% → up to 6, 30–50% → up to 8,
/// ≥50% → 10. Decreases (negative input) land in the first band and
/// score 0 — a drop in consumption is never anomalous here.
pub(crate) fn deviation_score(increase_percent: f64) -> f64 {
    if increase_percent >= 50.0 {
        10.0
    } else if increase_percent > 30.0 {
        6.0 + (increase_percent - 30.0) / 20.0 * 2.0
    } else if increase_percent > 15.0 {
        3.0 + (increase_percent - 15.0) / 15.0 * 3.0
    } else if increase_percent > 5.0 {
        (increase_percent - 5.0) / 10.0 * 3.0
    } else {
        0.0
    }
}

/// Maps a peer z-score onto `[0, 10]`.
///
/// Bands: z ≤ 1 → 0, 1–2 → up to 5, 2–3 → up to 8, above 3 → 10. Only
/// above-peer consumption contributes; negative z clamps to 0.
pub(crate) fn z_score_points(z: f64) -> f64 {
    if z > 3.0 {
        10.0
    } else if z > 2.0 {
        5.0 + (z - 2.0) * 3.0
    } else if z > 1.0 {
        (z - 1.0) * 5.0
    } else {
        0.0
    }
}

/// Rounds to one decimal (combined scores).
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Rounds to two decimals (sub-scores, euro amounts).
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deviation_bands_meet_at_their_breakpoints() {
        assert!((deviation_score(5.0) - 0.0).abs() < 1e-9);
        assert!((deviation_score(15.0) - 3.0).abs() < 1e-9);
        assert!((deviation_score(30.0) - 6.0).abs() < 1e-9);
        assert!((deviation_score(49.999) - 8.0).abs() < 1e-3);
        assert!((deviation_score(50.0) - 10.0).abs() < 1e-9);
        assert!((deviation_score(80.0) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn deviation_interpolates_linearly_inside_bands() {
        // Midpoint of the 5–15 band.
        assert!((deviation_score(10.0) - 1.5).abs() < 1e-9);
        // 40.625% sits in the 30–50 band: 6 + 10.625/20 * 2.
        assert!((deviation_score(40.625) - 7.0625).abs() < 1e-9);
    }

    #[test]
    fn decreases_never_score() {
        assert!((deviation_score(-35.0) - 0.0).abs() < f64::EPSILON);
        assert!((deviation_score(0.0) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn z_bands_meet_at_their_breakpoints() {
        assert!((z_score_points(1.0) - 0.0).abs() < 1e-9);
        assert!((z_score_points(2.0) - 5.0).abs() < 1e-9);
        assert!((z_score_points(3.0) - 8.0).abs() < 1e-9);
        assert!((z_score_points(3.001) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn below_peer_consumption_never_scores() {
        assert!((z_score_points(-2.5) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rounding_helpers() {
        assert!((round1(7.64) - 7.6).abs() < 1e-9);
        assert!((round1(7.66) - 7.7).abs() < 1e-9);
        assert!((round2(123.456) - 123.46).abs() < 1e-9);
    }
}
