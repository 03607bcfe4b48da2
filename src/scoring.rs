/// Keywords under this volume are not worth chasing.
pub const JUNK_MIN_VOLUME: f64 = 100.0;
/// Keywords above this difficulty are unlikely to be recovered.
pub const JUNK_MAX_KD: f64 = 65.0;

const VOLUME_WEIGHT: f64 = 0.4;
const TRAFFIC_LOSS_WEIGHT: f64 = 0.5;
const POSITION_WEIGHT: f64 = 0.1;
const KD_PENALTY: f64 = 0.05;

/// Recovery-priority score for a lost keyword, rounded to two decimals.
/// Exports that carry keyword difficulty get the penalized variant; exports
/// without it get the base formula.
pub fn value_score(volume: f64, traffic_change: f64, position_before: f64, kd: Option<f64>) -> f64 {
    let raw = match kd {
        Some(kd) => kd_adjusted_score(volume, traffic_change, position_before, kd),
        None => base_score(volume, traffic_change, position_before),
    };
    round2(raw)
}

fn base_score(volume: f64, traffic_change: f64, position_before: f64) -> f64 {
    volume * VOLUME_WEIGHT + traffic_change.abs() * TRAFFIC_LOSS_WEIGHT + position_before * POSITION_WEIGHT
}

fn kd_adjusted_score(volume: f64, traffic_change: f64, position_before: f64, kd: f64) -> f64 {
    base_score(volume, traffic_change, position_before) - kd * KD_PENALTY
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Why a keyword is not worth acting on, or None when it is.
/// Low demand is checked before difficulty, so it wins when both apply.
pub fn classify_junk(volume: f64, kd: Option<f64>) -> Option<&'static str> {
    if volume < JUNK_MIN_VOLUME {
        return Some("Volume < 100 - insufficient search demand");
    }
    if let Some(kd) = kd {
        if kd > JUNK_MAX_KD {
            return Some("KD > 65 - very high competition, unlikely to recover");
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kd_adjusted_worked_example() {
        // 1000*0.4 + 200*0.5 + 15*0.1 - 70*0.05 = 400 + 100 + 1.5 - 3.5
        let score = value_score(1000.0, -200.0, 15.0, Some(70.0));
        assert_eq!(score, 498.0);
    }

    #[test]
    fn base_formula_without_kd() {
        let score = value_score(1000.0, -200.0, 15.0, None);
        assert_eq!(score, 501.5);
    }

    #[test]
    fn traffic_change_sign_is_ignored() {
        assert_eq!(
            value_score(500.0, -120.0, 8.0, None),
            value_score(500.0, 120.0, 8.0, None)
        );
    }

    #[test]
    fn rounds_to_two_decimals() {
        // 0.5 * 0.25 = 0.125, which rounds half up to 0.13
        assert_eq!(value_score(0.0, 0.25, 0.0, None), 0.13);
        assert_eq!(value_score(10.0, -3.3, 2.5, None), 5.9);
    }

    #[test]
    fn junk_low_volume() {
        assert_eq!(
            classify_junk(99.0, None),
            Some("Volume < 100 - insufficient search demand")
        );
        assert_eq!(classify_junk(100.0, None), None);
    }

    #[test]
    fn junk_high_kd() {
        assert_eq!(
            classify_junk(500.0, Some(66.0)),
            Some("KD > 65 - very high competition, unlikely to recover")
        );
        assert_eq!(classify_junk(500.0, Some(65.0)), None);
        assert_eq!(classify_junk(500.0, None), None);
    }

    #[test]
    fn low_volume_outranks_high_kd() {
        let reason = classify_junk(50.0, Some(90.0)).unwrap();
        assert!(reason.starts_with("Volume"));
    }
}
