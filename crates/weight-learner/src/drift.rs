use std::collections::HashMap;

const DIVERGENCE_THRESHOLD: f64 = 0.20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftSeverity {
    None,
    Low,
    Medium,
    High,
}

impl DriftSeverity {
    fn from_count(diverged: usize) -> Self {
        match diverged {
            0 => DriftSeverity::None,
            1..=2 => DriftSeverity::Low,
            3..=5 => DriftSeverity::Medium,
            _ => DriftSeverity::High,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DriftReport {
    pub severity: DriftSeverity,
    pub diverged: Vec<(String, String, f64, f64)>,
}

/// Compares a published table against a held baseline; any weight whose
/// current value has moved by more than [`DIVERGENCE_THRESHOLD`] is reported.
pub fn detect_drift(
    baseline: &HashMap<(String, String), f64>,
    current: &HashMap<(String, String), f64>,
) -> DriftReport {
    let mut diverged = Vec::new();
    for (key, &current_value) in current {
        if let Some(&baseline_value) = baseline.get(key) {
            if (current_value - baseline_value).abs() > DIVERGENCE_THRESHOLD {
                diverged.push((key.0.clone(), key.1.clone(), baseline_value, current_value));
            }
        }
    }
    let severity = DriftSeverity::from_count(diverged.len());
    DriftReport { severity, diverged }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[((&str, &str), f64)]) -> HashMap<(String, String), f64> {
        entries
            .iter()
            .map(|((f, v), w)| ((f.to_string(), v.to_string()), *w))
            .collect()
    }

    #[test]
    fn stable_weights_report_no_drift() {
        let baseline = table(&[(("rsi_zone", "Bullish"), 1.1)]);
        let current = table(&[(("rsi_zone", "Bullish"), 1.12)]);
        let report = detect_drift(&baseline, &current);
        assert_eq!(report.severity, DriftSeverity::None);
        assert!(report.diverged.is_empty());
    }

    #[test]
    fn large_shift_is_flagged_and_severity_scales_with_count() {
        let baseline = table(&[
            (("rsi_zone", "Bullish"), 1.0),
            (("macd_state", "Zero"), 1.0),
            (("ob_zone", "Bid"), 1.0),
        ]);
        let current = table(&[
            (("rsi_zone", "Bullish"), 1.3),
            (("macd_state", "Zero"), 0.7),
            (("ob_zone", "Bid"), 1.25),
        ]);
        let report = detect_drift(&baseline, &current);
        assert_eq!(report.diverged.len(), 3);
        assert_eq!(report.severity, DriftSeverity::Medium);
    }
}
