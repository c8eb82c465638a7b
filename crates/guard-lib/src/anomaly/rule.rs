//! Fixed-threshold CPU deviation rule
//!
//! Static guardrail that does not learn from the data it is applied to, so it
//! keeps flagging extreme CPU readings even when the learned model drifts.

use serde::{Deserialize, Serialize};

/// Flags CPU readings that deviate from `midpoint` by more than
/// `midpoint * tolerance` (strictly greater)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CpuDeviationRule {
    pub midpoint: f64,
    /// Relative tolerance, 0.2 means 20% of the midpoint
    pub tolerance: f64,
}

impl CpuDeviationRule {
    pub fn new(midpoint: f64, tolerance: f64) -> Self {
        Self {
            midpoint,
            tolerance,
        }
    }

    /// Absolute deviation allowed before a reading is flagged
    pub fn limit(&self) -> f64 {
        self.midpoint * self.tolerance
    }

    pub fn is_anomalous(&self, cpu: f64) -> bool {
        (cpu - self.midpoint).abs() > self.limit()
    }

    pub fn evaluate<I>(&self, cpu: I) -> Vec<bool>
    where
        I: IntoIterator<Item = f64>,
    {
        cpu.into_iter().map(|v| self.is_anomalous(v)).collect()
    }
}

impl Default for CpuDeviationRule {
    fn default() -> Self {
        Self {
            midpoint: 50.0,
            tolerance: 0.2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limit() {
        assert_eq!(CpuDeviationRule::default().limit(), 10.0);
    }

    #[test]
    fn test_scenario_low_mid_high() {
        let rule = CpuDeviationRule::default();
        assert_eq!(rule.evaluate([10.0, 50.0, 95.0]), vec![true, false, true]);
    }

    #[test]
    fn test_boundary_is_not_flagged() {
        let rule = CpuDeviationRule::default();
        assert!(!rule.is_anomalous(60.0));
        assert!(!rule.is_anomalous(40.0));
        assert!(rule.is_anomalous(60.01));
        assert!(rule.is_anomalous(39.99));
    }

    #[test]
    fn test_custom_midpoint() {
        let rule = CpuDeviationRule::new(70.0, 0.1);
        assert!(!rule.is_anomalous(76.0));
        assert!(rule.is_anomalous(78.0));
    }
}
