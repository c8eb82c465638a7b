//! Worst-instance selection

use serde::{Deserialize, Serialize};

use crate::error::{GuardError, Result};

/// Instance picked for remediation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub instance_id: String,
    pub cpu_utilization: f64,
}

/// Pick the candidate with the highest CPU value
///
/// Strict `>` comparison, so the first of several equal maxima wins.
pub fn select_worst_instance(candidates: &[(String, f64)]) -> Result<Selection> {
    let mut iter = candidates.iter();
    let (first_id, first_cpu) = iter.next().ok_or(GuardError::NoCandidates)?;

    let mut worst = (first_id, *first_cpu);
    for (id, cpu) in iter {
        if *cpu > worst.1 {
            worst = (id, *cpu);
        }
    }

    Ok(Selection {
        instance_id: worst.0.clone(),
        cpu_utilization: worst.1,
    })
}

/// Collapse a query result into one value per instance
///
/// Non-finite readings are treated as missing. No usable datapoints yields
/// exactly `0.0`; several are averaged.
pub fn summarize_datapoints(values: &[f64]) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0_f64, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        return 0.0;
    }
    sum / count as f64
}
