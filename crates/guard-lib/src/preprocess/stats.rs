//! Column statistics used during data cleaning and feature selection

/// Arithmetic mean, 0.0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (Bessel's correction)
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

/// Number of distinct values
pub fn distinct_count(values: &[f64]) -> usize {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted.dedup();
    sorted.len()
}

fn bin_index(value: f64, min: f64, width: f64, bins: usize) -> usize {
    if width <= f64::EPSILON {
        return 0;
    }
    (((value - min) / width) as usize).min(bins - 1)
}

/// Mutual information (nats) between `x` and `y` estimated from an
/// equal-width joint histogram with `bins` bins per axis
pub fn mutual_information(x: &[f64], y: &[f64], bins: usize) -> f64 {
    let n = x.len().min(y.len());
    if n == 0 || bins < 2 {
        return 0.0;
    }

    let range = |v: &[f64]| {
        v.iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| (lo.min(x), hi.max(x)))
    };
    let (x_min, x_max) = range(&x[..n]);
    let (y_min, y_max) = range(&y[..n]);
    let x_width = (x_max - x_min) / bins as f64;
    let y_width = (y_max - y_min) / bins as f64;

    let mut joint = vec![vec![0usize; bins]; bins];
    let mut x_marginal = vec![0usize; bins];
    let mut y_marginal = vec![0usize; bins];
    for i in 0..n {
        let bx = bin_index(x[i], x_min, x_width, bins);
        let by = bin_index(y[i], y_min, y_width, bins);
        joint[bx][by] += 1;
        x_marginal[bx] += 1;
        y_marginal[by] += 1;
    }

    let total = n as f64;
    let mut mi = 0.0;
    for (bx, row) in joint.iter().enumerate() {
        for (by, &count) in row.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let p_xy = count as f64 / total;
            let p_x = x_marginal[bx] as f64 / total;
            let p_y = y_marginal[by] as f64 / total;
            mi += p_xy * (p_xy / (p_x * p_y)).ln();
        }
    }
    mi.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_std() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&values), 5.0);
        assert!((std_dev(&values) - 2.138).abs() < 0.001);
    }

    #[test]
    fn test_empty_values() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(std_dev(&[1.0]), 0.0);
        assert_eq!(mutual_information(&[], &[], 10), 0.0);
    }

    #[test]
    fn test_distinct_count() {
        assert_eq!(distinct_count(&[1.0, 1.0, 2.0, 3.0, 3.0]), 3);
        assert_eq!(distinct_count(&[4.0; 6]), 1);
    }

    #[test]
    fn test_mutual_information_dependent_vs_constant() {
        let x: Vec<f64> = (0..200).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| v * 2.0 + 1.0).collect();
        let constant = vec![3.0; 200];

        let dependent = mutual_information(&x, &y, 10);
        // Perfect dependence over 10 uniform bins gives ln(10)
        assert!((dependent - 10f64.ln()).abs() < 0.01);
        assert_eq!(mutual_information(&constant, &y, 10), 0.0);
    }
}
