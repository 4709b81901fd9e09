//! Descriptive statistics of sample tables.

use crate::table::{label, Table};

pub const PERCENTILES: [f64; 9] = [0.001, 0.023, 0.10, 0.159, 0.5, 0.841, 0.90, 0.977, 0.999];

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Standard deviation with `ddof` delta degrees of freedom.
pub fn std_dev(values: &[f64], ddof: usize) -> f64 {
    if values.len() <= ddof {
        return f64::NAN;
    }
    let mu = mean(values);
    let ss: f64 = values.iter().map(|v| (v - mu).powi(2)).sum();
    (ss / (values.len() - ddof) as f64).sqrt()
}

/// Linear-interpolation quantile of sorted values.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let low = pos.floor() as usize;
            let high = pos.ceil() as usize;
            let frac = pos - low as f64;
            sorted[low] + (sorted[high] - sorted[low]) * frac
        }
    }
}

fn percentile_name(p: f64) -> String {
    format!("{}%", (p * 1000.0).round() / 10.0)
}

pub fn stat_names() -> Vec<String> {
    let mut names: Vec<String> = ["count", "mean", "std", "log_std", "min"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    names.extend(PERCENTILES.iter().map(|p| percentile_name(*p)));
    names.push("max".to_string());
    names
}

/// Statistics of one column, ordered as [`stat_names`].
///
/// Missing values are ignored. `log_std` is only reported when every value
/// is positive.
pub fn describe_values(values: &[f64]) -> Vec<f64> {
    let mut present: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    present.sort_by(f64::total_cmp);

    let log_std = if !present.is_empty() && present.len() == values.len() && present[0] > 0.0 {
        let logs: Vec<f64> = present.iter().map(|v| v.ln()).collect();
        std_dev(&logs, 1)
    } else {
        f64::NAN
    };

    let mut stats = vec![
        present.len() as f64,
        mean(&present),
        std_dev(&present, 1),
        log_std,
        present.first().copied().unwrap_or(f64::NAN),
    ];
    stats.extend(PERCENTILES.iter().map(|p| quantile_sorted(&present, *p)));
    stats.push(present.last().copied().unwrap_or(f64::NAN));
    stats
}

/// Describes every column of `sample`; statistics become the rows.
pub fn describe(sample: &Table) -> Table {
    let mut out = Table::with_index(sample.levels().to_vec(), stat_names());
    for pos in 0..sample.ncols() {
        // labels are unique in the source, so this cannot fail
        let _ = out.push_column(
            sample.label_at(pos).to_vec(),
            describe_values(sample.column_at(pos)),
            sample.unit_at(pos).map(str::to_string),
        );
    }
    out
}

/// Describes a single unlabelled series.
pub fn describe_series(name: &str, values: &[f64]) -> Table {
    let mut out = Table::with_index(vec![String::new()], stat_names());
    let _ = out.push_column(label(&[name]), describe_values(values), None);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_match_percentiles() {
        let names = stat_names();
        assert_eq!(names.len(), 15);
        assert_eq!(names[5], "0.1%");
        assert_eq!(names[6], "2.3%");
        assert_eq!(names[9], "50%");
        assert_eq!(names[10], "84.1%");
        assert_eq!(names[14], "max");
    }

    #[test]
    fn describe_ignores_missing_values() {
        let stats = describe_values(&[1.0, 2.0, f64::NAN, 3.0]);
        assert_eq!(stats[0], 3.0);
        assert!((stats[1] - 2.0).abs() < 1e-12);
        assert!((stats[2] - 1.0).abs() < 1e-12);
        assert!(stats[3].is_nan());
        assert_eq!(stats[4], 1.0);
        assert!((stats[9] - 2.0).abs() < 1e-12);
        assert_eq!(stats[14], 3.0);
    }

    #[test]
    fn log_std_for_positive_columns() {
        let e = std::f64::consts::E;
        let stats = describe_values(&[1.0, e, e * e]);
        assert!((stats[3] - 1.0).abs() < 1e-12);
        let stats = describe_values(&[0.0, 1.0]);
        assert!(stats[3].is_nan());
    }

    #[test]
    fn quantiles_interpolate() {
        let sorted = [0.0, 10.0];
        assert!((quantile_sorted(&sorted, 0.25) - 2.5).abs() < 1e-12);
        assert!(quantile_sorted(&[], 0.5).is_nan());
    }
}
