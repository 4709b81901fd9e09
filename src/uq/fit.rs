//! Maximum likelihood fitting of (truncated, censored) normal and lognormal
//! marginals and their Gaussian-copula correlation.

use nalgebra::DMatrix;

use super::normal::{normal_cdf, normal_inv_cdf};
use super::random_variable::Family;
use crate::PelicunError;

/// Fitted marginal parameters (`theta0`, `theta1` per variable) and the
/// correlation matrix in standard normal space.
#[derive(Debug, Clone)]
pub struct FitResult {
    pub theta: Vec<[f64; 2]>,
    pub rho: DMatrix<f64>,
}

/// Limits on one variable; `NaN` marks a missing side.
pub type Limits = [f64; 2];

fn has_limits(limits: &Limits) -> bool {
    !(limits[0].is_nan() && limits[1].is_nan())
}

fn to_fit_space(family: Family, value: f64) -> f64 {
    match family {
        Family::Lognormal => {
            if value.is_nan() {
                f64::NAN
            } else if value <= 0.0 {
                f64::NEG_INFINITY
            } else {
                value.ln()
            }
        }
        _ => value,
    }
}

fn limit_prob(limit: f64, mu: f64, sig: f64, missing: f64) -> f64 {
    if limit.is_nan() {
        missing
    } else {
        normal_cdf((limit - mu) / sig)
    }
}

/// Negative log-likelihood of `(mu, ln sig)` for samples in fit space.
fn neg_log_likelihood(
    params: &[f64],
    sample: &[f64],
    truncation: &Limits,
    detection: &Limits,
    censored_count: usize,
) -> f64 {
    let mu = params[0];
    let sig = params[1].exp();
    if !sig.is_finite() || sig <= 0.0 {
        return f64::INFINITY;
    }

    let p_a = limit_prob(truncation[0], mu, sig, 0.0);
    let p_b = limit_prob(truncation[1], mu, sig, 1.0);
    let p_trunc = p_b - p_a;
    if p_trunc <= 1e-300 {
        return 1e10;
    }

    let mut nll = 0.0;
    for x in sample {
        let z = (x - mu) / sig;
        nll += 0.5 * z * z + sig.ln() + 0.5 * (2.0 * std::f64::consts::PI).ln();
    }
    nll += sample.len() as f64 * p_trunc.ln();

    if censored_count > 0 && has_limits(detection) {
        let d_a = limit_prob(detection[0], mu, sig, p_a);
        let d_b = limit_prob(detection[1], mu, sig, p_b);
        let p_cens = ((d_a - p_a) + (p_b - d_b)) / p_trunc;
        if p_cens <= 1e-300 {
            return 1e10;
        }
        nll -= censored_count as f64 * p_cens.ln();
    }

    if nll.is_finite() {
        nll
    } else {
        1e10
    }
}

/// Downhill simplex minimization.
pub fn nelder_mead<F>(f: F, start: &[f64], step: f64, max_iter: usize, tolerance: f64) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let n = start.len();
    let mut simplex: Vec<Vec<f64>> = vec![start.to_vec()];
    for i in 0..n {
        let mut vertex = start.to_vec();
        vertex[i] += if vertex[i] == 0.0 { step } else { step * vertex[i].abs().max(1.0) };
        simplex.push(vertex);
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| f(v)).collect();

    for _ in 0..max_iter {
        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        if (values[n] - values[0]).abs() <= tolerance * (values[0].abs() + tolerance) {
            break;
        }

        let centroid: Vec<f64> = (0..n)
            .map(|j| simplex[..n].iter().map(|v| v[j]).sum::<f64>() / n as f64)
            .collect();
        let towards = |coef: f64| -> Vec<f64> {
            centroid
                .iter()
                .zip(&simplex[n])
                .map(|(c, w)| c + coef * (w - c))
                .collect()
        };

        let reflected = towards(-1.0);
        let f_reflected = f(&reflected);
        if f_reflected < values[0] {
            let expanded = towards(-2.0);
            let f_expanded = f(&expanded);
            if f_expanded < f_reflected {
                simplex[n] = expanded;
                values[n] = f_expanded;
            } else {
                simplex[n] = reflected;
                values[n] = f_reflected;
            }
        } else if f_reflected < values[n - 1] {
            simplex[n] = reflected;
            values[n] = f_reflected;
        } else {
            let contracted = if f_reflected < values[n] {
                towards(-0.5)
            } else {
                towards(0.5)
            };
            let f_contracted = f(&contracted);
            if f_contracted < values[n].min(f_reflected) {
                simplex[n] = contracted;
                values[n] = f_contracted;
            } else {
                let best = simplex[0].clone();
                for i in 1..=n {
                    simplex[i] = best
                        .iter()
                        .zip(&simplex[i])
                        .map(|(b, v)| b + 0.5 * (v - b))
                        .collect();
                    values[i] = f(&simplex[i]);
                }
            }
        }
    }

    let best = (0..=n)
        .min_by(|&a, &b| values[a].total_cmp(&values[b]))
        .unwrap_or(0);
    simplex[best].clone()
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let (mx, sx) = mean_std(x);
    let (my, sy) = mean_std(y);
    if sx == 0.0 || sy == 0.0 || !sx.is_finite() || !sy.is_finite() {
        return 0.0;
    }
    let cov = x.iter().zip(y).map(|(a, b)| (a - mx) * (b - my)).sum::<f64>() / x.len() as f64;
    (cov / (sx * sy)).clamp(-1.0, 1.0)
}

/// Fits a marginal to each row of `raw_samples` and estimates the
/// correlation between them.
///
/// Without truncation or censoring the closed-form estimates are used;
/// otherwise the likelihood of the truncated and censored distribution is
/// maximized numerically. Lognormal marginals are fitted in log space.
pub fn fit_distribution_to_sample(
    raw_samples: &[Vec<f64>],
    families: &[Family],
    censored_count: usize,
    detection_limits: &[Limits],
    truncation_limits: &[Limits],
) -> Result<FitResult, PelicunError> {
    let dims = raw_samples.len();
    for (context, len) in [
        ("fitted families", families.len()),
        ("detection limits", detection_limits.len()),
        ("truncation limits", truncation_limits.len()),
    ] {
        if len != dims {
            return Err(PelicunError::LengthMismatch {
                context,
                expected: dims,
                got: len,
            });
        }
    }

    let mut normal_space: Vec<Vec<f64>> = Vec::with_capacity(dims);
    let mut theta = Vec::with_capacity(dims);

    for (i, values) in raw_samples.iter().enumerate() {
        let family = families[i];
        if !matches!(family, Family::Normal | Family::NormalStd | Family::Lognormal) {
            return Err(PelicunError::Model(format!(
                "cannot fit a {family} distribution to a sample"
            )));
        }
        if values.is_empty() {
            return Err(PelicunError::Model("cannot fit a distribution to an empty sample".into()));
        }
        if family == Family::Lognormal && values.iter().any(|v| *v <= 0.0) {
            return Err(PelicunError::Model(
                "lognormal fit requires strictly positive sample values".into(),
            ));
        }

        let sample: Vec<f64> = values.iter().map(|v| to_fit_space(family, *v)).collect();
        let truncation = truncation_limits[i].map(|l| to_fit_space(family, l));
        let detection = detection_limits[i].map(|l| to_fit_space(family, l));

        let (mut mu, mut sig) = mean_std(&sample);
        let censored = censored_count > 0 && has_limits(&detection);
        if (has_limits(&truncation) || censored) && sig > 0.0 {
            let start = [mu, sig.ln()];
            let best = nelder_mead(
                |p| neg_log_likelihood(p, &sample, &truncation, &detection, censored_count),
                &start,
                0.1,
                2000,
                1e-12,
            );
            mu = best[0];
            sig = best[1].exp();
        }

        let p_a = limit_prob(truncation[0], mu, sig, 0.0);
        let p_b = limit_prob(truncation[1], mu, sig, 1.0);
        normal_space.push(
            sample
                .iter()
                .map(|x| {
                    if sig == 0.0 {
                        0.0
                    } else {
                        let u = (normal_cdf((x - mu) / sig) - p_a) / (p_b - p_a);
                        normal_inv_cdf(u.clamp(1e-12, 1.0 - 1e-12))
                    }
                })
                .collect(),
        );

        theta.push(match family {
            Family::Lognormal => [mu.exp(), sig],
            Family::Normal => [mu, if mu == 0.0 { f64::NAN } else { sig / mu.abs() }],
            _ => [mu, sig],
        });
    }

    let mut rho = DMatrix::<f64>::identity(dims, dims);
    for i in 0..dims {
        for j in (i + 1)..dims {
            let r = pearson(&normal_space[i], &normal_space[j]);
            rho[(i, j)] = r;
            rho[(j, i)] = r;
        }
    }

    Ok(FitResult { theta, rho })
}
