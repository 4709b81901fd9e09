use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

use super::normal::{normal_cdf, normal_inv_cdf};
use crate::config::SamplingMethod;
use crate::PelicunError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    /// Mean and coefficient of variation.
    Normal,
    /// Mean and standard deviation.
    NormalStd,
    /// Median and logarithmic standard deviation.
    Lognormal,
    Uniform,
    Deterministic,
    Empirical,
    CoupledEmpirical,
    Multinomial,
}

impl Family {
    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Normal => "normal",
            Family::NormalStd => "normal_std",
            Family::Lognormal => "lognormal",
            Family::Uniform => "uniform",
            Family::Deterministic => "deterministic",
            Family::Empirical => "empirical",
            Family::CoupledEmpirical => "coupled_empirical",
            Family::Multinomial => "multinomial",
        }
    }

    pub fn is_parametric(&self) -> bool {
        matches!(
            self,
            Family::Normal | Family::NormalStd | Family::Lognormal | Family::Uniform
        )
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Family {
    type Err = PelicunError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "normal" | "normal_cov" => Ok(Family::Normal),
            "normal_std" => Ok(Family::NormalStd),
            "lognormal" => Ok(Family::Lognormal),
            "uniform" => Ok(Family::Uniform),
            "deterministic" => Ok(Family::Deterministic),
            "empirical" => Ok(Family::Empirical),
            "coupled_empirical" => Ok(Family::CoupledEmpirical),
            "multinomial" => Ok(Family::Multinomial),
            other => Err(PelicunError::parse("distribution family", other)),
        }
    }
}

/// A scalar random variable with an optional truncated support.
#[derive(Debug, Clone)]
pub struct RandomVariable {
    pub name: String,
    pub family: Family,
    pub theta: Vec<f64>,
    /// Lower and upper truncation limits; `NaN` means unbounded.
    pub truncation: [f64; 2],
    pub raw_samples: Vec<f64>,
    /// Added to multinomial outcomes.
    pub offset: f64,
    /// Variable whose uniform sample this one reuses.
    pub anchor: Option<String>,
}

impl RandomVariable {
    pub fn new(name: impl Into<String>, family: Family, theta: Vec<f64>) -> Result<Self, PelicunError> {
        let name = name.into();
        let required = match family {
            Family::Normal | Family::NormalStd | Family::Lognormal | Family::Uniform => 2,
            Family::Deterministic | Family::Multinomial => 1,
            Family::Empirical | Family::CoupledEmpirical => 0,
        };
        if theta.len() < required || theta[..required].iter().any(|t| t.is_nan()) {
            return Err(PelicunError::Model(format!(
                "random variable {name} ({family}) requires {required} parameters, got {theta:?}"
            )));
        }
        match family {
            Family::Normal | Family::NormalStd | Family::Lognormal if theta[1] < 0.0 => {
                return Err(PelicunError::Model(format!(
                    "random variable {name} has a negative dispersion: {}",
                    theta[1]
                )));
            }
            Family::Lognormal if theta[0] <= 0.0 => {
                return Err(PelicunError::Model(format!(
                    "random variable {name} is lognormal with a non-positive median: {}",
                    theta[0]
                )));
            }
            Family::Multinomial if theta.iter().sum::<f64>() > 1.0 + 1e-9 => {
                return Err(PelicunError::Model(format!(
                    "multinomial weights of {name} add up to more than one"
                )));
            }
            _ => {}
        }

        Ok(Self {
            name,
            family,
            theta,
            truncation: [f64::NAN; 2],
            raw_samples: Vec::new(),
            offset: 0.0,
            anchor: None,
        })
    }

    pub fn empirical(name: impl Into<String>, raw_samples: Vec<f64>, coupled: bool) -> Result<Self, PelicunError> {
        let family = if coupled {
            Family::CoupledEmpirical
        } else {
            Family::Empirical
        };
        let mut rv = Self::new(name, family, Vec::new())?;
        if raw_samples.is_empty() {
            return Err(PelicunError::Model(format!(
                "empirical random variable {} has no raw samples",
                rv.name
            )));
        }
        rv.raw_samples = raw_samples;
        Ok(rv)
    }

    pub fn with_truncation(mut self, lower: f64, upper: f64) -> Self {
        self.truncation = [lower, upper];
        self
    }

    pub fn with_anchor(mut self, anchor: impl Into<String>) -> Self {
        self.anchor = Some(anchor.into());
        self
    }

    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    /// Location and scale of the underlying normal distribution.
    fn normal_params(&self) -> (f64, f64) {
        match self.family {
            Family::Normal => (self.theta[0], (self.theta[0] * self.theta[1]).abs()),
            Family::Lognormal => (self.theta[0].ln(), self.theta[1]),
            _ => (self.theta[0], self.theta[1]),
        }
    }

    fn to_normal_space(&self, x: f64) -> f64 {
        match self.family {
            Family::Lognormal => {
                if x <= 0.0 {
                    f64::NEG_INFINITY
                } else {
                    x.ln()
                }
            }
            _ => x,
        }
    }

    fn uniform_bounds(&self) -> (f64, f64) {
        let [lower, upper] = self.truncation;
        let a = if lower.is_nan() { self.theta[0] } else { self.theta[0].max(lower) };
        let b = if upper.is_nan() { self.theta[1] } else { self.theta[1].min(upper) };
        (a, b)
    }

    /// Untruncated CDF of a parametric family.
    fn base_cdf(&self, x: f64) -> f64 {
        match self.family {
            Family::Uniform => {
                let (a, b) = (self.theta[0], self.theta[1]);
                ((x - a) / (b - a)).clamp(0.0, 1.0)
            }
            Family::Deterministic => {
                if x < self.theta[0] {
                    0.0
                } else {
                    1.0
                }
            }
            _ => {
                let (mu, sig) = self.normal_params();
                let z = self.to_normal_space(x);
                if sig == 0.0 {
                    if z < mu {
                        0.0
                    } else {
                        1.0
                    }
                } else {
                    normal_cdf((z - mu) / sig)
                }
            }
        }
    }

    fn truncation_probs(&self) -> (f64, f64) {
        let [lower, upper] = self.truncation;
        let p_a = if lower.is_nan() { 0.0 } else { self.base_cdf(lower) };
        let p_b = if upper.is_nan() { 1.0 } else { self.base_cdf(upper) };
        (p_a, p_b)
    }

    /// CDF including truncation.
    pub fn cdf(&self, x: f64) -> f64 {
        if self.family == Family::Uniform {
            let (a, b) = self.uniform_bounds();
            return ((x - a) / (b - a)).clamp(0.0, 1.0);
        }
        let (p_a, p_b) = self.truncation_probs();
        if p_b <= p_a {
            return f64::NAN;
        }
        ((self.base_cdf(x) - p_a) / (p_b - p_a)).clamp(0.0, 1.0)
    }

    /// Maps uniform variates to realizations of the variable.
    pub fn inverse_transform(&self, uniform: &[f64]) -> Result<Vec<f64>, PelicunError> {
        match self.family {
            Family::Normal | Family::NormalStd | Family::Lognormal => {
                let (mu, sig) = self.normal_params();
                let (p_a, p_b) = self.truncation_probs();
                if p_b <= p_a {
                    return Err(PelicunError::Model(format!(
                        "truncation limits of {} leave no probability mass",
                        self.name
                    )));
                }
                Ok(uniform
                    .iter()
                    .map(|u| {
                        let z = if sig == 0.0 {
                            mu
                        } else {
                            mu + sig * normal_inv_cdf(p_a + u * (p_b - p_a))
                        };
                        if self.family == Family::Lognormal {
                            z.exp()
                        } else {
                            z
                        }
                    })
                    .collect())
            }
            Family::Uniform => {
                let (a, b) = self.uniform_bounds();
                Ok(uniform.iter().map(|u| a + u * (b - a)).collect())
            }
            Family::Deterministic => Ok(vec![self.theta[0]; uniform.len()]),
            Family::Empirical => {
                let n = self.raw_samples.len();
                Ok(uniform
                    .iter()
                    .map(|u| {
                        let idx = ((u * n as f64).floor() as usize).min(n - 1);
                        self.raw_samples[idx]
                    })
                    .collect())
            }
            Family::CoupledEmpirical => {
                let n = self.raw_samples.len();
                Ok((0..uniform.len()).map(|i| self.raw_samples[i % n]).collect())
            }
            Family::Multinomial => {
                let mut cumulative = Vec::with_capacity(self.theta.len());
                let mut total = 0.0;
                for weight in &self.theta[..self.theta.len() - 1] {
                    total += weight;
                    cumulative.push(total);
                }
                Ok(uniform
                    .iter()
                    .map(|u| {
                        let outcome = cumulative
                            .iter()
                            .position(|p| *u < *p)
                            .unwrap_or(cumulative.len());
                        outcome as f64 + self.offset
                    })
                    .collect())
            }
        }
    }
}

/// Random variables that are correlated through a Gaussian copula.
#[derive(Debug, Clone)]
pub struct RandomVariableSet {
    pub name: String,
    pub members: Vec<String>,
    pub rho: DMatrix<f64>,
}

impl RandomVariableSet {
    pub fn new(name: impl Into<String>, members: Vec<String>, rho: DMatrix<f64>) -> Result<Self, PelicunError> {
        if rho.nrows() != members.len() || rho.ncols() != members.len() {
            return Err(PelicunError::LengthMismatch {
                context: "correlation matrix",
                expected: members.len(),
                got: rho.nrows(),
            });
        }
        Ok(Self {
            name: name.into(),
            members,
            rho,
        })
    }

    /// Lower factor `L` with `L * L^T = rho`. Falls back to a symmetric
    /// eigendecomposition with clipped eigenvalues for singular matrices.
    fn factor(&self) -> DMatrix<f64> {
        if let Some(chol) = self.rho.clone().cholesky() {
            return chol.l();
        }
        let eigen = self.rho.clone().symmetric_eigen();
        let sqrt_values = DVector::from_iterator(
            eigen.eigenvalues.len(),
            eigen.eigenvalues.iter().map(|v| v.max(0.0).sqrt()),
        );
        &eigen.eigenvectors * DMatrix::from_diagonal(&sqrt_values)
    }

    /// Correlates the uniform samples of the members in place.
    pub fn apply_correlation(&self, uniform: &mut [Vec<f64>]) {
        if uniform.is_empty() {
            return;
        }
        let l = self.factor();
        let size = uniform[0].len();
        let dim = uniform.len();
        let mut z = DVector::<f64>::zeros(dim);
        for row in 0..size {
            for (i, values) in uniform.iter().enumerate() {
                z[i] = normal_inv_cdf(values[row]);
            }
            let correlated = &l * &z;
            for (i, values) in uniform.iter_mut().enumerate() {
                values[row] = normal_cdf(correlated[i]);
            }
        }
    }
}

/// Collection of random variables sampled together.
#[derive(Debug, Default)]
pub struct RandomVariableRegistry {
    rvs: Vec<RandomVariable>,
    sets: Vec<RandomVariableSet>,
    sample: BTreeMap<String, Vec<f64>>,
}

impl RandomVariableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rv(&mut self, rv: RandomVariable) {
        if let Some(existing) = self.rvs.iter_mut().find(|existing| existing.name == rv.name) {
            *existing = rv;
        } else {
            self.rvs.push(rv);
        }
    }

    pub fn add_rv_set(&mut self, set: RandomVariableSet) {
        self.sets.push(set);
    }

    pub fn rv(&self, name: &str) -> Option<&RandomVariable> {
        self.rvs.iter().find(|rv| rv.name == name)
    }

    pub fn len(&self) -> usize {
        self.rvs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rvs.is_empty()
    }

    pub fn sample(&self) -> &BTreeMap<String, Vec<f64>> {
        &self.sample
    }

    pub fn take_sample(&mut self) -> BTreeMap<String, Vec<f64>> {
        std::mem::take(&mut self.sample)
    }

    /// Generates `size` realizations of every variable.
    pub fn generate_sample(
        &mut self,
        size: usize,
        method: SamplingMethod,
        rng: &mut StdRng,
    ) -> Result<(), PelicunError> {
        let mut uniform: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for rv in self.rvs.iter().filter(|rv| rv.anchor.is_none()) {
            uniform.insert(rv.name.clone(), uniform_sample(size, method, rng));
        }

        for set in &self.sets {
            let mut block = Vec::with_capacity(set.members.len());
            for member in &set.members {
                block.push(uniform.remove(member).ok_or_else(|| {
                    PelicunError::Model(format!(
                        "{} in set {} is not an independent variable of the registry",
                        member, set.name
                    ))
                })?);
            }
            set.apply_correlation(&mut block);
            for (member, values) in set.members.iter().zip(block) {
                uniform.insert(member.clone(), values);
            }
        }

        self.sample.clear();
        for rv in &self.rvs {
            let key = rv.anchor.as_deref().unwrap_or(&rv.name);
            let u = uniform.get(key).ok_or_else(|| {
                PelicunError::Model(format!("anchor {key} of {} is not registered", rv.name))
            })?;
            self.sample.insert(rv.name.clone(), rv.inverse_transform(u)?);
        }
        Ok(())
    }
}

/// Uniform variates on [0, 1) using the given sampling method.
pub fn uniform_sample(size: usize, method: SamplingMethod, rng: &mut StdRng) -> Vec<f64> {
    match method {
        SamplingMethod::MonteCarlo => (0..size).map(|_| rng.gen::<f64>()).collect(),
        SamplingMethod::Lhs | SamplingMethod::LhsMidpoint => {
            let mut strata: Vec<usize> = (0..size).collect();
            strata.shuffle(rng);
            strata
                .into_iter()
                .map(|bin| {
                    let within = if method == SamplingMethod::Lhs {
                        rng.gen::<f64>()
                    } else {
                        0.5
                    };
                    (bin as f64 + within) / size as f64
                })
                .collect()
        }
    }
}

/// Rescales distribution parameters and truncation limits by `factor`,
/// for example to move a marginal into internal units.
pub fn scale_distribution(
    factor: f64,
    family: Family,
    theta: &[f64],
    truncation: [f64; 2],
) -> Result<(Vec<f64>, [f64; 2]), PelicunError> {
    let mut theta = theta.to_vec();
    let truncation = [truncation[0] * factor, truncation[1] * factor];
    match family {
        Family::Normal | Family::Lognormal | Family::Deterministic => {
            if let Some(t0) = theta.first_mut() {
                *t0 *= factor;
            }
        }
        Family::NormalStd | Family::Uniform => {
            for t in theta.iter_mut().take(2) {
                *t *= factor;
            }
        }
        Family::Empirical | Family::CoupledEmpirical | Family::Multinomial => {
            return Err(PelicunError::Model(format!(
                "parameters of the {family} family cannot be scaled"
            )));
        }
    }
    Ok((theta, truncation))
}
