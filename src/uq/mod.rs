//! Uncertainty quantification: random variables, correlated sampling, and
//! distribution fitting.

mod fit;
mod normal;
mod random_variable;

pub use fit::{fit_distribution_to_sample, nelder_mead, FitResult, Limits};
pub use normal::{normal_cdf, normal_inv_cdf, normal_pdf};
pub use random_variable::{
    scale_distribution, uniform_sample, Family, RandomVariable, RandomVariableRegistry,
    RandomVariableSet,
};
