//! Demand model: loading, calibration, and sampling of engineering demand
//! parameters.

use std::fs::File;
use std::path::{Path, PathBuf};

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde::Deserialize;
use serde_json::Value;

use super::{to_internal_units, to_user_units};
use crate::config::SamplingMethod;
use crate::logger::Logger;
use crate::table::{fmt_f64, simple_label, Label, Records, Table};
use crate::units::UnitRegistry;
use crate::uq::{
    fit_distribution_to_sample, Family, Limits, RandomVariable, RandomVariableRegistry,
    RandomVariableSet,
};
use crate::PelicunError;

pub const DEMAND_LEVELS: [&str; 3] = ["type", "loc", "dir"];

/// Marginal distribution of one demand column, in internal units.
#[derive(Debug, Clone)]
pub struct DemandMarginal {
    pub label: Label,
    pub unit: Option<String>,
    pub family: Family,
    pub theta: [f64; 2],
    pub truncation: Limits,
}

impl DemandMarginal {
    fn name(&self) -> String {
        simple_label(&self.label)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CalibrationSettings {
    distribution_family: Option<String>,
    censor_at: Option<Vec<Value>>,
    truncate_at: Option<Vec<Value>>,
    add_uncertainty: Option<f64>,
    unit: Option<String>,
}

impl CalibrationSettings {
    fn parse(value: Option<&Value>) -> Result<Self, PelicunError> {
        match value {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(value) => Ok(serde_json::from_value(value.clone())?),
        }
    }

    /// Settings of `self` override those of `base`.
    fn over(self, base: &Self) -> Self {
        Self {
            distribution_family: self.distribution_family.or_else(|| base.distribution_family.clone()),
            censor_at: self.censor_at.or_else(|| base.censor_at.clone()),
            truncate_at: self.truncate_at.or_else(|| base.truncate_at.clone()),
            add_uncertainty: self.add_uncertainty.or(base.add_uncertainty),
            unit: self.unit.or_else(|| base.unit.clone()),
        }
    }
}

fn limit_value(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(number)) => number.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(text)) => text.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

fn parse_limits(limits: Option<&Vec<Value>>, factor: f64) -> Limits {
    match limits {
        Some(values) => [
            limit_value(values.first()) * factor,
            limit_value(values.get(1)) * factor,
        ],
        None => [f64::NAN; 2],
    }
}

fn within(value: f64, limits: &Limits) -> bool {
    (limits[0].is_nan() || value > limits[0]) && (limits[1].is_nan() || value < limits[1])
}

/// In-memory form of a saved demand model.
#[derive(Debug, Clone, Default)]
pub struct DemandModelTables {
    /// One row per demand with `Units`, `Family`, `Theta_0`, `Theta_1`,
    /// `TruncateLower` and `TruncateUpper`.
    pub marginals: Records,
    /// Raw data of the empirical demands with a units row.
    pub empirical: Option<Table>,
    /// Square matrix indexed by the parametric demand names.
    pub correlation: Option<Records>,
}

#[derive(Debug, Default)]
pub struct DemandModel {
    /// Demand realizations in internal units.
    pub sample: Option<Table>,
    pub marginal_params: Vec<DemandMarginal>,
    /// Raw data of the demands that are resampled rather than fitted.
    pub empirical_data: Option<Table>,
    /// Correlation of the parametric marginals, in marginal order.
    pub correlation: Option<DMatrix<f64>>,
}

impl DemandModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads raw demand data.
    ///
    /// Four-level headers carry a leading event id that is dropped.
    /// Realizations flagged in an `ERROR` column are removed. Every column
    /// needs a unit.
    pub fn load_sample(
        &mut self,
        raw: Table,
        units: &UnitRegistry,
        log: &mut Logger,
    ) -> Result<(), PelicunError> {
        log.div(false);
        log.msg("Loading demand data...");

        let mut table = raw;
        match table.levels().len() {
            3 => {}
            4 => table.drop_level(0),
            other => {
                return Err(PelicunError::Model(format!(
                    "demand columns need type, location, and direction levels; got {other} levels"
                )))
            }
        }
        table.set_levels(&DEMAND_LEVELS)?;
        table.map_labels(|label| {
            for part in label.iter_mut() {
                part.retain(|c| !c.is_whitespace());
            }
        });

        let errors = table.matching(&[Some("ERROR"), None, None]);
        if !errors.is_empty() {
            let keep: Vec<bool> = (0..table.nrows())
                .map(|row| {
                    !errors.iter().any(|&pos| {
                        let flag = table.column_at(pos)[row];
                        !flag.is_nan() && flag != 0.0
                    })
                })
                .collect();
            let removed = keep.iter().filter(|keep| !**keep).count();
            table.remove_columns(&errors);
            table = table.filter_rows(&keep);
            log.note(&format!("{removed} realizations removed due to analysis errors."));
        }

        for pos in 0..table.ncols() {
            if table.unit_at(pos).is_none() {
                return Err(PelicunError::Model(format!(
                    "no units are defined for demand {}",
                    simple_label(table.label_at(pos))
                )));
            }
        }
        to_internal_units(&mut table, units)?;

        log.msg(&format!(
            "{} demands with {} realizations successfully parsed.",
            table.ncols(),
            table.nrows()
        ));
        self.sample = Some(table);
        Ok(())
    }

    /// Fits a multivariate distribution to the loaded sample.
    ///
    /// `config` maps `ALL` or a demand type prefix to its calibration
    /// settings; type settings override the `ALL` settings.
    pub fn calibrate_model(
        &mut self,
        config: &Value,
        units: &UnitRegistry,
        log: &mut Logger,
    ) -> Result<(), PelicunError> {
        log.div(false);
        log.msg("Calibrating demand model...");

        let sample = self
            .sample
            .as_ref()
            .ok_or_else(|| PelicunError::Model("no demand sample to calibrate with".to_string()))?;

        let all = CalibrationSettings::parse(config.get("ALL"))?;

        let mut families = Vec::with_capacity(sample.ncols());
        let mut censor = Vec::with_capacity(sample.ncols());
        let mut truncate = Vec::with_capacity(sample.ncols());
        let mut add_uncertainty = Vec::with_capacity(sample.ncols());
        for pos in 0..sample.ncols() {
            let label = sample.label_at(pos);
            let type_key = label[0].split('_').next().unwrap_or(label[0].as_str());
            let settings = CalibrationSettings::parse(config.get(type_key))?.over(&all);

            let family: Family = settings
                .distribution_family
                .as_deref()
                .ok_or_else(|| {
                    PelicunError::InvalidConfig(format!(
                        "no distribution family specified for demand {}",
                        simple_label(label)
                    ))
                })?
                .parse()?;
            if !matches!(
                family,
                Family::Normal | Family::NormalStd | Family::Lognormal | Family::Empirical
            ) {
                return Err(PelicunError::InvalidConfig(format!(
                    "demands cannot be calibrated with a {family} distribution"
                )));
            }

            // limits without a unit are given in internal units
            let factor = units.scale_factor(settings.unit.as_deref())?;
            censor.push(parse_limits(settings.censor_at.as_ref(), factor));
            truncate.push(parse_limits(settings.truncate_at.as_ref(), factor));
            let inc = settings.add_uncertainty.unwrap_or(0.0);
            add_uncertainty.push(match family {
                Family::Normal | Family::NormalStd => inc * factor,
                _ => inc,
            });
            families.push(family);
        }

        // A value outside the limits of any demand removes the whole
        // realization, empirical demands included.
        let row_within = |row: usize, limits: &[Limits]| {
            (0..sample.ncols()).all(|pos| within(sample.column_at(pos)[row], &limits[pos]))
        };
        let mut keep = vec![true; sample.nrows()];
        let mut censored_count = 0;
        let mut truncated_count = 0;
        for (row, keep_row) in keep.iter_mut().enumerate() {
            if !row_within(row, &censor) {
                *keep_row = false;
                censored_count += 1;
            } else if !row_within(row, &truncate) {
                *keep_row = false;
                truncated_count += 1;
            }
        }
        if censored_count > 0 {
            log.note(&format!(
                "Based on the provided censoring limits, {censored_count} realizations were censored."
            ));
        }
        if truncated_count > 0 {
            log.note(&format!(
                "Based on the provided truncation limits, {truncated_count} realizations were \
                 removed before demand calibration."
            ));
        }
        if !keep.contains(&true) {
            return Err(PelicunError::Model(
                "no demand realizations left to calibrate with".to_string(),
            ));
        }
        let filtered = sample.filter_rows(&keep);

        let empirical: Vec<usize> = (0..sample.ncols())
            .filter(|&pos| families[pos] == Family::Empirical)
            .collect();
        let fitted: Vec<usize> = (0..sample.ncols())
            .filter(|&pos| families[pos] != Family::Empirical)
            .collect();

        self.empirical_data = if empirical.is_empty() {
            None
        } else {
            Some(filtered.select(&empirical))
        };

        let mut theta = vec![[f64::NAN; 2]; sample.ncols()];
        let mut rho = None;
        if !fitted.is_empty() {
            let complete: Vec<bool> = (0..filtered.nrows())
                .map(|row| fitted.iter().all(|&pos| !filtered.column_at(pos)[row].is_nan()))
                .collect();
            let missing = complete.iter().filter(|c| !**c).count();
            if missing > 0 {
                log.note(&format!(
                    "{missing} realizations with missing values removed before demand calibration."
                ));
            }
            if missing == complete.len() {
                return Err(PelicunError::Model(
                    "no demand realizations left to calibrate with".to_string(),
                ));
            }

            let raw: Vec<Vec<f64>> = fitted
                .iter()
                .map(|&pos| {
                    filtered
                        .column_at(pos)
                        .iter()
                        .zip(&complete)
                        .filter(|(_, complete)| **complete)
                        .map(|(v, _)| *v)
                        .collect()
                })
                .collect();
            let fit = fit_distribution_to_sample(
                &raw,
                &fitted.iter().map(|&pos| families[pos]).collect::<Vec<_>>(),
                censored_count,
                &fitted.iter().map(|&pos| censor[pos]).collect::<Vec<_>>(),
                &fitted.iter().map(|&pos| truncate[pos]).collect::<Vec<_>>(),
            )?;

            for (i, &pos) in fitted.iter().enumerate() {
                let [t0, t1] = fit.theta[i];
                let inc = add_uncertainty[pos];
                theta[pos] = match families[pos] {
                    // coefficient of variation: combine standard deviations
                    Family::Normal => {
                        let sig = (t0 * t1).abs();
                        [t0, (sig * sig + inc * inc).sqrt() / t0.abs()]
                    }
                    _ => [t0, (t1 * t1 + inc * inc).sqrt()],
                };
            }
            rho = Some(fit.rho);
        }

        self.marginal_params = (0..sample.ncols())
            .map(|pos| DemandMarginal {
                label: sample.label_at(pos).to_vec(),
                unit: sample.unit_at(pos).map(str::to_string),
                family: families[pos],
                theta: theta[pos],
                truncation: if families[pos] == Family::Empirical {
                    [f64::NAN; 2]
                } else {
                    truncate[pos]
                },
            })
            .collect();
        self.correlation = rho;

        log.msg("Demand model successfully calibrated.");
        Ok(())
    }

    /// Writes `<prefix>_marginals.csv`, `<prefix>_empirical.csv`, and
    /// `<prefix>_correlation.csv` in user units.
    pub fn save_model(
        &self,
        prefix: &Path,
        units: &UnitRegistry,
        log: &mut Logger,
    ) -> Result<(), PelicunError> {
        log.div(false);
        log.msg("Saving demand model...");

        let path = |suffix: &str| {
            let mut name = prefix.as_os_str().to_os_string();
            name.push(suffix);
            PathBuf::from(name)
        };

        let mut writer = csv::Writer::from_writer(File::create(path("_marginals.csv"))?);
        writer.write_record([
            "",
            "Units",
            "Family",
            "Theta_0",
            "Theta_1",
            "TruncateLower",
            "TruncateUpper",
        ])?;
        for marginal in &self.marginal_params {
            let factor = units.scale_factor(marginal.unit.as_deref())?;
            let theta1 = match marginal.family {
                Family::NormalStd | Family::Uniform => marginal.theta[1] / factor,
                _ => marginal.theta[1],
            };
            writer.write_record([
                marginal.name(),
                marginal.unit.clone().unwrap_or_default(),
                marginal.family.to_string(),
                fmt_f64(marginal.theta[0] / factor),
                fmt_f64(theta1),
                fmt_f64(marginal.truncation[0] / factor),
                fmt_f64(marginal.truncation[1] / factor),
            ])?;
        }
        writer.flush()?;

        if let Some(empirical) = &self.empirical_data {
            to_user_units(empirical, units)?.write_csv(&path("_empirical.csv"), "", true)?;
        }

        if let Some(rho) = &self.correlation {
            let names: Vec<String> = self
                .marginal_params
                .iter()
                .filter(|m| m.family != Family::Empirical)
                .map(DemandMarginal::name)
                .collect();
            let mut writer = csv::Writer::from_writer(File::create(path("_correlation.csv"))?);
            let mut header = vec![String::new()];
            header.extend(names.iter().cloned());
            writer.write_record(&header)?;
            for (i, name) in names.iter().enumerate() {
                let mut record = vec![name.clone()];
                record.extend((0..names.len()).map(|j| fmt_f64(rho[(i, j)])));
                writer.write_record(&record)?;
            }
            writer.flush()?;
        }

        log.msg("Demand model successfully saved.");
        Ok(())
    }

    /// Loads a model written by [`DemandModel::save_model`]. The empirical
    /// and correlation files are optional.
    pub fn load_model(
        &mut self,
        prefix: &Path,
        units: &UnitRegistry,
        log: &mut Logger,
    ) -> Result<(), PelicunError> {
        let path = |suffix: &str| {
            let mut name = prefix.as_os_str().to_os_string();
            name.push(suffix);
            PathBuf::from(name)
        };

        let empirical_path = path("_empirical.csv");
        let correlation_path = path("_correlation.csv");
        let tables = DemandModelTables {
            marginals: Records::read_csv(&path("_marginals.csv"))?,
            empirical: if empirical_path.exists() {
                Some(Table::read_csv(&empirical_path)?)
            } else {
                None
            },
            correlation: if correlation_path.exists() {
                Some(Records::read_csv(&correlation_path)?)
            } else {
                None
            },
        };
        self.load_model_tables(tables, units, log)
    }

    /// Loads a model from tables laid out like the files of
    /// [`DemandModel::save_model`], values in user units.
    pub fn load_model_tables(
        &mut self,
        tables: DemandModelTables,
        units: &UnitRegistry,
        log: &mut Logger,
    ) -> Result<(), PelicunError> {
        log.div(false);
        log.msg("Loading demand model...");

        let records = &tables.marginals;
        let mut marginals = Vec::with_capacity(records.len());
        for row in 0..records.len() {
            let label: Label = records.id(row).split('-').map(str::to_string).collect();
            if label.len() != DEMAND_LEVELS.len() {
                return Err(PelicunError::parse("demand label", records.id(row)));
            }
            let unit = records.get(row, "Units").map(str::to_string);
            let factor = units.scale_factor(unit.as_deref())?;
            let family: Family = records
                .get(row, "Family")
                .ok_or_else(|| PelicunError::Model(format!("no family for demand {}", records.id(row))))?
                .parse()?;
            let number = |column: &str| -> Result<f64, PelicunError> {
                records
                    .get(row, column)
                    .map(|v| v.parse::<f64>().map_err(|_| PelicunError::parse("number", v)))
                    .unwrap_or(Ok(f64::NAN))
            };
            let theta1 = match family {
                Family::NormalStd | Family::Uniform => number("Theta_1")? * factor,
                _ => number("Theta_1")?,
            };
            marginals.push(DemandMarginal {
                label,
                unit,
                family,
                theta: [number("Theta_0")? * factor, theta1],
                truncation: [
                    number("TruncateLower")? * factor,
                    number("TruncateUpper")? * factor,
                ],
            });
        }

        self.empirical_data = match tables.empirical {
            Some(mut table) => {
                table.set_levels(&DEMAND_LEVELS)?;
                to_internal_units(&mut table, units)?;
                Some(table)
            }
            None => None,
        };

        let parametric: Vec<String> = marginals
            .iter()
            .filter(|m| m.family != Family::Empirical)
            .map(DemandMarginal::name)
            .collect();
        self.correlation = if let Some(records) = &tables.correlation {
            let mut rho = DMatrix::<f64>::identity(parametric.len(), parametric.len());
            for (i, row_name) in parametric.iter().enumerate() {
                let Some(row) = (0..records.len()).find(|&r| records.id(r) == row_name) else {
                    continue;
                };
                for (j, col_name) in parametric.iter().enumerate() {
                    if let Some(value) = records.get(row, col_name) {
                        rho[(i, j)] = value
                            .parse::<f64>()
                            .map_err(|_| PelicunError::parse("correlation", value))?;
                    }
                }
            }
            Some(rho)
        } else {
            None
        };

        self.marginal_params = marginals;
        log.msg("Demand model successfully loaded.");
        Ok(())
    }

    /// Generates `size` demand realizations from the marginals.
    ///
    /// With `preserve_raw_order`, empirical demands replay the raw data
    /// row by row. `demand_cloning` maps an existing column to the list of
    /// columns that replace it.
    pub fn generate_sample(
        &mut self,
        size: usize,
        preserve_raw_order: bool,
        demand_cloning: Option<&Value>,
        method: SamplingMethod,
        rng: &mut StdRng,
        log: &mut Logger,
    ) -> Result<(), PelicunError> {
        if self.marginal_params.is_empty() {
            return Err(PelicunError::Model(
                "model parameters have not been specified; calibrate the demand model or \
                 load its parameters before generating a sample"
                    .to_string(),
            ));
        }

        log.div(false);
        log.msg("Generating sample from demand variables...");

        let mut registry = RandomVariableRegistry::new();
        let mut parametric = Vec::new();
        for marginal in &self.marginal_params {
            let name = marginal.name();
            let rv = match marginal.family {
                Family::Empirical | Family::CoupledEmpirical => {
                    let raw = self
                        .empirical_data
                        .as_ref()
                        .and_then(|table| table.column(&marginal.label))
                        .ok_or_else(|| {
                            PelicunError::Model(format!("no empirical data for demand {name}"))
                        })?;
                    let raw: Vec<f64> = if preserve_raw_order {
                        raw.to_vec()
                    } else {
                        raw.iter().copied().filter(|v| !v.is_nan()).collect()
                    };
                    RandomVariable::empirical(name, raw, preserve_raw_order)?
                }
                family => {
                    parametric.push(name.clone());
                    RandomVariable::new(name, family, marginal.theta.to_vec())?
                        .with_truncation(marginal.truncation[0], marginal.truncation[1])
                }
            };
            registry.add_rv(rv);
        }
        if let Some(rho) = &self.correlation {
            if parametric.len() > 1 {
                registry.add_rv_set(RandomVariableSet::new("EDP_set", parametric, rho.clone())?);
            }
        }

        registry.generate_sample(size, method, rng)?;
        let mut values = registry.take_sample();

        let mut sample = Table::new(&DEMAND_LEVELS, size);
        for marginal in &self.marginal_params {
            let column = values.remove(&marginal.name()).unwrap_or_default();
            sample.push_column(marginal.label.clone(), column, marginal.unit.clone())?;
        }

        if let Some(cloning) = demand_cloning {
            sample = clone_demands(&sample, cloning, log)?;
        }

        log.msg(&format!("Successfully generated {size} realizations."));
        self.sample = Some(sample);
        Ok(())
    }

    /// Appends columns, such as inferred residual drifts, to the sample.
    pub fn add_columns(&mut self, columns: Table) -> Result<(), PelicunError> {
        match &mut self.sample {
            Some(sample) => sample.hconcat(columns),
            None => Err(PelicunError::Model("no demand sample to extend".to_string())),
        }
    }

    /// The sample in user units.
    pub fn save_sample(&self, units: &UnitRegistry) -> Result<Table, PelicunError> {
        let sample = self
            .sample
            .as_ref()
            .ok_or_else(|| PelicunError::Model("no demand sample available".to_string()))?;
        to_user_units(sample, units)
    }
}

/// Replaces every configured column with copies under new labels.
fn clone_demands(sample: &Table, config: &Value, log: &mut Logger) -> Result<Table, PelicunError> {
    let Value::Object(map) = config else {
        return Err(PelicunError::InvalidConfig(
            "demand cloning must map column names to lists of column names".to_string(),
        ));
    };

    let mut targets: Vec<String> = Vec::new();
    for value in map.values() {
        let list = value.as_array().ok_or_else(|| {
            PelicunError::InvalidConfig(format!("demand cloning targets must be a list: {value}"))
        })?;
        for item in list {
            let name = item.as_str().ok_or_else(|| {
                PelicunError::InvalidConfig(format!("demand cloning target is not a string: {item}"))
            })?;
            if targets.iter().any(|t| t == name) {
                return Err(PelicunError::InvalidConfig(format!(
                    "duplicate entry in demand cloning configuration: {name}"
                )));
            }
            targets.push(name.to_string());
        }
    }

    let names = sample.simple_columns();
    let missing: Vec<&str> = map
        .keys()
        .filter(|key| !names.contains(key))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        log.warn(&format!(
            "The demand cloning configuration lists columns that are not present in the \
             demand sample: {missing:?}"
        ));
    }

    let mut out = Table::with_index(sample.levels().to_vec(), sample.index().to_vec());
    for (pos, name) in names.iter().enumerate() {
        let values = sample.column_at(pos).to_vec();
        let unit = sample.unit_at(pos).map(str::to_string);
        match map.get(name).and_then(Value::as_array) {
            Some(clones) => {
                for clone in clones.iter().filter_map(Value::as_str) {
                    let label: Label = clone.split('-').map(str::to_string).collect();
                    if label.len() != DEMAND_LEVELS.len() {
                        return Err(PelicunError::parse("demand label", clone));
                    }
                    out.push_column(label, values.clone(), unit.clone())?;
                }
            }
            None => out.push_column(sample.label_at(pos).to_vec(), values, unit)?,
        }
    }
    Ok(out)
}

/// Residual interstory drifts inferred from peak drifts with the FEMA P-58
/// piecewise rule plus lognormal noise (beta = 0.2), capped at the peak.
pub fn estimate_rid(pid: &Table, yield_drift: f64, rng: &mut StdRng) -> Result<Table, PelicunError> {
    let noise = Normal::new(0.0, 0.2).map_err(|err| PelicunError::Model(err.to_string()))?;
    let mut out = Table::with_index(pid.levels().to_vec(), pid.index().to_vec());
    for pos in 0..pid.ncols() {
        let mut label = pid.label_at(pos).to_vec();
        if let Some(demand_type) = label.first_mut() {
            *demand_type = "RID".to_string();
        }
        let values = pid
            .column_at(pos)
            .iter()
            .map(|&peak| {
                let rid = if peak < yield_drift {
                    0.0
                } else if peak < 4.0 * yield_drift {
                    0.3 * (peak - yield_drift)
                } else {
                    peak - 3.0 * yield_drift
                };
                if rid > 0.0 {
                    (rid.ln() + noise.sample(rng)).exp().min(peak)
                } else {
                    rid
                }
            })
            .collect();
        out.push_column(label, values, Some("unitless".to_string()))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::label;
    use rand::SeedableRng;
    use serde_json::json;

    fn units() -> UnitRegistry {
        UnitRegistry::default_units().unwrap()
    }

    fn raw_demands() -> Table {
        let text = "\
,1-PID-1-1,1-PFA-1-1,1-ERROR-0-1
Units,unitless,inchps2,
0,0.01,100,0
1,0.02,200,0
2,0.04,300,1
3,0.08,400,0
";
        Table::from_csv_reader(text.as_bytes()).unwrap()
    }

    fn loaded() -> DemandModel {
        let mut model = DemandModel::new();
        model.load_sample(raw_demands(), &units(), &mut Logger::silent()).unwrap();
        model
    }

    #[test]
    fn load_sample_drops_event_level_errors_and_converts_units() {
        let model = loaded();
        let sample = model.sample.as_ref().unwrap();
        assert_eq!(sample.levels(), &["type", "loc", "dir"]);
        assert_eq!(sample.ncols(), 2);
        assert_eq!(sample.nrows(), 3);
        let pfa = sample.column(&["PFA", "1", "1"]).unwrap();
        assert!((pfa[0] - 2.54).abs() < 1e-9);
        assert!((pfa[2] - 10.16).abs() < 1e-9);
    }

    #[test]
    fn missing_units_are_rejected() {
        let text = ",PID-1-1\n0,0.01\n";
        let table = Table::from_csv_reader(text.as_bytes()).unwrap();
        let mut model = DemandModel::new();
        assert!(model.load_sample(table, &units(), &mut Logger::silent()).is_err());
    }

    #[test]
    fn lognormal_calibration_with_added_uncertainty() {
        let mut model = DemandModel::new();
        let mut table = Table::new(&["type", "loc", "dir"], 4);
        table
            .push_column(label(&["PID", "1", "1"]), vec![0.01, 0.02, 0.04, 0.08], Some("unitless".into()))
            .unwrap();
        model.load_sample(table, &units(), &mut Logger::silent()).unwrap();

        let config = json!({"ALL": {"DistributionFamily": "lognormal", "AddUncertainty": 0.3}});
        model.calibrate_model(&config, &units(), &mut Logger::silent()).unwrap();

        let marginal = &model.marginal_params[0];
        assert_eq!(marginal.family, Family::Lognormal);
        assert!((marginal.theta[0] - 0.01 * 2f64.powf(1.5)).abs() < 1e-9);
        let beta = 2f64.ln() * 1.25f64.sqrt();
        assert!((marginal.theta[1] - (beta * beta + 0.09).sqrt()).abs() < 1e-9);
    }

    fn column_close(values: &[f64], expected: &[f64]) -> bool {
        values.len() == expected.len()
            && values.iter().zip(expected).all(|(v, e)| (v - e).abs() < 1e-9)
    }

    #[test]
    fn type_settings_override_all_and_censoring_counts_rows() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("log.txt");
        let mut log = Logger::new(false, false, Some(&log_path), false).unwrap();
        let mut model = loaded();
        let config = json!({
            "ALL": {"DistributionFamily": "lognormal"},
            "PFA": {"DistributionFamily": "empirical"},
            "PID": {"CensorAt": [null, 0.05]}
        });
        model.calibrate_model(&config, &units(), &mut log).unwrap();

        assert_eq!(model.marginal_params[0].family, Family::Lognormal);
        assert_eq!(model.marginal_params[1].family, Family::Empirical);
        assert!(model.marginal_params[0].truncation.iter().all(|t| t.is_nan()));
        // the censored 0.08 realization pulls the median above the
        // geometric mean of the two detected values
        assert!(model.marginal_params[0].theta[0] > 0.02f64.sqrt() * 0.1);
        assert!(model.marginal_params[1].theta.iter().all(|t| t.is_nan()));
        assert_eq!(model.correlation.as_ref().unwrap().nrows(), 1);

        let text = std::fs::read_to_string(&log_path).unwrap();
        assert!(text.contains("1 realizations were censored"));
    }

    #[test]
    fn censoring_removes_realizations_from_empirical_demands() {
        let mut model = loaded();
        let config = json!({
            "ALL": {"DistributionFamily": "lognormal"},
            "PFA": {"DistributionFamily": "empirical"},
            "PID": {"CensorAt": [null, 0.05]}
        });
        model.calibrate_model(&config, &units(), &mut Logger::silent()).unwrap();

        let empirical = model.empirical_data.as_ref().unwrap();
        assert_eq!(empirical.ncols(), 1);
        assert_eq!(empirical.nrows(), 2);
        assert!(column_close(empirical.column(&["PFA", "1", "1"]).unwrap(), &[2.54, 5.08]));
    }

    #[test]
    fn truncation_removes_realizations_and_bounds_the_marginal() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("log.txt");
        let mut log = Logger::new(false, false, Some(&log_path), false).unwrap();
        let mut model = loaded();
        let config = json!({
            "ALL": {"DistributionFamily": "lognormal"},
            "PFA": {"DistributionFamily": "empirical"},
            "PID": {"TruncateAt": [null, 0.05]}
        });
        model.calibrate_model(&config, &units(), &mut log).unwrap();

        let pid = &model.marginal_params[0];
        assert!(pid.truncation[0].is_nan());
        assert!((pid.truncation[1] - 0.05).abs() < 1e-12);
        assert!(pid.theta[0].is_finite() && pid.theta[0] > 0.0);
        assert!(model.marginal_params[1].truncation.iter().all(|t| t.is_nan()));

        let empirical = model.empirical_data.as_ref().unwrap();
        assert!(column_close(empirical.column(&["PFA", "1", "1"]).unwrap(), &[2.54, 5.08]));

        let text = std::fs::read_to_string(&log_path).unwrap();
        assert!(text.contains("1 realizations were removed before demand calibration"));
        assert!(!text.contains("censored"));
    }

    #[test]
    fn limits_without_a_unit_are_internal_units() {
        // 6 m/s2 sits between the 5.08 and 10.16 m/s2 realizations; read
        // as inchps2 it would censor every realization
        let mut model = loaded();
        let config = json!({
            "ALL": {"DistributionFamily": "lognormal"},
            "PFA": {"DistributionFamily": "empirical", "CensorAt": [null, 6]}
        });
        model.calibrate_model(&config, &units(), &mut Logger::silent()).unwrap();
        let empirical = model.empirical_data.as_ref().unwrap();
        assert!(column_close(empirical.column(&["PFA", "1", "1"]).unwrap(), &[2.54, 5.08]));

        let mut model = loaded();
        let config = json!({
            "ALL": {"DistributionFamily": "lognormal"},
            "PFA": {"DistributionFamily": "empirical", "CensorAt": [null, 0.6], "Unit": "g"}
        });
        model.calibrate_model(&config, &units(), &mut Logger::silent()).unwrap();
        let empirical = model.empirical_data.as_ref().unwrap();
        assert!(column_close(empirical.column(&["PFA", "1", "1"]).unwrap(), &[2.54, 5.08]));
    }

    #[test]
    fn saved_model_loads_from_tables() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("EDP");
        let mut model = loaded();
        let config = json!({"ALL": {"DistributionFamily": "lognormal"}, "PFA": {"DistributionFamily": "empirical"}});
        model.calibrate_model(&config, &units(), &mut Logger::silent()).unwrap();
        model.save_model(&prefix, &units(), &mut Logger::silent()).unwrap();

        let tables = DemandModelTables {
            marginals: Records::read_csv(&dir.path().join("EDP_marginals.csv")).unwrap(),
            empirical: Some(Table::read_csv(&dir.path().join("EDP_empirical.csv")).unwrap()),
            correlation: Some(Records::read_csv(&dir.path().join("EDP_correlation.csv")).unwrap()),
        };
        let mut from_tables = DemandModel::new();
        from_tables.load_model_tables(tables, &units(), &mut Logger::silent()).unwrap();
        let mut from_files = DemandModel::new();
        from_files.load_model(&prefix, &units(), &mut Logger::silent()).unwrap();

        assert_eq!(from_tables.empirical_data, from_files.empirical_data);
        assert_eq!(from_tables.correlation, from_files.correlation);
        assert_eq!(from_tables.marginal_params.len(), 2);
        for (loaded, calibrated) in from_tables.marginal_params.iter().zip(&model.marginal_params) {
            assert_eq!(loaded.label, calibrated.label);
            assert_eq!(loaded.family, calibrated.family);
            assert_eq!(loaded.unit, calibrated.unit);
        }
        assert!((from_tables.marginal_params[0].theta[0] - model.marginal_params[0].theta[0]).abs() < 1e-9);
        let empirical = from_tables.empirical_data.as_ref().unwrap();
        assert!(column_close(empirical.column(&["PFA", "1", "1"]).unwrap(), &[2.54, 5.08, 10.16]));
    }

    #[test]
    fn tables_without_empirical_or_correlation_data() {
        let text = "\
,Units,Family,Theta_0,Theta_1,TruncateLower,TruncateUpper
PFA-1-1,g,normal_std,0.5,0.1,,1.0
PID-1-1,unitless,lognormal,0.01,0.4,,
";
        let tables = DemandModelTables {
            marginals: Records::from_reader(text.as_bytes()).unwrap(),
            ..DemandModelTables::default()
        };
        let mut model = DemandModel::new();
        model.load_model_tables(tables, &units(), &mut Logger::silent()).unwrap();

        assert!(model.empirical_data.is_none());
        assert!(model.correlation.is_none());
        let pfa = &model.marginal_params[0];
        let g = units().scale_factor(Some("g")).unwrap();
        assert!((pfa.theta[0] - 0.5 * g).abs() < 1e-9);
        assert!((pfa.theta[1] - 0.1 * g).abs() < 1e-9);
        assert!((pfa.truncation[1] - g).abs() < 1e-9);
        assert_eq!(model.marginal_params[1].theta, [0.01, 0.4]);
    }

    #[test]
    fn saved_model_reloads_and_samples() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("EDP");
        let mut model = loaded();
        let config = json!({"ALL": {"DistributionFamily": "lognormal"}, "PFA": {"DistributionFamily": "empirical"}});
        model.calibrate_model(&config, &units(), &mut Logger::silent()).unwrap();
        model.save_model(&prefix, &units(), &mut Logger::silent()).unwrap();
        assert!(dir.path().join("EDP_marginals.csv").exists());
        assert!(dir.path().join("EDP_empirical.csv").exists());

        let mut reloaded = DemandModel::new();
        reloaded.load_model(&prefix, &units(), &mut Logger::silent()).unwrap();
        assert_eq!(reloaded.marginal_params.len(), 2);
        let pfa = &reloaded.marginal_params[1];
        assert_eq!(pfa.family, Family::Empirical);
        assert_eq!(pfa.unit.as_deref(), Some("inchps2"));
        assert!(
            (reloaded.marginal_params[0].theta[0] - model.marginal_params[0].theta[0]).abs() < 1e-9
        );

        let mut rng = StdRng::seed_from_u64(3);
        reloaded
            .generate_sample(50, false, None, SamplingMethod::Lhs, &mut rng, &mut Logger::silent())
            .unwrap();
        let sample = reloaded.sample.as_ref().unwrap();
        assert_eq!(sample.nrows(), 50);
        let raw = [2.54, 5.08, 10.16];
        for v in sample.column(&["PFA", "1", "1"]).unwrap() {
            assert!(raw.iter().any(|r| (r - v).abs() < 1e-9));
        }
    }

    #[test]
    fn coupled_empirical_sample_replays_raw_rows() {
        let mut model = loaded();
        model
            .calibrate_model(&json!({"ALL": {"DistributionFamily": "empirical"}}), &units(), &mut Logger::silent())
            .unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        model
            .generate_sample(5, true, None, SamplingMethod::Lhs, &mut rng, &mut Logger::silent())
            .unwrap();
        let sample = model.sample.as_ref().unwrap();
        assert_eq!(sample.column(&["PID", "1", "1"]).unwrap(), &[0.01, 0.02, 0.08, 0.01, 0.02]);
    }

    #[test]
    fn demand_cloning_replaces_source_columns() {
        let mut model = loaded();
        model
            .calibrate_model(&json!({"ALL": {"DistributionFamily": "empirical"}}), &units(), &mut Logger::silent())
            .unwrap();
        let cloning = json!({"PID-1-1": ["PID-1-1", "PID-1-2"], "SA-0-1": ["SA-0-2"]});
        let mut log = Logger::silent();
        let mut rng = StdRng::seed_from_u64(1);
        model
            .generate_sample(3, true, Some(&cloning), SamplingMethod::Lhs, &mut rng, &mut log)
            .unwrap();
        let sample = model.sample.as_ref().unwrap();
        assert_eq!(sample.simple_columns(), vec!["PID-1-1", "PID-1-2", "PFA-1-1"]);
        assert_eq!(sample.column(&["PID", "1", "2"]), sample.column(&["PID", "1", "1"]));
        assert_eq!(log.emitted_warnings().len(), 1);

        let duplicate = json!({"PID-1-1": ["PID-1-2"], "PFA-1-1": ["PID-1-2"]});
        assert!(clone_demands(sample, &duplicate, &mut Logger::silent()).is_err());
    }

    #[test]
    fn residual_drift_follows_piecewise_rule() {
        let mut pid = Table::new(&["type", "loc", "dir"], 4);
        pid.push_column(label(&["PID", "1", "1"]), vec![0.005, 0.02, 0.1, f64::NAN], Some("unitless".into()))
            .unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let rid = estimate_rid(&pid, 0.01, &mut rng).unwrap();
        let values = rid.column(&["RID", "1", "1"]).unwrap();
        assert_eq!(values[0], 0.0);
        assert!(values[1] > 0.0 && values[1] <= 0.02);
        assert!(values[2] > 0.0 && values[2] <= 0.1);
        assert!(values[3].is_nan());
        assert_eq!(rid.unit_at(0), Some("unitless"));
    }
}
