//! Repair consequence model: consequence functions, economies of scale,
//! correlated deviations, and loss aggregation.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use nalgebra::DMatrix;
use rand::rngs::StdRng;

use crate::config::Options;
use crate::logger::Logger;
use crate::table::{label, Agg, Label, Records, Table};
use crate::units::UnitRegistry;
use crate::uq::{Family, RandomVariable, RandomVariableRegistry, RandomVariableSet};
use crate::PelicunError;

pub const REPAIR_LEVELS: [&str; 7] = ["dv", "loss", "dmg", "ds", "loc", "dir", "uid"];

/// Consequence id whose losses override every local repair.
pub const REPLACEMENT: &str = "replacement";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DecisionVariable {
    Cost,
    Time,
    Carbon,
    Energy,
}

impl DecisionVariable {
    pub const ALL: [DecisionVariable; 4] = [
        DecisionVariable::Cost,
        DecisionVariable::Time,
        DecisionVariable::Carbon,
        DecisionVariable::Energy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionVariable::Cost => "Cost",
            DecisionVariable::Time => "Time",
            DecisionVariable::Carbon => "Carbon",
            DecisionVariable::Energy => "Energy",
        }
    }

    fn aggregate_name(&self) -> &'static str {
        match self {
            DecisionVariable::Cost => "repair_cost",
            DecisionVariable::Time => "repair_time",
            DecisionVariable::Carbon => "repair_carbon",
            DecisionVariable::Energy => "repair_energy",
        }
    }
}

impl fmt::Display for DecisionVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecisionVariable {
    type Err = PelicunError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DecisionVariable::ALL
            .into_iter()
            .find(|dv| dv.as_str() == s.trim())
            .ok_or_else(|| PelicunError::parse("decision variable", s))
    }
}

/// Median consequence: a constant, or a function of the aggregate damaged
/// quantity interpolated between points and clamped at both ends.
#[derive(Debug, Clone, PartialEq)]
pub enum Median {
    Constant(f64),
    Multilinear { medians: Vec<f64>, quantities: Vec<f64> },
}

impl Median {
    /// Parses `"m1,m2,...|q1,q2,..."` or a single number.
    pub fn parse(text: &str) -> Result<Self, PelicunError> {
        let numbers = |part: &str| -> Result<Vec<f64>, PelicunError> {
            part.split(',')
                .map(|v| {
                    v.trim()
                        .parse::<f64>()
                        .map_err(|_| PelicunError::parse("consequence median", text))
                })
                .collect()
        };
        match text.split_once('|') {
            None => Ok(Median::Constant(
                text.trim()
                    .parse()
                    .map_err(|_| PelicunError::parse("consequence median", text))?,
            )),
            Some((medians, quantities)) => {
                let medians = numbers(medians)?;
                let quantities = numbers(quantities)?;
                if medians.len() != quantities.len() || medians.is_empty() {
                    return Err(PelicunError::parse("consequence median", text));
                }
                if quantities.windows(2).any(|w| w[1] < w[0]) {
                    return Err(PelicunError::Model(format!(
                        "quantities of the consequence function `{text}` must be increasing"
                    )));
                }
                Ok(Median::Multilinear { medians, quantities })
            }
        }
    }

    pub fn eval(&self, quantity: f64) -> f64 {
        match self {
            Median::Constant(value) => *value,
            Median::Multilinear { medians, quantities } => {
                let last = quantities.len() - 1;
                if quantity <= quantities[0] {
                    return medians[0];
                }
                if quantity >= quantities[last] {
                    return medians[last];
                }
                let i = quantities.iter().position(|q| *q > quantity).unwrap_or(last);
                let (q0, q1) = (quantities[i - 1], quantities[i]);
                let (m0, m1) = (medians[i - 1], medians[i]);
                m0 + (m1 - m0) * (quantity - q0) / (q1 - q0)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DamageStateConsequence {
    /// Distribution of the deviation from the median; `None` is
    /// deterministic.
    pub family: Option<Family>,
    pub median: Median,
    pub theta1: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Consequence {
    pub id: String,
    pub dv: DecisionVariable,
    /// Reference quantity, such as `1 EA` or `100 ft2`.
    pub quantity_unit: String,
    pub dv_unit: String,
    /// Parameters keyed by damage state id.
    pub damage_states: BTreeMap<String, DamageStateConsequence>,
}

impl Consequence {
    fn from_records(records: &Records, row: usize, id: &str, dv: DecisionVariable) -> Result<Self, PelicunError> {
        let field = |column: &str| -> Result<String, PelicunError> {
            records
                .get(row, column)
                .map(str::to_string)
                .ok_or_else(|| PelicunError::Model(format!("{column} is not defined for {id}-{dv}")))
        };

        let mut damage_states = BTreeMap::new();
        for ds in 1.. {
            let theta_col = format!("DS{ds}-Theta_0");
            if records.column_position(&theta_col).is_none() {
                break;
            }
            let Some(theta0) = records.get(row, &theta_col) else {
                continue;
            };
            let family = match records.get(row, &format!("DS{ds}-Family")) {
                None => None,
                Some(name) => match name.parse::<Family>() {
                    Ok(family @ (Family::Normal | Family::NormalStd | Family::Lognormal)) => Some(family),
                    _ => {
                        return Err(PelicunError::Model(format!(
                            "loss distribution of type {name} is not supported"
                        )))
                    }
                },
            };
            let theta1 = match records.get(row, &format!("DS{ds}-Theta_1")) {
                Some(value) => value
                    .parse::<f64>()
                    .map_err(|_| PelicunError::parse("consequence dispersion", value))?,
                None => f64::NAN,
            };
            damage_states.insert(
                ds.to_string(),
                DamageStateConsequence {
                    family,
                    median: Median::parse(theta0)?,
                    theta1,
                },
            );
        }

        Ok(Self {
            id: id.to_string(),
            dv,
            quantity_unit: field("Quantity-Unit")?,
            dv_unit: field("DV-Unit")?,
            damage_states,
        })
    }
}

/// Where consequence parameters come from.
#[derive(Debug, Clone)]
pub enum ConsequenceSource {
    File(PathBuf),
    Records(Records),
}

impl ConsequenceSource {
    fn records(&self) -> Result<Cow<'_, Records>, PelicunError> {
        match self {
            ConsequenceSource::File(path) => Ok(Cow::Owned(Records::read_csv(path)?)),
            ConsequenceSource::Records(records) => Ok(Cow::Borrowed(records)),
        }
    }
}

/// One consequence column before the deviations are applied.
struct LossTerm {
    label: Label,
    unit: String,
    quantity: Vec<f64>,
    median: Vec<f64>,
    deviation: Option<String>,
}

#[derive(Debug, Default)]
pub struct RepairModel {
    pub consequences: BTreeMap<(String, DecisionVariable), Consequence>,
    /// Damage drivers (`DMG-<cmp>`) and the consequence each one uses.
    pub loss_map: Vec<(String, String)>,
    pub decision_variables: Vec<DecisionVariable>,
    /// Repair consequences in decision variable units.
    pub sample: Option<Table>,
}

impl RepairModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads consequence parameters for the mapped consequences.
    ///
    /// The earliest definition of a consequence is used. Incomplete
    /// consequences are dropped with a warning.
    pub fn load_model(
        &mut self,
        sources: &[ConsequenceSource],
        loss_map: Vec<(String, String)>,
        decision_variables: &[DecisionVariable],
        log: &mut Logger,
    ) -> Result<(), PelicunError> {
        log.div(false);
        log.msg("Loading loss map...");
        log.note(&format!("Loss map contains {} drivers.", loss_map.len()));

        log.msg("Loading repair consequence parameters...");
        let mapped: BTreeSet<&str> = loss_map.iter().map(|(_, cons)| cons.as_str()).collect();
        let mut consequences: BTreeMap<(String, DecisionVariable), Consequence> = BTreeMap::new();
        let mut incomplete: BTreeSet<(String, DecisionVariable)> = BTreeSet::new();
        for source in sources {
            let records = source.records()?;
            for row in 0..records.len() {
                let Some((id, dv)) = records.id(row).rsplit_once('-') else {
                    continue;
                };
                let Ok(dv) = dv.parse::<DecisionVariable>() else {
                    continue;
                };
                let key = (id.to_string(), dv);
                if !mapped.contains(id)
                    || !decision_variables.contains(&dv)
                    || consequences.contains_key(&key)
                    || incomplete.contains(&key)
                {
                    continue;
                }
                if records.flag(row, "Incomplete") {
                    incomplete.insert(key);
                    continue;
                }
                consequences.insert(key, Consequence::from_records(&records, row, id, dv)?);
            }
        }

        if !incomplete.is_empty() {
            let names: Vec<String> = incomplete.iter().map(|(id, dv)| format!("{id}-{dv}")).collect();
            log.warn(&format!(
                "Loss model parameters are incomplete for the following consequences and \
                 they are excluded from the analysis: {names:?}"
            ));
        }
        let missing: Vec<&str> = mapped
            .iter()
            .copied()
            .filter(|id| !consequences.keys().any(|(cons, _)| cons == id))
            .filter(|id| !incomplete.iter().any(|(cons, _)| cons == id))
            .collect();
        if !missing.is_empty() {
            log.warn(&format!(
                "The loss model does not provide consequence information for the following \
                 consequences in the loss map: {missing:?}. They are not considered in the \
                 loss calculation."
            ));
        }

        log.msg(&format!(
            "{} consequence functions successfully loaded.",
            consequences.len()
        ));
        self.consequences = consequences;
        self.loss_map = loss_map;
        self.decision_variables = decision_variables.to_vec();
        Ok(())
    }

    /// Samples repair consequences for every mapped damage column.
    pub fn calculate(
        &mut self,
        damage: &Table,
        options: &Options,
        units: &UnitRegistry,
        rng: &mut StdRng,
        log: &mut Logger,
    ) -> Result<(), PelicunError> {
        log.div(false);
        log.msg("Calculating repair consequences...");

        let size = damage.nrows();
        let mut registry = RandomVariableRegistry::new();
        let mut terms: Vec<LossTerm> = Vec::new();

        for (driver, cons_id) in &self.loss_map {
            let cmp = driver.strip_prefix("DMG-").ok_or_else(|| {
                PelicunError::InvalidConfig(format!("loss map driver `{driver}` must start with DMG-"))
            })?;
            let columns = damage.matching(&[Some(cmp), None, None, None, None]);
            if columns.is_empty() {
                continue;
            }

            for dv in &self.decision_variables {
                let Some(consequence) = self.consequences.get(&(cons_id.clone(), *dv)) else {
                    continue;
                };
                let qty_factor = units.scale_factor(Some(&consequence.quantity_unit))?;
                let eco = economies_of_scale(damage, &columns, options, qty_factor);

                for &pos in &columns {
                    let dmg_label = damage.label_at(pos);
                    let (loc, dir, uid, ds) = (&dmg_label[1], &dmg_label[2], &dmg_label[3], &dmg_label[4]);
                    let Some(params) = consequence.damage_states.get(ds) else {
                        continue;
                    };

                    let eco_quantity = &eco[&eco_key(dmg_label, options)];
                    let median = eco_quantity.iter().map(|q| params.median.eval(*q)).collect();
                    let quantity = damage.column_at(pos).iter().map(|q| q / qty_factor).collect();

                    let deviation = match params.family {
                        None => None,
                        Some(family) => {
                            let name = format!("{dv}-{cons_id}-{cmp}-{ds}-{loc}-{dir}-{uid}");
                            let mut rv = RandomVariable::new(name.clone(), family, vec![1.0, params.theta1])?;
                            if family != Family::Lognormal {
                                rv = rv.with_truncation(0.0, f64::NAN);
                            }
                            registry.add_rv(rv);
                            Some(name)
                        }
                    };

                    terms.push(LossTerm {
                        label: label(&[
                            dv.as_str(),
                            cons_id.as_str(),
                            cmp,
                            ds.as_str(),
                            loc.as_str(),
                            dir.as_str(),
                            uid.as_str(),
                        ]),
                        unit: consequence.dv_unit.clone(),
                        quantity,
                        median,
                        deviation,
                    });
                }
            }
        }

        if options.rho_cost_time != 0.0 {
            let rho = DMatrix::from_row_slice(
                2,
                2,
                &[1.0, options.rho_cost_time, options.rho_cost_time, 1.0],
            );
            for cost in terms.iter().filter(|t| t.label[0] == "Cost") {
                let Some(cost_rv) = &cost.deviation else {
                    continue;
                };
                let time = terms
                    .iter()
                    .find(|t| t.label[0] == "Time" && t.label[1..] == cost.label[1..]);
                if let Some(time_rv) = time.and_then(|t| t.deviation.as_ref()) {
                    registry.add_rv_set(RandomVariableSet::new(
                        format!("DV-{}", &cost_rv[5..]),
                        vec![cost_rv.clone(), time_rv.clone()],
                        rho.clone(),
                    )?);
                }
            }
        }

        registry.generate_sample(size, options.sampling.sampling_method, rng)?;
        let deviations = registry.sample();

        let mut sample = Table::new(&REPAIR_LEVELS, size);
        for term in terms {
            let values = (0..size)
                .map(|row| {
                    let deviation = term
                        .deviation
                        .as_ref()
                        .and_then(|name| deviations.get(name))
                        .map_or(1.0, |values| values[row]);
                    let value = term.quantity[row] * term.median[row] * deviation;
                    if value.is_nan() {
                        0.0
                    } else {
                        value
                    }
                })
                .collect();
            sample.push_column(term.label, values, Some(term.unit))?;
        }

        apply_replacement(&mut sample);

        log.msg(&format!(
            "Successfully obtained {} repair consequence columns.",
            sample.ncols()
        ));
        self.sample = Some(sample);
        Ok(())
    }

    /// Aggregates the repair consequences of every realization.
    ///
    /// Costs, carbon, and energy are summed. Repair time is reported both
    /// as the sum over all components (`sequential`) and as the largest
    /// per-location sum (`parallel`).
    pub fn aggregate_losses(&self) -> Result<Table, PelicunError> {
        let sample = self
            .sample
            .as_ref()
            .ok_or_else(|| PelicunError::Model("no repair consequence sample available".to_string()))?;

        let mut out = Table::with_index(label(&["dv", "type"]), sample.index().to_vec());
        let loc_level = 4;
        for dv in DecisionVariable::ALL {
            let columns = sample.matching(&[Some(dv.as_str())]);
            if columns.is_empty() {
                continue;
            }
            let unit = sample.unit_at(columns[0]).map(str::to_string);
            let subset = sample.select(&columns);
            let total = subset.group_by(&[0], Agg::Sum);

            if dv == DecisionVariable::Time {
                let per_loc = subset.group_by(&[0, loc_level], Agg::Sum);
                let parallel = per_loc.group_by(&[0], Agg::Max);
                out.push_column(
                    label(&[dv.aggregate_name(), "parallel"]),
                    parallel.column_at(0).to_vec(),
                    unit.clone(),
                )?;
                out.push_column(
                    label(&[dv.aggregate_name(), "sequential"]),
                    total.column_at(0).to_vec(),
                    unit,
                )?;
            } else {
                out.push_column(label(&[dv.aggregate_name(), ""]), total.column_at(0).to_vec(), unit)?;
            }
        }
        Ok(out)
    }

    pub fn save_sample(&self) -> Result<Table, PelicunError> {
        self.sample
            .clone()
            .ok_or_else(|| PelicunError::Model("no repair consequence sample available".to_string()))
    }
}

/// Key of the quantity group that determines the median of a damage
/// column: `cmp`, optionally refined by location and damage state.
fn eco_key(dmg_label: &[String], options: &Options) -> Label {
    let mut key = vec![dmg_label[0].clone()];
    if !options.eco_scale.across_floors {
        key.push(dmg_label[1].clone());
    }
    if !options.eco_scale.across_damage_states {
        key.push(dmg_label[4].clone());
    }
    key
}

/// Damaged quantities aggregated for economies of scale, in consequence
/// quantity units. Undamaged quantities are excluded.
fn economies_of_scale(
    damage: &Table,
    columns: &[usize],
    options: &Options,
    qty_factor: f64,
) -> BTreeMap<Label, Vec<f64>> {
    let mut groups: BTreeMap<Label, Vec<f64>> = BTreeMap::new();
    for &pos in columns {
        let dmg_label = damage.label_at(pos);
        let key = eco_key(dmg_label, options);
        let entry = groups
            .entry(key)
            .or_insert_with(|| vec![0.0; damage.nrows()]);
        if dmg_label[4] == "0" {
            continue;
        }
        for (total, q) in entry.iter_mut().zip(damage.column_at(pos)) {
            if !q.is_nan() {
                *total += q / qty_factor;
            }
        }
    }
    groups
}

/// Zeroes every local consequence in realizations where the replacement
/// consequence is non-zero.
fn apply_replacement(sample: &mut Table) {
    let replacement = sample.matching(&[None, Some(REPLACEMENT)]);
    if replacement.is_empty() {
        return;
    }
    let replaced: Vec<bool> = (0..sample.nrows())
        .map(|row| {
            replacement
                .iter()
                .map(|&pos| sample.column_at(pos)[row])
                .sum::<f64>()
                > 0.0
        })
        .collect();
    for pos in 0..sample.ncols() {
        if sample.label_at(pos)[4] == "0" {
            continue;
        }
        for (value, replaced) in sample.column_at_mut(pos).iter_mut().zip(&replaced) {
            if *replaced {
                *value = 0.0;
            }
        }
    }
}
