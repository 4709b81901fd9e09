//! Damage model: fragility functions, damage state evaluation per
//! performance group, and damage processes.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use rand::rngs::StdRng;
use serde_json::{Map, Value};

use super::asset::AssetModel;
use super::{to_internal_units, to_user_units};
use crate::base::edp_to_demand_type;
use crate::config::Options;
use crate::logger::Logger;
use crate::table::{simple_label, Label, Records, Table};
use crate::units::UnitRegistry;
use crate::uq::{scale_distribution, Family, RandomVariable, RandomVariableRegistry};
use crate::PelicunError;

pub const DMG_LEVELS: [&str; 5] = ["cmp", "loc", "dir", "uid", "ds"];

#[derive(Debug, Clone, PartialEq)]
pub struct LimitState {
    /// `None` means a deterministic capacity.
    pub family: Option<Family>,
    /// Capacity parameters in internal units.
    pub theta: [f64; 2],
    /// Probabilities of mutually exclusive damage states.
    pub ds_weights: Option<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fragility {
    pub id: String,
    /// Short demand type, with the subtype appended after `_`.
    pub demand_type: String,
    pub demand_unit: String,
    pub offset: i64,
    pub directional: bool,
    pub limit_states: Vec<LimitState>,
}

impl Fragility {
    pub fn damage_state_count(&self) -> usize {
        self.limit_states
            .iter()
            .map(|ls| ls.ds_weights.as_ref().map_or(1, Vec::len))
            .sum()
    }

    /// Demand type without the subtype; used to look up demand offsets.
    fn base_demand_type(&self) -> &str {
        self.demand_type.split('_').next().unwrap_or(self.demand_type.as_str())
    }

    fn from_records(records: &Records, row: usize, units: &UnitRegistry) -> Result<Self, PelicunError> {
        let id = records.id(row).to_string();
        let number = |column: &str| -> Result<Option<f64>, PelicunError> {
            records
                .get(row, column)
                .map(|value| {
                    value
                        .parse::<f64>()
                        .map_err(|_| PelicunError::parse("fragility parameter", value))
                })
                .transpose()
        };

        let long_type = records
            .get(row, "Demand-Type")
            .ok_or_else(|| PelicunError::Model(format!("no demand type defined for {id}")))?;
        let demand_type = match long_type.split_once('|') {
            Some((name, subtype)) => format!("{}_{}", short_demand_type(name)?, subtype.trim()),
            None => short_demand_type(long_type)?.to_string(),
        };
        let demand_unit = records
            .get(row, "Demand-Unit")
            .ok_or_else(|| PelicunError::Model(format!("no demand unit defined for {id}")))?
            .to_string();
        let factor = units.scale_factor(Some(&demand_unit))?;

        let mut limit_states = Vec::new();
        for ls in 1.. {
            let theta_col = format!("LS{ls}-Theta_0");
            if records.column_position(&theta_col).is_none() {
                break;
            }
            let Some(theta0) = number(&theta_col)? else {
                continue;
            };
            let family = match records.get(row, &format!("LS{ls}-Family")) {
                None => None,
                Some("function") => {
                    return Err(PelicunError::Model(format!(
                        "{id} uses a damage function, which is not supported"
                    )))
                }
                Some(family) => Some(family.parse::<Family>()?),
            };
            let theta1 = number(&format!("LS{ls}-Theta_1"))?.unwrap_or(f64::NAN);
            let (theta, _) = scale_distribution(
                factor,
                family.unwrap_or(Family::Deterministic),
                &[theta0, theta1],
                [f64::NAN; 2],
            )?;
            let ds_weights = records
                .get(row, &format!("LS{ls}-DamageStateWeights"))
                .map(|weights| {
                    weights
                        .split('|')
                        .map(|w| {
                            w.trim()
                                .parse::<f64>()
                                .map_err(|_| PelicunError::parse("damage state weights", weights))
                        })
                        .collect::<Result<Vec<_>, _>>()
                })
                .transpose()?;
            limit_states.push(LimitState {
                family,
                theta: [theta[0], theta[1]],
                ds_weights,
            });
        }

        Ok(Self {
            id,
            demand_type,
            demand_unit,
            offset: number("Demand-Offset")?.unwrap_or(0.0) as i64,
            directional: number("Demand-Directional")?.map_or(true, |d| d != 0.0),
            limit_states,
        })
    }
}

fn short_demand_type(name: &str) -> Result<&'static str, PelicunError> {
    edp_to_demand_type(name.trim()).ok_or_else(|| PelicunError::parse("demand type", name))
}

/// Where fragility parameters come from.
#[derive(Debug, Clone)]
pub enum FragilitySource {
    File(PathBuf),
    Records(Records),
}

impl FragilitySource {
    fn records(&self) -> Result<Cow<'_, Records>, PelicunError> {
        match self {
            FragilitySource::File(path) => Ok(Cow::Owned(Records::read_csv(path)?)),
            FragilitySource::Records(records) => Ok(Cow::Borrowed(records)),
        }
    }
}

#[derive(Debug, Default)]
pub struct DamageModel {
    pub fragilities: BTreeMap<String, Fragility>,
    /// Damaged quantities per damage state, in internal units.
    pub sample: Option<Table>,
}

impl DamageModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads fragility parameters for the given components.
    ///
    /// When a component is defined in more than one source, the earliest
    /// definition is used. Incomplete definitions are dropped with a
    /// warning.
    pub fn load_damage_model(
        &mut self,
        sources: &[FragilitySource],
        cmp_ids: &[String],
        units: &UnitRegistry,
        log: &mut Logger,
    ) -> Result<(), PelicunError> {
        log.div(false);
        log.msg("Loading damage model...");

        let wanted: BTreeSet<&str> = cmp_ids.iter().map(String::as_str).collect();
        let mut fragilities: BTreeMap<String, Fragility> = BTreeMap::new();
        let mut incomplete: BTreeSet<String> = BTreeSet::new();
        for source in sources {
            let records = source.records()?;
            for row in 0..records.len() {
                let id = records.id(row);
                if !wanted.contains(id) || fragilities.contains_key(id) || incomplete.contains(id) {
                    continue;
                }
                if records.flag(row, "Incomplete") {
                    incomplete.insert(id.to_string());
                    continue;
                }
                fragilities.insert(id.to_string(), Fragility::from_records(&records, row, units)?);
            }
        }

        if !incomplete.is_empty() {
            log.warn(&format!(
                "Damage model parameters are incomplete for the following components and \
                 they are excluded from the analysis: {:?}",
                incomplete
            ));
        }
        let missing: Vec<&str> = wanted
            .iter()
            .copied()
            .filter(|id| !fragilities.contains_key(*id) && !incomplete.contains(*id))
            .collect();
        if !missing.is_empty() {
            log.warn(&format!(
                "The damage model does not provide damage information for the following \
                 components in the asset model: {missing:?}"
            ));
        }

        log.msg(&format!(
            "Damage model parameters successfully loaded for {} components.",
            fragilities.len()
        ));
        self.fragilities = fragilities;
        Ok(())
    }

    /// Demand on a performance group, or `None` when it is not available.
    fn required_demand(
        &self,
        fragility: &Fragility,
        pg: &[String],
        demand: &Table,
        options: &Options,
        log: &mut Logger,
    ) -> Result<Option<Vec<f64>>, PelicunError> {
        let loc: i64 = pg[1]
            .parse()
            .map_err(|_| PelicunError::parse("location", pg[1].as_str()))?;
        let offset = fragility.offset + options.demand_offset(fragility.base_demand_type());
        let loc = (loc + offset).to_string();
        let dir = if fragility.directional { pg[2].as_str() } else { "0" };
        let edp = &fragility.demand_type;

        let values = if dir == "0" {
            let positions = demand.matching(&[Some(edp.as_str()), Some(loc.as_str()), None]);
            if positions.is_empty() {
                None
            } else {
                let multi = options.nondir_multi(edp)?;
                Some(
                    (0..demand.nrows())
                        .map(|row| {
                            positions
                                .iter()
                                .map(|&pos| demand.column_at(pos)[row])
                                .fold(f64::NAN, f64::max)
                                * multi
                        })
                        .collect(),
                )
            }
        } else {
            demand.column(&[edp.as_str(), loc.as_str(), dir]).map(<[f64]>::to_vec)
        };

        if values.is_none() {
            log.warn(&format!(
                "Cannot find demand data for {edp}-{loc}-{dir}. The corresponding damages \
                 of {} cannot be calculated.",
                simple_label(pg)
            ));
        }
        Ok(values)
    }

    /// Samples the damage state of every block of a performance group.
    fn evaluate_blocks(
        fragility: &Fragility,
        pg: &[String],
        blocks: usize,
        edp: &[f64],
        options: &Options,
        rng: &mut StdRng,
    ) -> Result<Vec<Vec<f64>>, PelicunError> {
        let size = edp.len();
        let base = simple_label(pg);
        let mut registry = RandomVariableRegistry::new();
        let mut ds_ids = Vec::with_capacity(fragility.limit_states.len());
        let mut ds_id = 0usize;
        for ls in &fragility.limit_states {
            ds_ids.push(ds_id as f64 + 1.0);
            ds_id += ls.ds_weights.as_ref().map_or(1, Vec::len);
        }

        for block in 1..=blocks {
            let anchor = format!("FRG-{base}-{block}-1");
            for (i, ls) in fragility.limit_states.iter().enumerate() {
                let name = format!("FRG-{base}-{block}-{}", i + 1);
                let mut rv = match ls.family {
                    None => RandomVariable::new(name, Family::Deterministic, vec![ls.theta[0]])?,
                    Some(family) => RandomVariable::new(name, family, ls.theta.to_vec())?,
                };
                // capacities within a block are perfectly correlated
                if i > 0 {
                    rv = rv.with_anchor(anchor.clone());
                }
                registry.add_rv(rv);

                if let Some(weights) = &ls.ds_weights {
                    registry.add_rv(
                        RandomVariable::new(
                            format!("LSDS-{base}-{block}-{}", i + 1),
                            Family::Multinomial,
                            weights.clone(),
                        )?
                        .with_offset(ds_ids[i]),
                    );
                }
            }
        }
        registry.generate_sample(size, options.sampling.sampling_method, rng)?;
        let sample = registry.sample();

        let mut block_ds = Vec::with_capacity(blocks);
        for block in 1..=blocks {
            let mut ds = vec![0.0; size];
            for (i, ls) in fragility.limit_states.iter().enumerate() {
                let capacity = &sample[&format!("FRG-{base}-{block}-{}", i + 1)];
                let lsds = ls
                    .ds_weights
                    .as_ref()
                    .map(|_| &sample[&format!("LSDS-{base}-{block}-{}", i + 1)]);
                for row in 0..size {
                    if capacity[row] < edp[row] {
                        ds[row] = lsds.map_or(ds_ids[i], |values| values[row]);
                    }
                }
            }
            block_ds.push(ds);
        }
        Ok(block_ds)
    }

    /// Evaluates damage for every performance group with a fragility and
    /// applies the damage process.
    pub fn calculate(
        &mut self,
        demand: &Table,
        asset: &AssetModel,
        options: &Options,
        damage_process: Option<&Map<String, Value>>,
        rng: &mut StdRng,
        log: &mut Logger,
    ) -> Result<(), PelicunError> {
        log.div(false);
        log.msg("Calculating damages...");

        let cmp_sample = asset
            .sample
            .as_ref()
            .ok_or_else(|| PelicunError::Model("no component quantity sample available".to_string()))?;
        let size = demand.nrows();
        if cmp_sample.nrows() != size {
            return Err(PelicunError::LengthMismatch {
                context: "component sample",
                expected: size,
                got: cmp_sample.nrows(),
            });
        }

        let mut sample = Table::new(&DMG_LEVELS, size);
        let mut evaluated = 0;
        for pos in 0..cmp_sample.ncols() {
            let pg = cmp_sample.label_at(pos);
            let Some(fragility) = self.fragilities.get(&pg[0]) else {
                continue;
            };
            let Some(edp) = self.required_demand(fragility, pg, demand, options, log)? else {
                continue;
            };

            let weights = asset.blocks(pg);
            let block_ds = Self::evaluate_blocks(fragility, pg, weights.len(), &edp, options, rng)?;
            let quantity = cmp_sample.column_at(pos);

            let listed: Vec<usize> = if options.list_all_ds {
                (0..=fragility.damage_state_count()).collect()
            } else {
                let realized: BTreeSet<usize> = block_ds
                    .iter()
                    .flat_map(|ds| ds.iter().map(|v| *v as usize))
                    .collect();
                realized.into_iter().collect()
            };

            for ds in listed {
                let values = (0..size)
                    .map(|row| {
                        block_ds
                            .iter()
                            .zip(&weights)
                            .filter(|(block, _)| block[row] as usize == ds)
                            .map(|(_, w)| quantity[row] * w)
                            .sum()
                    })
                    .collect();
                let mut label = pg.to_vec();
                label.push(ds.to_string());
                sample.push_column(label, values, cmp_sample.unit_at(pos).map(str::to_string))?;
            }
            evaluated += 1;
        }
        log.msg(&format!("Damage evaluated for {evaluated} performance groups."));

        if let Some(process) = damage_process {
            apply_damage_process(&mut sample, cmp_sample, process, log)?;
        }

        log.msg("Damage calculation successfully completed.");
        self.sample = Some(sample);
        Ok(())
    }

    /// The damage sample in component units.
    pub fn save_sample(&self, units: &UnitRegistry) -> Result<Table, PelicunError> {
        let sample = self
            .sample
            .as_ref()
            .ok_or_else(|| PelicunError::Model("no damage sample available".to_string()))?;
        to_user_units(sample, units)
    }

    pub fn load_sample(&mut self, mut table: Table, units: &UnitRegistry) -> Result<(), PelicunError> {
        table.set_levels(&DMG_LEVELS)?;
        to_internal_units(&mut table, units)?;
        self.sample = Some(table);
        Ok(())
    }
}

fn performance_groups(sample: &Table, cmp: Option<&str>, exclude: Option<&str>) -> Vec<Label> {
    let mut groups: Vec<Label> = Vec::new();
    for label in sample.columns() {
        if cmp.map_or(false, |cmp| label[0] != cmp) || exclude.map_or(false, |ex| label[0] == ex) {
            continue;
        }
        let pg = label[..4].to_vec();
        if !groups.contains(&pg) {
            groups.push(pg);
        }
    }
    groups
}

/// Applies damage process tasks in key order.
///
/// A task `<n>_<source>` maps a source damage state event (`DS<k>`) to a
/// target (`<cmp>_DS<j>`, `<cmp>_NA`, or `ALL_<...>`). Where the event
/// occurs, targets are moved to the given damage state or cleared.
pub fn apply_damage_process(
    sample: &mut Table,
    cmp_sample: &Table,
    process: &Map<String, Value>,
    log: &mut Logger,
) -> Result<(), PelicunError> {
    let mut keys: Vec<&String> = process.keys().collect();
    keys.sort();

    for key in keys {
        let (_, source) = key.split_once('_').ok_or_else(|| {
            PelicunError::InvalidConfig(format!("damage process task `{key}` has no source component"))
        })?;
        let Value::Object(events) = &process[key.as_str()] else {
            return Err(PelicunError::InvalidConfig(format!(
                "damage process task `{key}` must map events to targets"
            )));
        };

        for (event, targets) in events {
            let Some(source_ds) = event.strip_prefix("DS") else {
                return Err(PelicunError::InvalidConfig(format!(
                    "unsupported damage process event `{event}`; only damage state events are supported"
                )));
            };
            let source_cols = sample.matching(&[Some(source), None, None, None, Some(source_ds)]);
            if source_cols.is_empty() {
                log.warn(&format!(
                    "Source component {source} in the prescribed damage process not found \
                     among components in the damage sample. The corresponding part of the \
                     damage process is skipped."
                ));
                continue;
            }
            let mask: Vec<bool> = (0..sample.nrows())
                .map(|row| source_cols.iter().any(|&pos| sample.column_at(pos)[row] > 0.0))
                .collect();

            let targets: Vec<&str> = match targets {
                Value::String(target) => vec![target.as_str()],
                Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
                other => {
                    return Err(PelicunError::InvalidConfig(format!(
                        "invalid damage process target: {other}"
                    )))
                }
            };
            for target in targets {
                let (target_cmp, action) = target.rsplit_once('_').ok_or_else(|| {
                    PelicunError::InvalidConfig(format!("invalid damage process target `{target}`"))
                })?;
                let groups = if target_cmp == "ALL" {
                    performance_groups(sample, None, Some(source))
                } else {
                    performance_groups(sample, Some(target_cmp), None)
                };
                if groups.is_empty() {
                    log.warn(&format!(
                        "Target component {target_cmp} in the prescribed damage process not \
                         found among components in the damage sample. The corresponding part \
                         of the damage process is skipped."
                    ));
                    continue;
                }
                for pg in groups {
                    apply_to_group(sample, cmp_sample, &pg, action, &mask)?;
                }
            }
        }
    }
    Ok(())
}

fn apply_to_group(
    sample: &mut Table,
    cmp_sample: &Table,
    pg: &[String],
    action: &str,
    mask: &[bool],
) -> Result<(), PelicunError> {
    let columns = sample.matching(&[
        Some(pg[0].as_str()),
        Some(pg[1].as_str()),
        Some(pg[2].as_str()),
        Some(pg[3].as_str()),
        None,
    ]);

    if action == "NA" {
        for &pos in &columns {
            let values = sample.column_at_mut(pos);
            for (value, hit) in values.iter_mut().zip(mask) {
                if *hit {
                    *value = f64::NAN;
                }
            }
        }
        return Ok(());
    }

    let ds = action.strip_prefix("DS").ok_or_else(|| {
        PelicunError::InvalidConfig(format!("unsupported damage process action `{action}`"))
    })?;
    let quantity = cmp_sample.column(pg).ok_or_else(|| {
        PelicunError::Model(format!("no quantity sample for {}", simple_label(pg)))
    })?;
    for &pos in &columns {
        let values = sample.column_at_mut(pos);
        for (value, hit) in values.iter_mut().zip(mask) {
            if *hit {
                *value = 0.0;
            }
        }
    }

    let mut label = pg.to_vec();
    label.push(ds.to_string());
    if sample.position(&label).is_none() {
        let unit = columns.first().and_then(|&pos| sample.unit_at(pos)).map(str::to_string);
        sample.push_column(label.clone(), vec![0.0; sample.nrows()], unit)?;
    }
    if let Some(pos) = sample.position(&label) {
        let values = sample.column_at_mut(pos);
        for row in 0..values.len() {
            if mask[row] {
                values[row] = quantity[row];
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Options, SamplingMethod};
    use crate::table::label;
    use rand::SeedableRng;
    use serde_json::json;

    fn units() -> UnitRegistry {
        UnitRegistry::default_units().unwrap()
    }

    fn fragility_db() -> Records {
        let text = "\
ID,Incomplete,Demand-Directional,Demand-Offset,Demand-Type,Demand-Unit,LS1-Family,LS1-Theta_0,LS1-Theta_1,LS1-DamageStateWeights,LS2-Family,LS2-Theta_0,LS2-Theta_1
wall,0,1,0,Peak Interstory Drift Ratio,unitless,,0.01,,,,0.02,
ceiling,0,0,0,Peak Floor Acceleration,g,,1.1,,,,,
split,0,1,0,Peak Interstory Drift Ratio,unitless,,0.01,,0.5 | 0.5,,,
collapse,0,1,0,Peak Spectral Acceleration|1.13,g,,1.0,,,,,
broken,1,1,0,Peak Interstory Drift Ratio,unitless,lognormal,0.01,0.4,,,,
";
        Records::from_reader(text.as_bytes()).unwrap()
    }

    fn asset(assignments: &str, size: usize) -> AssetModel {
        let mut asset = AssetModel {
            stories: Some(1),
            ..AssetModel::default()
        };
        let records = Records::from_reader(assignments.as_bytes()).unwrap();
        asset.load_cmp_model(&records, &units(), &mut Logger::silent()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        asset
            .generate_cmp_sample(size, SamplingMethod::Lhs, &mut rng, &mut Logger::silent())
            .unwrap();
        asset
    }

    fn options() -> Options {
        let mut options = Options::new(Some(&json!({"Seed": 1}))).unwrap();
        options.list_all_ds = true;
        options
    }

    fn model_for(asset: &AssetModel, log: &mut Logger) -> DamageModel {
        let mut model = DamageModel::new();
        model
            .load_damage_model(
                &[FragilitySource::Records(fragility_db())],
                &asset.component_ids(),
                &units(),
                log,
            )
            .unwrap();
        model
    }

    #[test]
    fn fragility_rows_parse_with_units_and_subtypes() {
        let records = fragility_db();
        let collapse = Fragility::from_records(&records, 3, &units()).unwrap();
        assert_eq!(collapse.demand_type, "SA_1.13");
        assert!((collapse.limit_states[0].theta[0] - 9.80665).abs() < 1e-12);
        let split = Fragility::from_records(&records, 2, &units()).unwrap();
        assert_eq!(split.damage_state_count(), 2);
        assert_eq!(split.limit_states[0].ds_weights, Some(vec![0.5, 0.5]));
    }

    #[test]
    fn earlier_sources_win_and_incomplete_components_warn() {
        let asset = asset("ID,Units,Location,Direction,Theta_0\nwall,ea,1,1,1\nbroken,ea,1,1,1\n", 3);
        let override_db = "ID,Demand-Type,Demand-Unit,LS1-Theta_0\nwall,Peak Interstory Drift Ratio,unitless,0.05\n";
        let mut model = DamageModel::new();
        let mut log = Logger::silent();
        model
            .load_damage_model(
                &[
                    FragilitySource::Records(Records::from_reader(override_db.as_bytes()).unwrap()),
                    FragilitySource::Records(fragility_db()),
                ],
                &asset.component_ids(),
                &units(),
                &mut log,
            )
            .unwrap();
        assert_eq!(model.fragilities.len(), 1);
        assert_eq!(model.fragilities["wall"].limit_states.len(), 1);
        assert_eq!(model.fragilities["wall"].limit_states[0].theta[0], 0.05);
        assert!(log.emitted_warnings()[0].contains("broken"));
    }

    #[test]
    fn damage_states_follow_exceeded_thresholds() {
        let asset = asset("ID,Units,Location,Direction,Theta_0,Blocks\nwall,ea,1,1,2,2\n", 3);
        let mut demand = Table::new(&["type", "loc", "dir"], 3);
        demand
            .push_column(label(&["PID", "1", "1"]), vec![0.005, 0.015, 0.03], None)
            .unwrap();

        let mut log = Logger::silent();
        let mut model = model_for(&asset, &mut log);
        let mut rng = StdRng::seed_from_u64(2);
        model
            .calculate(&demand, &asset, &options(), None, &mut rng, &mut log)
            .unwrap();

        let sample = model.sample.as_ref().unwrap();
        assert_eq!(sample.ncols(), 3);
        assert_eq!(sample.column(&["wall", "1", "1", "0", "0"]).unwrap(), &[2.0, 0.0, 0.0]);
        assert_eq!(sample.column(&["wall", "1", "1", "0", "1"]).unwrap(), &[0.0, 2.0, 0.0]);
        assert_eq!(sample.column(&["wall", "1", "1", "0", "2"]).unwrap(), &[0.0, 0.0, 2.0]);
    }

    #[test]
    fn nondirectional_demand_uses_max_times_multiplier() {
        let asset = asset("ID,Units,Location,Direction,Theta_0\nceiling,ea,1,0,1\n", 1);
        let g = 9.80665;
        let mut demand = Table::new(&["type", "loc", "dir"], 1);
        demand.push_column(label(&["PFA", "0", "1"]), vec![0.5 * g], None).unwrap();
        demand.push_column(label(&["PFA", "0", "2"]), vec![1.0 * g], None).unwrap();

        let mut log = Logger::silent();
        let mut model = model_for(&asset, &mut log);
        let mut rng = StdRng::seed_from_u64(2);
        model
            .calculate(&demand, &asset, &options(), None, &mut rng, &mut log)
            .unwrap();
        let sample = model.sample.as_ref().unwrap();
        assert_eq!(sample.column(&["ceiling", "1", "0", "0", "1"]).unwrap(), &[1.0]);
    }

    #[test]
    fn missing_demand_skips_the_group_with_a_warning() {
        let asset = asset("ID,Units,Location,Direction,Theta_0\nwall,ea,1,2,1\n", 2);
        let mut demand = Table::new(&["type", "loc", "dir"], 2);
        demand.push_column(label(&["PID", "1", "1"]), vec![0.1, 0.1], None).unwrap();
        let mut log = Logger::silent();
        let mut model = model_for(&asset, &mut log);
        let mut rng = StdRng::seed_from_u64(2);
        model
            .calculate(&demand, &asset, &options(), None, &mut rng, &mut log)
            .unwrap();
        assert!(model.sample.as_ref().unwrap().is_empty());
        assert!(log.emitted_warnings().iter().any(|w| w.contains("PID-1-2")));
    }

    #[test]
    fn weighted_damage_states_split_exceedances() {
        let asset = asset("ID,Units,Location,Direction,Theta_0\nsplit,ea,1,1,1\n", 200);
        let mut demand = Table::new(&["type", "loc", "dir"], 200);
        demand.push_column(label(&["PID", "1", "1"]), vec![0.05; 200], None).unwrap();
        let mut log = Logger::silent();
        let mut model = model_for(&asset, &mut log);
        let mut rng = StdRng::seed_from_u64(9);
        model
            .calculate(&demand, &asset, &options(), None, &mut rng, &mut log)
            .unwrap();
        let sample = model.sample.as_ref().unwrap();
        let ds1: f64 = sample.column(&["split", "1", "1", "0", "1"]).unwrap().iter().sum();
        let ds2: f64 = sample.column(&["split", "1", "1", "0", "2"]).unwrap().iter().sum();
        assert_eq!(ds1 + ds2, 200.0);
        assert!(ds1 > 60.0 && ds2 > 60.0);
    }

    #[test]
    fn collapse_process_clears_other_components() {
        let asset = asset(
            "ID,Units,Location,Direction,Theta_0\nwall,ea,1,1,3\ncollapse,ea,0,1,1\n",
            2,
        );
        let g = 9.80665;
        let mut demand = Table::new(&["type", "loc", "dir"], 2);
        demand.push_column(label(&["PID", "1", "1"]), vec![0.015, 0.015], None).unwrap();
        demand.push_column(label(&["SA_1.13", "0", "1"]), vec![0.5 * g, 2.0 * g], None).unwrap();

        let process = json!({"1_collapse": {"DS1": "ALL_NA"}, "2_wall": {"DS1": "collapse_DS1"}});
        let mut log = Logger::silent();
        let mut model = model_for(&asset, &mut log);
        let mut rng = StdRng::seed_from_u64(2);
        model
            .calculate(&demand, &asset, &options(), process.as_object(), &mut rng, &mut log)
            .unwrap();

        let sample = model.sample.as_ref().unwrap();
        let wall_ds1 = sample.column(&["wall", "1", "1", "0", "1"]).unwrap();
        assert_eq!(wall_ds1[0], 3.0);
        assert!(wall_ds1[1].is_nan());
        // the second task collapses every realization with damaged walls
        let collapse_ds1 = sample.column(&["collapse", "0", "1", "0", "1"]).unwrap();
        assert_eq!(collapse_ds1, &[1.0, 1.0]);
        let collapse_ds0 = sample.column(&["collapse", "0", "1", "0", "0"]).unwrap();
        assert_eq!(collapse_ds0, &[0.0, 0.0]);
    }

    #[test]
    fn unknown_process_components_are_skipped() {
        let mut sample = Table::new(&DMG_LEVELS, 1);
        sample.push_column(label(&["wall", "1", "1", "0", "1"]), vec![1.0], None).unwrap();
        let cmp_sample = Table::new(&["cmp", "loc", "dir", "uid"], 1);
        let process = json!({"1_collapse": {"DS1": "ALL_NA"}, "2_wall": {"DS1": "ghost_DS1"}});
        let mut log = Logger::silent();
        apply_damage_process(&mut sample, &cmp_sample, process.as_object().unwrap(), &mut log).unwrap();
        assert_eq!(sample.column_at(0), &[1.0]);
        assert_eq!(log.emitted_warnings().len(), 2);

        let process = json!({"1_wall": {"LS1": "ALL_NA"}});
        assert!(apply_damage_process(&mut sample, &cmp_sample, process.as_object().unwrap(), &mut log).is_err());
    }
}
