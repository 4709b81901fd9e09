//! Prepares the models of an assessment from a DL configuration.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};

use super::presets::{damage_process, default_database, DatabaseKind};
use super::{value_f64, value_text, RunArgs};
use crate::assessment::Assessment;
use crate::base::demand_type_to_edp;
use crate::config::{get, get_bool, get_str, get_truthy, is_unspecified};
use crate::model::{estimate_rid, ConsequenceSource, DecisionVariable, FragilitySource};
use crate::table::{label, Records, Table};
use crate::PelicunError;

/// Capacity of placeholder limit states that never trigger.
const NEVER: &str = "1e10";

/// Unit of a demand type given the length unit of the model.
pub(crate) fn demand_unit(demand_type: &str, length_unit: Option<&str>) -> Result<Option<String>, PelicunError> {
    let base = demand_type.split('_').next().unwrap_or(demand_type);
    let length = || -> Result<&str, PelicunError> {
        match length_unit {
            Some("in") => Ok("inch"),
            Some(unit) => Ok(unit),
            None => Err(PelicunError::InvalidConfig(
                "no default length unit provided in the input file".to_string(),
            )),
        }
    };
    let unit = match base {
        "PFA" | "PGA" | "SA" => format!("{}ps2", length()?),
        "PFV" | "PWS" | "PGV" | "SV" => format!("{}ps", length()?),
        "PFD" | "PIH" | "SD" | "PGD" => length()?.to_string(),
        "PID" | "PRD" | "DWD" | "RDR" | "PMD" | "RID" => "unitless".to_string(),
        _ => return Ok(None),
    };
    Ok(Some(unit))
}

/// Assigns units to raw demands from their type. Columns without a demand
/// type are dropped.
pub(crate) fn add_units(raw: &Table, length_unit: Option<&str>) -> Result<Table, PelicunError> {
    let type_level = if raw.levels().len() == 4 { 1 } else { 0 };
    let keep: Vec<usize> = (0..raw.ncols())
        .filter(|&pos| raw.label_at(pos).get(type_level).map_or(false, |t| !t.is_empty()))
        .collect();
    let mut demands = raw.select(&keep);
    for pos in 0..demands.ncols() {
        let unit = demand_unit(&demands.label_at(pos)[type_level], length_unit)?;
        demands.set_unit(pos, unit);
    }
    demands.sort_columns();
    Ok(demands)
}

/// Removes realizations where a demand exceeds its collapse limit.
fn apply_collapse_limits(raw: Table, limits: &Map<String, Value>) -> Result<Table, PelicunError> {
    let type_level = if raw.levels().len() == 4 { 1 } else { 0 };
    let mut keep = vec![true; raw.nrows()];
    for (demand_type, limit) in limits {
        let limit = value_f64(limit).ok_or_else(|| PelicunError::parse("collapse limit", limit.to_string()))?;
        let mut pattern = vec![None; raw.levels().len()];
        pattern[type_level] = Some(demand_type.as_str());
        for pos in raw.matching(&pattern) {
            for (keep, value) in keep.iter_mut().zip(raw.column_at(pos)) {
                if *value > limit {
                    *keep = false;
                }
            }
        }
    }

    let removed = keep.iter().filter(|k| !**k).count();
    let demands = raw.filter_rows(&keep);
    log::info!(
        "{removed} realizations removed from the demand input because they exceed the collapse \
         limit. The remaining sample size: {}",
        demands.nrows()
    );
    Ok(demands)
}

/// Loads the raw demands, builds the demand model, and generates the
/// demand sample with inferred residual drifts and the constant `ONE`
/// demand.
pub(crate) fn demand(
    config: &Value,
    args: &RunArgs,
    pal: &mut Assessment,
    sample_size: usize,
    length_unit: Option<&str>,
    config_dir: &Path,
) -> Result<(), PelicunError> {
    let demand_path = match get_str(config, "DL/Demands/DemandFilePath").filter(|p| !p.is_empty()) {
        Some(path) => PathBuf::from(path),
        None => args
            .demand_file
            .clone()
            .unwrap_or_else(|| config_dir.join("response.csv")),
    };

    let mut raw = Table::read_csv(&demand_path)?;
    if let Some(Value::Object(limits)) = get(config, "DL/Demands/CollapseLimits") {
        if !limits.is_empty() {
            raw = apply_collapse_limits(raw, limits)?;
        }
    }
    let demands = if raw.has_units() {
        raw
    } else {
        add_units(&raw, length_unit)?
    };
    pal.load_demand_sample(demands)?;

    let calibration = match get(config, "DL/Demands/Calibration") {
        Some(calibration) if get_truthy(config, "DL/Demands/Calibration") => calibration.clone(),
        _ => json!({"ALL": {"DistributionFamily": "empirical"}}),
    };
    pal.calibrate_demand_model(&calibration)?;

    let preserve_raw_order = get_bool(config, "DL/Demands/CoupledDemands", args.coupled_edp);
    let cloning = get(config, "DL/Demands/DemandCloning").filter(|_| get_truthy(config, "DL/Demands/DemandCloning"));
    pal.generate_demand_sample(sample_size, preserve_raw_order, cloning)?;

    if get_truthy(config, "DL/Demands/InferResidualDrift")
        && get_str(config, "DL/Demands/InferResidualDrift/method") == Some("FEMA P-58")
    {
        if let Some(Value::Object(settings)) = get(config, "DL/Demands/InferResidualDrift") {
            let sample = pal
                .demand
                .sample
                .as_ref()
                .ok_or_else(|| PelicunError::Model("no demand sample available".to_string()))?;
            let mut rid = Vec::new();
            for (direction, yield_drift) in settings {
                if direction == "method" {
                    continue;
                }
                let yield_drift = value_f64(yield_drift)
                    .ok_or_else(|| PelicunError::parse("yield drift", yield_drift.to_string()))?;
                let pid = sample.select(&sample.matching(&[Some("PID"), None, Some(direction.as_str())]));
                rid.push(estimate_rid(&pid, yield_drift, &mut pal.rng)?);
            }
            for columns in rid {
                pal.demand.add_columns(columns)?;
            }
        }
    }

    let sample = pal
        .demand
        .sample
        .as_ref()
        .ok_or_else(|| PelicunError::Model("no demand sample available".to_string()))?;
    let mut one = Table::with_index(sample.levels().to_vec(), sample.index().to_vec());
    one.push_column(label(&["ONE", "0", "1"]), vec![1.0; sample.nrows()], Some("unitless".to_string()))?;
    pal.demand.add_columns(one)
}

fn joined_level_values(sample: &Table, demand_type: &str, level: usize) -> String {
    let mut values: Vec<&str> = Vec::new();
    for pos in sample.matching(&[Some(demand_type)]) {
        let value = sample.label_at(pos)[level].as_str();
        if !values.contains(&value) {
            values.push(value);
        }
    }
    values.join(",")
}

fn helper_component(marginals: &mut Records, id: &str, location: String, direction: String) {
    marginals.set_row(
        id,
        &[
            ("Units", "ea".to_string()),
            ("Location", location),
            ("Direction", direction),
            ("Theta_0", "1.0".to_string()),
        ],
    );
}

/// Builds the asset model and its quantity sample.
///
/// Component assignments are extended with the helper components that
/// collect collapse and irreparable damage. Returns the assignments, or
/// `None` when a quantity sample is loaded from a file instead.
pub(crate) fn asset(
    config: &Value,
    args: &RunArgs,
    pal: &mut Assessment,
) -> Result<Option<Records>, PelicunError> {
    if get_truthy(config, "DL/Asset/NumberOfStories") {
        let stories = get(config, "DL/Asset/NumberOfStories")
            .and_then(value_f64)
            .ok_or_else(|| PelicunError::InvalidConfig("NumberOfStories must be a number".to_string()))?;
        pal.stories = Some(stories as usize);
    }

    let demand_sample = pal
        .demand
        .sample
        .clone()
        .ok_or_else(|| PelicunError::Model("no demand sample available".to_string()))?;
    let demand_types = demand_sample.unique_level_values(0);

    if let Some(path) = get_str(config, "DL/Asset/ComponentAssignmentFile").filter(|p| !p.is_empty()) {
        let mut marginals = Records::read_csv(Path::new(path))?;

        if get_truthy(config, "DL/Damage/CollapseFragility") {
            let collapse_demand = get_str(config, "DL/Damage/CollapseFragility/DemandType").unwrap_or_default();
            // global demands evaluate collapse directly on the collapse component
            if !collapse_demand.starts_with("SA") {
                if demand_types.iter().any(|t| t == collapse_demand) {
                    helper_component(
                        &mut marginals,
                        "excessive.coll.DEM",
                        joined_level_values(&demand_sample, collapse_demand, 1),
                        joined_level_values(&demand_sample, collapse_demand, 2),
                    );
                } else {
                    super::warn(
                        args,
                        &format!("No {collapse_demand} among available demands. Collapse cannot be evaluated."),
                    );
                }
            }
        }

        helper_component(&mut marginals, "collapse", "0".to_string(), "1".to_string());

        if !is_unspecified(config, "DL/Damage/IrreparableDamage") {
            if demand_types.iter().any(|t| t == "RID") {
                helper_component(
                    &mut marginals,
                    "excessiveRID",
                    joined_level_values(&demand_sample, "RID", 1),
                    joined_level_values(&demand_sample, "RID", 2),
                );
                helper_component(&mut marginals, "irreparable", "0".to_string(), "1".to_string());
            } else {
                super::warn(
                    args,
                    "No residual interstory drift ratio among available demands. Irreparable \
                     damage cannot be evaluated.",
                );
            }
        }

        pal.load_cmp_model(&marginals)?;
        pal.generate_cmp_sample(demand_sample.nrows())?;
        return Ok(Some(marginals));
    }

    if let Some(path) = get_str(config, "DL/Asset/ComponentSampleFile").filter(|p| !p.is_empty()) {
        pal.load_cmp_sample(Table::read_csv(Path::new(path))?)?;
        return Ok(None);
    }

    Err(PelicunError::InvalidConfig(
        "the asset needs a ComponentAssignmentFile or a ComponentSampleFile".to_string(),
    ))
}

fn custom_path(path: &str, args: &RunArgs) -> PathBuf {
    match &args.custom_model_dir {
        Some(dir) => PathBuf::from(path.replace("CustomDLDataFolder", &dir.to_string_lossy())),
        None => PathBuf::from(path),
    }
}

fn default_database_path(
    kind: DatabaseKind,
    name: &str,
    args: &RunArgs,
) -> Result<Option<PathBuf>, PelicunError> {
    let Some(file) = default_database(kind, name) else {
        return Ok(None);
    };
    let dir = args.resource_dir.as_ref().ok_or_else(|| {
        PelicunError::InvalidConfig(format!(
            "the {name} database is not bundled; provide its location with a resource directory"
        ))
    })?;
    Ok(Some(dir.join(file)))
}

fn is_water_network(config: &Value) -> bool {
    !is_unspecified(config, "DL/Asset/ComponentDatabase/Water")
        || get_str(config, "DL/Asset/ComponentDatabase") == Some("Hazus Earthquake - Water")
}

fn text(config: &Value, path: &str) -> String {
    get(config, path).and_then(value_text).unwrap_or_default()
}

/// Fragility row that never triggers damage but lets damage processes
/// collect results on the component.
fn placeholder_fragility(adf: &mut Records, id: &str, demand_type: &str, unit: &str, limit_states: usize) {
    let mut fields = vec![
        ("Demand-Directional", "1".to_string()),
        ("Demand-Offset", "0".to_string()),
        ("Demand-Type", demand_type.to_string()),
        ("Demand-Unit", unit.to_string()),
        ("Incomplete", "0".to_string()),
    ];
    let columns = ["LS1-Theta_0", "LS2-Theta_0"];
    fields.extend(columns.iter().take(limit_states).map(|c| (*c, NEVER.to_string())));
    adf.set_row(id, &fields);
}

/// Fragilities of the helper components.
fn additional_fragilities(
    config: &Value,
    marginals: Option<&Records>,
    length_unit: Option<&str>,
) -> Result<Records, PelicunError> {
    let mut adf = Records {
        index_name: "ID".to_string(),
        ..Records::default()
    };

    if !is_unspecified(config, "DL/Damage/CollapseFragility") {
        let collapse_cmp = if marginals.map_or(false, |m| m.contains_id("excessive.coll.DEM")) {
            "excessive.coll.DEM"
        } else {
            "collapse"
        };

        let demand = get_str(config, "DL/Damage/CollapseFragility/DemandType").unwrap_or_default();
        let (short, subtype) = match demand.split_once('_') {
            Some((short, subtype)) => (short, Some(subtype)),
            None => (demand, None),
        };
        let name = demand_type_to_edp(short).ok_or_else(|| {
            PelicunError::InvalidConfig(format!("unknown collapse demand type: {demand}"))
        })?;
        let demand_type = match subtype {
            Some(subtype) => format!("{name}|{subtype}"),
            None => name.to_string(),
        };
        let unit = demand_unit(short, length_unit)?.unwrap_or_else(|| "unitless".to_string());

        adf.set_row(
            collapse_cmp,
            &[
                ("Demand-Directional", "1".to_string()),
                ("Demand-Offset", "0".to_string()),
                ("Demand-Type", demand_type),
                ("Demand-Unit", unit),
                ("LS1-Family", text(config, "DL/Damage/CollapseFragility/CapacityDistribution")),
                ("LS1-Theta_0", text(config, "DL/Damage/CollapseFragility/CapacityMedian")),
                ("LS1-Theta_1", text(config, "DL/Damage/CollapseFragility/Theta_1")),
                ("Incomplete", "0".to_string()),
            ],
        );

        if collapse_cmp != "collapse" {
            placeholder_fragility(&mut adf, "collapse", "One", "unitless", 1);
        }
    } else if !is_water_network(config) {
        placeholder_fragility(&mut adf, "collapse", "One", "unitless", 1);
    }

    if !is_unspecified(config, "DL/Damage/IrreparableDamage") {
        adf.set_row(
            "excessiveRID",
            &[
                ("Demand-Directional", "1".to_string()),
                ("Demand-Offset", "0".to_string()),
                ("Demand-Type", "Residual Interstory Drift Ratio".to_string()),
                ("Demand-Unit", "unitless".to_string()),
                ("LS1-Family", "lognormal".to_string()),
                ("LS1-Theta_0", text(config, "DL/Damage/IrreparableDamage/DriftCapacityMedian")),
                ("LS1-Theta_1", text(config, "DL/Damage/IrreparableDamage/DriftCapacityLogStd")),
                ("Incomplete", "0".to_string()),
            ],
        );
        placeholder_fragility(&mut adf, "irreparable", "One", "unitless", 1);
    }

    if is_water_network(config) {
        placeholder_fragility(&mut adf, "aggregate", "Peak Ground Velocity", "mps", 2);
    }

    Ok(adf)
}

/// Replaces the structural, lateral force, and nonstructural placeholders
/// of the Hazus damage process with the matching component ids.
fn substitute_hazus_components(process: &Map<String, Value>, cmp_ids: &[String]) -> Map<String, Value> {
    let mut cmp_map: Vec<(&str, &str)> = vec![("STR", ""), ("LF", ""), ("NSA", "")];
    for cmp in cmp_ids {
        for (cmp_type, id) in cmp_map.iter_mut() {
            if cmp.contains(&format!("{cmp_type}.")) {
                *id = cmp.as_str();
            }
        }
    }

    fn substitute(target: &Value, cmp_map: &[(&str, &str)]) -> Value {
        match target {
            Value::String(text) => {
                let mut text = text.clone();
                for (cmp_type, id) in cmp_map {
                    if !id.is_empty() && text.contains(cmp_type) {
                        text = text.replace(cmp_type, id);
                    }
                }
                Value::String(text)
            }
            Value::Array(items) => Value::Array(items.iter().map(|item| substitute(item, cmp_map)).collect()),
            other => other.clone(),
        }
    }

    let mut out = Map::new();
    for (source, action) in process {
        let source = cmp_map
            .iter()
            .find(|(cmp_type, id)| !id.is_empty() && source.contains(cmp_type))
            .map_or_else(|| source.clone(), |(cmp_type, id)| source.replace(cmp_type, id));
        let action = match action {
            Value::Object(events) => Value::Object(
                events
                    .iter()
                    .map(|(ds, target)| (ds.clone(), substitute(target, &cmp_map)))
                    .collect(),
            ),
            other => other.clone(),
        };
        out.insert(source, action);
    }
    out
}

fn configured_damage_process(
    config: &Value,
    args: &RunArgs,
    cmp_ids: &[String],
) -> Result<Option<Map<String, Value>>, PelicunError> {
    if !get_truthy(config, "DL/Damage/DamageProcess") {
        return Ok(None);
    }
    let method = get_str(config, "DL/Damage/DamageProcess")
        .ok_or_else(|| PelicunError::InvalidConfig("DamageProcess must be a string".to_string()))?;

    if let Some(Value::Object(process)) = damage_process(method) {
        if method == "Hazus Earthquake" {
            return Ok(Some(substitute_hazus_components(&process, cmp_ids)));
        }
        return Ok(Some(process));
    }

    match method {
        "User Defined" => {
            let path = get_str(config, "DL/Damage/DamageProcessFilePath").ok_or_else(|| {
                PelicunError::InvalidConfig("missing damage process file path".to_string())
            })?;
            match serde_json::from_str::<Value>(&fs::read_to_string(custom_path(path, args))?)? {
                Value::Object(process) => Ok(Some(process)),
                _ => Err(PelicunError::InvalidConfig(
                    "the damage process file must contain a JSON object".to_string(),
                )),
            }
        }
        "None" => Ok(None),
        other => {
            log::info!("Prescribed Damage Process not recognized: {other}");
            Ok(None)
        }
    }
}

/// Loads the fragilities, resolves the damage process, and calculates
/// damage.
pub(crate) fn damage(
    config: &Value,
    args: &RunArgs,
    pal: &mut Assessment,
    marginals: Option<&Records>,
    length_unit: Option<&str>,
) -> Result<(), PelicunError> {
    let mut sources = Vec::new();
    if let Some(path) = get_str(config, "DL/Asset/ComponentDatabasePath") {
        sources.push(FragilitySource::File(custom_path(path, args)));
    }
    if let Some(name) = get_str(config, "DL/Asset/ComponentDatabase") {
        if let Some(path) = default_database_path(DatabaseKind::Fragility, name, args)? {
            sources.push(FragilitySource::File(path));
        }
    }
    sources.push(FragilitySource::Records(additional_fragilities(
        config,
        marginals,
        length_unit,
    )?));
    pal.load_damage_model(&sources)?;

    let process = configured_damage_process(config, args, &pal.asset.component_ids())?;
    pal.calculate_damage(process.as_ref())
}

fn replacement_defaults(
    dv: DecisionVariable,
    method: &str,
    config: &Value,
    databases: &[Records],
) -> Result<Option<(&'static str, String)>, PelicunError> {
    use DecisionVariable::*;

    let defaults = match (dv, method) {
        (Cost, "FEMA P-58") => Some(("USD_2011", "0".to_string())),
        (Time, "FEMA P-58") => Some(("worker_day", "0".to_string())),
        (Carbon, "FEMA P-58") => Some(("kg", "0".to_string())),
        (Energy, "FEMA P-58") => Some(("MJ", "0".to_string())),
        (Time, "Hazus Earthquake - Buildings") => {
            let occupancy = get_str(config, "DL/Asset/OccupancyType").ok_or_else(|| {
                PelicunError::InvalidConfig("OccupancyType is required for the replacement time".to_string())
            })?;
            let id = format!("STR.{occupancy}-Time");
            let median = databases
                .iter()
                .find_map(|db| (0..db.len()).find(|&row| db.id(row) == id).and_then(|row| db.get(row, "DS5-Theta_0")))
                .ok_or_else(|| PelicunError::Model(format!("no total loss repair time defined for {id}")))?;
            Some(("day", median.to_string()))
        }
        (Cost | Time, _) => Some(("loss_ratio", "1".to_string())),
        _ => None,
    };
    Ok(defaults)
}

/// Consequences of replacing the asset, from the configuration or the
/// defaults of the assessment method.
fn replacement_consequences(
    config: &Value,
    method: &str,
    databases: &[Records],
) -> Result<Records, PelicunError> {
    let mut adf = Records {
        index_name: "ID".to_string(),
        ..Records::default()
    };

    for dv in DecisionVariable::ALL {
        let key = format!("DL/Losses/Repair/Replacement{dv}");
        let id = format!("replacement-{dv}");
        let specified = match dv {
            DecisionVariable::Energy => get(config, &key).is_some(),
            _ => !is_unspecified(config, &key),
        };

        if specified {
            let mut fields = vec![
                ("Quantity-Unit", "1 EA".to_string()),
                ("DV-Unit", text(config, &format!("{key}/Unit"))),
                ("DS1-Theta_0", text(config, &format!("{key}/Median"))),
            ];
            let family = text(config, &format!("{key}/Distribution"));
            if !family.is_empty() && !family.eq_ignore_ascii_case("nan") {
                fields.push(("DS1-Family", family));
                fields.push(("DS1-Theta_1", text(config, &format!("{key}/Theta_1"))));
            }
            adf.set_row(&id, &fields);
        } else if let Some((unit, median)) = replacement_defaults(dv, method, config, databases)? {
            adf.set_row(
                &id,
                &[
                    ("Quantity-Unit", "1 EA".to_string()),
                    ("DV-Unit", unit.to_string()),
                    ("DS1-Theta_0", median),
                ],
            );
        }
    }
    Ok(adf)
}

/// Maps every damaged component to the consequence with the same id, or to
/// the occupancy-specific archetype with Hazus methods.
fn automatic_loss_map(
    pal: &Assessment,
    databases: &[Records],
    method: &str,
    config: &Value,
) -> Result<Vec<(String, String)>, PelicunError> {
    let damage = pal
        .damage
        .sample
        .as_ref()
        .ok_or_else(|| PelicunError::Model("no damage sample available for the loss map".to_string()))?;
    let loss_cmps: BTreeSet<&str> = databases
        .iter()
        .flat_map(|db| (0..db.len()).map(move |row| db.id(row)))
        .map(|id| id.rsplit_once('-').map_or(id, |(cmp, _)| cmp))
        .collect();

    let occupancy = get_str(config, "DL/Asset/OccupancyType");
    let mut map = Vec::new();
    for cmp in damage.unique_level_values(0) {
        if cmp == "collapse" {
            continue;
        }
        let loss_cmp = match method {
            "FEMA P-58" | "Hazus Hurricane" => cmp.clone(),
            "Hazus Earthquake" | "Hazus Earthquake Transportation" => {
                let class = cmp.split('.').next().unwrap_or(cmp.as_str());
                match occupancy {
                    Some(occupancy) => format!("{class}.{occupancy}"),
                    None => class.to_string(),
                }
            }
            _ => continue,
        };
        if loss_cmps.contains(loss_cmp.as_str()) {
            map.push((format!("DMG-{cmp}"), loss_cmp));
        }
    }
    Ok(map)
}

fn user_loss_map(config: &Value, args: &RunArgs) -> Result<Vec<(String, String)>, PelicunError> {
    let path = get_str(config, "DL/Losses/Repair/MapFilePath")
        .ok_or_else(|| PelicunError::InvalidConfig("missing loss map path".to_string()))?;
    let records = Records::read_csv(&custom_path(path, args))?;
    (0..records.len())
        .map(|row| {
            let consequence = records
                .get(row, "Repair")
                .or_else(|| records.get(row, "BldgRepair"))
                .ok_or_else(|| {
                    PelicunError::InvalidConfig(format!(
                        "no repair consequence mapped to {}",
                        records.id(row)
                    ))
                })?;
            Ok((records.id(row).to_string(), consequence.to_string()))
        })
        .collect()
}

fn decision_variables(config: &Value) -> Result<Vec<DecisionVariable>, PelicunError> {
    match get(config, "DL/Losses/Repair/DecisionVariables") {
        Some(Value::Object(flags)) => flags
            .iter()
            .filter(|(_, enabled)| **enabled == Value::Bool(true))
            .map(|(dv, _)| dv.parse())
            .collect(),
        _ => Ok(vec![DecisionVariable::Cost, DecisionVariable::Time]),
    }
}

/// Loads the repair consequence model, calculates repair consequences,
/// and returns the aggregated losses. `None` when no repair assessment is
/// requested.
pub(crate) fn loss(config: &Value, args: &RunArgs, pal: &mut Assessment) -> Result<Option<Table>, PelicunError> {
    if !get_truthy(config, "DL/Losses/Repair") {
        return Ok(None);
    }

    let mut databases = Vec::new();
    if let Some(path) = get_str(config, "DL/Losses/Repair/ConsequenceDatabasePath") {
        databases.push(Records::read_csv(&custom_path(path, args))?);
    }
    if let Some(name) = get_str(config, "DL/Losses/Repair/ConsequenceDatabase") {
        if let Some(path) = default_database_path(DatabaseKind::Repair, name, args)? {
            databases.push(Records::read_csv(&path)?);
        }
    }

    let method = get_str(config, "DL/Damage/DamageProcess").unwrap_or("User Defined");
    let replacement = replacement_consequences(config, method, &databases)?;

    let mut loss_map = match get_str(config, "DL/Losses/Repair/MapApproach") {
        Some("Automatic") => automatic_loss_map(pal, &databases, method, config)?,
        Some("User Defined") => user_loss_map(config, args)?,
        other => {
            return Err(PelicunError::InvalidConfig(format!(
                "unknown loss map approach: {}",
                other.unwrap_or("none")
            )))
        }
    };
    if !loss_map.iter().any(|(driver, _)| driver == "DMG-collapse") {
        loss_map.push(("DMG-collapse".to_string(), "replacement".to_string()));
        loss_map.push(("DMG-irreparable".to_string(), "replacement".to_string()));
    }

    let dvs = decision_variables(config)?;
    let mut sources: Vec<ConsequenceSource> = databases.into_iter().map(ConsequenceSource::Records).collect();
    sources.push(ConsequenceSource::Records(replacement));

    pal.load_repair_model(&sources, loss_map, &dvs)?;
    pal.calculate_repair()?;
    Ok(Some(pal.repair.aggregate_losses()?))
}
