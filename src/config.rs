//! Analysis options and helpers for nested JSON configuration documents.

use std::collections::BTreeMap;
use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_with::{serde_as, DefaultOnNull};

use crate::PelicunError;

const DEFAULT_CONFIG: &str = include_str!("../settings/default_config.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamplingMethod {
    #[serde(rename = "LHS")]
    Lhs,
    #[serde(rename = "LHS_midpoint")]
    LhsMidpoint,
    MonteCarlo,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SamplingConfig {
    pub sampling_method: SamplingMethod,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub sample_size: usize,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub preserve_raw_order: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EconomiesOfScale {
    pub across_floors: bool,
    pub across_damage_states: bool,
}

/// Typed view of the merged analysis options.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Options {
    #[serde_as(as = "DefaultOnNull")]
    pub verbose: bool,
    pub seed: Option<u64>,
    #[serde(rename = "LogShowMS")]
    #[serde_as(as = "DefaultOnNull")]
    pub log_show_ms: bool,
    pub log_file: Option<PathBuf>,
    #[serde_as(as = "DefaultOnNull")]
    pub print_log: bool,
    pub units_file: Option<PathBuf>,
    #[serde(rename = "ListAllDamageStates")]
    #[serde_as(as = "DefaultOnNull")]
    pub list_all_ds: bool,
    pub sampling: SamplingConfig,
    pub demand_offset: BTreeMap<String, i64>,
    #[serde(rename = "NonDirectionalMultipliers")]
    pub nondir_multi_dict: BTreeMap<String, f64>,
    #[serde(rename = "RepairCostAndTimeCorrelation")]
    pub rho_cost_time: f64,
    #[serde(rename = "EconomiesOfScale")]
    pub eco_scale: EconomiesOfScale,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            verbose: false,
            seed: None,
            log_show_ms: false,
            log_file: None,
            print_log: false,
            units_file: None,
            list_all_ds: false,
            sampling: SamplingConfig {
                sampling_method: SamplingMethod::Lhs,
                sample_size: 1000,
                preserve_raw_order: false,
            },
            demand_offset: BTreeMap::from([("PFA".to_string(), -1), ("PFV".to_string(), -1)]),
            nondir_multi_dict: BTreeMap::from([("ALL".to_string(), 1.2)]),
            rho_cost_time: 0.0,
            eco_scale: EconomiesOfScale {
                across_floors: true,
                across_damage_states: true,
            },
        }
    }
}

impl Options {
    /// Merges the user options with the defaults and parses the result.
    pub fn new(user_config: Option<&Value>) -> Result<Self, PelicunError> {
        let merged = merge_default_config(user_config.cloned())?;
        let options: Options = serde_json::from_value(merged)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), PelicunError> {
        if !(-1.0..=1.0).contains(&self.rho_cost_time) {
            return Err(PelicunError::InvalidConfig(
                "RepairCostAndTimeCorrelation must be between -1 and 1".to_string(),
            ));
        }

        if self.nondir_multi_dict.values().any(|multi| !multi.is_finite()) {
            return Err(PelicunError::InvalidConfig(
                "NonDirectionalMultipliers must be finite".to_string(),
            ));
        }

        Ok(())
    }

    /// Random number generator seeded from the options, or from entropy
    /// when no seed is given.
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Non-directional multiplier for an EDP type, falling back to `ALL`.
    pub fn nondir_multi(&self, edp_type: &str) -> Result<f64, PelicunError> {
        self.nondir_multi_dict
            .get(edp_type)
            .or_else(|| self.nondir_multi_dict.get("ALL"))
            .copied()
            .ok_or_else(|| {
                PelicunError::InvalidConfig(format!(
                    "no default nondirectional multiplier found for {edp_type}; \
                     specify one under NonDirectionalMultipliers/ALL"
                ))
            })
    }

    pub fn demand_offset(&self, edp_type: &str) -> i64 {
        self.demand_offset.get(edp_type).copied().unwrap_or(0)
    }
}

pub fn load_default_options() -> Result<Value, PelicunError> {
    let defaults: Value = serde_json::from_str(DEFAULT_CONFIG)?;
    defaults
        .get("Options")
        .cloned()
        .ok_or_else(|| PelicunError::InvalidConfig("default options are missing".to_string()))
}

/// Fills `update` with the keys of `primary` that it does not define yet.
///
/// Existing values in `update` are kept. A key that maps to an object on
/// one side and to a plain value on the other is an error.
pub fn update_vals(
    update: &mut Map<String, Value>,
    primary: &Map<String, Value>,
    update_path: &str,
    primary_path: &str,
) -> Result<(), PelicunError> {
    for (key, primary_value) in primary {
        match primary_value {
            Value::Object(primary_map) => {
                let entry = update
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                match entry {
                    Value::Object(update_map) => update_vals(
                        update_map,
                        primary_map,
                        &format!("{update_path}[\"{key}\"]"),
                        &format!("{primary_path}[\"{key}\"]"),
                    )?,
                    other => {
                        return Err(PelicunError::InvalidConfig(format!(
                            "{update_path}[\"{key}\"] should map to a dictionary. The \
                             specified value is {update_path}[\"{key}\"] = {other}, but the \
                             default value is {primary_path}[\"{key}\"] = {primary_value}. \
                             Please revise {update_path}[\"{key}\"]."
                        )))
                    }
                }
            }
            _ => match update.get(key) {
                None => {
                    update.insert(key.clone(), primary_value.clone());
                }
                Some(existing @ Value::Object(_)) => {
                    return Err(PelicunError::InvalidConfig(format!(
                        "{update_path}[\"{key}\"] should not map to a dictionary. The \
                         specified value is {update_path}[\"{key}\"] = {existing}, but the \
                         default value is {primary_path}[\"{key}\"] = {primary_value}. Please \
                         revise {update_path}[\"{key}\"]."
                    )));
                }
                Some(_) => {}
            },
        }
    }
    Ok(())
}

/// Merges a user options object with the embedded default options.
pub fn merge_default_config(user_config: Option<Value>) -> Result<Value, PelicunError> {
    let mut config = match user_config {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(PelicunError::InvalidConfig(format!(
                "options must be a dictionary, got {other}"
            )))
        }
    };

    let defaults = load_default_options()?;
    if let Value::Object(defaults) = &defaults {
        update_vals(&mut config, defaults, "user_settings", "default_settings")?;
    }
    Ok(Value::Object(config))
}

fn path_keys(path: &str) -> impl Iterator<Item = &str> {
    path.trim_matches('/').split('/')
}

/// Value stored under a `/`-separated path, if any.
pub fn get<'a>(config: &'a Value, path: &str) -> Option<&'a Value> {
    path_keys(path).try_fold(config, |current, key| current.get(key))
}

/// Sets a value under a `/`-separated path, creating intermediate objects.
///
/// With `only_if_unspecified`, an existing specified value is kept.
pub fn update(config: &mut Value, path: &str, value: Value, only_if_unspecified: bool) {
    let keys: Vec<&str> = path_keys(path).collect();
    let Some((last, parents)) = keys.split_last() else {
        return;
    };

    let mut current = config;
    for key in parents {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        let entry = map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = entry;
    }

    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Value::Object(map) = current {
        if only_if_unspecified && !value_is_unspecified(map.get(*last)) {
            return;
        }
        map.insert(last.to_string(), value);
    }
}

fn value_is_unspecified(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Number(number)) => number.as_f64().map_or(false, f64::is_nan),
        Some(Value::String(text)) => text.eq_ignore_ascii_case("nan"),
        Some(Value::Object(map)) => map.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Bool(_)) => false,
    }
}

/// True when the value under `path` is missing, null, NaN, or an empty
/// object or array.
pub fn is_unspecified(config: &Value, path: &str) -> bool {
    value_is_unspecified(get(config, path))
}

/// Truthiness of a configuration value: missing, null, `false`, zero, and
/// empty strings, objects, or arrays are all false.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_f64().map_or(false, |v| v != 0.0),
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
    }
}

pub fn get_truthy(config: &Value, path: &str) -> bool {
    is_truthy(get(config, path))
}

pub fn get_bool(config: &Value, path: &str, default: bool) -> bool {
    match get(config, path) {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => crate::base::str2bool(text).unwrap_or(default),
        _ => default,
    }
}

pub fn get_str<'a>(config: &'a Value, path: &str) -> Option<&'a str> {
    get(config, path).and_then(Value::as_str)
}

/// Numeric value under `path`; numbers stored as strings are accepted.
pub fn get_f64(config: &Value, path: &str) -> Option<f64> {
    match get(config, path)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_parse_into_options() {
        let options = Options::new(None).unwrap();
        assert_eq!(options.sampling.sampling_method, SamplingMethod::Lhs);
        assert_eq!(options.sampling.sample_size, 1000);
        assert_eq!(options.demand_offset("PFA"), -1);
        assert_eq!(options.demand_offset("PID"), 0);
        assert!((options.nondir_multi("PID").unwrap() - 1.2).abs() < 1e-12);
        assert!(options.eco_scale.across_floors);
        assert!(!options.list_all_ds);
    }

    #[test]
    fn user_values_win_over_defaults() {
        let user = json!({
            "Seed": 42,
            "Sampling": {"SamplingMethod": "MonteCarlo"},
            "NonDirectionalMultipliers": {"PFA": 1.0},
            "EconomiesOfScale": {"AcrossFloors": false}
        });
        let options = Options::new(Some(&user)).unwrap();
        assert_eq!(options.seed, Some(42));
        assert_eq!(options.sampling.sampling_method, SamplingMethod::MonteCarlo);
        assert_eq!(options.sampling.sample_size, 1000);
        assert!((options.nondir_multi("PFA").unwrap() - 1.0).abs() < 1e-12);
        assert!((options.nondir_multi("PID").unwrap() - 1.2).abs() < 1e-12);
        assert!(!options.eco_scale.across_floors);
        assert!(options.eco_scale.across_damage_states);
    }

    #[test]
    fn dict_mismatch_is_rejected() {
        let user = json!({"Sampling": "LHS"});
        let err = merge_default_config(Some(user)).unwrap_err();
        assert!(err.to_string().contains("should map to a dictionary"));

        let user = json!({"Verbose": {"nested": true}});
        let err = merge_default_config(Some(user)).unwrap_err();
        assert!(err.to_string().contains("should not map to a dictionary"));
    }

    #[test]
    fn out_of_range_correlation_fails_validation() {
        let user = json!({"RepairCostAndTimeCorrelation": 1.5});
        assert!(Options::new(Some(&user)).is_err());
    }

    #[test]
    fn path_helpers() {
        let mut config = json!({"DL": {"Outputs": {"Format": {"JSON": true}, "Empty": {}}}});
        assert_eq!(get(&config, "/DL/Outputs/Format/JSON"), Some(&json!(true)));
        assert!(get(&config, "DL/Outputs/Format/XML").is_none());
        assert!(is_unspecified(&config, "DL/Outputs/Empty"));
        assert!(is_unspecified(&config, "DL/Missing"));
        assert!(!is_unspecified(&config, "DL/Outputs/Format"));

        update(&mut config, "x/y/z", json!(1), false);
        assert_eq!(get(&config, "x/y/z"), Some(&json!(1)));
        update(&mut config, "x/y/z", json!(2), true);
        assert_eq!(get(&config, "x/y/z"), Some(&json!(1)));
        update(&mut config, "x/y/z", json!(2), false);
        assert_eq!(get(&config, "x/y/z"), Some(&json!(2)));
        update(&mut config, "DL/Outputs/Empty", json!("filled"), true);
        assert_eq!(get_str(&config, "DL/Outputs/Empty"), Some("filled"));
    }

    #[test]
    fn truthiness_follows_config_conventions() {
        let config = json!({"a": {}, "b": {"k": 1}, "c": "", "d": 0, "e": "3"});
        assert!(!get_truthy(&config, "a"));
        assert!(get_truthy(&config, "b"));
        assert!(!get_truthy(&config, "c"));
        assert!(!get_truthy(&config, "d"));
        assert!(!get_truthy(&config, "missing"));
        assert_eq!(get_f64(&config, "e"), Some(3.0));
    }
}
