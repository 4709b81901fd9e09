//! Runs a complete damage and loss calculation from a JSON configuration
//! file, as used by the `dl_calculation` command.

mod outputs;
pub mod presets;
mod setup;

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};

use crate::assessment::Assessment;
use crate::config::{get, get_truthy, is_unspecified, update};
use crate::PelicunError;
use outputs::{remove_existing_files, OutputSettings, OutputWriter};

/// Inputs of a calculation, mirroring the command line.
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub config_path: PathBuf,
    /// Demand file used when the configuration names none.
    pub demand_file: Option<PathBuf>,
    /// Directory for results; defaults to the directory of the
    /// configuration file.
    pub output_path: Option<PathBuf>,
    pub coupled_edp: bool,
    /// Sample size used when the configuration gives none.
    pub realizations: Option<usize>,
    /// Writes every output when the configuration requests none;
    /// otherwise the lean regional set.
    pub detailed_results: bool,
    pub output_format: Option<String>,
    pub custom_model_dir: Option<PathBuf>,
    pub resource_dir: Option<PathBuf>,
    pub auto_script: Option<PathBuf>,
    pub color_warnings: bool,
}

impl RunArgs {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            demand_file: None,
            output_path: None,
            coupled_edp: false,
            realizations: None,
            detailed_results: true,
            output_format: None,
            custom_model_dir: None,
            resource_dir: None,
            auto_script: None,
            color_warnings: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub output_dir: PathBuf,
    pub sample_size: usize,
    /// Result files left in the output directory.
    pub files: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(RunSummary),
    /// The configuration lacks what the calculation needs.
    Terminated(String),
}

pub(crate) fn value_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn warn(args: &RunArgs, msg: &str) {
    if args.color_warnings {
        log::warn!("\x1b[31m{msg}\x1b[0m");
    } else {
        log::warn!("{msg}");
    }
}

fn terminate(reason: &str) -> RunOutcome {
    log::info!("{reason}");
    RunOutcome::Terminated(reason.to_string())
}

fn sample_size(config: &Value, args: &RunArgs) -> Result<Option<usize>, PelicunError> {
    for path in ["Options/Sampling/SampleSize", "DL/Demands/SampleSize"] {
        if let Some(value) = get(config, path).filter(|_| get_truthy(config, path)) {
            let size = value_f64(value)
                .filter(|size| *size >= 1.0)
                .ok_or_else(|| PelicunError::parse("sample size", value.to_string()))?;
            return Ok(Some(size as usize));
        }
    }
    Ok(args.realizations)
}

/// Fills in output defaults and folds legacy keys into their current
/// names.
fn prepare_config(config: &mut Value, args: &RunArgs, output_dir: &Path) {
    let outputs = if args.detailed_results {
        presets::full_output_config()
    } else {
        presets::regional_output_config()
    };
    update(config, "DL/Outputs", outputs, true);
    update(config, "DL/Outputs/Format", json!({"CSV": true, "JSON": false}), true);
    if let Some(format) = &args.output_format {
        let format = format.to_lowercase();
        update(
            config,
            "DL/Outputs/Format",
            json!({"CSV": format.contains("csv"), "JSON": format.contains("json")}),
            false,
        );
    }
    update(config, "DL/Outputs/Settings", presets::pbe_settings(), true);

    let log_file = output_dir.join("pelicun_log.txt");
    update(
        config,
        "DL/Options/LogFile",
        Value::String(log_file.to_string_lossy().into_owned()),
        false,
    );
    update(config, "DL/Options/Verbose", Value::Bool(true), false);
    update(config, "DL/Options/ListAllDamageStates", Value::Bool(true), true);

    for (legacy, current) in [
        ("DL/Losses/BldgRepair", "DL/Losses/Repair"),
        ("DL/Outputs/Loss/BldgRepair", "DL/Outputs/Loss/Repair"),
    ] {
        if get_truthy(config, legacy) {
            if let Some(value) = get(config, legacy).cloned() {
                update(config, current, value, false);
            }
        }
    }
}

/// Runs the damage and loss calculation described by `args`.
///
/// Configurations that lack a required section end with
/// [`RunOutcome::Terminated`]; invalid inputs are errors.
pub fn run_pelicun(args: &RunArgs) -> Result<RunOutcome, PelicunError> {
    log::info!("First line of DL_calculation");

    let config_path = args.config_path.canonicalize().map_err(|err| {
        PelicunError::Io(std::io::Error::new(
            err.kind(),
            format!("{}: {err}", args.config_path.display()),
        ))
    })?;
    let config_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let output_dir = args.output_path.clone().unwrap_or_else(|| config_dir.clone());
    fs::create_dir_all(&output_dir)?;
    remove_existing_files(&output_dir)?;

    let mut config: Value = serde_json::from_str(&fs::read_to_string(&config_path)?)?;

    if is_unspecified(&config, "DL") {
        log::info!("Damage and Loss configuration missing from config file. ");
        if args.auto_script.is_some() {
            warn(args, "Auto-population scripts cannot be executed by this tool.");
        }
        return Ok(terminate("Terminating analysis."));
    }

    let Some(sample_size) = sample_size(&config, args)? else {
        return Ok(terminate("Sample size not provided in config file. Terminating analysis."));
    };

    prepare_config(&mut config, args, &output_dir);

    if is_unspecified(&config, "DL/Asset") {
        return Ok(terminate("Asset configuration missing. Terminating analysis."));
    }
    if is_unspecified(&config, "DL/Demands") {
        return Ok(terminate("Demand configuration missing. Terminating analysis."));
    }

    let length_unit = get(&config, "GeneralInformation/units/length")
        .and_then(Value::as_str)
        .map(str::to_string);

    let mut pal = Assessment::new(get(&config, "DL/Options"))?;
    let mut writer = OutputWriter::new(&output_dir, OutputSettings::from_config(&config));

    setup::demand(
        &config,
        args,
        &mut pal,
        sample_size,
        length_unit.as_deref(),
        &config_dir,
    )?;
    let demand_sample = pal.demand.save_sample(&pal.units)?;
    writer.save_demand(&demand_sample)?;

    let marginals = setup::asset(&config, args, &mut pal)?;
    if get_truthy(&config, "DL/Outputs/Asset") {
        writer.save_asset(pal.asset.save_cmp_sample(&pal.units)?)?;
    }

    let damage_sample = if is_unspecified(&config, "DL/Damage") {
        None
    } else {
        setup::damage(&config, args, &mut pal, marginals.as_ref(), length_unit.as_deref())?;
        let sample = pal.damage.save_sample(&pal.units)?;
        Some(writer.save_damage(sample)?)
    };

    let aggregated = if is_unspecified(&config, "DL/Losses") {
        None
    } else {
        let aggregated = setup::loss(&config, args, &mut pal)?;
        if let Some(aggregated) = &aggregated {
            writer.save_repair(pal.repair.save_sample()?, aggregated)?;
        }
        aggregated
    };

    writer.save_summary(aggregated.as_ref(), damage_sample.as_ref(), demand_sample.nrows())?;
    let files = writer.finish()?;
    pal.log.msg("Results saved");

    Ok(RunOutcome::Completed(RunSummary {
        output_dir,
        sample_size,
        files,
        warnings: pal.log.emitted_warnings(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_size_prefers_the_configuration() {
        let mut args = RunArgs::new("config.json");
        args.realizations = Some(7);
        let config = json!({"Options": {"Sampling": {"SampleSize": 100}}, "DL": {"Demands": {"SampleSize": "50"}}});
        assert_eq!(sample_size(&config, &args).unwrap(), Some(100));
        let config = json!({"DL": {"Demands": {"SampleSize": "50"}}});
        assert_eq!(sample_size(&config, &args).unwrap(), Some(50));
        assert_eq!(sample_size(&json!({}), &args).unwrap(), Some(7));
        assert!(sample_size(&json!({"DL": {"Demands": {"SampleSize": "many"}}}), &args).is_err());
    }

    #[test]
    fn prepared_config_has_outputs_and_current_keys() {
        let mut args = RunArgs::new("config.json");
        args.output_format = Some("JSON".to_string());
        let mut config = json!({"DL": {
            "Losses": {"BldgRepair": {"MapApproach": "Automatic"}},
            "Options": {"ListAllDamageStates": false}
        }});
        prepare_config(&mut config, &args, Path::new("out"));

        assert_eq!(config["DL"]["Outputs"]["Format"], json!({"CSV": false, "JSON": true}));
        assert_eq!(config["DL"]["Outputs"]["Damage"]["GroupedSample"], json!(true));
        assert_eq!(config["DL"]["Outputs"]["Settings"]["CondenseDS"], json!(false));
        assert_eq!(config["DL"]["Losses"]["Repair"]["MapApproach"], json!("Automatic"));
        assert_eq!(config["DL"]["Options"]["ListAllDamageStates"], json!(false));
        assert_eq!(config["DL"]["Options"]["Verbose"], json!(true));
    }

    #[test]
    fn lean_outputs_without_detailed_results() {
        let mut args = RunArgs::new("config.json");
        args.detailed_results = false;
        let mut config = json!({"DL": {}});
        prepare_config(&mut config, &args, Path::new("out"));
        assert_eq!(config["DL"]["Outputs"]["Format"]["CSV"], json!(false));
        assert_eq!(config["DL"]["Outputs"]["Settings"]["CondenseDS"], json!(true));
    }

    #[test]
    fn config_values_as_text() {
        assert_eq!(value_text(&json!(0.5)).as_deref(), Some("0.5"));
        assert_eq!(value_text(&json!("lognormal")).as_deref(), Some("lognormal"));
        assert_eq!(value_text(&Value::Null), None);
        assert_eq!(value_f64(&json!("1.5")), Some(1.5));
    }
}
