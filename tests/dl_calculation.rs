use std::fs;
use std::path::Path;

use serde_json::{json, Value};

use pelicun::dl_calculation::presets::OUTPUT_FILES;
use pelicun::dl_calculation::{run_pelicun, RunArgs, RunOutcome, RunSummary};

const FRAGILITIES: &str = "\
ID,Demand-Directional,Demand-Offset,Demand-Type,Demand-Unit,Incomplete,LS1-Family,LS1-Theta_0,LS1-Theta_1,LS2-Family,LS2-Theta_0,LS2-Theta_1
B.10.31.001,1,0,Peak Interstory Drift Ratio,unitless,0,lognormal,0.01,0.4,lognormal,0.02,0.4
C.20.11.001a,1,0,Peak Floor Acceleration,g,0,lognormal,0.5,0.5,,,
";

const CONSEQUENCES: &str = "\
ID,Incomplete,Quantity-Unit,DV-Unit,DS1-Family,DS1-Theta_0,DS1-Theta_1,DS2-Family,DS2-Theta_0,DS2-Theta_1
B.10.31.001-Cost,0,1 EA,USD_2011,lognormal,\"20000,15000|1,10\",0.3,lognormal,\"40000,30000|1,10\",0.3
B.10.31.001-Time,0,1 EA,worker_day,lognormal,\"10,8|1,10\",0.3,lognormal,\"20,15|1,10\",0.3
C.20.11.001a-Cost,0,1 EA,USD_2011,normal,500,0.2,,,
C.20.11.001a-Time,0,1 EA,worker_day,normal,1,0.2,,,
";

const COMPONENTS: &str = "\
ID,Units,Location,Direction,Theta_0,Theta_1,Family,Blocks,Comment
B.10.31.001,ea,1--2,\"1,2\",2,,,,walls
C.20.11.001a,ea,all,1,1,,,,stairs
";

/// Raw demands without a units row; units follow from the length unit.
fn demands() -> String {
    let mut text = String::from(
        ",1-PID-1-1,1-PID-1-2,1-PID-2-1,1-PID-2-2,1-PFA-0-1,1-PFA-1-1,1-PFA-2-1,1-SA_1.13-0-1\n",
    );
    for row in 0..10 {
        let i = row as f64;
        text.push_str(&format!(
            "{row},{},{},{},{},{},{},{},{}\n",
            0.004 + 0.002 * i,
            0.005 + 0.0015 * i,
            0.003 + 0.002 * i,
            0.004 + 0.001 * i,
            150.0 + 20.0 * i,
            200.0 + 25.0 * i,
            250.0 + 30.0 * i,
            150.0 + 35.0 * i,
        ));
    }
    text
}

fn write_inputs(dir: &Path) -> RunArgs {
    let path = |name: &str| dir.join(name).to_string_lossy().into_owned();
    fs::write(dir.join("response.csv"), demands()).unwrap();
    fs::write(dir.join("CMP_QNT.csv"), COMPONENTS).unwrap();
    fs::write(dir.join("fragility.csv"), FRAGILITIES).unwrap();
    fs::write(dir.join("consequence_repair.csv"), CONSEQUENCES).unwrap();

    let config = json!({
        "GeneralInformation": {"units": {"length": "in"}},
        "DL": {
            "Options": {"Seed": 42},
            "Demands": {
                "DemandFilePath": path("response.csv"),
                "SampleSize": "200",
                "Calibration": {"ALL": {"DistributionFamily": "lognormal"}},
                "InferResidualDrift": {"method": "FEMA P-58", "1": 0.005, "2": 0.005}
            },
            "Asset": {
                "NumberOfStories": 2,
                "ComponentAssignmentFile": path("CMP_QNT.csv"),
                "ComponentDatabasePath": path("fragility.csv")
            },
            "Damage": {
                "DamageProcess": "FEMA P-58",
                "CollapseFragility": {
                    "DemandType": "SA_1.13",
                    "CapacityDistribution": "lognormal",
                    "CapacityMedian": 300.0,
                    "Theta_1": 0.5
                },
                "IrreparableDamage": {"DriftCapacityMedian": 0.004, "DriftCapacityLogStd": 0.3}
            },
            "Losses": {
                "Repair": {
                    "ConsequenceDatabasePath": path("consequence_repair.csv"),
                    "MapApproach": "Automatic",
                    "DecisionVariables": {"Cost": true, "Time": true, "Carbon": false},
                    "ReplacementCost": {"Unit": "USD_2011", "Median": 1000000},
                    "ReplacementTime": {"Unit": "worker_day", "Median": 5000}
                }
            }
        }
    });
    let config_path = dir.join("config.json");
    fs::write(&config_path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

    let mut args = RunArgs::new(config_path);
    args.output_path = Some(dir.join("results"));
    args
}

fn completed(outcome: RunOutcome) -> RunSummary {
    match outcome {
        RunOutcome::Completed(summary) => summary,
        RunOutcome::Terminated(reason) => panic!("calculation terminated: {reason}"),
    }
}

#[test]
fn full_assessment_writes_every_output() {
    let dir = tempfile::tempdir().unwrap();
    let args = write_inputs(dir.path());
    let summary = completed(run_pelicun(&args).unwrap());
    let results = dir.path().join("results");

    assert_eq!(summary.sample_size, 200);
    assert_eq!(summary.output_dir, results);
    for name in OUTPUT_FILES {
        assert!(results.join(name).exists(), "missing {name}");
        let json_name = format!("{}json", &name[..name.len() - 3]);
        assert!(results.join(&json_name).exists(), "missing {json_name}");
    }
    assert_eq!(summary.files.len(), 2 * OUTPUT_FILES.len());
    assert!(results.join("pelicun_log.txt").exists());

    let mut reader = csv::Reader::from_path(results.join("DL_summary.csv")).unwrap();
    let header: Vec<String> = reader.headers().unwrap().iter().map(str::to_string).collect();
    assert_eq!(
        header,
        vec![
            "#",
            "repair_cost",
            "repair_time-parallel",
            "repair_time-sequential",
            "collapse",
            "irreparable"
        ]
    );
    let rows: Vec<Vec<f64>> = reader
        .records()
        .map(|record| {
            record
                .unwrap()
                .iter()
                .skip(1)
                .map(|cell| cell.parse::<f64>().unwrap())
                .collect()
        })
        .collect();
    assert_eq!(rows.len(), 200);
    for row in &rows {
        assert!(row[0] >= 0.0 && row[0] <= 1_000_000.0);
        if row[3] == 1.0 {
            assert_eq!(row[0], 1_000_000.0);
            assert_eq!(row[2], 5000.0);
        }
    }
    assert!(rows.iter().any(|row| row[3] == 1.0));
    assert!(rows.iter().any(|row| row[3] == 0.0));
}

#[test]
fn json_outputs_carry_units_and_inferred_drifts() {
    let dir = tempfile::tempdir().unwrap();
    let args = write_inputs(dir.path());
    completed(run_pelicun(&args).unwrap());

    let text = fs::read_to_string(dir.path().join("results").join("DEM_sample.json")).unwrap();
    let demands: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(demands["Units"]["PFA-1-1"], json!("inchps2"));
    assert_eq!(demands["Units"]["RID-2-1"], json!("unitless"));
    assert_eq!(demands["PID"]["1"]["1"].as_array().unwrap().len(), 200);
    assert!(demands["ONE"]["0"]["1"]
        .as_array()
        .unwrap()
        .iter()
        .all(|value| *value == json!(1.0)));

    let text = fs::read_to_string(dir.path().join("results").join("DL_summary.json")).unwrap();
    let summary: Value = serde_json::from_str(&text).unwrap();
    assert!(summary.get("Units").is_none());
    assert_eq!(summary["collapse"].as_array().unwrap().len(), 200);
}

#[test]
fn csv_only_output_format() {
    let dir = tempfile::tempdir().unwrap();
    let mut args = write_inputs(dir.path());
    args.output_format = Some("csv".to_string());
    let summary = completed(run_pelicun(&args).unwrap());

    let results = dir.path().join("results");
    assert!(results.join("DMG_grp.zip").exists());
    assert!(!results.join("DMG_grp.json").exists());
    assert_eq!(summary.files.len(), OUTPUT_FILES.len());
}

#[test]
fn missing_damage_and_loss_section_terminates() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    fs::write(&config_path, r#"{"GeneralInformation": {"units": {"length": "in"}}}"#).unwrap();

    let outcome = run_pelicun(&RunArgs::new(&config_path)).unwrap();
    assert_eq!(outcome, RunOutcome::Terminated("Terminating analysis.".to_string()));
}

#[test]
fn missing_sample_size_terminates() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    fs::write(&config_path, r#"{"DL": {"Demands": {}, "Asset": {}}}"#).unwrap();

    match run_pelicun(&RunArgs::new(&config_path)).unwrap() {
        RunOutcome::Terminated(reason) => assert!(reason.starts_with("Sample size not provided")),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn unreadable_configuration_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let args = RunArgs::new(dir.path().join("missing.json"));
    assert!(run_pelicun(&args).is_err());
}
