//! Result files of a damage and loss calculation.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::presets::OUTPUT_FILES;
use crate::config::{get, get_bool, is_truthy};
use crate::stats::describe;
use crate::table::{simple_label, Agg, Table};
use crate::PelicunError;

/// Output switches read from `DL/Outputs`.
#[derive(Debug, Clone, Default)]
pub(crate) struct OutputSettings {
    pub demand: BTreeSet<String>,
    pub asset: BTreeSet<String>,
    pub damage: BTreeSet<String>,
    pub repair: BTreeSet<String>,
    pub csv: bool,
    pub json: bool,
    pub condense_ds: bool,
    pub simple_index_json: bool,
    pub aggregate_colocated: bool,
}

fn requested(config: &Value, path: &str) -> BTreeSet<String> {
    match get(config, path) {
        Some(Value::Object(flags)) => flags
            .iter()
            .filter(|(_, flag)| is_truthy(Some(flag)))
            .map(|(name, _)| name.clone())
            .collect(),
        _ => BTreeSet::new(),
    }
}

impl OutputSettings {
    pub fn from_config(config: &Value) -> Self {
        Self {
            demand: requested(config, "DL/Outputs/Demand"),
            asset: requested(config, "DL/Outputs/Asset"),
            damage: requested(config, "DL/Outputs/Damage"),
            repair: requested(config, "DL/Outputs/Loss/Repair"),
            csv: get_bool(config, "DL/Outputs/Format/CSV", true),
            json: get_bool(config, "DL/Outputs/Format/JSON", false),
            condense_ds: get_bool(config, "DL/Outputs/Settings/CondenseDS", false),
            simple_index_json: get_bool(config, "DL/Outputs/Settings/SimpleIndexInJSON", false),
            aggregate_colocated: get_bool(
                config,
                "DL/Outputs/Settings/AggregateColocatedComponentResults",
                true,
            ),
        }
    }
}

#[derive(Debug)]
struct Written {
    name: &'static str,
    table: Table,
    with_units: bool,
}

/// Writes result tables and keeps them for the JSON twins.
#[derive(Debug)]
pub(crate) struct OutputWriter {
    dir: PathBuf,
    settings: OutputSettings,
    written: Vec<Written>,
}

/// Removes results left over from an earlier run in `dir`.
pub(crate) fn remove_existing_files(dir: &Path) -> Result<(), PelicunError> {
    for name in OUTPUT_FILES {
        for file in [name.to_string(), json_name(name)] {
            let path = dir.join(file);
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
    }
    Ok(())
}

fn json_name(name: &str) -> String {
    format!("{}json", &name[..name.len() - 3])
}

fn index_label(table: &Table) -> String {
    table.levels().join("-")
}

impl OutputWriter {
    pub fn new(dir: &Path, settings: OutputSettings) -> Self {
        Self {
            dir: dir.to_path_buf(),
            settings,
            written: Vec::new(),
        }
    }

    fn write(
        &mut self,
        name: &'static str,
        table: Table,
        index_label: &str,
        with_units: bool,
    ) -> Result<(), PelicunError> {
        let path = self.dir.join(name);
        match name.strip_suffix(".zip") {
            Some(stem) => table.write_zip(&path, &format!("{stem}.csv"), index_label, with_units)?,
            None => table.write_csv(&path, index_label, with_units)?,
        }
        self.written.push(Written {
            name,
            table,
            with_units,
        });
        Ok(())
    }

    fn write_sample_and_stats(
        &mut self,
        sample: &Table,
        requests: &BTreeSet<String>,
        sample_name: &'static str,
        stats_name: &'static str,
        (sample_key, stats_key): (&str, &str),
    ) -> Result<(), PelicunError> {
        let label = index_label(sample);
        if requests.contains(sample_key) {
            self.write(sample_name, sample.clone(), &label, true)?;
        }
        if requests.contains(stats_key) {
            self.write(stats_name, describe(sample), &label, true)?;
        }
        Ok(())
    }

    pub fn save_demand(&mut self, sample: &Table) -> Result<(), PelicunError> {
        let requests = self.settings.demand.clone();
        self.write_sample_and_stats(
            sample,
            &requests,
            "DEM_sample.zip",
            "DEM_stats.csv",
            ("Sample", "Statistics"),
        )
    }

    pub fn save_asset(&mut self, sample: Table) -> Result<(), PelicunError> {
        let sample = if self.settings.aggregate_colocated {
            sample.group_by(&[0, 1, 2], Agg::Sum)
        } else {
            sample
        };
        let requests = self.settings.asset.clone();
        self.write_sample_and_stats(
            &sample,
            &requests,
            "CMP_sample.zip",
            "CMP_stats.csv",
            ("Sample", "Statistics"),
        )
    }

    /// Writes the damage outputs and returns the damage sample with
    /// colocated components aggregated when requested.
    pub fn save_damage(&mut self, sample: Table) -> Result<Table, PelicunError> {
        let aggregate = self.settings.aggregate_colocated;
        let sample = if aggregate {
            sample.group_by(&[0, 1, 2, 4], Agg::Sum)
        } else {
            sample
        };
        let requests = self.settings.damage.clone();
        self.write_sample_and_stats(
            &sample,
            &requests,
            "DMG_sample.zip",
            "DMG_stats.csv",
            ("Sample", "Statistics"),
        )?;

        if requests.contains("GroupedSample") || requests.contains("GroupedStatistics") {
            let ds_level = if aggregate { 3 } else { 4 };
            let grouped = sample.group_by(&[0, 1, ds_level], Agg::Sum);
            let grouped = if self.settings.condense_ds {
                let mut condensed = grouped;
                for pos in 0..condensed.ncols() {
                    let ds: f64 = condensed.label_at(pos)[2].parse().unwrap_or(0.0);
                    for value in condensed.column_at_mut(pos) {
                        *value = if *value > 0.0 { ds } else { *value * ds };
                    }
                }
                condensed.group_by(&[0, 1], Agg::Max)
            } else {
                grouped.group_by(&[0], Agg::Sum)
            };
            self.write_sample_and_stats(
                &grouped,
                &requests,
                "DMG_grp.zip",
                "DMG_grp_stats.csv",
                ("GroupedSample", "GroupedStatistics"),
            )?;
        }
        Ok(sample)
    }

    pub fn save_repair(&mut self, sample: Table, aggregated: &Table) -> Result<(), PelicunError> {
        let sample = if self.settings.aggregate_colocated {
            sample.group_by(&[0, 1, 2, 3, 4, 5], Agg::Sum)
        } else {
            sample
        };
        let requests = self.settings.repair.clone();
        self.write_sample_and_stats(
            &sample,
            &requests,
            "DV_repair_sample.zip",
            "DV_repair_stats.csv",
            ("Sample", "Statistics"),
        )?;

        if requests.contains("GroupedSample") || requests.contains("GroupedStatistics") {
            let grouped = sample.group_by(&[0, 1, 2], Agg::Sum);
            self.write_sample_and_stats(
                &grouped,
                &requests,
                "DV_repair_grp.zip",
                "DV_repair_grp_stats.csv",
                ("GroupedSample", "GroupedStatistics"),
            )?;
        }

        let label = index_label(aggregated);
        if requests.contains("AggregateSample") {
            self.write("DV_repair_agg.zip", aggregated.clone(), &label, false)?;
        }
        if requests.contains("AggregateStatistics") {
            self.write("DV_repair_agg_stats.csv", describe(aggregated), &label, false)?;
        }
        Ok(())
    }

    /// Writes the realization-level summary of aggregate losses, collapse,
    /// and irreparable damage, and its statistics.
    pub fn save_summary(
        &mut self,
        aggregated: Option<&Table>,
        damage: Option<&Table>,
        sample_size: usize,
    ) -> Result<(), PelicunError> {
        let index = aggregated
            .or(damage)
            .map(|table| table.index().to_vec())
            .unwrap_or_else(|| (0..sample_size).map(|row| row.to_string()).collect());
        let nrows = index.len();
        let mut summary = Table::with_index(vec![String::new()], index);

        if let Some(aggregated) = aggregated {
            for pos in 0..aggregated.ncols() {
                summary.push_column(
                    vec![simple_label(aggregated.label_at(pos))],
                    aggregated.column_at(pos).to_vec(),
                    aggregated.unit_at(pos).map(str::to_string),
                )?;
            }
        }

        let by_ds = damage.map(|damage| {
            let ds_level = damage
                .level_position("ds")
                .unwrap_or_else(|| damage.levels().len().saturating_sub(1));
            damage.group_by(&[0, ds_level], Agg::Sum)
        });
        for name in ["collapse", "irreparable"] {
            let values = by_ds
                .as_ref()
                .and_then(|table| table.column(&[name, "1"]))
                .map(|values| values.iter().map(|v| if v.is_nan() { 0.0 } else { *v }).collect())
                .unwrap_or_else(|| vec![0.0; nrows]);
            summary.push_column(vec![name.to_string()], values, None)?;
        }

        let stats = describe(&summary);
        self.write("DL_summary.csv", summary, "#", false)?;
        self.write("DL_summary_stats.csv", stats, "", false)
    }

    fn json_twin(&self, written: &Written) -> Value {
        let simple = written.table.to_simple_header();
        let table = if self.settings.simple_index_json {
            simple
        } else {
            simple.to_multi_header()
        };
        let mut dict = table.to_json_dict();
        if written.with_units {
            if let Value::Object(map) = &mut dict {
                map.insert("Units".to_string(), written.table.units_json());
            }
        }
        dict
    }

    /// Writes the JSON twins, drops the CSV files that were not requested,
    /// and returns the paths of the remaining outputs.
    pub fn finish(self) -> Result<Vec<PathBuf>, PelicunError> {
        let mut files = Vec::new();
        for written in &self.written {
            if self.settings.json {
                let path = self.dir.join(json_name(written.name));
                fs::write(&path, serde_json::to_string_pretty(&self.json_twin(written))?)?;
                files.push(path);
            }

            let path = self.dir.join(written.name);
            if self.settings.csv || written.name.starts_with("DL_summary") {
                files.push(path);
            } else {
                fs::remove_file(path)?;
            }
        }
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::label;
    use serde_json::json;

    fn damage_sample() -> Table {
        let mut sample = Table::new(&["cmp", "loc", "dir", "uid", "ds"], 3);
        sample
            .push_column(label(&["wall", "1", "1", "0", "0"]), vec![2.0, 0.0, 1.0], Some("ea".into()))
            .unwrap();
        sample
            .push_column(label(&["wall", "1", "1", "0", "1"]), vec![0.0, 2.0, 1.0], Some("ea".into()))
            .unwrap();
        sample
            .push_column(label(&["wall", "1", "2", "0", "1"]), vec![0.0, 1.0, 0.0], Some("ea".into()))
            .unwrap();
        sample
            .push_column(label(&["collapse", "0", "1", "0", "0"]), vec![1.0, 1.0, 0.0], Some("ea".into()))
            .unwrap();
        sample
            .push_column(label(&["collapse", "0", "1", "0", "1"]), vec![0.0, 0.0, 1.0], Some("ea".into()))
            .unwrap();
        sample
    }

    fn settings(config: Value) -> OutputSettings {
        OutputSettings::from_config(&config)
    }

    #[test]
    fn settings_follow_the_configuration() {
        let settings = settings(json!({"DL": {"Outputs": {
            "Demand": {"Sample": true, "Statistics": false},
            "Format": {"CSV": false, "JSON": true},
            "Settings": {"CondenseDS": true}
        }}}));
        assert!(settings.demand.contains("Sample"));
        assert!(!settings.demand.contains("Statistics"));
        assert!(!settings.csv && settings.json);
        assert!(settings.condense_ds);
        assert!(settings.aggregate_colocated);
    }

    #[test]
    fn condensed_damage_groups_keep_the_worst_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = OutputWriter::new(
            dir.path(),
            settings(json!({"DL": {"Outputs": {
                "Damage": {"GroupedSample": true},
                "Settings": {"CondenseDS": true}
            }}})),
        );
        let sample = writer.save_damage(damage_sample()).unwrap();
        assert_eq!(sample.levels(), &["cmp", "loc", "dir", "ds"]);

        let grouped = &writer.written[0].table;
        assert_eq!(writer.written[0].name, "DMG_grp.zip");
        assert_eq!(grouped.column(&["wall", "1"]).unwrap(), &[0.0, 1.0, 1.0]);
        assert_eq!(grouped.column(&["collapse", "0"]).unwrap(), &[0.0, 0.0, 1.0]);
        assert!(dir.path().join("DMG_grp.zip").exists());
        assert!(!dir.path().join("DMG_sample.zip").exists());
    }

    #[test]
    fn summary_reports_collapse_and_irreparable_damage() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = OutputWriter::new(dir.path(), settings(json!({})));
        let damage = damage_sample();
        writer.save_summary(None, Some(&damage), 3).unwrap();

        let summary = &writer.written[0].table;
        assert_eq!(summary.simple_columns(), vec!["collapse", "irreparable"]);
        assert_eq!(summary.column(&["collapse"]).unwrap(), &[0.0, 0.0, 1.0]);
        assert_eq!(summary.column(&["irreparable"]).unwrap(), &[0.0, 0.0, 0.0]);

        let text = fs::read_to_string(dir.path().join("DL_summary.csv")).unwrap();
        assert!(text.starts_with("#,collapse,irreparable"));
    }

    #[test]
    fn json_twins_replace_csv_files_unless_requested() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = OutputWriter::new(
            dir.path(),
            settings(json!({"DL": {"Outputs": {
                "Demand": {"Sample": true},
                "Format": {"CSV": false, "JSON": true}
            }}})),
        );
        let mut demand = Table::new(&["type", "loc", "dir"], 2);
        demand
            .push_column(label(&["PID", "1", "1"]), vec![0.01, 0.02], Some("unitless".into()))
            .unwrap();
        writer.save_demand(&demand).unwrap();
        writer.save_summary(None, None, 2).unwrap();
        let files = writer.finish().unwrap();

        assert!(!dir.path().join("DEM_sample.zip").exists());
        assert!(dir.path().join("DL_summary.csv").exists());
        assert_eq!(files.len(), 5);

        let json: Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("DEM_sample.json")).unwrap()).unwrap();
        assert_eq!(json["PID"]["1"]["1"], json!([0.01, 0.02]));
        assert_eq!(json["Units"]["PID-1-1"], json!("unitless"));
    }

    #[test]
    fn leftover_results_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("DMG_grp.json"), "{}").unwrap();
        fs::write(dir.path().join("notes.txt"), "keep").unwrap();
        remove_existing_files(dir.path()).unwrap();
        assert!(!dir.path().join("DMG_grp.json").exists());
        assert!(dir.path().join("notes.txt").exists());
    }
}
