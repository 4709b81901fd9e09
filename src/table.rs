//! Column-labelled numeric tables.
//!
//! A [`Table`] stores realizations in rows and variables in columns. Every
//! column carries a label with one entry per named level (for example
//! `type`, `loc`, `dir` for demands) and an optional unit. Missing values
//! are `NaN`.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use csv::{ReaderBuilder, Writer};
use serde_json::{Map, Value};
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

use crate::base::str2bool;
use crate::PelicunError;

pub type Label = Vec<String>;

pub const UNITS_ROW: &str = "Units";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Agg {
    Sum,
    Max,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    levels: Vec<String>,
    index: Vec<String>,
    columns: Vec<Label>,
    data: Vec<Vec<f64>>,
    units: Vec<Option<String>>,
}

pub fn label<S: AsRef<str>>(parts: &[S]) -> Label {
    parts.iter().map(|part| part.as_ref().to_string()).collect()
}

/// Joins the non-empty parts of a label with `-`.
pub fn simple_label(label: &[String]) -> String {
    label
        .iter()
        .filter(|part| !part.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("-")
}

pub fn fmt_f64(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        format!("{value}")
    }
}

fn parse_cell(cell: &str) -> Result<f64, PelicunError> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    if let Ok(value) = cell.parse::<f64>() {
        return Ok(value);
    }
    match cell.to_ascii_lowercase().as_str() {
        "true" => Ok(1.0),
        "false" => Ok(0.0),
        _ => Err(PelicunError::parse("numeric value", cell)),
    }
}

fn agg_values(values: &[f64], agg: Agg) -> f64 {
    let mut present = values.iter().copied().filter(|v| !v.is_nan()).peekable();
    if present.peek().is_none() {
        return f64::NAN;
    }
    match agg {
        Agg::Sum => present.sum(),
        Agg::Max => present.fold(f64::NEG_INFINITY, f64::max),
    }
}

impl Table {
    /// Empty table with `nrows` realizations indexed `0..nrows`.
    pub fn new<S: AsRef<str>>(levels: &[S], nrows: usize) -> Self {
        Self::with_index(label(levels), (0..nrows).map(|i| i.to_string()).collect())
    }

    pub fn with_index(levels: Vec<String>, index: Vec<String>) -> Self {
        Self {
            levels,
            index,
            columns: Vec::new(),
            data: Vec::new(),
            units: Vec::new(),
        }
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    pub fn set_levels<S: AsRef<str>>(&mut self, levels: &[S]) -> Result<(), PelicunError> {
        if levels.len() != self.levels.len() {
            return Err(PelicunError::LengthMismatch {
                context: "table levels",
                expected: self.levels.len(),
                got: levels.len(),
            });
        }
        self.levels = label(levels);
        Ok(())
    }

    pub fn level_position(&self, name: &str) -> Option<usize> {
        self.levels.iter().position(|level| level == name)
    }

    pub fn nrows(&self) -> usize {
        self.index.len()
    }

    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn index(&self) -> &[String] {
        &self.index
    }

    pub fn reset_index(&mut self) {
        self.index = (0..self.nrows()).map(|i| i.to_string()).collect();
    }

    pub fn columns(&self) -> &[Label] {
        &self.columns
    }

    pub fn units(&self) -> &[Option<String>] {
        &self.units
    }

    pub fn has_units(&self) -> bool {
        self.units.iter().any(Option::is_some)
    }

    /// Adds a column, replacing an existing column with the same label.
    pub fn push_column(
        &mut self,
        label: Label,
        values: Vec<f64>,
        unit: Option<String>,
    ) -> Result<(), PelicunError> {
        if label.len() != self.levels.len() {
            return Err(PelicunError::LengthMismatch {
                context: "column label",
                expected: self.levels.len(),
                got: label.len(),
            });
        }
        if values.len() != self.nrows() {
            return Err(PelicunError::LengthMismatch {
                context: "column values",
                expected: self.nrows(),
                got: values.len(),
            });
        }

        if let Some(pos) = self.columns.iter().position(|existing| *existing == label) {
            self.data[pos] = values;
            self.units[pos] = unit;
        } else {
            self.columns.push(label);
            self.data.push(values);
            self.units.push(unit);
        }
        Ok(())
    }

    pub fn position<S: AsRef<str>>(&self, label: &[S]) -> Option<usize> {
        self.columns.iter().position(|existing| {
            existing.len() == label.len()
                && existing.iter().zip(label).all(|(a, b)| a == b.as_ref())
        })
    }

    pub fn column<S: AsRef<str>>(&self, label: &[S]) -> Option<&[f64]> {
        self.position(label).map(|pos| self.data[pos].as_slice())
    }

    pub fn column_at(&self, pos: usize) -> &[f64] {
        &self.data[pos]
    }

    pub fn column_at_mut(&mut self, pos: usize) -> &mut [f64] {
        &mut self.data[pos]
    }

    pub fn label_at(&self, pos: usize) -> &[String] {
        &self.columns[pos]
    }

    pub fn unit_at(&self, pos: usize) -> Option<&str> {
        self.units[pos].as_deref()
    }

    pub fn set_unit(&mut self, pos: usize, unit: Option<String>) {
        self.units[pos] = unit;
    }

    /// Positions of the columns whose label matches `pattern`; `None`
    /// entries match anything.
    pub fn matching(&self, pattern: &[Option<&str>]) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, label)| {
                pattern
                    .iter()
                    .zip(label.iter())
                    .all(|(want, have)| want.map_or(true, |want| want == have))
            })
            .map(|(pos, _)| pos)
            .collect()
    }

    pub fn select(&self, positions: &[usize]) -> Table {
        Table {
            levels: self.levels.clone(),
            index: self.index.clone(),
            columns: positions.iter().map(|&p| self.columns[p].clone()).collect(),
            data: positions.iter().map(|&p| self.data[p].clone()).collect(),
            units: positions.iter().map(|&p| self.units[p].clone()).collect(),
        }
    }

    pub fn filter_rows(&self, keep: &[bool]) -> Table {
        let pick = |values: &Vec<f64>| -> Vec<f64> {
            values
                .iter()
                .zip(keep)
                .filter(|(_, keep)| **keep)
                .map(|(v, _)| *v)
                .collect()
        };
        Table {
            levels: self.levels.clone(),
            index: self
                .index
                .iter()
                .zip(keep)
                .filter(|(_, keep)| **keep)
                .map(|(i, _)| i.clone())
                .collect(),
            columns: self.columns.clone(),
            data: self.data.iter().map(pick).collect(),
            units: self.units.clone(),
        }
    }

    pub fn remove_columns(&mut self, positions: &[usize]) {
        let mut positions = positions.to_vec();
        positions.sort_unstable();
        positions.dedup();
        for pos in positions.into_iter().rev() {
            self.columns.remove(pos);
            self.data.remove(pos);
            self.units.remove(pos);
        }
    }

    /// Distinct values of a label level in first-seen order.
    pub fn unique_level_values(&self, level: usize) -> Vec<String> {
        let mut seen = Vec::new();
        for label in &self.columns {
            if !seen.contains(&label[level]) {
                seen.push(label[level].clone());
            }
        }
        seen
    }

    pub fn drop_level(&mut self, level: usize) {
        self.levels.remove(level);
        for label in &mut self.columns {
            label.remove(level);
        }
    }

    pub fn map_labels(&mut self, mut f: impl FnMut(&mut Label)) {
        for label in &mut self.columns {
            f(label);
        }
    }

    pub fn sort_columns(&mut self) {
        let mut order: Vec<usize> = (0..self.ncols()).collect();
        order.sort_by(|&a, &b| compare_labels(&self.columns[a], &self.columns[b]));
        *self = self.select(&order);
    }

    /// Groups columns by the given label levels and aggregates each row.
    ///
    /// Groups are sorted by key. A group whose values are all `NaN` in a
    /// row stays `NaN`. The first unit of each group is kept.
    pub fn group_by(&self, levels: &[usize], agg: Agg) -> Table {
        let mut groups: BTreeMap<Label, Vec<usize>> = BTreeMap::new();
        for (pos, label) in self.columns.iter().enumerate() {
            let key: Label = levels.iter().map(|&l| label[l].clone()).collect();
            groups.entry(key).or_default().push(pos);
        }

        let mut keys: Vec<Label> = groups.keys().cloned().collect();
        keys.sort_by(|a, b| compare_labels(a, b));

        let mut out = Table::with_index(
            levels.iter().map(|&l| self.levels[l].clone()).collect(),
            self.index.clone(),
        );
        let mut buffer = Vec::new();
        for key in keys {
            let members = &groups[&key];
            let values = (0..self.nrows())
                .map(|row| {
                    buffer.clear();
                    buffer.extend(members.iter().map(|&pos| self.data[pos][row]));
                    agg_values(&buffer, agg)
                })
                .collect();
            let unit = members.iter().find_map(|&pos| self.units[pos].clone());
            out.columns.push(key);
            out.data.push(values);
            out.units.push(unit);
        }
        out
    }

    /// Appends the columns of `other`, which must have the same rows.
    pub fn hconcat(&mut self, other: Table) -> Result<(), PelicunError> {
        if self.is_empty() && self.levels.is_empty() {
            *self = other;
            return Ok(());
        }
        if other.nrows() != self.nrows() {
            return Err(PelicunError::LengthMismatch {
                context: "table rows",
                expected: self.nrows(),
                got: other.nrows(),
            });
        }
        for ((label, values), unit) in other.columns.into_iter().zip(other.data).zip(other.units) {
            self.push_column(label, values, unit)?;
        }
        Ok(())
    }

    pub fn row_count_where(&self, pos: usize, f: impl Fn(f64) -> bool) -> usize {
        self.data[pos].iter().filter(|v| f(**v)).count()
    }

    pub fn simple_columns(&self) -> Vec<String> {
        self.columns.iter().map(|label| simple_label(label)).collect()
    }

    /// Collapses the labels into a single level of `-`-joined names.
    pub fn to_simple_header(&self) -> Table {
        let mut out = self.clone();
        out.levels = vec![self.levels.join("-")];
        out.columns = self.simple_columns().into_iter().map(|name| vec![name]).collect();
        out
    }

    /// Splits single-level `-`-joined names into multi-level labels.
    /// Shorter labels are padded with empty strings.
    pub fn to_multi_header(&self) -> Table {
        let split: Vec<Label> = self
            .columns
            .iter()
            .map(|label| label.join("-").split('-').map(str::to_string).collect())
            .collect();
        let depth = split.iter().map(Vec::len).max().unwrap_or(1);
        let mut out = self.clone();
        out.levels = (0..depth).map(|l| l.to_string()).collect();
        out.columns = split
            .into_iter()
            .map(|mut label| {
                label.resize(depth, String::new());
                label
            })
            .collect();
        out
    }

    pub fn read_csv(path: &Path) -> Result<Table, PelicunError> {
        let file = File::open(path).map_err(|err| {
            PelicunError::Io(std::io::Error::new(
                err.kind(),
                format!("{}: {err}", path.display()),
            ))
        })?;
        Self::from_csv_reader(file)
    }

    /// Parses a CSV with an index column and `-`-joined column names. A
    /// row indexed `Units` provides the column units.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Table, PelicunError> {
        let records = Records::from_reader(reader)?;

        let mut index = Vec::new();
        let mut rows = Vec::new();
        let mut units: Option<Vec<String>> = None;
        for (id, row) in &records.rows {
            if id == UNITS_ROW {
                units = Some(row.clone());
            } else {
                index.push(id.clone());
                rows.push(row);
            }
        }

        let simple = Table {
            levels: vec![records.index_name.clone()],
            index,
            columns: records.header.iter().map(|h| vec![h.trim().to_string()]).collect(),
            data: vec![Vec::new(); records.header.len()],
            units: vec![None; records.header.len()],
        };
        let mut table = simple.to_multi_header();

        for row in rows {
            for col in 0..records.header.len() {
                let cell = row.get(col).map(String::as_str).unwrap_or("");
                table.data[col].push(parse_cell(cell)?);
            }
        }

        if let Some(units) = units {
            for (col, unit) in units.into_iter().enumerate().take(table.ncols()) {
                let unit = unit.trim();
                if !unit.is_empty() {
                    table.units[col] = Some(unit.to_string());
                }
            }
        }
        Ok(table)
    }

    /// Writes the table with simple column names. With `with_units`, a
    /// trailing `Units` row is added.
    pub fn write_csv_to<W: Write>(
        &self,
        writer: W,
        index_label: &str,
        with_units: bool,
    ) -> Result<(), PelicunError> {
        let mut writer = Writer::from_writer(writer);
        let mut header = vec![index_label.to_string()];
        header.extend(self.simple_columns());
        writer.write_record(&header)?;

        for (row, id) in self.index.iter().enumerate() {
            let mut record = Vec::with_capacity(self.ncols() + 1);
            record.push(id.clone());
            record.extend(self.data.iter().map(|values| fmt_f64(values[row])));
            writer.write_record(&record)?;
        }

        if with_units {
            let mut record = vec![UNITS_ROW.to_string()];
            record.extend(self.units.iter().map(|unit| unit.clone().unwrap_or_default()));
            writer.write_record(&record)?;
        }

        writer.flush()?;
        Ok(())
    }

    pub fn write_csv(&self, path: &Path, index_label: &str, with_units: bool) -> Result<(), PelicunError> {
        let file = File::create(path)?;
        self.write_csv_to(file, index_label, with_units)
    }

    /// Writes the CSV representation into a single-entry zip archive.
    pub fn write_zip(
        &self,
        path: &Path,
        archive_name: &str,
        index_label: &str,
        with_units: bool,
    ) -> Result<(), PelicunError> {
        let file = File::create(path)?;
        let mut zip = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        zip.start_file(archive_name, options)?;
        self.write_csv_to(&mut zip, index_label, with_units)?;
        zip.finish()?;
        Ok(())
    }

    pub fn read_zip(path: &Path) -> Result<Table, PelicunError> {
        let file = File::open(path)?;
        let mut archive = zip::ZipArchive::new(file)?;
        let entry = archive.by_index(0)?;
        Self::from_csv_reader(entry)
    }

    /// Nested JSON representation keyed by label levels.
    ///
    /// Columns are nested level by level; at the leaves, rows indexed by
    /// integers become arrays and other rows become objects keyed by the
    /// row index. `NaN` becomes `null`.
    pub fn to_json_dict(&self) -> Value {
        let numeric_index = self
            .index
            .iter()
            .all(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()));
        let positions: Vec<usize> = (0..self.ncols()).collect();
        self.json_level(&positions, 0, numeric_index)
    }

    fn json_level(&self, positions: &[usize], level: usize, numeric_index: bool) -> Value {
        let mut out = Map::new();
        let mut keys: Vec<&String> = Vec::new();
        for &pos in positions {
            let key = &self.columns[pos][level];
            if !keys.contains(&key) {
                keys.push(key);
            }
        }

        for key in keys {
            let members: Vec<usize> = positions
                .iter()
                .copied()
                .filter(|&pos| &self.columns[pos][level] == key)
                .collect();
            let is_leaf = level + 1 >= self.levels.len()
                || (members.len() == 1
                    && self.columns[members[0]][level + 1..].iter().all(String::is_empty));

            let value = if is_leaf {
                self.json_leaf(members[0], numeric_index)
            } else {
                self.json_level(&members, level + 1, numeric_index)
            };
            out.insert(key.clone(), value);
        }
        Value::Object(out)
    }

    fn json_leaf(&self, pos: usize, numeric_index: bool) -> Value {
        let to_json = |v: f64| -> Value {
            serde_json::Number::from_f64(v)
                .map(Value::Number)
                .unwrap_or(Value::Null)
        };
        if numeric_index {
            Value::Array(self.data[pos].iter().map(|v| to_json(*v)).collect())
        } else {
            Value::Object(
                self.index
                    .iter()
                    .zip(&self.data[pos])
                    .map(|(id, v)| (id.clone(), to_json(*v)))
                    .collect(),
            )
        }
    }

    /// Units keyed by simple column name, for JSON outputs.
    pub fn units_json(&self) -> Value {
        Value::Object(
            self.simple_columns()
                .into_iter()
                .zip(&self.units)
                .map(|(name, unit)| {
                    (
                        name,
                        unit.clone().map(Value::String).unwrap_or(Value::Null),
                    )
                })
                .collect(),
        )
    }
}

fn compare_labels(a: &[String], b: &[String]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        let ord = match (x.parse::<i64>(), y.parse::<i64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => x.cmp(y),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

/// String-valued CSV table with an index column, used for input databases.
#[derive(Debug, Clone, Default)]
pub struct Records {
    pub index_name: String,
    pub header: Vec<String>,
    pub rows: Vec<(String, Vec<String>)>,
}

impl Records {
    pub fn read_csv(path: &Path) -> Result<Records, PelicunError> {
        let file = File::open(path).map_err(|err| {
            PelicunError::Io(std::io::Error::new(
                err.kind(),
                format!("{}: {err}", path.display()),
            ))
        })?;
        Self::from_reader(file)
    }

    /// Reads all rows; invalid UTF-8 is replaced rather than rejected.
    pub fn from_reader<R: Read>(reader: R) -> Result<Records, PelicunError> {
        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .has_headers(false)
            .from_reader(reader);

        let mut records = Records::default();
        let mut first = true;
        for record in reader.byte_records() {
            let record = record?;
            let cells: Vec<String> = record
                .iter()
                .map(|cell| String::from_utf8_lossy(cell).trim().to_string())
                .collect();
            if cells.iter().all(String::is_empty) {
                continue;
            }
            let mut cells = cells.into_iter();
            let id = cells.next().unwrap_or_default();
            if first {
                records.index_name = id.trim_start_matches('\u{feff}').to_string();
                records.header = cells.collect();
                first = false;
            } else {
                records.rows.push((id, cells.collect()));
            }
        }
        Ok(records)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    /// Cell value; empty and `NaN` cells are `None`.
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let col = self.column_position(column)?;
        let cell = self.rows[row].1.get(col)?.as_str();
        if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
            None
        } else {
            Some(cell)
        }
    }

    /// Reads a flag cell such as `Incomplete`: a number equal to one or a
    /// boolean word. Missing or unreadable cells are false.
    pub fn flag(&self, row: usize, column: &str) -> bool {
        self.get(row, column).is_some_and(|cell| match cell.trim().parse::<f64>() {
            Ok(value) => value == 1.0,
            Err(_) => str2bool(cell).unwrap_or(false),
        })
    }

    pub fn id(&self, row: usize) -> &str {
        &self.rows[row].0
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.rows.iter().any(|(row_id, _)| row_id == id)
    }

    /// Sets fields of every row indexed `id`. The row and any missing
    /// columns are added as needed.
    pub fn set_row(&mut self, id: &str, fields: &[(&str, String)]) {
        let positions: Vec<usize> = fields
            .iter()
            .map(|(column, _)| match self.column_position(column) {
                Some(pos) => pos,
                None => {
                    self.header.push(column.to_string());
                    self.header.len() - 1
                }
            })
            .collect();

        if !self.contains_id(id) {
            self.rows.push((id.to_string(), Vec::new()));
        }
        for (_, cells) in self.rows.iter_mut().filter(|(row_id, _)| row_id == id) {
            for (&pos, (_, value)) in positions.iter().zip(fields) {
                if cells.len() <= pos {
                    cells.resize(pos + 1, String::new());
                }
                cells[pos] = value.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demand_table() -> Table {
        let mut table = Table::new(&["type", "loc", "dir"], 3);
        table
            .push_column(label(&["PID", "1", "1"]), vec![0.01, 0.02, f64::NAN], Some("unitless".into()))
            .unwrap();
        table
            .push_column(label(&["PID", "1", "2"]), vec![0.03, 0.01, f64::NAN], Some("unitless".into()))
            .unwrap();
        table
            .push_column(label(&["PFA", "2", "1"]), vec![1.0, 2.0, 3.0], Some("g".into()))
            .unwrap();
        table
    }

    #[test]
    fn push_column_checks_shapes() {
        let mut table = Table::new(&["type", "loc", "dir"], 2);
        assert!(table.push_column(label(&["PID", "1"]), vec![0.0, 0.0], None).is_err());
        assert!(table.push_column(label(&["PID", "1", "1"]), vec![0.0], None).is_err());
        table.push_column(label(&["PID", "1", "1"]), vec![1.0, 2.0], None).unwrap();
        table.push_column(label(&["PID", "1", "1"]), vec![3.0, 4.0], None).unwrap();
        assert_eq!(table.ncols(), 1);
        assert_eq!(table.column(&["PID", "1", "1"]).unwrap(), &[3.0, 4.0]);
    }

    #[test]
    fn group_by_keeps_all_nan_groups() {
        let table = demand_table();
        let grouped = table.group_by(&[0, 1], Agg::Sum);
        assert_eq!(grouped.ncols(), 2);
        let pid = grouped.column(&["PID", "1"]).unwrap();
        assert!((pid[0] - 0.04).abs() < 1e-12);
        assert!(pid[2].is_nan());

        let maxed = table.group_by(&[0], Agg::Max);
        assert_eq!(maxed.column(&["PID"]).unwrap()[0], 0.03);
        assert_eq!(maxed.units()[0].as_deref(), Some("g"));
    }

    #[test]
    fn matching_supports_wildcards() {
        let table = demand_table();
        assert_eq!(table.matching(&[Some("PID"), None, None]), vec![0, 1]);
        assert_eq!(table.matching(&[None, Some("2"), None]), vec![2]);
    }

    #[test]
    fn csv_with_units_row_parses() {
        let text = "#,1-PID-1-1,1-PFA-2-1\nUnits,rad,g\n0,0.01,0.5\n1,0.02,\n";
        let table = Table::from_csv_reader(text.as_bytes()).unwrap();
        assert_eq!(table.levels().len(), 4);
        assert_eq!(table.nrows(), 2);
        assert_eq!(table.label_at(0), &label(&["1", "PID", "1", "1"])[..]);
        assert_eq!(table.unit_at(1), Some("g"));
        assert!(table.column_at(1)[1].is_nan());
    }

    #[test]
    fn csv_output_has_trailing_units_row() {
        let table = demand_table();
        let mut buffer = Vec::new();
        table.write_csv_to(&mut buffer, "", true).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], ",PID-1-1,PID-1-2,PFA-2-1");
        assert_eq!(lines[1], "0,0.01,0.03,1");
        assert_eq!(lines[3], "2,,,3");
        assert_eq!(lines[4], "Units,unitless,unitless,g");
    }

    #[test]
    fn zip_archive_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("DEM_sample.zip");
        let table = demand_table();
        table.write_zip(&path, "DEM_sample.csv", "", true).unwrap();
        let loaded = Table::read_zip(&path).unwrap();
        assert_eq!(loaded.ncols(), 3);
        assert_eq!(loaded.unit_at(2), Some("g"));
        assert_eq!(loaded.column(&["PFA", "2", "1"]).unwrap(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn json_nests_by_level() {
        let table = demand_table();
        let json = table.to_json_dict();
        assert_eq!(json["PID"]["1"]["2"][1], serde_json::json!(0.01));
        assert!(json["PID"]["1"]["1"][2].is_null());

        let simple = table.to_simple_header();
        let json = simple.to_json_dict();
        assert_eq!(json["PFA-2-1"][0], serde_json::json!(1.0));
        assert_eq!(simple.units_json()["PFA-2-1"], serde_json::json!("g"));
    }

    #[test]
    fn numeric_labels_sort_naturally() {
        let mut table = Table::new(&["loc"], 1);
        for loc in ["10", "2", "1"] {
            table.push_column(label(&[loc]), vec![0.0], None).unwrap();
        }
        table.sort_columns();
        assert_eq!(table.unique_level_values(0), vec!["1", "2", "10"]);
    }

    #[test]
    fn records_treat_nan_as_missing() {
        let text = "ID,Units,Location,Family\ncmp.A,ea,1,\ncmp.B,ea,all,NaN\n";
        let records = Records::from_reader(text.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records.id(1), "cmp.B");
        assert_eq!(records.get(1, "Location"), Some("all"));
        assert_eq!(records.get(0, "Family"), None);
        assert_eq!(records.get(1, "Family"), None);
    }

    #[test]
    fn set_row_adds_rows_and_columns() {
        let text = "ID,Units,Location\ncmp.A,ea,1\n";
        let mut records = Records::from_reader(text.as_bytes()).unwrap();
        records.set_row("collapse", &[("Units", "ea".to_string()), ("Theta_0", "1".to_string())]);
        records.set_row("cmp.A", &[("Theta_0", "2".to_string())]);
        assert_eq!(records.len(), 2);
        assert_eq!(records.get(1, "Units"), Some("ea"));
        assert_eq!(records.get(1, "Location"), None);
        assert_eq!(records.get(0, "Theta_0"), Some("2"));
        assert!(records.contains_id("collapse"));
    }

    #[test]
    fn flags_accept_numbers_and_words() {
        let text = "ID,Incomplete
a,1
b,1.0
c,True
d,false
e,0
f,
g,maybe
";
        let records = Records::from_reader(text.as_bytes()).unwrap();
        let flags: Vec<bool> = (0..records.len()).map(|row| records.flag(row, "Incomplete")).collect();
        assert_eq!(flags, vec![true, true, true, false, false, false, false]);
        assert!(!records.flag(0, "Missing"));
    }
}
