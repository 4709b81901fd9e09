//! Unit conversion factors.
//!
//! Every unit maps to the factor that converts a value in that unit to the
//! internal base units (SI, seconds, USD). Units are grouped in categories
//! and a unit name may appear in only one category.

use std::fmt;
use std::fs;
use std::marker::PhantomData;
use std::path::Path;

use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde_json::Value;

use crate::PelicunError;

const DEFAULT_UNITS: &str = include_str!("../settings/default_units.json");

/// JSON object that keeps key order and rejects duplicate keys.
struct StrictMap<V>(Vec<(String, V)>);

impl<'de, V: Deserialize<'de>> Deserialize<'de> for StrictMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StrictVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for StrictVisitor<V> {
            type Value = StrictMap<V>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a JSON object without duplicate keys")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries: Vec<(String, V)> = Vec::new();
                while let Some((key, value)) = access.next_entry::<String, V>()? {
                    if entries.iter().any(|(existing, _)| *existing == key) {
                        return Err(serde::de::Error::custom(format!("duplicate key: {key}")));
                    }
                    entries.push((key, value));
                }
                Ok(StrictMap(entries))
            }
        }

        deserializer.deserialize_map(StrictVisitor(PhantomData))
    }
}

#[derive(Debug, Clone)]
pub struct UnitCategory {
    pub name: String,
    pub units: Vec<(String, f64)>,
}

impl UnitCategory {
    fn factor(&self, unit: &str) -> Option<f64> {
        self.units
            .iter()
            .find(|(name, _)| name == unit)
            .map(|(_, factor)| *factor)
    }
}

#[derive(Debug, Clone)]
pub struct UnitRegistry {
    categories: Vec<UnitCategory>,
}

impl UnitRegistry {
    pub fn default_units() -> Result<Self, PelicunError> {
        Self::parse_str(DEFAULT_UNITS, "default_units.json")
    }

    /// Loads the units in `custom_file`, or the embedded defaults when no
    /// file is given. Custom files replace the defaults entirely.
    pub fn load(custom_file: Option<&Path>) -> Result<Self, PelicunError> {
        match custom_file {
            Some(path) => Self::from_file(path),
            None => Self::default_units(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, PelicunError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            PelicunError::Units(format!("{} was not found: {err}", path.display()))
        })?;
        Self::parse_str(&contents, &path.display().to_string())
    }

    pub fn parse_str(contents: &str, source: &str) -> Result<Self, PelicunError> {
        let raw: StrictMap<StrictMap<Value>> = serde_json::from_str(contents).map_err(|err| {
            PelicunError::Units(format!("{source} is not a valid unit file: {err}"))
        })?;

        let mut categories = Vec::with_capacity(raw.0.len());
        for (category, entries) in raw.0 {
            let mut units = Vec::with_capacity(entries.0.len());
            for (unit, value) in entries.0 {
                let factor = match &value {
                    Value::Number(number) => number.as_f64(),
                    Value::String(text) => text.trim().parse::<f64>().ok(),
                    _ => None,
                }
                .ok_or_else(|| {
                    PelicunError::Units(format!(
                        "unit {unit} has a value of {value} which cannot be interpreted as a float"
                    ))
                })?;
                units.push((unit, factor));
            }
            categories.push(UnitCategory {
                name: category,
                units,
            });
        }

        let registry = Self { categories };
        registry.check_unique(source)?;
        Ok(registry)
    }

    fn check_unique(&self, source: &str) -> Result<(), PelicunError> {
        let mut seen = std::collections::BTreeSet::new();
        for category in &self.categories {
            for (unit, _) in &category.units {
                if !seen.insert(unit.as_str()) {
                    return Err(PelicunError::Units(format!(
                        "{unit} defined twice in {source}"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn categories(&self) -> &[UnitCategory] {
        &self.categories
    }

    pub fn factor(&self, unit: &str) -> Option<f64> {
        self.categories.iter().find_map(|category| category.factor(unit))
    }

    pub fn category_of(&self, unit: &str) -> Option<&str> {
        self.categories
            .iter()
            .find(|category| category.factor(unit).is_some())
            .map(|category| category.name.as_str())
    }

    /// Factor that converts a value in `unit` to internal units.
    ///
    /// A leading count is allowed (`"100 ft2"`); `None` means no scaling.
    pub fn scale_factor(&self, unit: Option<&str>) -> Result<f64, PelicunError> {
        let Some(unit) = unit.map(str::trim).filter(|unit| !unit.is_empty()) else {
            return Ok(1.0);
        };

        let (count, unit_name) = match unit.split_once(' ') {
            Some((count, name)) => {
                let count = count
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| PelicunError::Units(format!("cannot parse unit `{unit}`")))?;
                (count, name.trim())
            }
            None => (1.0, unit),
        };

        let factor = self
            .factor(unit_name)
            .ok_or_else(|| PelicunError::Units(format!("unknown unit: {unit_name}")))?;

        Ok(count * factor)
    }

    /// Converts `values` from `unit` to `to_unit`. The category is
    /// inferred from `unit` when not given.
    pub fn convert_units(
        &self,
        values: &[f64],
        unit: &str,
        to_unit: &str,
        category: Option<&str>,
    ) -> Result<Vec<f64>, PelicunError> {
        let category = match category {
            Some(name) => {
                let category = self
                    .categories
                    .iter()
                    .find(|c| c.name == name)
                    .ok_or_else(|| PelicunError::Units(format!("unknown category: `{name}`")))?;
                for unt in [unit, to_unit] {
                    if category.factor(unt).is_none() {
                        return Err(PelicunError::Units(format!("unknown unit: `{unt}`")));
                    }
                }
                category
            }
            None => {
                let category = self
                    .categories
                    .iter()
                    .find(|c| c.factor(unit).is_some())
                    .ok_or_else(|| PelicunError::Units(format!("unknown unit `{unit}`")))?;
                if category.factor(to_unit).is_none() {
                    return Err(PelicunError::Units(format!(
                        "`{unit}` is a `{}` unit, but `{to_unit}` is not specified in that category",
                        category.name
                    )));
                }
                category
            }
        };

        let from_factor = category.factor(unit).unwrap_or(1.0);
        let to_factor = category.factor(to_unit).unwrap_or(1.0);
        Ok(values.iter().map(|v| v * from_factor / to_factor).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_units_load() {
        let units = UnitRegistry::default_units().unwrap();
        assert!((units.factor("inch").unwrap() - 0.0254).abs() < 1e-15);
        assert_eq!(units.category_of("ft2"), Some("area"));
        assert!((units.factor("g").unwrap() - 9.80665).abs() < 1e-12);
    }

    #[test]
    fn scale_factor_with_count() {
        let units = UnitRegistry::default_units().unwrap();
        assert_eq!(units.scale_factor(None).unwrap(), 1.0);
        let sf = units.scale_factor(Some("100 ft2")).unwrap();
        assert!((sf - 9.290304).abs() < 1e-9);
        assert!(units.scale_factor(Some("furlong")).is_err());
        assert!(units.scale_factor(Some("ten ft")).is_err());
    }

    #[test]
    fn convert_between_units() {
        let units = UnitRegistry::default_units().unwrap();
        let out = units.convert_units(&[1.0, 2.0], "ft", "inch", None).unwrap();
        assert!((out[0] - 12.0).abs() < 1e-9);
        assert!((out[1] - 24.0).abs() < 1e-9);
        let out = units.convert_units(&[1.0], "g", "mps2", Some("acceleration")).unwrap();
        assert!((out[0] - 9.80665).abs() < 1e-12);
        assert!(units.convert_units(&[1.0], "ft", "kg", None).is_err());
        assert!(units.convert_units(&[1.0], "ft", "m", Some("mass")).is_err());
        assert!(units.convert_units(&[1.0], "ft", "m", Some("nope")).is_err());
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let dup_in_category = r#"{"length": {"m": 1.0, "m": 2.0}}"#;
        assert!(UnitRegistry::parse_str(dup_in_category, "test").is_err());

        let dup_across = r#"{"length": {"m": 1.0}, "other": {"m": 1.0}}"#;
        assert!(UnitRegistry::parse_str(dup_across, "test").is_err());

        let not_float = r#"{"length": {"m": "one"}}"#;
        assert!(UnitRegistry::parse_str(not_float, "test").is_err());

        let not_object = r#"{"length": 1.0}"#;
        assert!(UnitRegistry::parse_str(not_object, "test").is_err());
    }

    #[test]
    fn custom_file_replaces_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("units.json");
        std::fs::write(&path, r#"{"length": {"m": 1.0, "cm": 0.01}}"#).unwrap();
        let units = UnitRegistry::load(Some(&path)).unwrap();
        assert_eq!(units.factor("cm"), Some(0.01));
        assert_eq!(units.factor("inch"), None);
        assert!(UnitRegistry::load(Some(&dir.path().join("missing.json"))).is_err());
    }
}
