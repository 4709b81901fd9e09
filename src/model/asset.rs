//! Asset model: component quantities organized in performance groups.

use std::collections::BTreeMap;

use rand::rngs::StdRng;

use super::{to_internal_units, to_user_units};
use crate::base::{parse_blocks, parse_directions, parse_locations};
use crate::config::SamplingMethod;
use crate::logger::Logger;
use crate::table::{label, simple_label, Label, Records, Table};
use crate::units::UnitRegistry;
use crate::uq::{scale_distribution, Family, Limits, RandomVariable, RandomVariableRegistry};
use crate::PelicunError;

pub const CMP_LEVELS: [&str; 4] = ["cmp", "loc", "dir", "uid"];

/// Quantity distribution of one performance group, in internal units.
#[derive(Debug, Clone)]
pub struct ComponentMarginal {
    pub cmp: String,
    pub loc: String,
    pub dir: String,
    pub uid: String,
    pub unit: String,
    /// `None` means the quantity is deterministic.
    pub family: Option<Family>,
    pub theta: [f64; 2],
    pub truncation: Limits,
    /// Normalized block weights.
    pub blocks: Vec<f64>,
}

impl ComponentMarginal {
    pub fn label(&self) -> Label {
        label(&[&self.cmp, &self.loc, &self.dir, &self.uid])
    }
}

fn parse_number(records: &Records, row: usize, column: &str) -> Result<Option<f64>, PelicunError> {
    records
        .get(row, column)
        .map(|value| {
            value
                .parse::<f64>()
                .map_err(|_| PelicunError::parse("component attribute", value))
        })
        .transpose()
}

#[derive(Debug, Default)]
pub struct AssetModel {
    pub stories: Option<usize>,
    pub cmp_marginals: Vec<ComponentMarginal>,
    /// Quantity unit of every component id.
    pub cmp_units: BTreeMap<String, String>,
    /// Component quantities in internal units.
    pub sample: Option<Table>,
}

impl AssetModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads component assignments and expands them into performance
    /// groups over locations and directions.
    ///
    /// Colocated definitions of the same component get increasing uids.
    pub fn load_cmp_model(
        &mut self,
        records: &Records,
        units: &UnitRegistry,
        log: &mut Logger,
    ) -> Result<(), PelicunError> {
        log.div(false);
        log.msg("Loading component model...");

        let mut marginals: Vec<ComponentMarginal> = Vec::new();
        let mut cmp_units: BTreeMap<String, String> = BTreeMap::new();
        for row in 0..records.len() {
            let cmp = records.id(row).to_string();
            let unit = records
                .get(row, "Units")
                .ok_or_else(|| PelicunError::Model(format!("no units defined for component {cmp}")))?
                .to_string();
            match cmp_units.get(&cmp) {
                Some(existing) if *existing != unit => {
                    return Err(PelicunError::Model(format!(
                        "component {cmp} is assigned with different units: {existing} and {unit}"
                    )))
                }
                Some(_) => {}
                None => {
                    cmp_units.insert(cmp.clone(), unit.clone());
                }
            }

            let location = records
                .get(row, "Location")
                .ok_or_else(|| PelicunError::Model(format!("no location defined for component {cmp}")))?;
            let locations = parse_locations(location, self.stories)?;
            let directions = parse_directions(records.get(row, "Direction"))?;
            let blocks = parse_blocks(records.get(row, "Blocks"))?;

            let family = records.get(row, "Family").map(str::parse::<Family>).transpose()?;
            let theta0 = parse_number(records, row, "Theta_0")?
                .ok_or_else(|| PelicunError::Model(format!("no quantity defined for component {cmp}")))?;
            let theta1 = parse_number(records, row, "Theta_1")?.unwrap_or(f64::NAN);
            let truncation = [
                parse_number(records, row, "TruncateLower")?.unwrap_or(f64::NAN),
                parse_number(records, row, "TruncateUpper")?.unwrap_or(f64::NAN),
            ];

            let factor = units.scale_factor(Some(&unit))?;
            let (theta, truncation) = scale_distribution(
                factor,
                family.unwrap_or(Family::Deterministic),
                &[theta0, theta1],
                truncation,
            )?;

            for loc in &locations {
                for dir in &directions {
                    let uid = marginals
                        .iter()
                        .filter(|m| m.cmp == cmp && m.loc == *loc && m.dir == *dir)
                        .count();
                    marginals.push(ComponentMarginal {
                        cmp: cmp.clone(),
                        loc: loc.clone(),
                        dir: dir.clone(),
                        uid: uid.to_string(),
                        unit: unit.clone(),
                        family,
                        theta: [theta[0], theta[1]],
                        truncation,
                        blocks: blocks.clone(),
                    });
                }
            }
        }

        log.msg(&format!(
            "{} performance groups of {} components successfully loaded.",
            marginals.len(),
            cmp_units.len()
        ));
        self.cmp_marginals = marginals;
        self.cmp_units = cmp_units;
        Ok(())
    }

    pub fn generate_cmp_sample(
        &mut self,
        size: usize,
        method: SamplingMethod,
        rng: &mut StdRng,
        log: &mut Logger,
    ) -> Result<(), PelicunError> {
        if self.cmp_marginals.is_empty() {
            return Err(PelicunError::Model(
                "model parameters have not been specified; load component assignments \
                 before generating a sample"
                    .to_string(),
            ));
        }

        log.div(false);
        log.msg("Generating sample from component quantity variables...");

        let mut registry = RandomVariableRegistry::new();
        for marginal in &self.cmp_marginals {
            let name = format!("CMP-{}", simple_label(&marginal.label()));
            let rv = match marginal.family {
                None => RandomVariable::new(name, Family::Deterministic, vec![marginal.theta[0]])?,
                Some(family) => RandomVariable::new(name, family, marginal.theta.to_vec())?
                    .with_truncation(marginal.truncation[0], marginal.truncation[1]),
            };
            registry.add_rv(rv);
        }
        registry.generate_sample(size, method, rng)?;
        let mut values = registry.take_sample();

        let mut sample = Table::new(&CMP_LEVELS, size);
        for marginal in &self.cmp_marginals {
            let name = format!("CMP-{}", simple_label(&marginal.label()));
            sample.push_column(
                marginal.label(),
                values.remove(&name).unwrap_or_default(),
                Some(marginal.unit.clone()),
            )?;
        }

        log.msg(&format!("Successfully generated {size} realizations."));
        self.sample = Some(sample);
        Ok(())
    }

    /// Loads a component quantity sample with a `Units` row.
    pub fn load_cmp_sample(
        &mut self,
        mut table: Table,
        units: &UnitRegistry,
        log: &mut Logger,
    ) -> Result<(), PelicunError> {
        log.div(false);
        log.msg("Loading asset components sample...");

        table.set_levels(&CMP_LEVELS)?;
        let mut cmp_units = BTreeMap::new();
        for pos in 0..table.ncols() {
            let unit = table.unit_at(pos).ok_or_else(|| {
                PelicunError::Model(format!(
                    "no units defined for component quantity {}",
                    simple_label(table.label_at(pos))
                ))
            })?;
            cmp_units.insert(table.label_at(pos)[0].clone(), unit.to_string());
        }
        to_internal_units(&mut table, units)?;

        log.msg("Asset components sample successfully loaded.");
        self.cmp_units = cmp_units;
        self.sample = Some(table);
        Ok(())
    }

    /// Component quantities in user units.
    pub fn save_cmp_sample(&self, units: &UnitRegistry) -> Result<Table, PelicunError> {
        let sample = self
            .sample
            .as_ref()
            .ok_or_else(|| PelicunError::Model("no component sample available".to_string()))?;
        to_user_units(sample, units)
    }

    /// Block weights of a performance group; one block when unknown.
    pub fn blocks(&self, pg: &[String]) -> Vec<f64> {
        self.cmp_marginals
            .iter()
            .find(|m| m.label() == pg)
            .map(|m| m.blocks.clone())
            .unwrap_or_else(|| vec![1.0])
    }

    /// Performance group labels in sample order.
    pub fn performance_groups(&self) -> Vec<Label> {
        match &self.sample {
            Some(sample) => sample.columns().to_vec(),
            None => self.cmp_marginals.iter().map(ComponentMarginal::label).collect(),
        }
    }

    pub fn component_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .performance_groups()
            .into_iter()
            .map(|label| label[0].clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}
