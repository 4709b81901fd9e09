//! The assessment ties the models to shared options, units, logging, and a
//! single random number generator.

use rand::rngs::StdRng;
use serde_json::{Map, Value};

use crate::config::Options;
use crate::logger::Logger;
use crate::model::{
    AssetModel, ConsequenceSource, DamageModel, DecisionVariable, DemandModel, FragilitySource,
    RepairModel,
};
use crate::table::{Records, Table};
use crate::units::UnitRegistry;
use crate::{PelicunError, VERSION};

/// Manages the models, data, and calculations of one assessment.
#[derive(Debug)]
pub struct Assessment {
    pub options: Options,
    pub units: UnitRegistry,
    pub log: Logger,
    pub rng: StdRng,
    pub stories: Option<usize>,
    pub demand: DemandModel,
    pub asset: AssetModel,
    pub damage: DamageModel,
    pub repair: RepairModel,
}

impl Assessment {
    /// Starts an assessment with the given `Options` object merged over the
    /// defaults.
    pub fn new(config_options: Option<&Value>) -> Result<Self, PelicunError> {
        let options = Options::new(config_options)?;
        let mut log = Logger::new(
            options.verbose,
            options.log_show_ms,
            options.log_file.as_deref(),
            options.print_log,
        )?;
        log.write_msg(&format!("pelicun {VERSION} | \n"), false, false);
        log.print_system_info();
        log.div(false);
        log.msg("Assessment Started");

        let units = UnitRegistry::load(options.units_file.as_deref())?;
        let rng = options.rng();

        Ok(Self {
            options,
            units,
            log,
            rng,
            stories: None,
            demand: DemandModel::new(),
            asset: AssetModel::new(),
            damage: DamageModel::new(),
            repair: RepairModel::new(),
        })
    }

    /// Factor that converts `unit` (optionally with a leading count) to
    /// internal units.
    pub fn calc_unit_scale_factor(&self, unit: &str) -> Result<f64, PelicunError> {
        self.units.scale_factor(Some(unit))
    }

    pub fn load_demand_sample(&mut self, raw: Table) -> Result<(), PelicunError> {
        self.demand.load_sample(raw, &self.units, &mut self.log)
    }

    pub fn calibrate_demand_model(&mut self, config: &Value) -> Result<(), PelicunError> {
        self.demand.calibrate_model(config, &self.units, &mut self.log)
    }

    pub fn generate_demand_sample(
        &mut self,
        size: usize,
        preserve_raw_order: bool,
        demand_cloning: Option<&Value>,
    ) -> Result<(), PelicunError> {
        self.demand.generate_sample(
            size,
            preserve_raw_order,
            demand_cloning,
            self.options.sampling.sampling_method,
            &mut self.rng,
            &mut self.log,
        )
    }

    pub fn load_cmp_model(&mut self, records: &Records) -> Result<(), PelicunError> {
        self.asset.stories = self.stories;
        self.asset.load_cmp_model(records, &self.units, &mut self.log)
    }

    pub fn load_cmp_sample(&mut self, table: Table) -> Result<(), PelicunError> {
        self.asset.load_cmp_sample(table, &self.units, &mut self.log)
    }

    pub fn generate_cmp_sample(&mut self, size: usize) -> Result<(), PelicunError> {
        self.asset.generate_cmp_sample(
            size,
            self.options.sampling.sampling_method,
            &mut self.rng,
            &mut self.log,
        )
    }

    /// Loads fragilities for the components of the asset model.
    pub fn load_damage_model(&mut self, sources: &[FragilitySource]) -> Result<(), PelicunError> {
        let cmp_ids = self.asset.component_ids();
        self.damage
            .load_damage_model(sources, &cmp_ids, &self.units, &mut self.log)
    }

    pub fn calculate_damage(
        &mut self,
        damage_process: Option<&Map<String, Value>>,
    ) -> Result<(), PelicunError> {
        let demand = self
            .demand
            .sample
            .as_ref()
            .ok_or_else(|| PelicunError::Model("no demand sample available".to_string()))?;
        self.damage.calculate(
            demand,
            &self.asset,
            &self.options,
            damage_process,
            &mut self.rng,
            &mut self.log,
        )
    }

    pub fn load_repair_model(
        &mut self,
        sources: &[ConsequenceSource],
        loss_map: Vec<(String, String)>,
        decision_variables: &[DecisionVariable],
    ) -> Result<(), PelicunError> {
        self.repair
            .load_model(sources, loss_map, decision_variables, &mut self.log)
    }

    pub fn calculate_repair(&mut self) -> Result<(), PelicunError> {
        let damage = self
            .damage
            .sample
            .as_ref()
            .ok_or_else(|| PelicunError::Model("no damage sample available".to_string()))?;
        self.repair.calculate(
            damage,
            &self.options,
            &self.units,
            &mut self.rng,
            &mut self.log,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::label;
    use serde_json::json;

    fn records(text: &str) -> Records {
        Records::from_reader(text.as_bytes()).unwrap()
    }

    #[test]
    fn scale_factors_use_the_unit_registry() {
        let assessment = Assessment::new(None).unwrap();
        assert_eq!(assessment.calc_unit_scale_factor("ea").unwrap(), 1.0);
        assert!((assessment.calc_unit_scale_factor("10 ft").unwrap() - 3.048).abs() < 1e-12);
        assert!(assessment.calc_unit_scale_factor("parsec").is_err());
    }

    #[test]
    fn invalid_options_are_rejected() {
        assert!(Assessment::new(Some(&json!({"RepairCostAndTimeCorrelation": 2.0}))).is_err());
        assert!(Assessment::new(Some(&json!({"Sampling": 5}))).is_err());
    }

    #[test]
    fn models_run_in_sequence() {
        let mut assessment = Assessment::new(Some(&json!({"Seed": 3}))).unwrap();

        let mut demands = Table::new(&["type", "loc", "dir"], 4);
        demands
            .push_column(label(&["PID", "1", "1"]), vec![0.01, 0.02, 0.03, 0.04], Some("unitless".into()))
            .unwrap();
        assessment.load_demand_sample(demands).unwrap();
        assessment
            .calibrate_demand_model(&json!({"ALL": {"DistributionFamily": "empirical"}}))
            .unwrap();
        assessment.generate_demand_sample(50, false, None).unwrap();

        assessment.stories = Some(1);
        assessment
            .load_cmp_model(&records("ID,Units,Location,Direction,Theta_0\nwall,ea,1,1,2\n"))
            .unwrap();
        assessment.generate_cmp_sample(50).unwrap();

        let fragilities = records(
            "ID,Demand-Directional,Demand-Offset,Demand-Type,Demand-Unit,Incomplete,LS1-Family,LS1-Theta_0,LS1-Theta_1\n\
             wall,1,0,Peak Interstory Drift Ratio,unitless,0,,0.025,\n",
        );
        assessment
            .load_damage_model(&[FragilitySource::Records(fragilities)])
            .unwrap();
        assessment.calculate_damage(None).unwrap();

        let consequences = records(
            "ID,Incomplete,Quantity-Unit,DV-Unit,DS1-Family,DS1-Theta_0,DS1-Theta_1\n\
             wall-Cost,0,1 EA,USD_2011,,100,\n",
        );
        assessment
            .load_repair_model(
                &[ConsequenceSource::Records(consequences)],
                vec![("DMG-wall".to_string(), "wall".to_string())],
                &[DecisionVariable::Cost],
            )
            .unwrap();
        assessment.calculate_repair().unwrap();

        let damage = assessment.damage.sample.as_ref().unwrap();
        let damaged = damage.column(&["wall", "1", "1", "0", "1"]).unwrap();
        let cost = assessment
            .repair
            .sample
            .as_ref()
            .unwrap()
            .column(&["Cost", "wall", "wall", "1", "1", "1", "0"])
            .unwrap();
        for (quantity, cost) in damaged.iter().zip(cost) {
            assert_eq!(*cost, quantity * 100.0);
        }
        assert!(damaged.iter().any(|q| *q == 2.0));
        assert!(damaged.iter().any(|q| *q == 0.0));
    }
}
