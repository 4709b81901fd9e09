//! Probabilistic models of the assessment stages: demands, component
//! quantities, damage, and repair consequences.
//!
//! Samples are stored in internal units. The `save_*` methods return the
//! samples converted back to the units given by the user.

mod asset;
mod damage;
mod demand;
mod loss;

pub use asset::{AssetModel, ComponentMarginal};
pub use damage::{DamageModel, Fragility, FragilitySource, LimitState};
pub use demand::{estimate_rid, DemandMarginal, DemandModel, DemandModelTables};
pub use loss::{
    Consequence, ConsequenceSource, DamageStateConsequence, DecisionVariable, Median, RepairModel,
};

use crate::table::Table;
use crate::units::UnitRegistry;
use crate::PelicunError;

/// Scales every column with a unit from that unit to internal units.
pub(crate) fn to_internal_units(table: &mut Table, units: &UnitRegistry) -> Result<(), PelicunError> {
    for pos in 0..table.ncols() {
        let factor = units.scale_factor(table.unit_at(pos))?;
        if factor != 1.0 {
            table.column_at_mut(pos).iter_mut().for_each(|v| *v *= factor);
        }
    }
    Ok(())
}

/// Copy of `table` with every column converted back to its own unit.
pub(crate) fn to_user_units(table: &Table, units: &UnitRegistry) -> Result<Table, PelicunError> {
    let mut out = table.clone();
    for pos in 0..out.ncols() {
        let factor = units.scale_factor(out.unit_at(pos))?;
        if factor != 1.0 {
            out.column_at_mut(pos).iter_mut().for_each(|v| *v /= factor);
        }
    }
    Ok(out)
}
