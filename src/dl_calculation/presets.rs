//! Built-in damage processes, database names, and output configurations.

use serde_json::{json, Value};

/// Damage process of a named assessment method.
pub fn damage_process(method: &str) -> Option<Value> {
    match method {
        "FEMA P-58" => Some(json!({
            "1_excessive.coll.DEM": {"DS1": "collapse_DS1"},
            "2_collapse": {"DS1": "ALL_NA"},
            "3_excessiveRID": {"DS1": "irreparable_DS1"}
        })),
        // component ids are substituted from the asset model
        "Hazus Earthquake" => Some(json!({
            "1_STR": {"DS5": "collapse_DS1"},
            "2_LF": {"DS5": "collapse_DS1"},
            "3_excessive.coll.DEM": {"DS1": "collapse_DS1"},
            "4_collapse": {"DS1": "ALL_NA"},
            "5_excessiveRID": {"DS1": "irreparable_DS1"}
        })),
        "Hazus Hurricane" => Some(json!({})),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseKind {
    Fragility,
    Repair,
}

/// File name of a named default database.
pub fn default_database(kind: DatabaseKind, name: &str) -> Option<&'static str> {
    let file = match (kind, name) {
        (DatabaseKind::Fragility, "FEMA P-58") => "damage_DB_FEMA_P58_2nd.csv",
        (DatabaseKind::Fragility, "Hazus Earthquake - Buildings") => "damage_DB_Hazus_EQ_bldg.csv",
        (DatabaseKind::Fragility, "Hazus Earthquake - Stories") => "damage_DB_Hazus_EQ_story.csv",
        (DatabaseKind::Fragility, "Hazus Earthquake - Transportation") => "damage_DB_Hazus_EQ_trnsp.csv",
        (DatabaseKind::Fragility, "Hazus Earthquake - Water") => "damage_DB_Hazus_EQ_water.csv",
        (DatabaseKind::Fragility, "Hazus Hurricane") => "damage_DB_SimCenter_Hazus_HU_bldg.csv",
        (DatabaseKind::Repair, "FEMA P-58") => "loss_repair_DB_FEMA_P58_2nd.csv",
        (DatabaseKind::Repair, "Hazus Earthquake - Buildings") => "loss_repair_DB_Hazus_EQ_bldg.csv",
        (DatabaseKind::Repair, "Hazus Earthquake - Stories") => "loss_repair_DB_Hazus_EQ_story.csv",
        (DatabaseKind::Repair, "Hazus Earthquake - Transportation") => "loss_repair_DB_Hazus_EQ_trnsp.csv",
        (DatabaseKind::Repair, "Hazus Hurricane") => "loss_repair_DB_SimCenter_Hazus_HU_bldg.csv",
        _ => return None,
    };
    Some(file)
}

/// Every output, written as CSV and JSON.
pub fn full_output_config() -> Value {
    json!({
        "Demand": {"Sample": true, "Statistics": true},
        "Asset": {"Sample": true, "Statistics": true},
        "Damage": {
            "Sample": true,
            "Statistics": true,
            "GroupedSample": true,
            "GroupedStatistics": true
        },
        "Loss": {
            "Repair": {
                "Sample": true,
                "Statistics": true,
                "GroupedSample": true,
                "GroupedStatistics": true,
                "AggregateSample": true,
                "AggregateStatistics": true
            }
        },
        "Format": {"CSV": true, "JSON": true}
    })
}

/// Lean outputs for regional simulations.
pub fn regional_output_config() -> Value {
    json!({
        "Demand": {"Sample": true, "Statistics": false},
        "Asset": {"Sample": true, "Statistics": false},
        "Damage": {
            "Sample": false,
            "Statistics": false,
            "GroupedSample": true,
            "GroupedStatistics": true
        },
        "Loss": {
            "Repair": {
                "Sample": true,
                "Statistics": true,
                "GroupedSample": true,
                "GroupedStatistics": false,
                "AggregateSample": true,
                "AggregateStatistics": true
            }
        },
        "Format": {"CSV": false, "JSON": true},
        "Settings": {
            "CondenseDS": true,
            "SimpleIndexInJSON": true,
            "AggregateColocatedComponentResults": true
        }
    })
}

pub fn pbe_settings() -> Value {
    json!({
        "CondenseDS": false,
        "SimpleIndexInJSON": false,
        "AggregateColocatedComponentResults": true
    })
}

/// Every file the tool can write, in the order they are produced.
pub const OUTPUT_FILES: [&str; 16] = [
    "DEM_sample.zip",
    "DEM_stats.csv",
    "CMP_sample.zip",
    "CMP_stats.csv",
    "DMG_sample.zip",
    "DMG_stats.csv",
    "DMG_grp.zip",
    "DMG_grp_stats.csv",
    "DV_repair_sample.zip",
    "DV_repair_stats.csv",
    "DV_repair_grp.zip",
    "DV_repair_grp_stats.csv",
    "DV_repair_agg.zip",
    "DV_repair_agg_stats.csv",
    "DL_summary.csv",
    "DL_summary_stats.csv",
];
