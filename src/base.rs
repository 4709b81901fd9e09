//! Constants and small parsing helpers shared across the crate.

use std::path::Path;

use crate::PelicunError;

/// Long engineering demand parameter names and their short type codes.
pub const EDP_TO_DEMAND_TYPE: &[(&str, &str)] = &[
    // drifts
    ("Story Drift Ratio", "PID"),
    ("Peak Interstory Drift Ratio", "PID"),
    ("Roof Drift Ratio", "PRD"),
    ("Peak Roof Drift Ratio", "PRD"),
    ("Damageable Wall Drift", "DWD"),
    ("Racking Drift Ratio", "RDR"),
    ("Mega Drift Ratio", "PMD"),
    ("Residual Drift Ratio", "RID"),
    ("Residual Interstory Drift Ratio", "RID"),
    ("Peak Effective Drift Ratio", "EDR"),
    // floor response
    ("Peak Floor Acceleration", "PFA"),
    ("Peak Floor Velocity", "PFV"),
    ("Peak Floor Displacement", "PFD"),
    // component response
    ("Peak Link Rotation Angle", "LR"),
    ("Peak Link Beam Chord Rotation", "LBR"),
    // wind intensity
    ("Peak Gust Wind Speed", "PWS"),
    // inundation intensity
    ("Peak Inundation Height", "PIH"),
    // shaking intensity
    ("Peak Ground Acceleration", "PGA"),
    ("Peak Ground Velocity", "PGV"),
    ("Spectral Acceleration", "SA"),
    ("Spectral Velocity", "SV"),
    ("Spectral Displacement", "SD"),
    ("Peak Spectral Acceleration", "SA"),
    ("Peak Spectral Velocity", "SV"),
    ("Peak Spectral Displacement", "SD"),
    ("Permanent Ground Deformation", "PGD"),
    // placeholder for advanced calculations
    ("One", "ONE"),
];

pub fn edp_to_demand_type(edp_name: &str) -> Option<&'static str> {
    EDP_TO_DEMAND_TYPE
        .iter()
        .find(|(name, _)| *name == edp_name)
        .map(|(_, short)| *short)
}

/// First long name registered for a short demand type code.
pub fn demand_type_to_edp(short: &str) -> Option<&'static str> {
    EDP_TO_DEMAND_TYPE
        .iter()
        .find(|(_, code)| *code == short)
        .map(|(name, _)| *name)
}

pub fn str2bool(value: &str) -> Result<bool, PelicunError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" | "t" | "y" | "1" => Ok(true),
        "no" | "false" | "f" | "n" | "0" => Ok(false),
        _ => Err(PelicunError::parse("boolean value", value)),
    }
}

pub fn float_or_none(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok()
}

pub fn int_or_none(value: &str) -> Option<i64> {
    value.trim().parse::<i64>().ok()
}

/// Separates a file name from its extension, keeping periods that belong
/// to the name itself.
pub fn split_file_name(file_path: &Path) -> (String, String) {
    let name = file_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = file_path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    (name, extension)
}

fn parse_int_token(token: &str, what: &'static str) -> Result<i64, PelicunError> {
    let trimmed = token.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return Ok(value);
    }
    // accept integral floats such as "1.0" that spreadsheets like to produce
    match trimmed.parse::<f64>() {
        Ok(value) if value.fract() == 0.0 => Ok(value as i64),
        _ => Err(PelicunError::parse(what, token)),
    }
}

fn inclusive_range(low: i64, high: i64) -> Vec<String> {
    (low..=high).map(|value| value.to_string()).collect()
}

/// Expands a component location string into the list of story ids.
///
/// Accepted forms are a single integer, a range `a--b`, a comma-separated
/// list, and the keywords `all`, `top`, and `roof`.
pub fn parse_locations(loc: &str, stories: Option<usize>) -> Result<Vec<String>, PelicunError> {
    let loc = loc.trim();
    if let Ok(value) = parse_int_token(loc, "location") {
        return Ok(vec![value.to_string()]);
    }

    if let Some((low, high)) = loc.split_once("--") {
        let low = parse_locations(low, stories)?;
        let high = parse_locations(high, stories)?;
        let low = parse_int_token(&low[0], "location")?;
        let high = parse_int_token(&high[0], "location")?;
        return Ok(inclusive_range(low, high));
    }

    if loc.contains(',') {
        return loc
            .split(',')
            .map(|token| parse_int_token(token, "location").map(|v| v.to_string()))
            .collect();
    }

    let stories = || {
        stories.ok_or_else(|| {
            PelicunError::InvalidConfig(format!(
                "the number of stories is required to parse location `{loc}`"
            ))
        })
    };

    match loc {
        "all" => Ok(inclusive_range(1, stories()? as i64)),
        "top" => Ok(vec![stories()?.to_string()]),
        "roof" => Ok(vec![(stories()? + 1).to_string()]),
        _ => Err(PelicunError::parse("location", loc)),
    }
}

/// Expands a component direction string. Missing values default to `1`.
pub fn parse_directions(dir: Option<&str>) -> Result<Vec<String>, PelicunError> {
    let dir = match dir.map(str::trim) {
        None | Some("") => return Ok(vec!["1".to_string()]),
        Some(dir) => dir,
    };

    if let Ok(value) = parse_int_token(dir, "direction") {
        return Ok(vec![value.to_string()]);
    }

    if dir.contains(',') {
        return dir
            .split(',')
            .map(|token| parse_int_token(token, "direction").map(|v| v.to_string()))
            .collect();
    }

    if let Some((low, high)) = dir.split_once("--") {
        let low = parse_int_token(low, "direction")?;
        let high = parse_int_token(high, "direction")?;
        return Ok(inclusive_range(low, high));
    }

    Err(PelicunError::parse("direction", dir))
}

/// Parses the `Blocks` attribute into normalized block weights.
///
/// An integer gives that many equal blocks; a comma-separated list gives
/// the relative size of each block.
pub fn parse_blocks(blocks: Option<&str>) -> Result<Vec<f64>, PelicunError> {
    let blocks = match blocks.map(str::trim) {
        None | Some("") => return Ok(vec![1.0]),
        Some(blocks) => blocks,
    };

    if let Ok(count) = parse_int_token(blocks, "blocks") {
        if count < 1 {
            return Err(PelicunError::parse("blocks", blocks));
        }
        let count = count as usize;
        return Ok(vec![1.0 / count as f64; count]);
    }

    if blocks.contains(',') {
        let weights = blocks
            .split(',')
            .map(|token| {
                token
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| PelicunError::parse("blocks", blocks))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Err(PelicunError::parse("blocks", blocks));
        }
        return Ok(weights.iter().map(|w| w / total).collect());
    }

    Err(PelicunError::parse("blocks", blocks))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locations_cover_all_forms() {
        assert_eq!(parse_locations("3", None).unwrap(), vec!["3"]);
        assert_eq!(parse_locations("1--3", None).unwrap(), vec!["1", "2", "3"]);
        assert_eq!(parse_locations("2,4", None).unwrap(), vec!["2", "4"]);
        assert_eq!(parse_locations("all", Some(3)).unwrap(), vec!["1", "2", "3"]);
        assert_eq!(parse_locations("top", Some(3)).unwrap(), vec!["3"]);
        assert_eq!(parse_locations("roof", Some(3)).unwrap(), vec!["4"]);
        assert!(parse_locations("all", None).is_err());
        assert!(parse_locations("basement", Some(3)).is_err());
    }

    #[test]
    fn directions_default_to_one() {
        assert_eq!(parse_directions(None).unwrap(), vec!["1"]);
        assert_eq!(parse_directions(Some("")).unwrap(), vec!["1"]);
        assert_eq!(parse_directions(Some("1,2")).unwrap(), vec!["1", "2"]);
        assert_eq!(parse_directions(Some("1--3")).unwrap(), vec!["1", "2", "3"]);
        assert!(parse_directions(Some("x")).is_err());
    }

    #[test]
    fn blocks_are_normalized() {
        assert_eq!(parse_blocks(None).unwrap(), vec![1.0]);
        assert_eq!(parse_blocks(Some("4")).unwrap(), vec![0.25; 4]);
        let weights = parse_blocks(Some("1,3")).unwrap();
        assert!((weights[0] - 0.25).abs() < 1e-12);
        assert!((weights[1] - 0.75).abs() < 1e-12);
        assert!(parse_blocks(Some("0")).is_err());
    }

    #[test]
    fn bool_strings() {
        assert!(str2bool("Yes").unwrap());
        assert!(!str2bool("0").unwrap());
        assert!(str2bool("maybe").is_err());
    }

    #[test]
    fn edp_names_map_both_ways() {
        assert_eq!(edp_to_demand_type("Peak Floor Acceleration"), Some("PFA"));
        assert_eq!(demand_type_to_edp("PID"), Some("Story Drift Ratio"));
        assert_eq!(edp_to_demand_type("Unknown"), None);
    }

    #[test]
    fn file_name_keeps_inner_periods() {
        let (name, ext) = split_file_name(Path::new("/tmp/pelicun.log.txt"));
        assert_eq!(name, "pelicun.log");
        assert_eq!(ext, ".txt");
    }
}
