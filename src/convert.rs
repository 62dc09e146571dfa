//! Cost unit conversion.
//!
//! Measure costs are rewritten into the baseline's cost basis by chaining
//! conversion stages (for example `$/ft^2 glazing -> $/ft^2 wall -> $/ft^2
//! floor`) and then adjusting the cost year with CPI data.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MsegError, Result};
use crate::mseg::categories::Sector;
use crate::mseg::key::MicrosegmentKey;
use crate::mseg::value::Value;

/// Technology-nested factor fallback key.
const OTHER_TECHNOLOGIES: &str = "all other technologies";

/// Leading cost year followed by the cost basis.
static COST_UNITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d*)(.*)$").expect("cost unit regex is valid"));

/// Factor for one building type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BuildingFactor {
    Scalar(f64),
    /// Keyed by reference building type, or by technology substring when an
    /// "all other technologies" entry is present.
    Nested(BTreeMap<String, f64>),
    /// Sentinel such as "NA".
    Text(String),
}

/// Factor for one sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SectorFactor {
    Scalar(f64),
    ByBuilding(BTreeMap<String, BuildingFactor>),
}

/// Conversion factor of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Factor {
    Scalar(f64),
    BySector(BTreeMap<Sector, SectorFactor>),
}

/// One edge of the conversion graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionStage {
    #[serde(rename = "original units")]
    pub original_units: String,
    #[serde(rename = "revised units")]
    pub revised_units: String,
    #[serde(rename = "conversion factor")]
    pub factor: Factor,
}

/// Conversion stages plus reference-building weights.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionTable {
    #[serde(default)]
    pub stages: Vec<ConversionStage>,
    /// sector -> building type -> reference building type -> weight.
    #[serde(default)]
    pub building_type_weights: BTreeMap<Sector, BTreeMap<String, BTreeMap<String, f64>>>,
}

/// One consumer price index observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpiRow {
    #[serde(alias = "DATE")]
    pub date: String,
    #[serde(alias = "VALUE")]
    pub value: f64,
}

/// Splits `"2014$/ft^2 floor"` into `("2014", "$/ft^2 floor")`.
pub fn split_cost_units(units: &str) -> (String, String) {
    match COST_UNITS.captures(units) {
        Some(c) => (c[1].to_string(), c[2].to_string()),
        None => (String::new(), units.to_string()),
    }
}

impl Factor {
    fn resolve(&self, key: &MicrosegmentKey, table: &ConversionTable) -> Result<f64> {
        let by_sector = match self {
            Factor::Scalar(x) => return Ok(*x),
            Factor::BySector(m) => m,
        };
        let sector = key
            .sector()
            .ok_or_else(|| MsegError::missing("building sector", &key.building_type))?;
        let by_bldg = match by_sector.get(&sector) {
            Some(SectorFactor::Scalar(x)) => return Ok(*x),
            Some(SectorFactor::ByBuilding(m)) => m,
            None => return Err(MsegError::missing("conversion factor for sector", sector.as_str())),
        };
        match by_bldg.get(&key.building_type) {
            Some(BuildingFactor::Scalar(x)) => Ok(*x),
            Some(BuildingFactor::Nested(m)) if m.contains_key(OTHER_TECHNOLOGIES) => {
                let tech = key.technology.as_deref().unwrap_or_default();
                let hit = m
                    .iter()
                    .find(|(sub, _)| {
                        sub.as_str() != OTHER_TECHNOLOGIES && tech.contains(sub.as_str())
                    })
                    .map(|(_, v)| *v);
                Ok(hit.or_else(|| m.get(OTHER_TECHNOLOGIES).copied()).unwrap_or(1.0))
            }
            Some(BuildingFactor::Nested(m)) => {
                let weights = table
                    .building_type_weights
                    .get(&sector)
                    .and_then(|b| b.get(&key.building_type))
                    .ok_or_else(|| {
                        MsegError::missing("building type conversion weights", &key.building_type)
                    })?;
                m.iter()
                    .map(|(reference, v)| {
                        weights
                            .get(reference)
                            .map(|w| v * w)
                            .ok_or_else(|| MsegError::missing("building type weight", reference))
                    })
                    .sum()
            }
            Some(BuildingFactor::Text(_)) | None => Err(MsegError::missing(
                "conversion factor for building type",
                &key.building_type,
            )),
        }
    }
}

impl ConversionTable {
    /// Shortest chain of `(stage index, forward)` steps from `from` to `to`.
    fn path(&self, from: &str, to: &str) -> Option<Vec<(usize, bool)>> {
        let mut prev: HashMap<&str, (&str, usize, bool)> = HashMap::new();
        let mut queue = VecDeque::from([from]);
        while let Some(basis) = queue.pop_front() {
            if basis == to {
                let mut steps = Vec::new();
                let mut at = to;
                while at != from {
                    let &(p, i, fwd) = prev.get(at)?;
                    steps.push((i, fwd));
                    at = p;
                }
                steps.reverse();
                return Some(steps);
            }
            for (i, s) in self.stages.iter().enumerate() {
                let next = if s.original_units == basis {
                    Some((s.revised_units.as_str(), true))
                } else if s.revised_units == basis {
                    Some((s.original_units.as_str(), false))
                } else {
                    None
                };
                if let Some((n, fwd)) = next
                    && n != from
                    && !prev.contains_key(n)
                {
                    prev.insert(n, (basis, i, fwd));
                    queue.push_back(n);
                }
            }
        }
        None
    }

    fn touches(&self, basis: &str) -> bool {
        self.stages
            .iter()
            .any(|s| s.original_units == basis || s.revised_units == basis)
    }
}

/// CPI value of the latest row for `year`, or of the latest row overall.
fn cpi_for(cpi: &[CpiRow], year: &str) -> Option<f64> {
    cpi.iter()
        .rev()
        .find(|r| r.date.contains(year))
        .or_else(|| cpi.last())
        .map(|r| r.value)
}

/// Converts a measure cost into the baseline cost units.
///
/// # Arguments
///
/// * `table` - Conversion stages and building-type weights
/// * `cpi` - Consumer price index rows, oldest first
/// * `cost` - Measure cost in `units`
/// * `units` - Measure cost units, e.g. `"2014$/ft^2 floor"`
/// * `key` - Microsegment the cost applies to
/// * `base_units` - Baseline cost units
/// * `measure` - Measure name, for error messages
///
/// # Returns
///
/// The converted cost and the baseline unit string.
///
/// # Errors
///
/// * [`MsegError::LookupMissing`] if no stage starts from the measure basis,
///   a factor lacks the key's sector, building type or technology, or CPI
///   data are absent.
/// * [`MsegError::UnitMismatch`] if no chain of stages reaches the baseline
///   basis.
pub fn convert_cost(
    table: &ConversionTable,
    cpi: &[CpiRow],
    cost: &Value,
    units: &str,
    key: &MicrosegmentKey,
    base_units: &str,
    measure: &str,
) -> Result<(Value, String)> {
    let (meas_year, meas_basis) = split_cost_units(units);
    let (base_year, base_basis) = split_cost_units(base_units);

    let mut factor = 1.0;
    if meas_basis != base_basis {
        if !table.touches(&meas_basis) {
            return Err(MsegError::missing("cost conversion data", &meas_basis));
        }
        let steps = table
            .path(&meas_basis, &base_basis)
            .ok_or_else(|| MsegError::UnitMismatch {
                measure: measure.to_string(),
                found: units.to_string(),
                expected: base_units.to_string(),
            })?;
        for (i, forward) in steps {
            let f = table.stages[i].factor.resolve(key, table)?;
            if forward {
                factor *= f;
            } else if f == 0.0 {
                return Err(MsegError::InvalidInput(format!(
                    "zero conversion factor from '{}' to '{}'",
                    table.stages[i].original_units, table.stages[i].revised_units
                )));
            } else {
                factor /= f;
            }
        }
    }

    if !meas_year.is_empty() && !base_year.is_empty() && meas_year != base_year {
        let base = cpi_for(cpi, &base_year);
        let meas = cpi_for(cpi, &meas_year);
        match (base, meas) {
            (Some(b), Some(m)) if m != 0.0 => factor *= b / m,
            _ => return Err(MsegError::missing("CPI data for cost year", &meas_year)),
        }
    }

    let converted = cost * factor;
    debug!(
        measure,
        building_type = %key.building_type,
        from = units,
        to = base_units,
        factor,
        "cost converted"
    );
    Ok((converted, base_units.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mseg::key::{MsegKind, Structure, TechType};
    use approx::assert_relative_eq;

    fn key(bldg: &str, tech: &str) -> MicrosegmentKey {
        MicrosegmentKey {
            kind: MsegKind::Primary,
            climate_zone: "AIA_CZ1".into(),
            building_type: bldg.into(),
            fuel: "electricity".into(),
            end_use: "heating".into(),
            technology_type: Some(TechType::Demand),
            technology: Some(tech.into()),
            structure: Structure::Existing,
        }
    }

    fn table() -> ConversionTable {
        serde_json::from_str(
            r#"{
              "stages": [
                {"original units": "$/ft^2 glazing", "revised units": "$/ft^2 wall",
                 "conversion factor": {
                   "residential": {"single family home": 0.15},
                   "commercial": {
                     "assembly": {"FullServiceRestaurant": 0.2, "Hospital": 0.4},
                     "education": "NA"}}},
                {"original units": "$/ft^2 wall", "revised units": "$/ft^2 floor",
                 "conversion factor": {"residential": 1.5, "commercial": 0.5}},
                {"original units": "$/ft^2 floor", "revised units": "$/unit",
                 "conversion factor": {"residential": {"single family home": 2000.0}}},
                {"original units": "$/node", "revised units": "$/ft^2 floor",
                 "conversion factor": {"commercial": {"assembly": {
                   "lighting": 0.01, "all other technologies": 0.02}}}}
              ],
              "building_type_weights": {"commercial": {"assembly": {
                "FullServiceRestaurant": 0.5, "Hospital": 0.5}}}
            }"#,
        )
        .unwrap()
    }

    /// Converts a scalar cost without CPI data.
    fn convert(cost: f64, units: &str, k: &MicrosegmentKey, base: &str) -> Result<f64> {
        convert_cost(&table(), &[], &Value::Scalar(cost), units, k, base, "m")
            .map(|(v, _)| v.mean())
    }

    #[test]
    fn splits_year_from_basis() {
        let s = split_cost_units("2014$/ft^2 floor");
        assert_eq!(s, ("2014".to_string(), "$/ft^2 floor".to_string()));
        let s = split_cost_units("$/unit");
        assert_eq!(s, (String::new(), "$/unit".to_string()));
    }

    #[test]
    fn multi_stage_chain_multiplies_factors() {
        let t = table();
        let k = key("single family home", "windows conduction");
        let (v, units) =
            convert_cost(&t, &[], &Value::Scalar(10.0), "$/ft^2 glazing", &k, "$/unit", "w")
                .unwrap();
        assert_relative_eq!(v.mean(), 10.0 * 0.15 * 1.5 * 2000.0, epsilon = 1e-9);
        assert_eq!(units, "$/unit");
    }

    #[test]
    fn reference_building_weights_apply() {
        let k = key("assembly", "windows solar");
        let out = convert(1.0, "$/ft^2 glazing", &k, "$/ft^2 floor").unwrap();
        assert_relative_eq!(out, (0.2 * 0.5 + 0.4 * 0.5) * 0.5, epsilon = 1e-12);
    }

    #[test]
    fn technology_nested_factor_falls_back() {
        let lit = convert(1.0, "$/node", &key("assembly", "lighting gain"), "$/ft^2 floor");
        assert_eq!(lit.unwrap(), 0.01);
        let other = convert(1.0, "$/node", &key("assembly", "roof"), "$/ft^2 floor");
        assert_eq!(other.unwrap(), 0.02);
    }

    #[test]
    fn round_trip_restores_cost() {
        let t = table();
        let k = key("single family home", "wall");
        let (v, u) =
            convert_cost(&t, &[], &Value::Scalar(7.0), "$/ft^2 glazing", &k, "$/ft^2 floor", "r")
                .unwrap();
        let (back, _) = convert_cost(&t, &[], &v, &u, &k, "$/ft^2 glazing", "r").unwrap();
        assert_relative_eq!(back.mean(), 7.0, epsilon = 1e-9);
    }

    #[test]
    fn unknown_basis_is_lookup_missing() {
        let k = key("single family home", "wall");
        let r = convert(1.0, "$/gizmo", &k, "$/unit");
        assert!(matches!(r, Err(MsegError::LookupMissing { .. })));
    }

    #[test]
    fn unreachable_basis_is_unit_mismatch() {
        let k = key("single family home", "wall");
        let r = convert(1.0, "$/ft^2 wall", &k, "$/kBtu/h heating");
        assert!(matches!(r, Err(MsegError::UnitMismatch { .. })));
    }

    #[test]
    fn na_factor_is_lookup_missing() {
        let r = convert(1.0, "$/ft^2 glazing", &key("education", "roof"), "$/ft^2 wall");
        assert!(matches!(r, Err(MsegError::LookupMissing { .. })));
    }

    #[test]
    fn cost_year_uses_latest_cpi_row() {
        let row = |date: &str, value| CpiRow { date: date.into(), value };
        let cpi = vec![
            row("2013-01-01", 230.0),
            row("2013-12-01", 233.0),
            row("2015-12-01", 237.0),
        ];
        let k = key("single family home", "wall");
        let t = ConversionTable::default();
        let cost = Value::Scalar(100.0);
        let (v, u) = convert_cost(&t, &cpi, &cost, "2015$/unit", &k, "2013$/unit", "c").unwrap();
        assert_relative_eq!(v.mean(), 100.0 * 233.0 / 237.0, epsilon = 1e-9);
        assert_eq!(u, "2013$/unit");
        // a year absent from the CPI rows uses the latest row overall
        let (v, _) = convert_cost(&t, &cpi, &cost, "2099$/unit", &k, "2013$/unit", "c").unwrap();
        assert_relative_eq!(v.mean(), 100.0 * 233.0 / 237.0, epsilon = 1e-9);
    }
}
