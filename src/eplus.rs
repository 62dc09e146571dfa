//! Relative savings from EnergyPlus reference-building simulations.
//!
//! Simulation results arrive pre-parsed as [`EplusRow`]s: one row per
//! reference building, climate zone, vintage template and simulated measure
//! (`"none"` for the baseline run). Rows are blended into one relative
//! savings value per microsegment using reference-building weights and
//! CBECS-derived vintage weights, see [`vintage_weights`].

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{MsegError, Result};
use crate::measure::{Keyed, Measure};
use crate::mseg::key::{Applicability, MsegKind, Structure};
use crate::perf::PerfUnits;
use crate::sample::Param;

/// Template simulated for new construction.
pub const NEW_TEMPLATE: &str = "90.1-2013";

/// Templates simulated for existing buildings, with the `[low, high)`
/// construction-year range each one stands for.
pub const RETROFIT_TEMPLATES: [(&str, f64, f64); 4] = [
    ("90.1-2004", 2004.0, 2009.0),
    ("90.1-2010", 2010.0, 2012.0),
    ("DOE Ref 1980-2004", 1980.0, 2003.0),
    ("DOE Ref Pre-1980", 0.0, 1979.0),
];

/// Measure name of baseline simulation rows.
pub const BASELINE_RUN: &str = "none";

const COMPLETED: &str = "completed normal";
const WEIGHT_TOLERANCE: f64 = 1e-9;

/// CBECS vintage bin labels such as `"1960 to 1969"` or `"Before 1920"`.
static VINTAGE_BIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\D*)(\d*)(\s*)(\D*)(\s*)(\d*)").expect("vintage bin regex is valid")
});

/// Template name -> weight within its structure type.
pub type VintageWeights = BTreeMap<String, f64>;

fn completed() -> String {
    COMPLETED.to_string()
}

/// One simulation result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EplusRow {
    pub building_type: String,
    pub climate_zone: String,
    pub template: String,
    pub measure: String,
    #[serde(default = "completed")]
    pub status: String,
    /// Annual consumption by column, e.g. `heating_gas`.
    pub energy: BTreeMap<String, f64>,
}

/// Simulation results together with the CBECS floor area by vintage bin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EplusData {
    pub rows: Vec<EplusRow>,
    /// Floor area keyed by CBECS bin label, e.g. `"1960 to 1969"` or
    /// `"Before 1920"`.
    pub cbecs_floor_area: BTreeMap<String, f64>,
}

/// Reference buildings simulated for a building type and the share of the
/// building type each one represents.
pub fn reference_buildings(bldg_type: &str) -> Option<&'static [(&'static str, f64)]> {
    Some(match bldg_type {
        "assembly" => &[("Hospital", 1.0)],
        "education" => &[("PrimarySchool", 0.26), ("SecondarySchool", 0.74)],
        "food sales" => &[("Supermarket", 1.0)],
        "food service" => &[("QuickServiceRestaurant", 0.31), ("FullServiceRestaurant", 0.69)],
        "lodging" => &[("SmallHotel", 0.26), ("LargeHotel", 0.74)],
        "large office" => &[("LargeOffice", 0.9), ("MediumOffice", 0.1)],
        "small office" => &[("SmallOffice", 0.12), ("OutpatientHealthcare", 0.88)],
        "mercantile/service" => &[("RetailStandalone", 0.53), ("RetailStripmall", 0.47)],
        "warehouse" => &[("Warehouse", 1.0)],
        _ => return None,
    })
}

fn fuel_tag(fuel: &str) -> Option<&'static str> {
    Some(match fuel {
        "electricity" => "electricity",
        "natural gas" => "gas",
        "distillate" => "other_fuel",
        _ => return None,
    })
}

fn end_use_columns(end_use: &str) -> &'static [&'static str] {
    match end_use {
        "heating" => &[
            "heating_electricity",
            "heat_recovery_electricity",
            "humidification_electricity",
            "pump_electricity",
            "heating_gas",
            "heating_other_fuel",
        ],
        "cooling" => &[
            "cooling_electricity",
            "pump_electricity",
            "heat_rejection_electricity",
        ],
        "water heating" => &[
            "service_water_heating_electricity",
            "service_water_heating_gas",
            "service_water_heating_other_fuel",
        ],
        "ventilation" => &["fan_electricity"],
        "cooking" => &["interior_equipment_gas", "interior_equipment_other_fuel"],
        "lighting" => &["interior_lighting_electricity"],
        "refrigeration" => &["refrigeration_electricity"],
        "PCs" | "non-PC office equipment" | "MELs" => &["interior_equipment_electricity"],
        _ => &[],
    }
}

/// Consumption columns for one fuel and end use.
///
/// Empty when the simulations do not report the combination, as for natural
/// gas cooling.
pub fn columns(fuel: &str, end_use: &str) -> Vec<&'static str> {
    let Some(tag) = fuel_tag(fuel) else {
        return Vec::new();
    };
    end_use_columns(end_use)
        .iter()
        .copied()
        .filter(|c| c.ends_with(tag))
        .collect()
}

fn templates(structure: Structure) -> Vec<&'static str> {
    match structure {
        Structure::New => vec![NEW_TEMPLATE],
        Structure::Existing => RETROFIT_TEMPLATES.iter().map(|t| t.0).collect(),
    }
}

/// Derives vintage-template weights from CBECS floor area by vintage bin.
///
/// The new-construction template weighs 1. Each retrofit template collects
/// the floor area of the bins whose mid-year falls within its range; the
/// retrofit weights are then normalized by the total retrofit floor area.
///
/// # Errors
///
/// Returns [`MsegError::InvalidInput`] if a bin label carries no year, no bin
/// maps onto a retrofit template, or the weights of either structure type do
/// not sum to 1.
pub fn vintage_weights(cbecs: &BTreeMap<String, f64>) -> Result<VintageWeights> {
    let mut weights: VintageWeights = RETROFIT_TEMPLATES
        .iter()
        .map(|t| (t.0.to_string(), 0.0))
        .collect();
    let mut total_retro = 0.0;

    for (label, &area) in cbecs {
        let caps = VINTAGE_BIN
            .captures(label)
            .ok_or_else(|| {
                MsegError::InvalidInput(format!("unreadable CBECS vintage bin '{label}'"))
            })?;
        let low: f64 = caps
            .get(2)
            .map(|m| m.as_str())
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                MsegError::InvalidInput(format!("CBECS vintage bin '{label}' has no year"))
            })?;
        // "Before 1920" has no upper year; count it as 0
        let high: f64 = caps
            .get(6)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0.0);
        let mid = (low + high) / 2.0;
        for (template, from, to) in RETROFIT_TEMPLATES {
            if mid >= from && mid < to {
                *weights.entry(template.to_string()).or_default() += area;
                total_retro += area;
            }
        }
    }

    if total_retro <= 0.0 {
        return Err(MsegError::InvalidInput(
            "no CBECS floor area maps onto a retrofit template".into(),
        ));
    }
    for w in weights.values_mut() {
        *w /= total_retro;
    }
    let retro_sum: f64 = weights.values().sum();
    weights.insert(NEW_TEMPLATE.to_string(), 1.0);
    let new_sum = weights.get(NEW_TEMPLATE).copied().unwrap_or_default();

    if (new_sum - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(MsegError::InvalidInput(format!(
            "new vintage weights sum to {new_sum}"
        )));
    }
    if (retro_sum - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(MsegError::InvalidInput(format!(
            "retrofit vintage weights sum to {retro_sum}"
        )));
    }
    debug!(?weights, "vintage weights derived");
    Ok(weights)
}

/// Which simulated segment to blend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EplusSelection<'a> {
    pub climate_zone: &'a str,
    pub building_type: &'a str,
    pub fuel: &'a str,
    pub end_use: &'a str,
    pub structure: Structure,
}

/// Relative savings `(base - measure) / base` for one segment, rounded to
/// three decimals.
///
/// `rows` should hold the baseline rows and the rows of a single measure.
/// Consumption is summed over the matching rows and columns, each row weighed
/// by its reference-building share and its vintage weight. A zero baseline
/// gives zero savings.
///
/// # Errors
///
/// * [`MsegError::LookupMissing`] if the building type has no reference
///   buildings or a template has no vintage weight.
/// * [`MsegError::InvalidInput`] if the fuel and end use have no columns, no
///   rows match, or measure and baseline rows differ in number.
pub fn relative_savings(
    rows: &[&EplusRow],
    sel: EplusSelection<'_>,
    weights: &VintageWeights,
) -> Result<f64> {
    let refs = reference_buildings(sel.building_type)
        .ok_or_else(|| MsegError::missing("EnergyPlus reference buildings", sel.building_type))?;
    let cols = columns(sel.fuel, sel.end_use);
    if cols.is_empty() {
        return Err(MsegError::InvalidInput(format!(
            "no EnergyPlus columns for {} {}",
            sel.fuel, sel.end_use
        )));
    }
    let wanted = templates(sel.structure);

    let mut n_measure = 0usize;
    let mut n_base = 0usize;
    let mut val_measure = 0.0;
    let mut val_base = 0.0;
    for row in rows {
        if row.climate_zone != sel.climate_zone || !wanted.contains(&row.template.as_str()) {
            continue;
        }
        let bldg = refs.iter().find(|(name, _)| *name == row.building_type);
        let Some(&(_, bldg_weight)) = bldg else {
            continue;
        };
        let vintage = weights
            .get(&row.template)
            .ok_or_else(|| MsegError::missing("vintage weight", &row.template))?;
        let consumption: f64 = cols
            .iter()
            .filter_map(|c| row.energy.get(*c))
            .sum::<f64>()
            * bldg_weight
            * vintage;
        if row.measure == BASELINE_RUN {
            n_base += 1;
            val_base += consumption;
        } else {
            n_measure += 1;
            val_measure += consumption;
        }
    }

    if n_base == 0 {
        return Err(MsegError::InvalidInput(format!(
            "no EnergyPlus rows for {} {} {}",
            sel.climate_zone, sel.building_type, sel.structure
        )));
    }
    if n_measure != n_base {
        return Err(MsegError::InvalidInput(format!(
            "{n_measure} measure rows against {n_base} baseline rows for {} {} {}",
            sel.climate_zone, sel.building_type, sel.structure
        )));
    }
    if val_base == 0.0 {
        return Ok(0.0);
    }
    Ok((((val_base - val_measure) / val_base) * 1000.0).round() / 1000.0)
}

fn insert_path<T>(root: &mut BTreeMap<String, Keyed<T>>, path: &[&str], value: T) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut node = root;
    for p in parents {
        let entry = node
            .entry(p.to_string())
            .or_insert_with(|| Keyed::Nested(BTreeMap::new()));
        if matches!(entry, Keyed::Value(_)) {
            *entry = Keyed::Nested(BTreeMap::new());
        }
        let Keyed::Nested(next) = entry else {
            return;
        };
        node = next;
    }
    node.insert(last.to_string(), Keyed::Value(value));
}

impl Measure {
    /// Replaces the measure's performance with relative savings blended from
    /// EnergyPlus results.
    ///
    /// The new performance is nested by key kind, climate zone, building
    /// type, fuel, end use and structure type; its units become constant
    /// relative savings. Natural gas cooling is not simulated and is left
    /// out.
    ///
    /// # Errors
    ///
    /// * [`MsegError::InvalidMeasure`] if the measure was already filled,
    ///   names no EnergyPlus measure, or none of its building types has
    ///   results.
    /// * Any error of [`Applicability::resolve`] or [`relative_savings`].
    pub fn fill_eplus(&mut self, data: &EplusData, weights: &VintageWeights) -> Result<()> {
        let name = self.name().to_string();
        if self.finalized {
            return Err(MsegError::invalid_measure(&name, "measure has already been filled"));
        }
        let Some(run) = self.definition.energyplus_file.clone() else {
            return Err(MsegError::invalid_measure(&name, "no EnergyPlus measure named"));
        };
        let app = Applicability::resolve(&self.definition.declaration(), &name)?;

        let rows: Vec<&EplusRow> = data
            .rows
            .iter()
            .filter(|r| r.status == COMPLETED && (r.measure == run || r.measure == BASELINE_RUN))
            .collect();
        let simulated = app.building_types.iter().any(|b| {
            reference_buildings(b).is_some_and(|refs| {
                rows.iter()
                    .any(|r| refs.iter().any(|(n, _)| *n == r.building_type))
            })
        });
        if !simulated {
            return Err(MsegError::invalid_measure(
                &name,
                format!("no EnergyPlus results for building types {:?}", app.building_types),
            ));
        }

        let mut perf: BTreeMap<String, Keyed<Param>> = BTreeMap::new();
        let mut filled = 0usize;
        for kind in [MsegKind::Primary, MsegKind::Secondary] {
            for key in app.keychain(kind) {
                if key.fuel == "natural gas" && key.end_use == "cooling" {
                    continue;
                }
                let path = [
                    key.kind.as_str(),
                    key.climate_zone.as_str(),
                    key.building_type.as_str(),
                    key.fuel.as_str(),
                    key.end_use.as_str(),
                    key.structure.as_str(),
                ];
                if perf_has(&perf, &path) {
                    continue;
                }
                let sel = EplusSelection {
                    climate_zone: &key.climate_zone,
                    building_type: &key.building_type,
                    fuel: &key.fuel,
                    end_use: &key.end_use,
                    structure: key.structure,
                };
                let savings = relative_savings(&rows, sel, weights)?;
                insert_path(&mut perf, &path, Param::Point(savings));
                filled += 1;
            }
        }

        self.definition.energy_efficiency = Keyed::Nested(perf);
        self.definition.energy_efficiency_units = Keyed::Value(PerfUnits::relative_constant());
        info!(
            measure = %name,
            run = %run,
            segments = filled,
            "performance set from EnergyPlus results"
        );
        Ok(())
    }
}

fn perf_has<T>(root: &BTreeMap<String, Keyed<T>>, path: &[&str]) -> bool {
    let mut node = root;
    for (i, p) in path.iter().enumerate() {
        match node.get(*p) {
            Some(Keyed::Nested(next)) => node = next,
            Some(Keyed::Value(_)) => return i + 1 == path.len(),
            None => return false,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cbecs() -> BTreeMap<String, f64> {
        [
            ("Before 1920", 1.0),
            ("1920 to 1945", 2.0),
            ("1946 to 1959", 3.0),
            ("1960 to 1969", 4.0),
            ("1970 to 1979", 5.0),
            ("1980 to 1989", 6.0),
            ("1990 to 1999", 7.0),
            ("2000 to 2003", 8.0),
            ("2004 to 2007", 9.0),
            ("2008 to 2012", 10.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    fn row(bldg: &str, template: &str, measure: &str, heating_gas: f64) -> EplusRow {
        EplusRow {
            building_type: bldg.into(),
            climate_zone: "AIA_CZ2".into(),
            template: template.into(),
            measure: measure.into(),
            status: COMPLETED.into(),
            energy: [
                ("heating_gas".to_string(), heating_gas),
                ("heating_electricity".to_string(), 1.0),
            ]
            .into_iter()
            .collect(),
        }
    }

    #[test]
    fn vintage_weights_sum_to_one() {
        let w = vintage_weights(&cbecs()).unwrap();
        assert_eq!(w.get(NEW_TEMPLATE), Some(&1.0));
        let retro: f64 = RETROFIT_TEMPLATES.iter().filter_map(|t| w.get(t.0)).sum();
        assert_relative_eq!(retro, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn vintage_bins_land_by_mid_year() {
        let w = vintage_weights(&cbecs()).unwrap();
        // total retrofit area 55: pre-1980 bins hold 15, 1980-2003 hold 21,
        // 2004-2007 holds 9 and 2008-2012 (mid 2010) holds 10
        assert_relative_eq!(w["DOE Ref Pre-1980"], 15.0 / 55.0);
        assert_relative_eq!(w["DOE Ref 1980-2004"], 21.0 / 55.0);
        assert_relative_eq!(w["90.1-2004"], 9.0 / 55.0);
        assert_relative_eq!(w["90.1-2010"], 10.0 / 55.0);
    }

    #[test]
    fn unreadable_bin_is_rejected() {
        let cbecs: BTreeMap<String, f64> = [("unknown".to_string(), 1.0)].into_iter().collect();
        assert!(matches!(vintage_weights(&cbecs), Err(MsegError::InvalidInput(_))));
    }

    #[test]
    fn gas_cooling_has_no_columns() {
        assert!(columns("natural gas", "cooling").is_empty());
        assert_eq!(columns("natural gas", "heating"), vec!["heating_gas"]);
        assert_eq!(
            columns("distillate", "water heating"),
            vec!["service_water_heating_other_fuel"]
        );
    }

    #[test]
    fn savings_blend_reference_buildings() {
        let weights = vintage_weights(&cbecs()).unwrap();
        let rows = [
            row("PrimarySchool", NEW_TEMPLATE, BASELINE_RUN, 10.0),
            row("PrimarySchool", NEW_TEMPLATE, "Better Boiler", 5.0),
            row("SecondarySchool", NEW_TEMPLATE, BASELINE_RUN, 10.0),
            row("SecondarySchool", NEW_TEMPLATE, "Better Boiler", 9.0),
        ];
        let refs: Vec<&EplusRow> = rows.iter().collect();
        let sel = EplusSelection {
            climate_zone: "AIA_CZ2",
            building_type: "education",
            fuel: "natural gas",
            end_use: "heating",
            structure: Structure::New,
        };
        let s = relative_savings(&refs, sel, &weights).unwrap();
        // base 10; measure 0.26 * 5 + 0.74 * 9 = 7.96
        assert_eq!(s, 0.204);
    }

    #[test]
    fn unequal_row_counts_are_rejected() {
        let weights = vintage_weights(&cbecs()).unwrap();
        let rows = [
            row("Warehouse", NEW_TEMPLATE, BASELINE_RUN, 10.0),
            row("Warehouse", NEW_TEMPLATE, "Seal", 5.0),
            row("Warehouse", NEW_TEMPLATE, "Seal", 6.0),
        ];
        let refs: Vec<&EplusRow> = rows.iter().collect();
        let sel = EplusSelection {
            climate_zone: "AIA_CZ2",
            building_type: "warehouse",
            fuel: "natural gas",
            end_use: "heating",
            structure: Structure::New,
        };
        let r = relative_savings(&refs, sel, &weights);
        assert!(matches!(r, Err(MsegError::InvalidInput(_))));
    }

    #[test]
    fn zero_baseline_gives_zero_savings() {
        let weights = vintage_weights(&cbecs()).unwrap();
        let rows = [
            row("Warehouse", NEW_TEMPLATE, BASELINE_RUN, 0.0),
            row("Warehouse", NEW_TEMPLATE, "Seal", 0.0),
        ];
        let refs: Vec<&EplusRow> = rows.iter().collect();
        let sel = EplusSelection {
            climate_zone: "AIA_CZ2",
            building_type: "warehouse",
            fuel: "natural gas",
            end_use: "heating",
            structure: Structure::New,
        };
        assert_eq!(relative_savings(&refs, sel, &weights).unwrap(), 0.0);
    }

    #[test]
    fn nested_paths_are_built() {
        let mut root: BTreeMap<String, Keyed<f64>> = BTreeMap::new();
        insert_path(&mut root, &["primary", "AIA_CZ1", "new"], 0.1);
        insert_path(&mut root, &["primary", "AIA_CZ1", "existing"], 0.2);
        assert!(perf_has(&root, &["primary", "AIA_CZ1", "new"]));
        assert!(!perf_has(&root, &["primary", "AIA_CZ2", "new"]));
        assert_eq!(Keyed::Nested(root).values().len(), 2);
    }
}
