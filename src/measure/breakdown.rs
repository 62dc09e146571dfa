//! Output breakdown of a measure's baseline energy by reporting category.
//!
//! Reporting categories are coarser than microsegment keys: climate zones are
//! relabeled, building types collapse to sector and vintage, and end uses and
//! technologies collapse to a short list of reporting end uses.

use std::collections::BTreeMap;

use crate::error::{MsegError, Result};
use crate::mseg::categories::Sector;
use crate::mseg::key::{MicrosegmentKey, Structure};
use crate::mseg::value::YearMap;

/// climate zone -> building class -> end use -> per-year share.
pub type Breakdown = BTreeMap<String, BTreeMap<String, BTreeMap<String, YearMap>>>;

fn climate_zone(cz: &str) -> Option<&'static str> {
    Some(match cz {
        "AIA_CZ1" => "AIA CZ1",
        "AIA_CZ2" => "AIA CZ2",
        "AIA_CZ3" => "AIA CZ3",
        "AIA_CZ4" => "AIA CZ4",
        "AIA_CZ5" => "AIA CZ5",
        _ => return None,
    })
}

fn building_class(key: &MicrosegmentKey) -> Option<&'static str> {
    Some(match (key.sector()?, key.structure) {
        (Sector::Residential, Structure::New) => "Residential (New)",
        (Sector::Residential, Structure::Existing) => "Residential (Existing)",
        (Sector::Commercial, Structure::New) => "Commercial (New)",
        (Sector::Commercial, Structure::Existing) => "Commercial (Existing)",
    })
}

fn end_use(key: &MicrosegmentKey) -> Option<&'static str> {
    let tech = key.technology.as_deref().unwrap_or_default();
    Some(match key.end_use.as_str() {
        "heating" | "secondary heating" => "Heating",
        "cooling" => "Cooling",
        "ventilation" => "Ventilation",
        "lighting" => "Lighting",
        "water heating" => "Water Heating",
        "refrigeration" => "Refrigeration",
        "other (grid electric)" if tech == "freezers" => "Refrigeration",
        "PCs" | "non-PC office equipment" | "TVs" | "computers" => "Computers and Electronics",
        "cooking" | "drying" | "MELs" | "other (grid electric)" => "Other",
        "fans & pumps" | "ceiling fan" => "Other",
        _ => return None,
    })
}

/// Reporting categories of a key, if it maps onto one.
pub fn categories(key: &MicrosegmentKey) -> Option<(&'static str, &'static str, &'static str)> {
    Some((climate_zone(&key.climate_zone)?, building_class(key)?, end_use(key)?))
}

/// Adds a key's baseline energy to its reporting category.
///
/// # Errors
///
/// * [`MsegError::LookupMissing`] if the key maps onto no reporting
///   category.
/// * [`MsegError::ShapeMismatch`] if the energy series disagrees in years or
///   sample count with what the category already holds.
pub fn add(breakdown: &mut Breakdown, key: &MicrosegmentKey, energy: &YearMap) -> Result<()> {
    let (cz, bldg, eu) =
        categories(key).ok_or_else(|| MsegError::missing("output breakdown category", key))?;
    let slot = breakdown
        .entry(cz.to_string())
        .or_default()
        .entry(bldg.to_string())
        .or_default();
    match slot.get(eu) {
        Some(existing) => {
            let summed = existing.try_add(energy)?;
            slot.insert(eu.to_string(), summed);
        }
        None => {
            slot.insert(eu.to_string(), energy.clone());
        }
    }
    Ok(())
}

/// Converts category energy into shares of `total`.
///
/// # Errors
///
/// Returns [`MsegError::ShapeMismatch`] if a category's years differ from
/// `total`'s.
pub fn normalize(breakdown: &mut Breakdown, total: &YearMap) -> Result<()> {
    for bldgs in breakdown.values_mut() {
        for eus in bldgs.values_mut() {
            for share in eus.values_mut() {
                *share = share.div_keyvals(total)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mseg::key::{MsegKind, TechType};
    use crate::mseg::value::Value;

    fn key(bldg: &str, eu: &str, tech: Option<&str>, structure: Structure) -> MicrosegmentKey {
        MicrosegmentKey {
            kind: MsegKind::Primary,
            climate_zone: "AIA_CZ3".into(),
            building_type: bldg.into(),
            fuel: "electricity".into(),
            end_use: eu.into(),
            technology_type: (eu == "heating").then_some(TechType::Supply),
            technology: tech.map(str::to_string),
            structure,
        }
    }

    #[test]
    fn maps_keys_to_reporting_categories() {
        let eu = "other (grid electric)";
        let k = key("single family home", eu, Some("freezers"), Structure::New);
        assert_eq!(categories(&k), Some(("AIA CZ3", "Residential (New)", "Refrigeration")));
        let k = key("large office", "MELs", None, Structure::Existing);
        assert_eq!(categories(&k), Some(("AIA CZ3", "Commercial (Existing)", "Other")));
        let k = key("large office", "PCs", None, Structure::Existing);
        assert_eq!(categories(&k).map(|c| c.2), Some("Computers and Electronics"));
    }

    #[test]
    fn every_known_end_use_has_a_category() {
        for sector in Sector::ALL {
            for fuel in sector.fuels() {
                for eu in sector.end_uses(fuel) {
                    let bldg = sector.building_types()[0];
                    let k = key(bldg, eu, None, Structure::Existing);
                    assert!(categories(&k).is_some(), "{sector:?} {fuel} {eu}");
                }
            }
        }
    }

    #[test]
    fn unmapped_keys_are_rejected() {
        let years = [2009];
        let mut b = Breakdown::new();
        let e = YearMap::constant(&years, Value::Scalar(1.0));
        let mut k = key("large office", "lighting", None, Structure::New);
        k.climate_zone = "AIA_CZ9".into();
        let err = add(&mut b, &k, &e);
        assert!(matches!(err, Err(MsegError::LookupMissing { .. })), "got {err:?}");
        assert!(b.is_empty());
    }

    #[test]
    fn shares_sum_to_one() {
        let years = [2009, 2010];
        let mut b = Breakdown::new();
        let e = |x: f64| YearMap::constant(&years, Value::Scalar(x));
        add(&mut b, &key("large office", "lighting", None, Structure::New), &e(3.0)).unwrap();
        add(&mut b, &key("large office", "lighting", None, Structure::New), &e(1.0)).unwrap();
        let heat = key("large office", "heating", Some("ASHP"), Structure::New);
        add(&mut b, &heat, &e(4.0)).unwrap();
        normalize(&mut b, &e(8.0)).unwrap();
        let shares = &b["AIA CZ3"]["Commercial (New)"];
        assert_eq!(shares["Lighting"].at(2010), Value::Scalar(0.5));
        assert_eq!(shares["Heating"].at(2009), Value::Scalar(0.5));
    }

    #[test]
    fn zero_total_gives_zero_shares() {
        let years = [2009];
        let mut b = Breakdown::new();
        let e = YearMap::constant(&years, Value::Scalar(2.0));
        add(&mut b, &key("large office", "cooling", None, Structure::New), &e).unwrap();
        normalize(&mut b, &YearMap::constant(&years, Value::Scalar(0.0))).unwrap();
        assert_eq!(b["AIA CZ3"]["Commercial (New)"]["Cooling"].at(2009), Value::Scalar(0.0));
    }
}
