//! Measure definitions as read from the measure input files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::submarket::SubmarketSource;
use crate::mseg::key::{Declaration, EndUseDecl, MicrosegmentKey, Selection, TechType};
use crate::mseg::value::Year;
use crate::partition::MeasureType;
use crate::perf::PerfUnits;
use crate::sample::Param;

/// Longest accepted measure or package name.
pub const MAX_NAME_LEN: usize = 40;

/// A measure input given once or nested by key components.
///
/// Nesting may use any subset of the key components in key order: kind
/// (`"primary"`/`"secondary"`), climate zone, building type, fuel, end use,
/// technology type, technology and structure type. Levels the input does not
/// nest by are skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Keyed<T> {
    Value(T),
    Nested(BTreeMap<String, Keyed<T>>),
}

impl<T> Keyed<T> {
    /// The value applying to `key`, if the nesting resolves to one.
    pub fn resolve(&self, key: &MicrosegmentKey) -> Option<&T> {
        let components = [
            Some(key.kind.as_str()),
            Some(key.climate_zone.as_str()),
            Some(key.building_type.as_str()),
            Some(key.fuel.as_str()),
            Some(key.end_use.as_str()),
            key.technology_type.map(TechType::as_str),
            key.technology.as_deref(),
            Some(key.structure.as_str()),
        ];
        let mut node = self;
        for c in components.into_iter().flatten() {
            match node {
                Keyed::Value(_) => break,
                Keyed::Nested(m) => {
                    if let Some(next) = m.get(c) {
                        node = next;
                    }
                }
            }
        }
        match node {
            Keyed::Value(v) => Some(v),
            Keyed::Nested(_) => None,
        }
    }

    /// Every leaf value, in nesting order.
    pub fn values(&self) -> Vec<&T> {
        match self {
            Keyed::Value(v) => vec![v],
            Keyed::Nested(m) => m.values().flat_map(Keyed::values).collect(),
        }
    }
}

impl<T> From<T> for Keyed<T> {
    fn from(v: T) -> Self {
        Keyed::Value(v)
    }
}

/// One energy efficiency measure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureDefinition {
    pub name: String,
    pub climate_zone: Selection,
    pub bldg_type: Selection,
    pub structure_type: Selection,
    pub fuel_type: Selection,
    pub end_use: EndUseDecl,
    #[serde(default)]
    pub technology: Option<Selection>,
    #[serde(default)]
    pub market_entry_year: Option<Year>,
    #[serde(default)]
    pub market_exit_year: Option<Year>,
    pub installed_cost: Keyed<Param>,
    pub cost_units: Keyed<String>,
    pub energy_efficiency: Keyed<Param>,
    pub energy_efficiency_units: Keyed<PerfUnits>,
    pub product_lifetime: Keyed<Param>,
    #[serde(default)]
    pub market_scaling_fractions: Option<Keyed<f64>>,
    #[serde(default)]
    pub market_scaling_fractions_source: Option<Keyed<SubmarketSource>>,
    #[serde(default)]
    pub measure_type: MeasureType,
    #[serde(default)]
    pub fuel_switch_to: Option<String>,
    /// Reference-building simulation results to derive performance from.
    #[serde(rename = "EnergyPlus file", default)]
    pub energyplus_file: Option<String>,
}

impl MeasureDefinition {
    /// Applicability declarations for key-chain generation.
    pub fn declaration(&self) -> Declaration {
        Declaration {
            climate_zone: self.climate_zone.clone(),
            bldg_type: self.bldg_type.clone(),
            structure_type: self.structure_type.clone(),
            fuel_type: self.fuel_type.clone(),
            end_use: self.end_use.clone(),
            technology: self.technology.clone(),
        }
    }

    /// Whether any cost, performance or lifetime input is a distribution.
    pub fn has_distributions(&self) -> bool {
        [&self.installed_cost, &self.energy_efficiency, &self.product_lifetime]
            .into_iter()
            .any(|k| k.values().into_iter().any(Param::is_distribution))
    }
}
