//! Shared test fixtures for integration tests.
//!
//! The fixtures describe two small markets:
//! * gas water heating in existing single family homes (stock 15, energy
//!   15.15, baseline EF 18), plus incandescent lighting in the same homes;
//! * fluorescent lighting in existing large offices, whose waste heat
//!   shows up as "lighting gain" loads on electric heating and cooling.
//!
//! No new construction is recorded, so existing structures hold all stock.

#![allow(dead_code)]

use serde_json::{Value as Json, json};

use mseg_engine::baseline::{BaselineMarkets, CplTree, ReferenceData};
use mseg_engine::measure::{EngineSettings, FillInputs, Measure, MeasureDefinition};
use mseg_engine::mseg::value::Year;

/// Default fixture horizon.
pub const YEARS: [Year; 2] = [2009, 2010];

/// Relative performance of the gas water heating measure (EF 18 vs 25).
pub const WH_REL_PERF: f64 = 18.0 / 25.0;

/// Year-keyed JSON object with the same value every year.
pub fn series(years: &[Year], v: f64) -> Json {
    Json::Object(years.iter().map(|y| (y.to_string(), json!(v))).collect())
}

fn stock_energy(years: &[Year], stock: Option<f64>, energy: f64) -> Json {
    json!({
        "stock": stock.map_or(json!("NA"), |s| series(years, s)),
        "energy": series(years, energy),
    })
}

fn cpl_leaf(years: &[Year], perf: f64, perf_units: &str, cost: f64, life: f64) -> Json {
    json!({
        "performance": {"typical": series(years, perf), "units": perf_units},
        "installed cost": {"typical": series(years, cost), "units": "2013$/unit"},
        "lifetime": {"average": series(years, life), "units": "years"},
    })
}

/// Baseline stock/energy and construction data over `years`.
pub fn baseline_json(years: &[Year]) -> Json {
    json!({
        "segments": {
            "AIA_CZ1": {
                "single family home": {
                    "natural gas": {
                        "water heating": stock_energy(years, Some(15.0), 15.15),
                    },
                    "electricity": {
                        "lighting": {
                            "general service (incandescent)": stock_energy(years, Some(30.0), 6.0),
                        },
                    },
                },
                "large office": {
                    "electricity": {
                        "lighting": {
                            "F32T8": stock_energy(years, Some(50.0), 20.0),
                        },
                        "heating": {
                            "supply": {
                                "rooftop_ASHP-heat": stock_energy(years, Some(5.0), 8.0),
                            },
                            "demand": {
                                "lighting gain": stock_energy(years, None, -4.0),
                                "roof": stock_energy(years, None, 12.0),
                            },
                        },
                        "cooling": {
                            "supply": {
                                "rooftop_AC": stock_energy(years, Some(5.0), 9.0),
                            },
                            "demand": {
                                "lighting gain": stock_energy(years, None, 6.0),
                                "roof": stock_energy(years, None, 3.0),
                            },
                        },
                    },
                },
            },
        },
        "construction": {
            "AIA_CZ1": {
                "single family home": {
                    "total homes": series(years, 100.0),
                    "new homes": series(years, 0.0),
                },
                "large office": {
                    "total square footage": series(years, 1000.0),
                    "new square footage": series(years, 0.0),
                },
            },
        },
    })
}

/// Baseline technology cost, performance and lifetime over `years`.
pub fn cpl_json(years: &[Year]) -> Json {
    let mut wh = cpl_leaf(years, 18.0, "EF", 10.0, 3.0);
    wh["consumer choice"] = json!({
        "competed market share": {
            "parameters": {"b1": series(years, -0.01), "b2": series(years, -0.02)},
        },
    });
    json!({
        "AIA_CZ1": {
            "single family home": {
                "natural gas": {"water heating": wh},
                "electricity": {
                    "lighting": {
                        "general service (incandescent)": cpl_leaf(years, 15.0, "lm/W", 1.0, 1.0),
                    },
                },
            },
            "large office": {
                "electricity": {
                    "lighting": {"F32T8": cpl_leaf(years, 50.0, "lm/W", 20.0, 5.0)},
                },
            },
        },
    })
}

/// Site-source factors (site energy reported as is), carbon intensities,
/// prices and carbon price over `years`.
pub fn reference_json(years: &[Year]) -> Json {
    let fuels = |gas: f64, elec: f64| {
        json!({"natural gas": series(years, gas), "electricity": series(years, elec)})
    };
    json!({
        "site_source": fuels(1.0, 1.0),
        "carbon_intensity": {
            "residential": fuels(0.053, 0.18),
            "commercial": fuels(0.053, 0.18),
        },
        "energy_prices": {
            "residential": fuels(10.0, 35.0),
            "commercial": fuels(8.0, 30.0),
        },
        "carbon_price": series(years, 25.0),
    })
}

pub fn baseline(years: &[Year]) -> BaselineMarkets {
    serde_json::from_value(baseline_json(years)).unwrap()
}

pub fn cpl(years: &[Year]) -> CplTree {
    serde_json::from_value(cpl_json(years)).unwrap()
}

pub fn reference(years: &[Year]) -> ReferenceData {
    serde_json::from_value(reference_json(years)).unwrap()
}

/// Gas water heater upgrade: EF 25 against the EF 18 baseline.
pub fn water_heater_json(name: &str) -> Json {
    json!({
        "name": name,
        "climate_zone": "AIA_CZ1",
        "bldg_type": "single family home",
        "structure_type": "existing",
        "fuel_type": "natural gas",
        "end_use": "water heating",
        "technology": null,
        "installed_cost": 25.0,
        "cost_units": "2013$/unit",
        "energy_efficiency": 25.0,
        "energy_efficiency_units": "EF",
        "product_lifetime": 5.0,
    })
}

/// Residential LED bulbs replacing incandescents.
pub fn res_lighting_json(name: &str) -> Json {
    json!({
        "name": name,
        "climate_zone": "AIA_CZ1",
        "bldg_type": "single family home",
        "structure_type": "existing",
        "fuel_type": "electricity",
        "end_use": "lighting",
        "technology": "general service (incandescent)",
        "installed_cost": 5.0,
        "cost_units": "2013$/unit",
        "energy_efficiency": 90.0,
        "energy_efficiency_units": "lm/W",
        "product_lifetime": 20.0,
    })
}

/// Office lighting at twice the baseline efficacy.
pub fn office_lighting_json(name: &str) -> Json {
    json!({
        "name": name,
        "climate_zone": "AIA_CZ1",
        "bldg_type": "large office",
        "structure_type": "existing",
        "fuel_type": "electricity",
        "end_use": "lighting",
        "technology": "F32T8",
        "installed_cost": 30.0,
        "cost_units": "2013$/unit",
        "energy_efficiency": 100.0,
        "energy_efficiency_units": "lm/W",
        "product_lifetime": 10.0,
    })
}

/// A documented sub-market source entry.
pub fn good_source() -> Json {
    json!({
        "title": "Residential Energy Consumption Survey",
        "author": "EIA",
        "organization": "U.S. Energy Information Administration",
        "year": "2015",
        "URL": "https://www.eia.gov/consumption/residential/",
        "fraction_derivation": "share of homes with storage water heaters",
    })
}

pub fn definition(j: Json) -> MeasureDefinition {
    serde_json::from_value(j).unwrap()
}

pub fn measure(j: Json) -> Measure {
    Measure::new(definition(j))
}

pub fn settings(years: &[Year], retro_rate: f64) -> EngineSettings {
    let first = years.first().copied().unwrap_or(2009);
    let last = years.last().copied().unwrap_or(first);
    EngineSettings::new(first, last, retro_rate, 50, 42)
}

/// Owned fixture data a fill borrows from.
pub struct World {
    pub baseline: BaselineMarkets,
    pub cpl: CplTree,
    pub reference: ReferenceData,
    pub settings: EngineSettings,
}

impl World {
    pub fn new(years: &[Year], retro_rate: f64) -> Self {
        Self {
            baseline: baseline(years),
            cpl: cpl(years),
            reference: reference(years),
            settings: settings(years, retro_rate),
        }
    }

    pub fn inputs(&self) -> FillInputs<'_> {
        FillInputs {
            baseline: &self.baseline,
            cpl: &self.cpl,
            reference: &self.reference,
            settings: &self.settings,
        }
    }

    /// Builds and fills a measure, panicking on any failure.
    pub fn filled(&self, j: Json) -> Measure {
        let mut m = measure(j);
        m.fill_mkts(&self.inputs()).unwrap();
        m
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new(&YEARS, 0.01)
    }
}
