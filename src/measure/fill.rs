//! Microsegment filling: the per-key loop that turns a measure definition
//! into filled markets.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use super::breakdown::{self, Breakdown};
use super::definition::{Keyed, MAX_NAME_LEN, MeasureDefinition};
use super::submarket::{Evidence, SubmarketWarning};
use super::{ChoiceParams, FillInputs, Markets, Measure, MsegAdjust};
use crate::baseline::{self, CplLeaf, Stock, usable_series};
use crate::convert::convert_cost;
use crate::error::{MsegError, Result};
use crate::mseg::categories::Sector;
use crate::mseg::key::{Applicability, MicrosegmentKey, MsegKind, SegmentScope, TechType};
use crate::mseg::streams::Microsegment;
use crate::mseg::value::{Value, Year, YearMap};
use crate::partition::{
    AdoptionScheme, MarketWindow, NewConstruction, PartitionInputs, fold_contribution, partition,
};
use crate::perf::{self, PerfUnits};
use crate::sample::{Param, key_rng, measure_seed};

/// Residential choice coefficients used when the baseline has none.
const DEFAULT_B1: f64 = -0.003;
const DEFAULT_B2: f64 = -0.012;

/// Floor area is reported in millions of square feet.
const SQFT_UNITS: f64 = 1e6;

/// Heating and cooling loads from lighting waste heat in commercial buildings.
fn lighting_secondary() -> SegmentScope {
    SegmentScope {
        fuels: vec!["electricity".into(), "natural gas".into(), "distillate".into()],
        end_uses: vec!["heating".into(), "cooling".into()],
        technology_type: TechType::Demand,
        technologies: vec![Some("lighting gain".into())],
    }
}

fn perf_units_str(units: &PerfUnits) -> &str {
    match units {
        PerfUnits::Fixed(u) | PerfUnits::Dynamic(u, _) => u,
    }
}

fn resolve<'a, T>(
    input: &'a Keyed<T>,
    key: &MicrosegmentKey,
    field: &str,
    measure: &str,
) -> Result<&'a T> {
    input
        .resolve(key)
        .ok_or_else(|| MsegError::invalid_measure(measure, format!("no {field} for key '{key}'")))
}

/// Building type, technology, measure cost units and baseline cost units.
type ConversionKey = (String, Option<String>, String, String);

/// Baseline cost, performance and lifetime of one key.
struct BaselineCpl {
    cost: YearMap,
    cost_units: String,
    perf: YearMap,
    perf_units: String,
    life: YearMap,
}

impl BaselineCpl {
    /// `None` when any entry is missing, "NA" or zero in any year.
    fn from_leaf(leaf: Option<&CplLeaf>, years: &[Year]) -> Option<Self> {
        let leaf = leaf?;
        let cost = leaf.installed_cost.as_ref()?;
        let perf = leaf.performance.as_ref()?;
        let life = leaf.lifetime.as_ref()?;
        Some(Self {
            cost: usable_series(&cost.typical, years)?,
            cost_units: cost.units.clone()?,
            perf: usable_series(&perf.typical, years)?,
            perf_units: perf.units.clone()?,
            life: usable_series(&life.average, years)?,
        })
    }
}

fn residential_choice(
    leaf: Option<&CplLeaf>,
    years: &[Year],
    measure: &str,
    key: &MicrosegmentKey,
) -> ChoiceParams {
    let coefficients = leaf
        .and_then(|l| l.consumer_choice.as_ref())
        .and_then(|c| c.competed_market_share.as_ref())
        .map(|m| &m.parameters)
        .and_then(|p| Some((usable_series(&p.b1, years)?, usable_series(&p.b2, years)?)));
    match coefficients {
        Some((b1, b2)) => ChoiceParams::Logit { b1, b2 },
        None => {
            warn!(measure, key = %key, "no consumer choice data; using default b1 and b2");
            ChoiceParams::Logit {
                b1: YearMap::constant(years, Value::Scalar(DEFAULT_B1)),
                b2: YearMap::constant(years, Value::Scalar(DEFAULT_B2)),
            }
        }
    }
}

/// Discount-rate distribution for the key's end use, falling back to heating.
fn commercial_choice(
    inputs: &FillInputs<'_>,
    measure: &str,
    key: &MicrosegmentKey,
) -> Result<ChoiceParams> {
    let dists = &inputs.reference.commercial_time_prefs.distributions;
    let rate_distribution = match dists.get(&key.end_use) {
        Some(d) => d.clone(),
        None => {
            warn!(
                measure,
                end_use = %key.end_use,
                "no time preference data for end use; using heating"
            );
            dists
                .get("heating")
                .cloned()
                .ok_or_else(|| MsegError::missing("commercial time preferences", "heating"))?
        }
    };
    Ok(ChoiceParams::RateDistribution { rate_distribution })
}

/// Lifetime input: points below 1 become 1, negative samples become 1.
fn realize_lifetime(p: &Param, rng: &mut rand::rngs::StdRng, n: usize) -> Value {
    match p {
        Param::Point(x) => Value::Scalar(x.max(1.0)),
        Param::Distribution(_) => p.realize(rng, n).map(|l| if l < 0.0 { 1.0 } else { l }),
    }
}

fn realize_cost(p: &Param, rng: &mut rand::rngs::StdRng, n: usize) -> Value {
    match p {
        Param::Point(x) => Value::Scalar(*x),
        Param::Distribution(_) => p.realize(rng, n).map(|c| c.max(0.0)),
    }
}

/// Running reduction for one adoption scheme.
struct SchemeState {
    master: Option<Microsegment>,
    adjust: MsegAdjust,
    breakdown: Breakdown,
}

impl SchemeState {
    fn new() -> Self {
        Self {
            master: None,
            adjust: MsegAdjust::default(),
            breakdown: Breakdown::new(),
        }
    }
}

/// Result of a fill, applied to the measure in one step.
pub(super) struct FillOutcome {
    applicability: Applicability,
    markets: BTreeMap<AdoptionScheme, Markets>,
    removed: bool,
    warnings: Vec<SubmarketWarning>,
}

impl Measure {
    /// Fills the measure's markets under every adoption scheme.
    ///
    /// # Arguments
    ///
    /// * `inputs` - Baseline markets, baseline technology data, sector
    ///   factors and run settings
    ///
    /// # Errors
    ///
    /// * [`MsegError::InvalidMeasure`] if the measure is already finalized,
    ///   its name is too long, a category name is invalid or a measure input
    ///   does not resolve for a key.
    /// * [`MsegError::LookupMissing`] if a primary microsegment, its
    ///   construction data, a sector factor, commercial time preferences or
    ///   a reporting category is absent, or no primary key yields data.
    /// * [`MsegError::UnitMismatch`] if cost or performance units cannot be
    ///   reconciled with the baseline.
    /// * [`MsegError::ShapeMismatch`] if reference series lack modeling years.
    ///
    /// A measure with insufficient sub-market evidence is marked removed and
    /// finalized without error.
    pub fn fill_mkts(&mut self, inputs: &FillInputs<'_>) -> Result<()> {
        if self.finalized {
            return Err(MsegError::invalid_measure(self.name(), "markets already filled"));
        }
        info!(measure = %self.name(), "filling measure markets");
        let outcome = fill(&self.definition, self.market_window(&inputs.settings.years), inputs)?;
        self.applicability = Some(outcome.applicability);
        self.markets = outcome.markets;
        self.removed = outcome.removed;
        self.warnings = outcome.warnings;
        self.finalized = true;
        info!(
            measure = %self.name(),
            removed = self.removed,
            warnings = self.warnings.len(),
            "measure markets filled"
        );
        Ok(())
    }
}

fn fill(
    def: &MeasureDefinition,
    window: MarketWindow,
    inputs: &FillInputs<'_>,
) -> Result<FillOutcome> {
    let name = def.name.as_str();
    if name.chars().count() > MAX_NAME_LEN {
        return Err(MsegError::invalid_measure(
            name,
            format!("name exceeds {MAX_NAME_LEN} characters"),
        ));
    }
    let settings = inputs.settings;
    let years = settings.years.as_slice();
    let reference = inputs.reference;

    let mut app = Applicability::resolve(&def.declaration(), name)?;
    let auto_lighting = app.secondary.is_none()
        && app.primary.end_uses.iter().any(|e| e == "lighting")
        && app.has_commercial();
    if auto_lighting {
        app.secondary = Some(lighting_secondary());
    }

    let nsamples = def.has_distributions().then_some(settings.nsamples);
    let n = settings.nsamples;
    let seed = measure_seed(settings.seed, name);
    let carbon_price = reference.carbon_price(years)?;
    let zeros = YearMap::constant(years, Value::Scalar(0.0));

    let mut states: BTreeMap<AdoptionScheme, SchemeState> = AdoptionScheme::ALL
        .into_iter()
        .map(|s| (s, SchemeState::new()))
        .collect();
    let mut conversion_factors: BTreeMap<ConversionKey, (Value, String)> = BTreeMap::new();
    let mut light_rel_perf: Option<YearMap> = None;
    let mut warnings: Vec<SubmarketWarning> = Vec::new();
    let mut key_ct = 0_usize;
    let mut sqft_subst = false;

    let keys = app
        .keychain(MsegKind::Primary)
        .into_iter()
        .chain(app.keychain(MsegKind::Secondary));

    for key in keys {
        let primary = key.kind == MsegKind::Primary;
        if !key.is_known_combination() {
            debug!(measure = name, key = %key, "no such microsegment; skipping");
            continue;
        }
        let Some(leaf) = baseline::lookup(&inputs.baseline.segments, &key) else {
            if primary {
                return Err(MsegError::missing("stock/energy data", &key));
            }
            warn!(
                measure = name,
                key = %key,
                "no baseline data for secondary microsegment; skipping"
            );
            continue;
        };
        let sector = key
            .sector()
            .ok_or_else(|| MsegError::missing("building sector", &key.building_type))?;

        let scale = if primary {
            def.market_scaling_fractions
                .as_ref()
                .and_then(|k| k.resolve(&key))
                .copied()
        } else {
            None
        };
        if primary && scale.is_some() {
            let source = def
                .market_scaling_fractions_source
                .as_ref()
                .and_then(|s| s.resolve(&key));
            if let Some(source) = source {
                let evidence = Evidence::check(source);
                for w in evidence.warnings() {
                    if !warnings.contains(&w) {
                        warn!(measure = name, "{w}");
                        warnings.push(w);
                    }
                }
                if evidence.requires_removal() {
                    warn!(
                        measure = name,
                        "CRITICAL: insufficient sub-market scaling evidence; measure removed"
                    );
                    return Ok(FillOutcome {
                        applicability: app,
                        markets: BTreeMap::new(),
                        removed: true,
                        warnings,
                    });
                }
            }
        }

        // new construction and structure share
        let cdata = inputs.baseline.construction(&key)?;
        let (annual, total) = match sector {
            Sector::Residential => (cdata.new_homes.as_ref(), cdata.total_homes.as_ref()),
            Sector::Commercial => (cdata.new_sqft.as_ref(), cdata.total_sqft.as_ref()),
        };
        let (Some(annual), Some(total)) = (annual, total) else {
            return Err(MsegError::missing("new construction series", &key));
        };
        let construction = NewConstruction::from_series(annual, total, years)?;
        let frac = |y: Year| construction.structure_fraction(key.structure, y);

        // measure inputs, drawn in a fixed order from a per-key generator
        let mut rng = key_rng(seed);
        let follows_lighting = !primary && auto_lighting;
        let perf_in = if follows_lighting {
            None
        } else {
            let p = resolve(&def.energy_efficiency, &key, "energy_efficiency", name)?;
            let u = resolve(&def.energy_efficiency_units, &key, "energy_efficiency_units", name)?;
            Some((p.realize(&mut rng, n), u))
        };
        let (cost_meas, cost_units, life_meas) = if primary {
            let installed = resolve(&def.installed_cost, &key, "installed_cost", name)?;
            let cost = realize_cost(installed, &mut rng, n);
            let units = resolve(&def.cost_units, &key, "cost_units", name)?.clone();
            let life = realize_lifetime(
                resolve(&def.product_lifetime, &key, "product_lifetime", name)?,
                &mut rng,
                n,
            );
            (cost, units, life)
        } else {
            (Value::Scalar(0.0), String::new(), Value::Scalar(0.0))
        };

        // baseline cost, performance and lifetime
        let cpl_leaf = baseline::lookup(inputs.cpl, &key);
        let base = match BaselineCpl::from_leaf(cpl_leaf, years) {
            Some(b) => b,
            None => {
                if primary {
                    warn!(
                        measure = name,
                        key = %key,
                        "baseline cost, performance or lifetime unavailable; using measure values"
                    );
                } else {
                    debug!(
                        measure = name,
                        key = %key,
                        "no baseline technology data for secondary key"
                    );
                }
                let (perf, perf_units) = match &perf_in {
                    Some((p, u)) => {
                        (YearMap::constant(years, p.clone()), perf_units_str(u).to_string())
                    }
                    None => (YearMap::constant(years, Value::Scalar(1.0)), String::new()),
                };
                BaselineCpl {
                    cost: YearMap::constant(years, cost_meas.clone()),
                    cost_units: cost_units.clone(),
                    perf,
                    perf_units,
                    life: YearMap::constant(years, life_meas.clone()),
                }
            }
        };
        let (cost_base, life_base) = if primary {
            (base.cost, base.life)
        } else {
            (zeros.clone(), zeros.clone())
        };

        // cost conversion into the baseline basis
        let (cost_meas, cost_units) = if primary && cost_units != base.cost_units {
            let cache_key = (
                key.building_type.clone(),
                key.technology.clone(),
                cost_units.clone(),
                base.cost_units.clone(),
            );
            let (factor, units) = match conversion_factors.get(&cache_key) {
                Some(hit) => hit.clone(),
                None => {
                    let conv = convert_cost(
                        &reference.cost_conversions,
                        &reference.cpi,
                        &Value::Scalar(1.0),
                        &cost_units,
                        &key,
                        &base.cost_units,
                        name,
                    )?;
                    conversion_factors.insert(cache_key, conv.clone());
                    conv
                }
            };
            (&cost_meas * &factor, units)
        } else {
            (cost_meas, cost_units)
        };
        if primary && cost_units != base.cost_units {
            return Err(MsegError::UnitMismatch {
                measure: name.to_string(),
                found: cost_units,
                expected: base.cost_units,
            });
        }

        // relative performance
        let rel_perf = match &perf_in {
            Some((perf_meas, units)) => perf::relative_performance(
                perf_meas,
                units,
                &base.perf,
                &base.perf_units,
                years,
                name,
            )?,
            None => light_rel_perf
                .clone()
                .unwrap_or_else(|| YearMap::constant(years, Value::Scalar(1.0))),
        };
        if primary && auto_lighting && key.end_use == "lighting" {
            light_rel_perf = Some(rel_perf.clone());
        }

        // sector factors; a fuel switch changes the measure side only
        let meas_fuel = match (&def.fuel_switch_to, primary) {
            (Some(f), true) => f.as_str(),
            _ => key.fuel.as_str(),
        };
        let ss_base = reference.site_source(&key.fuel, years)?;
        let ss_meas = reference.site_source(meas_fuel, years)?;
        let ci_base = reference.carbon_intensity(sector, &key.fuel, years)?;
        let ci_meas = reference.carbon_intensity(sector, meas_fuel, years)?;
        let ec_base = reference.energy_price(sector, &key.fuel, years)?;
        let ec_meas = reference.energy_price(sector, meas_fuel, years)?;

        let choice = match (primary, sector) {
            (false, _) => None,
            (true, Sector::Residential) => Some(residential_choice(cpl_leaf, years, name, &key)),
            (true, Sector::Commercial) => Some(commercial_choice(inputs, name, &key)?),
        };

        // structure-scaled stock, source energy and carbon
        let stock = if !primary {
            zeros.clone()
        } else {
            match &leaf.stock {
                Stock::Units(series) => {
                    YearMap::from_series(series, years)?.map(|y, v| v * frac(y))
                }
                Stock::NotApplicable(_) => {
                    sqft_subst = true;
                    let sqft = cdata
                        .total_sqft
                        .as_ref()
                        .ok_or_else(|| MsegError::missing("total square footage", &key))?;
                    YearMap::from_series(sqft, years)?.map(|y, v| v * (frac(y) * SQFT_UNITS))
                }
            }
        };
        let energy = YearMap::from_series(&leaf.energy, years)?
            .map(|y, v| v * &ss_base.at(y) * frac(y));
        let carbon = energy.map(|y, v| v * &ci_base.at(y));

        let supply_demand_total = baseline::side_leaves(&inputs.baseline.segments, &key)
            .map(|siblings| -> Result<YearMap> {
                let mut sum = zeros.clone();
                for s in siblings {
                    sum = sum.try_add(&YearMap::from_series(&s.energy, years)?)?;
                }
                Ok(sum.map(|y, v| v * &ss_base.at(y)))
            })
            .transpose()?;

        if primary {
            key_ct += 1;
        }
        let contrib_key = key.contributing_key();

        for (&scheme, state) in states.iter_mut() {
            let secondary = state
                .adjust
                .secondary_adjustments
                .get(&crate::partition::adjustment_key(&key));
            let part = partition(&PartitionInputs {
                scheme,
                key: &key,
                years,
                scale,
                construction: &construction,
                stock: &stock,
                energy: &energy,
                carbon: &carbon,
                cost_base: &cost_base,
                cost_meas: &cost_meas,
                energy_cost_base: &ec_base,
                energy_cost_meas: &ec_meas,
                carbon_price: &carbon_price,
                rel_perf: &rel_perf,
                life_base: &life_base,
                life_meas: &life_meas,
                site_source_base: &ss_base,
                site_source_meas: &ss_meas,
                intensity_base: &ci_base,
                intensity_meas: &ci_meas,
                secondary,
                window,
                measure_type: def.measure_type,
                retro_rate: settings.retro_rate,
                nsamples,
            })?;
            if let Some(c) = &part.contribution {
                fold_contribution(&mut state.adjust.secondary_adjustments, &key, c, years);
            }

            state.master = Some(match state.master.take() {
                Some(m) => m.try_add(&part.mseg)?,
                None => part.mseg.clone(),
            });

            let adjust = &mut state.adjust;
            match adjust.contributing.get(&contrib_key) {
                Some(existing) => {
                    let merged = existing.try_add_restricted(&part.mseg)?;
                    adjust.contributing.insert(contrib_key.clone(), merged);
                }
                None => {
                    adjust.contributing.insert(contrib_key.clone(), part.mseg);
                    if let Some(c) = &choice {
                        adjust.choice_params.insert(contrib_key.clone(), c.clone());
                    }
                }
            }

            if let Some(total) = &supply_demand_total {
                let sd = &mut adjust.supply_demand;
                let summed = match sd.total.get(&contrib_key) {
                    Some(prev) => prev.try_add(total)?,
                    None => total.clone(),
                };
                sd.total.insert(contrib_key.clone(), summed);
                sd.savings.insert(contrib_key.clone(), zeros.clone());
            }

            breakdown::add(&mut state.breakdown, &key, &energy)?;
        }
    }

    if key_ct == 0 {
        let reason = format!("no data retrieved for measure '{name}'");
        return Err(MsegError::missing("baseline data", reason));
    }

    let sqft_reduce = sqft_subst.then(|| {
        let combos = app.climate_zones.len() * app.building_types.len() * app.structures.len();
        key_ct as f64 / combos.max(1) as f64
    });

    let mut markets = BTreeMap::new();
    for (scheme, mut state) in states {
        let Some(master) = state.master else {
            continue;
        };
        let mut master = master.div_lifetime(key_ct as f64);
        if let Some(reduce) = sqft_reduce {
            master = master.div_stock(reduce);
            for m in state.adjust.contributing.values_mut() {
                *m = m.div_stock(reduce);
            }
        }
        breakdown::normalize(&mut state.breakdown, &master.energy.total.baseline)?;
        markets.insert(
            scheme,
            Markets {
                master_mseg: master,
                mseg_adjust: state.adjust,
                mseg_out_break: state.breakdown,
            },
        );
    }

    Ok(FillOutcome {
        applicability: app,
        markets,
        removed: false,
        warnings,
    })
}
