//! Measure packages: several finalized measures applied together.
//!
//! A package claims each microsegment once. When members overlap, the first
//! listed member keeps the shared keys and later members contribute only
//! what they add.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{MsegError, Result};
use crate::measure::breakdown::{self, Breakdown};
use crate::measure::{Keyed, MAX_NAME_LEN, Markets, Measure, MeasureDefinition, MsegAdjust};
use crate::mseg::key::{Applicability, EndUseDecl, MicrosegmentKey, SegmentScope, Selection};
use crate::mseg::streams::{Lifetime, Microsegment, Stream};
use crate::mseg::value::{Value, YearMap};
use crate::partition::{AdoptionScheme, MeasureType};
use crate::perf::PerfUnits;
use crate::sample::Param;

/// Extra improvements gained by installing the members together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PackageBenefits {
    /// Fractional increase of energy, carbon and related cost savings.
    #[serde(rename = "energy savings increase")]
    pub energy_savings_increase: f64,
    /// Fractional reduction of the installed cost.
    #[serde(rename = "cost reduction")]
    pub cost_reduction: f64,
}

/// A package as declared in the package input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDefinition {
    pub name: String,
    #[serde(rename = "contributing_ECMs")]
    pub members: Vec<String>,
    #[serde(default)]
    pub benefits: PackageBenefits,
}

/// An ordered set of finalized measures to merge.
#[derive(Debug, Clone)]
pub struct MeasurePackage<'a> {
    name: String,
    members: Vec<&'a Measure>,
    benefits: PackageBenefits,
}

fn push_unique<T: PartialEq + Clone>(out: &mut Vec<T>, items: &[T]) {
    for x in items {
        if !out.contains(x) {
            out.push(x.clone());
        }
    }
}

/// Applies the energy-savings increase to one baseline/efficient stream.
fn boost_savings(s: &Stream, ben: f64) -> Stream {
    let boost = |base: &YearMap, eff: &YearMap| {
        eff.map(|y, e| {
            Value::zip3(&base.at(y), e, &Value::Scalar(ben), |b, e, k| (e - (b - e) * k).max(0.0))
        })
    };
    let mut out = s.clone();
    out.total.efficient = boost(&s.total.baseline, &s.total.efficient);
    out.competed.efficient = boost(&s.competed.baseline, &s.competed.efficient);
    out
}

fn apply_benefits(m: &Microsegment, benefits: PackageBenefits) -> Microsegment {
    let mut out = m.clone();
    let ben = benefits.energy_savings_increase;
    if ben != 0.0 {
        out.energy = boost_savings(&m.energy, ben);
        out.carbon = boost_savings(&m.carbon, ben);
        out.cost.energy = boost_savings(&m.cost.energy, ben);
        out.cost.carbon = boost_savings(&m.cost.carbon, ben);
    }
    if benefits.cost_reduction != 0.0 {
        let keep = 1.0 - benefits.cost_reduction;
        out.cost.stock.total.efficient = m.cost.stock.total.efficient.map(|_, v| v * keep);
        out.cost.stock.competed.efficient = m.cost.stock.competed.efficient.map(|_, v| v * keep);
    }
    out
}

/// Stock-weighted lifetime of the retained keys.
///
/// Each key weighs by its total stock summed over the horizon; with no stock
/// at all the plain mean is used.
fn weighted_lifetime(retained: &BTreeMap<MicrosegmentKey, Microsegment>) -> Result<Lifetime> {
    let weights: Vec<f64> = retained
        .values()
        .map(|m| m.stock.total.all.total_mean())
        .collect();
    let total: f64 = weights.iter().sum();
    let count = retained.len().max(1) as f64;
    let mut lifetime: Option<Lifetime> = None;
    for (m, w) in retained.values().zip(&weights) {
        let share = if total == 0.0 { 1.0 / count } else { w / total };
        let part = Lifetime {
            baseline: m.lifetime.baseline.map(|_, v| v * share),
            measure: &m.lifetime.measure * share,
        };
        lifetime = Some(match lifetime {
            None => part,
            Some(acc) => Lifetime {
                baseline: acc.baseline.try_add(&part.baseline)?,
                measure: acc.measure.try_add(&part.measure)?,
            },
        });
    }
    Ok(lifetime.unwrap_or_default())
}

impl<'a> MeasurePackage<'a> {
    /// Creates a package from finalized members.
    ///
    /// # Errors
    ///
    /// Returns [`MsegError::InvalidMeasure`] if the name is longer than
    /// [`MAX_NAME_LEN`], there are no members, or a member has not been filled.
    pub fn new(name: &str, members: Vec<&'a Measure>, benefits: PackageBenefits) -> Result<Self> {
        if name.chars().count() > MAX_NAME_LEN {
            return Err(MsegError::invalid_measure(
                name,
                format!("package name exceeds {MAX_NAME_LEN} characters"),
            ));
        }
        if members.is_empty() {
            return Err(MsegError::invalid_measure(name, "package has no members"));
        }
        if let Some(m) = members.iter().find(|m| !m.finalized) {
            return Err(MsegError::invalid_measure(
                name,
                format!("member '{}' has not been filled", m.name()),
            ));
        }
        Ok(Self {
            name: name.to_string(),
            members,
            benefits,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Definition of the derived measure: the union of member attributes.
    fn merged_definition(&self) -> MeasureDefinition {
        let mut czs = Vec::new();
        let mut bldgs = Vec::new();
        let mut structures = Vec::new();
        let mut fuels = Vec::new();
        let mut end_uses = Vec::new();
        for m in &self.members {
            let d = &m.definition;
            push_unique(&mut czs, &d.climate_zone.names());
            push_unique(&mut bldgs, &d.bldg_type.names());
            push_unique(&mut structures, &d.structure_type.names());
            push_unique(&mut fuels, &d.fuel_type.names());
            push_unique(&mut end_uses, &d.end_use.primary().names());
        }
        // an unset year means the horizon bound, which wins both comparisons
        let entry = self
            .members
            .iter()
            .map(|m| m.definition.market_entry_year)
            .collect::<Option<Vec<_>>>()
            .and_then(|ys| ys.into_iter().min());
        let exit = self
            .members
            .iter()
            .map(|m| m.definition.market_exit_year)
            .collect::<Option<Vec<_>>>()
            .and_then(|ys| ys.into_iter().max());
        MeasureDefinition {
            name: self.name.clone(),
            climate_zone: Selection::Many(czs),
            bldg_type: Selection::Many(bldgs),
            structure_type: Selection::Many(structures),
            fuel_type: Selection::Many(fuels),
            end_use: EndUseDecl::Plain(Selection::Many(end_uses)),
            technology: None,
            market_entry_year: entry,
            market_exit_year: exit,
            installed_cost: Keyed::Value(Param::Point(0.0)),
            cost_units: Keyed::Value(String::new()),
            energy_efficiency: Keyed::Value(Param::Point(0.0)),
            energy_efficiency_units: Keyed::Value(PerfUnits::relative_constant()),
            product_lifetime: Keyed::Value(Param::Point(0.0)),
            market_scaling_fractions: None,
            market_scaling_fractions_source: None,
            measure_type: MeasureType::FullService,
            fuel_switch_to: None,
            energyplus_file: None,
        }
    }

    /// Expanded applicability: the union over members.
    fn merged_applicability(&self) -> Option<Applicability> {
        let apps: Vec<&Applicability> = self
            .members
            .iter()
            .filter_map(|m| m.applicability.as_ref())
            .collect();
        let first = apps.first()?;
        let mut out = Applicability {
            climate_zones: Vec::new(),
            building_types: Vec::new(),
            structures: Vec::new(),
            primary: SegmentScope {
                fuels: Vec::new(),
                end_uses: Vec::new(),
                technology_type: first.primary.technology_type,
                technologies: Vec::new(),
            },
            secondary: None,
        };
        for a in &apps {
            push_unique(&mut out.climate_zones, &a.climate_zones);
            push_unique(&mut out.building_types, &a.building_types);
            push_unique(&mut out.structures, &a.structures);
            push_unique(&mut out.primary.fuels, &a.primary.fuels);
            push_unique(&mut out.primary.end_uses, &a.primary.end_uses);
            push_unique(&mut out.primary.technologies, &a.primary.technologies);
        }
        Some(out)
    }

    fn merge_scheme(&self, scheme: AdoptionScheme) -> Result<Option<Markets>> {
        let mut retained: BTreeMap<MicrosegmentKey, Microsegment> = BTreeMap::new();
        let mut adjust = MsegAdjust::default();
        for m in &self.members {
            let Some(markets) = m.markets.get(&scheme) else {
                continue;
            };
            let src = &markets.mseg_adjust;
            for (key, mseg) in &src.contributing {
                if retained.contains_key(key) {
                    continue;
                }
                retained.insert(key.clone(), apply_benefits(mseg, self.benefits));
            }
            for (k, v) in &src.choice_params {
                adjust.choice_params.entry(k.clone()).or_insert_with(|| v.clone());
            }
            for (k, v) in &src.secondary_adjustments {
                adjust.secondary_adjustments.entry(k.clone()).or_insert_with(|| v.clone());
            }
            for (k, v) in &src.supply_demand.total {
                adjust.supply_demand.total.entry(k.clone()).or_insert_with(|| v.clone());
            }
            for (k, v) in &src.supply_demand.savings {
                adjust.supply_demand.savings.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }

        let mut master: Option<Microsegment> = None;
        let mut out_break = Breakdown::new();
        for (key, mseg) in &retained {
            master = Some(match master {
                None => mseg.clone(),
                Some(acc) => acc.try_add(mseg)?,
            });
            breakdown::add(&mut out_break, key, &mseg.energy.total.baseline)?;
        }
        let Some(mut master) = master else {
            return Ok(None);
        };
        master.lifetime = weighted_lifetime(&retained)?;
        breakdown::normalize(&mut out_break, &master.energy.total.baseline)?;
        adjust.contributing = retained;

        Ok(Some(Markets {
            master_mseg: master,
            mseg_adjust: adjust,
            mseg_out_break: out_break,
        }))
    }

    /// Merges the members into a derived, finalized measure.
    ///
    /// Members are left untouched. A package with a removed member is itself
    /// removed and carries no markets.
    ///
    /// # Errors
    ///
    /// Returns [`MsegError::ShapeMismatch`] if members' results cannot be
    /// summed, for example when one is point-valued and another sampled.
    pub fn merge_measures(&self) -> Result<Measure> {
        let mut merged = Measure::new(self.merged_definition());
        merged.applicability = self.merged_applicability();
        merged.finalized = true;
        for m in &self.members {
            for w in &m.warnings {
                if !merged.warnings.contains(w) {
                    merged.warnings.push(*w);
                }
            }
        }

        if let Some(m) = self.members.iter().find(|m| m.removed) {
            warn!(
                package = %self.name,
                member = %m.name(),
                "package member was removed; package removed"
            );
            merged.removed = true;
            return Ok(merged);
        }

        for scheme in AdoptionScheme::ALL {
            if let Some(markets) = self.merge_scheme(scheme)? {
                merged.markets.insert(scheme, markets);
            }
        }
        info!(
            package = %self.name,
            members = self.members.len(),
            "package merged"
        );
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const YEARS: [u16; 2] = [2009, 2010];

    fn mseg(base: f64, eff: f64, stock: f64, life: f64) -> Microsegment {
        let c = |x: f64| YearMap::constant(&YEARS, Value::Scalar(x));
        let mut m = Microsegment::zeros(&YEARS);
        let streams = [
            &mut m.energy,
            &mut m.carbon,
            &mut m.cost.energy,
            &mut m.cost.carbon,
            &mut m.cost.stock,
        ];
        for s in streams {
            s.total.baseline = c(base);
            s.total.efficient = c(eff);
            s.competed.baseline = c(base);
            s.competed.efficient = c(eff);
        }
        m.stock.total.all = c(stock);
        m.lifetime = Lifetime {
            baseline: c(life),
            measure: Value::Scalar(life * 2.0),
        };
        m
    }

    #[test]
    fn savings_increase_scales_savings() {
        let benefits = PackageBenefits {
            energy_savings_increase: 0.5,
            cost_reduction: 0.0,
        };
        let out = apply_benefits(&mseg(10.0, 6.0, 1.0, 1.0), benefits);
        // savings of 4 grow by half
        assert_relative_eq!(out.energy.total.efficient.at(2009).mean(), 4.0);
        assert_relative_eq!(out.cost.carbon.competed.efficient.at(2010).mean(), 4.0);
        assert_relative_eq!(out.cost.stock.total.efficient.at(2009).mean(), 6.0);
    }

    #[test]
    fn savings_increase_floors_at_zero() {
        let benefits = PackageBenefits {
            energy_savings_increase: 5.0,
            cost_reduction: 0.0,
        };
        let out = apply_benefits(&mseg(10.0, 6.0, 1.0, 1.0), benefits);
        assert_eq!(out.energy.total.efficient.at(2009), Value::Scalar(0.0));
    }

    #[test]
    fn cost_reduction_touches_stock_cost_only() {
        let benefits = PackageBenefits {
            energy_savings_increase: 0.0,
            cost_reduction: 0.25,
        };
        let out = apply_benefits(&mseg(10.0, 8.0, 1.0, 1.0), benefits);
        assert_relative_eq!(out.cost.stock.total.efficient.at(2009).mean(), 6.0);
        assert_relative_eq!(out.cost.stock.total.baseline.at(2009).mean(), 10.0);
        assert_relative_eq!(out.energy.total.efficient.at(2009).mean(), 8.0);
    }

    #[test]
    fn lifetime_weighs_by_stock() {
        let mut retained = BTreeMap::new();
        let k1: MicrosegmentKey =
            "primary|AIA_CZ1|single family home|electricity|lighting|-|reflector (LED)|new"
                .parse()
                .unwrap();
        let mut k2 = k1.clone();
        k2.climate_zone = "AIA_CZ2".into();
        retained.insert(k1, mseg(1.0, 1.0, 3.0, 10.0));
        retained.insert(k2, mseg(1.0, 1.0, 1.0, 20.0));
        let life = weighted_lifetime(&retained).unwrap();
        assert_relative_eq!(life.baseline.at(2009).mean(), 12.5);
        assert_relative_eq!(life.measure.mean(), 25.0);
    }

    #[test]
    fn lifetime_without_stock_is_plain_mean() {
        let mut retained = BTreeMap::new();
        let k: MicrosegmentKey =
            "primary|AIA_CZ1|assembly|electricity|heating|demand|roof|new".parse().unwrap();
        retained.insert(k.clone(), mseg(1.0, 1.0, 0.0, 10.0));
        let mut k2 = k;
        k2.technology = Some("wall".into());
        retained.insert(k2, mseg(1.0, 1.0, 0.0, 30.0));
        let life = weighted_lifetime(&retained).unwrap();
        assert_relative_eq!(life.baseline.at(2010).mean(), 20.0);
    }

    #[test]
    fn benefits_parse_from_package_file() {
        let p: PackageDefinition = serde_json::from_str(
            r#"{"name": "Envelope + HVAC", "contributing_ECMs": ["A", "B"],
                "benefits": {"energy savings increase": 0.1, "cost reduction": 0.05}}"#,
        )
        .unwrap();
        assert_eq!(p.members.len(), 2);
        assert_eq!(p.benefits.cost_reduction, 0.05);
    }
}
