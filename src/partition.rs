//! Microsegment partitioner.
//!
//! Splits one microsegment's baseline stock, energy and carbon into the parts
//! competed in each year and the parts captured by the measure, then prices
//! each part. Stock turnover is tracked year over year through the captured
//! fractions, so the loop over years is inherently sequential.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MsegError, Result};
use crate::mseg::key::{MicrosegmentKey, MsegKind, Structure};
use crate::mseg::streams::{
    AllMeasure, BaseEff, CostStreams, Lifetime, Microsegment, TotalCompeted,
};
use crate::mseg::value::{Value, Year, YearMap, YearSeries};

/// Adoption scenario a measure is competed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AdoptionScheme {
    /// Every competed unit adopts the measure as soon as it enters the market.
    #[serde(rename = "Technical potential")]
    TechnicalPotential,
    /// Adoption only as existing stock turns over.
    #[serde(rename = "Max adoption potential")]
    MaxAdoptionPotential,
}

impl AdoptionScheme {
    pub const ALL: [AdoptionScheme; 2] = [
        AdoptionScheme::TechnicalPotential,
        AdoptionScheme::MaxAdoptionPotential,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AdoptionScheme::TechnicalPotential => "Technical potential",
            AdoptionScheme::MaxAdoptionPotential => "Max adoption potential",
        }
    }
}

impl fmt::Display for AdoptionScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How measure cost relates to the baseline technology it is installed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MeasureType {
    /// Replaces the baseline unit outright.
    #[default]
    #[serde(rename = "full service")]
    FullService,
    /// Installed on top of the baseline unit, which is still purchased.
    #[serde(rename = "add-on")]
    AddOn,
}

/// Years in which the measure is on the market, `[entry, exit)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketWindow {
    pub entry: Year,
    pub exit: Year,
}

impl MarketWindow {
    pub fn contains(&self, year: Year) -> bool {
        self.entry <= year && year < self.exit
    }
}

/// New-construction series for one climate zone and building type.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewConstruction {
    /// Units (homes or square footage) built in each year.
    pub annual_new: YearSeries,
    /// Cumulative new construction since the first modeled year.
    pub total_new: YearSeries,
    /// Total stock of units.
    pub total: YearSeries,
}

impl NewConstruction {
    /// Builds the cumulative series from annual new and total stock.
    ///
    /// # Errors
    ///
    /// Returns [`MsegError::ShapeMismatch`] if either series lacks one of
    /// `years`.
    pub fn from_series(
        annual_new: &YearSeries,
        total: &YearSeries,
        years: &[Year],
    ) -> Result<Self> {
        let mut out = NewConstruction::default();
        let mut running = 0.0;
        for &y in years {
            let (Some(&a), Some(&t)) = (annual_new.get(&y), total.get(&y)) else {
                return Err(MsegError::ShapeMismatch(format!(
                    "construction data has no value for year {y}"
                )));
            };
            running += a;
            out.annual_new.insert(y, a);
            out.total_new.insert(y, running);
            out.total.insert(y, t);
        }
        Ok(out)
    }

    /// Share of the year's stock belonging to `structure`.
    pub fn structure_fraction(&self, structure: Structure, year: Year) -> f64 {
        let total = self.total.get(&year).copied().unwrap_or(0.0);
        let new = self.total_new.get(&year).copied().unwrap_or(0.0);
        let frac = if total == 0.0 { 0.0 } else { (new / total).min(1.0) };
        match structure {
            Structure::New => frac,
            Structure::Existing => 1.0 - frac,
        }
    }

    fn new_share(&self, year: Year) -> f64 {
        let total_new = self.total_new.get(&year).copied().unwrap_or(0.0);
        if total_new == 0.0 {
            0.0
        } else {
            self.annual_new.get(&year).copied().unwrap_or(0.0) / total_new
        }
    }
}

/// `original` total versus `adjusted` (scaled) stock of a sub-market.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SubMarketAdjust {
    #[serde(rename = "original stock (total)")]
    pub original: YearMap,
    #[serde(rename = "adjusted stock (sub-market)")]
    pub adjusted: YearMap,
}

/// Stock turnover of the primary microsegments, for secondary keys to follow.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StockFlowAdjust {
    #[serde(rename = "original stock (total)")]
    pub original: YearMap,
    #[serde(rename = "adjusted stock (previously captured)")]
    pub previously_captured: YearMap,
    #[serde(rename = "adjusted stock (competed)")]
    pub competed: YearMap,
    #[serde(rename = "adjusted stock (competed and captured)")]
    pub competed_captured: YearMap,
}

/// Market-share placeholders filled by the downstream competition step.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MarketShareAdjust {
    #[serde(rename = "original stock (total captured)")]
    pub original_captured: YearMap,
    #[serde(rename = "original stock (competed and captured)")]
    pub original_competed_captured: YearMap,
    #[serde(rename = "adjusted stock (total captured)")]
    pub adjusted_captured: YearMap,
    #[serde(rename = "adjusted stock (competed and captured)")]
    pub adjusted_competed_captured: YearMap,
}

/// Primary-market state that drives the secondary microsegments sharing a
/// climate zone, building type and structure.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SecondaryAdjust {
    #[serde(rename = "sub-market")]
    pub sub_market: SubMarketAdjust,
    #[serde(rename = "stock-and-flow")]
    pub stock_and_flow: StockFlowAdjust,
    #[serde(rename = "market share")]
    pub market_share: MarketShareAdjust,
}

impl SecondaryAdjust {
    pub fn zeros(years: &[Year]) -> Self {
        let z = YearMap::constant(years, Value::Scalar(0.0));
        Self {
            sub_market: SubMarketAdjust {
                original: z.clone(),
                adjusted: z.clone(),
            },
            stock_and_flow: StockFlowAdjust {
                original: z.clone(),
                previously_captured: z.clone(),
                competed: z.clone(),
                competed_captured: z.clone(),
            },
            market_share: MarketShareAdjust {
                original_captured: z.clone(),
                original_competed_captured: z.clone(),
                adjusted_captured: z.clone(),
                adjusted_competed_captured: z,
            },
        }
    }

    /// Adds another contribution, broadcasting scalars against ensembles.
    pub fn accumulate(&mut self, other: &SecondaryAdjust) {
        let add = |a: &mut YearMap, b: &YearMap| {
            *a = a.map(|y, v| v + b.at(y));
        };
        add(&mut self.sub_market.original, &other.sub_market.original);
        add(&mut self.sub_market.adjusted, &other.sub_market.adjusted);
        let (sf, of) = (&mut self.stock_and_flow, &other.stock_and_flow);
        add(&mut sf.original, &of.original);
        add(&mut sf.previously_captured, &of.previously_captured);
        add(&mut sf.competed, &of.competed);
        add(&mut sf.competed_captured, &of.competed_captured);
    }

    /// Promotes every leaf to an ensemble of `n` samples.
    pub fn promote(&self, n: usize) -> Self {
        let p = |m: &YearMap| m.promote(n);
        Self {
            sub_market: SubMarketAdjust {
                original: p(&self.sub_market.original),
                adjusted: p(&self.sub_market.adjusted),
            },
            stock_and_flow: StockFlowAdjust {
                original: p(&self.stock_and_flow.original),
                previously_captured: p(&self.stock_and_flow.previously_captured),
                competed: p(&self.stock_and_flow.competed),
                competed_captured: p(&self.stock_and_flow.competed_captured),
            },
            market_share: MarketShareAdjust {
                original_captured: p(&self.market_share.original_captured),
                original_competed_captured: p(&self.market_share.original_competed_captured),
                adjusted_captured: p(&self.market_share.adjusted_captured),
                adjusted_competed_captured: p(&self.market_share.adjusted_competed_captured),
            },
        }
    }
}

/// Key under which secondary adjustments are accumulated.
pub fn adjustment_key(key: &MicrosegmentKey) -> String {
    format!("{}|{}|{}", key.climate_zone, key.building_type, key.structure)
}

/// Everything the partitioner needs for one microsegment.
///
/// Stock, energy and carbon are already scaled to the key's structure type.
#[derive(Debug, Clone)]
pub struct PartitionInputs<'a> {
    pub scheme: AdoptionScheme,
    pub key: &'a MicrosegmentKey,
    pub years: &'a [Year],
    /// Market-scaling fraction, when the measure applies to a sub-market.
    pub scale: Option<f64>,
    pub construction: &'a NewConstruction,
    pub stock: &'a YearMap,
    pub energy: &'a YearMap,
    pub carbon: &'a YearMap,
    pub cost_base: &'a YearMap,
    pub cost_meas: &'a Value,
    pub energy_cost_base: &'a YearMap,
    pub energy_cost_meas: &'a YearMap,
    pub carbon_price: &'a YearMap,
    pub rel_perf: &'a YearMap,
    pub life_base: &'a YearMap,
    pub life_meas: &'a Value,
    pub site_source_base: &'a YearMap,
    pub site_source_meas: &'a YearMap,
    pub intensity_base: &'a YearMap,
    pub intensity_meas: &'a YearMap,
    /// Accumulated primary state, read by secondary keys.
    pub secondary: Option<&'a SecondaryAdjust>,
    pub window: MarketWindow,
    pub measure_type: MeasureType,
    pub retro_rate: f64,
    /// Sample count when the measure is ensemble-valued.
    pub nsamples: Option<usize>,
}

/// Partitioner output for one key.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub mseg: Microsegment,
    /// The key's contribution to the secondary adjustments (primary keys).
    pub contribution: Option<SecondaryAdjust>,
}

fn year_value(map: &YearMap, year: Year, name: &str) -> Result<Value> {
    map.get(year)
        .cloned()
        .ok_or_else(|| MsegError::ShapeMismatch(format!("{name} has no value for year {year}")))
}

/// Accumulates one year of a stream pair into its four year maps.
#[derive(Default)]
struct StreamBuilder {
    total_base: YearMap,
    total_eff: YearMap,
    competed_base: YearMap,
    competed_eff: YearMap,
}

impl StreamBuilder {
    fn push(
        &mut self,
        y: Year,
        total_base: Value,
        total_eff: Value,
        comp_base: Value,
        comp_eff: Value,
    ) {
        self.total_base.insert(y, total_base);
        self.total_eff.insert(y, total_eff);
        self.competed_base.insert(y, comp_base);
        self.competed_eff.insert(y, comp_eff);
    }

    fn finish(self) -> TotalCompeted<BaseEff> {
        TotalCompeted {
            total: BaseEff {
                baseline: self.total_base,
                efficient: self.total_eff,
            },
            competed: BaseEff {
                baseline: self.competed_base,
                efficient: self.competed_eff,
            },
        }
    }
}

/// Partitions one microsegment over the modeling horizon.
///
/// # Arguments
///
/// * `inp` - Baseline series, measure characteristics and, for secondary
///   keys, the accumulated primary adjustments
///
/// # Errors
///
/// Returns [`MsegError::ShapeMismatch`] if any input series lacks one of the
/// modeling years.
pub fn partition(inp: &PartitionInputs<'_>) -> Result<Partition> {
    let years = inp.years;
    let Some(&first_year) = years.first() else {
        return Err(MsegError::ShapeMismatch("empty modeling horizon".into()));
    };
    let primary = inp.key.kind == MsegKind::Primary;
    let tech_potential = inp.scheme == AdoptionScheme::TechnicalPotential;
    let adjust = if primary { None } else { inp.secondary };

    let mut contribution = primary.then(|| SecondaryAdjust::zeros(years));
    let mut captured_eff = Value::Scalar(0.0);
    let mut captured_base = Value::Scalar(1.0);
    let mut rp_uncompeted = Value::Scalar(1.0);
    let mut prev_meas: Option<Value> = None;
    let mut scale = inp.scale.unwrap_or(1.0);

    let mut stock_all = TotalCompeted::<YearMap>::default();
    let mut stock_meas = TotalCompeted::<YearMap>::default();
    let mut energy = StreamBuilder::default();
    let mut carbon = StreamBuilder::default();
    let mut stock_cost = StreamBuilder::default();
    let mut energy_cost = StreamBuilder::default();
    let mut carbon_cost = StreamBuilder::default();

    for &y in years {
        let active = inp.window.contains(y);
        let retired = y >= inp.window.exit;

        // secondary keys follow the primary markets of their sub-segment
        let mut sec_fracs: Option<(Value, Value)> = None;
        if let Some(adj) = adjust {
            let sm_orig = adj.sub_market.original.at(y);
            if sm_orig.mean() != 0.0 {
                scale = adj.sub_market.adjusted.at(y).div_or_zero(&sm_orig).mean();
            }
            let sf = &adj.stock_and_flow;
            let orig = sf.original.at(y);
            captured_eff = sf.previously_captured.at(y).div_or_zero(&orig);
            captured_base = captured_eff.map(|c| 1.0 - c);
            if orig.mean() != 0.0 {
                sec_fracs = Some((
                    sf.competed.at(y).div_or_zero(&orig),
                    sf.competed_captured.at(y).div_or_zero(&orig),
                ));
            }
        }
        if retired {
            captured_eff = Value::Scalar(0.0);
            captured_base = Value::Scalar(1.0);
        }

        let stock_init = year_value(inp.stock, y, "stock")?;
        let stock_total = &stock_init * scale;
        let energy_total = year_value(inp.energy, y, "energy")? * scale;
        let carbon_total = year_value(inp.carbon, y, "carbon")? * scale;

        let (base_replace, eff_replace) = if primary {
            let life_b = year_value(inp.life_base, y, "baseline lifetime")?;
            let age = f64::from(y - first_year);
            let base = life_b.zip_with(&captured_base, |l, cb| {
                let inv = if l > 0.0 { 1.0 / l } else { 1.0 };
                match inp.key.structure {
                    Structure::New if l - age > 0.0 => 0.0,
                    _ => inv.min(cb),
                }
            });
            let since_entry = f64::from(y.saturating_sub(inp.window.entry));
            let eff = inp.life_meas.zip_with(&captured_eff, |l, ce| {
                if l - since_entry <= 0.0 && l > 0.0 { ce / l } else { 0.0 }
            });
            (base, eff)
        } else {
            (Value::Scalar(0.0), Value::Scalar(0.0))
        };

        let (competed, competed_captured) = match &sec_fracs {
            Some((c, cc)) => (c.clone(), cc.clone()),
            None if !primary => (Value::Scalar(0.0), Value::Scalar(0.0)),
            None => {
                let competed = if y == inp.window.entry && tech_potential {
                    Value::Scalar(1.0)
                } else {
                    match inp.key.structure {
                        Structure::New => {
                            let a = inp.construction.new_share(y);
                            (&eff_replace + &base_replace).map(|r| a + (1.0 - a) * r)
                        }
                        Structure::Existing => (&base_replace + &eff_replace)
                            .map(|r| (r + inp.retro_rate).min(1.0)),
                    }
                };
                let cc = if active { competed.clone() } else { Value::Scalar(0.0) };
                (competed, cc)
            }
        };

        if let Some(contrib) = contribution.as_mut() {
            contrib.sub_market.original.insert(y, stock_init.clone());
            contrib.sub_market.adjusted.insert(y, stock_total.clone());
            let sf = &mut contrib.stock_and_flow;
            sf.original.insert(y, stock_total.clone());
            sf.previously_captured.insert(y, &captured_eff * &stock_total);
            sf.competed.insert(y, &competed * &stock_total);
            sf.competed_captured.insert(y, &competed_captured * &stock_total);
        }

        // stock
        let stock_compete = &stock_total * &competed;
        let meas_compete = &stock_total * &competed_captured;
        let meas_total = match &prev_meas {
            _ if retired => Value::Scalar(0.0),
            None => meas_compete.clone(),
            Some(_) if tech_potential && active => stock_total.clone(),
            Some(prev) => {
                let carried = prev * eff_replace.map(|r| 1.0 - r) + &meas_compete;
                carried.min(&stock_total)
            }
        };

        // relative performance of captured stock
        let rp = year_value(inp.rel_perf, y, "relative performance")?;
        if y <= inp.window.entry {
            rp_uncompeted = rp.clone();
        } else {
            rp_uncompeted = Value::zip_all(
                &[&rp, &rp_uncompeted, &competed, &competed_captured, &captured_eff],
                |v| {
                    let (rp, rp_uc, c, cc, ce) = (v[0], v[1], v[2], v[3], v[4]);
                    let capture = cc + (1.0 - c) * ce;
                    if capture == 0.0 {
                        rp_uc
                    } else {
                        (rp * cc + rp_uc * (capture - cc)) / capture
                    }
                },
            );
        }

        let ss_ratio = year_value(inp.site_source_meas, y, "measure site-source")?
            .div_or_zero(&year_value(inp.site_source_base, y, "baseline site-source")?);
        let ci_ratio = year_value(inp.intensity_meas, y, "measure carbon intensity")?
            .div_or_zero(&year_value(inp.intensity_base, y, "baseline carbon intensity")?);
        let uncaptured = competed.zip_with(&competed_captured, |c, cc| c - cc);
        let not_captured = captured_eff.map(|c| 1.0 - c);

        // flows split into captured and uncaptured shares
        let split = |total: &Value, captured_factor: &Value, base_factor: &Value| {
            let competed_part = total * &competed;
            let comp_eff = total * &competed_captured * &rp * captured_factor
                + total * &uncaptured * base_factor;
            let uncompeted = total - &competed_part;
            let total_eff = &comp_eff
                + &uncompeted * &captured_eff * &rp_uncompeted * captured_factor
                + &uncompeted * &not_captured * base_factor;
            (comp_eff, total_eff)
        };
        let one = Value::Scalar(1.0);

        let (e_comp_eff, e_total_eff) = split(&energy_total, &ss_ratio, &one);
        let energy_compete = &energy_total * &competed;
        energy.push(y, energy_total.clone(), e_total_eff, energy_compete.clone(), e_comp_eff);

        let carbon_factor = &ss_ratio * &ci_ratio;
        let (c_comp_eff, c_total_eff) = split(&carbon_total, &carbon_factor, &one);
        let carbon_compete = &carbon_total * &competed;

        let cost_b = year_value(inp.cost_base, y, "baseline cost")?;
        let meas_unit_cost = match inp.measure_type {
            MeasureType::FullService => inp.cost_meas.clone(),
            MeasureType::AddOn => inp.cost_meas + &cost_b,
        };
        stock_cost.push(
            y,
            &stock_total * &cost_b,
            &meas_total * &meas_unit_cost + (&stock_total - &meas_total) * &cost_b,
            &stock_compete * &cost_b,
            &meas_compete * &meas_unit_cost + (&stock_compete - &meas_compete) * &cost_b,
        );

        let ecost_b = year_value(inp.energy_cost_base, y, "baseline energy cost")?;
        let ecost_m = year_value(inp.energy_cost_meas, y, "measure energy cost")?;
        let (ec_comp_eff, ec_total_eff) = split(&energy_total, &(&ss_ratio * &ecost_m), &ecost_b);
        energy_cost.push(
            y,
            &energy_total * &ecost_b,
            ec_total_eff,
            &energy_compete * &ecost_b,
            ec_comp_eff,
        );

        let price = year_value(inp.carbon_price, y, "carbon price")?;
        carbon_cost.push(
            y,
            &carbon_total * &price,
            &c_total_eff * &price,
            &carbon_compete * &price,
            &c_comp_eff * &price,
        );
        carbon.push(y, carbon_total.clone(), c_total_eff, carbon_compete, c_comp_eff);

        stock_all.total.insert(y, stock_total.clone());
        stock_all.competed.insert(y, stock_compete);
        stock_meas.total.insert(y, meas_total.clone());
        stock_meas.competed.insert(y, meas_compete);

        if primary {
            captured_eff = Value::zip3(&captured_eff, &meas_total, &stock_total, |ce, m, t| {
                if t != 0.0 && ce != 1.0 { m / t } else { ce }
            });
            captured_base = captured_eff.map(|c| 1.0 - c);
        }
        prev_meas = Some(meas_total);
    }

    let mseg = Microsegment {
        stock: TotalCompeted {
            total: AllMeasure {
                all: stock_all.total,
                measure: stock_meas.total,
            },
            competed: AllMeasure {
                all: stock_all.competed,
                measure: stock_meas.competed,
            },
        },
        energy: energy.finish(),
        carbon: carbon.finish(),
        cost: CostStreams {
            stock: stock_cost.finish(),
            energy: energy_cost.finish(),
            carbon: carbon_cost.finish(),
        },
        lifetime: Lifetime {
            baseline: inp.life_base.clone(),
            measure: inp.life_meas.clone(),
        },
    };

    Ok(match inp.nsamples {
        Some(n) => Partition {
            mseg: mseg.promote(n),
            contribution: contribution.map(|c| c.promote(n)),
        },
        None => Partition { mseg, contribution },
    })
}

/// Sums contributions into the per-sub-segment adjustment map.
pub fn fold_contribution(
    adjustments: &mut BTreeMap<String, SecondaryAdjust>,
    key: &MicrosegmentKey,
    contribution: &SecondaryAdjust,
    years: &[Year],
) {
    adjustments
        .entry(adjustment_key(key))
        .or_insert_with(|| SecondaryAdjust::zeros(years))
        .accumulate(contribution);
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const YEARS: [Year; 4] = [2009, 2010, 2011, 2012];

    struct Fixture {
        key: MicrosegmentKey,
        construction: NewConstruction,
        stock: YearMap,
        energy: YearMap,
        carbon: YearMap,
        cost_base: YearMap,
        cost_meas: Value,
        ecost: YearMap,
        price: YearMap,
        rel_perf: YearMap,
        life_base: YearMap,
        life_meas: Value,
        ones: YearMap,
    }

    fn c(x: f64) -> YearMap {
        YearMap::constant(&YEARS, Value::Scalar(x))
    }

    fn fixture(structure: Structure) -> Fixture {
        let series = |x: f64| YEARS.iter().map(|&y| (y, x)).collect::<YearSeries>();
        Fixture {
            key: MicrosegmentKey {
                kind: MsegKind::Primary,
                climate_zone: "AIA_CZ1".into(),
                building_type: "single family home".into(),
                fuel: "natural gas".into(),
                end_use: "water heating".into(),
                technology_type: None,
                technology: None,
                structure,
            },
            construction: NewConstruction::from_series(&series(1.0), &series(100.0), &YEARS)
                .unwrap(),
            stock: c(15.0),
            energy: c(15.15),
            carbon: c(0.9),
            cost_base: c(10.0),
            cost_meas: Value::Scalar(25.0),
            ecost: c(2.0),
            price: c(0.05),
            rel_perf: c(18.0 / 25.0),
            life_base: c(3.0),
            life_meas: Value::Scalar(5.0),
            ones: c(1.0),
        }
    }

    fn inputs<'a>(
        f: &'a Fixture,
        scheme: AdoptionScheme,
        window: MarketWindow,
    ) -> PartitionInputs<'a> {
        PartitionInputs {
            scheme,
            key: &f.key,
            years: &YEARS,
            scale: None,
            construction: &f.construction,
            stock: &f.stock,
            energy: &f.energy,
            carbon: &f.carbon,
            cost_base: &f.cost_base,
            cost_meas: &f.cost_meas,
            energy_cost_base: &f.ecost,
            energy_cost_meas: &f.ecost,
            carbon_price: &f.price,
            rel_perf: &f.rel_perf,
            life_base: &f.life_base,
            life_meas: &f.life_meas,
            site_source_base: &f.ones,
            site_source_meas: &f.ones,
            intensity_base: &f.ones,
            intensity_meas: &f.ones,
            secondary: None,
            window,
            measure_type: MeasureType::FullService,
            retro_rate: 0.01,
            nsamples: None,
        }
    }

    const FULL: MarketWindow = MarketWindow { entry: 2009, exit: 2013 };

    #[test]
    fn technical_potential_captures_everything_at_entry() {
        let f = fixture(Structure::Existing);
        let e = partition(&inputs(&f, AdoptionScheme::TechnicalPotential, FULL))
            .unwrap()
            .mseg
            .energy;
        assert_relative_eq!(e.total.efficient.at(2009).mean(), 10.908, epsilon = 1e-9);
        assert_relative_eq!(e.competed.efficient.at(2009).mean(), 10.908, epsilon = 1e-9);
        assert_relative_eq!(e.total.baseline.at(2009).mean(), 15.15);
        assert_relative_eq!(e.total.efficient.at(2011).mean(), 10.908, epsilon = 1e-9);
    }

    #[test]
    fn max_adoption_turns_over_gradually() {
        let f = fixture(Structure::Existing);
        let m = partition(&inputs(&f, AdoptionScheme::MaxAdoptionPotential, FULL))
            .unwrap()
            .mseg;
        // existing stock competes 1/3 (lifetime) + 1% retrofit in the first year
        assert_relative_eq!(
            m.stock.competed.all.at(2009).mean(),
            15.0 * (1.0 / 3.0 + 0.01),
            epsilon = 1e-9
        );
        let t0 = m.stock.total.measure.at(2009).mean();
        let t1 = m.stock.total.measure.at(2010).mean();
        assert!(t0 > 0.0 && t1 > t0 && t1 <= 15.0);
    }

    #[test]
    fn competed_never_exceeds_total() {
        for s in [Structure::New, Structure::Existing] {
            for scheme in AdoptionScheme::ALL {
                let f = fixture(s);
                let m = partition(&inputs(&f, scheme, FULL)).unwrap().mseg;
                for (name, stream) in m.streams() {
                    for y in YEARS {
                        let t = stream.total.efficient.at(y).mean();
                        let c = stream.competed.efficient.at(y).mean();
                        assert!(c <= t + 1e-9, "{name} {y}: {c} > {t}");
                    }
                }
            }
        }
    }

    #[test]
    fn efficient_matches_baseline_outside_window() {
        let f = fixture(Structure::Existing);
        let window = MarketWindow { entry: 2010, exit: 2012 };
        let m = partition(&inputs(&f, AdoptionScheme::TechnicalPotential, window))
            .unwrap()
            .mseg;
        for y in [2009, 2012] {
            for (_, s) in m.streams() {
                let (total, competed) = (&s.total, &s.competed);
                assert_relative_eq!(
                    total.efficient.at(y).mean(),
                    total.baseline.at(y).mean(),
                    epsilon = 1e-9
                );
                assert_relative_eq!(
                    competed.efficient.at(y).mean(),
                    competed.baseline.at(y).mean(),
                    epsilon = 1e-9
                );
            }
        }
        assert!(m.energy.total.efficient.at(2010).mean() < m.energy.total.baseline.at(2010).mean());
    }

    #[test]
    fn add_on_cost_includes_baseline_unit() {
        let f = fixture(Structure::Existing);
        let mut inp = inputs(&f, AdoptionScheme::TechnicalPotential, FULL);
        inp.measure_type = MeasureType::AddOn;
        let m = partition(&inp).unwrap().mseg;
        assert_relative_eq!(m.cost.stock.total.efficient.at(2009).mean(), 15.0 * 35.0);
        assert_relative_eq!(m.cost.stock.total.baseline.at(2009).mean(), 150.0);
    }

    #[test]
    fn new_structure_waits_for_baseline_retirement() {
        let f = fixture(Structure::New);
        let m = partition(&inputs(&f, AdoptionScheme::MaxAdoptionPotential, FULL))
            .unwrap()
            .mseg;
        // only newly built units compete before the baseline lifetime elapses
        assert_relative_eq!(m.stock.competed.all.at(2009).mean(), 15.0, epsilon = 1e-9);
        assert_relative_eq!(m.stock.competed.all.at(2010).mean(), 7.5, epsilon = 1e-9);
    }

    #[test]
    fn ensemble_measures_promote_every_leaf() {
        let mut f = fixture(Structure::Existing);
        f.cost_meas = Value::Ensemble(vec![20.0, 30.0]);
        let mut inp = inputs(&f, AdoptionScheme::TechnicalPotential, FULL);
        inp.nsamples = Some(2);
        let m = partition(&inp).unwrap().mseg;
        assert_eq!(m.energy.total.baseline.at(2009).ensemble_len(), Some(2));
        assert_eq!(m.cost.stock.total.efficient.at(2009), Value::Ensemble(vec![300.0, 450.0]));
    }

    #[test]
    fn secondary_key_follows_primary_turnover() {
        let f = fixture(Structure::Existing);
        let primary = partition(&inputs(&f, AdoptionScheme::TechnicalPotential, FULL)).unwrap();
        let mut adjustments = BTreeMap::new();
        fold_contribution(&mut adjustments, &f.key, primary.contribution.as_ref().unwrap(), &YEARS);
        let mut sec = fixture(Structure::Existing);
        sec.key.kind = MsegKind::Secondary;
        sec.key.end_use = "heating".into();
        sec.stock = c(0.0);
        sec.energy = c(10.0);
        sec.rel_perf = c(0.6);
        sec.life_base = c(0.0);
        sec.life_meas = Value::Scalar(0.0);
        let mut inp = inputs(&sec, AdoptionScheme::TechnicalPotential, FULL);
        inp.secondary = adjustments.get(&adjustment_key(&f.key));
        let m = partition(&inp).unwrap().mseg;
        assert_relative_eq!(m.energy.total.efficient.at(2009).mean(), 6.0, epsilon = 1e-9);
        assert_relative_eq!(m.energy.total.efficient.at(2011).mean(), 6.0, epsilon = 1e-9);
        assert_relative_eq!(m.stock.total.all.at(2009).mean(), 0.0);
    }

    #[test]
    fn missing_year_is_shape_mismatch() {
        let mut f = fixture(Structure::Existing);
        f.energy = YearMap::constant(&YEARS[..2], Value::Scalar(1.0));
        let r = partition(&inputs(&f, AdoptionScheme::TechnicalPotential, FULL));
        assert!(matches!(r, Err(MsegError::ShapeMismatch(_))));
    }

    #[test]
    fn structure_fraction_splits_new_and_existing() {
        let f = fixture(Structure::New);
        assert_relative_eq!(f.construction.structure_fraction(Structure::New, 2010), 0.02);
        assert_relative_eq!(f.construction.structure_fraction(Structure::Existing, 2010), 0.98);
    }
}
