//! Baseline reference data: stock/energy markets, technology
//! cost/performance/lifetime, and sector-level conversion factors.
//!
//! Both market trees share one shape, climate zone -> building type -> fuel
//! -> end use, below which an end use holds either a leaf directly, a
//! technology map, or separate supply/demand technology maps.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::convert::{ConversionTable, CpiRow};
use crate::error::{MsegError, Result};
use crate::mseg::categories::Sector;
use crate::mseg::key::{MicrosegmentKey, TechType};
use crate::mseg::value::{Value, Year, YearMap, YearSeries, year_keys};

/// Supply-side and demand-side technology maps of a heating/cooling end use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupplyDemand<L> {
    pub supply: BTreeMap<String, L>,
    pub demand: BTreeMap<String, L>,
}

/// Contents of one end use in a reference tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EndUseNode<L> {
    SupplyDemand(SupplyDemand<L>),
    Leaf(L),
    Technologies(BTreeMap<String, L>),
}

impl<L> EndUseNode<L> {
    fn leaf(&self, tech_type: Option<TechType>, tech: Option<&str>) -> Option<&L> {
        match (self, tech_type, tech) {
            (EndUseNode::SupplyDemand(sd), Some(TechType::Supply), Some(t)) => sd.supply.get(t),
            (EndUseNode::SupplyDemand(sd), Some(TechType::Demand), Some(t)) => sd.demand.get(t),
            (EndUseNode::Technologies(m), _, Some(t)) => m.get(t),
            (EndUseNode::Leaf(l), _, None) => Some(l),
            _ => None,
        }
    }
}

/// climate zone -> building type -> fuel -> end use -> node.
pub type SegmentTree<L> =
    BTreeMap<String, BTreeMap<String, BTreeMap<String, BTreeMap<String, EndUseNode<L>>>>>;

fn end_use_node<'a, L>(
    tree: &'a SegmentTree<L>,
    key: &MicrosegmentKey,
) -> Option<&'a EndUseNode<L>> {
    tree.get(&key.climate_zone)?
        .get(&key.building_type)?
        .get(&key.fuel)?
        .get(&key.end_use)
}

/// Retrieves the leaf addressed by `key`, if present.
pub fn lookup<'a, L>(tree: &'a SegmentTree<L>, key: &MicrosegmentKey) -> Option<&'a L> {
    end_use_node(tree, key)?.leaf(key.technology_type, key.technology.as_deref())
}

/// All leaves on the same supply or demand side as `key`.
///
/// Returns `None` unless the key has a technology type and its end use is
/// split into supply and demand maps that contain the key's technology.
pub fn side_leaves<'a, L>(tree: &'a SegmentTree<L>, key: &MicrosegmentKey) -> Option<Vec<&'a L>> {
    let EndUseNode::SupplyDemand(sd) = end_use_node(tree, key)? else {
        return None;
    };
    let side = match key.technology_type? {
        TechType::Supply => &sd.supply,
        TechType::Demand => &sd.demand,
    };
    side.contains_key(key.technology.as_deref()?)
        .then(|| side.values().collect())
}

/// Stock series, or a sentinel string for components counted in floor area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Stock {
    Units(#[serde(deserialize_with = "year_keys::deserialize")] YearSeries),
    NotApplicable(String),
}

/// Stock/energy leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockEnergy {
    pub stock: Stock,
    #[serde(deserialize_with = "year_keys::deserialize")]
    pub energy: YearSeries,
}

/// New-construction and floor-area series for one climate zone and building type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstructionData {
    #[serde(rename = "total homes")]
    pub total_homes: Option<YearSeries>,
    #[serde(rename = "new homes")]
    pub new_homes: Option<YearSeries>,
    #[serde(rename = "total square footage")]
    pub total_sqft: Option<YearSeries>,
    #[serde(rename = "new square footage")]
    pub new_sqft: Option<YearSeries>,
}

/// Baseline stock and energy markets plus construction data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaselineMarkets {
    pub segments: SegmentTree<StockEnergy>,
    #[serde(default)]
    pub construction: BTreeMap<String, BTreeMap<String, ConstructionData>>,
}

impl BaselineMarkets {
    /// Construction data for the key's climate zone and building type.
    ///
    /// # Errors
    ///
    /// Returns [`MsegError::LookupMissing`] if no entry exists.
    pub fn construction(&self, key: &MicrosegmentKey) -> Result<&ConstructionData> {
        self.construction
            .get(&key.climate_zone)
            .and_then(|b| b.get(&key.building_type))
            .ok_or_else(|| MsegError::missing("construction data", key))
    }
}

/// A reference number that may be recorded as a text sentinel such as "NA".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Datum {
    Number(f64),
    Text(String),
}

impl Datum {
    /// The value, if numeric and non-zero.
    pub fn usable(&self) -> Option<f64> {
        match self {
            Datum::Number(x) if *x != 0.0 => Some(*x),
            _ => None,
        }
    }
}

/// Year-keyed reference numbers.
pub type DatumSeries = BTreeMap<Year, Datum>;

/// Converts a datum series to numbers when every year in `years` is usable.
pub fn usable_series(series: &DatumSeries, years: &[Year]) -> Option<YearMap> {
    years
        .iter()
        .map(|&y| {
            series
                .get(&y)
                .and_then(Datum::usable)
                .map(|v| (y, Value::Scalar(v)))
        })
        .collect::<Option<YearMap>>()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypicalValue {
    #[serde(deserialize_with = "year_keys::deserialize")]
    pub typical: DatumSeries,
    #[serde(default)]
    pub units: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AverageValue {
    #[serde(deserialize_with = "year_keys::deserialize")]
    pub average: DatumSeries,
    #[serde(default)]
    pub units: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceCoefficients {
    #[serde(deserialize_with = "year_keys::deserialize")]
    pub b1: DatumSeries,
    #[serde(deserialize_with = "year_keys::deserialize")]
    pub b2: DatumSeries,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketShare {
    pub parameters: ChoiceCoefficients,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumerChoice {
    #[serde(rename = "competed market share", default)]
    pub competed_market_share: Option<MarketShare>,
}

/// Cost/performance/lifetime leaf of the baseline technology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CplLeaf {
    #[serde(default)]
    pub performance: Option<TypicalValue>,
    #[serde(rename = "installed cost", default)]
    pub installed_cost: Option<TypicalValue>,
    #[serde(default)]
    pub lifetime: Option<AverageValue>,
    #[serde(rename = "consumer choice", default)]
    pub consumer_choice: Option<ConsumerChoice>,
}

pub type CplTree = SegmentTree<CplLeaf>;

/// Commercial discount-rate preferences used as choice parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommercialTimePrefs {
    pub rates: Vec<f64>,
    pub distributions: BTreeMap<String, Vec<f64>>,
}

impl Default for CommercialTimePrefs {
    fn default() -> Self {
        let heating = vec![0.265, 0.226, 0.196, 0.192, 0.105, 0.013, 0.003];
        let distributions = [
            ("heating", heating.clone()),
            ("cooling", vec![0.264, 0.225, 0.193, 0.192, 0.106, 0.016, 0.004]),
            ("water heating", vec![0.263, 0.249, 0.212, 0.169, 0.097, 0.006, 0.004]),
            ("ventilation", heating),
            ("cooking", vec![0.261, 0.248, 0.214, 0.171, 0.097, 0.005, 0.004]),
            ("lighting", vec![0.264, 0.225, 0.193, 0.193, 0.085, 0.013, 0.027]),
            ("refrigeration", vec![0.262, 0.248, 0.213, 0.170, 0.097, 0.006, 0.004]),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Self {
            rates: vec![10.0, 1.0, 0.45, 0.25, 0.15, 0.065, 0.0],
            distributions,
        }
    }
}

/// Sector- and fuel-level factors, prices and conversion tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceData {
    /// Site-to-source factors by fuel.
    pub site_source: BTreeMap<String, YearSeries>,
    pub carbon_intensity: BTreeMap<Sector, BTreeMap<String, YearSeries>>,
    pub energy_prices: BTreeMap<Sector, BTreeMap<String, YearSeries>>,
    pub carbon_price: YearSeries,
    #[serde(default)]
    pub commercial_time_prefs: CommercialTimePrefs,
    #[serde(default)]
    pub cost_conversions: ConversionTable,
    #[serde(default)]
    pub cpi: Vec<CpiRow>,
}

impl ReferenceData {
    /// Site-to-source conversion for `fuel` over `years`.
    ///
    /// # Errors
    ///
    /// * [`MsegError::LookupMissing`] if the fuel is absent.
    /// * [`MsegError::ShapeMismatch`] if the fuel lacks a year.
    pub fn site_source(&self, fuel: &str, years: &[Year]) -> Result<YearMap> {
        let series = self
            .site_source
            .get(fuel)
            .ok_or_else(|| MsegError::missing("site-source conversion", fuel))?;
        YearMap::from_series(series, years)
    }

    /// Carbon intensity of `fuel` in `sector`.
    ///
    /// # Errors
    ///
    /// Returns [`MsegError::LookupMissing`] if the sector or fuel is absent.
    pub fn carbon_intensity(&self, sector: Sector, fuel: &str, years: &[Year]) -> Result<YearMap> {
        let series = self
            .carbon_intensity
            .get(&sector)
            .and_then(|f| f.get(fuel))
            .ok_or_else(|| MsegError::missing("carbon intensity", format!("{sector:?}/{fuel}")))?;
        YearMap::from_series(series, years)
    }

    /// Energy price of `fuel` in `sector`.
    ///
    /// # Errors
    ///
    /// Returns [`MsegError::LookupMissing`] if the sector or fuel is absent.
    pub fn energy_price(&self, sector: Sector, fuel: &str, years: &[Year]) -> Result<YearMap> {
        let series = self
            .energy_prices
            .get(&sector)
            .and_then(|f| f.get(fuel))
            .ok_or_else(|| MsegError::missing("energy price", format!("{sector:?}/{fuel}")))?;
        YearMap::from_series(series, years)
    }

    /// Carbon price over `years`.
    ///
    /// # Errors
    ///
    /// Returns [`MsegError::ShapeMismatch`] if a year is absent.
    pub fn carbon_price(&self, years: &[Year]) -> Result<YearMap> {
        YearMap::from_series(&self.carbon_price, years)
    }
}
