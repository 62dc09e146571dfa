//! Measures and their filled markets.
//!
//! A [`Measure`] starts from an immutable [`MeasureDefinition`]. A single call
//! to [`Measure::fill_mkts`] walks the measure's key chains against the
//! baseline data and records one [`Markets`] per adoption scheme.

pub mod breakdown;
pub mod definition;
mod fill;
pub mod submarket;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::baseline::{BaselineMarkets, CplTree, ReferenceData};
use crate::mseg::key::{Applicability, MicrosegmentKey};
use crate::mseg::streams::Microsegment;
use crate::mseg::value::{Year, YearMap};
use crate::partition::{AdoptionScheme, SecondaryAdjust};

pub use breakdown::Breakdown;
pub use definition::{Keyed, MAX_NAME_LEN, MeasureDefinition};
pub use submarket::{SubmarketSource, SubmarketWarning};

/// Run-wide settings shared by every measure.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Modeling years, ascending.
    pub years: Vec<Year>,
    /// Annual retrofit rate of existing stock.
    pub retro_rate: f64,
    /// Samples drawn for distribution-valued inputs.
    pub nsamples: usize,
    /// Base seed; each measure derives its own from it.
    pub seed: u64,
}

impl EngineSettings {
    /// Settings covering `first..=last`.
    ///
    /// # Panics
    ///
    /// Panics if `last < first` or `nsamples` is zero.
    pub fn new(first: Year, last: Year, retro_rate: f64, nsamples: usize, seed: u64) -> Self {
        assert!(last >= first, "last year must not precede first year");
        assert!(nsamples > 0, "nsamples must be positive");
        Self {
            years: (first..=last).collect(),
            retro_rate,
            nsamples,
            seed,
        }
    }
}

/// Reference data a fill reads from.
#[derive(Debug, Clone, Copy)]
pub struct FillInputs<'a> {
    pub baseline: &'a BaselineMarkets,
    pub cpl: &'a CplTree,
    pub reference: &'a ReferenceData,
    pub settings: &'a EngineSettings,
}

/// Consumer-choice parameters recorded for a competed microsegment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChoiceParams {
    /// Residential logit coefficients.
    Logit { b1: YearMap, b2: YearMap },
    /// Commercial discount-rate shares.
    RateDistribution {
        #[serde(rename = "rate distribution")]
        rate_distribution: Vec<f64>,
    },
}

/// Supply-demand interaction totals of heating and cooling microsegments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupplyDemandAdjust {
    pub savings: BTreeMap<MicrosegmentKey, YearMap>,
    pub total: BTreeMap<MicrosegmentKey, YearMap>,
}

/// Per-key records kept for the downstream competition step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MsegAdjust {
    #[serde(rename = "contributing mseg keys and values")]
    pub contributing: BTreeMap<MicrosegmentKey, Microsegment>,
    #[serde(rename = "competed choice parameters")]
    pub choice_params: BTreeMap<MicrosegmentKey, ChoiceParams>,
    /// Keyed by climate zone, building type and structure.
    #[serde(rename = "secondary mseg adjustments")]
    pub secondary_adjustments: BTreeMap<String, SecondaryAdjust>,
    #[serde(rename = "supply-demand adjustment")]
    pub supply_demand: SupplyDemandAdjust,
}

/// Filled markets of a measure under one adoption scheme.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Markets {
    pub master_mseg: Microsegment,
    pub mseg_adjust: MsegAdjust,
    pub mseg_out_break: Breakdown,
}

/// A measure and, once filled, its markets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    pub definition: MeasureDefinition,
    /// Expanded applicability, set by a successful fill.
    #[serde(default)]
    pub applicability: Option<Applicability>,
    pub markets: BTreeMap<AdoptionScheme, Markets>,
    pub finalized: bool,
    /// Deactivated for insufficient sub-market evidence.
    pub removed: bool,
    pub warnings: Vec<SubmarketWarning>,
}

impl Measure {
    pub fn new(definition: MeasureDefinition) -> Self {
        Self {
            definition,
            applicability: None,
            markets: BTreeMap::new(),
            finalized: false,
            removed: false,
            warnings: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Entry and exit years clamped to the modeling horizon.
    pub fn market_window(&self, years: &[Year]) -> crate::partition::MarketWindow {
        let first = years.first().copied().unwrap_or_default();
        let end = years.last().map_or(first, |y| y + 1);
        let entry = self
            .definition
            .market_entry_year
            .filter(|&y| y >= first)
            .unwrap_or(first);
        let exit = self
            .definition
            .market_exit_year
            .filter(|&y| y <= end)
            .unwrap_or(end);
        crate::partition::MarketWindow { entry, exit }
    }
}
