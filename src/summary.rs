//! Horizon totals of a measure's filled markets.

use std::fmt;

use crate::measure::Markets;
use crate::partition::AdoptionScheme;

/// Aggregate figures for one measure under one adoption scheme.
///
/// Ensemble-valued years contribute their mean, so the figures are
/// expected values over the sampled inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSummary {
    pub measure: String,
    pub scheme: AdoptionScheme,
    /// Baseline energy over the horizon (MMBtu).
    pub baseline_energy: f64,
    /// Efficient-case energy over the horizon (MMBtu).
    pub efficient_energy: f64,
    /// Baseline carbon over the horizon (MMTons).
    pub baseline_carbon: f64,
    /// Efficient-case carbon over the horizon (MMTons).
    pub efficient_carbon: f64,
    /// Energy savings as a percentage of baseline energy.
    pub energy_savings_pct: f64,
    /// Efficient minus baseline stock cost over the horizon.
    pub stock_cost_delta: f64,
    /// Measure stock as a share of all stock in the final year.
    pub final_measure_share: f64,
}

impl MarketSummary {
    /// Computes horizon totals from a filled scheme.
    ///
    /// # Arguments
    ///
    /// * `measure` - Measure name to report under
    /// * `scheme` - Adoption scheme the markets were filled for
    /// * `markets` - The filled markets
    ///
    /// # Returns
    ///
    /// A `MarketSummary`; an empty or zero baseline reports zero savings and
    /// share.
    pub fn from_markets(measure: &str, scheme: AdoptionScheme, markets: &Markets) -> Self {
        let m = &markets.master_mseg;
        let baseline_energy = m.energy.total.baseline.total_mean();
        let efficient_energy = m.energy.total.efficient.total_mean();
        let energy_savings_pct = if baseline_energy == 0.0 {
            0.0
        } else {
            100.0 * (baseline_energy - efficient_energy) / baseline_energy
        };

        let final_measure_share = m
            .years()
            .last()
            .map(|&y| {
                let all = m.stock.total.all.at(y).mean();
                let measure = m.stock.total.measure.at(y).mean();
                if all == 0.0 { 0.0 } else { measure / all }
            })
            .unwrap_or(0.0);

        Self {
            measure: measure.to_string(),
            scheme,
            baseline_energy,
            efficient_energy,
            baseline_carbon: m.carbon.total.baseline.total_mean(),
            efficient_carbon: m.carbon.total.efficient.total_mean(),
            energy_savings_pct,
            stock_cost_delta: m.cost.stock.total.efficient.total_mean()
                - m.cost.stock.total.baseline.total_mean(),
            final_measure_share,
        }
    }
}

impl fmt::Display for MarketSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- {} ({}) ---", self.measure, self.scheme)?;
        writeln!(
            f,
            "Energy:                {:.3} -> {:.3} MMBtu",
            self.baseline_energy, self.efficient_energy
        )?;
        writeln!(f, "Energy savings:        {:.1}%", self.energy_savings_pct)?;
        writeln!(
            f,
            "Carbon:                {:.3} -> {:.3} MMTons",
            self.baseline_carbon, self.efficient_carbon
        )?;
        writeln!(f, "Stock cost delta:      {:.2}", self.stock_cost_delta)?;
        write!(f, "Final measure share:   {:.1}%", 100.0 * self.final_measure_share)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mseg::streams::Microsegment;
    use crate::mseg::value::{Value, YearMap};
    use approx::assert_relative_eq;

    const YEARS: [u16; 3] = [2009, 2010, 2011];

    fn markets() -> Markets {
        let c = |x: f64| YearMap::constant(&YEARS, Value::Scalar(x));
        let mut m = Microsegment::zeros(&YEARS);
        m.energy.total.baseline = c(10.0);
        m.energy.total.efficient = c(7.5);
        m.carbon.total.baseline = c(2.0);
        m.carbon.total.efficient = c(1.0);
        m.cost.stock.total.baseline = c(100.0);
        m.cost.stock.total.efficient = c(120.0);
        m.stock.total.all = c(4.0);
        m.stock.total.measure = YearMap::from_fn(&YEARS, |y| Value::Scalar(f64::from(y - 2009)));
        Markets {
            master_mseg: m,
            ..Markets::default()
        }
    }

    #[test]
    fn totals_over_horizon() {
        let s = MarketSummary::from_markets("LED", AdoptionScheme::TechnicalPotential, &markets());
        assert_relative_eq!(s.baseline_energy, 30.0);
        assert_relative_eq!(s.efficient_energy, 22.5);
        assert_relative_eq!(s.energy_savings_pct, 25.0);
        assert_relative_eq!(s.efficient_carbon, 3.0);
        assert_relative_eq!(s.stock_cost_delta, 60.0);
        assert_relative_eq!(s.final_measure_share, 0.5);
    }

    #[test]
    fn ensembles_report_their_mean() {
        let mut mk = markets();
        mk.master_mseg.energy.total.efficient =
            YearMap::constant(&YEARS, Value::Ensemble(vec![5.0, 10.0]));
        let s = MarketSummary::from_markets("LED", AdoptionScheme::TechnicalPotential, &mk);
        assert_relative_eq!(s.efficient_energy, 22.5);
    }

    #[test]
    fn empty_markets_report_zero() {
        let scheme = AdoptionScheme::MaxAdoptionPotential;
        let s = MarketSummary::from_markets("x", scheme, &Markets::default());
        assert_eq!(s.energy_savings_pct, 0.0);
        assert_eq!(s.final_measure_share, 0.0);
    }

    #[test]
    fn display_names_the_scheme() {
        let scheme = AdoptionScheme::MaxAdoptionPotential;
        let s = MarketSummary::from_markets("LED", scheme, &markets());
        let text = s.to_string();
        assert!(text.starts_with("--- LED (Max adoption potential) ---"));
        assert!(text.contains("Energy savings:        25.0%"));
    }
}
