//! Relative performance of a measure against its baseline technology.
//!
//! Relative performance is the factor applied to baseline energy use for
//! stock that adopts the measure: 0.7 means the measure uses 70% of the
//! baseline's energy.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{MsegError, Result};
use crate::mseg::value::{Value, Year, YearMap};

pub const RELATIVE_SAVINGS_CONSTANT: &str = "relative savings (constant)";
pub const RELATIVE_SAVINGS_DYNAMIC: &str = "relative savings (dynamic)";

/// Whether larger values of a performance unit mean better efficiency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    HigherIsBetter,
    LowerIsBetter,
}

/// Looks up the direction of an absolute performance unit.
pub fn direction(units: &str) -> Option<Direction> {
    match units {
        "COP" | "EER" | "SEER" | "IEER" | "HSPF" | "AFUE" | "EF" | "UEF" | "CEF" | "lm/W"
        | "R Value" | "BTU out/BTU in" => Some(Direction::HigherIsBetter),
        "ACH50" | "CFM/ft^2 floor" | "kWh/yr" | "kWh/day" | "SHGC" | "HP/CFM" | "U Value"
        | "W/ft^2 floor" => Some(Direction::LowerIsBetter),
        _ => None,
    }
}

/// Measure performance units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PerfUnits {
    /// An absolute unit or `"relative savings (constant)"`.
    Fixed(String),
    /// `["relative savings (dynamic)", anchor year]`: savings specified
    /// against the baseline of the anchor year.
    Dynamic(String, Year),
}

impl PerfUnits {
    pub fn is_relative(&self) -> bool {
        match self {
            PerfUnits::Fixed(u) => u == RELATIVE_SAVINGS_CONSTANT,
            PerfUnits::Dynamic(u, _) => u == RELATIVE_SAVINGS_DYNAMIC,
        }
    }

    pub fn relative_constant() -> Self {
        PerfUnits::Fixed(RELATIVE_SAVINGS_CONSTANT.to_string())
    }
}

/// Element-wise `num / den`, with a zero denominator yielding `fallback`.
fn ratio(num: &Value, den: &Value, fallback: f64, zero_seen: &mut bool) -> Value {
    num.zip_with(den, |a, b| {
        if b == 0.0 {
            *zero_seen = true;
            fallback
        } else {
            a / b
        }
    })
}

/// Computes relative performance for each year in `years`.
///
/// # Arguments
///
/// * `perf` - Measure performance (absolute value or relative savings)
/// * `units` - Measure performance units
/// * `base_perf` - Baseline performance per year
/// * `base_units` - Baseline performance units
/// * `years` - Modeling years
/// * `measure` - Measure name, for messages
///
/// # Errors
///
/// * [`MsegError::UnitMismatch`] if absolute measure units differ from the
///   baseline units.
/// * [`MsegError::InvalidMeasure`] if the unit has no known direction.
/// * [`MsegError::LookupMissing`] if baseline performance lacks a needed year.
pub fn relative_performance(
    perf: &Value,
    units: &PerfUnits,
    base_perf: &YearMap,
    base_units: &str,
    years: &[Year],
    measure: &str,
) -> Result<YearMap> {
    let base_at = |y: Year| {
        base_perf
            .get(y)
            .cloned()
            .ok_or_else(|| MsegError::missing("baseline performance", y))
    };
    let mut zero_seen = false;
    let out = match units {
        PerfUnits::Fixed(u) if u == RELATIVE_SAVINGS_CONSTANT => {
            YearMap::constant(years, perf.map(|s| 1.0 - s))
        }
        PerfUnits::Dynamic(u, anchor) if u == RELATIVE_SAVINGS_DYNAMIC => {
            let base_anchor = base_at(*anchor)?;
            let inverted = direction(base_units) == Some(Direction::LowerIsBetter);
            let mut out = YearMap::new();
            for &y in years {
                let base_y = base_at(y)?;
                // savings re-baselined from the anchor year
                let adjusted = Value::zip3(perf, &base_y, &base_anchor, |orig, by, ba| {
                    let s = if inverted {
                        if by == 0.0 {
                            zero_seen = true;
                            orig
                        } else {
                            1.0 - (ba * (1.0 - orig)) / by
                        }
                    } else if ba == 0.0 || orig == 1.0 {
                        zero_seen = true;
                        orig
                    } else {
                        1.0 - by / (ba / (1.0 - orig))
                    };
                    if s > 1.0 {
                        1.0
                    } else if s < 0.0 && orig > 0.0 {
                        0.0
                    } else {
                        s
                    }
                });
                out.insert(y, adjusted.map(|s| 1.0 - s));
            }
            out
        }
        PerfUnits::Dynamic(u, _) => {
            return Err(MsegError::invalid_measure(
                measure,
                format!("unsupported dynamic performance units '{u}'"),
            ));
        }
        PerfUnits::Fixed(u) => {
            if u != base_units {
                return Err(MsegError::UnitMismatch {
                    measure: measure.to_string(),
                    found: u.clone(),
                    expected: base_units.to_string(),
                });
            }
            let dir = direction(u).ok_or_else(|| {
                MsegError::invalid_measure(measure, format!("unknown performance units '{u}'"))
            })?;
            let mut out = YearMap::new();
            for &y in years {
                let b = base_at(y)?;
                let rel = match dir {
                    Direction::HigherIsBetter => ratio(&b, perf, 1.0, &mut zero_seen),
                    Direction::LowerIsBetter => ratio(perf, &b, 1.0, &mut zero_seen),
                };
                out.insert(y, rel);
            }
            out
        }
    };
    if zero_seen {
        warn!(
            measure,
            "baseline or measure performance of zero; baseline and measure performance set equal"
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const YEARS: [Year; 2] = [2009, 2010];

    fn base(v: f64) -> YearMap {
        YearMap::constant(&YEARS, Value::Scalar(v))
    }

    fn fixed(units: &str) -> PerfUnits {
        PerfUnits::Fixed(units.into())
    }

    #[test]
    fn higher_is_better_divides_base_by_measure() {
        let meas = Value::Scalar(25.0);
        let rp = relative_performance(&meas, &fixed("EF"), &base(18.0), "EF", &YEARS, "m").unwrap();
        assert_relative_eq!(rp.at(2010).mean(), 0.72);
    }

    #[test]
    fn lower_is_better_divides_measure_by_base() {
        let rp = relative_performance(
            &Value::Scalar(1.0),
            &fixed("ACH50"),
            &base(13.0),
            "ACH50",
            &YEARS,
            "m",
        )
        .unwrap();
        assert_relative_eq!(rp.at(2009).mean(), 1.0 / 13.0);
    }

    #[test]
    fn constant_savings_ignore_baseline_units() {
        let rp = relative_performance(
            &Value::Ensemble(vec![0.2, 0.4]),
            &PerfUnits::relative_constant(),
            &base(3.0),
            "COP",
            &YEARS,
            "m",
        )
        .unwrap();
        assert_eq!(rp.at(2009), Value::Ensemble(vec![0.8, 0.6]));
    }

    #[test]
    fn dynamic_savings_track_baseline_improvement() {
        let mut b = base(10.0);
        b.insert(2010, Value::Scalar(12.0));
        let rp = relative_performance(
            &Value::Scalar(0.5),
            &PerfUnits::Dynamic(RELATIVE_SAVINGS_DYNAMIC.into(), 2009),
            &b,
            "COP",
            &YEARS,
            "m",
        )
        .unwrap();
        assert_relative_eq!(rp.at(2009).mean(), 0.5);
        // measure is fixed at 20: savings against a COP 12 baseline are 0.4
        assert_relative_eq!(rp.at(2010).mean(), 0.6);
    }

    #[test]
    fn zero_measure_performance_sets_equal() {
        let meas = Value::Scalar(0.0);
        let rp =
            relative_performance(&meas, &fixed("COP"), &base(3.0), "COP", &YEARS, "m").unwrap();
        assert_eq!(rp.at(2009), Value::Scalar(1.0));
    }

    #[test]
    fn mismatched_or_unknown_units_fail() {
        let one = Value::Scalar(1.0);
        let r = relative_performance(&one, &fixed("COP"), &base(1.0), "EF", &YEARS, "m");
        assert!(matches!(r, Err(MsegError::UnitMismatch { .. })));
        let r = relative_performance(&one, &fixed("furlongs"), &base(1.0), "furlongs", &YEARS, "m");
        assert!(matches!(r, Err(MsegError::InvalidMeasure { .. })));
    }

    #[test]
    fn units_parse_from_json_forms() {
        let f: PerfUnits = serde_json::from_str(r#""EF""#).unwrap();
        assert_eq!(f, fixed("EF"));
        let d: PerfUnits = serde_json::from_str(r#"["relative savings (dynamic)", 2013]"#).unwrap();
        assert!(d.is_relative());
    }
}
