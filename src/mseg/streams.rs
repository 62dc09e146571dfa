//! Typed result tree for one microsegment (or a sum of microsegments).
//!
//! Every stream is split into `total`/`competed`; energy, carbon and cost
//! streams are further split into `baseline`/`efficient`, stock into
//! `all`/`measure`.

use serde::{Deserialize, Serialize};

use super::value::{Value, Year, YearMap};
use crate::error::Result;

/// Leaf-wise operations shared by every node of the result tree.
trait Node: Sized {
    fn try_add(&self, other: &Self) -> Result<Self>;
    fn map(&self, f: &dyn Fn(&YearMap) -> YearMap) -> Self;
}

impl Node for YearMap {
    fn try_add(&self, other: &Self) -> Result<Self> {
        YearMap::try_add(self, other)
    }

    fn map(&self, f: &dyn Fn(&YearMap) -> YearMap) -> Self {
        f(self)
    }
}

/// Baseline versus efficient (measure-adopting) outcome.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BaseEff {
    pub baseline: YearMap,
    pub efficient: YearMap,
}

impl Node for BaseEff {
    fn try_add(&self, other: &Self) -> Result<Self> {
        Ok(Self {
            baseline: self.baseline.try_add(&other.baseline)?,
            efficient: self.efficient.try_add(&other.efficient)?,
        })
    }

    fn map(&self, f: &dyn Fn(&YearMap) -> YearMap) -> Self {
        Self {
            baseline: f(&self.baseline),
            efficient: f(&self.efficient),
        }
    }
}

/// All stock versus stock that has adopted the measure.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AllMeasure {
    pub all: YearMap,
    pub measure: YearMap,
}

impl Node for AllMeasure {
    fn try_add(&self, other: &Self) -> Result<Self> {
        Ok(Self {
            all: self.all.try_add(&other.all)?,
            measure: self.measure.try_add(&other.measure)?,
        })
    }

    fn map(&self, f: &dyn Fn(&YearMap) -> YearMap) -> Self {
        Self {
            all: f(&self.all),
            measure: f(&self.measure),
        }
    }
}

/// Whole market versus the part up for replacement in each year.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TotalCompeted<T> {
    pub total: T,
    pub competed: T,
}

impl<T: Node> Node for TotalCompeted<T> {
    fn try_add(&self, other: &Self) -> Result<Self> {
        Ok(Self {
            total: self.total.try_add(&other.total)?,
            competed: self.competed.try_add(&other.competed)?,
        })
    }

    fn map(&self, f: &dyn Fn(&YearMap) -> YearMap) -> Self {
        Self {
            total: self.total.map(f),
            competed: self.competed.map(f),
        }
    }
}

/// A baseline/efficient stream with total and competed parts.
pub type Stream = TotalCompeted<BaseEff>;

/// Stock, energy and carbon costs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CostStreams {
    pub stock: Stream,
    pub energy: Stream,
    pub carbon: Stream,
}

impl Node for CostStreams {
    fn try_add(&self, other: &Self) -> Result<Self> {
        Ok(Self {
            stock: self.stock.try_add(&other.stock)?,
            energy: self.energy.try_add(&other.energy)?,
            carbon: self.carbon.try_add(&other.carbon)?,
        })
    }

    fn map(&self, f: &dyn Fn(&YearMap) -> YearMap) -> Self {
        Self {
            stock: self.stock.map(f),
            energy: self.energy.map(f),
            carbon: self.carbon.map(f),
        }
    }
}

/// Baseline lifetime per year and the measure lifetime.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Lifetime {
    pub baseline: YearMap,
    pub measure: Value,
}

/// Complete result tree for a microsegment or an aggregate of them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Microsegment {
    pub stock: TotalCompeted<AllMeasure>,
    pub energy: Stream,
    pub carbon: Stream,
    pub cost: CostStreams,
    pub lifetime: Lifetime,
}

impl Microsegment {
    /// A tree of scalar zeros over `years`.
    pub fn zeros(years: &[Year]) -> Self {
        let z = YearMap::constant(years, Value::Scalar(0.0));
        let be = BaseEff {
            baseline: z.clone(),
            efficient: z.clone(),
        };
        let stream = TotalCompeted {
            total: be.clone(),
            competed: be,
        };
        let am = AllMeasure {
            all: z.clone(),
            measure: z.clone(),
        };
        Self {
            stock: TotalCompeted {
                total: am.clone(),
                competed: am,
            },
            energy: stream.clone(),
            carbon: stream.clone(),
            cost: CostStreams {
                stock: stream.clone(),
                energy: stream.clone(),
                carbon: stream,
            },
            lifetime: Lifetime {
                baseline: z,
                measure: Value::Scalar(0.0),
            },
        }
    }

    /// Strict deep addition of two result trees.
    ///
    /// # Errors
    ///
    /// Returns [`MsegError::ShapeMismatch`](crate::error::MsegError) if year
    /// sets differ anywhere or any pair of leaves mixes scalar and ensemble
    /// shapes.
    pub fn try_add(&self, other: &Microsegment) -> Result<Microsegment> {
        let mut sum = self.try_add_restricted(other)?;
        sum.lifetime = Lifetime {
            baseline: self.lifetime.baseline.try_add(&other.lifetime.baseline)?,
            measure: self.lifetime.measure.try_add(&other.lifetime.measure)?,
        };
        Ok(sum)
    }

    /// Like [`Microsegment::try_add`] but keeps `self`'s lifetime subtree.
    ///
    /// Used when merging components (window conduction and solar gain) that
    /// share a single lifetime basis.
    pub fn try_add_restricted(&self, other: &Microsegment) -> Result<Microsegment> {
        Ok(Microsegment {
            stock: self.stock.try_add(&other.stock)?,
            energy: self.energy.try_add(&other.energy)?,
            carbon: self.carbon.try_add(&other.carbon)?,
            cost: self.cost.try_add(&other.cost)?,
            lifetime: self.lifetime.clone(),
        })
    }

    /// Divides every leaf, lifetime included, by a constant.
    pub fn div_float(&self, divisor: f64) -> Microsegment {
        let f = |m: &YearMap| m.div_float(divisor);
        Microsegment {
            stock: self.stock.map(&f),
            energy: self.energy.map(&f),
            carbon: self.carbon.map(&f),
            cost: self.cost.map(&f),
            lifetime: Lifetime {
                baseline: self.lifetime.baseline.div_float(divisor),
                measure: if divisor == 0.0 {
                    self.lifetime.measure.map(|_| 0.0)
                } else {
                    &self.lifetime.measure / divisor
                },
            },
        }
    }

    /// Divides only the stock and stock-cost streams by a constant.
    pub fn div_stock(&self, divisor: f64) -> Microsegment {
        let f = |m: &YearMap| m.div_float(divisor);
        let mut out = self.clone();
        out.stock = self.stock.map(&f);
        out.cost.stock = self.cost.stock.map(&f);
        out
    }

    /// Divides the lifetime subtree by a constant, leaving all streams alone.
    pub fn div_lifetime(&self, divisor: f64) -> Microsegment {
        let mut out = self.clone();
        out.lifetime.baseline = self.lifetime.baseline.div_float(divisor);
        out.lifetime.measure = if divisor == 0.0 {
            self.lifetime.measure.map(|_| 0.0)
        } else {
            &self.lifetime.measure / divisor
        };
        out
    }

    /// Promotes every leaf to an ensemble of `n` samples.
    pub fn promote(&self, n: usize) -> Microsegment {
        let f = |m: &YearMap| m.promote(n);
        Microsegment {
            stock: self.stock.map(&f),
            energy: self.energy.map(&f),
            carbon: self.carbon.map(&f),
            cost: self.cost.map(&f),
            lifetime: Lifetime {
                baseline: self.lifetime.baseline.promote(n),
                measure: self.lifetime.measure.promote(n),
            },
        }
    }

    /// The baseline/efficient streams by name, for reporting and checks.
    pub fn streams(&self) -> [(&'static str, &Stream); 5] {
        [
            ("energy", &self.energy),
            ("carbon", &self.carbon),
            ("stock cost", &self.cost.stock),
            ("energy cost", &self.cost.energy),
            ("carbon cost", &self.cost.carbon),
        ]
    }

    /// Years covered by the tree.
    pub fn years(&self) -> Vec<Year> {
        self.stock.total.all.years().collect()
    }
}
