//! Scalar-or-ensemble leaf values and per-year mappings.
//!
//! A leaf is either a point estimate or a fixed-length Monte Carlo ensemble.
//! Element-wise arithmetic broadcasts scalars against ensembles so the
//! partitioner can mix point baseline data with sampled measure inputs. The
//! strict [`Value::try_add`] used when merging finished results refuses to mix
//! the two shapes.

use std::collections::BTreeMap;
use std::ops::{Add, Div, Mul, Sub};

use serde::{Deserialize, Serialize};

use crate::error::{MsegError, Result};

/// Calendar year of the modeling horizon.
pub type Year = u16;

/// Point-valued per-year reference series (baseline data, prices, factors).
pub type YearSeries = BTreeMap<Year, f64>;

/// Deserializer for year-keyed maps.
///
/// JSON object keys are strings; buffered (untagged) deserialization does
/// not coerce them to integers, so keys are parsed here.
pub mod year_keys {
    use std::collections::BTreeMap;

    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    use super::Year;

    pub fn deserialize<'de, D, V>(d: D) -> Result<BTreeMap<Year, V>, D::Error>
    where
        D: Deserializer<'de>,
        V: Deserialize<'de>,
    {
        BTreeMap::<String, V>::deserialize(d)?
            .into_iter()
            .map(|(k, v)| {
                k.trim()
                    .parse::<Year>()
                    .map(|y| (y, v))
                    .map_err(|_| D::Error::custom(format!("invalid year key '{k}'")))
            })
            .collect()
    }
}

/// A single numeric leaf: a point value or an ensemble of samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Scalar(f64),
    Ensemble(Vec<f64>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Scalar(0.0)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Scalar(x)
    }
}

impl From<Vec<f64>> for Value {
    fn from(xs: Vec<f64>) -> Self {
        Value::Ensemble(xs)
    }
}

impl Value {
    /// Returns the ensemble length, or `None` for a scalar.
    pub fn ensemble_len(&self) -> Option<usize> {
        match self {
            Value::Scalar(_) => None,
            Value::Ensemble(xs) => Some(xs.len()),
        }
    }

    /// Arithmetic mean of the samples (the value itself for a scalar).
    pub fn mean(&self) -> f64 {
        match self {
            Value::Scalar(x) => *x,
            Value::Ensemble(xs) if xs.is_empty() => 0.0,
            Value::Ensemble(xs) => xs.iter().sum::<f64>() / xs.len() as f64,
        }
    }

    /// Applies `f` to every element.
    pub fn map(&self, mut f: impl FnMut(f64) -> f64) -> Value {
        match self {
            Value::Scalar(x) => Value::Scalar(f(*x)),
            Value::Ensemble(xs) => Value::Ensemble(xs.iter().map(|&x| f(x)).collect()),
        }
    }

    /// Combines two values element-wise, broadcasting a scalar operand.
    ///
    /// Ensembles combined here always come from the same measure and so share
    /// one sample count.
    pub fn zip_with(&self, other: &Value, mut f: impl FnMut(f64, f64) -> f64) -> Value {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => Value::Scalar(f(*a, *b)),
            (Value::Scalar(a), Value::Ensemble(bs)) => {
                Value::Ensemble(bs.iter().map(|&b| f(*a, b)).collect())
            }
            (Value::Ensemble(as_), Value::Scalar(b)) => {
                Value::Ensemble(as_.iter().map(|&a| f(a, *b)).collect())
            }
            (Value::Ensemble(as_), Value::Ensemble(bs)) => {
                debug_assert_eq!(as_.len(), bs.len(), "ensemble lengths differ");
                Value::Ensemble(as_.iter().zip(bs).map(|(&a, &b)| f(a, b)).collect())
            }
        }
    }

    /// Three-way element-wise combination with broadcasting.
    pub fn zip3(
        a: &Value,
        b: &Value,
        c: &Value,
        mut f: impl FnMut(f64, f64, f64) -> f64,
    ) -> Value {
        let n = [a, b, c].iter().filter_map(|v| v.ensemble_len()).max();
        match n {
            None => Value::Scalar(f(a.at(0), b.at(0), c.at(0))),
            Some(n) => Value::Ensemble((0..n).map(|i| f(a.at(i), b.at(i), c.at(i))).collect()),
        }
    }

    /// Element-wise combination of any number of operands.
    pub fn zip_all(vals: &[&Value], mut f: impl FnMut(&[f64]) -> f64) -> Value {
        let n = vals.iter().filter_map(|v| v.ensemble_len()).max();
        let mut buf = vec![0.0; vals.len()];
        let mut at = |i: usize| {
            for (slot, v) in buf.iter_mut().zip(vals) {
                *slot = v.at(i);
            }
            f(&buf)
        };
        match n {
            None => Value::Scalar(at(0)),
            Some(n) => Value::Ensemble((0..n).map(&mut at).collect()),
        }
    }

    /// Element `i`, with scalars repeating for every index.
    fn at(&self, i: usize) -> f64 {
        match self {
            Value::Scalar(x) => *x,
            Value::Ensemble(xs) => xs.get(i).copied().unwrap_or(0.0),
        }
    }

    /// Element-wise minimum.
    pub fn min(&self, other: &Value) -> Value {
        self.zip_with(other, f64::min)
    }

    /// Element-wise division where a zero divisor yields zero.
    pub fn div_or_zero(&self, divisor: &Value) -> Value {
        self.zip_with(divisor, |a, b| if b == 0.0 { 0.0 } else { a / b })
    }

    /// Whether any element satisfies `pred`.
    pub fn any(&self, pred: impl Fn(f64) -> bool) -> bool {
        match self {
            Value::Scalar(x) => pred(*x),
            Value::Ensemble(xs) => xs.iter().any(|&x| pred(x)),
        }
    }

    /// Whether every element satisfies `pred`.
    pub fn all(&self, pred: impl Fn(f64) -> bool) -> bool {
        match self {
            Value::Scalar(x) => pred(*x),
            Value::Ensemble(xs) => xs.iter().all(|&x| pred(x)),
        }
    }

    /// Repeats a scalar into an ensemble of `n` samples; ensembles pass through.
    pub fn promote(&self, n: usize) -> Value {
        match self {
            Value::Scalar(x) => Value::Ensemble(vec![*x; n]),
            Value::Ensemble(_) => self.clone(),
        }
    }

    /// Strict addition used when merging finished results.
    ///
    /// # Errors
    ///
    /// Returns [`MsegError::ShapeMismatch`] when one side is a scalar and the
    /// other an ensemble, or the ensembles differ in length.
    pub fn try_add(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::Scalar(a + b)),
            (Value::Ensemble(as_), Value::Ensemble(bs)) if as_.len() == bs.len() => Ok(
                Value::Ensemble(as_.iter().zip(bs).map(|(a, b)| a + b).collect()),
            ),
            (Value::Ensemble(as_), Value::Ensemble(bs)) => Err(MsegError::ShapeMismatch(
                format!("ensembles of length {} and {}", as_.len(), bs.len()),
            )),
            _ => Err(MsegError::ShapeMismatch(
                "scalar and ensemble leaves in the same stream".into(),
            )),
        }
    }
}

macro_rules! value_binop {
    ($trait:ident, $method:ident, $op:tt) => {
        impl $trait<&Value> for &Value {
            type Output = Value;
            fn $method(self, rhs: &Value) -> Value {
                self.zip_with(rhs, |a, b| a $op b)
            }
        }
        impl $trait<Value> for Value {
            type Output = Value;
            fn $method(self, rhs: Value) -> Value {
                self.zip_with(&rhs, |a, b| a $op b)
            }
        }
        impl $trait<&Value> for Value {
            type Output = Value;
            fn $method(self, rhs: &Value) -> Value {
                self.zip_with(rhs, |a, b| a $op b)
            }
        }
        impl $trait<Value> for &Value {
            type Output = Value;
            fn $method(self, rhs: Value) -> Value {
                self.zip_with(&rhs, |a, b| a $op b)
            }
        }
        impl $trait<f64> for &Value {
            type Output = Value;
            fn $method(self, rhs: f64) -> Value {
                self.map(|a| a $op rhs)
            }
        }
        impl $trait<f64> for Value {
            type Output = Value;
            fn $method(self, rhs: f64) -> Value {
                self.map(|a| a $op rhs)
            }
        }
    };
}

value_binop!(Add, add, +);
value_binop!(Sub, sub, -);
value_binop!(Mul, mul, *);
value_binop!(Div, div, /);

/// Ordered `year -> Value` mapping, the leaf container of every result stream.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct YearMap(#[serde(deserialize_with = "year_keys::deserialize")] BTreeMap<Year, Value>);

impl YearMap {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builds a mapping over `years` from a per-year generator.
    pub fn from_fn(years: &[Year], mut f: impl FnMut(Year) -> Value) -> Self {
        Self(years.iter().map(|&y| (y, f(y))).collect())
    }

    /// The same value in every year.
    pub fn constant(years: &[Year], v: Value) -> Self {
        Self::from_fn(years, |_| v.clone())
    }

    /// Lifts a point-valued series, restricted to `years`.
    ///
    /// # Errors
    ///
    /// Returns [`MsegError::ShapeMismatch`] if `series` lacks any of `years`.
    pub fn from_series(series: &YearSeries, years: &[Year]) -> Result<Self> {
        let mut out = BTreeMap::new();
        for &y in years {
            let v = series.get(&y).ok_or_else(|| {
                MsegError::ShapeMismatch(format!("series has no value for year {y}"))
            })?;
            out.insert(y, Value::Scalar(*v));
        }
        Ok(Self(out))
    }

    pub fn get(&self, year: Year) -> Option<&Value> {
        self.0.get(&year)
    }

    /// Value for `year`, or a scalar zero when absent.
    pub fn at(&self, year: Year) -> Value {
        self.0.get(&year).cloned().unwrap_or_default()
    }

    pub fn insert(&mut self, year: Year, v: Value) {
        self.0.insert(year, v);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Year, &Value)> {
        self.0.iter()
    }

    pub fn years(&self) -> impl Iterator<Item = Year> + '_ {
        self.0.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Applies `f` to every `(year, value)` pair.
    pub fn map(&self, f: impl Fn(Year, &Value) -> Value) -> Self {
        Self(self.0.iter().map(|(&y, v)| (y, f(y, v))).collect())
    }

    /// Strict year-by-year addition.
    ///
    /// # Errors
    ///
    /// Returns [`MsegError::ShapeMismatch`] if the year sets differ or any
    /// pair of leaves has incompatible shapes.
    pub fn try_add(&self, other: &YearMap) -> Result<YearMap> {
        if self.0.len() != other.0.len() || self.0.keys().ne(other.0.keys()) {
            return Err(MsegError::ShapeMismatch(format!(
                "year sets differ ({:?} vs {:?})",
                self.0.keys().collect::<Vec<_>>(),
                other.0.keys().collect::<Vec<_>>()
            )));
        }
        let mut out = BTreeMap::new();
        for ((&y, a), b) in self.0.iter().zip(other.0.values()) {
            out.insert(y, a.try_add(b)?);
        }
        Ok(Self(out))
    }

    /// Divides every value by a constant; a zero divisor yields zeros.
    pub fn div_float(&self, divisor: f64) -> YearMap {
        self.map(|_, v| {
            if divisor == 0.0 {
                v.map(|_| 0.0)
            } else {
                v / divisor
            }
        })
    }

    /// Divides by a matching per-year mapping; zero divisors yield zero.
    ///
    /// # Errors
    ///
    /// Returns [`MsegError::ShapeMismatch`] if `divisor` lacks a year present
    /// in `self`.
    pub fn div_keyvals(&self, divisor: &YearMap) -> Result<YearMap> {
        let mut out = BTreeMap::new();
        for (&y, v) in &self.0 {
            let d = divisor.get(y).ok_or_else(|| {
                MsegError::ShapeMismatch(format!("divisor has no value for year {y}"))
            })?;
            out.insert(y, v.div_or_zero(d));
        }
        Ok(Self(out))
    }

    /// Promotes every leaf to an ensemble of `n` samples.
    pub fn promote(&self, n: usize) -> YearMap {
        self.map(|_, v| v.promote(n))
    }

    /// Sum of per-year means, used for horizon totals in reports.
    pub fn total_mean(&self) -> f64 {
        self.0.values().map(Value::mean).sum()
    }
}

impl FromIterator<(Year, Value)> for YearMap {
    fn from_iter<I: IntoIterator<Item = (Year, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YEARS: [Year; 3] = [2009, 2010, 2011];

    #[test]
    fn scalar_broadcasts_over_ensemble() {
        let a = Value::Scalar(2.0);
        let b = Value::Ensemble(vec![1.0, 2.0, 3.0]);
        assert_eq!(&a * &b, Value::Ensemble(vec![2.0, 4.0, 6.0]));
        assert_eq!(&b - 1.0, Value::Ensemble(vec![0.0, 1.0, 2.0]));
    }

    #[test]
    fn strict_add_rejects_mixed_leaves() {
        let a = Value::Scalar(1.0);
        let b = Value::Ensemble(vec![1.0, 2.0]);
        assert!(matches!(a.try_add(&b), Err(MsegError::ShapeMismatch(_))));
        let c = Value::Ensemble(vec![1.0, 2.0, 3.0]);
        assert!(b.try_add(&c).is_err());
        assert_eq!(b.try_add(&b).unwrap(), Value::Ensemble(vec![2.0, 4.0]));
    }

    #[test]
    fn year_map_add_requires_same_years() {
        let a = YearMap::constant(&YEARS, Value::Scalar(1.0));
        let b = YearMap::constant(&YEARS[..2], Value::Scalar(1.0));
        assert!(a.try_add(&b).is_err());
        assert_eq!(a.try_add(&a).unwrap().at(2010), Value::Scalar(2.0));
    }

    #[test]
    fn division_by_zero_yields_zero() {
        let a = YearMap::constant(&YEARS, Value::Scalar(4.0));
        assert_eq!(a.div_float(0.0).at(2009), Value::Scalar(0.0));
        let mut d = YearMap::constant(&YEARS, Value::Scalar(2.0));
        d.insert(2011, Value::Scalar(0.0));
        let q = a.div_keyvals(&d).unwrap();
        assert_eq!(q.at(2009), Value::Scalar(2.0));
        assert_eq!(q.at(2011), Value::Scalar(0.0));
    }

    #[test]
    fn div_keyvals_missing_year_is_shape_mismatch() {
        let a = YearMap::constant(&YEARS, Value::Scalar(4.0));
        let d = YearMap::constant(&YEARS[..1], Value::Scalar(2.0));
        assert!(a.div_keyvals(&d).is_err());
    }

    #[test]
    fn zip3_takes_longest_ensemble() {
        let v = Value::zip3(
            &Value::Scalar(1.0),
            &Value::Ensemble(vec![1.0, 2.0]),
            &Value::Scalar(3.0),
            |a, b, c| a + b + c,
        );
        assert_eq!(v, Value::Ensemble(vec![5.0, 6.0]));
    }

    #[test]
    fn year_keys_round_trip_through_json() {
        let a = YearMap::constant(&YEARS, Value::Scalar(1.5));
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, r#"{"2009":1.5,"2010":1.5,"2011":1.5}"#);
        let back: YearMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }
}
