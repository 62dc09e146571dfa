//! Seeded sampling of distribution-valued measure inputs.
//!
//! Distributions are declared in measure definitions as JSON lists such as
//! `["normal", 10.0, 2.0]` or `["triangular", 5, 7, 12]`.

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::error::{MsegError, Result};
use crate::mseg::value::Value;

/// A supported probability distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<serde_json::Value>", into = "Vec<serde_json::Value>")]
pub enum Distribution {
    Normal { mean: f64, std_dev: f64 },
    /// Parameters of the underlying normal.
    Lognormal { mean: f64, sigma: f64 },
    Uniform { low: f64, high: f64 },
    Gamma { shape: f64, scale: f64 },
    Weibull { shape: f64, scale: f64 },
    Triangular { left: f64, mode: f64, right: f64 },
}

impl TryFrom<Vec<serde_json::Value>> for Distribution {
    type Error = MsegError;

    fn try_from(raw: Vec<serde_json::Value>) -> Result<Self> {
        let name = raw
            .first()
            .and_then(|v| v.as_str())
            .ok_or_else(|| MsegError::Distribution("missing distribution name".into()))?;
        let params: Vec<f64> = raw[1..]
            .iter()
            .map(|v| {
                v.as_f64()
                    .ok_or_else(|| MsegError::Distribution(format!("non-numeric parameter {v}")))
            })
            .collect::<Result<_>>()?;
        let d = match (name, params.as_slice()) {
            ("normal", &[mean, std_dev]) => Distribution::Normal { mean, std_dev },
            ("lognormal", &[mean, sigma]) => Distribution::Lognormal { mean, sigma },
            ("uniform", &[low, high]) => Distribution::Uniform { low, high },
            ("gamma", &[shape, scale]) => Distribution::Gamma { shape, scale },
            ("weibull", &[shape, scale]) => Distribution::Weibull { shape, scale },
            ("triangular", &[left, mode, right]) => Distribution::Triangular { left, mode, right },
            _ => {
                return Err(MsegError::Distribution(format!(
                    "'{name}' with {} parameters",
                    params.len()
                )));
            }
        };
        d.validate()?;
        Ok(d)
    }
}

impl From<Distribution> for Vec<serde_json::Value> {
    fn from(d: Distribution) -> Self {
        let (name, params) = match d {
            Distribution::Normal { mean, std_dev } => ("normal", vec![mean, std_dev]),
            Distribution::Lognormal { mean, sigma } => ("lognormal", vec![mean, sigma]),
            Distribution::Uniform { low, high } => ("uniform", vec![low, high]),
            Distribution::Gamma { shape, scale } => ("gamma", vec![shape, scale]),
            Distribution::Weibull { shape, scale } => ("weibull", vec![shape, scale]),
            Distribution::Triangular { left, mode, right } => {
                ("triangular", vec![left, mode, right])
            }
        };
        std::iter::once(serde_json::Value::from(name))
            .chain(params.into_iter().map(serde_json::Value::from))
            .collect()
    }
}

fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Marsaglia-Tsang gamma draw with unit scale.
fn standard_gamma(rng: &mut StdRng, shape: f64) -> f64 {
    if shape < 1.0 {
        let u: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
        return standard_gamma(rng, shape + 1.0) * u.powf(1.0 / shape);
    }
    let d = shape - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();
    loop {
        let x = standard_normal(rng);
        let v = (1.0 + c * x).powi(3);
        if v <= 0.0 {
            continue;
        }
        let u: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
        if u.ln() < 0.5 * x * x + d - d * v + d * v.ln() {
            return d * v;
        }
    }
}

impl Distribution {
    fn validate(&self) -> Result<()> {
        let ok = match *self {
            Distribution::Normal { std_dev, .. } => std_dev >= 0.0,
            Distribution::Lognormal { sigma, .. } => sigma >= 0.0,
            Distribution::Uniform { low, high } => high >= low,
            Distribution::Gamma { shape, scale } | Distribution::Weibull { shape, scale } => {
                shape > 0.0 && scale > 0.0
            }
            Distribution::Triangular { left, mode, right } => {
                left <= mode && mode <= right && left < right
            }
        };
        if ok {
            Ok(())
        } else {
            Err(MsegError::Distribution(format!("invalid parameters in {self:?}")))
        }
    }

    /// Draws one sample.
    pub fn draw(&self, rng: &mut StdRng) -> f64 {
        match *self {
            Distribution::Normal { mean, std_dev } => mean + std_dev * standard_normal(rng),
            Distribution::Lognormal { mean, sigma } => (mean + sigma * standard_normal(rng)).exp(),
            Distribution::Uniform { low, high } => low + (high - low) * rng.random::<f64>(),
            Distribution::Gamma { shape, scale } => scale * standard_gamma(rng, shape),
            Distribution::Weibull { shape, scale } => {
                let u: f64 = rng.random();
                scale * (-(1.0 - u).ln()).powf(1.0 / shape)
            }
            Distribution::Triangular { left, mode, right } => {
                let u: f64 = rng.random();
                let cut = (mode - left) / (right - left);
                if u < cut {
                    left + (u * (right - left) * (mode - left)).sqrt()
                } else {
                    right - ((1.0 - u) * (right - left) * (right - mode)).sqrt()
                }
            }
        }
    }

    /// Draws `n` samples.
    pub fn sample(&self, rng: &mut StdRng, n: usize) -> Vec<f64> {
        (0..n).map(|_| self.draw(rng)).collect()
    }
}

/// A measure input given as a point value or a distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Param {
    Point(f64),
    Distribution(Distribution),
}

impl Param {
    pub fn is_distribution(&self) -> bool {
        matches!(self, Param::Distribution(_))
    }

    /// Materializes the input: a scalar for a point value, an ensemble of
    /// `n` samples for a distribution.
    pub fn realize(&self, rng: &mut StdRng, n: usize) -> Value {
        match self {
            Param::Point(x) => Value::Scalar(*x),
            Param::Distribution(d) => Value::Ensemble(d.sample(rng, n)),
        }
    }
}

/// Stable per-measure seed derived from the run seed and the measure name.
pub fn measure_seed(base: u64, name: &str) -> u64 {
    // FNV-1a over the name, mixed with the run seed
    let mut h: u64 = 0xcbf2_9ce4_8422_2325 ^ base;
    for b in name.bytes() {
        h ^= u64::from(b);
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    h
}

/// Generator used for one key of one measure.
pub fn key_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}
