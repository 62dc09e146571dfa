//! TOML-based run configuration and preset definitions.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::measure::EngineSettings;
use crate::mseg::value::Year;

/// Top-level run configuration parsed from TOML.
///
/// All fields have defaults matching the `aeo` preset. Load from TOML with
/// [`RunConfig::from_toml_file`] or start from [`RunConfig::from_preset`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Modeling years.
    pub horizon: HorizonConfig,
    /// Stock turnover parameters.
    pub adoption: AdoptionConfig,
    /// Ensemble size and seed for distribution-valued inputs.
    pub sampling: SamplingConfig,
    /// Input file locations.
    pub inputs: InputsConfig,
    /// Output file locations.
    pub output: OutputConfig,
}

/// Modeling years, inclusive on both ends.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HorizonConfig {
    pub first_year: Year,
    pub last_year: Year,
}

impl Default for HorizonConfig {
    fn default() -> Self {
        Self {
            first_year: 2009,
            last_year: 2040,
        }
    }
}

/// Stock turnover parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdoptionConfig {
    /// Annual fraction of existing stock retrofitted (0.0-1.0).
    pub retro_rate: f64,
}

impl Default for AdoptionConfig {
    fn default() -> Self {
        Self { retro_rate: 0.01 }
    }
}

/// Sampling of distribution-valued measure inputs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SamplingConfig {
    /// Samples per distribution (must be > 0).
    pub nsamples: usize,
    /// Master random seed.
    pub seed: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            nsamples: 50,
            seed: 42,
        }
    }
}

/// Input JSON files.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputsConfig {
    /// Baseline stock, energy and construction data.
    pub baseline: PathBuf,
    /// Baseline cost, performance and lifetime data.
    pub cpl: PathBuf,
    /// Site-source factors, carbon, prices and cost conversion data.
    pub reference: PathBuf,
    /// Measure definitions.
    pub measures: PathBuf,
    /// Package definitions.
    pub packages: Option<PathBuf>,
    /// Pre-parsed EnergyPlus results with CBECS floor area by vintage.
    pub eplus: Option<PathBuf>,
}

impl Default for InputsConfig {
    fn default() -> Self {
        Self {
            baseline: PathBuf::from("inputs/microsegments.json"),
            cpl: PathBuf::from("inputs/cpl_data.json"),
            reference: PathBuf::from("inputs/reference.json"),
            measures: PathBuf::from("inputs/measures.json"),
            packages: None,
            eplus: None,
        }
    }
}

/// Output files.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Filled markets by measure and adoption scheme.
    pub markets_json: PathBuf,
    /// Optional flat CSV of master microsegments.
    pub summary_csv: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            markets_json: PathBuf::from("results/markets.json"),
            summary_csv: None,
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"horizon.first_year"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

impl RunConfig {
    /// Returns the full AEO horizon preset.
    pub fn aeo() -> Self {
        Self::default()
    }

    /// Returns a six-year horizon for quick runs.
    pub fn short_horizon() -> Self {
        Self {
            horizon: HorizonConfig {
                first_year: 2015,
                last_year: 2020,
            },
            ..Self::default()
        }
    }

    /// Returns the AEO horizon with no retrofits of existing stock.
    pub fn no_retrofit() -> Self {
        Self {
            adoption: AdoptionConfig { retro_rate: 0.0 },
            ..Self::default()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["aeo", "short_horizon", "no_retrofit"];

    /// Loads a configuration from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "aeo" => Ok(Self::aeo()),
            "short_horizon" => Ok(Self::short_horizon()),
            "no_retrofit" => Ok(Self::no_retrofit()),
            _ => Err(ConfigError {
                field: "preset".to_string(),
                message: format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            }),
        }
    }

    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "config".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        let h = &self.horizon;
        if h.last_year < h.first_year {
            errors.push(ConfigError {
                field: "horizon.last_year".into(),
                message: "must be >= horizon.first_year".into(),
            });
        }

        if !(0.0..=1.0).contains(&self.adoption.retro_rate) {
            errors.push(ConfigError {
                field: "adoption.retro_rate".into(),
                message: "must be in [0.0, 1.0]".into(),
            });
        }

        if self.sampling.nsamples == 0 {
            errors.push(ConfigError {
                field: "sampling.nsamples".into(),
                message: "must be > 0".into(),
            });
        }

        let i = &self.inputs;
        let required = [
            ("inputs.baseline", Some(&i.baseline)),
            ("inputs.cpl", Some(&i.cpl)),
            ("inputs.reference", Some(&i.reference)),
            ("inputs.measures", Some(&i.measures)),
            ("inputs.packages", i.packages.as_ref()),
            ("inputs.eplus", i.eplus.as_ref()),
            ("output.markets_json", Some(&self.output.markets_json)),
            ("output.summary_csv", self.output.summary_csv.as_ref()),
        ];
        for (field, path) in required {
            if path.is_some_and(|p| p.as_os_str().is_empty()) {
                errors.push(ConfigError {
                    field: field.into(),
                    message: "must not be empty".into(),
                });
            }
        }

        errors
    }

    /// Engine settings for a validated configuration.
    ///
    /// # Panics
    ///
    /// Panics if the horizon is reversed or `nsamples` is zero; call
    /// [`RunConfig::validate`] first.
    pub fn settings(&self) -> EngineSettings {
        EngineSettings::new(
            self.horizon.first_year,
            self.horizon.last_year,
            self.adoption.retro_rate,
            self.sampling.nsamples,
            self.sampling.seed,
        )
    }
}
