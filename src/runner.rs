//! End-to-end preparation of every configured measure and package.

use tracing::{error, info, warn};

use crate::baseline::{BaselineMarkets, CplTree, ReferenceData};
use crate::config::InputsConfig;
use crate::eplus::{self, EplusData};
use crate::error::{MsegError, Result};
use crate::io::load_json;
use crate::measure::{EngineSettings, FillInputs, Measure, MeasureDefinition};
use crate::package::{MeasurePackage, PackageDefinition};

/// Everything read from the input files.
#[derive(Debug, Clone, Default)]
pub struct RunInputs {
    pub baseline: BaselineMarkets,
    pub cpl: CplTree,
    pub reference: ReferenceData,
    pub measures: Vec<MeasureDefinition>,
    pub packages: Vec<PackageDefinition>,
    pub eplus: Option<EplusData>,
}

impl RunInputs {
    /// Loads every configured input file.
    ///
    /// # Errors
    ///
    /// Returns the first I/O or JSON error encountered.
    pub fn load(paths: &InputsConfig) -> Result<Self> {
        let inputs = Self {
            baseline: load_json(&paths.baseline)?,
            cpl: load_json(&paths.cpl)?,
            reference: load_json(&paths.reference)?,
            measures: load_json(&paths.measures)?,
            packages: match &paths.packages {
                Some(p) => load_json(p)?,
                None => Vec::new(),
            },
            eplus: match &paths.eplus {
                Some(p) => Some(load_json(p)?),
                None => None,
            },
        };
        info!(
            measures = inputs.measures.len(),
            packages = inputs.packages.len(),
            "inputs loaded"
        );
        Ok(inputs)
    }
}

/// Prepared measures and the ones that failed.
#[derive(Debug, Default)]
pub struct RunOutcome {
    /// Filled measures followed by merged packages, in input order.
    pub measures: Vec<Measure>,
    /// Measures and packages that could not be prepared.
    pub failed: Vec<(String, MsegError)>,
}

fn prepare_one(
    def: &MeasureDefinition,
    inputs: &RunInputs,
    fill: &FillInputs<'_>,
    weights: Option<&eplus::VintageWeights>,
) -> Result<Measure> {
    let mut measure = Measure::new(def.clone());
    if def.energyplus_file.is_some() {
        match (&inputs.eplus, weights) {
            (Some(data), Some(w)) => measure.fill_eplus(data, w)?,
            _ => {
                return Err(MsegError::invalid_measure(
                    &def.name,
                    "EnergyPlus results requested but none configured",
                ));
            }
        }
    }
    measure.fill_mkts(fill)?;
    Ok(measure)
}

fn build_package(def: &PackageDefinition, filled: &[Measure]) -> Result<Measure> {
    let members = def
        .members
        .iter()
        .map(|name| {
            filled
                .iter()
                .find(|m| m.name() == name)
                .ok_or_else(|| MsegError::missing("prepared package member", name))
        })
        .collect::<Result<Vec<_>>>()?;
    MeasurePackage::new(&def.name, members, def.benefits)?.merge_measures()
}

/// Fills every measure, then merges the packages.
///
/// A failing measure or package is logged and recorded in
/// [`RunOutcome::failed`]; the others are still prepared. Packages naming a
/// failed measure fail in turn.
///
/// # Errors
///
/// Returns [`MsegError::InvalidInput`] if EnergyPlus floor area data yield
/// unusable vintage weights.
pub fn prepare_measures(inputs: &RunInputs, settings: &EngineSettings) -> Result<RunOutcome> {
    let weights = inputs
        .eplus
        .as_ref()
        .map(|d| eplus::vintage_weights(&d.cbecs_floor_area))
        .transpose()?;
    let fill = FillInputs {
        baseline: &inputs.baseline,
        cpl: &inputs.cpl,
        reference: &inputs.reference,
        settings,
    };

    let mut outcome = RunOutcome::default();
    for def in &inputs.measures {
        match prepare_one(def, inputs, &fill, weights.as_ref()) {
            Ok(m) => {
                if m.removed {
                    warn!(
                        measure = %m.name(),
                        "measure removed for insufficient sub-market evidence"
                    );
                }
                outcome.measures.push(m);
            }
            Err(e) => {
                error!(measure = %def.name, error = %e, "measure preparation failed");
                outcome.failed.push((def.name.clone(), e));
            }
        }
    }

    let mut packages = Vec::new();
    for def in &inputs.packages {
        match build_package(def, &outcome.measures) {
            Ok(p) => packages.push(p),
            Err(e) => {
                error!(package = %def.name, error = %e, "package preparation failed");
                outcome.failed.push((def.name.clone(), e));
            }
        }
    }
    outcome.measures.extend(packages);

    info!(
        prepared = outcome.measures.len(),
        failed = outcome.failed.len(),
        "run complete"
    );
    Ok(outcome)
}
