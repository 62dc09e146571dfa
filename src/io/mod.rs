//! Reading inputs and writing results.
//!
//! Every input is a JSON document; see [`load_json`]. Results go out as a
//! JSON document keyed by measure name ([`write_markets`]) and optionally as
//! a flat CSV ([`export`]).

pub mod export;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::measure::{Markets, Measure, SubmarketWarning};
use crate::partition::AdoptionScheme;

/// Reads and deserializes one JSON input file.
///
/// # Errors
///
/// Returns [`MsegError::Io`](crate::error::MsegError::Io) if the file cannot
/// be opened and [`MsegError::Json`](crate::error::MsegError::Json) if its
/// content does not match `T`.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Output record of one measure.
#[derive(Debug, Serialize)]
pub struct MeasureOutput<'a> {
    pub removed: bool,
    pub warnings: &'a [SubmarketWarning],
    pub markets: &'a BTreeMap<AdoptionScheme, Markets>,
}

impl<'a> From<&'a Measure> for MeasureOutput<'a> {
    fn from(m: &'a Measure) -> Self {
        Self {
            removed: m.removed,
            warnings: &m.warnings,
            markets: &m.markets,
        }
    }
}

/// Writes the filled markets of `measures` as one JSON object keyed by
/// measure name.
///
/// # Errors
///
/// Returns [`MsegError::Json`](crate::error::MsegError::Json) if
/// serialization or writing fails.
pub fn write_markets<'a>(
    measures: impl IntoIterator<Item = &'a Measure>,
    writer: impl Write,
) -> Result<()> {
    let out: BTreeMap<&str, MeasureOutput<'_>> = measures
        .into_iter()
        .map(|m| (m.name(), MeasureOutput::from(m)))
        .collect();
    serde_json::to_writer_pretty(writer, &out)?;
    Ok(())
}

/// Writes the filled markets to a file at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn save_markets<'a>(
    measures: impl IntoIterator<Item = &'a Measure>,
    path: &Path,
) -> Result<()> {
    let file = File::create(path)?;
    let mut buf = BufWriter::new(file);
    write_markets(measures, &mut buf)?;
    buf.flush()?;
    Ok(())
}
