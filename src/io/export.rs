//! CSV export of master microsegments.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::measure::Measure;
use crate::mseg::value::{Year, YearMap};

/// Column header, one row per measure, adoption scheme and year.
const HEADER: &str = "measure,scheme,year,stock_total,stock_measure,\
                      energy_baseline,energy_efficient,carbon_baseline,carbon_efficient,\
                      stock_cost_baseline,stock_cost_efficient,energy_cost_baseline,\
                      energy_cost_efficient,carbon_cost_baseline,carbon_cost_efficient";

/// Exports master microsegments to a CSV file at the given path.
///
/// Removed measures are skipped. Ensemble values are written as their mean.
///
/// # Arguments
///
/// * `measures` - Filled measures
/// * `path` - Output file path
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(measures: &[Measure], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(measures, buf)
}

/// Writes master microsegments as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(measures: &[Measure], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(HEADER.split(',').map(str::trim))?;

    let mean = |m: &YearMap, y: Year| format!("{:.6}", m.at(y).mean());
    for measure in measures.iter().filter(|m| !m.removed) {
        for (scheme, markets) in &measure.markets {
            let ms = &markets.master_mseg;
            for year in ms.years() {
                wtr.write_record(&[
                    measure.name().to_string(),
                    scheme.to_string(),
                    year.to_string(),
                    mean(&ms.stock.total.all, year),
                    mean(&ms.stock.total.measure, year),
                    mean(&ms.energy.total.baseline, year),
                    mean(&ms.energy.total.efficient, year),
                    mean(&ms.carbon.total.baseline, year),
                    mean(&ms.carbon.total.efficient, year),
                    mean(&ms.cost.stock.total.baseline, year),
                    mean(&ms.cost.stock.total.efficient, year),
                    mean(&ms.cost.energy.total.baseline, year),
                    mean(&ms.cost.energy.total.efficient, year),
                    mean(&ms.cost.carbon.total.baseline, year),
                    mean(&ms.cost.carbon.total.efficient, year),
                ])?;
            }
        }
    }

    wtr.flush()?;
    Ok(())
}
