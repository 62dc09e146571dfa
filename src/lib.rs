//! Market microsegments of building energy efficiency measures.
//!
//! A measure declares where it applies; [`measure::Measure::fill_mkts`]
//! expands that into microsegment keys, looks each one up in the baseline
//! data and records the stock, energy, carbon and cost the measure competes
//! for, together with what it would save. Packages merge several filled
//! measures into one.

pub mod baseline;
pub mod config;
pub mod convert;
pub mod eplus;
pub mod error;
pub mod io;
pub mod measure;
pub mod mseg;
pub mod package;
pub mod partition;
pub mod perf;
pub mod runner;
pub mod sample;
pub mod summary;
