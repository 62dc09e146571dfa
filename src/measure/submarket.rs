//! Evidence checks for market-scaling fractions.
//!
//! A measure that applies to only part of a baseline market must document
//! where its scaling fraction comes from. Weak documentation produces
//! warnings; missing derivation details deactivate the measure.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

/// Host fragments accepted as authoritative sources.
pub const ACCEPTED_DOMAINS: [&str; 13] = [
    ".eia.gov",
    ".doe.gov",
    ".energy.gov",
    ".data.gov",
    ".energystar.gov",
    ".epa.gov",
    ".census.gov",
    ".pnnl.gov",
    ".lbl.gov",
    ".nrel.gov",
    "www.sciencedirect.com",
    "www.costar.com",
    "www.navigantresearch.com",
];

/// Documentation attached to a market-scaling fraction.
///
/// Fields are kept as raw JSON so that wrongly typed entries are reported as
/// warnings rather than rejected while parsing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmarketSource {
    #[serde(default)]
    pub title: Option<serde_json::Value>,
    #[serde(default)]
    pub author: Option<serde_json::Value>,
    #[serde(default)]
    pub organization: Option<serde_json::Value>,
    #[serde(default)]
    pub year: Option<serde_json::Value>,
    #[serde(rename = "URL", default)]
    pub url: Option<serde_json::Value>,
    #[serde(default)]
    pub fraction_derivation: Option<serde_json::Value>,
}

/// One category of insufficient sub-market evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmarketWarning {
    /// Title, author, organization or year is missing or too short.
    IncompleteSource,
    /// The URL is malformed or not from an accepted domain.
    UnrecognizedUrl,
    /// No textual derivation of the fraction.
    MissingDerivation,
}

impl fmt::Display for SubmarketWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            SubmarketWarning::IncompleteSource => {
                "sub-market scaling source lacks a title, author, organization or year"
            }
            SubmarketWarning::UnrecognizedUrl => {
                "sub-market scaling URL is invalid or not from an accepted source"
            }
            SubmarketWarning::MissingDerivation => {
                "sub-market scaling fraction has no derivation"
            }
        };
        f.write_str(msg)
    }
}

fn is_text(v: Option<&serde_json::Value>, min_len: usize) -> bool {
    v.and_then(serde_json::Value::as_str)
        .is_some_and(|s| s.chars().count() >= min_len)
}

fn url_is_accepted(v: Option<&serde_json::Value>) -> bool {
    let Some(raw) = v.and_then(serde_json::Value::as_str) else {
        return false;
    };
    let Ok(parsed) = Url::parse(raw) else {
        return false;
    };
    match parsed.host_str() {
        Some(host) if !parsed.scheme().is_empty() => {
            ACCEPTED_DOMAINS.iter().any(|d| host.contains(d))
        }
        _ => false,
    }
}

/// Outcome of checking one source entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evidence {
    pub source_ok: bool,
    pub url_ok: bool,
    pub derivation_ok: bool,
}

impl Evidence {
    /// Checks every category of one source entry.
    pub fn check(source: &SubmarketSource) -> Self {
        let source_ok = [&source.title, &source.author, &source.organization, &source.year]
            .into_iter()
            .all(|f| is_text(f.as_ref(), 2));
        Self {
            source_ok,
            url_ok: url_is_accepted(source.url.as_ref()),
            derivation_ok: is_text(source.fraction_derivation.as_ref(), 0),
        }
    }

    pub fn warnings(&self) -> Vec<SubmarketWarning> {
        let mut out = Vec::new();
        if !self.source_ok {
            out.push(SubmarketWarning::IncompleteSource);
        }
        if !self.url_ok {
            out.push(SubmarketWarning::UnrecognizedUrl);
        }
        if !self.derivation_ok {
            out.push(SubmarketWarning::MissingDerivation);
        }
        out
    }

    /// Whether the measure must be deactivated.
    pub fn requires_removal(&self) -> bool {
        !self.derivation_ok || (!self.source_ok && !self.url_ok)
    }
}
