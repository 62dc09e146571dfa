//! Microsegment keys and the key-chain generator.
//!
//! A measure declares where it applies (climate zones, building types,
//! fuels, end uses, technologies, structure types). [`Applicability::resolve`]
//! validates those names and expands "all" forms; [`Applicability::keychain`]
//! then emits one [`MicrosegmentKey`] per concrete combination.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::categories::{self, HEAT_COOL_END_USES, Sector};
use crate::error::{MsegError, Result};

/// Whether a key addresses a directly affected or a secondary end use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MsegKind {
    Primary,
    Secondary,
}

/// Heating/cooling key level: equipment or thermal load component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TechType {
    Supply,
    Demand,
}

/// Building vintage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Structure {
    New,
    Existing,
}

macro_rules! str_enum {
    ($ty:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($ty::$variant => $s),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = MsegError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($s => Ok($ty::$variant),)+
                    other => Err(MsegError::InvalidInput(format!(
                        "unknown {} '{}'",
                        stringify!($ty),
                        other
                    ))),
                }
            }
        }
    };
}

str_enum!(MsegKind { Primary => "primary", Secondary => "secondary" });
str_enum!(TechType { Supply => "supply", Demand => "demand" });
str_enum!(Structure { New => "new", Existing => "existing" });

/// Address of one leaf of the baseline reference data.
///
/// Displays as eight `|`-separated components, with `-` for an absent
/// technology type or technology:
/// `primary|AIA_CZ1|single family home|electricity|heating|supply|ASHP|new`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct MicrosegmentKey {
    pub kind: MsegKind,
    pub climate_zone: String,
    pub building_type: String,
    pub fuel: String,
    pub end_use: String,
    pub technology_type: Option<TechType>,
    pub technology: Option<String>,
    pub structure: Structure,
}

impl MicrosegmentKey {
    /// Building sector of the key, if the building type is known.
    pub fn sector(&self) -> Option<Sector> {
        Sector::of(&self.building_type)
    }

    /// Key under which results are recorded for later competition.
    ///
    /// Window conduction and solar gain components share one "windows" key.
    pub fn contributing_key(&self) -> MicrosegmentKey {
        let mut key = self.clone();
        if let Some(t) = &key.technology
            && t.contains("windows")
        {
            key.technology = Some("windows".to_string());
        }
        key
    }

    /// Whether the combination exists in the built-in category map.
    ///
    /// A key without a technology is accepted whenever its end use is valid.
    pub fn is_known_combination(&self) -> bool {
        let Some(sector) = self.sector() else {
            return false;
        };
        if !sector.fuels().contains(&self.fuel.as_str())
            || !sector.end_uses(&self.fuel).contains(&self.end_use.as_str())
        {
            return false;
        }
        match (&self.technology_type, &self.technology) {
            (_, None) => true,
            (Some(TechType::Demand), Some(t)) => sector.demand_techs().contains(&t.as_str()),
            (_, Some(t)) => sector
                .supply_techs(&self.fuel, &self.end_use)
                .contains(&Some(t.as_str())),
        }
    }
}

impl fmt::Display for MicrosegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|{}|{}|{}|{}",
            self.kind,
            self.climate_zone,
            self.building_type,
            self.fuel,
            self.end_use,
            self.technology_type.map_or("-", TechType::as_str),
            self.technology.as_deref().unwrap_or("-"),
            self.structure
        )
    }
}

impl FromStr for MicrosegmentKey {
    type Err = MsegError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('|').collect();
        let [kind, cz, bldg, fuel, eu, tt, tech, structure] = parts[..] else {
            return Err(MsegError::InvalidInput(format!(
                "microsegment key '{s}' must have 8 components"
            )));
        };
        Ok(Self {
            kind: kind.parse()?,
            climate_zone: cz.to_string(),
            building_type: bldg.to_string(),
            fuel: fuel.to_string(),
            end_use: eu.to_string(),
            technology_type: match tt {
                "-" => None,
                other => Some(other.parse()?),
            },
            technology: match tech {
                "-" => None,
                other => Some(other.to_string()),
            },
            structure: structure.parse()?,
        })
    }
}

impl From<MicrosegmentKey> for String {
    fn from(key: MicrosegmentKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for MicrosegmentKey {
    type Error = MsegError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// A declared attribute: one name or a list of names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Selection {
    One(String),
    Many(Vec<String>),
}

impl Selection {
    pub fn names(&self) -> Vec<String> {
        match self {
            Selection::One(s) => vec![s.clone()],
            Selection::Many(v) => v.clone(),
        }
    }

    fn is(&self, name: &str) -> bool {
        matches!(self, Selection::One(s) if s == name)
    }
}

impl From<&str> for Selection {
    fn from(s: &str) -> Self {
        Selection::One(s.to_string())
    }
}

/// End uses declared either for the primary side only or split in two.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EndUseDecl {
    Split {
        primary: Selection,
        secondary: Selection,
    },
    Plain(Selection),
}

impl EndUseDecl {
    pub fn primary(&self) -> &Selection {
        match self {
            EndUseDecl::Split { primary, .. } | EndUseDecl::Plain(primary) => primary,
        }
    }

    pub fn secondary(&self) -> Option<&Selection> {
        match self {
            EndUseDecl::Split { secondary, .. } => Some(secondary),
            EndUseDecl::Plain(_) => None,
        }
    }
}

/// Raw applicability declarations of a measure.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub climate_zone: Selection,
    pub bldg_type: Selection,
    pub structure_type: Selection,
    pub fuel_type: Selection,
    pub end_use: EndUseDecl,
    pub technology: Option<Selection>,
}

/// Concrete fuels, end uses and technologies for one side of a measure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentScope {
    pub fuels: Vec<String>,
    pub end_uses: Vec<String>,
    pub technology_type: TechType,
    pub technologies: Vec<Option<String>>,
}

/// Fully expanded applicability, ready for key-chain generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Applicability {
    pub climate_zones: Vec<String>,
    pub building_types: Vec<String>,
    pub structures: Vec<Structure>,
    pub primary: SegmentScope,
    pub secondary: Option<SegmentScope>,
}

fn push_unique<T: PartialEq>(v: &mut Vec<T>, x: T) {
    if !v.contains(&x) {
        v.push(x);
    }
}

impl Applicability {
    /// Validates declared names and expands "all" forms.
    ///
    /// # Arguments
    ///
    /// * `decl` - Raw declarations from the measure definition
    /// * `measure` - Measure name, for error messages
    ///
    /// # Errors
    ///
    /// Returns [`MsegError::InvalidMeasure`] listing any names that are not
    /// valid category names or "all" forms.
    pub fn resolve(decl: &Declaration, measure: &str) -> Result<Self> {
        check_mkt_inputs(decl, measure)?;

        let climate_zones = if decl.climate_zone.is("all") {
            categories::CLIMATE_ZONES.iter().map(|s| s.to_string()).collect()
        } else {
            decl.climate_zone.names()
        };

        let structures = if decl.structure_type.is("all") {
            vec![Structure::New, Structure::Existing]
        } else {
            decl.structure_type
                .names()
                .iter()
                .map(|s| s.parse())
                .collect::<Result<Vec<_>>>()?
        };

        let building_types = expand_building_types(&decl.bldg_type.names());
        let sectors: Vec<Sector> = Sector::ALL
            .into_iter()
            .filter(|s| building_types.iter().any(|b| s.building_types().contains(&b.as_str())))
            .collect();

        let primary_techs = decl.technology.as_ref().map(Selection::names);
        let primary = expand_scope(
            &sectors,
            &decl.fuel_type.names(),
            &decl.end_use.primary().names(),
            derive_tech_type(primary_techs.as_deref()),
            primary_techs.as_deref(),
        );

        let secondary = decl.end_use.secondary().map(|eus| {
            let end_uses = eus.names();
            let tech_type = if end_uses
                .iter()
                .all(|e| HEAT_COOL_END_USES.contains(&e.as_str()))
            {
                TechType::Demand
            } else {
                TechType::Supply
            };
            let all = vec!["all".to_string()];
            expand_scope(&sectors, &all, &end_uses, tech_type, Some(&all))
        });

        Ok(Self {
            climate_zones,
            building_types,
            structures,
            primary,
            secondary,
        })
    }

    /// Generates the ordered key chain for one side of the measure.
    ///
    /// Heating, secondary heating and cooling end uses carry the scope's
    /// technology type; other end uses omit it. Keys for the first declared
    /// structure type precede all keys for the second.
    pub fn keychain(&self, kind: MsegKind) -> Vec<MicrosegmentKey> {
        let scope = match kind {
            MsegKind::Primary => &self.primary,
            MsegKind::Secondary => match &self.secondary {
                Some(s) => s,
                None => return Vec::new(),
            },
        };
        let (hc, non_hc): (Vec<&String>, Vec<&String>) = scope
            .end_uses
            .iter()
            .partition(|e| HEAT_COOL_END_USES.contains(&e.as_str()));

        let mut base = Vec::new();
        for (end_uses, tech_type) in [(hc, Some(scope.technology_type)), (non_hc, None)] {
            for cz in &self.climate_zones {
                for bldg in &self.building_types {
                    for fuel in &scope.fuels {
                        for eu in &end_uses {
                            for tech in &scope.technologies {
                                base.push((cz, bldg, fuel, *eu, tech_type, tech));
                            }
                        }
                    }
                }
            }
        }

        self.structures
            .iter()
            .flat_map(|&structure| {
                base.iter().map(move |(cz, bldg, fuel, eu, tt, tech)| MicrosegmentKey {
                    kind,
                    climate_zone: cz.to_string(),
                    building_type: bldg.to_string(),
                    fuel: fuel.to_string(),
                    end_use: eu.to_string(),
                    technology_type: *tt,
                    technology: (*tech).clone(),
                    structure,
                })
            })
            .collect()
    }

    /// Whether any applicable building type is commercial.
    pub fn has_commercial(&self) -> bool {
        self.building_types
            .iter()
            .any(|b| Sector::of(b) == Some(Sector::Commercial))
    }
}

/// Checks every declared name against the category map.
///
/// # Errors
///
/// Returns [`MsegError::InvalidMeasure`] listing the invalid names.
pub fn check_mkt_inputs(decl: &Declaration, measure: &str) -> Result<()> {
    let mut names = Vec::new();
    names.extend(decl.climate_zone.names());
    names.extend(decl.bldg_type.names());
    names.extend(decl.structure_type.names());
    names.extend(decl.fuel_type.names());
    names.extend(decl.end_use.primary().names());
    if let Some(s) = decl.end_use.secondary() {
        names.extend(s.names());
    }
    if let Some(t) = &decl.technology {
        names.extend(t.names());
    }
    let invalid: Vec<String> = names
        .into_iter()
        .filter(|n| !categories::is_valid_name(n))
        .collect();
    if invalid.is_empty() {
        Ok(())
    } else {
        Err(MsegError::invalid_measure(
            measure,
            format!("invalid applicability names {invalid:?}"),
        ))
    }
}

/// Demand when every declared technology is a demand-side component.
fn derive_tech_type(techs: Option<&[String]>) -> TechType {
    match techs {
        Some(ts) if !ts.is_empty() && ts.iter().all(|t| categories::is_demand_tech(t)) => {
            TechType::Demand
        }
        _ => TechType::Supply,
    }
}

fn expand_building_types(declared: &[String]) -> Vec<String> {
    let is_all_form = |b: &str| matches!(b, "all" | "all residential" | "all commercial");
    let mut out: Vec<String> = declared
        .iter()
        .filter(|b| !is_all_form(b))
        .cloned()
        .collect();
    for sector in Sector::ALL {
        let wanted = declared
            .iter()
            .any(|b| b == "all" || *b == format!("all {}", sector.as_str()));
        if wanted {
            for b in sector.building_types() {
                push_unique(&mut out, b.to_string());
            }
        }
    }
    out
}

fn expand_scope(
    sectors: &[Sector],
    fuels_decl: &[String],
    end_uses_decl: &[String],
    tech_type: TechType,
    techs_decl: Option<&[String]>,
) -> SegmentScope {
    let mut fuels = Vec::new();
    if fuels_decl.iter().any(|f| f == "all") {
        for s in sectors {
            for f in s.fuels() {
                push_unique(&mut fuels, f.to_string());
            }
        }
    } else {
        fuels = fuels_decl.to_vec();
    }

    let mut end_uses = Vec::new();
    if end_uses_decl.iter().any(|e| e == "all") {
        for s in sectors {
            for f in fuels.iter().filter(|f| s.fuels().contains(&f.as_str())) {
                for e in s.end_uses(f) {
                    push_unique(&mut end_uses, e.to_string());
                }
            }
        }
    } else {
        end_uses = end_uses_decl.to_vec();
    }

    let technologies = match techs_decl {
        None => vec![None],
        Some(ts) if !ts.iter().any(|t| t == "all" || t.starts_with("all ")) => {
            ts.iter().cloned().map(Some).collect()
        }
        Some(ts) => {
            let everything = ts.iter().any(|t| t == "all");
            let all_of: Vec<&str> = ts.iter().filter_map(|t| t.strip_prefix("all ")).collect();
            let mut out: Vec<Option<String>> = ts
                .iter()
                .filter(|t| *t != "all" && !t.starts_with("all "))
                .cloned()
                .map(Some)
                .collect();
            for s in sectors {
                match tech_type {
                    TechType::Demand => {
                        for t in s.demand_techs() {
                            push_unique(&mut out, Some(t.to_string()));
                        }
                    }
                    TechType::Supply => {
                        for f in fuels.iter().filter(|f| s.fuels().contains(&f.as_str())) {
                            for e in end_uses
                                .iter()
                                .filter(|e| s.end_uses(f).contains(&e.as_str()))
                            {
                                if !everything && !all_of.contains(&e.as_str()) {
                                    continue;
                                }
                                for t in s.supply_techs(f, e) {
                                    push_unique(&mut out, t.map(str::to_string));
                                }
                            }
                        }
                    }
                }
            }
            out
        }
    };

    SegmentScope {
        fuels,
        end_uses,
        technology_type: tech_type,
        technologies,
    }
}
