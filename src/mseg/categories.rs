//! Built-in baseline category map.
//!
//! Lists every valid climate zone, building type, fuel, end use and
//! technology name, and drives the expansion of "all" declarations.

use serde::{Deserialize, Serialize};

/// Climate zones in modeling order.
pub const CLIMATE_ZONES: [&str; 5] = ["AIA_CZ1", "AIA_CZ2", "AIA_CZ3", "AIA_CZ4", "AIA_CZ5"];

/// End uses whose keys carry a supply/demand level.
pub const HEAT_COOL_END_USES: [&str; 3] = ["heating", "secondary heating", "cooling"];

/// Demand-side thermal load components across both sectors.
pub const DEMAND_TECHS: [&str; 12] = [
    "roof",
    "ground",
    "lighting gain",
    "windows conduction",
    "equipment gain",
    "floor",
    "infiltration",
    "people gain",
    "windows solar",
    "ventilation",
    "other heat gain",
    "wall",
];

/// Building sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sector {
    Residential,
    Commercial,
}

impl Sector {
    pub const ALL: [Sector; 2] = [Sector::Residential, Sector::Commercial];

    /// Sector owning a building type name.
    pub fn of(building_type: &str) -> Option<Sector> {
        Sector::ALL
            .into_iter()
            .find(|s| s.building_types().contains(&building_type))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Sector::Residential => "residential",
            Sector::Commercial => "commercial",
        }
    }

    pub fn building_types(self) -> &'static [&'static str] {
        match self {
            Sector::Residential => &["single family home", "multi family home", "mobile home"],
            Sector::Commercial => &[
                "assembly",
                "education",
                "food sales",
                "food service",
                "health care",
                "lodging",
                "large office",
                "small office",
                "mercantile/service",
                "warehouse",
                "other",
            ],
        }
    }

    pub fn fuels(self) -> &'static [&'static str] {
        match self {
            Sector::Residential => &["electricity", "natural gas", "distillate", "other fuel"],
            Sector::Commercial => &["electricity", "natural gas", "distillate"],
        }
    }

    pub fn end_uses(self, fuel: &str) -> &'static [&'static str] {
        match (self, fuel) {
            (Sector::Residential, "electricity") => &[
                "drying",
                "other (grid electric)",
                "water heating",
                "cooling",
                "cooking",
                "computers",
                "lighting",
                "secondary heating",
                "TVs",
                "heating",
                "refrigeration",
                "fans & pumps",
                "ceiling fan",
            ],
            (Sector::Residential, "natural gas") => &[
                "drying",
                "water heating",
                "cooling",
                "heating",
                "cooking",
                "secondary heating",
            ],
            (Sector::Residential, "distillate") => {
                &["water heating", "heating", "secondary heating"]
            }
            (Sector::Residential, "other fuel") => {
                &["water heating", "cooking", "heating", "secondary heating"]
            }
            (Sector::Commercial, "electricity") => &[
                "ventilation",
                "water heating",
                "cooling",
                "heating",
                "refrigeration",
                "MELs",
                "non-PC office equipment",
                "PCs",
                "lighting",
                "cooking",
            ],
            (Sector::Commercial, "natural gas") => {
                &["cooling", "water heating", "cooking", "heating"]
            }
            (Sector::Commercial, "distillate") => &["water heating", "heating"],
            _ => &[],
        }
    }

    pub fn demand_techs(self) -> &'static [&'static str] {
        match self {
            Sector::Residential => &[
                "roof",
                "ground",
                "windows solar",
                "windows conduction",
                "equipment gain",
                "people gain",
                "wall",
                "infiltration",
            ],
            Sector::Commercial => &DEMAND_TECHS,
        }
    }

    /// Supply-side technologies; `None` marks an end use with no technology level.
    pub fn supply_techs(self, fuel: &str, end_use: &str) -> &'static [Option<&'static str>] {
        use Sector::{Commercial as C, Residential as R};
        match (self, fuel, end_use) {
            (R, "electricity", "other (grid electric)") => &[
                Some("dishwasher"),
                Some("other MELs"),
                Some("clothes washing"),
                Some("freezers"),
            ],
            (R, "electricity", "water heating") => &[Some("solar WH"), Some("electric WH")],
            (R, "electricity", "cooling") => {
                &[Some("room AC"), Some("ASHP"), Some("GSHP"), Some("central AC")]
            }
            (R, "electricity", "computers") => &[
                Some("desktop PC"),
                Some("laptop PC"),
                Some("network equipment"),
                Some("monitors"),
            ],
            (R, "electricity", "lighting") => &[
                Some("linear fluorescent (T-8)"),
                Some("linear fluorescent (T-12)"),
                Some("reflector (LED)"),
                Some("general service (CFL)"),
                Some("external (high pressure sodium)"),
                Some("general service (incandescent)"),
                Some("external (CFL)"),
                Some("external (LED)"),
                Some("reflector (CFL)"),
                Some("reflector (incandescent)"),
                Some("general service (LED)"),
                Some("external (incandescent)"),
                Some("linear fluorescent (LED)"),
                Some("reflector (halogen)"),
            ],
            (R, "electricity", "secondary heating") => &[Some("non-specific")],
            (R, "electricity", "TVs") => &[
                Some("home theater & audio"),
                Some("set top box"),
                Some("video game consoles"),
                Some("DVD"),
                Some("TV"),
            ],
            (R, "electricity", "heating") => {
                &[Some("GSHP"), Some("boiler (electric)"), Some("ASHP")]
            }
            (R, "electricity", "ceiling fan" | "fans & pumps" | "refrigeration") => &[None],
            (R, "electricity", "drying" | "cooking") => &[None],
            (R, "natural gas", "cooling") => &[Some("NGHP")],
            (R, "natural gas", "heating") => {
                &[Some("furnace (NG)"), Some("NGHP"), Some("boiler (NG)")]
            }
            (R, "natural gas", "secondary heating") => &[Some("non-specific")],
            (R, "natural gas", "drying" | "water heating" | "cooking") => &[None],
            (R, "distillate", "heating") => {
                &[Some("boiler (distillate)"), Some("furnace (distillate)")]
            }
            (R, "distillate", "secondary heating") => &[Some("non-specific")],
            (R, "distillate", "water heating") => &[None],
            (R, "other fuel", "heating") => &[
                Some("resistance"),
                Some("furnace (kerosene)"),
                Some("stove (wood)"),
                Some("furnace (LPG)"),
            ],
            (R, "other fuel", "secondary heating") => &[
                Some("secondary heating (wood)"),
                Some("secondary heating (coal)"),
                Some("secondary heating (kerosene)"),
                Some("secondary heating (LPG)"),
            ],
            (R, "other fuel", "cooking" | "water heating") => &[None],
            (C, "electricity", "ventilation") => &[Some("VAV_Vent"), Some("CAV_Vent")],
            (C, "electricity", "water heating") => &[
                Some("Solar water heater"),
                Some("HP water heater"),
                Some("elec_booster_water_heater"),
                Some("elec_water_heater"),
            ],
            (C, "electricity", "cooling") => &[
                Some("rooftop_AC"),
                Some("scroll_chiller"),
                Some("res_type_central_AC"),
                Some("reciprocating_chiller"),
                Some("comm_GSHP-cool"),
                Some("centrifugal_chiller"),
                Some("rooftop_ASHP-cool"),
                Some("wall-window_room_AC"),
                Some("screw_chiller"),
            ],
            (C, "electricity", "heating") => &[
                Some("electric_res-heat"),
                Some("comm_GSHP-heat"),
                Some("rooftop_ASHP-heat"),
                Some("elec_boiler"),
            ],
            (C, "electricity", "refrigeration") => &[
                Some("Reach-in_freezer"),
                Some("Supermkt_compressor_rack"),
                Some("Walk-In_freezer"),
                Some("Supermkt_display_case"),
                Some("Walk-In_refrig"),
                Some("Reach-in_refrig"),
                Some("Supermkt_condenser"),
                Some("Ice_machine"),
                Some("Vend_Machine"),
                Some("Bevrg_Mchndsr"),
            ],
            (C, "electricity", "MELs") => &[
                Some("lab fridges and freezers"),
                Some("non-road electric vehicles"),
                Some("kitchen ventilation"),
                Some("escalators"),
                Some("distribution transformers"),
                Some("large video displays"),
                Some("video displays"),
                Some("elevators"),
                Some("laundry"),
                Some("medical imaging"),
                Some("coffee brewers"),
                Some("fume hoods"),
                Some("security systems"),
            ],
            (C, "electricity", "lighting") => &[
                Some("F28T8 HE w/ OS"),
                Some("F28T8 HE w/ SR"),
                Some("90W Halogen Edison"),
                Some("HPS 150_HB"),
                Some("F96T8"),
                Some("F96T12 mag"),
                Some("72W incand"),
                Some("F96T8 HE"),
                Some("LED_LB"),
                Some("F28T8 HE w/ OS & SR"),
                Some("LED 150 HPS_HB"),
                Some("F96T8 HO_HB"),
                Some("26W CFL"),
                Some("HPS 70_LB"),
                Some("90W Halogen PAR-38"),
                Some("MH 400_HB"),
                Some("LED Edison"),
                Some("F28T5"),
                Some("HPS 100_LB"),
                Some("100W incand"),
                Some("MH 250_HB"),
                Some("F54T5 HO_HB"),
                Some("MV 400_HB"),
                Some("F28T8 HE"),
                Some("LED_HB"),
                Some("70W HIR PAR-38"),
                Some("F32T8"),
                Some("F96T8 HO_LB"),
                Some("2L F54T5HO LB"),
                Some("F96T12 ES mag"),
                Some("23W CFL"),
                Some("LED T8"),
                Some("MH 175_LB"),
                Some("LED 100 HPS_LB"),
                Some("MV 175_LB"),
                Some("F34T12"),
                Some("T8 F32 EEMag (e)"),
            ],
            (C, "electricity", "cooking") => &[
                Some("Range, Electric-induction, 4 burner, oven, 1"),
                Some("Range, Electric, 4 burner, oven, 11-inch gr"),
            ],
            (C, "electricity", "PCs" | "non-PC office equipment") => &[None],
            (C, "natural gas", "cooling") => &[
                Some("gas_eng-driven_RTAC"),
                Some("gas_chiller"),
                Some("res_type_gasHP-cool"),
                Some("gas_eng-driven_RTHP-cool"),
            ],
            (C, "natural gas", "water heating") => &[
                Some("gas_water_heater"),
                Some("gas_instantaneous_WH"),
                Some("gas_booster_WH"),
            ],
            (C, "natural gas", "cooking") => &[
                Some("Range, Gas, 4 powered burners, convect. oven"),
                Some("Range, Gas, 4 burner, oven, 11-inch griddle"),
            ],
            (C, "natural gas", "heating") => &[
                Some("gas_eng-driven_RTHP-heat"),
                Some("res_type_gasHP-heat"),
                Some("gas_boiler"),
                Some("gas_furnace"),
            ],
            (C, "distillate", "water heating") => &[Some("oil_water_heater")],
            (C, "distillate", "heating") => &[Some("oil_boiler"), Some("oil_furnace")],
            _ => &[],
        }
    }
}

/// Whether `tech` is a demand-side thermal load component.
pub fn is_demand_tech(tech: &str) -> bool {
    DEMAND_TECHS.contains(&tech)
}

/// Every end use name across sectors and fuels.
pub fn all_end_uses() -> Vec<&'static str> {
    let mut out: Vec<&'static str> = Vec::new();
    for s in Sector::ALL {
        for f in s.fuels() {
            for e in s.end_uses(f) {
                if !out.contains(e) {
                    out.push(e);
                }
            }
        }
    }
    out
}

/// Whether `name` is a valid applicability name, including "all" forms.
pub fn is_valid_name(name: &str) -> bool {
    if matches!(name, "all" | "all residential" | "all commercial" | "supply" | "demand")
        || matches!(name, "new" | "existing")
        || CLIMATE_ZONES.contains(&name)
        || DEMAND_TECHS.contains(&name)
    {
        return true;
    }
    if let Some(eu) = name.strip_prefix("all ") {
        return all_end_uses().contains(&eu);
    }
    Sector::ALL.into_iter().any(|s| {
        s.building_types().contains(&name)
            || s.fuels().iter().any(|f| {
                *f == name
                    || s.end_uses(f).iter().any(|e| {
                        *e == name || s.supply_techs(f, e).iter().any(|t| *t == Some(name))
                    })
            })
    })
}
