//! Integration tests for merging filled measures into packages.

mod common;

use approx::assert_relative_eq;

use mseg_engine::measure::Measure;
use mseg_engine::package::{MeasurePackage, PackageBenefits};
use mseg_engine::partition::AdoptionScheme;

use common::{World, YEARS};

const TP: AdoptionScheme = AdoptionScheme::TechnicalPotential;

fn savings(m: &Measure, scheme: AdoptionScheme) -> f64 {
    let e = &m.markets[&scheme].master_mseg.energy.total;
    e.baseline.total_mean() - e.efficient.total_mean()
}

fn merge(name: &str, members: &[&Measure], benefits: PackageBenefits) -> Measure {
    MeasurePackage::new(name, members.to_vec(), benefits)
        .and_then(|p| p.merge_measures())
        .unwrap()
}

#[test]
fn disjoint_members_add_up() {
    let world = World::default();
    let wh = world.filled(common::water_heater_json("Gas WH"));
    let led = world.filled(common::res_lighting_json("Res LED"));
    let pkg = merge("Home upgrade", &[&wh, &led], PackageBenefits::default());

    assert!(pkg.finalized);
    assert!(!pkg.removed);
    for scheme in AdoptionScheme::ALL {
        assert_relative_eq!(
            savings(&pkg, scheme),
            savings(&wh, scheme) + savings(&led, scheme),
            epsilon = 1e-9
        );
    }
    let mk = &pkg.markets[&TP];
    assert_eq!(mk.mseg_adjust.contributing.len(), 2);
    assert_relative_eq!(mk.master_mseg.stock.total.all.at(2009).mean(), 45.0, epsilon = 1e-9);
    assert_eq!(mk.mseg_adjust.choice_params.len(), 2);
}

#[test]
fn shared_microsegments_are_counted_once() {
    let world = World::default();
    let wh = world.filled(common::water_heater_json("Gas WH"));
    let mut deep = common::water_heater_json("Gas WH deep");
    deep["energy_efficiency"] = serde_json::json!(30.0);
    let deep = world.filled(deep);

    let pkg = merge("Water heating", &[&wh, &deep], PackageBenefits::default());
    let combined = savings(&wh, TP) + savings(&deep, TP);
    assert!(savings(&pkg, TP) < combined);
    // the first listed member keeps the shared key
    assert_relative_eq!(savings(&pkg, TP), savings(&wh, TP), epsilon = 1e-9);
    assert_relative_eq!(
        pkg.markets[&TP].master_mseg.energy.total.baseline.at(2010).mean(),
        15.15,
        epsilon = 1e-9
    );
}

#[test]
fn duplicate_member_adds_nothing() {
    let world = World::default();
    let wh = world.filled(common::water_heater_json("Gas WH"));
    let pkg = merge("Twice", &[&wh, &wh], PackageBenefits::default());
    assert_eq!(pkg.markets[&TP].master_mseg.energy, wh.markets[&TP].master_mseg.energy);
}

#[test]
fn benefits_boost_savings_and_cut_cost() {
    let world = World::default();
    let wh = world.filled(common::water_heater_json("Gas WH"));
    let benefits = PackageBenefits {
        energy_savings_increase: 0.1,
        cost_reduction: 0.2,
    };
    let pkg = merge("Boosted", &[&wh], benefits);
    assert_relative_eq!(savings(&pkg, TP), savings(&wh, TP) * 1.1, epsilon = 1e-9);
    let cost = |m: &Measure| {
        let stock = &m.markets[&TP].master_mseg.cost.stock;
        stock.total.efficient.at(2009).mean()
    };
    assert_relative_eq!(cost(&pkg), cost(&wh) * 0.8, epsilon = 1e-9);
}

#[test]
fn merged_definition_spans_members() {
    let world = World::default();
    let wh = world.filled(common::water_heater_json("Gas WH"));
    let led = world.filled(common::res_lighting_json("Res LED"));
    let pkg = merge("Home upgrade", &[&wh, &led], PackageBenefits::default());
    let d = &pkg.definition;
    assert_eq!(d.fuel_type.names(), vec!["natural gas", "electricity"]);
    assert_eq!(d.end_use.primary().names(), vec!["water heating", "lighting"]);
    assert_eq!(d.market_entry_year, None);
    let app = pkg.applicability.as_ref();
    assert_eq!(app.map(|a| a.primary.fuels.len()), Some(2));
}

#[test]
fn members_are_left_untouched() {
    let world = World::default();
    let wh = world.filled(common::water_heater_json("Gas WH"));
    let led = world.filled(common::res_lighting_json("Res LED"));
    let (wh_before, led_before) = (wh.clone(), led.clone());
    let benefits = PackageBenefits {
        energy_savings_increase: 0.5,
        cost_reduction: 0.5,
    };
    merge("Home upgrade", &[&wh, &led], benefits);
    assert_eq!(wh, wh_before);
    assert_eq!(led, led_before);
}

#[test]
fn removed_member_removes_the_package() {
    let world = World::default();
    let wh = world.filled(common::water_heater_json("Gas WH"));
    let mut j = common::res_lighting_json("Res LED niche");
    j["market_scaling_fractions"] = serde_json::json!(0.2);
    j["market_scaling_fractions_source"] = serde_json::json!({"title": "x"});
    let niche = world.filled(j);
    assert!(niche.removed);

    let pkg = merge("Home upgrade", &[&wh, &niche], PackageBenefits::default());
    assert!(pkg.removed);
    assert!(pkg.finalized);
    assert!(pkg.markets.is_empty());
    assert!(!pkg.warnings.is_empty());
}

#[test]
fn unfilled_member_is_rejected() {
    let world = World::default();
    let wh = world.filled(common::water_heater_json("Gas WH"));
    let raw = common::measure(common::res_lighting_json("Res LED"));
    let none = PackageBenefits::default;
    assert!(MeasurePackage::new("Home upgrade", vec![&wh, &raw], none()).is_err());
    assert!(MeasurePackage::new("Empty", Vec::new(), none()).is_err());
    let long = "x".repeat(41);
    assert!(MeasurePackage::new(&long, vec![&wh], none()).is_err());
}

#[test]
fn package_years_match_members() {
    let world = World::default();
    let wh = world.filled(common::water_heater_json("Gas WH"));
    let pkg = merge("Solo", &[&wh], PackageBenefits::default());
    assert_eq!(pkg.markets[&TP].master_mseg.years(), YEARS.to_vec());
}
