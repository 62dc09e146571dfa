//! Property tests over filled markets.

mod common;

use proptest::prelude::*;

use mseg_engine::mseg::value::Year;
use mseg_engine::partition::AdoptionScheme;

use common::World;

const HORIZON: [Year; 5] = [2009, 2010, 2011, 2012, 2013];
const TOL: f64 = 1e-9;

fn water_heater(ef: f64, entry: Year, exit: Year) -> serde_json::Value {
    let mut j = common::water_heater_json("Gas WH");
    j["energy_efficiency"] = serde_json::json!(ef);
    j["market_entry_year"] = serde_json::json!(entry);
    j["market_exit_year"] = serde_json::json!(exit);
    j
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn competed_never_exceeds_total(
        ef in 18.0f64..40.0,
        retro in 0.0f64..0.2,
        entry in 2009u16..2012,
    ) {
        let world = World::new(&HORIZON, retro);
        let m = world.filled(water_heater(ef, entry, 2014));
        for scheme in AdoptionScheme::ALL {
            let ms = &m.markets[&scheme].master_mseg;
            for (name, stream) in ms.streams() {
                for y in HORIZON {
                    let c = stream.competed.baseline.at(y).mean();
                    let t = stream.total.baseline.at(y).mean();
                    prop_assert!(c <= t + TOL, "{} {}: competed {} > total {}", name, y, c, t);
                }
            }
            for y in HORIZON {
                let all = ms.stock.total.all.at(y).mean();
                let meas = ms.stock.total.measure.at(y).mean();
                prop_assert!(meas <= all + TOL);
                let competed = &ms.stock.competed;
                prop_assert!(competed.measure.at(y).mean() <= competed.all.at(y).mean() + TOL);
            }
        }
    }

    #[test]
    fn efficient_equals_baseline_off_market(
        ef in 18.0f64..40.0,
        entry in 2010u16..2012,
        span in 1u16..3,
    ) {
        let exit = entry + span;
        let world = World::new(&HORIZON, 0.01);
        let m = world.filled(water_heater(ef, entry, exit));
        for scheme in AdoptionScheme::ALL {
            let ms = &m.markets[&scheme].master_mseg;
            for y in HORIZON.into_iter().filter(|&y| y < entry || y >= exit) {
                let base = ms.energy.total.baseline.at(y).mean();
                let eff = ms.energy.total.efficient.at(y).mean();
                prop_assert!((base - eff).abs() < TOL, "{} {}: {} vs {}", scheme, y, eff, base);
                prop_assert!(ms.stock.total.measure.at(y).mean().abs() < TOL);
            }
        }
    }

    #[test]
    fn better_performance_never_uses_more_energy(
        ef in 18.0f64..40.0,
        gain in 0.5f64..10.0,
    ) {
        let world = World::new(&HORIZON, 0.01);
        let a = world.filled(water_heater(ef, 2009, 2014));
        let b = world.filled(water_heater(ef + gain, 2009, 2014));
        for scheme in AdoptionScheme::ALL {
            let ea = a.markets[&scheme].master_mseg.energy.total.efficient.total_mean();
            let eb = b.markets[&scheme].master_mseg.energy.total.efficient.total_mean();
            prop_assert!(eb <= ea + TOL);
        }
    }
}
