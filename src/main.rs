//! Microsegment engine entry point: CLI wiring and config-driven runs.

use std::path::{Path, PathBuf};
use std::process;

use tracing_subscriber::EnvFilter;

use mseg_engine::config::RunConfig;
use mseg_engine::io::{export::export_csv, save_markets};
use mseg_engine::runner::{RunInputs, prepare_measures};
use mseg_engine::summary::MarketSummary;

/// Parsed CLI arguments.
struct CliArgs {
    config_path: Option<String>,
    preset: Option<String>,
    seed_override: Option<u64>,
    out: Option<String>,
    csv: Option<String>,
}

fn print_help() {
    eprintln!("mseg-engine: energy efficiency measure market microsegments");
    eprintln!();
    eprintln!("Usage: mseg-engine [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <path>    Load run configuration from TOML file");
    eprintln!("  --preset <name>    Use a built-in preset ({})", RunConfig::PRESETS.join(", "));
    eprintln!("  --seed <u64>       Override sampling seed");
    eprintln!("  --out <path>       Write filled markets JSON here");
    eprintln!("  --csv <path>       Also export master microsegments to CSV");
    eprintln!("  --help             Show this help message");
    eprintln!();
    eprintln!("If no --config or --preset is given, the aeo preset is used.");
    eprintln!("Log verbosity follows RUST_LOG (default: info).");
}

/// Value following a flag, or exit with an error.
fn flag_value(args: &[String], i: usize, flag: &str, what: &str) -> String {
    match args.get(i) {
        Some(v) => v.clone(),
        None => {
            eprintln!("error: {flag} requires a {what} argument");
            process::exit(1);
        }
    }
}

/// Creates the parent directory of an output file, or exit with an error.
fn ensure_parent(path: &Path) {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty())
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("error: cannot create \"{}\": {e}", dir.display());
        process::exit(1);
    }
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        config_path: None,
        preset: None,
        seed_override: None,
        out: None,
        csv: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--config" => {
                i += 1;
                cli.config_path = Some(flag_value(&args, i, "--config", "path"));
            }
            "--preset" => {
                i += 1;
                cli.preset = Some(flag_value(&args, i, "--preset", "name"));
            }
            "--seed" => {
                i += 1;
                let raw = flag_value(&args, i, "--seed", "u64");
                if let Ok(s) = raw.parse::<u64>() {
                    cli.seed_override = Some(s);
                } else {
                    eprintln!("error: --seed value \"{raw}\" is not a valid u64");
                    process::exit(1);
                }
            }
            "--out" => {
                i += 1;
                cli.out = Some(flag_value(&args, i, "--out", "path"));
            }
            "--csv" => {
                i += 1;
                cli.csv = Some(flag_value(&args, i, "--csv", "path"));
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn main() {
    let cli = parse_args();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // --config takes priority, then --preset, then the aeo default
    let mut config = if let Some(ref path) = cli.config_path {
        match RunConfig::from_toml_file(Path::new(path)) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        }
    } else if let Some(ref name) = cli.preset {
        match RunConfig::from_preset(name) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        }
    } else {
        RunConfig::aeo()
    };

    if let Some(seed) = cli.seed_override {
        config.sampling.seed = seed;
    }
    if let Some(out) = cli.out {
        config.output.markets_json = PathBuf::from(out);
    }
    if let Some(csv) = cli.csv {
        config.output.summary_csv = Some(PathBuf::from(csv));
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }

    let inputs = match RunInputs::load(&config.inputs) {
        Ok(inputs) => inputs,
        Err(e) => {
            eprintln!("error: failed to load inputs: {e}");
            process::exit(1);
        }
    };

    let outcome = match prepare_measures(&inputs, &config.settings()) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };

    for m in outcome.measures.iter().filter(|m| !m.removed) {
        for (scheme, markets) in &m.markets {
            println!("{}\n", MarketSummary::from_markets(m.name(), *scheme, markets));
        }
    }

    let out = &config.output.markets_json;
    ensure_parent(out);
    if let Err(e) = save_markets(&outcome.measures, out) {
        eprintln!("error: failed to write markets: {e}");
        process::exit(1);
    }
    eprintln!("Markets written to {}", out.display());

    if let Some(ref path) = config.output.summary_csv {
        ensure_parent(path);
        if let Err(e) = export_csv(&outcome.measures, path) {
            eprintln!("error: failed to write CSV: {e}");
            process::exit(1);
        }
        eprintln!("Summary written to {}", path.display());
    }

    if !outcome.failed.is_empty() {
        eprintln!("{} measure(s) failed; see log", outcome.failed.len());
    }
}
