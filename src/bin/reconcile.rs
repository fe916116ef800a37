use std::fs;
use std::path::Path;

use reconcile_rs::config::{ConfigOverrides, MatchingOverrides, ReconcileConfig};
use reconcile_rs::{
    DateRangeMatcher, FieldKey, Interval, MatchingPreparer, Record, ThresholdPreparer,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

fn parse_arg(flag: &str) -> Option<String> {
    let mut args = std::env::args();
    while let Some(arg) = args.next() {
        if arg == flag {
            return args.next();
        }
    }
    None
}

fn has_flag(flag: &str) -> bool {
    std::env::args().any(|arg| arg == flag)
}

fn print_help() {
    eprintln!(
        r#"reconcile - Fuzzy record reconciliation

USAGE:
    reconcile [OPTIONS] --stored <FILE> --incoming <FILE>
    reconcile --mode ranges [--alt] --haystack <FILE> --needles <FILE>

OPTIONS:
    -m, --mode <MODE>         full | threshold | plan | ranges [default: full]
    -s, --stored <FILE>       JSON array of stored records
    -i, --incoming <FILE>     JSON array of incoming records
    -k, --keys <FIELDS>       Compare only these fields; full and plan modes
        --haystack <FILE>     JSON array of {{"begin", "end"}} ranges
        --needles <FILE>      JSON array of {{"begin", "end"}} ranges
        --alt                 Search the disjoint haystack half first
    -c, --config <FILE>       Path to config file (TOML)
        --precision <N>       Override ratio precision
        --primary-key <NAME>  Override primary-key field
    -h, --help                Print help

ENVIRONMENT:
    RECONCILE_CONFIG                 Path to config file
    RECONCILE_MATCHING__PRECISION    Ratio precision
    RECONCILE_MATCHING__PRIMARY_KEY  Primary-key field
    RUST_LOG                         Log filter (e.g. reconcile_rs=debug)
"#
    );
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn required(short: &str, long: &str) -> anyhow::Result<String> {
    parse_arg(long)
        .or_else(|| parse_arg(short))
        .ok_or_else(|| anyhow::anyhow!("missing required argument {}", long))
}

/// Comma-separated `--keys` value; only the matcher-backed modes compare on a key subset.
fn selected_keys(mode: &str, raw: Option<String>) -> anyhow::Result<Option<Vec<FieldKey>>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    if mode == "threshold" {
        anyhow::bail!("--keys is not supported in threshold mode");
    }
    Ok(Some(
        raw.split(',')
            .filter(|k| !k.is_empty())
            .map(FieldKey::from)
            .collect(),
    ))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Serialize)]
struct RangeMatchOutput {
    needle: Interval,
    range: Option<Interval>,
    crossing: Option<reconcile_rs::Crossing>,
    overlap_days: Option<i64>,
}

fn run_ranges() -> anyhow::Result<()> {
    let haystack: Vec<Interval> = read_json(Path::new(&required("--haystack", "--haystack")?))?;
    let needles: Vec<Interval> = read_json(Path::new(&required("--needles", "--needles")?))?;

    let matcher = DateRangeMatcher::new(haystack);
    let matches = if has_flag("--alt") {
        matcher.match_alt(&needles)
    } else {
        matcher.match_all(&needles)
    };

    let output: Vec<RangeMatchOutput> = needles
        .iter()
        .zip(matches)
        .map(|(needle, found)| RangeMatchOutput {
            needle: *needle,
            range: found.map(|m| *m.item),
            crossing: found.map(|m| m.crossing),
            overlap_days: found.map(|m| m.overlap),
        })
        .collect();
    print_json(&output)
}

fn main() -> anyhow::Result<()> {
    if has_flag("-h") || has_flag("--help") {
        print_help();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mode = parse_arg("--mode")
        .or_else(|| parse_arg("-m"))
        .unwrap_or_else(|| "full".to_string());
    if mode == "ranges" {
        return run_ranges();
    }

    // Build overrides
    let mut overrides = ConfigOverrides::default();
    let mut matching = MatchingOverrides::default();
    if let Some(precision) = parse_arg("--precision") {
        matching.precision = Some(precision.parse()?);
    }
    if let Some(primary_key) = parse_arg("--primary-key") {
        matching.primary_key = Some(primary_key);
    }
    if matching.precision.is_some() || matching.primary_key.is_some() {
        overrides.matching = Some(matching);
    }

    // Load config: overrides > Env > File > Defaults
    let config_path = parse_arg("--config")
        .or_else(|| parse_arg("-c"))
        .or_else(|| std::env::var("RECONCILE_CONFIG").ok());
    let config = ReconcileConfig::load(config_path.as_deref(), overrides)?;

    let stored: Vec<Record> = read_json(Path::new(&required("-s", "--stored")?))?;
    let incoming: Vec<Record> = read_json(Path::new(&required("-i", "--incoming")?))?;

    let mut preparer = MatchingPreparer::from_config(&config);
    if let Some(keys) = selected_keys(&mode, parse_arg("--keys").or_else(|| parse_arg("-k")))? {
        preparer = preparer.with_keys(keys);
    }

    match mode.as_str() {
        "full" => print_json(&preparer.prepare(&stored, &incoming)?),
        "plan" => print_json(&preparer.plan(&stored, &incoming)?),
        "threshold" => {
            print_json(&ThresholdPreparer::from_config(&config).prepare(&stored, &incoming))
        }
        other => anyhow::bail!("unknown mode: {}", other),
    }
}
