// run / validate / normalize commands

use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use streetlink_arbiter::{ArbiterSettings, LlmArbiter};
use streetlink_linker::normalize::{normalize, normalize_locality, NormalizationRules};
use streetlink_linker::{load, run, Arbiter, FinalMapping, LinkConfig, LinkInput, LinkResult};

use crate::exit_codes::EXIT_NO_DATA;
use crate::CliError;

pub struct RunArgs {
    pub config: PathBuf,
    pub output: Option<PathBuf>,
    pub json: bool,
    pub locality: Option<String>,
    pub all_localities: bool,
    pub no_arbiter: bool,
    pub quiet: bool,
}

/// A parsed config plus what is needed to read the rest of the run.
pub struct LoadedConfig {
    pub config: LinkConfig,
    /// Raw TOML, re-read by the arbiter for its own settings
    pub raw: String,
    /// Directory data paths are resolved against
    pub base_dir: PathBuf,
}

pub fn load_config(path: &Path) -> Result<LoadedConfig, CliError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| CliError::usage(format!("cannot read config {}: {}", path.display(), e)))?;
    let config = LinkConfig::from_toml(&raw).map_err(CliError::link)?;
    let base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    tracing::debug!("config '{}' loaded from {}", config.name, path.display());
    Ok(LoadedConfig { config, raw, base_dir })
}

/// Resolve a data path from the config against the config's directory.
pub fn resolve_path(base_dir: &Path, file: &str) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn read_data(base_dir: &Path, file: &str, what: &str) -> Result<String, CliError> {
    let path = resolve_path(base_dir, file);
    std::fs::read_to_string(&path).map_err(|e| {
        CliError::usage(format!("cannot read {} file {}: {}", what, path.display(), e))
            .with_hint("data paths are relative to the config file")
    })
}

pub fn load_data(loaded: &LoadedConfig) -> Result<LinkInput, CliError> {
    let config = &loaded.config;
    let registry = read_data(&loaded.base_dir, &config.registry.file, "registry")?;
    let segments = read_data(&loaded.base_dir, &config.segments.file, "segments")?;
    load::load_input(&registry, &config.registry, &segments, &config.segments).map_err(CliError::link)
}

fn build_arbiter(raw: &str) -> Result<Option<LlmArbiter>, CliError> {
    let settings = ArbiterSettings::from_toml(raw).map_err(CliError::arbiter)?;
    LlmArbiter::from_settings(&settings).map_err(CliError::arbiter)
}

// ============================================================================
// run
// ============================================================================

pub fn cmd_run(args: RunArgs) -> Result<(), CliError> {
    let mut loaded = load_config(&args.config)?;
    if args.all_localities {
        loaded.config.locality = None;
    } else if let Some(locality) = args.locality {
        loaded.config.locality = Some(locality);
    }

    let input = load_data(&loaded)?;
    let arbiter = if args.no_arbiter { None } else { build_arbiter(&loaded.raw)? };
    if let Some(a) = &arbiter {
        tracing::info!("arbitration via {}", a.name());
    }

    let result = run(
        &loaded.config,
        &input,
        arbiter.as_ref().map(|a| a as &dyn Arbiter),
    )
    .map_err(CliError::link)?;

    if let Some(path) = &args.output {
        let file = std::fs::File::create(path)
            .map_err(|e| CliError::usage(format!("cannot create {}: {}", path.display(), e)))?;
        write_mapping_csv(&result.mapping, file)?;
    }

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .map_err(|e| CliError::io(format!("JSON serialization failed: {}", e)))?;
        println!("{}", json);
    } else if args.output.is_none() {
        write_mapping_csv(&result.mapping, io::stdout().lock())?;
    }

    if !args.quiet {
        print_summary(&result);
    }
    Ok(())
}

pub fn write_mapping_csv<W: Write>(mapping: &FinalMapping, out: W) -> Result<(), CliError> {
    let mut wtr = csv::Writer::from_writer(out);
    if mapping.is_empty() {
        wtr.write_record(["segment_id", "segment_name", "official_id"])
            .map_err(|e| CliError::io(format!("CSV write failed: {}", e)))?;
    }
    for row in &mapping.rows {
        wtr.serialize(row)
            .map_err(|e| CliError::io(format!("CSV write failed: {}", e)))?;
    }
    wtr.flush()
        .map_err(|e| CliError::io(format!("CSV write failed: {}", e)))
}

fn print_summary(result: &LinkResult) {
    let s = &result.summary;
    eprintln!(
        "{}: {}/{} segments mapped ({} confident, {} resolved)",
        result.meta.locality.as_deref().unwrap_or("all localities"),
        s.mapped,
        s.segments,
        s.confident,
        s.resolved
    );
    eprintln!(
        "  needs resolution: {} ({} unresolved), missing: {}, rejected rows: {}",
        s.needs_resolution, s.unresolved, s.missing, s.rejected_records
    );
    for (reason, count) in &s.unresolved_reasons {
        eprintln!("  unresolved/{}: {}", reason, count);
    }
}

// ============================================================================
// validate
// ============================================================================

#[derive(Debug, Serialize)]
struct ValidateReport {
    config_name: String,
    locality: Option<String>,
    registry_streets: usize,
    segments: usize,
    rejected_records: usize,
    segments_in_scope: usize,
    localities: BTreeMap<String, LocalityCounts>,
    arbiter_provider: String,
}

#[derive(Debug, Default, Serialize)]
struct LocalityCounts {
    registry_streets: usize,
    segments: usize,
}

pub fn cmd_validate(config_path: PathBuf, json: bool) -> Result<(), CliError> {
    let loaded = load_config(&config_path)?;
    let input = load_data(&loaded)?;
    let settings = ArbiterSettings::from_toml(&loaded.raw).map_err(CliError::arbiter)?;

    // Keyed by normalized locality, displayed with the first spelling seen.
    let mut localities: BTreeMap<String, (String, LocalityCounts)> = BTreeMap::new();
    for record in &input.registry {
        localities
            .entry(normalize_locality(record.locality()))
            .or_insert_with(|| (record.locality().to_string(), LocalityCounts::default()))
            .1
            .registry_streets += 1;
    }
    for segment in &input.segments {
        localities
            .entry(normalize_locality(segment.locality()))
            .or_insert_with(|| (segment.locality().to_string(), LocalityCounts::default()))
            .1
            .segments += 1;
    }

    let target = loaded.config.locality.as_deref().map(normalize_locality);
    let segments_in_scope = match &target {
        Some(key) => localities.get(key).map(|(_, c)| c.segments).unwrap_or(0),
        None => input.segments.len(),
    };

    let report = ValidateReport {
        config_name: loaded.config.name.clone(),
        locality: loaded.config.locality.clone(),
        registry_streets: input.registry.len(),
        segments: input.segments.len(),
        rejected_records: input.rejected_records,
        segments_in_scope,
        localities: localities.into_values().collect(),
        arbiter_provider: settings.provider.name().to_string(),
    };

    if json {
        let out = serde_json::to_string_pretty(&report)
            .map_err(|e| CliError::io(format!("JSON serialization failed: {}", e)))?;
        println!("{}", out);
    } else {
        println!("config:           {}", report.config_name);
        println!("locality:         {}", report.locality.as_deref().unwrap_or("(all)"));
        println!("registry streets: {}", report.registry_streets);
        println!("segments:         {}", report.segments);
        println!("rejected rows:    {}", report.rejected_records);
        println!("in scope:         {}", report.segments_in_scope);
        println!("arbiter:          {}", report.arbiter_provider);
        println!();
        println!("{:<24} {:>9} {:>9}", "LOCALITY", "REGISTRY", "SEGMENTS");
        for (name, counts) in &report.localities {
            println!("{:<24} {:>9} {:>9}", name, counts.registry_streets, counts.segments);
        }
    }

    if report.segments_in_scope == 0 {
        return Err(CliError {
            code: EXIT_NO_DATA,
            message: format!(
                "no data available for this locality: '{}'",
                report.locality.as_deref().unwrap_or("(all)")
            ),
            hint: None,
        });
    }
    Ok(())
}

// ============================================================================
// normalize
// ============================================================================

#[derive(Debug, Serialize)]
struct NormalizedName {
    input: String,
    normalized: String,
}

pub fn cmd_normalize(names: Vec<String>, config: Option<PathBuf>, json: bool) -> Result<(), CliError> {
    let rules = match config {
        Some(path) => load_config(&path)?.config.normalize.rules().map_err(CliError::link)?,
        None => NormalizationRules::default(),
    };

    let inputs = if names.is_empty() {
        io::stdin()
            .lock()
            .lines()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CliError::io(format!("cannot read stdin: {}", e)))?
    } else {
        names
    };

    let results: Vec<NormalizedName> = inputs
        .into_iter()
        .map(|input| {
            let normalized = normalize(&input, &rules);
            NormalizedName { input, normalized }
        })
        .collect();

    if json {
        let out = serde_json::to_string_pretty(&results)
            .map_err(|e| CliError::io(format!("JSON serialization failed: {}", e)))?;
        println!("{}", out);
    } else {
        for r in &results {
            println!("{}", r.normalized);
        }
    }
    Ok(())
}
