//! lazyetl CLI: run, explain, and validate pipelines; inspect their output.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use lazyetl_core::config::{ConfigOverrides, EngineConfig};
use lazyetl_core::dag::{Compression, LogicalPlan};
use lazyetl_exec::Engine;
use lazyetl_io::readers::parquet::inspect;
use lazyetl_planner::{
    explain_logical, explain_optimized, optimize, parse_yaml_pipeline, validate, Preset,
};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "lazyetl")]
#[command(about = "Lazy, streaming CSV to Parquet ETL", long_about = None)]
struct Cli {
    /// Log filter, e.g. `debug` or `lazyetl_io=debug` (default: RUST_LOG, then info)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Where the plan comes from. Without `--pipeline` a preset is used.
#[derive(Args, Debug, Clone)]
struct PlanSource {
    /// Path to a pipeline YAML file
    #[arg(short, long, conflicts_with = "preset")]
    pipeline: Option<PathBuf>,

    /// Built-in taxi pipeline: `curated` or `filtered`
    #[arg(long)]
    preset: Option<Preset>,

    /// Directory holding the source CSVs (presets only; overrides config)
    #[arg(long)]
    data_dir: Option<String>,

    /// Output codec: snappy, zstd, lz4, gzip or none (overrides the sink step)
    #[arg(long)]
    compression: Option<Compression>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a pipeline and print its run manifest
    Run {
        #[command(flatten)]
        source: PlanSource,

        /// Rows per scanned batch (overrides config)
        #[arg(long)]
        batch_rows: Option<usize>,

        /// Rows per Parquet row group (overrides config)
        #[arg(long)]
        row_group_rows: Option<usize>,
    },

    /// Show the logical and optimized plans (EXPLAIN)
    Explain {
        #[command(flatten)]
        source: PlanSource,

        /// Print the optimized plan as JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Type-check a pipeline without reading any data
    Validate {
        #[command(flatten)]
        source: PlanSource,
    },

    /// Print the schema, row count and row groups of a Parquet output file
    Inspect {
        /// Path to the Parquet file
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let result = match cli.command {
        Commands::Run {
            source,
            batch_rows,
            row_group_rows,
        } => timed("run", || run_pipeline(&source, batch_rows, row_group_rows)),
        Commands::Explain { source, json } => explain_pipeline(&source, json),
        Commands::Validate { source } => validate_pipeline(&source),
        Commands::Inspect { file } => inspect_file(&file),
    };
    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Logs go to stderr so stdout carries only command output.
fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(l) => EnvFilter::try_new(l).unwrap_or_else(|_| EnvFilter::new("info")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Run `f` and log how long it took.
fn timed<T>(task: &str, f: impl FnOnce() -> T) -> T {
    let started = Instant::now();
    let out = f();
    info!(
        task,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "finished"
    );
    out
}

/// Environment, then the pipeline's `config:` block, then CLI flags.
fn resolve_config(pipeline: &ConfigOverrides, flags: &ConfigOverrides) -> CliResult<EngineConfig> {
    let mut cfg = EngineConfig::from_env();
    cfg.apply(pipeline);
    cfg.apply(flags);
    cfg.validate()?;
    Ok(cfg)
}

/// Swap the codec of a plan that ends in a sink.
fn with_compression(plan: LogicalPlan, codec: Compression) -> LogicalPlan {
    match plan {
        LogicalPlan::Sink {
            input, destination, ..
        } => LogicalPlan::Sink {
            input,
            destination,
            compression: codec,
        },
        other => other,
    }
}

fn load_plan(source: &PlanSource, flags: ConfigOverrides) -> CliResult<(LogicalPlan, EngineConfig)> {
    let flags = ConfigOverrides {
        data_dir: source.data_dir.clone(),
        ..flags
    };
    let (plan, cfg) = match &source.pipeline {
        Some(path) => {
            let yaml = fs::read_to_string(path)
                .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
            let parsed = parse_yaml_pipeline(&yaml)?;
            let cfg = resolve_config(&parsed.config, &flags)?;
            (parsed.plan, cfg)
        }
        None => {
            let cfg = resolve_config(&ConfigOverrides::default(), &flags)?;
            let preset = source.preset.unwrap_or(Preset::Curated);
            let plan = preset.build(&cfg.data_dir, source.compression.unwrap_or_default())?;
            (plan, cfg)
        }
    };
    let plan = match source.compression {
        Some(codec) => with_compression(plan, codec),
        None => plan,
    };
    Ok((plan, cfg))
}

fn run_pipeline(
    source: &PlanSource,
    batch_rows: Option<usize>,
    row_group_rows: Option<usize>,
) -> CliResult<()> {
    let (plan, cfg) = load_plan(
        source,
        ConfigOverrides {
            batch_rows,
            row_group_rows,
            ..ConfigOverrides::default()
        },
    )?;
    if plan.sink().is_none() {
        return Err("pipeline has no sink step; nothing to run".into());
    }
    let optimized = optimize(&plan)?;
    let engine = Engine::new(cfg)?;
    let manifest = engine.run_optimized(&optimized)?;
    info!(
        rows_written = manifest.stats.rows_written,
        plan_hash = %manifest.plan_hash.short(),
        "pipeline executed"
    );
    println!("{}", serde_json::to_string_pretty(&manifest)?);
    Ok(())
}

fn explain_pipeline(source: &PlanSource, json: bool) -> CliResult<()> {
    let (plan, _) = load_plan(source, ConfigOverrides::default())?;
    let optimized = optimize(&plan)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&optimized)?);
        return Ok(());
    }
    println!("Logical plan");
    println!("============");
    print!("{}", explain_logical(&plan));
    println!();
    println!("Optimized plan");
    println!("==============");
    print!("{}", explain_optimized(&optimized));
    Ok(())
}

fn validate_pipeline(source: &PlanSource) -> CliResult<()> {
    let (plan, _) = load_plan(source, ConfigOverrides::default())?;
    let schema = validate(&plan)?;
    println!("✓ Pipeline is valid");
    for field in &schema.fields {
        let null = if field.nullable { "" } else { " not null" };
        println!("  {}: {}{}", field.name, field.data_type, null);
    }
    Ok(())
}

fn inspect_file(path: &Path) -> CliResult<()> {
    let summary = inspect(path)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(preset: Option<Preset>) -> PlanSource {
        PlanSource {
            pipeline: None,
            preset,
            data_dir: Some("trips".into()),
            compression: None,
        }
    }

    #[test]
    fn cli_flags_override_pipeline_config() {
        let pipeline = ConfigOverrides {
            batch_rows: Some(100),
            row_group_rows: Some(1000),
            ..Default::default()
        };
        let flags = ConfigOverrides {
            batch_rows: Some(7),
            ..Default::default()
        };
        let cfg = resolve_config(&pipeline, &flags).unwrap();
        assert_eq!(cfg.batch_rows, 7);
        assert_eq!(cfg.row_group_rows, 1000);
    }

    #[test]
    fn invalid_flag_values_rejected() {
        let flags = ConfigOverrides {
            batch_rows: Some(0),
            ..Default::default()
        };
        assert!(resolve_config(&ConfigOverrides::default(), &flags).is_err());
    }

    #[test]
    fn preset_uses_data_dir_and_defaults_to_curated() {
        let (plan, cfg) = load_plan(&source(None), ConfigOverrides::default()).unwrap();
        assert_eq!(cfg.data_dir, "trips");
        assert_eq!(
            plan.sink(),
            Some(("trips/nycyellotaxi.parquet", Compression::Snappy))
        );

        let (plan, _) = load_plan(&source(Some(Preset::Filtered)), ConfigOverrides::default())
            .unwrap();
        assert_eq!(plan.sink().unwrap().0, "trips/filtered.parquet");
    }

    #[test]
    fn compression_flag_rewrites_sink() {
        let mut src = source(None);
        src.compression = Some(Compression::Zstd);
        let (plan, _) = load_plan(&src, ConfigOverrides::default()).unwrap();
        assert_eq!(plan.sink().unwrap().1, Compression::Zstd);

        let scan_only = with_compression(plan.chain()[0].clone(), Compression::Lz4);
        assert!(scan_only.sink().is_none());
    }
}
