use std::fs::{self, File};
use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use benchgate::artifact::{Artifact, BranchRef};
use benchgate::cache::ResultCache;
use benchgate::compare::{ComparisonReport, Thresholds, Verdict, compare};
use benchgate::digest::{compute_sha256, write_sha256};
use benchgate::observability::log_snapshot;
#[cfg(feature = "metrics-server")]
use benchgate::observability::server::MetricsServer;
use benchgate::pipeline::{PipelineController, PipelineOptions, PipelineOutcome};
use benchgate::presets::generate_preset;
use benchgate::store::ArtifactStore;
use benchgate::suite::Suite;
use benchgate::validation::validate_suite;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde_json::to_writer_pretty;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, prelude::*};

#[cfg(feature = "otel")]
use opentelemetry::KeyValue;
#[cfg(feature = "otel")]
use opentelemetry_otlp::WithExportConfig;
#[cfg(feature = "otel")]
use opentelemetry_sdk::{resource::Resource, trace as sdktrace};
#[cfg(feature = "metrics-server")]
use std::net::SocketAddr;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let otlp_endpoint_for_tracing = match &cli.command {
        Commands::Run(args) => args.otlp_endpoint.clone(),
        _ => None,
    };

    configure_tracing(otlp_endpoint_for_tracing.as_deref())?;

    let exit_code = match cli.command {
        Commands::Run(args) => run_cmd(args)?,
        Commands::Validate { suite } => {
            validate_cmd(suite)?;
            0
        }
        Commands::ListCases { suite } => {
            list_cases_cmd(suite)?;
            0
        }
        Commands::Compare(args) => {
            compare_cmd(args)?;
            0
        }
        Commands::Fetch {
            store,
            branch,
            output,
        } => {
            fetch_cmd(store, branch, output)?;
            0
        }
        Commands::Publish { store, artifact } => {
            publish_cmd(store, artifact)?;
            0
        }
        Commands::Suite { action } => {
            suite_cmd(action)?;
            0
        }
        Commands::Cache { action } => {
            cache_cmd(action)?;
            0
        }
        Commands::Digest { path, output } => {
            digest_cmd(path, output)?;
            0
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "benchgate", &mut io::stdout());
            0
        }
    };

    #[cfg(feature = "otel")]
    if otlp_endpoint_for_tracing.is_some() {
        opentelemetry::global::shutdown_tracer_provider();
    }

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

fn configure_tracing(otlp_endpoint: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    #[cfg(feature = "otel")]
    {
        if let Some(endpoint) = otlp_endpoint {
            let tracer =
                opentelemetry_otlp::new_pipeline()
                    .tracing()
                    .with_trace_config(sdktrace::Config::default().with_resource(Resource::new(
                        vec![KeyValue::new("service.name", "benchgate")],
                    )))
                    .with_exporter(
                        opentelemetry_otlp::new_exporter()
                            .tonic()
                            .with_endpoint(endpoint),
                    )
                    .install_simple()?;

            tracing_subscriber::registry()
                .with(filter.clone())
                .with(tracing_subscriber::fmt::layer())
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .try_init()
                .map_err(|err| anyhow!(err.to_string()))?;
        } else {
            tracing_subscriber::registry()
                .with(filter.clone())
                .with(tracing_subscriber::fmt::layer())
                .try_init()
                .map_err(|err| anyhow!(err.to_string()))?;
        }
    }

    #[cfg(not(feature = "otel"))]
    {
        if let Some(endpoint) = otlp_endpoint {
            eprintln!(
                "warning: --otlp-endpoint '{}' requested but OpenTelemetry support is not enabled. Rebuild with --features otel.",
                endpoint
            );
        }

        tracing_subscriber::registry()
            .with(filter.clone())
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|err| anyhow!(err.to_string()))?;
    }

    Ok(())
}

fn run_cmd(args: RunArgs) -> Result<i32> {
    if args.dry_run {
        let suite = Suite::load(&args.suite)?;
        let report = validate_suite(&suite);
        for warning in &report.warnings {
            warn!(file = %args.suite.display(), "{warning}");
        }
        if !report.is_ok() {
            for error_msg in &report.errors {
                error!(file = %args.suite.display(), "{error_msg}");
            }
            return Err(anyhow!(
                "Suite validation failed with {} error(s)",
                report.errors.len()
            ));
        }
        let cases = suite.expand_cases()?;
        info!(
            "Loaded suite with {} case(s) after expansion; baseline would be fetched from {}",
            cases.len(),
            args.store.display()
        );
        return Ok(0);
    }

    let metrics = benchgate::observability::MetricsCollector::global().clone();

    #[cfg(feature = "metrics-server")]
    let metrics_server = if let Some(addr_str) = args.metrics_listen.clone() {
        let addr: SocketAddr = addr_str
            .parse()
            .with_context(|| format!("Invalid metrics listen address: {addr_str}"))?;
        Some(MetricsServer::start(addr, metrics.clone())?)
    } else {
        None
    };

    #[cfg(not(feature = "metrics-server"))]
    if let Some(addr_str) = &args.metrics_listen {
        warn!(
            "Metrics server feature not enabled; ignoring --metrics-listen={}.",
            addr_str
        );
    }

    let options = PipelineOptions {
        suite_path: args.suite,
        branch: BranchRef::new(args.branch),
        commit: args.commit,
        sequence: args.sequence,
        store_root: args.store,
        cache_root: args.cache_dir,
        persist: args.persist,
        workdir: args.workdir,
        regression_threshold: args.regression_threshold,
        improvement_threshold: args.improvement_threshold,
        gate_override: args.gate_regressions.then_some(true),
    };

    let controller = PipelineController::new(options, metrics.clone());
    let outcome = controller.run()?;

    print_outcome(&outcome);

    if let Some(path) = args.report {
        write_json_report(&path, &outcome)?;
        info!(report = %path.display(), "Pipeline report written");
    }

    if args.print_metrics || args.metrics_json.is_some() || args.metrics_prometheus.is_some() {
        let snapshot = metrics.snapshot();
        if args.print_metrics {
            log_snapshot(&snapshot);
        }
        if let Some(path) = args.metrics_json {
            ensure_parent(&path)?;
            let file = File::create(&path)
                .with_context(|| format!("Failed to create metrics file: {}", path.display()))?;
            to_writer_pretty(file, &snapshot)
                .with_context(|| format!("Failed to write metrics JSON: {}", path.display()))?;
            info!(metrics = %path.display(), "Metrics JSON written");
        }
        if let Some(path) = args.metrics_prometheus {
            ensure_parent(&path)?;
            fs::write(&path, snapshot.to_prometheus()).with_context(|| {
                format!("Failed to write Prometheus metrics: {}", path.display())
            })?;
            info!(metrics = %path.display(), "Prometheus metrics written");
        }
    }

    #[cfg(feature = "metrics-server")]
    if let Some(mut server) = metrics_server {
        server.stop();
    }

    Ok(outcome.status.exit_code(outcome.gate_regressions))
}

fn print_outcome(outcome: &PipelineOutcome) {
    println!("Pipeline status: {}", outcome.status.label());
    print_report(&outcome.report);
    if outcome.published {
        println!("Published as new baseline for '{}'", outcome.branch);
    }
    for incident in &outcome.incidents {
        warn!(phase = incident.phase.label(), "{}", incident.message);
    }
}

fn print_report(report: &ComparisonReport) {
    let s = &report.summary;
    println!(
        "Cases: {} unchanged, {} improved, {} regressed, {} new, {} removed, {} inconclusive",
        s.unchanged, s.improved, s.regressed, s.new, s.removed, s.inconclusive
    );
    for case in &report.cases {
        if case.verdict == Verdict::Unchanged {
            continue;
        }
        let delta = case
            .delta_pct
            .map(|d| format!("{d:+.2}%"))
            .unwrap_or_else(|| "n/a".into());
        println!(
            "  {:<12} {} ({})",
            format!("{:?}", case.verdict).to_lowercase(),
            case.name,
            delta
        );
        if let Some(note) = &case.note {
            println!("               {note}");
        }
    }
}

fn validate_cmd(suite_path: PathBuf) -> Result<()> {
    let suite = Suite::load(&suite_path)?;
    let report = validate_suite(&suite);

    for warning in &report.warnings {
        warn!(file = %suite_path.display(), "{warning}");
    }

    if report.is_ok() {
        info!(file = %suite_path.display(), "Suite validation passed");
        Ok(())
    } else {
        for error_msg in &report.errors {
            error!(file = %suite_path.display(), "{error_msg}");
        }
        Err(anyhow!(
            "Suite validation failed with {} error(s)",
            report.errors.len()
        ))
    }
}

fn list_cases_cmd(suite_path: PathBuf) -> Result<()> {
    let suite = Suite::load(&suite_path)?;
    let cases = suite.expand_cases()?;
    println!("Cases in {}:", suite_path.display());
    for case in &cases {
        println!(
            "- {} ({} {}) [{}..{} rounds, {:.1}s budget]",
            case.name,
            case.command,
            case.args.join(" "),
            case.budget.min_rounds,
            case.budget.max_rounds,
            case.budget.max_seconds
        );
    }
    Ok(())
}

fn compare_cmd(args: CompareArgs) -> Result<()> {
    let baseline = Artifact::load(&args.baseline)?;
    let current = Artifact::load(&args.current)?;

    let thresholds = Thresholds {
        regression_pct: args.regression_threshold.unwrap_or(10.0),
        improvement_pct: args.improvement_threshold.unwrap_or(10.0),
    };
    let report = compare(Some(&baseline), &current, &thresholds);

    println!(
        "Comparing {} (baseline) vs {} (current)",
        baseline.commit, current.commit
    );
    print_report(&report);

    if let Some(path) = args.report {
        write_json_report(&path, &report)?;
        info!(report = %path.display(), "Comparison report written");
    }

    Ok(())
}

fn fetch_cmd(store_root: PathBuf, branch: String, output: Option<PathBuf>) -> Result<()> {
    let store = ArtifactStore::open(store_root);
    let artifact = store.fetch_latest(&BranchRef::new(branch))?;

    match output {
        Some(path) => {
            ensure_parent(&path)?;
            artifact.save(&path)?;
            info!(
                artifact = %path.display(),
                commit = artifact.commit.as_str(),
                "Latest artifact fetched"
            );
        }
        None => {
            let json = serde_json::to_string_pretty(&artifact)?;
            println!("{json}");
        }
    }
    Ok(())
}

fn publish_cmd(store_root: PathBuf, artifact_path: PathBuf) -> Result<()> {
    let artifact = Artifact::load(&artifact_path)?;
    let store = ArtifactStore::open(store_root);
    store.publish(&artifact)?;
    info!(
        branch = %artifact.branch,
        commit = artifact.commit.as_str(),
        "Artifact published"
    );
    Ok(())
}

fn suite_cmd(command: SuiteCommands) -> Result<()> {
    match command {
        SuiteCommands::New { preset, output } => {
            let destination =
                output.unwrap_or_else(|| PathBuf::from(format!("suites/{preset}.yaml")));
            let generated = generate_preset(&preset, &destination)?;
            info!(
                preset = %preset,
                path = %generated.display(),
                "Preset suite generated"
            );
            Ok(())
        }
    }
}

fn cache_cmd(command: CacheCommands) -> Result<()> {
    match command {
        CacheCommands::Info { cache_dir } => {
            let cache = ResultCache::open(cache_dir)?;
            let entries = cache.entries()?;
            if entries.is_empty() {
                println!("Cache at {} is empty", cache.root().display());
                return Ok(());
            }
            println!("Cache entries at {}:", cache.root().display());
            for entry in entries {
                println!(
                    "- {} (tool {}, created {})",
                    entry.key, entry.tool_version, entry.created_at
                );
            }
            Ok(())
        }
        CacheCommands::Clear { cache_dir } => {
            let cache = ResultCache::open(cache_dir)?;
            cache.clear()?;
            info!(cache = %cache.root().display(), "Cache cleared");
            Ok(())
        }
    }
}

fn digest_cmd(path: PathBuf, output: Option<PathBuf>) -> Result<()> {
    if let Some(out_path) = output {
        let digest = write_sha256(&path, &out_path)?;
        println!("{}  {}", digest, path.display());
        info!(
            file = %path.display(),
            digest_output = %out_path.display(),
            "SHA256 digest written"
        );
    } else {
        let digest = compute_sha256(&path)?;
        println!("{}  {}", digest, path.display());
        info!(file = %path.display(), "SHA256 computed");
    }
    Ok(())
}

fn write_json_report<T: serde::Serialize>(path: &PathBuf, value: &T) -> Result<()> {
    ensure_parent(path)?;
    let file = File::create(path)
        .with_context(|| format!("Failed to create report file: {}", path.display()))?;
    to_writer_pretty(file, value)
        .with_context(|| format!("Failed to write report JSON: {}", path.display()))?;
    Ok(())
}

fn ensure_parent(path: &PathBuf) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

#[derive(Parser)]
#[command(
    name = "benchgate",
    version,
    about = "Benchmark-regression pipeline: fetch baseline, run suite, compare, publish"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline for a triggering event
    Run(RunArgs),
    /// Validate a suite definition
    Validate { suite: PathBuf },
    /// List the expanded cases of a suite
    ListCases { suite: PathBuf },
    /// Compare two artifact files offline
    Compare(CompareArgs),
    /// Fetch the latest artifact for a branch
    Fetch {
        #[arg(long)]
        store: PathBuf,
        #[arg(long)]
        branch: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Publish an artifact file as the new baseline for its branch
    Publish {
        #[arg(long)]
        store: PathBuf,
        artifact: PathBuf,
    },
    Suite {
        #[command(subcommand)]
        action: SuiteCommands,
    },
    Cache {
        #[command(subcommand)]
        action: CacheCommands,
    },
    /// SHA256 digest of a file
    Digest {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Emit shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    suite: PathBuf,
    #[arg(long)]
    branch: String,
    #[arg(long)]
    commit: String,
    #[arg(long, default_value_t = 0)]
    sequence: u64,
    #[arg(long)]
    store: PathBuf,
    #[arg(long = "cache-dir", default_value = ".benchgate-cache")]
    cache_dir: PathBuf,
    /// Persist this run's results as the branch's new baseline
    #[arg(long)]
    persist: bool,
    #[arg(long)]
    workdir: Option<PathBuf>,
    #[arg(long)]
    report: Option<PathBuf>,
    #[arg(long = "regression-threshold")]
    regression_threshold: Option<f64>,
    #[arg(long = "improvement-threshold")]
    improvement_threshold: Option<f64>,
    /// Exit non-zero when regressions are detected
    #[arg(long = "gate-regressions")]
    gate_regressions: bool,
    #[arg(long)]
    dry_run: bool,
    #[arg(long)]
    print_metrics: bool,
    #[arg(long = "metrics-json")]
    metrics_json: Option<PathBuf>,
    #[arg(long = "metrics-prometheus")]
    metrics_prometheus: Option<PathBuf>,
    #[arg(long = "metrics-listen")]
    metrics_listen: Option<String>,
    #[arg(long = "otlp-endpoint")]
    otlp_endpoint: Option<String>,
}

#[derive(Subcommand)]
enum SuiteCommands {
    /// Generate a starter suite from a preset
    New {
        #[arg(long)]
        preset: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// List cache entries
    Info {
        #[arg(long = "cache-dir", default_value = ".benchgate-cache")]
        cache_dir: PathBuf,
    },
    /// Remove every cache entry
    Clear {
        #[arg(long = "cache-dir", default_value = ".benchgate-cache")]
        cache_dir: PathBuf,
    },
}

#[derive(clap::Args)]
struct CompareArgs {
    baseline: PathBuf,
    current: PathBuf,
    #[arg(long = "regression-threshold")]
    regression_threshold: Option<f64>,
    #[arg(long = "improvement-threshold")]
    improvement_threshold: Option<f64>,
    #[arg(long)]
    report: Option<PathBuf>,
}
