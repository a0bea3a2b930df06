//! tdacmp - persistence diagram conversion and comparison
//!
//! **Usage:**
//! ```bash
//! tdacmp compare <a> <b> [--show-diff]
//! tdacmp family <reference> [--resume] [--output-dir <dir>]
//! tdacmp matrix <dir> [--jobs <n>]
//! tdacmp convert <input> <output> --to <format>
//! tdacmp inspect <file>
//! tdacmp complex-csv <input> <output>
//! tdacmp exact <a> <b>
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tdacmp_common::config::{BatchConfig, SolverConfig};
use tdacmp_common::{logging, ConfigResolver, SolverMethod, TomlConfig};
use tdacmp_dist::batch::{mean_distances, BatchOptions, BatchRunner, ReportEntry};
use tdacmp_dist::matcher::Alignment;
use tdacmp_dist::orchestrator::{DistanceOrchestrator, OrchestratorConfig};
use tdacmp_dist::solver::ProcessSolver;
use tdacmp_formats::bytes::peek_i64;
use tdacmp_formats::complex::COMPLEX_FILE_TYPE;
use tdacmp_formats::{
    complex_to_sparse_csv, convert_diagram, decode_diagram, load_complex, load_diagram,
    Complex, DecodeOptions, DiagramFormat, DIPHA_MAGIC,
};
use tracing::{info, warn};

/// Command-line arguments for tdacmp
#[derive(Parser, Debug)]
#[command(name = "tdacmp")]
#[command(about = "Convert and compare persistence diagrams")]
#[command(version)]
struct Cli {
    /// Configuration file (overrides TDACMP_CONFIG and the per-user file)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "TDACMP_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compare diagram B against reference diagram A
    Compare {
        a: PathBuf,
        b: PathBuf,
        /// Print the pair-level differences of every bucket
        #[arg(long)]
        show_diff: bool,
        #[command(flatten)]
        solver: SolverArgs,
    },
    /// Compare every sibling of a reference diagram and write the family report
    Family {
        reference: PathBuf,
        #[command(flatten)]
        solver: SolverArgs,
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Run every family of a directory and write the aggregate report
    Matrix {
        dir: PathBuf,
        #[command(flatten)]
        solver: SolverArgs,
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Convert a diagram to another format
    Convert {
        input: PathBuf,
        output: PathBuf,
        /// Target format (binary, mesh, gudhi, diamorse)
        #[arg(long)]
        to: DiagramFormat,
    },
    /// Describe a complex or diagram file
    Inspect { file: PathBuf },
    /// Export a simplicial complex as a sparse boundary matrix CSV
    ComplexCsv { input: PathBuf, output: PathBuf },
    /// Exact solver distance between two full diagrams
    Exact {
        a: PathBuf,
        b: PathBuf,
        #[command(flatten)]
        solver: SolverArgs,
    },
}

/// External solver overrides
#[derive(Args, Debug, Default)]
struct SolverArgs {
    /// Distance algorithm (auction, bottleneck)
    #[arg(long, env = "TDACMP_METHOD")]
    method: Option<SolverMethod>,

    /// Per-comparison solver budget in seconds
    #[arg(long, env = "TDACMP_TIMEOUT")]
    timeout: Option<u64>,

    /// Solver executable
    #[arg(long, env = "TDACMP_SOLVER")]
    solver: Option<String>,

    /// Relative precision passed to the auction solver
    #[arg(long, env = "TDACMP_PRECISION")]
    precision: Option<f64>,

    /// Persistence threshold passed to the bottleneck solver
    #[arg(long, env = "TDACMP_THRESHOLD")]
    threshold: Option<f64>,
}

impl SolverArgs {
    fn apply(&self, config: &mut SolverConfig) {
        if let Some(method) = self.method {
            config.method = method;
        }
        if let Some(secs) = self.timeout {
            config.timeout_secs = secs;
        }
        if let Some(program) = &self.solver {
            config.program = program.clone();
        }
        if self.precision.is_some() {
            config.relative_precision = self.precision;
        }
        if self.threshold.is_some() {
            config.persistence_threshold = self.threshold;
        }
    }
}

/// Batch overrides
#[derive(Args, Debug, Default)]
struct BatchArgs {
    /// Families compared concurrently
    #[arg(long, env = "TDACMP_JOBS")]
    jobs: Option<usize>,

    /// Skip siblings already present in an existing report
    #[arg(long, env = "TDACMP_RESUME")]
    resume: bool,

    /// Directory receiving the JSON reports
    #[arg(long, env = "TDACMP_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,
}

impl BatchArgs {
    fn apply(&self, config: &mut BatchConfig) {
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        if self.resume {
            config.resume = true;
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let resolver = ConfigResolver::new(cli.config.clone());
    let mut config = logging::bootstrap(|| resolver.resolve())
        .context("Failed to load configuration")?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    match &cli.command {
        Command::Compare { solver, .. } | Command::Exact { solver, .. } => {
            solver.apply(&mut config.solver)
        }
        Command::Family { solver, batch, .. } | Command::Matrix { solver, batch, .. } => {
            solver.apply(&mut config.solver);
            batch.apply(&mut config.batch);
        }
        _ => {}
    }
    config.validate().context("Invalid configuration")?;
    logging::init(&config.logging).context("Failed to initialise logging")?;
    info!(source = ?resolver.source(), "Configuration resolved");

    match cli.command {
        Command::Compare { a, b, show_diff, .. } => compare(&config, &a, &b, show_diff).await,
        Command::Family { reference, .. } => family(&config, &reference).await,
        Command::Matrix { dir, .. } => matrix(&config, &dir).await,
        Command::Convert { input, output, to } => convert(&input, &output, to),
        Command::Inspect { file } => inspect(&file),
        Command::ComplexCsv { input, output } => complex_csv(&input, &output),
        Command::Exact { a, b, .. } => exact(&config, &a, &b).await,
    }
}

fn orchestrator(config: &TomlConfig) -> DistanceOrchestrator {
    info!(
        program = %config.solver.program,
        method = %config.solver.method,
        timeout_secs = config.solver.timeout_secs,
        "Using external solver"
    );
    DistanceOrchestrator::new(
        Arc::new(ProcessSolver::from_config(&config.solver)),
        OrchestratorConfig::from(&config.solver),
    )
}

fn decode_options(config: &TomlConfig) -> DecodeOptions {
    DecodeOptions::default().finite_only(config.batch.finite_only)
}

async fn compare(config: &TomlConfig, a: &Path, b: &Path, show_diff: bool) -> Result<()> {
    let options = decode_options(config);
    let diagram_a = load_diagram(a, &options)
        .with_context(|| format!("Failed to read reference diagram {}", a.display()))?;
    let diagram_b = load_diagram(b, &options)
        .with_context(|| format!("Failed to read diagram {}", b.display()))?;

    let comparison = orchestrator(config).compare(&diagram_a, &diagram_b).await;
    let shape = comparison.shape;

    for result in &comparison.results {
        let label = shape.bucket_label(result.bucket);
        match result.distance {
            Some(d) => {
                let relative = result
                    .relative
                    .map(|r| format!("{:.6}", r))
                    .unwrap_or_else(|| "n/a".to_string());
                println!("{}: {} (relative {}, {:?})", label, d, relative, result.exactness);
            }
            None => println!("{}: unavailable", label),
        }
        if show_diff {
            let pairs_a = diagram_a.bucket(result.bucket);
            let pairs_b = diagram_b.bucket(result.bucket);
            print!("{}", Alignment::align(pairs_a, pairs_b).render_diff(pairs_a, pairs_b, 3));
        }
    }

    if let Some(e) = &comparison.solver_error {
        warn!(error = %e, "Some distances are unavailable");
    }
    let entry = ReportEntry::from_comparison(&comparison);
    println!("{}", serde_json::to_string(&entry)?);
    Ok(())
}

async fn family(config: &TomlConfig, reference: &Path) -> Result<()> {
    let runner = BatchRunner::new(
        Arc::new(orchestrator(config)),
        BatchOptions::from(&config.batch),
    );
    let outcome = runner
        .run_family(reference)
        .await
        .with_context(|| format!("Family run failed for {}", reference.display()))?;

    println!("Report: {}", outcome.report_path.display());
    for (backend, mean) in mean_distances([&outcome.report]) {
        println!("{}: {}", backend, mean);
    }
    Ok(())
}

async fn matrix(config: &TomlConfig, dir: &Path) -> Result<()> {
    let runner = BatchRunner::new(
        Arc::new(orchestrator(config)),
        BatchOptions::from(&config.batch),
    );
    let reports = runner
        .run_directory(dir)
        .await
        .with_context(|| format!("Distance matrix failed for {}", dir.display()))?;

    println!("{} families compared", reports.len());
    for (backend, mean) in mean_distances(reports.values()) {
        println!("{}: {}", backend, mean);
    }
    Ok(())
}

fn convert(input: &Path, output: &Path, to: DiagramFormat) -> Result<()> {
    let bytes = std::fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let converted = convert_diagram(&bytes, to, &DecodeOptions::default())
        .with_context(|| format!("Failed to convert {}", input.display()))?;
    std::fs::write(output, converted)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!(input = %input.display(), output = %output.display(), format = %to, "Converted diagram");
    Ok(())
}

fn inspect(path: &Path) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;

    if peek_i64(&bytes, 0) == Some(DIPHA_MAGIC) && peek_i64(&bytes, 8) == Some(COMPLEX_FILE_TYPE) {
        let complex = Complex::decode(&bytes)
            .with_context(|| format!("Invalid complex {}", path.display()))?;
        print!("{}", complex.describe());
        return Ok(());
    }

    let format = DiagramFormat::sniff(&bytes)?;
    let diagram = decode_diagram(&bytes, &DecodeOptions::default().keep_diagonal(true))
        .with_context(|| format!("Invalid diagram {}", path.display()))?;
    println!("Format: {}", format);
    print!("{}", diagram.summary());
    if !diagram.diagonal().is_empty() {
        println!("Diagonal records: {}", diagram.diagonal().len());
    }
    Ok(())
}

fn complex_csv(input: &Path, output: &Path) -> Result<()> {
    let complex = load_complex(input).with_context(|| format!("Failed to read complex {}", input.display()))?;
    let csv = complex_to_sparse_csv(&complex)?;
    std::fs::write(output, csv).with_context(|| format!("Failed to write {}", output.display()))?;
    info!(input = %input.display(), output = %output.display(), cells = complex.cell_count(), "Wrote sparse boundary matrix");
    Ok(())
}

async fn exact(config: &TomlConfig, a: &Path, b: &Path) -> Result<()> {
    let options = decode_options(config);
    let diagram_a = load_diagram(a, &options)
        .with_context(|| format!("Failed to read reference diagram {}", a.display()))?;
    let diagram_b = load_diagram(b, &options)
        .with_context(|| format!("Failed to read diagram {}", b.display()))?;
    if diagram_a.is_empty() {
        bail!("Reference diagram {} has no pairs", a.display());
    }

    let distances = orchestrator(config)
        .exact_distance(&diagram_a, &diagram_b)
        .await
        .context("Exact solver failed")?;
    for (pair_type, d) in distances {
        println!("{}: {}", pair_type.label(), d);
    }
    Ok(())
}
