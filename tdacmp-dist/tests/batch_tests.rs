//! Family and directory batch runs against a fake solver

use async_trait::async_trait;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tdacmp_dist::batch::{load_report, AGGREGATE_REPORT};
use tdacmp_dist::{
    mean_distances, BatchOptions, BatchRunner, DistanceOrchestrator, ExternalSolver,
    OrchestratorConfig, ReportEntry, SolverError, SolverInvocation,
};
use tdacmp_formats::{encode_diagram, DecodeOptions, Diagram, DiagramFormat, Pair};
use tempfile::TempDir;

struct CountingSolver {
    stdout: &'static str,
    calls: AtomicUsize,
}

#[async_trait]
impl ExternalSolver for CountingSolver {
    async fn run(&self, _invocation: &SolverInvocation) -> Result<String, SolverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.stdout.to_string())
    }
}

struct HangingSolver;

#[async_trait]
impl ExternalSolver for HangingSolver {
    async fn run(&self, _invocation: &SolverInvocation) -> Result<String, SolverError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(String::new())
    }
}

fn diagram(pairs: &[(f64, f64)]) -> Diagram {
    Diagram::from_buckets([
        pairs.iter().copied().map(Pair::from).collect(),
        vec![],
        vec![],
    ])
}

fn write_diagram(dir: &Path, name: &str, pairs: &[(f64, f64)], format: DiagramFormat) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, encode_diagram(&diagram(pairs), format)).unwrap();
    path
}

/// Reference plus four siblings covering every report outcome
fn family_dir(dir: &Path, stem: &str) -> PathBuf {
    let reference = write_diagram(
        dir,
        &format!("{}_Dipha.dipha", stem),
        &[(0.0, 1.0), (0.0, 2.0)],
        DiagramFormat::Binary,
    );
    write_diagram(
        dir,
        &format!("{}_Gudhi.gudhi", stem),
        &[(0.0, 1.0), (0.0, 2.0)],
        DiagramFormat::Gudhi,
    );
    write_diagram(dir, &format!("{}_TTK.vtk", stem), &[(0.0, 1.0)], DiagramFormat::Mesh);
    write_diagram(
        dir,
        &format!("{}_Slow.gudhi", stem),
        &[(0.0, 1.0), (0.0, 3.0)],
        DiagramFormat::Gudhi,
    );
    fs::write(dir.join(format!("{}_Broken.gudhi", stem)), "x y\n").unwrap();
    reference
}

fn runner(solver: Arc<dyn ExternalSolver>, output_dir: &Path, timeout_secs: u64, resume: bool) -> BatchRunner {
    let orchestrator = DistanceOrchestrator::new(
        solver,
        OrchestratorConfig {
            timeout: Duration::from_secs(timeout_secs),
            scratch_dir: std::env::temp_dir(),
            ..OrchestratorConfig::default()
        },
    );
    BatchRunner::new(
        Arc::new(orchestrator),
        BatchOptions {
            reference_backend: "Dipha".to_string(),
            output_dir: output_dir.to_path_buf(),
            jobs: 2,
            decode: DecodeOptions::default().finite_only(true),
            resume,
        },
    )
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_family_report_covers_every_outcome() {
    let dir = TempDir::new().unwrap();
    let reference = family_dir(dir.path(), "sea_expl");
    let out = dir.path().join("reports");
    let solver = Arc::new(CountingSolver {
        stdout: "Min-saddle cost : 0.5\n",
        calls: AtomicUsize::new(0),
    });

    let outcome = runner(solver.clone(), &out, 5, false)
        .run_family(&reference)
        .await
        .unwrap();

    assert_eq!(outcome.report_path, out.join("dist_Dipha_sea_expl.json"));
    let report = read_json(&outcome.report_path);
    let names: Vec<&String> = report.as_object().unwrap().keys().collect();
    assert_eq!(
        names,
        ["sea_expl_Broken.gudhi", "sea_expl_Gudhi.gudhi", "sea_expl_Slow.gudhi", "sea_expl_TTK.vtk"]
    );
    assert_eq!(report["sea_expl_Gudhi.gudhi"], json!({"min-sad": 0.0}));
    assert_eq!(report["sea_expl_Slow.gudhi"], json!({"min-sad": 0.5}));
    let ttk = report["sea_expl_TTK.vtk"]["min-sad"].as_f64().unwrap();
    assert!((ttk - 2f64.sqrt()).abs() < 1e-12);
    assert!(report["sea_expl_Broken.gudhi"]["error"].is_string());
    assert_eq!(solver.calls.load(Ordering::SeqCst), 1);
    assert!(!out.join("dist_Dipha_sea_expl.json.tmp").exists());
}

#[tokio::test]
async fn test_family_timeout_recorded_in_report() {
    let dir = TempDir::new().unwrap();
    let reference = write_diagram(dir.path(), "ds_Dipha.dipha", &[(0.0, 2.0)], DiagramFormat::Binary);
    write_diagram(dir.path(), "ds_Slow.gudhi", &[(0.0, 3.0)], DiagramFormat::Gudhi);

    let outcome = runner(Arc::new(HangingSolver), dir.path(), 1, false)
        .run_family(&reference)
        .await
        .unwrap();

    assert_eq!(outcome.report["ds_Slow.gudhi"], ReportEntry::Timeout { timeout: 1 });
    assert_eq!(
        read_json(&outcome.report_path),
        json!({"ds_Slow.gudhi": {"timeout": 1}})
    );
}

#[tokio::test]
async fn test_resume_skips_completed_siblings() {
    let dir = TempDir::new().unwrap();
    let reference = family_dir(dir.path(), "ds");
    let solver = Arc::new(CountingSolver {
        stdout: "Min-saddle cost : 0.5\n",
        calls: AtomicUsize::new(0),
    });

    runner(solver.clone(), dir.path(), 5, false)
        .run_family(&reference)
        .await
        .unwrap();
    assert_eq!(solver.calls.load(Ordering::SeqCst), 1);

    let outcome = runner(solver.clone(), dir.path(), 5, true)
        .run_family(&reference)
        .await
        .unwrap();

    assert_eq!(solver.calls.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.report.len(), 4);
    assert!(outcome.report["ds_Slow.gudhi"].has_distances());
    assert!(!outcome.report["ds_Broken.gudhi"].has_distances());
}

#[tokio::test]
async fn test_unreadable_reference_marks_every_sibling() {
    let dir = TempDir::new().unwrap();
    let reference = dir.path().join("ds_Dipha.gudhi");
    fs::write(&reference, "0 nope 1\n").unwrap();
    write_diagram(dir.path(), "ds_Gudhi.gudhi", &[(0.0, 1.0)], DiagramFormat::Gudhi);
    write_diagram(dir.path(), "ds_TTK.vtk", &[(0.0, 1.0)], DiagramFormat::Mesh);

    let outcome = runner(Arc::new(HangingSolver), dir.path(), 1, false)
        .run_family(&reference)
        .await
        .unwrap();

    assert_eq!(outcome.report.len(), 2);
    for entry in outcome.report.values() {
        match entry {
            ReportEntry::Error { error } => assert!(error.starts_with("reference")),
            other => panic!("unexpected entry {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_directory_run_writes_aggregate() {
    let dir = TempDir::new().unwrap();
    family_dir(dir.path(), "alpha");
    family_dir(dir.path(), "beta");
    let out = dir.path().join("reports");
    let solver = Arc::new(CountingSolver {
        stdout: "Min-saddle cost : 0.5\n",
        calls: AtomicUsize::new(0),
    });

    let reports = runner(solver.clone(), &out, 5, false)
        .run_directory(dir.path())
        .await
        .unwrap();

    assert_eq!(
        reports.keys().collect::<Vec<_>>(),
        ["alpha_Dipha.dipha", "beta_Dipha.dipha"]
    );
    assert!(out.join("dist_Dipha_alpha.json").exists());
    assert!(out.join("dist_Dipha_beta.json").exists());
    let aggregate = read_json(&out.join(AGGREGATE_REPORT));
    assert_eq!(aggregate["beta_Dipha.dipha"]["beta_Slow.gudhi"], json!({"min-sad": 0.5}));
    let alpha = load_report(&out.join("dist_Dipha_alpha.json"));
    assert_eq!(alpha.len(), reports["alpha_Dipha.dipha"].len());
    assert_eq!(alpha["alpha_Slow.gudhi"], reports["alpha_Dipha.dipha"]["alpha_Slow.gudhi"]);
    assert_eq!(solver.calls.load(Ordering::SeqCst), 2);

    let means = mean_distances(reports.values());
    assert_eq!(means["Gudhi"], 0.0);
    assert_eq!(means["Slow"], 0.5);
    assert!(!means.contains_key("Broken"));
}

#[tokio::test]
async fn test_output_dir_failure_is_fatal() {
    let dir = TempDir::new().unwrap();
    let reference = family_dir(dir.path(), "ds");
    let blocker = dir.path().join("file");
    fs::write(&blocker, "").unwrap();

    let result = runner(Arc::new(HangingSolver), &blocker.join("out"), 1, false)
        .run_family(&reference)
        .await;

    assert!(matches!(result, Err(tdacmp_dist::BatchError::OutputDir { .. })));
}

#[tokio::test]
async fn test_directory_run_ignores_lookalike_backends_and_stale_files() {
    let dir = TempDir::new().unwrap();
    family_dir(dir.path(), "alpha");
    write_diagram(
        dir.path(),
        "alpha_Dipha_MPI.dipha",
        &[(0.0, 1.0), (0.0, 2.0)],
        DiagramFormat::Binary,
    );
    fs::write(dir.path().join("dist_Dipha_alpha.json.tmp"), "{").unwrap();
    fs::write(dir.path().join("alpha_TTK.vtk.tmp"), "").unwrap();
    let solver = Arc::new(CountingSolver {
        stdout: "Min-saddle cost : 0.5\n",
        calls: AtomicUsize::new(0),
    });

    let reports = runner(solver.clone(), dir.path(), 5, false)
        .run_directory(dir.path())
        .await
        .unwrap();

    assert_eq!(reports.keys().collect::<Vec<_>>(), ["alpha_Dipha.dipha"]);
    let siblings: Vec<&String> = reports["alpha_Dipha.dipha"].keys().collect();
    assert_eq!(
        siblings,
        ["alpha_Broken.gudhi", "alpha_Gudhi.gudhi", "alpha_Slow.gudhi", "alpha_TTK.vtk"]
    );
    assert_eq!(solver.calls.load(Ordering::SeqCst), 1);
    assert!(!dir.path().join("dist_Dipha_alpha.json.tmp").exists());
    assert!(!dir.path().join("dist_Dipha_alpha_Dipha.json").exists());
}
