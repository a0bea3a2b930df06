//! Distance orchestrator
//!
//! Runs the matcher on every meaningful bucket of a comparison and, when a
//! bucket cannot be priced from one side alone, hands the unmatched residue of
//! all such buckets to the external solver in a single bounded-time call.
//!
//! Residues are written with their bucket index as dimension. The solver is
//! expected to report each bucket under the pair type the reference diagram's
//! shape assigns to it (bucket 1 of a two-bucket diagram is saddle-max).

use crate::matcher::{match_pairs, Exactness, MatchResult};
use crate::solver::{parse_output, ExternalSolver, SolverError, SolverInvocation};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tdacmp_common::config::SolverConfig;
use tdacmp_common::SolverMethod;
use tdacmp_formats::{write_interchange, Diagram, DiagramShape, Pair, PairType};
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub method: SolverMethod,
    pub timeout: Duration,
    pub relative_precision: Option<f64>,
    pub persistence_threshold: Option<f64>,
    pub scratch_dir: PathBuf,
}

impl From<&SolverConfig> for OrchestratorConfig {
    fn from(config: &SolverConfig) -> Self {
        Self {
            method: config.method,
            timeout: config.timeout(),
            relative_precision: config.relative_precision,
            persistence_threshold: config.persistence_threshold,
            scratch_dir: config.scratch_dir(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&SolverConfig::default())
    }
}

/// Result of comparing diagram B against reference A
#[derive(Debug)]
pub struct Comparison {
    /// Shape of the reference diagram
    pub shape: DiagramShape,
    /// One entry per non-empty reference bucket
    pub results: Vec<MatchResult>,
    /// Set when delegated buckets could not be solved
    pub solver_error: Option<SolverError>,
}

impl Comparison {
    /// Distances of every priced pair type
    pub fn distances(&self) -> BTreeMap<PairType, f64> {
        self.results
            .iter()
            .filter_map(|r| r.distance.map(|d| (r.pair_type, d)))
            .collect()
    }

    /// Every bucket has a distance
    pub fn is_complete(&self) -> bool {
        self.results.iter().all(|r| r.distance.is_some())
    }

    pub fn result(&self, pair_type: PairType) -> Option<&MatchResult> {
        self.results.iter().find(|r| r.pair_type == pair_type)
    }

    /// The solver failure for timeout reporting
    pub fn timed_out(&self) -> Option<u64> {
        match self.solver_error {
            Some(SolverError::Timeout { secs }) => Some(secs),
            _ => None,
        }
    }
}

/// Combines the matcher with the external solver
pub struct DistanceOrchestrator {
    solver: Arc<dyn ExternalSolver>,
    config: OrchestratorConfig,
}

impl DistanceOrchestrator {
    pub fn new(solver: Arc<dyn ExternalSolver>, config: OrchestratorConfig) -> Self {
        Self { solver, config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Compare B against the reference A, bucket by bucket
    ///
    /// Never fails: a solver failure leaves the delegated buckets
    /// [`Exactness::Unavailable`] and is kept in [`Comparison::solver_error`].
    pub async fn compare(&self, a: &Diagram, b: &Diagram) -> Comparison {
        let shape = a.shape();
        let mut results: Vec<MatchResult> = shape
            .pair_types()
            .iter()
            .filter(|(bucket, _)| !a.bucket(*bucket).is_empty())
            .map(|&(bucket, pair_type)| {
                let result = match_pairs(pair_type, bucket, a.bucket(bucket), b.bucket(bucket));
                debug!(
                    pair_type = %shape.bucket_label(bucket),
                    exactness = ?result.exactness,
                    unmatched_a = result.unmatched_a.len(),
                    unmatched_b = result.unmatched_b.len(),
                    "Matched bucket"
                );
                result
            })
            .collect();

        let delegated: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, r)| r.needs_solver())
            .map(|(i, _)| i)
            .collect();
        if delegated.is_empty() {
            return Comparison {
                shape,
                results,
                solver_error: None,
            };
        }

        let (residue_a, residue_b, expected) = residues(&results, &delegated);
        let solver_error = match self.solve(&residue_a, &residue_b, &expected).await {
            Ok(distances) => {
                for &i in &delegated {
                    let result = &mut results[i];
                    match distances.get(&result.pair_type) {
                        Some(&d) => result.resolve(d, Exactness::Solved),
                        None => result.mark_unavailable(),
                    }
                }
                None
            }
            Err(e) => {
                warn!(error = %e, buckets = delegated.len(), "Exact solver failed, distances unavailable");
                for &i in &delegated {
                    results[i].mark_unavailable();
                }
                Some(e)
            }
        };

        Comparison {
            shape,
            results,
            solver_error,
        }
    }

    /// Exact distance between two full diagrams
    pub async fn exact_distance(
        &self,
        a: &Diagram,
        b: &Diagram,
    ) -> Result<BTreeMap<PairType, f64>, SolverError> {
        let shape = a.shape();
        let expected: Vec<PairType> = shape
            .pair_types()
            .iter()
            .filter(|(bucket, _)| !a.bucket(*bucket).is_empty())
            .map(|(_, pair_type)| *pair_type)
            .collect();
        self.solve(a, b, &expected).await
    }

    async fn solve(
        &self,
        a: &Diagram,
        b: &Diagram,
        expected: &[PairType],
    ) -> Result<BTreeMap<PairType, f64>, SolverError> {
        let id = Uuid::new_v4();
        let dir = &self.config.scratch_dir;
        let file_a = dir.join(format!("tdacmp_{}_a.gudhi", id));
        let file_b = dir.join(format!("tdacmp_{}_b.gudhi", id));

        let outcome = self.run_with_files(a, b, &file_a, &file_b, expected).await;
        remove_scratch(&file_a).await;
        remove_scratch(&file_b).await;
        let stdout = outcome?;
        parse_output(self.config.method, &stdout, expected)
    }

    async fn run_with_files(
        &self,
        a: &Diagram,
        b: &Diagram,
        file_a: &Path,
        file_b: &Path,
        expected: &[PairType],
    ) -> Result<String, SolverError> {
        tokio::fs::write(file_a, write_interchange(a)).await?;
        tokio::fs::write(file_b, write_interchange(b)).await?;

        let invocation = SolverInvocation {
            method: self.config.method,
            file_a: file_a.to_path_buf(),
            file_b: file_b.to_path_buf(),
            expected: expected.to_vec(),
            relative_precision: self.config.relative_precision,
            persistence_threshold: self.config.persistence_threshold,
        };
        match timeout(self.config.timeout, self.solver.run(&invocation)).await {
            Ok(result) => result,
            Err(_) => Err(SolverError::Timeout {
                secs: self.config.timeout.as_secs(),
            }),
        }
    }
}

async fn remove_scratch(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove scratch file");
        }
    }
}

/// Residue diagrams of the delegated buckets and their expected pair types
fn residues(results: &[MatchResult], delegated: &[usize]) -> (Diagram, Diagram, Vec<PairType>) {
    let mut buckets_a: [Vec<Pair>; 3] = Default::default();
    let mut buckets_b: [Vec<Pair>; 3] = Default::default();
    let mut expected = Vec::with_capacity(delegated.len());
    for &i in delegated {
        let r = &results[i];
        buckets_a[r.bucket] = r.unmatched_a.clone();
        buckets_b[r.bucket] = r.unmatched_b.clone();
        expected.push(r.pair_type);
    }
    (
        Diagram::from_buckets(buckets_a),
        Diagram::from_buckets(buckets_b),
        expected,
    )
}
