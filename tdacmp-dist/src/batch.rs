//! Family batch runner
//!
//! A family is every diagram of one dataset, produced by different backends,
//! sharing a file-name stem: `<stem>_<backend>.<ext>`. Each sibling is
//! compared against the reference backend's diagram and the JSON report is
//! rewritten after every comparison, so an interrupted batch leaves a valid
//! file behind.

use crate::orchestrator::{Comparison, DistanceOrchestrator};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tdacmp_common::config::BatchConfig;
use tdacmp_common::fs::write_json_atomic;
use tdacmp_formats::{load_diagram, DecodeOptions, Diagram, PairType};
use thiserror::Error;
use tracing::{error, info, warn};
use walkdir::WalkDir;

/// Aggregate report written by directory mode
pub const AGGREGATE_REPORT: &str = "distances.json";

/// Fatal batch conditions
#[derive(Debug, Error)]
pub enum BatchError {
    /// Reference diagram path does not exist
    #[error("Reference diagram not found: {0}")]
    ReferenceNotFound(PathBuf),

    /// File name has no `_<backend>` suffix
    #[error("Cannot derive a dataset stem from {0}")]
    InvalidName(PathBuf),

    /// No family member carries the reference backend tag
    #[error("No diagram tagged '_{backend}' in family '{stem}'")]
    NoReference { stem: String, backend: String },

    /// Directory mode input is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Output directory cannot be created
    #[error("Cannot create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Dataset stem: file stem without its last `_` segment
pub fn dataset_stem(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    stem.rsplit_once('_').map(|(head, _)| head.to_string())
}

/// Backend tag: last `_` segment of the file stem
pub fn backend_of(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    stem.rsplit_once('_').map(|(_, tail)| tail.to_string())
}

/// Stem ends with exactly `_<backend>`
fn is_tagged(path: &Path, backend: &str) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.strip_suffix(backend))
        .map_or(false, |head| head.ends_with('_'))
}

/// Reports and interrupted atomic writes are never diagrams
fn is_report_artifact(path: &Path) -> bool {
    path.extension()
        .map_or(false, |ext| ext == "json" || ext == "tmp")
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// All diagrams of one dataset, reference first
#[derive(Debug, Clone, PartialEq)]
pub struct DiagramFamily {
    pub stem: String,
    pub backend: String,
    members: Vec<PathBuf>,
}

impl DiagramFamily {
    /// Collect the siblings of `reference` in its directory
    ///
    /// Members are sorted by file name, then the first one whose stem ends
    /// with `_<backend>` is moved to the front.
    pub fn discover(reference: &Path, backend: &str) -> Result<Self, BatchError> {
        if !reference.is_file() {
            return Err(BatchError::ReferenceNotFound(reference.to_path_buf()));
        }
        let stem = dataset_stem(reference)
            .ok_or_else(|| BatchError::InvalidName(reference.to_path_buf()))?;
        let dir = match reference.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut members: Vec<PathBuf> = WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(e) => Some(e),
                Err(e) => {
                    warn!("Error accessing entry: {}", e);
                    None
                }
            })
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| !is_report_artifact(p))
            .filter(|p| dataset_stem(p).as_deref() == Some(stem.as_str()))
            .collect();

        let index = members
            .iter()
            .position(|p| is_tagged(p, backend))
            .ok_or_else(|| BatchError::NoReference {
                stem: stem.clone(),
                backend: backend.to_string(),
            })?;
        let reference = members.remove(index);
        members.insert(0, reference);

        Ok(Self {
            stem,
            backend: backend.to_string(),
            members,
        })
    }

    pub fn reference(&self) -> &Path {
        &self.members[0]
    }

    /// Every member except the reference, in file-name order
    pub fn siblings(&self) -> &[PathBuf] {
        &self.members[1..]
    }

    /// `dist_<backend>_<stem>.json`
    pub fn report_name(&self) -> String {
        format!("dist_{}_{}.json", self.backend, self.stem)
    }
}

/// A distance in a report; non-finite values are written as strings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distance(pub f64);

impl Serialize for Distance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.is_finite() {
            serializer.serialize_f64(self.0)
        } else if self.0.is_nan() {
            serializer.serialize_str("nan")
        } else if self.0 > 0.0 {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_str("-inf")
        }
    }
}

impl<'de> Deserialize<'de> for Distance {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Number(v) => Ok(Distance(v)),
            Raw::Text(s) => s
                .parse()
                .map(Distance)
                .map_err(|_| serde::de::Error::custom(format!("invalid distance '{}'", s))),
        }
    }
}

/// Outcome of one sibling comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportEntry {
    /// Solver killed after the given number of seconds
    Timeout { timeout: u64 },
    /// Any other failure
    Error { error: String },
    /// Distance per pair type of the reference
    Distances(BTreeMap<PairType, Distance>),
}

impl ReportEntry {
    pub fn from_comparison(comparison: &Comparison) -> Self {
        if let Some(secs) = comparison.timed_out() {
            return ReportEntry::Timeout { timeout: secs };
        }
        if let Some(e) = &comparison.solver_error {
            return ReportEntry::Error {
                error: e.to_string(),
            };
        }
        if !comparison.is_complete() {
            return ReportEntry::Error {
                error: "distance unavailable".to_string(),
            };
        }
        ReportEntry::Distances(
            comparison
                .distances()
                .into_iter()
                .map(|(t, d)| (t, Distance(d)))
                .collect(),
        )
    }

    pub fn error(message: impl Into<String>) -> Self {
        ReportEntry::Error {
            error: message.into(),
        }
    }

    pub fn has_distances(&self) -> bool {
        matches!(self, ReportEntry::Distances(_))
    }

    /// Sum over pair types
    pub fn total(&self) -> Option<f64> {
        match self {
            ReportEntry::Distances(map) => Some(map.values().map(|d| d.0).sum()),
            _ => None,
        }
    }
}

/// Sibling file name to comparison outcome
pub type FamilyReport = BTreeMap<String, ReportEntry>;

/// Mean summed distance per backend over one or more family reports
pub fn mean_distances<'a, I>(reports: I) -> BTreeMap<String, f64>
where
    I: IntoIterator<Item = &'a FamilyReport>,
{
    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for report in reports {
        for (name, entry) in report {
            let (Some(backend), Some(total)) = (backend_of(Path::new(name)), entry.total()) else {
                continue;
            };
            let slot = sums.entry(backend).or_insert((0.0, 0));
            slot.0 += total;
            slot.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(backend, (sum, count))| (backend, sum / count as f64))
        .collect()
}

/// Batch settings
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub reference_backend: String,
    pub output_dir: PathBuf,
    pub jobs: usize,
    pub decode: DecodeOptions,
    pub resume: bool,
}

impl From<&BatchConfig> for BatchOptions {
    fn from(config: &BatchConfig) -> Self {
        Self {
            reference_backend: config.reference_backend.clone(),
            output_dir: config.output_dir.clone(),
            jobs: config.jobs,
            decode: DecodeOptions::default().finite_only(config.finite_only),
            resume: config.resume,
        }
    }
}

/// Result of one family run
#[derive(Debug, Clone)]
pub struct FamilyOutcome {
    pub family: DiagramFamily,
    pub report_path: PathBuf,
    pub report: FamilyReport,
}

/// Runs family comparisons and maintains their reports
pub struct BatchRunner {
    orchestrator: Arc<DistanceOrchestrator>,
    options: BatchOptions,
}

impl BatchRunner {
    pub fn new(orchestrator: Arc<DistanceOrchestrator>, options: BatchOptions) -> Self {
        Self {
            orchestrator,
            options,
        }
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    async fn ensure_output_dir(&self) -> Result<(), BatchError> {
        tokio::fs::create_dir_all(&self.options.output_dir)
            .await
            .map_err(|source| BatchError::OutputDir {
                path: self.options.output_dir.clone(),
                source,
            })
    }

    /// Compare every sibling of `reference` against the family reference
    pub async fn run_family(&self, reference: &Path) -> Result<FamilyOutcome, BatchError> {
        self.ensure_output_dir().await?;
        let family = DiagramFamily::discover(reference, &self.options.reference_backend)?;
        let report_path = self.options.output_dir.join(family.report_name());

        let mut report = if self.options.resume {
            load_report(&report_path)
        } else {
            FamilyReport::new()
        };

        info!(
            family = %family.stem,
            reference = %family.reference().display(),
            siblings = family.siblings().len(),
            "Comparing diagram family"
        );

        let reference_diagram = load_diagram(family.reference(), &self.options.decode);
        for sibling in family.siblings() {
            let name = file_name(sibling);
            if self.options.resume && report.get(&name).map_or(false, ReportEntry::has_distances) {
                info!(diagram = %name, "Already compared, skipping");
                continue;
            }

            let entry = match &reference_diagram {
                Ok(a) => self.compare_sibling(a, sibling).await,
                Err(e) => ReportEntry::error(format!("reference: {}", e)),
            };
            match &entry {
                ReportEntry::Distances(map) => info!(diagram = %name, distances = ?map, "Compared diagram"),
                ReportEntry::Timeout { timeout } => warn!(diagram = %name, timeout, "Comparison timed out"),
                ReportEntry::Error { error } => warn!(diagram = %name, error = %error, "Comparison failed"),
            }
            report.insert(name, entry);

            if let Err(e) = write_json_atomic(&report_path, &report) {
                error!(path = %report_path.display(), error = %e, "Failed to write report");
            }
        }

        if family.siblings().is_empty() {
            if let Err(e) = write_json_atomic(&report_path, &report) {
                error!(path = %report_path.display(), error = %e, "Failed to write report");
            }
        }

        Ok(FamilyOutcome {
            family,
            report_path,
            report,
        })
    }

    async fn compare_sibling(&self, reference: &Diagram, sibling: &Path) -> ReportEntry {
        match load_diagram(sibling, &self.options.decode) {
            Ok(b) => {
                let comparison = self.orchestrator.compare(reference, &b).await;
                ReportEntry::from_comparison(&comparison)
            }
            Err(e) => ReportEntry::error(e.to_string()),
        }
    }

    /// Run every family of `dir` with up to `jobs` families in flight
    ///
    /// Each family writes its own report; this task alone rewrites the
    /// aggregate report as families complete.
    pub async fn run_directory(&self, dir: &Path) -> Result<BTreeMap<String, FamilyReport>, BatchError> {
        if !dir.is_dir() {
            return Err(BatchError::NotADirectory(dir.to_path_buf()));
        }
        self.ensure_output_dir().await?;
        let references = find_references(dir, &self.options.reference_backend);
        let aggregate_path = self.options.output_dir.join(AGGREGATE_REPORT);
        let started = Utc::now();
        info!(
            directory = %dir.display(),
            families = references.len(),
            jobs = self.options.jobs.max(1),
            started = %started.to_rfc3339(),
            "Starting distance matrix"
        );

        let mut aggregate: BTreeMap<String, FamilyReport> = BTreeMap::new();
        let mut outcomes = stream::iter(references)
            .map(|reference| async move {
                let result = self.run_family(&reference).await;
                (reference, result)
            })
            .buffer_unordered(self.options.jobs.max(1));

        while let Some((reference, result)) = outcomes.next().await {
            match result {
                Ok(outcome) => {
                    aggregate.insert(file_name(&reference), outcome.report);
                    if let Err(e) = write_json_atomic(&aggregate_path, &aggregate) {
                        error!(path = %aggregate_path.display(), error = %e, "Failed to write aggregate report");
                    }
                }
                Err(e) => warn!(reference = %reference.display(), error = %e, "Skipping family"),
            }
        }

        let elapsed = Utc::now() - started;
        info!(
            families = aggregate.len(),
            elapsed_secs = elapsed.num_seconds(),
            "Distance matrix complete"
        );
        Ok(aggregate)
    }
}

/// Reference diagrams of a directory (stem ends with `_<backend>`), sorted
pub fn find_references(dir: &Path, backend: &str) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| !is_report_artifact(p) && is_tagged(p, backend))
        .collect()
}

/// Existing report, or an empty one when absent or unreadable
pub fn load_report(path: &Path) -> FamilyReport {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return FamilyReport::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot read existing report, starting fresh");
            return FamilyReport::new();
        }
    };
    match serde_json::from_str(&text) {
        Ok(report) => report,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot parse existing report, starting fresh");
            FamilyReport::new()
        }
    }
}
