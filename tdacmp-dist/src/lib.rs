//! # tdacmp distance engine
//!
//! Compares persistence diagrams pair type by pair type:
//! - [`matcher`]: merge alignment of two sorted buckets and the cheap
//!   distance-to-diagonal estimate
//! - [`solver`]: the external exact solver process boundary
//! - [`orchestrator`]: matcher plus solver for one comparison
//! - [`batch`]: family runs and JSON reports

pub mod batch;
pub mod matcher;
pub mod orchestrator;
pub mod solver;

pub use batch::{
    mean_distances, BatchError, BatchOptions, BatchRunner, DiagramFamily, Distance, FamilyOutcome,
    FamilyReport, ReportEntry,
};
pub use matcher::{match_pairs, Alignment, Exactness, MatchResult, OpTag, Opcode};
pub use orchestrator::{Comparison, DistanceOrchestrator, OrchestratorConfig};
pub use solver::{parse_output, ExternalSolver, ProcessSolver, SolverError, SolverInvocation};
