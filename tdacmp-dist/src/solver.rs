//! External distance solver boundary
//!
//! The exact transport distance is computed by a separate program. It is
//! invoked as
//!
//! ```text
//! <program> [args..] <auction|bottleneck> <file_a> <file_b> [--precision p | --threshold t]
//! ```
//!
//! with both diagrams in the `<dim> <birth> <death>` interchange format, and
//! reports one distance per pair type on stdout.

use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use tdacmp_common::config::SolverConfig;
use tdacmp_common::SolverMethod;
use tdacmp_formats::PairType;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Solver failures; none of them abort a batch
#[derive(Debug, Error)]
pub enum SolverError {
    /// Program missing or could not be spawned
    #[error("Solver unavailable: {0}")]
    Unavailable(String),

    /// Wall-clock budget exceeded; the child was killed
    #[error("Solver timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Non-zero exit
    #[error("Solver exited with status {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    /// Expected distances missing from stdout
    #[error("Unparseable solver output: {0}")]
    OutputUnparseable(String),

    /// Scratch file handling
    #[error("Solver scratch file error: {0}")]
    Io(#[from] std::io::Error),
}

/// One solver request
#[derive(Debug, Clone, PartialEq)]
pub struct SolverInvocation {
    pub method: SolverMethod,
    pub file_a: PathBuf,
    pub file_b: PathBuf,
    /// Pair types whose distance must appear in the output
    pub expected: Vec<PairType>,
    pub relative_precision: Option<f64>,
    pub persistence_threshold: Option<f64>,
}

impl SolverInvocation {
    /// Command-line arguments after the configured program arguments
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            self.method.as_str().into(),
            self.file_a.clone().into_os_string(),
            self.file_b.clone().into_os_string(),
        ];
        match self.method {
            SolverMethod::Auction => {
                if let Some(p) = self.relative_precision {
                    args.push("--precision".into());
                    args.push(p.to_string().into());
                }
            }
            SolverMethod::Bottleneck => {
                if let Some(t) = self.persistence_threshold {
                    args.push("--threshold".into());
                    args.push(t.to_string().into());
                }
            }
        }
        args
    }
}

/// Capability to run the exact solver
#[async_trait]
pub trait ExternalSolver: Send + Sync {
    /// Run to completion and return stdout
    async fn run(&self, invocation: &SolverInvocation) -> Result<String, SolverError>;
}

/// Solver running as a child process
#[derive(Debug, Clone)]
pub struct ProcessSolver {
    program: String,
    args: Vec<String>,
}

impl ProcessSolver {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &SolverConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone())
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl ExternalSolver for ProcessSolver {
    async fn run(&self, invocation: &SolverInvocation) -> Result<String, SolverError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .args(invocation.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            program = %self.program,
            method = %invocation.method,
            file_a = %invocation.file_a.display(),
            file_b = %invocation.file_b.display(),
            "Spawning solver"
        );

        let child = command.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                SolverError::Unavailable(format!("{} not found", self.program))
            }
            _ => SolverError::Unavailable(format!("failed to spawn {}: {}", self.program, e)),
        })?;
        let output = child.wait_with_output().await?;

        if !output.status.success() {
            return Err(SolverError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

const FLOAT: &str = r"[-+]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][-+]?\d+)?|[-+]?inf";

/// Extract per-pair-type distances from solver stdout
///
/// Auction output reports `<Pair-type> cost : <value>` lines; bottleneck
/// output reports `diag<Min|Sad|Max>(<value>)` tokens. The last occurrence of
/// a label wins.
pub fn parse_output(
    method: SolverMethod,
    stdout: &str,
    expected: &[PairType],
) -> Result<BTreeMap<PairType, f64>, SolverError> {
    let pattern = match method {
        SolverMethod::Auction => format!(
            r"(?P<label>Min-saddle|Saddle-saddle|Saddle-max) cost\s*:\s*(?P<value>{})",
            FLOAT
        ),
        SolverMethod::Bottleneck => format!(r"diag(?P<label>Min|Sad|Max)\((?P<value>{})\)", FLOAT),
    };
    let re = Regex::new(&pattern).map_err(|e| SolverError::OutputUnparseable(e.to_string()))?;

    let mut distances = BTreeMap::new();
    for caps in re.captures_iter(stdout) {
        let pair_type = match &caps["label"] {
            "Min-saddle" | "Min" => PairType::MinSaddle,
            "Saddle-saddle" | "Sad" => PairType::SaddleSaddle,
            _ => PairType::SaddleMax,
        };
        let value: f64 = caps["value"]
            .parse()
            .map_err(|_| SolverError::OutputUnparseable(format!("bad number '{}'", &caps["value"])))?;
        distances.insert(pair_type, value);
    }

    let missing: Vec<&str> = expected
        .iter()
        .filter(|t| !distances.contains_key(t))
        .map(|t| t.key())
        .collect();
    if !missing.is_empty() {
        return Err(SolverError::OutputUnparseable(format!(
            "no distance for {}",
            missing.join(", ")
        )));
    }
    Ok(distances)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_auction_output() {
        let stdout = "[PersistenceDiagramClustering] Min-saddle cost   : 1.5\n\
                      [PersistenceDiagramClustering] Saddle-max cost : 2e-3\n";
        let d = parse_output(
            SolverMethod::Auction,
            stdout,
            &[PairType::MinSaddle, PairType::SaddleMax],
        )
        .unwrap();
        assert_eq!(d[&PairType::MinSaddle], 1.5);
        assert_eq!(d[&PairType::SaddleMax], 0.002);
    }

    #[test]
    fn test_parse_bottleneck_output() {
        let stdout = "diagMax(4) diagMin(0.25) diagSad(12.5)";
        let d = parse_output(SolverMethod::Bottleneck, stdout, &PairType::ALL).unwrap();
        assert_eq!(d[&PairType::MinSaddle], 0.25);
        assert_eq!(d[&PairType::SaddleSaddle], 12.5);
        assert_eq!(d[&PairType::SaddleMax], 4.0);
    }

    #[test]
    fn test_missing_pair_type_is_unparseable() {
        let err = parse_output(
            SolverMethod::Auction,
            "Min-saddle cost : 1",
            &[PairType::MinSaddle, PairType::SaddleSaddle],
        )
        .unwrap_err();
        match err {
            SolverError::OutputUnparseable(msg) => assert!(msg.contains("sad-sad")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_invocation_arguments() {
        let mut invocation = SolverInvocation {
            method: SolverMethod::Bottleneck,
            file_a: PathBuf::from("/tmp/a.gudhi"),
            file_b: PathBuf::from("/tmp/b.gudhi"),
            expected: vec![PairType::MinSaddle],
            relative_precision: Some(0.01),
            persistence_threshold: Some(0.1),
        };
        let args: Vec<OsString> = invocation.args();
        assert_eq!(args, vec!["bottleneck", "/tmp/a.gudhi", "/tmp/b.gudhi", "--threshold", "0.1"]);

        invocation.method = SolverMethod::Auction;
        assert_eq!(
            invocation.args(),
            vec!["auction", "/tmp/a.gudhi", "/tmp/b.gudhi", "--precision", "0.01"]
        );
    }

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let solver = ProcessSolver::new("tdacmp-no-such-solver-binary", Vec::new());
        let invocation = SolverInvocation {
            method: SolverMethod::Auction,
            file_a: PathBuf::from("a"),
            file_b: PathBuf::from("b"),
            expected: Vec::new(),
            relative_precision: None,
            persistence_threshold: None,
        };
        assert!(matches!(
            solver.run(&invocation).await,
            Err(SolverError::Unavailable(_))
        ));
    }
}
