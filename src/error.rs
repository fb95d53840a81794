use std::{error::Error, fmt};

use crate::driver::RunReport;

/// Invalid run parameters, rejected before the driver loop starts.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigErr {
    ZeroWidth,
    NoPartitions,
    RaggedPartition { index: usize, got: usize, expected: usize },
    NonPositiveRho { got: f64 },
    NegativeLambda { got: f64 },
    NegativeTolerance,
    NoStoppingCriterion,
}

impl fmt::Display for ConfigErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErr::ZeroWidth => write!(f, "concurrency width must be positive"),
            ConfigErr::NoPartitions => write!(f, "at least one data partition is required"),
            ConfigErr::RaggedPartition {
                index,
                got,
                expected,
            } => write!(
                f,
                "partition {index} has {got} columns, expected {expected}"
            ),
            ConfigErr::NonPositiveRho { got } => {
                write!(f, "penalty parameter rho must be positive, got {got}")
            }
            ConfigErr::NegativeLambda { got } => {
                write!(f, "regularization lambda must be non-negative, got {got}")
            }
            ConfigErr::NegativeTolerance => {
                write!(f, "convergence tolerances must be non-negative")
            }
            ConfigErr::NoStoppingCriterion => write!(
                f,
                "at least one of max_rounds, max_time or a positive tolerance is required"
            ),
        }
    }
}

impl Error for ConfigErr {}

/// Failure of a single local solve.
///
/// Recoverable: the driver discards the attempt and submits a fresh task
/// for a newly sampled partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolveErr {
    pub detail: String,
}

impl SolveErr {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

impl fmt::Display for SolveErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local solve failed: {}", self.detail)
    }
}

impl Error for SolveErr {}

/// Failures surfaced while draining completions from the substrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamErr {
    /// No task is outstanding and none will ever be added.
    Exhausted,
    /// The execution substrate became unreachable.
    SubstrateLost,
}

impl fmt::Display for StreamErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamErr::Exhausted => write!(f, "result stream exhausted: no outstanding tasks"),
            StreamErr::SubstrateLost => write!(f, "execution substrate became unreachable"),
        }
    }
}

impl Error for StreamErr {}

/// Fatal run failure.
///
/// Carries the partial report so completed work is still observable by
/// the caller.
#[derive(Debug)]
pub enum RunErr {
    SubstrateLost { partial: Box<RunReport> },
}

impl RunErr {
    /// The last consensus state computed before the abort.
    pub fn partial(&self) -> &RunReport {
        match self {
            RunErr::SubstrateLost { partial } => partial,
        }
    }
}

impl fmt::Display for RunErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunErr::SubstrateLost { partial } => write!(
                f,
                "execution substrate became unreachable after {} incorporations",
                partial.rounds
            ),
        }
    }
}

impl Error for RunErr {}
