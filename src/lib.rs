//! Asynchronous consensus-ADMM engine.
//!
//! A single driver control flow coordinates many concurrently executing
//! local solves over data partitions. Workers never see live shared state;
//! they receive value snapshots at submission time and the driver is the
//! sole mutator of the consensus variables. Incorporation follows
//! completion order, so results computed against stale consensus values
//! are folded in as they arrive.

pub mod config;
pub mod convergence;
pub mod driver;
pub mod error;
pub mod partition;
pub mod solver;
pub mod state;
pub mod stream;
pub mod substrate;


pub use config::DriverConfig;
pub use convergence::{ConvergenceTracker, Residuals};
pub use driver::{Driver, Phase, RunReport, StopReason};
pub use error::{ConfigErr, RunErr, SolveErr, StreamErr};
pub use partition::Partition;
pub use solver::LocalSolver;
pub use state::{ConsensusState, Snapshot};
pub use stream::ResultStream;
pub use substrate::{SolverPool, Substrate, TaskHandle, TaskInput, TaskResult};
