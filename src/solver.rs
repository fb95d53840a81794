use crate::{error::SolveErr, partition::Partition};

/// The caller-supplied per-partition solver.
///
/// Given the consensus snapshot captured at submission time and the
/// partition's data, produces the next local parameter estimate. Must be
/// a pure, deterministic computation over its inputs; a failure is
/// reported as a `SolveErr`, never by panicking the driver.
pub trait LocalSolver: Send + Sync + 'static {
    /// Computes a new local estimate for one partition.
    ///
    /// # Args
    /// * `z` - The global consensus vector at submission time.
    /// * `local` - The last local estimate for this partition.
    /// * `dual` - The dual variable for this partition.
    /// * `rho` - The ADMM penalty parameter.
    /// * `partition` - The partition's immutable data.
    fn solve(
        &self,
        z: &[f64],
        local: &[f64],
        dual: &[f64],
        rho: f64,
        partition: &Partition,
    ) -> Result<Vec<f64>, SolveErr>;
}

impl<F> LocalSolver for F
where
    F: Fn(&[f64], &[f64], &[f64], f64, &Partition) -> Result<Vec<f64>, SolveErr>
        + Send
        + Sync
        + 'static,
{
    fn solve(
        &self,
        z: &[f64],
        local: &[f64],
        dual: &[f64],
        rho: f64,
        partition: &Partition,
    ) -> Result<Vec<f64>, SolveErr> {
        self(z, local, dual, rho, partition)
    }
}
