use crate::state::ConsensusState;

/// Residuals observed after one incorporation round.
#[derive(Debug, Clone, PartialEq)]
pub struct Residuals {
    /// Round counter at observation time.
    pub round: usize,
    /// Aggregated disagreement between local estimates and the consensus.
    pub primal: f64,
    /// Change in the consensus between rounds, scaled by rho.
    pub dual: f64,
    /// Primal feasibility threshold at this round.
    pub eps_primal: f64,
    /// Dual feasibility threshold at this round.
    pub eps_dual: f64,
}

/// Records primal/dual residuals round by round and decides the
/// convergence stopping criterion.
///
/// A pure observer of `ConsensusState`: it never mutates the state and
/// keeps only its own history.
#[derive(Debug)]
pub struct ConvergenceTracker {
    abstol: f64,
    reltol: f64,
    history: Vec<Residuals>,
}

impl ConvergenceTracker {
    /// Creates a tracker with the given absolute and relative tolerances.
    pub fn new(abstol: f64, reltol: f64) -> Self {
        Self {
            abstol,
            reltol,
            history: Vec::new(),
        }
    }

    /// Computes and records the residuals for the current round.
    ///
    /// Standard ADMM consensus residuals: the primal residual stacks the
    /// per-partition disagreements `local_i - z`, the dual residual is
    /// `rho * (z - z_prev)` stacked once per partition.
    pub fn observe(&mut self, state: &ConsensusState) {
        let nchunks = state.nchunks() as f64;
        let sqrt_stacked_dim = (nchunks * state.dim() as f64).sqrt();

        let primal = state.disagreement_sq().sqrt();
        let delta_sq: f64 = state
            .consensus()
            .iter()
            .zip(state.previous_consensus())
            .map(|(z, p)| (z - p) * (z - p))
            .sum();
        let dual = state.rho() * (nchunks * delta_sq).sqrt();

        let z_norm: f64 = state.consensus().iter().map(|v| v * v).sum::<f64>().sqrt();
        let eps_primal = sqrt_stacked_dim * self.abstol
            + self.reltol * state.locals_norm().max(nchunks.sqrt() * z_norm);
        let eps_dual =
            sqrt_stacked_dim * self.abstol + self.reltol * state.rho() * state.duals_norm();

        self.history.push(Residuals {
            round: state.rounds(),
            primal,
            dual,
            eps_primal,
            eps_dual,
        });
    }

    /// Whether the most recent residuals satisfy both tolerances.
    ///
    /// Never true before every partition could have reported: with
    /// zero-initialized state the residuals start at zero and would
    /// otherwise satisfy the tolerances trivially.
    pub fn is_converged(&self, nchunks: usize) -> bool {
        if self.abstol <= 0.0 && self.reltol <= 0.0 {
            return false;
        }

        match self.history.last() {
            Some(last) if last.round >= nchunks => {
                last.primal <= last.eps_primal && last.dual <= last.eps_dual
            }
            _ => false,
        }
    }

    /// The full residual history, one record per observed round.
    pub fn history(&self) -> &[Residuals] {
        &self.history
    }

    /// Consumes the tracker, returning its history.
    pub fn into_history(self) -> Vec<Residuals> {
        self.history
    }
}
