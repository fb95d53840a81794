use std::time::Duration;

use crate::error::ConfigErr;

/// Immutable execution bounds and tuning knobs for one driver run.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Steady-state number of in-flight tasks.
    pub width: usize,
    /// ADMM penalty parameter.
    pub rho: f64,
    /// L1 regularization strength applied through soft-thresholding.
    pub lambda: f64,
    /// Absolute convergence tolerance.
    pub abstol: f64,
    /// Relative convergence tolerance.
    pub reltol: f64,
    /// Hard cap on incorporated results.
    pub max_rounds: Option<usize>,
    /// Wall-clock deadline, checked once per incorporation cycle.
    pub max_time: Option<Duration>,
    /// Drain all ready completions before recomputing the consensus once.
    pub batched: bool,
    /// Seed for partition sampling; `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl DriverConfig {
    /// Creates a configuration with the given width and penalty parameter,
    /// no regularization and no bounds.
    pub fn new(width: usize, rho: f64) -> Self {
        Self {
            width,
            rho,
            lambda: 0.0,
            abstol: 0.0,
            reltol: 0.0,
            max_rounds: None,
            max_time: None,
            batched: false,
            seed: None,
        }
    }

    /// Checks every invariant the driver loop relies on.
    ///
    /// # Returns
    /// A `ConfigErr` describing the first violated constraint, if any.
    pub fn validate(&self) -> Result<(), ConfigErr> {
        if self.width == 0 {
            return Err(ConfigErr::ZeroWidth);
        }
        if !(self.rho > 0.0) {
            return Err(ConfigErr::NonPositiveRho { got: self.rho });
        }
        if !(self.lambda >= 0.0) {
            return Err(ConfigErr::NegativeLambda { got: self.lambda });
        }
        if self.abstol < 0.0 || self.reltol < 0.0 {
            return Err(ConfigErr::NegativeTolerance);
        }

        // Without any bound and with zero tolerances the loop would never stop.
        let tolerance_set = self.abstol > 0.0 || self.reltol > 0.0;
        if self.max_rounds.is_none() && self.max_time.is_none() && !tolerance_set {
            return Err(ConfigErr::NoStoppingCriterion);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounded() -> DriverConfig {
        let mut config = DriverConfig::new(4, 1.0);
        config.max_rounds = Some(100);
        config
    }

    #[test]
    fn accepts_bounded_config() {
        assert!(bounded().validate().is_ok());
    }

    #[test]
    fn rejects_zero_width() {
        let mut config = bounded();
        config.width = 0;
        assert_eq!(config.validate(), Err(ConfigErr::ZeroWidth));
    }

    #[test]
    fn rejects_non_positive_rho() {
        let mut config = bounded();
        config.rho = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigErr::NonPositiveRho { .. })
        ));

        config.rho = f64::NAN;
        assert!(matches!(
            config.validate(),
            Err(ConfigErr::NonPositiveRho { .. })
        ));
    }

    #[test]
    fn rejects_unbounded_run() {
        let config = DriverConfig::new(4, 1.0);
        assert_eq!(config.validate(), Err(ConfigErr::NoStoppingCriterion));
    }

    #[test]
    fn tolerance_counts_as_stopping_criterion() {
        let mut config = DriverConfig::new(4, 1.0);
        config.abstol = 1e-4;
        assert!(config.validate().is_ok());
    }
}
