/// One immutable chunk of the regression problem.
///
/// Holds a row-major feature block and the matching target block. Created
/// once at setup and shared read-only with every task issued for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    features: Vec<f64>,
    targets: Vec<f64>,
    ncols: usize,
}

impl Partition {
    /// Creates a partition from a row-major feature block.
    ///
    /// # Args
    /// * `features` - Row-major feature values, `targets.len() * ncols` long.
    /// * `targets` - One target value per feature row.
    /// * `ncols` - Number of features per row; this is the parameter dimension.
    ///
    /// # Panics
    /// If `ncols` is zero or the block sizes disagree.
    pub fn new(features: Vec<f64>, targets: Vec<f64>, ncols: usize) -> Self {
        assert!(ncols > 0, "partition needs at least one feature column");
        assert_eq!(
            features.len(),
            targets.len() * ncols,
            "feature block does not match target block"
        );

        Self {
            features,
            targets,
            ncols,
        }
    }

    /// Number of feature columns, i.e. the parameter dimension.
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Number of observation rows.
    pub fn nrows(&self) -> usize {
        self.targets.len()
    }

    /// A single feature row.
    pub fn row(&self, i: usize) -> &[f64] {
        &self.features[i * self.ncols..(i + 1) * self.ncols]
    }

    /// The full row-major feature block.
    pub fn features(&self) -> &[f64] {
        &self.features
    }

    /// The target block.
    pub fn targets(&self) -> &[f64] {
        &self.targets
    }
}
