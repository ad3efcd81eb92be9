//! Binned distribution type shared by the store and the datacard engine.

use dc_core::{Count, Error, Result, quadrature_sum};
use serde::{Deserialize, Serialize};

/// Dimensionality of a binned distribution.
///
/// Only [`Dimension::One`] is supported by the computations in this
/// workspace; higher dimensions are carried so that they can be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Dimension {
    /// 1-D histogram.
    #[default]
    One,
    /// 2-D histogram (`bin_content` is flattened x-major).
    Two {
        /// Number of y bins.
        n_bins_y: usize,
    },
    /// 3-D histogram (`bin_content` is flattened x-major).
    Three {
        /// Number of y bins.
        n_bins_y: usize,
        /// Number of z bins.
        n_bins_z: usize,
    },
}

impl Dimension {
    /// Number of axes.
    pub fn rank(&self) -> usize {
        match self {
            Dimension::One => 1,
            Dimension::Two { .. } => 2,
            Dimension::Three { .. } => 3,
        }
    }
}

/// Location of a value on the x axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinIndex {
    /// Below the first edge.
    Underflow,
    /// Visible bin (0-based).
    Bin(usize),
    /// At or above the last edge.
    Overflow,
}

/// A binned distribution with per-bin errors and explicit under/overflow.
///
/// Visible bins are 0-based. Errors are one-sigma (not sumw2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    /// Histogram name.
    #[serde(default)]
    pub name: String,
    /// Histogram title.
    #[serde(default)]
    pub title: String,
    /// Dimensionality.
    #[serde(default)]
    pub dimension: Dimension,
    /// X bin edges (length = number of x bins + 1).
    pub bin_edges: Vec<f64>,
    /// Bin contents (excluding under/overflow).
    pub bin_content: Vec<f64>,
    /// Bin errors (same length as `bin_content`).
    pub bin_error: Vec<f64>,
    /// Underflow content.
    #[serde(default)]
    pub underflow: f64,
    /// Overflow content.
    #[serde(default)]
    pub overflow: f64,
    /// Underflow error.
    #[serde(default)]
    pub underflow_error: f64,
    /// Overflow error.
    #[serde(default)]
    pub overflow_error: f64,
}

impl Histogram {
    /// Create an empty 1-D histogram on the given edges.
    pub fn with_edges(name: impl Into<String>, bin_edges: Vec<f64>) -> Result<Self> {
        let n = bin_edges.len().saturating_sub(1);
        let h = Self {
            name: name.into(),
            title: String::new(),
            dimension: Dimension::One,
            bin_edges,
            bin_content: vec![0.0; n],
            bin_error: vec![0.0; n],
            underflow: 0.0,
            overflow: 0.0,
            underflow_error: 0.0,
            overflow_error: 0.0,
        };
        h.validate()?;
        Ok(h)
    }

    /// Create an empty 1-D histogram with `n_bins` uniform bins on `[min, max)`.
    pub fn uniform(name: impl Into<String>, n_bins: usize, min: f64, max: f64) -> Result<Self> {
        if n_bins == 0 || !(max > min) {
            return Err(Error::Validation(format!(
                "invalid uniform binning: n_bins={}, min={}, max={}",
                n_bins, min, max
            )));
        }
        let width = (max - min) / n_bins as f64;
        let edges = (0..=n_bins).map(|i| min + width * i as f64).collect();
        Self::with_edges(name, edges)
    }

    /// Build a 1-D histogram from contents and errors on the given edges.
    pub fn from_bins(
        name: impl Into<String>,
        bin_edges: Vec<f64>,
        bin_content: Vec<f64>,
        bin_error: Vec<f64>,
    ) -> Result<Self> {
        let mut h = Self::with_edges(name, bin_edges)?;
        h.bin_content = bin_content;
        h.bin_error = bin_error;
        h.validate()?;
        Ok(h)
    }

    /// Number of visible x bins.
    pub fn n_bins(&self) -> usize {
        self.bin_edges.len().saturating_sub(1)
    }

    /// First inconsistency between edges, dimension and bin vectors, if any.
    pub(crate) fn layout_problem(&self) -> Option<String> {
        if self.bin_edges.len() < 2 {
            return Some(format!("needs at least two bin edges, got {}", self.bin_edges.len()));
        }
        if self.bin_edges.windows(2).any(|w| !(w[1] > w[0])) {
            return Some("bin edges must be strictly increasing".into());
        }
        let n_x = self.n_bins();
        let expected = match self.dimension {
            Dimension::One => n_x,
            Dimension::Two { n_bins_y } => n_x * n_bins_y,
            Dimension::Three { n_bins_y, n_bins_z } => n_x * n_bins_y * n_bins_z,
        };
        if expected == 0 {
            return Some(format!("{}-D histogram without bins", self.dimension.rank()));
        }
        if self.bin_content.len() != expected || self.bin_error.len() != expected {
            return Some(format!(
                "{} edges need {} contents and errors (got {} / {})",
                self.bin_edges.len(),
                expected,
                self.bin_content.len(),
                self.bin_error.len()
            ));
        }
        None
    }

    /// Check that edges, dimension and bin vectors agree.
    pub fn validate(&self) -> Result<()> {
        match self.layout_problem() {
            Some(problem) => Err(Error::Validation(format!("histogram '{}': {}", self.name, problem))),
            None => Ok(()),
        }
    }

    /// Fail with [`Error::UnsupportedDimensionality`] unless this is 1-D.
    pub fn require_one_dimensional(&self, context: &str) -> Result<()> {
        match self.dimension {
            Dimension::One => Ok(()),
            other => Err(Error::UnsupportedDimensionality {
                context: format!("{} ('{}')", context, self.name),
                dimensions: other.rank(),
            }),
        }
    }

    /// Content and error of visible bin `i` as a [`Count`].
    pub fn count(&self, i: usize) -> Count {
        Count::new(self.bin_content[i], self.bin_error[i])
    }

    /// Set content and error of visible bin `i`.
    pub fn set_bin(&mut self, i: usize, content: f64, error: f64) {
        self.bin_content[i] = content;
        self.bin_error[i] = error;
    }

    /// Centre of visible bin `i`.
    pub fn bin_center(&self, i: usize) -> f64 {
        0.5 * (self.bin_edges[i] + self.bin_edges[i + 1])
    }

    /// Locate `x` on the x axis (edges are lower-inclusive).
    pub fn find_bin(&self, x: f64) -> BinIndex {
        let n = self.n_bins();
        // NaN lands in the underflow.
        if !(x >= self.bin_edges[0]) {
            return BinIndex::Underflow;
        }
        if x >= self.bin_edges[n] {
            return BinIndex::Overflow;
        }
        // partition_point gives the first edge > x; the bin is one before it.
        let upper = self.bin_edges.partition_point(|&e| e <= x);
        BinIndex::Bin(upper - 1)
    }

    /// Sum of visible bin contents.
    pub fn integral(&self) -> f64 {
        self.bin_content.iter().sum()
    }

    /// Sum of visible bin contents plus under- and overflow.
    pub fn integral_with_flows(&self) -> f64 {
        self.integral() + self.underflow + self.overflow
    }

    /// Multiply all contents and errors (flows included) by `factor`.
    pub fn scale(&mut self, factor: f64) {
        for c in &mut self.bin_content {
            *c *= factor;
        }
        for e in &mut self.bin_error {
            *e *= factor.abs();
        }
        self.underflow *= factor;
        self.overflow *= factor;
        self.underflow_error *= factor.abs();
        self.overflow_error *= factor.abs();
    }

    /// Zero all contents and errors, keeping the binning.
    pub fn reset(&mut self) {
        self.bin_content.iter_mut().for_each(|c| *c = 0.0);
        self.bin_error.iter_mut().for_each(|e| *e = 0.0);
        self.underflow = 0.0;
        self.overflow = 0.0;
        self.underflow_error = 0.0;
        self.overflow_error = 0.0;
    }

    /// A zeroed copy with a new name.
    pub fn empty_clone(&self, name: impl Into<String>) -> Self {
        let mut h = self.clone();
        h.name = name.into();
        h.reset();
        h
    }

    /// Add `other` bin-by-bin (same binning required); errors add in quadrature.
    pub fn add_assign_bins(&mut self, other: &Histogram) -> Result<()> {
        if self.bin_edges != other.bin_edges || self.dimension != other.dimension {
            return Err(Error::Validation(format!(
                "cannot add histogram '{}' to '{}': binning differs",
                other.name, self.name
            )));
        }
        for i in 0..self.bin_content.len() {
            self.bin_content[i] += other.bin_content[i];
            self.bin_error[i] = quadrature_sum([self.bin_error[i], other.bin_error[i]]);
        }
        self.underflow += other.underflow;
        self.overflow += other.overflow;
        self.underflow_error = quadrature_sum([self.underflow_error, other.underflow_error]);
        self.overflow_error = quadrature_sum([self.overflow_error, other.overflow_error]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn three_bins() -> Histogram {
        Histogram::from_bins("h", vec![0.0, 1.0, 2.0, 3.0], vec![5.0, -2.0, 3.0], vec![1.0; 3])
            .unwrap()
    }

    #[test]
    fn test_find_bin() {
        let h = three_bins();
        assert_eq!(h.find_bin(-0.1), BinIndex::Underflow);
        assert_eq!(h.find_bin(0.0), BinIndex::Bin(0));
        assert_eq!(h.find_bin(1.0), BinIndex::Bin(1));
        assert_eq!(h.find_bin(2.999), BinIndex::Bin(2));
        assert_eq!(h.find_bin(3.0), BinIndex::Overflow);
    }

    #[test]
    fn test_integrals_and_scale() {
        let mut h = three_bins();
        h.underflow = 1.0;
        h.overflow = 0.5;
        assert_relative_eq!(h.integral(), 6.0);
        assert_relative_eq!(h.integral_with_flows(), 7.5);
        h.scale(2.0);
        assert_relative_eq!(h.integral_with_flows(), 15.0);
        assert_relative_eq!(h.bin_error[0], 2.0);
    }

    #[test]
    fn test_uniform_edges() {
        let h = Histogram::uniform("u", 4, 0.0, 400.0).unwrap();
        assert_eq!(h.bin_edges, vec![0.0, 100.0, 200.0, 300.0, 400.0]);
        assert_relative_eq!(h.bin_center(1), 150.0);
    }

    #[test]
    fn test_invalid_edges_rejected() {
        assert!(Histogram::with_edges("bad", vec![1.0]).is_err());
        assert!(Histogram::with_edges("bad", vec![0.0, 2.0, 1.0]).is_err());
        assert!(Histogram::uniform("bad", 0, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_validate_layout() {
        let mut h = three_bins();
        assert!(h.validate().is_ok());
        h.bin_content.pop();
        assert!(matches!(h.validate(), Err(Error::Validation(_))));

        let mut flat = three_bins();
        flat.dimension = Dimension::Two { n_bins_y: 2 };
        assert!(flat.validate().is_err());
        flat.bin_content = vec![0.0; 6];
        flat.bin_error = vec![0.0; 6];
        assert!(flat.validate().is_ok());

        assert!(Histogram::from_bins("short", vec![0.0, 1.0, 2.0], vec![1.0], vec![1.0; 2]).is_err());
    }

    #[test]
    fn test_require_one_dimensional() {
        let mut h = three_bins();
        assert!(h.require_one_dimensional("purity").is_ok());
        h.dimension = Dimension::Two { n_bins_y: 2 };
        match h.require_one_dimensional("purity") {
            Err(Error::UnsupportedDimensionality { dimensions, .. }) => assert_eq!(dimensions, 2),
            other => panic!("expected unsupported dimensionality, got {:?}", other),
        }
    }

    #[test]
    fn test_add_assign_bins() {
        let mut a = three_bins();
        let b = three_bins();
        a.add_assign_bins(&b).unwrap();
        assert_relative_eq!(a.bin_content[0], 10.0);
        assert_relative_eq!(a.bin_error[0], 2.0_f64.sqrt());

        let other = Histogram::uniform("o", 2, 0.0, 3.0).unwrap();
        assert!(a.add_assign_bins(&other).is_err());
    }
}
