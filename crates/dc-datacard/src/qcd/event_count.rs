//! Background-subtracted event counts at one selection point.

use dc_core::{Count, Error, Result, combine_ratio, quadrature_sum};
use dc_hist::Histogram;

use crate::diagnostics::{Diagnostic, Diagnostics};

/// Per-bin result of a [`RegionEventCount`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionBin {
    /// Observed minus simulated, clamped at zero, with the total uncertainty.
    pub count: Count,
    /// Observed bin error.
    pub data_error: f64,
    /// Simulated bin error.
    pub mc_stat_error: f64,
    /// Simulated content times the assumed systematic fraction.
    pub mc_syst_error: f64,
    /// `count / observed` (sentinel when undefined).
    pub purity: Count,
}

/// Observed and simulated-background distributions at one selection point,
/// reduced to per-bin counts when constructed.
#[derive(Debug, Clone)]
pub struct RegionEventCount {
    name: String,
    observed: Histogram,
    bins: Vec<RegionBin>,
}

impl RegionEventCount {
    /// Build the region named after its histogram (without the directory).
    /// `simulated` must already be normalised to luminosity.
    ///
    /// Negative subtracted counts are clamped to zero and purities in
    /// (0, 0.5) are flagged; both land in `diagnostics`.
    pub fn new(
        name: impl Into<String>,
        observed: Histogram,
        simulated: Histogram,
        assumed_syst_fraction: f64,
        diagnostics: &mut Diagnostics,
    ) -> Result<Self> {
        let name = name.into();
        observed.validate()?;
        simulated.validate()?;
        observed.require_one_dimensional(&format!("event count '{}'", name))?;
        simulated.require_one_dimensional(&format!("event count '{}'", name))?;
        if observed.n_bins() != simulated.n_bins() {
            return Err(Error::Validation(format!(
                "event count '{}': observed has {} bins, simulated has {}",
                name,
                observed.n_bins(),
                simulated.n_bins()
            )));
        }

        let mut bins = Vec::with_capacity(observed.n_bins());
        for i in 0..observed.n_bins() {
            let data = observed.count(i);
            let sim = simulated.count(i);
            let data_error = data.uncertainty();
            let mc_stat_error = sim.uncertainty();
            let mc_syst_error = (sim.value() * assumed_syst_fraction).abs();
            let total_error = quadrature_sum([data_error, mc_stat_error, mc_syst_error]);

            let mut value = data.value() - sim.value();
            if value < 0.0 {
                diagnostics.record(Diagnostic::NegativeCountClamped {
                    region: name.clone(),
                    bin: i,
                    observed: data.value(),
                    simulated: sim.value(),
                });
                value = 0.0;
            }
            let count = Count::new(value, total_error);
            let purity = combine_ratio(count, data);
            if purity.value() > 0.0 && purity.value() < 0.5 {
                diagnostics.record(Diagnostic::LowPurity {
                    region: name.clone(),
                    bin: i,
                    purity: purity.value(),
                    uncertainty: purity.uncertainty(),
                });
            }
            bins.push(RegionBin { count, data_error, mc_stat_error, mc_syst_error, purity });
        }

        tracing::debug!(region = %name, bins = bins.len(), "event count built");
        Ok(Self { name, observed, bins })
    }

    /// Selection point (histogram) name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of bins of the region variable.
    pub fn n_bins(&self) -> usize {
        self.bins.len()
    }

    /// All per-bin results.
    pub fn bins(&self) -> &[RegionBin] {
        &self.bins
    }

    /// Background-subtracted count of bin `i`.
    pub fn count(&self, i: usize) -> Count {
        self.bins[i].count
    }

    /// Purity of bin `i`.
    pub fn purity(&self, i: usize) -> Count {
        self.bins[i].purity
    }

    /// Observed distribution.
    pub fn observed(&self) -> &Histogram {
        &self.observed
    }

    /// Purity per bin, named `purity_<histogram>` with `/` replaced by `_`.
    pub fn purity_histogram(&self) -> Histogram {
        let mut h = self.observed.empty_clone(format!("purity_{}", self.name.replace('/', "_")));
        h.title = "Purity".into();
        for (i, bin) in self.bins.iter().enumerate() {
            h.set_bin(i, bin.purity.value(), bin.purity.uncertainty());
        }
        h
    }
}
