//! Factorised (ABCD) multijet yield.
//!
//! Per control-region bin `i` with a positive control count:
//!
//! ```text
//! N_i = leg1_i * leg2_i / control_i
//! ```
//!
//! The uncertainty is propagated as for `f = a * b`, leaving out the
//! control-region uncertainty (both legs are already measured relative to
//! it). The three error sources are kept apart; variances are summed over
//! bins before the square root.

use dc_core::{Count, Error, Result, combine_ratio, quadrature_sum};
use dc_hist::Histogram;

use super::event_count::RegionEventCount;

/// Combines the control region and the two leg regions into one yield.
#[derive(Debug, Clone)]
pub struct FactorisedEstimator {
    control: RegionEventCount,
    leg1: RegionEventCount,
    leg2: RegionEventCount,
    yield_value: f64,
    data_uncertainty: f64,
    mc_stat_uncertainty: f64,
    mc_syst_uncertainty: f64,
}

impl FactorisedEstimator {
    /// Compute the yield. All three regions must share the control binning.
    pub fn new(
        control: RegionEventCount,
        leg1: RegionEventCount,
        leg2: RegionEventCount,
    ) -> Result<Self> {
        let n = control.n_bins();
        if leg1.n_bins() != n || leg2.n_bins() != n {
            return Err(Error::Validation(format!(
                "factorised estimate: region binning differs (control {} bins, leg1 {}, leg2 {})",
                n,
                leg1.n_bins(),
                leg2.n_bins()
            )));
        }

        let mut yield_value = 0.0;
        let mut data_var = 0.0;
        let mut mc_stat_var = 0.0;
        let mut mc_syst_var = 0.0;
        for ((c, a), b) in control.bins().iter().zip(leg1.bins()).zip(leg2.bins()) {
            let control_count = c.count.value();
            if !(control_count > 0.0) {
                continue;
            }
            let a_val = a.count.value();
            let b_val = b.count.value();
            yield_value += a_val * b_val / control_count;
            let term = |err_a: f64, err_b: f64| {
                (b_val * err_a / control_count).powi(2) + (a_val * err_b / control_count).powi(2)
            };
            data_var += term(a.data_error, b.data_error);
            mc_stat_var += term(a.mc_stat_error, b.mc_stat_error);
            mc_syst_var += term(a.mc_syst_error, b.mc_syst_error);
        }

        let estimator = Self {
            control,
            leg1,
            leg2,
            yield_value,
            data_uncertainty: data_var.sqrt(),
            mc_stat_uncertainty: mc_stat_var.sqrt(),
            mc_syst_uncertainty: mc_syst_var.sqrt(),
        };
        tracing::info!(
            qcd_yield = estimator.yield_value,
            stat = estimator.statistical_uncertainty(),
            syst = estimator.mc_syst_uncertainty,
            "factorised QCD estimate"
        );
        Ok(estimator)
    }

    /// Yield with its statistical (data and simulation statistics) uncertainty.
    pub fn total_yield(&self) -> Count {
        Count::new(self.yield_value, self.statistical_uncertainty())
    }

    /// Absolute data-statistics uncertainty.
    pub fn data_uncertainty(&self) -> f64 {
        self.data_uncertainty
    }

    /// Absolute simulation-statistics uncertainty.
    pub fn mc_stat_uncertainty(&self) -> f64 {
        self.mc_stat_uncertainty
    }

    /// Absolute statistical uncertainty (data and simulation statistics).
    pub fn statistical_uncertainty(&self) -> f64 {
        quadrature_sum([self.data_uncertainty, self.mc_stat_uncertainty])
    }

    /// Absolute systematic uncertainty (assumed simulation systematics).
    pub fn systematic_uncertainty(&self) -> f64 {
        self.mc_syst_uncertainty
    }

    /// Statistical uncertainty relative to the yield.
    pub fn relative_statistical_uncertainty(&self) -> Result<f64> {
        self.relative(self.statistical_uncertainty(), "statistical")
    }

    /// Systematic uncertainty relative to the yield.
    pub fn relative_systematic_uncertainty(&self) -> Result<f64> {
        self.relative(self.mc_syst_uncertainty, "systematic")
    }

    fn relative(&self, absolute: f64, what: &str) -> Result<f64> {
        if self.yield_value == 0.0 {
            return Err(Error::Computation(format!(
                "factorised QCD yield is zero, relative {} uncertainty is undefined",
                what
            )));
        }
        Ok(absolute / self.yield_value)
    }

    /// Number of control-region bins.
    pub fn n_bins(&self) -> usize {
        self.control.n_bins()
    }

    /// Control region.
    pub fn control(&self) -> &RegionEventCount {
        &self.control
    }

    /// `leg1_i / control_i`.
    pub fn leg1_efficiency(&self, i: usize) -> Count {
        combine_ratio(self.leg1.count(i), self.control.count(i))
    }

    /// `leg2_i / control_i`.
    pub fn leg2_efficiency(&self, i: usize) -> Count {
        combine_ratio(self.leg2.count(i), self.control.count(i))
    }

    /// `QCDfactEff_leg1` and `QCDfactEff_leg2` on the control binning.
    pub fn efficiency_histograms(&self) -> [Histogram; 2] {
        [
            self.efficiency_histogram("QCDfactEff_leg1", Self::leg1_efficiency),
            self.efficiency_histogram("QCDfactEff_leg2", Self::leg2_efficiency),
        ]
    }

    fn efficiency_histogram(&self, name: &str, efficiency: fn(&Self, usize) -> Count) -> Histogram {
        let mut h = self.control.observed().empty_clone(name);
        h.title = "Efficiency".into();
        for i in 0..self.n_bins() {
            let eff = efficiency(self, i);
            h.set_bin(i, eff.value(), eff.uncertainty());
        }
        h
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use approx::assert_relative_eq;

    /// A region whose count has `error` split evenly between data and
    /// simulation statistics (simulated content zero).
    fn region(name: &str, contents: &[f64], errors: &[f64]) -> RegionEventCount {
        let n = contents.len();
        let edges: Vec<f64> = (0..=n).map(|i| i as f64).collect();
        let split: Vec<f64> = errors.iter().map(|e| e / 2.0_f64.sqrt()).collect();
        let observed = Histogram::from_bins(name, edges.clone(), contents.to_vec(), split.clone())
            .unwrap();
        let simulated = Histogram::from_bins(name, edges, vec![0.0; n], split).unwrap();
        RegionEventCount::new(name, observed, simulated, 0.1, &mut Diagnostics::new()).unwrap()
    }

    #[test]
    fn test_single_bin_factorisation() {
        let est = FactorisedEstimator::new(
            region("control", &[50.0], &[7.0]),
            region("leg1", &[10.0], &[3.0]),
            region("leg2", &[8.0], &[2.0]),
        )
        .unwrap();
        assert_relative_eq!(est.total_yield().value(), 1.6, epsilon = 1e-12);
        assert_relative_eq!(est.leg1_efficiency(0).value(), 0.2, epsilon = 1e-12);
        assert_relative_eq!(est.leg2_efficiency(0).value(), 0.16, epsilon = 1e-12);

        // f = a*b: (8 * 3 / 50)^2 + (10 * 2 / 50)^2, split in halves.
        let half_data = (8.0 * 3.0 / 50.0_f64).powi(2) / 2.0 + (10.0 * 2.0 / 50.0_f64).powi(2) / 2.0;
        assert_relative_eq!(est.data_uncertainty(), half_data.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(est.mc_stat_uncertainty(), half_data.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(
            est.statistical_uncertainty(),
            (2.0 * half_data).sqrt(),
            epsilon = 1e-12
        );
        // No simulated content, so no assumed systematics.
        assert_eq!(est.systematic_uncertainty(), 0.0);
    }

    #[test]
    fn test_empty_control_bin_excluded() {
        let est = FactorisedEstimator::new(
            region("control", &[0.0, 20.0], &[1.0, 1.0]),
            region("leg1", &[5.0, 10.0], &[1.0, 1.0]),
            region("leg2", &[5.0, 4.0], &[1.0, 1.0]),
        )
        .unwrap();
        assert_relative_eq!(est.total_yield().value(), 2.0, epsilon = 1e-12);
        assert!(est.leg2_efficiency(0).is_sentinel());
        let [eff1, eff2] = est.efficiency_histograms();
        assert_eq!(eff1.name, "QCDfactEff_leg1");
        assert_eq!(eff2.name, "QCDfactEff_leg2");
        assert_relative_eq!(eff1.bin_content[0], -1.0);
        assert_relative_eq!(eff2.bin_content[1], 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_variances_sum_over_bins() {
        let one = FactorisedEstimator::new(
            region("c", &[50.0], &[7.0]),
            region("a", &[10.0], &[3.0]),
            region("b", &[8.0], &[2.0]),
        )
        .unwrap();
        let two = FactorisedEstimator::new(
            region("c", &[50.0, 50.0], &[7.0, 7.0]),
            region("a", &[10.0, 10.0], &[3.0, 3.0]),
            region("b", &[8.0, 8.0], &[2.0, 2.0]),
        )
        .unwrap();
        assert_relative_eq!(two.total_yield().value(), 3.2, epsilon = 1e-12);
        assert_relative_eq!(
            two.statistical_uncertainty(),
            one.statistical_uncertainty() * 2.0_f64.sqrt(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_relative_uncertainty_of_zero_yield_is_error() {
        let est = FactorisedEstimator::new(
            region("c", &[0.0], &[1.0]),
            region("a", &[1.0], &[1.0]),
            region("b", &[1.0], &[1.0]),
        )
        .unwrap();
        assert!(matches!(est.relative_statistical_uncertainty(), Err(Error::Computation(_))));
    }

    #[test]
    fn test_mismatched_binning_rejected() {
        assert!(
            FactorisedEstimator::new(
                region("c", &[1.0, 1.0], &[1.0, 1.0]),
                region("a", &[1.0], &[1.0]),
                region("b", &[1.0, 1.0], &[1.0, 1.0]),
            )
            .is_err()
        );
    }
}
