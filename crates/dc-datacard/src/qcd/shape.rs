//! Shape of the derived observable for the factorised multijet background.

use dc_core::{Error, Result};
use dc_hist::{Histogram, HistogramStore, MergedDataset, ShapeModifier};

use super::estimator::FactorisedEstimator;
use crate::diagnostics::{Diagnostic, Diagnostics};

/// Subtraction overshoot, as a fraction of the per-bin shape total, above
/// which a low-purity diagnostic is recorded.
pub const SHAPE_PURITY_THRESHOLD: f64 = 0.01;

/// Where the per-control-bin sub-histograms are read from.
///
/// Bin `i` (0-based) of the control variable is stored at
/// `<path_prefix>/<base_name>_bin<i>` for both the data and the simulated
/// EWK datasets.
pub struct ShapeSource<'a> {
    /// Histogram store.
    pub store: &'a dyn HistogramStore,
    /// Merged collision data.
    pub data: &'a MergedDataset,
    /// Merged simulated EWK background.
    pub simulated: &'a MergedDataset,
    /// Luminosity the simulated sub-histograms are normalised to.
    pub luminosity: f64,
    /// Histogram directory.
    pub path_prefix: &'a str,
    /// Derived-observable base name.
    pub base_name: &'a str,
}

impl ShapeSource<'_> {
    /// Path of the sub-histogram for control bin `i`.
    pub fn bin_path(&self, i: usize) -> String {
        format!("{}/{}_bin{}", self.path_prefix, self.base_name, i)
    }

    fn fetch(&self, i: usize) -> Result<(Histogram, Histogram)> {
        let path = self.bin_path(i);
        let data = self.data.root_histogram(self.store, &path)?.histogram()?;
        let mut simulated = self.simulated.root_histogram(self.store, &path)?;
        simulated.normalize_to_luminosity(self.luminosity);
        Ok((data, simulated.histogram()?))
    }
}

/// Output of [`ShapeReconstructor::reconstruct`].
#[derive(Debug, Clone)]
pub struct ReconstructedShape {
    /// Final shape, normalised to the estimated yield (flows included).
    pub shape: Histogram,
    /// Efficiency-scaled per-control-bin shapes `QCDFact_MtShape_bin_<i>`.
    pub components: Vec<Histogram>,
}

/// Builds the background shape bin by bin of the control variable.
pub struct ShapeReconstructor<'a> {
    modifier: &'a ShapeModifier,
    name: String,
}

impl<'a> ShapeReconstructor<'a> {
    /// Reconstructor producing a shape called `name` on the modifier's binning.
    pub fn new(modifier: &'a ShapeModifier, name: impl Into<String>) -> Self {
        Self { modifier, name: name.into() }
    }

    /// Name of the per-control-bin shape for bin `i`.
    pub fn component_name(i: usize) -> String {
        format!("QCDFact_MtShape_bin_{}", i)
    }

    /// Run the reconstruction.
    ///
    /// For each control bin with a valid leg-2 efficiency: data minus
    /// simulated EWK, negative bins clipped, scaled by that efficiency and
    /// added to the total. The total is
    /// clipped again and normalised to the estimator yield. A missing
    /// sub-histogram is fatal.
    pub fn reconstruct(
        &self,
        estimator: &FactorisedEstimator,
        source: &ShapeSource<'_>,
        diagnostics: &mut Diagnostics,
    ) -> Result<ReconstructedShape> {
        estimator.control().observed().require_one_dimensional("QCD factorised shape")?;

        let mut total = self.modifier.create_empty(self.name.clone());
        let mut components = Vec::with_capacity(estimator.n_bins());
        for i in 0..estimator.n_bins() {
            let (data, simulated) = source.fetch(i)?;
            tracing::debug!(
                bin = i,
                data = data.integral_with_flows(),
                mc_ewk = simulated.integral_with_flows(),
                qcd = data.integral_with_flows() - simulated.integral_with_flows(),
                "QCD factorised shape input"
            );

            let efficiency = estimator.leg2_efficiency(i);
            if efficiency.is_sentinel() {
                diagnostics.record(Diagnostic::SkippedControlBin {
                    shape: self.name.clone(),
                    control_bin: i,
                });
                continue;
            }

            let component_name = Self::component_name(i);
            let mut component = self.modifier.create_empty(component_name.clone());
            self.modifier.add_shape(&data, &mut component)?;
            let impacts = self.modifier.subtract_shape(&simulated, &mut component, true)?;
            let component_total = component.integral_with_flows();
            if component_total > 0.0 {
                for impact in impacts {
                    if impact.impact / component_total > SHAPE_PURITY_THRESHOLD {
                        diagnostics.record(Diagnostic::LowShapePurity {
                            shape: self.name.clone(),
                            control_bin: i,
                            slot: impact.slot,
                            impact: impact.impact,
                            total: component_total,
                        });
                    }
                }
            }
            let clipped = self.modifier.finalise_shape(&mut component);
            diagnostics.record_clipped(&component_name, &clipped);

            component.scale(efficiency.value());
            tracing::debug!(
                bin = i,
                efficiency = efficiency.value(),
                scaled = component.integral_with_flows(),
                "QCD factorised shape component"
            );
            self.modifier.add_shape(&component, &mut total)?;
            components.push(component);
        }

        let clipped = self.modifier.finalise_shape(&mut total);
        diagnostics.record_clipped(&self.name, &clipped);

        let target = estimator.total_yield().value();
        let integral = total.integral_with_flows();
        if integral > 0.0 {
            total.scale(target / integral);
        } else if target > 0.0 {
            return Err(Error::Computation(format!(
                "shape '{}' is empty but the estimated yield is {}",
                self.name, target
            )));
        }
        Ok(ReconstructedShape { shape: total, components })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qcd::event_count::RegionEventCount;
    use approx::assert_relative_eq;
    use dc_hist::{DatasetInfo, MemoryStore, ShapeBinning, ShapeSlot};

    const LUMI: f64 = 1000.0;

    fn hist(contents: &[f64]) -> Histogram {
        let n = contents.len();
        let edges: Vec<f64> = (0..=n).map(|i| i as f64 * 100.0).collect();
        let errors = contents.iter().map(|c| c.abs().sqrt()).collect();
        Histogram::from_bins("", edges, contents.to_vec(), errors).unwrap()
    }

    fn region(name: &str, data: &[f64], mc: &[f64]) -> RegionEventCount {
        RegionEventCount::new(name, hist(data), hist(mc), 0.1, &mut Diagnostics::new()).unwrap()
    }

    fn estimator() -> FactorisedEstimator {
        FactorisedEstimator::new(
            region("control", &[100.0, 60.0], &[10.0, 10.0]),
            region("leg1", &[30.0, 20.0], &[5.0, 0.0]),
            region("leg2", &[20.0, 12.0], &[2.0, 2.0]),
        )
        .unwrap()
    }

    /// Data and a simulated EWK sample scaled by 1 at `LUMI`.
    fn store(per_bin: &[([f64; 4], [f64; 4])]) -> MemoryStore {
        let mut s = MemoryStore::new();
        s.add_dataset("Tau_Run2011A", DatasetInfo::Data { luminosity: LUMI });
        s.add_dataset("WJets", DatasetInfo::Simulation { cross_section: 1.0, all_events: LUMI });
        for (i, (data, mc)) in per_bin.iter().enumerate() {
            let path = format!("QCDfact/mtShape_bin{}", i);
            s.add_histogram("Tau_Run2011A", path.clone(), hist(data)).unwrap();
            s.add_histogram("WJets", path, hist(mc)).unwrap();
        }
        s
    }

    fn modifier() -> ShapeModifier {
        ShapeModifier::new(&ShapeBinning { n_bins: 4, min: 0.0, max: 400.0, variable_edges: None })
            .unwrap()
    }

    fn run(
        store: &MemoryStore,
        est: &FactorisedEstimator,
        diags: &mut Diagnostics,
    ) -> Result<ReconstructedShape> {
        let data = MergedDataset::new("data", vec!["Tau_Run2011A".into()]);
        let ewk = MergedDataset::new("ewk", vec!["WJets".into()]);
        let source = ShapeSource {
            store,
            data: &data,
            simulated: &ewk,
            luminosity: LUMI,
            path_prefix: "QCDfact",
            base_name: "mtShape",
        };
        let m = modifier();
        ShapeReconstructor::new(&m, "QCDfact").reconstruct(est, &source, diags)
    }

    #[test]
    fn test_shape_normalised_to_yield() {
        let s = store(&[
            ([10.0, 20.0, 5.0, 1.0], [1.0, 2.0, 0.5, 0.0]),
            ([4.0, 8.0, 8.0, 2.0], [0.0, 1.0, 1.0, 0.0]),
        ]);
        let est = estimator();
        let mut diags = Diagnostics::new();
        let result = run(&s, &est, &mut diags).unwrap();
        let target = est.total_yield().value();
        assert!(target > 0.0);
        assert_relative_eq!(result.shape.integral_with_flows(), target, max_relative = 1e-6);
        assert_eq!(result.components.len(), 2);
        assert_eq!(result.components[1].name, "QCDFact_MtShape_bin_1");
        assert!(diags.is_empty());
    }

    #[test]
    fn test_component_scaled_by_leg2_efficiency() {
        let s = store(&[([10.0, 0.0, 0.0, 0.0], [0.0; 4]), ([0.0, 5.0, 0.0, 0.0], [0.0; 4])]);
        let est = estimator();
        let result = run(&s, &est, &mut Diagnostics::new()).unwrap();
        let eff0 = est.leg2_efficiency(0).value();
        let eff1 = est.leg2_efficiency(1).value();
        assert_relative_eq!(result.components[0].integral(), 10.0 * eff0, max_relative = 1e-12);
        assert_relative_eq!(result.components[1].integral(), 5.0 * eff1, max_relative = 1e-12);
        let ratio = result.shape.bin_content[0] / result.shape.bin_content[1];
        assert_relative_eq!(ratio, (10.0 * eff0) / (5.0 * eff1), max_relative = 1e-9);
    }

    #[test]
    fn test_negative_component_bins_clipped_and_flagged() {
        let s = store(&[
            ([10.0, 1.0, 5.0, 0.0], [0.0, 3.0, 0.0, 0.0]),
            ([4.0, 4.0, 4.0, 4.0], [0.0; 4]),
        ]);
        let mut diags = Diagnostics::new();
        let result = run(&s, &estimator(), &mut diags).unwrap();
        assert!(result.components[0].bin_content.iter().all(|&c| c >= 0.0));
        let entries = diags.entries();
        assert!(entries.iter().any(|d| matches!(
            d,
            Diagnostic::LowShapePurity { control_bin: 0, slot: ShapeSlot::Bin(1), .. }
        )));
        assert!(entries.iter().any(|d| matches!(
            d,
            Diagnostic::NegativeShapeBinClipped { slot: ShapeSlot::Bin(1), .. }
        )));
    }

    #[test]
    fn test_missing_sub_histogram_is_fatal() {
        let s = store(&[([1.0, 1.0, 1.0, 1.0], [0.0; 4])]);
        match run(&s, &estimator(), &mut Diagnostics::new()) {
            Err(Error::HistogramNotFound { path, .. }) => assert_eq!(path, "QCDfact/mtShape_bin1"),
            other => panic!("expected HistogramNotFound, got {:?}", other.map(|r| r.shape)),
        }
    }

    #[test]
    fn test_sentinel_efficiency_skips_control_bin() {
        let est = FactorisedEstimator::new(
            region("control", &[0.0, 60.0], &[0.0, 10.0]),
            region("leg1", &[0.0, 20.0], &[0.0, 0.0]),
            region("leg2", &[0.0, 12.0], &[0.0, 2.0]),
        )
        .unwrap();
        // Bin 0 would need clipping, but it is skipped before any shape is built.
        let s = store(&[([1.0; 4], [0.0, 3.0, 0.0, 0.0]), ([2.0; 4], [0.0; 4])]);
        let mut diags = Diagnostics::new();
        let result = run(&s, &est, &mut diags).unwrap();
        assert_eq!(result.components.len(), 1);
        assert!(matches!(
            diags.entries(),
            [Diagnostic::SkippedControlBin { control_bin: 0, .. }]
        ));
        assert_relative_eq!(
            result.shape.integral_with_flows(),
            est.total_yield().value(),
            max_relative = 1e-6
        );
    }

    #[test]
    fn test_two_dimensional_sub_histogram_rejected() {
        let mut s = store(&[([1.0; 4], [0.0; 4]), ([1.0; 4], [0.0; 4])]);
        let stored = s.datasets.get_mut("Tau_Run2011A").unwrap();
        let h = stored.histograms.get_mut("QCDfact/mtShape_bin0").unwrap();
        h.dimension = dc_hist::Dimension::Two { n_bins_y: 1 };
        assert!(matches!(
            run(&s, &estimator(), &mut Diagnostics::new()),
            Err(Error::UnsupportedDimensionality { .. })
        ));
    }
}
