//! Data mining of the factorised QCD column.

use dc_core::Result;
use dc_hist::MergedDataset;

use super::estimator::FactorisedEstimator;
use super::event_count::RegionEventCount;
use super::shape::{ShapeReconstructor, ShapeSource};
use crate::column::{MiningEnv, histogram_path};
use crate::config::FactorisedConfig;
use crate::diagnostics::{DiagnosticHistograms, Diagnostics};
use crate::extractor::ExtractorResult;

/// Datasets feeding the factorised estimate of one column.
pub struct FactorisedInputs<'a> {
    /// Column label (also the name of the final shape).
    pub column: &'a str,
    /// Merged collision data.
    pub data: &'a MergedDataset,
    /// Merged simulated EWK background subtracted from the data.
    pub simulated: &'a MergedDataset,
    /// Histogram directory.
    pub path_prefix: &'a str,
    /// Region and shape histogram names.
    pub settings: &'a FactorisedConfig,
}

fn region(
    inputs: &FactorisedInputs<'_>,
    env: &MiningEnv<'_>,
    histogram: &str,
    diagnostics: &mut Diagnostics,
) -> Result<RegionEventCount> {
    let path = histogram_path(inputs.path_prefix, histogram);
    let observed = inputs.data.root_histogram(env.store, &path)?.histogram()?;
    let mut simulated = inputs.simulated.root_histogram(env.store, &path)?;
    simulated.normalize_to_luminosity(env.luminosity);
    RegionEventCount::new(
        histogram,
        observed,
        simulated.histogram()?,
        inputs.settings.assumed_simulated_systematic_fraction,
        diagnostics,
    )
}

/// Estimate the yield and shape; returns the rate result and the estimator
/// the QCD nuisances are extracted from.
///
/// Purity, efficiency and per-control-bin shape histograms are stored in
/// `histograms`.
pub fn mine_factorised(
    inputs: &FactorisedInputs<'_>,
    env: &MiningEnv<'_>,
    diagnostics: &mut Diagnostics,
    histograms: &mut DiagnosticHistograms,
) -> Result<(ExtractorResult, FactorisedEstimator)> {
    let settings = inputs.settings;
    let control = region(inputs, env, &settings.control_region_histogram, diagnostics)?;
    let leg1 = region(inputs, env, &settings.leg1_histogram, diagnostics)?;
    let leg2 = region(inputs, env, &settings.leg2_histogram, diagnostics)?;
    for r in [&control, &leg1, &leg2] {
        histograms.insert(r.purity_histogram());
    }

    let estimator = FactorisedEstimator::new(control, leg1, leg2)?;
    for h in estimator.efficiency_histograms() {
        histograms.insert(h);
    }

    let source = ShapeSource {
        store: env.store,
        data: inputs.data,
        simulated: inputs.simulated,
        luminosity: env.luminosity,
        path_prefix: inputs.path_prefix,
        base_name: &settings.derived_observable_base_name,
    };
    let reconstructed = ShapeReconstructor::new(env.modifier, inputs.column).reconstruct(
        &estimator,
        &source,
        diagnostics,
    )?;
    for component in reconstructed.components {
        histograms.insert(component);
    }

    let rate = ExtractorResult::rate(estimator.total_yield().value(), vec![reconstructed.shape]);
    Ok((rate, estimator))
}
