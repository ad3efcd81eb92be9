//! Datacard columns: one per modelled process plus the observation.

use std::collections::{BTreeMap, BTreeSet};

use dc_core::{Error, Result};
use dc_hist::{HistogramStore, MergedDataset, ShapeModifier};

use crate::config::{DataGroupConfig, DatasetType, FactorisedConfig, ObservationConfig};
use crate::diagnostics::{DiagnosticHistograms, Diagnostics};
use crate::extractor::{ExtractionContext, ExtractorRegistry, ExtractorResult};
use crate::qcd::{self, FactorisedInputs};

/// `<prefix>/<name>`, or `name` alone for an empty prefix.
pub fn histogram_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() { name.to_string() } else { format!("{}/{}", prefix, name) }
}

/// Shared, read-only inputs of data mining.
pub struct MiningEnv<'a> {
    /// Histogram store.
    pub store: &'a dyn HistogramStore,
    /// Nuisance extractors.
    pub registry: &'a ExtractorRegistry,
    /// Output shape binning.
    pub modifier: &'a ShapeModifier,
    /// Run luminosity.
    pub luminosity: f64,
    /// Factorised QCD settings, if configured.
    pub qcd: Option<&'a FactorisedConfig>,
}

/// One column of the datacard.
///
/// Built once from configuration; [`DatacardColumn::do_data_mining`] fills
/// the rate and nuisance caches exactly once.
#[derive(Debug, Clone)]
pub struct DatacardColumn {
    label: String,
    process_id: i32,
    enabled_mass_points: BTreeSet<u32>,
    nuisance_ids: Vec<String>,
    dataset_type: DatasetType,
    is_observation: bool,
    datasets: Option<MergedDataset>,
    ewk_datasets: Option<MergedDataset>,
    rate_counter: String,
    additional_normalisation: f64,
    path_prefix: String,
    shape_histogram: String,
    cached_rate: Option<ExtractorResult>,
    cached_nuisances: BTreeMap<String, ExtractorResult>,
}

impl DatacardColumn {
    /// Column for a configured data group; resolves its datasets.
    pub fn from_group(group: &DataGroupConfig, store: &dyn HistogramStore) -> Result<Self> {
        let (datasets, ewk_datasets) = match group.dataset_type {
            DatasetType::Empty => (None, None),
            DatasetType::QcdFactorised => (
                Some(MergedDataset::resolve(
                    store,
                    &group.label,
                    format!("dset_{}", group.label),
                    &group.dataset_definitions,
                )?),
                Some(MergedDataset::resolve(
                    store,
                    &group.label,
                    format!("dset_{}_MCEWK", group.label),
                    &group.simulated_ewk_dataset_definitions,
                )?),
            ),
            DatasetType::Signal | DatasetType::Embedding => (
                Some(MergedDataset::resolve(
                    store,
                    &group.label,
                    format!("dset_{}", group.label),
                    &group.dataset_definitions,
                )?),
                None,
            ),
        };
        let mut nuisance_ids: Vec<String> = Vec::with_capacity(group.nuisances.len());
        for id in &group.nuisances {
            if !nuisance_ids.contains(id) {
                nuisance_ids.push(id.clone());
            }
        }
        Ok(Self {
            label: group.label.clone(),
            process_id: group.process_id,
            enabled_mass_points: group.valid_mass_points.iter().copied().collect(),
            nuisance_ids,
            dataset_type: group.dataset_type,
            is_observation: false,
            datasets,
            ewk_datasets,
            rate_counter: group.rate_counter.clone(),
            additional_normalisation: group.additional_normalisation,
            path_prefix: group.path_prefix.clone(),
            shape_histogram: group.shape_histogram.clone(),
            cached_rate: None,
            cached_nuisances: BTreeMap::new(),
        })
    }

    /// The observed-data column.
    pub fn observation(config: &ObservationConfig, store: &dyn HistogramStore) -> Result<Self> {
        let label = "Observation".to_string();
        let datasets =
            MergedDataset::resolve(store, &label, "dset_observation", &config.dataset_definitions)?;
        Ok(Self {
            label,
            process_id: 0,
            enabled_mass_points: BTreeSet::new(),
            nuisance_ids: Vec::new(),
            dataset_type: DatasetType::Empty,
            is_observation: true,
            datasets: Some(datasets),
            ewk_datasets: None,
            rate_counter: config.rate_counter.clone(),
            additional_normalisation: 1.0,
            path_prefix: config.path_prefix.clone(),
            shape_histogram: config.shape_histogram.clone(),
            cached_rate: None,
            cached_nuisances: BTreeMap::new(),
        })
    }

    /// Column label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Process id.
    pub fn process_id(&self) -> i32 {
        self.process_id
    }

    /// True for the observed-data column.
    pub fn is_observation(&self) -> bool {
        self.is_observation
    }

    /// True if the column is part of the datacard for `mass`
    /// (a column without listed mass points is always present).
    pub fn is_enabled_for(&self, mass: u32) -> bool {
        self.enabled_mass_points.is_empty() || self.enabled_mass_points.contains(&mass)
    }

    /// Requested nuisance ids, in request order without repeats.
    pub fn nuisance_ids(&self) -> &[String] {
        &self.nuisance_ids
    }

    /// Merged datasets of the column.
    pub fn datasets(&self) -> Option<&MergedDataset> {
        self.datasets.as_ref()
    }

    /// Cached rate; an error before data mining.
    pub fn rate(&self) -> Result<&ExtractorResult> {
        self.cached_rate.as_ref().ok_or_else(|| {
            Error::Validation(format!("column '{}' has not been mined yet", self.label))
        })
    }

    /// Cached nuisance result.
    pub fn nuisance_result(&self, id: &str) -> Option<&ExtractorResult> {
        self.cached_nuisances.get(id)
    }

    /// True once data mining has run.
    pub fn is_mined(&self) -> bool {
        self.cached_rate.is_some()
    }

    /// Compute and cache the rate and every requested nuisance.
    ///
    /// Running it again on a mined column does nothing.
    pub fn do_data_mining(
        &mut self,
        env: &MiningEnv<'_>,
        diagnostics: &mut Diagnostics,
        histograms: &mut DiagnosticHistograms,
    ) -> Result<()> {
        if self.is_mined() {
            return Ok(());
        }
        tracing::info!(column = %self.label, "data mining");

        let (rate, estimator) = match self.dataset_type {
            DatasetType::QcdFactorised => {
                let settings = env.qcd.ok_or_else(|| {
                    Error::Config(format!(
                        "- column '{}' is factorised QCD but 'qcd_factorised' is missing",
                        self.label
                    ))
                })?;
                let (data, simulated) = match (&self.datasets, &self.ewk_datasets) {
                    (Some(d), Some(s)) => (d, s),
                    _ => {
                        return Err(Error::Validation(format!(
                            "column '{}' has no datasets for the factorised estimate",
                            self.label
                        )));
                    }
                };
                let inputs = FactorisedInputs {
                    column: &self.label,
                    data,
                    simulated,
                    path_prefix: &self.path_prefix,
                    settings,
                };
                let (rate, estimator) =
                    qcd::mine_factorised(&inputs, env, diagnostics, histograms)?;
                (rate, Some(estimator))
            }
            _ => (self.mine_rate(env)?, None),
        };

        let ctx = ExtractionContext {
            column: &self.label,
            store: env.store,
            dataset: self.datasets.as_ref(),
            luminosity: env.luminosity,
            estimator: estimator.as_ref(),
        };
        let mut nuisances = BTreeMap::new();
        for id in &self.nuisance_ids {
            let extractor = env.registry.get(&self.label, id)?;
            nuisances.insert(id.clone(), extractor.extract(&ctx, diagnostics)?);
        }

        tracing::info!(column = %self.label, rate = rate.value, nuisances = nuisances.len(), "column mined");
        self.cached_rate = Some(rate);
        self.cached_nuisances = nuisances;
        Ok(())
    }

    fn mine_rate(&self, env: &MiningEnv<'_>) -> Result<ExtractorResult> {
        let Some(dataset) = &self.datasets else {
            return Ok(ExtractorResult::rate(0.0, Vec::new()));
        };
        let luminosity = if self.is_observation { None } else { Some(env.luminosity) };
        let norm = self.additional_normalisation;
        let count = dataset.counter(env.store, &self.rate_counter, luminosity)?;

        let mut shapes = Vec::new();
        if !self.shape_histogram.is_empty() {
            let path = histogram_path(&self.path_prefix, &self.shape_histogram);
            let mut fetched = dataset.root_histogram(env.store, &path)?;
            if let Some(lumi) = luminosity {
                fetched.normalize_to_luminosity(lumi);
            }
            let source = fetched.histogram()?;
            let mut shape = env.modifier.create_empty(self.label.clone());
            env.modifier.add_shape(&source, &mut shape)?;
            shape.scale(norm);
            shapes.push(shape);
        }
        Ok(ExtractorResult::rate(count.value() * norm, shapes))
    }
}
