//! Datacard generator: builds the columns, drives data mining and assembles
//! one model per mass point.

use std::collections::BTreeMap;

use dc_core::{Error, Result};
use dc_hist::{HistogramStore, ShapeModifier};

use crate::column::{DatacardColumn, MiningEnv};
use crate::config::DatacardConfig;
use crate::diagnostics::{DiagnosticHistograms, Diagnostics};
use crate::extractor::{ExtractorMode, ExtractorRegistry, ExtractorResult};
use crate::model::{DatacardModel, NuisanceCell, NuisanceRow, ProcessEntry, RunReport};

/// Generates datacards from a validated configuration.
pub struct DataCardGenerator<'a> {
    config: DatacardConfig,
    store: &'a dyn HistogramStore,
    registry: ExtractorRegistry,
    modifier: ShapeModifier,
    observation: DatacardColumn,
    columns: Vec<DatacardColumn>,
    luminosity: f64,
}

impl<'a> DataCardGenerator<'a> {
    /// Validate `config`, resolve every column's datasets and fix the
    /// luminosity (configured, or that of the observed data).
    pub fn new(
        config: DatacardConfig,
        registry: ExtractorRegistry,
        store: &'a dyn HistogramStore,
    ) -> Result<Self> {
        config.validate()?;
        let modifier = ShapeModifier::new(config.shape_binning()?)?;
        let observation = DatacardColumn::observation(config.observation()?, store)
            .map_err(|e| e.in_column("Observation"))?;
        let luminosity = match config.luminosity {
            Some(lumi) => lumi,
            None => observation
                .datasets()
                .ok_or_else(|| Error::Validation("observation has no datasets".into()))?
                .luminosity(store)?,
        };
        tracing::info!(luminosity, "luminosity");

        let columns = config
            .data_groups
            .iter()
            .map(|g| DatacardColumn::from_group(g, store).map_err(|e| e.in_column(&g.label)))
            .collect::<Result<Vec<_>>>()?;
        tracing::info!(
            datacard = %config.datacard_name,
            columns = columns.len(),
            nuisances = registry.len(),
            "generator ready"
        );
        Ok(Self { config, store, registry, modifier, observation, columns, luminosity })
    }

    /// Build the registry from the configuration, then [`DataCardGenerator::new`].
    pub fn from_config(config: DatacardConfig, store: &'a dyn HistogramStore) -> Result<Self> {
        let registry = ExtractorRegistry::from_definitions(&config.nuisances)?;
        Self::new(config, registry, store)
    }

    /// Run luminosity.
    pub fn luminosity(&self) -> f64 {
        self.luminosity
    }

    /// Configuration in use.
    pub fn config(&self) -> &DatacardConfig {
        &self.config
    }

    /// All process columns.
    pub fn columns(&self) -> &[DatacardColumn] {
        &self.columns
    }

    fn is_needed(&self, column: &DatacardColumn) -> bool {
        self.config.mass_points.iter().any(|&m| column.is_enabled_for(m))
    }

    /// Mine every needed column and assemble the models.
    ///
    /// The first fatal error stops the run and is returned with the label
    /// of the column being mined.
    pub fn run(&mut self) -> Result<RunReport> {
        let mut diagnostics = Diagnostics::new();
        let mut histograms = DiagnosticHistograms::new();
        let env = MiningEnv {
            store: self.store,
            registry: &self.registry,
            modifier: &self.modifier,
            luminosity: self.luminosity,
            qcd: self.config.qcd_factorised.as_ref(),
        };

        self.observation
            .do_data_mining(&env, &mut diagnostics, &mut histograms)
            .map_err(|e| e.in_column("Observation"))?;
        let mass_points = &self.config.mass_points;
        for column in &mut self.columns {
            if !mass_points.iter().any(|&m| column.is_enabled_for(m)) {
                tracing::debug!(column = %column.label(), "not used at any mass point");
                continue;
            }
            let label = column.label().to_string();
            column
                .do_data_mining(&env, &mut diagnostics, &mut histograms)
                .map_err(|e| e.in_column(label))?;
        }

        self.report_unused_nuisances();
        let models = self
            .config
            .mass_points
            .iter()
            .map(|&m| self.assemble(m))
            .collect::<Result<Vec<_>>>()?;

        if diagnostics.is_empty() {
            tracing::info!("data mining finished without warnings");
        } else {
            tracing::warn!(count = diagnostics.len(), "data mining finished with warnings");
        }
        Ok(RunReport { models, diagnostics: diagnostics.into_entries(), histograms })
    }

    fn report_unused_nuisances(&self) {
        let unused: Vec<&str> = self
            .registry
            .ids()
            .filter(|id| {
                !self
                    .columns
                    .iter()
                    .filter(|c| self.is_needed(c))
                    .any(|c| c.nuisance_ids().iter().any(|n| n == id))
            })
            .collect();
        if !unused.is_empty() {
            tracing::info!(unused = ?unused, "nuisances defined but not used by any column");
        }
    }

    fn entry(column: &DatacardColumn) -> Result<ProcessEntry> {
        let rate = column.rate()?;
        Ok(ProcessEntry {
            label: column.label().to_string(),
            process_id: column.process_id(),
            rate: rate.value,
            shape: rate.shapes.first().cloned(),
        })
    }

    fn cell(mode: ExtractorMode, result: &ExtractorResult) -> NuisanceCell {
        match (mode, result.upper_value) {
            (ExtractorMode::AsymmetricNuisance, Some(upper)) => {
                NuisanceCell::Asymmetric { lower: result.value, upper }
            }
            _ => NuisanceCell::Symmetric(result.value),
        }
    }

    /// Model for one mass point, from already mined columns.
    fn assemble(&self, mass: u32) -> Result<DatacardModel> {
        let enabled: Vec<&DatacardColumn> =
            self.columns.iter().filter(|c| c.is_enabled_for(mass)).collect();
        let processes = enabled.iter().map(|c| Self::entry(c)).collect::<Result<Vec<_>>>()?;

        let mut rows: Vec<NuisanceRow> = Vec::new();
        let mut row_index: BTreeMap<String, usize> = BTreeMap::new();
        for extractor in self.registry.iter() {
            for column in &enabled {
                let Some(result) = column.nuisance_result(extractor.id()) else {
                    continue;
                };
                let index = *row_index.entry(result.master_id.clone()).or_insert_with(|| {
                    rows.push(NuisanceRow {
                        id: result.master_id.clone(),
                        distribution: extractor.distribution().to_string(),
                        description: extractor.description().to_string(),
                        values: BTreeMap::new(),
                    });
                    rows.len() - 1
                });
                rows[index]
                    .values
                    .insert(column.label().to_string(), Self::cell(extractor.mode(), result));
            }
        }

        Ok(DatacardModel {
            name: self.config.datacard_name.clone(),
            mass_point: mass,
            luminosity: self.luminosity,
            observation: Self::entry(&self.observation)?,
            processes,
            nuisances: rows,
        })
    }
}
