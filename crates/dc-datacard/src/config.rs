//! Datacard configuration (YAML; JSON is accepted as a YAML subset).

use std::collections::BTreeSet;
use std::path::Path;

use dc_core::{Error, Result};
use dc_hist::ShapeBinning;
use serde::{Deserialize, Serialize};

/// Multijet (QCD) background measurement method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QcdMethod {
    /// Factorised (ABCD) estimate.
    Factorised,
    /// Inverted-isolation estimate (recognised, not implemented).
    Inverted,
}

/// Where a data group's datasets come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetType {
    /// Simulated signal.
    Signal,
    /// Embedded (data-driven) EWK background.
    Embedding,
    /// Factorised multijet background.
    QcdFactorised,
    /// No datasets (placeholder column).
    #[serde(rename = "none")]
    Empty,
}

/// Observed-data column settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservationConfig {
    /// Dataset name patterns merged into the observation.
    #[serde(default)]
    pub dataset_definitions: Vec<String>,
    /// Counter giving the observed rate.
    #[serde(default)]
    pub rate_counter: String,
    /// Histogram directory.
    #[serde(default)]
    pub path_prefix: String,
    /// Shape histogram name.
    #[serde(default)]
    pub shape_histogram: String,
}

fn default_normalisation() -> f64 {
    1.0
}

/// One configured process (datacard column).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataGroupConfig {
    /// Column label.
    pub label: String,
    /// Process id in the statistical model (signal <= 0, backgrounds > 0).
    pub process_id: i32,
    /// Mass points for which this column is present.
    #[serde(default)]
    pub valid_mass_points: Vec<u32>,
    /// Dataset origin.
    pub dataset_type: DatasetType,
    /// Dataset name patterns merged into this column.
    #[serde(default)]
    pub dataset_definitions: Vec<String>,
    /// Simulated EWK patterns subtracted in the factorised estimate.
    #[serde(default)]
    pub simulated_ewk_dataset_definitions: Vec<String>,
    /// Counter giving the rate.
    #[serde(default)]
    pub rate_counter: String,
    /// Requested nuisance ids.
    #[serde(default)]
    pub nuisances: Vec<String>,
    /// Extra factor applied to the rate and shape.
    #[serde(default = "default_normalisation")]
    pub additional_normalisation: f64,
    /// Histogram directory.
    #[serde(default)]
    pub path_prefix: String,
    /// Shape histogram name.
    #[serde(default)]
    pub shape_histogram: String,
}

fn default_distribution() -> String {
    "lnN".into()
}

/// One nuisance source. `kind` is resolved to an extractor when the
/// registry is built; an unknown kind is fatal there.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NuisanceDefinition {
    /// Nuisance id.
    pub id: String,
    /// Id of the master nuisance this one is merged into (defaults to `id`).
    #[serde(default)]
    pub master_id: Option<String>,
    /// Human readable description.
    #[serde(default)]
    pub label: String,
    /// Distribution keyword in the statistical model.
    #[serde(default = "default_distribution")]
    pub distribution: String,
    /// Extractor kind (`constant`, `counter`, `qcd_factorised`).
    pub kind: String,
    /// Value for constant nuisances (lower value when asymmetric).
    #[serde(default)]
    pub value: Option<f64>,
    /// Upper value; makes a constant nuisance asymmetric when > 0.
    #[serde(default)]
    pub upper_value: Option<f64>,
    /// Counter for counter-lookup nuisances.
    #[serde(default)]
    pub counter: Option<String>,
    /// `statistics` or `systematics` for QCD factorised nuisances.
    #[serde(default)]
    pub qcd_mode: Option<String>,
    /// Shape nuisance (alternate shapes requested).
    #[serde(default)]
    pub shape: bool,
}

/// Inputs of the factorised multijet estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorisedConfig {
    /// Control region (after the big-box selection).
    pub control_region_histogram: String,
    /// First leg (MET leg) region.
    pub leg1_histogram: String,
    /// Second leg (tau leg) region.
    pub leg2_histogram: String,
    /// Base name of the per-control-bin derived observable histograms.
    pub derived_observable_base_name: String,
    /// Fractional systematic uncertainty assumed on the simulated EWK.
    pub assumed_simulated_systematic_fraction: f64,
}

/// Complete datacard configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatacardConfig {
    /// Datacard (analysis) name.
    #[serde(default)]
    pub datacard_name: String,
    /// Mass points to generate.
    #[serde(default)]
    pub mass_points: Vec<u32>,
    /// QCD measurement method.
    #[serde(default)]
    pub qcd_method: Option<QcdMethod>,
    /// Luminosity override (1/pb); defaults to the observation luminosity.
    #[serde(default)]
    pub luminosity: Option<f64>,
    /// Output shape binning.
    #[serde(default)]
    pub shape_binning: Option<ShapeBinning>,
    /// Observed data.
    #[serde(default)]
    pub observation: Option<ObservationConfig>,
    /// Columns.
    #[serde(default)]
    pub data_groups: Vec<DataGroupConfig>,
    /// Nuisance sources.
    #[serde(default)]
    pub nuisances: Vec<NuisanceDefinition>,
    /// Factorised QCD inputs.
    #[serde(default)]
    pub qcd_factorised: Option<FactorisedConfig>,
}

impl DatacardConfig {
    /// Parse YAML (or JSON) text.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml_ng::from_str(text).map_err(|e| Error::Config(format!("- parse error: {}", e)))
    }

    /// Read and parse a configuration file (not yet validated).
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = serde_yaml_ng::from_str(&text).map_err(|e| {
            Error::Config(format!("- parsing {}: {}", path.display(), e))
        })?;
        tracing::info!(path = %path.display(), "datacard configuration loaded");
        Ok(config)
    }

    /// The output binning (only valid after [`DatacardConfig::validate`]).
    pub fn shape_binning(&self) -> Result<&ShapeBinning> {
        self.shape_binning
            .as_ref()
            .ok_or_else(|| Error::Config("- missing field 'shape_binning'".into()))
    }

    /// The observation settings (only valid after [`DatacardConfig::validate`]).
    pub fn observation(&self) -> Result<&ObservationConfig> {
        self.observation
            .as_ref()
            .ok_or_else(|| Error::Config("- missing field 'observation'".into()))
    }

    /// Check the whole configuration, reporting every problem at once.
    pub fn validate(&self) -> Result<()> {
        let mut problems: Vec<String> = Vec::new();

        if self.datacard_name.trim().is_empty() {
            problems.push("missing field 'datacard_name' (name of the datacard)".into());
        }
        if self.mass_points.is_empty() {
            problems.push("field 'mass_points' needs at least one entry".into());
        }
        match self.qcd_method {
            None => problems.push(
                "missing field 'qcd_method' (options: 'factorised' or 'inverted')".into(),
            ),
            Some(QcdMethod::Inverted) => {
                problems.push("qcd_method 'inverted' is not implemented".into())
            }
            Some(QcdMethod::Factorised) => {}
        }
        if let Some(lumi) = self.luminosity
            && !(lumi > 0.0)
        {
            problems.push(format!("'luminosity' must be positive (got {})", lumi));
        }
        match &self.shape_binning {
            None => problems.push(
                "missing field 'shape_binning' (n_bins, min, max or variable_edges)".into(),
            ),
            Some(b) => {
                if b.variable_edges.is_none() && (b.n_bins == 0 || !(b.max > b.min)) {
                    problems.push(format!(
                        "'shape_binning' needs n_bins > 0 and max > min (got {}, {}, {})",
                        b.n_bins, b.min, b.max
                    ));
                }
                if let Some(edges) = &b.variable_edges
                    && (edges.len() < 2 || edges.windows(2).any(|w| !(w[1] > w[0])))
                {
                    problems.push(
                        "'shape_binning.variable_edges' must be at least two increasing edges"
                            .into(),
                    );
                }
            }
        }
        match &self.observation {
            None => problems.push("missing field 'observation'".into()),
            Some(obs) => {
                if obs.dataset_definitions.is_empty() {
                    problems.push("'observation' needs at least one dataset definition".into());
                }
                if obs.rate_counter.is_empty() {
                    problems.push("'observation' is missing 'rate_counter'".into());
                }
            }
        }
        if self.data_groups.is_empty() {
            problems.push("need at least one entry in 'data_groups'".into());
        }
        if self.nuisances.is_empty() {
            problems.push("need at least one entry in 'nuisances'".into());
        }

        let mut labels = BTreeSet::new();
        for group in &self.data_groups {
            self.validate_group(group, &mut problems);
            if !labels.insert(group.label.as_str()) {
                problems.push(format!("duplicate data group label '{}'", group.label));
            }
        }

        let mut ids = BTreeSet::new();
        for n in &self.nuisances {
            if n.id.trim().is_empty() {
                problems.push("nuisance with empty 'id'".into());
            } else if !ids.insert(n.id.as_str()) {
                problems.push(format!("duplicate nuisance id '{}'", n.id));
            }
        }

        if problems.is_empty() {
            return Ok(());
        }
        let message =
            problems.iter().map(|p| format!("- {}", p)).collect::<Vec<_>>().join("\n");
        Err(Error::Config(message))
    }

    fn validate_group(&self, group: &DataGroupConfig, problems: &mut Vec<String>) {
        let label = &group.label;
        if label.trim().is_empty() {
            problems.push("data group with empty 'label'".into());
        }
        if group.dataset_type != DatasetType::Empty && group.dataset_definitions.is_empty() {
            problems.push(format!("data group '{}' needs at least one dataset definition", label));
        }
        if !(group.additional_normalisation >= 0.0) {
            problems.push(format!(
                "data group '{}': 'additional_normalisation' must be non-negative",
                label
            ));
        }
        match group.dataset_type {
            DatasetType::Signal | DatasetType::Embedding => {
                if group.rate_counter.is_empty() {
                    problems.push(format!("data group '{}' is missing 'rate_counter'", label));
                }
            }
            DatasetType::QcdFactorised => {
                if group.simulated_ewk_dataset_definitions.is_empty() {
                    problems.push(format!(
                        "data group '{}' needs 'simulated_ewk_dataset_definitions'",
                        label
                    ));
                }
                match &self.qcd_factorised {
                    None => problems.push(format!(
                        "data group '{}' is factorised QCD but 'qcd_factorised' is missing",
                        label
                    )),
                    Some(f) => {
                        if !(f.assumed_simulated_systematic_fraction >= 0.0) {
                            problems.push(
                                "'qcd_factorised.assumed_simulated_systematic_fraction' must be non-negative"
                                    .into(),
                            );
                        }
                    }
                }
            }
            DatasetType::Empty => {}
        }
    }
}
