//! Nuisance extractors and their registry.
//!
//! An [`Extractor`] turns one configured nuisance source into a value (and
//! optionally alternate shapes) for one column. The set of algorithms is a
//! closed enum; the [`ExtractorRegistry`] is built once from the
//! configuration and handed to the generator.

use dc_core::{Error, Result};
use dc_hist::{Histogram, HistogramStore, MergedDataset};
use serde::Serialize;

use crate::config::NuisanceDefinition;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::qcd::FactorisedEstimator;

/// How a nuisance enters the statistical model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorMode {
    /// Symmetric rate nuisance.
    Nuisance,
    /// Rate nuisance with separate lower and upper values.
    AsymmetricNuisance,
    /// Shape nuisance (alternate shapes).
    ShapeNuisance,
}

/// Which factorised-estimate uncertainty a QCD nuisance reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QcdMode {
    /// Data and simulation statistics.
    Statistics,
    /// Assumed simulation systematics.
    Systematics,
}

/// Extraction algorithm.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractorKind {
    /// Fixed value.
    Constant {
        /// Value (the lower one when asymmetric).
        value: f64,
        /// Upper value of an asymmetric nuisance.
        upper: Option<f64>,
    },
    /// Counter read from the column's datasets.
    Counter {
        /// Counter name.
        counter: String,
    },
    /// Relative uncertainty of the column's factorised estimate.
    QcdFactorised {
        /// Reported component.
        mode: QcdMode,
    },
}

/// Result of one extraction.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractorResult {
    /// Nuisance id (`rate` for the rate itself).
    pub id: String,
    /// Master nuisance id.
    pub master_id: String,
    /// Value (lower value when asymmetric).
    pub value: f64,
    /// Upper value of an asymmetric nuisance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upper_value: Option<f64>,
    /// Shapes (rate shape or alternate shapes).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub shapes: Vec<Histogram>,
}

impl ExtractorResult {
    /// Rate result of a column.
    pub fn rate(value: f64, shapes: Vec<Histogram>) -> Self {
        Self { id: "rate".into(), master_id: "rate".into(), value, upper_value: None, shapes }
    }
}

/// What an extractor may read while mining one column.
pub struct ExtractionContext<'a> {
    /// Column label.
    pub column: &'a str,
    /// Histogram store.
    pub store: &'a dyn HistogramStore,
    /// The column's merged datasets, if it has any.
    pub dataset: Option<&'a MergedDataset>,
    /// Run luminosity.
    pub luminosity: f64,
    /// The column's factorised estimate, for the QCD column only.
    pub estimator: Option<&'a FactorisedEstimator>,
}

/// One configured nuisance source.
#[derive(Debug, Clone, Serialize)]
pub struct Extractor {
    id: String,
    master_id: String,
    distribution: String,
    description: String,
    mode: ExtractorMode,
    kind: ExtractorKind,
}

impl Extractor {
    /// Create an extractor directly.
    pub fn new(
        id: impl Into<String>,
        master_id: Option<String>,
        distribution: impl Into<String>,
        description: impl Into<String>,
        mode: ExtractorMode,
        kind: ExtractorKind,
    ) -> Self {
        let id = id.into();
        Self {
            master_id: master_id.unwrap_or_else(|| id.clone()),
            id,
            distribution: distribution.into(),
            description: description.into(),
            mode,
            kind,
        }
    }

    /// Build from a configured nuisance. Unknown kinds and missing
    /// parameters fail here, before any data mining.
    pub fn from_definition(def: &NuisanceDefinition) -> Result<Self> {
        let missing = |field: &str| {
            Error::Config(format!("- nuisance '{}' ({}): missing field '{}'", def.id, def.kind, field))
        };
        let kind = match def.kind.as_str() {
            "constant" => ExtractorKind::Constant {
                value: def.value.ok_or_else(|| missing("value"))?,
                upper: def.upper_value.filter(|&u| u > 0.0),
            },
            "counter" => ExtractorKind::Counter {
                counter: def.counter.clone().ok_or_else(|| missing("counter"))?,
            },
            "qcd_factorised" => {
                let mode = match def.qcd_mode.as_deref() {
                    Some("statistics") => QcdMode::Statistics,
                    Some("systematics") => QcdMode::Systematics,
                    Some(other) => {
                        return Err(Error::Config(format!(
                            "- nuisance '{}': unknown qcd_mode '{}' (options: statistics, systematics)",
                            def.id, other
                        )));
                    }
                    None => return Err(missing("qcd_mode")),
                };
                ExtractorKind::QcdFactorised { mode }
            }
            other => {
                return Err(Error::UnknownNuisanceKind { id: def.id.clone(), kind: other.to_string() });
            }
        };
        let mode = if def.shape {
            ExtractorMode::ShapeNuisance
        } else if matches!(kind, ExtractorKind::Constant { upper: Some(_), .. }) {
            ExtractorMode::AsymmetricNuisance
        } else {
            ExtractorMode::Nuisance
        };
        Ok(Self::new(
            def.id.clone(),
            def.master_id.clone(),
            def.distribution.clone(),
            def.label.clone(),
            mode,
            kind,
        ))
    }

    /// Nuisance id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Master nuisance id.
    pub fn master_id(&self) -> &str {
        &self.master_id
    }

    /// Distribution keyword.
    pub fn distribution(&self) -> &str {
        &self.distribution
    }

    /// Description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Mode.
    pub fn mode(&self) -> ExtractorMode {
        self.mode
    }

    /// True for shape nuisances.
    pub fn is_shape_nuisance(&self) -> bool {
        self.mode == ExtractorMode::ShapeNuisance
    }

    /// Extract the value for one column.
    pub fn extract(
        &self,
        ctx: &ExtractionContext<'_>,
        diagnostics: &mut Diagnostics,
    ) -> Result<ExtractorResult> {
        let (value, upper_value) = match &self.kind {
            ExtractorKind::Constant { value, upper } => (*value, *upper),
            ExtractorKind::Counter { counter } => {
                if ctx.estimator.is_some() {
                    return Err(Error::Config(format!(
                        "- nuisance '{}': counter extraction is not available for the factorised QCD column",
                        self.id
                    )));
                }
                let dataset = ctx.dataset.ok_or_else(|| {
                    Error::Config(format!(
                        "- nuisance '{}': counter extraction needs datasets but column '{}' has none",
                        self.id, ctx.column
                    ))
                })?;
                let count = dataset.counter(ctx.store, counter, Some(ctx.luminosity))?;
                (count.value(), None)
            }
            ExtractorKind::QcdFactorised { mode } => {
                let estimator = ctx.estimator.ok_or_else(|| {
                    Error::Config(format!(
                        "- nuisance '{}' is a factorised QCD nuisance but column '{}' is not factorised QCD",
                        self.id, ctx.column
                    ))
                })?;
                let value = match mode {
                    QcdMode::Statistics => estimator.relative_statistical_uncertainty()?,
                    QcdMode::Systematics => estimator.relative_systematic_uncertainty()?,
                };
                (value, None)
            }
        };
        if self.is_shape_nuisance() {
            diagnostics.record(Diagnostic::Unsupported {
                column: ctx.column.to_string(),
                what: format!("shape variation for nuisance '{}'", self.id),
            });
        }
        tracing::debug!(column = ctx.column, nuisance = %self.id, value, "nuisance extracted");
        Ok(ExtractorResult {
            id: self.id.clone(),
            master_id: self.master_id.clone(),
            value,
            upper_value,
            shapes: Vec::new(),
        })
    }
}

/// All extractors of a run, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct ExtractorRegistry {
    extractors: Vec<Extractor>,
}

impl ExtractorRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one extractor per configured nuisance; repeated ids are rejected.
    pub fn from_definitions(definitions: &[NuisanceDefinition]) -> Result<Self> {
        let mut registry = Self::new();
        for def in definitions {
            registry.register(Extractor::from_definition(def)?)?;
        }
        tracing::debug!(count = registry.len(), "nuisance extractors built");
        Ok(registry)
    }

    /// Add an extractor; a repeated id is a configuration error.
    pub fn register(&mut self, extractor: Extractor) -> Result<()> {
        if self.extractors.iter().any(|e| e.id == extractor.id) {
            return Err(Error::Config(format!("- duplicate nuisance id '{}'", extractor.id)));
        }
        self.extractors.push(extractor);
        Ok(())
    }

    /// Extractor for `id`, as requested by `column`.
    pub fn get(&self, column: &str, id: &str) -> Result<&Extractor> {
        self.extractors.iter().find(|e| e.id == id).ok_or_else(|| Error::MissingNuisance {
            column: column.to_string(),
            id: id.to_string(),
            available: self.ids().map(str::to_string).collect(),
        })
    }

    /// All ids in order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.extractors.iter().map(|e| e.id.as_str())
    }

    /// All extractors in order.
    pub fn iter(&self) -> impl Iterator<Item = &Extractor> {
        self.extractors.iter()
    }

    /// Number of extractors.
    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    /// True if empty.
    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }
}
