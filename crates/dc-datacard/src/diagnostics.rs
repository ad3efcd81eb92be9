//! Non-fatal run diagnostics and auxiliary diagnostic histograms.
//!
//! Clamped and flagged conditions never abort a run. They are recorded here
//! as typed values, logged when recorded, and surfaced with the numeric
//! results at the end of the run.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use dc_core::{Error, Result};
use dc_hist::{ClippedBin, Histogram, ShapeSlot};
use serde::{Deserialize, Serialize};

/// One non-fatal condition met during data mining.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Background-subtracted count was negative and set to zero.
    NegativeCountClamped {
        /// Region (histogram) name.
        region: String,
        /// 0-based bin.
        bin: usize,
        /// Observed content.
        observed: f64,
        /// Simulated content subtracted.
        simulated: f64,
    },
    /// Purity in (0, 0.5).
    LowPurity {
        /// Region (histogram) name.
        region: String,
        /// 0-based bin.
        bin: usize,
        /// Purity value.
        purity: f64,
        /// Purity uncertainty.
        uncertainty: f64,
    },
    /// Simulated subtraction overshoot above 1% of a per-bin shape total.
    LowShapePurity {
        /// Shape being built.
        shape: String,
        /// 0-based control-region bin.
        control_bin: usize,
        /// Output slot that went negative.
        slot: ShapeSlot,
        /// Overshoot size (events).
        impact: f64,
        /// Post-subtraction total of the per-bin shape.
        total: f64,
    },
    /// A negative shape slot set to zero with the integral preserved.
    NegativeShapeBinClipped {
        /// Shape name.
        shape: String,
        /// Slot that was zeroed.
        slot: ShapeSlot,
        /// Content before clipping.
        content: f64,
    },
    /// A control-region bin left out of the shape (sentinel efficiency).
    SkippedControlBin {
        /// Shape being built.
        shape: String,
        /// 0-based control-region bin.
        control_bin: usize,
    },
    /// A requested feature that is not implemented.
    Unsupported {
        /// Column label.
        column: String,
        /// What was requested.
        what: String,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::NegativeCountClamped { region, bin, observed, simulated } => write!(
                f,
                "negative count set to zero for {} bin {} (data={}, MC={}, result={})",
                region,
                bin,
                observed,
                simulated,
                observed - simulated
            ),
            Diagnostic::LowPurity { region, bin, purity, uncertainty } => {
                write!(f, "purity in {} bin {} is low ({} +- {})", region, bin, purity, uncertainty)
            }
            Diagnostic::LowShapePurity { shape, control_bin, slot, impact, total } => write!(
                f,
                "low purity in {} for control bin {} at {:?} (impact {} events / total={})",
                shape, control_bin, slot, impact, total
            ),
            Diagnostic::NegativeShapeBinClipped { shape, slot, content } => write!(
                f,
                "{} {:?} is negative ({}), set to zero keeping total normalisation",
                shape, slot, content
            ),
            Diagnostic::SkippedControlBin { shape, control_bin } => write!(
                f,
                "{}: control bin {} has no valid efficiency and is left out",
                shape, control_bin
            ),
            Diagnostic::Unsupported { column, what } => {
                write!(f, "{}: {} is not supported", column, what)
            }
        }
    }
}

/// Accumulated diagnostics of one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (and log) one diagnostic.
    pub fn record(&mut self, diagnostic: Diagnostic) {
        tracing::warn!("{}", diagnostic);
        self.entries.push(diagnostic);
    }

    /// Record every clipped slot of `shape`.
    pub fn record_clipped(&mut self, shape: &str, clipped: &[ClippedBin]) {
        for c in clipped {
            self.record(Diagnostic::NegativeShapeBinClipped {
                shape: shape.to_string(),
                slot: c.slot,
                content: c.content,
            });
        }
    }

    /// All entries in recording order.
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consume into the entries.
    pub fn into_entries(self) -> Vec<Diagnostic> {
        self.entries
    }
}

/// Auxiliary distributions (purity, efficiency, per-bin shapes) by stable name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiagnosticHistograms {
    histograms: BTreeMap<String, Histogram>,
}

impl DiagnosticHistograms {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `histogram` under its own name, replacing any previous entry.
    pub fn insert(&mut self, histogram: Histogram) {
        self.histograms.insert(histogram.name.clone(), histogram);
    }

    /// Look up by name.
    pub fn get(&self, name: &str) -> Option<&Histogram> {
        self.histograms.get(name)
    }

    /// Names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.histograms.keys().map(String::as_str)
    }

    /// Number of stored histograms.
    pub fn len(&self) -> usize {
        self.histograms.len()
    }

    /// True if empty.
    pub fn is_empty(&self) -> bool {
        self.histograms.is_empty()
    }

    /// Output file name derived from the datacard name.
    pub fn file_name(datacard_name: &str) -> String {
        format!("{}_QCDMeasurementFactorisedInfo.json", datacard_name.replace(' ', "_"))
    }

    /// Write all histograms as one JSON document into `dir`.
    pub fn write_json(&self, dir: &Path, datacard_name: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(dir).map_err(|e| {
            Error::DiagnosticsOutput(format!("cannot create '{}': {}", dir.display(), e))
        })?;
        let path = dir.join(Self::file_name(datacard_name));
        let text = serde_json::to_string_pretty(&self.histograms)?;
        std::fs::write(&path, text).map_err(|e| {
            Error::DiagnosticsOutput(format!("cannot write '{}': {}", path.display(), e))
        })?;
        tracing::info!(path = %path.display(), histograms = self.len(), "diagnostic histograms saved");
        Ok(path)
    }
}
