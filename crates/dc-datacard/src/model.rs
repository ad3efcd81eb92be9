//! Logical content of an assembled datacard.
//!
//! Serialisable for inspection; rendering into a limit tool's syntax is
//! left to that tool's frontend.

use std::collections::BTreeMap;

use dc_hist::Histogram;
use serde::Serialize;

use crate::diagnostics::{Diagnostic, DiagnosticHistograms};

/// Rate and shape of one column.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessEntry {
    /// Column label.
    pub label: String,
    /// Process id.
    pub process_id: i32,
    /// Expected (or observed) event count.
    pub rate: f64,
    /// Shape on the output binning, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shape: Option<Histogram>,
}

/// Value of one nuisance for one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NuisanceCell {
    /// Single value.
    Symmetric(f64),
    /// Separate lower and upper values.
    Asymmetric {
        /// Lower value.
        lower: f64,
        /// Upper value.
        upper: f64,
    },
}

/// One nuisance row of the datacard (keyed by master id).
#[derive(Debug, Clone, Serialize)]
pub struct NuisanceRow {
    /// Master id.
    pub id: String,
    /// Distribution keyword.
    pub distribution: String,
    /// Description.
    pub description: String,
    /// Values of the columns affected by this nuisance.
    pub values: BTreeMap<String, NuisanceCell>,
}

/// Datacard for one mass point.
#[derive(Debug, Clone, Serialize)]
pub struct DatacardModel {
    /// Datacard name.
    pub name: String,
    /// Mass point.
    pub mass_point: u32,
    /// Luminosity (1/pb).
    pub luminosity: f64,
    /// Observed data.
    pub observation: ProcessEntry,
    /// Processes enabled at this mass point.
    pub processes: Vec<ProcessEntry>,
    /// Nuisance rows.
    pub nuisances: Vec<NuisanceRow>,
}

impl DatacardModel {
    /// Process entry by label.
    pub fn process(&self, label: &str) -> Option<&ProcessEntry> {
        self.processes.iter().find(|p| p.label == label)
    }

    /// Nuisance row by master id.
    pub fn nuisance(&self, id: &str) -> Option<&NuisanceRow> {
        self.nuisances.iter().find(|n| n.id == id)
    }

    /// Output file name for this mass point.
    pub fn file_name(&self) -> String {
        format!("{}_m{}.json", self.name.replace(' ', "_"), self.mass_point)
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// One model per mass point.
    pub models: Vec<DatacardModel>,
    /// Non-fatal conditions met during the run.
    pub diagnostics: Vec<Diagnostic>,
    /// Auxiliary distributions of the factorised measurement.
    #[serde(skip)]
    pub histograms: DiagnosticHistograms,
}
