//! Histogram store contract and an in-memory implementation.
//!
//! The store is a read-only service: "binned distribution for
//! (dataset, path)" plus named counters and per-dataset normalisation info.
//! Every lookup returns an owned value; the caller drops it once folded
//! into its result.

use std::collections::BTreeMap;
use std::path::Path;

use dc_core::{Count, Error, Result};
use serde::{Deserialize, Serialize};

use crate::histogram::Histogram;

/// Normalisation information for one physical dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DatasetInfo {
    /// Collision data with its integrated luminosity (1/pb).
    Data {
        /// Integrated luminosity.
        luminosity: f64,
    },
    /// Simulated sample.
    Simulation {
        /// Cross section (pb).
        cross_section: f64,
        /// Number of generated events (before any selection).
        all_events: f64,
    },
}

impl DatasetInfo {
    /// Factor that scales this dataset to `luminosity`.
    ///
    /// Data is never rescaled; simulation is scaled by
    /// `luminosity * cross_section / all_events`.
    pub fn normalization_to_luminosity(&self, luminosity: f64) -> Result<f64> {
        match *self {
            DatasetInfo::Data { .. } => Ok(1.0),
            DatasetInfo::Simulation { cross_section, all_events } => {
                if !(all_events > 0.0) {
                    return Err(Error::Validation(format!(
                        "cannot normalise to luminosity: all_events = {}",
                        all_events
                    )));
                }
                Ok(luminosity * cross_section / all_events)
            }
        }
    }
}

/// Read-only access to per-dataset histograms and counters.
pub trait HistogramStore {
    /// All physical dataset names, in a stable order.
    fn dataset_names(&self) -> Vec<String>;

    /// Normalisation info for a dataset.
    fn dataset_info(&self, dataset: &str) -> Result<DatasetInfo>;

    /// Raw (unnormalised) histogram at `path` for `dataset`.
    fn histogram(&self, dataset: &str, path: &str) -> Result<Histogram>;

    /// Raw (unnormalised) counter value for `dataset`.
    fn counter(&self, dataset: &str, counter: &str) -> Result<Count>;
}

/// One dataset inside a [`MemoryStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDataset {
    /// Normalisation info.
    #[serde(flatten)]
    pub info: DatasetInfo,
    /// Histograms keyed by full path (`<prefix>/<name>`).
    #[serde(default)]
    pub histograms: BTreeMap<String, Histogram>,
    /// Counters keyed by name.
    #[serde(default)]
    pub counters: BTreeMap<String, Count>,
}

/// In-memory [`HistogramStore`], loadable from JSON.
///
/// ```
/// use dc_hist::{DatasetInfo, Histogram, HistogramStore, MemoryStore};
///
/// let mut store = MemoryStore::new();
/// store.add_dataset("Tau_Run2011A", DatasetInfo::Data { luminosity: 2200.0 });
/// let h = Histogram::uniform("mt", 4, 0.0, 400.0).unwrap();
/// store.add_histogram("Tau_Run2011A", "signal/mt", h).unwrap();
/// assert!(store.histogram("Tau_Run2011A", "signal/mt").is_ok());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStore {
    /// Datasets keyed by name.
    pub datasets: BTreeMap<String, StoredDataset>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a store from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a store from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let store = Self::from_json_str(&text)?;
        tracing::info!(path = %path.display(), datasets = store.datasets.len(), "histogram store loaded");
        Ok(store)
    }

    /// Add (or replace) a dataset.
    pub fn add_dataset(&mut self, name: impl Into<String>, info: DatasetInfo) {
        self.datasets.insert(
            name.into(),
            StoredDataset { info, histograms: BTreeMap::new(), counters: BTreeMap::new() },
        );
    }

    /// Add (or replace) a histogram of an existing dataset.
    pub fn add_histogram(
        &mut self,
        dataset: &str,
        path: impl Into<String>,
        histogram: Histogram,
    ) -> Result<()> {
        self.stored_mut(dataset)?.histograms.insert(path.into(), histogram);
        Ok(())
    }

    /// Add (or replace) a counter of an existing dataset.
    pub fn add_counter(&mut self, dataset: &str, name: impl Into<String>, value: Count) -> Result<()> {
        self.stored_mut(dataset)?.counters.insert(name.into(), value);
        Ok(())
    }

    fn stored(&self, dataset: &str) -> Result<&StoredDataset> {
        self.datasets
            .get(dataset)
            .ok_or_else(|| Error::Validation(format!("unknown dataset '{}'", dataset)))
    }

    fn stored_mut(&mut self, dataset: &str) -> Result<&mut StoredDataset> {
        self.datasets
            .get_mut(dataset)
            .ok_or_else(|| Error::Validation(format!("unknown dataset '{}'", dataset)))
    }
}

impl HistogramStore for MemoryStore {
    fn dataset_names(&self) -> Vec<String> {
        self.datasets.keys().cloned().collect()
    }

    fn dataset_info(&self, dataset: &str) -> Result<DatasetInfo> {
        Ok(self.stored(dataset)?.info)
    }

    fn histogram(&self, dataset: &str, path: &str) -> Result<Histogram> {
        let mut h = self.stored(dataset)?.histograms.get(path).cloned().ok_or_else(|| {
            Error::HistogramNotFound { dataset: dataset.to_string(), path: path.to_string() }
        })?;
        if let Some(problem) = h.layout_problem() {
            return Err(Error::Validation(format!(
                "histogram '{}' of dataset '{}': {}",
                path, dataset, problem
            )));
        }
        if h.name.is_empty() {
            h.name = path.rsplit('/').next().unwrap_or(path).to_string();
        }
        Ok(h)
    }

    fn counter(&self, dataset: &str, counter: &str) -> Result<Count> {
        self.stored(dataset)?.counters.get(counter).copied().ok_or_else(|| {
            Error::CounterNotFound { dataset: dataset.to_string(), counter: counter.to_string() }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const STORE_JSON: &str = r#"{
        "datasets": {
            "TTJets": {
                "kind": "simulation",
                "cross_section": 165.0,
                "all_events": 1000000.0,
                "histograms": {
                    "signal/mt": {
                        "bin_edges": [0.0, 100.0, 200.0],
                        "bin_content": [10.0, 5.0],
                        "bin_error": [1.0, 0.5]
                    }
                },
                "counters": { "passed MET": { "value": 42.0, "uncertainty": 3.0 } }
            },
            "Tau_Run2011A": { "kind": "data", "luminosity": 2200.0 }
        }
    }"#;

    #[test]
    fn test_parse_store_json() {
        let store = MemoryStore::from_json_str(STORE_JSON).unwrap();
        assert_eq!(store.dataset_names(), vec!["TTJets".to_string(), "Tau_Run2011A".to_string()]);
        let h = store.histogram("TTJets", "signal/mt").unwrap();
        assert_eq!(h.name, "mt");
        assert_relative_eq!(h.integral(), 15.0);
        let c = store.counter("TTJets", "passed MET").unwrap();
        assert_relative_eq!(c.value(), 42.0);
        assert!(matches!(
            store.dataset_info("Tau_Run2011A").unwrap(),
            DatasetInfo::Data { luminosity } if luminosity == 2200.0
        ));
    }

    #[test]
    fn test_missing_entries_are_typed_errors() {
        let store = MemoryStore::from_json_str(STORE_JSON).unwrap();
        match store.histogram("TTJets", "signal/missing") {
            Err(Error::HistogramNotFound { path, .. }) => assert_eq!(path, "signal/missing"),
            other => panic!("expected HistogramNotFound, got {:?}", other),
        }
        assert!(matches!(
            store.counter("TTJets", "nope"),
            Err(Error::CounterNotFound { .. })
        ));
    }

    #[test]
    fn test_malformed_histograms_rejected_on_read() {
        let json = r#"{
            "datasets": {
                "WJets": {
                    "kind": "simulation",
                    "cross_section": 1.0,
                    "all_events": 10.0,
                    "histograms": {
                        "QCDfact/afterMET": {
                            "bin_edges": [0.0, 1.0, 2.0],
                            "bin_content": [4.0],
                            "bin_error": [1.0, 1.0]
                        },
                        "QCDfact/empty": {
                            "bin_edges": [],
                            "bin_content": [1.0],
                            "bin_error": [1.0]
                        },
                        "QCDfact/flat2d": {
                            "dimension": { "kind": "two", "n_bins_y": 3 },
                            "bin_edges": [0.0, 1.0, 2.0],
                            "bin_content": [1.0, 2.0],
                            "bin_error": [1.0, 1.0]
                        }
                    }
                }
            }
        }"#;
        let store = MemoryStore::from_json_str(json).unwrap();
        for path in ["QCDfact/afterMET", "QCDfact/empty", "QCDfact/flat2d"] {
            match store.histogram("WJets", path) {
                Err(Error::Validation(msg)) => {
                    assert!(msg.contains(path), "{}", msg);
                    assert!(msg.contains("WJets"), "{}", msg);
                }
                other => panic!("expected validation error for {}, got {:?}", path, other),
            }
        }
    }

    #[test]
    fn test_normalization_factor() {
        let info = DatasetInfo::Simulation { cross_section: 165.0, all_events: 1.0e6 };
        assert_relative_eq!(info.normalization_to_luminosity(2200.0).unwrap(), 0.363);
        let data = DatasetInfo::Data { luminosity: 2200.0 };
        assert_relative_eq!(data.normalization_to_luminosity(1.0).unwrap(), 1.0);
        let broken = DatasetInfo::Simulation { cross_section: 1.0, all_events: 0.0 };
        assert!(broken.normalization_to_luminosity(1.0).is_err());
    }
}
