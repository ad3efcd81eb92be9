//! Merged datasets: several physical datasets read as one logical column.

use dc_core::{Count, Error, Result};

use crate::histogram::Histogram;
use crate::store::{DatasetInfo, HistogramStore};

/// Resolve dataset definitions against the names known to the store.
///
/// A definition selects every dataset whose name contains it. A definition
/// that selects nothing is fatal; the error lists every available name.
pub fn find_dataset_names(
    group: &str,
    available: &[String],
    definitions: &[String],
) -> Result<Vec<String>> {
    let mut found: Vec<String> = Vec::new();
    for definition in definitions {
        let matches: Vec<&String> =
            available.iter().filter(|name| name.contains(definition.as_str())).collect();
        if matches.is_empty() {
            return Err(Error::DatasetNotFound {
                group: group.to_string(),
                definition: definition.clone(),
                available: available.to_vec(),
            });
        }
        for name in matches {
            if !found.contains(name) {
                found.push(name.clone());
            }
        }
    }
    Ok(found)
}

/// Several physical datasets merged under one name.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedDataset {
    name: String,
    members: Vec<String>,
}

impl MergedDataset {
    /// Merge explicit members.
    pub fn new(name: impl Into<String>, members: Vec<String>) -> Self {
        Self { name: name.into(), members }
    }

    /// Merge every dataset selected by `definitions` (see [`find_dataset_names`]).
    pub fn resolve(
        store: &dyn HistogramStore,
        group: &str,
        name: impl Into<String>,
        definitions: &[String],
    ) -> Result<Self> {
        let members = find_dataset_names(group, &store.dataset_names(), definitions)?;
        let merged = Self::new(name, members);
        tracing::debug!(group, merged = %merged.name, members = ?merged.members, "merged datasets");
        Ok(merged)
    }

    /// Merged name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fetch `path` from every member; call
    /// [`DatasetHistogram::normalize_to_luminosity`] before reading for simulation.
    pub fn root_histogram(&self, store: &dyn HistogramStore, path: &str) -> Result<DatasetHistogram> {
        if self.members.is_empty() {
            return Err(Error::HistogramNotFound {
                dataset: self.name.clone(),
                path: path.to_string(),
            });
        }
        let parts = self
            .members
            .iter()
            .map(|m| Ok((store.dataset_info(m)?, store.histogram(m, path)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(DatasetHistogram { path: path.to_string(), parts, luminosity: None })
    }

    /// Sum of a counter over members, normalised to `luminosity` if given.
    pub fn counter(
        &self,
        store: &dyn HistogramStore,
        counter: &str,
        luminosity: Option<f64>,
    ) -> Result<Count> {
        if self.members.is_empty() {
            return Err(Error::CounterNotFound {
                dataset: self.name.clone(),
                counter: counter.to_string(),
            });
        }
        let mut total = Count::ZERO;
        for member in &self.members {
            let value = store.counter(member, counter)?;
            let factor = match luminosity {
                Some(lumi) => store.dataset_info(member)?.normalization_to_luminosity(lumi)?,
                None => 1.0,
            };
            total = total + value.scale(factor);
        }
        Ok(total)
    }

    /// Integrated luminosity of the data members.
    pub fn luminosity(&self, store: &dyn HistogramStore) -> Result<f64> {
        let mut lumi = 0.0;
        let mut any_data = false;
        for member in &self.members {
            if let DatasetInfo::Data { luminosity } = store.dataset_info(member)? {
                lumi += luminosity;
                any_data = true;
            }
        }
        if !any_data {
            return Err(Error::Validation(format!(
                "merged dataset '{}' contains no collision data, cannot take luminosity",
                self.name
            )));
        }
        Ok(lumi)
    }
}

/// A histogram fetched from every member of a [`MergedDataset`].
#[derive(Debug, Clone)]
pub struct DatasetHistogram {
    path: String,
    parts: Vec<(DatasetInfo, Histogram)>,
    luminosity: Option<f64>,
}

impl DatasetHistogram {
    /// Scale simulated members to `luminosity` when read.
    pub fn normalize_to_luminosity(&mut self, luminosity: f64) {
        self.luminosity = Some(luminosity);
    }

    /// Member sum (errors in quadrature), normalised if requested.
    pub fn histogram(self) -> Result<Histogram> {
        let luminosity = self.luminosity;
        let mut parts = self.parts.into_iter();
        let (info, mut total) = parts.next().ok_or_else(|| {
            Error::Computation(format!("empty merged histogram '{}'", self.path))
        })?;
        if let Some(lumi) = luminosity {
            total.scale(info.normalization_to_luminosity(lumi)?);
        }
        for (info, mut h) in parts {
            if let Some(lumi) = luminosity {
                h.scale(info.normalization_to_luminosity(lumi)?);
            }
            total.add_assign_bins(&h)?;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use approx::assert_relative_eq;

    fn store() -> MemoryStore {
        let mut s = MemoryStore::new();
        s.add_dataset("Tau_Run2011A", DatasetInfo::Data { luminosity: 200.0 });
        s.add_dataset("Tau_Run2011B", DatasetInfo::Data { luminosity: 800.0 });
        s.add_dataset("WJets", DatasetInfo::Simulation { cross_section: 10.0, all_events: 100.0 });
        for (name, value) in [("Tau_Run2011A", 1.0), ("Tau_Run2011B", 3.0), ("WJets", 2.0)] {
            let h = Histogram::from_bins("mt", vec![0.0, 1.0], vec![value], vec![1.0]).unwrap();
            s.add_histogram(name, "sel/mt", h).unwrap();
            s.add_counter(name, "passed", Count::new(value, 0.0)).unwrap();
        }
        s
    }

    #[test]
    fn test_find_dataset_names_substring() {
        let names = store().dataset_names();
        let found = find_dataset_names("Data", &names, &["Tau_".to_string()]).unwrap();
        assert_eq!(found, vec!["Tau_Run2011A".to_string(), "Tau_Run2011B".to_string()]);
    }

    #[test]
    fn test_find_dataset_names_reports_options() {
        let names = store().dataset_names();
        match find_dataset_names("EWK", &names, &["DYJets".to_string()]) {
            Err(Error::DatasetNotFound { definition, available, .. }) => {
                assert_eq!(definition, "DYJets");
                assert_eq!(available.len(), 3);
            }
            other => panic!("expected DatasetNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_merged_histogram_and_luminosity() {
        let s = store();
        let data = MergedDataset::resolve(&s, "Data", "dset_data", &["Tau_".to_string()]).unwrap();
        assert_relative_eq!(data.luminosity(&s).unwrap(), 1000.0);
        let h = data.root_histogram(&s, "sel/mt").unwrap().histogram().unwrap();
        assert_relative_eq!(h.bin_content[0], 4.0);
        assert_relative_eq!(h.bin_error[0], 2.0_f64.sqrt());
    }

    #[test]
    fn test_simulation_normalized_to_luminosity() {
        let s = store();
        let mc = MergedDataset::new("dset_ewk", vec!["WJets".to_string()]);
        let mut dh = mc.root_histogram(&s, "sel/mt").unwrap();
        dh.normalize_to_luminosity(1000.0);
        let h = dh.histogram().unwrap();
        // 2 events * 1000 * 10 / 100
        assert_relative_eq!(h.bin_content[0], 200.0);
        let c = mc.counter(&s, "passed", Some(1000.0)).unwrap();
        assert_relative_eq!(c.value(), 200.0);
        assert!(mc.luminosity(&s).is_err());
    }
}
