//! Error types for the datacard generator
//!
//! Every variant is fatal: the run unwinds to the generator, which attaches
//! the column context and stops. Recoverable conditions (clamped counts,
//! low purity, clipped shape bins) are not errors; they are recorded as
//! diagnostics by the engine instead.

use thiserror::Error;

/// Datacard error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error (may list several problems, one per line)
    #[error("configuration error:\n{0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),

    /// A histogram requested from the store does not exist.
    #[error("histogram '{path}' not found for dataset '{dataset}'")]
    HistogramNotFound {
        /// Dataset (or merged dataset) name.
        dataset: String,
        /// Full histogram path.
        path: String,
    },

    /// A counter requested from the store does not exist.
    #[error("counter '{counter}' not found for dataset '{dataset}'")]
    CounterNotFound {
        /// Dataset name.
        dataset: String,
        /// Counter name.
        counter: String,
    },

    /// A dataset definition matched no dataset in the store.
    #[error(
        "data group '{group}': cannot find dataset definition '{definition}' (available: {})",
        available.join(", ")
    )]
    DatasetNotFound {
        /// Data group label.
        group: String,
        /// The unmatched definition.
        definition: String,
        /// All dataset names known to the store.
        available: Vec<String>,
    },

    /// Only 1-D distributions are supported by this computation.
    #[error("{context}: {dimensions}-D distributions are not supported")]
    UnsupportedDimensionality {
        /// What was being computed.
        context: String,
        /// Dimensionality of the offending input.
        dimensions: usize,
    },

    /// A nuisance definition names an extractor kind that does not exist.
    #[error("nuisance '{id}': unknown extractor kind '{kind}' (options: constant, counter, qcd_factorised)")]
    UnknownNuisanceKind {
        /// Nuisance id.
        id: String,
        /// The unrecognised kind.
        kind: String,
    },

    /// A column requested a nuisance id that has no extractor.
    #[error(
        "column '{column}': cannot find nuisance with id '{id}' (available: {})",
        available.join(", ")
    )]
    MissingNuisance {
        /// Column label.
        column: String,
        /// Requested nuisance id.
        id: String,
        /// All nuisance ids with an extractor.
        available: Vec<String>,
    },

    /// The diagnostics output store could not be created or written.
    #[error("diagnostics output: {0}")]
    DiagnosticsOutput(String),

    /// An error raised while mining one column.
    #[error("column '{column}': {source}")]
    Column {
        /// Column label.
        column: String,
        /// Underlying error.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap this error with the label of the column being mined.
    pub fn in_column(self, column: impl Into<String>) -> Self {
        Error::Column { column: column.into(), source: Box::new(self) }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_not_found_names_path() {
        let e = Error::HistogramNotFound {
            dataset: "dset_QCD".into(),
            path: "QCDfact/mtShape_bin3".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("QCDfact/mtShape_bin3"));
        assert!(msg.contains("dset_QCD"));
    }

    #[test]
    fn missing_nuisance_lists_available_ids() {
        let e = Error::MissingNuisance {
            column: "EWK".into(),
            id: "99".into(),
            available: vec!["1".into(), "2".into()],
        };
        assert!(e.to_string().contains("available: 1, 2"));
    }

    #[test]
    fn column_context_wraps_source() {
        let e = Error::Computation("zero yield".into()).in_column("QCDfact");
        assert_eq!(e.to_string(), "column 'QCDfact': Computation error: zero yield");
        assert!(std::error::Error::source(&e).is_some());
    }
}
