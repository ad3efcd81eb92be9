//! # dc-datacard
//!
//! Assembles datacards for a charged-Higgs search from binned histograms:
//! per-process rates and shapes, nuisance values from pluggable extractors,
//! and a data-driven factorised (ABCD) multijet background.
//!
//! ## Architecture
//!
//! ```text
//! DatacardConfig ──► DataCardGenerator ──► DatacardColumn (one per process)
//!                         │                     │
//!                         │                     ├─ rate/shape from HistogramStore
//!                         │                     └─ qcd::{RegionEventCount ×3
//!                         │                           → FactorisedEstimator
//!                         │                           → ShapeReconstructor}
//!                         └─ ExtractorRegistry ──► ExtractorResult per nuisance
//! ```
//!
//! Fatal problems are [`dc_core::Error`]s; clamped and flagged conditions are
//! [`Diagnostic`]s returned with the [`RunReport`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod column;
pub mod config;
pub mod diagnostics;
pub mod extractor;
pub mod generator;
pub mod model;
pub mod qcd;

pub use column::{DatacardColumn, MiningEnv, histogram_path};
pub use config::{
    DataGroupConfig, DatacardConfig, DatasetType, FactorisedConfig, NuisanceDefinition,
    ObservationConfig, QcdMethod,
};
pub use diagnostics::{Diagnostic, DiagnosticHistograms, Diagnostics};
pub use extractor::{
    ExtractionContext, Extractor, ExtractorKind, ExtractorMode, ExtractorRegistry, ExtractorResult,
    QcdMode,
};
pub use generator::DataCardGenerator;
pub use model::{DatacardModel, NuisanceCell, NuisanceRow, ProcessEntry, RunReport};
pub use qcd::{FactorisedEstimator, RegionEventCount, ShapeReconstructor};
