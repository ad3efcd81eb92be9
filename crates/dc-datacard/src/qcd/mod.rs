//! Factorised (ABCD) multijet background measurement.
//!
//! - [`RegionEventCount`]: data minus simulated EWK at one selection point
//! - [`FactorisedEstimator`]: control region and two legs combined into a yield
//! - [`ShapeReconstructor`]: per-control-bin shape normalised to that yield

pub mod column;
pub mod estimator;
pub mod event_count;
pub mod shape;

pub use column::{FactorisedInputs, mine_factorised};
pub use estimator::FactorisedEstimator;
pub use event_count::{RegionBin, RegionEventCount};
pub use shape::{ReconstructedShape, SHAPE_PURITY_THRESHOLD, ShapeReconstructor, ShapeSource};
