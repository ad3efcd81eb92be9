//! # dc-hist
//!
//! Binned distributions and the histogram store the datacard engine reads from.
//!
//! - [`Histogram`]: 1-D binned distribution with errors and under/overflow
//!   (2-D/3-D inputs are carried only so they can be rejected explicitly)
//! - [`HistogramStore`]: read-only "(dataset, path) -> histogram" service,
//!   with [`MemoryStore`] as a JSON-backed implementation
//! - [`MergedDataset`]: several physical datasets read as one, with
//!   luminosity normalisation of simulated members
//! - [`ShapeModifier`]: add/subtract/finalise shapes on the output binning
//!
//! ## Example
//!
//! ```
//! use dc_hist::{ShapeBinning, ShapeModifier, Histogram};
//!
//! let modifier = ShapeModifier::new(&ShapeBinning {
//!     n_bins: 4, min: 0.0, max: 400.0, variable_edges: None,
//! }).unwrap();
//! let mut shape = modifier.create_empty("QCD");
//! let mut h = Histogram::uniform("mt", 8, 0.0, 400.0).unwrap();
//! h.bin_content[0] = 3.0;
//! modifier.add_shape(&h, &mut shape).unwrap();
//! assert_eq!(shape.bin_content[0], 3.0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dataset;
pub mod histogram;
pub mod shape;
pub mod store;

pub use dataset::{DatasetHistogram, MergedDataset, find_dataset_names};
pub use histogram::{BinIndex, Dimension, Histogram};
pub use shape::{
    ClippedBin, ShapeBinning, ShapeModifier, ShapeSlot, SubtractionImpact, clip_negative_bins,
};
pub use store::{DatasetInfo, HistogramStore, MemoryStore, StoredDataset};
