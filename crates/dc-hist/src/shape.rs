//! Shape building on the fixed output binning of the datacard.
//!
//! Source histograms may come with any binning; every source bin is routed
//! by its centre into the output binning. Under- and overflow are carried
//! as two extra slots so that integrals including flows stay meaningful.

use dc_core::{Result, quadrature_sum};
use serde::{Deserialize, Serialize};

use crate::histogram::{BinIndex, Histogram};

/// Output binning of shape histograms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeBinning {
    /// Number of uniform bins (ignored when `variable_edges` is set).
    pub n_bins: usize,
    /// Lower edge.
    pub min: f64,
    /// Upper edge.
    pub max: f64,
    /// Explicit bin edges.
    #[serde(default)]
    pub variable_edges: Option<Vec<f64>>,
}

/// Slot of a histogram including the flow bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeSlot {
    /// Underflow.
    Underflow,
    /// Visible bin (0-based).
    Bin(usize),
    /// Overflow.
    Overflow,
}

impl From<BinIndex> for ShapeSlot {
    fn from(b: BinIndex) -> Self {
        match b {
            BinIndex::Underflow => ShapeSlot::Underflow,
            BinIndex::Bin(i) => ShapeSlot::Bin(i),
            BinIndex::Overflow => ShapeSlot::Overflow,
        }
    }
}

/// A destination slot driven below zero by a subtraction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubtractionImpact {
    /// Destination slot.
    pub slot: ShapeSlot,
    /// Size of the overshoot below zero.
    pub impact: f64,
}

/// A slot zeroed by [`clip_negative_bins`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClippedBin {
    /// The zeroed slot.
    pub slot: ShapeSlot,
    /// Its content before clipping.
    pub content: f64,
}

fn slot_mut(h: &mut Histogram, slot: ShapeSlot) -> (&mut f64, &mut f64) {
    match slot {
        ShapeSlot::Underflow => (&mut h.underflow, &mut h.underflow_error),
        ShapeSlot::Bin(i) => (&mut h.bin_content[i], &mut h.bin_error[i]),
        ShapeSlot::Overflow => (&mut h.overflow, &mut h.overflow_error),
    }
}

fn slots(h: &Histogram) -> impl Iterator<Item = (ShapeSlot, f64, f64)> + '_ {
    std::iter::once((ShapeSlot::Underflow, h.underflow, h.underflow_error))
        .chain(
            h.bin_content
                .iter()
                .zip(&h.bin_error)
                .enumerate()
                .map(|(i, (&c, &e))| (ShapeSlot::Bin(i), c, e)),
        )
        .chain(std::iter::once((ShapeSlot::Overflow, h.overflow, h.overflow_error)))
}

/// Zero every negative slot (flows included) and rescale the rest so the
/// pre-clip total, negatives included, is preserved.
///
/// The rescale is skipped when nothing positive remains or when the pre-clip
/// total is not positive (it cannot be reached with non-negative bins).
pub fn clip_negative_bins(h: &mut Histogram) -> Vec<ClippedBin> {
    let pre_clip_total = h.integral_with_flows();
    let negatives: Vec<ClippedBin> = slots(h)
        .filter(|&(_, content, _)| content < 0.0)
        .map(|(slot, content, _)| ClippedBin { slot, content })
        .collect();
    if negatives.is_empty() {
        return negatives;
    }
    for clipped in &negatives {
        let (content, error) = slot_mut(h, clipped.slot);
        *content = 0.0;
        *error = 0.0;
    }
    let post_clip_total = h.integral_with_flows();
    if post_clip_total > 0.0 && pre_clip_total > 0.0 {
        h.scale(pre_clip_total / post_clip_total);
    }
    negatives
}

/// Adds, subtracts and finalises shapes on one output binning.
#[derive(Debug, Clone)]
pub struct ShapeModifier {
    edges: Vec<f64>,
}

impl ShapeModifier {
    /// Build from the configured output binning.
    pub fn new(binning: &ShapeBinning) -> Result<Self> {
        let template = match &binning.variable_edges {
            Some(edges) => Histogram::with_edges("template", edges.clone())?,
            None => Histogram::uniform("template", binning.n_bins, binning.min, binning.max)?,
        };
        Ok(Self { edges: template.bin_edges })
    }

    /// A zeroed histogram on the output binning.
    pub fn create_empty(&self, name: impl Into<String>) -> Histogram {
        let n = self.edges.len() - 1;
        Histogram {
            name: name.into(),
            title: String::new(),
            dimension: Default::default(),
            bin_edges: self.edges.clone(),
            bin_content: vec![0.0; n],
            bin_error: vec![0.0; n],
            underflow: 0.0,
            overflow: 0.0,
            underflow_error: 0.0,
            overflow_error: 0.0,
        }
    }

    fn destination(&self, source: &Histogram, slot: ShapeSlot, dest: &Histogram) -> ShapeSlot {
        match slot {
            ShapeSlot::Bin(i) => dest.find_bin(source.bin_center(i)).into(),
            flow => flow,
        }
    }

    /// Add `source` into `dest`; errors add in quadrature.
    pub fn add_shape(&self, source: &Histogram, dest: &mut Histogram) -> Result<()> {
        source.validate()?;
        source.require_one_dimensional("adding shape")?;
        for (slot, content, error) in slots(source) {
            let target = self.destination(source, slot, dest);
            let (c, e) = slot_mut(dest, target);
            *c += content;
            *e = quadrature_sum([*e, error]);
        }
        Ok(())
    }

    /// Subtract `source` from `dest`; errors add in quadrature.
    ///
    /// With `purity_check`, every destination slot that ends up below zero is
    /// reported with the size of its overshoot.
    pub fn subtract_shape(
        &self,
        source: &Histogram,
        dest: &mut Histogram,
        purity_check: bool,
    ) -> Result<Vec<SubtractionImpact>> {
        source.validate()?;
        source.require_one_dimensional("subtracting shape")?;
        for (slot, content, error) in slots(source) {
            let target = self.destination(source, slot, dest);
            let (c, e) = slot_mut(dest, target);
            *c -= content;
            *e = quadrature_sum([*e, error]);
        }
        if !purity_check {
            return Ok(Vec::new());
        }
        Ok(slots(dest)
            .filter(|&(_, content, _)| content < 0.0)
            .map(|(slot, content, _)| SubtractionImpact { slot, impact: -content })
            .collect())
    }

    /// Clip negative slots keeping the total (see [`clip_negative_bins`]).
    pub fn finalise_shape(&self, dest: &mut Histogram) -> Vec<ClippedBin> {
        clip_negative_bins(dest)
    }
}
