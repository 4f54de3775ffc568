//! Aspect ratio inference for rendered visuals

use super::markup;
use crate::host::{Container, Markup};
use crate::{Dimensions, DEFAULT_ASPECT_RATIO};

/// Tracks the natural aspect ratio of one visual.
///
/// Starts at 4:3 and is corrected from the produced markup after each
/// successful construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AspectRatioTracker {
    ratio: f64,
}

impl AspectRatioTracker {
    pub fn new() -> Self {
        Self {
            ratio: DEFAULT_ASPECT_RATIO,
        }
    }

    /// Current width / height ratio (always > 0).
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Dimensions preserving the current ratio at `width`.
    pub fn target_dimensions(&self, width: f64) -> Dimensions {
        Dimensions::new(width, width / self.ratio)
    }

    /// Infer the ratio from the markup's declared view region, falling back to
    /// its measured bounding box.
    ///
    /// Returns the new ratio when a source yielded one; the caller then issues
    /// one corrective re-layout. Returns `None` and keeps the previous ratio
    /// when neither source is usable.
    pub fn infer(&mut self, markup: Option<&Markup>, bounding_box: Option<Dimensions>) -> Option<f64> {
        let declared = match markup {
            Some(Markup::Vector(svg)) => markup::declared_dimensions(svg).and_then(|d| d.ratio()),
            _ => None,
        };
        let ratio = declared.or_else(|| bounding_box.and_then(|b| b.ratio()))?;
        self.ratio = ratio;
        Some(ratio)
    }

    /// Inspect what was drawn into `container` and return the dimensions of
    /// the corrective re-layout at `width`, or `None` when no ratio source
    /// was usable and the visual should keep its size.
    pub fn correct(&mut self, container: &dyn Container, width: f64) -> Option<Dimensions> {
        let markup = container.markup();
        let bounding_box = container.bounding_box();
        self.infer(markup.as_ref(), bounding_box)?;
        Some(self.target_dimensions(width))
    }
}

impl Default for AspectRatioTracker {
    fn default() -> Self {
        Self::new()
    }
}
