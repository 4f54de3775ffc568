//! Host surface: containers, snapshot targets, off-screen documents and storage
//!
//! This module contains the public traits through which the lifecycle and
//! snapshot pipeline reach the host document. In-memory implementations are
//! provided for headless hosts and tests.

pub mod memory;
pub mod storage;

pub use memory::{MemoryContainer, MemoryDocument, MemoryTarget};
pub use storage::{FsStorage, MemoryStorage, Storage};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{Dimensions, ImageFormat, Result, SnapshotSource};

/// Text shown while the engine is being constructed.
pub const LOADING_TEXT: &str = "Loading infographic...";

/// Prefix of the inline message shown when construction fails.
pub const ERROR_PREFIX: &str = "Failed to render infographic: ";

/// A raster drawing surface produced by the engine (e.g. a canvas).
pub trait RasterSurface: Send + Sync {
    /// Native PNG export of the surface as a data URL.
    fn to_png_data_url(&self) -> Result<String>;
}

/// Markup the engine produced inside a container
#[derive(Clone)]
pub enum Markup {
    /// A vector document (SVG source text)
    Vector(String),
    /// A raster surface
    Raster(Arc<dyn RasterSurface>),
}

impl fmt::Debug for Markup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Markup::Vector(svg) => f.debug_tuple("Vector").field(&svg.len()).finish(),
            Markup::Raster(_) => f.write_str("Raster(..)"),
        }
    }
}

/// The element a visual is mounted into.
pub trait Container: Send + Sync {
    /// Width available to the visual, or `None` if it has not been laid out.
    fn measured_width(&self) -> Option<f64>;

    /// Whether the container is still attached to the document.
    fn is_connected(&self) -> bool;

    fn show_placeholder(&self, text: &str);

    fn clear_placeholder(&self);

    /// Replace the container's contents with an inline error message.
    fn show_error(&self, message: &str);

    /// Called by engines to publish (or clear) what they drew.
    fn set_markup(&self, markup: Option<Markup>);

    fn markup(&self) -> Option<Markup>;

    /// Rendered bounding box of the markup in the live document.
    fn bounding_box(&self) -> Option<Dimensions>;

    /// Start observing size changes. Returns `None` when the host has no
    /// resize observation primitive.
    fn observe_resize(&self) -> Option<mpsc::UnboundedReceiver<f64>>;

    /// Stop delivering size changes.
    fn unobserve_resize(&self);
}

/// The element snapshot images are appended to.
pub trait SnapshotTarget: Send + Sync {
    fn image(&self) -> Option<ImageElement>;

    /// Replace the current image. The swap is atomic: readers see either the
    /// previous image or the new one.
    fn set_image(&self, image: ImageElement);

    fn clear(&self);
}

/// Document-level primitives needed for off-screen rendering.
#[async_trait]
pub trait HostDocument: Send + Sync {
    /// Create a container that is laid out and painted but positioned outside
    /// the visible viewport (not hidden via opacity or display suppression).
    fn create_offscreen_container(&self, width: f64) -> Arc<dyn Container>;

    /// Detach a container created by `create_offscreen_container`.
    fn remove_container(&self, container: &Arc<dyn Container>);

    /// Resolve after the next render/paint cycle.
    async fn next_frame(&self);
}

/// A mounted snapshot image
#[derive(Debug, Clone, PartialEq)]
pub struct ImageElement {
    /// Reference the image displays: the storage reference when persisted,
    /// otherwise the in-memory data URL
    pub src: String,
    /// The in-memory data URL
    pub inline_src: String,
    /// Storage reference, once persistence resolved
    pub persisted_src: Option<String>,
    /// Provenance (`data-source`)
    pub source: SnapshotSource,
    pub format: ImageFormat,
    pub alt: String,
    pub class: String,
}

impl ImageElement {
    pub fn new(
        inline_src: String,
        persisted_src: Option<String>,
        source: SnapshotSource,
        format: ImageFormat,
    ) -> Self {
        let src = persisted_src.clone().unwrap_or_else(|| inline_src.clone());
        Self {
            src,
            inline_src,
            persisted_src,
            source,
            format,
            alt: "Infographic".to_string(),
            class: "infographic-print-img".to_string(),
        }
    }

    /// Value of the `data-source` attribute.
    pub fn data_source(&self) -> &'static str {
        self.source.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_prefers_persisted_reference() {
        let img = ImageElement::new(
            "data:image/png;base64,AA==".into(),
            Some("file:///cache/abc.png".into()),
            SnapshotSource::Engine,
            ImageFormat::Png,
        );
        assert_eq!(img.src, "file:///cache/abc.png");
        assert_eq!(img.inline_src, "data:image/png;base64,AA==");
        assert_eq!(img.data_source(), "engine");

        let inline = ImageElement::new("data:x".into(), None, SnapshotSource::Static, ImageFormat::Svg);
        assert_eq!(inline.src, "data:x");
        assert_eq!(inline.alt, "Infographic");
    }
}
