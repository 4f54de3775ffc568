//! Snapshot export
//!
//! Produces a static image of a visual for contexts where the live render
//! cannot be captured (print, PDF, embedding). Export runs through an ordered
//! fallback chain, first success wins:
//!
//! 1. engine-native raster export (PNG)
//! 2. engine-native vector export (SVG)
//! 3. serialization of the rendered markup (SVG with a normalized namespace,
//!    or a raster surface's own PNG export)
//!
//! Every successful export is persisted through the [`SnapshotCache`]. When
//! persistence fails the in-memory data URL is kept. When all tiers fail no
//! image is produced and the target keeps whatever it showed before.

mod debounce;
mod offscreen;

pub use debounce::Debouncer;

use std::sync::Arc;

use log::{debug, warn};

use crate::cache::SnapshotCache;
use crate::config::SnapshotTiming;
use crate::engine::EngineHandle;
use crate::host::{Container, ImageElement, SnapshotTarget};
use crate::rendering::markup;
use crate::{ImageFormat, RenderRequest, SnapshotSource};

/// A successfully exported image
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// In-memory representation
    pub data_url: String,
    pub format: ImageFormat,
    pub source: SnapshotSource,
    /// Storage reference, when persistence succeeded
    pub persisted: Option<String>,
}

impl Snapshot {
    pub fn to_image_element(&self) -> ImageElement {
        ImageElement::new(
            self.data_url.clone(),
            self.persisted.clone(),
            self.source,
            self.format,
        )
    }
}

/// Where the visual being captured lives; decides the provenance marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    Live,
    Offscreen,
}

impl Capture {
    fn engine_source(self) -> SnapshotSource {
        match self {
            Capture::Live => SnapshotSource::Engine,
            Capture::Offscreen => SnapshotSource::Static,
        }
    }

    fn markup_source(self) -> SnapshotSource {
        match self {
            Capture::Live => SnapshotSource::DomFallback,
            Capture::Offscreen => SnapshotSource::Static,
        }
    }
}

/// Exports snapshots and writes them through the content-addressed cache
pub struct SnapshotExporter {
    cache: Arc<SnapshotCache>,
    cache_dir: String,
    timing: SnapshotTiming,
}

impl SnapshotExporter {
    pub fn new(cache: Arc<SnapshotCache>, cache_dir: impl Into<String>) -> Self {
        Self {
            cache,
            cache_dir: cache_dir.into(),
            timing: SnapshotTiming::default(),
        }
    }

    pub fn with_timing(mut self, timing: SnapshotTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn timing(&self) -> SnapshotTiming {
        self.timing
    }

    pub fn cache_dir(&self) -> &str {
        &self.cache_dir
    }

    /// Run the fallback chain against a live visual.
    ///
    /// `handle` is `None` when the engine has no export capability for this
    /// call site, in which case only markup serialization is attempted.
    pub async fn capture(
        &self,
        handle: Option<&dyn EngineHandle>,
        container: &dyn Container,
        request: &RenderRequest,
    ) -> Option<Snapshot> {
        self.run_chain(handle, container, request, Capture::Live).await
    }

    /// In-place refresh: capture the live visual and mount the result into
    /// `target`, provided `is_live` still holds once the export resolved.
    pub async fn refresh_in_place<F>(
        &self,
        handle: Option<&dyn EngineHandle>,
        container: &dyn Container,
        target: &dyn SnapshotTarget,
        request: &RenderRequest,
        is_live: F,
    ) -> Option<Snapshot>
    where
        F: Fn() -> bool,
    {
        let snapshot = self.capture(handle, container, request).await?;
        if !is_live() {
            debug!("dropping snapshot for a visual that was torn down or re-requested during export");
            return None;
        }
        target.set_image(snapshot.to_image_element());
        Some(snapshot)
    }

    async fn run_chain(
        &self,
        handle: Option<&dyn EngineHandle>,
        container: &dyn Container,
        request: &RenderRequest,
        capture: Capture,
    ) -> Option<Snapshot> {
        if let Some(handle) = handle {
            for format in [ImageFormat::Png, ImageFormat::Svg] {
                match handle.to_image(format).await {
                    Ok(url) if !url.is_empty() => {
                        return Some(
                            self.finish(url, format, capture.engine_source(), request)
                                .await,
                        );
                    }
                    Ok(_) => warn!("engine {} export returned an empty image", format),
                    Err(e) => warn!("engine {} export failed: {}", format, e),
                }
            }
        }

        match container.markup().map(|m| markup::serialize(&m)) {
            Some(Ok((url, format))) => {
                Some(self.finish(url, format, capture.markup_source(), request).await)
            }
            Some(Err(e)) => {
                warn!("markup serialization failed: {}", e);
                None
            }
            None => {
                warn!("no rendered markup to serialize; snapshot skipped");
                None
            }
        }
    }

    async fn finish(
        &self,
        data_url: String,
        format: ImageFormat,
        source: SnapshotSource,
        request: &RenderRequest,
    ) -> Snapshot {
        let key = request.cache_key(format);
        let persisted = match self
            .cache
            .persist(&self.cache_dir, &data_url, format, &key)
            .await
        {
            Ok(reference) => Some(reference),
            Err(e) => {
                warn!("keeping in-memory snapshot: {}", e);
                None
            }
        };
        Snapshot {
            data_url,
            format,
            source,
            persisted,
        }
    }

    /// Synchronous markup-only refresh, for hooks that cannot await (e.g. a
    /// print handler). Leaves an engine-produced image in place; otherwise
    /// serializes the live markup into an image marked `domFallback`.
    ///
    /// Returns whether the target now shows a markup snapshot.
    pub fn refresh_from_markup(&self, container: &dyn Container, target: &dyn SnapshotTarget) -> bool {
        refresh_from_markup(container, target)
    }
}

/// See [`SnapshotExporter::refresh_from_markup`].
pub fn refresh_from_markup(container: &dyn Container, target: &dyn SnapshotTarget) -> bool {
    if target
        .image()
        .is_some_and(|img| img.source == SnapshotSource::Engine && !img.src.is_empty())
    {
        return false;
    }
    let Some(live) = container.markup() else {
        return false;
    };
    match markup::serialize(&live) {
        Ok((url, format)) => {
            target.set_image(ImageElement::new(url, None, SnapshotSource::DomFallback, format));
            true
        }
        Err(e) => {
            warn!("markup snapshot failed: {}", e);
            target.clear();
            false
        }
    }
}

/// Apply [`refresh_from_markup`] to every mounted visual. Returns how many
/// targets were refreshed.
pub fn refresh_all<'a, I>(mounted: I) -> usize
where
    I: IntoIterator<Item = (&'a dyn Container, &'a dyn SnapshotTarget)>,
{
    mounted
        .into_iter()
        .filter(|(container, target)| refresh_from_markup(*container, *target))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Markup, MemoryContainer, MemoryStorage, MemoryTarget, RasterSurface};
    use crate::{Error, Result};

    struct TaintedCanvas;

    impl RasterSurface for TaintedCanvas {
        fn to_png_data_url(&self) -> Result<String> {
            Err(Error::Other("SecurityError: tainted canvas".into()))
        }
    }

    fn exporter() -> SnapshotExporter {
        let cache = Arc::new(SnapshotCache::new(Arc::new(MemoryStorage::new())));
        SnapshotExporter::new(cache, "cache")
    }

    #[tokio::test]
    async fn markup_tier_runs_without_engine_export() {
        let container = MemoryContainer::new(400.0);
        container.set_markup(Some(Markup::Vector("<svg viewBox=\"0 0 4 3\"/>".into())));
        let req = RenderRequest::new("x", false);

        let snap = exporter().capture(None, &container, &req).await.unwrap();
        assert_eq!(snap.source, SnapshotSource::DomFallback);
        assert_eq!(snap.format, ImageFormat::Svg);
        assert!(snap.data_url.starts_with("data:image/svg+xml"));
        assert!(snap.persisted.as_deref().unwrap().starts_with("memory://cache/"));
    }

    #[tokio::test]
    async fn no_markup_and_no_engine_yields_nothing() {
        let container = MemoryContainer::new(400.0);
        let req = RenderRequest::new("x", false);
        assert!(exporter().capture(None, &container, &req).await.is_none());
    }

    #[test]
    fn markup_refresh_keeps_engine_snapshot() {
        let container = MemoryContainer::new(400.0);
        container.set_markup(Some(Markup::Vector("<svg/>".into())));
        let target = MemoryTarget::new();
        target.set_image(ImageElement::new(
            "data:image/png;base64,AA==".into(),
            None,
            SnapshotSource::Engine,
            ImageFormat::Png,
        ));

        assert!(!refresh_from_markup(&container, &target));
        assert_eq!(target.image().unwrap().source, SnapshotSource::Engine);
    }

    #[test]
    fn markup_refresh_serializes_vector_and_clears_on_raster_failure() {
        let container = MemoryContainer::new(400.0);
        container.set_markup(Some(Markup::Vector("<svg/>".into())));
        let target = MemoryTarget::new();
        assert!(refresh_from_markup(&container, &target));
        let img = target.image().unwrap();
        assert_eq!(img.data_source(), "domFallback");
        assert_eq!(img.format, ImageFormat::Svg);

        container.set_markup(Some(Markup::Raster(Arc::new(TaintedCanvas))));
        assert!(!refresh_from_markup(&container, &target));
        assert!(target.image().is_none());
    }

    #[test]
    fn refresh_all_counts_refreshed_targets() {
        let with_markup = MemoryContainer::new(100.0);
        with_markup.set_markup(Some(Markup::Vector("<svg/>".into())));
        let empty = MemoryContainer::new(100.0);
        let (t1, t2) = (MemoryTarget::new(), MemoryTarget::new());

        let refreshed = refresh_all([
            (&with_markup as &dyn Container, &t1 as &dyn SnapshotTarget),
            (&empty as &dyn Container, &t2 as &dyn SnapshotTarget),
        ]);
        assert_eq!(refreshed, 1);
        assert!(t2.image().is_none());
    }
}
