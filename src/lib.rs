//! Infographic Embed
//!
//! Lifecycle, layout adaptation and snapshot export for infographics rendered
//! by an external engine into a host document.
//!
//! The rendering engine itself is opaque: it is reached through the
//! [`RenderEngine`] and [`EngineHandle`] traits. This crate owns everything
//! around it:
//!
//! - **Render lifecycle**: one [`RenderLifecycle`] per mounted block, with
//!   idempotent start, incremental resize and exception-safe teardown
//! - **Aspect ratio tracking**: the visual's natural proportions are inferred
//!   from the produced markup and preserved under container resize
//! - **Snapshot export**: a static PNG/SVG image produced through an ordered
//!   fallback chain, debounced against continuous resizes
//! - **Content-addressed cache**: exported bytes persisted under a hash of
//!   their semantic inputs so unchanged content is never re-encoded
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use infographic_embed::host::{MemoryContainer, MemoryStorage, MemoryTarget};
//! use infographic_embed::{
//!     RenderEngine, RenderLifecycle, RenderRequest, SnapshotCache, SnapshotExporter, Theme,
//! };
//!
//! # async fn run(engine: Arc<dyn RenderEngine>) -> infographic_embed::Result<()> {
//! let cache = Arc::new(SnapshotCache::new(Arc::new(MemoryStorage::new())));
//! let exporter = Arc::new(SnapshotExporter::new(cache, ".infographic-cache"));
//!
//! let request = RenderRequest::new(r#"{"template":"list-row","data":{"items":[]}}"#, true)
//!     .with_theme(Theme::Auto, true);
//! let lifecycle = RenderLifecycle::builder(request, engine, Arc::new(MemoryContainer::new(640.0)))
//!     .snapshot_target(Arc::new(MemoryTarget::new()))
//!     .exporter(exporter)
//!     .build();
//!
//! lifecycle.start()?;
//! lifecycle.on_resize(480.0);
//! lifecycle.destroy();
//! # Ok(())
//! # }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{Error, Result};

pub mod block;
pub mod cache;
pub mod config;
pub mod data_url;
pub mod engine;
pub mod export;
pub mod host;
pub mod lifecycle;
pub mod parser;
pub mod rendering;
pub mod snapshot;

pub use cache::SnapshotCache;
pub use config::Settings;
pub use engine::{EngineHandle, EngineOptions, RenderEngine};
pub use lifecycle::{LifecycleState, RenderLifecycle, WeakRenderLifecycle};
pub use rendering::aspect::AspectRatioTracker;
pub use snapshot::{Snapshot, SnapshotExporter};

/// Width used when the container has not been measured yet.
pub const FALLBACK_WIDTH: f64 = 800.0;

/// Aspect ratio assumed until the produced markup tells us otherwise.
pub const DEFAULT_ASPECT_RATIO: f64 = 4.0 / 3.0;

/// Theme preference for a rendered block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Follow the host's dark/light mode
    #[default]
    Auto,
    Light,
    Dark,
}

impl Theme {
    /// Resolve `Auto` against the host's current mode.
    pub fn resolve(self, is_dark_host: bool) -> ResolvedTheme {
        match self {
            Theme::Auto if is_dark_host => ResolvedTheme::Dark,
            Theme::Auto => ResolvedTheme::Light,
            Theme::Light => ResolvedTheme::Light,
            Theme::Dark => ResolvedTheme::Dark,
        }
    }
}

impl std::str::FromStr for Theme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Theme::Auto),
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(Error::Config(format!("unknown theme '{}'", other))),
        }
    }
}

/// A theme with `Auto` already resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedTheme {
    Light,
    Dark,
}

impl ResolvedTheme {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolvedTheme::Light => "light",
            ResolvedTheme::Dark => "dark",
        }
    }
}

impl fmt::Display for ResolvedTheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable description of one mounted visual.
///
/// Created once per mount and never mutated; a change of content or theme
/// requires a new mount.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    /// Spec text, either a JSON object or free-form DSL
    pub content: String,
    /// `true` when `content` is a structured (JSON) configuration
    pub is_structured: bool,
    /// Theme preference
    pub theme: Theme,
    /// Whether the host is currently in dark mode
    pub is_dark_host: bool,
}

impl RenderRequest {
    pub fn new(content: impl Into<String>, is_structured: bool) -> Self {
        Self {
            content: content.into(),
            is_structured,
            theme: Theme::Auto,
            is_dark_host: false,
        }
    }

    pub fn with_theme(mut self, theme: Theme, is_dark_host: bool) -> Self {
        self.theme = theme;
        self.is_dark_host = is_dark_host;
        self
    }

    pub fn resolved_theme(&self) -> ResolvedTheme {
        self.theme.resolve(self.is_dark_host)
    }

    /// `"json"` for structured content, `"dsl"` otherwise.
    pub fn content_kind(&self) -> &'static str {
        if self.is_structured {
            "json"
        } else {
            "dsl"
        }
    }

    /// Cache key identifying a snapshot of this request in `format`.
    ///
    /// Identical `(theme, kind, content, format)` tuples always produce the
    /// same key regardless of where the snapshot was requested from.
    pub fn cache_key(&self, format: ImageFormat) -> String {
        snapshot_cache_key(self.resolved_theme(), self.content_kind(), &self.content, format)
    }
}

/// Build the cache key for a snapshot from its semantic inputs.
pub fn snapshot_cache_key(
    theme: ResolvedTheme,
    content_kind: &str,
    content: &str,
    format: ImageFormat,
) -> String {
    format!("{}|{}|{}|{}", theme, content_kind, content, format.extension())
}

/// Width and height in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
}

impl Dimensions {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// `width / height` if both sides are positive and finite.
    pub fn ratio(&self) -> Option<f64> {
        if self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
        {
            Some(self.width / self.height)
        } else {
            None
        }
    }
}

/// Snapshot image format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Svg,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Svg => "svg",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Svg => "image/svg+xml",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for ImageFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "svg" => Ok(ImageFormat::Svg),
            other => Err(Error::Config(format!("unknown image format '{}'", other))),
        }
    }
}

/// Provenance of a mounted snapshot image (its `data-source` attribute)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    /// Exported by the engine from the live instance
    Engine,
    /// Serialized from the live markup
    DomFallback,
    /// Produced by an off-screen direct render
    Static,
}

impl SnapshotSource {
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotSource::Engine => "engine",
            SnapshotSource::DomFallback => "domFallback",
            SnapshotSource::Static => "static",
        }
    }
}

impl fmt::Display for SnapshotSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
