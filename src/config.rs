//! User settings
//!
//! Settings are stored as JSON. Missing fields take their defaults, so a
//! settings file written by an older version still loads.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result, Theme};

/// How a block whose spec failed to parse is presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorBehavior {
    /// Remove the block from view
    Hide,
    /// Show the error with a "view details" affordance for the source
    ShowError,
    /// Show the error followed by the offending source
    #[default]
    ShowCode,
}

/// Timing of the snapshot pipeline.
///
/// These are empirical values tuned against the engine's observed render
/// latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotTiming {
    /// Idle window after the last refresh request before exporting
    pub debounce_ms: u64,
    /// Render/paint cycles to wait before exporting an off-screen render
    pub settle_frames: u32,
    /// Extra fixed delay after the settle frames
    pub settle_delay_ms: u64,
}

impl SnapshotTiming {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for SnapshotTiming {
    fn default() -> Self {
        Self {
            debounce_ms: 250,
            settle_frames: 3,
            settle_delay_ms: 50,
        }
    }
}

/// Settings for rendering infographic blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Render blocks automatically; when off blocks are left untouched
    pub auto_render: bool,
    /// Offer a "view source" affordance on rendered blocks
    pub show_source_button: bool,
    /// Upper bound for the inferred width, in pixels
    pub max_width: f64,
    /// Height hint in pixels. Accepted and validated; the rendered height
    /// follows from the width and the inferred aspect ratio.
    pub max_height: f64,
    pub theme: Theme,
    pub error_behavior: ErrorBehavior,
    /// Directory snapshots are cached in, relative to the storage root
    pub cache_dir: String,
    pub snapshot: SnapshotTiming,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_render: true,
            show_source_button: true,
            max_width: 800.0,
            max_height: 600.0,
            theme: Theme::Auto,
            error_behavior: ErrorBehavior::ShowCode,
            cache_dir: ".infographic-cache".to_string(),
            snapshot: SnapshotTiming::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, falling back to defaults when the file does
    /// not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        let settings: Settings = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.validate()?;
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.max_width.is_finite() && self.max_width > 0.0) {
            return Err(Error::Config(format!(
                "max_width must be a positive number, got {}",
                self.max_width
            )));
        }
        if !(self.max_height.is_finite() && self.max_height > 0.0) {
            return Err(Error::Config(format!(
                "max_height must be a positive number, got {}",
                self.max_height
            )));
        }
        if self.snapshot.settle_frames == 0 {
            return Err(Error::Config(
                "snapshot.settle_frames must be at least 1".to_string(),
            ));
        }
        if self.cache_dir.trim().is_empty() {
            return Err(Error::Config("cache_dir must not be empty".to_string()));
        }
        Ok(())
    }
}
