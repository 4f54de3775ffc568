//! Code-block processing
//!
//! Glue between a host's code-block hook and the render lifecycle: parses the
//! block, presents parse errors according to the settings and mounts a
//! [`RenderLifecycle`] for valid blocks.

use std::sync::{Arc, Mutex};

use log::error;

use crate::cache::SnapshotCache;
use crate::config::{ErrorBehavior, Settings};
use crate::host::{Container, SnapshotTarget, Storage};
use crate::lifecycle::{LifecycleState, RenderLifecycle, WeakRenderLifecycle};
use crate::parser::parse_spec;
use crate::snapshot::{self, SnapshotExporter};
use crate::{Error, RenderEngine};

/// Language tag of infographic code blocks.
pub const BLOCK_LANGUAGE: &str = "infographic";

/// Starter config inserted by the "insert template" command.
pub const TEMPLATE: &str = r#"{
  "template": "list-row-simple-horizontal-arrow",
  "data": {
    "items": [
      { "label": "Step 1", "desc": "Description" },
      { "label": "Step 2", "desc": "Description" },
      { "label": "Step 3", "desc": "Description" }
    ]
  }
}"#;

/// The starter template wrapped in a fenced code block.
pub fn template_block() -> String {
    format!("```{}\n{}\n```\n", BLOCK_LANGUAGE, TEMPLATE)
}

/// How a block with an unparseable spec is shown
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockErrorView {
    Hidden,
    /// Error header; the source is only shown on demand ("view details")
    Message { header: String, source: String },
    /// Error header followed by the source
    Code { header: String, source: String },
}

impl BlockErrorView {
    pub fn new(behavior: ErrorBehavior, err: &Error, source: &str) -> Self {
        let header = format!("Error: {}", err);
        match behavior {
            ErrorBehavior::Hide => BlockErrorView::Hidden,
            ErrorBehavior::ShowError => BlockErrorView::Message {
                header,
                source: source.to_string(),
            },
            ErrorBehavior::ShowCode => BlockErrorView::Code {
                header,
                source: source.to_string(),
            },
        }
    }
}

/// A block whose visual was mounted
#[derive(Debug, Clone)]
pub struct MountedBlock {
    pub lifecycle: RenderLifecycle,
    /// Text placed on the clipboard by the "Copy" affordance
    pub copy_text: String,
    pub show_source_button: bool,
}

#[derive(Debug, Clone)]
pub enum BlockOutcome {
    /// Auto-render is off; the block is left untouched
    Skipped,
    Failed(BlockErrorView),
    Mounted(MountedBlock),
}

/// Tracking entry for a mounted block. The host's [`MountedBlock`] owns the
/// lifecycle; dropping it tears the visual down and the entry is pruned.
struct Mounted {
    lifecycle: WeakRenderLifecycle,
    target: Arc<dyn SnapshotTarget>,
}

impl Mounted {
    fn live(&self) -> Option<RenderLifecycle> {
        self.lifecycle
            .upgrade()
            .filter(|lifecycle| lifecycle.state() != LifecycleState::Destroyed)
    }
}

/// Processes infographic blocks for one host
pub struct BlockProcessor {
    engine: Arc<dyn RenderEngine>,
    exporter: Arc<SnapshotExporter>,
    settings: Settings,
    mounted: Mutex<Vec<Mounted>>,
}

impl BlockProcessor {
    pub fn new(engine: Arc<dyn RenderEngine>, exporter: Arc<SnapshotExporter>, settings: Settings) -> Self {
        Self {
            engine,
            exporter,
            settings,
            mounted: Mutex::new(Vec::new()),
        }
    }

    /// Processor whose snapshots are cached in `settings.cache_dir` of
    /// `storage`, with the configured snapshot timing.
    pub fn with_storage(engine: Arc<dyn RenderEngine>, storage: Arc<dyn Storage>, settings: Settings) -> Self {
        let cache = Arc::new(SnapshotCache::new(storage));
        let exporter = SnapshotExporter::new(cache, settings.cache_dir.clone()).with_timing(settings.snapshot);
        Self::new(engine, Arc::new(exporter), settings)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Handle one block. Must be called from within a tokio runtime.
    ///
    /// Engine construction failures are shown inline by the lifecycle; the
    /// block still counts as mounted so the host can tear it down.
    pub fn process(
        &self,
        source: &str,
        is_dark_host: bool,
        container: Arc<dyn Container>,
        target: Arc<dyn SnapshotTarget>,
    ) -> BlockOutcome {
        if !self.settings.auto_render {
            return BlockOutcome::Skipped;
        }

        let parsed = match parse_spec(source) {
            Ok(parsed) => parsed,
            Err(e) => {
                let preview: String = source.chars().take(200).collect();
                error!("parse error: {} (source={:?})", e, preview);
                return BlockOutcome::Failed(BlockErrorView::new(
                    self.settings.error_behavior,
                    &e,
                    source,
                ));
            }
        };

        let request = parsed.into_request(self.settings.theme, is_dark_host);
        let lifecycle = RenderLifecycle::builder(request, self.engine.clone(), container)
            .snapshot_target(target.clone())
            .exporter(self.exporter.clone())
            .max_width(self.settings.max_width)
            .build();
        // Failures are already presented inline by the lifecycle.
        let _ = lifecycle.start();

        let mut mounted = self.mounted.lock().unwrap_or_else(|p| p.into_inner());
        mounted.retain(|m| m.live().is_some());
        mounted.push(Mounted {
            lifecycle: lifecycle.downgrade(),
            target,
        });
        drop(mounted);

        BlockOutcome::Mounted(MountedBlock {
            lifecycle,
            copy_text: source.trim().to_string(),
            show_source_button: self.settings.show_source_button,
        })
    }

    /// Synchronously refresh every mounted block's snapshot from its live
    /// markup (e.g. right before printing). Destroyed or dropped blocks are
    /// forgotten.
    pub fn refresh_print_snapshots(&self) -> usize {
        let live: Vec<(RenderLifecycle, Arc<dyn SnapshotTarget>)> = {
            let mut mounted = self.mounted.lock().unwrap_or_else(|p| p.into_inner());
            mounted.retain(|m| m.live().is_some());
            mounted
                .iter()
                .filter_map(|m| m.live().map(|lifecycle| (lifecycle, m.target.clone())))
                .collect()
        };
        snapshot::refresh_all(
            live.iter()
                .map(|(lifecycle, target)| (lifecycle.container().as_ref(), target.as_ref())),
        )
    }

    /// Number of blocks still mounted.
    pub fn mounted_count(&self) -> usize {
        let mut mounted = self.mounted.lock().unwrap_or_else(|p| p.into_inner());
        mounted.retain(|m| m.live().is_some());
        mounted.len()
    }

    /// Destroy every mounted block.
    pub fn unmount_all(&self) {
        let mounted = std::mem::take(&mut *self.mounted.lock().unwrap_or_else(|p| p.into_inner()));
        for lifecycle in mounted.iter().filter_map(|m| m.lifecycle.upgrade()) {
            lifecycle.destroy();
        }
    }
}
