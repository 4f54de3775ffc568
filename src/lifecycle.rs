//! Render lifecycle of one mounted visual
//!
//! A [`RenderLifecycle`] owns the engine object for one mounted block and
//! drives it through `Idle → Loading → Rendered | Errored → Destroyed`.
//! Construction always finishes before resize observation is attached, so
//! resize and snapshot requests only ever see a settled instance.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use log::{debug, error, warn};
use tokio::task::JoinHandle;

use crate::engine::{self, EngineHandle, RenderEngine};
use crate::host::{Container, SnapshotTarget, ERROR_PREFIX, LOADING_TEXT};
use crate::rendering::AspectRatioTracker;
use crate::snapshot::{Debouncer, SnapshotExporter};
use crate::{RenderRequest, Result};

/// Lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Loading,
    Rendered,
    Errored,
    /// Terminal
    Destroyed,
}

struct Inner {
    started: bool,
    state: LifecycleState,
    handle: Option<Arc<dyn EngineHandle>>,
    tracker: AspectRatioTracker,
    resize_task: Option<JoinHandle<()>>,
}

struct Shared {
    request: RenderRequest,
    engine: Arc<dyn RenderEngine>,
    container: Arc<dyn Container>,
    target: Option<Arc<dyn SnapshotTarget>>,
    exporter: Option<Arc<SnapshotExporter>>,
    max_width: Option<f64>,
    debouncer: Debouncer,
    /// Bumped on every snapshot request; an export only lands if no newer
    /// request was made while it ran.
    snapshot_generation: AtomicU64,
    inner: Mutex<Inner>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Whether `handle` is still the live engine object of a rendered visual.
    fn is_live(&self, handle: &Arc<dyn EngineHandle>) -> bool {
        let inner = self.lock();
        inner.state == LifecycleState::Rendered
            && inner.handle.as_ref().is_some_and(|h| Arc::ptr_eq(h, handle))
    }

    fn teardown(&self) {
        self.debouncer.cancel();
        let (handle, resize_task) = {
            let mut inner = self.lock();
            inner.started = true;
            inner.state = LifecycleState::Destroyed;
            (inner.handle.take(), inner.resize_task.take())
        };
        self.container.unobserve_resize();
        if let Some(task) = resize_task {
            task.abort();
        }
        if let Some(handle) = handle {
            engine::destroy_guarded(handle.as_ref());
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.snapshot_generation.load(Ordering::SeqCst) == generation
    }

    async fn refresh_snapshot(self: Arc<Self>, exporter: Arc<SnapshotExporter>, generation: u64) {
        let Some(target) = self.target.clone() else {
            return;
        };
        let handle = {
            let inner = self.lock();
            if inner.state != LifecycleState::Rendered {
                return;
            }
            inner.handle.clone()
        };
        let Some(handle) = handle else {
            return;
        };

        let refreshed = exporter
            .refresh_in_place(
                Some(handle.as_ref()),
                self.container.as_ref(),
                target.as_ref(),
                &self.request,
                || self.is_live(&handle) && self.is_current(generation),
            )
            .await;
        if let Some(snapshot) = refreshed {
            debug!(
                "snapshot refreshed: source={} format={} persisted={}",
                snapshot.source,
                snapshot.format,
                snapshot.persisted.is_some()
            );
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Owns one engine object for one mounted visual.
///
/// Cloning yields another handle to the same instance. Methods that schedule
/// work (`start`, `on_resize`) must be called from within a tokio runtime.
#[derive(Clone)]
pub struct RenderLifecycle {
    shared: Arc<Shared>,
}

/// Builder for [`RenderLifecycle`]
pub struct RenderLifecycleBuilder {
    request: RenderRequest,
    engine: Arc<dyn RenderEngine>,
    container: Arc<dyn Container>,
    target: Option<Arc<dyn SnapshotTarget>>,
    exporter: Option<Arc<SnapshotExporter>>,
    max_width: Option<f64>,
}

impl RenderLifecycleBuilder {
    /// Element snapshot images are mounted into.
    pub fn snapshot_target(mut self, target: Arc<dyn SnapshotTarget>) -> Self {
        self.target = Some(target);
        self
    }

    pub fn exporter(mut self, exporter: Arc<SnapshotExporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    /// Upper bound for the width inferred from the container.
    pub fn max_width(mut self, max_width: f64) -> Self {
        self.max_width = Some(max_width);
        self
    }

    pub fn build(self) -> RenderLifecycle {
        let window = self
            .exporter
            .as_ref()
            .map(|e| e.timing())
            .unwrap_or_default()
            .debounce();
        RenderLifecycle {
            shared: Arc::new(Shared {
                request: self.request,
                engine: self.engine,
                container: self.container,
                target: self.target,
                exporter: self.exporter,
                max_width: self.max_width,
                debouncer: Debouncer::new(window),
                snapshot_generation: AtomicU64::new(0),
                inner: Mutex::new(Inner {
                    started: false,
                    state: LifecycleState::Idle,
                    handle: None,
                    tracker: AspectRatioTracker::new(),
                    resize_task: None,
                }),
            }),
        }
    }
}

impl RenderLifecycle {
    pub fn builder(
        request: RenderRequest,
        engine: Arc<dyn RenderEngine>,
        container: Arc<dyn Container>,
    ) -> RenderLifecycleBuilder {
        RenderLifecycleBuilder {
            request,
            engine,
            container,
            target: None,
            exporter: None,
            max_width: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.shared.lock().state
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.shared.lock().tracker.ratio()
    }

    pub fn request(&self) -> &RenderRequest {
        &self.shared.request
    }

    pub fn container(&self) -> &Arc<dyn Container> {
        &self.shared.container
    }

    /// The live engine object, e.g. for a user-initiated export.
    pub fn engine_handle(&self) -> Option<Arc<dyn EngineHandle>> {
        self.shared.lock().handle.clone()
    }

    /// A handle that does not keep the visual mounted.
    pub fn downgrade(&self) -> WeakRenderLifecycle {
        WeakRenderLifecycle {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Whether a debounced snapshot refresh is waiting to run.
    pub fn snapshot_pending(&self) -> bool {
        self.shared.debouncer.is_pending()
    }

    /// Construct the visual. Idempotent: only the first call leaves `Idle`,
    /// later calls return `Ok(())` without doing anything. Hosts may call it
    /// from several hooks since not every render pipeline fires them.
    ///
    /// On failure the container shows an inline error with the failure text
    /// (never the raw content) and the error is returned to the caller.
    pub fn start(&self) -> Result<()> {
        let shared = &self.shared;
        {
            let mut inner = shared.lock();
            if inner.started {
                return Ok(());
            }
            inner.started = true;
            inner.state = LifecycleState::Loading;
        }
        shared.container.show_placeholder(LOADING_TEXT);

        let mounted = engine::mount(
            shared.engine.as_ref(),
            &shared.request,
            shared.container.clone(),
            shared.max_width,
        );

        match mounted {
            Ok(handle) => {
                {
                    let mut inner = shared.lock();
                    if inner.state == LifecycleState::Destroyed {
                        drop(inner);
                        debug!("lifecycle destroyed during construction; releasing engine");
                        engine::destroy_guarded(handle.as_ref());
                        return Ok(());
                    }
                    inner.handle = Some(handle);
                    inner.state = LifecycleState::Rendered;
                }
                shared.container.clear_placeholder();
                debug!("rendered {} infographic", shared.request.content_kind());
                self.correct_aspect_ratio();
                self.attach_resize_observer();
                self.schedule_snapshot();
                Ok(())
            }
            Err(e) => {
                let preview: String = shared.request.content.chars().take(200).collect();
                error!(
                    "render error: {} (kind={}, content={:?})",
                    e,
                    shared.request.content_kind(),
                    preview
                );
                {
                    let mut inner = shared.lock();
                    if inner.state != LifecycleState::Destroyed {
                        inner.state = LifecycleState::Errored;
                    }
                }
                shared.container.clear_placeholder();
                shared
                    .container
                    .show_error(&format!("{}{}", ERROR_PREFIX, e));
                Err(e)
            }
        }
    }

    /// Re-layout for a new container width, preserving the aspect ratio.
    ///
    /// Only acts while `Rendered`. Uses the engine's incremental update; the
    /// engine object is never reconstructed here.
    pub fn on_resize(&self, width: f64) {
        if !(width.is_finite() && width > 0.0) {
            return;
        }
        let width = engine::layout_width(Some(width), self.shared.max_width);
        let (handle, dims) = {
            let inner = self.shared.lock();
            if inner.state != LifecycleState::Rendered {
                return;
            }
            match &inner.handle {
                Some(handle) => (handle.clone(), inner.tracker.target_dimensions(width)),
                None => return,
            }
        };
        if !self.shared.container.is_connected() {
            return;
        }
        if let Err(e) = handle.update(dims) {
            warn!("engine update to {}x{} failed: {}", dims.width, dims.height, e);
        }
        self.schedule_snapshot();
    }

    /// Tear down: cancel the pending snapshot, stop resize observation and
    /// release the engine object. Safe to call from any state, any number
    /// of times.
    pub fn destroy(&self) {
        self.shared.teardown();
    }

    /// Infer the aspect ratio from the produced markup and, if one was found,
    /// issue one corrective re-layout.
    fn correct_aspect_ratio(&self) {
        let shared = &self.shared;
        let width = engine::layout_width(shared.container.measured_width(), shared.max_width);

        let (handle, dims) = {
            let mut inner = shared.lock();
            let Some(handle) = inner.handle.clone() else {
                return;
            };
            match inner.tracker.correct(shared.container.as_ref(), width) {
                Some(dims) => (handle, dims),
                None => return,
            }
        };
        debug!("aspect ratio corrected to {:.4}", dims.width / dims.height);
        if let Err(e) = handle.update(dims) {
            warn!("corrective re-layout failed: {}", e);
        }
    }

    fn attach_resize_observer(&self) {
        let Some(mut events) = self.shared.container.observe_resize() else {
            debug!("host has no resize observation; visual keeps its initial size");
            return;
        };
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let task = tokio::spawn(async move {
            while let Some(width) = events.recv().await {
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                RenderLifecycle { shared }.on_resize(width);
            }
        });
        let mut inner = self.shared.lock();
        if inner.state == LifecycleState::Destroyed {
            task.abort();
        } else {
            inner.resize_task = Some(task);
        }
    }

    fn schedule_snapshot(&self) {
        let Some(exporter) = self.shared.exporter.clone() else {
            return;
        };
        if self.shared.target.is_none() {
            return;
        }
        let generation = self.shared.snapshot_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let weak = Arc::downgrade(&self.shared);
        self.shared.debouncer.schedule(async move {
            if let Some(shared) = weak.upgrade() {
                shared.refresh_snapshot(exporter, generation).await;
            }
        });
    }
}

/// Non-owning handle to a [`RenderLifecycle`]
#[derive(Clone, Debug)]
pub struct WeakRenderLifecycle {
    shared: Weak<Shared>,
}

impl WeakRenderLifecycle {
    /// The lifecycle, unless every owning handle was dropped.
    pub fn upgrade(&self) -> Option<RenderLifecycle> {
        self.shared.upgrade().map(|shared| RenderLifecycle { shared })
    }
}

impl std::fmt::Debug for RenderLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("RenderLifecycle")
            .field("state", &inner.state)
            .field("aspect_ratio", &inner.tracker.ratio())
            .field("kind", &self.shared.request.content_kind())
            .finish()
    }
}
