//! Off-screen direct render

use std::sync::Arc;

use log::{debug, warn};

use super::{Capture, Snapshot, SnapshotExporter};
use crate::engine::{self, EngineHandle, RenderEngine};
use crate::host::{Container, HostDocument, SnapshotTarget};
use crate::rendering::AspectRatioTracker;
use crate::{RenderRequest, Result};

/// Owns the temporary container and engine object of an off-screen render.
/// Both are released when the guard drops, on every exit path.
struct OffscreenGuard<'a> {
    document: &'a dyn HostDocument,
    container: Arc<dyn Container>,
    handle: Option<Arc<dyn EngineHandle>>,
}

impl Drop for OffscreenGuard<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            engine::destroy_guarded(handle.as_ref());
        }
        self.document.remove_container(&self.container);
    }
}

impl SnapshotExporter {
    /// Render `request` in a temporary off-screen container, export it and
    /// append the image to `target`.
    ///
    /// The container is laid out and painted (positioned outside the
    /// viewport, not hidden) so the engine can finish layout. After
    /// construction the visual gets the same aspect correction as a live
    /// mount, then the render waits `settle_frames` paint cycles plus
    /// `settle_delay` before exporting. The temporary engine object and
    /// container are destroyed before this returns, whatever the outcome.
    ///
    /// Returns `Ok(None)` when every export tier failed; construction errors
    /// are returned as `Err`.
    pub async fn render_offscreen(
        &self,
        engine: &dyn RenderEngine,
        document: &dyn HostDocument,
        request: &RenderRequest,
        width: f64,
        target: &dyn SnapshotTarget,
    ) -> Result<Option<Snapshot>> {
        let container = document.create_offscreen_container(width);
        let mut guard = OffscreenGuard {
            document,
            container: container.clone(),
            handle: None,
        };

        let handle = engine::mount(engine, request, container.clone(), None)?;
        guard.handle = Some(handle.clone());

        let mut tracker = AspectRatioTracker::new();
        if let Some(dims) = tracker.correct(container.as_ref(), width) {
            if let Err(e) = handle.update(dims) {
                warn!("off-screen aspect correction failed: {}", e);
            }
        }

        for _ in 0..self.timing.settle_frames {
            document.next_frame().await;
        }
        tokio::time::sleep(self.timing.settle_delay()).await;

        let snapshot = self
            .run_chain(Some(handle.as_ref()), container.as_ref(), request, Capture::Offscreen)
            .await;
        drop(guard);

        match &snapshot {
            Some(s) => target.set_image(s.to_image_element()),
            None => debug!("off-screen render produced no snapshot"),
        }
        Ok(snapshot)
    }
}
