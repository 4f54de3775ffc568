//! In-memory host primitives for headless hosts and deterministic tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Container, HostDocument, ImageElement, Markup, SnapshotTarget};
use crate::Dimensions;

#[derive(Debug, Default)]
struct ContainerState {
    width: Option<f64>,
    connected: bool,
    offscreen: bool,
    placeholder: Option<String>,
    error: Option<String>,
    markup: Option<Markup>,
    bounding_box: Option<Dimensions>,
    resize_tx: Option<mpsc::UnboundedSender<f64>>,
}

/// Container that keeps its contents in a Mutex
#[derive(Debug)]
pub struct MemoryContainer {
    state: Mutex<ContainerState>,
}

impl MemoryContainer {
    /// A connected container laid out at `width`.
    pub fn new(width: f64) -> Self {
        Self::with_state(ContainerState {
            width: Some(width),
            connected: true,
            ..Default::default()
        })
    }

    /// A connected container that has not been measured yet.
    pub fn unmeasured() -> Self {
        Self::with_state(ContainerState {
            connected: true,
            ..Default::default()
        })
    }

    /// A container positioned outside the visible viewport.
    pub fn offscreen(width: f64) -> Self {
        Self::with_state(ContainerState {
            width: Some(width),
            connected: true,
            offscreen: true,
            ..Default::default()
        })
    }

    fn with_state(state: ContainerState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ContainerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_width(&self, width: Option<f64>) {
        self.lock().width = width;
    }

    pub fn set_connected(&self, connected: bool) {
        self.lock().connected = connected;
    }

    pub fn set_bounding_box(&self, bbox: Option<Dimensions>) {
        self.lock().bounding_box = bbox;
    }

    /// Deliver a size change to the observer, if any. Also updates the
    /// measured width. Returns whether an observer received it.
    pub fn resize(&self, width: f64) -> bool {
        let mut state = self.lock();
        state.width = Some(width);
        match &state.resize_tx {
            Some(tx) => tx.send(width).is_ok(),
            None => false,
        }
    }

    pub fn is_observed(&self) -> bool {
        self.lock().resize_tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    pub fn is_offscreen(&self) -> bool {
        self.lock().offscreen
    }

    pub fn placeholder(&self) -> Option<String> {
        self.lock().placeholder.clone()
    }

    pub fn error_message(&self) -> Option<String> {
        self.lock().error.clone()
    }
}

impl Container for MemoryContainer {
    fn measured_width(&self) -> Option<f64> {
        self.lock().width.filter(|w| *w > 0.0)
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    fn show_placeholder(&self, text: &str) {
        let mut state = self.lock();
        state.error = None;
        state.markup = None;
        state.placeholder = Some(text.to_string());
    }

    fn clear_placeholder(&self) {
        self.lock().placeholder = None;
    }

    fn show_error(&self, message: &str) {
        let mut state = self.lock();
        state.placeholder = None;
        state.markup = None;
        state.error = Some(message.to_string());
    }

    fn set_markup(&self, markup: Option<Markup>) {
        self.lock().markup = markup;
    }

    fn markup(&self) -> Option<Markup> {
        self.lock().markup.clone()
    }

    fn bounding_box(&self) -> Option<Dimensions> {
        self.lock().bounding_box
    }

    fn observe_resize(&self) -> Option<mpsc::UnboundedReceiver<f64>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().resize_tx = Some(tx);
        Some(rx)
    }

    fn unobserve_resize(&self) {
        self.lock().resize_tx = None;
    }
}

/// Snapshot target holding at most one image
#[derive(Debug, Default)]
pub struct MemoryTarget {
    image: Mutex<Option<ImageElement>>,
    writes: AtomicUsize,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of images set so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl SnapshotTarget for MemoryTarget {
    fn image(&self) -> Option<ImageElement> {
        self.image.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn set_image(&self, image: ImageElement) {
        *self.image.lock().unwrap_or_else(|p| p.into_inner()) = Some(image);
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    fn clear(&self) {
        *self.image.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }
}

/// Document that hands out off-screen `MemoryContainer`s and ticks frames on
/// a fixed interval.
pub struct MemoryDocument {
    frame_interval: Duration,
    live: Mutex<Vec<Arc<MemoryContainer>>>,
    created: AtomicUsize,
    frames: AtomicUsize,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::with_frame_interval(Duration::from_millis(16))
    }

    pub fn with_frame_interval(frame_interval: Duration) -> Self {
        Self {
            frame_interval,
            live: Mutex::new(Vec::new()),
            created: AtomicUsize::new(0),
            frames: AtomicUsize::new(0),
        }
    }

    /// Off-screen containers created and not yet removed.
    pub fn live_containers(&self) -> Vec<Arc<MemoryContainer>> {
        self.live.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn frames_elapsed(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostDocument for MemoryDocument {
    fn create_offscreen_container(&self, width: f64) -> Arc<dyn Container> {
        let container = Arc::new(MemoryContainer::offscreen(width));
        self.live
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(container.clone());
        self.created.fetch_add(1, Ordering::SeqCst);
        container
    }

    fn remove_container(&self, container: &Arc<dyn Container>) {
        let target = Arc::as_ptr(container) as *const ();
        let mut live = self.live.lock().unwrap_or_else(|p| p.into_inner());
        live.retain(|c| Arc::as_ptr(c) as *const () != target);
        container.set_markup(None);
    }

    async fn next_frame(&self) {
        tokio::time::sleep(self.frame_interval).await;
        self.frames.fetch_add(1, Ordering::SeqCst);
    }
}
