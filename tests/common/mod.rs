//! Shared fixtures: a scriptable engine and helpers for building pipelines

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use infographic_embed::config::SnapshotTiming;
use infographic_embed::data_url;
use infographic_embed::host::{Container, Markup, MemoryStorage};
use infographic_embed::{
    Dimensions, EngineHandle, EngineOptions, Error, ImageFormat, RenderEngine, Result,
    SnapshotCache, SnapshotExporter,
};

pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nmock";

/// Outcome of one export format
#[derive(Debug, Clone)]
pub enum Export {
    Ok(String),
    Empty,
    Fail(String),
}

impl Export {
    pub fn png() -> Self {
        Export::Ok(data_url::encode_base64(ImageFormat::Png, PNG_BYTES))
    }

    pub fn svg(svg: &str) -> Self {
        Export::Ok(data_url::encode_svg(svg))
    }
}

/// What the mock engine was asked to do, and how it should answer
pub struct Spy {
    constructs: AtomicUsize,
    destroys: AtomicUsize,
    options: Mutex<Vec<EngineOptions>>,
    updates: Mutex<Vec<Dimensions>>,
    exports: Mutex<Vec<ImageFormat>>,
    png: Mutex<Export>,
    svg: Mutex<Export>,
    markup: Mutex<Option<String>>,
    construct_error: Mutex<Option<String>>,
    export_delay: Mutex<Duration>,
}

impl Spy {
    fn new() -> Self {
        Self {
            constructs: AtomicUsize::new(0),
            destroys: AtomicUsize::new(0),
            options: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
            exports: Mutex::new(Vec::new()),
            png: Mutex::new(Export::png()),
            svg: Mutex::new(Export::svg("<svg xmlns=\"http://www.w3.org/2000/svg\"/>")),
            markup: Mutex::new(None),
            construct_error: Mutex::new(None),
            export_delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn constructs(&self) -> usize {
        self.constructs.load(Ordering::SeqCst)
    }

    pub fn destroys(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }

    pub fn options(&self) -> Vec<EngineOptions> {
        self.options.lock().unwrap().clone()
    }

    pub fn last_options(&self) -> EngineOptions {
        self.options().pop().expect("engine was never constructed")
    }

    pub fn updates(&self) -> Vec<Dimensions> {
        self.updates.lock().unwrap().clone()
    }

    pub fn exports(&self) -> Vec<ImageFormat> {
        self.exports.lock().unwrap().clone()
    }

    pub fn png_exports(&self) -> usize {
        self.exports().iter().filter(|f| **f == ImageFormat::Png).count()
    }
}

/// Engine whose behavior is scripted through its [`Spy`]
#[derive(Clone)]
pub struct MockEngine {
    pub spy: Arc<Spy>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            spy: Arc::new(Spy::new()),
        }
    }

    /// SVG the engine draws into its container on render.
    pub fn draws(self, svg: &str) -> Self {
        *self.spy.markup.lock().unwrap() = Some(svg.to_string());
        self
    }

    pub fn png(self, export: Export) -> Self {
        *self.spy.png.lock().unwrap() = export;
        self
    }

    pub fn svg(self, export: Export) -> Self {
        *self.spy.svg.lock().unwrap() = export;
        self
    }

    pub fn failing_construction(self, message: &str) -> Self {
        *self.spy.construct_error.lock().unwrap() = Some(message.to_string());
        self
    }

    pub fn export_delay(self, delay: Duration) -> Self {
        *self.spy.export_delay.lock().unwrap() = delay;
        self
    }

    pub fn shared(&self) -> Arc<dyn RenderEngine> {
        Arc::new(self.clone())
    }
}

impl RenderEngine for MockEngine {
    fn construct(
        &self,
        options: EngineOptions,
        container: Arc<dyn Container>,
    ) -> Result<Box<dyn EngineHandle>> {
        self.spy.constructs.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.spy.construct_error.lock().unwrap().clone() {
            return Err(Error::Engine(message));
        }
        self.spy.options.lock().unwrap().push(options);
        Ok(Box::new(MockHandle {
            spy: self.spy.clone(),
            container,
            destroyed: AtomicBool::new(false),
        }))
    }
}

pub struct MockHandle {
    spy: Arc<Spy>,
    container: Arc<dyn Container>,
    destroyed: AtomicBool,
}

#[async_trait]
impl EngineHandle for MockHandle {
    fn render(&self, _content: Option<&str>) -> Result<()> {
        let markup = self.spy.markup.lock().unwrap().clone();
        if let Some(svg) = markup {
            self.container.set_markup(Some(Markup::Vector(svg)));
        }
        Ok(())
    }

    fn update(&self, dimensions: Dimensions) -> Result<()> {
        self.spy.updates.lock().unwrap().push(dimensions);
        Ok(())
    }

    async fn to_image(&self, format: ImageFormat) -> Result<String> {
        let delay = *self.spy.export_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.spy.exports.lock().unwrap().push(format);
        let scripted = match format {
            ImageFormat::Png => self.spy.png.lock().unwrap().clone(),
            ImageFormat::Svg => self.spy.svg.lock().unwrap().clone(),
        };
        match scripted {
            Export::Ok(url) => Ok(url),
            Export::Empty => Ok(String::new()),
            Export::Fail(reason) => Err(Error::Export { format, reason }),
        }
    }

    fn destroy(&self) -> Result<()> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return Err(Error::Engine("engine object already destroyed".to_string()));
        }
        self.spy.destroys.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn timing() -> SnapshotTiming {
    SnapshotTiming::default()
}

/// Exporter writing into `storage` under `cache`.
pub fn exporter(storage: &Arc<MemoryStorage>) -> Arc<SnapshotExporter> {
    let cache = Arc::new(SnapshotCache::new(storage.clone()));
    Arc::new(SnapshotExporter::new(cache, "cache").with_timing(timing()))
}

/// Let the debounce window elapse (with some slack) under paused time.
pub async fn past_debounce() {
    tokio::time::sleep(timing().debounce() + Duration::from_millis(50)).await;
}
