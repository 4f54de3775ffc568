//! Rendering engine seam
//!
//! The engine that turns a visual spec into an interactive visual is opaque to
//! this crate. Backends implement [`RenderEngine`] (construction) and
//! [`EngineHandle`] (one live visual). The free functions here implement the
//! construction algorithm shared by the live lifecycle and off-screen renders.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use serde_json::{Map, Value};

use crate::host::Container;
use crate::{Dimensions, Error, ImageFormat, RenderRequest, Result, DEFAULT_ASPECT_RATIO, FALLBACK_WIDTH};

/// Factory for live engine objects
pub trait RenderEngine: Send + Sync {
    /// Construct a visual drawing into `container` with the resolved options.
    fn construct(
        &self,
        options: EngineOptions,
        container: Arc<dyn Container>,
    ) -> Result<Box<dyn EngineHandle>>;
}

/// One live engine object
#[async_trait]
pub trait EngineHandle: Send + Sync {
    /// Draw the visual. Structured configs pass `None`; DSL text is passed
    /// through verbatim.
    fn render(&self, content: Option<&str>) -> Result<()>;

    /// Incrementally re-layout to new dimensions.
    fn update(&self, dimensions: Dimensions) -> Result<()>;

    /// Export the current visual as a data URL.
    async fn to_image(&self, format: ImageFormat) -> Result<String> {
        Err(Error::Export {
            format,
            reason: "export not supported by this engine".to_string(),
        })
    }

    /// Release the engine object. Engines may fail when destroyed twice.
    fn destroy(&self) -> Result<()>;
}

/// Resolved construction configuration.
///
/// Holds the defaults inferred from the container and theme, overridden by
/// any explicit field of a structured config.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    fields: Map<String, Value>,
}

impl EngineOptions {
    /// Resolve options for `request`.
    ///
    /// Width defaults to the container width (or [`FALLBACK_WIDTH`] when
    /// unmeasured), clamped to `max_width`; height defaults to
    /// `width / 4:3`. For structured content every field present on the
    /// parsed object wins over the inferred defaults.
    pub fn resolve(
        request: &RenderRequest,
        container_width: Option<f64>,
        max_width: Option<f64>,
    ) -> Result<Self> {
        let width = layout_width(container_width, max_width);
        let height = width / DEFAULT_ASPECT_RATIO;

        let mut fields = Map::new();
        fields.insert("width".to_string(), Value::from(width));
        fields.insert("height".to_string(), Value::from(height));
        fields.insert(
            "theme".to_string(),
            Value::from(request.resolved_theme().as_str()),
        );

        if request.is_structured {
            let parsed: Value = serde_json::from_str(&request.content)
                .map_err(|e| Error::Spec(format!("Invalid JSON: {}", e)))?;
            match parsed {
                Value::Object(explicit) => fields.extend(explicit),
                _ => {
                    return Err(Error::Spec(
                        "Structured infographic config must be a JSON object".to_string(),
                    ))
                }
            }
        }

        Ok(Self { fields })
    }

    pub fn width(&self) -> Option<f64> {
        self.fields.get("width").and_then(Value::as_f64)
    }

    pub fn height(&self) -> Option<f64> {
        self.fields.get("height").and_then(Value::as_f64)
    }

    pub fn theme(&self) -> Option<&str> {
        self.fields.get("theme").and_then(Value::as_str)
    }

    pub fn template(&self) -> Option<&str> {
        self.fields.get("template").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

/// Width a visual is laid out at: `width`, or [`FALLBACK_WIDTH`] when the
/// container is unmeasured, capped at `max_width` when one is set.
pub fn layout_width(width: Option<f64>, max_width: Option<f64>) -> f64 {
    let width = width.unwrap_or(FALLBACK_WIDTH);
    match max_width.filter(|m| *m > 0.0) {
        Some(max) => width.min(max),
        None => width,
    }
}

/// Construct and render a visual for `request` inside `container`.
///
/// Spec errors are returned as `Error::Spec`; anything the engine raises
/// during construction or the initial render becomes
/// `Error::EngineConstruction`. A handle whose initial render failed is
/// destroyed before returning.
pub fn mount(
    engine: &dyn RenderEngine,
    request: &RenderRequest,
    container: Arc<dyn Container>,
    max_width: Option<f64>,
) -> Result<Arc<dyn EngineHandle>> {
    let options = EngineOptions::resolve(request, container.measured_width(), max_width)?;
    debug!(
        "constructing engine: kind={} theme={:?} width={:?}",
        request.content_kind(),
        options.theme(),
        options.width()
    );

    let handle: Arc<dyn EngineHandle> = engine
        .construct(options, container)
        .map_err(into_construction_error)?
        .into();

    let content = if request.is_structured {
        None
    } else {
        Some(request.content.as_str())
    };
    if let Err(e) = handle.render(content) {
        destroy_guarded(handle.as_ref());
        return Err(into_construction_error(e));
    }
    Ok(handle)
}

fn into_construction_error(err: Error) -> Error {
    match err {
        Error::Spec(_) | Error::EngineConstruction(_) => err,
        other => Error::EngineConstruction(other.to_string()),
    }
}

/// Destroy an engine object, absorbing any failure.
///
/// Teardown must be safe to call repeatedly; engines are known to throw when
/// destroyed twice, so errors here are logged and dropped.
pub fn destroy_guarded(handle: &dyn EngineHandle) {
    if let Err(e) = handle.destroy() {
        warn!("ignoring engine teardown failure: {}", Error::Teardown(e.to_string()));
    }
}
