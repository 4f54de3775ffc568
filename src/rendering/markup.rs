//! Inspection and serialization of the markup produced by the engine

use std::borrow::Cow;

use roxmltree::Document;

use crate::data_url;
use crate::host::Markup;
use crate::{Dimensions, ImageFormat, Result};

pub const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";

/// Parse a `viewBox` attribute value into `[min_x, min_y, width, height]`.
pub fn parse_view_box(value: &str) -> Option<[f64; 4]> {
    let mut nums = value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<f64>().ok());
    let mut out = [0.0; 4];
    for slot in out.iter_mut() {
        *slot = nums.next()??;
        if !slot.is_finite() {
            return None;
        }
    }
    if nums.next().is_some() {
        return None;
    }
    Some(out)
}

/// Declared view region of the root `<svg>`, if both sides are positive.
pub fn declared_dimensions(svg: &str) -> Option<Dimensions> {
    let value = match Document::parse(svg) {
        Ok(doc) => {
            let root = doc.root_element();
            if !root.tag_name().name().eq_ignore_ascii_case("svg") {
                return None;
            }
            root.attribute("viewBox").map(str::to_string)
        }
        // Engines sometimes emit prefixed attributes without declaring the
        // prefix; fall back to scanning the opening tag.
        Err(_) => root_tag(svg).and_then(|(_, head)| attribute_in_tag(head, "viewBox")),
    }?;
    let [_, _, width, height] = parse_view_box(&value)?;
    let dims = Dimensions::new(width, height);
    dims.ratio().map(|_| dims)
}

/// Ensure the root `<svg>` declares the default SVG namespace. Some
/// serializers omit it, which breaks the document when loaded standalone.
pub fn ensure_svg_namespace(svg: &str) -> Cow<'_, str> {
    let (start, head) = match root_tag(svg) {
        Some(found) => found,
        None => return Cow::Borrowed(svg),
    };

    let declared = match Document::parse(svg) {
        Ok(doc) => doc.root_element().tag_name().namespace().is_some(),
        Err(_) => attribute_in_tag(head, "xmlns").is_some(),
    };
    if declared {
        return Cow::Borrowed(svg);
    }

    let insert_at = start + "<svg".len();
    let mut out = String::with_capacity(svg.len() + SVG_NAMESPACE.len() + 9);
    out.push_str(&svg[..insert_at]);
    out.push_str(" xmlns=\"");
    out.push_str(SVG_NAMESPACE);
    out.push('"');
    out.push_str(&svg[insert_at..]);
    Cow::Owned(out)
}

/// Serialize live markup into a data URL: vector markup becomes an inline SVG
/// document, raster surfaces use their native PNG export.
pub fn serialize(markup: &Markup) -> Result<(String, ImageFormat)> {
    match markup {
        Markup::Vector(svg) => {
            let normalized = ensure_svg_namespace(svg);
            Ok((data_url::encode_svg(&normalized), ImageFormat::Svg))
        }
        Markup::Raster(surface) => Ok((surface.to_png_data_url()?, ImageFormat::Png)),
    }
}

/// Byte offset and text of the root `<svg ...>` opening tag.
fn root_tag(svg: &str) -> Option<(usize, &str)> {
    let mut search = 0;
    while let Some(rel) = svg[search..].find("<svg") {
        let start = search + rel;
        let after = svg[start + 4..].chars().next();
        if matches!(after, Some(c) if c.is_whitespace() || c == '>' || c == '/') {
            let end = svg[start..].find('>').map(|e| start + e + 1)?;
            return Some((start, &svg[start..end]));
        }
        search = start + 4;
    }
    None
}

fn attribute_in_tag(tag: &str, name: &str) -> Option<String> {
    let mut search = 0;
    while let Some(rel) = tag[search..].find(name) {
        let start = search + rel;
        search = start + name.len();
        let preceded_by_space = tag[..start].chars().last().is_some_and(char::is_whitespace);
        let rest = tag[search..].trim_start();
        if !preceded_by_space || !rest.starts_with('=') {
            continue;
        }
        let rest = rest[1..].trim_start();
        let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
        let value = &rest[1..];
        let end = value.find(quote)?;
        return Some(value[..end].to_string());
    }
    None
}
