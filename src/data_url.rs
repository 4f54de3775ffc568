//! `data:` URL parsing and encoding for snapshot payloads

use base64::Engine as _;

use crate::{Error, ImageFormat, Result};

const DATA_URL_PREFIX: &str = "data:";

/// A parsed `data:` URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl<'a> {
    /// Media type without parameters, e.g. `image/png`
    pub media_type: &'a str,
    /// Whether the payload is base64 (otherwise percent-encoded)
    pub is_base64: bool,
    payload: &'a str,
}

impl<'a> DataUrl<'a> {
    pub fn parse(url: &'a str) -> Result<Self> {
        let rest = url
            .strip_prefix(DATA_URL_PREFIX)
            .ok_or_else(|| Error::DataUrl("URL does not start with 'data:'".to_string()))?;
        let (metadata, payload) = rest
            .split_once(',')
            .ok_or_else(|| Error::DataUrl("missing comma".to_string()))?;

        let mut params = metadata.split(';');
        let media_type = params.next().unwrap_or("").trim();
        let is_base64 = params.any(|p| p.trim().eq_ignore_ascii_case("base64"));

        Ok(Self {
            media_type,
            is_base64,
            payload,
        })
    }

    /// The raw (still encoded) payload.
    pub fn payload(&self) -> &'a str {
        self.payload
    }

    /// Decode the payload into bytes.
    pub fn decode_bytes(&self) -> Result<Vec<u8>> {
        if self.is_base64 {
            decode_base64(self.payload)
        } else {
            Ok(urlencoding::decode_binary(self.payload.as_bytes()).into_owned())
        }
    }

    /// Decode the payload as UTF-8 text (used for SVG documents).
    pub fn decode_text(&self) -> Result<String> {
        let bytes = self.decode_bytes()?;
        String::from_utf8(bytes).map_err(|e| Error::DataUrl(format!("payload is not UTF-8: {}", e)))
    }
}

/// Decode base64, tolerating ASCII whitespace.
fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let cleaned: Vec<u8> = data.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(cleaned)
        .map_err(|e| Error::DataUrl(format!("invalid base64: {}", e)))
}

/// Encode bytes as a base64 data URL of the given format.
pub fn encode_base64(format: ImageFormat, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        format.mime_type(),
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// Encode an SVG document as a percent-encoded data URL.
pub fn encode_svg(svg: &str) -> String {
    format!(
        "data:image/svg+xml;charset=utf-8,{}",
        urlencoding::encode(svg)
    )
}
