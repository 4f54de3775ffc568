//! Parsing of infographic code blocks

use crate::{Error, RenderRequest, Result, Theme};

/// Content of a block, classified as structured (JSON) or DSL text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSpec {
    /// Trimmed block content
    pub content: String,
    pub is_structured: bool,
}

impl ParsedSpec {
    pub fn into_request(self, theme: Theme, is_dark_host: bool) -> RenderRequest {
        RenderRequest::new(self.content, self.is_structured).with_theme(theme, is_dark_host)
    }
}

/// Classify a block's source.
///
/// Blocks starting with `{` must be valid JSON; anything else is passed to
/// the engine as DSL text.
pub fn parse_spec(source: &str) -> Result<ParsedSpec> {
    let trimmed = source.trim();
    if trimmed.is_empty() {
        return Err(Error::Spec("Empty infographic block".to_string()));
    }

    if trimmed.starts_with('{') {
        serde_json::from_str::<serde_json::Value>(trimmed)
            .map_err(|e| Error::Spec(format!("Invalid JSON: {}", e)))?;
        return Ok(ParsedSpec {
            content: trimmed.to_string(),
            is_structured: true,
        });
    }

    Ok(ParsedSpec {
        content: trimmed.to_string(),
        is_structured: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_blocks_are_rejected() {
        let err = parse_spec("  \n\t ").unwrap_err();
        assert_eq!(err.to_string(), "Empty infographic block");
    }

    #[test]
    fn json_blocks_are_structured() {
        let parsed = parse_spec("\n {\"template\": \"x\"} \n").unwrap();
        assert!(parsed.is_structured);
        assert_eq!(parsed.content, "{\"template\": \"x\"}");
    }

    #[test]
    fn invalid_json_reports_the_parser_message() {
        let err = parse_spec("{\"template\": }").unwrap_err();
        assert!(matches!(err, Error::Spec(_)));
        assert!(err.to_string().starts_with("Invalid JSON: "));
    }

    #[test]
    fn other_text_is_dsl() {
        let parsed = parse_spec("infographic list-row-simple\ndata\n  items").unwrap();
        assert!(!parsed.is_structured);
        let req = parsed.into_request(Theme::Auto, true);
        assert_eq!(req.content_kind(), "dsl");
        assert_eq!(req.resolved_theme().as_str(), "dark");
    }
}
