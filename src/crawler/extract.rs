//! Plain-text extraction for external target pages
//!
//! HTML is handled here with scraper. PDF decoding goes through a
//! [`PdfTextExtractor`]: [`PdfExtract`] reads the text layer with the
//! `pdf-extract` crate, and [`UnsupportedPdf`] declines every document.

use scraper::{Html, Node};
use std::panic;
use thiserror::Error;

/// Errors raised while turning a payload into text
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction is not available")]
    Unsupported,

    #[error("Malformed document: {0}")]
    Malformed(String),
}

/// Turns PDF bytes into plain text
pub trait PdfTextExtractor: Send + Sync {
    fn extract_text(&self, bytes: &[u8]) -> Result<String, ExtractError>;
}

/// Text-layer extraction with `pdf-extract`
///
/// Scanned documents without a text layer come back empty. Lines are trimmed
/// and blank ones dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtract;

impl PdfTextExtractor for PdfExtract {
    fn extract_text(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        // The decoder panics on some malformed files instead of erroring
        let extracted = panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
            .map_err(|_| ExtractError::Malformed("PDF decoder aborted".to_string()))?;
        let text = extracted.map_err(|e| ExtractError::Malformed(e.to_string()))?;

        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// Extractor that declines every document
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedPdf;

impl PdfTextExtractor for UnsupportedPdf {
    fn extract_text(&self, _bytes: &[u8]) -> Result<String, ExtractError> {
        Err(ExtractError::Unsupported)
    }
}

/// Which extractor handles a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentRoute {
    Pdf,
    Html,
}

impl ContentRoute {
    /// Routes on the URL suffix: `.pdf` (any case) goes to PDF extraction,
    /// everything else, including URLs with a query string, to HTML
    ///
    /// # Examples
    ///
    /// ```
    /// use pinweave::crawler::ContentRoute;
    ///
    /// assert_eq!(ContentRoute::for_url("https://x.org/paper.pdf"), ContentRoute::Pdf);
    /// assert_eq!(ContentRoute::for_url("https://x.org/paper.pdf?dl=1"), ContentRoute::Html);
    /// ```
    pub fn for_url(url: &str) -> Self {
        let url = url.split('#').next().unwrap_or_default();
        if url.to_ascii_lowercase().ends_with(".pdf") {
            Self::Pdf
        } else {
            Self::Html
        }
    }
}

/// Extracts readable text from an HTML document
///
/// Text inside `script` and `style` elements is dropped. The remaining text
/// is split into lines and double-space separated phrases; each piece is
/// trimmed and the non-empty ones are joined with newlines.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let mut raw = String::new();
    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map(|el| matches!(el.name(), "script" | "style"))
                .unwrap_or(false)
        });

        if !hidden {
            raw.push_str(text);
        }
    }

    raw.lines()
        .flat_map(|line| line.trim().split("  "))
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_and_style_are_dropped() {
        let html = r#"<html><head><title>Hi</title><style>body { color: red }</style></head>
<body><script>var x = 1;</script><p>Hello world</p></body></html>"#;

        let text = html_to_text(html);
        assert!(text.contains("Hello world"));
        assert!(text.contains("Hi"));
        assert!(!text.contains("color"));
        assert!(!text.contains("var x"));
    }

    #[test]
    fn test_lines_and_double_spaces_become_chunks() {
        let html = "<body><p>  first line  </p>\n\n<p>left  right</p></body>";
        assert_eq!(html_to_text(html), "first line\nleft\nright");
    }

    #[test]
    fn test_empty_document_yields_empty_text() {
        assert_eq!(html_to_text(""), "");
    }

    #[test]
    fn test_routing() {
        assert_eq!(ContentRoute::for_url("https://x.org/a.pdf"), ContentRoute::Pdf);
        assert_eq!(ContentRoute::for_url("https://x.org/A.PDF"), ContentRoute::Pdf);
        assert_eq!(ContentRoute::for_url("https://x.org/a.pdf#page=2"), ContentRoute::Pdf);
        assert_eq!(ContentRoute::for_url("https://x.org/a.html"), ContentRoute::Html);
        assert_eq!(
            ContentRoute::for_url("https://x.org/view?file=a.pdf&x=1"),
            ContentRoute::Html
        );
    }

    const HELLO_PDF: &[u8] = include_bytes!("../../tests/fixtures/hello.pdf");

    #[test]
    fn test_pdf_text_layer_is_extracted() {
        let text = PdfExtract.extract_text(HELLO_PDF).unwrap();
        assert!(text.contains("Hello"), "got {:?}", text);
        assert!(text.contains("Second line"), "got {:?}", text);
        assert!(text.lines().all(|line| line == line.trim() && !line.is_empty()));
    }

    #[test]
    fn test_garbage_pdf_is_malformed() {
        assert!(matches!(
            PdfExtract.extract_text(b"%PDF-1.4 fake"),
            Err(ExtractError::Malformed(_))
        ));
    }

    #[test]
    fn test_unsupported_pdf_declines() {
        assert!(matches!(
            UnsupportedPdf.extract_text(b"%PDF-1.4"),
            Err(ExtractError::Unsupported)
        ));
    }
}
