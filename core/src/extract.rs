use anyhow::{Result, bail};
use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

// Absolute unix path ending in a supported document extension.
static DOCUMENT_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(/[^/\x00]*)+/\S+\.(pdf|docx|xlsx)$").unwrap());

/// Shape of a raw clipboard payload, classified once before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    PdfPath,
    DocxPath,
    XlsxPath,
    HtmlFragment,
    PlainText,
}

pub fn classify(raw: &str) -> ContentKind {
    if DOCUMENT_PATH_RE.is_match(raw) {
        let extension = Path::new(raw)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match extension.as_deref() {
            Some("pdf") => ContentKind::PdfPath,
            Some("docx") => ContentKind::DocxPath,
            Some("xlsx") => ContentKind::XlsxPath,
            _ => ContentKind::PlainText,
        }
    } else if raw.to_lowercase().contains("<html>") {
        ContentKind::HtmlFragment
    } else {
        ContentKind::PlainText
    }
}

/// Document-format readers consumed by extraction. Each returns extracted
/// plain text or an error; callers always fall back to the raw payload.
pub trait DocumentReader {
    fn read_pdf(&self, path: &Path) -> Result<String>;
    fn read_docx(&self, path: &Path) -> Result<String>;
    fn read_xlsx(&self, path: &Path) -> Result<String>;
    fn read_html(&self, markup: &str) -> Result<String>;
}

/// Declines every request, so extraction stores payloads verbatim.
pub struct NullReader;

impl DocumentReader for NullReader {
    fn read_pdf(&self, path: &Path) -> Result<String> {
        bail!("no pdf reader configured for {}", path.display())
    }

    fn read_docx(&self, path: &Path) -> Result<String> {
        bail!("no docx reader configured for {}", path.display())
    }

    fn read_xlsx(&self, path: &Path) -> Result<String> {
        bail!("no xlsx reader configured for {}", path.display())
    }

    fn read_html(&self, _markup: &str) -> Result<String> {
        bail!("no html reader configured")
    }
}

/// Reduce a raw payload to the plain text to store. Best effort: a failing
/// or empty reader result falls back to the raw payload, never to a lost
/// capture.
pub fn extract(raw: &str, reader: &dyn DocumentReader) -> String {
    let result = match classify(raw) {
        ContentKind::PdfPath => reader.read_pdf(Path::new(raw)),
        ContentKind::DocxPath => reader.read_docx(Path::new(raw)),
        ContentKind::XlsxPath => reader.read_xlsx(Path::new(raw)),
        ContentKind::HtmlFragment => reader.read_html(raw),
        ContentKind::PlainText => return raw.to_string(),
    };

    match result {
        Ok(text) if !text.is_empty() => text,
        Ok(_) => raw.to_string(),
        Err(e) => {
            warn!("extraction failed, keeping raw payload: {e:#}");
            raw.to_string()
        }
    }
}
