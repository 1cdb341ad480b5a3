//! Text extraction for uploaded attachments.
//!
//! Produces the extracted text plus a page table of character offsets into
//! it. Only PDFs have pages; other formats return an empty page table and
//! their chunks carry no offsets.
//!
//! | Content type | Handling |
//! |--------------|----------|
//! | `application/pdf` | page by page via `pdf-extract`, pages joined by a blank line |
//! | DOCX | `word/document.xml` runs, one paragraph per blank-line block |
//! | `text/plain`, `text/markdown` | UTF-8 decode |

use std::io::Read;
use std::path::Path;

use grant_index_core::models::PageOffset;
use thiserror::Error;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Separator placed between consecutive pages and paragraphs.
const BLOCK_SEPARATOR: &str = "\n\n";

/// Maximum decompressed bytes read from `word/document.xml` (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
    #[error("document is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

/// Extracted text and its page table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub text: String,
    pub pages: Vec<PageOffset>,
}

/// Extract text from `bytes` according to `content_type`.
///
/// Parameters such as `; charset=utf-8` are ignored.
pub fn extract_document(bytes: &[u8], content_type: &str) -> Result<ExtractedDocument, ExtractError> {
    match content_type_essence(content_type).as_str() {
        MIME_PDF => extract_pdf(bytes),
        MIME_DOCX => extract_docx(bytes),
        MIME_TEXT | MIME_MARKDOWN => Ok(ExtractedDocument {
            text: std::str::from_utf8(bytes)?.to_string(),
            pages: Vec::new(),
        }),
        _ => Err(ExtractError::UnsupportedContentType(content_type.to_string())),
    }
}

/// `type/subtype` in lower case, without parameters.
pub fn content_type_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Guess a content type from a file extension.
pub fn content_type_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some(MIME_PDF),
        "docx" => Some(MIME_DOCX),
        "txt" => Some(MIME_TEXT),
        "md" | "markdown" => Some(MIME_MARKDOWN),
        _ => None,
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<ExtractedDocument, ExtractError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(join_pages(pages.iter().map(|p| p.trim())))
}

/// Join page texts with [`BLOCK_SEPARATOR`], recording each page's
/// character range. Pages are numbered from 1.
fn join_pages<'a>(pages: impl Iterator<Item = &'a str>) -> ExtractedDocument {
    let mut text = String::new();
    let mut offsets = Vec::new();
    let mut cursor = 0usize;

    for (i, page) in pages.enumerate() {
        if i > 0 {
            text.push_str(BLOCK_SEPARATOR);
            cursor += BLOCK_SEPARATOR.chars().count();
        }
        let len = page.chars().count();
        text.push_str(page);
        offsets.push(PageOffset {
            page_number: i as u32 + 1,
            start_index: cursor,
            end_index: cursor + len,
        });
        cursor += len;
    }

    ExtractedDocument {
        text,
        pages: offsets,
    }
}

fn extract_docx(bytes: &[u8]) -> Result<ExtractedDocument, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    let paragraphs = docx_paragraphs(&xml)?;
    Ok(ExtractedDocument {
        text: paragraphs.join(BLOCK_SEPARATOR),
        pages: Vec::new(),
    })
}

/// Non-empty paragraphs (`w:p`) of a WordprocessingML body, in order.
fn docx_paragraphs(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let para = current.trim();
                    if !para.is_empty() {
                        paragraphs.push(para.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" => current.push('\n'),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Docx(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    let tail = current.trim();
    if !tail.is_empty() {
        paragraphs.push(tail.to_string());
    }
    Ok(paragraphs)
}
