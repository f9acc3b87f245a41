//! Text extraction for uploaded documents (PDF, DOCX, legacy DOC).
//!
//! Extraction works on the sniffed content rather than the declared type,
//! so a DOCX uploaded as `application/msword` (allowed under the `family`
//! sniff tolerance) is still read correctly. Output is plain UTF-8 with
//! paragraph breaks preserved and whitespace normalized; it never leaves
//! memory un-anonymized.
//!
//! All functions here are synchronous and CPU-bound. The pipeline calls
//! [`extract_text`] from `tokio::task::spawn_blocking`.

use std::io::Read;
use std::sync::LazyLock;

use quick_xml::events::Event;
use regex::Regex;

use resume_index_core::models::DeclaredType;
use resume_index_core::validate::{sniff, Sniffed};

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Shortest printable run kept when scanning a legacy DOC container.
const MIN_DOC_RUN_CHARS: usize = 4;
/// The OLE header sector, which never holds document text.
const OLE_HEADER_BYTES: usize = 512;

/// Names of OLE streams and Word internals that show up as printable runs.
const OLE_NOISE: &[&str] = &[
    "Root Entry",
    "WordDocument",
    "SummaryInformation",
    "DocumentSummaryInformation",
    "CompObj",
    "ObjectPool",
    "1Table",
    "0Table",
    "Microsoft Word",
    "MSWordDoc",
    "Word.Document",
    "Normal.dot",
    "Times New Roman",
    "Symbol",
    "Arial",
];

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("document is password-protected")]
    Encrypted,
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
    #[error("DOC extraction failed: {0}")]
    Doc(String),
    #[error("no extractable text")]
    NoText,
}

/// Extract and clean text from `bytes`.
///
/// Fails with [`ExtractError::NoText`] when the document parses but holds
/// nothing but whitespace.
pub fn extract_text(bytes: &[u8], declared: DeclaredType) -> Result<String, ExtractError> {
    let raw = match (sniff(bytes), declared) {
        (Sniffed::Pdf, _) => extract_pdf(bytes)?,
        (Sniffed::Docx | Sniffed::Zip, _) => extract_docx(bytes)?,
        (Sniffed::Ole, _) => extract_doc(bytes)?,
        (_, DeclaredType::Pdf) => extract_pdf(bytes)?,
        (_, DeclaredType::Docx) => extract_docx(bytes)?,
        (_, DeclaredType::Doc) => extract_doc(bytes)?,
    };
    let text = clean_text(&raw);
    if text.is_empty() {
        return Err(ExtractError::NoText);
    }
    Ok(text)
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    if bytes.windows(8).any(|w| w == b"/Encrypt") {
        return Err(ExtractError::Encrypted);
    }
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if archive.file_names().any(|n| n == "EncryptionInfo") {
        return Err(ExtractError::Encrypted);
    }
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;
    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    wordprocessing_text(&doc_xml)
}

/// Collect `<w:t>` text, ending each `<w:p>` with a newline and mapping
/// `<w:tab/>` and `<w:br/>` to their whitespace.
fn wordprocessing_text(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text = true;
                }
            }
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().map_err(|e| ExtractError::Docx(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => out.push('\t'),
                b"br" | b"cr" => out.push('\n'),
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

/// Recover text from a legacy Word binary by scanning the OLE container
/// for printable runs, both UTF-16LE and 8-bit. Word stores body text in
/// one encoding or the other; the richer of the two scans wins.
fn extract_doc(bytes: &[u8]) -> Result<String, ExtractError> {
    if bytes.len() <= OLE_HEADER_BYTES {
        return Err(ExtractError::Doc("truncated OLE container".to_string()));
    }
    let body = &bytes[OLE_HEADER_BYTES..];
    let wide = utf16_runs(body);
    let narrow = ascii_runs(body);
    let letters = |runs: &[String]| -> usize {
        runs.iter()
            .map(|r| r.chars().filter(|c| c.is_alphabetic()).count())
            .sum()
    };
    let runs = if letters(&wide) >= letters(&narrow) {
        wide
    } else {
        narrow
    };
    Ok(runs.join("\n"))
}

fn keep_run(run: &str) -> bool {
    let trimmed = run.trim();
    trimmed.chars().count() >= MIN_DOC_RUN_CHARS
        && trimmed.chars().any(|c| c.is_alphabetic())
        && !OLE_NOISE.iter().any(|noise| trimmed.contains(noise))
}

fn is_doc_text_char(c: char) -> bool {
    !c.is_control() || matches!(c, '\n' | '\r' | '\t')
}

fn utf16_runs(bytes: &[u8]) -> Vec<String> {
    let units = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
    let mut runs = Vec::new();
    let mut current = String::new();
    for decoded in char::decode_utf16(units) {
        match decoded {
            Ok(c) if is_doc_text_char(c) && c != '\u{fffd}' => current.push(c),
            _ => {
                if keep_run(&current) {
                    runs.push(std::mem::take(&mut current));
                } else {
                    current.clear();
                }
            }
        }
    }
    if keep_run(&current) {
        runs.push(current);
    }
    runs
}

fn ascii_runs(bytes: &[u8]) -> Vec<String> {
    bytes
        .split(|b| !(b.is_ascii_graphic() || matches!(b, b' ' | b'\t' | b'\r' | b'\n')))
        .filter_map(|run| std::str::from_utf8(run).ok())
        .filter(|run| keep_run(run))
        .map(str::to_string)
        .collect()
}

static HORIZONTAL_WS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\u{a0}\u{2000}-\u{200b}\u{3000}]+").expect("static regex"));
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("static regex"));

/// Normalize extracted text: drop control characters, collapse horizontal
/// whitespace, trim lines, and keep at most one blank line between
/// paragraphs.
pub fn clean_text(raw: &str) -> String {
    let normalized = raw.replace("\r\n", "\n").replace('\r', "\n");
    let stripped: String = normalized
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .collect();
    let lines: Vec<String> = stripped
        .lines()
        .map(|line| HORIZONTAL_WS.replace_all(line, " ").trim().to_string())
        .collect();
    BLANK_LINES
        .replace_all(&lines.join("\n"), "\n\n")
        .trim()
        .to_string()
}
