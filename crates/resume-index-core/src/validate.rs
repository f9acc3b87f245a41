//! Upload validation and quarantine routing.
//!
//! [`validate`] runs before anything is written. It rejects uploads that
//! violate the size, type, or quota policy with [`Error::Validation`], and
//! for accepted uploads decides whether the bytes look like what the
//! uploader declared ([`Verdict::Clean`]) or must be held back
//! ([`Verdict::Quarantine`]).
//!
//! Content sniffing recognizes:
//!
//! | Signature | Meaning |
//! |-----------|---------|
//! | `%PDF` | PDF |
//! | `D0 CF 11 E0 A1 B1 1A E1` | OLE compound file (legacy `.doc`) |
//! | `PK 03 04` + `word/` part | DOCX |
//! | `PK 03 04` | other ZIP |
//! | `MZ`, `7F ELF`, Mach-O magics | native executable |
//! | `#!` | script |

use std::borrow::Cow;
use std::io::Read;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::bytes::Regex as BytesRegex;
use regex::Regex;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::models::{DeclaredType, OwnerId};

/// Longest stem kept by [`sanitize_filename`], in characters.
pub const MAX_STEM_CHARS: usize = 50;

const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const MACH_O_MAGICS: [[u8; 4]; 5] = [
    [0xFE, 0xED, 0xFA, 0xCE],
    [0xFE, 0xED, 0xFA, 0xCF],
    [0xCE, 0xFA, 0xED, 0xFE],
    [0xCF, 0xFA, 0xED, 0xFE],
    [0xCA, 0xFE, 0xBA, 0xBE],
];

static ACTIVE_CONTENT: LazyLock<BytesRegex> = LazyLock::new(|| {
    BytesRegex::new(r"(?i)<script|javascript:|vbscript:|onload\s*=|onerror\s*=|<%|<\?php")
        .expect("static regex")
});

/// Stream bodies in a PDF, which are usually compressed binary.
static PDF_STREAM_BODY: LazyLock<BytesRegex> =
    LazyLock::new(|| BytesRegex::new(r"(?s-u)\bstream\r?\n.*?endstream").expect("static regex"));

/// Longest decompressed archive part scanned for active content.
const MAX_SCANNED_PART_BYTES: u64 = 16 * 1024 * 1024;

/// Shortest printable run in an OLE container that counts as text.
const MIN_OLE_TEXT_RUN: usize = 16;

/// PDF actions that run code or launch programs when the file is opened.
static PDF_ACTIONS: LazyLock<BytesRegex> =
    LazyLock::new(|| BytesRegex::new(r"/JavaScript|/JS\s*[(<]|/Launch").expect("static regex"));

static FILENAME_DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("static regex"));
static FILENAME_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s-]+").expect("static regex"));

/// What the leading bytes of an upload say it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sniffed {
    Pdf,
    Ole,
    Docx,
    Zip,
    Executable,
    Script,
    Unknown,
}

impl Sniffed {
    fn describe(self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Ole => "OLE compound document",
            Self::Docx => "DOCX",
            Self::Zip => "ZIP archive",
            Self::Executable => "native executable",
            Self::Script => "script",
            Self::Unknown => "unrecognized content",
        }
    }
}

pub fn sniff(bytes: &[u8]) -> Sniffed {
    if bytes.starts_with(b"%PDF") {
        Sniffed::Pdf
    } else if bytes.starts_with(OLE_MAGIC) {
        Sniffed::Ole
    } else if bytes.starts_with(ZIP_MAGIC) {
        if bytes.windows(5).any(|w| w == b"word/") {
            Sniffed::Docx
        } else {
            Sniffed::Zip
        }
    } else if bytes.starts_with(b"MZ")
        || bytes.starts_with(b"\x7fELF")
        || MACH_O_MAGICS.iter().any(|m| bytes.starts_with(m))
    {
        Sniffed::Executable
    } else if bytes.starts_with(b"#!") {
        Sniffed::Script
    } else {
        Sniffed::Unknown
    }
}

/// How far sniffed content may stray from the declared type before the
/// upload is quarantined. Executables and scripts always quarantine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SniffTolerance {
    /// Sniffed type must equal the declared type.
    Exact,
    /// DOC and DOCX are interchangeable; PDF must be PDF; unknown content quarantines.
    #[default]
    Family,
    /// Like `Family`, but content with no recognizable signature passes.
    Lenient,
}

/// Whether content sniffed as `sniffed` is acceptable for `declared`.
pub fn sniff_matches(declared: DeclaredType, sniffed: Sniffed, tolerance: SniffTolerance) -> bool {
    use DeclaredType::*;
    match (sniffed, tolerance) {
        (Sniffed::Executable | Sniffed::Script, _) => false,
        (Sniffed::Unknown, SniffTolerance::Lenient) => true,
        (Sniffed::Unknown, _) => false,
        (_, SniffTolerance::Exact) => matches!(
            (declared, sniffed),
            (Pdf, Sniffed::Pdf) | (Doc, Sniffed::Ole) | (Docx, Sniffed::Docx)
        ),
        (_, SniffTolerance::Family) => matches!(
            (declared, sniffed),
            (Pdf, Sniffed::Pdf) | (Doc | Docx, Sniffed::Ole | Sniffed::Docx)
        ),
        (_, SniffTolerance::Lenient) => matches!(
            (declared, sniffed),
            (Pdf, Sniffed::Pdf) | (Doc | Docx, Sniffed::Ole | Sniffed::Docx | Sniffed::Zip)
        ),
    }
}

/// Upload rules, resolved from configuration at startup.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_size_bytes: u64,
    pub allowed_types: Vec<DeclaredType>,
    /// Live documents (not deleted, failed, or quarantined) allowed per owner.
    pub max_documents_per_owner: usize,
    pub sniff_tolerance: SniffTolerance,
    pub scan_active_content: bool,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_size_bytes: 5 * 1024 * 1024,
            allowed_types: DeclaredType::ALL.to_vec(),
            max_documents_per_owner: 10,
            sniff_tolerance: SniffTolerance::Family,
            scan_active_content: true,
        }
    }
}

/// A raw upload as handed over by the caller.
#[derive(Debug, Clone, Copy)]
pub struct Upload<'a> {
    pub owner_id: &'a OwnerId,
    pub filename: &'a str,
    pub content_type: &'a str,
    pub bytes: &'a [u8],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Clean,
    Quarantine(String),
}

/// An upload that passed the policy checks.
#[derive(Debug, Clone)]
pub struct Accepted {
    pub declared_type: DeclaredType,
    pub stored_filename: String,
    pub sha256: String,
    pub verdict: Verdict,
}

/// Check an upload against `policy`.
///
/// `live_documents` is the owner's current count of live documents. The
/// caller reads it from the store; validation itself does no I/O.
pub fn validate(
    upload: &Upload<'_>,
    policy: &UploadPolicy,
    live_documents: usize,
    now: DateTime<Utc>,
) -> Result<Accepted> {
    let size = upload.bytes.len() as u64;
    if size == 0 {
        return Err(Error::Validation("upload is empty".to_string()));
    }
    if size > policy.max_size_bytes {
        return Err(Error::Validation(format!(
            "upload is {} bytes, limit is {} bytes",
            size, policy.max_size_bytes
        )));
    }

    let declared_type = DeclaredType::from_mime(upload.content_type)
        .filter(|t| policy.allowed_types.contains(t))
        .ok_or_else(|| {
            Error::Validation(format!(
                "content type '{}' is not allowed",
                upload.content_type
            ))
        })?;

    if let Some(ext_type) = extension_of(upload.filename).and_then(DeclaredType::from_extension) {
        if ext_type != declared_type {
            return Err(Error::Validation(format!(
                "filename extension .{} does not match declared type {}",
                ext_type.extension(),
                declared_type.mime()
            )));
        }
    }

    if live_documents >= policy.max_documents_per_owner {
        return Err(Error::Validation(format!(
            "owner {} already has {} documents (limit {})",
            upload.owner_id, live_documents, policy.max_documents_per_owner
        )));
    }

    Ok(Accepted {
        declared_type,
        stored_filename: sanitize_filename(upload.filename, declared_type, now),
        sha256: sha256_hex(upload.bytes),
        verdict: inspect(upload.bytes, declared_type, policy),
    })
}

/// Decide whether accepted bytes may proceed to extraction.
pub fn inspect(bytes: &[u8], declared: DeclaredType, policy: &UploadPolicy) -> Verdict {
    let sniffed = sniff(bytes);
    if !sniff_matches(declared, sniffed, policy.sniff_tolerance) {
        return Verdict::Quarantine(format!(
            "declared {} but content is {}",
            declared.mime(),
            sniffed.describe()
        ));
    }
    if policy.scan_active_content {
        for (label, text) in text_regions(bytes, sniffed) {
            if let Some(m) = ACTIVE_CONTENT.find(&text) {
                return Verdict::Quarantine(format!(
                    "active content marker '{}' in {}",
                    String::from_utf8_lossy(m.as_bytes()),
                    label
                ));
            }
        }
        if sniffed == Sniffed::Pdf {
            if let Some(m) = PDF_ACTIONS.find(bytes) {
                return Verdict::Quarantine(format!(
                    "PDF action '{}' at byte {}",
                    String::from_utf8_lossy(m.as_bytes()).trim_end_matches(['(', '<']),
                    m.start()
                ));
            }
        }
    }
    Verdict::Clean
}

/// The parts of an upload that carry markup or text, each with a label for
/// the quarantine reason. Compressed streams and embedded media are left
/// out: short markers turn up in them by chance.
fn text_regions(bytes: &[u8], sniffed: Sniffed) -> Vec<(String, Cow<'_, [u8]>)> {
    match sniffed {
        Sniffed::Pdf => vec![(
            "PDF object text".to_string(),
            PDF_STREAM_BODY.replace_all(bytes, &b""[..]),
        )],
        Sniffed::Docx | Sniffed::Zip => match archive_markup_parts(bytes) {
            Some(parts) => parts
                .into_iter()
                .map(|(name, data)| (name, Cow::Owned(data)))
                .collect(),
            // Unreadable archives fail extraction later; scan what we have.
            None => vec![("archive".to_string(), Cow::Borrowed(bytes))],
        },
        Sniffed::Ole => vec![("OLE text".to_string(), Cow::Owned(ole_text_runs(bytes)))],
        _ => vec![("upload".to_string(), Cow::Borrowed(bytes))],
    }
}

fn is_markup_part(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    [".xml", ".rels", ".vml", ".htm", ".html", ".js"]
        .iter()
        .any(|ext| lower.ends_with(ext))
}

/// Decompressed XML and other markup entries of a ZIP container, or `None`
/// if the archive (or one of those entries) cannot be read.
fn archive_markup_parts(bytes: &[u8]) -> Option<Vec<(String, Vec<u8>)>> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).ok()?;
    let mut parts = Vec::new();
    for i in 0..archive.len() {
        let entry = archive.by_index(i).ok()?;
        if !is_markup_part(entry.name()) {
            continue;
        }
        let name = entry.name().to_string();
        let mut data = Vec::new();
        entry
            .take(MAX_SCANNED_PART_BYTES)
            .read_to_end(&mut data)
            .ok()?;
        parts.push((name, data));
    }
    Some(parts)
}

fn is_text_byte(b: u8) -> bool {
    b.is_ascii_graphic() || matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

/// Long printable runs of an OLE container, 8-bit and UTF-16LE, one per line.
fn ole_text_runs(bytes: &[u8]) -> Vec<u8> {
    let narrowed: Vec<u8> = bytes
        .chunks_exact(2)
        .map(|pair| match pair {
            [lo, 0] if is_text_byte(*lo) => *lo,
            _ => 0,
        })
        .collect();
    let mut out = Vec::new();
    let runs = bytes
        .split(|b| !is_text_byte(*b))
        .chain(narrowed.split(|b| *b == 0));
    for run in runs.filter(|run| run.len() >= MIN_OLE_TEXT_RUN) {
        out.extend_from_slice(run);
        out.push(b'\n');
    }
    out
}

fn extension_of(filename: &str) -> Option<&str> {
    let base = base_name(filename);
    base.rsplit_once('.').map(|(_, ext)| ext)
}

fn base_name(filename: &str) -> &str {
    filename.rsplit(['/', '\\']).next().unwrap_or(filename)
}

/// Produce a safe storage name: word characters only, separators folded to
/// `_`, stem capped at [`MAX_STEM_CHARS`], and the declared type's extension.
pub fn sanitize_filename(filename: &str, declared: DeclaredType, now: DateTime<Utc>) -> String {
    let base = base_name(filename);
    let stem = match base.rsplit_once('.') {
        Some((stem, _)) => stem,
        None => base,
    };
    let cleaned = FILENAME_DISALLOWED.replace_all(stem, "");
    let folded = FILENAME_SEPARATORS.replace_all(cleaned.trim(), "_");
    let mut stem: String = folded.trim_matches('_').chars().take(MAX_STEM_CHARS).collect();
    if stem.is_empty() {
        stem = format!("document_{}", now.timestamp());
    }
    format!("{}.{}", stem, declared.extension())
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MIME_DOC, MIME_DOCX, MIME_PDF};

    fn owner() -> OwnerId {
        OwnerId::new("owner-a")
    }

    fn upload<'a>(owner: &'a OwnerId, name: &'a str, ct: &'a str, bytes: &'a [u8]) -> Upload<'a> {
        Upload {
            owner_id: owner,
            filename: name,
            content_type: ct,
            bytes,
        }
    }

    fn fake_docx() -> Vec<u8> {
        let mut b = ZIP_MAGIC.to_vec();
        b.extend_from_slice(b"\x14\x00\x00\x00word/document.xml");
        b
    }

    #[test]
    fn test_oversized_upload_rejected() {
        let o = owner();
        let bytes = vec![b'%'; 10 * 1024];
        let policy = UploadPolicy {
            max_size_bytes: 5 * 1024,
            ..UploadPolicy::default()
        };
        let err = validate(&upload(&o, "cv.pdf", MIME_PDF, &bytes), &policy, 0, Utc::now())
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_empty_upload_rejected() {
        let o = owner();
        let err = validate(
            &upload(&o, "cv.pdf", MIME_PDF, b""),
            &UploadPolicy::default(),
            0,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_disallowed_type_rejected() {
        let o = owner();
        let err = validate(
            &upload(&o, "notes.txt", "text/plain", b"hello"),
            &UploadPolicy::default(),
            0,
            Utc::now(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("text/plain"));

        let pdf_only = UploadPolicy {
            allowed_types: vec![DeclaredType::Pdf],
            ..UploadPolicy::default()
        };
        let err = validate(
            &upload(&o, "cv.docx", MIME_DOCX, &fake_docx()),
            &pdf_only,
            0,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_extension_must_agree_with_declared_type() {
        let o = owner();
        let err = validate(
            &upload(&o, "cv.docx", MIME_PDF, b"%PDF-1.4"),
            &UploadPolicy::default(),
            0,
            Utc::now(),
        )
        .unwrap_err();
        assert!(err.to_string().contains(".docx"));

        // Unknown or missing extensions are fine.
        assert!(validate(
            &upload(&o, "cv", MIME_PDF, b"%PDF-1.4"),
            &UploadPolicy::default(),
            0,
            Utc::now()
        )
        .is_ok());
    }

    #[test]
    fn test_owner_quota() {
        let o = owner();
        let policy = UploadPolicy {
            max_documents_per_owner: 2,
            ..UploadPolicy::default()
        };
        let up = upload(&o, "cv.pdf", MIME_PDF, b"%PDF-1.4");
        assert!(validate(&up, &policy, 1, Utc::now()).is_ok());
        assert!(matches!(
            validate(&up, &policy, 2, Utc::now()),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_executable_declared_as_pdf_is_quarantined() {
        let o = owner();
        let mut bytes = b"MZ\x90\x00".to_vec();
        bytes.extend_from_slice(&[0u8; 64]);
        let accepted = validate(
            &upload(&o, "cv.pdf", MIME_PDF, &bytes),
            &UploadPolicy::default(),
            0,
            Utc::now(),
        )
        .unwrap();
        match accepted.verdict {
            Verdict::Quarantine(reason) => assert!(reason.contains("executable")),
            Verdict::Clean => panic!("executable passed validation"),
        }
    }

    #[test]
    fn test_executables_quarantine_even_when_lenient() {
        assert!(!sniff_matches(
            DeclaredType::Pdf,
            Sniffed::Executable,
            SniffTolerance::Lenient
        ));
        assert!(!sniff_matches(
            DeclaredType::Doc,
            Sniffed::Script,
            SniffTolerance::Lenient
        ));
    }

    #[test]
    fn test_tolerance_levels() {
        use DeclaredType::*;
        assert!(sniff_matches(Doc, Sniffed::Docx, SniffTolerance::Family));
        assert!(!sniff_matches(Doc, Sniffed::Docx, SniffTolerance::Exact));
        assert!(!sniff_matches(Pdf, Sniffed::Docx, SniffTolerance::Family));
        assert!(!sniff_matches(Pdf, Sniffed::Unknown, SniffTolerance::Family));
        assert!(sniff_matches(Pdf, Sniffed::Unknown, SniffTolerance::Lenient));
        assert!(!sniff_matches(Pdf, Sniffed::Ole, SniffTolerance::Lenient));
        assert!(sniff_matches(Docx, Sniffed::Zip, SniffTolerance::Lenient));
    }

    #[test]
    fn test_sniff_signatures() {
        assert_eq!(sniff(b"%PDF-1.7\n"), Sniffed::Pdf);
        assert_eq!(sniff(OLE_MAGIC), Sniffed::Ole);
        assert_eq!(sniff(&fake_docx()), Sniffed::Docx);
        assert_eq!(sniff(b"PK\x03\x04\x14\x00mimetype"), Sniffed::Zip);
        assert_eq!(sniff(b"\x7fELF\x02\x01"), Sniffed::Executable);
        assert_eq!(sniff(&[0xCF, 0xFA, 0xED, 0xFE, 0x07]), Sniffed::Executable);
        assert_eq!(sniff(b"#!/bin/sh\nrm -rf /"), Sniffed::Script);
        assert_eq!(sniff(b"hello"), Sniffed::Unknown);
    }

    #[test]
    fn test_active_content_quarantines() {
        let policy = UploadPolicy::default();
        let bytes = b"%PDF-1.4\n<< /URI (javascript:alert(1)) >>";
        assert!(matches!(
            inspect(bytes, DeclaredType::Pdf, &policy),
            Verdict::Quarantine(_)
        ));

        let launch = b"%PDF-1.4\n<< /S /Launch /F (cmd.exe) >>";
        assert!(matches!(
            inspect(launch, DeclaredType::Pdf, &policy),
            Verdict::Quarantine(_)
        ));

        let relaxed = UploadPolicy {
            scan_active_content: false,
            ..UploadPolicy::default()
        };
        assert_eq!(inspect(bytes, DeclaredType::Pdf, &relaxed), Verdict::Clean);
    }

    /// Markup parts are deflated, media parts stored as-is.
    fn docx_with_parts(parts: &[(&str, &[u8])]) -> Vec<u8> {
        use std::io::Write;
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            for (name, data) in parts {
                let method = if name.contains("/media/") {
                    zip::CompressionMethod::Stored
                } else {
                    zip::CompressionMethod::Deflated
                };
                let options = zip::write::SimpleFileOptions::default().compression_method(method);
                zip.start_file(*name, options).unwrap();
                zip.write_all(data).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn test_markers_in_docx_media_are_ignored() {
        let mut image = vec![0x89, b'P', b'N', b'G'];
        image.extend_from_slice(b"\x13\x7f<%\x00\xfe<?php\x01");
        let bytes = docx_with_parts(&[
            (
                "word/document.xml",
                &b"<w:document><w:t>Engineer</w:t></w:document>"[..],
            ),
            ("word/media/image1.png", &image[..]),
        ]);
        assert!(ACTIVE_CONTENT.is_match(&bytes));
        assert_eq!(
            inspect(&bytes, DeclaredType::Docx, &UploadPolicy::default()),
            Verdict::Clean
        );
    }

    #[test]
    fn test_script_in_docx_markup_quarantines() {
        let bytes = docx_with_parts(&[(
            "word/document.xml",
            &b"<w:document><script>alert(1)</script></w:document>"[..],
        )]);
        match inspect(&bytes, DeclaredType::Docx, &UploadPolicy::default()) {
            Verdict::Quarantine(reason) => {
                assert!(reason.contains("word/document.xml"), "{reason}")
            }
            Verdict::Clean => panic!("script in document body passed"),
        }
    }

    #[test]
    fn test_markers_inside_pdf_streams_are_ignored() {
        let bytes = b"%PDF-1.4\n4 0 obj << /Length 9 /Filter /FlateDecode >> stream\n\x9c<%\xa1<script\nendstream endobj\n";
        assert_eq!(
            inspect(bytes, DeclaredType::Pdf, &UploadPolicy::default()),
            Verdict::Clean
        );
    }

    #[test]
    fn test_ole_scan_reads_text_runs_only() {
        let mut bytes = OLE_MAGIC.to_vec();
        bytes.extend_from_slice(&[0x00, 0x01, b'<', b'%', 0xff, 0x02]);
        assert_eq!(
            inspect(&bytes, DeclaredType::Doc, &UploadPolicy::default()),
            Verdict::Clean
        );

        bytes.extend_from_slice(b"\x00<script>document.write(1)</script>\x00");
        assert!(matches!(
            inspect(&bytes, DeclaredType::Doc, &UploadPolicy::default()),
            Verdict::Quarantine(_)
        ));
    }

    #[test]
    fn test_legacy_doc_accepted() {
        let mut bytes = OLE_MAGIC.to_vec();
        bytes.extend_from_slice(&[0u8; 32]);
        assert_eq!(
            inspect(&bytes, DeclaredType::from_mime(MIME_DOC).unwrap(), &UploadPolicy::default()),
            Verdict::Clean
        );
    }

    #[test]
    fn test_sanitize_filename() {
        let now = Utc::now();
        assert_eq!(
            sanitize_filename("My CV - 2024 (final).PDF", DeclaredType::Pdf, now),
            "My_CV_2024_final.pdf"
        );
        assert_eq!(
            sanitize_filename("../../etc/passwd.docx", DeclaredType::Docx, now),
            "passwd.docx"
        );
        assert_eq!(
            sanitize_filename("C:\\Users\\jane\\currículum.doc", DeclaredType::Doc, now),
            "currículum.doc"
        );
        let long = format!("{}.pdf", "a".repeat(80));
        let cleaned = sanitize_filename(&long, DeclaredType::Pdf, now);
        assert_eq!(cleaned.len(), MAX_STEM_CHARS + ".pdf".len());

        let fallback = sanitize_filename("$$$.pdf", DeclaredType::Pdf, now);
        assert_eq!(fallback, format!("document_{}.pdf", now.timestamp()));
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
