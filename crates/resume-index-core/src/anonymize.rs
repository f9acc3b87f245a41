//! PII redaction.
//!
//! Two layers run over the extracted text and their spans are merged before
//! a single replacement pass:
//!
//! 1. **Patterns** (always on, deterministic): emails, phone numbers,
//!    national IDs, street addresses, profile URLs, and labelled names
//!    (`Name: ...`, `Nombre: ...`).
//! 2. **Entities** (pluggable [`EntityRecognizer`]): person names,
//!    locations, organizations.
//!
//! If the entity layer errors, redaction continues with patterns only and
//! the result is flagged `degraded`. Redaction itself never fails.
//!
//! Every span is replaced by its category placeholder (`[EMAIL]`,
//! `[PHONE]`, ...). Placeholders are stable tokens: the chunker keeps them
//! whole and the embedder sees them as ordinary words.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiCategory {
    Email,
    Phone,
    NationalId,
    Address,
    ProfileUrl,
    Person,
    Location,
    Organization,
}

impl PiiCategory {
    pub const ALL: [PiiCategory; 8] = [
        PiiCategory::Email,
        PiiCategory::Phone,
        PiiCategory::NationalId,
        PiiCategory::Address,
        PiiCategory::ProfileUrl,
        PiiCategory::Person,
        PiiCategory::Location,
        PiiCategory::Organization,
    ];

    pub fn placeholder(self) -> &'static str {
        match self {
            Self::Email => "[EMAIL]",
            Self::Phone => "[PHONE]",
            Self::NationalId => "[NATIONAL_ID]",
            Self::Address => "[ADDRESS]",
            Self::ProfileUrl => "[PROFILE_URL]",
            Self::Person => "[PERSON]",
            Self::Location => "[LOCATION]",
            Self::Organization => "[ORGANIZATION]",
        }
    }
}

/// Length in characters of the longest placeholder token.
pub fn max_placeholder_chars() -> usize {
    PiiCategory::ALL
        .iter()
        .map(|c| c.placeholder().chars().count())
        .max()
        .unwrap_or(0)
}

/// A byte range of the input that must be redacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub category: PiiCategory,
}

/// Entity layer of the anonymizer.
///
/// Implementations return byte-offset spans into `text`. Spans that fall
/// outside `text` or off a char boundary are treated as a recognizer error.
#[async_trait]
pub trait EntityRecognizer: Send + Sync {
    fn name(&self) -> &str;
    async fn recognize(&self, text: &str) -> Result<Vec<Span>>;
}

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[a-z0-9._%+\-]+@[a-z0-9\-]+(?:\.[a-z0-9\-]+)*\.[a-z]{2,}")
        .expect("static regex")
});

static PROFILE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:https?://)?(?:[a-z]{2,3}\.)?(?:linkedin\.com/in|github\.com|gitlab\.com|twitter\.com|x\.com)/[a-z0-9_\-]+(?:/[a-z0-9_\-]+)*/?",
    )
    .expect("static regex")
});

/// Candidate phone numbers; the digit count is checked separately.
static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+\d{1,3}|\b00\d{1,3}|\(\d{2,4}\)|\b\d{2,4})(?:[ .\-]?\(?\d{1,4}\)?){2,6}\b")
        .expect("static regex")
});

static NATIONAL_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:\d{8}[ \-]?[A-HJ-NP-TV-Z]|[XYZ][ \-]?\d{7}[ \-]?[A-HJ-NP-TV-Z]|\d{3}-\d{2}-\d{4})\b",
    )
    .expect("static regex")
});

static ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\b\d{1,5}[ \t]+(?:\p{Lu}[\p{L}.']*[ \t]+){1,4}",
        r"(?:Street|St\.?|Avenue|Ave\.?|Road|Rd\.?|Boulevard|Blvd\.?|Lane|Ln\.?|Drive|Dr\.?|Court|Ct\.?|Way|Place|Pl\.?)",
        r"|(?i:\b(?:calle|c/|avda\.?|avenida|plaza|pza\.?|paseo|camino|carretera|ronda|travesía|rúa))",
        r"[ \t]+[^\n,]{2,60}?,?[ \t]*(?i:n[ºo°]\.?[ \t]*)?\d{1,4}[A-Za-z]?\b",
    ))
    .expect("static regex")
});

static LABELLED_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i:\b(?:full name|name|nombre completo|nombre|apellidos|candidate|candidato))[ \t]*:[ \t]*(\p{Lu}[\p{L}'\-]+(?:[ \t]+(?:(?:de|del|la|las|los|y|van|von|da|di)[ \t]+)?\p{Lu}[\p{L}'\-]+){0,4})",
    )
    .expect("static regex")
});

const MIN_PHONE_DIGITS: usize = 9;
const MAX_PHONE_DIGITS: usize = 15;

/// Result of redacting one text.
#[derive(Debug, Clone)]
pub struct Redaction {
    pub text: String,
    pub counts: BTreeMap<PiiCategory, u32>,
    pub degraded: bool,
}

impl Redaction {
    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }
}

/// Pattern layer plus an optional entity layer.
#[derive(Clone, Default)]
pub struct Anonymizer {
    recognizer: Option<Arc<dyn EntityRecognizer>>,
}

impl Anonymizer {
    pub fn new(recognizer: Option<Arc<dyn EntityRecognizer>>) -> Self {
        Self { recognizer }
    }

    /// Anonymizer that runs the pattern layer only.
    pub fn pattern_only() -> Self {
        Self { recognizer: None }
    }

    pub async fn redact(&self, text: &str) -> Redaction {
        let mut spans = pattern_spans(text);
        let mut degraded = false;

        if let Some(recognizer) = &self.recognizer {
            match recognizer.recognize(text).await.and_then(|found| {
                check_spans(text, &found)?;
                Ok(found)
            }) {
                Ok(found) => spans.extend(found),
                Err(e) => {
                    tracing::warn!(
                        recognizer = recognizer.name(),
                        error = %e,
                        "entity recognition failed; continuing with pattern-only redaction"
                    );
                    degraded = true;
                }
            }
        }

        let (text, counts) = apply_spans(text, merge_spans(spans));
        Redaction {
            text,
            counts,
            degraded,
        }
    }
}

/// Run the deterministic pattern layer.
pub fn pattern_spans(text: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut push = |start: usize, end: usize, category: PiiCategory| {
        spans.push(Span {
            start,
            end,
            category,
        })
    };

    for m in EMAIL.find_iter(text) {
        push(m.start(), m.end(), PiiCategory::Email);
    }
    for m in PROFILE_URL.find_iter(text) {
        push(m.start(), m.end(), PiiCategory::ProfileUrl);
    }
    for m in NATIONAL_ID.find_iter(text) {
        push(m.start(), m.end(), PiiCategory::NationalId);
    }
    for m in PHONE.find_iter(text) {
        if is_phone(m.as_str()) {
            push(m.start(), m.end(), PiiCategory::Phone);
        }
    }
    for m in ADDRESS.find_iter(text) {
        push(m.start(), m.end(), PiiCategory::Address);
    }
    for caps in LABELLED_NAME.captures_iter(text) {
        if let Some(name) = caps.get(1) {
            push(name.start(), name.end(), PiiCategory::Person);
        }
    }
    spans
}

fn is_phone(candidate: &str) -> bool {
    let digits = candidate.chars().filter(char::is_ascii_digit).count();
    (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits) && !is_year_list(candidate)
}

/// `2015 2018 2021` and similar runs of years are not phone numbers.
fn is_year_list(candidate: &str) -> bool {
    let groups: Vec<&str> = candidate
        .split(|c: char| !c.is_ascii_digit())
        .filter(|g| !g.is_empty())
        .collect();
    !candidate.starts_with(['+', '('])
        && groups.iter().all(|g| {
            g.len() == 4 && matches!(g.parse::<u32>(), Ok(year) if (1900..=2099).contains(&year))
        })
}

fn check_spans(text: &str, spans: &[Span]) -> Result<()> {
    for s in spans {
        if s.start >= s.end
            || s.end > text.len()
            || !text.is_char_boundary(s.start)
            || !text.is_char_boundary(s.end)
        {
            return Err(Error::Anonymization(format!(
                "recognizer returned invalid span {}..{}",
                s.start, s.end
            )));
        }
    }
    Ok(())
}

/// Sort and merge overlapping spans. On overlap the earliest-starting span
/// wins its category, and the merged span covers both.
fn merge_spans(mut spans: Vec<Span>) -> Vec<Span> {
    spans.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
    let mut merged: Vec<Span> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.start < last.end => {
                last.end = last.end.max(span.end);
            }
            _ => merged.push(span),
        }
    }
    merged
}

fn apply_spans(text: &str, spans: Vec<Span>) -> (String, BTreeMap<PiiCategory, u32>) {
    let mut out = String::with_capacity(text.len());
    let mut counts = BTreeMap::new();
    let mut cursor = 0;
    for span in spans {
        out.push_str(&text[cursor..span.start]);
        out.push_str(span.category.placeholder());
        *counts.entry(span.category).or_insert(0) += 1;
        cursor = span.end;
    }
    out.push_str(&text[cursor..]);
    (out, counts)
}

/// Words that look like names in a résumé header but are section titles or
/// job titles.
const HEADER_STOP_WORDS: &[&str] = &[
    "curriculum", "vitae", "resume", "résumé", "cv", "profile", "perfil", "summary", "resumen",
    "contact", "contacto", "experience", "experiencia", "education", "educación", "formación",
    "skills", "habilidades", "languages", "idiomas", "personal", "datos", "personales", "about",
    "objective", "objetivo", "professional", "profesional", "senior", "junior", "developer",
    "desarrollador", "engineer", "ingeniero", "manager", "analyst", "designer", "consultant",
    "software", "data", "web", "full", "stack", "backend", "frontend", "references", "projects",
    "proyectos", "certifications", "work", "history", "cover", "letter", "carta", "presentación",
];

const NAME_PARTICLES: &[&str] = &["de", "del", "la", "las", "los", "y", "van", "von", "da", "di"];

/// Lines at the top of the document inspected for a bare name.
const HEADER_LINES: usize = 5;

static CAPITALIZED_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\p{Lu}[\p{Ll}'\-]+$|^\p{Lu}{2,}$").expect("static regex"));

/// Offline entity layer: finds a bare personal name in the first lines of a
/// résumé, where most templates put it.
///
/// A line qualifies when it is 2 to 5 capitalized words (name particles such
/// as `de` or `van` allowed in between) and none of them is a common heading
/// or job-title word.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicRecognizer;

#[async_trait]
impl EntityRecognizer for HeuristicRecognizer {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn recognize(&self, text: &str) -> Result<Vec<Span>> {
        let mut spans = Vec::new();
        let mut offset = 0;
        let mut seen = 0;
        for line in text.split_inclusive('\n') {
            let line_start = offset;
            offset += line.len();
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            seen += 1;
            if seen > HEADER_LINES {
                break;
            }
            if looks_like_name(trimmed) {
                let lead = line.len() - line.trim_start().len();
                let start = line_start + lead;
                spans.push(Span {
                    start,
                    end: start + trimmed.len(),
                    category: PiiCategory::Person,
                });
            }
        }
        Ok(spans)
    }
}

fn looks_like_name(line: &str) -> bool {
    let words: Vec<&str> = line.split_whitespace().collect();
    let proper: Vec<&&str> = words
        .iter()
        .filter(|w| !NAME_PARTICLES.contains(&w.to_lowercase().as_str()))
        .collect();
    (2..=5).contains(&proper.len())
        && proper.iter().all(|w| CAPITALIZED_WORD.is_match(w))
        && !proper
            .iter()
            .any(|w| HEADER_STOP_WORDS.contains(&w.to_lowercase().as_str()))
}
