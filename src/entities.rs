//! Entity-recognition backends for the anonymizer.
//!
//! [`HttpEntityRecognizer`] calls an external NER service:
//!
//! ```text
//! POST <anonymizer.url>
//! {"text": "..."}
//!
//! 200 OK
//! {"entities": [{"start": 0, "end": 8, "label": "PERSON"}, ...]}
//! ```
//!
//! Offsets are character (not byte) positions, end-exclusive, the way
//! spaCy-style services report them. Labels other than persons, locations,
//! and organizations are ignored.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use resume_index_core::anonymize::{EntityRecognizer, HeuristicRecognizer, PiiCategory, Span};
use resume_index_core::Error;

use crate::config::AnonymizerConfig;

#[derive(Debug, Deserialize)]
struct NerResponse {
    entities: Vec<NerEntity>,
}

#[derive(Debug, Deserialize)]
struct NerEntity {
    start: usize,
    end: usize,
    label: String,
}

fn category_for(label: &str) -> Option<PiiCategory> {
    match label.to_ascii_uppercase().as_str() {
        "PERSON" | "PER" => Some(PiiCategory::Person),
        "LOC" | "GPE" | "LOCATION" | "FAC" => Some(PiiCategory::Location),
        "ORG" | "ORGANIZATION" => Some(PiiCategory::Organization),
        _ => None,
    }
}

pub struct HttpEntityRecognizer {
    client: reqwest::Client,
    url: String,
}

impl HttpEntityRecognizer {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl EntityRecognizer for HttpEntityRecognizer {
    fn name(&self) -> &str {
        "http"
    }

    async fn recognize(&self, text: &str) -> resume_index_core::Result<Vec<Span>> {
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| Error::Anonymization(format!("NER request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Anonymization(format!("NER service returned {status}")));
        }
        let body: NerResponse = response
            .json()
            .await
            .map_err(|e| Error::Anonymization(format!("invalid NER response: {e}")))?;
        to_byte_spans(text, &body.entities)
    }
}

/// Convert character-offset entities into byte-offset spans.
fn to_byte_spans(text: &str, entities: &[NerEntity]) -> resume_index_core::Result<Vec<Span>> {
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let mut spans = Vec::new();
    for entity in entities {
        let Some(category) = category_for(&entity.label) else {
            continue;
        };
        let (Some(&start), Some(&end)) = (offsets.get(entity.start), offsets.get(entity.end)) else {
            return Err(Error::Anonymization(format!(
                "entity [{}, {}) is outside the text",
                entity.start, entity.end
            )));
        };
        if start >= end {
            continue;
        }
        spans.push(Span {
            start,
            end,
            category,
        });
    }
    Ok(spans)
}

/// Build the entity layer selected by `anonymizer.entity_provider`.
pub fn create_recognizer(config: &AnonymizerConfig) -> Result<Option<Arc<dyn EntityRecognizer>>> {
    match config.entity_provider.as_str() {
        "heuristic" => Ok(Some(Arc::new(HeuristicRecognizer))),
        "http" => {
            let url = config
                .url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("anonymizer.url required for http provider"))?;
            Ok(Some(Arc::new(HttpEntityRecognizer::new(url, config.timeout_secs)?)))
        }
        "disabled" => Ok(None),
        other => bail!("Unknown anonymizer.entity_provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(start: usize, end: usize, label: &str) -> NerEntity {
        NerEntity {
            start,
            end,
            label: label.to_string(),
        }
    }

    #[test]
    fn test_char_offsets_become_byte_offsets() {
        let text = "José Núñez trabajó en Telefónica";
        let spans = to_byte_spans(
            text,
            &[entity(0, 10, "PER"), entity(22, 32, "ORG"), entity(11, 18, "MISC")],
        )
        .unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(&text[spans[0].start..spans[0].end], "José Núñez");
        assert_eq!(spans[0].category, PiiCategory::Person);
        assert_eq!(&text[spans[1].start..spans[1].end], "Telefónica");
        assert_eq!(spans[1].category, PiiCategory::Organization);
    }

    #[test]
    fn test_out_of_range_entity_is_error() {
        assert!(to_byte_spans("short", &[entity(0, 50, "PERSON")]).is_err());
    }

    #[test]
    fn test_create_recognizer() {
        let mut config = AnonymizerConfig::default();
        assert_eq!(create_recognizer(&config).unwrap().unwrap().name(), "heuristic");
        config.entity_provider = "disabled".to_string();
        assert!(create_recognizer(&config).unwrap().is_none());
        config.entity_provider = "http".to_string();
        assert!(create_recognizer(&config).is_err());
        config.url = Some("http://127.0.0.1:9/ner".to_string());
        assert_eq!(create_recognizer(&config).unwrap().unwrap().name(), "http");
    }
}
