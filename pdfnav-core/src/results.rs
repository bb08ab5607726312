//! Payloads produced by the analysis backend and the references they carry.
//!
//! Every result set (outline headings, ranked sections, semantic snippets)
//! names a document by label and a page; [`ResultReference`] is the common
//! shape the navigation coordinator consumes.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    Outline,
    Section,
    Snippet,
}

/// A document label plus a one-based page, optionally with text to highlight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultReference {
    pub document_label: String,
    pub page: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ResultReference {
    pub fn new(document_label: impl Into<String>, page: u32) -> Self {
        Self {
            document_label: document_label.into(),
            page: page.max(1),
            text: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        let trimmed = text.trim();
        self.text = (!trimmed.is_empty()).then(|| trimmed.to_owned());
        self
    }
}

/// `{success, data}` wrapper used by every backend endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl<T> Envelope<T> {
    pub fn into_data(self) -> Result<T> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err(anyhow!("backend response has no data")),
            (false, _) => Err(anyhow!(
                "backend reported failure: {}",
                self.detail.as_deref().unwrap_or("no detail")
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineDocument {
    pub filename: String,
    pub outline: Outline,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Outline {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub outline: Vec<Heading>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heading {
    pub level: String,
    pub text: String,
    /// Zero-based.
    pub page: u32,
}

impl OutlineDocument {
    /// Headings as references. The heading text doubles as the highlight query.
    pub fn references(&self) -> Vec<ResultReference> {
        self.outline
            .outline
            .iter()
            .map(|heading| {
                ResultReference::new(&self.filename, heading.page.saturating_add(1))
                    .with_text(&heading.text)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankedSections {
    #[serde(default)]
    pub extracted_sections: Vec<RankedSection>,
    #[serde(default)]
    pub subsection_analysis: Vec<SubsectionAnalysis>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedSection {
    pub document: String,
    pub section_title: String,
    pub importance_rank: u32,
    pub page_number: u32,
    #[serde(default)]
    pub similarity_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsectionAnalysis {
    pub document: String,
    pub refined_text: String,
    pub page_number: u32,
    #[serde(default)]
    pub similarity_score: Option<f64>,
}

impl RankedSections {
    /// Sections in importance order (rank 1 first).
    pub fn references(&self) -> Vec<ResultReference> {
        let mut sections: Vec<&RankedSection> = self.extracted_sections.iter().collect();
        sections.sort_by_key(|section| section.importance_rank);
        sections
            .into_iter()
            .map(|section| ResultReference::new(&section.document, section.page_number))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnippetResults {
    #[serde(default)]
    pub snippets: Vec<Snippet>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub document: String,
    pub page_number: u32,
    pub text: String,
}

impl SnippetResults {
    pub fn references(&self) -> Vec<ResultReference> {
        self.snippets
            .iter()
            .map(|snippet| ResultReference::new(&snippet.document, snippet.page_number))
            .collect()
    }
}

/// Form body of a semantic snippet search: the selected text and the
/// document it was selected in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnippetQuery {
    pub query_text: String,
    pub current_document_name: String,
}

/// Reads any backend result body, enveloped or bare, into references.
pub fn parse_references(source: ResultSource, body: &str) -> Result<Vec<ResultReference>> {
    let value: serde_json::Value = serde_json::from_str(body)?;
    let payload = if value.get("success").is_some() {
        serde_json::from_value::<Envelope<serde_json::Value>>(value)?.into_data()?
    } else {
        value
    };
    let references = match source {
        ResultSource::Outline => serde_json::from_value::<OutlineDocument>(payload)?.references(),
        ResultSource::Section => serde_json::from_value::<RankedSections>(payload)?.references(),
        ResultSource::Snippet => serde_json::from_value::<SnippetResults>(payload)?.references(),
    };
    Ok(references)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outline_pages_become_one_based_with_heading_text() {
        let body = r#"{
            "success": true,
            "data": {
                "filename": "invoice.pdf",
                "outline": {
                    "title": "Invoice 2024-118",
                    "outline": [
                        {"level": "H1", "text": "Summary", "page": 0},
                        {"level": "H2", "text": " Total Due ", "page": 2}
                    ]
                }
            }
        }"#;
        let references = parse_references(ResultSource::Outline, body).unwrap();
        assert_eq!(
            references,
            vec![
                ResultReference::new("invoice.pdf", 1).with_text("Summary"),
                ResultReference {
                    document_label: "invoice.pdf".into(),
                    page: 3,
                    text: Some("Total Due".into()),
                },
            ]
        );
    }

    #[test]
    fn sections_follow_importance_rank() {
        let body = r#"{
            "metadata": {"persona": "Travel Planner"},
            "extracted_sections": [
                {"document": "South of France - Cities.pdf", "section_title": "Nice",
                 "importance_rank": 2, "page_number": 4, "similarity_score": 0.61},
                {"document": "South of France - Cuisine.pdf", "section_title": "Markets",
                 "importance_rank": 1, "page_number": 7, "similarity_score": 0.72}
            ],
            "subsection_analysis": []
        }"#;
        let references = parse_references(ResultSource::Section, body).unwrap();
        let labels: Vec<_> = references.iter().map(|r| (r.document_label.as_str(), r.page)).collect();
        assert_eq!(
            labels,
            vec![
                ("South of France - Cuisine.pdf", 7),
                ("South of France - Cities.pdf", 4)
            ]
        );
        assert!(references.iter().all(|r| r.text.is_none()));
    }

    #[test]
    fn snippets_parse_from_envelope() {
        let body = r#"{"success": true, "data": {"snippets": [
            {"document": "guide.pdf", "page_number": 2, "text": "the old town"}
        ]}}"#;
        assert_eq!(
            parse_references(ResultSource::Snippet, body).unwrap(),
            vec![ResultReference::new("guide.pdf", 2)]
        );
    }

    #[test]
    fn failed_envelope_is_an_error() {
        let body = r#"{"success": false, "detail": "Snippet search failed"}"#;
        let err = parse_references(ResultSource::Snippet, body).unwrap_err();
        assert!(err.to_string().contains("Snippet search failed"));
    }

    #[test]
    fn page_zero_is_clamped_and_blank_text_dropped() {
        let reference = ResultReference::new("a.pdf", 0).with_text("   ");
        assert_eq!(reference.page, 1);
        assert_eq!(reference.text, None);
    }
}
