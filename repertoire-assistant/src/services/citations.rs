//! Citation-marker stripping for assistant replies.
//!
//! Hosted assistants with file search inline markers such as `【4:0†source】`
//! in their replies and describe each marker in an annotation. Only
//! `file_citation` annotations name markers to strip.
//!
//! Markers are removed in a single left-to-right pass that, at each position,
//! removes the longest marker matching there. Text exposed by a removal is not
//! rescanned, so the result does not depend on the order annotations arrive in.

use serde::Deserialize;

/// Kind of annotation attached to a text block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    FileCitation,
    FilePath,
    #[serde(other)]
    Other,
}

/// Annotation naming a literal substring of the reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationAnnotation {
    pub kind: AnnotationKind,
    pub text: String,
}

impl CitationAnnotation {
    pub fn file_citation(text: impl Into<String>) -> Self {
        Self {
            kind: AnnotationKind::FileCitation,
            text: text.into(),
        }
    }
}

/// One block of a multi-part assistant message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentBlock {
    Text {
        value: String,
        annotations: Vec<CitationAnnotation>,
    },
    /// Images and other non-text parts; contribute nothing to the reply.
    Other,
}

/// Remove every occurrence of every marker, longest match first.
pub fn strip_markers(raw: &str, markers: &[&str]) -> String {
    let mut markers: Vec<&str> = markers.iter().copied().filter(|m| !m.is_empty()).collect();
    markers.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    markers.dedup();

    if markers.is_empty() {
        return raw.to_string();
    }

    let mut cleaned = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(ch) = rest.chars().next() {
        match markers.iter().find(|m| rest.starts_with(**m)) {
            Some(marker) => rest = &rest[marker.len()..],
            None => {
                cleaned.push(ch);
                rest = &rest[ch.len_utf8()..];
            }
        }
    }
    cleaned
}

fn strip_citations(raw: &str, annotations: &[CitationAnnotation]) -> String {
    let markers: Vec<&str> = annotations
        .iter()
        .filter(|a| a.kind == AnnotationKind::FileCitation)
        .map(|a| a.text.as_str())
        .collect();
    strip_markers(raw, &markers)
}

/// Strip the file-citation markers named by `annotations`, then trim.
pub fn clean_reply(raw: &str, annotations: &[CitationAnnotation]) -> String {
    strip_citations(raw, annotations).trim().to_string()
}

/// Join the text blocks of an assistant message, each cleaned with its own
/// annotations, and trim the result.
pub fn clean_content_blocks(blocks: &[ContentBlock]) -> String {
    let mut joined = String::new();
    for block in blocks {
        if let ContentBlock::Text { value, annotations } = block {
            joined.push_str(&strip_citations(value, annotations));
        }
    }
    joined.trim().to_string()
}
