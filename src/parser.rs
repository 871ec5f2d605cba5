//! Response Parser
//!
//! Converts a raw generated answer into [`AnalysisFields`]. The answer must contain a
//! single `<analysis>...</analysis>` section whose children name the fields. Leaf
//! bodies are sandboxed from markup interpretation before strict parsing, and schema
//! completeness is checked after the fact.

use crate::analysis::{AnalysisFields, AnalysisSchema, FieldValue, LabelSet};
use crate::error::AnalyzerError;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

pub mod leaf_literal;

pub use leaf_literal::wrap_leaf_literals;

/// Element that delimits the structured answer.
pub const SECTION_TAG: &str = "analysis";

#[derive(Debug, Clone)]
pub struct ResponseParser {
    schema: AnalysisSchema,
    section_open: String,
    section_close: String,
}

impl ResponseParser {
    pub fn new(schema: AnalysisSchema) -> Self {
        Self::with_section(schema, SECTION_TAG)
    }

    pub fn with_section(schema: AnalysisSchema, section: &str) -> Self {
        Self {
            schema,
            section_open: format!("<{}>", section),
            section_close: format!("</{}>", section),
        }
    }

    pub fn schema(&self) -> AnalysisSchema {
        self.schema
    }

    pub fn parse(&self, raw: &str) -> Result<AnalysisFields, AnalyzerError> {
        let content = self.locate_section(raw)?;
        debug!(content = %content, "Original analysis content");

        let wrapped = wrap_leaf_literals(content);
        debug!(content = %wrapped, "Escaped analysis content");

        let document = format!("{}{}{}", self.section_open, wrapped, self.section_close);
        let children = extract_children(&document)?;

        let mut fields = AnalysisFields::new();
        for (tag, text) in children {
            let key = normalize_key(&tag);
            let value = text.trim();
            if value.is_empty() {
                continue;
            }
            if self.schema.is_multi_valued(&key) {
                let labels = LabelSet::from_csv(value);
                if !labels.is_empty() {
                    fields.insert(key, FieldValue::Labels(labels));
                }
            } else {
                fields.insert(key, FieldValue::Text(value.to_string()));
            }
        }

        if let Some(required) = self.schema.required_keys() {
            fields.retain_keys(required);
            let missing: Vec<&str> = required
                .iter()
                .copied()
                .filter(|key| !fields.contains_key(key))
                .collect();
            if !missing.is_empty() {
                let mut missing = missing;
                missing.sort_unstable();
                return Err(AnalyzerError::Parse(format!(
                    "Missing required headers in analysis XML: {}",
                    missing.join(", ")
                )));
            }
        }

        debug!(field_count = fields.len(), "Parsed analysis fields");
        Ok(fields)
    }

    fn locate_section<'a>(&self, raw: &'a str) -> Result<&'a str, AnalyzerError> {
        let not_found =
            || AnalyzerError::Parse("No analysis section found in the text".to_string());
        let start = raw.find(&self.section_open).ok_or_else(not_found)? + self.section_open.len();
        let end = raw[start..].find(&self.section_close).ok_or_else(not_found)?;
        Ok(raw[start..start + end].trim())
    }
}

/// Canonical field key for a tag: lowercase, hyphens as underscores.
pub fn normalize_key(tag: &str) -> String {
    tag.to_lowercase().replace('-', "_")
}

/// Strictly parse the rewritten document and return (tag, text) for each child of
/// the root element, in document order.
fn extract_children(document: &str) -> Result<Vec<(String, String)>, AnalyzerError> {
    let mut reader = Reader::from_str(document);
    let mut children = Vec::new();
    let mut current: Option<(String, String)> = None;
    let mut depth = 0usize;

    loop {
        let event = reader.read_event().map_err(|e| {
            AnalyzerError::Parse(format!(
                "Error parsing analysis XML at byte {}: {}",
                reader.buffer_position(),
                e
            ))
        })?;

        match event {
            Event::Start(start) => {
                depth += 1;
                let name = element_name(start.name().as_ref())?;
                match depth {
                    1 => {}
                    2 => current = Some((name, String::new())),
                    _ => {
                        return Err(AnalyzerError::Parse(format!(
                            "Unexpected nested element <{}> in analysis XML",
                            name
                        )))
                    }
                }
            }
            Event::End(_) => {
                if depth == 2 {
                    if let Some(child) = current.take() {
                        children.push(child);
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Empty(empty) => {
                if depth == 1 {
                    children.push((element_name(empty.name().as_ref())?, String::new()));
                }
            }
            Event::Text(text) => {
                if let Some((_, value)) = current.as_mut() {
                    let unescaped = text.unescape().map_err(|e| {
                        AnalyzerError::Parse(format!("Invalid text in analysis XML: {}", e))
                    })?;
                    value.push_str(&unescaped);
                }
            }
            Event::CData(cdata) => {
                if let Some((_, value)) = current.as_mut() {
                    let literal = std::str::from_utf8(&cdata).map_err(|e| {
                        AnalyzerError::Parse(format!("Invalid UTF-8 in analysis XML: {}", e))
                    })?;
                    value.push_str(literal);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth != 0 {
        return Err(AnalyzerError::Parse(
            "Unclosed element in analysis XML".to_string(),
        ));
    }

    Ok(children)
}

fn element_name(raw: &[u8]) -> Result<String, AnalyzerError> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|e| AnalyzerError::Parse(format!("Invalid tag name in analysis XML: {}", e)))
}
