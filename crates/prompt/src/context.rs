//! Retrieved-document context formatting.

use serde_json::{Map, Value};

/// Metadata keys surfaced in a document header, with their labels.
const HEADER_FIELDS: [(&str, &str); 5] = [
    ("title", "Title"),
    ("source", "Source"),
    ("url", "URL"),
    ("date", "Date"),
    ("author", "Author"),
];

/// A retrieved document that can be placed in a prompt.
pub trait ContextDocument {
    fn text(&self) -> &str;
    fn metadata(&self) -> &Map<String, Value>;
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render documents as numbered context blocks.
///
/// Each block is `Document {n} (Title: .. | Source: ..):\n{text}\n`, listing
/// only the header fields present; blocks are joined with a newline.
pub fn format_document_context<D: ContextDocument>(documents: &[D]) -> String {
    documents
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            let metadata = doc.metadata();
            let header: Vec<String> = HEADER_FIELDS
                .iter()
                .filter_map(|(key, label)| {
                    metadata
                        .get(*key)
                        .map(|value| format!("{}: {}", label, display_value(value)))
                })
                .collect();

            if header.is_empty() {
                format!("Document {}:\n{}\n", i + 1, doc.text())
            } else {
                format!("Document {} ({}):\n{}\n", i + 1, header.join(" | "), doc.text())
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
