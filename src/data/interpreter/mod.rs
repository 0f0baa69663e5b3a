// ============================================================
// Layer 4 - Format Interpreters
// ============================================================
// One interpreter per input format. Each one only knows how to
// turn its own syntax into a `serde_json::Value` tree; from there
// the canonical conversion below is shared, which is what makes
// the Dataset Builder format-agnostic.
//
// Accepted shapes (same for every format):
//
//   keyed form    label → ["phrase", ...]
//                 label → "phrase"
//                 label → { respuestas: [...], sinonimos: [...] }
//   record form   [ { label: ..., text: ... }, ... ]
//                 (JSON and YAML only: a TOML document is a table)
//
// `serde_json` is built with `preserve_order`, and the TOML and
// YAML parsers keep table order, so entries stay in document order.

pub mod json;
pub mod toml;
pub mod yaml;

use std::{fs, path::Path};

use serde_json::{Map, Value};

use crate::domain::{
    document::{CanonicalEntry, CanonicalItem, ConfigDocument},
    format::Format,
    traits::DocumentInterpreter,
};
use crate::error::{Location, PipelineError, Result};

pub use self::json::JsonInterpreter;
pub use self::toml::TomlInterpreter;
pub use self::yaml::YamlInterpreter;

/// Keys holding a list of answer phrasings inside an entry table.
const RESPONSE_KEYS: [&str; 2] = ["respuestas", "responses"];
/// Keys holding a list of synonym phrasings inside an entry table.
const SYNONYM_KEYS: [&str; 2] = ["sinonimos", "synonyms"];
/// Keys holding the phrase string inside a response table.
const PHRASE_KEYS: [&str; 3] = ["respuesta", "response", "text"];
/// Keys naming the label of a record.
const LABEL_KEYS: [&str; 3] = ["label", "category", "categoria"];
/// Keys holding a list of phrasings inside a record.
const TEXT_LIST_KEYS: [&str; 2] = ["texts", "phrases"];

// ─── Tagged Dispatch ──────────────────────────────────────────────────────────

/// Interpret raw document text written in `format`.
pub fn interpret(format: Format, raw: &str) -> Result<ConfigDocument> {
    match format {
        Format::Json => JsonInterpreter.interpret(raw),
        Format::Toml => TomlInterpreter.interpret(raw),
        Format::Yaml => YamlInterpreter.interpret(raw),
    }
}

/// Interpret raw bytes. Invalid UTF-8 is a parse error.
pub fn interpret_bytes(format: Format, raw: &[u8]) -> Result<ConfigDocument> {
    let text = std::str::from_utf8(raw).map_err(|e| PipelineError::Parse {
        format,
        message: format!("input is not valid UTF-8: {e}"),
        location: None,
    })?;
    interpret(format, text)
}

/// Read and interpret a document from disk.
/// The format is taken from `format` or guessed from the extension.
pub fn interpret_path(path: impl AsRef<Path>, format: Option<Format>) -> Result<ConfigDocument> {
    let path = path.as_ref();
    let format = match format.or_else(|| Format::from_path(path)) {
        Some(f) => f,
        None => {
            return Err(PipelineError::InvalidConfig(format!(
                "cannot tell the format of '{}'; pass it explicitly",
                path.display()
            )))
        }
    };
    let bytes = fs::read(path)?;
    tracing::info!("Interpreting {} document '{}'", format, path.display());
    interpret_bytes(format, &bytes)
}

// ─── Shared Canonical Conversion ──────────────────────────────────────────────

pub(crate) fn tree_to_canonical(format: Format, tree: Value) -> Result<ConfigDocument> {
    let entries = match tree {
        Value::Object(map) => map
            .into_iter()
            .enumerate()
            .map(|(position, (label, value))| keyed_entry(label, value, position))
            .collect(),
        Value::Array(records) if format != Format::Toml => records
            .into_iter()
            .enumerate()
            .map(|(position, record)| record_entry(record, position))
            .collect(),
        Value::Null => Vec::new(),
        other => {
            return Err(PipelineError::Schema {
                format,
                message: format!(
                    "top level must be a table of labels, found {}",
                    value_kind(&other)
                ),
            })
        }
    };
    Ok(ConfigDocument::new(format, entries))
}

pub(crate) fn validate_canonical(document: &ConfigDocument) -> Result<()> {
    if document.entries.is_empty() {
        return Err(PipelineError::Schema {
            format: document.format,
            message: "document contains no entries".to_string(),
        });
    }
    if !document.entries.iter().any(CanonicalEntry::is_usable) {
        return Err(PipelineError::Schema {
            format: document.format,
            message: "no entry supplies both a label and a phrasing string".to_string(),
        });
    }
    Ok(())
}

fn keyed_entry(label: String, value: Value, position: usize) -> CanonicalEntry {
    let items = match value {
        Value::Array(list) => list.into_iter().map(phrase_item).collect(),
        Value::String(text) => vec![CanonicalItem::Text(text)],
        Value::Object(table) => table_items(table),
        other => vec![CanonicalItem::Malformed(format!(
            "expected a list of phrasings, found {}",
            value_kind(&other)
        ))],
    };
    CanonicalEntry::new(Some(label), items, position)
}

fn record_entry(record: Value, position: usize) -> CanonicalEntry {
    let Value::Object(mut table) = record else {
        return CanonicalEntry::new(
            None,
            vec![CanonicalItem::Malformed(format!(
                "expected a record, found {}",
                value_kind(&record)
            ))],
            position,
        );
    };

    let label = LABEL_KEYS
        .iter()
        .find_map(|k| table.remove(*k))
        .and_then(|v| match v {
            Value::String(s) => Some(s),
            _ => None,
        });

    let mut items = Vec::new();
    if let Some(text) = table.remove("text") {
        items.push(phrase_item(text));
    }
    for key in TEXT_LIST_KEYS {
        if let Some(value) = table.remove(key) {
            items.extend(list_items(value));
        }
    }
    items.extend(table_items(table));
    CanonicalEntry::new(label, items, position)
}

/// Responses first, then synonyms, as the original question files are laid out.
fn table_items(mut table: Map<String, Value>) -> Vec<CanonicalItem> {
    let mut items = Vec::new();
    for key in RESPONSE_KEYS {
        if let Some(value) = table.remove(key) {
            items.extend(list_items(value));
        }
    }
    for key in SYNONYM_KEYS {
        if let Some(value) = table.remove(key) {
            items.extend(list_items(value));
        }
    }
    items
}

fn list_items(value: Value) -> Vec<CanonicalItem> {
    match value {
        Value::Array(list) => list.into_iter().map(phrase_item).collect(),
        other => vec![phrase_item(other)],
    }
}

fn phrase_item(value: Value) -> CanonicalItem {
    match value {
        Value::String(text) => CanonicalItem::Text(text),
        Value::Object(table) => PHRASE_KEYS
            .iter()
            .find_map(|k| match table.get(*k) {
                Some(Value::String(s)) => Some(CanonicalItem::Text(s.clone())),
                _ => None,
            })
            .unwrap_or_else(|| {
                CanonicalItem::Malformed("table without a phrasing string".to_string())
            }),
        other => CanonicalItem::Malformed(format!(
            "expected a phrasing string, found {}",
            value_kind(&other)
        )),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a table",
    }
}

/// Convert a byte offset into a 1-based line/column location.
pub(crate) fn offset_to_location(raw: &str, offset: usize) -> Location {
    let offset = offset.min(raw.len());
    let before = &raw.as_bytes()[..offset];
    let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
    let line_start = before
        .iter()
        .rposition(|&b| b == b'\n')
        .map(|i| i + 1)
        .unwrap_or(0);
    Location {
        line,
        column: offset - line_start + 1,
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const JSON_DOC: &str = r#"{
        "greeting": ["hi", "hello"],
        "farewell": ["bye"]
    }"#;

    const TOML_DOC: &str = r#"
        greeting = ["hi", "hello"]
        farewell = ["bye"]
    "#;

    const YAML_DOC: &str = "greeting:\n  - hi\n  - hello\nfarewell:\n  - bye\n";

    #[test]
    fn test_three_formats_agree_on_canonical_entries() {
        let json = interpret(Format::Json, JSON_DOC).unwrap();
        let toml = interpret(Format::Toml, TOML_DOC).unwrap();
        let yaml = interpret(Format::Yaml, YAML_DOC).unwrap();

        assert_eq!(json.entries, toml.entries);
        assert_eq!(json.entries, yaml.entries);
        assert_eq!(json.labels(), vec!["greeting", "farewell"]);
    }

    #[test]
    fn test_respuestas_before_sinonimos() {
        let raw = r#"{
            "traslado": {
                "sinonimos": ["mudanza"],
                "respuestas": [{"respuesta": "como me traslado"}, "cambio de sede"]
            }
        }"#;
        let doc = interpret(Format::Json, raw).unwrap();
        assert_eq!(
            doc.entries[0].items,
            vec![
                CanonicalItem::Text("como me traslado".into()),
                CanonicalItem::Text("cambio de sede".into()),
                CanonicalItem::Text("mudanza".into()),
            ]
        );
    }

    #[test]
    fn test_record_form_keeps_missing_label() {
        let raw = r#"[
            {"label": "greeting", "text": "hi"},
            {"text": "orphan"},
            {"category": "farewell", "texts": ["bye", 3]}
        ]"#;
        let doc = interpret(Format::Json, raw).unwrap();
        assert_eq!(doc.entries.len(), 3);
        assert_eq!(doc.entries[1].label, None);
        assert_eq!(
            doc.entries[2].items[1],
            CanonicalItem::Malformed("expected a phrasing string, found a number".into())
        );
    }

    #[test]
    fn test_scalar_root_is_schema_error() {
        let err = interpret(Format::Json, "42").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
    }

    #[test]
    fn test_empty_document_is_schema_error() {
        let err = interpret(Format::Json, "{}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
        let err = interpret(Format::Toml, "").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
    }

    #[test]
    fn test_entries_without_phrasings_are_schema_error() {
        let err = interpret(Format::Json, r#"{"a": [1, 2], "b": {"other": true}}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
    }

    #[test]
    fn test_invalid_utf8_is_parse_error() {
        let err = interpret_bytes(Format::Toml, &[0xff, 0xfe, 0x00]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_interpret_path_guesses_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("questions.yml");
        std::fs::write(&path, YAML_DOC).unwrap();

        let doc = interpret_path(&path, None).unwrap();
        assert_eq!(doc.format, Format::Yaml);

        let unknown = dir.path().join("questions.txt");
        std::fs::write(&unknown, YAML_DOC).unwrap();
        let err = interpret_path(&unknown, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }

    #[test]
    fn test_offset_to_location() {
        let raw = "ab\ncde\nf";
        assert_eq!(offset_to_location(raw, 0), Location { line: 1, column: 1 });
        assert_eq!(offset_to_location(raw, 4), Location { line: 2, column: 2 });
        assert_eq!(offset_to_location(raw, 99), Location { line: 3, column: 2 });
    }
}
