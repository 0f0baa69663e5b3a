// ============================================================
// Layer 4 - TOML Interpreter
// ============================================================
// A TOML document is always a table, so only the keyed form is
// available here. The toml crate reports errors as byte spans,
// which are turned into line/column for the caller.

use serde_json::Value;

use crate::data::interpreter::{offset_to_location, tree_to_canonical, validate_canonical};
use crate::domain::{document::ConfigDocument, format::Format, traits::DocumentInterpreter};
use crate::error::{PipelineError, Result};

/// Reads `.toml` question documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct TomlInterpreter;

impl DocumentInterpreter for TomlInterpreter {
    fn format(&self) -> Format {
        Format::Toml
    }

    fn parse(&self, raw: &str) -> Result<Value> {
        ::toml::from_str::<Value>(raw).map_err(|e| PipelineError::Parse {
            format: Format::Toml,
            message: e.message().to_string(),
            location: e.span().map(|span| offset_to_location(raw, span.start)),
        })
    }

    fn to_canonical(&self, tree: Value) -> Result<ConfigDocument> {
        tree_to_canonical(Format::Toml, tree)
    }

    fn validate(&self, document: &ConfigDocument) -> Result<()> {
        validate_canonical(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::document::CanonicalItem;

    #[test]
    fn test_table_entries_with_respuestas() {
        let raw = r#"
            [saludo]
            respuestas = [{ respuesta = "hola" }, "buenas"]
            sinonimos = ["que tal"]

            [despedida]
            respuestas = ["adios"]
        "#;
        let doc = TomlInterpreter.interpret(raw).unwrap();
        assert_eq!(doc.labels(), vec!["saludo", "despedida"]);
        assert_eq!(doc.entries[0].items.len(), 3);
        assert_eq!(doc.entries[0].items[2], CanonicalItem::Text("que tal".into()));
    }

    #[test]
    fn test_syntax_error_is_located() {
        let raw = "greeting = [\"hi\"\nfarewell = = 3\n";
        match TomlInterpreter.interpret(raw) {
            Err(PipelineError::Parse { format, location, .. }) => {
                assert_eq!(format, Format::Toml);
                assert!(location.is_some());
            }
            other => panic!("expected a parse error, got {other:?}"),
        }
    }
}
