// ============================================================
// Layer 4 - YAML Interpreter
// ============================================================

use serde_json::Value;

use crate::data::interpreter::{tree_to_canonical, validate_canonical};
use crate::domain::{document::ConfigDocument, format::Format, traits::DocumentInterpreter};
use crate::error::{Location, PipelineError, Result};

/// Reads `.yaml` / `.yml` question documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlInterpreter;

impl DocumentInterpreter for YamlInterpreter {
    fn format(&self) -> Format {
        Format::Yaml
    }

    fn parse(&self, raw: &str) -> Result<Value> {
        serde_yaml::from_str::<Value>(raw).map_err(|e| PipelineError::Parse {
            format: Format::Yaml,
            message: e.to_string(),
            location: e.location().map(|loc| Location {
                line: loc.line(),
                column: loc.column(),
            }),
        })
    }

    fn to_canonical(&self, tree: Value) -> Result<ConfigDocument> {
        tree_to_canonical(Format::Yaml, tree)
    }

    fn validate(&self, document: &ConfigDocument) -> Result<()> {
        validate_canonical(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_record_form() {
        let raw = "- label: greeting\n  texts: [hi, hello]\n- label: farewell\n  text: bye\n";
        let doc = YamlInterpreter.interpret(raw).unwrap();
        assert_eq!(doc.labels(), vec!["greeting", "farewell"]);
        assert_eq!(doc.entries[0].items.len(), 2);
    }

    #[test]
    fn test_unclosed_sequence_is_parse_error() {
        let raw = "greeting: [hi, hello\nfarewell: bye\n";
        let err = YamlInterpreter.interpret(raw).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }
}
