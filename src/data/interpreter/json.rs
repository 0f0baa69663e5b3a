// ============================================================
// Layer 4 - JSON Interpreter
// ============================================================

use serde_json::Value;

use crate::data::interpreter::{tree_to_canonical, validate_canonical};
use crate::domain::{document::ConfigDocument, format::Format, traits::DocumentInterpreter};
use crate::error::{Location, PipelineError, Result};

/// Reads `.json` question documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonInterpreter;

impl DocumentInterpreter for JsonInterpreter {
    fn format(&self) -> Format {
        Format::Json
    }

    fn parse(&self, raw: &str) -> Result<Value> {
        serde_json::from_str(raw).map_err(|e| {
            // serde_json reports line 0 for errors it cannot place
            let location = (e.line() > 0).then(|| Location {
                line: e.line(),
                column: e.column(),
            });
            PipelineError::Parse {
                format: Format::Json,
                message: e.to_string(),
                location,
            }
        })
    }

    fn to_canonical(&self, tree: Value) -> Result<ConfigDocument> {
        tree_to_canonical(Format::Json, tree)
    }

    fn validate(&self, document: &ConfigDocument) -> Result<()> {
        validate_canonical(document)
    }
}
