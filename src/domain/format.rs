// ============================================================
// Layer 3 - Input Format
// ============================================================
// The three document formats the pipeline understands.
// A Format doubles as the artifact namespace name, so every
// format gets its own isolated directory of trained artifacts.

use std::{fmt, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

/// One supported input document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Json,
    Toml,
    Yaml,
}

impl Format {
    /// Every format, in namespace order.
    pub const ALL: [Format; 3] = [Format::Json, Format::Toml, Format::Yaml];

    /// Namespace directory name for this format.
    pub fn namespace(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Toml => "toml",
            Format::Yaml => "yaml",
        }
    }

    /// Guess the format from a file extension (`.yml` counts as YAML).
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(Format::Json),
            "toml" => Some(Format::Toml),
            "yaml" | "yml" => Some(Format::Yaml),
            _ => None,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.namespace())
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "toml" => Ok(Format::Toml),
            "yaml" | "yml" => Ok(Format::Yaml),
            other => Err(format!("unknown format '{other}' (expected json, toml or yaml)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_path() {
        assert_eq!(Format::from_path("data/q.json"), Some(Format::Json));
        assert_eq!(Format::from_path("q.TOML"), Some(Format::Toml));
        assert_eq!(Format::from_path("q.yml"), Some(Format::Yaml));
        assert_eq!(Format::from_path("q.txt"), None);
        assert_eq!(Format::from_path("noext"), None);
    }

    #[test]
    fn test_parse_and_display_agree() {
        for format in Format::ALL {
            assert_eq!(format.to_string().parse::<Format>(), Ok(format));
        }
        assert!("xml".parse::<Format>().is_err());
    }
}
