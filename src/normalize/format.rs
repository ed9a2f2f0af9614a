//! Declared upload formats

use std::fmt;

use serde::{Deserialize, Serialize};

/// Raw formats the normalizer understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Delimited text with a header row
    Csv,
    /// Tag-markup
    Xml,
    /// Relational dump text
    Sql,
    /// Already record-shaped JSON
    Json,
}

/// Content type to format lookup
const CONTENT_TYPES: &[(&str, Format)] = &[
    ("application/json", Format::Json),
    ("text/csv", Format::Csv),
    ("application/xml", Format::Xml),
    ("text/xml", Format::Xml),
    ("application/sql", Format::Sql),
    ("text/sql", Format::Sql),
];

impl Format {
    /// Resolve a declared content type; parameters such as `; charset=utf-8`
    /// are ignored
    pub fn from_content_type(content_type: &str) -> Option<Format> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        CONTENT_TYPES
            .iter()
            .find(|(declared, _)| *declared == essence)
            .map(|(_, format)| *format)
    }

    /// Canonical content type for this format
    pub fn content_type(&self) -> &'static str {
        match self {
            Format::Csv => "text/csv",
            Format::Xml => "application/xml",
            Format::Sql => "application/sql",
            Format::Json => "application/json",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Format::Csv => "csv",
            Format::Xml => "xml",
            Format::Sql => "sql",
            Format::Json => "json",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
