//! Error types shared across the outreach crates

use miette::{Diagnostic, NamedSource, SourceOffset, SourceSpan};

/// Main error type for outreach configuration and I/O
#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum OutreachError {
    /// IO error
    #[error(transparent)]
    #[diagnostic(code(outreach::io))]
    Io(#[from] std::io::Error),

    /// Config file could not be parsed, with source location
    #[error(transparent)]
    #[diagnostic_source]
    Parse(#[from] ParseError),

    /// Serialization/deserialization error
    #[error(transparent)]
    #[diagnostic_source]
    Serde(#[from] SerDeError),

    /// Config file extension we don't know how to read
    #[error("unsupported config format: {0}")]
    #[diagnostic(
        code(outreach::config::format),
        help("use a file ending in .toml or .json")
    )]
    UnsupportedFormat(String),

    /// Semantically invalid configuration
    #[error("invalid configuration: {0}")]
    #[diagnostic(code(outreach::config::invalid))]
    InvalidConfig(String),
}

/// Parse error with source code location information
#[derive(thiserror::Error, Debug, Diagnostic)]
#[error("parse error: {message}")]
#[diagnostic(code(outreach::parse))]
pub struct ParseError {
    message: String,
    #[source_code]
    src: NamedSource<String>,
    #[label("here")]
    err_location: Option<SourceSpan>,
}

impl ParseError {
    /// Build a parse error for `src` (named `name`), pointing at `span` if known.
    pub fn new(
        name: impl AsRef<str>,
        src: impl Into<String>,
        message: impl Into<String>,
        span: Option<std::ops::Range<usize>>,
    ) -> Self {
        let src = src.into();
        let err_location = span.map(|range| {
            let start = range.start.min(src.len());
            let len = range.end.min(src.len()).saturating_sub(start);
            SourceSpan::new(SourceOffset::from(start), len)
        });
        Self {
            message: message.into(),
            src: NamedSource::new(name, src),
            err_location,
        }
    }

    /// Build from a TOML deserialization failure, keeping its span.
    pub fn from_toml(name: impl AsRef<str>, src: impl Into<String>, err: &toml::de::Error) -> Self {
        Self::new(name, src, err.message(), err.span())
    }

    /// Build from a JSON failure. serde_json reports 1-based line/column.
    pub fn from_json(name: impl AsRef<str>, src: impl Into<String>, err: &serde_json::Error) -> Self {
        let src = src.into();
        let offset = line_col_to_offset(&src, err.line(), err.column());
        Self::new(name, src, err.to_string(), Some(offset..offset))
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Serialization/deserialization errors
#[derive(thiserror::Error, Debug, Diagnostic)]
#[non_exhaustive]
pub enum SerDeError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
}

impl From<serde_json::Error> for OutreachError {
    fn from(err: serde_json::Error) -> Self {
        OutreachError::Serde(SerDeError::Json(err))
    }
}

impl From<toml::ser::Error> for OutreachError {
    fn from(err: toml::ser::Error) -> Self {
        OutreachError::Serde(SerDeError::TomlSer(err))
    }
}

fn line_col_to_offset(src: &str, line: usize, column: usize) -> usize {
    if line == 0 {
        return 0;
    }
    let mut offset = 0usize;
    for (i, text) in src.split_inclusive('\n').enumerate() {
        if i + 1 == line {
            return offset + column.saturating_sub(1).min(text.len());
        }
        offset += text.len();
    }
    src.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_col_to_offset() {
        let src = "a = 1\nbb = 2\n";
        assert_eq!(line_col_to_offset(src, 1, 1), 0);
        assert_eq!(line_col_to_offset(src, 2, 1), 6);
        assert_eq!(line_col_to_offset(src, 2, 3), 8);
        assert_eq!(line_col_to_offset(src, 9, 1), src.len());
    }

    #[test]
    fn test_parse_error_span_clamped() {
        let err = ParseError::new("cfg.toml", "abc", "bad", Some(2..99));
        let span = err.err_location.expect("span");
        assert_eq!(span.offset(), 2);
        assert_eq!(span.len(), 1);
    }

    #[test]
    fn test_json_error_converts() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: OutreachError = err.into();
        assert!(matches!(err, OutreachError::Serde(SerDeError::Json(_))));
    }
}
