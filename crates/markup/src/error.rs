//! Error types for descriptor registration and XML traversal.
//!
//! Errors fall into three groups:
//! - [`ConfigError`]: raised while building a [`TypeDescriptor`](crate::TypeDescriptor),
//!   always fatal and never retried.
//! - [`FormatError`]: raised while reading or writing a document. It carries the
//!   type name, tag name and source position when they are known.
//! - Transport errors from quick-xml, I/O and UTF-8 decoding.

use std::fmt;

use thiserror::Error;

/// Location of a node in the source document.
///
/// The byte offset is always known; line and column are filled in when the
/// caller has the source text at hand (see [`Position::locate`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    /// Byte offset from the start of the input.
    pub offset: u64,
    /// 1-based line, if resolved.
    pub line: Option<u32>,
    /// 1-based column, if resolved.
    pub column: Option<u32>,
}

impl Position {
    /// Creates a position from a byte offset.
    pub fn at(offset: u64) -> Self {
        Self {
            offset,
            line: None,
            column: None,
        }
    }

    /// Resolves line and column against the source text.
    pub fn locate(mut self, source: &str) -> Self {
        let end = (self.offset as usize).min(source.len());
        let mut line = 1u32;
        let mut line_start = 0usize;
        for (idx, byte) in source.as_bytes()[..end].iter().enumerate() {
            if *byte == b'\n' {
                line += 1;
                line_start = idx + 1;
            }
        }
        let column = source
            .get(line_start..end)
            .map(|s| s.chars().count() as u32 + 1)
            .unwrap_or(1);
        self.line = Some(line);
        self.column = Some(column);
        self
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(column)) => write!(f, "line {}, column {}", line, column),
            _ => write!(f, "byte {}", self.offset),
        }
    }
}

/// Errors raised while building type descriptors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("type {type_name}: content property '{property}' not found")]
    MissingContentProperty { type_name: String, property: String },

    #[error("type {type_name}: text property '{property}' not found")]
    MissingTextProperty { type_name: String, property: String },

    #[error("type {type_name}: multiple text members declared ('{first}' and '{second}')")]
    MultipleTextMembers {
        type_name: String,
        first: String,
        second: String,
    },

    #[error("type {type_name}: multiple content members declared ('{first}' and '{second}')")]
    MultipleContentMembers {
        type_name: String,
        first: String,
        second: String,
    },

    #[error("type {type_name}: converter '{converter}' is not registered")]
    UnknownConverter {
        type_name: String,
        converter: String,
    },

    #[error("type {type_name}: duplicate {kind} tag '{tag}'")]
    DuplicateTag {
        type_name: String,
        tag: String,
        kind: &'static str,
    },

    #[error("type {type_name}: no constructor, text converter or element converter")]
    MissingConstructor { type_name: String },

    #[error("type {type_name}: key member '{member}' not found")]
    MissingKeyMember { type_name: String, member: String },

    #[error("type {type_name}: reference member '{member}' must be declared with a shared type")]
    ReferenceNotShared { type_name: String, member: String },

    #[error("type {type_name}: member '{member}' is marked {marker} but its type is not {marker}-shaped")]
    ShapeMismatch {
        type_name: String,
        member: String,
        marker: &'static str,
    },

    #[error("type {type_name} is not registered")]
    Unregistered { type_name: String },

    #[error("type {type_name}: runtime type {runtime} is not a known subtype")]
    UnknownSubtype { type_name: String, runtime: String },

    #[error("type {type_name}: {message}")]
    Invalid { type_name: String, message: String },
}

/// The specific failure behind a [`FormatError`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatErrorKind {
    #[error("cannot convert '{text}' to {target}: {reason}")]
    InvalidValue {
        text: String,
        target: String,
        reason: String,
    },

    #[error("unresolved element <{name}>")]
    UnknownElement { name: String },

    #[error("unresolved attribute '{name}'")]
    UnknownAttribute { name: String },

    #[error("expected </{expected}>, found </{found}>")]
    EndTagMismatch { expected: String, found: String },

    #[error("type cannot be constructed from markup")]
    NotConstructible,

    #[error("expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("value cannot be written: {reason}")]
    NotWritable { reason: String },

    #[error("unexpected text '{text}'")]
    UnexpectedText { text: String },

    #[error("unexpected element <{name}> inside text content")]
    UnexpectedElement { name: String },

    #[error("document has no root element")]
    MissingRoot,

    #[error("unexpected end of input")]
    UnexpectedEof,
}

/// A document that does not match the registered descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatError {
    pub kind: FormatErrorKind,
    pub type_name: Option<String>,
    pub tag: Option<String>,
    pub position: Option<Position>,
}

impl FormatError {
    pub fn new(kind: FormatErrorKind) -> Self {
        Self {
            kind,
            type_name: None,
            tag: None,
            position: None,
        }
    }

    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name.get_or_insert_with(|| type_name.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag.get_or_insert_with(|| tag.into());
        self
    }

    pub fn with_position(mut self, position: Option<Position>) -> Self {
        if self.position.is_none() {
            self.position = position;
        }
        self
    }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(tag) = &self.tag {
            write!(f, " in <{}>", tag)?;
        }
        if let Some(type_name) = &self.type_name {
            write!(f, " (type {})", type_name)?;
        }
        if let Some(position) = &self.position {
            write!(f, " at {}", position)?;
        }
        Ok(())
    }
}

impl std::error::Error for FormatError {}

/// Failure converting between text and a scalar value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct ConvertError {
    pub reason: String,
}

impl ConvertError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Lifts the conversion failure into a format error for `text` read as `target`.
    pub fn into_format(self, text: &str, target: &str) -> FormatError {
        FormatError::new(FormatErrorKind::InvalidValue {
            text: text.to_string(),
            target: target.to_string(),
            reason: self.reason,
        })
    }
}

/// The top-level error returned by every public entry point.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

impl Error {
    /// Returns the format error, if this is one.
    pub fn as_format(&self) -> Option<&FormatError> {
        match self {
            Error::Format(e) => Some(e),
            _ => None,
        }
    }

    /// Returns the configuration error, if this is one.
    pub fn as_config(&self) -> Option<&ConfigError> {
        match self {
            Error::Config(e) => Some(e),
            _ => None,
        }
    }

    /// Fills in line and column for positioned format errors.
    pub(crate) fn locate(self, source: &str) -> Self {
        match self {
            Error::Format(mut e) => {
                e.position = e.position.map(|p| p.locate(source));
                Error::Format(e)
            }
            other => other,
        }
    }
}

impl From<FormatErrorKind> for Error {
    fn from(kind: FormatErrorKind) -> Self {
        Error::Format(FormatError::new(kind))
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Error::Xml(quick_xml::Error::from(err))
    }
}

impl From<quick_xml::escape::EscapeError> for Error {
    fn from(err: quick_xml::escape::EscapeError) -> Self {
        Error::Xml(quick_xml::Error::from(err))
    }
}

/// Result type alias for serialization operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_locate() {
        let source = "<a>\n  <b/>\n</a>";
        let pos = Position::at(6).locate(source);
        assert_eq!(pos.line, Some(2));
        assert_eq!(pos.column, Some(3));
        assert_eq!(pos.to_string(), "line 2, column 3");
        assert_eq!(Position::at(4).to_string(), "byte 4");
    }

    #[test]
    fn test_format_error_display() {
        let err = FormatError::new(FormatErrorKind::UnknownElement {
            name: "Extra".to_string(),
        })
        .with_type("Order")
        .with_tag("Order")
        .with_position(Some(Position::at(10)));
        assert_eq!(
            err.to_string(),
            "unresolved element <Extra> in <Order> (type Order) at byte 10"
        );
    }

    #[test]
    fn test_context_is_kept_from_innermost() {
        let err = FormatError::new(FormatErrorKind::MissingRoot)
            .with_tag("inner")
            .with_tag("outer");
        assert_eq!(err.tag.as_deref(), Some("inner"));
    }
}
