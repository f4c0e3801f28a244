//! The pull-style reader and writer contract consumed by both engines.
//!
//! The engines only see these primitives; [`QuickXmlReader`] and
//! [`QuickXmlWriter`] adapt them to quick-xml.

mod reader;
mod writer;

pub use reader::QuickXmlReader;
pub use writer::QuickXmlWriter;

use crate::error::{FormatErrorKind, Position, Result};

/// Kind of the node under a read cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A start tag. Empty elements are a start flagged
    /// [`is_empty_element`](XmlRead::is_empty_element), followed by an end.
    Start,
    End,
    /// Character data, with entity and character references resolved and
    /// adjacent text and CDATA merged.
    Text,
    /// Comments, processing instructions, declarations and doctypes.
    Other,
    /// Before the first node or past the end of input.
    None,
}

/// A raw attribute on a start tag, value already unescaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// Pull reader over markup nodes.
///
/// A fresh cursor sits before the first node; call [`advance`](Self::advance)
/// to move onto it.
pub trait XmlRead {
    fn kind(&self) -> NodeKind;

    /// Raw qualified name (`prefix:local`) of a start or end node.
    fn name(&self) -> &str;

    /// Attributes of a start node, in document order.
    fn attributes(&self) -> &[Attribute];

    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes()
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Content of a text node.
    fn text(&self) -> &str;

    fn is_empty_element(&self) -> bool;

    fn advance(&mut self) -> Result<()>;

    /// From a start node, moves just past its matching end node. From any
    /// other node, behaves like [`advance`](Self::advance).
    fn skip_subtree(&mut self) -> Result<()> {
        if self.kind() != NodeKind::Start {
            return self.advance();
        }
        let mut depth = 0usize;
        loop {
            match self.kind() {
                NodeKind::Start => depth += 1,
                NodeKind::End => {
                    depth -= 1;
                    if depth == 0 {
                        return self.advance();
                    }
                }
                NodeKind::None => {
                    return Err(crate::error::FormatError::new(FormatErrorKind::UnexpectedEof)
                        .with_position(Some(self.position()))
                        .into());
                }
                NodeKind::Text | NodeKind::Other => {}
            }
            self.advance()?;
        }
    }

    /// Location of the current node.
    fn position(&self) -> Position;
}

/// Push writer for markup nodes.
///
/// Attributes and namespace declarations apply to the most recently started
/// element until content or its end is written.
pub trait XmlWrite {
    /// Writes the `<?xml ...?>` declaration.
    fn declaration(&mut self) -> Result<()>;

    fn start_element(&mut self, name: &str) -> Result<()>;

    /// Adds an attribute; `value` is escaped by the writer.
    fn attribute(&mut self, name: &str, value: &str) -> Result<()>;

    /// Declares `uri` as the default namespace (`prefix` of `None`) or under
    /// `prefix`.
    fn namespace_declaration(&mut self, prefix: Option<&str>, uri: &str) -> Result<()> {
        match prefix {
            Some(prefix) => self.attribute(&format!("xmlns:{}", prefix), uri),
            None => self.attribute("xmlns", uri),
        }
    }

    /// Writes character data, escaped by the writer.
    fn text(&mut self, text: &str) -> Result<()>;

    /// Writes pre-escaped markup verbatim.
    fn raw(&mut self, markup: &str) -> Result<()>;

    /// Closes the innermost open element.
    fn end_element(&mut self) -> Result<()>;

    /// Flushes output; fails if elements are still open.
    fn finish(&mut self) -> Result<()>;
}
