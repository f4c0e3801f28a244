use std::io::BufRead;

use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};

use super::{Attribute, NodeKind, XmlRead};
use crate::error::{FormatError, FormatErrorKind, Position, Result};

#[derive(Debug)]
enum Node {
    Before,
    Start {
        name: String,
        attributes: Vec<Attribute>,
        empty: bool,
    },
    End {
        name: String,
    },
    Text(String),
    Other,
    Eof,
}

/// [`XmlRead`] over a quick-xml [`Reader`].
pub struct QuickXmlReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    node: Node,
    offset: u64,
    /// End node owed for an empty element.
    pending_end: Option<String>,
    /// Event read past the end of a text run.
    lookahead: Option<(Event<'static>, u64)>,
}

impl<'a> QuickXmlReader<&'a [u8]> {
    pub fn from_str(xml: &'a str) -> Self {
        Self::new(xml.as_bytes())
    }
}

impl<R: BufRead> QuickXmlReader<R> {
    pub fn new(inner: R) -> Self {
        let mut reader = Reader::from_reader(inner);
        let config = reader.config_mut();
        config.trim_text(false);
        config.check_end_names = false;
        config.expand_empty_elements = false;
        Self {
            reader,
            buf: Vec::new(),
            node: Node::Before,
            offset: 0,
            pending_end: None,
            lookahead: None,
        }
    }

    fn next_event(&mut self) -> Result<(Event<'static>, u64)> {
        if let Some(event) = self.lookahead.take() {
            return Ok(event);
        }
        let offset = self.reader.buffer_position();
        self.buf.clear();
        let event = self.reader.read_event_into(&mut self.buf)?.into_owned();
        Ok((event, offset))
    }

    fn start_node(start: &BytesStart<'_>, empty: bool) -> Result<(String, Node)> {
        let name = std::str::from_utf8(start.name().as_ref())?.to_string();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            let raw = std::str::from_utf8(&attr.value)?;
            attributes.push(Attribute {
                name: std::str::from_utf8(attr.key.as_ref())?.to_string(),
                value: unescape(raw)?.into_owned(),
            });
        }
        let node = Node::Start {
            name: name.clone(),
            attributes,
            empty,
        };
        Ok((name, node))
    }

    fn is_text(event: &Event<'_>) -> bool {
        matches!(event, Event::Text(_) | Event::CData(_) | Event::GeneralRef(_))
    }

    fn append_text(&self, event: &Event<'_>, out: &mut String) -> Result<()> {
        match event {
            Event::Text(text) => {
                let raw = std::str::from_utf8(&**text)?;
                out.push_str(&unescape(raw)?);
            }
            Event::CData(data) => out.push_str(std::str::from_utf8(&**data)?),
            Event::GeneralRef(reference) => {
                let name = std::str::from_utf8(&**reference)?;
                out.push(self.resolve_reference(name)?);
            }
            _ => {}
        }
        Ok(())
    }

    fn resolve_reference(&self, name: &str) -> Result<char> {
        let resolved = match name {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "apos" => Some('\''),
            "quot" => Some('"'),
            _ => {
                let code = if let Some(hex) = name.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = name.strip_prefix('#') {
                    dec.parse::<u32>().ok()
                } else {
                    None
                };
                code.and_then(char::from_u32)
            }
        };
        resolved.ok_or_else(|| {
            FormatError::new(FormatErrorKind::InvalidValue {
                text: format!("&{};", name),
                target: "character".to_string(),
                reason: "unknown entity reference".to_string(),
            })
            .with_position(Some(self.position()))
            .into()
        })
    }
}

impl<R: BufRead> XmlRead for QuickXmlReader<R> {
    fn kind(&self) -> NodeKind {
        match self.node {
            Node::Start { .. } => NodeKind::Start,
            Node::End { .. } => NodeKind::End,
            Node::Text(_) => NodeKind::Text,
            Node::Other => NodeKind::Other,
            Node::Before | Node::Eof => NodeKind::None,
        }
    }

    fn name(&self) -> &str {
        match &self.node {
            Node::Start { name, .. } | Node::End { name } => name.as_str(),
            _ => "",
        }
    }

    fn attributes(&self) -> &[Attribute] {
        match &self.node {
            Node::Start { attributes, .. } => attributes.as_slice(),
            _ => &[],
        }
    }

    fn text(&self) -> &str {
        match &self.node {
            Node::Text(text) => text.as_str(),
            _ => "",
        }
    }

    fn is_empty_element(&self) -> bool {
        matches!(self.node, Node::Start { empty: true, .. })
    }

    fn advance(&mut self) -> Result<()> {
        if let Some(name) = self.pending_end.take() {
            self.node = Node::End { name };
            return Ok(());
        }
        if matches!(self.node, Node::Eof) {
            return Ok(());
        }
        let (event, offset) = self.next_event()?;
        self.offset = offset;
        self.node = match &event {
            Event::Start(start) => Self::start_node(start, false)?.1,
            Event::Empty(start) => {
                let (name, node) = Self::start_node(start, true)?;
                self.pending_end = Some(name);
                node
            }
            Event::End(end) => Node::End {
                name: std::str::from_utf8(end.name().as_ref())?.to_string(),
            },
            event if Self::is_text(event) => {
                let mut text = String::new();
                self.append_text(event, &mut text)?;
                loop {
                    let (next, next_offset) = self.next_event()?;
                    if Self::is_text(&next) {
                        self.append_text(&next, &mut text)?;
                    } else {
                        self.lookahead = Some((next, next_offset));
                        break;
                    }
                }
                Node::Text(text)
            }
            Event::Eof => Node::Eof,
            _ => Node::Other,
        };
        Ok(())
    }

    fn position(&self) -> Position {
        Position::at(self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(xml: &str) -> Vec<(NodeKind, String)> {
        let mut reader = QuickXmlReader::from_str(xml);
        let mut out = Vec::new();
        reader.advance().unwrap();
        while reader.kind() != NodeKind::None {
            let label = match reader.kind() {
                NodeKind::Text => reader.text().to_string(),
                _ => reader.name().to_string(),
            };
            out.push((reader.kind(), label));
            reader.advance().unwrap();
        }
        out
    }

    #[test]
    fn test_empty_element_has_synthetic_end() {
        let mut reader = QuickXmlReader::from_str(r#"<a x="1"/>"#);
        reader.advance().unwrap();
        assert_eq!(reader.kind(), NodeKind::Start);
        assert!(reader.is_empty_element());
        assert_eq!(reader.attribute("x"), Some("1"));
        reader.advance().unwrap();
        assert_eq!(reader.kind(), NodeKind::End);
        assert_eq!(reader.name(), "a");
        reader.advance().unwrap();
        assert_eq!(reader.kind(), NodeKind::None);
    }

    #[test]
    fn test_text_runs_are_merged() {
        let nodes = kinds("<a>x &lt; y &#65;<![CDATA[<raw>]]>z</a>");
        assert_eq!(
            nodes,
            vec![
                (NodeKind::Start, "a".to_string()),
                (NodeKind::Text, "x < y A<raw>z".to_string()),
                (NodeKind::End, "a".to_string()),
            ]
        );
    }

    #[test]
    fn test_noise_is_reported_as_other() {
        let nodes = kinds("<?xml version=\"1.0\"?><!-- c --><a/>");
        assert_eq!(nodes[0].0, NodeKind::Other);
        assert_eq!(nodes[1].0, NodeKind::Other);
        assert_eq!(nodes[2], (NodeKind::Start, "a".to_string()));
    }

    #[test]
    fn test_attribute_values_are_unescaped() {
        let mut reader = QuickXmlReader::from_str(r#"<a t="&quot;q&quot; &amp; &#x41;"/>"#);
        reader.advance().unwrap();
        assert_eq!(reader.attribute("t"), Some("\"q\" & A"));
    }

    #[test]
    fn test_skip_subtree() {
        let mut reader = QuickXmlReader::from_str("<r><a><b/><c>t</c></a><d/></r>");
        reader.advance().unwrap();
        reader.advance().unwrap();
        assert_eq!(reader.name(), "a");
        reader.skip_subtree().unwrap();
        assert_eq!(reader.kind(), NodeKind::Start);
        assert_eq!(reader.name(), "d");
    }

    #[test]
    fn test_positions_advance() {
        let mut reader = QuickXmlReader::from_str("<r>\n  <a/>\n</r>");
        reader.advance().unwrap();
        assert_eq!(reader.position().offset, 0);
        reader.advance().unwrap();
        reader.advance().unwrap();
        assert_eq!(reader.name(), "a");
        assert_eq!(reader.position().offset, 6);
    }
}
