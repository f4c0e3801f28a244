use std::io::Write;

use quick_xml::Writer;
use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use super::XmlWrite;
use crate::error::{FormatErrorKind, Result};

/// [`XmlWrite`] over a quick-xml [`Writer`].
///
/// The start tag of the innermost element is held back until content or the
/// end tag arrives, so an element closed without content is written
/// self-closing.
pub struct QuickXmlWriter<W: Write> {
    writer: Writer<W>,
    pending: Option<BytesStart<'static>>,
    open: Vec<String>,
}

impl<W: Write> QuickXmlWriter<W> {
    pub fn new(inner: W, indent: Option<usize>) -> Self {
        let writer = match indent {
            Some(width) if width > 0 => Writer::new_with_indent(inner, b' ', width),
            _ => Writer::new(inner),
        };
        Self {
            writer,
            pending: None,
            open: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn flush_pending(&mut self) -> Result<()> {
        if let Some(start) = self.pending.take() {
            self.writer.write_event(Event::Start(start))?;
        }
        Ok(())
    }

    fn not_writable(reason: &str) -> crate::error::Error {
        FormatErrorKind::NotWritable {
            reason: reason.to_string(),
        }
        .into()
    }
}

impl<W: Write> XmlWrite for QuickXmlWriter<W> {
    fn declaration(&mut self) -> Result<()> {
        self.writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        Ok(())
    }

    fn start_element(&mut self, name: &str) -> Result<()> {
        self.flush_pending()?;
        self.pending = Some(BytesStart::new(name.to_string()));
        self.open.push(name.to_string());
        Ok(())
    }

    fn attribute(&mut self, name: &str, value: &str) -> Result<()> {
        match self.pending.as_mut() {
            Some(start) => {
                start.push_attribute((name, value));
                Ok(())
            }
            None => Err(Self::not_writable("attribute written outside a start tag")),
        }
    }

    fn text(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.flush_pending()?;
        self.writer
            .write_event(Event::Text(BytesText::from_escaped(partial_escape(text))))?;
        Ok(())
    }

    fn raw(&mut self, markup: &str) -> Result<()> {
        self.flush_pending()?;
        self.writer
            .write_event(Event::Text(BytesText::from_escaped(markup)))?;
        Ok(())
    }

    fn end_element(&mut self) -> Result<()> {
        let name = self
            .open
            .pop()
            .ok_or_else(|| Self::not_writable("no open element to close"))?;
        match self.pending.take() {
            Some(start) => self.writer.write_event(Event::Empty(start))?,
            None => self.writer.write_event(Event::End(BytesEnd::new(name)))?,
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(name) = self.open.last() {
            return Err(Self::not_writable(&format!("element <{}> left open", name)));
        }
        self.writer.get_mut().flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn written(f: impl FnOnce(&mut QuickXmlWriter<Vec<u8>>) -> Result<()>) -> String {
        let mut writer = QuickXmlWriter::new(Vec::new(), None);
        f(&mut writer).unwrap();
        writer.finish().unwrap();
        String::from_utf8(writer.into_inner()).unwrap()
    }

    #[test]
    fn test_empty_elements_self_close() {
        let xml = written(|w| {
            w.start_element("Points")?;
            w.start_element("Point")?;
            w.attribute("X", "1")?;
            w.end_element()?;
            w.end_element()
        });
        assert_eq!(xml, r#"<Points><Point X="1"/></Points>"#);
    }

    #[test]
    fn test_text_and_attributes_are_escaped() {
        let xml = written(|w| {
            w.start_element("a")?;
            w.attribute("q", "\"<&>\"")?;
            w.namespace_declaration(Some("p"), "urn:p")?;
            w.text("1 < 2 & 'x'")?;
            w.end_element()
        });
        assert_eq!(
            xml,
            r#"<a q="&quot;&lt;&amp;&gt;&quot;" xmlns:p="urn:p">1 &lt; 2 &amp; 'x'</a>"#
        );
    }

    #[test]
    fn test_misuse_is_reported() {
        let mut writer = QuickXmlWriter::new(Vec::new(), None);
        assert!(writer.attribute("a", "b").is_err());
        assert!(writer.end_element().is_err());
        writer.start_element("open").unwrap();
        assert!(writer.finish().is_err());
    }

    #[test]
    fn test_indentation() {
        let mut writer = QuickXmlWriter::new(Vec::new(), Some(2));
        writer.start_element("a").unwrap();
        writer.start_element("b").unwrap();
        writer.end_element().unwrap();
        writer.end_element().unwrap();
        writer.finish().unwrap();
        let xml = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(xml, "<a>\n  <b/>\n</a>");
    }
}
