//! Byte payloads as base64 text.

use std::any::Any;
use std::ops::{Deref, DerefMut};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use super::{ConvertContext, TextConverter};
use crate::error::ConvertError;

/// A byte buffer written as base64 text.
///
/// `Vec<u8>` is a collection of `u8` items; wrap bytes in `ByteBuf` (or give
/// the member the `"base64"` converter) to get the compact text form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ByteBuf(pub Vec<u8>);

impl ByteBuf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for ByteBuf {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for ByteBuf {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl Deref for ByteBuf {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.0
    }
}

impl DerefMut for ByteBuf {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.0
    }
}

/// Encodes bytes, wrapping lines at `line_width` characters when set.
pub fn encode(bytes: &[u8], line_width: Option<usize>) -> String {
    let encoded = STANDARD.encode(bytes);
    match line_width {
        Some(width) if width > 0 && encoded.len() > width => {
            let mut out = String::with_capacity(encoded.len() + encoded.len() / width);
            for (idx, chunk) in encoded.as_bytes().chunks(width).enumerate() {
                if idx > 0 {
                    out.push('\n');
                }
                // base64 output is ASCII, so every chunk is valid UTF-8.
                out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
            }
            out
        }
        _ => encoded,
    }
}

/// Decodes base64 text, ignoring any whitespace.
pub fn decode(text: &str) -> Result<Vec<u8>, ConvertError> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| ConvertError::new(e.to_string()))
}

/// Converts `ByteBuf` and `Vec<u8>` values.
///
/// Parsing yields the type the converter was attached to: `ByteBuf` for the
/// built-in `ByteBuf` descriptor, `Vec<u8>` when used as a member converter.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Converter;

impl TextConverter for Base64Converter {
    fn from_text(&self, text: &str, _cx: &ConvertContext<'_>) -> Result<Box<dyn Any>, ConvertError> {
        decode(text).map(|bytes| Box::new(bytes) as Box<dyn Any>)
    }

    fn to_text(&self, value: &dyn Any, cx: &ConvertContext<'_>) -> Option<String> {
        let bytes: &[u8] = match value.downcast_ref::<Vec<u8>>() {
            Some(bytes) => bytes,
            None => &value.downcast_ref::<ByteBuf>()?.0,
        };
        Some(encode(bytes, cx.settings.base64_line_width))
    }
}

pub(crate) fn parse_byte_buf(text: &str, _cx: &ConvertContext<'_>) -> Result<ByteBuf, ConvertError> {
    decode(text).map(ByteBuf)
}

pub(crate) fn format_byte_buf(value: &ByteBuf, cx: &ConvertContext<'_>) -> Option<String> {
    Some(encode(value, cx.settings.base64_line_width))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::test_support::{CATALOG, SETTINGS};
    use crate::settings::Settings;

    #[test]
    fn test_encode_decode() {
        let bytes = b"hello markup".to_vec();
        let text = encode(&bytes, None);
        assert_eq!(text, "aGVsbG8gbWFya3Vw");
        assert_eq!(decode(&text).unwrap(), bytes);
    }

    #[test]
    fn test_line_wrapping() {
        let bytes = vec![0xABu8; 60];
        let text = encode(&bytes, Some(16));
        assert!(text.lines().all(|line| line.len() <= 16));
        assert!(text.contains('\n'));
        assert_eq!(decode(&text).unwrap(), bytes);
        assert_eq!(decode(" aGVs\r\n bG8= ").unwrap(), b"hello");
    }

    #[test]
    fn test_converter_accepts_both_forms() {
        let settings = Settings::default().with_base64_line_width(4);
        let cx = ConvertContext::new(&settings, &CATALOG);
        let converter = Base64Converter;
        assert_eq!(converter.to_text(&vec![1u8, 2, 3], &cx).as_deref(), Some("AQID"));
        assert_eq!(
            converter.to_text(&ByteBuf(vec![1, 2, 3, 4]), &cx).as_deref(),
            Some("AQID\nBA==")
        );
        assert!(converter.to_text(&5u32, &cx).is_none());

        let plain = ConvertContext::new(&SETTINGS, &CATALOG);
        let value = converter.from_text("AQID", &plain).unwrap();
        assert_eq!(value.downcast_ref::<Vec<u8>>(), Some(&vec![1, 2, 3]));
        assert!(converter.from_text("!!", &plain).is_err());
    }
}
