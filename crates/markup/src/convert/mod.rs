//! Text/value conversion for scalars and pluggable custom converters.
//!
//! A [`TextConverter`] turns attribute values and inner text into values and
//! back. Returning `None` from [`TextConverter::to_text`] means the value has
//! no text form and the caller falls back to nested traversal.
//!
//! An [`ElementConverter`] takes over reading and writing a whole element for
//! its type, bypassing the generic traversal.

pub mod binary;
pub mod enumeration;
pub mod scalar;
pub mod temporal;
pub mod type_ref;

use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::cursor::{XmlRead, XmlWrite};
use crate::error::{ConvertError, Result};
use crate::namespace::QName;
use crate::registry::Catalog;
use crate::settings::Settings;

pub use binary::{Base64Converter, ByteBuf};
pub use enumeration::EnumConverter;
pub use scalar::{BoolConverter, StringConverter};
pub use type_ref::TypeRef;

/// What a converter may consult while converting.
#[derive(Clone, Copy)]
pub struct ConvertContext<'a> {
    pub settings: &'a Settings,
    pub catalog: &'a Catalog,
}

impl<'a> ConvertContext<'a> {
    pub fn new(settings: &'a Settings, catalog: &'a Catalog) -> Self {
        Self { settings, catalog }
    }
}

/// Converts between text and values of one type.
pub trait TextConverter: Send + Sync {
    /// Parses `text` into a boxed value of the converter's type.
    fn from_text(
        &self,
        text: &str,
        cx: &ConvertContext<'_>,
    ) -> std::result::Result<Box<dyn Any>, ConvertError>;

    /// Formats `value`, or returns `None` when it has no text form.
    fn to_text(&self, value: &dyn Any, cx: &ConvertContext<'_>) -> Option<String>;
}

/// Reads and writes whole elements for one type.
///
/// `read` is called with the cursor on the element's start node and must
/// leave it just past the matching end node. `write` receives the element
/// name chosen by the caller and must emit exactly one element.
pub trait ElementConverter: Send + Sync {
    fn can_read(&self) -> bool {
        true
    }

    fn can_write(&self) -> bool {
        true
    }

    fn read(&self, reader: &mut dyn XmlRead, cx: &ConvertContext<'_>) -> Result<Box<dyn Any>>;

    fn write(
        &self,
        value: &dyn Any,
        name: &QName,
        writer: &mut dyn XmlWrite,
        cx: &ConvertContext<'_>,
    ) -> Result<()>;
}

type ParseFn<T> =
    Box<dyn Fn(&str, &ConvertContext<'_>) -> std::result::Result<T, ConvertError> + Send + Sync>;
type FormatFn<T> = Box<dyn Fn(&T, &ConvertContext<'_>) -> Option<String> + Send + Sync>;

/// A [`TextConverter`] built from a parse and a format function.
pub struct FnConverter<T> {
    parse: ParseFn<T>,
    format: FormatFn<T>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any> FnConverter<T> {
    pub fn new<P, F>(parse: P, format: F) -> Self
    where
        P: Fn(&str, &ConvertContext<'_>) -> std::result::Result<T, ConvertError>
            + Send
            + Sync
            + 'static,
        F: Fn(&T, &ConvertContext<'_>) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            parse: Box::new(parse),
            format: Box::new(format),
            _marker: PhantomData,
        }
    }

    /// Builds a converter from context-free functions.
    pub fn simple(
        parse: fn(&str) -> std::result::Result<T, ConvertError>,
        format: fn(&T) -> String,
    ) -> Self {
        Self::new(move |text, _| parse(text), move |value, _| Some(format(value)))
    }
}

impl<T: Any> TextConverter for FnConverter<T> {
    fn from_text(
        &self,
        text: &str,
        cx: &ConvertContext<'_>,
    ) -> std::result::Result<Box<dyn Any>, ConvertError> {
        (self.parse)(text, cx).map(|value| Box::new(value) as Box<dyn Any>)
    }

    fn to_text(&self, value: &dyn Any, cx: &ConvertContext<'_>) -> Option<String> {
        value
            .downcast_ref::<T>()
            .and_then(|value| (self.format)(value, cx))
    }
}

/// Converters registered under a name, referenced from annotations.
pub(crate) fn builtin_named() -> HashMap<String, Arc<dyn TextConverter>> {
    let mut named: HashMap<String, Arc<dyn TextConverter>> = HashMap::new();
    named.insert("base64".to_string(), Arc::new(Base64Converter));
    named.insert("string".to_string(), Arc::new(StringConverter::escaped()));
    named.insert("raw-string".to_string(), Arc::new(StringConverter::raw()));
    named.insert("bool-numeric".to_string(), Arc::new(BoolConverter::numeric()));
    named
}

#[cfg(test)]
pub(crate) mod test_support {
    use once_cell::sync::Lazy;

    use crate::registry::Catalog;
    use crate::settings::Settings;

    pub(crate) static SETTINGS: Lazy<Settings> = Lazy::new(Settings::default);
    pub(crate) static CATALOG: Lazy<Catalog> = Lazy::new(Catalog::default);
}

#[cfg(test)]
mod tests {
    use super::test_support::{CATALOG, SETTINGS};
    use super::*;

    #[test]
    fn test_fn_converter() {
        let converter = FnConverter::<u16>::simple(
            |text| {
                text.trim_start_matches('#')
                    .parse()
                    .map_err(|_| ConvertError::new("not a tag number"))
            },
            |value| format!("#{}", value),
        );
        let cx = ConvertContext::new(&SETTINGS, &CATALOG);

        let value = converter.from_text("#42", &cx).unwrap();
        assert_eq!(value.downcast_ref::<u16>(), Some(&42));
        assert_eq!(converter.to_text(&42u16, &cx).as_deref(), Some("#42"));
        assert!(converter.to_text(&"wrong type", &cx).is_none());
        assert!(converter.from_text("x", &cx).is_err());
    }

    #[test]
    fn test_builtin_named_converters() {
        let named = builtin_named();
        for name in ["base64", "string", "raw-string", "bool-numeric"] {
            assert!(named.contains_key(name), "missing {}", name);
        }
    }
}
