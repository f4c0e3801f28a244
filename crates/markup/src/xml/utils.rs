//! Helpers shared by the read and write engines.

use std::any::Any;
use std::sync::Arc;

use crate::convert::{ConvertContext, TextConverter};
use crate::error::ConvertError;
use crate::reference::composite_key;
use crate::registry::{Catalog, Shape, TypeDescriptor};

/// Local name of the type marker attribute in the schema-instance namespace.
pub const XSI_TYPE: &str = "type";

/// Local name of the nil marker attribute in the schema-instance namespace.
pub const XSI_NIL: &str = "nil";

/// Longest chain of views or wrappers followed before giving up.
const MAX_VIEW_DEPTH: usize = 32;

pub(crate) fn is_blank(text: &str) -> bool {
    text.chars().all(char::is_whitespace)
}

pub(crate) fn prefixed(prefix: &str, local: &str) -> String {
    format!("{}:{}", prefix, local)
}

/// Whether values of the type are read and written as text as a whole.
pub(crate) fn reads_as_text(descriptor: &TypeDescriptor) -> bool {
    descriptor.converter().is_some()
        && (descriptor.shape() == Shape::Scalar || !descriptor.has_constructor())
}

/// Follows views from `declared` down to the concrete value.
///
/// Returns the runtime descriptor, the viewed value and whether a
/// polymorphic step was taken on the way.
pub(crate) fn runtime<'v>(
    catalog: &Catalog,
    declared: &Arc<TypeDescriptor>,
    value: &'v dyn Any,
) -> Option<(Arc<TypeDescriptor>, &'v dyn Any, bool)> {
    let mut descriptor = declared.clone();
    let mut value = value;
    let mut polymorphic = false;
    for _ in 0..MAX_VIEW_DEPTH {
        let Some(inner) = descriptor.view(value) else {
            return Some((descriptor, value, polymorphic));
        };
        if descriptor.shape() != Shape::Wrapper {
            polymorphic = true;
        }
        descriptor = catalog.lookup_by_type((*inner).type_id())?;
        value = inner;
    }
    None
}

/// The text form of `value`, through `converter` if given, else through the
/// converter of its runtime type.
pub(crate) fn text_form(
    cx: &ConvertContext<'_>,
    converter: Option<&Arc<dyn TextConverter>>,
    declared: &Arc<TypeDescriptor>,
    value: &dyn Any,
) -> Option<String> {
    if let Some(converter) = converter {
        return converter.to_text(value, cx);
    }
    let (runtime, value, _) = runtime(cx.catalog, declared, value)?;
    runtime.converter()?.to_text(value, cx)
}

/// Whether values declared as `declared` have a text form.
pub(crate) fn has_text_form(catalog: &Catalog, declared: &Arc<TypeDescriptor>) -> bool {
    textual_descriptor(catalog, declared).is_some()
}

fn textual_descriptor(
    catalog: &Catalog,
    declared: &Arc<TypeDescriptor>,
) -> Option<Arc<TypeDescriptor>> {
    let mut descriptor = declared.clone();
    for _ in 0..MAX_VIEW_DEPTH {
        if descriptor.converter().is_some() {
            return Some(descriptor);
        }
        let inner = descriptor.wrapped()?;
        descriptor = catalog.lookup_by_type(inner.id())?;
    }
    None
}

/// Parses `text` as a value of `declared`, through `converter` if given,
/// else through the converter of `declared` or of the type it wraps.
pub(crate) fn parse_text(
    cx: &ConvertContext<'_>,
    converter: Option<&Arc<dyn TextConverter>>,
    declared: &Arc<TypeDescriptor>,
    text: &str,
) -> Result<Box<dyn Any>, ConvertError> {
    let value = match converter {
        Some(converter) => converter.from_text(text, cx)?,
        None => {
            let textual = textual_descriptor(cx.catalog, declared)
                .ok_or_else(|| ConvertError::new("type has no text form"))?;
            let converter = textual
                .converter()
                .ok_or_else(|| ConvertError::new("type has no text form"))?;
            converter.from_text(text, cx)?
        }
    };
    cx.catalog
        .coerce(value, declared.key().id())
        .map_err(|_| ConvertError::new(format!("converted value is not a {}", declared.type_name())))
}

/// The identity key of `value`, or `None` if its type declares no key
/// members or a key member has no text form.
pub(crate) fn identity_key(
    cx: &ConvertContext<'_>,
    descriptor: &TypeDescriptor,
    value: &dyn Any,
) -> Option<String> {
    if descriptor.identity().is_empty() {
        return None;
    }
    let mut parts = Vec::with_capacity(descriptor.identity().len());
    for member in descriptor.identity() {
        let part = member.get(value)?;
        let declared = cx.catalog.lookup_by_type(member.declared().id())?;
        parts.push(text_form(cx, member.converter.as_ref(), &declared, part)?);
    }
    Some(composite_key(&parts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Registry, TypeBuilder, XmlType};
    use crate::settings::Settings;

    #[derive(Default)]
    struct Account {
        bank: String,
        number: u32,
    }

    impl XmlType for Account {
        fn describe(ty: &mut TypeBuilder<Self>) {
            ty.default_constructor().key("bank").key("number");
            ty.field("bank", |a| &a.bank, |a| &mut a.bank);
            ty.field("number", |a| &a.number, |a| &mut a.number);
        }
    }

    #[test]
    fn test_blank() {
        assert!(is_blank(""));
        assert!(is_blank(" \n\t"));
        assert!(!is_blank(" x "));
    }

    #[test]
    fn test_identity_key_is_composite() {
        let registry = Registry::new();
        let account = registry.register::<Account>().unwrap();
        let catalog = registry.catalog();
        let settings = Settings::default();
        let cx = ConvertContext::new(&settings, &catalog);
        let value = Account {
            bank: "ACME".to_string(),
            number: 42,
        };
        assert_eq!(
            identity_key(&cx, &account, &value).as_deref(),
            Some("(ACME,42)")
        );
    }

    #[test]
    fn test_text_through_wrappers() {
        let registry = Registry::new();
        let boxed = registry.register::<Box<i32>>().unwrap();
        let catalog = registry.catalog();
        let settings = Settings::default();
        let cx = ConvertContext::new(&settings, &catalog);

        let value = parse_text(&cx, None, &boxed, " 17 ").unwrap();
        assert_eq!(value.downcast_ref::<Box<i32>>().map(|b| **b), Some(17));
        assert_eq!(
            text_form(&cx, None, &boxed, value.as_ref()).as_deref(),
            Some("17")
        );
        assert!(has_text_form(&catalog, &boxed));
        assert!(reads_as_text(&registry.register::<i32>().unwrap()));
    }
}
