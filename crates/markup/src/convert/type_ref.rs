//! Type references written as registered tags.

use std::any::{Any, TypeId};
use std::fmt;

use super::ConvertContext;
use crate::error::ConvertError;
use crate::namespace::QName;
use crate::registry::XmlType;

/// A value naming a registered type.
///
/// Written as the type's tag in Clark notation (`{namespace}Local` or
/// `Local`) and resolved back through the registry's tag index.
#[derive(Clone, Copy)]
pub struct TypeRef {
    id: TypeId,
    type_name: &'static str,
}

impl TypeRef {
    pub fn of<T: XmlType>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeRef {}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeRef({})", self.type_name)
    }
}

/// Refers to `()`, which is never registered.
impl Default for TypeRef {
    fn default() -> Self {
        Self {
            id: TypeId::of::<()>(),
            type_name: "()",
        }
    }
}

pub(crate) fn parse_type_ref(text: &str, cx: &ConvertContext<'_>) -> Result<TypeRef, ConvertError> {
    let tag = QName::parse(text.trim());
    cx.catalog
        .lookup_by_tag(&tag)
        .map(|desc| TypeRef {
            id: desc.key().id(),
            type_name: desc.key().type_name(),
        })
        .ok_or_else(|| ConvertError::new(format!("no registered type has tag {}", tag)))
}

pub(crate) fn format_type_ref(value: &TypeRef, cx: &ConvertContext<'_>) -> Option<String> {
    cx.catalog
        .lookup_by_type(value.id)
        .map(|desc| desc.name().to_string())
}
