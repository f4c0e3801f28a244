//! Derive support for `helios-markup`.
//!
//! See [`XmlType`].

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod attributes;
mod expand;

/// Implements `helios_markup::XmlType` from the shape of a type.
///
/// Every named field becomes a member; `Option<T>` fields become nullable
/// members. Types get a default constructor unless told otherwise, so they
/// usually derive `Default` too.
///
/// ```rust, ignore
/// #[derive(Default, XmlType)]
/// #[xml(namespace = "urn:orders", rename_all = "PascalCase")]
/// struct Order {
///     #[xml(key)]
///     id: u32,
///     #[xml(element)]
///     customer: Option<Customer>,
///     #[xml(item = "Line")]
///     lines: Vec<OrderLine>,
///     #[xml(skip)]
///     cache: Vec<u8>,
/// }
/// ```
///
/// ## Type attributes
///
/// - `name = "..."`, `namespace = "..."`, `prefix = "..."`
/// - `rename_all = "..."`: one of `lowercase`, `UPPERCASE`, `PascalCase`,
///   `camelCase`, `snake_case`, `SCREAMING_SNAKE_CASE`, `kebab-case`
/// - `content = "field"`, `text = "field"`
/// - `converter = "name"`: a converter registered under that name
/// - `constructor = "path::to::fn"`, or `no_default` for types read only
///   through a converter
/// - `key = "field"` (repeatable), `sealed`, `ignore`
///
/// ## Field attributes
///
/// - storage: `attribute`, `element`, `content`, `text`
/// - `skip`, `flatten`, `key`, `reference`
/// - `rename = "..."`, `namespace = "..."`, `order = 1`
/// - `default` or `default = expr`: the value left out when writing
/// - `converter = "name"`, `item = "Tag"`, `key_attribute = "..."`
/// - `collection`, `dictionary`
///
/// ## Enums
///
/// Enums with only unit variants become enumerations written by variant
/// name (variants accept `rename`); they must be `Clone + PartialEq`.
/// Enums whose variants each wrap one value become polymorphic: every
/// wrapped type is a known subtype and the value is written as the variant's
/// content.
#[proc_macro_derive(XmlType, attributes(xml))]
pub fn derive_xml_type(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand::derive_xml_type(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
