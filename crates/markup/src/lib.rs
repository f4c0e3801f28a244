//! # Helios Markup
//!
//! Descriptor-driven conversion between in-memory values and XML.
//!
//! ## Features
//!
//! - **Type registry**: every participating type describes itself once through
//!   [`XmlType`]; the [`Registry`] classifies and validates the declarations
//!   and caches the resulting [`TypeDescriptor`]. Lookups are lock-free.
//! - **Read and write engines**: [`XmlDeserializer`] and [`XmlSerializer`] walk
//!   values through their descriptors only, using type-erased accessors.
//! - **Converters**: scalars are converted through [`TextConverter`]s; whole
//!   elements can be taken over by an [`ElementConverter`].
//! - **Polymorphism and references**: values of known subtypes round-trip
//!   through `xsi:type` markers, and `Arc` members marked as references are
//!   written as identity keys and re-linked on read.
//!
//! ## Examples
//!
//! ```
//! use helios_markup::{TypeBuilder, XmlType, from_xml_str, to_xml_string};
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct Point {
//!     x: i32,
//!     y: i32,
//! }
//!
//! impl XmlType for Point {
//!     fn describe(ty: &mut TypeBuilder<Self>) {
//!         ty.default_constructor();
//!         ty.field("x", |p| &p.x, |p| &mut p.x).rename("X");
//!         ty.field("y", |p| &p.y, |p| &mut p.y).rename("Y");
//!     }
//! }
//!
//! let points = vec![Point { x: 1, y: 2 }, Point { x: 3, y: 4 }];
//! let xml = to_xml_string(&points)?;
//! assert_eq!(xml, r#"<Points><Point X="1" Y="2"/><Point X="3" Y="4"/></Points>"#);
//!
//! let back: Vec<Point> = from_xml_str(&xml)?;
//! assert_eq!(back, points);
//! # Ok::<(), helios_markup::Error>(())
//! ```
//!
//! With the `derive` feature (on by default) the impl above is written as
//! `#[derive(XmlType)]` with `#[xml(rename = "X")]` on the fields.

extern crate self as helios_markup;

pub mod convert;
pub mod cursor;
pub mod error;
pub mod escape;
pub mod namespace;
pub mod reference;
pub mod registry;
pub mod settings;
pub mod xml;

// Re-export common types
pub use convert::{ConvertContext, ElementConverter, FnConverter, TextConverter};
pub use error::{ConfigError, ConvertError, Error, FormatError, FormatErrorKind, Position, Result};
pub use namespace::QName;
pub use registry::{
    Catalog, MemberBuilder, MemberPolicy, Registry, Subtypes, TypeBuilder, TypeDescriptor,
    TypeKey, XmlType,
};
pub use settings::Settings;

// Re-export XML entry points at top level for convenience
pub use xml::{
    UnknownKind, UnknownNode, XmlDeserializer, XmlSerializer, from_xml_reader,
    from_xml_reader_with, from_xml_slice, from_xml_str, from_xml_str_with, to_xml_string,
    to_xml_string_with, to_xml_vec, to_xml_vec_with, to_xml_writer, to_xml_writer_with,
};

#[cfg(feature = "derive")]
pub use helios_markup_macro::XmlType;
