//! Reading and writing registered types as XML.
//!
//! Both directions are driven by the [`TypeDescriptor`](crate::TypeDescriptor)s
//! held in a [`Registry`](crate::Registry): the engines never look at a type
//! directly, only at its cached schema and type-erased accessors.
//!
//! ## Mapping
//!
//! ### Objects
//!
//! Scalar members become attributes by default, everything else becomes a
//! child element named after the member:
//!
//! ```xml
//! <Order Id="7">
//!   <Customer Name="Ann"/>
//! </Order>
//! ```
//!
//! A member marked as the text property holds the element's character data:
//!
//! ```xml
//! <Label lang="en">Hello</Label>
//! ```
//!
//! ### Collections
//!
//! A collection is an element whose children are its items, each named after
//! the item's runtime type (or an item name set on the member):
//!
//! ```xml
//! <Points>
//!   <Point X="1" Y="2"/>
//!   <Point X="3" Y="4"/>
//! </Points>
//! ```
//!
//! ### Dictionaries
//!
//! Entries are value elements carrying the key in an attribute, `Key` unless
//! overridden:
//!
//! ```xml
//! <Scores>
//!   <Int32 Key="ann">3</Int32>
//! </Scores>
//! ```
//!
//! ### Absent values and runtime types
//!
//! - An absent nullable member is written as `<name xsi:nil="true"/>`.
//! - A member whose runtime type differs from its non-sealed declared type
//!   carries `xsi:type="Circle"`.
//!
//! ## Namespaces
//!
//! A type's namespace is declared as the default namespace on the first
//! element that needs it. Namespaced attributes and the `xsi` markers use
//! prefixes from the registry's namespace table, declared where first used.
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
//! let xml = to_xml_string(&Point { x: 1, y: 2 })?;
//! assert_eq!(xml, r#"<Point X="1" Y="2"/>"#);
//! let point: Point = from_xml_str(&xml)?;
//! assert_eq!(point, Point { x: 1, y: 2 });
//! # Ok::<(), helios_markup::Error>(())
//! ```

pub mod de;
pub mod ser;
mod utils;

// Re-export serialization functions
pub use ser::{
    XmlSerializer, to_xml_string, to_xml_string_with, to_xml_vec, to_xml_vec_with, to_xml_writer,
    to_xml_writer_with,
};

// Re-export deserialization functions
pub use de::{
    UnknownKind, UnknownNode, XmlDeserializer, from_xml_reader, from_xml_reader_with,
    from_xml_slice, from_xml_str, from_xml_str_with,
};
