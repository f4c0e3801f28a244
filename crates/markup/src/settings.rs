//! Per-call configuration for the read and write engines.
//!
//! `Settings` is a plain value: build it with struct update syntax or the
//! `with_*` methods, or load it from configuration through serde.

use serde::{Deserialize, Serialize};

/// Options consumed by [`XmlSerializer`](crate::XmlSerializer) and
/// [`XmlDeserializer`](crate::XmlDeserializer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Apply reversible backslash escaping to string values.
    pub escape_text: bool,

    /// Skip unknown child elements instead of failing.
    pub skip_unknown_elements: bool,

    /// Register types on first use instead of requiring prior registration.
    pub auto_register: bool,

    /// Write `xsi:nil="true"` elements for absent nullable members.
    pub emit_nil: bool,

    /// Write `xsi:type` markers when a runtime type differs from a non-sealed
    /// declared type.
    pub emit_type_markers: bool,

    /// Declare the schema-instance namespace on the root element.
    pub declare_schema_instance: bool,

    /// Emit namespace declarations for namespaced types.
    pub write_namespaces: bool,

    /// Emit an `<?xml ...?>` declaration.
    pub xml_declaration: bool,

    /// Indent nested elements by this many spaces.
    pub indent: Option<usize>,

    /// Wrap base64 payloads at this many characters per line.
    pub base64_line_width: Option<usize>,

    /// Match enumeration names ignoring ASCII case when reading.
    pub enum_case_insensitive: bool,

    /// Attribute holding dictionary keys, unless a member overrides it.
    pub dictionary_key_attribute: String,

    /// Treat all text as significant, as if `xml:space="preserve"` were set
    /// on the root.
    pub preserve_whitespace: bool,

    /// Overrides the root element name on write.
    pub root_name: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            escape_text: true,
            skip_unknown_elements: false,
            auto_register: true,
            emit_nil: true,
            emit_type_markers: true,
            declare_schema_instance: false,
            write_namespaces: true,
            xml_declaration: false,
            indent: None,
            base64_line_width: None,
            enum_case_insensitive: true,
            dictionary_key_attribute: "Key".to_string(),
            preserve_whitespace: false,
            root_name: None,
        }
    }
}

impl Settings {
    /// Creates the default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether unknown elements are skipped.
    pub fn with_skip_unknown_elements(mut self, skip: bool) -> Self {
        self.skip_unknown_elements = skip;
        self
    }

    /// Sets whether string values are escaped.
    pub fn with_escape_text(mut self, escape: bool) -> Self {
        self.escape_text = escape;
        self
    }

    /// Sets whether unregistered types are registered on first use.
    pub fn with_auto_register(mut self, auto_register: bool) -> Self {
        self.auto_register = auto_register;
        self
    }

    /// Sets whether nil markers are written.
    pub fn with_emit_nil(mut self, emit_nil: bool) -> Self {
        self.emit_nil = emit_nil;
        self
    }

    /// Sets the indentation width.
    pub fn with_indent(mut self, indent: usize) -> Self {
        self.indent = Some(indent);
        self
    }

    /// Sets the base64 line width.
    pub fn with_base64_line_width(mut self, width: usize) -> Self {
        self.base64_line_width = Some(width);
        self
    }

    /// Sets whether the XML declaration is written.
    pub fn with_xml_declaration(mut self, declaration: bool) -> Self {
        self.xml_declaration = declaration;
        self
    }

    /// Sets whether the schema-instance namespace is declared on the root.
    pub fn with_schema_instance(mut self, declare: bool) -> Self {
        self.declare_schema_instance = declare;
        self
    }

    /// Sets the default dictionary key attribute.
    pub fn with_dictionary_key_attribute(mut self, name: impl Into<String>) -> Self {
        self.dictionary_key_attribute = name.into();
        self
    }

    /// Overrides the root element name.
    pub fn with_root_name(mut self, name: impl Into<String>) -> Self {
        self.root_name = Some(name.into());
        self
    }

    /// Sets whether enumeration names are matched case-insensitively.
    pub fn with_enum_case_insensitive(mut self, insensitive: bool) -> Self {
        self.enum_case_insensitive = insensitive;
        self
    }
}
