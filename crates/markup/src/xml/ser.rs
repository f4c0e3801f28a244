//! The write engine.
//!
//! [`XmlSerializer`] walks a value through its registered descriptors and
//! pushes elements, attributes and text to an [`XmlWrite`] sink. Namespace
//! prefixes come from the registry's table; the serializer works on a copy
//! so the namespaces a call actually used can be reported afterwards.

use std::any::Any;
use std::io::Write;
use std::sync::Arc;

use tracing::{debug, trace};

use super::utils::{self, XSI_NIL, XSI_TYPE};
use crate::convert::ConvertContext;
use crate::cursor::{QuickXmlWriter, XmlWrite};
use crate::error::{ConfigError, Error, FormatError, FormatErrorKind, Result};
use crate::namespace::{NamespaceTable, QName, XSI_NAMESPACE};
use crate::reference::ReferenceTracker;
use crate::registry::{
    Catalog, CollectionContent, ContentMode, DictionaryContent, ItemMap, MemberContent,
    MemberDescriptor, Registry, TypeDescriptor, TypeKey, XmlType,
};
use crate::settings::Settings;

/// Serialize a value to an XML string.
///
/// Uses the global registry and default settings.
///
/// # Examples
///
/// ```
/// let xml = helios_markup::to_xml_string(&vec![1i32, 2])?;
/// assert_eq!(xml, "<Int32s><Int32>1</Int32><Int32>2</Int32></Int32s>");
/// # Ok::<(), helios_markup::Error>(())
/// ```
pub fn to_xml_string<T: XmlType>(value: &T) -> Result<String> {
    to_xml_string_with(value, Registry::global(), &Settings::default())
}

pub fn to_xml_string_with<T: XmlType>(value: &T, registry: &Registry, settings: &Settings) -> Result<String> {
    let buffer = to_xml_vec_with(value, registry, settings)?;
    String::from_utf8(buffer).map_err(|e| Error::from(e.utf8_error()))
}

/// Serialize a value to an XML byte vector.
pub fn to_xml_vec<T: XmlType>(value: &T) -> Result<Vec<u8>> {
    to_xml_vec_with(value, Registry::global(), &Settings::default())
}

pub fn to_xml_vec_with<T: XmlType>(value: &T, registry: &Registry, settings: &Settings) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    to_xml_writer_with(value, &mut buffer, registry, settings)?;
    Ok(buffer)
}

/// Serialize a value to an XML writer.
pub fn to_xml_writer<T, W>(value: &T, writer: W) -> Result<()>
where
    T: XmlType,
    W: Write,
{
    to_xml_writer_with(value, writer, Registry::global(), &Settings::default())
}

pub fn to_xml_writer_with<T, W>(value: &T, writer: W, registry: &Registry, settings: &Settings) -> Result<()>
where
    T: XmlType,
    W: Write,
{
    let sink = QuickXmlWriter::new(writer, settings.indent);
    let mut serializer = XmlSerializer::new(sink, registry, settings.clone());
    serializer.serialize(value)
}

fn not_writable(type_name: &str, reason: &str) -> Error {
    FormatError::new(FormatErrorKind::NotWritable {
        reason: reason.to_string(),
    })
    .with_type(type_name)
    .into()
}

/// Writes values to an XML sink.
pub struct XmlSerializer<'a, W: XmlWrite> {
    writer: W,
    registry: &'a Registry,
    catalog: Arc<Catalog>,
    settings: Settings,
    /// Call-scoped copy of the registry's namespace table
    namespaces: NamespaceTable,
    /// Default namespace in effect per open element
    defaults: Vec<Option<String>>,
    /// Prefixes declared per open element
    prefixes: Vec<Vec<String>>,
    tracker: ReferenceTracker,
}

impl<'a, W: XmlWrite> XmlSerializer<'a, W> {
    pub fn new(writer: W, registry: &'a Registry, settings: Settings) -> Self {
        let catalog = registry.catalog();
        let namespaces = catalog.namespaces().clone();
        Self {
            writer,
            registry,
            catalog,
            settings,
            namespaces,
            defaults: Vec::new(),
            prefixes: Vec::new(),
            tracker: ReferenceTracker::new(),
        }
    }

    /// Namespace URIs written so far.
    pub fn used_namespaces(&self) -> Vec<&str> {
        self.namespaces.used()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Writes `value` as one document and flushes the sink.
    pub fn serialize<T: XmlType>(&mut self, value: &T) -> Result<()> {
        let declared = self.root_descriptor(TypeKey::of::<T>())?;
        if self.settings.xml_declaration {
            self.writer.declaration()?;
        }
        let root = self
            .settings
            .root_name
            .as_ref()
            .map(|name| QName::with_namespace(declared.name().namespace(), name.as_str()));
        self.write_element(root.as_ref(), &declared, value, None)?;
        self.writer.finish()
    }

    fn root_descriptor(&mut self, key: TypeKey) -> Result<Arc<TypeDescriptor>> {
        let descriptor = match self.registry.lookup_by_type(key.id()) {
            Some(descriptor) => descriptor,
            None if self.settings.auto_register => self.registry.register_key(key)?,
            None => {
                return Err(ConfigError::Unregistered {
                    type_name: key.type_name().to_string(),
                }
                .into());
            }
        };
        let catalog = self.registry.catalog();
        // Usage marks carry over from earlier documents on this serializer.
        if !Arc::ptr_eq(&catalog, &self.catalog) {
            let mut namespaces = catalog.namespaces().clone();
            for uri in self.namespaces.used() {
                namespaces.mark_used(uri);
            }
            self.namespaces = namespaces;
            self.catalog = catalog;
        }
        Ok(descriptor)
    }

    fn described(&self, key: TypeKey) -> Result<Arc<TypeDescriptor>> {
        self.catalog.lookup_by_type(key.id()).ok_or_else(|| {
            ConfigError::Unregistered {
                type_name: key.type_name().to_string(),
            }
            .into()
        })
    }

    /// Starts an element, declaring its namespace as the default when it
    /// differs from the inherited one.
    fn start(&mut self, name: &QName) -> Result<()> {
        let inherited = self.defaults.last().cloned().flatten();
        self.writer.start_element(name.local())?;
        let namespace = name.namespace().map(str::to_string);
        let mut in_scope = inherited;
        if self.settings.write_namespaces && namespace != in_scope {
            self.writer
                .namespace_declaration(None, namespace.as_deref().unwrap_or(""))?;
            in_scope = namespace.clone();
        }
        if let Some(uri) = &namespace {
            self.namespaces.mark_used(uri);
        }
        let root = self.defaults.is_empty();
        self.defaults.push(in_scope);
        self.prefixes.push(Vec::new());
        if root && self.settings.declare_schema_instance {
            self.declare_prefix(XSI_NAMESPACE, Some("xsi"))?;
        }
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.defaults.pop();
        self.prefixes.pop();
        self.writer.end_element()
    }

    /// Returns the prefix for `uri`, declaring it on the current element
    /// unless an ancestor already did.
    fn declare_prefix(&mut self, uri: &str, preferred: Option<&str>) -> Result<String> {
        let prefix = self.namespaces.declare(uri, preferred);
        self.namespaces.mark_used(uri);
        let in_scope = self.prefixes.iter().flatten().any(|p| *p == prefix);
        if !in_scope {
            self.writer.namespace_declaration(Some(&prefix), uri)?;
            if let Some(frame) = self.prefixes.last_mut() {
                frame.push(prefix.clone());
            }
        }
        Ok(prefix)
    }

    fn write_attribute(&mut self, name: &QName, value: &str) -> Result<()> {
        match name.namespace() {
            None => self.writer.attribute(name.local(), value),
            Some(uri) => {
                let prefix = self.declare_prefix(uri, None)?;
                self.writer
                    .attribute(&utils::prefixed(&prefix, name.local()), value)
            }
        }
    }

    fn xsi_attribute(&mut self, local: &str, value: &str) -> Result<()> {
        let prefix = self.declare_prefix(XSI_NAMESPACE, Some("xsi"))?;
        self.writer.attribute(&utils::prefixed(&prefix, local), value)
    }

    /// The `xsi:type` value naming `runtime`.
    fn marker(&mut self, runtime: &TypeDescriptor) -> Result<String> {
        let name = runtime.name();
        let default = self.defaults.last().cloned().flatten();
        match name.namespace() {
            Some(uri) if default.as_deref() != Some(uri) => {
                let prefix = self.declare_prefix(uri, runtime.prefix())?;
                Ok(utils::prefixed(&prefix, name.local()))
            }
            _ => Ok(name.local().to_string()),
        }
    }

    /// Writes `value`, declared as `declared`, as one element named `tag`, or
    /// after its runtime type when no tag is given.
    fn write_element(
        &mut self,
        tag: Option<&QName>,
        declared: &Arc<TypeDescriptor>,
        value: &dyn Any,
        key: Option<(&str, &str)>,
    ) -> Result<()> {
        let (runtime, inner, polymorphic) = utils::runtime(&self.catalog, declared, value)
            .ok_or_else(|| not_writable(declared.type_name(), "runtime type is not registered"))?;
        if declared.is_shared() {
            self.remember(declared, value, &runtime, inner);
        }
        let name = tag.cloned().unwrap_or_else(|| runtime.name().clone());
        trace!(type_name = runtime.type_name(), tag = %name, "writing element");

        if let Some(converter) = runtime.element_converter.clone().filter(|c| c.can_write()) {
            let cx = ConvertContext::new(&self.settings, &self.catalog);
            return converter.write(inner, &name, &mut self.writer, &cx);
        }

        self.start(&name)?;
        if let Some((attribute, text)) = key {
            self.writer.attribute(attribute, text)?;
        }
        if self.settings.emit_type_markers && polymorphic && name != *runtime.name() {
            let marker = self.marker(&runtime)?;
            self.xsi_attribute(XSI_TYPE, &marker)?;
        }
        self.write_body(&runtime, inner)?;
        self.end()
    }

    fn write_body(&mut self, descriptor: &TypeDescriptor, value: &dyn Any) -> Result<()> {
        if utils::reads_as_text(descriptor) {
            let text = descriptor
                .converter()
                .and_then(|converter| {
                    let cx = ConvertContext::new(&self.settings, &self.catalog);
                    converter.to_text(value, &cx)
                })
                .ok_or_else(|| not_writable(descriptor.type_name(), "value has no text form"))?;
            return self.writer.text(&text);
        }

        let mut deferred = Vec::new();
        for member in descriptor.attributes() {
            let Some(member_value) = member.get(value) else {
                continue;
            };
            if member.is_default(member_value) {
                continue;
            }
            match self.member_text(member, member_value)? {
                Some(text) => self.write_attribute(member.tag(), &text)?,
                None => {
                    debug!(
                        member = member.field(),
                        owner = descriptor.type_name(),
                        "attribute has no text form, writing it as an element"
                    );
                    deferred.push(member);
                }
            }
        }

        match descriptor.content() {
            ContentMode::Text(member) | ContentMode::Property(member) => {
                if let Some(member_value) = member.get(value) {
                    match self.member_text(member, member_value)? {
                        Some(text) => {
                            // Blank text is dropped on read unless space is preserved.
                            if !text.is_empty()
                                && utils::is_blank(&text)
                                && !self.settings.preserve_whitespace
                            {
                                self.writer.attribute("xml:space", "preserve")?;
                            }
                            self.writer.text(&text)?
                        }
                        None => self.write_content(member, member_value)?,
                    }
                }
            }
            ContentMode::Collection(content) => self.write_items(content, None, value)?,
            ContentMode::Dictionary(content) => self.write_entries(content, None, None, value)?,
            ContentMode::None => {}
        }

        for member in deferred.into_iter().chain(descriptor.elements()) {
            self.write_member(descriptor, member, value)?;
        }
        Ok(())
    }

    /// The text form of a member value: its reference key, or its value
    /// through the member's or the type's converter.
    fn member_text(&mut self, member: &MemberDescriptor, value: &dyn Any) -> Result<Option<String>> {
        let declared = self.described(member.declared())?;
        if member.is_reference() {
            if member.content() == MemberContent::Collection {
                return Ok(None);
            }
            return self.reference_key(&declared, member.field(), value).map(Some);
        }
        let cx = ConvertContext::new(&self.settings, &self.catalog);
        Ok(utils::text_form(&cx, member.converter.as_ref(), &declared, value))
    }

    /// Writes a content property value that has no text form.
    fn write_content(&mut self, member: &MemberDescriptor, value: &dyn Any) -> Result<()> {
        let declared = self.described(member.declared())?;
        match (member.content(), declared.content()) {
            (MemberContent::Collection, ContentMode::Collection(content)) => {
                self.write_items(content, member.item_overrides(), value)
            }
            (MemberContent::Dictionary, ContentMode::Dictionary(content)) => {
                self.write_entries(content, member.item_overrides(), member.key_attribute(), value)
            }
            _ => self.write_element(None, &declared, value, None),
        }
    }

    fn write_member(&mut self, owner: &TypeDescriptor, member: &MemberDescriptor, value: &dyn Any) -> Result<()> {
        let Some(member_value) = member.get(value) else {
            if member.is_nullable() && self.settings.emit_nil {
                self.start(member.tag())?;
                self.xsi_attribute(XSI_NIL, "true")?;
                self.end()?;
            }
            return Ok(());
        };
        if member.is_default(member_value) {
            return Ok(());
        }

        if member.is_reference() && member.content() == MemberContent::Collection {
            return self.write_reference_items(member, member_value);
        }
        if member.is_reference() || member.has_converter() {
            let text = self.member_text(member, member_value)?.ok_or_else(|| {
                not_writable(owner.type_name(), &format!("member '{}' has no text form", member.field()))
            })?;
            self.start(member.tag())?;
            self.writer.text(&text)?;
            return self.end();
        }

        let declared = self.described(member.declared())?;
        match (member.content(), declared.content()) {
            (MemberContent::Collection, ContentMode::Collection(content)) => {
                self.start(member.tag())?;
                self.write_items(content, member.item_overrides(), member_value)?;
                self.end()
            }
            (MemberContent::Dictionary, ContentMode::Dictionary(content)) => {
                self.start(member.tag())?;
                self.write_entries(content, member.item_overrides(), member.key_attribute(), member_value)?;
                self.end()
            }
            _ => self.write_element(Some(member.tag()), &declared, member_value, None),
        }
    }

    /// Tag for an item: the collection's tag for its runtime type, if any.
    fn item_tag(&self, items: &ItemMap, declared: &Arc<TypeDescriptor>, value: &dyn Any) -> Option<QName> {
        let (runtime, _, _) = utils::runtime(&self.catalog, declared, value)?;
        items.tag_for(runtime.key().id()).cloned()
    }

    fn write_items(
        &mut self,
        content: &CollectionContent,
        overrides: Option<&ItemMap>,
        value: &dyn Any,
    ) -> Result<()> {
        let item = self.described(content.item)?;
        let renamed = overrides.and_then(|map| map.tag_for(content.item.id())).cloned();
        for entry in content.ops.items(value) {
            let tag = renamed
                .clone()
                .or_else(|| self.item_tag(&content.items, &item, entry));
            self.write_element(tag.as_ref(), &item, entry, None)?;
        }
        Ok(())
    }

    fn write_entries(
        &mut self,
        content: &DictionaryContent,
        overrides: Option<&ItemMap>,
        key_attribute: Option<&str>,
        value: &dyn Any,
    ) -> Result<()> {
        let key_type = self.described(content.key)?;
        let value_type = self.described(content.value)?;
        let key_name = key_attribute
            .unwrap_or(self.settings.dictionary_key_attribute.as_str())
            .to_string();
        let renamed = overrides.and_then(|map| map.tag_for(content.value.id())).cloned();
        for (key, entry) in content.ops.entries(value) {
            let key_text = {
                let cx = ConvertContext::new(&self.settings, &self.catalog);
                utils::text_form(&cx, None, &key_type, key)
            }
            .ok_or_else(|| not_writable(key_type.type_name(), "dictionary key has no text form"))?;
            let tag = renamed
                .clone()
                .or_else(|| self.item_tag(&content.items, &value_type, entry));
            self.write_element(tag.as_ref(), &value_type, entry, Some((&key_name, &key_text)))?;
        }
        Ok(())
    }

    /// Writes a reference collection as one item element per target, each
    /// holding the target's identity key.
    fn write_reference_items(&mut self, member: &MemberDescriptor, value: &dyn Any) -> Result<()> {
        let declared = self.described(member.declared())?;
        let ContentMode::Collection(content) = declared.content() else {
            return Err(not_writable(declared.type_name(), "reference member is not a collection"));
        };
        let item = self.described(content.item)?;
        let renamed = member
            .item_overrides()
            .and_then(|map| map.tag_for(content.item.id()))
            .cloned();
        self.start(member.tag())?;
        for entry in content.ops.items(value) {
            let key = self.reference_key(&item, member.field(), entry)?;
            let tag = renamed
                .clone()
                .or_else(|| self.item_tag(&content.items, &item, entry))
                .or_else(|| {
                    utils::runtime(&self.catalog, &item, entry)
                        .map(|(runtime, _, _)| runtime.name().clone())
                })
                .ok_or_else(|| not_writable(item.type_name(), "runtime type is not registered"))?;
            self.start(&tag)?;
            self.writer.text(&key)?;
            self.end()?;
        }
        self.end()
    }

    fn reference_key(&mut self, declared: &Arc<TypeDescriptor>, field: &str, value: &dyn Any) -> Result<String> {
        let key = {
            let cx = ConvertContext::new(&self.settings, &self.catalog);
            utils::runtime(&self.catalog, declared, value)
                .and_then(|(runtime, inner, _)| utils::identity_key(&cx, &runtime, inner))
        };
        let key = key
            .ok_or_else(|| not_writable(declared.type_name(), "reference target has no identity key"))?;
        if self.tracker.resolve(declared.key().id(), &key).is_none() {
            debug!(key = %key, member = field, "reference written before its target");
        }
        Ok(key)
    }

    fn remember(
        &mut self,
        declared: &TypeDescriptor,
        value: &dyn Any,
        runtime: &TypeDescriptor,
        inner: &dyn Any,
    ) {
        let Some(ops) = declared.shared.as_ref() else {
            return;
        };
        let key = {
            let cx = ConvertContext::new(&self.settings, &self.catalog);
            utils::identity_key(&cx, runtime, inner)
        };
        if let (Some(key), Some(instance)) = (key, (ops.share)(value)) {
            self.tracker.remember(declared.key().id(), key, instance);
        }
    }
}
