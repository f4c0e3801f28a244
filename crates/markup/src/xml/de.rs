//! The read engine.
//!
//! [`XmlDeserializer`] pulls nodes from an [`XmlRead`] cursor and builds
//! values by walking the registered [`TypeDescriptor`]s. It holds the
//! namespace scope, the `xml:space` stack and the reference tracker for one
//! call and is discarded afterwards.

use std::any::{Any, TypeId};
use std::collections::HashSet;
use std::io::BufRead;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::utils::{self, XSI_NIL, XSI_TYPE};
use crate::convert::ConvertContext;
use crate::convert::scalar::parse_bool;
use crate::cursor::{NodeKind, QuickXmlReader, XmlRead};
use crate::error::{ConfigError, Error, FormatError, FormatErrorKind, Position, Result};
use crate::namespace::{NamespaceScope, QName, XSI_NAMESPACE};
use crate::reference::ReferenceTracker;
use crate::registry::{
    Catalog, CollectionContent, ContentMode, DictionaryContent, ItemMap, MemberContent,
    MemberDescriptor, Registry, Shape, Storage, TypeDescriptor, TypeKey, XmlType,
};
use crate::settings::Settings;

/// Deserialize a value from an XML string.
///
/// Uses the global registry and default settings.
///
/// # Example
///
/// ```
/// let values: Vec<i32> = helios_markup::from_xml_str("<Int32s><Int32>1</Int32><Int32>2</Int32></Int32s>")?;
/// assert_eq!(values, vec![1, 2]);
/// # Ok::<(), helios_markup::Error>(())
/// ```
pub fn from_xml_str<T: XmlType>(xml: &str) -> Result<T> {
    from_xml_str_with(xml, Registry::global(), &Settings::default())
}

/// Deserialize a value from an XML string with an explicit registry and
/// settings. Errors carry line and column.
pub fn from_xml_str_with<T: XmlType>(xml: &str, registry: &Registry, settings: &Settings) -> Result<T> {
    let mut deserializer =
        XmlDeserializer::new(QuickXmlReader::from_str(xml), registry, settings.clone());
    deserializer.deserialize::<T>().map_err(|e| e.locate(xml))
}

/// Deserialize a value from XML bytes.
pub fn from_xml_slice<T: XmlType>(xml: &[u8]) -> Result<T> {
    let xml = std::str::from_utf8(xml)?;
    from_xml_str(xml)
}

/// Deserialize a value from a reader. Error positions are byte offsets.
pub fn from_xml_reader<R: BufRead, T: XmlType>(reader: R) -> Result<T> {
    from_xml_reader_with(reader, Registry::global(), &Settings::default())
}

pub fn from_xml_reader_with<R: BufRead, T: XmlType>(
    reader: R,
    registry: &Registry,
    settings: &Settings,
) -> Result<T> {
    XmlDeserializer::new(QuickXmlReader::new(reader), registry, settings.clone()).deserialize()
}

/// Whether an unmatched node was an attribute or an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownKind {
    Attribute,
    Element,
}

/// A node no member claimed, as passed to the unknown-node hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownNode {
    pub kind: UnknownKind,
    pub name: QName,
    /// Type being read when the node was met.
    pub owner: &'static str,
    /// Attribute value; `None` for elements.
    pub value: Option<String>,
    pub position: Position,
}

/// A start tag after namespace resolution, with the markers pulled out.
#[derive(Debug)]
struct StartTag {
    name: QName,
    raw: String,
    attributes: Vec<(QName, String)>,
    position: Position,
    /// Resolved `xsi:type` marker.
    marker: Option<QName>,
    nil: bool,
}

type UnknownHook<'a> = Box<dyn FnMut(&UnknownNode) + 'a>;

/// Reads values from an XML cursor.
pub struct XmlDeserializer<'a, R: XmlRead> {
    /// The underlying cursor
    reader: R,
    registry: &'a Registry,
    /// Catalog snapshot; refreshed when the root type is registered on demand
    catalog: Arc<Catalog>,
    settings: Settings,
    scope: NamespaceScope,
    /// `xml:space="preserve"` state per open element
    space: Vec<bool>,
    tracker: ReferenceTracker,
    on_unknown: Option<UnknownHook<'a>>,
}

impl<'a, R: XmlRead> XmlDeserializer<'a, R> {
    pub fn new(reader: R, registry: &'a Registry, settings: Settings) -> Self {
        Self {
            reader,
            registry,
            catalog: registry.catalog(),
            settings,
            scope: NamespaceScope::new(),
            space: Vec::new(),
            tracker: ReferenceTracker::new(),
            on_unknown: None,
        }
    }

    /// Installs a hook receiving attributes and elements no member claims.
    /// Unknown elements are skipped after the hook returns.
    pub fn on_unknown(mut self, hook: impl FnMut(&UnknownNode) + 'a) -> Self {
        self.on_unknown = Some(Box::new(hook));
        self
    }

    /// Shared instances seen so far, by identity key.
    pub fn references(&self) -> &ReferenceTracker {
        &self.tracker
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Reads one document whose root resolves to `T` or a known subtype.
    pub fn deserialize<T: XmlType>(&mut self) -> Result<T> {
        let declared = self.root_descriptor(TypeKey::of::<T>())?;
        self.reader.advance()?;
        loop {
            match self.reader.kind() {
                NodeKind::Start => break,
                NodeKind::None => {
                    return Err(FormatError::new(FormatErrorKind::MissingRoot)
                        .with_type(declared.type_name())
                        .into());
                }
                NodeKind::Text if !utils::is_blank(self.reader.text()) => {
                    return Err(FormatError::new(FormatErrorKind::UnexpectedText {
                        text: self.reader.text().trim().to_string(),
                    })
                    .with_position(Some(self.reader.position()))
                    .into());
                }
                _ => self.reader.advance()?,
            }
        }

        let start = self.open()?;
        let hint = self.root_hint(&start, &declared)?;
        let position = start.position;
        let value = self.read_element(start, &declared, hint)?.ok_or_else(|| {
            Error::from(
                FormatError::new(FormatErrorKind::NotConstructible)
                    .with_type(declared.type_name())
                    .with_position(Some(position)),
            )
        })?;
        value.downcast::<T>().map(|value| *value).map_err(|_| {
            FormatError::new(FormatErrorKind::TypeMismatch {
                expected: std::any::type_name::<T>().to_string(),
                found: declared.type_name().to_string(),
            })
            .into()
        })
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
        self.catalog = self.registry.catalog();
        Ok(descriptor)
    }

    /// The root tag must name `declared`, the configured root name, or a type
    /// assignable to `declared`.
    fn root_hint(&self, start: &StartTag, declared: &TypeDescriptor) -> Result<Option<TypeId>> {
        let local = start.name.local();
        if start.marker.is_some()
            || local == declared.name().local()
            || self.settings.root_name.as_deref() == Some(local)
        {
            return Ok(None);
        }
        match self.catalog.resolve_tag(&start.name) {
            Some(id) if self.catalog.is_assignable(id, declared.key().id()) => Ok(Some(id)),
            _ => Err(FormatError::new(FormatErrorKind::TypeMismatch {
                expected: declared.name().to_string(),
                found: start.name.to_string(),
            })
            .with_type(declared.type_name())
            .with_tag(start.raw.clone())
            .with_position(Some(start.position))
            .into()),
        }
    }

    fn described(&self, key: TypeKey) -> Result<Arc<TypeDescriptor>> {
        self.catalog.lookup_by_type(key.id()).ok_or_else(|| {
            ConfigError::Unregistered {
                type_name: key.type_name().to_string(),
            }
            .into()
        })
    }

    fn preserving(&self) -> bool {
        self.space
            .last()
            .copied()
            .unwrap_or(self.settings.preserve_whitespace)
    }

    /// Opens the start node under the cursor without moving past it.
    fn open(&mut self) -> Result<StartTag> {
        let raw = self.reader.name().to_string();
        let position = self.reader.position();
        let raw_attributes = self.reader.attributes().to_vec();

        let mut preserve = self.preserving();
        self.scope.push();
        for attribute in &raw_attributes {
            match attribute.name.as_str() {
                "xmlns" => self.scope.declare(None, &attribute.value),
                "xml:space" => preserve = attribute.value == "preserve",
                name => {
                    if let Some(prefix) = name.strip_prefix("xmlns:") {
                        self.scope.declare(Some(prefix), &attribute.value);
                    }
                }
            }
        }
        self.space.push(preserve);

        let name = self.scope.resolve_element(&raw);
        let mut attributes = Vec::with_capacity(raw_attributes.len());
        let mut marker = None;
        let mut nil = false;
        for attribute in raw_attributes {
            if attribute.name == "xmlns"
                || attribute.name == "xml:space"
                || attribute.name.starts_with("xmlns:")
            {
                continue;
            }
            let qname = self.scope.resolve_attribute(&attribute.name);
            if qname.namespace() == Some(XSI_NAMESPACE) {
                match qname.local() {
                    XSI_TYPE => marker = Some(self.resolve_marker(&attribute.value)),
                    XSI_NIL => nil = parse_bool(&attribute.value).unwrap_or(false),
                    _ => {}
                }
                continue;
            }
            attributes.push((qname, attribute.value));
        }

        trace!(tag = %name, "opened element");
        Ok(StartTag {
            name,
            raw,
            attributes,
            position,
            marker,
            nil,
        })
    }

    fn resolve_marker(&self, value: &str) -> QName {
        if value.starts_with('{') {
            QName::parse(value)
        } else {
            self.scope.resolve_element(value.trim())
        }
    }

    fn leave(&mut self) {
        self.scope.pop();
        self.space.pop();
    }

    /// Moves from an opened start node into its content.
    fn enter(&mut self) -> Result<()> {
        self.reader.advance()
    }

    /// Consumes the end node matching `start`.
    fn close(&mut self, start: &StartTag) -> Result<()> {
        match self.reader.kind() {
            NodeKind::End if self.reader.name() == start.raw => {
                self.leave();
                self.reader.advance()
            }
            NodeKind::End => Err(FormatError::new(FormatErrorKind::EndTagMismatch {
                expected: start.raw.clone(),
                found: self.reader.name().to_string(),
            })
            .with_position(Some(self.reader.position()))
            .into()),
            _ => Err(self.eof()),
        }
    }

    /// Skips an opened element, cursor still on its start node.
    fn skip_opened(&mut self) -> Result<()> {
        self.leave();
        self.reader.skip_subtree()
    }

    fn eof(&self) -> Error {
        FormatError::new(FormatErrorKind::UnexpectedEof)
            .with_position(Some(self.reader.position()))
            .into()
    }

    /// Advances to the next child start node, collecting text on the way.
    /// Returns `false` at the parent's end node.
    fn next_child(&mut self, text: &mut String) -> Result<bool> {
        loop {
            match self.reader.kind() {
                NodeKind::Start => return Ok(true),
                NodeKind::End => return Ok(false),
                NodeKind::Text => {
                    text.push_str(self.reader.text());
                    self.reader.advance()?;
                }
                NodeKind::Other => self.reader.advance()?,
                NodeKind::None => return Err(self.eof()),
            }
        }
    }

    /// Reads text content up to the parent's end node.
    fn read_text(&mut self, owner: &TypeDescriptor) -> Result<String> {
        let mut text = String::new();
        while self.next_child(&mut text)? {
            if self.settings.skip_unknown_elements {
                warn!(tag = self.reader.name(), owner = owner.type_name(), "skipping element inside text content");
                self.reader.skip_subtree()?;
                continue;
            }
            return Err(FormatError::new(FormatErrorKind::UnexpectedElement {
                name: self.reader.name().to_string(),
            })
            .with_type(owner.type_name())
            .with_position(Some(self.reader.position()))
            .into());
        }
        Ok(text)
    }

    fn check_text(&self, text: &str, owner: &TypeDescriptor) -> Result<()> {
        if utils::is_blank(text) {
            return Ok(());
        }
        if self.settings.skip_unknown_elements {
            warn!(owner = owner.type_name(), "ignoring unexpected text");
            return Ok(());
        }
        Err(FormatError::new(FormatErrorKind::UnexpectedText {
            text: text.trim().to_string(),
        })
        .with_type(owner.type_name())
        .with_position(Some(self.reader.position()))
        .into())
    }

    /// Reads an opened element as a value of `declared`; `None` if it is nil.
    fn read_element(
        &mut self,
        start: StartTag,
        declared: &Arc<TypeDescriptor>,
        hint: Option<TypeId>,
    ) -> Result<Option<Box<dyn Any>>> {
        if start.nil {
            self.skip_opened()?;
            return Ok(None);
        }
        let tag = start.raw.clone();
        let position = start.position;
        self.read_typed(start, declared, hint)
            .map(Some)
            .map_err(|e| match e {
                Error::Format(e) => Error::Format(
                    e.with_type(declared.type_name())
                        .with_tag(tag)
                        .with_position(Some(position)),
                ),
                other => other,
            })
    }

    fn read_typed(
        &mut self,
        start: StartTag,
        declared: &Arc<TypeDescriptor>,
        hint: Option<TypeId>,
    ) -> Result<Box<dyn Any>> {
        let concrete = self.concrete(&start, declared, hint)?;
        let value = self.read_body(start, &concrete)?;
        let value = self
            .catalog
            .coerce(value, declared.key().id())
            .map_err(|_| {
                Error::from(FormatErrorKind::TypeMismatch {
                    expected: declared.type_name().to_string(),
                    found: concrete.type_name().to_string(),
                })
            })?;
        if declared.is_shared() {
            self.remember(declared, value.as_ref());
        }
        Ok(value)
    }

    /// Picks the concrete type to build: the `xsi:type` marker first, then
    /// the hint, then the element tag for polymorphic types.
    fn concrete(
        &self,
        start: &StartTag,
        declared: &Arc<TypeDescriptor>,
        hint: Option<TypeId>,
    ) -> Result<Arc<TypeDescriptor>> {
        let declared_id = declared.key().id();
        let mut current = declared.clone();
        if let Some(marker) = &start.marker {
            let found = self
                .catalog
                .resolve_tag(marker)
                .filter(|id| self.catalog.is_assignable(*id, declared_id))
                .and_then(|id| self.catalog.lookup_by_type(id))
                .ok_or_else(|| {
                    Error::from(FormatErrorKind::TypeMismatch {
                        expected: declared.name().to_string(),
                        found: marker.to_string(),
                    })
                })?;
            current = found;
        } else if let Some(found) = hint
            .filter(|id| *id != declared_id)
            .and_then(|id| self.catalog.lookup_by_type(id))
        {
            current = found;
        }

        for _ in 0..32 {
            let by_tag = || {
                self.catalog
                    .resolve_tag(&start.name)
                    .filter(|id| {
                        *id != current.key().id() && self.catalog.is_assignable(*id, current.key().id())
                    })
                    .and_then(|id| self.catalog.lookup_by_type(id))
            };
            let next = match current.shape() {
                Shape::Wrapper => current.wrapped().and_then(|inner| self.catalog.lookup_by_type(inner.id())),
                Shape::Polymorphic => by_tag(),
                _ if !current.subtypes().is_empty() && start.marker.is_none() => match by_tag() {
                    Some(found) => Some(found),
                    None => return Ok(current),
                },
                _ => return Ok(current),
            };
            current = next.ok_or_else(|| {
                Error::from(
                    FormatError::new(FormatErrorKind::NotConstructible).with_type(current.type_name()),
                )
            })?;
        }
        Err(FormatError::new(FormatErrorKind::NotConstructible)
            .with_type(declared.type_name())
            .into())
    }

    fn read_body(&mut self, start: StartTag, descriptor: &Arc<TypeDescriptor>) -> Result<Box<dyn Any>> {
        trace!(type_name = descriptor.type_name(), tag = %start.name, "reading element");

        if let Some(converter) = descriptor.element_converter.clone().filter(|c| c.can_read()) {
            let cx = ConvertContext::new(&self.settings, &self.catalog);
            let value = converter.read(&mut self.reader, &cx)?;
            self.leave();
            return Ok(value);
        }

        if utils::reads_as_text(descriptor) {
            for (name, value) in &start.attributes {
                self.unknown_attribute(descriptor, name, value, start.position)?;
            }
            self.enter()?;
            let text = self.read_text(descriptor)?;
            self.close(&start)?;
            let cx = ConvertContext::new(&self.settings, &self.catalog);
            return utils::parse_text(&cx, None, descriptor, &text)
                .map_err(|e| e.into_format(&text, descriptor.type_name()).into());
        }

        match descriptor.content() {
            ContentMode::Collection(content) => {
                self.enter()?;
                let items = self.read_items(descriptor, None, content)?;
                self.close(&start)?;
                content.ops.build(items).ok_or_else(|| {
                    FormatErrorKind::TypeMismatch {
                        expected: descriptor.type_name().to_string(),
                        found: "a different number of items".to_string(),
                    }
                    .into()
                })
            }
            ContentMode::Dictionary(content) => {
                self.enter()?;
                let entries = self.read_entries(descriptor, None, None, content)?;
                self.close(&start)?;
                content.ops.build(entries).ok_or_else(|| {
                    FormatErrorKind::TypeMismatch {
                        expected: descriptor.type_name().to_string(),
                        found: "unexpected entries".to_string(),
                    }
                    .into()
                })
            }
            _ => {
                let mut value = descriptor
                    .construct()
                    .ok_or(FormatErrorKind::NotConstructible)?;
                self.fill(start, descriptor, value.as_mut())?;
                Ok(value)
            }
        }
    }

    /// Resolves a child of a collection to the type it holds.
    fn resolve_item(
        &self,
        child: &StartTag,
        overrides: Option<&ItemMap>,
        items: &ItemMap,
        item: TypeKey,
    ) -> Option<TypeId> {
        overrides
            .and_then(|map| map.resolve(&child.name))
            .or_else(|| items.resolve(&child.name))
            .or_else(|| {
                self.catalog
                    .resolve_tag(&child.name)
                    .filter(|id| self.catalog.is_assignable(*id, item.id()))
            })
            .or_else(|| child.marker.as_ref().map(|_| item.id()))
    }

    /// Reads collection items up to the parent's end node.
    fn read_items(
        &mut self,
        owner: &TypeDescriptor,
        overrides: Option<&ItemMap>,
        content: &CollectionContent,
    ) -> Result<Vec<Box<dyn Any>>> {
        let item = self.described(content.item)?;
        let mut values = Vec::new();
        let mut text = String::new();
        while self.next_child(&mut text)? {
            let child = self.open()?;
            match self.resolve_item(&child, overrides, &content.items, content.item) {
                Some(hint) => {
                    if let Some(value) = self.read_element(child, &item, Some(hint))? {
                        values.push(value);
                    }
                }
                None => self.unknown_element(owner, child)?,
            }
        }
        self.check_text(&text, owner)?;
        Ok(values)
    }

    /// Reads dictionary entries up to the parent's end node. Each entry is
    /// an element of the value type carrying the key as an attribute.
    fn read_entries(
        &mut self,
        owner: &TypeDescriptor,
        overrides: Option<&ItemMap>,
        key_attribute: Option<&str>,
        content: &DictionaryContent,
    ) -> Result<Vec<(Box<dyn Any>, Box<dyn Any>)>> {
        let key_type = self.described(content.key)?;
        let value_type = self.described(content.value)?;
        let key_name = key_attribute
            .unwrap_or(self.settings.dictionary_key_attribute.as_str())
            .to_string();
        let mut entries = Vec::new();
        let mut text = String::new();
        while self.next_child(&mut text)? {
            let mut child = self.open()?;
            let Some(hint) = self.resolve_item(&child, overrides, &content.items, content.value) else {
                self.unknown_element(owner, child)?;
                continue;
            };
            let position = child.position;
            let index = child
                .attributes
                .iter()
                .position(|(name, _)| name.namespace().is_none() && name.local() == key_name);
            let Some(index) = index else {
                return Err(FormatError::new(FormatErrorKind::InvalidValue {
                    text: String::new(),
                    target: key_type.type_name().to_string(),
                    reason: format!("missing key attribute '{}'", key_name),
                })
                .with_type(owner.type_name())
                .with_tag(child.raw.clone())
                .with_position(Some(position))
                .into());
            };
            let (_, key_text) = child.attributes.remove(index);
            let key = {
                let cx = ConvertContext::new(&self.settings, &self.catalog);
                utils::parse_text(&cx, None, &key_type, &key_text).map_err(|e| {
                    Error::from(
                        e.into_format(&key_text, key_type.type_name())
                            .with_position(Some(position)),
                    )
                })?
            };
            if let Some(value) = self.read_element(child, &value_type, Some(hint))? {
                entries.push((key, value));
            }
        }
        self.check_text(&text, owner)?;
        Ok(entries)
    }

    /// Reads the attributes, children and text of an object element into
    /// `target`, then consumes its end node.
    fn fill(&mut self, start: StartTag, descriptor: &Arc<TypeDescriptor>, target: &mut dyn Any) -> Result<()> {
        let mut seen = HashSet::new();
        for (name, text) in &start.attributes {
            match descriptor.attribute(name) {
                Some(member) => {
                    seen.insert(member.field());
                    self.assign_text(descriptor, member, target, text, start.position)?
                }
                None => self.unknown_attribute(descriptor, name, text, start.position)?,
            }
        }

        // Items of a collection content property appear inline.
        let inline = match descriptor.content().member() {
            Some(member)
                if member.storage() == Storage::Content
                    && member.content() == MemberContent::Collection =>
            {
                Some((member, self.described(member.declared())?))
            }
            _ => None,
        };
        let in_place = match &inline {
            Some((member, collection)) => {
                matches!(collection.content(), ContentMode::Collection(c) if c.ops.fills_in_place())
                    && member.get_mut(&mut *target).is_some()
            }
            None => false,
        };
        let mut buffered = Vec::new();

        self.enter()?;
        let mut text = String::new();
        let mut consumed = false;
        while self.next_child(&mut text)? {
            let child = self.open()?;
            consumed = true;

            if let Some(member) = descriptor
                .element(&child.name)
                .or_else(|| descriptor.attribute(&child.name))
            {
                seen.insert(member.field());
                self.read_member(descriptor, member, target, child)?;
                continue;
            }

            if let Some((member, collection)) = &inline {
                if let ContentMode::Collection(content) = collection.content() {
                    let hint =
                        self.resolve_item(&child, member.item_overrides(), &content.items, content.item);
                    if let Some(hint) = hint {
                        seen.insert(member.field());
                        let item = self.described(content.item)?;
                        if let Some(value) = self.read_element(child, &item, Some(hint))? {
                            if in_place {
                                self.push_item(descriptor, member, content, target, value)?;
                            } else {
                                buffered.push(value);
                            }
                        }
                        continue;
                    }
                }
            }

            if let Some((member, hint)) = self.member_by_type(descriptor, &child) {
                seen.insert(member.field());
                let declared = self.described(member.declared())?;
                if let Some(value) = self.read_element(child, &declared, Some(hint))? {
                    self.set(descriptor, member, target, value)?;
                }
                continue;
            }

            self.unknown_element(descriptor, child)?;
        }

        if let Some((member, collection)) = &inline {
            if !in_place && !buffered.is_empty() {
                if let ContentMode::Collection(content) = collection.content() {
                    let built = content.ops.build(buffered).ok_or_else(|| {
                        Error::from(FormatErrorKind::TypeMismatch {
                            expected: collection.type_name().to_string(),
                            found: "a different number of items".to_string(),
                        })
                    })?;
                    self.set(descriptor, member, target, built)?;
                }
            }
        }

        let significant = if self.preserving() {
            !text.is_empty()
        } else {
            !utils::is_blank(&text)
        };
        if significant {
            match descriptor.content().member() {
                Some(member) if !consumed && self.has_text_form(member) => {
                    seen.insert(member.field());
                    self.assign_text(descriptor, member, target, &text, start.position)?;
                }
                _ => self.check_text(&text, descriptor)?,
            }
        }

        self.apply_defaults(descriptor, target, &seen)?;
        self.close(&start)
    }

    /// Sets members the element left out to their declared defaults.
    fn apply_defaults(
        &self,
        descriptor: &TypeDescriptor,
        target: &mut dyn Any,
        seen: &HashSet<&str>,
    ) -> Result<()> {
        let members = descriptor
            .attributes()
            .iter()
            .chain(descriptor.elements())
            .chain(descriptor.content().member());
        for member in members {
            if seen.contains(member.field()) {
                continue;
            }
            if let Some(value) = member.make_default() {
                self.set(descriptor, member, target, value)?;
            }
        }
        Ok(())
    }

    fn has_text_form(&self, member: &MemberDescriptor) -> bool {
        member.has_converter()
            || member.is_reference()
            || self
                .catalog
                .lookup_by_type(member.declared().id())
                .is_some_and(|declared| utils::has_text_form(&self.catalog, &declared))
    }

    /// An element or content member whose declared type accepts the child's
    /// resolved type.
    fn member_by_type<'d>(
        &self,
        descriptor: &'d TypeDescriptor,
        child: &StartTag,
    ) -> Option<(&'d MemberDescriptor, TypeId)> {
        let id = self
            .catalog
            .resolve_tag(child.marker.as_ref().unwrap_or(&child.name))?;
        descriptor
            .elements()
            .iter()
            .chain(descriptor.content().member())
            .filter(|member| {
                member.content() == MemberContent::None
                    && matches!(member.storage(), Storage::Element | Storage::Content)
            })
            .find(|member| self.catalog.is_assignable(id, member.declared().id()))
            .map(|member| (member, id))
    }

    fn read_member(
        &mut self,
        owner: &TypeDescriptor,
        member: &MemberDescriptor,
        target: &mut dyn Any,
        child: StartTag,
    ) -> Result<()> {
        if child.nil {
            self.skip_opened()?;
            if member.is_nullable() {
                member.set(target, None);
            }
            return Ok(());
        }

        if member.is_reference() && member.content() == MemberContent::Collection {
            return self.read_reference_items(owner, member, target, child);
        }
        if member.is_reference() || member.has_converter() {
            let declared = self.described(member.declared())?;
            let position = child.position;
            self.enter()?;
            let text = self.read_text(&declared)?;
            self.close(&child)?;
            return self.assign_text(owner, member, target, &text, position);
        }

        match member.content() {
            MemberContent::Collection => return self.read_collection_member(owner, member, target, child),
            MemberContent::Dictionary => return self.read_dictionary_member(owner, member, target, child),
            MemberContent::None => {}
        }

        let declared = self.described(member.declared())?;
        match self.read_element(child, &declared, None)? {
            Some(value) => self.set(owner, member, target, value),
            None => {
                if member.is_nullable() {
                    member.set(target, None);
                }
                Ok(())
            }
        }
    }

    /// Fills an existing collection in place when its type allows it;
    /// otherwise builds a new one and assigns it.
    fn read_collection_member(
        &mut self,
        owner: &TypeDescriptor,
        member: &MemberDescriptor,
        target: &mut dyn Any,
        child: StartTag,
    ) -> Result<()> {
        let declared = self.described(member.declared())?;
        let ContentMode::Collection(content) = declared.content() else {
            return Err(FormatError::new(FormatErrorKind::NotConstructible)
                .with_type(declared.type_name())
                .into());
        };
        self.enter()?;
        let items = self.read_items(&declared, member.item_overrides(), content)?;
        self.close(&child)?;
        self.store_items(owner, member, &declared, content, target, items)
    }

    /// Reads a reference collection: each item element holds the identity
    /// key of an instance read earlier. Unresolved keys are skipped.
    fn read_reference_items(
        &mut self,
        owner: &TypeDescriptor,
        member: &MemberDescriptor,
        target: &mut dyn Any,
        child: StartTag,
    ) -> Result<()> {
        let declared = self.described(member.declared())?;
        let ContentMode::Collection(content) = declared.content() else {
            return Err(FormatError::new(FormatErrorKind::NotConstructible)
                .with_type(declared.type_name())
                .into());
        };
        let item = self.described(content.item)?;
        self.enter()?;
        let mut items = Vec::new();
        let mut text = String::new();
        while self.next_child(&mut text)? {
            let entry = self.open()?;
            let position = entry.position;
            self.enter()?;
            let key = self.read_text(&item)?;
            self.close(&entry)?;
            match self.resolve_shared(owner, &item, key.trim(), position)? {
                Some(value) => items.push(value),
                None => warn!(
                    key = key.trim(),
                    member = member.field(),
                    owner = owner.type_name(),
                    "unresolved reference skipped"
                ),
            }
        }
        self.check_text(&text, &declared)?;
        self.close(&child)?;
        self.store_items(owner, member, &declared, content, target, items)
    }

    /// Appends `items` to the member's collection when it fills in place;
    /// otherwise builds a new collection and assigns it.
    fn store_items(
        &self,
        owner: &TypeDescriptor,
        member: &MemberDescriptor,
        declared: &TypeDescriptor,
        content: &CollectionContent,
        target: &mut dyn Any,
        items: Vec<Box<dyn Any>>,
    ) -> Result<()> {
        if content.ops.fills_in_place() && member.get_mut(target).is_some() {
            for item in items {
                self.push_item(owner, member, content, target, item)?;
            }
            return Ok(());
        }
        let built = content.ops.build(items).ok_or_else(|| {
            Error::from(FormatErrorKind::TypeMismatch {
                expected: declared.type_name().to_string(),
                found: "a different number of items".to_string(),
            })
        })?;
        self.set(owner, member, target, built)
    }

    fn push_item(
        &self,
        owner: &TypeDescriptor,
        member: &MemberDescriptor,
        content: &CollectionContent,
        target: &mut dyn Any,
        item: Box<dyn Any>,
    ) -> Result<()> {
        let pushed = member
            .get_mut(target)
            .is_some_and(|collection| content.ops.push(collection, item));
        if pushed {
            Ok(())
        } else {
            Err(FormatError::new(FormatErrorKind::TypeMismatch {
                expected: member.declared().type_name().to_string(),
                found: "item".to_string(),
            })
            .with_type(owner.type_name())
            .into())
        }
    }

    fn read_dictionary_member(
        &mut self,
        owner: &TypeDescriptor,
        member: &MemberDescriptor,
        target: &mut dyn Any,
        child: StartTag,
    ) -> Result<()> {
        let declared = self.described(member.declared())?;
        let ContentMode::Dictionary(content) = declared.content() else {
            return Err(FormatError::new(FormatErrorKind::NotConstructible)
                .with_type(declared.type_name())
                .into());
        };
        self.enter()?;
        let entries = self.read_entries(&declared, member.item_overrides(), member.key_attribute(), content)?;
        self.close(&child)?;

        if content.ops.fills_in_place() {
            if let Some(map) = member.get_mut(target) {
                for (key, value) in entries {
                    if !content.ops.insert(map, key, value) {
                        return Err(FormatError::new(FormatErrorKind::TypeMismatch {
                            expected: declared.type_name().to_string(),
                            found: "entry".to_string(),
                        })
                        .with_type(owner.type_name())
                        .into());
                    }
                }
                return Ok(());
            }
        }
        let built = content.ops.build(entries).ok_or_else(|| {
            Error::from(FormatErrorKind::TypeMismatch {
                expected: declared.type_name().to_string(),
                found: "unexpected entries".to_string(),
            })
        })?;
        self.set(owner, member, target, built)
    }

    fn set(
        &self,
        owner: &TypeDescriptor,
        member: &MemberDescriptor,
        target: &mut dyn Any,
        value: Box<dyn Any>,
    ) -> Result<()> {
        if member.set(target, Some(value)) {
            Ok(())
        } else {
            Err(FormatError::new(FormatErrorKind::TypeMismatch {
                expected: member.declared().type_name().to_string(),
                found: "value of another type".to_string(),
            })
            .with_type(owner.type_name())
            .with_tag(member.tag().to_string())
            .into())
        }
    }

    /// Assigns a member from its text form: a reference key or a converted
    /// value.
    fn assign_text(
        &mut self,
        owner: &TypeDescriptor,
        member: &MemberDescriptor,
        target: &mut dyn Any,
        text: &str,
        position: Position,
    ) -> Result<()> {
        let declared = self.described(member.declared())?;
        if member.is_reference() {
            let key = text.trim();
            return match self.resolve_shared(owner, &declared, key, position)? {
                Some(value) => self.set(owner, member, target, value),
                None => {
                    warn!(key, member = member.field(), owner = owner.type_name(), "unresolved reference left unset");
                    Ok(())
                }
            };
        }

        let value = {
            let cx = ConvertContext::new(&self.settings, &self.catalog);
            utils::parse_text(&cx, member.converter.as_ref(), &declared, text).map_err(|e| {
                Error::from(
                    e.into_format(text, declared.type_name())
                        .with_type(owner.type_name())
                        .with_tag(member.tag().to_string())
                        .with_position(Some(position)),
                )
            })?
        };
        self.set(owner, member, target, value)
    }

    /// The instance remembered under `key` for `declared`; `None` if no such
    /// instance has been read yet.
    fn resolve_shared(
        &self,
        owner: &TypeDescriptor,
        declared: &TypeDescriptor,
        key: &str,
        position: Position,
    ) -> Result<Option<Box<dyn Any>>> {
        let Some(shared) = self.tracker.resolve(declared.key().id(), key) else {
            return Ok(None);
        };
        match declared.shared.as_ref().and_then(|ops| (ops.restore)(shared)) {
            Some(value) => Ok(Some(value)),
            None => Err(FormatError::new(FormatErrorKind::TypeMismatch {
                expected: declared.type_name().to_string(),
                found: "shared instance of another type".to_string(),
            })
            .with_type(owner.type_name())
            .with_position(Some(position))
            .into()),
        }
    }

    /// Records a freshly read shared value under its identity key.
    fn remember(&mut self, declared: &Arc<TypeDescriptor>, value: &dyn Any) {
        let Some(ops) = declared.shared.as_ref() else {
            return;
        };
        let key = {
            let cx = ConvertContext::new(&self.settings, &self.catalog);
            utils::runtime(&self.catalog, declared, value)
                .and_then(|(runtime, inner, _)| utils::identity_key(&cx, &runtime, inner))
        };
        let (Some(key), Some(instance)) = (key, (ops.share)(value)) else {
            return;
        };
        if self
            .tracker
            .remember(declared.key().id(), key.clone(), instance)
            .is_some()
        {
            debug!(key = %key, "shared instance replaced an earlier one with the same key");
        }
    }

    fn unknown_attribute(
        &mut self,
        owner: &TypeDescriptor,
        name: &QName,
        value: &str,
        position: Position,
    ) -> Result<()> {
        match self.on_unknown.as_mut() {
            Some(hook) => {
                hook(&UnknownNode {
                    kind: UnknownKind::Attribute,
                    name: name.clone(),
                    owner: owner.type_name(),
                    value: Some(value.to_string()),
                    position,
                });
                Ok(())
            }
            None => Err(FormatError::new(FormatErrorKind::UnknownAttribute {
                name: name.to_string(),
            })
            .with_type(owner.type_name())
            .with_position(Some(position))
            .into()),
        }
    }

    fn unknown_element(&mut self, owner: &TypeDescriptor, child: StartTag) -> Result<()> {
        if let Some(hook) = self.on_unknown.as_mut() {
            hook(&UnknownNode {
                kind: UnknownKind::Element,
                name: child.name.clone(),
                owner: owner.type_name(),
                value: None,
                position: child.position,
            });
            return self.skip_opened();
        }
        if self.settings.skip_unknown_elements {
            warn!(tag = %child.name, owner = owner.type_name(), "skipping unknown element");
            return self.skip_opened();
        }
        Err(FormatError::new(FormatErrorKind::UnknownElement {
            name: child.name.to_string(),
        })
        .with_type(owner.type_name())
        .with_tag(child.raw)
        .with_position(Some(child.position))
        .into())
    }
}
