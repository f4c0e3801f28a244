//! Cached serialization schemas for types and their members.
//!
//! A [`TypeDescriptor`] is built once per type by the registry and never
//! changes afterwards. Member access is type-erased: accessors take and return
//! `&dyn Any`, so the engines can walk any registered type without generics.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::ops::{CollectionOps, DictionaryOps};
use super::session::Session;
use crate::convert::{ElementConverter, TextConverter};
use crate::error::ConfigError;
use crate::namespace::QName;

pub(crate) type Getter = Arc<dyn Fn(&dyn Any) -> Option<&dyn Any> + Send + Sync>;
pub(crate) type GetterMut = Arc<dyn Fn(&mut dyn Any) -> Option<&mut dyn Any> + Send + Sync>;
pub(crate) type Setter = Arc<dyn Fn(&mut dyn Any, Option<Box<dyn Any>>) -> bool + Send + Sync>;
pub(crate) type Constructor = Arc<dyn Fn() -> Box<dyn Any> + Send + Sync>;
pub(crate) type Wrap = Arc<dyn Fn(Box<dyn Any>) -> Result<Box<dyn Any>, Box<dyn Any>> + Send + Sync>;
pub(crate) type Share = Arc<dyn Fn(&dyn Any) -> Option<Arc<dyn Any + Send + Sync>> + Send + Sync>;
pub(crate) type Restore = Arc<dyn Fn(Arc<dyn Any + Send + Sync>) -> Option<Box<dyn Any>> + Send + Sync>;

pub(crate) fn getter<F>(f: F) -> Getter
where
    F: Fn(&dyn Any) -> Option<&dyn Any> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub(crate) fn getter_mut<F>(f: F) -> GetterMut
where
    F: Fn(&mut dyn Any) -> Option<&mut dyn Any> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub(crate) fn setter<F>(f: F) -> Setter
where
    F: Fn(&mut dyn Any, Option<Box<dyn Any>>) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Identity of a registrable type.
///
/// Besides the `TypeId`, a key carries the type's name and the function that
/// registers it, so descriptors can register the types they mention.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    type_name: &'static str,
    pub(crate) register: fn(&mut Session) -> Result<(), ConfigError>,
}

impl TypeKey {
    pub fn of<T: super::XmlType>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            register: Session::register::<T>,
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

/// Structural category of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Converted to and from text as a whole.
    Scalar,
    /// Constructed, then filled member by member.
    Object,
    Collection,
    Dictionary,
    /// A closed set of known subtypes; values are viewed as the concrete subtype.
    Polymorphic,
    /// A transparent box around one inner type.
    Wrapper,
}

/// Where a member lives in markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Attribute,
    Element,
    /// The single member standing for the element's whole child content.
    Content,
    /// The single member standing for the element's inner text.
    Text,
}

/// Nested content a member carries when its value is collection- or
/// dictionary-shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberContent {
    None,
    Collection,
    Dictionary,
}

/// Item tags a collection or dictionary accepts, in priority order.
#[derive(Debug, Clone, Default)]
pub struct ItemMap {
    entries: Vec<(QName, TypeId)>,
}

impl ItemMap {
    pub(crate) fn with_entry(tag: QName, id: TypeId) -> Self {
        let mut map = Self::default();
        map.insert(tag, id);
        map
    }

    /// Adds `tag`; an already-mapped tag keeps its first type.
    pub(crate) fn insert(&mut self, tag: QName, id: TypeId) {
        if !self.entries.iter().any(|(t, _)| *t == tag) {
            self.entries.push((tag, id));
        }
    }

    /// Resolves by qualified name, then by local name.
    pub fn resolve(&self, tag: &QName) -> Option<TypeId> {
        self.entries
            .iter()
            .find(|(t, _)| t == tag)
            .or_else(|| self.entries.iter().find(|(t, _)| t.local() == tag.local()))
            .map(|(_, id)| *id)
    }

    /// The tag items of type `id` are written with.
    pub fn tag_for(&self, id: TypeId) -> Option<&QName> {
        self.entries
            .iter()
            .find(|(_, candidate)| *candidate == id)
            .map(|(tag, _)| tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = &QName> {
        self.entries.iter().map(|(tag, _)| tag)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Item schema of a collection type.
#[derive(Clone)]
pub struct CollectionContent {
    pub(crate) item: TypeKey,
    pub(crate) items: ItemMap,
    pub(crate) ops: Arc<dyn CollectionOps>,
}

impl CollectionContent {
    pub fn item(&self) -> TypeKey {
        self.item
    }

    pub fn items(&self) -> &ItemMap {
        &self.items
    }
}

/// Entry schema of a dictionary type.
#[derive(Clone)]
pub struct DictionaryContent {
    pub(crate) key: TypeKey,
    pub(crate) value: TypeKey,
    pub(crate) items: ItemMap,
    pub(crate) ops: Arc<dyn DictionaryOps>,
}

impl DictionaryContent {
    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn value(&self) -> TypeKey {
        self.value
    }

    pub fn items(&self) -> &ItemMap {
        &self.items
    }
}

/// How an element's children and text map onto the value.
#[derive(Clone)]
pub enum ContentMode {
    /// Children are element members.
    None,
    /// One member stands for the whole child content.
    Property(Box<MemberDescriptor>),
    /// One member stands for the inner text.
    Text(Box<MemberDescriptor>),
    Collection(CollectionContent),
    Dictionary(DictionaryContent),
}

impl ContentMode {
    pub fn member(&self) -> Option<&MemberDescriptor> {
        match self {
            ContentMode::Property(m) | ContentMode::Text(m) => Some(m),
            _ => None,
        }
    }
}

/// A declared member default: the value itself, and a test for it.
#[derive(Clone)]
pub(crate) struct DefaultValue {
    pub(crate) matches: Arc<dyn Fn(&dyn Any) -> bool + Send + Sync>,
    pub(crate) make: Constructor,
}

#[derive(Clone)]
pub(crate) struct Access {
    pub(crate) get: Getter,
    pub(crate) get_mut: GetterMut,
    pub(crate) set: Setter,
}

/// One serializable member of a type.
#[derive(Clone)]
pub struct MemberDescriptor {
    pub(crate) field: String,
    pub(crate) tag: QName,
    pub(crate) order: usize,
    pub(crate) storage: Storage,
    pub(crate) content: MemberContent,
    pub(crate) declared: TypeKey,
    pub(crate) nullable: bool,
    pub(crate) reference: bool,
    pub(crate) default: Option<DefaultValue>,
    pub(crate) converter: Option<Arc<dyn TextConverter>>,
    pub(crate) items: Option<ItemMap>,
    pub(crate) key_attribute: Option<String>,
    pub(crate) access: Access,
}

impl MemberDescriptor {
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn tag(&self) -> &QName {
        &self.tag
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn storage(&self) -> Storage {
        self.storage
    }

    pub fn content(&self) -> MemberContent {
        self.content
    }

    pub fn declared(&self) -> TypeKey {
        self.declared
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_reference(&self) -> bool {
        self.reference
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub fn has_converter(&self) -> bool {
        self.converter.is_some()
    }

    /// Item tag overrides for collection- or dictionary-shaped values.
    pub fn item_overrides(&self) -> Option<&ItemMap> {
        self.items.as_ref()
    }

    pub fn key_attribute(&self) -> Option<&str> {
        self.key_attribute.as_deref()
    }

    /// Reads the member from `owner`; `None` when absent.
    pub(crate) fn get<'a>(&self, owner: &'a dyn Any) -> Option<&'a dyn Any> {
        (self.access.get)(owner)
    }

    pub(crate) fn get_mut<'a>(&self, owner: &'a mut dyn Any) -> Option<&'a mut dyn Any> {
        (self.access.get_mut)(owner)
    }

    /// Assigns the member; `None` clears a nullable member.
    pub(crate) fn set(&self, owner: &mut dyn Any, value: Option<Box<dyn Any>>) -> bool {
        (self.access.set)(owner, value)
    }

    pub(crate) fn is_default(&self, value: &dyn Any) -> bool {
        self.default.as_ref().is_some_and(|default| (default.matches)(value))
    }

    /// A fresh copy of the declared default.
    pub(crate) fn make_default(&self) -> Option<Box<dyn Any>> {
        self.default.as_ref().map(|default| (default.make)())
    }
}

impl fmt::Debug for MemberDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberDescriptor")
            .field("field", &self.field)
            .field("tag", &self.tag)
            .field("storage", &self.storage)
            .field("content", &self.content)
            .field("declared", &self.declared)
            .field("nullable", &self.nullable)
            .field("reference", &self.reference)
            .finish()
    }
}

/// A known substitute for a polymorphic type.
#[derive(Clone)]
pub struct KnownSubtype {
    pub(crate) key: TypeKey,
    pub(crate) wrap: Wrap,
}

impl KnownSubtype {
    pub fn key(&self) -> TypeKey {
        self.key
    }
}

#[derive(Clone)]
pub(crate) struct WrapperOps {
    pub(crate) inner: TypeKey,
    pub(crate) wrap: Wrap,
}

/// Conversions between an `Arc<T>` value and the tracker's shared form.
#[derive(Clone)]
pub(crate) struct SharedOps {
    pub(crate) share: Share,
    pub(crate) restore: Restore,
}

/// The serialization schema of one type.
pub struct TypeDescriptor {
    pub(crate) key: TypeKey,
    pub(crate) name: QName,
    pub(crate) prefix: Option<String>,
    pub(crate) shape: Shape,
    pub(crate) textual: bool,
    pub(crate) constructor: Option<Constructor>,
    pub(crate) content: ContentMode,
    pub(crate) attributes: Vec<MemberDescriptor>,
    pub(crate) elements: Vec<MemberDescriptor>,
    pub(crate) converter: Option<Arc<dyn TextConverter>>,
    pub(crate) element_converter: Option<Arc<dyn ElementConverter>>,
    pub(crate) subtypes: Vec<KnownSubtype>,
    pub(crate) view: Option<Getter>,
    pub(crate) wrapper: Option<WrapperOps>,
    pub(crate) shared: Option<SharedOps>,
    pub(crate) identity: Vec<MemberDescriptor>,
    pub(crate) sealed: bool,
    pub(crate) ignored: bool,
}

impl TypeDescriptor {
    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn type_name(&self) -> &'static str {
        self.key.type_name()
    }

    /// Canonical tag.
    pub fn name(&self) -> &QName {
        &self.name
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Whether values have a text form, directly or through a wrapper.
    pub fn is_textual(&self) -> bool {
        self.textual
    }

    pub fn has_constructor(&self) -> bool {
        self.constructor.is_some()
    }

    pub fn content(&self) -> &ContentMode {
        &self.content
    }

    /// Attribute members, in serialization order.
    pub fn attributes(&self) -> &[MemberDescriptor] {
        &self.attributes
    }

    /// Element members, in serialization order.
    pub fn elements(&self) -> &[MemberDescriptor] {
        &self.elements
    }

    pub fn converter(&self) -> Option<&Arc<dyn TextConverter>> {
        self.converter.as_ref()
    }

    pub fn has_element_converter(&self) -> bool {
        self.element_converter.is_some()
    }

    pub fn subtypes(&self) -> &[KnownSubtype] {
        &self.subtypes
    }

    /// Inner type of a wrapper.
    pub fn wrapped(&self) -> Option<TypeKey> {
        self.wrapper.as_ref().map(|w| w.inner)
    }

    pub fn is_shared(&self) -> bool {
        self.shared.is_some()
    }

    /// Members whose values form the identity key.
    pub fn identity(&self) -> &[MemberDescriptor] {
        &self.identity
    }

    /// Whether writes never need a type marker for this declared type.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    /// Looks up an attribute member by tag, then by local name.
    pub fn attribute(&self, tag: &QName) -> Option<&MemberDescriptor> {
        find_member(&self.attributes, tag)
    }

    /// Looks up an element member by tag, then by local name.
    pub fn element(&self, tag: &QName) -> Option<&MemberDescriptor> {
        find_member(&self.elements, tag)
    }

    /// Looks up any member by its field name.
    pub fn member(&self, field: &str) -> Option<&MemberDescriptor> {
        self.attributes
            .iter()
            .chain(self.elements.iter())
            .chain(self.content.member())
            .find(|m| m.field == field)
    }

    pub(crate) fn construct(&self) -> Option<Box<dyn Any>> {
        self.constructor.as_ref().map(|construct| construct())
    }

    /// Views a value of this type as its concrete inner value.
    pub(crate) fn view<'a>(&self, value: &'a dyn Any) -> Option<&'a dyn Any> {
        self.view.as_ref().and_then(|view| view(value))
    }
}

fn find_member<'a>(members: &'a [MemberDescriptor], tag: &QName) -> Option<&'a MemberDescriptor> {
    members
        .iter()
        .find(|m| m.tag == *tag)
        .or_else(|| members.iter().find(|m| m.tag.local() == tag.local()))
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("type", &self.key)
            .field("name", &self.name)
            .field("shape", &self.shape)
            .field("attributes", &self.attributes)
            .field("elements", &self.elements)
            .field("subtypes", &self.subtypes.len())
            .field("sealed", &self.sealed)
            .finish()
    }
}
