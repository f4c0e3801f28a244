//! The type metadata registry.
//!
//! Types describe themselves once through [`XmlType::describe`]; the registry
//! classifies the declarations, validates them and caches the resulting
//! [`TypeDescriptor`] for the life of the registry.
//!
//! Readers work on an immutable [`Catalog`] snapshot and never lock.
//! Registration runs under a single writer lock: it clones the current
//! snapshot, registers the requested type together with every type it
//! mentions, and publishes the new snapshot only if all of them succeed.

mod builder;
mod builtin;
mod descriptor;
mod naming;
pub mod ops;
mod rules;
mod session;

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::debug;

pub use builder::{MemberBuilder, Subtypes, TypeBuilder};
pub use descriptor::{
    CollectionContent, ContentMode, DictionaryContent, ItemMap, KnownSubtype, MemberContent,
    MemberDescriptor, Shape, Storage, TypeDescriptor, TypeKey,
};

use crate::convert::{self, TextConverter};
use crate::error::ConfigError;
use crate::namespace::{self, NamespaceTable, QName};
use session::Session;

/// A type that can be read from and written to markup.
///
/// Usually derived with `#[derive(XmlType)]`; hand-written impls record the
/// same declarations on the [`TypeBuilder`].
pub trait XmlType: Any + Sized {
    fn describe(ty: &mut TypeBuilder<Self>);
}

/// Default storage of scalar members that carry no storage marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemberPolicy {
    #[default]
    Attributes,
    Elements,
}

/// An immutable snapshot of everything registered so far.
#[derive(Clone)]
pub struct Catalog {
    pub(crate) types: HashMap<TypeId, Arc<TypeDescriptor>>,
    pub(crate) tags: HashMap<QName, TypeId>,
    pub(crate) locals: HashMap<String, TypeId>,
    pub(crate) namespaces: NamespaceTable,
    pub(crate) converters: HashMap<String, Arc<dyn TextConverter>>,
    pub(crate) policy: MemberPolicy,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::with_policy(MemberPolicy::default())
    }
}

impl Catalog {
    fn with_policy(policy: MemberPolicy) -> Self {
        Self {
            types: HashMap::new(),
            tags: HashMap::new(),
            locals: HashMap::new(),
            namespaces: NamespaceTable::new(),
            converters: convert::builtin_named(),
            policy,
        }
    }

    pub fn lookup_by_type(&self, id: TypeId) -> Option<Arc<TypeDescriptor>> {
        self.types.get(&id).cloned()
    }

    /// Resolves a tag: exact name, then the namespace widened segment by
    /// segment, then without namespace, then by local name alone.
    pub fn lookup_by_tag(&self, tag: &QName) -> Option<Arc<TypeDescriptor>> {
        self.resolve_tag(tag).and_then(|id| self.lookup_by_type(id))
    }

    pub(crate) fn resolve_tag(&self, tag: &QName) -> Option<TypeId> {
        if let Some(id) = self.tags.get(tag) {
            return Some(*id);
        }
        if let Some(ns) = tag.namespace() {
            for wider in namespace::widen(ns) {
                let candidate = QName::with_namespace(Some(wider), tag.local());
                if let Some(id) = self.tags.get(&candidate) {
                    return Some(*id);
                }
            }
            if let Some(id) = self.tags.get(&tag.unqualified()) {
                return Some(*id);
            }
        }
        self.locals.get(tag.local()).copied()
    }

    pub fn namespaces(&self) -> &NamespaceTable {
        &self.namespaces
    }

    pub fn converter(&self, name: &str) -> Option<&Arc<dyn TextConverter>> {
        self.converters.get(name)
    }

    pub fn policy(&self) -> MemberPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Converts `value` into a value of type `target`, wrapping it into
    /// wrappers and polymorphic types that accept it. Hands the value back
    /// unchanged when no conversion applies.
    pub(crate) fn coerce(
        &self,
        value: Box<dyn Any>,
        target: TypeId,
    ) -> Result<Box<dyn Any>, Box<dyn Any>> {
        let mut visiting = Vec::new();
        self.coerce_into(value, target, &mut visiting)
    }

    fn coerce_into(
        &self,
        value: Box<dyn Any>,
        target: TypeId,
        visiting: &mut Vec<TypeId>,
    ) -> Result<Box<dyn Any>, Box<dyn Any>> {
        if (*value).type_id() == target {
            return Ok(value);
        }
        let Some(descriptor) = self.types.get(&target) else {
            return Err(value);
        };
        if visiting.contains(&target) {
            return Err(value);
        }
        visiting.push(target);
        let mut value = value;
        if let Some(wrapper) = &descriptor.wrapper {
            match self.coerce_into(value, wrapper.inner.id(), visiting) {
                Ok(inner) => {
                    visiting.pop();
                    return (wrapper.wrap)(inner);
                }
                Err(unchanged) => value = unchanged,
            }
        }
        for subtype in &descriptor.subtypes {
            match self.coerce_into(value, subtype.key.id(), visiting) {
                Ok(inner) => {
                    visiting.pop();
                    return (subtype.wrap)(inner);
                }
                Err(unchanged) => value = unchanged,
            }
        }
        visiting.pop();
        Err(value)
    }

    /// Whether values of type `from` can be read where `to` is declared.
    pub fn is_assignable(&self, from: TypeId, to: TypeId) -> bool {
        let mut visiting = Vec::new();
        self.assignable(from, to, &mut visiting)
    }

    fn assignable(&self, from: TypeId, to: TypeId, visiting: &mut Vec<TypeId>) -> bool {
        if from == to {
            return true;
        }
        let Some(descriptor) = self.types.get(&to) else {
            return false;
        };
        if visiting.contains(&to) {
            return false;
        }
        visiting.push(to);
        let found = descriptor
            .wrapper
            .as_ref()
            .is_some_and(|w| self.assignable(from, w.inner.id(), visiting))
            || descriptor
                .subtypes
                .iter()
                .any(|s| self.assignable(from, s.key.id(), visiting));
        visiting.pop();
        found
    }
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("types", &self.types.len())
            .field("tags", &self.tags.len())
            .field("converters", &self.converters.len())
            .field("policy", &self.policy)
            .finish()
    }
}

static GLOBAL: Lazy<Registry> = Lazy::new(Registry::new);

/// Builds and caches type descriptors.
///
/// Registration is idempotent: registering a known type returns the cached
/// descriptor, and concurrent first registrations of the same type produce
/// one descriptor.
pub struct Registry {
    catalog: ArcSwap<Catalog>,
    write_lock: Mutex<()>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// The process-wide registry used by the top-level functions.
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    pub fn new() -> Self {
        Self::with_policy(MemberPolicy::default())
    }

    pub fn with_policy(policy: MemberPolicy) -> Self {
        Self {
            catalog: ArcSwap::from_pointee(Catalog::with_policy(policy)),
            write_lock: Mutex::new(()),
        }
    }

    pub fn policy(&self) -> MemberPolicy {
        self.catalog.load().policy
    }

    /// Makes `converter` available to annotations under `name`.
    ///
    /// Types registered before the call keep the converters they resolved.
    pub fn add_converter(&self, name: &str, converter: Arc<dyn TextConverter>) {
        let _guard = self.write_lock.lock();
        let mut next = Catalog::clone(&self.catalog.load());
        next.converters.insert(name.to_string(), converter);
        self.catalog.store(Arc::new(next));
        debug!(converter = name, "added named converter");
    }

    pub fn register<T: XmlType>(&self) -> Result<Arc<TypeDescriptor>, ConfigError> {
        self.register_key(TypeKey::of::<T>())
    }

    /// Registers the type behind `key` and every type it mentions.
    pub fn register_key(&self, key: TypeKey) -> Result<Arc<TypeDescriptor>, ConfigError> {
        if let Some(descriptor) = self.lookup_by_type(key.id()) {
            return Ok(descriptor);
        }
        let _guard = self.write_lock.lock();
        let current = self.catalog.load_full();
        if let Some(descriptor) = current.lookup_by_type(key.id()) {
            return Ok(descriptor);
        }

        let mut session = Session::new(Catalog::clone(&current));
        (key.register)(&mut session)?;
        let (catalog, added) = session.finish();
        let descriptor =
            catalog
                .lookup_by_type(key.id())
                .ok_or_else(|| ConfigError::Unregistered {
                    type_name: key.type_name().to_string(),
                })?;
        self.catalog.store(Arc::new(catalog));
        debug!(
            type_name = key.type_name(),
            registered = added.len(),
            "published registry snapshot"
        );
        Ok(descriptor)
    }

    pub fn lookup<T: Any>(&self) -> Option<Arc<TypeDescriptor>> {
        self.lookup_by_type(TypeId::of::<T>())
    }

    pub fn lookup_by_type(&self, id: TypeId) -> Option<Arc<TypeDescriptor>> {
        self.catalog.load().lookup_by_type(id)
    }

    pub fn lookup_by_tag(&self, tag: &QName) -> Option<Arc<TypeDescriptor>> {
        self.catalog.load().lookup_by_tag(tag)
    }

    /// The current snapshot.
    pub fn catalog(&self) -> Arc<Catalog> {
        self.catalog.load_full()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("catalog", &*self.catalog.load())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    impl XmlType for Point {
        fn describe(ty: &mut TypeBuilder<Self>) {
            ty.default_constructor().namespace("http://acme.org/geo/v2");
            ty.field("x", |p| &p.x, |p| &mut p.x).rename("X");
            ty.field("y", |p| &p.y, |p| &mut p.y).rename("Y");
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Figure {
        Point(Point),
    }

    impl XmlType for Figure {
        fn describe(ty: &mut TypeBuilder<Self>) {
            ty.subtype(Figure::Point).view(|f| match f {
                Figure::Point(p) => p as &dyn Any,
            });
        }
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = Registry::new();
        let first = registry.register::<Point>().unwrap();
        let second = registry.register::<Point>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &registry.lookup::<Point>().unwrap()));
    }

    #[test]
    fn test_registration_publishes_mentioned_types() {
        let registry = Registry::new();
        registry.register::<Vec<Point>>().unwrap();
        assert!(registry.lookup::<Point>().is_some());
        assert!(registry.lookup::<i32>().is_some());
        assert_eq!(
            registry.lookup::<Vec<Point>>().unwrap().name().local(),
            "Points"
        );
    }

    #[test]
    fn test_tag_lookup_widens_namespaces() {
        let registry = Registry::new();
        registry.register::<Point>().unwrap();
        let exact = QName::with_namespace(Some("http://acme.org/geo/v2"), "Point");
        let narrower = QName::with_namespace(Some("http://acme.org/geo/v2/extra"), "Point");
        let foreign = QName::with_namespace(Some("urn:other"), "Point");
        for tag in [&exact, &narrower, &foreign, &QName::new("Point")] {
            let found = registry.lookup_by_tag(tag).unwrap();
            assert_eq!(found.key().id(), TypeId::of::<Point>(), "{}", tag);
        }
        assert!(registry.lookup_by_tag(&QName::new("Missing")).is_none());
    }

    #[test]
    fn test_coerce_into_polymorphic_type() {
        let registry = Registry::new();
        registry.register::<Figure>().unwrap();
        let catalog = registry.catalog();

        let point: Box<dyn Any> = Box::new(Point { x: 1, y: 2 });
        let figure = catalog.coerce(point, TypeId::of::<Figure>()).unwrap();
        assert_eq!(
            figure.downcast_ref::<Figure>(),
            Some(&Figure::Point(Point { x: 1, y: 2 }))
        );
        assert!(catalog.is_assignable(TypeId::of::<Point>(), TypeId::of::<Figure>()));
        assert!(!catalog.is_assignable(TypeId::of::<i32>(), TypeId::of::<Figure>()));

        let text: Box<dyn Any> = Box::new("x".to_string());
        let unchanged = catalog.coerce(text, TypeId::of::<Figure>()).unwrap_err();
        assert_eq!(unchanged.downcast_ref::<String>().map(String::as_str), Some("x"));
    }

    #[test]
    fn test_coerce_through_wrappers() {
        let registry = Registry::new();
        registry.register::<Box<Figure>>().unwrap();
        let catalog = registry.catalog();
        let boxed = catalog
            .coerce(Box::new(Point::default()), TypeId::of::<Box<Figure>>())
            .unwrap();
        assert!(boxed.downcast_ref::<Box<Figure>>().is_some());
    }

    #[test]
    fn test_policy_switch() {
        let registry = Registry::with_policy(MemberPolicy::Elements);
        let point = registry.register::<Point>().unwrap();
        assert!(point.attributes().is_empty());
        assert_eq!(point.elements().len(), 2);

        let registry = Registry::new();
        let point = registry.register::<Point>().unwrap();
        assert_eq!(point.attributes().len(), 2);
    }
}
