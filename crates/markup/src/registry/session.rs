//! One registration critical section.
//!
//! A session works on a private copy of the catalog. Types reachable from the
//! requested type are registered depth-first; a type whose registration is in
//! progress already exposes its tag and shape, so recursive types terminate.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};

use super::builder::{ConverterRef, MemberDecl, ShapeDecl, TypeBuilder, TypeDecl};
use super::descriptor::{
    CollectionContent, ContentMode, DictionaryContent, ItemMap, MemberContent, MemberDescriptor,
    Shape, Storage, TypeDescriptor, TypeKey, WrapperOps,
};
use super::naming;
use super::rules::{self, Classification, MemberFacts};
use super::{Catalog, XmlType};
use crate::convert::TextConverter;
use crate::error::ConfigError;
use crate::namespace::QName;

/// What classification needs to know about a type, registered or pending.
#[derive(Debug, Clone)]
struct Facts {
    name: QName,
    shape: Shape,
    textual: bool,
    shared: bool,
    ignored: bool,
    /// Collection item or dictionary value type.
    item: Option<TypeId>,
}

impl Facts {
    fn of(descriptor: &TypeDescriptor) -> Self {
        let item = match &descriptor.content {
            ContentMode::Collection(c) => Some(c.item.id()),
            ContentMode::Dictionary(d) => Some(d.value.id()),
            _ => None,
        };
        Self {
            name: descriptor.name.clone(),
            shape: descriptor.shape,
            textual: descriptor.textual,
            shared: descriptor.shared.is_some(),
            ignored: descriptor.ignored,
            item,
        }
    }
}

/// Members sorted into their storage.
#[derive(Default)]
struct Classified {
    attributes: Vec<MemberDescriptor>,
    elements: Vec<MemberDescriptor>,
    contents: Vec<MemberDescriptor>,
    texts: Vec<MemberDescriptor>,
}

pub(crate) struct Session {
    catalog: Catalog,
    pending: HashMap<TypeId, Facts>,
    added: Vec<TypeId>,
}

impl Session {
    pub(crate) fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            pending: HashMap::new(),
            added: Vec::new(),
        }
    }

    /// Registers `T` unless it is known or already in progress.
    pub(crate) fn register<T: XmlType>(&mut self) -> Result<(), ConfigError> {
        let id = TypeId::of::<T>();
        if self.catalog.types.contains_key(&id) || self.pending.contains_key(&id) {
            return Ok(());
        }
        let mut builder = TypeBuilder::<T>::new();
        T::describe(&mut builder);
        self.build(TypeKey::of::<T>(), builder.into_decl())
    }

    /// The updated catalog and the types this session added, in completion
    /// order.
    pub(crate) fn finish(self) -> (Catalog, Vec<TypeId>) {
        (self.catalog, self.added)
    }

    fn facts(&self, key: TypeKey) -> Result<Facts, ConfigError> {
        if let Some(facts) = self.pending.get(&key.id()) {
            return Ok(facts.clone());
        }
        self.catalog
            .types
            .get(&key.id())
            .map(|descriptor| Facts::of(descriptor))
            .ok_or_else(|| ConfigError::Unregistered {
                type_name: key.type_name().to_string(),
            })
    }

    fn is_shared(&self, id: TypeId) -> bool {
        match self.pending.get(&id) {
            Some(facts) => facts.shared,
            None => self
                .catalog
                .types
                .get(&id)
                .is_some_and(|descriptor| descriptor.shared.is_some()),
        }
    }

    fn build(&mut self, key: TypeKey, mut decl: TypeDecl) -> Result<(), ConfigError> {
        let type_name = key.type_name();
        for generic in &decl.generics {
            (generic.register)(self)?;
        }
        match &decl.shape {
            ShapeDecl::Object => {}
            ShapeDecl::Collection { item, .. } => (item.register)(self)?,
            ShapeDecl::Dictionary { key, value, .. } => {
                (key.register)(self)?;
                (value.register)(self)?;
            }
            ShapeDecl::Wrapper { inner, .. } => (inner.register)(self)?,
        }

        let converter = match decl.converter.take() {
            Some(converter) => Some(self.resolve_converter(type_name, converter)?),
            None => None,
        };
        let has_members = !decl.members.is_empty() || !decl.base_members.is_empty();
        let (shape, textual, item) = match &decl.shape {
            ShapeDecl::Collection { item, .. } => {
                (Shape::Collection, converter.is_some(), Some(item.id()))
            }
            ShapeDecl::Dictionary { value, .. } => {
                (Shape::Dictionary, converter.is_some(), Some(value.id()))
            }
            ShapeDecl::Wrapper { inner, .. } => {
                let inner = self.facts(*inner)?;
                (Shape::Wrapper, inner.textual || converter.is_some(), None)
            }
            ShapeDecl::Object
                if !decl.subtypes.is_empty() && decl.constructor.is_none() && !has_members =>
            {
                (Shape::Polymorphic, converter.is_some(), None)
            }
            ShapeDecl::Object if converter.is_some() && !has_members => (Shape::Scalar, true, None),
            ShapeDecl::Object => (Shape::Object, converter.is_some(), None),
        };
        let name = self.tag_for(key, &decl)?;

        self.pending.insert(
            key.id(),
            Facts {
                name: name.clone(),
                shape,
                textual,
                shared: decl.shared.is_some(),
                ignored: decl.ignored,
                item,
            },
        );
        let descriptor = self.complete(key, decl, name, shape, textual, converter)?;
        self.pending.remove(&key.id());

        debug!(
            type_name,
            tag = %descriptor.name,
            shape = ?descriptor.shape,
            attributes = descriptor.attributes.len(),
            elements = descriptor.elements.len(),
            "registered type"
        );
        self.index(&descriptor);
        self.catalog.types.insert(key.id(), Arc::new(descriptor));
        self.added.push(key.id());
        Ok(())
    }

    fn tag_for(&self, key: TypeKey, decl: &TypeDecl) -> Result<QName, ConfigError> {
        if let ShapeDecl::Wrapper { inner, .. } = &decl.shape {
            return Ok(self.facts(*inner)?.name);
        }
        if let Some(name) = &decl.name {
            return Ok(QName::with_namespace(decl.namespace.as_deref(), name.as_str()));
        }
        if let ShapeDecl::Collection { item, .. } = &decl.shape {
            let item = self.facts(*item)?.name;
            let namespace = decl.namespace.as_deref().or(item.namespace());
            return Ok(QName::with_namespace(namespace, naming::pluralize(item.local())));
        }
        let mut generic_tags = Vec::with_capacity(decl.generics.len());
        for generic in &decl.generics {
            generic_tags.push(self.facts(*generic)?.name.local().to_string());
        }
        let generic_tags: Vec<&str> = generic_tags.iter().map(String::as_str).collect();
        Ok(QName::with_namespace(
            decl.namespace.as_deref(),
            naming::derived_name(key.type_name(), &generic_tags),
        ))
    }

    fn resolve_converter(
        &self,
        type_name: &str,
        converter: ConverterRef,
    ) -> Result<Arc<dyn TextConverter>, ConfigError> {
        match converter {
            ConverterRef::Direct(converter) => Ok(converter),
            ConverterRef::Named(name) => match self.catalog.converters.get(&name) {
                Some(converter) => {
                    debug!(type_name, converter = %name, "resolved named converter");
                    Ok(converter.clone())
                }
                None => Err(ConfigError::UnknownConverter {
                    type_name: type_name.to_string(),
                    converter: name,
                }),
            },
        }
    }

    fn complete(
        &mut self,
        key: TypeKey,
        decl: TypeDecl,
        name: QName,
        shape: Shape,
        textual: bool,
        converter: Option<Arc<dyn TextConverter>>,
    ) -> Result<TypeDescriptor, ConfigError> {
        let type_name = key.type_name();
        let TypeDecl {
            prefix,
            constructor,
            content_property,
            text_property,
            element_converter,
            subtypes,
            view,
            keys,
            sealed,
            ignored,
            base_members,
            members,
            shape: shape_decl,
            shared,
            ..
        } = decl;

        for member in base_members.iter().chain(&members) {
            (member.declared.register)(self)?;
        }
        for subtype in &subtypes {
            (subtype.key.register)(self)?;
        }

        let mut members: Vec<MemberDecl> = base_members.into_iter().chain(members).collect();
        if let Some(field) = &content_property {
            match members.iter_mut().find(|m| m.field == *field) {
                Some(member) => member.flags.content = true,
                None => {
                    return Err(ConfigError::MissingContentProperty {
                        type_name: type_name.to_string(),
                        property: field.clone(),
                    });
                }
            }
        }
        if let Some(field) = &text_property {
            match members.iter_mut().find(|m| m.field == *field) {
                Some(member) => member.flags.text = true,
                None => {
                    return Err(ConfigError::MissingTextProperty {
                        type_name: type_name.to_string(),
                        property: field.clone(),
                    });
                }
            }
        }
        // Stable: explicitly ordered members first, the rest in discovery order.
        members.sort_by_key(|m| m.order.unwrap_or(i32::MAX));

        let classified = self.classify(type_name, name.namespace(), members)?;
        validate(type_name, &classified)?;
        let Classified {
            attributes,
            elements,
            mut contents,
            mut texts,
        } = classified;

        let mut wrapper = None;
        let mut view = view;
        let content = match shape_decl {
            ShapeDecl::Collection { item, ops } => ContentMode::Collection(CollectionContent {
                item,
                items: self.item_map(item)?,
                ops,
            }),
            ShapeDecl::Dictionary { key, value, ops } => {
                ContentMode::Dictionary(DictionaryContent {
                    key,
                    value,
                    items: self.item_map(value)?,
                    ops,
                })
            }
            ShapeDecl::Wrapper {
                inner,
                wrap,
                view: inner_view,
            } => {
                wrapper = Some(WrapperOps { inner, wrap });
                view = Some(inner_view);
                ContentMode::None
            }
            ShapeDecl::Object => match (texts.pop(), contents.pop()) {
                (Some(text), _) => ContentMode::Text(Box::new(text)),
                (None, Some(content)) => ContentMode::Property(Box::new(content)),
                (None, None) => ContentMode::None,
            },
        };

        let mut identity = Vec::with_capacity(keys.len());
        for field in &keys {
            let member = attributes
                .iter()
                .chain(&elements)
                .chain(content.member())
                .find(|m| m.field == *field)
                .cloned()
                .ok_or_else(|| ConfigError::MissingKeyMember {
                    type_name: type_name.to_string(),
                    member: field.clone(),
                })?;
            identity.push(member);
        }

        if shape == Shape::Object
            && constructor.is_none()
            && converter.is_none()
            && element_converter.is_none()
        {
            return Err(ConfigError::MissingConstructor {
                type_name: type_name.to_string(),
            });
        }

        Ok(TypeDescriptor {
            key,
            name,
            prefix,
            shape,
            textual,
            constructor,
            content,
            attributes,
            elements,
            converter,
            element_converter,
            sealed: sealed || subtypes.is_empty(),
            subtypes,
            view,
            wrapper,
            shared,
            identity,
            ignored,
        })
    }

    fn classify(
        &self,
        type_name: &str,
        owner_namespace: Option<&str>,
        members: Vec<MemberDecl>,
    ) -> Result<Classified, ConfigError> {
        let mut classified = Classified::default();
        for (order, member) in members.into_iter().enumerate() {
            let facts = self.facts(member.declared)?;
            let (rule, class) = rules::classify(&MemberFacts {
                flags: member.flags,
                shape: facts.shape,
                textual: facts.textual,
                ignored: facts.ignored,
                policy: self.catalog.policy,
            });
            trace!(type_name, member = %member.field, rule, "classified member");
            let Classification::Store(storage, content) = class else {
                continue;
            };

            let marker = match content {
                MemberContent::Collection if facts.shape != Shape::Collection => Some("collection"),
                MemberContent::Dictionary if facts.shape != Shape::Dictionary => Some("dictionary"),
                _ => None,
            };
            if let Some(marker) = marker {
                return Err(ConfigError::ShapeMismatch {
                    type_name: type_name.to_string(),
                    member: member.field,
                    marker,
                });
            }
            // Reference collections hold keys of shared items.
            let target_shared = match content {
                MemberContent::Collection => facts.item.is_some_and(|item| self.is_shared(item)),
                _ => facts.shared,
            };
            if member.flags.reference && !target_shared {
                return Err(ConfigError::ReferenceNotShared {
                    type_name: type_name.to_string(),
                    member: member.field,
                });
            }

            let descriptor = self.member_descriptor(
                type_name,
                member,
                order,
                storage,
                content,
                owner_namespace,
                &facts,
            )?;
            match storage {
                Storage::Attribute => classified.attributes.push(descriptor),
                Storage::Element => classified.elements.push(descriptor),
                Storage::Content => classified.contents.push(descriptor),
                Storage::Text => classified.texts.push(descriptor),
            }
        }
        Ok(classified)
    }

    #[allow(clippy::too_many_arguments)]
    fn member_descriptor(
        &self,
        type_name: &str,
        member: MemberDecl,
        order: usize,
        storage: Storage,
        content: MemberContent,
        owner_namespace: Option<&str>,
        facts: &Facts,
    ) -> Result<MemberDescriptor, ConfigError> {
        let namespace = match (&member.namespace, storage) {
            (Some(namespace), _) => Some(namespace.clone()),
            (None, Storage::Attribute) => None,
            (None, _) => owner_namespace.map(str::to_string),
        };
        let converter = match member.converter {
            Some(converter) => Some(self.resolve_converter(type_name, converter)?),
            None => None,
        };
        let items = match (&member.item_name, facts.item) {
            (Some(tag), Some(item)) => Some(ItemMap::with_entry(
                QName::with_namespace(namespace.as_deref(), tag.as_str()),
                item,
            )),
            _ => None,
        };
        let local = member.rename.unwrap_or_else(|| member.field.clone());
        Ok(MemberDescriptor {
            field: member.field,
            tag: QName::with_namespace(namespace, local),
            order,
            storage,
            content,
            declared: member.declared,
            nullable: member.nullable,
            reference: member.flags.reference,
            default: member.default,
            converter,
            items,
            key_attribute: member.key_attribute,
            access: member.access,
        })
    }

    /// Item tags of a collection or dictionary: the item type's tag, plus the
    /// tags of its known subtypes.
    fn item_map(&self, item: TypeKey) -> Result<ItemMap, ConfigError> {
        let mut items = ItemMap::with_entry(self.facts(item)?.name, item.id());
        if let Some(descriptor) = self.catalog.types.get(&item.id()) {
            for subtype in &descriptor.subtypes {
                items.insert(self.facts(subtype.key)?.name, subtype.key.id());
            }
        }
        Ok(items)
    }

    fn index(&mut self, descriptor: &TypeDescriptor) {
        let namespaces = &mut self.catalog.namespaces;
        if let Some(ns) = descriptor.name.namespace() {
            namespaces.declare(ns, descriptor.prefix.as_deref());
        }
        for member in descriptor.attributes.iter().chain(&descriptor.elements) {
            if let Some(ns) = member.tag.namespace() {
                namespaces.declare(ns, None);
            }
        }
        if descriptor.shape == Shape::Wrapper {
            return;
        }
        let id = descriptor.key.id();
        self.catalog.tags.entry(descriptor.name.clone()).or_insert(id);
        self.catalog
            .locals
            .entry(descriptor.name.local().to_string())
            .or_insert(id);
    }
}

fn validate(type_name: &str, classified: &Classified) -> Result<(), ConfigError> {
    if let [first, second, ..] = classified.texts.as_slice() {
        return Err(ConfigError::MultipleTextMembers {
            type_name: type_name.to_string(),
            first: first.field.clone(),
            second: second.field.clone(),
        });
    }
    if let [first, second, ..] = classified.contents.as_slice() {
        return Err(ConfigError::MultipleContentMembers {
            type_name: type_name.to_string(),
            first: first.field.clone(),
            second: second.field.clone(),
        });
    }
    let invalid = |message: &str| ConfigError::Invalid {
        type_name: type_name.to_string(),
        message: message.to_string(),
    };
    if !classified.texts.is_empty() && !classified.contents.is_empty() {
        return Err(invalid("a text member and a content member cannot be combined"));
    }
    if (!classified.texts.is_empty() || !classified.contents.is_empty())
        && !classified.elements.is_empty()
    {
        return Err(invalid("a text or content member excludes element members"));
    }

    unique_tags(type_name, &classified.attributes, "attribute")?;
    unique_tags(type_name, &classified.elements, "element")?;
    if let Some(shared) = classified
        .attributes
        .iter()
        .find(|a| classified.elements.iter().any(|e| e.tag == a.tag))
    {
        return Err(ConfigError::DuplicateTag {
            type_name: type_name.to_string(),
            tag: shared.tag.to_string(),
            kind: "attribute and element",
        });
    }
    Ok(())
}

fn unique_tags(
    type_name: &str,
    members: &[MemberDescriptor],
    kind: &'static str,
) -> Result<(), ConfigError> {
    for (index, member) in members.iter().enumerate() {
        if members[..index].iter().any(|m| m.tag == member.tag) {
            return Err(ConfigError::DuplicateTag {
                type_name: type_name.to_string(),
                tag: member.tag.to_string(),
                kind,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::any::Any;

    use super::super::{Registry, TypeBuilder, XmlType};
    use super::*;

    #[derive(Default)]
    struct Node {
        label: String,
        children: Vec<Node>,
        parent: Option<Box<Node>>,
    }

    impl XmlType for Node {
        fn describe(ty: &mut TypeBuilder<Self>) {
            ty.default_constructor();
            ty.field("label", |n| &n.label, |n| &mut n.label);
            ty.field("children", |n| &n.children, |n| &mut n.children)
                .item_name("Child");
            ty.optional("parent", |n| &n.parent, |n| &mut n.parent);
        }
    }

    #[test]
    fn test_recursive_types_register() {
        let registry = Registry::new();
        let node = registry.register::<Node>().unwrap();
        assert_eq!(node.attributes().len(), 1);
        let children = &node.elements()[0];
        assert_eq!(children.content(), MemberContent::Collection);
        let items = children.item_overrides().unwrap();
        assert_eq!(items.resolve(&QName::new("Child")), Some(TypeId::of::<Node>()));
        assert_eq!(node.elements()[1].storage(), Storage::Element);
        assert!(registry.lookup::<Vec<Node>>().is_some());
    }

    #[derive(Default)]
    struct TwoTexts {
        a: String,
        b: String,
    }

    impl XmlType for TwoTexts {
        fn describe(ty: &mut TypeBuilder<Self>) {
            ty.default_constructor();
            ty.field("a", |t| &t.a, |t| &mut t.a).text();
            ty.field("b", |t| &t.b, |t| &mut t.b).text();
        }
    }

    #[test]
    fn test_multiple_text_members_fail() {
        let err = Registry::new().register::<TwoTexts>().unwrap_err();
        assert!(matches!(err, ConfigError::MultipleTextMembers { ref first, .. } if first == "a"));
    }

    #[derive(Default)]
    struct MissingContent {
        value: String,
    }

    impl XmlType for MissingContent {
        fn describe(ty: &mut TypeBuilder<Self>) {
            ty.default_constructor().content_property("body");
            ty.field("value", |t| &t.value, |t| &mut t.value);
        }
    }

    #[test]
    fn test_missing_content_property_fails_and_publishes_nothing() {
        let registry = Registry::new();
        let err = registry.register::<MissingContent>().unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingContentProperty {
                type_name: std::any::type_name::<MissingContent>().to_string(),
                property: "body".to_string(),
            }
        );
        assert!(registry.lookup::<MissingContent>().is_none());
        assert!(registry.lookup::<String>().is_none());
    }

    #[derive(Default)]
    struct Clash {
        a: i32,
        b: i32,
    }

    impl XmlType for Clash {
        fn describe(ty: &mut TypeBuilder<Self>) {
            ty.default_constructor();
            ty.field("a", |t| &t.a, |t| &mut t.a).rename("Value");
            ty.field("b", |t| &t.b, |t| &mut t.b).rename("Value").element();
        }
    }

    #[test]
    fn test_attribute_and_element_tags_are_disjoint() {
        let err = Registry::new().register::<Clash>().unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateTag { kind: "attribute and element", .. }));
    }

    #[derive(Default)]
    struct NamedConverter {
        flag: bool,
    }

    impl XmlType for NamedConverter {
        fn describe(ty: &mut TypeBuilder<Self>) {
            ty.default_constructor();
            ty.field("flag", |t| &t.flag, |t| &mut t.flag)
                .converter_named("yes-no");
        }
    }

    #[test]
    fn test_unknown_named_converter() {
        let registry = Registry::new();
        let err = registry.register::<NamedConverter>().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownConverter { ref converter, .. } if converter == "yes-no"));

        registry.add_converter(
            "yes-no",
            Arc::new(crate::convert::BoolConverter::default()),
        );
        assert!(registry.register::<NamedConverter>().is_ok());
    }

    struct NoConstructor {
        value: i32,
    }

    impl XmlType for NoConstructor {
        fn describe(ty: &mut TypeBuilder<Self>) {
            ty.field("value", |t| &t.value, |t| &mut t.value);
        }
    }

    #[test]
    fn test_objects_need_a_constructor() {
        let err = Registry::new().register::<NoConstructor>().unwrap_err();
        assert!(matches!(err, ConfigError::MissingConstructor { .. }));
    }

    #[derive(Default)]
    struct BadReference {
        target: i32,
    }

    impl XmlType for BadReference {
        fn describe(ty: &mut TypeBuilder<Self>) {
            ty.default_constructor();
            ty.field("target", |t| &t.target, |t| &mut t.target)
                .reference();
        }
    }

    #[test]
    fn test_reference_members_need_shared_types() {
        let err = Registry::new().register::<BadReference>().unwrap_err();
        assert!(matches!(err, ConfigError::ReferenceNotShared { .. }));
    }

    #[derive(Default)]
    struct BadReferenceList {
        targets: Vec<i32>,
    }

    impl XmlType for BadReferenceList {
        fn describe(ty: &mut TypeBuilder<Self>) {
            ty.default_constructor();
            ty.field("targets", |t| &t.targets, |t| &mut t.targets)
                .reference();
        }
    }

    #[test]
    fn test_reference_lists_need_shared_items() {
        let err = Registry::new().register::<BadReferenceList>().unwrap_err();
        assert!(matches!(err, ConfigError::ReferenceNotShared { ref member, .. } if member == "targets"));
    }

    #[derive(Default)]
    struct Ordered {
        first: i32,
        second: i32,
        third: i32,
    }

    impl XmlType for Ordered {
        fn describe(ty: &mut TypeBuilder<Self>) {
            ty.default_constructor();
            ty.field("first", |t| &t.first, |t| &mut t.first);
            ty.field("second", |t| &t.second, |t| &mut t.second);
            ty.field("third", |t| &t.third, |t| &mut t.third).order(0);
        }
    }

    #[test]
    fn test_explicit_order_comes_first() {
        let ordered = Registry::new().register::<Ordered>().unwrap();
        let fields: Vec<&str> = ordered.attributes().iter().map(|m| m.field()).collect();
        assert_eq!(fields, ["third", "first", "second"]);
        let sample: &dyn Any = &Ordered {
            first: 1,
            second: 2,
            third: 3,
        };
        let third = ordered.member("third").unwrap();
        assert_eq!(third.get(sample).and_then(|v| v.downcast_ref::<i32>()), Some(&3));
    }
}
