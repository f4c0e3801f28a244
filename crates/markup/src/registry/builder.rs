//! Declarations recorded by [`XmlType::describe`](super::XmlType::describe).
//!
//! The builder only records what a type says about itself. Classification,
//! naming and validation happen afterwards, once, when the registry turns a
//! [`TypeDecl`] into a descriptor.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use super::XmlType;
use super::descriptor::{
    Access, Constructor, DefaultValue, Getter, KnownSubtype, SharedOps, TypeKey, Wrap, getter,
    getter_mut, setter,
};
use super::ops::{CollectionOps, DictionaryOps};
use crate::convert::{ElementConverter, EnumConverter, FnConverter, TextConverter};
use crate::error::ConvertError;

/// A converter given directly or by registered name.
#[derive(Clone)]
pub(crate) enum ConverterRef {
    Direct(Arc<dyn TextConverter>),
    Named(String),
}

pub(crate) enum ShapeDecl {
    Object,
    Collection {
        item: TypeKey,
        ops: Arc<dyn CollectionOps>,
    },
    Dictionary {
        key: TypeKey,
        value: TypeKey,
        ops: Arc<dyn DictionaryOps>,
    },
    Wrapper {
        inner: TypeKey,
        wrap: Wrap,
        view: Getter,
    },
}

/// Storage markers set on a member.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct MemberFlags {
    pub(crate) attribute: bool,
    pub(crate) element: bool,
    pub(crate) content: bool,
    pub(crate) text: bool,
    pub(crate) skip: bool,
    pub(crate) collection: bool,
    pub(crate) dictionary: bool,
    pub(crate) reference: bool,
    pub(crate) converter: bool,
}

pub(crate) struct MemberDecl {
    pub(crate) field: String,
    pub(crate) rename: Option<String>,
    pub(crate) namespace: Option<String>,
    pub(crate) order: Option<i32>,
    pub(crate) flags: MemberFlags,
    pub(crate) declared: TypeKey,
    pub(crate) nullable: bool,
    pub(crate) default: Option<DefaultValue>,
    pub(crate) converter: Option<ConverterRef>,
    pub(crate) item_name: Option<String>,
    pub(crate) key_attribute: Option<String>,
    pub(crate) access: Access,
}

impl MemberDecl {
    /// Re-roots the accessors of a member of `B` onto an owner `T` that
    /// embeds `B`.
    fn compose<T: Any, B: Any>(
        mut self,
        get: fn(&T) -> &B,
        get_mut: fn(&mut T) -> &mut B,
    ) -> Self {
        let Access {
            get: inner_get,
            get_mut: inner_get_mut,
            set: inner_set,
        } = self.access;
        self.access = Access {
            get: getter(move |owner| {
                owner
                    .downcast_ref::<T>()
                    .and_then(|t| inner_get(get(t) as &dyn Any))
            }),
            get_mut: getter_mut(move |owner| {
                owner
                    .downcast_mut::<T>()
                    .and_then(|t| inner_get_mut(get_mut(t) as &mut dyn Any))
            }),
            set: setter(move |owner, value| match owner.downcast_mut::<T>() {
                Some(t) => inner_set(get_mut(t) as &mut dyn Any, value),
                None => false,
            }),
        };
        self
    }
}

/// Everything a type declared about itself.
pub(crate) struct TypeDecl {
    pub(crate) name: Option<String>,
    pub(crate) namespace: Option<String>,
    pub(crate) prefix: Option<String>,
    pub(crate) generics: Vec<TypeKey>,
    pub(crate) constructor: Option<Constructor>,
    pub(crate) content_property: Option<String>,
    pub(crate) text_property: Option<String>,
    pub(crate) converter: Option<ConverterRef>,
    pub(crate) element_converter: Option<Arc<dyn ElementConverter>>,
    pub(crate) subtypes: Vec<KnownSubtype>,
    pub(crate) view: Option<Getter>,
    pub(crate) keys: Vec<String>,
    pub(crate) sealed: bool,
    pub(crate) ignored: bool,
    pub(crate) base_members: Vec<MemberDecl>,
    pub(crate) members: Vec<MemberDecl>,
    pub(crate) shape: ShapeDecl,
    pub(crate) shared: Option<SharedOps>,
}

impl Default for TypeDecl {
    fn default() -> Self {
        Self {
            name: None,
            namespace: None,
            prefix: None,
            generics: Vec::new(),
            constructor: None,
            content_property: None,
            text_property: None,
            converter: None,
            element_converter: None,
            subtypes: Vec::new(),
            view: None,
            keys: Vec::new(),
            sealed: false,
            ignored: false,
            base_members: Vec::new(),
            members: Vec::new(),
            shape: ShapeDecl::Object,
            shared: None,
        }
    }
}

fn known_subtype<S: XmlType, T: Any>(wrap: fn(S) -> T) -> KnownSubtype {
    KnownSubtype {
        key: TypeKey::of::<S>(),
        wrap: Arc::new(move |value: Box<dyn Any>| {
            value
                .downcast::<S>()
                .map(|s| Box::new(wrap(*s)) as Box<dyn Any>)
        }),
    }
}

/// Records the declarations of type `T`.
///
/// ```ignore
/// impl XmlType for Point {
///     fn describe(ty: &mut TypeBuilder<Self>) {
///         ty.default_constructor();
///         ty.field("x", |p| &p.x, |p| &mut p.x).attribute().rename("X");
///         ty.field("y", |p| &p.y, |p| &mut p.y).attribute().rename("Y");
///     }
/// }
/// ```
pub struct TypeBuilder<T> {
    decl: TypeDecl,
    _marker: PhantomData<fn() -> T>,
}

impl<T: XmlType> TypeBuilder<T> {
    pub(crate) fn new() -> Self {
        Self {
            decl: TypeDecl::default(),
            _marker: PhantomData,
        }
    }

    pub(crate) fn into_decl(self) -> TypeDecl {
        self.decl
    }

    /// Overrides the derived tag name.
    pub fn name(&mut self, name: &str) -> &mut Self {
        self.decl.name = Some(name.to_string());
        self
    }

    pub fn namespace(&mut self, namespace: &str) -> &mut Self {
        self.decl.namespace = Some(namespace.to_string());
        self
    }

    /// Preferred prefix for the type's namespace.
    pub fn prefix(&mut self, prefix: &str) -> &mut Self {
        self.decl.prefix = Some(prefix.to_string());
        self
    }

    /// Declares a generic argument; its tag is appended to the derived name.
    pub fn generic<A: XmlType>(&mut self) -> &mut Self {
        self.decl.generics.push(TypeKey::of::<A>());
        self
    }

    pub fn default_constructor(&mut self) -> &mut Self
    where
        T: Default,
    {
        self.decl.constructor = Some(Arc::new(|| Box::new(T::default()) as Box<dyn Any>));
        self
    }

    pub fn constructor(&mut self, construct: fn() -> T) -> &mut Self {
        self.decl.constructor = Some(Arc::new(move || Box::new(construct()) as Box<dyn Any>));
        self
    }

    /// Names the member standing for the element's whole child content.
    pub fn content_property(&mut self, field: &str) -> &mut Self {
        self.decl.content_property = Some(field.to_string());
        self
    }

    /// Names the member standing for the element's inner text.
    pub fn text_property(&mut self, field: &str) -> &mut Self {
        self.decl.text_property = Some(field.to_string());
        self
    }

    /// Converts the whole value to and from text.
    pub fn converter(&mut self, converter: impl TextConverter + 'static) -> &mut Self {
        self.decl.converter = Some(ConverterRef::Direct(Arc::new(converter)));
        self
    }

    /// Uses a converter registered under `name`.
    pub fn converter_named(&mut self, name: &str) -> &mut Self {
        self.decl.converter = Some(ConverterRef::Named(name.to_string()));
        self
    }

    /// Hands whole elements of this type to `converter`.
    pub fn element_converter(&mut self, converter: impl ElementConverter + 'static) -> &mut Self {
        self.decl.element_converter = Some(Arc::new(converter));
        self
    }

    /// Shorthand for a converter built from context-free functions.
    pub fn text_with(
        &mut self,
        parse: fn(&str) -> Result<T, ConvertError>,
        format: fn(&T) -> String,
    ) -> &mut Self {
        self.converter(FnConverter::simple(parse, format))
    }

    /// Converts by variant name.
    pub fn enumeration(&mut self, variants: &[(&str, T)]) -> &mut Self
    where
        T: Clone + PartialEq + Send + Sync,
    {
        self.converter(EnumConverter::new(variants))
    }

    /// Declares `S` as a known subtype, embedded into `T` by `wrap`.
    pub fn subtype<S: XmlType>(&mut self, wrap: fn(S) -> T) -> &mut Self {
        self.decl.subtypes.push(known_subtype(wrap));
        self
    }

    /// Lets `provider` supply the known subtypes.
    pub fn subtypes_from(&mut self, provider: fn(&mut Subtypes<T>)) -> &mut Self {
        let mut subtypes = Subtypes {
            list: Vec::new(),
            _marker: PhantomData,
        };
        provider(&mut subtypes);
        self.decl.subtypes.extend(subtypes.list);
        self
    }

    /// Views a value as its concrete subtype value.
    pub fn view(&mut self, view: fn(&T) -> &dyn Any) -> &mut Self {
        self.decl.view = Some(getter(move |value| value.downcast_ref::<T>().map(view)));
        self
    }

    /// Adds `field` to the identity key used by reference-mode members.
    pub fn key(&mut self, field: &str) -> &mut Self {
        self.decl.keys.push(field.to_string());
        self
    }

    /// No runtime subtype ever stands in for this type.
    pub fn sealed(&mut self) -> &mut Self {
        self.decl.sealed = true;
        self
    }

    /// Members declared with this type are never serialized.
    pub fn ignore(&mut self) -> &mut Self {
        self.decl.ignored = true;
        self
    }

    pub fn collection<I: XmlType>(&mut self, ops: impl CollectionOps + 'static) -> &mut Self {
        self.decl.shape = ShapeDecl::Collection {
            item: TypeKey::of::<I>(),
            ops: Arc::new(ops),
        };
        self
    }

    pub fn dictionary<K: XmlType, V: XmlType>(
        &mut self,
        ops: impl DictionaryOps + 'static,
    ) -> &mut Self {
        self.decl.shape = ShapeDecl::Dictionary {
            key: TypeKey::of::<K>(),
            value: TypeKey::of::<V>(),
            ops: Arc::new(ops),
        };
        self
    }

    /// A transparent box: reads and writes exactly like `I`.
    pub fn wrapper<I: XmlType>(&mut self, wrap: fn(I) -> T, view: fn(&T) -> &I) -> &mut Self {
        self.decl.shape = ShapeDecl::Wrapper {
            inner: TypeKey::of::<I>(),
            wrap: Arc::new(move |value: Box<dyn Any>| {
                value
                    .downcast::<I>()
                    .map(|inner| Box::new(wrap(*inner)) as Box<dyn Any>)
            }),
            view: getter(move |value| {
                value
                    .downcast_ref::<T>()
                    .map(|value| view(value) as &dyn Any)
            }),
        };
        self
    }

    /// Adds a member holding an `F`.
    pub fn field<F: XmlType>(
        &mut self,
        name: &str,
        get: fn(&T) -> &F,
        get_mut: fn(&mut T) -> &mut F,
    ) -> MemberBuilder<'_, F> {
        let access = Access {
            get: getter(move |owner| owner.downcast_ref::<T>().map(|t| get(t) as &dyn Any)),
            get_mut: getter_mut(move |owner| {
                owner
                    .downcast_mut::<T>()
                    .map(|t| get_mut(t) as &mut dyn Any)
            }),
            set: setter(move |owner, value| match (owner.downcast_mut::<T>(), value) {
                (Some(t), Some(value)) => match value.downcast::<F>() {
                    Ok(value) => {
                        *get_mut(t) = *value;
                        true
                    }
                    Err(_) => false,
                },
                _ => false,
            }),
        };
        self.push_member(name, TypeKey::of::<F>(), false, access)
    }

    /// Adds a nullable member holding an `Option<F>`.
    pub fn optional<F: XmlType>(
        &mut self,
        name: &str,
        get: fn(&T) -> &Option<F>,
        get_mut: fn(&mut T) -> &mut Option<F>,
    ) -> MemberBuilder<'_, F> {
        let access = Access {
            get: getter(move |owner| {
                owner
                    .downcast_ref::<T>()
                    .and_then(|t| get(t).as_ref().map(|v| v as &dyn Any))
            }),
            get_mut: getter_mut(move |owner| {
                owner
                    .downcast_mut::<T>()
                    .and_then(|t| get_mut(t).as_mut().map(|v| v as &mut dyn Any))
            }),
            set: setter(move |owner, value| {
                let Some(t) = owner.downcast_mut::<T>() else {
                    return false;
                };
                match value {
                    None => {
                        *get_mut(t) = None;
                        true
                    }
                    Some(value) => match value.downcast::<F>() {
                        Ok(value) => {
                            *get_mut(t) = Some(*value);
                            true
                        }
                        Err(_) => false,
                    },
                }
            }),
        };
        self.push_member(name, TypeKey::of::<F>(), true, access)
    }

    /// Inlines the members of an embedded `B` ahead of this type's own.
    pub fn flatten<B: XmlType>(
        &mut self,
        get: fn(&T) -> &B,
        get_mut: fn(&mut T) -> &mut B,
    ) -> &mut Self {
        let mut base = TypeBuilder::<B>::new();
        B::describe(&mut base);
        let base = base.into_decl();
        for member in base.base_members.into_iter().chain(base.members) {
            self.decl
                .base_members
                .push(member.compose::<T, B>(get, get_mut));
        }
        self.decl.keys.extend(base.keys);
        if self.decl.content_property.is_none() {
            self.decl.content_property = base.content_property;
        }
        if self.decl.text_property.is_none() {
            self.decl.text_property = base.text_property;
        }
        self
    }

    fn push_member<F>(
        &mut self,
        name: &str,
        declared: TypeKey,
        nullable: bool,
        access: Access,
    ) -> MemberBuilder<'_, F> {
        self.decl.members.push(MemberDecl {
            field: name.to_string(),
            rename: None,
            namespace: None,
            order: None,
            flags: MemberFlags::default(),
            declared,
            nullable,
            default: None,
            converter: None,
            item_name: None,
            key_attribute: None,
            access,
        });
        let index = self.decl.members.len() - 1;
        MemberBuilder {
            decl: &mut self.decl.members[index],
            _marker: PhantomData,
        }
    }
}

impl<I: XmlType + Send + Sync> TypeBuilder<Arc<I>> {
    /// Values are shared instances tracked by identity key.
    pub fn shared(&mut self) -> &mut Self {
        self.decl.shared = Some(SharedOps {
            share: Arc::new(|value: &dyn Any| {
                value
                    .downcast_ref::<Arc<I>>()
                    .map(|shared| shared.clone() as Arc<dyn Any + Send + Sync>)
            }),
            restore: Arc::new(|shared: Arc<dyn Any + Send + Sync>| {
                shared
                    .downcast::<I>()
                    .ok()
                    .map(|shared| Box::new(shared) as Box<dyn Any>)
            }),
        });
        self
    }
}

/// Collects subtypes from a provider function.
pub struct Subtypes<T> {
    list: Vec<KnownSubtype>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any> Subtypes<T> {
    pub fn add<S: XmlType>(&mut self, wrap: fn(S) -> T) -> &mut Self {
        self.list.push(known_subtype(wrap));
        self
    }
}

/// Annotations on one member.
pub struct MemberBuilder<'a, F> {
    decl: &'a mut MemberDecl,
    _marker: PhantomData<fn() -> F>,
}

impl<F: XmlType> MemberBuilder<'_, F> {
    pub fn attribute(&mut self) -> &mut Self {
        self.decl.flags.attribute = true;
        self
    }

    pub fn element(&mut self) -> &mut Self {
        self.decl.flags.element = true;
        self
    }

    /// The member is the element's whole child content.
    pub fn content(&mut self) -> &mut Self {
        self.decl.flags.content = true;
        self
    }

    /// The member is the element's inner text.
    pub fn text(&mut self) -> &mut Self {
        self.decl.flags.text = true;
        self
    }

    pub fn skip(&mut self) -> &mut Self {
        self.decl.flags.skip = true;
        self
    }

    pub fn rename(&mut self, tag: &str) -> &mut Self {
        self.decl.rename = Some(tag.to_string());
        self
    }

    pub fn namespace(&mut self, namespace: &str) -> &mut Self {
        self.decl.namespace = Some(namespace.to_string());
        self
    }

    /// Explicit position; ordered members precede the rest.
    pub fn order(&mut self, order: i32) -> &mut Self {
        self.decl.order = Some(order);
        self
    }

    /// Values equal to `value` are not written; a member missing from the
    /// input is set to `value`.
    pub fn default_value(&mut self, value: F) -> &mut Self
    where
        F: PartialEq + Clone + Send + Sync,
    {
        let expected = value.clone();
        self.decl.default = Some(DefaultValue {
            matches: Arc::new(move |candidate: &dyn Any| {
                candidate.downcast_ref::<F>().is_some_and(|c| *c == expected)
            }),
            make: Arc::new(move || Box::new(value.clone()) as Box<dyn Any>),
        });
        self
    }

    /// Written as the target's identity key and resolved when read.
    pub fn reference(&mut self) -> &mut Self {
        self.decl.flags.reference = true;
        self
    }

    pub fn converter(&mut self, converter: impl TextConverter + 'static) -> &mut Self {
        self.decl.converter = Some(ConverterRef::Direct(Arc::new(converter)));
        self.decl.flags.converter = true;
        self
    }

    pub fn converter_named(&mut self, name: &str) -> &mut Self {
        self.decl.converter = Some(ConverterRef::Named(name.to_string()));
        self.decl.flags.converter = true;
        self
    }

    /// Tag for items of a collection- or dictionary-shaped value.
    pub fn item_name(&mut self, tag: &str) -> &mut Self {
        self.decl.item_name = Some(tag.to_string());
        self
    }

    /// Attribute carrying dictionary keys.
    pub fn key_attribute(&mut self, name: &str) -> &mut Self {
        self.decl.key_attribute = Some(name.to_string());
        self
    }

    pub fn collection(&mut self) -> &mut Self {
        self.decl.flags.collection = true;
        self
    }

    pub fn dictionary(&mut self) -> &mut Self {
        self.decl.flags.dictionary = true;
        self
    }
}
