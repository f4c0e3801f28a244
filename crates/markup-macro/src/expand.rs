use proc_macro2::TokenStream;
use quote::quote;
use syn::{
    Data, DataEnum, DataStruct, DeriveInput, Fields, GenericArgument, Generics, PathArguments,
    Type, parse_quote,
};

use crate::attributes::{FieldAttrs, RenameRule, TypeAttrs};

pub(crate) fn derive_xml_type(input: DeriveInput) -> syn::Result<TokenStream> {
    let attrs = TypeAttrs::parse(&input.attrs)?;
    let ident = &input.ident;

    let mut generics = input.generics.clone();
    add_trait_bounds(&mut generics);
    if needs_default(&attrs, &input.data) && !input.generics.params.is_empty() {
        let (_, ty_generics, _) = input.generics.split_for_impl();
        generics
            .make_where_clause()
            .predicates
            .push(parse_quote!(#ident #ty_generics: ::core::default::Default));
    }
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let header = type_header(&attrs, &input.generics);
    let body = match &input.data {
        Data::Struct(data) => struct_body(&attrs, data)?,
        Data::Enum(data) => enum_body(&attrs, data)?,
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                ident,
                "XmlType cannot be derived for unions",
            ));
        }
    };

    Ok(quote! {
        impl #impl_generics ::helios_markup::XmlType for #ident #ty_generics #where_clause {
            fn describe(ty: &mut ::helios_markup::TypeBuilder<Self>) {
                #header
                #body
            }
        }
    })
}

fn add_trait_bounds(generics: &mut Generics) {
    for param in generics.type_params_mut() {
        param.bounds.push(parse_quote!(::helios_markup::XmlType));
    }
}

fn type_header(attrs: &TypeAttrs, generics: &Generics) -> TokenStream {
    let mut calls = Vec::new();
    if let Some(name) = &attrs.name {
        calls.push(quote! { ty.name(#name); });
    }
    if let Some(namespace) = &attrs.namespace {
        calls.push(quote! { ty.namespace(#namespace); });
    }
    if let Some(prefix) = &attrs.prefix {
        calls.push(quote! { ty.prefix(#prefix); });
    }
    for param in generics.type_params() {
        let param = &param.ident;
        calls.push(quote! { ty.generic::<#param>(); });
    }
    if let Some(converter) = &attrs.converter {
        calls.push(quote! { ty.converter_named(#converter); });
    }
    if let Some(field) = &attrs.content {
        calls.push(quote! { ty.content_property(#field); });
    }
    if let Some(field) = &attrs.text {
        calls.push(quote! { ty.text_property(#field); });
    }
    if attrs.sealed {
        calls.push(quote! { ty.sealed(); });
    }
    if attrs.ignore {
        calls.push(quote! { ty.ignore(); });
    }
    quote! { #(#calls)* }
}

/// Whether the expansion calls `default_constructor`.
fn needs_default(attrs: &TypeAttrs, data: &Data) -> bool {
    attrs.constructor.is_none()
        && !attrs.no_default
        && matches!(data, Data::Struct(s) if matches!(s.fields, Fields::Named(_)))
}

fn constructor(attrs: &TypeAttrs) -> TokenStream {
    match (&attrs.constructor, attrs.no_default) {
        (Some(path), _) => quote! { ty.constructor(#path); },
        (None, true) => TokenStream::new(),
        (None, false) => quote! { ty.default_constructor(); },
    }
}

fn struct_body(attrs: &TypeAttrs, data: &DataStruct) -> syn::Result<TokenStream> {
    let construct = constructor(attrs);
    let fields = match &data.fields {
        Fields::Named(named) => &named.named,
        Fields::Unit => {
            let construct = match (&attrs.constructor, attrs.no_default) {
                (None, false) => quote! { ty.constructor(|| Self); },
                _ => construct,
            };
            return Ok(construct);
        }
        Fields::Unnamed(unnamed) => {
            return Err(syn::Error::new_spanned(
                unnamed,
                "XmlType needs named fields; describe tuple structs by hand",
            ));
        }
    };

    let mut members = Vec::new();
    let mut keys: Vec<String> = attrs.keys.clone();
    for field in fields {
        let field_attrs = FieldAttrs::parse(&field.attrs)?;
        if field_attrs.skip {
            continue;
        }
        let Some(ident) = &field.ident else {
            continue;
        };
        let ty = &field.ty;

        if field_attrs.flatten {
            members.push(quote! {
                ty.flatten::<#ty>(|v| &v.#ident, |v| &mut v.#ident);
            });
            continue;
        }

        let name = ident.to_string();
        let name = name.strip_prefix("r#").unwrap_or(&name).to_string();
        if field_attrs.key {
            keys.push(name.clone());
        }

        let tag = field_attrs
            .rename
            .clone()
            .or_else(|| attrs.rename_all.map(|rule| rule.apply(&name)));
        let modifiers = member_modifiers(&field_attrs, tag.as_deref());

        let member = match option_inner(ty) {
            Some(inner) => quote! {
                ty.optional::<#inner>(#name, |v| &v.#ident, |v| &mut v.#ident)
            },
            None => quote! {
                ty.field::<#ty>(#name, |v| &v.#ident, |v| &mut v.#ident)
            },
        };
        members.push(quote! { #member #(#modifiers)*; });
    }

    let keys = keys.iter().map(|key| quote! { ty.key(#key); });
    Ok(quote! {
        #construct
        #(#members)*
        #(#keys)*
    })
}

fn member_modifiers(attrs: &FieldAttrs, tag: Option<&str>) -> Vec<TokenStream> {
    let mut calls = Vec::new();
    if attrs.attribute {
        calls.push(quote! { .attribute() });
    }
    if attrs.element {
        calls.push(quote! { .element() });
    }
    if attrs.content {
        calls.push(quote! { .content() });
    }
    if attrs.text {
        calls.push(quote! { .text() });
    }
    if attrs.collection {
        calls.push(quote! { .collection() });
    }
    if attrs.dictionary {
        calls.push(quote! { .dictionary() });
    }
    if attrs.reference {
        calls.push(quote! { .reference() });
    }
    if let Some(tag) = tag {
        calls.push(quote! { .rename(#tag) });
    }
    if let Some(namespace) = &attrs.namespace {
        calls.push(quote! { .namespace(#namespace) });
    }
    if let Some(order) = attrs.order {
        calls.push(quote! { .order(#order) });
    }
    match &attrs.default {
        Some(Some(expr)) => calls.push(quote! { .default_value(#expr) }),
        Some(None) => calls.push(quote! { .default_value(::core::default::Default::default()) }),
        None => {}
    }
    if let Some(converter) = &attrs.converter {
        calls.push(quote! { .converter_named(#converter) });
    }
    if let Some(item) = &attrs.item {
        calls.push(quote! { .item_name(#item) });
    }
    if let Some(key) = &attrs.key_attribute {
        calls.push(quote! { .key_attribute(#key) });
    }
    calls
}

/// `T` for a field typed `Option<T>`.
fn option_inner(ty: &Type) -> Option<&Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    if path.qself.is_some() {
        return None;
    }
    let segment = path.path.segments.last()?;
    if segment.ident != "Option" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first() {
        Some(GenericArgument::Type(inner)) if args.args.len() == 1 => Some(inner),
        _ => None,
    }
}

fn enum_body(attrs: &TypeAttrs, data: &DataEnum) -> syn::Result<TokenStream> {
    if data.variants.is_empty() {
        return Err(syn::Error::new_spanned(
            &data.variants,
            "XmlType cannot be derived for an empty enum",
        ));
    }

    let unit = data
        .variants
        .iter()
        .all(|variant| matches!(variant.fields, Fields::Unit));
    if unit {
        return enumeration(attrs.rename_all, data);
    }

    let mut subtypes = Vec::new();
    let mut arms = Vec::new();
    for variant in &data.variants {
        let ident = &variant.ident;
        let inner = match &variant.fields {
            Fields::Unnamed(fields) if fields.unnamed.len() == 1 => &fields.unnamed[0].ty,
            _ => {
                return Err(syn::Error::new_spanned(
                    variant,
                    "XmlType enums hold either unit variants or single-field tuple variants",
                ));
            }
        };
        subtypes.push(quote! { ty.subtype::<#inner>(Self::#ident); });
        arms.push(quote! { Self::#ident(inner) => inner as &dyn ::core::any::Any, });
    }

    let construct = match (&attrs.constructor, attrs.no_default) {
        (Some(path), _) => quote! { ty.constructor(#path); },
        _ => TokenStream::new(),
    };
    Ok(quote! {
        #construct
        #(#subtypes)*
        ty.view(|value| match value { #(#arms)* });
    })
}

fn enumeration(rule: Option<RenameRule>, data: &DataEnum) -> syn::Result<TokenStream> {
    let mut variants = Vec::new();
    for variant in &data.variants {
        let field_attrs = FieldAttrs::parse(&variant.attrs)?;
        let ident = &variant.ident;
        let name = field_attrs
            .rename
            .unwrap_or_else(|| match rule {
                Some(rule) => rule.apply(&ident.to_string()),
                None => ident.to_string(),
            });
        variants.push(quote! { (#name, Self::#ident) });
    }
    Ok(quote! {
        ty.enumeration(&[#(#variants),*]);
    })
}
