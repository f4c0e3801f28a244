use heck::{ToKebabCase, ToLowerCamelCase, ToShoutySnakeCase, ToSnakeCase, ToUpperCamelCase};
use syn::meta::ParseNestedMeta;
use syn::{Attribute, Expr, LitInt, LitStr, Path};

const XML: &str = "xml";

/// Case conversion applied to member and variant names.
#[derive(Debug, Clone, Copy)]
pub(crate) enum RenameRule {
    Lower,
    Upper,
    Pascal,
    Camel,
    Snake,
    ScreamingSnake,
    Kebab,
}

impl RenameRule {
    fn parse(meta: &ParseNestedMeta<'_>, value: &str) -> syn::Result<Self> {
        Ok(match value {
            "lowercase" => RenameRule::Lower,
            "UPPERCASE" => RenameRule::Upper,
            "PascalCase" => RenameRule::Pascal,
            "camelCase" => RenameRule::Camel,
            "snake_case" => RenameRule::Snake,
            "SCREAMING_SNAKE_CASE" => RenameRule::ScreamingSnake,
            "kebab-case" => RenameRule::Kebab,
            other => return Err(meta.error(format!("unknown rename rule `{}`", other))),
        })
    }

    pub(crate) fn apply(self, name: &str) -> String {
        match self {
            RenameRule::Lower => name.to_lowercase(),
            RenameRule::Upper => name.to_uppercase(),
            RenameRule::Pascal => name.to_upper_camel_case(),
            RenameRule::Camel => name.to_lower_camel_case(),
            RenameRule::Snake => name.to_snake_case(),
            RenameRule::ScreamingSnake => name.to_shouty_snake_case(),
            RenameRule::Kebab => name.to_kebab_case(),
        }
    }
}

/// `#[xml(...)]` on the type.
#[derive(Default)]
pub(crate) struct TypeAttrs {
    pub(crate) name: Option<String>,
    pub(crate) namespace: Option<String>,
    pub(crate) prefix: Option<String>,
    pub(crate) rename_all: Option<RenameRule>,
    pub(crate) content: Option<String>,
    pub(crate) text: Option<String>,
    pub(crate) converter: Option<String>,
    pub(crate) constructor: Option<Path>,
    pub(crate) keys: Vec<String>,
    pub(crate) sealed: bool,
    pub(crate) ignore: bool,
    pub(crate) no_default: bool,
}

impl TypeAttrs {
    pub(crate) fn parse(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut parsed = TypeAttrs::default();
        for attr in attrs.iter().filter(|a| a.path().is_ident(XML)) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("name") {
                    parsed.name = Some(string(&meta)?);
                } else if meta.path.is_ident("namespace") {
                    parsed.namespace = Some(string(&meta)?);
                } else if meta.path.is_ident("prefix") {
                    parsed.prefix = Some(string(&meta)?);
                } else if meta.path.is_ident("rename_all") {
                    let rule = string(&meta)?;
                    parsed.rename_all = Some(RenameRule::parse(&meta, &rule)?);
                } else if meta.path.is_ident("content") {
                    parsed.content = Some(string(&meta)?);
                } else if meta.path.is_ident("text") {
                    parsed.text = Some(string(&meta)?);
                } else if meta.path.is_ident("converter") {
                    parsed.converter = Some(string(&meta)?);
                } else if meta.path.is_ident("constructor") {
                    parsed.constructor = Some(meta.value()?.parse::<LitStr>()?.parse()?);
                } else if meta.path.is_ident("key") {
                    parsed.keys.push(string(&meta)?);
                } else if meta.path.is_ident("sealed") {
                    parsed.sealed = true;
                } else if meta.path.is_ident("ignore") {
                    parsed.ignore = true;
                } else if meta.path.is_ident("no_default") {
                    parsed.no_default = true;
                } else {
                    return Err(meta.error("unknown xml type attribute"));
                }
                Ok(())
            })?;
        }
        Ok(parsed)
    }
}

/// `#[xml(...)]` on a field or variant.
#[derive(Default)]
pub(crate) struct FieldAttrs {
    pub(crate) attribute: bool,
    pub(crate) element: bool,
    pub(crate) content: bool,
    pub(crate) text: bool,
    pub(crate) skip: bool,
    pub(crate) flatten: bool,
    pub(crate) reference: bool,
    pub(crate) collection: bool,
    pub(crate) dictionary: bool,
    pub(crate) key: bool,
    pub(crate) rename: Option<String>,
    pub(crate) namespace: Option<String>,
    pub(crate) order: Option<i32>,
    /// `Some(None)` for a bare `default`.
    pub(crate) default: Option<Option<Expr>>,
    pub(crate) converter: Option<String>,
    pub(crate) item: Option<String>,
    pub(crate) key_attribute: Option<String>,
}

impl FieldAttrs {
    pub(crate) fn parse(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut parsed = FieldAttrs::default();
        for attr in attrs.iter().filter(|a| a.path().is_ident(XML)) {
            attr.parse_nested_meta(|meta| {
                let flag = |name: &str| meta.path.is_ident(name);
                if flag("attribute") {
                    parsed.attribute = true;
                } else if flag("element") {
                    parsed.element = true;
                } else if flag("content") {
                    parsed.content = true;
                } else if flag("text") {
                    parsed.text = true;
                } else if flag("skip") {
                    parsed.skip = true;
                } else if flag("flatten") {
                    parsed.flatten = true;
                } else if flag("reference") {
                    parsed.reference = true;
                } else if flag("collection") {
                    parsed.collection = true;
                } else if flag("dictionary") {
                    parsed.dictionary = true;
                } else if flag("key") {
                    parsed.key = true;
                } else if flag("rename") {
                    parsed.rename = Some(string(&meta)?);
                } else if flag("namespace") {
                    parsed.namespace = Some(string(&meta)?);
                } else if flag("order") {
                    parsed.order = Some(meta.value()?.parse::<LitInt>()?.base10_parse()?);
                } else if flag("default") {
                    parsed.default = Some(if meta.input.peek(syn::Token![=]) {
                        Some(meta.value()?.parse::<Expr>()?)
                    } else {
                        None
                    });
                } else if flag("converter") {
                    parsed.converter = Some(string(&meta)?);
                } else if flag("item") {
                    parsed.item = Some(string(&meta)?);
                } else if flag("key_attribute") {
                    parsed.key_attribute = Some(string(&meta)?);
                } else {
                    return Err(meta.error("unknown xml field attribute"));
                }
                Ok(())
            })?;
        }
        Ok(parsed)
    }
}

fn string(meta: &ParseNestedMeta<'_>) -> syn::Result<String> {
    Ok(meta.value()?.parse::<LitStr>()?.value())
}
