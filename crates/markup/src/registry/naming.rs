//! Derived tag names.

/// Last path segment of a type name, without generic arguments.
///
/// `alloc::vec::Vec<my::Point>` becomes `Vec`, `[my::Point; 3]` becomes
/// `Point`.
pub(crate) fn short_name(type_name: &str) -> &str {
    let base = type_name
        .trim_start_matches('[')
        .split(['<', ';', ']'])
        .next()
        .unwrap_or(type_name);
    base.rsplit("::").next().unwrap_or(base).trim()
}

/// Tag derived from the type name, with generic argument tags appended
/// underscore-joined: `Pair<i32, String>` becomes `Pair_Int32_String`.
pub(crate) fn derived_name(type_name: &str, generic_tags: &[&str]) -> String {
    let mut name = short_name(type_name).to_string();
    for tag in generic_tags {
        name.push('_');
        name.push_str(tag);
    }
    name
}

/// English plural of an item tag, used for collection tags.
pub(crate) fn pluralize(tag: &str) -> String {
    let lower = tag.to_ascii_lowercase();
    if let Some(stem) = tag.strip_suffix(['y', 'Y']) {
        let before = stem.chars().last().map(|c| c.to_ascii_lowercase());
        if before.is_some_and(|c| !"aeiou".contains(c)) {
            return format!("{}ies", stem);
        }
    }
    if ["s", "x", "z", "ch", "sh"]
        .iter()
        .any(|suffix| lower.ends_with(suffix))
    {
        return format!("{}es", tag);
    }
    format!("{}s", tag)
}
