//! Member classification.
//!
//! Every member is classified once, at registration, by the first rule in
//! [`RULES`] that claims it. Rules are plain functions over [`MemberFacts`]
//! and know nothing about traversal.

use super::MemberPolicy;
use super::builder::MemberFlags;
use super::descriptor::{MemberContent, Shape, Storage};

/// What a rule sees of a member.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MemberFacts {
    pub(crate) flags: MemberFlags,
    /// Shape of the member's declared type.
    pub(crate) shape: Shape,
    /// Whether the declared type has a text form.
    pub(crate) textual: bool,
    /// Whether the declared type is marked ignored.
    pub(crate) ignored: bool,
    pub(crate) policy: MemberPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Classification {
    Skip,
    Store(Storage, MemberContent),
}

pub(crate) struct Rule {
    pub(crate) name: &'static str,
    pub(crate) apply: fn(&MemberFacts) -> Option<Classification>,
}

/// Classification rules, highest priority first.
pub(crate) const RULES: &[Rule] = &[
    Rule {
        name: "skip",
        apply: skip,
    },
    Rule {
        name: "attribute",
        apply: attribute,
    },
    Rule {
        name: "content-property",
        apply: content_property,
    },
    Rule {
        name: "text-property",
        apply: text_property,
    },
    Rule {
        name: "element",
        apply: element,
    },
    Rule {
        name: "dictionary",
        apply: dictionary,
    },
    Rule {
        name: "collection",
        apply: collection,
    },
    Rule {
        name: "inferred-shape",
        apply: inferred_shape,
    },
    Rule {
        name: "default",
        apply: default,
    },
];

/// Applies [`RULES`] in order; returns the claiming rule's name with its
/// classification.
pub(crate) fn classify(facts: &MemberFacts) -> (&'static str, Classification) {
    RULES
        .iter()
        .find_map(|rule| (rule.apply)(facts).map(|class| (rule.name, class)))
        .unwrap_or(("default", Classification::Store(Storage::Element, MemberContent::None)))
}

fn inferred(shape: Shape) -> MemberContent {
    match shape {
        Shape::Collection => MemberContent::Collection,
        Shape::Dictionary => MemberContent::Dictionary,
        _ => MemberContent::None,
    }
}

fn skip(facts: &MemberFacts) -> Option<Classification> {
    (facts.flags.skip || facts.ignored).then_some(Classification::Skip)
}

fn attribute(facts: &MemberFacts) -> Option<Classification> {
    facts
        .flags
        .attribute
        .then(|| Classification::Store(Storage::Attribute, inferred(facts.shape)))
}

fn content_property(facts: &MemberFacts) -> Option<Classification> {
    facts
        .flags
        .content
        .then(|| Classification::Store(Storage::Content, inferred(facts.shape)))
}

fn text_property(facts: &MemberFacts) -> Option<Classification> {
    facts
        .flags
        .text
        .then_some(Classification::Store(Storage::Text, MemberContent::None))
}

fn element(facts: &MemberFacts) -> Option<Classification> {
    facts
        .flags
        .element
        .then(|| Classification::Store(Storage::Element, inferred(facts.shape)))
}

fn dictionary(facts: &MemberFacts) -> Option<Classification> {
    facts
        .flags
        .dictionary
        .then_some(Classification::Store(Storage::Element, MemberContent::Dictionary))
}

fn collection(facts: &MemberFacts) -> Option<Classification> {
    facts
        .flags
        .collection
        .then_some(Classification::Store(Storage::Element, MemberContent::Collection))
}

/// Collection- and dictionary-shaped members become nested content unless a
/// converter turns them into text.
fn inferred_shape(facts: &MemberFacts) -> Option<Classification> {
    if facts.flags.converter {
        return None;
    }
    match inferred(facts.shape) {
        MemberContent::None => None,
        content => Some(Classification::Store(Storage::Element, content)),
    }
}

fn default(facts: &MemberFacts) -> Option<Classification> {
    let scalar_like = facts.textual || facts.flags.reference || facts.flags.converter;
    let storage = match (scalar_like, facts.policy) {
        (true, MemberPolicy::Attributes) => Storage::Attribute,
        _ => Storage::Element,
    };
    Some(Classification::Store(storage, MemberContent::None))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(shape: Shape, textual: bool) -> MemberFacts {
        MemberFacts {
            flags: MemberFlags::default(),
            shape,
            textual,
            ignored: false,
            policy: MemberPolicy::Attributes,
        }
    }

    #[test]
    fn test_scalars_follow_the_policy() {
        let mut f = facts(Shape::Scalar, true);
        assert_eq!(
            classify(&f),
            ("default", Classification::Store(Storage::Attribute, MemberContent::None))
        );
        f.policy = MemberPolicy::Elements;
        assert_eq!(
            classify(&f).1,
            Classification::Store(Storage::Element, MemberContent::None)
        );
    }

    #[test]
    fn test_objects_default_to_elements() {
        let f = facts(Shape::Object, false);
        assert_eq!(
            classify(&f).1,
            Classification::Store(Storage::Element, MemberContent::None)
        );
    }

    #[test]
    fn test_collections_are_inferred() {
        let f = facts(Shape::Collection, false);
        assert_eq!(
            classify(&f),
            (
                "inferred-shape",
                Classification::Store(Storage::Element, MemberContent::Collection)
            )
        );
    }

    #[test]
    fn test_attribute_marker_beats_collection_shape() {
        let mut f = facts(Shape::Collection, false);
        f.flags.attribute = true;
        f.flags.collection = true;
        assert_eq!(
            classify(&f),
            (
                "attribute",
                Classification::Store(Storage::Attribute, MemberContent::Collection)
            )
        );
    }

    #[test]
    fn test_content_beats_element() {
        let mut f = facts(Shape::Object, false);
        f.flags.content = true;
        f.flags.element = true;
        assert_eq!(classify(&f).0, "content-property");
    }

    #[test]
    fn test_skip_and_ignored_types() {
        let mut f = facts(Shape::Scalar, true);
        f.flags.skip = true;
        f.flags.attribute = true;
        assert_eq!(classify(&f), ("skip", Classification::Skip));

        let mut f = facts(Shape::Object, false);
        f.ignored = true;
        assert_eq!(classify(&f).1, Classification::Skip);
    }

    #[test]
    fn test_references_are_scalar_like() {
        let mut f = facts(Shape::Wrapper, false);
        f.flags.reference = true;
        assert_eq!(
            classify(&f).1,
            Classification::Store(Storage::Attribute, MemberContent::None)
        );
    }

    #[test]
    fn test_converted_collections_are_text() {
        let mut f = facts(Shape::Collection, false);
        f.flags.converter = true;
        assert_eq!(
            classify(&f),
            ("default", Classification::Store(Storage::Attribute, MemberContent::None))
        );
    }

    #[test]
    fn test_every_member_matches_exactly_one_rule() {
        let shapes = [
            Shape::Scalar,
            Shape::Object,
            Shape::Collection,
            Shape::Dictionary,
            Shape::Polymorphic,
            Shape::Wrapper,
        ];
        for shape in shapes {
            for bits in 0u16..(1 << 9) {
                let flags = MemberFlags {
                    attribute: bits & 1 != 0,
                    element: bits & 2 != 0,
                    content: bits & 4 != 0,
                    text: bits & 8 != 0,
                    skip: bits & 16 != 0,
                    collection: bits & 32 != 0,
                    dictionary: bits & 64 != 0,
                    reference: bits & 128 != 0,
                    converter: bits & 256 != 0,
                };
                let f = MemberFacts {
                    flags,
                    ..facts(shape, false)
                };
                let claimed = RULES.iter().position(|rule| (rule.apply)(&f).is_some());
                assert!(claimed.is_some(), "no rule for {:?} {:?}", shape, flags);
            }
        }
    }
}
