//! Fieldless enums converted by variant name.

use std::any::Any;

use super::{ConvertContext, TextConverter};
use crate::error::ConvertError;

/// Maps variant names to values.
///
/// Reading matches the exact name first, then ignores ASCII case when
/// [`Settings::enum_case_insensitive`](crate::Settings::enum_case_insensitive)
/// is set.
pub struct EnumConverter<T> {
    variants: Vec<(String, T)>,
}

impl<T> EnumConverter<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(variants: &[(&str, T)]) -> Self {
        Self {
            variants: variants
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect(),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variants.iter().map(|(name, _)| name.as_str())
    }

    fn find(&self, text: &str, case_insensitive: bool) -> Option<&T> {
        self.variants
            .iter()
            .find(|(name, _)| name == text)
            .or_else(|| {
                case_insensitive
                    .then(|| {
                        self.variants
                            .iter()
                            .find(|(name, _)| name.eq_ignore_ascii_case(text))
                    })
                    .flatten()
            })
            .map(|(_, value)| value)
    }
}

impl<T> TextConverter for EnumConverter<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn from_text(&self, text: &str, cx: &ConvertContext<'_>) -> Result<Box<dyn Any>, ConvertError> {
        let text = text.trim();
        match self.find(text, cx.settings.enum_case_insensitive) {
            Some(value) => Ok(Box::new(value.clone())),
            None => Err(ConvertError::new(format!(
                "'{}' is not one of {}",
                text,
                self.names().collect::<Vec<_>>().join(", ")
            ))),
        }
    }

    fn to_text(&self, value: &dyn Any, _cx: &ConvertContext<'_>) -> Option<String> {
        let value = value.downcast_ref::<T>()?;
        self.variants
            .iter()
            .find(|(_, candidate)| candidate == value)
            .map(|(name, _)| name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::test_support::{CATALOG, SETTINGS};
    use crate::settings::Settings;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Light {
        Red,
        Amber,
        Green,
    }

    fn converter() -> EnumConverter<Light> {
        EnumConverter::new(&[
            ("Red", Light::Red),
            ("Amber", Light::Amber),
            ("Green", Light::Green),
        ])
    }

    #[test]
    fn test_by_name() {
        let cx = ConvertContext::new(&SETTINGS, &CATALOG);
        let value = converter().from_text("Amber", &cx).unwrap();
        assert_eq!(value.downcast_ref::<Light>(), Some(&Light::Amber));
        assert_eq!(converter().to_text(&Light::Green, &cx).as_deref(), Some("Green"));
    }

    #[test]
    fn test_case_sensitivity_follows_settings() {
        let cx = ConvertContext::new(&SETTINGS, &CATALOG);
        assert!(converter().from_text("red", &cx).is_ok());

        let strict = Settings::default().with_enum_case_insensitive(false);
        let cx = ConvertContext::new(&strict, &CATALOG);
        let err = converter().from_text("red", &cx).unwrap_err();
        assert!(err.reason.contains("Red, Amber, Green"));
    }
}
