//! Converters for booleans, numbers, characters and strings.

use std::any::Any;
use std::fmt::Display;
use std::str::FromStr;

use super::{ConvertContext, TextConverter};
use crate::error::ConvertError;
use crate::escape;

/// Parses the boolean spellings accepted on read, ignoring ASCII case.
pub fn parse_bool(text: &str) -> Result<bool, ConvertError> {
    let text = text.trim();
    for (spelling, value) in [
        ("true", true),
        ("false", false),
        ("1", true),
        ("0", false),
        ("yes", true),
        ("no", false),
        ("on", true),
        ("off", false),
    ] {
        if text.eq_ignore_ascii_case(spelling) {
            return Ok(value);
        }
    }
    Err(ConvertError::new(format!("'{}' is not a boolean", text)))
}

/// Booleans as `true`/`false`, or `1`/`0` in numeric mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoolConverter {
    numeric: bool,
}

impl BoolConverter {
    pub fn numeric() -> Self {
        Self { numeric: true }
    }
}

impl TextConverter for BoolConverter {
    fn from_text(&self, text: &str, _cx: &ConvertContext<'_>) -> Result<Box<dyn Any>, ConvertError> {
        parse_bool(text).map(|b| Box::new(b) as Box<dyn Any>)
    }

    fn to_text(&self, value: &dyn Any, _cx: &ConvertContext<'_>) -> Option<String> {
        let value = *value.downcast_ref::<bool>()?;
        Some(match (self.numeric, value) {
            (true, true) => "1".to_string(),
            (true, false) => "0".to_string(),
            (false, v) => v.to_string(),
        })
    }
}

/// Parses integers and decimals through `FromStr`, ignoring surrounding whitespace.
pub fn parse_number<T>(text: &str, _cx: &ConvertContext<'_>) -> Result<T, ConvertError>
where
    T: FromStr,
    T::Err: Display,
{
    let trimmed = text.trim();
    let trimmed = trimmed.strip_prefix('+').unwrap_or(trimmed);
    trimmed.parse::<T>().map_err(|e| ConvertError::new(e.to_string()))
}

pub fn format_display<T: Display>(value: &T, _cx: &ConvertContext<'_>) -> Option<String> {
    Some(value.to_string())
}

/// Floating point numbers, with `INF`, `-INF` and `NaN` for the special values.
pub trait Float: Copy + FromStr + Display {
    const INFINITY: Self;
    const NEG_INFINITY: Self;
    const NAN: Self;
    fn is_nan(self) -> bool;
    fn is_infinite(self) -> bool;
    fn is_sign_negative(self) -> bool;
}

macro_rules! impl_float {
    ($($ty:ty),*) => {
        $(
            impl Float for $ty {
                const INFINITY: Self = <$ty>::INFINITY;
                const NEG_INFINITY: Self = <$ty>::NEG_INFINITY;
                const NAN: Self = <$ty>::NAN;
                fn is_nan(self) -> bool {
                    <$ty>::is_nan(self)
                }
                fn is_infinite(self) -> bool {
                    <$ty>::is_infinite(self)
                }
                fn is_sign_negative(self) -> bool {
                    <$ty>::is_sign_negative(self)
                }
            }
        )*
    };
}

impl_float!(f32, f64);

pub fn parse_float<T>(text: &str, _cx: &ConvertContext<'_>) -> Result<T, ConvertError>
where
    T: Float,
    <T as FromStr>::Err: Display,
{
    match text.trim() {
        "INF" | "+INF" | "Infinity" => Ok(T::INFINITY),
        "-INF" | "-Infinity" => Ok(T::NEG_INFINITY),
        "NaN" => Ok(T::NAN),
        other => other
            .parse::<T>()
            .map_err(|e| ConvertError::new(e.to_string())),
    }
}

pub fn format_float<T: Float>(value: &T, _cx: &ConvertContext<'_>) -> Option<String> {
    let value = *value;
    let text = if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() && value.is_sign_negative() {
        "-INF".to_string()
    } else if value.is_infinite() {
        "INF".to_string()
    } else {
        value.to_string()
    };
    Some(text)
}

pub fn parse_char(text: &str, cx: &ConvertContext<'_>) -> Result<char, ConvertError> {
    let decoded = if cx.settings.escape_text {
        escape::decode(text)
    } else {
        text.into()
    };
    let mut chars = decoded.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(ConvertError::new("expected exactly one character")),
    }
}

pub fn format_char(value: &char, cx: &ConvertContext<'_>) -> Option<String> {
    let mut buf = [0u8; 4];
    let text: &str = value.encode_utf8(&mut buf);
    Some(if cx.settings.escape_text {
        escape::encode(text).into_owned()
    } else {
        text.to_string()
    })
}

/// Strings, with optional reversible escaping.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringConverter {
    /// `None` follows [`Settings::escape_text`](crate::Settings::escape_text).
    escape: Option<bool>,
}

impl StringConverter {
    pub fn escaped() -> Self {
        Self { escape: Some(true) }
    }

    pub fn raw() -> Self {
        Self {
            escape: Some(false),
        }
    }

    fn escapes(&self, cx: &ConvertContext<'_>) -> bool {
        self.escape.unwrap_or(cx.settings.escape_text)
    }
}

impl TextConverter for StringConverter {
    fn from_text(&self, text: &str, cx: &ConvertContext<'_>) -> Result<Box<dyn Any>, ConvertError> {
        let value = if self.escapes(cx) {
            escape::decode(text).into_owned()
        } else {
            text.to_string()
        };
        Ok(Box::new(value))
    }

    fn to_text(&self, value: &dyn Any, cx: &ConvertContext<'_>) -> Option<String> {
        let value = value.downcast_ref::<String>()?;
        Some(if self.escapes(cx) {
            escape::encode(value).into_owned()
        } else {
            value.clone()
        })
    }
}
