//! Participation of standard library and ecosystem types.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::ops::{ArrayOps, BTreeMapOps, BoxSliceOps, HashMapOps, VecDequeOps, VecOps};
use super::{TypeBuilder, XmlType};
use crate::convert::binary::{format_byte_buf, parse_byte_buf};
use crate::convert::scalar::{
    format_char, format_display, format_float, parse_char, parse_float, parse_number,
};
use crate::convert::temporal::{
    format_date, format_date_time, format_duration, format_offset, format_time, format_utc,
    parse_date, parse_date_time, parse_duration, parse_offset, parse_time, parse_utc,
};
use crate::convert::type_ref::{format_type_ref, parse_type_ref};
use crate::convert::{BoolConverter, ByteBuf, FnConverter, StringConverter, TypeRef};

macro_rules! text_types {
    ($($ty:ty => $tag:literal, $parse:expr, $format:expr;)*) => {
        $(
            impl XmlType for $ty {
                fn describe(ty: &mut TypeBuilder<Self>) {
                    ty.name($tag).converter(FnConverter::new($parse, $format));
                }
            }
        )*
    };
}

text_types! {
    i8 => "Int8", parse_number::<i8>, format_display::<i8>;
    i16 => "Int16", parse_number::<i16>, format_display::<i16>;
    i32 => "Int32", parse_number::<i32>, format_display::<i32>;
    i64 => "Int64", parse_number::<i64>, format_display::<i64>;
    i128 => "Int128", parse_number::<i128>, format_display::<i128>;
    isize => "IntSize", parse_number::<isize>, format_display::<isize>;
    u8 => "UInt8", parse_number::<u8>, format_display::<u8>;
    u16 => "UInt16", parse_number::<u16>, format_display::<u16>;
    u32 => "UInt32", parse_number::<u32>, format_display::<u32>;
    u64 => "UInt64", parse_number::<u64>, format_display::<u64>;
    u128 => "UInt128", parse_number::<u128>, format_display::<u128>;
    usize => "UIntSize", parse_number::<usize>, format_display::<usize>;
    f32 => "Single", parse_float::<f32>, format_float::<f32>;
    f64 => "Double", parse_float::<f64>, format_float::<f64>;
    char => "Char", parse_char, format_char;
    Decimal => "Decimal", parse_number::<Decimal>, format_display::<Decimal>;
    NaiveDate => "Date", parse_date, format_date;
    NaiveTime => "Time", parse_time, format_time;
    NaiveDateTime => "DateTime", parse_date_time, format_date_time;
    DateTime<Utc> => "DateTimeUtc", parse_utc, format_utc;
    DateTime<FixedOffset> => "DateTimeOffset", parse_offset, format_offset;
    TimeDelta => "TimeSpan", parse_duration, format_duration;
    Uuid => "Guid", parse_number::<Uuid>, format_display::<Uuid>;
    ByteBuf => "Base64Binary", parse_byte_buf, format_byte_buf;
    TypeRef => "Type", parse_type_ref, format_type_ref;
}

impl XmlType for bool {
    fn describe(ty: &mut TypeBuilder<Self>) {
        ty.name("Boolean").converter(BoolConverter::default());
    }
}

impl XmlType for String {
    fn describe(ty: &mut TypeBuilder<Self>) {
        ty.name("String").converter(StringConverter::default());
    }
}

impl<T: XmlType> XmlType for Vec<T> {
    fn describe(ty: &mut TypeBuilder<Self>) {
        ty.default_constructor()
            .collection::<T>(VecOps::<T>::default());
    }
}

impl<T: XmlType> XmlType for VecDeque<T> {
    fn describe(ty: &mut TypeBuilder<Self>) {
        ty.default_constructor()
            .collection::<T>(VecDequeOps::<T>::default());
    }
}

impl<T: XmlType, const N: usize> XmlType for [T; N] {
    fn describe(ty: &mut TypeBuilder<Self>) {
        ty.collection::<T>(ArrayOps::<T, N>::default());
    }
}

impl<T: XmlType> XmlType for Box<[T]> {
    fn describe(ty: &mut TypeBuilder<Self>) {
        ty.collection::<T>(BoxSliceOps::<T>::default());
    }
}

impl<K: XmlType + Eq + Hash, V: XmlType> XmlType for HashMap<K, V> {
    fn describe(ty: &mut TypeBuilder<Self>) {
        ty.default_constructor()
            .generic::<K>()
            .generic::<V>()
            .dictionary::<K, V>(HashMapOps::<K, V>::default());
    }
}

impl<K: XmlType + Ord, V: XmlType> XmlType for BTreeMap<K, V> {
    fn describe(ty: &mut TypeBuilder<Self>) {
        ty.default_constructor()
            .generic::<K>()
            .generic::<V>()
            .dictionary::<K, V>(BTreeMapOps::<K, V>::default());
    }
}

impl<T: XmlType> XmlType for Box<T> {
    fn describe(ty: &mut TypeBuilder<Self>) {
        ty.wrapper::<T>(Box::new, |boxed| &**boxed);
    }
}

impl<T: XmlType + Send + Sync> XmlType for Arc<T> {
    fn describe(ty: &mut TypeBuilder<Self>) {
        ty.wrapper::<T>(Arc::new, |shared| &**shared).shared();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::ConvertContext;
    use crate::namespace::QName;
    use crate::registry::{ContentMode, Registry, Shape};
    use crate::settings::Settings;

    fn round_trip<T: XmlType + PartialEq + std::fmt::Debug>(registry: &Registry, value: T) {
        let descriptor = registry.register::<T>().unwrap();
        let converter = descriptor.converter().unwrap();
        let catalog = registry.catalog();
        let settings = Settings::default();
        let cx = ConvertContext::new(&settings, &catalog);
        let text = converter.to_text(&value, &cx).unwrap();
        let back = converter.from_text(&text, &cx).unwrap();
        assert_eq!(back.downcast_ref::<T>(), Some(&value), "via '{}'", text);
    }

    #[test]
    fn test_scalar_tags() {
        let registry = Registry::new();
        let tags = [
            (registry.register::<bool>().unwrap(), "Boolean"),
            (registry.register::<i32>().unwrap(), "Int32"),
            (registry.register::<u64>().unwrap(), "UInt64"),
            (registry.register::<f64>().unwrap(), "Double"),
            (registry.register::<String>().unwrap(), "String"),
            (registry.register::<Uuid>().unwrap(), "Guid"),
            (registry.register::<TimeDelta>().unwrap(), "TimeSpan"),
        ];
        for (descriptor, tag) in tags {
            assert_eq!(descriptor.name(), &QName::new(tag));
            assert_eq!(descriptor.shape(), Shape::Scalar);
            assert!(descriptor.is_textual());
        }
    }

    #[test]
    fn test_scalar_round_trips() {
        let registry = Registry::new();
        round_trip(&registry, -12i8);
        round_trip(&registry, u128::MAX);
        round_trip(&registry, 2.5f32);
        round_trip(&registry, 'x');
        round_trip(&registry, Decimal::new(12345, 2));
        round_trip(&registry, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        round_trip(&registry, TimeDelta::new(90061, 500_000_000).unwrap());
        round_trip(&registry, Uuid::nil());
        round_trip(&registry, ByteBuf(vec![0, 1, 2, 255]));
        round_trip(&registry, "tab\there".to_string());
    }

    #[test]
    fn test_type_refs_use_registered_tags() {
        let registry = Registry::new();
        registry.register::<i64>().unwrap();
        round_trip(&registry, TypeRef::of::<i64>());
    }

    #[test]
    fn test_collection_shapes() {
        let registry = Registry::new();
        let list = registry.register::<Vec<i32>>().unwrap();
        assert_eq!(list.shape(), Shape::Collection);
        assert_eq!(list.name().local(), "Int32s");
        assert!(list.has_constructor());

        let array = registry.register::<[u8; 4]>().unwrap();
        assert_eq!(array.name().local(), "UInt8s");
        match array.content() {
            ContentMode::Collection(content) => assert!(!content.ops.fills_in_place()),
            _ => panic!("array is not a collection"),
        }

        let map = registry.register::<HashMap<String, i32>>().unwrap();
        assert_eq!(map.shape(), Shape::Dictionary);
        assert_eq!(map.name().local(), "HashMap_String_Int32");
    }

    #[test]
    fn test_wrappers_take_the_inner_tag() {
        let registry = Registry::new();
        let boxed = registry.register::<Box<i32>>().unwrap();
        assert_eq!(boxed.shape(), Shape::Wrapper);
        assert_eq!(boxed.name().local(), "Int32");
        assert!(boxed.is_textual());
        assert!(!boxed.is_shared());

        let shared = registry.register::<Arc<String>>().unwrap();
        assert!(shared.is_shared());
        let tag = QName::new("Int32");
        assert_eq!(
            registry.lookup_by_tag(&tag).unwrap().key().id(),
            std::any::TypeId::of::<i32>()
        );
    }
}
