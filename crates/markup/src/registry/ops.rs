//! Type-erased operations on collection- and dictionary-shaped values.

use std::any::Any;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::hash::Hash;
use std::marker::PhantomData;

/// Enumerates, fills and synthesizes a collection type.
pub trait CollectionOps: Send + Sync {
    /// Items of `collection`, in order.
    fn items<'a>(&self, collection: &'a dyn Any) -> Vec<&'a dyn Any>;

    /// Whether an existing value can be appended to with [`push`](Self::push).
    fn fills_in_place(&self) -> bool {
        true
    }

    /// Appends `item`; returns `false` if either value has the wrong type.
    fn push(&self, collection: &mut dyn Any, item: Box<dyn Any>) -> bool;

    /// Builds a new collection from buffered items.
    fn build(&self, items: Vec<Box<dyn Any>>) -> Option<Box<dyn Any>>;
}

/// Enumerates, fills and synthesizes a dictionary type.
pub trait DictionaryOps: Send + Sync {
    fn entries<'a>(&self, map: &'a dyn Any) -> Vec<(&'a dyn Any, &'a dyn Any)>;

    fn fills_in_place(&self) -> bool {
        true
    }

    fn insert(&self, map: &mut dyn Any, key: Box<dyn Any>, value: Box<dyn Any>) -> bool;

    fn build(&self, entries: Vec<(Box<dyn Any>, Box<dyn Any>)>) -> Option<Box<dyn Any>>;
}

fn downcast_all<T: Any>(items: Vec<Box<dyn Any>>) -> Option<Vec<T>> {
    items
        .into_iter()
        .map(|item| item.downcast::<T>().ok().map(|item| *item))
        .collect()
}

fn downcast_pairs<K: Any, V: Any>(entries: Vec<(Box<dyn Any>, Box<dyn Any>)>) -> Option<Vec<(K, V)>> {
    entries
        .into_iter()
        .map(|(k, v)| Some((*k.downcast::<K>().ok()?, *v.downcast::<V>().ok()?)))
        .collect()
}

pub struct VecOps<T>(PhantomData<fn() -> T>);

impl<T> Default for VecOps<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T: Any> CollectionOps for VecOps<T> {
    fn items<'a>(&self, collection: &'a dyn Any) -> Vec<&'a dyn Any> {
        collection
            .downcast_ref::<Vec<T>>()
            .map(|items| items.iter().map(|item| item as &dyn Any).collect())
            .unwrap_or_default()
    }

    fn push(&self, collection: &mut dyn Any, item: Box<dyn Any>) -> bool {
        match (collection.downcast_mut::<Vec<T>>(), item.downcast::<T>()) {
            (Some(items), Ok(item)) => {
                items.push(*item);
                true
            }
            _ => false,
        }
    }

    fn build(&self, items: Vec<Box<dyn Any>>) -> Option<Box<dyn Any>> {
        downcast_all::<T>(items).map(|items| Box::new(items) as Box<dyn Any>)
    }
}

pub struct VecDequeOps<T>(PhantomData<fn() -> T>);

impl<T> Default for VecDequeOps<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T: Any> CollectionOps for VecDequeOps<T> {
    fn items<'a>(&self, collection: &'a dyn Any) -> Vec<&'a dyn Any> {
        collection
            .downcast_ref::<VecDeque<T>>()
            .map(|items| items.iter().map(|item| item as &dyn Any).collect())
            .unwrap_or_default()
    }

    fn push(&self, collection: &mut dyn Any, item: Box<dyn Any>) -> bool {
        match (collection.downcast_mut::<VecDeque<T>>(), item.downcast::<T>()) {
            (Some(items), Ok(item)) => {
                items.push_back(*item);
                true
            }
            _ => false,
        }
    }

    fn build(&self, items: Vec<Box<dyn Any>>) -> Option<Box<dyn Any>> {
        downcast_all::<T>(items).map(|items| Box::new(VecDeque::from(items)) as Box<dyn Any>)
    }
}

/// Fixed-size arrays: never filled in place, built once all items are read.
pub struct ArrayOps<T, const N: usize>(PhantomData<fn() -> T>);

impl<T, const N: usize> Default for ArrayOps<T, N> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T: Any, const N: usize> CollectionOps for ArrayOps<T, N> {
    fn items<'a>(&self, collection: &'a dyn Any) -> Vec<&'a dyn Any> {
        collection
            .downcast_ref::<[T; N]>()
            .map(|items| items.iter().map(|item| item as &dyn Any).collect())
            .unwrap_or_default()
    }

    fn fills_in_place(&self) -> bool {
        false
    }

    fn push(&self, _collection: &mut dyn Any, _item: Box<dyn Any>) -> bool {
        false
    }

    fn build(&self, items: Vec<Box<dyn Any>>) -> Option<Box<dyn Any>> {
        let items = downcast_all::<T>(items)?;
        let array: [T; N] = items.try_into().ok()?;
        Some(Box::new(array))
    }
}

pub struct BoxSliceOps<T>(PhantomData<fn() -> T>);

impl<T> Default for BoxSliceOps<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T: Any> CollectionOps for BoxSliceOps<T> {
    fn items<'a>(&self, collection: &'a dyn Any) -> Vec<&'a dyn Any> {
        collection
            .downcast_ref::<Box<[T]>>()
            .map(|items| items.iter().map(|item| item as &dyn Any).collect())
            .unwrap_or_default()
    }

    fn fills_in_place(&self) -> bool {
        false
    }

    fn push(&self, _collection: &mut dyn Any, _item: Box<dyn Any>) -> bool {
        false
    }

    fn build(&self, items: Vec<Box<dyn Any>>) -> Option<Box<dyn Any>> {
        downcast_all::<T>(items).map(|items| Box::new(items.into_boxed_slice()) as Box<dyn Any>)
    }
}

pub struct HashMapOps<K, V>(PhantomData<fn() -> (K, V)>);

impl<K, V> Default for HashMapOps<K, V> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<K: Any + Eq + Hash, V: Any> DictionaryOps for HashMapOps<K, V> {
    fn entries<'a>(&self, map: &'a dyn Any) -> Vec<(&'a dyn Any, &'a dyn Any)> {
        map.downcast_ref::<HashMap<K, V>>()
            .map(|map| {
                map.iter()
                    .map(|(k, v)| (k as &dyn Any, v as &dyn Any))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn insert(&self, map: &mut dyn Any, key: Box<dyn Any>, value: Box<dyn Any>) -> bool {
        match (
            map.downcast_mut::<HashMap<K, V>>(),
            key.downcast::<K>(),
            value.downcast::<V>(),
        ) {
            (Some(map), Ok(key), Ok(value)) => {
                map.insert(*key, *value);
                true
            }
            _ => false,
        }
    }

    fn build(&self, entries: Vec<(Box<dyn Any>, Box<dyn Any>)>) -> Option<Box<dyn Any>> {
        downcast_pairs::<K, V>(entries)
            .map(|pairs| Box::new(pairs.into_iter().collect::<HashMap<K, V>>()) as Box<dyn Any>)
    }
}

pub struct BTreeMapOps<K, V>(PhantomData<fn() -> (K, V)>);

impl<K, V> Default for BTreeMapOps<K, V> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<K: Any + Ord, V: Any> DictionaryOps for BTreeMapOps<K, V> {
    fn entries<'a>(&self, map: &'a dyn Any) -> Vec<(&'a dyn Any, &'a dyn Any)> {
        map.downcast_ref::<BTreeMap<K, V>>()
            .map(|map| {
                map.iter()
                    .map(|(k, v)| (k as &dyn Any, v as &dyn Any))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn insert(&self, map: &mut dyn Any, key: Box<dyn Any>, value: Box<dyn Any>) -> bool {
        match (
            map.downcast_mut::<BTreeMap<K, V>>(),
            key.downcast::<K>(),
            value.downcast::<V>(),
        ) {
            (Some(map), Ok(key), Ok(value)) => {
                map.insert(*key, *value);
                true
            }
            _ => false,
        }
    }

    fn build(&self, entries: Vec<(Box<dyn Any>, Box<dyn Any>)>) -> Option<Box<dyn Any>> {
        downcast_pairs::<K, V>(entries)
            .map(|pairs| Box::new(pairs.into_iter().collect::<BTreeMap<K, V>>()) as Box<dyn Any>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed<T: Any>(items: Vec<T>) -> Vec<Box<dyn Any>> {
        items.into_iter().map(|i| Box::new(i) as Box<dyn Any>).collect()
    }

    #[test]
    fn test_vec_fill_and_build() {
        let ops = VecOps::<i32>::default();
        let mut value: Box<dyn Any> = Box::new(vec![1]);
        assert!(ops.push(value.as_mut(), Box::new(2)));
        assert!(!ops.push(value.as_mut(), Box::new("wrong")));
        assert_eq!(value.downcast_ref::<Vec<i32>>(), Some(&vec![1, 2]));

        let built = ops.build(boxed(vec![3, 4])).unwrap();
        assert_eq!(built.downcast_ref::<Vec<i32>>(), Some(&vec![3, 4]));
        assert_eq!(ops.items(built.as_ref()).len(), 2);
    }

    #[test]
    fn test_array_requires_exact_length() {
        let ops = ArrayOps::<u8, 3>::default();
        assert!(!ops.fills_in_place());
        let built = ops.build(boxed(vec![1u8, 2, 3])).unwrap();
        assert_eq!(built.downcast_ref::<[u8; 3]>(), Some(&[1, 2, 3]));
        assert!(ops.build(boxed(vec![1u8, 2])).is_none());
    }

    #[test]
    fn test_box_slice_and_deque() {
        let built = BoxSliceOps::<char>::default()
            .build(boxed(vec!['a', 'b']))
            .unwrap();
        assert_eq!(built.downcast_ref::<Box<[char]>>().map(|b| b.len()), Some(2));

        let ops = VecDequeOps::<i64>::default();
        let mut deque: Box<dyn Any> = Box::new(VecDeque::<i64>::new());
        assert!(ops.push(deque.as_mut(), Box::new(9i64)));
        assert_eq!(ops.items(deque.as_ref()).len(), 1);
    }

    #[test]
    fn test_maps() {
        let ops = HashMapOps::<String, i32>::default();
        let built = ops
            .build(vec![(
                Box::new("a".to_string()) as Box<dyn Any>,
                Box::new(1) as Box<dyn Any>,
            )])
            .unwrap();
        assert_eq!(
            built.downcast_ref::<HashMap<String, i32>>().and_then(|m| m.get("a")),
            Some(&1)
        );

        let ops = BTreeMapOps::<i32, bool>::default();
        let mut map: Box<dyn Any> = Box::new(BTreeMap::<i32, bool>::new());
        assert!(ops.insert(map.as_mut(), Box::new(2), Box::new(true)));
        assert!(!ops.insert(map.as_mut(), Box::new("x"), Box::new(true)));
        assert_eq!(ops.entries(map.as_ref()).len(), 1);
    }
}
