//! Insertion-ordered JSON maps backed by a `Vec`.
//!
//! Project records store stages and debaters as JSON objects keyed by id.
//! The engines need insertion order (ready-sets and rosters are reported in
//! creation order), so the entries live in a `Vec` whose elements carry their
//! own key, and this module (de)serializes that `Vec` as an object.

use serde::de::{Deserialize, Deserializer, Error as _, MapAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;
use std::marker::PhantomData;

/// An entry that is stored under its own key.
pub trait Keyed {
    fn key(&self) -> &str;
    fn set_key(&mut self, key: String);
}

pub fn serialize<S, T>(items: &[T], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Keyed + Serialize,
{
    let mut map = serializer.serialize_map(Some(items.len()))?;
    for item in items {
        map.serialize_entry(item.key(), item)?;
    }
    map.end()
}

pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Keyed + Deserialize<'de>,
{
    deserializer.deserialize_map(KeyedVisitor(PhantomData))
}

struct KeyedVisitor<T>(PhantomData<T>);

impl<'de, T> Visitor<'de> for KeyedVisitor<T>
where
    T: Keyed + Deserialize<'de>,
{
    type Value = Vec<T>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of entries keyed by id")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut items: Vec<T> = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, mut value)) = access.next_entry::<String, T>()? {
            if items.iter().any(|existing| existing.key() == key) {
                return Err(A::Error::custom(format!("duplicate key '{}'", key)));
            }
            value.set_key(key);
            items.push(value);
        }
        Ok(items)
    }
}
