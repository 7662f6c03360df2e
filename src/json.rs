//! JSON output for watchables.
//!
//! Every watchable has exactly one serialized shape, decided by its type:
//!
//! - [`Watch`] writes its current value, whatever that value is;
//! - [`WatchObject`] writes a map of its set fields in creation order;
//! - [`WatchList`] writes an array of its items in position order.
//!
//! Entry ids and observers are never written.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::error::Result;
use crate::list::WatchList;
use crate::object::WatchObject;
use crate::watch::Watch;

pub fn write<T: Serialize + ?Sized>(value: &T) -> Result<String> {
	Ok(serde_json::to_string(value)?)
}

pub fn write_pretty<T: Serialize + ?Sized>(value: &T) -> Result<String> {
	Ok(serde_json::to_string_pretty(value)?)
}

pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<serde_json::Value> {
	Ok(serde_json::to_value(value)?)
}

impl<T> Serialize for Watch<T>
where
	T: Serialize + 'static,
{
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		self.with(|value| value.serialize(serializer))
	}
}

impl<T> Serialize for WatchList<T>
where
	T: Serialize + Clone + 'static,
{
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let items = self.to_vec();
		let mut seq = serializer.serialize_seq(Some(items.len()))?;
		for item in &items {
			seq.serialize_element(item)?;
		}
		seq.end()
	}
}

impl<V> Serialize for WatchObject<V>
where
	V: Serialize + Clone + PartialEq + 'static,
{
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let entries = self.entries();
		let mut map = serializer.serialize_map(Some(entries.len()))?;
		for (key, value) in &entries {
			map.serialize_entry(key, value)?;
		}
		map.end()
	}
}
