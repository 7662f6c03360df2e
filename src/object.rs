use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use fxhash::FxHashMap;

use crate::bag::Detach;
use crate::observers::{Observers, Reporter};
use crate::watch::{Equality, Watch};

/// A keyed record whose fields are individually watchable.
///
/// Every field is a `Watch<Option<V>>`: `None` means the key is unset.
/// Asking for an [`accessor`](WatchObject::accessor) creates the field on
/// first use, so a binding can be made before the data arrives.
pub struct WatchObject<V> {
	body: Rc<ObjectBody<V>>,
}

impl<V> Clone for WatchObject<V> {
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

impl<V> Default for WatchObject<V>
where
	V: Clone + PartialEq + 'static,
{
	fn default() -> Self {
		WatchObject::new()
	}
}

type FieldObserver<V> = dyn Fn(&str, &Option<V>, &Option<V>);

struct ObjectBody<V> {
	inner: RefCell<ObjectInner<V>>,
	observers: Observers<FieldObserver<V>>,
	this: Weak<ObjectBody<V>>,
}

struct ObjectInner<V> {
	// Creation order, for `keys` and serialization.
	fields: Vec<(Rc<str>, Watch<Option<V>>)>,
	index: FxHashMap<Rc<str>, usize>,
}

impl<V> WatchObject<V>
where
	V: Clone + PartialEq + 'static,
{
	pub fn new() -> Self {
		WatchObject::build(Reporter::default())
	}

	pub(crate) fn build(reporter: Reporter) -> Self {
		WatchObject {
			body: Rc::new_cyclic(|this| ObjectBody {
				inner: RefCell::new(ObjectInner {
					fields: Vec::new(),
					index: FxHashMap::default(),
				}),
				observers: Observers::new(reporter),
				this: this.clone(),
			}),
		}
	}

	pub fn from_pairs<K: AsRef<str>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
		let object = WatchObject::new();
		object.update(pairs);
		object
	}

	/// The watchable field for `key`, created unset if missing. Accessors
	/// for the same key share one watch.
	pub fn accessor(&self, key: &str) -> Watch<Option<V>> {
		if let Some(field) = self.field(key) {
			return field;
		}

		let key: Rc<str> = Rc::from(key);
		let field = Watch::build(
			None,
			Equality::partial_eq(),
			self.body.observers.reporter().clone(),
		);

		// Fields only hold a weak link back, the object owns the fields.
		let this = self.body.this.clone();
		field.observe({
			let key = key.clone();
			move |new, old| {
				if let Some(body) = this.upgrade() {
					body.observers
						.notify("object", |observer| observer(&*key, new, old));
				}
			}
		});

		let mut inner = self.body.inner.borrow_mut();
		let position = inner.fields.len();
		inner.fields.push((key.clone(), field.clone()));
		inner.index.insert(key, position);

		field
	}

	pub fn get(&self, key: &str) -> Option<V> {
		self.field(key).and_then(|field| field.get())
	}

	pub fn set(&self, key: &str, value: V) {
		self.accessor(key).set(Some(value));
	}

	/// Unsets `key`. The field is dropped unless an accessor or a field
	/// observer still holds it; those keep working on the unset field.
	pub fn remove(&self, key: &str) -> Option<V> {
		let field = self.field(key)?;
		let old = field.replace(None);

		// `fields` and `field` hold it, the forwarding observer watches it.
		if field.handle_count() == 2 && field.observer_count() == 1 {
			drop(field);
			self.prune(key);
		}

		old
	}

	pub fn contains(&self, key: &str) -> bool {
		self.get(key).is_some()
	}

	pub fn update<K: AsRef<str>>(&self, pairs: impl IntoIterator<Item = (K, V)>) {
		for (key, value) in pairs {
			self.set(key.as_ref(), value);
		}
	}

	/// Keys currently set, in field creation order.
	pub fn keys(&self) -> Vec<String> {
		self.entries().into_iter().map(|(key, _)| key).collect()
	}

	pub fn entries(&self) -> Vec<(String, V)> {
		let fields = self.body.inner.borrow().fields.clone();
		fields
			.into_iter()
			.filter_map(|(key, field)| field.get().map(|value| (key.to_string(), value)))
			.collect()
	}

	pub fn len(&self) -> usize {
		self.entries().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Called with `(key, new, old)` whenever any field changes.
	pub fn observe(&self, observer: impl Fn(&str, &Option<V>, &Option<V>) + 'static) -> Detach {
		self.body.observers.attach(Rc::new(observer))
	}

	fn prune(&self, key: &str) {
		let mut inner = self.body.inner.borrow_mut();
		let ObjectInner { fields, index } = &mut *inner;
		if let Some(position) = index.remove(key) {
			fields.remove(position);
			for (offset, (key, _)) in fields[position..].iter().enumerate() {
				index.insert(key.clone(), position + offset);
			}
			tracing::trace!(key, fields = fields.len(), "object: dropped unset field");
		}
	}

	fn field(&self, key: &str) -> Option<Watch<Option<V>>> {
		let inner = self.body.inner.borrow();
		let position = inner.index.get(key)?;
		Some(inner.fields[*position].1.clone())
	}
}

impl<V> Debug for WatchObject<V>
where
	V: Clone + PartialEq + Debug + 'static,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_map().entries(self.entries()).finish()
	}
}
