use std::any::Any;
use std::cell::RefCell;
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;

use crate::bag::Detach;
use crate::observers::{Observers, Reporter};

/// A single mutable value that notifies its observers on change.
pub struct Watch<T> {
	body: Rc<WatchBody<T>>,
}

impl<T: 'static> From<Watch<T>> for Rc<dyn Any> {
	fn from(watch: Watch<T>) -> Self {
		watch.body
	}
}

impl<T: 'static> TryFrom<Rc<dyn Any>> for Watch<T> {
	type Error = Rc<dyn Any>;
	fn try_from(value: Rc<dyn Any>) -> Result<Self, Self::Error> {
		Rc::downcast::<WatchBody<T>>(value).map(|body| Watch { body })
	}
}

pub struct WatchBody<T> {
	value: RefCell<T>,
	equality: Equality<T>,
	observers: Observers<dyn Fn(&T, &T)>,
}

impl<T> Clone for Watch<T> {
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

impl<T> Default for Watch<T>
where
	T: Default + PartialEq + 'static,
{
	fn default() -> Self {
		Watch::new(Default::default())
	}
}

/// Decides whether a `set` actually changed the value.
pub struct Equality<T> {
	same: Option<Rc<dyn Fn(&T, &T) -> bool>>,
}

impl<T> Clone for Equality<T> {
	fn clone(&self) -> Self {
		Self {
			same: self.same.clone(),
		}
	}
}

impl<T: 'static> Equality<T> {
	pub fn partial_eq() -> Self
	where
		T: PartialEq,
	{
		Equality::by(|a: &T, b: &T| a == b)
	}

	/// Compares fxhash digests. Cheap for values that are costly to compare.
	pub fn hashed() -> Self
	where
		T: Hash,
	{
		Equality::by(|a: &T, b: &T| fxhash::hash64(a) == fxhash::hash64(b))
	}

	pub fn by(same: impl Fn(&T, &T) -> bool + 'static) -> Self {
		Equality {
			same: Some(Rc::new(same)),
		}
	}

	/// Every `set` notifies, even with an identical value.
	pub fn always_notify() -> Self {
		Equality { same: None }
	}

	pub(crate) fn same(&self, a: &T, b: &T) -> bool {
		match &self.same {
			Some(same) => same(a, b),
			None => false,
		}
	}
}

pub trait Toggle {
	fn toggle(&mut self);
}

impl Toggle for bool {
	fn toggle(&mut self) {
		*self = !*self
	}
}

impl<T> Watch<T>
where
	T: 'static,
{
	pub fn new(value: T) -> Self
	where
		T: PartialEq,
	{
		Watch::with_equality(value, Equality::partial_eq())
	}

	pub fn with_equality(value: T, equality: Equality<T>) -> Self {
		Watch::build(value, equality, Reporter::default())
	}

	pub(crate) fn build(value: T, equality: Equality<T>, reporter: Reporter) -> Self {
		Watch {
			body: Rc::new(WatchBody {
				value: RefCell::new(value),
				equality,
				observers: Observers::new(reporter),
			}),
		}
	}

	#[inline]
	pub fn get(&self) -> T
	where
		T: Clone,
	{
		self.body.value.borrow().clone()
	}

	/// Reads the value in place. `func` must not `set` this watch.
	#[inline]
	pub fn with<R>(&self, func: impl FnOnce(&T) -> R) -> R {
		func(&self.body.value.borrow())
	}

	#[inline]
	pub fn set(&self, value: T)
	where
		T: Clone,
	{
		let _ = self.replace(value);
	}

	/// Stores `value` and returns the previous one. Observers run only if
	/// the equality policy sees a change.
	pub fn replace(&self, value: T) -> T
	where
		T: Clone,
	{
		let (old, changed) = {
			let mut current = self.body.value.borrow_mut();
			let changed = !self.body.equality.same(&current, &value);
			(std::mem::replace(&mut *current, value), changed)
		};

		if changed {
			self.body.notify(&old);
		}

		old
	}

	/// Mutates a copy of the value and stores it. `func` may read this watch.
	pub fn update(&self, func: impl FnOnce(&mut T))
	where
		T: Clone,
	{
		let mut next = self.get();
		func(&mut next);

		let old = {
			let mut current = self.body.value.borrow_mut();
			if self.body.equality.same(&current, &next) {
				return;
			}
			std::mem::replace(&mut *current, next)
		};

		self.body.notify(&old);
	}

	#[inline]
	pub fn toggle(&self)
	where
		T: Toggle + Clone,
	{
		self.update(T::toggle)
	}

	/// Registers `observer`, called with `(new, old)` after every change.
	pub fn observe(&self, observer: impl Fn(&T, &T) + 'static) -> Detach {
		self.body.observers.attach(Rc::new(observer))
	}

	pub fn observer_count(&self) -> usize {
		self.body.observers.len()
	}

	pub(crate) fn handle_count(&self) -> usize {
		Rc::strong_count(&self.body)
	}

	pub fn ptr_eq(&self, other: &Watch<T>) -> bool {
		Rc::ptr_eq(&self.body, &other.body)
	}
}

impl<T: Clone + 'static> WatchBody<T> {
	fn notify(&self, old: &T) {
		// Observers may set this watch again, so hand them a copy.
		let new = self.value.borrow().clone();
		let delivered = self.observers.notify("watch", |observer| observer(&new, old));
		tracing::trace!(delivered, "watch: notified");
	}
}

impl<T> Debug for Watch<T>
where
	T: 'static + Debug,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.with(|value| value.fmt(f))
	}
}
