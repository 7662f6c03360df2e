//! Links between watchables and UI-facing accessors.
//!
//! A binding pushes the source's current value into its target right away,
//! then again after every source change. Two-way bindings also write user
//! edits reported by the target back into the source.

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::Rc;

use enclose::enclose;
use smallvec::SmallVec;

use crate::bag::Detach;
use crate::list::{Change, WatchList};
use crate::watch::Watch;

/// Something a bound value is written into, typically a widget property.
pub trait Target<U> {
	fn set(&self, value: U);

	/// Registers `observer` for changes the user makes on the target side.
	/// Targets that cannot be edited keep the default and return `None`.
	fn observe(&self, _observer: Rc<dyn Fn(&U)>) -> Option<Detach> {
		None
	}
}

impl<U> Target<U> for Watch<U>
where
	U: Clone + 'static,
{
	fn set(&self, value: U) {
		Watch::set(self, value)
	}

	fn observe(&self, observer: Rc<dyn Fn(&U)>) -> Option<Detach> {
		Some(Watch::observe(self, move |new, _| observer(new)))
	}
}

impl<U, G> Target<U> for Rc<G>
where
	G: Target<U> + ?Sized,
{
	fn set(&self, value: U) {
		(**self).set(value)
	}

	fn observe(&self, observer: Rc<dyn Fn(&U)>) -> Option<Detach> {
		(**self).observe(observer)
	}
}

/// Conversion between a source value and what the target displays.
pub struct Template<T, U> {
	to_target: Rc<dyn Fn(&T) -> U>,
	to_source: Option<Rc<dyn Fn(&U) -> T>>,
}

impl<T, U> Clone for Template<T, U> {
	fn clone(&self) -> Self {
		Self {
			to_target: self.to_target.clone(),
			to_source: self.to_source.clone(),
		}
	}
}

impl<T: 'static, U: 'static> Template<T, U> {
	pub fn one_way(to_target: impl Fn(&T) -> U + 'static) -> Self {
		Template {
			to_target: Rc::new(to_target),
			to_source: None,
		}
	}

	pub fn two_way(
		to_target: impl Fn(&T) -> U + 'static,
		to_source: impl Fn(&U) -> T + 'static,
	) -> Self {
		Template {
			to_target: Rc::new(to_target),
			to_source: Some(Rc::new(to_source)),
		}
	}

	pub fn is_two_way(&self) -> bool {
		self.to_source.is_some()
	}
}

impl<T: Clone + 'static> Template<T, T> {
	pub fn identity() -> Self {
		Template::two_way(T::clone, T::clone)
	}
}

/// A live link. Disposing it, explicitly or by dropping it, detaches every
/// observer it registered.
#[must_use = "dropping a Binding disposes it"]
pub struct Binding {
	detaches: RefCell<SmallVec<[Detach; 2]>>,
}

impl Binding {
	fn new(detaches: SmallVec<[Detach; 2]>) -> Self {
		Binding {
			detaches: RefCell::new(detaches),
		}
	}

	pub fn is_active(&self) -> bool {
		!self.detaches.borrow().is_empty()
	}

	/// Returns `false` if the binding was already disposed.
	pub fn dispose(&self) -> bool {
		let detaches = std::mem::take(&mut *self.detaches.borrow_mut());
		if detaches.is_empty() {
			return false;
		}

		for detach in &detaches {
			detach.detach();
		}

		tracing::trace!(observers = detaches.len(), "binding: disposed");
		true
	}
}

impl Drop for Binding {
	fn drop(&mut self) {
		self.dispose();
	}
}

impl Debug for Binding {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Binding")
			.field("active", &self.is_active())
			.finish()
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Flow {
	Idle,
	ToTarget,
	ToSource,
}

struct Link<U> {
	flow: Cell<Flow>,
	// Last value the target reported, to recognise its own echo.
	reported: RefCell<Option<U>>,
}

impl<U> Link<U> {
	fn enter(&self, flow: Flow) -> Entered<'_> {
		Entered {
			prev: self.flow.replace(flow),
			flow: &self.flow,
		}
	}

	fn push(&self, target: &impl Target<U>, value: U) {
		let _entered = self.enter(Flow::ToTarget);
		target.set(value);
	}
}

/// Puts the previous direction back, also when a template or target panics.
struct Entered<'a> {
	flow: &'a Cell<Flow>,
	prev: Flow,
}

impl<'a> Drop for Entered<'a> {
	fn drop(&mut self) {
		self.flow.set(self.prev);
	}
}

/// Binds with the identity template.
pub fn bind<T, G>(target: G, source: &Watch<T>) -> Binding
where
	T: Clone + PartialEq + 'static,
	G: Target<T> + 'static,
{
	bind_with(target, source, Template::identity())
}

pub fn bind_with<T, U, G>(target: G, source: &Watch<T>, template: Template<T, U>) -> Binding
where
	T: Clone + 'static,
	U: Clone + PartialEq + 'static,
	G: Target<U> + 'static,
{
	let target = Rc::new(target);
	let link = Rc::new(Link {
		flow: Cell::new(Flow::Idle),
		reported: RefCell::new(None),
	});
	let to_target = template.to_target;

	link.push(&target, source.with(|value| to_target(value)));

	let mut detaches = SmallVec::new();

	detaches.push(source.observe(enclose!((target, link) move |new: &T, _: &T| {
		let value = to_target(new);
		if link.flow.get() == Flow::ToSource && link.reported.borrow().as_ref() == Some(&value) {
			tracing::trace!("binding: skipped echo of a target write");
			return;
		}
		link.push(&target, value);
	})));

	if let Some(to_source) = template.to_source {
		let source = source.clone();
		let observer: Rc<dyn Fn(&U)> = Rc::new(enclose!((link) move |value: &U| {
			if link.flow.get() == Flow::ToTarget {
				return;
			}

			*link.reported.borrow_mut() = Some(value.clone());
			let _entered = link.enter(Flow::ToSource);
			source.set(to_source(value));
		}));

		if let Some(detach) = target.observe(observer) {
			detaches.push(detach);
		}
	}

	Binding::new(detaches)
}

/// A list-shaped target, such as the children of a container widget.
pub trait ListTarget<U> {
	fn insert(&self, position: usize, item: U);
	fn remove(&self, position: usize);
	fn replace(&self, position: usize, item: U);
	fn relocate(&self, from: usize, to: usize);
}

impl<U> ListTarget<U> for WatchList<U>
where
	U: Clone + 'static,
{
	fn insert(&self, position: usize, item: U) {
		if let Err(error) = WatchList::insert(self, item, Some(position)) {
			tracing::warn!(%error, "list target: insert out of sync");
		}
	}

	fn remove(&self, position: usize) {
		if let Err(error) = self.remove_at(position) {
			tracing::warn!(%error, "list target: remove out of sync");
		}
	}

	fn replace(&self, position: usize, item: U) {
		let result = match self.id_at(position) {
			Some(id) => self.update_by_id(id, item).map(|_| ()),
			None => Err(crate::Error::OutOfRange {
				position,
				len: self.len(),
			}),
		};
		if let Err(error) = result {
			tracing::warn!(%error, "list target: replace out of sync");
		}
	}

	fn relocate(&self, from: usize, to: usize) {
		let result = match self.id_at(from) {
			Some(id) => self.move_by_id(id, to),
			None => Err(crate::Error::OutOfRange {
				position: from,
				len: self.len(),
			}),
		};
		if let Err(error) = result {
			tracing::warn!(%error, "list target: move out of sync");
		}
	}
}

impl<U, G> ListTarget<U> for Rc<G>
where
	G: ListTarget<U> + ?Sized,
{
	fn insert(&self, position: usize, item: U) {
		(**self).insert(position, item)
	}

	fn remove(&self, position: usize) {
		(**self).remove(position)
	}

	fn replace(&self, position: usize, item: U) {
		(**self).replace(position, item)
	}

	fn relocate(&self, from: usize, to: usize) {
		(**self).relocate(from, to)
	}
}

/// Renders `source` into an initially empty `target`, one patch per change.
pub fn bind_list<T, U, G>(
	target: G,
	source: &WatchList<T>,
	template: impl Fn(&T) -> U + 'static,
) -> Binding
where
	T: Clone + 'static,
	G: ListTarget<U> + 'static,
{
	for (position, (_, item)) in source.iter().enumerate() {
		target.insert(position, template(&item));
	}

	let detach = source.observe(move |change| match change {
		Change::Insert { position, item, .. } => target.insert(*position, template(item)),
		Change::Remove { position, .. } => target.remove(*position),
		Change::Update { position, new, .. } => target.replace(*position, template(new)),
		Change::Move { from, to, .. } => target.relocate(*from, *to),
	});

	Binding::new(smallvec::smallvec![detach])
}
