use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt::{Debug, Display};
use std::rc::Rc;

use fxhash::FxHashMap;

use crate::bag::Detach;
use crate::error::{Error, Result};
use crate::observers::{Observers, Reporter};

/// Stable identity of a list entry. Never reused by the list that issued it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct EntryId(u64);

impl Display for EntryId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "#{}", self.0)
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ChangeKind {
	Insert,
	Remove,
	Update,
	Move,
}

/// One mutation of a [`WatchList`], enough to patch a rendered copy of it.
#[derive(Clone, PartialEq, Debug)]
pub enum Change<T> {
	Insert { id: EntryId, position: usize, item: T },
	Remove { id: EntryId, position: usize, item: T },
	Update { id: EntryId, position: usize, old: T, new: T },
	Move { id: EntryId, from: usize, to: usize },
}

impl<T> Change<T> {
	pub fn kind(&self) -> ChangeKind {
		match self {
			Change::Insert { .. } => ChangeKind::Insert,
			Change::Remove { .. } => ChangeKind::Remove,
			Change::Update { .. } => ChangeKind::Update,
			Change::Move { .. } => ChangeKind::Move,
		}
	}

	pub fn id(&self) -> EntryId {
		match self {
			Change::Insert { id, .. }
			| Change::Remove { id, .. }
			| Change::Update { id, .. }
			| Change::Move { id, .. } => *id,
		}
	}

	/// Position the entry occupies after the change. For removals, the
	/// position it was removed from.
	pub fn position(&self) -> usize {
		match self {
			Change::Insert { position, .. }
			| Change::Remove { position, .. }
			| Change::Update { position, .. } => *position,
			Change::Move { to, .. } => *to,
		}
	}
}

/// Ordered collection with individually observable mutations.
///
/// Every observer receives changes in the order the mutations happened. A
/// mutation made by an observer is delivered once the change being delivered
/// has reached all observers, so the mutating call returns before its own
/// observers run.
pub struct WatchList<T> {
	body: Rc<ListBody<T>>,
}

impl<T> Clone for WatchList<T> {
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

impl<T: Clone + 'static> Default for WatchList<T> {
	fn default() -> Self {
		WatchList::new()
	}
}

struct ListBody<T> {
	inner: RefCell<ListInner<T>>,
	observers: Observers<dyn Fn(&Change<T>)>,
	outbox: RefCell<VecDeque<Change<T>>>,
	delivering: Cell<bool>,
}

struct ListInner<T> {
	entries: Vec<(EntryId, T)>,
	index: FxHashMap<EntryId, usize>,
	next: u64,
}

impl<T> ListInner<T> {
	fn issue(&mut self) -> EntryId {
		let id = EntryId(self.next);
		self.next += 1;
		id
	}

	fn lookup(&self, id: EntryId) -> Result<usize> {
		self.index.get(&id).copied().ok_or(Error::NotFound(id))
	}

	/// Refreshes the index for `entries[from..=to]`.
	fn reindex(&mut self, from: usize, to: usize) {
		let to = to.min(self.entries.len().saturating_sub(1));
		for position in from..=to {
			if let Some((id, _)) = self.entries.get(position) {
				self.index.insert(*id, position);
			}
		}
	}

	fn insert(&mut self, position: usize, item: T) -> EntryId {
		let id = self.issue();
		self.entries.insert(position, (id, item));
		let len = self.entries.len();
		self.reindex(position, len);
		id
	}
}

impl<T> WatchList<T>
where
	T: Clone + 'static,
{
	pub fn new() -> Self {
		WatchList::build(Reporter::default())
	}

	pub(crate) fn build(reporter: Reporter) -> Self {
		WatchList {
			body: Rc::new(ListBody {
				inner: RefCell::new(ListInner {
					entries: Vec::new(),
					index: FxHashMap::default(),
					next: 0,
				}),
				observers: Observers::new(reporter),
				outbox: RefCell::new(VecDeque::new()),
				delivering: Cell::new(false),
			}),
		}
	}

	pub fn from_items(items: impl IntoIterator<Item = T>) -> Self {
		let list = WatchList::new();
		{
			let mut inner = list.body.inner.borrow_mut();
			for item in items {
				let len = inner.entries.len();
				inner.insert(len, item);
			}
		}
		list
	}

	pub fn len(&self) -> usize {
		self.body.inner.borrow().entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn push(&self, item: T) -> EntryId {
		let change = {
			let mut inner = self.body.inner.borrow_mut();
			let position = inner.entries.len();
			let id = inner.insert(position, item.clone());
			Change::Insert { id, position, item }
		};

		let id = change.id();
		self.notify(change);
		id
	}

	/// Inserts at `position`, shifting later entries forward. `None` appends.
	pub fn insert(&self, item: T, position: Option<usize>) -> Result<EntryId> {
		let change = {
			let mut inner = self.body.inner.borrow_mut();
			let len = inner.entries.len();
			let position = position.unwrap_or(len);
			if position > len {
				return Err(Error::OutOfRange { position, len });
			}

			let id = inner.insert(position, item.clone());
			Change::Insert { id, position, item }
		};

		let id = change.id();
		self.notify(change);
		Ok(id)
	}

	pub fn remove_by_id(&self, id: EntryId) -> Result<T> {
		let (position, item) = {
			let mut inner = self.body.inner.borrow_mut();
			let position = inner.lookup(id)?;
			let (_, item) = inner.entries.remove(position);
			inner.index.remove(&id);
			let len = inner.entries.len();
			inner.reindex(position, len);
			(position, item)
		};

		self.notify(Change::Remove {
			id,
			position,
			item: item.clone(),
		});
		Ok(item)
	}

	pub fn remove_at(&self, position: usize) -> Result<T> {
		let id = self.id_at(position).ok_or(Error::OutOfRange {
			position,
			len: self.len(),
		})?;
		self.remove_by_id(id)
	}

	/// Replaces the item stored under `id` and returns the previous one.
	pub fn update_by_id(&self, id: EntryId, item: T) -> Result<T> {
		let (position, old) = {
			let mut inner = self.body.inner.borrow_mut();
			let position = inner.lookup(id)?;
			let old = std::mem::replace(&mut inner.entries[position].1, item.clone());
			(position, old)
		};

		self.notify(Change::Update {
			id,
			position,
			old: old.clone(),
			new: item,
		});
		Ok(old)
	}

	/// Moves the entry to `position` (an index into the list as it will be
	/// after the move). Moving onto its own position emits nothing.
	pub fn move_by_id(&self, id: EntryId, position: usize) -> Result<()> {
		let from = {
			let mut inner = self.body.inner.borrow_mut();
			let from = inner.lookup(id)?;
			let len = inner.entries.len();
			if position >= len {
				return Err(Error::OutOfRange { position, len });
			}
			if from == position {
				return Ok(());
			}

			let entry = inner.entries.remove(from);
			inner.entries.insert(position, entry);
			inner.reindex(from.min(position), from.max(position));
			from
		};

		self.notify(Change::Move {
			id,
			from,
			to: position,
		});
		Ok(())
	}

	/// Removes everything, last entry first, so each emitted removal
	/// position is valid when applied in order.
	pub fn clear(&self) {
		let removed = {
			let mut inner = self.body.inner.borrow_mut();
			inner.index.clear();
			std::mem::take(&mut inner.entries)
		};

		for (position, (id, item)) in removed.into_iter().enumerate().rev() {
			self.notify(Change::Remove { id, position, item });
		}
	}

	pub fn get(&self, id: EntryId) -> Option<T> {
		let inner = self.body.inner.borrow();
		let position = inner.index.get(&id)?;
		Some(inner.entries[*position].1.clone())
	}

	pub fn contains(&self, id: EntryId) -> bool {
		self.body.inner.borrow().index.contains_key(&id)
	}

	pub fn position_of(&self, id: EntryId) -> Option<usize> {
		self.body.inner.borrow().index.get(&id).copied()
	}

	pub fn id_at(&self, position: usize) -> Option<EntryId> {
		self.body.inner.borrow().entries.get(position).map(|(id, _)| *id)
	}

	pub fn ids(&self) -> Vec<EntryId> {
		self.body.inner.borrow().entries.iter().map(|(id, _)| *id).collect()
	}

	pub fn to_vec(&self) -> Vec<T> {
		self.body
			.inner
			.borrow()
			.entries
			.iter()
			.map(|(_, item)| item.clone())
			.collect()
	}

	/// Lazy traversal in position order. Each step reads the list as it is
	/// at that moment; clone the iterator or call [`Iter::restart`] to walk
	/// again.
	pub fn iter(&self) -> Iter<T> {
		Iter {
			list: self.clone(),
			position: 0,
		}
	}

	/// Visits the entries present when the call starts, in position order.
	/// Entries removed by `visitor` before their turn are skipped.
	pub fn each(&self, mut visitor: impl FnMut(EntryId, &T)) {
		for id in self.ids() {
			if let Some(item) = self.get(id) {
				visitor(id, &item);
			}
		}
	}

	pub fn observe(&self, observer: impl Fn(&Change<T>) + 'static) -> Detach {
		self.body.observers.attach(Rc::new(observer))
	}

	pub fn observer_count(&self) -> usize {
		self.body.observers.len()
	}

	fn notify(&self, change: Change<T>) {
		tracing::trace!(kind = ?change.kind(), id = %change.id(), "list: changed");
		self.body.outbox.borrow_mut().push_back(change);
		if self.body.delivering.replace(true) {
			return;
		}

		let _delivery = Delivery { body: &self.body };
		while let Some(change) = self.body.next_change() {
			self.body
				.observers
				.notify("list", |observer| observer(&change));
		}
	}
}

impl<T> ListBody<T> {
	fn next_change(&self) -> Option<Change<T>> {
		self.outbox.borrow_mut().pop_front()
	}
}

struct Delivery<'a, T> {
	body: &'a ListBody<T>,
}

impl<'a, T> Drop for Delivery<'a, T> {
	fn drop(&mut self) {
		self.body.delivering.set(false);
	}
}

impl<T> Debug for WatchList<T>
where
	T: Debug,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_list()
			.entries(self.body.inner.borrow().entries.iter().map(|(_, item)| item))
			.finish()
	}
}

#[derive(Clone)]
pub struct Iter<T> {
	list: WatchList<T>,
	position: usize,
}

impl<T> Iter<T> {
	pub fn restart(&mut self) {
		self.position = 0;
	}
}

impl<T: Clone> Iterator for Iter<T> {
	type Item = (EntryId, T);

	fn next(&mut self) -> Option<Self::Item> {
		let entry = self
			.list
			.body
			.inner
			.borrow()
			.entries
			.get(self.position)
			.cloned()?;
		self.position += 1;
		Some(entry)
	}
}

#[cfg(test)]
mod tests {
	use std::cell::RefCell;
	use std::rc::Rc;

	use super::{Change, ChangeKind, WatchList};
	use crate::Error;

	fn items(list: &WatchList<&'static str>) -> Vec<&'static str> {
		list.iter().map(|(_, item)| item).collect()
	}

	#[test]
	fn insert_shifts_forward() {
		let list = WatchList::new();
		let a = list.push("a");
		let c = list.push("c");
		let b = list.insert("b", Some(1)).unwrap();

		assert_eq!(items(&list), vec!["a", "b", "c"]);
		assert_eq!(list.position_of(a), Some(0));
		assert_eq!(list.position_of(b), Some(1));
		assert_eq!(list.position_of(c), Some(2));
	}

	#[test]
	fn insert_past_end_fails() {
		let list = WatchList::new();
		list.push(1);
		assert!(matches!(
			list.insert(2, Some(3)),
			Err(Error::OutOfRange { position: 3, len: 1 })
		));
	}

	#[test]
	fn remove_unknown_id_fails() {
		let list = WatchList::new();
		let a = list.push("a");
		list.push("b");

		assert_eq!(list.remove_by_id(a).unwrap(), "a");
		assert!(matches!(list.remove_by_id(a), Err(Error::NotFound(id)) if id == a));

		let mut seen = vec![];
		list.each(|id, _| seen.push(id));
		assert!(!seen.contains(&a));
		assert_eq!(items(&list), vec!["b"]);
	}

	#[test]
	fn ids_are_not_reused() {
		let list = WatchList::new();
		let a = list.push(1);
		list.remove_by_id(a).unwrap();
		let b = list.push(1);
		assert_ne!(a, b);
	}

	#[test]
	fn move_and_update() {
		let list = WatchList::from_items(["a", "b", "c"]);
		let ids = list.ids();

		list.move_by_id(ids[0], 2).unwrap();
		assert_eq!(items(&list), vec!["b", "c", "a"]);
		assert_eq!(list.position_of(ids[0]), Some(2));
		assert_eq!(list.position_of(ids[1]), Some(0));

		assert_eq!(list.update_by_id(ids[1], "B").unwrap(), "b");
		assert_eq!(items(&list), vec!["B", "c", "a"]);

		assert!(matches!(
			list.move_by_id(ids[1], 3),
			Err(Error::OutOfRange { .. })
		));
	}

	#[test]
	fn emits_structured_changes() {
		let list = WatchList::new();
		let log = Rc::new(RefCell::new(vec![]));
		list.observe({
			let log = log.clone();
			move |change| log.borrow_mut().push(change.clone())
		});

		let a = list.push(1);
		let b = list.insert(0, Some(0)).unwrap();
		list.update_by_id(a, 2).unwrap();
		list.move_by_id(a, 0).unwrap();
		list.remove_by_id(b).unwrap();

		let kinds: Vec<_> = log.borrow().iter().map(|c| c.kind()).collect();
		assert_eq!(
			kinds,
			vec![
				ChangeKind::Insert,
				ChangeKind::Insert,
				ChangeKind::Update,
				ChangeKind::Move,
				ChangeKind::Remove
			]
		);
		assert_eq!(
			log.borrow()[3],
			Change::Move {
				id: a,
				from: 1,
				to: 0
			}
		);
		assert_eq!(
			log.borrow()[4],
			Change::Remove {
				id: b,
				position: 1,
				item: 0
			}
		);
	}

	#[test]
	fn iter_is_lazy_and_restartable() {
		let list = WatchList::from_items([1, 2]);
		let mut iter = list.iter();
		assert_eq!(iter.next().map(|(_, v)| v), Some(1));

		list.push(3);
		let rest: Vec<_> = iter.clone().map(|(_, v)| v).collect();
		assert_eq!(rest, vec![2, 3]);

		iter.restart();
		assert_eq!(iter.map(|(_, v)| v).sum::<i32>(), 6);
	}

	#[test]
	fn clear_removes_from_the_back() {
		let list = WatchList::from_items(["x", "y"]);
		let positions = Rc::new(RefCell::new(vec![]));
		list.observe({
			let positions = positions.clone();
			move |change| positions.borrow_mut().push(change.position())
		});

		list.clear();
		assert!(list.is_empty());
		assert_eq!(*positions.borrow(), vec![1, 0]);
	}

	#[test]
	fn nested_changes_arrive_in_mutation_order() {
		let list = WatchList::<&'static str>::new();
		list.observe({
			let list = list.clone();
			move |change| {
				if let Change::Insert { item: "first", .. } = change {
					list.push("nested");
					assert_eq!(list.len(), 2);
				}
			}
		});

		let seen = Rc::new(RefCell::new(vec![]));
		list.observe({
			let seen = seen.clone();
			move |change| seen.borrow_mut().push((change.kind(), change.position()))
		});

		list.push("first");
		assert_eq!(items(&list), vec!["first", "nested"]);
		assert_eq!(
			*seen.borrow(),
			vec![(ChangeKind::Insert, 0), (ChangeKind::Insert, 1)]
		);
	}
}
