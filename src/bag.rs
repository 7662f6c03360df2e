use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::{Rc, Weak};

/// Opaque key of an item attached to a [`Bag`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Handle(u64);

/// Unordered attachment registry.
///
/// Attaching or detaching while an [`each`](Bag::each) enumeration is running
/// does not touch the enumerated set: the change is queued and applied once
/// the outermost enumeration finishes.
pub struct Bag<T> {
	body: Rc<BagBody<T>>,
}

impl<T> Clone for Bag<T> {
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

impl<T: 'static> Default for Bag<T> {
	fn default() -> Self {
		Bag::new()
	}
}

struct BagBody<T> {
	inner: RefCell<BagInner<T>>,
}

struct BagInner<T> {
	// Handles grow monotonically, so this stays sorted by handle.
	items: Vec<(Handle, T)>,
	pending: Vec<Patch<T>>,
	enumerating: usize,
	next: u64,
}

enum Patch<T> {
	Attach(Handle, T),
	Detach(Handle),
}

impl<T> Bag<T>
where
	T: 'static,
{
	pub fn new() -> Self {
		Bag {
			body: Rc::new(BagBody {
				inner: RefCell::new(BagInner {
					items: Vec::new(),
					pending: Vec::new(),
					enumerating: 0,
					next: 0,
				}),
			}),
		}
	}

	pub fn attach(&self, item: T) -> Detach {
		let handle = self.body.inner.borrow_mut().attach(item);
		Detach {
			bag: Rc::downgrade(&self.body) as Weak<dyn Detachable>,
			handle,
		}
	}

	/// Returns `false` if the handle is not (or no longer) attached.
	pub fn detach(&self, handle: Handle) -> bool {
		self.body.inner.borrow_mut().detach(handle)
	}

	pub fn contains(&self, handle: Handle) -> bool {
		self.body.inner.borrow().is_live(handle)
	}

	/// Number of items in the committed set. Changes queued by a running
	/// enumeration are not counted until it completes.
	pub fn len(&self) -> usize {
		self.body.inner.borrow().items.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn each(&self, mut visitor: impl FnMut(&T))
	where
		T: Clone,
	{
		let len = {
			let mut inner = self.body.inner.borrow_mut();
			inner.enumerating += 1;
			inner.items.len()
		};

		let _guard = Enumeration { body: &self.body };

		for index in 0..len {
			// The committed set cannot change until the guard drops.
			let item = self.body.inner.borrow().items[index].1.clone();
			visitor(&item);
		}
	}
}

impl<T> BagInner<T> {
	fn attach(&mut self, item: T) -> Handle {
		let handle = Handle(self.next);
		self.next += 1;

		if self.enumerating > 0 {
			self.pending.push(Patch::Attach(handle, item));
		} else {
			self.items.push((handle, item));
		}

		handle
	}

	fn detach(&mut self, handle: Handle) -> bool {
		if self.enumerating == 0 {
			return match self.position(handle) {
				Some(index) => {
					self.items.remove(index);
					true
				}
				None => false,
			};
		}

		let queued = self
			.pending
			.iter()
			.position(|p| matches!(p, Patch::Attach(h, _) if *h == handle));

		if let Some(index) = queued {
			self.pending.remove(index);
			return true;
		}

		if self.is_live(handle) {
			self.pending.push(Patch::Detach(handle));
			return true;
		}

		false
	}

	fn is_live(&self, handle: Handle) -> bool {
		let mut live = self.position(handle).is_some();
		for patch in &self.pending {
			match patch {
				Patch::Attach(h, _) if *h == handle => live = true,
				Patch::Detach(h) if *h == handle => live = false,
				_ => {}
			}
		}
		live
	}

	fn position(&self, handle: Handle) -> Option<usize> {
		self.items.binary_search_by_key(&handle, |(h, _)| *h).ok()
	}

	fn flush(&mut self) {
		for patch in std::mem::take(&mut self.pending) {
			match patch {
				Patch::Attach(handle, item) => self.items.push((handle, item)),
				Patch::Detach(handle) => {
					if let Some(index) = self.position(handle) {
						self.items.remove(index);
					}
				}
			}
		}
	}
}

struct Enumeration<'a, T> {
	body: &'a BagBody<T>,
}

impl<'a, T> Drop for Enumeration<'a, T> {
	fn drop(&mut self) {
		let mut inner = self.body.inner.borrow_mut();
		inner.enumerating -= 1;
		if inner.enumerating == 0 && !inner.pending.is_empty() {
			tracing::trace!(patches = inner.pending.len(), "bag: applying queued patches");
			inner.flush();
		}
	}
}

trait Detachable {
	fn detach(&self, handle: Handle) -> bool;
}

impl<T> Detachable for BagBody<T> {
	fn detach(&self, handle: Handle) -> bool {
		self.inner.borrow_mut().detach(handle)
	}
}

/// Detaches one item from the bag it was attached to.
///
/// Dropping a `Detach` does not detach anything. Detaching after the bag is
/// gone, or a second time, returns `false`.
#[derive(Clone)]
pub struct Detach {
	bag: Weak<dyn Detachable>,
	handle: Handle,
}

impl Detach {
	pub fn handle(&self) -> Handle {
		self.handle
	}

	pub fn detach(&self) -> bool {
		match self.bag.upgrade() {
			Some(bag) => bag.detach(self.handle),
			None => false,
		}
	}
}

impl Debug for Detach {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Detach")
			.field("handle", &self.handle)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use std::cell::RefCell;
	use std::rc::Rc;

	use super::Bag;

	fn collect(bag: &Bag<u32>) -> Vec<u32> {
		let mut out = vec![];
		bag.each(|v| out.push(*v));
		out
	}

	#[test]
	fn detach_is_idempotent() {
		let bag = Bag::new();
		let a = bag.attach(1);
		bag.attach(2);

		assert!(a.detach());
		assert!(!a.detach());
		assert_eq!(collect(&bag), vec![2]);
	}

	#[test]
	fn attach_during_each_is_deferred() {
		let bag = Bag::new();
		bag.attach(1);
		bag.attach(2);

		let seen = RefCell::new(vec![]);
		bag.each(|v| {
			seen.borrow_mut().push(*v);
			bag.attach(*v + 10);
		});

		assert_eq!(*seen.borrow(), vec![1, 2]);
		assert_eq!(collect(&bag), vec![1, 2, 11, 12]);
	}

	#[test]
	fn detach_during_each_is_deferred() {
		let bag = Bag::new();
		let detaches = Rc::new(RefCell::new(vec![]));
		for v in 0..3 {
			detaches.borrow_mut().push(bag.attach(v));
		}

		let mut seen = vec![];
		bag.each(|v| {
			seen.push(*v);
			if *v == 0 {
				assert!(detaches.borrow()[2].detach());
				assert!(!detaches.borrow()[2].detach());
				assert!(!bag.contains(detaches.borrow()[2].handle()));
			}
		});

		assert_eq!(seen, vec![0, 1, 2]);
		assert_eq!(collect(&bag), vec![0, 1]);
	}

	#[test]
	fn attach_then_detach_inside_each_cancels() {
		let bag = Bag::new();
		bag.attach(1);

		bag.each(|_| {
			let d = bag.attach(5);
			assert!(bag.contains(d.handle()));
			assert!(d.detach());
			assert!(!d.detach());
		});

		assert_eq!(collect(&bag), vec![1]);
	}

	#[test]
	fn nested_each_flushes_once() {
		let bag = Bag::new();
		bag.attach(1);

		bag.each(|_| {
			bag.each(|_| {
				bag.attach(2);
			});
			assert_eq!(bag.len(), 1);
		});

		assert_eq!(collect(&bag), vec![1, 2]);
	}

	#[test]
	fn detach_outlives_bag() {
		let bag = Bag::new();
		let d = bag.attach(1);
		drop(bag);
		assert!(!d.detach());
	}
}
