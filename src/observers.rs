use std::any::Any;
use std::cell::RefCell;
use std::fmt::Debug;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::bag::{Bag, Detach};

/// An observer callback that panicked while being notified.
#[derive(Clone, Debug)]
pub struct ObserverFailure {
	/// What was being notified (`"watch"`, `"list"`, `"object"`).
	pub source: &'static str,
	pub message: String,
}

impl ObserverFailure {
	fn from_panic(source: &'static str, payload: Box<dyn Any + Send>) -> Self {
		let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
			s.to_string()
		} else if let Some(s) = payload.downcast_ref::<String>() {
			s.clone()
		} else {
			"<non-string panic payload>".to_string()
		};

		ObserverFailure { source, message }
	}
}

type Hook = Rc<dyn Fn(&ObserverFailure)>;

/// Where isolated observer failures go. Clones share the installed hook.
#[derive(Clone, Default)]
pub struct Reporter {
	hook: Rc<RefCell<Option<Hook>>>,
}

impl Reporter {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set_hook(&self, hook: impl Fn(&ObserverFailure) + 'static) {
		*self.hook.borrow_mut() = Some(Rc::new(hook));
	}

	pub fn report(&self, failure: &ObserverFailure) {
		tracing::error!(
			source = failure.source,
			message = %failure.message,
			"observer failed, continuing notification"
		);

		let hook = self.hook.borrow().clone();
		if let Some(hook) = hook {
			hook(failure);
		}
	}
}

impl Debug for Reporter {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Reporter")
			.field("hook", &self.hook.borrow().is_some())
			.finish()
	}
}

/// Observer list notified in registration order.
pub(crate) struct Observers<F: ?Sized> {
	bag: Bag<Rc<F>>,
	reporter: Reporter,
}

impl<F: ?Sized + 'static> Observers<F> {
	pub fn new(reporter: Reporter) -> Self {
		Observers {
			bag: Bag::new(),
			reporter,
		}
	}

	pub fn attach(&self, observer: Rc<F>) -> Detach {
		self.bag.attach(observer)
	}

	pub fn len(&self) -> usize {
		self.bag.len()
	}

	pub fn reporter(&self) -> &Reporter {
		&self.reporter
	}

	/// Calls every observer. A panicking observer is reported and skipped.
	/// Returns how many observers completed.
	pub fn notify(&self, source: &'static str, call: impl Fn(&F)) -> usize {
		let mut delivered = 0;
		self.bag.each(|observer| {
			match panic::catch_unwind(AssertUnwindSafe(|| call(observer))) {
				Ok(()) => delivered += 1,
				Err(payload) => {
					self.reporter
						.report(&ObserverFailure::from_panic(source, payload));
				}
			}
		});
		delivered
	}
}
