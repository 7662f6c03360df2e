use std::cell::RefCell;
use std::rc::Rc;

use crate::error::Result;
use crate::list::WatchList;
use crate::object::WatchObject;
use crate::observers::{ObserverFailure, Reporter};
use crate::registry::{Args, Instance, Redefine, Registry, TypeDef, TypeDescriptor};
use crate::watch::{Equality, Watch};

#[derive(Clone, Copy, Debug, Default)]
pub struct Options {
	pub redefine: Redefine,
}

/// Application-scoped home of the type registry and the observer failure
/// reporter. Watchables created through a context report to it.
#[derive(Clone)]
pub struct Context {
	body: Rc<ContextBody>,
}

struct ContextBody {
	registry: RefCell<Registry>,
	reporter: Reporter,
}

impl Default for Context {
	fn default() -> Self {
		Context::new()
	}
}

impl Context {
	pub fn new() -> Self {
		Context::with_options(Options::default())
	}

	pub fn with_options(options: Options) -> Self {
		Context {
			body: Rc::new(ContextBody {
				registry: RefCell::new(Registry::new(options.redefine)),
				reporter: Reporter::new(),
			}),
		}
	}

	/// Installs the hook called for every observer failure in this context,
	/// including for watchables created before the call.
	pub fn on_observer_failure(&self, hook: impl Fn(&ObserverFailure) + 'static) {
		self.body.reporter.set_hook(hook);
	}

	pub fn reporter(&self) -> &Reporter {
		&self.body.reporter
	}

	pub fn define(&self, def: TypeDef) -> Result<Rc<TypeDescriptor>> {
		self.body.registry.borrow_mut().define(def)
	}

	pub fn is_defined(&self, name: &str) -> bool {
		self.body.registry.borrow().contains(name)
	}

	pub fn descriptor(&self, name: &str) -> Result<Rc<TypeDescriptor>> {
		self.body.registry.borrow().get(name)
	}

	/// The registry is not borrowed while the constructor runs, so it may
	/// define or instantiate further types.
	pub fn instantiate(&self, name: &str, args: &Args) -> Result<Instance> {
		let descriptor = self.descriptor(name)?;
		descriptor.instantiate(args)
	}

	pub fn watch<T>(&self, value: T) -> Watch<T>
	where
		T: PartialEq + 'static,
	{
		self.watch_with(value, Equality::partial_eq())
	}

	pub fn watch_with<T: 'static>(&self, value: T, equality: Equality<T>) -> Watch<T> {
		Watch::build(value, equality, self.body.reporter.clone())
	}

	pub fn list<T: Clone + 'static>(&self) -> WatchList<T> {
		WatchList::build(self.body.reporter.clone())
	}

	pub fn object<V>(&self) -> WatchObject<V>
	where
		V: Clone + PartialEq + 'static,
	{
		WatchObject::build(self.body.reporter.clone())
	}
}

#[cfg(test)]
mod tests {
	use std::cell::RefCell;
	use std::rc::Rc;

	use super::{Context, Options};
	use crate::{Error, Redefine, TypeDef};

	#[test]
	fn failures_reach_the_context_hook() {
		let cx = Context::new();
		let list = cx.list::<u8>();
		list.observe(|_| panic!("list observer"));

		let seen = Rc::new(RefCell::new(vec![]));
		cx.on_observer_failure({
			let seen = seen.clone();
			move |failure| seen.borrow_mut().push((failure.source, failure.message.clone()))
		});

		list.push(1);
		let o = cx.object::<u8>();
		o.observe(|_, _, _| panic!("object observer"));
		o.set("k", 1);

		assert_eq!(
			*seen.borrow(),
			vec![
				("list", "list observer".to_string()),
				("object", "object observer".to_string())
			]
		);
	}

	#[test]
	fn contexts_do_not_share_types() {
		let a = Context::new();
		let b = Context::with_options(Options {
			redefine: Redefine::Overwrite,
		});

		a.define(TypeDef::new("T")).unwrap();
		assert!(a.is_defined("T"));
		assert!(!b.is_defined("T"));
		assert!(matches!(a.define(TypeDef::new("T")), Err(Error::DuplicateType(_))));

		b.define(TypeDef::new("T")).unwrap();
		b.define(TypeDef::new("T")).unwrap();
	}

	#[test]
	fn constructor_may_use_the_context() {
		let cx = Context::new();
		cx.define(TypeDef::new("Leaf")).unwrap();
		cx.define(TypeDef::new("Tree").constructor({
			let cx = cx.clone();
			move |this, _| {
				let leaf = cx.instantiate("Leaf", &[])?;
				this.store("leaf", leaf);
				Ok(())
			}
		}))
		.unwrap();

		let tree = cx.instantiate("Tree", &[]).unwrap();
		assert_eq!(tree.slot::<crate::Instance>("leaf").unwrap().type_name(), "Leaf");
	}
}
