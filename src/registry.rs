//! Named types composed from other named types.
//!
//! A type lists the traits it composes and its own members. Composition is
//! flat: at definition time the members of each trait are merged in listed
//! order, then the type's own members on top. A later provider of a member
//! name wins and the override is recorded as a [`Collision`].

use std::any::Any;
use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use fxhash::{FxHashMap, FxHashSet};

use crate::error::{Error, Result};

/// Arguments passed to members and constructors.
pub type Args = [Rc<dyn Any>];

/// What a member returns. `None` when it has nothing to say.
pub type Output = Option<Rc<dyn Any>>;

pub type Member = Rc<dyn Fn(&Instance, &Args) -> Result<Output>>;
pub type Constructor = Rc<dyn Fn(&Instance, &Args) -> Result<()>>;

/// What to do when a name is defined twice.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Redefine {
	#[default]
	Reject,
	Overwrite,
}

/// Definition of a type, handed to [`Registry::define`].
pub struct TypeDef {
	name: String,
	traits: Vec<String>,
	members: Vec<(String, Member)>,
	constructor: Option<Constructor>,
}

impl TypeDef {
	pub fn new(name: impl Into<String>) -> Self {
		TypeDef {
			name: name.into(),
			traits: Vec::new(),
			members: Vec::new(),
			constructor: None,
		}
	}

	pub fn compose<S: Into<String>>(mut self, traits: impl IntoIterator<Item = S>) -> Self {
		self.traits.extend(traits.into_iter().map(Into::into));
		self
	}

	pub fn member(
		mut self,
		name: impl Into<String>,
		member: impl Fn(&Instance, &Args) -> Result<Output> + 'static,
	) -> Self {
		self.members.push((name.into(), Rc::new(member)));
		self
	}

	pub fn constructor(mut self, ctor: impl Fn(&Instance, &Args) -> Result<()> + 'static) -> Self {
		self.constructor = Some(Rc::new(ctor));
		self
	}
}

/// A member name provided by more than one source.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Collision {
	pub member: String,
	pub overridden: String,
	pub winner: String,
}

pub struct TypeDescriptor {
	name: String,
	traits: Vec<String>,
	// Every type this one composes, directly or not, plus itself.
	lineage: FxHashSet<String>,
	members: FxHashMap<String, (Rc<str>, Member)>,
	constructor: Option<Constructor>,
	trait_constructors: FxHashMap<String, Constructor>,
	collisions: Vec<Collision>,
}

impl TypeDescriptor {
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Directly composed traits, in declaration order.
	pub fn traits(&self) -> &[String] {
		&self.traits
	}

	pub fn implements(&self, name: &str) -> bool {
		self.lineage.contains(name)
	}

	pub fn has_member(&self, name: &str) -> bool {
		self.members.contains_key(name)
	}

	pub fn member_names(&self) -> Vec<&str> {
		let mut names: Vec<&str> = self.members.keys().map(String::as_str).collect();
		names.sort_unstable();
		names
	}

	/// Which type supplied the implementation of `member`.
	pub fn provider(&self, member: &str) -> Option<&str> {
		self.members.get(member).map(|(provider, _)| &**provider)
	}

	pub fn collisions(&self) -> &[Collision] {
		&self.collisions
	}

	pub fn instantiate(self: &Rc<Self>, args: &Args) -> Result<Instance> {
		let instance = Instance {
			body: Rc::new(InstanceBody {
				descriptor: self.clone(),
				slots: RefCell::new(FxHashMap::default()),
			}),
		};

		if let Some(ctor) = &self.constructor {
			ctor(&instance, args)?;
		}

		tracing::trace!(ty = %self.name, "registry: instantiated");
		Ok(instance)
	}
}

impl Debug for TypeDescriptor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TypeDescriptor")
			.field("name", &self.name)
			.field("traits", &self.traits)
			.field("members", &self.member_names())
			.finish()
	}
}

/// Table of defined types.
#[derive(Default)]
pub struct Registry {
	types: FxHashMap<String, Rc<TypeDescriptor>>,
	redefine: Redefine,
}

impl Registry {
	pub fn new(redefine: Redefine) -> Self {
		Registry {
			types: FxHashMap::default(),
			redefine,
		}
	}

	pub fn redefine_policy(&self) -> Redefine {
		self.redefine
	}

	pub fn contains(&self, name: &str) -> bool {
		self.types.contains_key(name)
	}

	pub fn get(&self, name: &str) -> Result<Rc<TypeDescriptor>> {
		self.types
			.get(name)
			.cloned()
			.ok_or_else(|| Error::UnknownType(name.to_string()))
	}

	pub fn names(&self) -> Vec<&str> {
		let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
		names.sort_unstable();
		names
	}

	pub fn define(&mut self, def: TypeDef) -> Result<Rc<TypeDescriptor>> {
		if self.types.contains_key(&def.name) && self.redefine == Redefine::Reject {
			tracing::warn!(ty = %def.name, "registry: rejected redefinition");
			return Err(Error::DuplicateType(def.name));
		}

		let mut merge = Merge::default();
		let mut lineage = FxHashSet::default();
		let mut trait_constructors = FxHashMap::default();

		for trait_name in &def.traits {
			let base = self.get(trait_name)?;
			lineage.extend(base.lineage.iter().cloned());
			trait_constructors.extend(
				base.trait_constructors
					.iter()
					.map(|(name, ctor)| (name.clone(), ctor.clone())),
			);
			if let Some(ctor) = &base.constructor {
				trait_constructors.insert(base.name.clone(), ctor.clone());
			}

			let mut inherited: Vec<_> = base.members.iter().collect();
			inherited.sort_unstable_by(|a, b| a.0.cmp(b.0));
			for (name, (provider, member)) in inherited {
				merge.add(name, provider.clone(), member.clone());
			}
		}

		let own: Rc<str> = Rc::from(def.name.as_str());
		for (name, member) in def.members {
			merge.add(&name, own.clone(), member);
		}

		for collision in &merge.collisions {
			tracing::debug!(
				ty = %def.name,
				member = %collision.member,
				overridden = %collision.overridden,
				winner = %collision.winner,
				"registry: member overridden"
			);
		}

		lineage.insert(def.name.clone());

		let descriptor = Rc::new(TypeDescriptor {
			name: def.name.clone(),
			traits: def.traits,
			lineage,
			members: merge.members,
			constructor: def.constructor,
			trait_constructors,
			collisions: merge.collisions,
		});

		tracing::debug!(ty = %def.name, "registry: defined");
		self.types.insert(def.name, descriptor.clone());
		Ok(descriptor)
	}

	pub fn instantiate(&self, name: &str, args: &Args) -> Result<Instance> {
		self.get(name)?.instantiate(args)
	}
}

#[derive(Default)]
struct Merge {
	members: FxHashMap<String, (Rc<str>, Member)>,
	collisions: Vec<Collision>,
}

impl Merge {
	fn add(&mut self, name: &str, provider: Rc<str>, member: Member) {
		let previous = self
			.members
			.insert(name.to_string(), (provider.clone(), member.clone()));

		if let Some((overridden, prev)) = previous {
			// The same implementation reached through two traits is no conflict.
			if !Rc::ptr_eq(&prev, &member) {
				self.collisions.push(Collision {
					member: name.to_string(),
					overridden: overridden.to_string(),
					winner: provider.to_string(),
				});
			}
		}
	}
}

/// An object built from a [`TypeDescriptor`].
#[derive(Clone)]
pub struct Instance {
	body: Rc<InstanceBody>,
}

struct InstanceBody {
	descriptor: Rc<TypeDescriptor>,
	slots: RefCell<FxHashMap<String, Rc<dyn Any>>>,
}

impl Instance {
	pub fn type_name(&self) -> &str {
		&self.body.descriptor.name
	}

	pub fn descriptor(&self) -> &Rc<TypeDescriptor> {
		&self.body.descriptor
	}

	pub fn implements(&self, name: &str) -> bool {
		self.body.descriptor.implements(name)
	}

	pub fn call(&self, member: &str, args: &Args) -> Result<Output> {
		let member = self
			.body
			.descriptor
			.members
			.get(member)
			.map(|(_, member)| member.clone())
			.ok_or_else(|| Error::UnknownMember {
				ty: self.type_name().to_string(),
				member: member.to_string(),
			})?;

		member(self, args)
	}

	/// Runs the constructor of a composed trait against this instance.
	/// A composed trait without a constructor is a no-op.
	pub fn construct_as(&self, name: &str, args: &Args) -> Result<()> {
		if !self.implements(name) || name == self.type_name() {
			return Err(Error::UnknownType(name.to_string()));
		}

		let ctor = self.body.descriptor.trait_constructors.get(name).cloned();
		match ctor {
			Some(ctor) => ctor(self, args),
			None => Ok(()),
		}
	}

	pub fn slot<T: 'static>(&self, name: &str) -> Option<Rc<T>> {
		let value = self.body.slots.borrow().get(name)?.clone();
		value.downcast::<T>().ok()
	}

	/// A slot holding a handle that converts from `Rc<dyn Any>`, such as a
	/// [`Watch`](crate::Watch).
	pub fn slot_as<W>(&self, name: &str) -> Option<W>
	where
		W: TryFrom<Rc<dyn Any>>,
	{
		let value = self.body.slots.borrow().get(name)?.clone();
		W::try_from(value).ok()
	}

	pub fn set_slot(&self, name: impl Into<String>, value: impl Into<Rc<dyn Any>>) {
		self.body.slots.borrow_mut().insert(name.into(), value.into());
	}

	pub fn store<T: 'static>(&self, name: impl Into<String>, value: T) {
		self.set_slot(name, Rc::new(value) as Rc<dyn Any>);
	}

	pub fn ptr_eq(&self, other: &Instance) -> bool {
		Rc::ptr_eq(&self.body, &other.body)
	}
}

impl Debug for Instance {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Instance")
			.field("type", &self.type_name())
			.finish()
	}
}

/// Fetches argument `index` as a `T`.
pub fn arg<T: 'static>(args: &Args, index: usize) -> Result<Rc<T>> {
	let value = args
		.get(index)
		.ok_or_else(|| Error::argument(index, "missing"))?;
	value
		.clone()
		.downcast::<T>()
		.map_err(|_| Error::argument(index, std::any::type_name::<T>()))
}

/// Fetches argument `index` as a handle such as a [`Watch`](crate::Watch).
pub fn arg_as<W>(args: &Args, index: usize) -> Result<W>
where
	W: TryFrom<Rc<dyn Any>>,
{
	let value = args
		.get(index)
		.ok_or_else(|| Error::argument(index, "missing"))?;
	W::try_from(value.clone()).map_err(|_| Error::argument(index, std::any::type_name::<W>()))
}

#[cfg(test)]
mod tests {
	use std::any::Any;
	use std::rc::Rc;

	use super::{arg, Args, Instance, Output, Redefine, Registry, TypeDef};
	use crate::Error;

	fn label(text: &'static str) -> impl Fn(&Instance, &Args) -> crate::Result<Output> {
		move |_: &Instance, _: &Args| Ok(Some(Rc::new(text) as Rc<dyn Any>))
	}

	fn said(out: Output) -> &'static str {
		*out.unwrap().downcast::<&'static str>().unwrap()
	}

	#[test]
	fn later_traits_win() {
		let mut reg = Registry::default();
		reg.define(TypeDef::new("A").member("name", label("a")).member("only_a", label("a")))
			.unwrap();
		reg.define(TypeDef::new("B").member("name", label("b"))).unwrap();
		let c = reg.define(TypeDef::new("C").compose(["A", "B"])).unwrap();

		let inst = reg.instantiate("C", &[]).unwrap();
		assert_eq!(said(inst.call("name", &[]).unwrap()), "b");
		assert_eq!(said(inst.call("only_a", &[]).unwrap()), "a");
		assert_eq!(c.provider("name"), Some("B"));
		assert_eq!(c.collisions().len(), 1);
		assert_eq!(c.collisions()[0].overridden, "A");
		assert!(inst.implements("A") && inst.implements("B") && inst.implements("C"));
	}

	#[test]
	fn own_members_win_over_traits() {
		let mut reg = Registry::default();
		reg.define(TypeDef::new("A").member("name", label("a"))).unwrap();
		reg.define(TypeDef::new("C").compose(["A"]).member("name", label("c")))
			.unwrap();

		let inst = reg.instantiate("C", &[]).unwrap();
		assert_eq!(said(inst.call("name", &[]).unwrap()), "c");
	}

	#[test]
	fn diamond_is_not_a_collision() {
		let mut reg = Registry::default();
		reg.define(TypeDef::new("Base").member("x", label("base"))).unwrap();
		reg.define(TypeDef::new("L").compose(["Base"])).unwrap();
		reg.define(TypeDef::new("R").compose(["Base"])).unwrap();
		let d = reg.define(TypeDef::new("D").compose(["L", "R"])).unwrap();

		assert!(d.collisions().is_empty());
		assert_eq!(d.provider("x"), Some("Base"));
		assert!(d.implements("Base"));
	}

	#[test]
	fn unknown_and_duplicate_types() {
		let mut reg = Registry::default();
		assert!(matches!(
			reg.define(TypeDef::new("X").compose(["Missing"])),
			Err(Error::UnknownType(name)) if name == "Missing"
		));
		assert!(!reg.contains("X"));
		assert!(matches!(reg.instantiate("X", &[]), Err(Error::UnknownType(_))));

		reg.define(TypeDef::new("X")).unwrap();
		assert!(matches!(
			reg.define(TypeDef::new("X")),
			Err(Error::DuplicateType(name)) if name == "X"
		));
	}

	#[test]
	fn overwrite_policy() {
		let mut reg = Registry::new(Redefine::Overwrite);
		reg.define(TypeDef::new("X").member("v", label("1"))).unwrap();
		let old = reg.instantiate("X", &[]).unwrap();
		reg.define(TypeDef::new("X").member("v", label("2"))).unwrap();

		assert_eq!(said(old.call("v", &[]).unwrap()), "1");
		assert_eq!(said(reg.instantiate("X", &[]).unwrap().call("v", &[]).unwrap()), "2");
	}

	#[test]
	fn constructor_and_trait_constructor() {
		let mut reg = Registry::default();
		reg.define(TypeDef::new("Element").constructor(|this, args| {
			this.store("tag", (*arg::<String>(args, 0)?).clone());
			Ok(())
		}))
		.unwrap();
		reg.define(TypeDef::new("Html").compose(["Element"]).constructor(|this, args| {
			this.construct_as("Element", args)?;
			this.store("ready", true);
			Ok(())
		}))
		.unwrap();

		let args: Vec<Rc<dyn Any>> = vec![Rc::new("div".to_string())];
		let html = reg.instantiate("Html", &args).unwrap();
		assert_eq!(*html.slot::<String>("tag").unwrap(), "div");
		assert_eq!(html.slot::<bool>("ready").as_deref(), Some(&true));
		assert!(html.slot::<u8>("tag").is_none());

		assert!(matches!(
			html.construct_as("Nope", &args),
			Err(Error::UnknownType(_))
		));
		assert!(matches!(
			reg.instantiate("Html", &[]),
			Err(Error::Argument { index: 0, .. })
		));
	}

	#[test]
	fn unknown_member() {
		let mut reg = Registry::default();
		reg.define(TypeDef::new("X")).unwrap();
		let x = reg.instantiate("X", &[]).unwrap();
		assert!(matches!(x.call("nope", &[]), Err(Error::UnknownMember { .. })));
	}
}
