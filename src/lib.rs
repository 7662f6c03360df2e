//! Watchable values, collections and keyed objects, an iteration-safe
//! [`Bag`], a binding engine that pushes watchable state into UI accessors,
//! and a registry of named types built by composing other types.
//!
//! Everything here is single-threaded and synchronous: handles are `Rc`
//! based, and observers run inside the call that changed the value.

pub mod macros;

mod bag;
mod binding;
mod context;
mod error;
pub mod json;
mod list;
mod object;
mod observers;
mod registry;
mod watch;

pub use bag::{Bag, Detach, Handle};
pub use binding::{bind, bind_list, bind_with, Binding, ListTarget, Target, Template};
pub use context::{Context, Options};
pub use error::{Error, Result};
pub use list::{Change, ChangeKind, EntryId, Iter, WatchList};
pub use object::WatchObject;
pub use observers::{ObserverFailure, Reporter};
pub use registry::{
	arg, arg_as, Args, Collision, Constructor, Instance, Member, Output, Redefine, Registry,
	TypeDef, TypeDescriptor,
};
pub use watch::{Equality, Toggle, Watch};
