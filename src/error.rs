use std::borrow::Cow;

use crate::list::EntryId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("unknown type `{0}`")]
	UnknownType(String),

	#[error("type `{0}` is already defined")]
	DuplicateType(String),

	#[error("type `{ty}` has no member `{member}`")]
	UnknownMember { ty: String, member: String },

	#[error("no entry with id {0}")]
	NotFound(EntryId),

	#[error("position {position} is out of range for length {len}")]
	OutOfRange { position: usize, len: usize },

	#[error("bad argument {index}: {reason}")]
	Argument { index: usize, reason: Cow<'static, str> },

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

impl Error {
	pub fn argument(index: usize, reason: impl Into<Cow<'static, str>>) -> Self {
		Error::Argument {
			index,
			reason: reason.into(),
		}
	}
}
