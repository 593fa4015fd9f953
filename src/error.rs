use thiserror::Error;

/// Errors surfaced by tree loading, view fetching and attribute access.
///
/// Reaching the edge of the tree, toggling a childless node or asking for a type nobody registered are *not* errors.
/// Those come back as `Ok(None)`, `Ok(false)` or simply do nothing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
	/// A node's `type` is neither a string nor an object with a string `NAME`.
	#[error("node {id:?} contains an unknown type: {found}")]
	InvalidNodeType { id: String, found: String },

	/// A tree descriptor (or one of its fields) doesn't have the expected shape.
	#[error("invalid node descriptor: {0}")]
	InvalidDescriptor(String),

	#[error("duplicate node id {0:?}")]
	DuplicateId(String),

	#[error("view type {0:?} is already registered")]
	DuplicateType(String),

	#[error("view type {name:?} extends unregistered type {parent:?}")]
	UnknownParentType { name: String, parent: String },

	#[error("attribute {0:?} is read-only")]
	ReadOnlyAttribute(String),

	#[error("invalid value for attribute {name:?}: {value}")]
	InvalidAttributeValue { name: String, value: String },
}
