//! The persistent side of the tree: an arena of plain [`ConfigNode`] records.
//!
//! Nothing in here knows about views. Parent links are indices, so the tree has no ownership cycles,
//! and the whole arena is dropped at once along with its [`TreeManager`](`crate::TreeManager`).

use crate::{error::Error, pool::ViewKey};
use hashbrown::HashMap;
use serde_json::{Map, Value};
use tracing::{instrument, trace};

/// Opaque index of a [`ConfigNode`] within its [`ConfigTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(usize);

/// One element of the tree as loaded from its descriptor.
#[derive(Debug, Clone, Default)]
pub struct ConfigNode {
	pub(crate) id: String,
	pub(crate) parent: Option<NodeKey>,
	/// `None` if the descriptor had no `children` at all, which differs from an empty list where dynamic loading is concerned.
	pub(crate) children: Option<Vec<NodeKey>>,
	pub(crate) expanded: Option<bool>,
	pub(crate) is_leaf: bool,
	pub(crate) node_type: Option<Value>,
	pub(crate) held: Option<ViewKey>,
	pub(crate) attributes: Map<String, Value>,
	pub(crate) rendered: bool,
	pub(crate) children_rendered: bool,
	pub(crate) loading: bool,
}
impl ConfigNode {
	#[must_use]
	pub fn id(&self) -> &str {
		&self.id
	}

	#[must_use]
	pub fn parent(&self) -> Option<NodeKey> {
		self.parent
	}

	#[must_use]
	pub fn children(&self) -> &[NodeKey] {
		self.children.as_deref().unwrap_or(&[])
	}

	#[must_use]
	pub fn has_children(&self) -> bool {
		!self.children().is_empty()
	}

	#[must_use]
	pub fn is_leaf(&self) -> bool {
		self.is_leaf
	}

	#[must_use]
	pub fn attribute(&self, name: &str) -> Option<&Value> {
		self.attributes.get(name)
	}

	#[must_use]
	pub fn node_type(&self) -> Option<&Value> {
		self.node_type.as_ref()
	}
}

/// Arena of [`ConfigNode`]s below a single synthetic root.
///
/// Ids are unique across the whole arena at all times.
#[derive(Debug, Clone)]
pub struct ConfigTree {
	nodes: Vec<ConfigNode>,
	ids: HashMap<String, NodeKey>,
	next_guid: usize,
}
impl Default for ConfigTree {
	fn default() -> Self {
		Self::new()
	}
}
impl ConfigTree {
	pub const ROOT: NodeKey = NodeKey(0);

	#[must_use]
	pub fn new() -> Self {
		Self {
			nodes: vec![ConfigNode {
				children: Some(Vec::new()),
				expanded: Some(true),
				..ConfigNode::default()
			}],
			ids: HashMap::new(),
			next_guid: 0,
		}
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	/// Never `true`, since the synthetic root always exists.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	#[must_use]
	pub fn contains(&self, key: NodeKey) -> bool {
		key.0 < self.nodes.len()
	}

	#[must_use]
	pub fn get(&self, key: NodeKey) -> Option<&ConfigNode> {
		self.nodes.get(key.0)
	}

	/// # Panics
	///
	/// Iff `key` belongs to another tree (and is out of range here).
	#[must_use]
	pub fn node(&self, key: NodeKey) -> &ConfigNode {
		&self.nodes[key.0]
	}

	pub(crate) fn node_mut(&mut self, key: NodeKey) -> &mut ConfigNode {
		&mut self.nodes[key.0]
	}

	#[must_use]
	pub fn find(&self, id: &str) -> Option<NodeKey> {
		self.ids.get(id).copied()
	}

	/// Number of parent links up to, but not counting, the synthetic root.
	/// Top-level nodes are at depth 0 and the root itself is at -1.
	#[must_use]
	pub fn depth(&self, key: NodeKey) -> isize {
		let mut depth = -1;
		let mut current = self.node(key).parent;
		while let Some(parent) = current {
			depth += 1;
			current = self.node(parent).parent;
		}
		depth
	}

	/// The children of `key`'s parent, including `key`. Empty for the root.
	#[must_use]
	pub fn siblings(&self, key: NodeKey) -> &[NodeKey] {
		match self.node(key).parent {
			Some(parent) => self.node(parent).children(),
			None => &[],
		}
	}

	/// Every node below `key` in pre-order, not including `key` itself.
	#[must_use]
	pub fn descendants(&self, key: NodeKey) -> Vec<NodeKey> {
		let mut descendants = Vec::new();
		let mut stack: Vec<NodeKey> = self.node(key).children().iter().rev().copied().collect();
		while let Some(next) = stack.pop() {
			descendants.push(next);
			stack.extend(self.node(next).children().iter().rev());
		}
		descendants
	}

	/// Slash-separated ids from the first top-level ancestor down to `key`.
	#[must_use]
	pub fn id_path(&self, key: NodeKey) -> String {
		let mut ids = Vec::new();
		let mut current = Some(key);
		while let Some(key) = current {
			let node = self.node(key);
			if node.parent.is_some() {
				ids.push(node.id.as_str());
			}
			current = node.parent;
		}
		ids.reverse();
		ids.join("/")
	}

	/// Deep-copies `descriptors` into new nodes and appends them to `parent`'s children.
	///
	/// Either all descriptors are attached or, on error, none are.
	/// `dynamic` selects the expanded default for nodes without children (see [`ConfigTree::apply_dynamic_defaults`]).
	#[instrument(skip(self, descriptors), fields(count = descriptors.len()))]
	pub(crate) fn attach(&mut self, parent: NodeKey, descriptors: &[Value], dynamic: bool) -> Result<Vec<NodeKey>, Error> {
		let mark = self.nodes.len();
		let keys = descriptors.iter().map(|descriptor| self.insert(parent, descriptor, dynamic)).collect::<Result<Vec<_>, _>>();
		match keys {
			Ok(keys) => {
				self.node_mut(parent).children.get_or_insert_with(Vec::new).extend_from_slice(&keys);
				trace!("Attached {} node(s), {} in total.", self.nodes.len() - mark, self.nodes.len() - 1);
				Ok(keys)
			}
			Err(error) => {
				for node in self.nodes.drain(mark..) {
					self.ids.remove(&node.id);
				}
				Err(error)
			}
		}
	}

	fn insert(&mut self, parent: NodeKey, descriptor: &Value, dynamic: bool) -> Result<NodeKey, Error> {
		let fields = descriptor
			.as_object()
			.ok_or_else(|| Error::InvalidDescriptor(format!("expected an object but found {}", descriptor)))?;

		let mut node = ConfigNode {
			parent: Some(parent),
			..ConfigNode::default()
		};
		let mut id = None;
		let mut child_descriptors = None;
		for (name, value) in fields {
			match name.as_str() {
				"id" => {
					id = match value {
						Value::Null => None,
						Value::String(id) if id.is_empty() => None,
						Value::String(id) => Some(id.clone()),
						Value::Number(id) => Some(id.to_string()),
						_ => return Err(Error::InvalidDescriptor(format!("`id` must be a string but is {}", value))),
					}
				}
				"children" => match value {
					Value::Null => (),
					Value::Array(children) => child_descriptors = Some(children),
					_ => return Err(Error::InvalidDescriptor(format!("`children` must be an array but is {}", value))),
				},
				"expanded" => node.expanded = Some(truthy(value)),
				"isLeaf" => node.is_leaf = truthy(value),
				"type" => node.node_type = Some(value.clone()).filter(|value| !value.is_null()),
				_ => {
					node.attributes.insert(name.clone(), value.clone());
				}
			}
		}

		node.expanded = if dynamic && child_descriptors.map_or(true, |children| children.is_empty()) {
			Some(node.is_leaf)
		} else {
			Some(node.expanded.unwrap_or(true))
		};

		node.id = match id {
			Some(id) if self.ids.contains_key(&id) => return Err(Error::DuplicateId(id)),
			Some(id) => id,
			None => self.generate_id(),
		};

		let key = NodeKey(self.nodes.len());
		self.ids.insert(node.id.clone(), key);
		self.nodes.push(node);

		if let Some(child_descriptors) = child_descriptors {
			let children = child_descriptors
				.iter()
				.map(|descriptor| self.insert(key, descriptor, dynamic))
				.collect::<Result<Vec<_>, _>>()?;
			self.node_mut(key).children = Some(children);
		}
		Ok(key)
	}

	fn generate_id(&mut self) -> String {
		loop {
			let id = format!("fwt-{}", self.next_guid);
			self.next_guid += 1;
			if !self.ids.contains_key(&id) {
				return id;
			}
		}
	}

	/// Once a dynamic loader is around, childless nodes may still turn out to have children,
	/// so they start collapsed unless they are known leaves.
	pub(crate) fn apply_dynamic_defaults(&mut self) {
		for node in self.nodes.iter_mut().skip(1) {
			if !node.has_children() {
				node.expanded = Some(node.is_leaf);
			}
		}
	}
}

/// Loose truthiness for flags in descriptors.
pub(crate) fn truthy(value: &Value) -> bool {
	match value {
		Value::Null => false,
		Value::Bool(value) => *value,
		Value::Number(number) => number.as_f64().map_or(false, |number| number != 0.0),
		Value::String(string) => !string.is_empty(),
		Value::Array(_) | Value::Object(_) => true,
	}
}
