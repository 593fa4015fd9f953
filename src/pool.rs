//! Per-type stacks of idle view instances.
//!
//! A view instance is just a slot here: its type tag, the node it is currently slid onto,
//! and the few values it stores for itself. [`ViewNode`](`crate::ViewNode`) is the handle callers hold.

use crate::{
	config::{ConfigTree, NodeKey},
	error::Error,
	registry::{type_tag, TypeRegistry},
};
use hashbrown::HashMap;
use serde_json::{Map, Value};
use tracing::{instrument, trace, warn};

/// Identity of one pooled view instance.
///
/// Stable for the lifetime of the manager, but *not* tied to any particular node:
/// the same instance represents different nodes over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewKey(usize);

#[derive(Debug)]
pub(crate) struct ViewSlot {
	pub(crate) kind: String,
	pub(crate) target: NodeKey,
	/// Bypass-proxy values and the defaults cached when the instance was created.
	pub(crate) own: Map<String, Value>,
	pub(crate) idle: bool,
}

#[derive(Debug, Default)]
pub struct ViewPool {
	slots: Vec<ViewSlot>,
	idle: HashMap<String, Vec<ViewKey>>,
}
impl ViewPool {
	/// Supplies an instance slid onto `node`.
	///
	/// Held nodes return their pinned instance, otherwise an idle instance of the node's type is reused or a new one created.
	/// `Ok(None)` means no view type is registered under the resolved tag.
	#[instrument(level = "trace", skip(self, tree, registry))]
	pub(crate) fn fetch(&mut self, tree: &ConfigTree, registry: &TypeRegistry, default_type: &str, node: NodeKey) -> Result<Option<ViewKey>, Error> {
		let config = tree.node(node);
		if let Some(held) = config.held {
			trace!("Node is held by {:?}.", held);
			return Ok(Some(held));
		}

		let kind = type_tag(config.node_type.as_ref(), default_type).ok_or_else(|| Error::InvalidNodeType {
			id: if cfg!(feature = "log-paths") { tree.id_path(node) } else { config.id.clone() },
			found: config.node_type.as_ref().map_or_else(String::new, Value::to_string),
		})?;

		if let Some(view) = self.idle.get_mut(kind).and_then(Vec::pop) {
			trace!("Reusing {:?}.", view);
			let slot = &mut self.slots[view.0];
			slot.idle = false;
			slot.target = node;
			return Ok(Some(view));
		}

		Ok(self.create(registry, kind, node))
	}

	/// Creates an instance of `kind` and runs its one-time attribute initialization.
	///
	/// Returns `None` (and logs a warning) if `kind` isn't registered.
	pub(crate) fn create(&mut self, registry: &TypeRegistry, kind: &str, target: NodeKey) -> Option<ViewKey> {
		if !registry.contains(kind) {
			warn!("No view type registered as {:?}.", kind);
			return None;
		}

		let view = ViewKey(self.slots.len());
		self.slots.push(ViewSlot {
			kind: kind.to_owned(),
			target,
			own: registry.defaults(kind),
			idle: false,
		});
		trace!("Created {:?} of type {:?}; {} instance(s) in total.", view, kind, self.slots.len());
		Some(view)
	}

	/// Puts `view` back onto its type's idle stack.
	///
	/// Does nothing while the instance is held by its node or if it's already idle.
	/// The slot keeps its target and own values, since the next fetch overwrites the target anyway.
	pub(crate) fn give_back(&mut self, tree: &ConfigTree, view: ViewKey) -> bool {
		let slot = &mut self.slots[view.0];
		if tree.node(slot.target).held == Some(view) {
			trace!("Not returning held {:?}.", view);
			return false;
		}
		if slot.idle {
			trace!("{:?} is already idle.", view);
			return false;
		}

		slot.idle = true;
		match self.idle.get_mut(&slot.kind) {
			Some(stack) => stack.push(view),
			None => {
				self.idle.insert(slot.kind.clone(), vec![view]);
			}
		}
		true
	}

	pub(crate) fn slot(&self, view: ViewKey) -> &ViewSlot {
		&self.slots[view.0]
	}

	pub(crate) fn slot_mut(&mut self, view: ViewKey) -> &mut ViewSlot {
		&mut self.slots[view.0]
	}

	#[must_use]
	pub fn idle_count(&self, kind: &str) -> usize {
		self.idle.get(kind).map_or(0, Vec::len)
	}

	/// All instances ever created, idle or not.
	#[must_use]
	pub fn instance_count(&self) -> usize {
		self.slots.len()
	}
}
