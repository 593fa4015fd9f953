//! The flyweight: a view handle slid over whichever config node is being worked on.

use crate::{
	config::{ConfigTree, NodeKey},
	dom::Surface,
	error::Error,
	manager::{fetch, LoadCallback, State, TreeManager},
	pool::ViewKey,
	render::{Attributes, CNAME_CHILDREN, CNAME_COLLAPSED, CNAME_CONTENT, CNAME_EXPANDED, CNAME_FIRSTCHILD, CNAME_LASTCHILD, CNAME_LOADING, CNAME_NOCHILDREN, CNAME_NODE},
};
use core::{cell::RefCell, fmt};
use serde_json::Value;
use std::rc::Rc;
use tracing::{error, instrument, trace, trace_span, warn};

/// Where a node stands with regard to expansion and loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
	/// No children yet, but a dynamic loader may still find some.
	UnloadedUnknown,
	Leaf,
	Collapsed,
	Expanded,
	/// A dynamic load is in flight.
	Loading,
}

/// A pooled view instance, currently slid onto one config node.
///
/// Dropping the handle returns the instance to the pool unless it is [held](`ViewNode::hold`).
/// The instance may then be slid onto any other node, so don't keep a `ViewNode` around for longer than the operation
/// it was fetched for. All state reads and writes go through to the node the view is slid onto, except for
/// bypass-proxy attributes, which stay with the instance.
pub struct ViewNode {
	pub(crate) shared: Rc<RefCell<State>>,
	key: ViewKey,
}

impl fmt::Debug for ViewNode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut debug = f.debug_struct("ViewNode");
		debug.field("key", &self.key);
		match self.shared.try_borrow() {
			Ok(state) => debug.field("target", &state.pool.slot(self.key).target),
			Err(_) => debug.field("target", &"<borrowed>"),
		};
		debug.finish()
	}
}

/// Two handles are equal iff they refer to the same pooled instance, regardless of where it is slid.
impl PartialEq for ViewNode {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.shared, &other.shared) && self.key == other.key
	}
}
impl Eq for ViewNode {}

impl Drop for ViewNode {
	fn drop(&mut self) {
		match self.shared.try_borrow_mut() {
			Ok(mut guard) => {
				let state = &mut *guard;
				state.pool.give_back(&state.tree, self.key);
			}
			Err(_) => error!("{:?} was released while the tree was borrowed. It won't be reused.", self.key),
		}
	}
}

enum Expansion {
	Load,
	Pending,
	Toggle { render_children: bool },
	Childless,
}

impl ViewNode {
	pub(crate) fn new(shared: Rc<RefCell<State>>, key: ViewKey) -> Self {
		Self { shared, key }
	}

	/// Identity of the pooled instance behind this handle.
	#[must_use]
	pub fn instance(&self) -> ViewKey {
		self.key
	}

	#[must_use]
	pub fn manager(&self) -> TreeManager {
		TreeManager::from_shared(Rc::clone(&self.shared))
	}

	/// The config node this view is currently slid onto.
	#[must_use]
	pub fn target(&self) -> NodeKey {
		self.shared.borrow().pool.slot(self.key).target
	}

	/// Type tag of the instance.
	#[must_use]
	pub fn kind(&self) -> String {
		self.shared.borrow().pool.slot(self.key).kind.clone()
	}

	/// Retargets the instance, so that later reads and writes observe `node` instead.
	///
	/// Sliding a held instance releases the hold. Returns `false` (and stays put) if `node` isn't part of this tree.
	pub fn slide(&self, node: NodeKey) -> bool {
		let mut guard = self.shared.borrow_mut();
		let state = &mut *guard;
		if !state.tree.contains(node) {
			warn!("Can't slide onto {:?}, which doesn't belong to this tree.", node);
			return false;
		}
		let slot = state.pool.slot_mut(self.key);
		let previous = state.tree.node_mut(slot.target);
		if previous.held == Some(self.key) {
			previous.held = None;
		}
		slot.target = node;
		true
	}

	#[must_use]
	pub fn id(&self) -> String {
		let state = self.shared.borrow();
		state.tree.node(state.pool.slot(self.key).target).id.clone()
	}

	#[must_use]
	pub fn label(&self) -> String {
		match self.get("label") {
			Some(Value::String(label)) => label,
			_ => String::new(),
		}
	}

	/// Reads an attribute.
	///
	/// Bypass-proxy attributes come from the instance. Everything else comes from the node the view is slid onto
	/// if that node has it, falling back to the instance's defaults.
	#[must_use]
	pub fn get(&self, name: &str) -> Option<Value> {
		match name {
			"id" => return Some(Value::from(self.id())),
			"depth" => return Some(Value::from(self.depth())),
			"expanded" => return Some(Value::from(self.is_expanded())),
			"isLeaf" => return Some(Value::from(self.is_leaf())),
			_ => (),
		}

		let state = self.shared.borrow();
		let slot = state.pool.slot(self.key);
		let bypass = state.registry.attribute(&slot.kind, name).map_or(false, |spec| spec.bypass_proxy);
		if !bypass {
			if let Some(value) = state.tree.node(slot.target).attributes.get(name) {
				return Some(value.clone());
			}
		}
		slot.own.get(name).cloned()
	}

	/// Writes an attribute, see [`ViewNode::get`] for where it ends up.
	///
	/// Setting `expanded` is the same as [`ViewNode::set_expanded`].
	#[instrument(skip(self, value))]
	pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<(), Error> {
		let value = value.into();
		match name {
			"expanded" => {
				return match value {
					Value::Bool(expanded) => self.set_expanded(expanded),
					value => Err(Error::InvalidAttributeValue {
						name: name.to_owned(),
						value: value.to_string(),
					}),
				}
			}
			"id" | "depth" | "children" | "type" | "isLeaf" | "held" => return Err(Error::ReadOnlyAttribute(name.to_owned())),
			_ => (),
		}

		let mut guard = self.shared.borrow_mut();
		let state = &mut *guard;
		let slot = state.pool.slot_mut(self.key);
		if let Some(spec) = state.registry.attribute(&slot.kind, name) {
			if spec.read_only {
				return Err(Error::ReadOnlyAttribute(name.to_owned()));
			}
			if !spec.accepts(&value) {
				return Err(Error::InvalidAttributeValue {
					name: name.to_owned(),
					value: value.to_string(),
				});
			}
			if spec.bypass_proxy {
				slot.own.insert(name.to_owned(), value);
				return Ok(());
			}
		}

		if cfg!(feature = "dangerous-logging") {
			trace!("Writing {} through to {:?}.", value, slot.target);
		}
		state.tree.node_mut(slot.target).attributes.insert(name.to_owned(), value);
		Ok(())
	}

	/// Levels below the synthetic root: top-level nodes are at 0, the root itself at -1.
	#[must_use]
	pub fn depth(&self) -> isize {
		let state = self.shared.borrow();
		state.tree.depth(state.pool.slot(self.key).target)
	}

	#[must_use]
	pub fn is_root(&self) -> bool {
		self.target() == ConfigTree::ROOT
	}

	/// `true` unless the node was explicitly collapsed.
	#[must_use]
	pub fn is_expanded(&self) -> bool {
		let state = self.shared.borrow();
		state.tree.node(state.pool.slot(self.key).target).expanded != Some(false)
	}

	#[must_use]
	pub fn is_leaf(&self) -> bool {
		let state = self.shared.borrow();
		state.tree.node(state.pool.slot(self.key).target).is_leaf
	}

	#[must_use]
	pub fn has_children(&self) -> bool {
		let state = self.shared.borrow();
		state.tree.node(state.pool.slot(self.key).target).has_children()
	}

	#[must_use]
	pub fn state(&self) -> NodeState {
		let state = self.shared.borrow();
		let node = state.tree.node(state.pool.slot(self.key).target);
		if node.loading {
			NodeState::Loading
		} else if node.has_children() {
			if node.expanded == Some(false) {
				NodeState::Collapsed
			} else {
				NodeState::Expanded
			}
		} else if node.is_leaf || state.loader.is_none() {
			NodeState::Leaf
		} else {
			NodeState::UnloadedUnknown
		}
	}

	/// Expands or collapses the node.
	///
	/// A childless node that isn't known to be a leaf is loaded dynamically on expansion if there is a loader.
	/// The first expansion of a rendered node renders its children, and rendered nodes get their classes
	/// and `aria-expanded` updated.
	#[instrument(skip(self))]
	pub fn set_expanded(&self, expanded: bool) -> Result<(), Error> {
		let (step, id, surface) = {
			let mut guard = self.shared.borrow_mut();
			let state = &mut *guard;
			let dynamic = state.loader.is_some();
			let node = state.tree.node_mut(state.pool.slot(self.key).target);
			node.expanded = Some(expanded);
			let step = if dynamic && !node.is_leaf && !node.has_children() {
				if expanded && !node.loading {
					node.loading = true;
					Expansion::Load
				} else {
					Expansion::Pending
				}
			} else if node.has_children() {
				Expansion::Toggle {
					render_children: expanded && node.rendered && !node.children_rendered,
				}
			} else {
				Expansion::Childless
			};
			(step, node.id.clone(), state.surface.clone().filter(|_| node.rendered))
		};

		match step {
			Expansion::Load => {
				self.load_dynamic(surface.as_deref(), &id);
				return Ok(());
			}
			Expansion::Pending => return Ok(()),
			Expansion::Toggle { render_children } => {
				if render_children {
					self.render_children()?;
				}
				if let Some(surface) = &surface {
					if expanded {
						surface.replace_class(&id, CNAME_COLLAPSED, CNAME_EXPANDED)
					} else {
						surface.replace_class(&id, CNAME_EXPANDED, CNAME_COLLAPSED)
					}
				}
			}
			Expansion::Childless => trace!("No children to show or hide."),
		}

		if let Some(surface) = &surface {
			surface.set_attribute(&id, "aria-expanded", if expanded { "true" } else { "false" });
		}
		Ok(())
	}

	pub fn expand(&self) -> Result<(), Error> {
		self.set_expanded(true)
	}

	pub fn collapse(&self) -> Result<(), Error> {
		self.set_expanded(false)
	}

	pub fn toggle(&self) -> Result<(), Error> {
		self.set_expanded(!self.is_expanded())
	}

	fn load_dynamic(&self, surface: Option<&dyn Surface>, id: &str) {
		if let Some(surface) = surface {
			surface.replace_class(id, CNAME_COLLAPSED, CNAME_LOADING);
		}
		let (loader, done) = {
			let state = self.shared.borrow();
			let done = LoadCallback {
				shared: Rc::downgrade(&self.shared),
				node: state.pool.slot(self.key).target,
			};
			(state.loader.clone(), done)
		};
		match loader {
			Some(loader) => {
				trace!("Loading children of {:?}.", id);
				loader.load(self, done)
			}
			None => warn!("The dynamic loader was removed before loading {:?}.", id),
		}
	}

	/// Pins this instance to its node: it won't be pooled, and fetching the node returns it.
	/// A node held by another instance stays with that one.
	///
	/// Undo with [`ViewNode::release`] or [`ViewNode::slide`].
	pub fn hold(&self) -> &Self {
		let mut guard = self.shared.borrow_mut();
		let state = &mut *guard;
		let target = state.pool.slot(self.key).target;
		let node = state.tree.node_mut(target);
		let held = node.held;
		match held {
			Some(holder) if holder != self.key => warn!("{:?} is already held by {:?}; not holding it with {:?}.", node.id, holder, self.key),
			_ => node.held = Some(self.key),
		}
		self
	}

	#[must_use]
	pub fn is_held(&self) -> bool {
		let state = self.shared.borrow();
		state.tree.node(state.pool.slot(self.key).target).held == Some(self.key)
	}

	/// Unpins the instance (if held) and returns it to the pool.
	pub fn release(self) {
		let mut guard = self.shared.borrow_mut();
		let state = &mut *guard;
		let node = state.tree.node_mut(state.pool.slot(self.key).target);
		if node.held == Some(self.key) {
			node.held = None;
		}
		drop(guard);
		// Dropping `self` returns the instance.
	}

	/// Calls `f` with a view of each child in order, releasing each before fetching the next.
	///
	/// `f` also receives the child's index and the keys of all children. Stops early if `f` returns `true`,
	/// and returns whether it did.
	pub fn for_some_children(&self, mut f: impl FnMut(&ViewNode, usize, &[NodeKey]) -> bool) -> Result<bool, Error> {
		self.try_for_some_children(|child, index, siblings| Ok(f(child, index, siblings)))
	}

	/// Fallible [`ViewNode::for_some_children`]. Errors stop the iteration.
	pub fn try_for_some_children(&self, mut f: impl FnMut(&ViewNode, usize, &[NodeKey]) -> Result<bool, Error>) -> Result<bool, Error> {
		let children = {
			let state = self.shared.borrow();
			state.tree.node(state.pool.slot(self.key).target).children().to_vec()
		};
		for (index, &child) in children.iter().enumerate() {
			let view = match fetch(&self.shared, child)? {
				Some(view) => view,
				None => {
					warn!("Skipping child {:?} without view.", child);
					continue;
				}
			};
			if f(&view, index, &children)? {
				return Ok(true);
			}
		}
		Ok(false)
	}

	/// The parent's view, or `None` for the root.
	pub fn parent(&self) -> Result<Option<ViewNode>, Error> {
		let parent = {
			let state = self.shared.borrow();
			state.tree.node(state.pool.slot(self.key).target).parent
		};
		match parent {
			Some(parent) => fetch(&self.shared, parent),
			None => Ok(None),
		}
	}

	/// The following sibling's view, or `None` for the last child.
	pub fn next_sibling(&self) -> Result<Option<ViewNode>, Error> {
		self.sibling(|index, count| Some(index + 1).filter(|&next| next < count))
	}

	/// The preceding sibling's view, or `None` for the first child.
	pub fn previous_sibling(&self) -> Result<Option<ViewNode>, Error> {
		self.sibling(|index, _| index.checked_sub(1))
	}

	fn sibling(&self, step: impl FnOnce(usize, usize) -> Option<usize>) -> Result<Option<ViewNode>, Error> {
		let sibling = {
			let state = self.shared.borrow();
			let target = state.pool.slot(self.key).target;
			let siblings = state.tree.siblings(target);
			siblings
				.iter()
				.position(|&sibling| sibling == target)
				.and_then(|index| step(index, siblings.len()))
				.map(|index| siblings[index])
		};
		match sibling {
			Some(sibling) => fetch(&self.shared, sibling),
			None => Ok(None),
		}
	}

	pub fn focus(&self) -> Result<(), Error> {
		self.manager().set_focused_node(Some(self))
	}

	/// Moves focus back to the first top-level node.
	pub fn blur(&self) -> Result<(), Error> {
		self.manager().set_focused_node(None)
	}

	/// Markup for this node and, if it is expanded, its descendants.
	///
	/// `index` and `siblings` (the sibling count including this node) select the first/last-child classes.
	pub fn markup(&self, index: usize, siblings: usize) -> Result<String, Error> {
		let span = trace_span!("markup", key = ?self.key);
		let _enter = span.enter();

		let (template, names, renderer, dynamic, focused) = {
			let mut guard = self.shared.borrow_mut();
			let state = &mut *guard;
			let slot = state.pool.slot(self.key);
			let node = state.tree.node_mut(slot.target);
			node.rendered = true;

			let template = match node.attributes.get("template").or_else(|| slot.own.get("template")) {
				Some(Value::String(template)) => template.clone(),
				_ => state.registry.template(&slot.kind).unwrap_or_default().to_owned(),
			};
			let mut names: Vec<String> = state.registry.attribute_names(&slot.kind).into_iter().map(str::to_owned).collect();
			for name in node.attributes.keys() {
				if !names.contains(name) {
					names.push(name.clone());
				}
			}
			(template, names, Rc::clone(&state.renderer), state.loader.is_some(), state.focused == Some(slot.target))
		};

		let mut attributes = Attributes::new();
		for name in names {
			let value = match self.get(&name) {
				Some(Value::String(value)) => value,
				Some(Value::Null) | None => String::new(),
				Some(value) => value.to_string(),
			};
			attributes.insert(name, value);
		}

		let mut classes = vec![CNAME_NODE];
		let mut children = String::new();
		if self.has_children() {
			if self.is_expanded() {
				self.try_for_some_children(|child, index, siblings| {
					children.push_str(&child.markup(index, siblings.len())?);
					Ok(false)
				})?;
				let mut state = self.shared.borrow_mut();
				let target = state.pool.slot(self.key).target;
				state.tree.node_mut(target).children_rendered = true;
				classes.push(CNAME_EXPANDED);
			} else {
				classes.push(CNAME_COLLAPSED);
			}
		} else if dynamic && !self.is_leaf() {
			classes.push(CNAME_COLLAPSED);
		} else {
			classes.push(CNAME_NOCHILDREN);
		}
		if index == 0 {
			classes.push(CNAME_FIRSTCHILD);
		}
		if index + 1 == siblings {
			classes.push(CNAME_LASTCHILD);
		}

		attributes.insert("children".to_owned(), children);
		attributes.insert("cname_node".to_owned(), classes.join(" "));
		attributes.insert("cname_content".to_owned(), CNAME_CONTENT.to_owned());
		attributes.insert("cname_children".to_owned(), CNAME_CHILDREN.to_owned());
		attributes.insert("tabIndex".to_owned(), if focused { "0" } else { "-1" }.to_owned());

		Ok(renderer.render(&template, &attributes))
	}

	/// Re-renders the children of this node into its children container.
	pub(crate) fn render_children(&self) -> Result<(), Error> {
		let mut markup = String::new();
		self.try_for_some_children(|child, index, siblings| {
			markup.push_str(&child.markup(index, siblings.len())?);
			Ok(false)
		})?;

		let (id, surface) = {
			let mut guard = self.shared.borrow_mut();
			let state = &mut *guard;
			let node = state.tree.node_mut(state.pool.slot(self.key).target);
			node.children_rendered = true;
			(node.id.clone(), state.surface.clone())
		};
		match surface {
			Some(surface) => surface.set_children_content(&id, &markup),
			None => warn!("No surface to render the children of {:?} into.", id),
		}
		Ok(())
	}
}
