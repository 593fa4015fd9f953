//! Tree-wide operations and the state shared by all views of one tree.

use crate::{
	config::{ConfigTree, NodeKey},
	dom::Surface,
	error::Error,
	pool::ViewPool,
	registry::{TypeRegistry, ViewClass, BASE_TYPE},
	render::{Renderer, Substitute, CNAME_COLLAPSED, CNAME_EXPANDED, CNAME_LOADING, CNAME_NOCHILDREN},
	view::ViewNode,
};
use core::cell::{Ref, RefCell};
use hashbrown::HashMap;
use serde_json::Value;
use std::rc::{Rc, Weak};
use tracing::{error, info, instrument, trace, trace_span, warn};

/// Supplies children for a node on demand.
///
/// Called with the view of the node being expanded and a [`LoadCallback`] that must eventually be completed once.
/// Errors are the loader's own business: completing with `None` marks the node as a leaf.
/// There is no timeout; a loader that never completes leaves the node loading.
pub trait DynamicLoader {
	fn load(&self, node: &ViewNode, done: LoadCallback);
}

impl<F: Fn(&ViewNode, LoadCallback)> DynamicLoader for F {
	fn load(&self, node: &ViewNode, done: LoadCallback) {
		self(node, done)
	}
}

/// Node-level event handler, see [`TreeManager::on`].
pub type EventHandler = dyn Fn(&ViewNode, &NodeEvent<'_>);

/// An event redispatched onto the view of the node it originated from.
#[derive(Debug, Clone, Copy)]
pub struct NodeEvent<'a> {
	pub kind: &'a str,
	pub dom_event: Option<&'a web_sys::Event>,
}

/// Construction parameters for a [`TreeManager`].
pub struct Options {
	/// Type of nodes without an explicit `type`.
	pub default_type: String,
	pub dynamic_loader: Option<Rc<dyn DynamicLoader>>,
	pub renderer: Rc<dyn Renderer>,
	pub surface: Option<Rc<dyn Surface>>,
	/// Registered in order, so parents must come before their subtypes.
	pub types: Vec<ViewClass>,
}
impl Default for Options {
	fn default() -> Self {
		Self {
			default_type: BASE_TYPE.to_owned(),
			dynamic_loader: None,
			renderer: Rc::new(Substitute),
			surface: None,
			types: Vec::new(),
		}
	}
}

pub(crate) struct State {
	pub(crate) tree: ConfigTree,
	pub(crate) pool: ViewPool,
	pub(crate) registry: TypeRegistry,
	pub(crate) default_type: String,
	pub(crate) focused: Option<NodeKey>,
	pub(crate) loader: Option<Rc<dyn DynamicLoader>>,
	pub(crate) renderer: Rc<dyn Renderer>,
	pub(crate) surface: Option<Rc<dyn Surface>>,
	pub(crate) handlers: HashMap<String, Vec<Rc<EventHandler>>>,
}

/// Owns the config tree and the view pool.
///
/// This is a cheap handle: clones refer to the same tree. Everything is single-threaded and none of the internal
/// borrows are held while loaders, renderers, surfaces or event handlers run, so those may call back into the manager.
#[derive(Clone)]
pub struct TreeManager {
	pub(crate) shared: Rc<RefCell<State>>,
}

/// A [`TreeManager`] reference that doesn't keep the tree alive.
#[derive(Clone)]
pub struct WeakTreeManager(Weak<RefCell<State>>);
impl WeakTreeManager {
	#[must_use]
	pub fn upgrade(&self) -> Option<TreeManager> {
		self.0.upgrade().map(|shared| TreeManager { shared })
	}
}

impl TreeManager {
	/// Loads `config` (an array of node descriptors) with default [`Options`].
	pub fn new(config: &[Value]) -> Result<Self, Error> {
		Self::with_options(config, Options::default())
	}

	/// Loads `config` into a fresh tree. The descriptors are copied, never modified.
	#[instrument(skip(config, options), fields(count = config.len()))]
	pub fn with_options(config: &[Value], options: Options) -> Result<Self, Error> {
		let mut registry = TypeRegistry::new();
		for class in options.types {
			registry.register(class)?;
		}

		let mut tree = ConfigTree::new();
		let top_level = tree.attach(ConfigTree::ROOT, config, options.dynamic_loader.is_some())?;
		info!("Loaded {} node(s).", tree.len() - 1);

		Ok(Self {
			shared: Rc::new(RefCell::new(State {
				tree,
				pool: ViewPool::default(),
				registry,
				default_type: options.default_type,
				focused: top_level.first().copied(),
				loader: options.dynamic_loader,
				renderer: options.renderer,
				surface: options.surface,
				handlers: HashMap::new(),
			})),
		})
	}

	pub(crate) fn from_shared(shared: Rc<RefCell<State>>) -> Self {
		Self { shared }
	}

	#[must_use]
	pub fn downgrade(&self) -> WeakTreeManager {
		WeakTreeManager(Rc::downgrade(&self.shared))
	}

	/// Read access to the underlying config tree.
	///
	/// # Panics
	///
	/// Iff the tree is currently being modified, which can only happen from inside a renderer or surface call.
	#[must_use]
	pub fn tree(&self) -> Ref<'_, ConfigTree> {
		Ref::map(self.shared.borrow(), |state| &state.tree)
	}

	/// Fetches a view slid onto `node`.
	///
	/// `Ok(None)` if `node` isn't part of this tree or no view type is registered for it.
	pub fn fetch(&self, node: NodeKey) -> Result<Option<ViewNode>, Error> {
		fetch(&self.shared, node)
	}

	/// A view of the synthetic root, whose children are the top-level nodes.
	pub fn root(&self) -> Result<Option<ViewNode>, Error> {
		self.fetch(ConfigTree::ROOT)
	}

	pub fn find_by_id(&self, id: &str) -> Result<Option<ViewNode>, Error> {
		let node = self.shared.borrow().tree.find(id);
		match node {
			Some(node) => self.fetch(node),
			None => Ok(None),
		}
	}

	/// Markup for the whole tree, recursing into expanded nodes only.
	#[instrument(skip(self))]
	pub fn markup(&self) -> Result<String, Error> {
		let root = match self.root()? {
			Some(root) => root,
			None => return Ok(String::new()),
		};
		let mut markup = String::new();
		root.try_for_some_children(|child, index, siblings| {
			markup.push_str(&child.markup(index, siblings.len())?);
			Ok(false)
		})?;
		Ok(markup)
	}

	/// Writes [`TreeManager::markup`] into the surface, if there is one.
	#[instrument(skip(self))]
	pub fn render(&self) -> Result<(), Error> {
		let markup = self.markup()?;
		let surface = self.shared.borrow().surface.clone();
		match surface {
			Some(surface) => surface.set_content(&markup),
			None => warn!("Rendered without a surface; the markup is discarded."),
		}
		Ok(())
	}

	/// Expands every node that already has children.
	///
	/// Childless nodes are left alone even if a dynamic loader is configured, since that could load the entire backing store.
	#[instrument(skip(self))]
	pub fn expand_all(&self) -> Result<(), Error> {
		let nodes = self.shared.borrow().tree.descendants(ConfigTree::ROOT);
		for node in nodes {
			let collapsed = {
				let state = self.shared.borrow();
				let config = state.tree.node(node);
				config.has_children() && config.expanded == Some(false)
			};
			if collapsed {
				if let Some(view) = self.fetch(node)? {
					view.set_expanded(true)?;
				}
			}
		}
		Ok(())
	}

	/// Visits every loaded node in pre-order until `f` returns `true`.
	///
	/// `f` receives the view, its depth (top-level nodes are at 0), its index among its siblings and those siblings.
	/// Returns whether the traversal was stopped early.
	pub fn for_some_nodes(&self, mut f: impl FnMut(&ViewNode, isize, usize, &[NodeKey]) -> bool) -> Result<bool, Error> {
		fn for_one_level(view: &ViewNode, depth: isize, f: &mut dyn FnMut(&ViewNode, isize, usize, &[NodeKey]) -> bool) -> Result<bool, Error> {
			view.try_for_some_children(|child, index, siblings| {
				if f(child, depth, index, siblings) {
					return Ok(true);
				}
				for_one_level(child, depth + 1, f)
			})
		}

		let span = trace_span!("for_some_nodes");
		let _enter = span.enter();
		match self.root()? {
			Some(root) => for_one_level(&root, 0, &mut f),
			None => Ok(false),
		}
	}

	/// The node that has (or would have) keyboard focus within the tree.
	pub fn focused_node(&self) -> Result<Option<ViewNode>, Error> {
		let focused = self.shared.borrow().focused;
		match focused {
			Some(node) => self.fetch(node),
			None => Ok(None),
		}
	}

	/// Moves focus to `node`, or to the first top-level node for `None`.
	///
	/// Views of other managers are rejected and leave the focus where it was.
	#[instrument(skip(self, node))]
	pub fn set_focused_node(&self, node: Option<&ViewNode>) -> Result<(), Error> {
		let target = match node {
			Some(view) if Rc::ptr_eq(&view.shared, &self.shared) => Some(view.target()),
			Some(view) => {
				return Err(Error::InvalidAttributeValue {
					name: "focusedNode".to_owned(),
					value: format!("{:?} of another tree", view.instance()),
				})
			}
			None => self.shared.borrow().tree.node(ConfigTree::ROOT).children().first().copied(),
		};
		self.focus_on(target);
		Ok(())
	}

	fn focus_on(&self, target: Option<NodeKey>) {
		let (surface, previous, next) = {
			let mut state = self.shared.borrow_mut();
			let previous = state.focused;
			let target = match target {
				Some(target) if Some(target) != previous => target,
				_ => return,
			};
			state.focused = Some(target);
			let next = state.tree.node(target);
			let surface = state.surface.clone().filter(|_| next.rendered);
			(surface, previous.map(|previous| state.tree.node(previous).id.clone()), next.id.clone())
		};
		trace!("Focus moved to {:?}.", next);
		if let Some(surface) = surface {
			surface.move_focus(previous.as_deref(), &next);
		}
	}

	/// Replaces the dynamic loader.
	///
	/// Setting one makes every node without children collapsed unless it's known to be a leaf, since it may now be expanded.
	/// Set this before rendering, as childless nodes render differently with a loader around.
	pub fn set_dynamic_loader(&self, loader: Option<Rc<dyn DynamicLoader>>) {
		let mut state = self.shared.borrow_mut();
		if loader.is_some() {
			state.tree.apply_dynamic_defaults();
		}
		state.loader = loader;
	}

	#[must_use]
	pub fn has_dynamic_loader(&self) -> bool {
		self.shared.borrow().loader.is_some()
	}

	/// Only affects instances fetched from now on; idle instances of the previous default stay pooled under their own type.
	pub fn set_default_type(&self, name: impl Into<String>) {
		self.shared.borrow_mut().default_type = name.into();
	}

	#[must_use]
	pub fn default_type(&self) -> String {
		self.shared.borrow().default_type.clone()
	}

	pub fn register_type(&self, class: ViewClass) -> Result<(), Error> {
		self.shared.borrow_mut().registry.register(class)
	}

	pub fn set_surface(&self, surface: Option<Rc<dyn Surface>>) {
		self.shared.borrow_mut().surface = surface;
	}

	/// Registers `handler` for events of `kind` redispatched through [`TreeManager::dispatch`].
	pub fn on(&self, kind: impl Into<String>, handler: impl Fn(&ViewNode, &NodeEvent<'_>) + 'static) {
		self.shared.borrow_mut().handlers.entry(kind.into()).or_insert_with(Vec::new).push(Rc::new(handler));
	}

	/// Slides a view onto the node rendered with id `element_id` and calls the handlers for `kind` on it.
	///
	/// Returns `Ok(false)` if no such node exists.
	#[instrument(skip(self, dom_event))]
	pub fn dispatch(&self, kind: &str, element_id: &str, dom_event: Option<&web_sys::Event>) -> Result<bool, Error> {
		let (node, handlers) = {
			let state = self.shared.borrow();
			(state.tree.find(element_id), state.handlers.get(kind).cloned().unwrap_or_default())
		};
		let view = match node {
			Some(node) => self.fetch(node)?,
			None => None,
		};
		let view = match view {
			Some(view) => view,
			None => {
				trace!("No node found.");
				return Ok(false);
			}
		};

		let event = NodeEvent { kind, dom_event };
		for handler in &handlers {
			handler(&view, &event);
		}
		Ok(true)
	}

	#[must_use]
	pub fn idle_count(&self, kind: &str) -> usize {
		self.shared.borrow().pool.idle_count(kind)
	}

	#[must_use]
	pub fn instance_count(&self) -> usize {
		self.shared.borrow().pool.instance_count()
	}
}

pub(crate) fn fetch(shared: &Rc<RefCell<State>>, node: NodeKey) -> Result<Option<ViewNode>, Error> {
	let view = {
		let mut guard = shared.borrow_mut();
		let state = &mut *guard;
		if !state.tree.contains(node) {
			warn!("{:?} doesn't belong to this tree.", node);
			return Ok(None);
		}
		state.pool.fetch(&state.tree, &state.registry, &state.default_type, node)?
	};
	Ok(view.map(|view| ViewNode::new(Rc::clone(shared), view)))
}

/// Completes a dynamic load started for one node.
///
/// Consumed on use, so it completes at most once. It refers to the node by key and to the manager weakly,
/// so it stays valid no matter what the view that started the load is slid onto meanwhile.
#[derive(Debug)]
pub struct LoadCallback {
	pub(crate) shared: Weak<RefCell<State>>,
	pub(crate) node: NodeKey,
}
impl LoadCallback {
	/// The node whose children are being loaded.
	#[must_use]
	pub fn node(&self) -> NodeKey {
		self.node
	}

	#[must_use]
	pub fn manager(&self) -> Option<TreeManager> {
		self.shared.upgrade().map(TreeManager::from_shared)
	}

	/// Attaches `children` (node descriptors) and expands the node, or marks it as a leaf for `None`.
	///
	/// The node ends up expanded even if it was collapsed while loading. An empty list leaves it collapsed and
	/// unloaded, so the next expansion loads again.
	/// Invalid descriptors leave the node childless (and collapsed) and return the error.
	#[instrument(skip(children), fields(count = ?children.as_ref().map(Vec::len)))]
	pub fn complete(self, children: Option<Vec<Value>>) -> Result<(), Error> {
		let shared = match self.shared.upgrade() {
			Some(shared) => shared,
			None => {
				warn!("The tree was dropped before loading finished.");
				return Ok(());
			}
		};

		let (surface, id, attached) = {
			let mut guard = shared.borrow_mut();
			let state = &mut *guard;
			let dynamic = state.loader.is_some();
			let node = state.tree.node_mut(self.node);
			node.loading = false;
			let (rendered, id) = (node.rendered, node.id.clone());
			let surface = state.surface.clone().filter(|_| rendered);
			let attached = match children {
				Some(children) => match state.tree.attach(self.node, &children, dynamic) {
					Ok(keys) => {
						state.tree.node_mut(self.node).expanded = Some(!keys.is_empty());
						if state.focused.is_none() {
							state.focused = keys.first().copied();
						}
						Ok(())
					}
					Err(error) => {
						state.tree.node_mut(self.node).expanded = Some(false);
						Err(error)
					}
				},
				None => {
					state.tree.node_mut(self.node).is_leaf = true;
					Ok(())
				}
			};
			(surface, id, attached)
		};

		if let Err(error) = attached {
			error!("Dynamically loaded children were rejected: {}", error);
			if let Some(surface) = surface {
				surface.replace_class(&id, CNAME_LOADING, CNAME_COLLAPSED);
			}
			return Err(error);
		}

		if let Some(surface) = surface {
			let (is_leaf, has_children) = {
				let state = shared.borrow();
				let node = state.tree.node(self.node);
				(node.is_leaf, node.has_children())
			};
			if is_leaf {
				surface.replace_class(&id, CNAME_LOADING, CNAME_NOCHILDREN);
			} else if has_children {
				if let Some(view) = fetch(&shared, self.node)? {
					view.render_children()?;
				}
				surface.replace_class(&id, CNAME_LOADING, CNAME_EXPANDED);
				surface.set_attribute(&id, "aria-expanded", "true");
			} else {
				surface.replace_class(&id, CNAME_LOADING, CNAME_COLLAPSED);
				surface.set_attribute(&id, "aria-expanded", "false");
			}
		}
		Ok(())
	}
}
