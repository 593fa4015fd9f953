//! Live-DOM collaborators: patching rendered nodes in place and routing container events back to views.

use crate::{
	manager::{TreeManager, WeakTreeManager},
	rc_hash_map::RcHashMap,
	render::{CNAME_CHILDREN, CNAME_CONTENT, CNAME_NODE},
};
use js_sys::Function;
use tracing::{error, instrument, level_filters::STATIC_MAX_LEVEL, trace, trace_span, warn, Level};
use wasm_bindgen::{closure::Closure, JsCast};

/// Applies incremental changes to already rendered markup.
///
/// Nodes are addressed by their id, which is the `id` attribute of their outer element.
/// Implementations report failures themselves; the tree carries on regardless.
pub trait Surface {
	/// Replaces the whole tree's markup.
	fn set_content(&self, markup: &str);
	/// Replaces the markup inside the children container of node `id`.
	fn set_children_content(&self, id: &str, markup: &str);
	fn replace_class(&self, id: &str, old: &str, new: &str);
	fn set_attribute(&self, id: &str, name: &str, value: &str);
	/// Moves the roving `tabIndex` (and DOM focus) from `previous` to `next`.
	fn move_focus(&self, previous: Option<&str>, next: &str);
}

/// A [`Surface`] rendering into the children of a container [`web_sys::Element`].
///
/// The container should be connected to its document, as nodes are looked up by id.
#[derive(Debug, Clone)]
pub struct WebSurface {
	container: web_sys::Element,
}
impl WebSurface {
	#[must_use]
	pub fn new(container: web_sys::Element) -> Self {
		Self { container }
	}

	#[must_use]
	pub fn container(&self) -> &web_sys::Element {
		&self.container
	}

	fn node(&self, id: &str) -> Option<web_sys::Element> {
		let document = match self.container.owner_document() {
			Some(document) => document,
			None => {
				error!("The container has no owner document.");
				return None;
			}
		};
		let node = document.get_element_by_id(id);
		if node.is_none() {
			warn!("No element with id {:?} is rendered.", id);
		}
		node
	}

	fn part(&self, id: &str, class: &str) -> Option<web_sys::Element> {
		let node = self.node(id)?;
		match node.query_selector(&format!(".{}", class)) {
			Ok(Some(part)) => Some(part),
			Ok(None) => {
				error!("Node {:?} has no .{} element. Check its template.", id, class);
				None
			}
			Err(error) => {
				error!("Failed to query .{} of node {:?}: {:?}", class, id, error);
				None
			}
		}
	}

	fn content(&self, id: &str) -> Option<web_sys::HtmlElement> {
		let content = self.part(id, CNAME_CONTENT)?;
		match content.dyn_into::<web_sys::HtmlElement>() {
			Ok(content) => Some(content),
			Err(content) => {
				error!("Expected the content of node {:?} to be an HTML element but found <{}>.", id, content.tag_name());
				None
			}
		}
	}
}

impl Surface for WebSurface {
	#[instrument(skip(self, markup), fields(len = markup.len()))]
	fn set_content(&self, markup: &str) {
		self.container.set_inner_html(markup)
	}

	#[instrument(skip(self, markup), fields(len = markup.len()))]
	fn set_children_content(&self, id: &str, markup: &str) {
		if let Some(children) = self.part(id, CNAME_CHILDREN) {
			children.set_inner_html(markup)
		}
	}

	#[instrument(skip(self))]
	fn replace_class(&self, id: &str, old: &str, new: &str) {
		if let Some(node) = self.node(id) {
			let class_list = node.class_list();
			if let Err(error) = class_list.remove_1(old) {
				error!("Failed to remove class: {:?}", error)
			}
			if let Err(error) = class_list.add_1(new) {
				error!("Failed to add class: {:?}", error)
			}
		}
	}

	#[instrument(skip(self))]
	fn set_attribute(&self, id: &str, name: &str, value: &str) {
		if let Some(node) = self.node(id) {
			if let Err(error) = node.set_attribute(name, value) {
				error!("Failed to set attribute: {:?}", error)
			}
		}
	}

	#[instrument(skip(self))]
	fn move_focus(&self, previous: Option<&str>, next: &str) {
		if let Some(previous) = previous.and_then(|previous| self.content(previous)) {
			previous.set_tab_index(-1);
			if let Err(error) = previous.blur() {
				error!("Failed to blur: {:?}", error)
			}
		}
		if let Some(next) = self.content(next) {
			next.set_tab_index(0);
			if let Err(error) = next.focus() {
				error!("Failed to focus: {:?}", error)
			}
		}
	}
}

/// Listens for DOM events on a container and redispatches them onto the view of the node they originated in,
/// through [`TreeManager::dispatch`].
///
/// All event names share one JavaScript callback. Listeners are counted per event name, so independent parts of an
/// application can [`listen`](`DomEvents::listen`) to the same name and only the last
/// [`unlisten`](`DomEvents::unlisten`) detaches it.
///
/// Dropping this removes all listeners. It only refers to the manager weakly.
#[derive(Debug)]
pub struct DomEvents {
	container: web_sys::Element,
	listeners: RcHashMap<String, u16>,
	common_handler: Closure<dyn Fn(web_sys::Event)>,
}
impl DomEvents {
	#[must_use]
	#[instrument(skip(manager))]
	pub fn new(container: web_sys::Element, manager: &TreeManager) -> Self {
		let manager = manager.downgrade();
		Self {
			container,
			listeners: RcHashMap::new(),
			common_handler: Closure::wrap(Box::new(move |event: web_sys::Event| redispatch(&manager, &event))),
		}
	}

	/// Listens for each of `kinds` right away.
	#[must_use]
	pub fn with_events(container: web_sys::Element, manager: &TreeManager, kinds: &[&str]) -> Self {
		let mut events = Self::new(container, manager);
		for kind in kinds {
			events.listen(kind);
		}
		events
	}

	/// Starts (or counts one more use of) listening for `kind`.
	pub fn listen(&mut self, kind: &str) {
		let added = match self.listeners.increment(kind.to_owned()) {
			Ok(added) => added,
			Err(error) => return error!("Too many (more than 65k) listeners for {:?}: {:?}", kind, error),
		};
		if added {
			trace!("Adding listener for {:?}.", kind);
			if let Err(error) = self.container.add_event_listener_with_callback(kind, self.common_handler.as_ref().unchecked_ref::<Function>()) {
				error!("Failed to add event listener: {:?}", error)
			}
		}
	}

	/// Counts one use fewer of `kind`, detaching its listener once nothing uses it.
	pub fn unlisten(&mut self, kind: &str) {
		match self.listeners.weak_decrement(kind) {
			Ok(true) => (),
			Ok(false) => warn!("Not listening for {:?}.", kind),
			Err(error) => error!("Unlistened {:?} more often than it was listened to: {:?}", kind, error),
		}

		let container = &self.container;
		let common_handler = &self.common_handler;
		for kind in self.listeners.drain_weak() {
			trace!("Removing listener for {:?}.", kind);
			if let Err(error) = container.remove_event_listener_with_callback(&kind, common_handler.as_ref().unchecked_ref::<Function>()) {
				error!("Failed to remove event listener: {:?}", error)
			}
		}
	}
}

impl Drop for DomEvents {
	fn drop(&mut self) {
		for kind in self.listeners.keys() {
			if let Err(error) = self.container.remove_event_listener_with_callback(kind, self.common_handler.as_ref().unchecked_ref::<Function>()) {
				error!("Failed to remove event listener for {:?}: {:?}", kind, error)
			}
		}
	}
}

fn redispatch(manager: &WeakTreeManager, event: &web_sys::Event) {
	let kind = event.type_();
	let span = trace_span!("redispatch", kind = %kind);
	let _enter = span.enter();

	let manager = match manager.upgrade() {
		Some(manager) => manager,
		None => return warn!("Received {:?} after the tree was dropped.", kind),
	};
	let origin = match event.target().and_then(|target| target.dyn_into::<web_sys::Element>().ok()) {
		Some(origin) => origin,
		None => return trace!("Ignoring event without element target."),
	};
	let node = match origin.closest(&format!(".{}", CNAME_NODE)) {
		Ok(Some(node)) => node,
		Ok(None) => return trace!("Ignoring event from outside any node."),
		Err(error) => return error!("Failed to find the node an event originated in: {:?}", error),
	};

	let id = node.id();
	if STATIC_MAX_LEVEL >= Level::TRACE && cfg!(feature = "dangerous-logging") {
		trace!("Redispatching onto {:?}.", id);
	}
	match manager.dispatch(&kind, &id, Some(event)) {
		Ok(true) => (),
		Ok(false) => warn!("No node with id {:?} found for a {:?} event.", id, kind),
		Err(error) => error!("Failed to redispatch {:?}: {}", kind, error),
	}
}
