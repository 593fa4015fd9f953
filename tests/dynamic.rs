use flyweight_tree::{DynamicLoader, Error, LoadCallback, NodeState, Options, Surface, TreeManager, ViewNode};
use serde_json::{json, Value};
use std::{
	cell::{Cell, RefCell},
	rc::Rc,
};

#[derive(Default)]
struct Recorder(RefCell<Vec<String>>);
impl Surface for Recorder {
	fn set_content(&self, _markup: &str) {}

	fn set_children_content(&self, id: &str, markup: &str) {
		self.0.borrow_mut().push(format!("children {} {}", id, markup));
	}

	fn replace_class(&self, id: &str, old: &str, new: &str) {
		self.0.borrow_mut().push(format!("class {} {} -> {}", id, old, new));
	}

	fn set_attribute(&self, _id: &str, _name: &str, _value: &str) {}

	fn move_focus(&self, _previous: Option<&str>, _next: &str) {}
}

/// Completes every load immediately with `children` and counts the calls.
fn immediate(children: Option<Vec<Value>>) -> (Rc<dyn DynamicLoader>, Rc<Cell<usize>>) {
	let calls = Rc::new(Cell::new(0));
	let loader = {
		let calls = Rc::clone(&calls);
		move |_: &ViewNode, done: LoadCallback| {
			calls.set(calls.get() + 1);
			done.complete(children.clone()).unwrap();
		}
	};
	(Rc::new(loader), calls)
}

fn dynamic(config: &[Value], loader: Rc<dyn DynamicLoader>, surface: Option<Rc<dyn Surface>>) -> TreeManager {
	TreeManager::with_options(
		config,
		Options {
			dynamic_loader: Some(loader),
			surface,
			..Options::default()
		},
	)
	.unwrap()
}

#[test]
fn childless_nodes_start_unloaded() {
	let (loader, calls) = immediate(None);
	let tree = dynamic(
		&[json!({ "id": "x" }), json!({ "id": "leaf", "isLeaf": true }), json!({ "id": "p", "children": [] })],
		loader,
		None,
	);
	let x = tree.find_by_id("x").unwrap().unwrap();
	assert_eq!(x.state(), NodeState::UnloadedUnknown);
	assert!(!x.is_expanded());
	drop(x);

	let leaf = tree.find_by_id("leaf").unwrap().unwrap();
	assert_eq!(leaf.state(), NodeState::Leaf);
	assert!(leaf.is_expanded());
	drop(leaf);

	let p = tree.find_by_id("p").unwrap().unwrap();
	assert_eq!(p.state(), NodeState::UnloadedUnknown);
	assert!(!p.is_expanded());
	assert_eq!(calls.get(), 0);
}

#[test]
fn empty_child_lists_load_on_the_first_toggle() {
	let (loader, calls) = immediate(Some(vec![json!({ "id": "c" })]));
	let tree = dynamic(&[json!({ "id": "p", "children": [] })], loader, None);
	assert!(tree
		.markup()
		.unwrap()
		.starts_with(r#"<div id="p" class="flyweight-tree-node flyweight-tree-node-collapsed flyweight-tree-node-first-child flyweight-tree-node-last-child" role="treeitem" aria-expanded="false">"#));

	let p = tree.find_by_id("p").unwrap().unwrap();
	p.toggle().unwrap();
	assert_eq!(calls.get(), 1);
	assert_eq!(p.state(), NodeState::Expanded);
	assert!(p.has_children());
}

#[test]
fn loaded_children_are_attached_and_expanded() {
	let (loader, calls) = immediate(Some(vec![json!({ "id": "c", "label": "C" })]));
	let tree = dynamic(&[json!({ "id": "x", "label": "X" })], loader, None);
	let x = tree.find_by_id("x").unwrap().unwrap();
	x.expand().unwrap();
	assert_eq!(calls.get(), 1);
	assert_eq!(x.state(), NodeState::Expanded);
	assert!(!x.is_leaf());

	let mut labels = Vec::new();
	x.for_some_children(|child, _, _| {
		labels.push(child.label());
		false
	})
	.unwrap();
	assert_eq!(labels, vec!["C".to_owned()]);

	let c = tree.find_by_id("c").unwrap().unwrap();
	assert_eq!(c.depth(), 1);
	assert_eq!(c.state(), NodeState::UnloadedUnknown);
}

#[test]
fn empty_load_marks_a_leaf() {
	let recorder = Rc::new(Recorder::default());
	let (loader, calls) = immediate(None);
	let tree = dynamic(&[json!({ "id": "x" })], loader, Some(recorder.clone()));
	tree.render().unwrap();
	assert!(tree.markup().unwrap().contains("flyweight-tree-node-collapsed"));

	let x = tree.find_by_id("x").unwrap().unwrap();
	x.expand().unwrap();
	assert_eq!(x.state(), NodeState::Leaf);
	assert!(x.is_leaf());
	assert_eq!(
		*recorder.0.borrow(),
		vec![
			"class x flyweight-tree-node-collapsed -> flyweight-tree-node-loading".to_owned(),
			"class x flyweight-tree-node-loading -> flyweight-tree-node-no-children".to_owned(),
		]
	);

	x.collapse().unwrap();
	x.expand().unwrap();
	assert_eq!(calls.get(), 1);
	assert!(tree.markup().unwrap().contains("flyweight-tree-node-no-children"));
}

#[test]
fn rendered_loads_render_their_children() {
	let recorder = Rc::new(Recorder::default());
	let (loader, _) = immediate(Some(vec![json!({ "id": "c", "label": "C" })]));
	let tree = dynamic(&[json!({ "id": "x" })], loader, Some(recorder.clone()));
	tree.render().unwrap();

	tree.find_by_id("x").unwrap().unwrap().expand().unwrap();
	let log = recorder.0.borrow();
	assert_eq!(log.len(), 3);
	assert_eq!(log[0], "class x flyweight-tree-node-collapsed -> flyweight-tree-node-loading");
	assert!(log[1].starts_with(r#"children x <div id="c""#));
	assert!(log[1].contains(">C</div>"));
	assert_eq!(log[2], "class x flyweight-tree-node-loading -> flyweight-tree-node-expanded");
}

#[test]
fn pending_loads_are_not_repeated() {
	let pending = Rc::new(RefCell::new(Vec::new()));
	let loader = {
		let pending = Rc::clone(&pending);
		move |node: &ViewNode, done: LoadCallback| {
			assert_eq!(node.state(), NodeState::Loading);
			pending.borrow_mut().push(done)
		}
	};
	let tree = dynamic(&[json!({ "id": "x" })], Rc::new(loader), None);

	let x = tree.find_by_id("x").unwrap().unwrap();
	x.expand().unwrap();
	x.collapse().unwrap();
	x.expand().unwrap();
	assert_eq!(pending.borrow().len(), 1);
	assert_eq!(x.state(), NodeState::Loading);
	drop(x);

	// The view that started the load is back in the pool by now.
	let done = pending.borrow_mut().remove(0);
	assert_eq!(done.node(), tree.tree().find("x").unwrap());
	done.complete(Some(vec![json!({ "label": "late" })])).unwrap();

	let x = tree.find_by_id("x").unwrap().unwrap();
	assert_eq!(x.state(), NodeState::Expanded);
	assert!(x.has_children());
}

#[test]
fn collapsing_while_loading_still_ends_expanded() {
	let recorder = Rc::new(Recorder::default());
	let pending = Rc::new(RefCell::new(None));
	let loader = {
		let pending = Rc::clone(&pending);
		move |_: &ViewNode, done: LoadCallback| *pending.borrow_mut() = Some(done)
	};
	let tree = dynamic(&[json!({ "id": "x" })], Rc::new(loader), Some(recorder.clone()));
	tree.render().unwrap();

	let x = tree.find_by_id("x").unwrap().unwrap();
	x.expand().unwrap();
	x.collapse().unwrap();
	assert_eq!(x.state(), NodeState::Loading);

	let done = pending.borrow_mut().take().unwrap();
	done.complete(Some(vec![json!({ "id": "c", "label": "C" })])).unwrap();
	assert_eq!(x.state(), NodeState::Expanded);
	assert!(x.is_expanded());
	{
		let log = recorder.0.borrow();
		assert_eq!(log.len(), 3);
		assert_eq!(log[0], "class x flyweight-tree-node-collapsed -> flyweight-tree-node-loading");
		assert!(log[1].starts_with(r#"children x <div id="c""#));
		assert_eq!(log[2], "class x flyweight-tree-node-loading -> flyweight-tree-node-expanded");
	}

	x.toggle().unwrap();
	assert_eq!(x.state(), NodeState::Collapsed);
	assert_eq!(recorder.0.borrow()[3], "class x flyweight-tree-node-expanded -> flyweight-tree-node-collapsed");
}

#[test]
fn loading_no_children_allows_another_load() {
	let recorder = Rc::new(Recorder::default());
	let (loader, calls) = immediate(Some(Vec::new()));
	let tree = dynamic(&[json!({ "id": "x" })], loader, Some(recorder.clone()));
	tree.render().unwrap();

	let x = tree.find_by_id("x").unwrap().unwrap();
	x.expand().unwrap();
	assert_eq!(calls.get(), 1);
	assert_eq!(x.state(), NodeState::UnloadedUnknown);
	assert!(!x.is_expanded());
	assert!(!x.is_leaf());
	assert_eq!(
		*recorder.0.borrow(),
		vec![
			"class x flyweight-tree-node-collapsed -> flyweight-tree-node-loading".to_owned(),
			"class x flyweight-tree-node-loading -> flyweight-tree-node-collapsed".to_owned(),
		]
	);

	x.toggle().unwrap();
	assert_eq!(calls.get(), 2);
	assert_eq!(recorder.0.borrow().len(), 4);
}

#[test]
fn invalid_loaded_children_are_rejected() {
	let result = Rc::new(RefCell::new(None));
	let loader = {
		let result = Rc::clone(&result);
		move |_: &ViewNode, done: LoadCallback| *result.borrow_mut() = Some(done.complete(Some(vec![json!({ "id": "fresh" }), json!({ "id": "taken" })])))
	};
	let tree = dynamic(&[json!({ "id": "x" }), json!({ "id": "taken" })], Rc::new(loader), None);

	let x = tree.find_by_id("x").unwrap().unwrap();
	x.expand().unwrap();
	assert_eq!(result.borrow_mut().take(), Some(Err(Error::DuplicateId("taken".to_owned()))));
	assert!(tree.tree().find("fresh").is_none());
	assert!(!x.has_children());
	assert_eq!(x.state(), NodeState::UnloadedUnknown);
}

#[test]
fn expand_all_never_loads() {
	let (loader, calls) = immediate(Some(vec![json!({ "label": "more" })]));
	let tree = dynamic(
		&[json!({ "id": "p", "expanded": false, "children": [{ "id": "q" }, { "id": "r", "expanded": false, "children": [{ "id": "s" }] }] })],
		loader,
		None,
	);
	tree.expand_all().unwrap();
	assert_eq!(calls.get(), 0);
	assert!(tree.find_by_id("p").unwrap().unwrap().is_expanded());
	assert!(tree.find_by_id("r").unwrap().unwrap().is_expanded());
	assert_eq!(tree.find_by_id("q").unwrap().unwrap().state(), NodeState::UnloadedUnknown);
}

#[test]
fn setting_a_loader_later_collapses_childless_nodes() {
	let tree = TreeManager::new(&[json!({ "id": "x" }), json!({ "id": "leaf", "isLeaf": true })]).unwrap();
	assert_eq!(tree.find_by_id("x").unwrap().unwrap().state(), NodeState::Leaf);
	assert!(tree.find_by_id("x").unwrap().unwrap().is_expanded());

	let (loader, calls) = immediate(Some(vec![json!({ "label": "loaded" })]));
	tree.set_dynamic_loader(Some(loader));
	assert!(tree.has_dynamic_loader());

	let x = tree.find_by_id("x").unwrap().unwrap();
	assert_eq!(x.state(), NodeState::UnloadedUnknown);
	assert!(!x.is_expanded());
	x.toggle().unwrap();
	assert_eq!(calls.get(), 1);
	assert_eq!(x.state(), NodeState::Expanded);
	drop(x);

	assert!(tree.find_by_id("leaf").unwrap().unwrap().is_expanded());
}

#[test]
fn completing_after_the_tree_is_gone_is_harmless() {
	let pending = Rc::new(RefCell::new(None));
	let loader = {
		let pending = Rc::clone(&pending);
		move |_: &ViewNode, done: LoadCallback| *pending.borrow_mut() = Some(done)
	};
	let tree = dynamic(&[json!({ "id": "x" })], Rc::new(loader), None);
	tree.find_by_id("x").unwrap().unwrap().expand().unwrap();
	drop(tree);

	let done = pending.borrow_mut().take().unwrap();
	assert!(done.manager().is_none());
	done.complete(Some(vec![json!({})])).unwrap();
}
