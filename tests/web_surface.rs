#![cfg(target_arch = "wasm32")]

use flyweight_tree::{LoadCallback, Options, TreeManager, ViewNode, WebSurface};
use serde_json::json;
use std::rc::Rc;
use wasm_bindgen::JsCast;
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};
use web_sys::{window, HtmlBodyElement, HtmlElement};

wasm_bindgen_test_configure!(run_in_browser);

static mut LOG_INITIALIZED: bool = false;

fn container(id: &str) -> web_sys::Element {
	unsafe {
		if !LOG_INITIALIZED {
			tracing_wasm::set_as_global_default();
			LOG_INITIALIZED = true;
		}
	}

	let document = window().unwrap().document().unwrap();
	let body = document.body().unwrap().dyn_into::<HtmlBodyElement>().unwrap();
	let container = document.create_element("div").unwrap();
	container.set_id(id);
	body.append_child(&container).unwrap();
	container
}

fn element(id: &str) -> web_sys::Element {
	window().unwrap().document().unwrap().get_element_by_id(id).unwrap()
}

#[wasm_bindgen_test]
fn render_and_toggle() {
	let container = container("render-and-toggle");
	let tree = TreeManager::with_options(
		&[json!({ "id": "rt-a", "label": "A", "expanded": false, "children": [{ "id": "rt-b", "label": "B" }] })],
		Options {
			surface: Some(Rc::new(WebSurface::new(container.clone()))),
			..Options::default()
		},
	)
	.unwrap();
	tree.render().unwrap();

	let a = element("rt-a");
	assert!(a.class_list().contains("flyweight-tree-node-collapsed"));
	assert!(window().unwrap().document().unwrap().get_element_by_id("rt-b").is_none());

	tree.find_by_id("rt-a").unwrap().unwrap().expand().unwrap();
	assert!(a.class_list().contains("flyweight-tree-node-expanded"));
	assert!(!a.class_list().contains("flyweight-tree-node-collapsed"));
	assert_eq!(a.get_attribute("aria-expanded").as_deref(), Some("true"));
	assert_eq!(element("rt-b").text_content().as_deref(), Some("B"));

	container.remove();
}

#[wasm_bindgen_test]
fn dynamic_children_are_patched_in() {
	let container = container("dynamic-children");
	let tree = TreeManager::with_options(
		&[json!({ "id": "dc-a", "label": "A" })],
		Options {
			surface: Some(Rc::new(WebSurface::new(container.clone()))),
			dynamic_loader: Some(Rc::new(|node: &ViewNode, done: LoadCallback| {
				let prefix = node.id();
				done.complete(Some(vec![json!({ "id": format!("{}-child", prefix), "label": "Child" })])).unwrap();
			})),
			..Options::default()
		},
	)
	.unwrap();
	tree.render().unwrap();

	let a = element("dc-a");
	assert!(a.class_list().contains("flyweight-tree-node-collapsed"));
	tree.find_by_id("dc-a").unwrap().unwrap().expand().unwrap();
	assert!(a.class_list().contains("flyweight-tree-node-expanded"));
	assert!(!a.class_list().contains("flyweight-tree-node-loading"));
	assert_eq!(element("dc-a-child").text_content().as_deref(), Some("Child"));

	container.remove();
}

#[wasm_bindgen_test]
fn focus_moves_the_tab_index() {
	let container = container("focus");
	let tree = TreeManager::with_options(
		&[json!({ "id": "f-a", "label": "A" }), json!({ "id": "f-b", "label": "B" })],
		Options {
			surface: Some(Rc::new(WebSurface::new(container.clone()))),
			..Options::default()
		},
	)
	.unwrap();
	tree.render().unwrap();

	let content = |id: &str| element(id).query_selector(".flyweight-tree-node-content").unwrap().unwrap().dyn_into::<HtmlElement>().unwrap();
	assert_eq!(content("f-a").tab_index(), 0);
	assert_eq!(content("f-b").tab_index(), -1);

	tree.find_by_id("f-b").unwrap().unwrap().focus().unwrap();
	assert_eq!(content("f-a").tab_index(), -1);
	assert_eq!(content("f-b").tab_index(), 0);

	container.remove();
}
