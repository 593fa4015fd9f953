//! Markup generation collaborator and the class names it is fed with.

use hashbrown::HashMap;

pub const CNAME_NODE: &str = "flyweight-tree-node";
pub const CNAME_CONTENT: &str = "flyweight-tree-node-content";
pub const CNAME_CHILDREN: &str = "flyweight-tree-node-children";
pub const CNAME_COLLAPSED: &str = "flyweight-tree-node-collapsed";
pub const CNAME_EXPANDED: &str = "flyweight-tree-node-expanded";
pub const CNAME_NOCHILDREN: &str = "flyweight-tree-node-no-children";
pub const CNAME_FIRSTCHILD: &str = "flyweight-tree-node-first-child";
pub const CNAME_LASTCHILD: &str = "flyweight-tree-node-last-child";
pub const CNAME_LOADING: &str = "flyweight-tree-node-loading";

/// Template of the base view type.
///
/// Any replacement must keep three elements: the outer one with class `{cname_node}` and `id="{id}"`,
/// one with class `{cname_content}` and `tabIndex="{tabIndex}"` that receives focus,
/// and one with class `{cname_children}` wrapping `{children}`, in that order.
pub const TEMPLATE: &str = concat!(
	r#"<div id="{id}" class="{cname_node}" role="treeitem" aria-expanded="{expanded}">"#,
	r#"<div tabIndex="{tabIndex}" class="{cname_content}">{label}</div>"#,
	r#"<div class="{cname_children}" role="group">{children}</div>"#,
	"</div>",
);

/// Placeholder values for one node.
pub type Attributes = HashMap<String, String>;

/// Turns a resolved template and a node's attributes into markup.
pub trait Renderer {
	fn render(&self, template: &str, attributes: &Attributes) -> String;
}

impl<F: Fn(&str, &Attributes) -> String> Renderer for F {
	fn render(&self, template: &str, attributes: &Attributes) -> String {
		self(template, attributes)
	}
}

/// Replaces `{name}` placeholders with the matching attribute.
///
/// Unknown placeholders are left in place. Values are inserted verbatim: labels may contain markup.
#[derive(Debug, Clone, Copy, Default)]
pub struct Substitute;
impl Renderer for Substitute {
	fn render(&self, template: &str, attributes: &Attributes) -> String {
		let mut markup = String::with_capacity(template.len() * 2);
		let mut rest = template;
		while let Some(open) = rest.find('{') {
			markup.push_str(&rest[..open]);
			let after = &rest[open + 1..];
			match after.find(&['{', '}'][..]) {
				Some(close) if after[close..].starts_with('}') => {
					match attributes.get(after[..close].trim()) {
						Some(value) => markup.push_str(value),
						None => markup.push_str(&rest[open..=open + close + 1]),
					}
					rest = &after[close + 1..];
				}
				_ => {
					markup.push('{');
					rest = after;
				}
			}
		}
		markup.push_str(rest);
		markup
	}
}
