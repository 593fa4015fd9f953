//! View types, their attribute schemas and templates.

use crate::{error::Error, render::TEMPLATE};
use core::iter;
use hashbrown::HashMap;
use serde_json::{Map, Value};

/// Name of the view type every other type ultimately extends, and the default type of a fresh manager.
pub const BASE_TYPE: &str = "flyweight-tree-node";

pub type Validator = fn(&Value) -> bool;

/// Schema entry for one view attribute.
#[derive(Debug, Clone)]
pub struct AttrSpec {
	pub name: String,
	pub default: Option<Value>,
	/// Stored on the view instance itself instead of on the node it is slid over.
	pub bypass_proxy: bool,
	pub read_only: bool,
	pub validator: Option<Validator>,
}
impl AttrSpec {
	#[must_use]
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			default: None,
			bypass_proxy: false,
			read_only: false,
			validator: None,
		}
	}

	#[must_use]
	pub fn default_value(mut self, value: Value) -> Self {
		self.default = Some(value);
		self
	}

	#[must_use]
	pub fn bypass_proxy(mut self) -> Self {
		self.bypass_proxy = true;
		self
	}

	#[must_use]
	pub fn read_only(mut self) -> Self {
		self.read_only = true;
		self
	}

	#[must_use]
	pub fn validator(mut self, validator: Validator) -> Self {
		self.validator = Some(validator);
		self
	}

	#[must_use]
	pub fn accepts(&self, value: &Value) -> bool {
		self.validator.map_or(true, |validator| validator(value))
	}
}

/// A view type: the Rust stand-in for a view subclass.
///
/// Instances only differ by the attribute defaults cached at creation and the template they render with,
/// so a type is plain data resolved through the [`TypeRegistry`].
#[derive(Debug, Clone)]
pub struct ViewClass {
	name: String,
	extends: Option<String>,
	template: Option<String>,
	attributes: Vec<AttrSpec>,
}
impl ViewClass {
	/// A new type extending [`BASE_TYPE`].
	#[must_use]
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			extends: Some(BASE_TYPE.to_owned()),
			template: None,
			attributes: Vec::new(),
		}
	}

	#[must_use]
	pub fn base() -> Self {
		Self {
			name: BASE_TYPE.to_owned(),
			extends: None,
			template: Some(TEMPLATE.to_owned()),
			attributes: vec![
				AttrSpec::new("label").default_value(Value::from("")).validator(Value::is_string),
				AttrSpec::new("template").validator(Value::is_string),
				AttrSpec::new("id").read_only(),
				AttrSpec::new("depth").bypass_proxy().read_only(),
				AttrSpec::new("expanded").bypass_proxy(),
			],
		}
	}

	#[must_use]
	pub fn extends(mut self, parent: impl Into<String>) -> Self {
		self.extends = Some(parent.into());
		self
	}

	#[must_use]
	pub fn template(mut self, template: impl Into<String>) -> Self {
		self.template = Some(template.into());
		self
	}

	#[must_use]
	pub fn attribute(mut self, attribute: AttrSpec) -> Self {
		self.attributes.push(attribute);
		self
	}

	#[must_use]
	pub fn name(&self) -> &str {
		&self.name
	}
}

#[derive(Debug, Clone)]
pub struct TypeRegistry {
	classes: HashMap<String, ViewClass>,
}
impl Default for TypeRegistry {
	fn default() -> Self {
		Self::new()
	}
}
impl TypeRegistry {
	#[must_use]
	pub fn new() -> Self {
		let mut classes = HashMap::new();
		classes.insert(BASE_TYPE.to_owned(), ViewClass::base());
		Self { classes }
	}

	/// Parents must be registered before their subtypes and names can't be reused, which also rules out cycles.
	pub fn register(&mut self, class: ViewClass) -> Result<(), Error> {
		if self.classes.contains_key(&class.name) {
			return Err(Error::DuplicateType(class.name));
		}
		if let Some(parent) = &class.extends {
			if !self.classes.contains_key(parent) {
				return Err(Error::UnknownParentType {
					name: class.name.clone(),
					parent: parent.clone(),
				});
			}
		}
		self.classes.insert(class.name.clone(), class);
		Ok(())
	}

	#[must_use]
	pub fn contains(&self, name: &str) -> bool {
		self.classes.contains_key(name)
	}

	/// `name`'s class followed by progressively more general ones.
	fn chain(&self, name: &str) -> impl Iterator<Item = &ViewClass> + '_ {
		iter::successors(self.classes.get(name), move |class| class.extends.as_deref().and_then(|parent| self.classes.get(parent)))
	}

	/// The most specific schema entry for `attribute`.
	#[must_use]
	pub fn attribute(&self, name: &str, attribute: &str) -> Option<&AttrSpec> {
		self.chain(name).flat_map(|class| class.attributes.iter()).find(|spec| spec.name == attribute)
	}

	/// The static template of `name` or of the closest more general type that has one.
	#[must_use]
	pub fn template(&self, name: &str) -> Option<&str> {
		self.chain(name).find_map(|class| class.template.as_deref())
	}

	/// Every attribute name in `name`'s schema, most specific first, without repetitions.
	#[must_use]
	pub fn attribute_names(&self, name: &str) -> Vec<&str> {
		let mut names: Vec<&str> = Vec::new();
		for spec in self.chain(name).flat_map(|class| class.attributes.iter()) {
			if !names.contains(&spec.name.as_str()) {
				names.push(&spec.name);
			}
		}
		names
	}

	/// Default values for a fresh instance of `name`.
	#[must_use]
	pub fn defaults(&self, name: &str) -> Map<String, Value> {
		let mut defaults = Map::new();
		for spec in self.chain(name).flat_map(|class| class.attributes.iter()) {
			if let Some(default) = &spec.default {
				if !defaults.contains_key(&spec.name) {
					defaults.insert(spec.name.clone(), default.clone());
				}
			}
		}
		defaults
	}
}

/// Resolves the pool tag from a node's `type`.
///
/// `None` means the type is malformed. A missing, `null` or empty type selects `default`.
#[must_use]
pub fn type_tag<'a>(node_type: Option<&'a Value>, default: &'a str) -> Option<&'a str> {
	match node_type {
		None | Some(Value::Null) => Some(default),
		Some(Value::String(name)) if name.is_empty() => Some(default),
		Some(Value::String(name)) => Some(name.as_str()),
		Some(Value::Object(class)) => class.get("NAME").and_then(Value::as_str),
		Some(_) => None,
	}
}
