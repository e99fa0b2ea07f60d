//! The immutable tree description produced by `render` calls.

use crate::{
	error::ConfigurationError,
	value::{format_number, Attributes, Value},
};
use core::fmt::{self, Debug, Formatter};
use hashbrown::HashSet;
use std::rc::Rc;
use tracing::{trace, warn};

/// What a [`TreeNode`] describes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Kind {
	/// A native display surface element type, like `"div"`.
	Tag(Rc<str>),
	/// A component, by its [`Registry`](`crate::Registry`) name.
	Component(Rc<str>),
	/// A sibling group without a surface node of its own.
	Fragment,
}

impl Kind {
	#[must_use]
	pub fn tag(name: impl Into<Rc<str>>) -> Self {
		Self::Tag(name.into())
	}

	#[must_use]
	pub fn component(name: impl Into<Rc<str>>) -> Self {
		Self::Component(name.into())
	}
}

/// A stable per-sibling identifier, used only to match children across renders.
///
/// Numbers and booleans are converted to their textual form, so `1` and `"1"` are the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Rc<str>);

impl Key {
	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}

	fn from_value(value: &Value) -> Option<Self> {
		match value {
			Value::Null => None,
			Value::Str(s) => Some(Self(s.clone())),
			Value::Number(n) => Some(Self(format_number(*n).into())),
			Value::Bool(b) => Some(Self(b.to_string().into())),
			other => {
				warn!("Ignoring non-scalar `key` attribute ({}).", value_kind(other));
				None
			}
		}
	}
}

impl From<&str> for Key {
	fn from(key: &str) -> Self {
		Self(key.into())
	}
}

impl From<String> for Key {
	fn from(key: String) -> Self {
		Self(key.into())
	}
}

/// An entry of a [`TreeNode`]'s child list.
#[derive(Debug, Clone, PartialEq)]
pub enum Child {
	Node(TreeNode),
	Text(Rc<str>),
}

impl From<TreeNode> for Child {
	fn from(node: TreeNode) -> Self {
		Self::Node(node)
	}
}

impl From<&str> for Child {
	fn from(text: &str) -> Self {
		Self::Text(text.into())
	}
}

impl From<String> for Child {
	fn from(text: String) -> Self {
		Self::Text(text.into())
	}
}

impl From<Rc<str>> for Child {
	fn from(text: Rc<str>) -> Self {
		Self::Text(text)
	}
}

/// Shorthand for a text leaf.
#[must_use]
pub fn text(text: impl Into<Rc<str>>) -> Child {
	Child::Text(text.into())
}

/// An immutable description of one rendered unit.
///
/// Cloning is cheap and shares the description.
#[derive(Clone)]
pub struct TreeNode(Rc<Inner>);

#[derive(PartialEq)]
struct Inner {
	kind: Kind,
	attributes: Attributes,
	key: Option<Key>,
	children: Box<[Child]>,
}

impl PartialEq for TreeNode {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0) || self.0 == other.0
	}
}

impl Debug for TreeNode {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let mut debug = f.debug_struct("TreeNode");
		debug.field("kind", &self.0.kind);
		if let Some(key) = &self.0.key {
			debug.field("key", key);
		}
		if cfg!(feature = "dangerous-logging") {
			debug.field("attributes", &self.0.attributes);
		} else {
			debug.field("attributes", &self.0.attributes.keys().collect::<Vec<_>>());
		}
		debug.field("children", &self.0.children).finish()
	}
}

/// Constructs a [`TreeNode`].
///
/// This is the lowering target for markup compilation.
///
/// - A `key` entry is moved out of `attributes` and becomes the node's [`Key`].
/// - A `children` entry is always removed from `attributes`.
///   If `children` yields any items, those win and the entry is ignored.
///   Otherwise an entry holding [`Value::Nodes`] (or a string, as a single text leaf) becomes the child list.
/// - [`Kind::Fragment`] nodes keep only their key.
pub fn construct<C: Into<Child>>(kind: Kind, attributes: Option<Attributes>, children: impl IntoIterator<Item = C>) -> TreeNode {
	let mut attributes = attributes.unwrap_or_default();
	let key = attributes.remove("key").and_then(|key| Key::from_value(&key));
	let explicit_children = attributes.remove("children");

	let mut children: Vec<Child> = children.into_iter().map(Into::into).collect();
	if let Some(explicit_children) = explicit_children {
		if !children.is_empty() {
			trace!("Ignoring explicit `children` attribute in favour of {} child argument(s).", children.len());
		} else {
			match explicit_children {
				Value::Nodes(nodes) => children.extend(nodes.iter().cloned().map(Child::Node)),
				Value::Str(text) => children.push(Child::Text(text)),
				Value::Null => (),
				other => warn!("Ignoring explicit `children` attribute ({}).", value_kind(&other)),
			}
		}
	}

	if kind == Kind::Fragment && !attributes.is_empty() {
		warn!("Discarding {} attribute(s) on fragment.", attributes.len());
		attributes.clear();
	}

	TreeNode(Rc::new(Inner {
		kind,
		attributes,
		key,
		children: children.into_boxed_slice(),
	}))
}

/// Shorthand for a [`Kind::Fragment`] without key.
pub fn fragment<C: Into<Child>>(children: impl IntoIterator<Item = C>) -> TreeNode {
	construct(Kind::Fragment, None, children)
}

/// Starts building a [`Kind::Tag`] node.
#[must_use]
pub fn tag(name: impl Into<Rc<str>>) -> Builder {
	Builder::new(Kind::tag(name))
}

/// Starts building a [`Kind::Component`] node.
#[must_use]
pub fn component(name: impl Into<Rc<str>>) -> Builder {
	Builder::new(Kind::component(name))
}

/// Incremental front end for [`construct`].
#[derive(Debug, Clone)]
#[must_use]
pub struct Builder {
	kind: Kind,
	attributes: Attributes,
	children: Vec<Child>,
}

impl Builder {
	pub fn new(kind: Kind) -> Self {
		Self {
			kind,
			attributes: Attributes::new(),
			children: Vec::new(),
		}
	}

	pub fn attr(mut self, name: impl Into<Rc<str>>, value: impl Into<Value>) -> Self {
		self.attributes.insert(name.into(), value.into());
		self
	}

	pub fn attrs(mut self, attributes: Attributes) -> Self {
		self.attributes.extend(attributes);
		self
	}

	pub fn key(self, key: impl Into<Value>) -> Self {
		self.attr("key", key)
	}

	pub fn child(mut self, child: impl Into<Child>) -> Self {
		self.children.push(child.into());
		self
	}

	pub fn children<C: Into<Child>>(mut self, children: impl IntoIterator<Item = C>) -> Self {
		self.children.extend(children.into_iter().map(Into::into));
		self
	}

	pub fn text(self, text: impl Into<Rc<str>>) -> Self {
		self.child(Child::Text(text.into()))
	}

	#[must_use]
	pub fn build(self) -> TreeNode {
		construct(self.kind, Some(self.attributes), self.children)
	}
}

impl From<Builder> for TreeNode {
	fn from(builder: Builder) -> Self {
		builder.build()
	}
}

impl From<Builder> for Child {
	fn from(builder: Builder) -> Self {
		Self::Node(builder.build())
	}
}

impl TreeNode {
	#[must_use]
	pub fn kind(&self) -> &Kind {
		&self.0.kind
	}

	#[must_use]
	pub fn attributes(&self) -> &Attributes {
		&self.0.attributes
	}

	#[must_use]
	pub fn key(&self) -> Option<&Key> {
		self.0.key.as_ref()
	}

	#[must_use]
	pub fn children(&self) -> &[Child] {
		&self.0.children
	}

	/// Checks that keys are unique among each child list.
	///
	/// Component children are checked too, since they may be rendered as a child list later.
	///
	/// # Errors
	///
	/// Iff a duplicate key is found.
	pub fn validate(&self) -> Result<(), ConfigurationError> {
		validate_children(self.children())?;
		for child in self.children() {
			if let Child::Node(node) = child {
				node.validate()?;
			}
		}
		Ok(())
	}
}

pub(crate) fn validate_children(children: &[Child]) -> Result<(), ConfigurationError> {
	let mut seen = HashSet::new();
	for child in children {
		if let Child::Node(node) = child {
			if let Some(key) = node.key() {
				if !seen.insert(key) {
					return Err(ConfigurationError::DuplicateKey { key: key.clone() });
				}
			}
		}
	}
	Ok(())
}

pub(crate) fn child_key(child: &Child) -> Option<&Key> {
	match child {
		Child::Node(node) => node.key(),
		Child::Text(_) => None,
	}
}

fn value_kind(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "boolean",
		Value::Number(_) => "number",
		Value::Str(_) => "string",
		Value::List(_) => "list",
		Value::Map(_) => "map",
		Value::Nodes(_) => "nodes",
		Value::Callback(_) => "callback",
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::value::map;

	#[test]
	fn key_is_extracted() {
		let node = construct(Kind::tag("li"), Some(map([("key", Value::from(3)), ("class", "item".into())])), Vec::<Child>::new());
		assert_eq!(node.key(), Some(&Key::from("3")));
		assert!(node.attributes().get("key").is_none());
		assert_eq!(node.attributes().get("class"), Some(&Value::from("item")));
	}

	#[test]
	fn variadic_children_override_explicit() {
		let explicit = vec![tag("b").build()];
		let node = construct(Kind::tag("p"), Some(map([("children", Value::from(explicit))])), [text("variadic")]);
		assert_eq!(node.children(), &[text("variadic")]);
		assert!(node.attributes().is_empty());
	}

	#[test]
	fn explicit_children_without_variadic() {
		let explicit = vec![tag("b").build(), tag("i").build()];
		let node = construct(Kind::tag("p"), Some(map([("children", Value::from(explicit.clone()))])), Vec::<Child>::new());
		assert_eq!(node.children(), &explicit.into_iter().map(Child::Node).collect::<Vec<_>>()[..]);
		assert!(node.attributes().get("children").is_none());
	}

	#[test]
	fn fragment_keeps_only_key() {
		let node = construct(Kind::Fragment, Some(map([("key", Value::from("k")), ("id", "x".into())])), [text("a")]);
		assert_eq!(node.key(), Some(&Key::from("k")));
		assert!(node.attributes().is_empty());
	}

	#[test]
	fn duplicate_keys_are_rejected() {
		let node = tag("ul").child(tag("li").key("a")).child(tag("li").key("a")).build();
		assert!(matches!(node.validate(), Err(ConfigurationError::DuplicateKey { .. })));

		let nested = tag("div").child(fragment([tag("li").key(1), tag("li").key("1")])).build();
		assert!(nested.validate().is_err());
	}
}
