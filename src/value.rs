//! Dynamic values carried by attributes, props and component state.

use crate::{lifecycle::InstanceId, node::TreeNode};
use core::fmt::{self, Display, Formatter};
use std::{collections::BTreeMap, rc::Rc};

/// A sorted string-keyed map.
///
/// Sorted iteration keeps attribute diffs (and with them the emitted [`Patch`](`crate::Patch`) order) deterministic.
pub type Map = BTreeMap<Rc<str>, Value>;

/// Attributes of a [`TreeNode`], which double as the props of component instances.
pub type Attributes = Map;

/// Builds a [`Map`] from key-value pairs.
///
/// Later duplicates replace earlier ones.
pub fn map<K: Into<Rc<str>>, V: Into<Value>>(entries: impl IntoIterator<Item = (K, V)>) -> Map {
	entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
	Null,
	Bool(bool),
	Number(f64),
	Str(Rc<str>),
	List(Rc<[Value]>),
	Map(Rc<Map>),
	/// A node list, as carried by an explicit `children` attribute.
	Nodes(Rc<[TreeNode]>),
	Callback(Callback),
}

impl Value {
	#[must_use]
	pub fn is_null(&self) -> bool {
		matches!(self, Self::Null)
	}

	#[must_use]
	pub fn as_bool(&self) -> Option<bool> {
		match *self {
			Self::Bool(b) => Some(b),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_f64(&self) -> Option<f64> {
		match *self {
			Self::Number(n) => Some(n),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::Str(s) => Some(s),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_map(&self) -> Option<&Map> {
		match self {
			Self::Map(m) => Some(m),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_callback(&self) -> Option<&Callback> {
		match self {
			Self::Callback(c) => Some(c),
			_ => None,
		}
	}
}

impl Display for Value {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Value::Null => Ok(()),
			Value::Bool(b) => b.fmt(f),
			Value::Number(n) => format_number(*n).fmt(f),
			Value::Str(s) => s.fmt(f),
			Value::List(items) => {
				for (i, item) in items.iter().enumerate() {
					if i > 0 {
						f.write_str(",")?;
					}
					item.fmt(f)?;
				}
				Ok(())
			}
			Value::Map(_) => f.write_str("[object]"),
			Value::Nodes(nodes) => write!(f, "[{} node(s)]", nodes.len()),
			Value::Callback(callback) => write!(f, "[callback {}]", callback.action),
		}
	}
}

/// Formats integral numbers without a fractional part, so that `1.0` reads as `1`.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn format_number(n: f64) -> String {
	if n.fract() == 0.0 && n.is_finite() && n.abs() < 9_007_199_254_740_992.0 {
		format!("{}", n as i64)
	} else {
		format!("{}", n)
	}
}

/// A reference to an action of a specific component instance.
///
/// Surfaces hand these back to [`Renderer::dispatch`](`crate::Renderer::dispatch`) when the bound event fires,
/// which routes the action to the owning instance only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Callback {
	instance: InstanceId,
	action: Rc<str>,
}

impl Callback {
	pub(crate) fn new(instance: InstanceId, action: Rc<str>) -> Self {
		Self { instance, action }
	}

	#[must_use]
	pub fn instance(&self) -> InstanceId {
		self.instance
	}

	#[must_use]
	pub fn action(&self) -> &str {
		&self.action
	}
}

impl From<bool> for Value {
	fn from(b: bool) -> Self {
		Self::Bool(b)
	}
}

impl From<f64> for Value {
	fn from(n: f64) -> Self {
		Self::Number(n)
	}
}

impl From<i32> for Value {
	fn from(n: i32) -> Self {
		Self::Number(n.into())
	}
}

impl From<u32> for Value {
	fn from(n: u32) -> Self {
		Self::Number(n.into())
	}
}

impl From<i64> for Value {
	#[allow(clippy::cast_precision_loss)]
	fn from(n: i64) -> Self {
		Self::Number(n as f64)
	}
}

impl From<usize> for Value {
	#[allow(clippy::cast_precision_loss)]
	fn from(n: usize) -> Self {
		Self::Number(n as f64)
	}
}

impl From<&str> for Value {
	fn from(s: &str) -> Self {
		Self::Str(s.into())
	}
}

impl From<String> for Value {
	fn from(s: String) -> Self {
		Self::Str(s.into())
	}
}

impl From<Rc<str>> for Value {
	fn from(s: Rc<str>) -> Self {
		Self::Str(s)
	}
}

impl From<Map> for Value {
	fn from(m: Map) -> Self {
		Self::Map(Rc::new(m))
	}
}

impl From<Vec<Value>> for Value {
	fn from(items: Vec<Value>) -> Self {
		Self::List(items.into())
	}
}

impl From<Vec<TreeNode>> for Value {
	fn from(nodes: Vec<TreeNode>) -> Self {
		Self::Nodes(nodes.into())
	}
}

impl From<Callback> for Value {
	fn from(callback: Callback) -> Self {
		Self::Callback(callback)
	}
}

impl<T: Into<Value>> From<Option<T>> for Value {
	fn from(value: Option<T>) -> Self {
		value.map_or(Self::Null, Into::into)
	}
}
