use crate::value::{Attributes, Value};
use core::fmt::{self, Debug, Formatter};
use std::rc::Rc;

/// Identifies a surface node across patches.
///
/// Ids are allocated by the [`Renderer`](`crate::Renderer`) in creation order and are never reused,
/// so a reused surface node keeps its id across diffs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
	#[must_use]
	pub fn get(self) -> u32 {
		self.0
	}
}

/// One surface mutation.
///
/// Patches are emitted (and applied) in order. Later patches may rely on earlier ones,
/// for example an [`Attach`](`Patch::Attach`) always follows the [`Create`](`Patch::Create`) of its node.
#[derive(Clone, PartialEq)]
pub enum Patch {
	/// Creates a detached element with its initial attributes.
	Create { node: NodeId, tag: Rc<str>, attributes: Attributes },
	/// Creates a detached text node.
	CreateText { node: NodeId, text: Rc<str> },
	/// Detaches and discards a node along with its subtree.
	Remove { node: NodeId },
	/// Reorders a node among its current siblings.
	Move { node: NodeId, index: usize },
	SetAttribute { node: NodeId, name: Rc<str>, value: Value },
	RemoveAttribute { node: NodeId, name: Rc<str> },
	SetText { node: NodeId, text: Rc<str> },
	/// Inserts `node` into `parent`'s child list at `index`.
	///
	/// A node that is already attached elsewhere is reparented.
	Attach { parent: NodeId, node: NodeId, index: usize },
}

impl Patch {
	/// The node this patch mutates.
	#[must_use]
	pub fn node(&self) -> NodeId {
		match *self {
			Patch::Create { node, .. }
			| Patch::CreateText { node, .. }
			| Patch::Remove { node }
			| Patch::Move { node, .. }
			| Patch::SetAttribute { node, .. }
			| Patch::RemoveAttribute { node, .. }
			| Patch::SetText { node, .. }
			| Patch::Attach { node, .. } => node,
		}
	}

	#[must_use]
	pub fn operation(&self) -> &'static str {
		match self {
			Patch::Create { .. } => "create",
			Patch::CreateText { .. } => "create_text",
			Patch::Remove { .. } => "remove",
			Patch::Move { .. } => "move",
			Patch::SetAttribute { .. } => "set_attribute",
			Patch::RemoveAttribute { .. } => "remove_attribute",
			Patch::SetText { .. } => "set_text",
			Patch::Attach { .. } => "attach",
		}
	}
}

impl Debug for Patch {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let dangerous = cfg!(feature = "dangerous-logging");
		match self {
			Patch::Create { node, tag, attributes } => {
				let mut debug = f.debug_struct("Create");
				debug.field("node", node).field("tag", tag);
				if dangerous {
					debug.field("attributes", attributes);
				} else {
					debug.field("attributes", &attributes.keys().collect::<Vec<_>>());
				}
				debug.finish()
			}
			Patch::CreateText { node, text } => {
				let mut debug = f.debug_struct("CreateText");
				debug.field("node", node);
				if dangerous {
					debug.field("text", text);
				}
				debug.finish()
			}
			Patch::Remove { node } => f.debug_struct("Remove").field("node", node).finish(),
			Patch::Move { node, index } => f.debug_struct("Move").field("node", node).field("index", index).finish(),
			Patch::SetAttribute { node, name, value } => {
				let mut debug = f.debug_struct("SetAttribute");
				debug.field("node", node).field("name", name);
				if dangerous {
					debug.field("value", value);
				}
				debug.finish()
			}
			Patch::RemoveAttribute { node, name } => f.debug_struct("RemoveAttribute").field("node", node).field("name", name).finish(),
			Patch::SetText { node, text } => {
				let mut debug = f.debug_struct("SetText");
				debug.field("node", node);
				if dangerous {
					debug.field("text", text);
				}
				debug.finish()
			}
			Patch::Attach { parent, node, index } => f.debug_struct("Attach").field("parent", parent).field("node", node).field("index", index).finish(),
		}
	}
}
