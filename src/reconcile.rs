//! Tree diffing.
//!
//! The renderer keeps a [`Mounted`] shadow of everything it committed, which is what each new tree is diffed against.
//! Patches are applied to the surface as soon as they are emitted, so positions are always relative to the surface's
//! current child lists. If an operation fails partway, the renderer rolls back what it created instead.

use crate::{
	error::{ConfigurationError, Error},
	lifecycle::{InstanceId, Owner},
	node::{child_key, Child, Key, Kind, TreeNode},
	patch::{NodeId, Patch},
	renderer::Renderer,
	surface::Surface,
	value::Attributes,
};
use hashbrown::HashMap;
use std::rc::Rc;
use tracing::{error, trace, trace_span};

/// The committed counterpart of a [`Child`].
#[derive(Debug)]
pub(crate) enum Mounted {
	Text { node: NodeId, text: Rc<str> },
	Element { node: NodeId, tree: TreeNode, children: Vec<Mounted> },
	/// Fragments own no surface node. Their children are spliced into the parent's child list.
	Fragment { tree: TreeNode, children: Vec<Mounted> },
	/// A component instance. Its surface nodes are those of the instance's rendered tree.
	Component { tree: TreeNode, instance: InstanceId },
}

impl Mounted {
	fn key(&self) -> Option<&Key> {
		match self {
			Mounted::Text { .. } => None,
			Mounted::Element { tree, .. } | Mounted::Fragment { tree, .. } | Mounted::Component { tree, .. } => tree.key(),
		}
	}

	/// Whether `child` can be diffed into this in place.
	fn matches(&self, child: &Child) -> bool {
		match (self, child) {
			(Mounted::Text { .. }, Child::Text(_)) => true,
			(Mounted::Element { tree, .. } | Mounted::Fragment { tree, .. } | Mounted::Component { tree, .. }, Child::Node(next)) => tree.kind() == next.kind(),
			_ => false,
		}
	}
}

/// Where newly created top-level nodes go.
///
/// An immediate cursor attaches each node as soon as it is created.
/// A deferred one only records the nodes, so that a component can attach its own nodes after `did_create`.
/// Nested components still attach their nodes by themselves as they finish mounting, which is tracked in `attached`.
/// That includes components at the top level of another one's render output, which are therefore attached before
/// the outer component's `did_create` runs.
#[derive(Debug)]
pub(crate) struct Cursor {
	pub(crate) parent: NodeId,
	pub(crate) base: usize,
	placed: usize,
	pub(crate) attached: usize,
	pending: Option<Vec<(NodeId, usize)>>,
}

impl Cursor {
	pub(crate) fn immediate(parent: NodeId, base: usize) -> Self {
		Self {
			parent,
			base,
			placed: 0,
			attached: 0,
			pending: None,
		}
	}

	pub(crate) fn deferred(parent: NodeId, base: usize) -> Self {
		Self {
			pending: Some(Vec::new()),
			..Self::immediate(parent, base)
		}
	}

	/// The number of top-level nodes created through this cursor.
	pub(crate) fn placed(&self) -> usize {
		self.placed
	}

	/// Takes the recorded nodes along with their final positions relative to `base`.
	pub(crate) fn take_pending(&mut self) -> Vec<(NodeId, usize)> {
		self.pending.take().unwrap_or_default()
	}

	/// Accounts for `count` nodes a nested component attached by itself.
	pub(crate) fn advance_attached(&mut self, count: usize) {
		self.placed += count;
		self.attached += count;
	}
}

impl<S: Surface> Renderer<S> {
	/// Creates `child` along with its whole subtree, mounting any components in it.
	pub(crate) fn create(&mut self, child: &Child, cursor: &mut Cursor, owner: Owner) -> Result<Mounted, Error> {
		match child {
			Child::Text(text) => {
				let node = self.allocate_node();
				self.emit(Patch::CreateText { node, text: text.clone() })?;
				self.place(cursor, node)?;
				Ok(Mounted::Text { node, text: text.clone() })
			}
			Child::Node(tree) => match tree.kind() {
				Kind::Tag(tag) => {
					let span = trace_span!("Creating element", tag = &**tag);
					let _enter = span.enter();

					let node = self.allocate_node();
					self.emit(Patch::Create {
						node,
						tag: tag.clone(),
						attributes: tree.attributes().clone(),
					})?;
					self.place(cursor, node)?;
					let mut inner = Cursor::immediate(node, 0);
					let mut children = Vec::with_capacity(tree.children().len());
					for child in tree.children() {
						children.push(self.create(child, &mut inner, owner)?);
					}
					Ok(Mounted::Element {
						node,
						tree: tree.clone(),
						children,
					})
				}
				Kind::Fragment => {
					let mut children = Vec::with_capacity(tree.children().len());
					for child in tree.children() {
						children.push(self.create(child, &mut *cursor, owner)?);
					}
					Ok(Mounted::Fragment { tree: tree.clone(), children })
				}
				Kind::Component(name) => self.mount_component(name, tree, cursor, owner),
			},
		}
	}

	fn place(&mut self, cursor: &mut Cursor, node: NodeId) -> Result<(), Error> {
		match &mut cursor.pending {
			Some(pending) => pending.push((node, cursor.placed)),
			None => {
				self.emit(Patch::Attach {
					parent: cursor.parent,
					node,
					index: cursor.base + cursor.placed,
				})?;
				cursor.attached += 1;
			}
		}
		cursor.placed += 1;
		Ok(())
	}

	/// Diffs the children occupying `parent`'s child list from `base` on against `next`.
	///
	/// Keyed children are matched by key, unkeyed ones by their order among the unkeyed siblings.
	/// A match with a different kind is recreated instead.
	pub(crate) fn reconcile_children(&mut self, parent: NodeId, base: usize, previous: Vec<Mounted>, next: &[Child], owner: Owner) -> Result<Vec<Mounted>, Error> {
		let span = trace_span!("Diffing children", ?parent, base, previous = previous.len(), next = next.len());
		let _enter = span.enter();

		// Simulates the affected part of `parent`'s child list.
		let mut live = Vec::new();
		for mounted in &previous {
			self.top_level(mounted, &mut live);
		}

		let mut keyed = HashMap::new();
		let mut unkeyed = Vec::new();
		for (i, mounted) in previous.iter().enumerate() {
			match mounted.key() {
				Some(key) => {
					keyed.insert(key.clone(), i);
				}
				None => unkeyed.push(i),
			}
		}
		let mut unkeyed = unkeyed.into_iter();
		let mut slots: Vec<Option<Mounted>> = previous.into_iter().map(Some).collect();
		let mut matched = Vec::with_capacity(next.len());
		for child in next {
			let candidate = match child_key(child) {
				Some(key) => keyed.get(key).copied(),
				None => unkeyed.next(),
			};
			matched.push(candidate.and_then(|i| {
				if slots[i].as_ref().map_or(false, |mounted| mounted.matches(child)) {
					slots[i].take()
				} else {
					None
				}
			}));
		}

		for unmatched in slots.into_iter().flatten() {
			let mut removed = Vec::new();
			self.top_level(&unmatched, &mut removed);
			live.retain(|node| !removed.contains(node));
			self.remove(unmatched)?;
		}

		let mut placed = 0;
		let mut result = Vec::with_capacity(next.len());
		for (child, previous) in next.iter().zip(matched) {
			let start = placed;
			let (mounted, replaced) = match previous {
				Some(previous) => {
					let mut nodes = Vec::new();
					self.top_level(&previous, &mut nodes);
					for &node in &nodes {
						match live.iter().position(|&live| live == node) {
							Some(position) if position != placed => {
								self.emit(Patch::Move { node, index: base + placed })?;
								live.remove(position);
								live.insert(placed, node);
							}
							Some(_) => (),
							None => error!("{:?} is missing from its simulated sibling list.", node),
						}
						placed += 1;
					}
					(self.diff(previous, child, parent, base + start, owner)?, nodes.len())
				}
				None => (self.create(child, &mut Cursor::immediate(parent, base + start), owner)?, 0),
			};
			let mut current = Vec::new();
			self.top_level(&mounted, &mut current);
			placed = start + current.len();
			let end = (start + replaced).min(live.len());
			live.splice(start..end, current);
			result.push(mounted);
		}
		Ok(result)
	}

	/// Diffs a matched pair whose surface nodes start at `base` within `parent`.
	fn diff(&mut self, previous: Mounted, next: &Child, parent: NodeId, base: usize, owner: Owner) -> Result<Mounted, Error> {
		match (previous, next) {
			(Mounted::Text { node, text }, Child::Text(next_text)) => {
				if text != *next_text {
					self.emit(Patch::SetText { node, text: next_text.clone() })?;
				}
				Ok(Mounted::Text { node, text: next_text.clone() })
			}
			(Mounted::Element { node, tree, children }, Child::Node(next_tree)) => {
				if tree == *next_tree {
					trace!("Element unchanged.");
					return Ok(Mounted::Element { node, tree, children });
				}
				self.diff_attributes(node, tree.attributes(), next_tree.attributes())?;
				let children = self.reconcile_children(node, 0, children, next_tree.children(), owner)?;
				Ok(Mounted::Element {
					node,
					tree: next_tree.clone(),
					children,
				})
			}
			(Mounted::Fragment { children, .. }, Child::Node(next_tree)) => {
				let children = self.reconcile_children(parent, base, children, next_tree.children(), owner)?;
				Ok(Mounted::Fragment {
					tree: next_tree.clone(),
					children,
				})
			}
			(Mounted::Component { instance, .. }, next) if !self.instances.contains_key(&instance) => {
				trace!(?instance, "Instance was discarded after a failed update, mounting anew.");
				self.create(next, &mut Cursor::immediate(parent, base), owner)
			}
			(Mounted::Component { instance, .. }, Child::Node(next_tree)) => {
				self.update_instance(instance, Some(next_tree.clone()), parent, base)?;
				Ok(Mounted::Component {
					tree: next_tree.clone(),
					instance,
				})
			}
			(previous, next) => {
				trace!("Kind changed, recreating.");
				self.remove(previous)?;
				self.create(next, &mut Cursor::immediate(parent, base), owner)
			}
		}
	}

	fn diff_attributes(&mut self, node: NodeId, previous: &Attributes, next: &Attributes) -> Result<(), Error> {
		for (name, value) in next {
			if previous.get(name) != Some(value) {
				self.emit(Patch::SetAttribute {
					node,
					name: name.clone(),
					value: value.clone(),
				})?;
			}
		}
		for name in previous.keys() {
			if !next.contains_key(name) {
				self.emit(Patch::RemoveAttribute { node, name: name.clone() })?;
			}
		}
		Ok(())
	}

	/// Unmounts any instances in `mounted` (top-down), then removes its top-level surface nodes.
	pub(crate) fn remove(&mut self, mounted: Mounted) -> Result<(), Error> {
		let mut top_level = Vec::new();
		self.top_level(&mounted, &mut top_level);
		let mut released = Vec::new();
		self.teardown(mounted, &mut released);
		for node in top_level {
			self.emit(Patch::Remove { node })?;
		}
		for node in released {
			self.handles.remove(&node);
		}
		Ok(())
	}

	/// Collects every surface node in `mounted`, running `will_unmount` for each instance on the way down.
	pub(crate) fn teardown(&mut self, mounted: Mounted, released: &mut Vec<NodeId>) {
		match mounted {
			Mounted::Text { node, .. } => released.push(node),
			Mounted::Element { node, children, .. } => {
				released.push(node);
				for child in children {
					self.teardown(child, released);
				}
			}
			Mounted::Fragment { children, .. } => {
				for child in children {
					self.teardown(child, released);
				}
			}
			Mounted::Component { instance, .. } => self.unmount_instance(instance, released),
		}
	}

	/// Appends the nodes `mounted` places directly into its parent's child list.
	pub(crate) fn top_level(&self, mounted: &Mounted, nodes: &mut Vec<NodeId>) {
		match mounted {
			Mounted::Text { node, .. } | Mounted::Element { node, .. } => nodes.push(*node),
			Mounted::Fragment { children, .. } => {
				for child in children {
					self.top_level(child, nodes);
				}
			}
			Mounted::Component { instance, .. } => {
				if let Some(rendered) = self.instances.get(instance).and_then(|instance| instance.rendered.as_ref()) {
					self.top_level(rendered, nodes);
				}
			}
		}
	}

	/// Finds the parent node and first child index of `id`'s surface nodes.
	pub(crate) fn locate(&self, id: InstanceId) -> Result<(NodeId, usize), Error> {
		let unknown = || Error::from(ConfigurationError::UnknownInstance(id));
		let owner = self.instances.get(&id).ok_or_else(unknown)?.owner;
		let mut offset = 0;
		match owner {
			Owner::Root(root) => {
				let mounted = self
					.roots
					.iter()
					.find(|candidate| candidate.node == root)
					.and_then(|root| root.mounted.as_ref())
					.ok_or_else(unknown)?;
				match self.find(mounted, id, &mut offset) {
					Some((parent, index)) => Ok((parent.unwrap_or(root), index)),
					None => Err(unknown()),
				}
			}
			Owner::Instance(owner) => {
				let rendered = self.instances.get(&owner).and_then(|owner| owner.rendered.as_ref()).ok_or_else(unknown)?;
				match self.find(rendered, id, &mut offset) {
					Some((Some(parent), index)) => Ok((parent, index)),
					Some((None, index)) => {
						let (parent, base) = self.locate(owner)?;
						Ok((parent, base + index))
					}
					None => Err(unknown()),
				}
			}
		}
	}

	/// Looks for the component `target` in `mounted`.
	///
	/// The parent is [`None`] if `target` is on the top level of `mounted`. `offset` counts preceding top-level nodes.
	fn find(&self, mounted: &Mounted, target: InstanceId, offset: &mut usize) -> Option<(Option<NodeId>, usize)> {
		match mounted {
			Mounted::Text { .. } => {
				*offset += 1;
				None
			}
			Mounted::Element { node, children, .. } => {
				let mut inner = 0;
				for child in children {
					if let Some((parent, index)) = self.find(child, target, &mut inner) {
						return Some((parent.or(Some(*node)), index));
					}
				}
				*offset += 1;
				None
			}
			Mounted::Fragment { children, .. } => children.iter().find_map(|child| self.find(child, target, offset)),
			Mounted::Component { instance, .. } if *instance == target => Some((None, *offset)),
			Mounted::Component { .. } => {
				let mut nodes = Vec::new();
				self.top_level(mounted, &mut nodes);
				*offset += nodes.len();
				None
			}
		}
	}
}
