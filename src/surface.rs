//! The display surface adapter interface, and a headless in-memory implementation of it.

use crate::{
	error::SurfaceError,
	value::{Attributes, Callback, Value},
};
use core::fmt::{Debug, Write as _};
use tracing::trace;

/// Applies patches to an actual display surface.
///
/// Handles are opaque to the [`Renderer`](`crate::Renderer`), which only clones and compares them.
pub trait Surface {
	type Handle: Clone + PartialEq + Debug;

	/// Creates a detached element.
	///
	/// # Errors
	///
	/// Iff the surface can't create the element.
	fn create_node(&mut self, tag: &str, attributes: &Attributes) -> Result<Self::Handle, SurfaceError>;

	/// Creates a detached text node.
	///
	/// # Errors
	///
	/// Iff the surface can't create the node.
	fn create_text(&mut self, text: &str) -> Result<Self::Handle, SurfaceError>;

	/// Detaches `handle` and discards it along with its descendants.
	///
	/// # Errors
	///
	/// Iff the handle is unknown.
	fn remove_node(&mut self, handle: &Self::Handle) -> Result<(), SurfaceError>;

	/// # Errors
	///
	/// Iff the handle is unknown or not an element.
	fn set_attribute(&mut self, handle: &Self::Handle, name: &str, value: &Value) -> Result<(), SurfaceError>;

	/// # Errors
	///
	/// Iff the handle is unknown or not an element.
	fn remove_attribute(&mut self, handle: &Self::Handle, name: &str) -> Result<(), SurfaceError>;

	/// Moves `handle` to `index` among its siblings, where `index` counts siblings with `handle` itself taken out.
	///
	/// # Errors
	///
	/// Iff the handle is unknown, detached, or `index` is out of range.
	fn move_node(&mut self, handle: &Self::Handle, index: usize) -> Result<(), SurfaceError>;

	/// # Errors
	///
	/// Iff the handle is unknown or not a text node.
	fn set_text(&mut self, handle: &Self::Handle, text: &str) -> Result<(), SurfaceError>;

	/// Inserts `child` at `index` in `parent`'s child list, first detaching it from any previous parent.
	///
	/// # Errors
	///
	/// Iff either handle is unknown or `index` is out of range.
	fn attach(&mut self, parent: &Self::Handle, child: &Self::Handle, index: usize) -> Result<(), SurfaceError>;
}

/// Handle into a [`MemorySurface`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryHandle(usize);

#[derive(Debug)]
enum Content {
	Element { tag: String, attributes: Attributes },
	Text(String),
}

#[derive(Debug)]
struct Slot {
	content: Content,
	parent: Option<usize>,
	children: Vec<usize>,
}

/// An in-memory display surface.
///
/// Useful for headless rendering and for tests: it's strict about indices and handles,
/// and serializes to markup with [`markup`](`MemorySurface::markup`).
#[derive(Debug, Default)]
pub struct MemorySurface {
	slots: Vec<Option<Slot>>,
	live: usize,
	journal: Vec<(&'static str, MemoryHandle)>,
}

impl MemorySurface {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a container element to commit into.
	pub fn create_root(&mut self, tag: &str) -> MemoryHandle {
		self.insert(Content::Element {
			tag: tag.to_owned(),
			attributes: Attributes::new(),
		})
	}

	fn insert(&mut self, content: Content) -> MemoryHandle {
		self.slots.push(Some(Slot {
			content,
			parent: None,
			children: Vec::new(),
		}));
		self.live += 1;
		MemoryHandle(self.slots.len() - 1)
	}

	/// Takes the record of successful [`Surface`] calls so far, as operation name and target handle.
	///
	/// For [`attach`](`Surface::attach`), the target is the child.
	pub fn take_journal(&mut self) -> Vec<(&'static str, MemoryHandle)> {
		std::mem::take(&mut self.journal)
	}

	fn record(&mut self, operation: &'static str, handle: MemoryHandle) {
		self.journal.push((operation, handle));
	}

	fn slot(&self, handle: MemoryHandle) -> Option<&Slot> {
		self.slots.get(handle.0).and_then(Option::as_ref)
	}

	fn slot_mut(&mut self, operation: &'static str, handle: MemoryHandle) -> Result<&mut Slot, SurfaceError> {
		self.slots
			.get_mut(handle.0)
			.and_then(Option::as_mut)
			.ok_or_else(|| SurfaceError::new(operation, format!("unknown handle {:?}", handle)))
	}

	fn detach(&mut self, operation: &'static str, handle: MemoryHandle) -> Result<Option<(usize, usize)>, SurfaceError> {
		let parent = self.slot_mut(operation, handle)?.parent.take();
		Ok(match parent {
			Some(parent) => {
				let siblings = &mut self.slot_mut(operation, MemoryHandle(parent))?.children;
				let index = siblings
					.iter()
					.position(|&sibling| sibling == handle.0)
					.ok_or_else(|| SurfaceError::new(operation, "inconsistent parent link"))?;
				siblings.remove(index);
				Some((parent, index))
			}
			None => None,
		})
	}

	fn place(&mut self, parent: MemoryHandle, child: MemoryHandle, index: usize) -> Result<(), SurfaceError> {
		self.slot_mut("attach", parent)?;
		self.detach("attach", child)?;
		let siblings = &mut self.slot_mut("attach", parent)?.children;
		if index > siblings.len() {
			return Err(SurfaceError::new("attach", format!("index {} out of range for {} child(ren)", index, siblings.len())));
		}
		siblings.insert(index, child.0);
		self.slot_mut("attach", child)?.parent = Some(parent.0);
		Ok(())
	}

	fn free(&mut self, index: usize) {
		if let Some(slot) = self.slots.get_mut(index).and_then(Option::take) {
			self.live -= 1;
			for child in slot.children {
				self.free(child);
			}
		}
	}

	/// The number of nodes that exist, attached or not, including roots.
	#[must_use]
	pub fn live_count(&self) -> usize {
		self.live
	}

	#[must_use]
	pub fn contains(&self, handle: MemoryHandle) -> bool {
		self.slot(handle).is_some()
	}

	#[must_use]
	pub fn parent(&self, handle: MemoryHandle) -> Option<MemoryHandle> {
		self.slot(handle).and_then(|slot| slot.parent).map(MemoryHandle)
	}

	#[must_use]
	pub fn children(&self, handle: MemoryHandle) -> Vec<MemoryHandle> {
		self.slot(handle).map(|slot| slot.children.iter().copied().map(MemoryHandle).collect()).unwrap_or_default()
	}

	#[must_use]
	pub fn tag(&self, handle: MemoryHandle) -> Option<&str> {
		match &self.slot(handle)?.content {
			Content::Element { tag, .. } => Some(tag),
			Content::Text(_) => None,
		}
	}

	#[must_use]
	pub fn text(&self, handle: MemoryHandle) -> Option<&str> {
		match &self.slot(handle)?.content {
			Content::Text(text) => Some(text),
			Content::Element { .. } => None,
		}
	}

	#[must_use]
	pub fn attribute(&self, handle: MemoryHandle, name: &str) -> Option<&Value> {
		match &self.slot(handle)?.content {
			Content::Element { attributes, .. } => attributes.get(name),
			Content::Text(_) => None,
		}
	}

	/// Simulates an `event` on `handle`, returning the [`Callback`] bound as `on{event}`, if any.
	///
	/// Pass the result to [`Renderer::dispatch`](`crate::Renderer::dispatch`).
	#[must_use]
	pub fn fire(&self, handle: MemoryHandle, event: &str) -> Option<Callback> {
		self.attribute(handle, &format!("on{}", event)).and_then(Value::as_callback).cloned()
	}

	/// Serializes the children of `handle`.
	///
	/// Attributes are written in name order. Callback attributes are omitted.
	/// Text and attribute values are escaped.
	#[must_use]
	pub fn markup(&self, handle: MemoryHandle) -> String {
		let mut markup = String::new();
		for child in self.children(handle) {
			self.write_markup(child, &mut markup);
		}
		markup
	}

	fn write_markup(&self, handle: MemoryHandle, markup: &mut String) {
		let slot = match self.slot(handle) {
			Some(slot) => slot,
			None => return,
		};
		match &slot.content {
			Content::Text(text) => escape(text, markup),
			Content::Element { tag, attributes } => {
				markup.push('<');
				markup.push_str(tag);
				for (name, value) in attributes {
					match value {
						Value::Callback(_) | Value::Bool(false) | Value::Null => (),
						Value::Bool(true) => {
							let _ = write!(markup, " {}", name);
						}
						value => {
							let _ = write!(markup, " {}=\"", name);
							escape(&value.to_string(), markup);
							markup.push('"');
						}
					}
				}
				markup.push('>');
				for &child in &slot.children {
					self.write_markup(MemoryHandle(child), markup);
				}
				let _ = write!(markup, "</{}>", tag);
			}
		}
	}
}

fn escape(text: &str, markup: &mut String) {
	for c in text.chars() {
		match c {
			'&' => markup.push_str("&amp;"),
			'<' => markup.push_str("&lt;"),
			'>' => markup.push_str("&gt;"),
			'"' => markup.push_str("&quot;"),
			c => markup.push(c),
		}
	}
}

impl Surface for MemorySurface {
	type Handle = MemoryHandle;

	fn create_node(&mut self, tag: &str, attributes: &Attributes) -> Result<MemoryHandle, SurfaceError> {
		let handle = self.insert(Content::Element {
			tag: tag.to_owned(),
			attributes: attributes.clone(),
		});
		trace!(?handle, tag, "Created element.");
		self.record("create_node", handle);
		Ok(handle)
	}

	fn create_text(&mut self, text: &str) -> Result<MemoryHandle, SurfaceError> {
		let handle = self.insert(Content::Text(text.to_owned()));
		trace!(?handle, "Created text node.");
		self.record("create_text", handle);
		Ok(handle)
	}

	fn remove_node(&mut self, handle: &MemoryHandle) -> Result<(), SurfaceError> {
		self.detach("remove_node", *handle)?;
		self.free(handle.0);
		self.record("remove_node", *handle);
		Ok(())
	}

	fn set_attribute(&mut self, handle: &MemoryHandle, name: &str, value: &Value) -> Result<(), SurfaceError> {
		match &mut self.slot_mut("set_attribute", *handle)?.content {
			Content::Element { attributes, .. } => {
				attributes.insert(name.into(), value.clone());
				self.record("set_attribute", *handle);
				Ok(())
			}
			Content::Text(_) => Err(SurfaceError::new("set_attribute", "not an element")),
		}
	}

	fn remove_attribute(&mut self, handle: &MemoryHandle, name: &str) -> Result<(), SurfaceError> {
		match &mut self.slot_mut("remove_attribute", *handle)?.content {
			Content::Element { attributes, .. } => {
				attributes.remove(name);
				self.record("remove_attribute", *handle);
				Ok(())
			}
			Content::Text(_) => Err(SurfaceError::new("remove_attribute", "not an element")),
		}
	}

	fn move_node(&mut self, handle: &MemoryHandle, index: usize) -> Result<(), SurfaceError> {
		let parent = self.slot_mut("move_node", *handle)?.parent.ok_or_else(|| SurfaceError::new("move_node", "node is detached"))?;
		let sibling_count = self.slot_mut("move_node", MemoryHandle(parent))?.children.len();
		if index >= sibling_count {
			return Err(SurfaceError::new("move_node", format!("index {} out of range for {} sibling(s)", index, sibling_count - 1)));
		}
		self.place(MemoryHandle(parent), *handle, index)?;
		self.record("move_node", *handle);
		Ok(())
	}

	fn set_text(&mut self, handle: &MemoryHandle, text: &str) -> Result<(), SurfaceError> {
		match &mut self.slot_mut("set_text", *handle)?.content {
			Content::Text(current) => {
				*current = text.to_owned();
				self.record("set_text", *handle);
				Ok(())
			}
			Content::Element { .. } => Err(SurfaceError::new("set_text", "not a text node")),
		}
	}

	fn attach(&mut self, parent: &MemoryHandle, child: &MemoryHandle, index: usize) -> Result<(), SurfaceError> {
		self.place(*parent, *child, index)?;
		self.record("attach", *child);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::value::map;

	#[test]
	fn markup_is_escaped() {
		let mut surface = MemorySurface::new();
		let root = surface.create_root("body");
		let q = surface.create_node("q", &map([("title", "say \"<hi>\"")])).unwrap();
		let text = surface.create_text("a < b && c > d").unwrap();
		surface.attach(&root, &q, 0).unwrap();
		surface.attach(&q, &text, 0).unwrap();
		assert_eq!(surface.markup(root), "<q title=\"say &quot;&lt;hi&gt;&quot;\">a &lt; b &amp;&amp; c &gt; d</q>");
	}

	#[test]
	fn attach_move_remove() {
		let mut surface = MemorySurface::new();
		let root = surface.create_root("body");
		let a = surface.create_node("a", &map([("href", "#")])).unwrap();
		let b = surface.create_text("b").unwrap();
		let c = surface.create_node("c", &Attributes::new()).unwrap();
		surface.attach(&root, &a, 0).unwrap();
		surface.attach(&root, &b, 1).unwrap();
		surface.attach(&root, &c, 0).unwrap();
		assert_eq!(surface.markup(root), "<c></c><a href=\"#\"></a>b");

		surface.move_node(&c, 2).unwrap();
		assert_eq!(surface.markup(root), "<a href=\"#\"></a>b<c></c>");
		assert!(surface.move_node(&c, 3).is_err());

		surface.attach(&a, &b, 0).unwrap();
		assert_eq!(surface.markup(root), "<a href=\"#\">b</a><c></c>");

		surface.remove_node(&a).unwrap();
		assert!(!surface.contains(b));
		assert_eq!(surface.live_count(), 2);
		assert_eq!(surface.markup(root), "<c></c>");

		let journal = surface.take_journal();
		assert_eq!(journal.len(), 9);
		assert_eq!(journal[7], ("attach", b));
		assert_eq!(journal.last(), Some(&("remove_node", a)));
		assert!(surface.take_journal().is_empty());
	}

	#[test]
	fn strict_indices() {
		let mut surface = MemorySurface::new();
		let root = surface.create_root("body");
		let a = surface.create_text("a").unwrap();
		assert!(surface.attach(&root, &a, 1).is_err());
		assert!(surface.set_attribute(&a, "id", &"x".into()).is_err());
	}
}
