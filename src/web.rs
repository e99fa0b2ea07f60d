//! A [`Surface`] backed by the browser DOM.

use crate::{
	error::SurfaceError,
	surface::Surface,
	value::{Attributes, Callback, Value},
};
use core::cell::RefCell;
use hashbrown::HashMap;
use js_sys::Function;
use std::{collections::VecDeque, rc::Rc};
use tracing::{error, info, instrument, level_filters::STATIC_MAX_LEVEL, trace, warn, Level};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};

type EventQueue = Rc<RefCell<VecDeque<(Callback, web_sys::Event)>>>;

/// Handle into a [`WebSurface`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WebHandle(usize);

#[derive(Debug)]
struct WebSlot {
	node: web_sys::Node,
	parent: Option<usize>,
	children: Vec<usize>,
	/// Event name to bound callback.
	bindings: HashMap<Rc<str>, Callback>,
}

/// One listener closure per [`Callback`], shared by all of its bindings.
#[derive(Debug, Default)]
struct Listeners(HashMap<Callback, Listener>);

#[derive(Debug)]
struct Listener {
	bindings: usize,
	closure: Closure<dyn Fn(web_sys::Event)>,
}

impl Listeners {
	/// Counts a new binding of `callback` and returns the function to register for it.
	fn bind(&mut self, callback: &Callback, events: &EventQueue) -> &Function {
		let listener = self.0.entry(callback.clone()).or_insert_with(|| {
			let callback = callback.clone();
			let events = Rc::clone(events);
			Listener {
				bindings: 0,
				closure: Closure::wrap(Box::new(move |event: web_sys::Event| events.borrow_mut().push_back((callback.clone(), event))) as Box<dyn Fn(web_sys::Event)>),
			}
		});
		listener.bindings += 1;
		listener.closure.as_ref().unchecked_ref()
	}

	/// Releases one binding of `callback`, returning the function to unregister.
	///
	/// The closure itself stays alive until the next [`collect`](`Listeners::collect`).
	fn unbind(&mut self, callback: &Callback) -> Option<&Function> {
		let listener = self.0.get_mut(callback)?;
		listener.bindings = listener.bindings.saturating_sub(1);
		Some(listener.closure.as_ref().unchecked_ref())
	}

	/// Drops the closures without bindings. Returns how many were dropped.
	fn collect(&mut self) -> usize {
		let before = self.0.len();
		self.0.retain(|_, listener| listener.bindings > 0);
		before - self.0.len()
	}

	fn len(&self) -> usize {
		self.0.len()
	}
}

/// Renders into the child nodes of existing DOM elements.
///
/// Attributes named `on{event}` with a [`Callback`] value become event listeners.
/// Fired events are queued rather than dispatched directly, since the [`Renderer`](`crate::Renderer`)
/// owns this surface: drain them with [`take_events`](`WebSurface::take_events`) and hand each to
/// [`Renderer::dispatch`](`crate::Renderer::dispatch`).
///
/// Listener closures are shared per [`Callback`] and reference-counted.
/// Child nodes of roots that weren't created through this surface are left in place, after the managed ones.
#[derive(Debug)]
pub struct WebSurface {
	document: web_sys::Document,
	slots: Vec<Option<WebSlot>>,
	listeners: Listeners,
	events: EventQueue,
}

impl WebSurface {
	#[must_use]
	pub fn new(document: web_sys::Document) -> Self {
		Self {
			document,
			slots: Vec::new(),
			listeners: Listeners::default(),
			events: EventQueue::default(),
		}
	}

	/// Registers an existing element to commit into.
	#[instrument(skip(self))]
	pub fn root(&mut self, element: web_sys::Element) -> WebHandle {
		self.insert(element.into())
	}

	/// The DOM node behind `handle`, while it exists.
	#[must_use]
	pub fn node(&self, handle: WebHandle) -> Option<&web_sys::Node> {
		self.slot(handle).map(|slot| &slot.node)
	}

	/// Takes the events fired since the last call, in order.
	pub fn take_events(&mut self) -> Vec<(Callback, web_sys::Event)> {
		self.events.borrow_mut().drain(..).collect()
	}

	/// The number of live listener closures. Each [`Callback`] has at most one, however often it is bound.
	#[must_use]
	pub fn listener_count(&self) -> usize {
		self.listeners.len()
	}

	/// Frees listener closures that aren't bound anymore.
	///
	/// Called after each removal. Returns the number freed.
	pub fn collect_listeners(&mut self) -> usize {
		let freed = self.listeners.collect();
		trace!("Freed {} event listener(s).", freed);
		info!("Event listener count: {}", self.listeners.len());
		if STATIC_MAX_LEVEL >= Level::WARN && self.events.borrow().len() >= 100 {
			warn!(
				"{} events are queued.\n\
				This may point to `WebSurface::take_events` not being called.",
				self.events.borrow().len()
			);
		}
		freed
	}

	fn insert(&mut self, node: web_sys::Node) -> WebHandle {
		self.slots.push(Some(WebSlot {
			node,
			parent: None,
			children: Vec::new(),
			bindings: HashMap::new(),
		}));
		WebHandle(self.slots.len() - 1)
	}

	fn slot(&self, handle: WebHandle) -> Option<&WebSlot> {
		self.slots.get(handle.0).and_then(Option::as_ref)
	}

	fn slot_mut(&mut self, operation: &'static str, handle: WebHandle) -> Result<&mut WebSlot, SurfaceError> {
		self.slots
			.get_mut(handle.0)
			.and_then(Option::as_mut)
			.ok_or_else(|| SurfaceError::new(operation, format!("unknown handle {:?}", handle)))
	}

	fn element(&mut self, operation: &'static str, handle: WebHandle) -> Result<web_sys::Element, SurfaceError> {
		self.slot_mut(operation, handle)?
			.node
			.dyn_ref::<web_sys::Element>()
			.cloned()
			.ok_or_else(|| SurfaceError::new(operation, "not an element"))
	}

	fn detach(&mut self, operation: &'static str, handle: WebHandle) -> Result<(), SurfaceError> {
		let slot = self.slot_mut(operation, handle)?;
		let node = slot.node.clone();
		if let Some(parent) = slot.parent.take() {
			let parent = self.slot_mut(operation, WebHandle(parent))?;
			parent.children.retain(|&child| child != handle.0);
			parent.node.remove_child(&node).map_err(|error| js_error(operation, &error))?;
		}
		Ok(())
	}

	fn bind(&mut self, operation: &'static str, handle: WebHandle, event: &str, callback: &Callback) -> Result<(), SurfaceError> {
		self.unbind(operation, handle, event)?;
		let target: web_sys::EventTarget = self.slot_mut(operation, handle)?.node.clone().into();
		let function = self.listeners.bind(callback, &self.events);
		target.add_event_listener_with_callback(event, function).map_err(|error| js_error(operation, &error))?;
		self.slot_mut(operation, handle)?.bindings.insert(event.into(), callback.clone());
		Ok(())
	}

	fn unbind(&mut self, operation: &'static str, handle: WebHandle, event: &str) -> Result<(), SurfaceError> {
		let slot = self.slot_mut(operation, handle)?;
		let callback = match slot.bindings.remove(event) {
			Some(callback) => callback,
			None => return Ok(()),
		};
		let target: web_sys::EventTarget = slot.node.clone().into();
		if let Some(function) = self.listeners.unbind(&callback) {
			if let Err(error) = target.remove_event_listener_with_callback(event, function) {
				error!("Failed to remove event listener {:?}: {:?}", event, error);
			}
		}
		Ok(())
	}

	fn free(&mut self, index: usize) {
		if let Some(slot) = self.slots.get_mut(index).and_then(Option::take) {
			for callback in slot.bindings.values() {
				// The node is discarded along with its listeners.
				self.listeners.unbind(callback);
			}
			for child in slot.children {
				self.free(child);
			}
		}
	}
}

fn js_error(operation: &'static str, error: &JsValue) -> SurfaceError {
	SurfaceError::new(operation, format!("{:?}", error))
}

fn event_name(attribute: &str) -> Option<&str> {
	attribute.strip_prefix("on").filter(|event| !event.is_empty())
}

impl Surface for WebSurface {
	type Handle = WebHandle;

	fn create_node(&mut self, tag: &str, attributes: &Attributes) -> Result<WebHandle, SurfaceError> {
		let element = self.document.create_element(tag).map_err(|error| js_error("create_node", &error))?;
		let handle = self.insert(element.into());
		for (name, value) in attributes {
			self.set_attribute(&handle, name, value)?;
		}
		Ok(handle)
	}

	fn create_text(&mut self, text: &str) -> Result<WebHandle, SurfaceError> {
		let text = self.document.create_text_node(text);
		Ok(self.insert(text.into()))
	}

	fn remove_node(&mut self, handle: &WebHandle) -> Result<(), SurfaceError> {
		self.detach("remove_node", *handle)?;
		self.free(handle.0);
		self.collect_listeners();
		Ok(())
	}

	fn set_attribute(&mut self, handle: &WebHandle, name: &str, value: &Value) -> Result<(), SurfaceError> {
		if let (Some(event), Value::Callback(callback)) = (event_name(name), value) {
			return self.bind("set_attribute", *handle, event, callback);
		}
		if let Some(event) = event_name(name) {
			self.unbind("set_attribute", *handle, event)?;
		}
		let element = self.element("set_attribute", *handle)?;
		match value {
			Value::Null | Value::Bool(false) => element.remove_attribute(name),
			Value::Bool(true) => element.set_attribute(name, ""),
			Value::Callback(_) => {
				warn!("Callback attribute {:?} is not an event binding and was not rendered.", name);
				Ok(())
			}
			value => element.set_attribute(name, &value.to_string()),
		}
		.map_err(|error| js_error("set_attribute", &error))
	}

	fn remove_attribute(&mut self, handle: &WebHandle, name: &str) -> Result<(), SurfaceError> {
		if let Some(event) = event_name(name) {
			self.unbind("remove_attribute", *handle, event)?;
		}
		self.element("remove_attribute", *handle)?
			.remove_attribute(name)
			.map_err(|error| js_error("remove_attribute", &error))
	}

	fn move_node(&mut self, handle: &WebHandle, index: usize) -> Result<(), SurfaceError> {
		let parent = self
			.slot_mut("move_node", *handle)?
			.parent
			.ok_or_else(|| SurfaceError::new("move_node", "node is detached"))?;
		self.attach(&WebHandle(parent), handle, index)
	}

	fn set_text(&mut self, handle: &WebHandle, text: &str) -> Result<(), SurfaceError> {
		self.slot_mut("set_text", *handle)?
			.node
			.dyn_ref::<web_sys::CharacterData>()
			.ok_or_else(|| SurfaceError::new("set_text", "not a text node"))?
			.set_data(text);
		Ok(())
	}

	fn attach(&mut self, parent: &WebHandle, child: &WebHandle, index: usize) -> Result<(), SurfaceError> {
		self.slot_mut("attach", *parent)?;
		self.detach("attach", *child)?;
		let child_node = self.slot_mut("attach", *child)?.node.clone();
		let parent_slot = self.slot_mut("attach", *parent)?;
		if index > parent_slot.children.len() {
			return Err(SurfaceError::new("attach", format!("index {} out of range for {} child(ren)", index, parent_slot.children.len())));
		}
		let next_sibling = parent_slot.children.get(index).copied();
		parent_slot.children.insert(index, child.0);
		let parent_node = parent_slot.node.clone();
		let next_sibling = match next_sibling {
			Some(next_sibling) => Some(self.slot_mut("attach", WebHandle(next_sibling))?.node.clone()),
			None => None,
		};
		parent_node
			.insert_before(&child_node, next_sibling.as_ref())
			.map_err(|error| js_error("attach", &error))?;
		self.slot_mut("attach", *child)?.parent = Some(parent.0);
		Ok(())
	}
}
