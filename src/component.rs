//! The capability interface component authors implement against.
//!
//! A [`Class`] bundles a `render` function with any subset of the optional lifecycle hooks.
//! Which hooks run is decided by which ones a class defines.

use crate::{
	error::{Error, HookError, MergeGuardError},
	lifecycle::{Hook, InstanceId, Phase},
	node::{Child, TreeNode},
	state::{State, StateContainer},
	value::{Attributes, Callback, Value},
};
use core::{
	fmt::{self, Debug, Formatter},
	future::Future,
};
use futures::future::{FutureExt, LocalBoxFuture};
use hashbrown::HashMap;
use std::rc::Rc;
use tracing::warn;

/// The asynchronous remainder of a hook, if any.
///
/// The renderer never waits for it. Its eventual failure is logged unless the instance was unmounted in the meantime.
#[must_use]
pub struct Deferred(pub(crate) Option<LocalBoxFuture<'static, Result<(), HookError>>>);

impl Deferred {
	pub fn none() -> Self {
		Self(None)
	}

	pub fn new(future: impl Future<Output = Result<(), HookError>> + 'static) -> Self {
		Self(Some(future.boxed_local()))
	}
}

impl From<()> for Deferred {
	fn from((): ()) -> Self {
		Self::none()
	}
}

impl Debug for Deferred {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Deferred").field(&self.0.is_some()).finish()
	}
}

type ConstructFn = dyn Fn(&mut ConstructContext<'_>) -> Result<(), Error>;
type RenderFn = dyn Fn(&RenderContext<'_>) -> TreeNode;
type HookFn = dyn Fn(&mut HookContext<'_>) -> Result<(), HookError>;
type DeferredHookFn = dyn Fn(&mut HookContext<'_>) -> Result<Deferred, HookError>;
type GuardFn = dyn Fn(&UpdateContext<'_>) -> bool;
type WillUpdateFn = dyn Fn(&mut HookContext<'_>, &Attributes, &State) -> Result<(), HookError>;
type DidUpdateFn = dyn Fn(&mut HookContext<'_>, &Attributes, &State) -> Result<Deferred, HookError>;
type ActionFn = dyn Fn(&mut HookContext<'_>, &str, &Value) -> Result<(), HookError>;

/// A component variant.
///
/// ```
/// use cambium::{tag, Class, HookError};
///
/// let class = Class::new("Greeting")
/// 	.render(|cx| tag("p").text(format!("Hello, {}!", cx.prop("name").and_then(|name| name.as_str()).unwrap_or("world"))).build())
/// 	.will_unmount(|_| Err(HookError::new("logged, but not fatal")));
/// assert!(class.defines(cambium::Hook::Render));
/// assert!(!class.defines(cambium::Hook::DidMount));
/// ```
#[derive(Clone)]
#[must_use]
pub struct Class {
	name: Rc<str>,
	pub(crate) constructor: Option<Rc<ConstructFn>>,
	pub(crate) render: Option<Rc<RenderFn>>,
	pub(crate) will_mount: Option<Rc<HookFn>>,
	pub(crate) did_create: Option<Rc<HookFn>>,
	pub(crate) did_mount: Option<Rc<DeferredHookFn>>,
	pub(crate) should_update: Option<Rc<GuardFn>>,
	pub(crate) will_update: Option<Rc<WillUpdateFn>>,
	pub(crate) did_update: Option<Rc<DidUpdateFn>>,
	pub(crate) will_unmount: Option<Rc<HookFn>>,
	pub(crate) on_action: Option<Rc<ActionFn>>,
}

impl Debug for Class {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Class")
			.field("name", &self.name)
			.field("hooks", &Hook::ALL.iter().filter(|hook| self.defines(**hook)).collect::<Vec<_>>())
			.finish()
	}
}

impl Class {
	pub fn new(name: impl Into<Rc<str>>) -> Self {
		Self {
			name: name.into(),
			constructor: None,
			render: None,
			will_mount: None,
			did_create: None,
			did_mount: None,
			should_update: None,
			will_update: None,
			did_update: None,
			will_unmount: None,
			on_action: None,
		}
	}

	#[must_use]
	pub fn name(&self) -> &Rc<str> {
		&self.name
	}

	/// Whether this class provides `hook`.
	#[must_use]
	pub fn defines(&self, hook: Hook) -> bool {
		match hook {
			Hook::Constructor => self.constructor.is_some(),
			Hook::Render => self.render.is_some(),
			Hook::WillMount => self.will_mount.is_some(),
			Hook::DidCreate => self.did_create.is_some(),
			Hook::DidMount => self.did_mount.is_some(),
			Hook::ShouldUpdate => self.should_update.is_some(),
			Hook::WillUpdate => self.will_update.is_some(),
			Hook::DidUpdate => self.did_update.is_some(),
			Hook::WillUnmount => self.will_unmount.is_some(),
			Hook::OnAction => self.on_action.is_some(),
		}
	}

	/// Runs once per instance, before mounting. Sets the initial state through [`ConstructContext::initial_state`].
	///
	/// An error aborts the mount and is reported to the caller.
	pub fn constructor(mut self, constructor: impl Fn(&mut ConstructContext<'_>) -> Result<(), Error> + 'static) -> Self {
		self.constructor = Some(Rc::new(constructor));
		self
	}

	/// Shorthand for a [`constructor`](`Class::constructor`) that only derives the initial state from the props.
	pub fn initial_state(self, initial_state: impl Fn(&Attributes) -> State + 'static) -> Self {
		self.constructor(move |cx| {
			let state = initial_state(cx.props());
			cx.initial_state(state);
			Ok(())
		})
	}

	pub fn render(mut self, render: impl Fn(&RenderContext<'_>) -> TreeNode + 'static) -> Self {
		self.render = Some(Rc::new(render));
		self
	}

	/// Pre-render hook. State merges made here are visible to the first render.
	pub fn will_mount(mut self, hook: impl Fn(&mut HookContext<'_>) -> Result<(), HookError> + 'static) -> Self {
		self.will_mount = Some(Rc::new(hook));
		self
	}

	/// Runs after the instance's surface nodes were created, before they are attached.
	/// State merges made here are rendered by an update pass right after mounting.
	pub fn did_create(mut self, hook: impl Fn(&mut HookContext<'_>) -> Result<(), HookError> + 'static) -> Self {
		self.did_create = Some(Rc::new(hook));
		self
	}

	/// Runs after attachment. May hand back a [`Deferred`] remainder.
	pub fn did_mount(mut self, hook: impl Fn(&mut HookContext<'_>) -> Result<Deferred, HookError> + 'static) -> Self {
		self.did_mount = Some(Rc::new(hook));
		self
	}

	/// Update guard. Returning `false` skips the update entirely.
	pub fn should_update(mut self, guard: impl Fn(&UpdateContext<'_>) -> bool + 'static) -> Self {
		self.should_update = Some(Rc::new(guard));
		self
	}

	/// Pre-update hook, called with the next props and state.
	pub fn will_update(mut self, hook: impl Fn(&mut HookContext<'_>, &Attributes, &State) -> Result<(), HookError> + 'static) -> Self {
		self.will_update = Some(Rc::new(hook));
		self
	}

	/// Post-update hook, called with the previous props and state.
	pub fn did_update(mut self, hook: impl Fn(&mut HookContext<'_>, &Attributes, &State) -> Result<Deferred, HookError> + 'static) -> Self {
		self.did_update = Some(Rc::new(hook));
		self
	}

	/// Pre-removal cleanup.
	pub fn will_unmount(mut self, hook: impl Fn(&mut HookContext<'_>) -> Result<(), HookError> + 'static) -> Self {
		self.will_unmount = Some(Rc::new(hook));
		self
	}

	/// Receives actions dispatched through [`Callback`]s this instance handed out.
	pub fn on_action(mut self, handler: impl Fn(&mut HookContext<'_>, &str, &Value) -> Result<(), HookError> + 'static) -> Self {
		self.on_action = Some(Rc::new(handler));
		self
	}
}

/// Maps component names to their [`Class`].
///
/// Constructed explicitly and handed to the [`Renderer`](`crate::Renderer`), never looked up globally.
#[derive(Debug, Default, Clone)]
pub struct Registry {
	classes: HashMap<Rc<str>, Rc<Class>>,
}

impl Registry {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `class` under its name, returning the class it replaced.
	pub fn register(&mut self, class: Class) -> Option<Rc<Class>> {
		let replaced = self.classes.insert(class.name().clone(), Rc::new(class));
		if let Some(replaced) = &replaced {
			warn!("Replaced registered component `{}`.", replaced.name());
		}
		replaced
	}

	/// Builder-style [`register`](`Registry::register`).
	#[must_use]
	pub fn with(mut self, class: Class) -> Self {
		self.register(class);
		self
	}

	#[must_use]
	pub fn get(&self, name: &str) -> Option<&Rc<Class>> {
		self.classes.get(name)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.classes.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.classes.is_empty()
	}
}

/// Handed to a [`Class::constructor`].
#[derive(Debug)]
pub struct ConstructContext<'a> {
	pub(crate) instance: InstanceId,
	pub(crate) props: &'a Attributes,
	pub(crate) state: &'a mut StateContainer,
}

impl ConstructContext<'_> {
	#[must_use]
	pub fn instance(&self) -> InstanceId {
		self.instance
	}

	#[must_use]
	pub fn props(&self) -> &Attributes {
		self.props
	}

	/// Sets the initial state. Only the first call per instance has an effect.
	pub fn initial_state(&mut self, state: State) {
		if !self.state.initialize(state) {
			warn!("Ignoring repeated initial state for {:?}.", self.instance);
		}
	}

	/// Always rejected: the instance hasn't left construction yet.
	///
	/// # Errors
	///
	/// Always.
	pub fn set_state(&mut self, partial: State) -> Result<(), MergeGuardError> {
		self.state.merge(None, partial)
	}
}

/// Handed to `render`.
#[derive(Debug)]
pub struct RenderContext<'a> {
	pub(crate) instance: InstanceId,
	pub(crate) props: &'a Attributes,
	pub(crate) state: &'a State,
	pub(crate) children: &'a [Child],
}

impl RenderContext<'_> {
	#[must_use]
	pub fn instance(&self) -> InstanceId {
		self.instance
	}

	#[must_use]
	pub fn props(&self) -> &Attributes {
		self.props
	}

	#[must_use]
	pub fn prop(&self, name: &str) -> Option<&Value> {
		self.props.get(name)
	}

	#[must_use]
	pub fn state(&self) -> &State {
		self.state
	}

	#[must_use]
	pub fn get(&self, name: &str) -> Option<&Value> {
		self.state.get(name)
	}

	/// The children the parent passed to this component.
	#[must_use]
	pub fn children(&self) -> &[Child] {
		self.children
	}

	/// A [`Callback`] routing `action` back to this instance.
	#[must_use]
	pub fn callback(&self, action: impl Into<Rc<str>>) -> Callback {
		Callback::new(self.instance, action.into())
	}
}

/// Handed to all hooks that may merge state.
#[derive(Debug)]
pub struct HookContext<'a> {
	pub(crate) instance: InstanceId,
	pub(crate) phase: Phase,
	pub(crate) props: &'a Attributes,
	pub(crate) state: &'a mut StateContainer,
	pub(crate) children: &'a [Child],
}

impl HookContext<'_> {
	#[must_use]
	pub fn instance(&self) -> InstanceId {
		self.instance
	}

	#[must_use]
	pub fn phase(&self) -> Phase {
		self.phase
	}

	#[must_use]
	pub fn props(&self) -> &Attributes {
		self.props
	}

	#[must_use]
	pub fn prop(&self, name: &str) -> Option<&Value> {
		self.props.get(name)
	}

	/// The committed state.
	#[must_use]
	pub fn state(&self) -> &State {
		self.state.current()
	}

	/// The state including merges that haven't been rendered yet.
	#[must_use]
	pub fn latest_state(&self) -> &State {
		self.state.latest()
	}

	#[must_use]
	pub fn children(&self) -> &[Child] {
		self.children
	}

	/// Shallowly merges `partial` into this instance's state.
	///
	/// # Errors
	///
	/// Iff the instance's phase doesn't allow merges.
	pub fn set_state(&mut self, partial: State) -> Result<(), MergeGuardError> {
		self.state.merge(Some(self.phase), partial)
	}

	#[must_use]
	pub fn callback(&self, action: impl Into<Rc<str>>) -> Callback {
		Callback::new(self.instance, action.into())
	}
}

/// Handed to the update guard.
#[derive(Debug)]
pub struct UpdateContext<'a> {
	pub(crate) instance: InstanceId,
	pub(crate) props: &'a Attributes,
	pub(crate) state: &'a State,
	pub(crate) next_props: &'a Attributes,
	pub(crate) next_state: &'a State,
}

impl UpdateContext<'_> {
	#[must_use]
	pub fn instance(&self) -> InstanceId {
		self.instance
	}

	#[must_use]
	pub fn props(&self) -> &Attributes {
		self.props
	}

	#[must_use]
	pub fn state(&self) -> &State {
		self.state
	}

	#[must_use]
	pub fn next_props(&self) -> &Attributes {
		self.next_props
	}

	#[must_use]
	pub fn next_state(&self) -> &State {
		self.next_state
	}
}
