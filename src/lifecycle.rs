//! Component instances and the hook sequences around mount, update and unmount.

use crate::{
	component::{Class, ConstructContext, Deferred, HookContext, RenderContext, UpdateContext},
	config::UpdateMode,
	error::{ConfigurationError, Error, HookError, NotReady},
	node::{Child, TreeNode},
	patch::{NodeId, Patch},
	reconcile::{Cursor, Mounted},
	renderer::Renderer,
	state::{State, StateContainer},
	surface::Surface,
	value::Value,
};
use core::{
	fmt::{self, Display, Formatter},
	mem, slice,
};
use std::rc::Rc;
use tracing::{trace, trace_span, warn};

/// Identifies a component instance for the lifetime of its [`Renderer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub(crate) u64);

/// Lifecycle phase of a component instance.
///
/// `Constructed → Mounting → Mounted ⇄ Updating`, and from `Mounted` or `Updating` to the terminal `Unmounted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
	Constructed,
	Mounting,
	Mounted,
	Updating,
	Unmounted,
}

/// Names the capabilities a [`Class`] may provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
	Constructor,
	WillMount,
	Render,
	DidCreate,
	DidMount,
	ShouldUpdate,
	WillUpdate,
	DidUpdate,
	WillUnmount,
	OnAction,
}

impl Hook {
	pub const ALL: [Hook; 10] = [
		Hook::Constructor,
		Hook::WillMount,
		Hook::Render,
		Hook::DidCreate,
		Hook::DidMount,
		Hook::ShouldUpdate,
		Hook::WillUpdate,
		Hook::DidUpdate,
		Hook::WillUnmount,
		Hook::OnAction,
	];

	#[must_use]
	pub fn name(self) -> &'static str {
		match self {
			Hook::Constructor => "constructor",
			Hook::WillMount => "will_mount",
			Hook::Render => "render",
			Hook::DidCreate => "did_create",
			Hook::DidMount => "did_mount",
			Hook::ShouldUpdate => "should_update",
			Hook::WillUpdate => "will_update",
			Hook::DidUpdate => "did_update",
			Hook::WillUnmount => "will_unmount",
			Hook::OnAction => "on_action",
		}
	}
}

impl Display for Hook {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// Checks whether an instance in `phase` of `class` may start mounting.
///
/// `phase` is [`None`] while construction hasn't finished.
///
/// # Errors
///
/// With the first applicable [`NotReady`] reason.
pub fn check_readiness(phase: Option<Phase>, class: &Class) -> Result<(), NotReady> {
	match phase {
		None => Err(NotReady::NotConstructed),
		Some(Phase::Mounting) => Err(NotReady::Mounting),
		Some(Phase::Mounted | Phase::Updating) => Err(NotReady::AlreadyMounted),
		Some(Phase::Unmounted) => Err(NotReady::Unmounted),
		Some(Phase::Constructed) if !class.defines(Hook::Render) => Err(NotReady::MissingRender),
		Some(Phase::Constructed) => Ok(()),
	}
}

/// What an instance was rendered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Owner {
	/// Committed directly into the root with this node.
	Root(NodeId),
	Instance(InstanceId),
}

#[derive(Debug)]
pub(crate) struct Instance {
	pub(crate) class: Rc<Class>,
	/// The component node last committed for this instance. Its attributes are the props.
	pub(crate) element: TreeNode,
	pub(crate) state: StateContainer,
	pub(crate) phase: Option<Phase>,
	/// The last `render` output, which is the diff baseline of the next update.
	pub(crate) committed: Option<TreeNode>,
	pub(crate) rendered: Option<Mounted>,
	pub(crate) owner: Owner,
}

impl<S: Surface> Renderer<S> {
	/// Constructs and mounts the component described by `element`, attaching its surface nodes through `outer`.
	pub(crate) fn mount_component(&mut self, name: &Rc<str>, element: &TreeNode, outer: &mut Cursor, owner: Owner) -> Result<Mounted, Error> {
		let class = self.registry.get(name).cloned().ok_or_else(|| ConfigurationError::UnknownComponent(name.clone()))?;
		let id = self.allocate_instance();
		let span = trace_span!("Mounting component", component = &**name, ?id);
		let _enter = span.enter();

		let mut instance = Instance {
			class: class.clone(),
			element: element.clone(),
			state: StateContainer::new(),
			phase: None,
			committed: None,
			rendered: None,
			owner,
		};
		if let Some(constructor) = &class.constructor {
			let mut cx = ConstructContext {
				instance: id,
				props: element.attributes(),
				state: &mut instance.state,
			};
			constructor(&mut cx).map_err(|source| ConfigurationError::Construction {
				component: name.clone(),
				source: Box::new(source),
			})?;
		}
		instance.state.initialize(State::new());
		instance.phase = Some(Phase::Constructed);

		check_readiness(instance.phase, &class).map_err(|reason| ConfigurationError::NotReady { component: name.clone(), reason })?;
		instance.phase = Some(Phase::Mounting);
		self.instances.insert(id, instance);

		self.run_hook(id, Hook::WillMount);
		let tree = self.render(id)?;

		// Nested components attach themselves as they finish mounting, so a component rendered at the top level of
		// this one is attached (and mounted) before this instance's `did_create`. Its own nodes wait for `did_create`.
		let mut cursor = Cursor::deferred(outer.parent, outer.base + outer.attached);
		let rendered = self.create(&Child::Node(tree), &mut cursor, Owner::Instance(id))?;
		self.instance_mut(id)?.rendered = Some(rendered);

		self.run_hook(id, Hook::DidCreate);

		for (node, position) in cursor.take_pending() {
			self.emit(Patch::Attach {
				parent: cursor.parent,
				node,
				index: cursor.base + position,
			})?;
		}
		outer.advance_attached(cursor.placed());

		self.instance_mut(id)?.phase = Some(Phase::Mounted);
		// Picks up merges from `did_create`.
		self.mark_dirty(id);
		let deferred = self.with_context(id, Hook::DidMount, |class, cx| class.did_mount.as_ref().map(|did_mount| did_mount(cx)));
		if let Some(deferred) = deferred {
			self.spawn_deferred(id, Hook::DidMount, deferred);
		}
		trace!("Mounted.");

		Ok(Mounted::Component {
			tree: element.clone(),
			instance: id,
		})
	}

	/// Runs the update sequence for a mounted instance whose surface nodes start at `base` within `parent`.
	///
	/// `next_element` carries new props from a parent diff. Without it, the current props are kept.
	pub(crate) fn update_instance(&mut self, id: InstanceId, next_element: Option<TreeNode>, parent: NodeId, base: usize) -> Result<(), Error> {
		let span = trace_span!("Updating component", ?id);
		let _enter = span.enter();

		let instance = match self.instances.get_mut(&id) {
			Some(instance) if instance.phase == Some(Phase::Mounted) => instance,
			_ => {
				trace!("Skipping update of instance that isn't mounted.");
				return Ok(());
			}
		};
		let class = instance.class.clone();
		let next_element = next_element.unwrap_or_else(|| instance.element.clone());
		let next_state = instance.state.take_pending().unwrap_or_else(|| instance.state.current().clone());

		if let Some(should_update) = &class.should_update {
			let cx = UpdateContext {
				instance: id,
				props: instance.element.attributes(),
				state: instance.state.current(),
				next_props: next_element.attributes(),
				next_state: &next_state,
			};
			if !should_update(&cx) {
				trace!("Update guard declined.");
				return Ok(());
			}
		}
		instance.phase = Some(Phase::Updating);

		self.with_context(id, Hook::WillUpdate, |class, cx| {
			class
				.will_update
				.as_ref()
				.map(|will_update| will_update(cx, next_element.attributes(), &next_state))
		});

		let instance = self.instance_mut(id)?;
		let previous_element = mem::replace(&mut instance.element, next_element);
		let previous_state = instance.state.commit(next_state);
		let previous_rendered = instance.rendered.take();

		let tree = self.render(id)?;
		let mut rendered = self.reconcile_children(parent, base, previous_rendered.into_iter().collect(), slice::from_ref(&Child::Node(tree)), Owner::Instance(id))?;
		self.instance_mut(id)?.rendered = rendered.pop();

		let deferred = self.with_context(id, Hook::DidUpdate, |class, cx| {
			class
				.did_update
				.as_ref()
				.map(|did_update| did_update(cx, previous_element.attributes(), &previous_state))
		});
		if let Some(deferred) = deferred {
			self.spawn_deferred(id, Hook::DidUpdate, deferred);
		}

		self.instance_mut(id)?.phase = Some(Phase::Mounted);
		self.mark_dirty(id);
		Ok(())
	}

	/// Runs the pre-removal hook, then tears down the instance's rendered tree.
	///
	/// Instances that never finished mounting are dropped without `will_unmount`.
	/// Surface nodes owned by the instance are collected into `released`. Removing them is up to the caller.
	pub(crate) fn unmount_instance(&mut self, id: InstanceId, released: &mut Vec<NodeId>) {
		let span = trace_span!("Unmounting component", ?id);
		let _enter = span.enter();

		if matches!(self.instances.get(&id).and_then(|instance| instance.phase), Some(Phase::Mounted | Phase::Updating)) {
			self.run_hook(id, Hook::WillUnmount);
		}
		let rendered = match self.instances.get_mut(&id) {
			Some(instance) => {
				instance.phase = Some(Phase::Unmounted);
				instance.rendered.take()
			}
			None => {
				warn!("Tried to unmount unknown instance {:?}.", id);
				return;
			}
		};
		if let Some(rendered) = rendered {
			self.teardown(rendered, released);
		}
		self.instances.remove(&id);
		self.dirty.retain(|&dirty| dirty != id);
	}

	/// Calls `render` and checks the output before anything of it is created.
	pub(crate) fn render(&mut self, id: InstanceId) -> Result<TreeNode, Error> {
		let instance = self.instances.get_mut(&id).ok_or(ConfigurationError::UnknownInstance(id))?;
		let render = instance.class.render.clone().ok_or_else(|| ConfigurationError::NotReady {
			component: instance.class.name().clone(),
			reason: NotReady::MissingRender,
		})?;
		let tree = render(&RenderContext {
			instance: id,
			props: instance.element.attributes(),
			state: instance.state.current(),
			children: instance.element.children(),
		});
		instance.state.mark_rendered();
		if self.config.validate_keys {
			tree.validate()?;
		}
		self.check_components(&tree)?;
		self.instance_mut(id)?.committed = Some(tree.clone());
		Ok(tree)
	}

	pub(crate) fn run_action(&mut self, id: InstanceId, action: &str, payload: &Value) {
		let span = trace_span!("Running action", ?id, action);
		let _enter = span.enter();
		if self.with_context(id, Hook::OnAction, |class, cx| class.on_action.as_ref().map(|on_action| on_action(cx, action, payload))).is_none() {
			trace!("No action handled.");
		}
	}

	fn run_hook(&mut self, id: InstanceId, hook: Hook) {
		self.with_context(id, hook, |class, cx| {
			let hook = match hook {
				Hook::WillMount => class.will_mount.as_ref(),
				Hook::DidCreate => class.did_create.as_ref(),
				Hook::WillUnmount => class.will_unmount.as_ref(),
				_ => None,
			}?;
			Some(hook(cx))
		});
	}

	/// Calls into a hook with a [`HookContext`] for `id`, catching and reporting its failure.
	///
	/// `call` returns [`None`] iff the class doesn't define the hook.
	fn with_context<R>(&mut self, id: InstanceId, hook: Hook, call: impl FnOnce(&Class, &mut HookContext<'_>) -> Option<Result<R, HookError>>) -> Option<R> {
		let instance = self.instances.get_mut(&id)?;
		let phase = instance.phase?;
		let class = instance.class.clone();
		let result = call(
			&class,
			&mut HookContext {
				instance: id,
				phase,
				props: instance.element.attributes(),
				state: &mut instance.state,
				children: instance.element.children(),
			},
		)?;
		self.mark_dirty(id);
		match result {
			Ok(value) => Some(value),
			Err(error) => {
				self.report_failure(id, class.name().clone(), hook, error);
				None
			}
		}
	}

	/// Queues `id` for an update pass if it has pending state.
	pub(crate) fn mark_dirty(&mut self, id: InstanceId) {
		if self.config.update_mode != UpdateMode::Immediate || self.dirty.contains(&id) {
			return;
		}
		if let Some(instance) = self.instances.get(&id) {
			if instance.state.has_pending() && matches!(instance.phase, Some(Phase::Mounted | Phase::Updating)) {
				self.dirty.push_back(id);
			}
		}
	}

	pub(crate) fn instance_mut(&mut self, id: InstanceId) -> Result<&mut Instance, Error> {
		Ok(self.instances.get_mut(&id).ok_or(ConfigurationError::UnknownInstance(id))?)
	}

	fn spawn_deferred(&mut self, id: InstanceId, hook: Hook, deferred: Deferred) {
		if let Some(future) = deferred.0 {
			let component = match self.instances.get(&id) {
				Some(instance) => instance.class.name().clone(),
				None => return,
			};
			self.spawn_hook_future(id, component, hook, future);
		}
	}
}
