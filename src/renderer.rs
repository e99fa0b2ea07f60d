use crate::{
	component::Registry,
	config::{Config, UpdateMode},
	error::{ConfigurationError, Error, HookError, HookFailure, MergeGuardError, SurfaceError},
	lifecycle::{Hook, Instance, InstanceId, Owner, Phase},
	node::{Child, Kind, TreeNode},
	patch::{NodeId, Patch},
	reconcile::Mounted,
	state::State,
	surface::Surface,
	value::{Attributes, Callback, Value},
};
use core::{
	fmt::{self, Debug, Formatter},
	mem, slice,
};
use futures::{
	channel::mpsc::{self, UnboundedReceiver, UnboundedSender},
	future::LocalBoxFuture,
	task::{LocalSpawn, LocalSpawnExt},
};
use hashbrown::{HashMap, HashSet};
use std::{collections::VecDeque, rc::Rc};
use tracing::{debug, error, instrument, level_filters::STATIC_MAX_LEVEL, trace, trace_span, warn, Level};

/// Above this many unclaimed [`HookFailure`]s, each further one is accompanied by a warning.
const HOOK_FAILURE_WARNING_THRESHOLD: usize = 100;

pub(crate) struct Root<H> {
	pub(crate) handle: H,
	pub(crate) node: NodeId,
	pub(crate) mounted: Option<Mounted>,
}

struct DeferredOutcome {
	instance: InstanceId,
	component: Rc<str>,
	hook: Hook,
	result: Result<(), HookError>,
}

/// Reconciles [`TreeNode`]s into a [`Surface`] and drives the component lifecycle.
///
/// Each operation returns the patches it applied, in order.
/// Asynchronous hook remainders run on the injected [`LocalSpawn`]; their outcomes are collected at the start
/// of the next operation or through [`collect_deferred`](`Renderer::collect_deferred`).
pub struct Renderer<S: Surface> {
	pub(crate) surface: S,
	pub(crate) registry: Registry,
	pub(crate) config: Config,
	spawner: Box<dyn LocalSpawn>,
	pub(crate) handles: HashMap<NodeId, S::Handle>,
	next_node: u32,
	pub(crate) instances: HashMap<InstanceId, Instance>,
	next_instance: u64,
	pub(crate) roots: Vec<Root<S::Handle>>,
	pass: Vec<Patch>,
	/// Nodes created since the current operation began, with the parent each was attached to.
	created: HashMap<NodeId, Option<NodeId>>,
	pub(crate) dirty: VecDeque<InstanceId>,
	hook_failures: Vec<HookFailure>,
	deferred_sender: UnboundedSender<DeferredOutcome>,
	deferred_receiver: UnboundedReceiver<DeferredOutcome>,
}

impl<S: Surface> Debug for Renderer<S> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Renderer")
			.field("registry", &self.registry)
			.field("config", &self.config)
			.field("roots", &self.roots.iter().map(|root| &root.handle).collect::<Vec<_>>())
			.field("nodes", &self.handles.len())
			.field("instances", &self.instances.len())
			.field("dirty", &self.dirty)
			.field("hook_failures", &self.hook_failures.len())
			.finish_non_exhaustive()
	}
}

impl<S: Surface> Renderer<S> {
	pub fn new(surface: S, registry: Registry, spawner: impl LocalSpawn + 'static) -> Self {
		Self::with_config(surface, registry, spawner, Config::default())
	}

	pub fn with_config(surface: S, registry: Registry, spawner: impl LocalSpawn + 'static, config: Config) -> Self {
		let (deferred_sender, deferred_receiver) = mpsc::unbounded();
		Self {
			surface,
			registry,
			config,
			spawner: Box::new(spawner),
			handles: HashMap::new(),
			next_node: 0,
			instances: HashMap::new(),
			next_instance: 0,
			roots: Vec::new(),
			pass: Vec::new(),
			created: HashMap::new(),
			dirty: VecDeque::new(),
			hook_failures: Vec::new(),
			deferred_sender,
			deferred_receiver,
		}
	}

	/// Commits `tree` into `root`, diffing it against what was committed there before.
	///
	/// [`None`] clears the root. Committing the same tree twice applies no patches the second time.
	///
	/// # Errors
	///
	/// On [`ConfigurationError`]s and [`SurfaceError`](`crate::SurfaceError`)s.
	///
	/// Component names and keys of `tree` are checked before anything is applied.
	/// If a failure happens later on, for example in a component's render output, the root is cleared:
	/// the nodes and instances of this commit are discarded along with what the root showed before.
	#[instrument(skip(self, tree))]
	pub fn commit(&mut self, tree: Option<TreeNode>, root: &S::Handle) -> Result<Vec<Patch>, Error> {
		self.collect_deferred();
		let result = self.commit_root(tree, root);
		self.finish(result)
	}

	fn commit_root(&mut self, tree: Option<TreeNode>, root: &S::Handle) -> Result<(), Error> {
		if let Some(tree) = &tree {
			if self.config.validate_keys {
				tree.validate()?;
			}
			self.check_components(tree)?;
		}
		let existing = self.roots.iter().find(|candidate| candidate.handle == *root).map(|root| root.node);
		let node = match (existing, &tree) {
			(Some(node), _) => node,
			(None, None) => {
				trace!("Nothing to clear.");
				return Ok(());
			}
			(None, Some(_)) => {
				let node = self.allocate_node();
				self.handles.insert(node, root.clone());
				self.roots.push(Root {
					handle: root.clone(),
					node,
					mounted: None,
				});
				node
			}
		};

		let mut stale = Vec::new();
		if let Some(mounted) = self.roots.iter().find(|root| root.node == node).and_then(|root| root.mounted.as_ref()) {
			self.top_level(mounted, &mut stale);
		}
		self.created.clear();
		let result = self.replace_root(node, tree);
		if result.is_err() {
			self.roots.retain(|root| root.node != node);
			self.roll_back(node, stale, Owner::Root(node));
		}
		result
	}

	fn replace_root(&mut self, node: NodeId, tree: Option<TreeNode>) -> Result<(), Error> {
		let previous = self.roots.iter_mut().find(|root| root.node == node).and_then(|root| root.mounted.take());
		match tree {
			Some(tree) => {
				let mut mounted = self.reconcile_children(node, 0, previous.into_iter().collect(), slice::from_ref(&Child::Node(tree)), Owner::Root(node))?;
				if let Some(root) = self.roots.iter_mut().find(|root| root.node == node) {
					root.mounted = mounted.pop();
				}
			}
			None => {
				self.roots.retain(|root| root.node != node);
				if let Some(previous) = previous {
					self.remove(previous)?;
				}
				self.handles.remove(&node);
			}
		}
		Ok(())
	}

	/// Fails with the first component name in `tree` that isn't registered.
	pub(crate) fn check_components(&self, tree: &TreeNode) -> Result<(), ConfigurationError> {
		if let Kind::Component(name) = tree.kind() {
			if self.registry.get(name).is_none() {
				return Err(ConfigurationError::UnknownComponent(name.clone()));
			}
		}
		for child in tree.children() {
			if let Child::Node(child) = child {
				self.check_components(child)?;
			}
		}
		Ok(())
	}

	/// Shallowly merges `partial` into the state of the instance `id`.
	///
	/// With [`UpdateMode::Immediate`], the instance's update pass runs before this returns.
	///
	/// # Errors
	///
	/// [`ConfigurationError::UnknownInstance`] for unknown ids, and a
	/// [`MergeGuardError`](`crate::MergeGuardError`) if the instance's phase doesn't allow merges.
	pub fn set_state(&mut self, id: InstanceId, partial: State) -> Result<Vec<Patch>, Error> {
		self.collect_deferred();
		let result = self.merge(id, partial);
		self.finish(result)
	}

	fn merge(&mut self, id: InstanceId, partial: State) -> Result<(), Error> {
		match self.instances.get_mut(&id) {
			Some(instance) => instance.state.merge(instance.phase, partial)?,
			None if id.0 < self.next_instance => return Err(MergeGuardError { phase: Some(Phase::Unmounted) }.into()),
			None => return Err(ConfigurationError::UnknownInstance(id).into()),
		}
		self.mark_dirty(id);
		Ok(())
	}

	/// Runs the update pass of `id` with whatever state merges are pending.
	///
	/// This is how merges are applied with [`UpdateMode::Manual`]. An instance without pending state still re-renders.
	///
	/// # Errors
	///
	/// [`ConfigurationError::UnknownInstance`] for ids that aren't live, and anything the update pass reports.
	/// An instance whose update pass fails is unmounted and its surface nodes are removed.
	pub fn update(&mut self, id: InstanceId) -> Result<Vec<Patch>, Error> {
		self.collect_deferred();
		let result = self.update_in_place(id);
		self.finish(result)
	}

	/// Runs the update pass of `id`. If it fails, `id` is unmounted and its surface nodes are removed.
	fn update_in_place(&mut self, id: InstanceId) -> Result<(), Error> {
		let (parent, base) = self.locate(id)?;
		let mut stale = Vec::new();
		if let Some(rendered) = self.instances.get(&id).and_then(|instance| instance.rendered.as_ref()) {
			self.top_level(rendered, &mut stale);
		}
		self.created.clear();
		let result = self.update_instance(id, None, parent, base);
		if result.is_err() {
			self.roll_back(parent, stale, Owner::Instance(id));
		}
		result
	}

	/// Delivers `payload` to the `on_action` hook of the instance that created `callback`.
	///
	/// Callbacks of instances that aren't mounted anymore are ignored.
	///
	/// # Errors
	///
	/// Anything a resulting update pass reports.
	pub fn dispatch(&mut self, callback: &Callback, payload: &Value) -> Result<Vec<Patch>, Error> {
		self.collect_deferred();
		let id = callback.instance();
		match self.instances.get(&id).and_then(|instance| instance.phase) {
			Some(Phase::Mounted) => self.run_action(id, callback.action(), payload),
			phase => debug!(?id, ?phase, action = callback.action(), "Ignoring action for instance that isn't mounted."),
		}
		self.finish(Ok(()))
	}

	/// Collects the outcomes of finished asynchronous hook remainders.
	///
	/// Failures are reported like synchronous hook failures, unless the instance was unmounted since.
	/// Returns the number of outcomes collected.
	pub fn collect_deferred(&mut self) -> usize {
		let mut count = 0;
		while let Ok(outcome) = self.deferred_receiver.try_recv() {
			count += 1;
			let live = matches!(self.instances.get(&outcome.instance).and_then(|instance| instance.phase), Some(phase) if phase != Phase::Unmounted);
			if !live {
				trace!(instance = ?outcome.instance, hook = %outcome.hook, "Discarding deferred outcome of unmounted instance.");
				continue;
			}
			if let Err(error) = outcome.result {
				self.report_failure(outcome.instance, outcome.component, outcome.hook, error);
			}
		}
		count
	}

	/// Takes the hook failures recorded so far.
	pub fn take_hook_failures(&mut self) -> Vec<HookFailure> {
		mem::take(&mut self.hook_failures)
	}

	/// The phase of `id`, or [`None`] if the id was never handed out.
	///
	/// Instances are dropped once unmounted, but their ids keep reporting [`Phase::Unmounted`].
	#[must_use]
	pub fn phase(&self, id: InstanceId) -> Option<Phase> {
		match self.instances.get(&id) {
			Some(instance) => instance.phase,
			None if id.0 < self.next_instance => Some(Phase::Unmounted),
			None => None,
		}
	}

	/// The committed state of a live instance.
	#[must_use]
	pub fn state(&self, id: InstanceId) -> Option<&State> {
		self.instances.get(&id).map(|instance| instance.state.current())
	}

	/// The state of a live instance including merges that are still pending.
	#[must_use]
	pub fn latest_state(&self, id: InstanceId) -> Option<&State> {
		self.instances.get(&id).map(|instance| instance.state.latest())
	}

	#[must_use]
	pub fn props(&self, id: InstanceId) -> Option<&Attributes> {
		self.instances.get(&id).map(|instance| instance.element.attributes())
	}

	/// The tree the instance rendered last.
	#[must_use]
	pub fn rendered(&self, id: InstanceId) -> Option<&TreeNode> {
		self.instances.get(&id).and_then(|instance| instance.committed.as_ref())
	}

	/// Live instances of the component `name`, in mount order.
	#[must_use]
	pub fn instances_named(&self, name: &str) -> Vec<InstanceId> {
		let mut ids: Vec<_> = self.instances.iter().filter(|(_, instance)| &**instance.class.name() == name).map(|(id, _)| *id).collect();
		ids.sort_unstable();
		ids
	}

	/// The instances committed directly into `root`, outside of any element, in order.
	#[must_use]
	pub fn root_instances(&self, root: &S::Handle) -> Vec<InstanceId> {
		fn collect(mounted: &Mounted, instances: &mut Vec<InstanceId>) {
			match mounted {
				Mounted::Component { instance, .. } => instances.push(*instance),
				Mounted::Fragment { children, .. } => {
					for child in children {
						collect(child, instances);
					}
				}
				Mounted::Text { .. } | Mounted::Element { .. } => (),
			}
		}

		let mut instances = Vec::new();
		if let Some(mounted) = self.roots.iter().find(|candidate| candidate.handle == *root).and_then(|root| root.mounted.as_ref()) {
			collect(mounted, &mut instances);
		}
		instances
	}

	/// The surface handle a [`NodeId`] from a [`Patch`] refers to, while the node exists.
	#[must_use]
	pub fn handle(&self, node: NodeId) -> Option<&S::Handle> {
		self.handles.get(&node)
	}

	#[must_use]
	pub fn surface(&self) -> &S {
		&self.surface
	}

	/// Direct access to the surface. Changes made through it are invisible to the diff.
	pub fn surface_mut(&mut self) -> &mut S {
		&mut self.surface
	}

	#[must_use]
	pub fn registry(&self) -> &Registry {
		&self.registry
	}

	#[must_use]
	pub fn config(&self) -> &Config {
		&self.config
	}

	pub(crate) fn allocate_node(&mut self) -> NodeId {
		let node = NodeId(self.next_node);
		self.next_node += 1;
		node
	}

	pub(crate) fn allocate_instance(&mut self) -> InstanceId {
		let id = InstanceId(self.next_instance);
		self.next_instance += 1;
		id
	}

	/// Applies `patch` to the surface and records it.
	pub(crate) fn emit(&mut self, patch: Patch) -> Result<(), Error> {
		trace!(?patch, "Applying patch.");
		match &patch {
			Patch::Create { node, tag, attributes } => {
				let handle = self.surface.create_node(tag, attributes)?;
				self.handles.insert(*node, handle);
				self.created.insert(*node, None);
			}
			Patch::CreateText { node, text } => {
				let handle = self.surface.create_text(text)?;
				self.handles.insert(*node, handle);
				self.created.insert(*node, None);
			}
			Patch::Remove { node } => {
				if let Some(handle) = self.handles.remove(node) {
					self.surface.remove_node(&handle)?;
				}
			}
			Patch::Move { node, index } => self.surface.move_node(self.handles.get(node).ok_or_else(|| missing("move_node", *node))?, *index)?,
			Patch::SetAttribute { node, name, value } => self.surface.set_attribute(self.handles.get(node).ok_or_else(|| missing("set_attribute", *node))?, name, value)?,
			Patch::RemoveAttribute { node, name } => self.surface.remove_attribute(self.handles.get(node).ok_or_else(|| missing("remove_attribute", *node))?, name)?,
			Patch::SetText { node, text } => self.surface.set_text(self.handles.get(node).ok_or_else(|| missing("set_text", *node))?, text)?,
			Patch::Attach { parent, node, index } => {
				let parent_handle = self.handles.get(parent).ok_or_else(|| missing("attach", *parent))?;
				let child = self.handles.get(node).ok_or_else(|| missing("attach", *node))?;
				self.surface.attach(parent_handle, child, *index)?;
				if let Some(attached) = self.created.get_mut(node) {
					*attached = Some(*parent);
				}
			}
		}
		self.pass.push(patch);
		Ok(())
	}

	pub(crate) fn report_failure(&mut self, instance: InstanceId, component: Rc<str>, hook: Hook, error: HookError) {
		error!(?instance, component = &*component, %hook, "Hook failed: {}", error);
		if STATIC_MAX_LEVEL >= Level::WARN && self.hook_failures.len() >= HOOK_FAILURE_WARNING_THRESHOLD {
			warn!(
				"{} hook failures haven't been taken yet. Call `Renderer::take_hook_failures` to drain them.",
				self.hook_failures.len()
			);
		}
		self.hook_failures.push(HookFailure {
			instance,
			component,
			hook,
			error,
		});
	}

	pub(crate) fn spawn_hook_future(&mut self, instance: InstanceId, component: Rc<str>, hook: Hook, future: LocalBoxFuture<'static, Result<(), HookError>>) {
		let sender = self.deferred_sender.clone();
		let outcome_component = component.clone();
		let task = async move {
			let result = future.await;
			// The renderer may be gone by now.
			sender
				.unbounded_send(DeferredOutcome {
					instance,
					component: outcome_component,
					hook,
					result,
				})
				.ok();
		};
		if let Err(error) = self.spawner.spawn_local(task) {
			self.report_failure(instance, component, hook, HookError::new(format!("failed to spawn deferred remainder: {}", error)));
		}
	}

	/// Ends an operation: drains dirty instances if configured to, then hands out the applied patches.
	fn finish(&mut self, result: Result<(), Error>) -> Result<Vec<Patch>, Error> {
		let result = result.and_then(|()| match self.config.update_mode {
			UpdateMode::Immediate => self.drain_dirty(),
			UpdateMode::Manual => Ok(()),
		});
		let patches = mem::take(&mut self.pass);
		self.created.clear();
		match result {
			Ok(()) => {
				debug!("Applied {} patch(es).", patches.len());
				Ok(patches)
			}
			Err(error) => {
				self.dirty.clear();
				error!("Operation failed: {}", error);
				Err(error)
			}
		}
	}

	/// Undoes a failed operation within `container`.
	///
	/// Instances in `scope` are unmounted. `stale` lists the top-level nodes that were in place before the operation.
	/// They are removed along with nodes the operation created, so that `container` holds nothing from `scope` afterwards.
	fn roll_back(&mut self, container: NodeId, stale: Vec<NodeId>, scope: Owner) {
		let span = trace_span!("Rolling back", ?container, ?scope);
		let _enter = span.enter();

		let mut discarded: Vec<_> = self.instances.keys().copied().filter(|&id| self.is_within(id, scope)).collect();
		discarded.sort_unstable();
		let count = discarded.len();
		let mut released = Vec::new();
		for id in discarded {
			if self.instances.contains_key(&id) {
				self.unmount_instance(id, &mut released);
			}
		}

		let created = mem::take(&mut self.created);
		let mut orphans: Vec<_> = created
			.into_iter()
			.filter_map(|(node, parent)| match parent {
				Some(parent) if parent != container => None,
				_ => Some(node),
			})
			.collect();
		orphans.sort_unstable();
		for node in stale.into_iter().chain(orphans) {
			if let Err(error) = self.emit(Patch::Remove { node }) {
				error!("Failed to remove {:?} while rolling back: {}", node, error);
			}
		}

		let reachable = self.reachable();
		let before = self.handles.len();
		self.handles.retain(|node, _| reachable.contains(node));
		debug!("Discarded {} instance(s) and {} handle(s).", count, before - self.handles.len());
	}

	/// Whether `id` is `scope`'s instance or was rendered by it, directly or indirectly.
	fn is_within(&self, id: InstanceId, scope: Owner) -> bool {
		if scope == Owner::Instance(id) {
			return true;
		}
		let mut current = id;
		while let Some(instance) = self.instances.get(&current) {
			if instance.owner == scope {
				return true;
			}
			match instance.owner {
				Owner::Instance(owner) => current = owner,
				Owner::Root(_) => return false,
			}
		}
		false
	}

	/// Every node that is still part of a root's committed tree.
	fn reachable(&self) -> HashSet<NodeId> {
		fn visit<S: Surface>(renderer: &Renderer<S>, mounted: &Mounted, nodes: &mut HashSet<NodeId>) {
			match mounted {
				Mounted::Text { node, .. } => {
					nodes.insert(*node);
				}
				Mounted::Element { node, children, .. } => {
					nodes.insert(*node);
					for child in children {
						visit(renderer, child, nodes);
					}
				}
				Mounted::Fragment { children, .. } => {
					for child in children {
						visit(renderer, child, nodes);
					}
				}
				Mounted::Component { instance, .. } => {
					if let Some(rendered) = renderer.instances.get(instance).and_then(|instance| instance.rendered.as_ref()) {
						visit(renderer, rendered, nodes);
					}
				}
			}
		}

		let mut nodes = HashSet::new();
		for root in &self.roots {
			nodes.insert(root.node);
			if let Some(mounted) = &root.mounted {
				visit(self, mounted, &mut nodes);
			}
		}
		nodes
	}

	fn drain_dirty(&mut self) -> Result<(), Error> {
		let span = trace_span!("Draining dirty instances", count = self.dirty.len());
		let _enter = span.enter();

		let limit = self.config.max_update_depth;
		let mut depths = HashMap::<InstanceId, usize>::new();
		while let Some(id) = self.dirty.pop_front() {
			let has_pending = self.instances.get(&id).map_or(false, |instance| instance.state.has_pending());
			if !has_pending {
				continue;
			}
			let depth = depths.entry(id).or_insert(0);
			*depth += 1;
			if *depth > limit {
				self.dirty.clear();
				return Err(ConfigurationError::UpdateDepthExceeded { limit }.into());
			}
			self.update_in_place(id)?;
		}
		Ok(())
	}
}

fn missing(operation: &'static str, node: NodeId) -> SurfaceError {
	SurfaceError::new(operation, format!("no handle for {:?}", node))
}
