//! Per-instance component state.

use crate::{
	error::MergeGuardError,
	lifecycle::Phase,
	value::Map,
};
use tracing::trace;

/// Component state as a string-keyed map.
pub type State = Map;

/// Holds one component instance's state.
///
/// While an update pass is pending, merges accumulate in a *next* state that only becomes current once the
/// update commits. Reads of [`latest`](`StateContainer::latest`) see accumulated merges immediately.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StateContainer {
	initialized: bool,
	rendered: bool,
	current: State,
	next: Option<State>,
}

impl StateContainer {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the initial state. Only the first call has an effect.
	///
	/// Returns whether the state was set.
	pub fn initialize(&mut self, state: State) -> bool {
		if self.initialized {
			return false;
		}
		self.current = state;
		self.initialized = true;
		true
	}

	#[must_use]
	pub fn is_initialized(&self) -> bool {
		self.initialized
	}

	/// The committed state.
	#[must_use]
	pub fn current(&self) -> &State {
		&self.current
	}

	/// The state including merges that are still waiting for their update pass.
	#[must_use]
	pub fn latest(&self) -> &State {
		self.next.as_ref().unwrap_or(&self.current)
	}

	#[must_use]
	pub fn has_pending(&self) -> bool {
		self.next.is_some()
	}

	/// Called after the first render. Later merges are pending even while still mounting.
	pub(crate) fn mark_rendered(&mut self) {
		self.rendered = true;
	}

	/// Shallowly merges `partial` into the state.
	///
	/// Each top-level entry of `partial` replaces the current entry in full.
	/// [`Value::Null`] entries are stored as-is rather than removing the key.
	///
	/// During mounting and before the first render, merges apply to the current state directly, so that the
	/// first render observes them. After that, they accumulate as pending state for the next update pass.
	///
	/// # Errors
	///
	/// Iff `phase` is [`None`] (construction still running), [`Phase::Constructed`] or [`Phase::Unmounted`].
	/// The state is left unchanged in that case.
	pub fn merge(&mut self, phase: Option<Phase>, partial: State) -> Result<(), MergeGuardError> {
		match phase {
			None | Some(Phase::Constructed) | Some(Phase::Unmounted) => Err(MergeGuardError { phase }),
			Some(Phase::Mounting) if !self.rendered => {
				trace!("Merging {} key(s) into current state.", partial.len());
				shallow_merge(&mut self.current, partial);
				Ok(())
			}
			Some(Phase::Mounting) | Some(Phase::Mounted) | Some(Phase::Updating) => {
				trace!("Merging {} key(s) into pending state.", partial.len());
				let next = self.next.get_or_insert_with(|| self.current.clone());
				shallow_merge(next, partial);
				Ok(())
			}
		}
	}

	/// Takes the pending state out, leaving the current state in place.
	pub(crate) fn take_pending(&mut self) -> Option<State> {
		self.next.take()
	}

	/// Replaces the current state, returning the previous one.
	pub(crate) fn commit(&mut self, state: State) -> State {
		std::mem::replace(&mut self.current, state)
	}
}

/// One-level-deep merge: nested maps are replaced, never combined.
pub fn shallow_merge(target: &mut State, partial: State) {
	for (key, value) in partial {
		target.insert(key, value);
	}
}
