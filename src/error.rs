//! Error taxonomy.
//!
//! [`ConfigurationError`]s and [`MergeGuardError`]s reach the integrator.
//! [`HookError`]s never do: they are caught, logged and kept as [`HookFailure`]s.

use crate::{
	lifecycle::{Hook, InstanceId, Phase},
	node::Key,
};
use std::{borrow::Cow, rc::Rc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error(transparent)]
	Configuration(#[from] ConfigurationError),
	#[error(transparent)]
	MergeGuard(#[from] MergeGuardError),
	#[error(transparent)]
	Surface(#[from] SurfaceError),
}

/// Fatal misuse, reported before any further hook runs.
#[derive(Debug, Error)]
pub enum ConfigurationError {
	#[error("component `{component}` is not ready to mount: {reason}")]
	NotReady { component: Rc<str>, reason: NotReady },
	#[error("no component named `{0}` is registered")]
	UnknownComponent(Rc<str>),
	#[error("duplicate key {:?} among siblings", .key.as_str())]
	DuplicateKey { key: Key },
	#[error("{0:?} does not refer to a live component instance")]
	UnknownInstance(InstanceId),
	#[error("more than {limit} cascading updates in one pass")]
	UpdateDepthExceeded { limit: usize },
	#[error("constructor of component `{component}` failed")]
	Construction {
		component: Rc<str>,
		#[source]
		source: Box<Error>,
	},
}

/// Readiness check failure reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NotReady {
	#[error("not yet constructed")]
	NotConstructed,
	#[error("already mounted")]
	AlreadyMounted,
	#[error("currently mounting")]
	Mounting,
	#[error("missing render capability")]
	MissingRender,
	#[error("already unmounted")]
	Unmounted,
}

/// A state merge was attempted outside of the phases that allow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("state merge rejected in phase {phase:?}")]
pub struct MergeGuardError {
	/// [`None`] while the instance is still being constructed.
	pub phase: Option<Phase>,
}

/// Failure reported by a lifecycle hook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HookError {
	message: Cow<'static, str>,
}

impl HookError {
	pub fn new(message: impl Into<Cow<'static, str>>) -> Self {
		Self { message: message.into() }
	}

	#[must_use]
	pub fn message(&self) -> &str {
		&self.message
	}
}

impl From<&'static str> for HookError {
	fn from(message: &'static str) -> Self {
		Self::new(message)
	}
}

impl From<String> for HookError {
	fn from(message: String) -> Self {
		Self::new(message)
	}
}

impl From<MergeGuardError> for HookError {
	fn from(error: MergeGuardError) -> Self {
		Self::new(error.to_string())
	}
}

/// A caught [`HookError`] with its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookFailure {
	pub instance: InstanceId,
	pub component: Rc<str>,
	pub hook: Hook,
	pub error: HookError,
}

/// A display surface adapter failed to apply a patch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("surface operation `{operation}` failed: {message}")]
pub struct SurfaceError {
	pub operation: &'static str,
	pub message: String,
}

impl SurfaceError {
	pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
		Self {
			operation,
			message: message.into(),
		}
	}
}
