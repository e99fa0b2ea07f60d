#![doc(html_root_url = "https://docs.rs/cambium/0.0.1")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
//! A virtual tree reconciler with component lifecycles.
//!
//! Declarative [`TreeNode`] trees are committed into a [`Surface`] through a [`Renderer`],
//! which diffs each tree against the previous one and applies the resulting [`Patch`]es in order.
//! Component nodes are resolved through a [`Registry`] of [`Class`]es and get a full
//! mount → update → unmount lifecycle with state.
//!
//! [`MemorySurface`] renders headlessly. With the `"web"` feature, `WebSurface` renders into the browser DOM.

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

mod component;
mod config;
mod error;
mod lifecycle;
mod node;
mod patch;
mod reconcile;
mod renderer;
mod state;
mod surface;
mod value;

#[cfg(feature = "web")]
mod web;

pub use component::{Class, ConstructContext, Deferred, HookContext, Registry, RenderContext, UpdateContext};
pub use config::{Config, UpdateMode};
pub use error::{ConfigurationError, Error, HookError, HookFailure, MergeGuardError, NotReady, SurfaceError};
pub use lifecycle::{check_readiness, Hook, InstanceId, Phase};
pub use node::{component, construct, fragment, tag, text, Builder, Child, Key, Kind, TreeNode};
pub use patch::{NodeId, Patch};
pub use renderer::Renderer;
pub use state::{shallow_merge, State, StateContainer};
pub use surface::{MemoryHandle, MemorySurface, Surface};
pub use value::{map, Attributes, Callback, Map, Value};

#[cfg(feature = "web")]
pub use web::{WebHandle, WebSurface};
