#![allow(dead_code)]

use cambium::{Config, Error, MemoryHandle, MemorySurface, Patch, Registry, Renderer, TreeNode};
use futures::executor::LocalPool;
use std::{cell::RefCell, rc::Rc};
use tracing_subscriber::EnvFilter;

pub fn init_logging() {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::from_default_env())
		.with_test_writer()
		.try_init()
		.ok();
}

pub struct Harness {
	pub renderer: Renderer<MemorySurface>,
	pub root: MemoryHandle,
	pub pool: LocalPool,
}

impl Harness {
	pub fn new(registry: Registry) -> Self {
		Self::with_config(registry, Config::default())
	}

	pub fn with_config(registry: Registry, config: Config) -> Self {
		init_logging();
		let pool = LocalPool::new();
		let mut surface = MemorySurface::new();
		let root = surface.create_root("body");
		Self {
			renderer: Renderer::with_config(surface, registry, pool.spawner(), config),
			root,
			pool,
		}
	}

	pub fn commit(&mut self, tree: impl Into<Option<TreeNode>>) -> Result<Vec<Patch>, Error> {
		self.renderer.commit(tree.into(), &self.root)
	}

	pub fn clear(&mut self) -> Result<Vec<Patch>, Error> {
		self.renderer.commit(None, &self.root)
	}

	pub fn markup(&self) -> String {
		self.renderer.surface().markup(self.root)
	}

	pub fn children(&self) -> Vec<MemoryHandle> {
		self.renderer.surface().children(self.root)
	}
}

pub fn operations(patches: &[Patch]) -> Vec<&'static str> {
	patches.iter().map(Patch::operation).collect()
}

/// A shared, append-only event record for hooks to write into.
#[derive(Debug, Default, Clone)]
pub struct Log(Rc<RefCell<Vec<String>>>);

impl Log {
	pub fn push(&self, entry: impl Into<String>) {
		self.0.borrow_mut().push(entry.into());
	}

	pub fn take(&self) -> Vec<String> {
		self.0.borrow_mut().drain(..).collect()
	}
}
