/// What happens after a state merge on a mounted instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
	/// The instance's update pass runs at the end of the current [`Renderer`](`crate::Renderer`) operation.
	Immediate,
	/// Merges only accumulate. The update pass runs on [`Renderer::update`](`crate::Renderer::update`),
	/// or when the parent re-renders the instance.
	Manual,
}

impl Default for UpdateMode {
	fn default() -> Self {
		Self::Immediate
	}
}

/// Runtime configuration of a [`Renderer`](`crate::Renderer`).
#[derive(Debug, Clone)]
#[must_use]
pub struct Config {
	pub update_mode: UpdateMode,
	/// How often a single instance may be updated while draining merges of one operation.
	///
	/// Exceeding this reports [`ConfigurationError::UpdateDepthExceeded`](`crate::ConfigurationError::UpdateDepthExceeded`),
	/// which usually means a post-update hook merges state unconditionally.
	pub max_update_depth: usize,
	/// Whether each committed or rendered tree is checked for duplicate sibling keys before diffing.
	pub validate_keys: bool,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			update_mode: UpdateMode::default(),
			max_update_depth: 32,
			validate_keys: true,
		}
	}
}

impl Config {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn update_mode(mut self, update_mode: UpdateMode) -> Self {
		self.update_mode = update_mode;
		self
	}

	pub fn max_update_depth(mut self, max_update_depth: usize) -> Self {
		self.max_update_depth = max_update_depth;
		self
	}

	pub fn validate_keys(mut self, validate_keys: bool) -> Self {
		self.validate_keys = validate_keys;
		self
	}
}
