//! Service configuration.
//!
//! ```toml
//! name = "indexer"
//! max-pending-events = 256
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Per-key buffering capacity used when a config omits it.
pub const DEFAULT_MAX_PENDING_EVENTS: usize = 512;

/// Tunables for one [`WatchService`](crate::WatchService).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct WatchConfig {
	/// Label attached to the service's log records.
	#[serde(default = "default_name")]
	pub name: String,
	/// Number of undrained records a key holds before further events are
	/// folded into an overflow record.
	#[serde(default = "default_max_pending_events")]
	pub max_pending_events: usize,
}

fn default_name() -> String {
	"vigil".to_string()
}

fn default_max_pending_events() -> usize {
	DEFAULT_MAX_PENDING_EVENTS
}

impl Default for WatchConfig {
	fn default() -> Self {
		Self {
			name: default_name(),
			max_pending_events: default_max_pending_events(),
		}
	}
}

impl WatchConfig {
	/// Parses and validates a TOML table.
	pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(input)?;
		config.validate()?;
		Ok(config)
	}

	/// Rejects values the service cannot operate with.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.max_pending_events == 0 {
			return Err(ConfigError::Invalid("max-pending-events must be > 0".to_string()));
		}
		Ok(())
	}

	/// Sets the per-key buffering capacity.
	pub fn with_max_pending_events(mut self, max: usize) -> Self {
		self.max_pending_events = max;
		self
	}
}
