//! Error types for the watch service.

use std::path::PathBuf;

use thiserror::Error;

/// Errors reported by [`WatchService`](crate::WatchService) and its keys.
#[derive(Debug, Error)]
pub enum WatchError {
	/// The service was closed before or during the operation.
	#[error("watch service is closed")]
	ClosedService,

	/// An argument was rejected (empty kind set, unsupported kind or modifier).
	#[error("invalid argument: {0}")]
	InvalidArgument(String),

	/// A blocking retrieval was interrupted by its caller.
	#[error("wait for a signalled key was interrupted")]
	InterruptedWait,

	/// The event source refused the registration.
	#[error(transparent)]
	Source(#[from] SourceError),

	/// The service config was rejected.
	#[error(transparent)]
	Config(#[from] ConfigError),
}

/// Failures raised by an [`EventSource`](crate::EventSource).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
	/// The watchable cannot be observed (missing, unreadable, denied).
	#[error("cannot watch {}: {reason}", path.display())]
	Unavailable {
		/// Path of the watchable.
		path: PathBuf,
		/// Provider-specific reason.
		reason: String,
	},

	/// The underlying notification facility ran out of resources.
	#[error("event source exhausted: {0}")]
	Exhausted(String),
}

/// Errors that can occur when loading a [`WatchConfig`](crate::WatchConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error parsing TOML syntax or shape.
	#[error("TOML parse error: {0}")]
	Parse(#[from] toml::de::Error),

	/// A value parsed but is out of range.
	#[error("invalid config value: {0}")]
	Invalid(String),
}

/// Result type for watch operations.
pub type Result<T> = std::result::Result<T, WatchError>;
