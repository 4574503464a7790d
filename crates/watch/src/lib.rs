//! File-system change notification service.
//!
//! A [`Watchable`] (usually a directory) is registered with a
//! [`WatchService`], which returns a [`WatchKey`]. An [`EventSource`] delivers
//! changes to the key; the key accumulates them, coalescing adjacent repeats,
//! and queues itself with the service the first time it is signalled.
//! Consumers take signalled keys from the service, drain them with
//! [`WatchKey::poll_events`] and hand them back with [`WatchKey::reset`].
//!
//! ```
//! use std::sync::Arc;
//!
//! use vigil_watch::{ENTRY_CREATE, ENTRY_MODIFY, ManualSource, WatchService, Watchable};
//!
//! let source = Arc::new(ManualSource::new());
//! let service = WatchService::new(source.clone());
//! let dir = Watchable::directory("/srv/data");
//! let key = service.register(&dir, &[ENTRY_CREATE, ENTRY_MODIFY], &[]).unwrap();
//!
//! source.emit(&dir, &ENTRY_MODIFY, Some("log.txt".into()));
//! source.emit(&dir, &ENTRY_MODIFY, Some("log.txt".into()));
//!
//! let signalled = service.poll().unwrap();
//! assert_eq!(signalled, key);
//! let events = signalled.poll_events();
//! assert_eq!(events.len(), 1);
//! assert_eq!(events[0].count(), 2);
//! assert!(signalled.reset());
//! ```

pub mod config;
pub mod error;
pub mod event;
mod id;
pub mod key;
pub mod kind;
pub mod manual;
pub mod modifier;
pub mod service;
pub mod source;
pub mod watchable;

pub use config::WatchConfig;
pub use error::{ConfigError, Result, SourceError, WatchError};
pub use event::{EventContext, WatchEvent};
pub use id::{KeyId, ServiceId, WatchableId};
pub use key::{KeySnapshot, KeyState, SignalOutcome, WatchKey};
pub use kind::{ContextType, ENTRY_CREATE, ENTRY_DELETE, ENTRY_MODIFY, EventKind, KindRegistry, OVERFLOW, ProviderKind, STANDARD_KINDS};
pub use manual::ManualSource;
pub use modifier::{Modifier, ModifierSupport};
pub use service::WatchService;
pub use source::{EventSource, KeySink};
pub use watchable::{Watchable, WatchableKind};
