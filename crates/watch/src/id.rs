use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic id clock shared by services, watchables and keys.
#[derive(Debug)]
pub(crate) struct IdClock {
	next: AtomicU64,
}

impl IdClock {
	pub const fn new() -> Self {
		Self { next: AtomicU64::new(0) }
	}

	/// Returns the next id. The first id handed out is 1.
	pub fn next(&self) -> u64 {
		self.next.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
	}
}

static CLOCK: IdClock = IdClock::new();

macro_rules! define_id {
	($(#[$meta:meta])* $name:ident, $prefix:literal) => {
		$(#[$meta])*
		#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
		pub struct $name(u64);

		impl $name {
			pub(crate) fn next() -> Self {
				Self(CLOCK.next())
			}

			/// Returns the raw id value.
			pub const fn get(self) -> u64 {
				self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, concat!($prefix, "#{}"), self.0)
			}
		}
	};
}

define_id!(
	/// Identifies one [`WatchService`](crate::WatchService).
	ServiceId,
	"service"
);
define_id!(
	/// Identifies one [`Watchable`](crate::Watchable).
	WatchableId,
	"watchable"
);
define_id!(
	/// Identifies one [`WatchKey`](crate::WatchKey).
	KeyId,
	"key"
);
