//! End-to-end behavior of watch keys and the service queue, driven through a
//! [`ManualSource`].

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use pretty_assertions::assert_eq;
use vigil_watch::{ENTRY_CREATE, ENTRY_MODIFY, KeyState, ManualSource, WatchError, WatchService, Watchable};

fn init_tracing() {
	let _ = tracing_subscriber::fmt::try_init();
}

fn setup() -> (Arc<ManualSource>, WatchService) {
	init_tracing();
	let source = Arc::new(ManualSource::new());
	let service = WatchService::new(source.clone());
	(source, service)
}

#[test]
fn three_modifies_of_one_entry_yield_one_record() {
	let (source, service) = setup();
	let dir = Watchable::directory("/project");
	service.register(&dir, &[ENTRY_MODIFY], &[]).unwrap();

	for _ in 0..3 {
		source.emit(&dir, &ENTRY_MODIFY, Some("main.rs".into()));
	}

	let key = service.take().unwrap();
	let events = key.poll_events();
	assert_eq!(events.len(), 1);
	assert_eq!(events[0].kind(), &ENTRY_MODIFY);
	assert_eq!(events[0].count(), 3);
}

#[test]
fn modifies_of_two_entries_yield_two_records() {
	let (source, service) = setup();
	let dir = Watchable::directory("/project");
	service.register(&dir, &[ENTRY_MODIFY], &[]).unwrap();

	source.emit(&dir, &ENTRY_MODIFY, Some("a".into()));
	source.emit(&dir, &ENTRY_MODIFY, Some("b".into()));

	let events = service.take().unwrap().poll_events();
	let counts: Vec<_> = events.iter().map(|e| (e.path().map(|p| p.to_path_buf()), e.count())).collect();
	assert_eq!(counts, [(Some("a".into()), 1), (Some("b".into()), 1)]);
}

#[test]
fn key_signalled_twice_is_queued_once() {
	let (source, service) = setup();
	let dir = Watchable::directory("/project");
	let key = service.register(&dir, &[ENTRY_CREATE], &[]).unwrap();

	source.emit(&dir, &ENTRY_CREATE, Some("a".into()));
	source.emit(&dir, &ENTRY_CREATE, Some("b".into()));

	assert_eq!(service.queued(), 1);
	assert_eq!(service.poll(), Some(key));
	assert_eq!(service.poll(), None);
}

#[test]
fn concurrent_signals_queue_the_key_once() {
	let (source, service) = setup();
	let dir = Watchable::directory("/project");
	service.register(&dir, &[ENTRY_CREATE], &[]).unwrap();

	let threads = 8;
	let barrier = Arc::new(Barrier::new(threads));
	let handles: Vec<_> = (0..threads)
		.map(|i| {
			let source = Arc::clone(&source);
			let dir = dir.clone();
			let barrier = Arc::clone(&barrier);
			thread::spawn(move || {
				barrier.wait();
				for j in 0..50 {
					source.emit(&dir, &ENTRY_CREATE, Some(format!("{i}-{j}").as_str().into()));
				}
			})
		})
		.collect();
	for handle in handles {
		handle.join().unwrap();
	}

	assert_eq!(service.queued(), 1);
	let key = service.poll().unwrap();
	assert_eq!(key.poll_events().iter().map(|e| e.count()).sum::<u32>(), 400);
	assert_eq!(service.poll(), None);
}

#[test]
fn reset_requeues_key_that_was_signalled_during_drain() {
	let (source, service) = setup();
	let dir = Watchable::directory("/project");
	let key = service.register(&dir, &[ENTRY_CREATE], &[]).unwrap();

	source.emit(&dir, &ENTRY_CREATE, Some("a".into()));
	let taken = service.take().unwrap();
	assert_eq!(taken.poll_events().len(), 1);
	source.emit(&dir, &ENTRY_CREATE, Some("b".into()));
	assert!(taken.reset());

	let again = service.poll_timeout(Duration::from_secs(5)).expect("key should be re-queued by reset");
	assert_eq!(again, key);
	let events = again.poll_events();
	assert_eq!(events.len(), 1);
	assert_eq!(events[0].path(), Some(std::path::Path::new("b")));
	assert!(again.reset());
	assert_eq!(key.state(), KeyState::Ready);
}

#[test]
fn cancelled_key_still_drains_pending_events() {
	let (source, service) = setup();
	let dir = Watchable::directory("/project");
	let key = service.register(&dir, &[ENTRY_CREATE, ENTRY_MODIFY], &[]).unwrap();

	source.emit(&dir, &ENTRY_CREATE, Some("a".into()));
	source.emit(&dir, &ENTRY_MODIFY, Some("a".into()));
	key.cancel();

	assert!(!key.is_valid());
	assert_eq!(key.poll_events().len(), 2);
}

#[test]
fn close_wakes_every_blocked_taker() {
	let (_source, service) = setup();
	let waiters = 4;
	let started = Arc::new(Barrier::new(waiters + 1));

	let handles: Vec<_> = (0..waiters)
		.map(|_| {
			let service = service.clone();
			let started = Arc::clone(&started);
			thread::spawn(move || {
				started.wait();
				service.take()
			})
		})
		.collect();

	started.wait();
	thread::sleep(Duration::from_millis(50));
	service.close();

	for handle in handles {
		assert!(matches!(handle.join().unwrap(), Err(WatchError::ClosedService)));
	}
	let result = service.register(&Watchable::directory("/late"), &[ENTRY_CREATE], &[]);
	assert!(matches!(result, Err(WatchError::ClosedService)));
}

#[test]
fn keys_are_taken_in_signal_order() {
	let (source, service) = setup();
	let first = Watchable::directory("/one");
	let second = Watchable::directory("/two");
	let t1 = service.register(&first, &[ENTRY_CREATE], &[]).unwrap();
	let t2 = service.register(&second, &[ENTRY_CREATE], &[]).unwrap();

	source.emit(&second, &ENTRY_CREATE, Some("x".into()));
	source.emit(&first, &ENTRY_CREATE, Some("x".into()));

	assert_eq!(service.take().unwrap(), t2);
	assert_eq!(service.take().unwrap(), t1);
}

#[test]
fn requeued_key_goes_behind_already_queued_keys() {
	let (source, service) = setup();
	let first = Watchable::directory("/one");
	let second = Watchable::directory("/two");
	let t1 = service.register(&first, &[ENTRY_CREATE], &[]).unwrap();
	let t2 = service.register(&second, &[ENTRY_CREATE], &[]).unwrap();

	source.emit(&first, &ENTRY_CREATE, Some("x".into()));
	let taken = service.take().unwrap();
	taken.poll_events();
	source.emit(&first, &ENTRY_CREATE, Some("y".into()));
	source.emit(&second, &ENTRY_CREATE, Some("x".into()));
	taken.reset();

	assert_eq!(service.take().unwrap(), t2);
	assert_eq!(service.take().unwrap(), t1);
}

#[test]
fn removed_watchable_cancels_its_keys() {
	let (source, service) = setup();
	let dir = Watchable::directory("/project");
	let key = service.register(&dir, &[ENTRY_CREATE], &[]).unwrap();
	source.emit(&dir, &ENTRY_CREATE, Some("a".into()));

	assert_eq!(source.remove(&dir), 1);
	assert!(!key.is_valid());
	assert!(service.snapshots().is_empty());

	// Still queued; the consumer drains and sees the key is gone.
	let taken = service.poll().unwrap();
	assert_eq!(taken.poll_events().len(), 1);
	assert!(!taken.reset());
}
