//! Several producers and consumers sharing one service.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use vigil_watch::{ENTRY_MODIFY, KeyId, ManualSource, WatchService, Watchable};

const WATCHABLES: usize = 6;
const PRODUCERS: usize = 4;
const CONSUMERS: usize = 3;
const EVENTS_PER_PRODUCER: usize = 300;

#[test]
fn consumers_never_hold_the_same_key_at_once_and_lose_nothing() {
	let _ = tracing_subscriber::fmt::try_init();
	let source = Arc::new(ManualSource::new());
	let service = WatchService::new(source.clone());

	let dirs: Vec<_> = (0..WATCHABLES).map(|i| Watchable::directory(format!("/dir{i}"))).collect();
	let keys: Vec<_> = dirs.iter().map(|dir| service.register(dir, &[ENTRY_MODIFY], &[]).unwrap()).collect();
	let in_flight: Arc<HashMap<KeyId, AtomicBool>> = Arc::new(keys.iter().map(|k| (k.id(), AtomicBool::new(false))).collect());
	let drained = Arc::new(AtomicU64::new(0));
	let overlaps = Arc::new(Mutex::new(Vec::new()));

	let consumers: Vec<_> = (0..CONSUMERS)
		.map(|_| {
			let service = service.clone();
			let in_flight = Arc::clone(&in_flight);
			let drained = Arc::clone(&drained);
			let overlaps = Arc::clone(&overlaps);
			thread::spawn(move || {
				while let Ok(key) = service.take() {
					let flag = &in_flight[&key.id()];
					if flag.swap(true, Ordering::AcqRel) {
						overlaps.lock().push(key.id());
					}
					let count: u64 = key.poll_events().iter().map(|e| u64::from(e.count())).sum();
					drained.fetch_add(count, Ordering::AcqRel);
					flag.store(false, Ordering::Release);
					key.reset();
				}
			})
		})
		.collect();

	let producers: Vec<_> = (0..PRODUCERS)
		.map(|p| {
			let source = Arc::clone(&source);
			let dirs = dirs.clone();
			thread::spawn(move || {
				for i in 0..EVENTS_PER_PRODUCER {
					let dir = &dirs[(p + i) % dirs.len()];
					// Reuse a small set of names so some events coalesce.
					let name = format!("f{}", i % 3);
					source.emit(dir, &ENTRY_MODIFY, Some(name.as_str().into()));
				}
			})
		})
		.collect();
	for producer in producers {
		producer.join().unwrap();
	}

	// Let consumers catch up, then shut down.
	for _ in 0..200 {
		if service.queued() == 0 {
			break;
		}
		thread::sleep(Duration::from_millis(5));
	}
	thread::sleep(Duration::from_millis(20));
	service.close();
	for consumer in consumers {
		consumer.join().unwrap();
	}

	// Whatever was signalled but not yet drained is still on the keys.
	let leftover: u64 = keys
		.iter()
		.flat_map(|k| k.poll_events())
		.map(|e| u64::from(e.count()))
		.sum();

	let overlaps = overlaps.lock().clone();
	assert!(overlaps.is_empty(), "keys handed to two consumers at once: {overlaps:?}");
	assert_eq!(drained.load(Ordering::Acquire) + leftover, (PRODUCERS * EVENTS_PER_PRODUCER) as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn async_consumers_share_the_queue() {
	let source = Arc::new(ManualSource::new());
	let service = WatchService::new(source.clone());
	let dirs: Vec<_> = (0..4).map(|i| Watchable::directory(format!("/async{i}"))).collect();
	for dir in &dirs {
		service.register(dir, &[ENTRY_MODIFY], &[]).unwrap();
	}

	let consumers: Vec<_> = (0..2)
		.map(|_| {
			let service = service.clone();
			tokio::spawn(async move {
				let mut seen = 0u64;
				while let Ok(key) = service.recv().await {
					seen += key.poll_events().iter().map(|e| u64::from(e.count())).sum::<u64>();
					key.reset();
				}
				seen
			})
		})
		.collect();

	for (i, dir) in dirs.iter().enumerate() {
		source.emit(dir, &ENTRY_MODIFY, Some(format!("file{i}").as_str().into()));
	}
	for _ in 0..200 {
		if service.queued() == 0 {
			break;
		}
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
	tokio::time::sleep(Duration::from_millis(20)).await;
	service.close();

	let mut total = 0;
	for consumer in consumers {
		total += tokio::time::timeout(Duration::from_secs(5), consumer)
			.await
			.expect("consumer should stop after close")
			.unwrap();
	}
	assert_eq!(total, 4);
}
