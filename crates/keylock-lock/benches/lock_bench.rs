// Benchmarks for DistributedLock over MemoryStore
// Measures uncontended acquire/release and the scoped increment used by the runner

use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use criterion::{Criterion, criterion_group, criterion_main};
use keylock_lock::DistributedLock;
use keylock_store::{MemoryStore, SharedStore};

const WAIT: Duration = Duration::from_millis(1000);
const LEASE: Duration = Duration::from_millis(1000);

fn bench_acquire_release(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let lock = DistributedLock::with_defaults(store);

    c.bench_function("acquire_release_uncontended", |b| {
        b.to_async(&rt).iter(|| async {
            let handle = lock.try_acquire("bench-lock", WAIT, LEASE).await.unwrap();
            black_box(lock.release(handle).await)
        })
    });
}

fn bench_with_lock_increment(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let lock = DistributedLock::with_defaults(store.clone());

    c.bench_function("with_lock_increment", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(
                lock.with_lock("bench-lock", WAIT, LEASE, || store.increment_and_get("key"))
                    .await,
            )
        })
    });
}

criterion_group!(benches, bench_acquire_release, bench_with_lock_increment);
criterion_main!(benches);
