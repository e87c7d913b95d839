use brkalloc_core::{Heap, HeapError};
use std::sync::Arc;
use std::thread;

#[derive(Clone, Copy, Debug)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        // xorshift64*
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn gen_range_usize(&mut self, low: usize, high_inclusive: usize) -> usize {
        assert!(low <= high_inclusive);
        let span = high_inclusive - low + 1;
        low + (self.next_u64() as usize % span)
    }
}

// Every thread churns its own handles on one shared heap; payload tags
// must never bleed between threads and the drained heap must be empty.
#[test]
fn parallel_churn_keeps_directory_consistent() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 400;
    const POOL: usize = 8;

    let heap = Arc::new(Heap::new());

    let mut join = Vec::with_capacity(THREADS);
    for thread_id in 0..THREADS {
        let heap = Arc::clone(&heap);
        join.push(thread::spawn(move || {
            let mut rng = XorShift64::new(thread_id as u64 + 1);
            let tag = 0x10 + thread_id as u8;
            let mut pool: Vec<(usize, usize)> = Vec::with_capacity(POOL);

            for round in 0..ROUNDS {
                let context = format!("thread={thread_id} round={round}");
                if pool.len() < POOL && rng.gen_range_usize(0, 99) < 60 {
                    let size = rng.gen_range_usize(1, 512);
                    let handle = if size % 3 == 0 {
                        let h = heap
                            .allocate_zeroed(size, 1)
                            .unwrap_or_else(|err| panic!("{context}: allocate_zeroed: {err}"));
                        let bytes = heap
                            .read(h, 0, size)
                            .unwrap_or_else(|err| panic!("{context}: read zeroed: {err}"));
                        assert!(
                            bytes.iter().all(|&byte| byte == 0),
                            "{context}: zeroed payload holds stale bytes"
                        );
                        h
                    } else {
                        heap.allocate(size)
                            .unwrap_or_else(|err| panic!("{context}: allocate: {err}"))
                    };
                    heap.write(handle, 0, &vec![tag; size])
                        .unwrap_or_else(|err| panic!("{context}: write: {err}"));
                    pool.push((handle, size));
                } else if !pool.is_empty() {
                    let pick = rng.gen_range_usize(0, pool.len() - 1);
                    let (handle, size) = pool.swap_remove(pick);
                    let bytes = heap
                        .read(handle, 0, size)
                        .unwrap_or_else(|err| panic!("{context}: read: {err}"));
                    assert!(
                        bytes.iter().all(|&byte| byte == tag),
                        "{context}: payload tag bled across threads"
                    );
                    if rng.gen_range_usize(0, 99) < 25 {
                        // Move instead of release; prefix must carry over.
                        let new_size = rng.gen_range_usize(1, 512);
                        let moved = heap
                            .resize(Some(handle), new_size)
                            .unwrap_or_else(|err| panic!("{context}: resize: {err}"))
                            .unwrap_or_else(|| panic!("{context}: resize dropped the handle"));
                        let kept = size.min(new_size);
                        let bytes = heap
                            .read(moved, 0, kept)
                            .unwrap_or_else(|err| panic!("{context}: read moved: {err}"));
                        assert!(
                            bytes.iter().all(|&byte| byte == tag),
                            "{context}: resize lost the retained prefix"
                        );
                        heap.write(moved, 0, &vec![tag; new_size])
                            .unwrap_or_else(|err| panic!("{context}: rewrite: {err}"));
                        pool.push((moved, new_size));
                    } else {
                        heap.release(handle)
                            .unwrap_or_else(|err| panic!("{context}: release: {err}"));
                    }
                }
            }

            for (handle, size) in pool {
                let bytes = heap
                    .read(handle, 0, size)
                    .unwrap_or_else(|err| panic!("thread={thread_id}: drain read: {err}"));
                assert!(
                    bytes.iter().all(|&byte| byte == tag),
                    "thread={thread_id}: drained payload lost its tag"
                );
                heap.release(handle)
                    .unwrap_or_else(|err| panic!("thread={thread_id}: drain release: {err}"));
            }
        }));
    }

    for handle in join {
        handle.join().expect("churn thread must not panic");
    }

    heap.validate().expect("directory valid after churn");
    assert_eq!(heap.chunk_count(), 0, "all chunks must drain");
    assert_eq!(heap.high_water(), 0, "break must return to zero");

    let snap = heap.metrics().snapshot();
    assert_eq!(snap.allocations, snap.releases);
    assert_eq!(snap.double_releases, 0);
    assert_eq!(snap.unknown_handles, 0);
}

// Two threads race to release every handle; the lock must let exactly one
// win per handle and the loser must fault without touching the directory.
#[test]
fn racing_releases_pick_exactly_one_winner_per_handle() {
    const THREADS: usize = 8;
    const HANDLES: usize = 512;

    let heap = Arc::new(Heap::new());
    let mut handles = Vec::with_capacity(HANDLES);
    for i in 0..HANDLES {
        let size = 32 + (i % 96);
        handles.push(heap.allocate(size).expect("stress setup allocation"));
    }

    // Owner thread t and its neighbor both release every handle in batch t.
    let mut batches: Vec<Vec<usize>> = (0..THREADS).map(|_| Vec::new()).collect();
    for (i, &handle) in handles.iter().enumerate() {
        batches[i % THREADS].push(handle);
    }

    let mut join = Vec::with_capacity(THREADS * 2);
    for (owner, batch) in batches.into_iter().enumerate() {
        for batch in [batch.clone(), batch] {
            let heap = Arc::clone(&heap);
            join.push(thread::spawn(move || {
                let mut won = 0usize;
                let mut faulted = 0usize;
                for handle in batch {
                    match heap.release(handle) {
                        Ok(()) => won += 1,
                        Err(
                            HeapError::DoubleRelease { .. } | HeapError::UnknownHandle { .. },
                        ) => faulted += 1,
                        Err(other) => panic!("owner={owner}: unexpected fault: {other}"),
                    }
                }
                (won, faulted)
            }));
        }
    }

    let mut won = 0usize;
    let mut faulted = 0usize;
    for handle in join {
        let (w, f) = handle.join().expect("release thread must not panic");
        won += w;
        faulted += f;
    }

    assert_eq!(won, HANDLES, "each handle must release exactly once");
    assert_eq!(faulted, HANDLES, "each duplicate must fault exactly once");

    heap.validate().expect("directory valid after the race");
    assert_eq!(heap.chunk_count(), 0);
    assert_eq!(heap.high_water(), 0);

    let snap = heap.metrics().snapshot();
    assert_eq!(snap.releases, HANDLES as u64);
    assert_eq!(
        snap.double_releases + snap.unknown_handles,
        HANDLES as u64,
        "every losing release must be counted as a fault"
    );
}

// Tight allocate/release pairs across threads; linearizability means the
// counters and the final directory agree with the sequential sum.
#[test]
fn contended_allocate_release_pairs_linearize() {
    const THREADS: usize = 16;
    const ITERS: usize = 500;

    let heap = Arc::new(Heap::new());

    let mut join = Vec::with_capacity(THREADS);
    for thread_id in 0..THREADS {
        let heap = Arc::clone(&heap);
        join.push(thread::spawn(move || {
            for i in 0..ITERS {
                let size = 16 + ((thread_id + i) % 8) * 24;
                let handle = heap
                    .allocate(size)
                    .unwrap_or_else(|err| panic!("thread={thread_id} iter={i}: {err}"));
                heap.release(handle)
                    .unwrap_or_else(|err| panic!("thread={thread_id} iter={i}: {err}"));
            }
        }));
    }

    for handle in join {
        handle.join().expect("pair thread must not panic");
    }

    heap.validate().expect("directory valid after pairs");
    assert_eq!(heap.chunk_count(), 0);
    assert_eq!(heap.high_water(), 0);

    let snap = heap.metrics().snapshot();
    assert_eq!(snap.allocations, (THREADS * ITERS) as u64);
    assert_eq!(snap.releases, (THREADS * ITERS) as u64);
    assert_eq!(snap.double_releases, 0);
    assert_eq!(snap.grow_failures, 0);
}
