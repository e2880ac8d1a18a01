//! Background patch generation.
//!
//! A single worker thread drains a request queue and publishes finished
//! patches into a ready table. The render thread never blocks on it: it asks
//! for a patch, checks its state on later frames, and takes the result once
//! it is ready. GPU uploads stay on the render thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use hashbrown::{HashMap, HashSet};
use parking_lot::{Condvar, Mutex};
use terrane_core::{Error, PatchKey, Result};
use tracing::{debug, warn};

use crate::generation::{HeightPatch, PatchLayout, PatchSource};

/// Lifecycle of a requested patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatchBuildState {
    /// Waiting in the request queue.
    Queued,
    /// Being generated by the worker.
    Generating,
    /// Finished and waiting to be taken.
    Ready,
}

#[derive(Default)]
struct BuildTable {
    pending: VecDeque<PatchKey>,
    states: HashMap<PatchKey, PatchBuildState>,
    ready: HashMap<PatchKey, HeightPatch>,
}

struct Shared {
    table: Mutex<BuildTable>,
    wake: Condvar,
    stop: AtomicBool,
}

/// Hands patch generation to a background worker thread.
pub struct AsyncPatchBuilder {
    shared: Arc<Shared>,
    ready_rx: Receiver<PatchKey>,
    worker: Option<JoinHandle<()>>,
    layout: PatchLayout,
}

impl AsyncPatchBuilder {
    /// Spawn the worker thread around a patch source.
    pub fn spawn<S: PatchSource>(source: S) -> Result<Self> {
        let layout = source.layout();
        let shared = Arc::new(Shared {
            table: Mutex::new(BuildTable::default()),
            wake: Condvar::new(),
            stop: AtomicBool::new(false),
        });
        let (ready_tx, ready_rx) = channel::unbounded();

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("patch-worker".to_string())
            .spawn(move || {
                Self::worker_loop(&source, &worker_shared, &ready_tx);
            })?;
        debug!("patch worker started");

        Ok(Self {
            shared,
            ready_rx,
            worker: Some(worker),
            layout,
        })
    }

    /// Main worker loop - sleeps until a request arrives or stop is signalled.
    fn worker_loop<S: PatchSource>(source: &S, shared: &Shared, ready_tx: &Sender<PatchKey>) {
        loop {
            let key = {
                let mut table = shared.table.lock();
                loop {
                    if shared.stop.load(Ordering::Acquire) {
                        return;
                    }
                    if let Some(key) = table.pending.pop_front() {
                        table.states.insert(key, PatchBuildState::Generating);
                        break key;
                    }
                    shared.wake.wait(&mut table);
                }
            };

            let patch = source.build(key);

            let mut table = shared.table.lock();
            if shared.stop.load(Ordering::Acquire) {
                return;
            }
            // Cancelled while generating.
            if table.states.get(&key) != Some(&PatchBuildState::Generating) {
                continue;
            }
            table.states.insert(key, PatchBuildState::Ready);
            table.ready.insert(key, patch);
            drop(table);

            if ready_tx.send(key).is_err() {
                // Receiver dropped, exit loop
                return;
            }
        }
    }

    /// Sample layout of the patches this builder produces.
    pub fn layout(&self) -> PatchLayout {
        self.layout
    }

    /// Ask for a patch without blocking.
    ///
    /// A key that is already queued, generating or ready is left alone and
    /// its current state returned.
    pub fn request(&self, key: PatchKey) -> PatchBuildState {
        let mut table = self.shared.table.lock();
        if let Some(&state) = table.states.get(&key) {
            return state;
        }
        table.states.insert(key, PatchBuildState::Queued);
        table.pending.push_back(key);
        drop(table);
        self.shared.wake.notify_one();
        PatchBuildState::Queued
    }

    /// Current state of a key, `None` if it was never requested or already taken.
    pub fn state(&self, key: PatchKey) -> Option<PatchBuildState> {
        self.shared.table.lock().states.get(&key).copied()
    }

    /// Remove and return a finished patch.
    pub fn take_ready(&self, key: PatchKey) -> Option<HeightPatch> {
        let mut table = self.shared.table.lock();
        if table.states.get(&key) != Some(&PatchBuildState::Ready) {
            return None;
        }
        table.states.remove(&key);
        table.ready.remove(&key)
    }

    /// Drain the worker's completion notifications.
    pub fn poll_ready(&self) -> Vec<PatchKey> {
        self.ready_rx.try_iter().collect()
    }

    /// Drop queued requests and unclaimed results whose key matches `discard`.
    ///
    /// Patches already being generated are left to finish. Returns the number
    /// of entries dropped.
    pub fn cancel_where(&self, mut discard: impl FnMut(&PatchKey) -> bool) -> usize {
        let mut table = self.shared.table.lock();
        let BuildTable {
            pending,
            states,
            ready,
        } = &mut *table;
        let before = states.len();
        pending.retain(|key| !discard(key));
        let queued: HashSet<PatchKey> = pending.iter().copied().collect();
        states.retain(|key, state| match state {
            PatchBuildState::Generating => true,
            PatchBuildState::Queued => queued.contains(key),
            PatchBuildState::Ready => {
                let keep = !discard(key);
                if !keep {
                    ready.remove(key);
                }
                keep
            }
        });
        before - states.len()
    }

    /// Requests not yet finished (queued or generating).
    pub fn pending_count(&self) -> usize {
        self.shared
            .table
            .lock()
            .states
            .values()
            .filter(|&&s| s != PatchBuildState::Ready)
            .count()
    }

    /// Finished patches waiting to be taken.
    pub fn ready_count(&self) -> usize {
        self.shared.table.lock().ready.len()
    }

    /// Fail if the worker exited without being asked to.
    pub fn ensure_alive(&self) -> Result<()> {
        if self.shared.stop.load(Ordering::Acquire) {
            return Ok(());
        }
        match &self.worker {
            Some(handle) if !handle.is_finished() => Ok(()),
            _ => Err(Error::WorkerTerminated),
        }
    }

    /// Stop the worker and wait for it, discarding in-flight work.
    pub fn shutdown(&mut self) {
        {
            // Set under the lock so the worker cannot miss the wake-up.
            let _table = self.shared.table.lock();
            self.shared.stop.store(true, Ordering::Release);
        }
        self.shared.wake.notify_all();

        if let Some(thread) = self.worker.take() {
            if thread.join().is_err() {
                warn!("patch worker panicked before shutdown");
            } else {
                debug!("patch worker stopped");
            }
        }

        let mut table = self.shared.table.lock();
        table.pending.clear();
        table.states.clear();
        table.ready.clear();
    }
}

impl Drop for AsyncPatchBuilder {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for AsyncPatchBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncPatchBuilder")
            .field("layout", &self.layout)
            .field("running", &self.worker.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use terrane_core::{GridCoord, TerrainSettings};

    use super::*;
    use crate::generation::HeightPatchGenerator;

    fn generator() -> HeightPatchGenerator {
        HeightPatchGenerator::new(&TerrainSettings::with_seed(7).with_grid_size(8)).unwrap()
    }

    fn key(level: u32, x: i32, y: i32) -> PatchKey {
        PatchKey::new(level, GridCoord::new(x, y))
    }

    fn wait_for(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    /// Builds only after the test lets it.
    struct GatedSource {
        inner: HeightPatchGenerator,
        gate: Receiver<()>,
    }

    impl PatchSource for GatedSource {
        fn layout(&self) -> PatchLayout {
            self.inner.layout()
        }

        fn build(&self, key: PatchKey) -> HeightPatch {
            let _ = self.gate.recv();
            self.inner.generate_patch(key)
        }
    }

    struct PanickingSource(PatchLayout);

    impl PatchSource for PanickingSource {
        fn layout(&self) -> PatchLayout {
            self.0
        }

        fn build(&self, _key: PatchKey) -> HeightPatch {
            panic!("patch source failure");
        }
    }

    #[test]
    fn builds_requested_patch() {
        let gen = generator();
        let builder = AsyncPatchBuilder::spawn(gen.clone()).unwrap();
        let k = key(1, 2, -2);

        assert_eq!(builder.request(k), PatchBuildState::Queued);
        let mut notified = Vec::new();
        assert!(wait_for(|| {
            notified.extend(builder.poll_ready());
            !notified.is_empty()
        }));
        assert_eq!(notified, vec![k]);
        assert_eq!(builder.state(k), Some(PatchBuildState::Ready));

        let patch = builder.take_ready(k).unwrap();
        assert_eq!(patch, gen.generate_patch(k));
        assert_eq!(builder.state(k), None);
        assert!(builder.take_ready(k).is_none());
    }

    #[test]
    fn duplicate_requests_are_not_enqueued() {
        let (gate_tx, gate_rx) = channel::unbounded();
        let builder = AsyncPatchBuilder::spawn(GatedSource {
            inner: generator(),
            gate: gate_rx,
        })
        .unwrap();

        let a = key(0, 0, 0);
        let b = key(0, 1, 0);
        builder.request(a);
        builder.request(b);
        let again = builder.request(a);
        assert!(matches!(
            again,
            PatchBuildState::Queued | PatchBuildState::Generating
        ));
        assert_eq!(builder.pending_count(), 2);

        gate_tx.send(()).unwrap();
        gate_tx.send(()).unwrap();
        assert!(wait_for(|| builder.ready_count() == 2));
        assert_eq!(builder.pending_count(), 0);

        drop(gate_tx);
        drop(builder);
    }

    #[test]
    fn cancel_drops_queued_but_not_generating() {
        let (gate_tx, gate_rx) = channel::unbounded();
        let builder = AsyncPatchBuilder::spawn(GatedSource {
            inner: generator(),
            gate: gate_rx,
        })
        .unwrap();

        let a = key(0, 0, 0);
        builder.request(a);
        assert!(wait_for(|| builder.state(a) == Some(PatchBuildState::Generating)));
        builder.request(key(0, 1, 0));
        builder.request(key(0, 2, 0));

        let dropped = builder.cancel_where(|k| *k != a);
        assert_eq!(dropped, 2);
        assert_eq!(builder.state(key(0, 1, 0)), None);
        assert_eq!(builder.state(a), Some(PatchBuildState::Generating));

        gate_tx.send(()).unwrap();
        assert!(wait_for(|| builder.state(a) == Some(PatchBuildState::Ready)));

        drop(gate_tx);
        drop(builder);
    }

    #[test]
    fn bulk_cancel_keeps_survivors_queued() {
        let (gate_tx, gate_rx) = channel::unbounded();
        let builder = AsyncPatchBuilder::spawn(GatedSource {
            inner: generator(),
            gate: gate_rx,
        })
        .unwrap();

        let busy = key(0, 0, 0);
        builder.request(busy);
        assert!(wait_for(|| builder.state(busy) == Some(PatchBuildState::Generating)));
        for x in 1..=200 {
            builder.request(key(0, x, 0));
        }

        let dropped = builder.cancel_where(|k| k.coord.x % 2 == 1);
        assert_eq!(dropped, 100);
        for x in 1..=200 {
            let expected = (x % 2 == 0).then_some(PatchBuildState::Queued);
            assert_eq!(builder.state(key(0, x, 0)), expected, "x = {x}");
        }
        assert_eq!(builder.state(busy), Some(PatchBuildState::Generating));

        drop(gate_tx);
        drop(builder);
    }

    #[test]
    fn dead_worker_is_detected() {
        let builder = AsyncPatchBuilder::spawn(PanickingSource(generator().layout())).unwrap();
        builder.ensure_alive().unwrap();

        builder.request(key(0, 0, 0));
        assert!(wait_for(|| builder.ensure_alive().is_err()));
        assert!(matches!(builder.ensure_alive(), Err(Error::WorkerTerminated)));
    }

    #[test]
    fn shutdown_discards_in_flight_work() {
        let (gate_tx, gate_rx) = channel::unbounded::<()>();
        let mut builder = AsyncPatchBuilder::spawn(GatedSource {
            inner: generator(),
            gate: gate_rx,
        })
        .unwrap();

        let a = key(2, 4, 4);
        builder.request(a);
        assert!(wait_for(|| builder.state(a) == Some(PatchBuildState::Generating)));

        let release = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            drop(gate_tx);
        });
        builder.shutdown();
        release.join().unwrap();

        assert_eq!(builder.state(a), None);
        assert_eq!(builder.ready_count(), 0);
        assert!(builder.ensure_alive().is_ok());
    }
}
