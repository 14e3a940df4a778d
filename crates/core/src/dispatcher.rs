//! Dispatcher orchestration: ties the Registry, Job Ring, and per-device
//! Backends into `create`/`schedule`/`destroy` (§3 Dispatcher, §4.B, §4.F,
//! §4.G, §4.H).
//!
//! The source's `Backend` stores a pointer back to its owning `Dispatcher`
//! so the worker thread and the completion callback can reach the ring
//! (§9 "cyclic references"). `backend.rs` here never stores that pointer at
//! all: this module is the only thing that spawns worker threads and builds
//! completion closures, and at both of those call sites it already holds an
//! `Arc<Shared<F>>` to hand in. No field, no cycle to break.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::backend::Backend;
use crate::error::{DelugeError, DelugeResult};
use crate::families::{ExecutionMode, HashFamily};
use crate::registry::Registry;
use crate::ring::JobRing;

/// One `schedule` call's input, callback, and (implicitly) user context.
///
/// The source's `Job` borrows its input pointer and leans on the caller to
/// keep it alive until the callback fires. A safe Rust API can't express
/// "valid until this closure runs" as a borrow once the job may hop to a
/// worker thread or a platform completion thread, so the input is owned here
/// (`Arc<[u64]>`) instead — the client's slice is copied once at `schedule`
/// time and the borrowing contract in §3 becomes structurally impossible to
/// violate rather than documented.
pub struct Job<F: HashFamily> {
    pub input: Arc<[u64]>,
    pub callback: Box<dyn FnOnce(Result<F::Output, DelugeError>) + Send>,
}

struct RingState<F: HashFamily> {
    jobs: JobRing<Job<F>>,
    stopping: bool,
}

struct Shared<F: HashFamily> {
    registry: Registry,
    family: F,
    backends: Vec<Backend<F>>,
    ring: Mutex<RingState<F>>,
    /// One slot per backend; populated the first time a worker-driven
    /// backend is woken. Empty for event-driven families.
    workers: Vec<Mutex<Option<JoinHandle<()>>>>,
}

impl<F: HashFamily> Shared<F> {
    fn device(&self, index: usize) -> &crate::registry::Device {
        &self.registry.devices()[index]
    }

    /// §4.G completion / backend release, run after a job's result is known
    /// and its callback has already fired. Takes the ring mutex and, in the
    /// same critical section, either dequeues the next job or idles the
    /// backend — the idle transition must happen before the ring mutex is
    /// released, or a concurrent `schedule` can find no idle backend, enqueue
    /// behind this one, and then see it go idle with nothing left watching
    /// the ring (the race §4.G exists to rule out). Locking the backend while
    /// still holding the ring mutex follows the Ring→Backend order from §5.
    fn release_backend(self: &Arc<Self>, backend_index: usize) {
        let next = {
            let mut ring = self.ring.lock().unwrap();
            if ring.stopping {
                None
            } else {
                match ring.jobs.dequeue() {
                    Some(job) => Some(job),
                    None => {
                        self.backends[backend_index].mark_idle();
                        None
                    }
                }
            }
        };
        if let Some(job) = next {
            self.dispatch_on(backend_index, job);
        }
    }

    /// Runs (worker-driven) or launches (event-driven) `job` on an already
    /// `Exec`-eligible backend, wiring its completion back through
    /// `release_backend`. Used both by fresh submissions (after the backend
    /// is filled and woken) and by the ring-drain reinstall in
    /// `release_backend`.
    fn dispatch_on(self: &Arc<Self>, backend_index: usize, job: Job<F>) {
        let backend = &self.backends[backend_index];
        match F::EXECUTION_MODE {
            ExecutionMode::WorkerDriven => {
                backend.install_current(job);
                backend.mark_exec_and_wake();
            }
            ExecutionMode::EventDriven => {
                backend.mark_exec_and_wake();
                let device = self.device(backend.device_index);
                let shared = self.clone();
                let Job { input, callback } = job;
                backend.begin_async(device, &self.family, &input, move |result| {
                    callback(result);
                    shared.release_backend(backend_index);
                });
            }
        }
    }

    /// Body of one worker-driven backend's dedicated thread (§4.D's
    /// synchronous fallback path). Blocks on the wakeup condition, runs the
    /// installed job to completion, reports it, and consults the ring — all
    /// without ever touching a back-reference, since this closure already
    /// holds `Arc<Shared<F>>`.
    fn run_worker(self: Arc<Self>, backend_index: usize) {
        loop {
            if !self.backends[backend_index].wait_for_exec() {
                return;
            }
            let Job { input, callback } = self.backends[backend_index]
                .take_current()
                .expect("worker woken into Exec without an installed job");
            let device = self.device(self.backends[backend_index].device_index);
            let result = self.backends[backend_index].execute_blocking(device, &self.family, &input);
            callback(result);
            self.release_backend(backend_index);
        }
    }
}

/// A client-facing handle for one hash family bound to one key (§3
/// Dispatcher). Cloning shares the same Registry reference, ring, and
/// backends — all `Dispatcher<F>` clones refer to one pipeline.
pub struct Dispatcher<F: HashFamily> {
    shared: Arc<Shared<F>>,
}

impl<F: HashFamily> Clone for Dispatcher<F> {
    // Written by hand: `derive(Clone)` would add a spurious `F: Clone`
    // bound, but sharing a dispatcher never needs the family itself to be
    // cloneable, only the `Arc` around it.
    fn clone(&self) -> Self {
        Self { shared: self.shared.clone() }
    }
}

impl<F: HashFamily> Dispatcher<F> {
    /// `create(family, key)` from §4.B: `family` already carries its keyed
    /// state (`Blake3Family::new(key)` / `HighwayFamily::new(key)`).
    /// Acquires the Registry, failing with `NoDevice` if it is empty, and
    /// allocates one `Idle`, zero-capacity Backend per device.
    pub fn create(family: F) -> DelugeResult<Self> {
        let registry = Registry::acquire()?;
        let backends: Vec<Backend<F>> = (0..registry.devices().len()).map(Backend::new).collect();
        let workers = backends.iter().map(|_| Mutex::new(None)).collect();
        let shared = Arc::new(Shared {
            registry,
            family,
            backends,
            ring: Mutex::new(RingState { jobs: JobRing::new(), stopping: false }),
            workers,
        });
        tracing::debug!(family = F::NAME, devices = shared.backends.len(), "dispatcher created");
        Ok(Self { shared })
    }

    /// Number of backends (one per registry device).
    pub fn backend_count(&self) -> usize {
        self.shared.backends.len()
    }

    /// `schedule(inputs, n, cb, user)` from §4.F. `user` is folded into the
    /// closure the caller provides for `callback`.
    ///
    /// A zero-element batch (S2) is accepted and completed synchronously
    /// without ever touching a backend or the ring: there is no partial sum
    /// to reduce, so `SUCCESS` is returned without invoking `callback`,
    /// which this crate documents as the chosen branch of §8 S2's either/or.
    pub fn schedule(
        &self,
        inputs: &[u64],
        callback: impl FnOnce(Result<F::Output, DelugeError>) + Send + 'static,
    ) -> DelugeResult<()> {
        if inputs.is_empty() {
            return Ok(());
        }
        let job = Job { input: Arc::from(inputs), callback: Box::new(callback) };
        let input_len = job.input.len();

        let backend_index = {
            let mut ring = self.shared.ring.lock().unwrap();
            if ring.stopping {
                return Err(DelugeError::Cancel);
            }
            let slot = self.shared.backends.iter().position(|b| b.try_acquire());
            match slot {
                Some(index) => index,
                None => {
                    ring.jobs.enqueue(job);
                    return Ok(());
                }
            }
        };

        let backend = &self.shared.backends[backend_index];
        let device = self.shared.device(backend.device_index);
        if let Err(err) = backend.ensure_capacity(device, &self.shared.family, input_len) {
            backend.release_idle();
            return Err(err);
        }

        if F::EXECUTION_MODE == ExecutionMode::WorkerDriven {
            self.ensure_worker_started(backend_index);
        }
        self.shared.dispatch_on(backend_index, job);
        Ok(())
    }

    fn ensure_worker_started(&self, backend_index: usize) {
        let mut slot = self.shared.workers[backend_index].lock().unwrap();
        if slot.is_some() {
            return;
        }
        let shared = self.shared.clone();
        *slot = Some(std::thread::spawn(move || shared.run_worker(backend_index)));
    }

    /// `destroy()` from §4.B/§4.H. Sets `stopping`, cancels everything still
    /// queued with `Cancel`, and tears down backends per the family's
    /// chosen strategy (§9 open question): BLAKE3/`WorkerDriven` joins its
    /// worker threads synchronously; HighwayHash/`EventDriven` returns early
    /// if any backend is still busy, relying on that job's own completion
    /// path (`release_backend`, which checks `stopping`) to leave the
    /// backend idle without ever reinstalling more work.
    pub fn destroy(&self) {
        {
            let mut ring = self.shared.ring.lock().unwrap();
            ring.stopping = true;
            ring.jobs.drain(|job| (job.callback)(Err(DelugeError::Cancel)));
        }

        if F::EXECUTION_MODE == ExecutionMode::WorkerDriven {
            for backend in &self.shared.backends {
                backend.active.store(false, Ordering::SeqCst);
                backend.wakeup.notify_all();
            }
            for slot in &self.shared.workers {
                if let Some(handle) = slot.lock().unwrap().take() {
                    let _ = handle.join();
                }
            }
        }
        tracing::debug!(family = F::NAME, "dispatcher destroyed");
    }
}

impl<F: HashFamily> Drop for Dispatcher<F> {
    fn drop(&mut self) {
        // Only the last clone's drop should tear down shared state; cheaper
        // than tracking destroy-once explicitly since Arc already knows.
        if Arc::strong_count(&self.shared) == 1 {
            self.destroy();
        }
    }
}
