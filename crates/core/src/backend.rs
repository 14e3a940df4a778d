//! Backend state machine and pipeline (§3 Backend, §4.C, §4.D, §4.F).
//!
//! A `Backend<F>` is one (Dispatcher × Device) worker: it owns the compiled
//! program, command queue, and keyed constants once started, and runs one
//! job at a time through `execute_blocking` or `begin_async`. Orchestration
//! above this (the ring, the worker thread loop, completion wiring) lives in
//! `dispatcher.rs`; this module only knows about a single device and a
//! single job at a time.

use std::sync::{Arc, Condvar, Mutex};

use deluge_platform::{CommandQueue, Program};

use crate::dispatcher::Job;
use crate::error::DelugeResult;
use crate::families::HashFamily;
use crate::registry::Device;
use crate::uint::Uint320;

/// Backend state (§4.C). `Busy` covers setup, teardown, and resize; by
/// convention no other thread touches device resources while a backend is
/// `Busy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Acquirable; worker sleeping or not yet started.
    Idle,
    /// Owned by the host thread for setup/resize; worker not executing.
    Busy,
    /// Worker is running the current job on the device.
    Exec,
}

struct Resources {
    program: Program,
    queue: Arc<dyn CommandQueue>,
    constants: Arc<[u8]>,
    /// Largest element count this backend has been sized for; resizing
    /// below this is a no-op (§8 resize monotonicity).
    capacity: usize,
}

struct Inner<F: HashFamily> {
    state: State,
    resources: Option<Resources>,
    /// Installed by the submitting thread for the worker-driven pipeline
    /// (§3: "valid only when capacity > 0 ... the current Job"); the
    /// event-driven pipeline never populates this, since its job lives in
    /// the async completion closure's capture instead.
    current: Option<Job<F>>,
}

/// One (Dispatcher × Device) worker and its device resources.
pub struct Backend<F: HashFamily> {
    pub device_index: usize,
    inner: Mutex<Inner<F>>,
    /// Signaled when the host installs a job and sets state to `Exec`; the
    /// worker-driven pipeline's wait loop blocks on this.
    pub wakeup: Condvar,
    /// Cleared by `destroy` to tell a worker-driven backend's thread to
    /// exit its wait loop.
    pub active: std::sync::atomic::AtomicBool,
}

impl<F: HashFamily> Backend<F> {
    pub fn new(device_index: usize) -> Self {
        Self {
            device_index,
            inner: Mutex::new(Inner { state: State::Idle, resources: None, current: None }),
            wakeup: Condvar::new(),
            active: std::sync::atomic::AtomicBool::new(true),
        }
    }

    /// Installs `job` as the backend's current work item (§4.F step 6),
    /// ready for `mark_exec_and_wake` to hand it to the worker.
    pub fn install_current(&self, job: Job<F>) {
        self.inner.lock().unwrap().current = Some(job);
    }

    /// Takes the installed job, leaving `current` empty. Called once by the
    /// worker after waking into `Exec`.
    pub fn take_current(&self) -> Option<Job<F>> {
        self.inner.lock().unwrap().current.take()
    }

    /// Current capacity in elements; 0 means not yet started.
    pub fn capacity(&self) -> usize {
        self.inner.lock().unwrap().resources.as_ref().map_or(0, |r| r.capacity)
    }

    /// Test-and-set `Idle -> Busy` (§4.C acquisition).
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == State::Idle {
            inner.state = State::Busy;
            true
        } else {
            false
        }
    }

    /// Releases a `Busy` backend back to `Idle` without running anything
    /// (§4.F step 5: synchronous resize failure).
    pub fn release_idle(&self) {
        self.inner.lock().unwrap().state = State::Idle;
    }

    /// Moves a `Busy` backend to `Exec` and wakes a worker-driven pipeline.
    pub fn mark_exec_and_wake(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = State::Exec;
        self.wakeup.notify_one();
    }

    /// Moves an `Exec` backend back to `Idle` (§4.G step 4: ring was empty).
    pub fn mark_idle(&self) {
        self.inner.lock().unwrap().state = State::Idle;
    }

    /// Blocks the calling (worker) thread until state is `Exec`, returning
    /// `false` if the backend was deactivated while waiting.
    pub fn wait_for_exec(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        while inner.state != State::Exec {
            if !self.active.load(std::sync::atomic::Ordering::SeqCst) {
                return false;
            }
            inner = self.wakeup.wait(inner).unwrap();
        }
        true
    }

    /// Ensures device resources exist and can hold at least `min_capacity`
    /// elements, compiling the program and creating the command queue on
    /// first use (§4.F resize protocol). A no-op if capacity already
    /// suffices.
    pub(crate) fn ensure_capacity(&self, device: &Device, family: &F, min_capacity: usize) -> DelugeResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let needs_resize = inner.resources.as_ref().is_none_or(|r| r.capacity < min_capacity);
        if !needs_resize {
            return Ok(());
        }
        let program = device.ensure_program(F::NAME, family.kernel_entry())?;
        let workgroup_size = device.workgroup_size(&program).max(1);
        let rounded = min_capacity.div_ceil(workgroup_size).max(1) * workgroup_size;

        let (queue, constants) = match inner.resources.take() {
            Some(old) => (old.queue, old.constants),
            None => {
                let queue: Arc<dyn CommandQueue> = Arc::from(device.create_queue()?);
                let constants: Arc<[u8]> = Arc::from(family.constants().into_boxed_slice());
                (queue, constants)
            }
        };
        inner.resources = Some(Resources { program, queue, constants, capacity: rounded });
        Ok(())
    }

    /// Runs one job on this backend to completion, blocking the calling
    /// thread (worker-driven pipeline, §4.D's synchronous fallback path).
    /// Takes only the input words, not a full `Job`: the caller keeps the
    /// job's callback and invokes it itself once this returns, so the ring
    /// consultation in §4.G can happen without this module knowing about it.
    pub fn execute_blocking(&self, device: &Device, family: &F, input: &[u64]) -> DelugeResult<F::Output> {
        self.ensure_capacity(device, family, input.len())?;
        let (program, queue, constants) = {
            let inner = self.inner.lock().unwrap();
            let r = inner.resources.as_ref().expect("ensure_capacity populated resources");
            (r.program, r.queue.clone(), r.constants.clone())
        };
        let n = input.len() as u64;
        let workgroup_size = device.workgroup_size(&program).max(1);
        let ngrp = input.len().div_ceil(workgroup_size).max(1);

        let mut input_buf = device.allocate_input_buffer(input.len())?;
        input_buf.write(input);
        let mut output_buf = device.allocate_output_buffer(ngrp)?;

        queue.run_blocking(&program, n, &input_buf, &mut output_buf, &constants)?;
        Ok(F::encode(reduce(&output_buf)))
    }

    /// Starts the event-driven pipeline for one job (§4.D steps 3–7):
    /// resizes synchronously if needed, then hands the buffers to the
    /// platform's async launch so completion runs on its own thread.
    ///
    /// `on_complete` fires exactly once no matter which step fails — a
    /// resize or allocation failure here is reported through it rather than
    /// returned synchronously, since by the time this is called the job has
    /// already been accepted (§7: errors after acceptance go through the
    /// callback, not a synchronous return).
    pub fn begin_async(
        &self,
        device: &Device,
        family: &F,
        input: &Arc<[u64]>,
        on_complete: impl FnOnce(Result<F::Output, crate::error::DelugeError>) + Send + 'static,
    ) {
        if let Err(err) = self.ensure_capacity(device, family, input.len()) {
            on_complete(Err(err));
            return;
        }
        let (program, queue, constants) = {
            let inner = self.inner.lock().unwrap();
            let r = inner.resources.as_ref().expect("ensure_capacity populated resources");
            (r.program, r.queue.clone(), r.constants.clone())
        };
        let n = input.len() as u64;
        let workgroup_size = device.workgroup_size(&program).max(1);
        let ngrp = input.len().div_ceil(workgroup_size).max(1);

        let mut input_buf = match device.allocate_input_buffer(input.len()) {
            Ok(buf) => buf,
            Err(err) => return on_complete(Err(err.into())),
        };
        input_buf.write(input);
        let output_buf = match device.allocate_output_buffer(ngrp) {
            Ok(buf) => buf,
            Err(err) => return on_complete(Err(err.into())),
        };

        queue.launch_async(
            program,
            n,
            input_buf,
            output_buf,
            constants.to_vec(),
            Box::new(move |result, output_buf| {
                let mapped = result
                    .map_err(crate::error::DelugeError::from)
                    .map(|()| F::encode(reduce(&output_buf)));
                on_complete(mapped);
            }),
        );
    }
}

fn reduce(output_buf: &deluge_platform::OutputBuffer) -> Uint320 {
    let parts: Vec<Uint320> = output_buf.as_slice().iter().copied().map(Uint320::from_limbs).collect();
    Uint320::sum(&parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::Blake3Family;
    use crate::registry::Registry;

    /// §8 testable property 7: after a job of size N is processed, capacity
    /// is rounded up to at least N; a subsequent smaller job must not shrink
    /// (or otherwise reallocate) it.
    #[test]
    fn resize_is_monotonic_and_skips_shrink_on_smaller_jobs() {
        let registry = Registry::acquire().unwrap();
        let device = &registry.devices()[0];
        let family = Blake3Family::new([0u8; 32]);
        let backend: Backend<Blake3Family> = Backend::new(0);

        let large = vec![0u64; 200];
        backend.execute_blocking(device, &family, &large).unwrap();
        let grown = backend.capacity();
        assert!(grown >= 200);

        let small = vec![0u64; 10];
        backend.execute_blocking(device, &family, &small).unwrap();
        assert_eq!(backend.capacity(), grown, "capacity must not shrink for a smaller job");
    }
}
