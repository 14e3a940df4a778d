//! CPU-backed reference accelerator.
//!
//! Stands in for a real OpenCL-style device: "compiling" just wraps a
//! function pointer, and "launching a kernel" calls it directly, splitting
//! the input into per-workgroup slices the same way a device would split
//! work across compute units. Used both as the default when no real
//! accelerator is configured and as the fixture the test suite runs against.

use std::sync::Mutex;
use std::thread;

use crate::{Accelerator, AcceleratorId, CommandQueue, InputBuffer, OutputBuffer, PlatformError, Program};

/// Elements assigned to each simulated workgroup. Mirrors a modest real
/// device workgroup size; kept small so tests exercise multiple groups
/// without needing large inputs.
const WORKGROUP_SIZE: usize = 64;

/// Discovers reference accelerators.
///
/// The count is fixed at process start: one per available CPU, capped so a
/// single test run doesn't spin up an unreasonable number of worker threads.
/// Override with `DELUGE_DEVICE_COUNT` for deterministic tests.
pub fn enumerate() -> Result<Vec<Box<dyn Accelerator>>, PlatformError> {
    let count = std::env::var("DELUGE_DEVICE_COUNT")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or_else(|| {
            thread::available_parallelism()
                .map(|n| n.get().min(4))
                .unwrap_or(1)
        })
        .max(1);

    Ok((0..count)
        .map(|i| Box::new(ReferenceAccelerator { id: AcceleratorId(i as u64) }) as Box<dyn Accelerator>)
        .collect())
}

/// A single simulated accelerator.
pub struct ReferenceAccelerator {
    id: AcceleratorId,
}

impl Accelerator for ReferenceAccelerator {
    fn id(&self) -> AcceleratorId {
        self.id
    }

    fn workgroup_size(&self, _program: &Program) -> usize {
        WORKGROUP_SIZE
    }

    fn compile(&self, name: &'static str, entry: crate::KernelEntry) -> Result<Program, PlatformError> {
        Ok(Program::new(name, entry))
    }

    fn allocate_input_buffer(&self, capacity: usize) -> Result<InputBuffer, PlatformError> {
        Ok(InputBuffer::with_capacity(capacity))
    }

    fn allocate_output_buffer(&self, capacity: usize) -> Result<OutputBuffer, PlatformError> {
        Ok(OutputBuffer::with_capacity(capacity))
    }

    fn create_queue(&self) -> Result<Box<dyn CommandQueue>, PlatformError> {
        Ok(Box::new(ReferenceQueue::default()))
    }
}

/// Runs `program.entry` split across `n.div_ceil(WORKGROUP_SIZE)` simulated
/// workgroups, one partial sum per group.
fn run_entry(program: &Program, n: u64, input: &InputBuffer, output: &mut OutputBuffer, constants: &[u8]) {
    let ngroups = (n as usize).div_ceil(WORKGROUP_SIZE).max(1);
    debug_assert!(output.as_slice().len() >= ngroups);
    (program.entry)(
        n,
        &input.as_slice()[..n as usize],
        &mut output.as_mut_slice()[..ngroups],
        constants,
        WORKGROUP_SIZE as u64,
    );
}

/// Command queue backed by the calling thread (blocking) or a dedicated
/// completion thread (async), matching the two pipelines the dispatch layer
/// drives: a synchronous worker thread for one hash family, event-callback
/// completion for the other.
#[derive(Default)]
struct ReferenceQueue {
    /// Guards nothing functionally; present so multiple logical "in-flight"
    /// launches on one queue serialize the same way a real in-order command
    /// queue would.
    order: Mutex<()>,
}

impl CommandQueue for ReferenceQueue {
    fn run_blocking(
        &self,
        program: &Program,
        n: u64,
        input: &InputBuffer,
        output: &mut OutputBuffer,
        constants: &[u8],
    ) -> Result<(), PlatformError> {
        let _order = self.order.lock().unwrap();
        run_entry(program, n, input, output, constants);
        Ok(())
    }

    fn launch_async(
        &self,
        program: Program,
        n: u64,
        input: InputBuffer,
        mut output: OutputBuffer,
        constants: Vec<u8>,
        on_complete: Box<dyn FnOnce(Result<(), PlatformError>, OutputBuffer) + Send>,
    ) {
        // A real platform would enqueue write/exec/read and attach the
        // callback to the read event. The reference backend has no true
        // async device, so it hands the work to a short-lived thread
        // standing in for the platform's own completion thread.
        thread::spawn(move || {
            run_entry(&program, n, &input, &mut output, &constants);
            on_complete(Ok(()), output);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum_entry(n: u64, input: &[u64], output: &mut [[u64; 5]], constants: &[u8], local_size: u64) {
        let bias = constants.first().copied().unwrap_or(0) as u64;
        for (g, slot) in output.iter_mut().enumerate() {
            let start = g as u64 * local_size;
            let end = (start + local_size).min(n);
            let mut total = bias;
            for &w in &input[start as usize..end as usize] {
                total = total.wrapping_add(w);
            }
            *slot = [total, 0, 0, 0, 0];
        }
    }

    #[test]
    fn run_blocking_invokes_entry_over_full_range() {
        let accel = ReferenceAccelerator { id: AcceleratorId(0) };
        let program = accel.compile("sum", sum_entry).unwrap();
        let mut input = accel.allocate_input_buffer(8).unwrap();
        input.write(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let mut output = accel.allocate_output_buffer(1).unwrap();
        let queue = accel.create_queue().unwrap();
        queue.run_blocking(&program, 8, &input, &mut output, &[]).unwrap();
        assert_eq!(output.as_slice()[0][0], 36);
    }

    #[test]
    fn run_blocking_splits_across_workgroups() {
        let accel = ReferenceAccelerator { id: AcceleratorId(0) };
        let program = accel.compile("sum", sum_entry).unwrap();
        let n = WORKGROUP_SIZE * 2 + 3;
        let mut input = accel.allocate_input_buffer(n).unwrap();
        let elems: Vec<u64> = (0..n as u64).collect();
        input.write(&elems);
        let mut output = accel.allocate_output_buffer(3).unwrap();
        let queue = accel.create_queue().unwrap();
        queue.run_blocking(&program, n as u64, &input, &mut output, &[]).unwrap();
        let total: u64 = output.as_slice().iter().map(|s| s[0]).sum();
        assert_eq!(total, elems.iter().sum::<u64>());
    }

    #[test]
    fn launch_async_invokes_callback_exactly_once() {
        let accel = ReferenceAccelerator { id: AcceleratorId(0) };
        let program = accel.compile("sum", sum_entry).unwrap();
        let mut input = accel.allocate_input_buffer(4).unwrap();
        input.write(&[10, 20, 30, 40]);
        let output = accel.allocate_output_buffer(1).unwrap();
        let queue = accel.create_queue().unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        queue.launch_async(
            program,
            4,
            input,
            output,
            vec![],
            Box::new(move |result, output| {
                tx.send((result, output.as_slice()[0][0])).unwrap();
            }),
        );
        let (result, total) = rx.recv().unwrap();
        assert!(result.is_ok());
        assert_eq!(total, 100);
    }
}
