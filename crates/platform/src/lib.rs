#![forbid(unsafe_code)]
#![deny(unreachable_pub)]

//! Accelerator abstraction underneath the hashing dispatch layer.
//!
//! This crate plays the role of the OpenCL platform/device/context surface:
//! [`enumerate`] discovers accelerators, each [`Accelerator`] compiles a
//! kernel, allocates input/output buffers, and runs it either synchronously
//! (`run_blocking`) or asynchronously with a completion callback
//! (`launch_async`). The kernel itself is never interpreted here — it is
//! supplied by the caller as a plain function pointer and treated as an
//! opaque device program, the same way a real platform layer treats a
//! compiled `cl_kernel` as opaque machine code.
//!
//! The only implementation shipped is [`reference`], a CPU-thread-backed
//! stand-in used both when no real accelerator is present and in tests.

pub mod error;
pub mod reference;

pub use error::{AcceleratorId, PlatformError};

/// One 320-bit partial sum as produced by a workgroup, native-endian limbs,
/// limb 0 least significant. The dispatch layer interprets these; this crate
/// only moves them.
pub type PartialSum = [u64; 5];

/// A compute kernel's fixed entry point.
///
/// Arguments mirror the fixed kernel ABI: element count, the input word
/// array, the output partial-sum array (one slot per workgroup), the
/// family-specific constants blob (key material, IV, etc), and the
/// workgroup size each output slot corresponds to (group `g` reduces
/// elements `[g*local_size, min(n, (g+1)*local_size))`).
pub type KernelEntry =
    fn(n: u64, input: &[u64], output: &mut [PartialSum], constants: &[u8], local_size: u64);

/// A kernel bound to a device, ready to be queued.
#[derive(Clone, Copy)]
pub struct Program {
    /// Name used for cache lookups and diagnostics (e.g. `"blake3_sum64"`).
    pub name: &'static str,
    pub(crate) entry: KernelEntry,
}

impl Program {
    /// Wraps an entry point as a compiled program. Compilation/linking is a
    /// no-op in the reference backend since the "kernel source" is already
    /// native code; a real backend would call `clCompileProgram`/`clLinkProgram`
    /// here instead.
    pub fn new(name: &'static str, entry: KernelEntry) -> Self {
        Self { name, entry }
    }
}

/// Host-side staging buffer for kernel input words.
///
/// Stands in for a pinned host-write / device-read buffer pair: on a real
/// platform, writing here would `memcpy` into mapped pinned memory and the
/// queue would separately issue the device upload.
pub struct InputBuffer {
    data: Vec<u64>,
}

impl InputBuffer {
    /// Allocates a buffer able to hold `capacity` elements, zero-filled.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { data: vec![0; capacity] }
    }

    /// Overwrites the leading `elems.len()` words. Must not exceed capacity.
    pub fn write(&mut self, elems: &[u64]) {
        self.data[..elems.len()].copy_from_slice(elems);
    }

    /// Full backing storage, including any unused tail capacity.
    pub fn as_slice(&self) -> &[u64] {
        &self.data
    }

    /// Number of elements this buffer can hold.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }
}

/// Host-side staging buffer for kernel output, one partial sum per
/// workgroup.
pub struct OutputBuffer {
    data: Vec<PartialSum>,
}

impl OutputBuffer {
    /// Allocates a buffer able to hold `capacity` workgroup results.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { data: vec![[0; 5]; capacity] }
    }

    /// Partial sums written by the last kernel launch.
    pub fn as_slice(&self) -> &[PartialSum] {
        &self.data
    }

    fn as_mut_slice(&mut self) -> &mut [PartialSum] {
        &mut self.data
    }
}

/// A command queue bound to one accelerator.
///
/// `run_blocking` models the worker-thread-driven pipeline (the caller is
/// already off the hot path on its own thread and simply waits); `launch_async`
/// models the event-callback-driven pipeline (the call returns immediately and
/// the callback fires later from the platform's own completion thread).
pub trait CommandQueue: Send + Sync {
    /// Runs the kernel to completion on the calling thread. `constants` is
    /// the family's device constants buffer (kernel arg 4), bound once per
    /// backend at setup/resize time.
    fn run_blocking(
        &self,
        program: &Program,
        n: u64,
        input: &InputBuffer,
        output: &mut OutputBuffer,
        constants: &[u8],
    ) -> Result<(), PlatformError>;

    /// Queues the kernel and returns immediately. `on_complete` fires exactly
    /// once, from a platform-owned thread, once the result buffer is ready.
    fn launch_async(
        &self,
        program: Program,
        n: u64,
        input: InputBuffer,
        output: OutputBuffer,
        constants: Vec<u8>,
        on_complete: Box<dyn FnOnce(Result<(), PlatformError>, OutputBuffer) + Send>,
    );
}

/// One discovered accelerator and its execution context.
pub trait Accelerator: Send + Sync {
    /// Stable identifier for logging and device selection.
    fn id(&self) -> AcceleratorId;

    /// Workgroup size this device would run the given program at. Buffer
    /// capacities are rounded up to a multiple of this value.
    fn workgroup_size(&self, program: &Program) -> usize;

    /// Compiles and links a kernel. The reference backend validates nothing
    /// beyond wrapping the entry point; a real backend would invoke the
    /// compiler/linker here against `headers`/`sources` text blobs.
    fn compile(&self, name: &'static str, entry: KernelEntry) -> Result<Program, PlatformError>;

    /// Allocates an input staging buffer sized for `capacity` elements.
    fn allocate_input_buffer(&self, capacity: usize) -> Result<InputBuffer, PlatformError>;

    /// Allocates an output staging buffer sized for `capacity` workgroup
    /// slots.
    fn allocate_output_buffer(&self, capacity: usize) -> Result<OutputBuffer, PlatformError>;

    /// Creates a new command queue against this accelerator.
    fn create_queue(&self) -> Result<Box<dyn CommandQueue>, PlatformError>;
}

/// Discovers all accelerators visible to this process.
pub fn enumerate() -> Result<Vec<Box<dyn Accelerator>>, PlatformError> {
    reference::enumerate()
}
