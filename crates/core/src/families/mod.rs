//! Hash-family shims.
//!
//! Replaces the source's vtable (`prepare`, `setup`, `destroy` function
//! pointers hung off a generic `dispatch`) with a single trait, monomorphized
//! per family via `Dispatcher<F>`. Each family supplies its kernel entry
//! point, its constants blob, its output encoding, and which of the two
//! pipelines from §4.D it runs under.

pub mod blake3_family;
pub mod highway_family;

use deluge_platform::KernelEntry;

pub use blake3_family::Blake3Family;
pub use highway_family::HighwayFamily;

/// Which pipeline a family's backends run: a dedicated worker thread doing
/// blocking device calls, or the platform's own event-callback completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One worker thread per backend loops on blocking write+launch+read.
    WorkerDriven,
    /// `launch_async` returns immediately; completion runs on the platform's
    /// event thread.
    EventDriven,
}

/// A hash family: keyed-state setup plus the kernel that consumes it.
///
/// `Output` is the callback-facing encoding (§6): BLAKE3 hands back 40
/// big-endian bytes, HighwayHash hands back five native-order limbs.
pub trait HashFamily: Send + Sync + 'static {
    /// Type returned to the caller's callback on success.
    type Output: Send + 'static;

    /// Name used for program-cache lookups and diagnostics.
    const NAME: &'static str;

    /// Which pipeline backends for this family run.
    const EXECUTION_MODE: ExecutionMode;

    /// The fixed kernel entry point this family compiles against.
    fn kernel_entry(&self) -> KernelEntry;

    /// Serializes the keyed state into the device constants buffer (kernel
    /// arg 4). Called once per backend at first-use (§4.F resize protocol).
    fn constants(&self) -> Vec<u8>;

    /// Encodes the final reduced 320-bit sum into this family's callback
    /// representation.
    fn encode(sum: crate::uint::Uint320) -> Self::Output;
}
