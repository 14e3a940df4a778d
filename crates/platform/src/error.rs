use std::fmt;

/// Failure surfaced by the accelerator abstraction.
///
/// Mirrors the narrow set of failure modes an OpenCL-style platform layer can
/// report to its caller: discovery finding nothing, allocation failing, or a
/// queued operation aborting. The dispatch layer above maps these onto its
/// own error taxonomy; it never interprets the platform's internal detail.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// No accelerator matched the request (empty platform, bad device id).
    #[error("no accelerator available: {0}")]
    NoDevice(String),

    /// Buffer or program allocation failed (host or device side).
    #[error("allocation failed: {0}")]
    OutOfMemory(String),

    /// Compilation, linking, or kernel launch failed.
    #[error("operation failed: {0}")]
    Failure(String),
}

impl fmt::Display for AcceleratorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "accelerator#{}", self.0)
    }
}

/// Opaque, process-unique identifier for one discovered accelerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AcceleratorId(pub u64);
