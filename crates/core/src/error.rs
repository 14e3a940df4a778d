use deluge_platform::PlatformError;

/// Uniform status returned across the dispatch layer.
///
/// Numeric values are stable and match the public C-ABI error codes the
/// callback contract is specified against: `SUCCESS = 0`, `FAILURE = -1`,
/// `NODEV = -2`, `NOMEM = -3`, `CANCEL = -4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DelugeError {
    /// Platform or host implementation fault (compile/link, thread/mutex
    /// creation, kernel launch, unexpected device error).
    #[error("operation failed")]
    Failure,
    /// No accelerator device is available; the registry discovered nothing.
    #[error("no device available")]
    NoDevice,
    /// Device ran out of memory while allocating a buffer.
    #[error("device out of memory")]
    NoMemory,
    /// Job was cancelled by `Dispatcher::destroy` before it ran.
    #[error("job cancelled")]
    Cancel,
}

impl DelugeError {
    /// The stable numeric status code for this error, matching §6 of the
    /// callback contract (`SUCCESS` itself is represented by `Ok(_)`, not by
    /// this type).
    pub const fn code(self) -> i32 {
        match self {
            DelugeError::Failure => -1,
            DelugeError::NoDevice => -2,
            DelugeError::NoMemory => -3,
            DelugeError::Cancel => -4,
        }
    }
}

impl From<PlatformError> for DelugeError {
    /// Maps a platform fault onto the dispatch layer's taxonomy, logging the
    /// platform's own detail message first since it doesn't survive the
    /// mapping otherwise — the structured-logging equivalent of `error.c`'s
    /// `NDEBUG`-gated `fprintf(stderr, ...)` diagnostic (§1A/§7).
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::NoDevice(detail) => {
                tracing::warn!(%detail, "no accelerator device available");
                DelugeError::NoDevice
            }
            PlatformError::OutOfMemory(detail) => {
                tracing::warn!(%detail, "device allocation failed");
                DelugeError::NoMemory
            }
            PlatformError::Failure(detail) => {
                tracing::error!(%detail, "platform operation failed");
                DelugeError::Failure
            }
        }
    }
}

/// Result alias used throughout the dispatch layer.
pub type DelugeResult<T> = Result<T, DelugeError>;
