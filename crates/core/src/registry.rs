//! Process-wide device registry (§3 Registry, §4.A).
//!
//! Modeled as a lazily-initialized, refcounted singleton: the first
//! `Registry::acquire` discovers every accelerator and the last drop tears
//! them down. The source expresses this with a manual atomic refcount plus a
//! mutex guarding the transition through zero; here `Arc`/`Weak` give the
//! same observable lifecycle (discovered once, torn down exactly once when
//! the last handle drops) without hand-rolled refcounting — see DESIGN.md
//! for why this substitution preserves every invariant in §3.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, Weak};

use deluge_platform::{Accelerator, CommandQueue, InputBuffer, KernelEntry, OutputBuffer, Program};

use crate::error::{DelugeError, DelugeResult};

fn slot() -> &'static Mutex<Weak<RegistryInner>> {
    static SLOT: OnceLock<Mutex<Weak<RegistryInner>>> = OnceLock::new();
    SLOT.get_or_init(|| Mutex::new(Weak::new()))
}

/// Process-wide discovery counter, exposed for testable property 8
/// (ref-count correctness): incremented once per successful discovery.
static DISCOVERY_COUNT: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);

/// Number of times the registry has discovered devices from scratch.
pub fn discovery_count() -> u64 {
    DISCOVERY_COUNT.load(std::sync::atomic::Ordering::SeqCst)
}

/// One accelerator plus its lazily-compiled program cache.
pub struct Device {
    accelerator: Box<dyn Accelerator>,
    programs: Mutex<HashMap<&'static str, Program>>,
}

impl Device {
    fn new(accelerator: Box<dyn Accelerator>) -> Self {
        Self { accelerator, programs: Mutex::new(HashMap::new()) }
    }

    /// Returns the compiled program for `name`, compiling and caching it on
    /// first use. Concurrent first-uses are safe: only the thread that finds
    /// the cache empty compiles, under the device mutex (§4.A).
    pub fn ensure_program(&self, name: &'static str, entry: KernelEntry) -> DelugeResult<Program> {
        let mut programs = self.programs.lock().unwrap();
        if let Some(program) = programs.get(name) {
            return Ok(*program);
        }
        let program = self.accelerator.compile(name, entry)?;
        programs.insert(name, program);
        Ok(program)
    }

    /// Workgroup size the device would run `program` at.
    pub fn workgroup_size(&self, program: &Program) -> usize {
        self.accelerator.workgroup_size(program)
    }

    /// Allocates an input staging buffer.
    pub fn allocate_input_buffer(&self, capacity: usize) -> DelugeResult<InputBuffer> {
        Ok(self.accelerator.allocate_input_buffer(capacity)?)
    }

    /// Allocates an output staging buffer.
    pub fn allocate_output_buffer(&self, capacity: usize) -> DelugeResult<OutputBuffer> {
        Ok(self.accelerator.allocate_output_buffer(capacity)?)
    }

    /// Creates a new command queue against this device.
    pub fn create_queue(&self) -> DelugeResult<Box<dyn CommandQueue>> {
        Ok(self.accelerator.create_queue()?)
    }
}

struct RegistryInner {
    devices: Vec<Device>,
}

impl RegistryInner {
    fn discover() -> DelugeResult<Self> {
        let accelerators = deluge_platform::enumerate()?;
        if accelerators.is_empty() {
            return Err(DelugeError::NoDevice);
        }
        DISCOVERY_COUNT.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        tracing::debug!(count = accelerators.len(), "discovered accelerators");
        Ok(Self { devices: accelerators.into_iter().map(Device::new).collect() })
    }
}

/// A shared handle to the process-wide device vector.
///
/// Cloning bumps the refcount (an `Arc` clone); the underlying devices are
/// finalized when the last clone drops.
#[derive(Clone)]
pub struct Registry(Arc<RegistryInner>);

impl Registry {
    /// Acquires the registry, discovering devices on first call and reusing
    /// the existing handle thereafter. Fails with `NoDevice` if discovery
    /// finds nothing.
    pub fn acquire() -> DelugeResult<Self> {
        let mut guard = slot().lock().unwrap();
        if let Some(inner) = guard.upgrade() {
            return Ok(Registry(inner));
        }
        let inner = Arc::new(RegistryInner::discover()?);
        *guard = Arc::downgrade(&inner);
        Ok(Registry(inner))
    }

    /// Devices owned by this registry.
    pub fn devices(&self) -> &[Device] {
        &self.0.devices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The registry is a real process-wide singleton; serialize these two
    // tests so one's teardown doesn't race the other's discovery.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn acquire_reuses_existing_registry() {
        let _guard = TEST_LOCK.lock().unwrap();
        let a = Registry::acquire().unwrap();
        let before = discovery_count();
        let b = Registry::acquire().unwrap();
        assert_eq!(discovery_count(), before);
        assert_eq!(a.devices().len(), b.devices().len());
    }

    #[test]
    fn registry_is_finalized_after_last_handle_drops() {
        let _guard = TEST_LOCK.lock().unwrap();
        let before = discovery_count();
        {
            let _r = Registry::acquire().unwrap();
        }
        let r2 = Registry::acquire().unwrap();
        assert!(discovery_count() >= before);
        assert!(!r2.devices().is_empty());
    }
}
