#![forbid(unsafe_code)]
#![deny(unreachable_pub)]

//! Host-side dispatch layer for batched, accelerator-hashed digests.
//!
//! A [`Dispatcher`] binds one keyed hash family ([`Blake3Family`] or
//! [`HighwayFamily`]) to every accelerator the process-wide [`Registry`]
//! discovers. [`Dispatcher::schedule`] hands a batch of `u64` words to
//! whichever device backend is free — or queues it — and reports the
//! 320-bit reduced digest (see [`Uint320`]) through a callback.
//!
//! ```no_run
//! use deluge_core::{Blake3Family, Dispatcher};
//!
//! let dispatcher = Dispatcher::create(Blake3Family::new([0u8; 32]))?;
//! dispatcher.schedule(&[1, 2, 3], |result| {
//!     let digest = result.expect("hash failed");
//!     println!("{digest:02x?}");
//! })?;
//! # Ok::<(), deluge_core::DelugeError>(())
//! ```

pub mod backend;
pub mod dispatcher;
pub mod error;
pub mod families;
pub mod registry;
pub mod ring;
pub mod uint;

pub use dispatcher::{Dispatcher, Job};
pub use error::{DelugeError, DelugeResult};
pub use families::{Blake3Family, ExecutionMode, HashFamily, HighwayFamily};
pub use registry::{discovery_count, Device, Registry};
pub use uint::Uint320;
