//! # First-boot provisioning engine
//!
//! This crate drives a freshly booted machine from a declarative JSON
//! config to a provisioned root: disks, filesystems, files, users,
//! units, and kernel arguments, executed as a strict sequence of stages
//! each run by one invocation of the binary.

pub mod cli;
mod engine;
mod fetcher;
pub(crate) mod kernel_cmdline;
mod platform;
mod providers;
mod stages;
mod state;

mod apply;

pub use engine::Engine;
pub use fetcher::{FetchError, FetchOptions, Fetcher};
pub use platform::Platform;
pub use state::State;

// Re-export blockdev crate for internal use
pub(crate) use ignition_blockdev as blockdev;
