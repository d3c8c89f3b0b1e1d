//! Block device plumbing: probing filesystems, stable device aliases,
//! and serialized interaction with udev.

mod aliases;
pub use aliases::*;
mod blockdev;
pub use blockdev::*;
mod udev;
pub use udev::*;
