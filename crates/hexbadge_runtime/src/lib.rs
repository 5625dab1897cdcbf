//! Host-side execution runtime for hexbadge firmware.
//!
//! Loads a compiled firmware module, drives its cooperative tick loop, exposes
//! the fixed host-import surface the firmware is compiled against, and bridges
//! the two IPC directions (host→guest input events, guest→host service calls)
//! across the linear-memory boundary.

pub mod engine;
pub mod error;
pub mod frame;
pub mod protocol;
pub mod timer;
