//! Time-animated effect bank applied to one source image per frame.
//!
//! The CPU bank in [`cpu`] is the reference; the wgpu backend runs the same program from
//! `effects.wgsl`.

pub mod backend;
pub mod catalog;
pub mod cpu;
#[cfg(feature = "gpu")]
pub mod gpu;
