//! Pure data types for plumb: pipe modes, status rows, command arguments.
//!
//! This crate is a leaf dependency with no async runtime and no I/O. It exists
//! so that dispatchers and remote clients can speak plumb's vocabulary without
//! pulling in the kernel's process and network machinery.

pub mod args;
pub mod error;
pub mod mode;
pub mod response;
pub mod status;
pub mod wire;

// Flat re-exports for convenience
pub use args::*;
pub use error::*;
pub use mode::*;
pub use response::*;
pub use status::*;
pub use wire::*;
