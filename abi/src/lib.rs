//! Hardware definitions shared across the ehciboot crates.
//!
//! Everything in here is a plain data type or constant: register offsets,
//! port addresses, field masks. No crate in the workspace defines its own
//! copy of a hardware number; they all come from this single source.

#![no_std]
#![forbid(unsafe_code)]

pub mod arch;

pub use arch::x86_64::ports::Port;
