//! x86_64 hardware definitions.
//!
//! Raw integer constants are wrapped in newtypes where mixing them up would
//! be easy: `Port(u16)` for I/O port addresses, plain constants for register
//! offsets within a device's own address space.

pub mod pci;
pub mod ports;

pub use ports::Port;
