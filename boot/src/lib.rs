#![no_std]
#![forbid(unsafe_op_in_unsafe_fn)]

#[cfg(test)]
extern crate std;

pub mod bringup;
pub mod multiboot;

pub use multiboot::{InfoFlags, MemoryMap, MmapEntry, MultibootInfo, RegionKind};
