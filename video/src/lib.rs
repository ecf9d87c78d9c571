#![no_std]
#![forbid(unsafe_op_in_unsafe_fn)]

#[cfg(test)]
extern crate std;

pub mod terminal;

pub use terminal::{ColorCode, Terminal, TextBuffer, VgaColor, VGA_HEIGHT, VGA_WIDTH};
