//! Freestanding support library: port I/O, CPU intrinsics, kernel logging.

#![no_std]
#![forbid(unsafe_op_in_unsafe_fn)]

#[cfg(test)]
extern crate std;

pub mod cpu {
    use core::arch::asm;

    #[inline(always)]
    pub fn hlt() {
        unsafe {
            asm!("hlt", options(nomem, nostack, preserves_flags));
        }
    }

    #[inline(always)]
    pub fn halt_loop() -> ! {
        loop {
            hlt();
        }
    }
}

pub mod init_flag;
pub mod io;
pub mod klog;

pub use init_flag::InitFlag;
pub use klog::{klog_attach_serial, klog_get_level, klog_init, klog_set_level, KlogLevel};

/// Fatal assertion: the condition is required for the kernel to continue.
///
/// Failure is a panic, so the panic handler owns the report-and-halt path.
#[macro_export]
macro_rules! kassert {
    ($cond:expr, $($arg:tt)*) => {
        if !($cond) {
            panic!($($arg)*);
        }
    };
}
