//! Kernel entry glue.
//!
//! The bootable build targets a bare-metal environment (`target_os = "none"`);
//! it carries the multiboot header, the entry stub and the panic handler.
//! Host builds get a stub `main` so the workspace builds and tests on a
//! development machine.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]
#![forbid(unsafe_op_in_unsafe_fn)]

#[cfg(target_os = "none")]
mod bare {
    use core::panic::PanicInfo;

    use ehciboot_boot::bringup;
    use ehciboot_boot::multiboot::MultibootInfo;
    use ehciboot_drivers::pci;
    use ehciboot_lib::{cpu, klog_attach_serial, klog_error, klog_info, klog_init};
    use ehciboot_video::{Terminal, TextBuffer};

    const MULTIBOOT_MAGIC: u32 = 0x1BAD_B002;
    // Page-align modules, provide memory info.
    const MULTIBOOT_FLAGS: u32 = 0x0000_0003;

    // Only ever read by the bootloader's header scan.
    #[allow(dead_code)]
    #[repr(C)]
    struct MultibootHeader {
        magic: u32,
        flags: u32,
        checksum: u32,
    }

    /// Scanned for by the bootloader in the first 8 KiB of the image.
    #[used]
    #[unsafe(link_section = ".multiboot")]
    static MULTIBOOT_HEADER: MultibootHeader = MultibootHeader {
        magic: MULTIBOOT_MAGIC,
        flags: MULTIBOOT_FLAGS,
        checksum: 0u32
            .wrapping_sub(MULTIBOOT_MAGIC)
            .wrapping_sub(MULTIBOOT_FLAGS),
    };

    // Entry stub: the bootloader leaves the info-structure address in EBX.
    #[cfg(target_arch = "x86")]
    core::arch::global_asm!(
        r#"
        .section .bss
        .align 16
        stack_bottom:
        .skip 16384
        stack_top:

        .section .text
        .global _start
        _start:
            mov esp, offset stack_top
            push ebx
            call kernel_main
        2:
            hlt
            jmp 2b
        "#
    );

    #[unsafe(no_mangle)]
    pub extern "C" fn kernel_main(multiboot_info_addr: u32) -> ! {
        klog_init();
        klog_attach_serial();
        klog_info!(
            "ehciboot: multiboot info structure at {:#010x}",
            multiboot_info_addr
        );

        let mut terminal = Terminal::new(unsafe { TextBuffer::vga() });

        let info = unsafe { MultibootInfo::from_addr(multiboot_info_addr) };
        klog_info!(
            "ehciboot: memory map at {:#010x}, {} bytes",
            info.mmap_addr(),
            info.mmap_length()
        );
        let memory_map = unsafe { info.memory_map() };

        let mut config = pci::config_space();
        if bringup::run(&mut terminal, &mut config, memory_map.as_ref()).is_err() {
            klog_error!("terminal write failed during bring-up");
        }

        cpu::halt_loop()
    }

    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        klog_error!("Kernel panic: {}", info);
        cpu::halt_loop()
    }
}

#[cfg(not(target_os = "none"))]
fn main() {
    println!("kernel: freestanding image; build with a bare-metal target to boot it");
}
