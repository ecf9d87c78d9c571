//! Bring-up sequence: report the memory map, walk the PCI bus and locate the
//! USB controller this kernel exists to find.
//!
//! Everything here is generic over the terminal sink and the port I/O
//! backend, so the whole sequence runs against a simulated machine in tests.

use core::fmt::{self, Write};

use ehciboot_abi::arch::x86_64::pci::{
    PciFunctionAddress, PciHeaderCommon, PCI_DEVICE_ID_ICH4_EHCI, PCI_MAX_BARS,
    PCI_VENDOR_ID_INTEL,
};
use ehciboot_drivers::pci::{ConfigSpace, PortIo};
use ehciboot_lib::{kassert, klog_info};

use crate::multiboot::MemoryMap;

const USB_CONTROLLER_NAME: &str = "Intel 82801DB/DBM (ICH4/ICH4-M) USB2 EHCI Controller";

/// Render the bootloader's memory map.
pub fn print_memory_map<W: Write>(terminal: &mut W, map: &MemoryMap<'_>) -> fmt::Result {
    writeln!(terminal, "Memory map length: {}", map.byte_len())?;
    writeln!(terminal, "Memory map:")?;
    writeln!(
        terminal,
        "  BaseAddrHigh  BaseAddrLow  LengthHigh  LengthLow   Type"
    )?;

    for entry in map.entries() {
        writeln!(
            terminal,
            "  {:#010x}    {:#010x}   {:#010x}  {:#010x}  {}",
            (entry.base_addr >> 32) as u32,
            entry.base_addr as u32,
            (entry.length >> 32) as u32,
            entry.length as u32,
            entry.kind.name(),
        )?;
    }
    Ok(())
}

fn print_header_common<W: Write>(terminal: &mut W, header: &PciHeaderCommon) -> fmt::Result {
    writeln!(
        terminal,
        "  {:#010x} {:#010x} {:#010x} {:#010x} {:#010x}",
        header.vendor_id, header.device_id, header.class_code, header.subclass, header.prog_if,
    )
}

/// Walk every populated PCI function, printing one line per function, and
/// return the position of the USB controller if it was seen.
pub fn scan_for_usb_controller<W: Write, P: PortIo>(
    terminal: &mut W,
    config: &mut ConfigSpace<P>,
) -> Result<Option<(PciFunctionAddress, PciHeaderCommon)>, fmt::Error> {
    writeln!(terminal)?;
    writeln!(terminal, "PCI devices:")?;
    writeln!(
        terminal,
        "  VendorID   DeviceID   Class      Subclass   ProgIF"
    )?;

    let mut controller = None;
    for (address, header) in config.functions() {
        print_header_common(terminal, &header)?;
        klog_info!(
            "PCI: [Bus {} Dev {} Func {}] VID={:#06x} DID={:#06x} Class={:#04x}:{:02x} ProgIF={:#04x}",
            address.bus,
            address.device,
            address.function,
            header.vendor_id,
            header.device_id,
            header.class_code,
            header.subclass,
            header.prog_if
        );

        if header.vendor_id == PCI_VENDOR_ID_INTEL && header.device_id == PCI_DEVICE_ID_ICH4_EHCI {
            controller = Some((address, header));
        }
    }
    writeln!(terminal)?;
    Ok(controller)
}

/// Report the found controller and dump its six base address registers.
pub fn report_usb_controller<W: Write, P: PortIo>(
    terminal: &mut W,
    config: &mut ConfigSpace<P>,
    address: PciFunctionAddress,
) -> fmt::Result {
    writeln!(terminal, "Found USB controller:")?;
    writeln!(terminal, "  name: {}", USB_CONTROLLER_NAME)?;
    writeln!(
        terminal,
        "  PCI:  bus={:#010x}  device={:#010x}  function={:#010x}",
        address.bus, address.device, address.function,
    )?;

    for index in 0..PCI_MAX_BARS {
        let value = config.read_bar(address, index);
        writeln!(terminal, "  BAR register {}: {:#010x}", index, value)?;
    }
    Ok(())
}

/// The whole bring-up sequence.
///
/// Absent devices and an empty bus are ordinary outcomes of the scan; the
/// one condition this kernel cannot continue without is the USB controller,
/// so its absence is a fatal assertion.
pub fn run<W: Write, P: PortIo>(
    terminal: &mut W,
    config: &mut ConfigSpace<P>,
    memory_map: Option<&MemoryMap<'_>>,
) -> Result<PciFunctionAddress, fmt::Error> {
    if let Some(map) = memory_map {
        print_memory_map(terminal, map)?;
    }

    let controller = scan_for_usb_controller(terminal, config)?;
    kassert!(controller.is_some(), "USB controller not found");
    let Some((address, _header)) = controller else {
        // kassert! diverges on the missing-controller path.
        unreachable!()
    };
    report_usb_controller(terminal, config, address)?;
    klog_info!(
        "Bring-up complete: USB controller at bus {} device {} function {}",
        address.bus,
        address.device,
        address.function
    );
    Ok(address)
}
