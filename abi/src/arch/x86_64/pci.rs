//! PCI configuration space definitions.
//!
//! Register offsets, the legacy type 1 address encoding, header flags and
//! the bus topology limits. The access mechanism itself lives in
//! `ehciboot-drivers`; this module only names the numbers it speaks.

// =============================================================================
// Configuration Space Register Offsets
// =============================================================================

/// Vendor ID register offset (16-bit).
pub const PCI_VENDOR_ID_OFFSET: u8 = 0x00;

/// Device ID register offset (16-bit).
pub const PCI_DEVICE_ID_OFFSET: u8 = 0x02;

/// Programming Interface offset (8-bit).
pub const PCI_PROG_IF_OFFSET: u8 = 0x09;

/// Subclass register offset (8-bit).
pub const PCI_SUBCLASS_OFFSET: u8 = 0x0A;

/// Class Code register offset (8-bit).
pub const PCI_CLASS_CODE_OFFSET: u8 = 0x0B;

/// Header Type register offset (8-bit).
pub const PCI_HEADER_TYPE_OFFSET: u8 = 0x0E;

/// Base Address Register 0 offset.
pub const PCI_BAR0_OFFSET: u8 = 0x10;

/// Byte offset of BAR `index` within a type 0 header.
///
/// Deliberately unchecked: an index past 5 addresses whatever header field
/// sits after the BAR block, exactly as the hardware would.
#[inline]
pub const fn pci_bar_offset(index: u8) -> u8 {
    PCI_BAR0_OFFSET.wrapping_add(index.wrapping_mul(4))
}

// =============================================================================
// Type 1 Configuration Address Encoding
// =============================================================================

/// Enable bit (bit 31) of the configuration address dword.
pub const PCI_CONFIG_ENABLE_BIT: u32 = 31;

/// Bus number field position (bits 23-16).
pub const PCI_CONFIG_BUS_SHIFT: u32 = 16;

/// Device number field position (bits 15-11).
pub const PCI_CONFIG_DEVICE_SHIFT: u32 = 11;

/// Function number field position (bits 10-8).
pub const PCI_CONFIG_FUNCTION_SHIFT: u32 = 8;

/// Device numbers occupy 5 bits.
pub const PCI_CONFIG_DEVICE_MASK: u8 = 0x1F;

/// Function numbers occupy 3 bits.
pub const PCI_CONFIG_FUNCTION_MASK: u8 = 0x07;

/// Register offsets occupy bits 7-2; the low two bits are always clear
/// because configuration space is addressed in dwords.
pub const PCI_CONFIG_OFFSET_MASK: u8 = 0xFC;

// =============================================================================
// Header Type Flags
// =============================================================================

/// Multi-function device flag (bit 7 of the header type byte).
pub const PCI_HEADER_TYPE_MULTI_FUNCTION: u8 = 0x80;

// =============================================================================
// Limits and Sentinels
// =============================================================================

/// Number of addressable buses.
pub const PCI_MAX_BUSES: u16 = 256;

/// Number of devices per bus.
pub const PCI_MAX_DEVICES_PER_BUS: u8 = 32;

/// Number of functions per device.
pub const PCI_MAX_FUNCTIONS: u8 = 8;

/// Number of BARs in a type 0 header.
pub const PCI_MAX_BARS: u8 = 6;

/// Vendor ID read back when no function responds at an address.
pub const PCI_VENDOR_ID_INVALID: u16 = 0xFFFF;

// =============================================================================
// Known Vendor/Device IDs
// =============================================================================

/// Intel vendor ID.
pub const PCI_VENDOR_ID_INTEL: u16 = 0x8086;

/// Intel 82801DB/DBM (ICH4/ICH4-M) USB2 EHCI controller device ID.
pub const PCI_DEVICE_ID_ICH4_EHCI: u16 = 0x24CD;

// =============================================================================
// Data Types
// =============================================================================

/// Position of one PCI function on the bus topology.
///
/// The bus field is `u16` so the enumerator can park the cursor one past the
/// last bus as its end marker. Values outside the field widths are masked
/// down when encoded into a configuration address, never rejected.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct PciFunctionAddress {
    pub bus: u16,
    pub device: u8,
    pub function: u8,
}

impl PciFunctionAddress {
    #[inline]
    pub const fn new(bus: u16, device: u8, function: u8) -> Self {
        Self {
            bus,
            device,
            function,
        }
    }
}

/// The slice of a function's configuration header needed for discovery.
///
/// `vendor_id == PCI_VENDOR_ID_INVALID` means no function answered; the
/// remaining fields are only meaningful when the vendor is valid.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PciHeaderCommon {
    pub vendor_id: u16,
    pub device_id: u16,
    pub prog_if: u8,
    pub subclass: u8,
    pub class_code: u8,
    pub header_type: u8,
}

impl PciHeaderCommon {
    pub const fn zeroed() -> Self {
        Self {
            vendor_id: 0,
            device_id: 0,
            prog_if: 0,
            subclass: 0,
            class_code: 0,
            header_type: 0,
        }
    }

    /// Header state for an address where no function responds.
    pub const fn absent() -> Self {
        Self {
            vendor_id: PCI_VENDOR_ID_INVALID,
            device_id: 0,
            prog_if: 0,
            subclass: 0,
            class_code: 0,
            header_type: 0,
        }
    }

    #[inline]
    pub const fn is_present(&self) -> bool {
        self.vendor_id != PCI_VENDOR_ID_INVALID
    }
}
