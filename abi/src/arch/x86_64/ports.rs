//! x86 I/O port addresses.
//!
//! A type-safe `Port` newtype groups every port address the kernel touches,
//! so no other `u16` can be mistaken for one.

/// x86 I/O port address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Port(pub u16);

impl Port {
    // =========================================================================
    // Serial (8250/16550 UART)
    // =========================================================================

    /// COM1 serial port base address.
    pub const COM1: Self = Self(0x3F8);

    /// COM2 serial port base address.
    pub const COM2: Self = Self(0x2F8);

    // =========================================================================
    // PCI Configuration (Type 1)
    // =========================================================================

    /// PCI configuration address port.
    pub const PCI_CONFIG_ADDRESS: Self = Self(0xCF8);

    /// PCI configuration data port.
    pub const PCI_CONFIG_DATA: Self = Self(0xCFC);

    // =========================================================================
    // Debug Ports
    // =========================================================================

    /// POST diagnostic port, written for a cheap I/O delay.
    pub const POST_DELAY: Self = Self(0x80);

    // =========================================================================
    // Methods
    // =========================================================================

    /// Raw port number for IN/OUT instructions.
    #[inline]
    pub const fn number(self) -> u16 {
        self.0
    }

    /// Port at `self + off` (e.g. a UART register relative to a COM base).
    #[inline]
    pub const fn offset(self, off: u16) -> Self {
        Self(self.0 + off)
    }

    #[inline]
    pub const fn new(addr: u16) -> Self {
        Self(addr)
    }
}

// =============================================================================
// Raw Port Address Constants
// =============================================================================

pub const COM1_BASE: u16 = Port::COM1.0;
pub const PCI_CONFIG_ADDRESS: u16 = Port::PCI_CONFIG_ADDRESS.0;
pub const PCI_CONFIG_DATA: u16 = Port::PCI_CONFIG_DATA.0;
