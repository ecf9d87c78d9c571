//! PCI configuration space access and function enumeration.
//!
//! Access uses the legacy type 1 mechanism: write an encoded address to port
//! 0xCF8, then move a dword through port 0xCFC. Configuration space is
//! dword-granular at the protocol level, so the word and byte readers always
//! fetch a full dword and extract the requested slice; they never issue
//! narrower port I/O.

use ehciboot_abi::arch::x86_64::pci::*;
use ehciboot_abi::arch::x86_64::ports::{PCI_CONFIG_ADDRESS, PCI_CONFIG_DATA};
use ehciboot_lib::io;
use spin::Mutex;

/// Raw dword port I/O, the only primitive configuration access needs.
///
/// The kernel drives real ports through [`HwPortIo`]; tests substitute a
/// simulated bus.
pub trait PortIo {
    fn out_dword(&mut self, port: u16, value: u32);
    fn in_dword(&mut self, port: u16) -> u32;
}

impl<P: PortIo + ?Sized> PortIo for &mut P {
    fn out_dword(&mut self, port: u16, value: u32) {
        (**self).out_dword(port, value)
    }

    fn in_dword(&mut self, port: u16) -> u32 {
        (**self).in_dword(port)
    }
}

/// Port I/O against the machine.
pub struct HwPortIo;

impl PortIo for HwPortIo {
    #[inline(always)]
    fn out_dword(&mut self, port: u16, value: u32) {
        unsafe { io::Port::<u32>::new(port).write(value) }
    }

    #[inline(always)]
    fn in_dword(&mut self, port: u16) -> u32 {
        unsafe { io::Port::<u32>::new(port).read() }
    }
}

/// Encode a function address and register offset into the configuration
/// address dword.
///
/// Device, function and offset are truncated to their field widths rather
/// than rejected; the port itself would ignore the excess bits anyway. The
/// low two offset bits are always cleared, keeping the address dword-aligned.
#[inline]
pub const fn config_address(address: PciFunctionAddress, offset: u8) -> u32 {
    (1u32 << PCI_CONFIG_ENABLE_BIT)
        | ((address.bus as u32) << PCI_CONFIG_BUS_SHIFT)
        | (((address.device & PCI_CONFIG_DEVICE_MASK) as u32) << PCI_CONFIG_DEVICE_SHIFT)
        | (((address.function & PCI_CONFIG_FUNCTION_MASK) as u32) << PCI_CONFIG_FUNCTION_SHIFT)
        | ((offset & PCI_CONFIG_OFFSET_MASK) as u32)
}

/// Configuration space accessor for one port I/O backend.
pub struct ConfigSpace<P: PortIo> {
    ports: P,
}

impl<P: PortIo> ConfigSpace<P> {
    pub const fn new(ports: P) -> Self {
        Self { ports }
    }

    pub fn read_dword(&mut self, address: PciFunctionAddress, offset: u8) -> u32 {
        self.ports
            .out_dword(PCI_CONFIG_ADDRESS, config_address(address, offset));
        self.ports.in_dword(PCI_CONFIG_DATA)
    }

    pub fn write_dword(&mut self, address: PciFunctionAddress, offset: u8, value: u32) {
        self.ports
            .out_dword(PCI_CONFIG_ADDRESS, config_address(address, offset));
        self.ports.out_dword(PCI_CONFIG_DATA, value);
    }

    /// Read the word at `offset`, which selects the low or high half of the
    /// containing dword.
    pub fn read_word(&mut self, address: PciFunctionAddress, offset: u8) -> u16 {
        let dword = self.read_dword(address, offset);
        (dword >> (8 * (offset & 0x2) as u32)) as u16
    }

    /// Read the byte at `offset`, one of the four bytes of the containing
    /// dword.
    pub fn read_byte(&mut self, address: PciFunctionAddress, offset: u8) -> u8 {
        let dword = self.read_dword(address, offset);
        (dword >> (8 * (offset & 0x3) as u32)) as u8
    }

    /// Read the discovery slice of a function's header.
    ///
    /// The vendor ID is probed first; a sentinel vendor means nothing
    /// responds there and the remaining fields are left zeroed.
    pub fn read_header_common(&mut self, address: PciFunctionAddress) -> PciHeaderCommon {
        let mut header = PciHeaderCommon::zeroed();

        header.vendor_id = self.read_word(address, PCI_VENDOR_ID_OFFSET);
        if header.vendor_id != PCI_VENDOR_ID_INVALID {
            header.device_id = self.read_word(address, PCI_DEVICE_ID_OFFSET);
            header.prog_if = self.read_byte(address, PCI_PROG_IF_OFFSET);
            header.subclass = self.read_byte(address, PCI_SUBCLASS_OFFSET);
            header.class_code = self.read_byte(address, PCI_CLASS_CODE_OFFSET);
            header.header_type = self.read_byte(address, PCI_HEADER_TYPE_OFFSET);
        }
        header
    }

    /// Read base address register `index` (0..=5). The index is not range
    /// checked; past 5 it addresses the header fields after the BAR block,
    /// as the hardware would.
    pub fn read_bar(&mut self, address: PciFunctionAddress, index: u8) -> u32 {
        self.read_dword(address, pci_bar_offset(index))
    }

    /// Write base address register `index` (0..=5), same index contract as
    /// [`ConfigSpace::read_bar`].
    pub fn write_bar(&mut self, address: PciFunctionAddress, index: u8, value: u32) {
        self.write_dword(address, pci_bar_offset(index), value)
    }

    /// Iterate over every populated function on the bus.
    pub fn functions(&mut self) -> FunctionIter<'_, P> {
        FunctionIter {
            config: self,
            address: FUNCTION_ADDRESS_END,
            header: PciHeaderCommon::absent(),
        }
    }
}

/// Cursor position one past the last bus, the enumerator's end marker.
const FUNCTION_ADDRESS_END: PciFunctionAddress = PciFunctionAddress::new(PCI_MAX_BUSES, 0, 0);

fn is_multifunction(header: &PciHeaderCommon) -> bool {
    header.is_present() && (header.header_type & PCI_HEADER_TYPE_MULTI_FUNCTION) != 0
}

fn address_at_end(address: PciFunctionAddress) -> bool {
    address.bus >= PCI_MAX_BUSES
}

/// Step the cursor to the next candidate slot.
///
/// Function 1..7 slots of a device are only candidates while the header just
/// read at that device was multifunction; otherwise the device index carries
/// immediately. The device index carries into the bus index at 32. From the
/// end marker the cursor wraps to (0, 0, 0), which doubles as the entry
/// transition of a fresh scan.
fn advance_address(address: &mut PciFunctionAddress, multifunction: bool) {
    if address_at_end(*address) {
        *address = PciFunctionAddress::new(0, 0, 0);
        return;
    }

    address.function += 1;
    if address.function >= PCI_MAX_FUNCTIONS || !multifunction {
        address.function = 0;

        address.device += 1;
        if address.device >= PCI_MAX_DEVICES_PER_BUS {
            address.device = 0;

            address.bus += 1;
        }
    }
}

/// Walks the (bus, device, function) space in ascending order, yielding each
/// populated function with its common header.
///
/// The header of the slot just probed feeds the next advance step: only a
/// present function 0 with the multifunction bit set opens up functions 1-7
/// of its device. Headers are read live from the bus at every step, never
/// cached. A completely empty bus exhausts immediately, which is a normal
/// outcome rather than an error.
///
/// Calling `next` again after exhaustion wraps the cursor and starts a fresh
/// scan; the iterator is intentionally not fused, matching the cursor's wrap
/// transition.
pub struct FunctionIter<'a, P: PortIo> {
    config: &'a mut ConfigSpace<P>,
    address: PciFunctionAddress,
    header: PciHeaderCommon,
}

impl<P: PortIo> Iterator for FunctionIter<'_, P> {
    type Item = (PciFunctionAddress, PciHeaderCommon);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let multifunction = is_multifunction(&self.header);
            advance_address(&mut self.address, multifunction);

            if address_at_end(self.address) {
                self.header = PciHeaderCommon::absent();
                return None;
            }

            self.header = self.config.read_header_common(self.address);
            if self.header.is_present() {
                return Some((self.address, self.header));
            }
        }
    }
}

static CONFIG_SPACE: Mutex<ConfigSpace<HwPortIo>> = Mutex::new(ConfigSpace::new(HwPortIo));

/// Exclusive handle on the machine's configuration ports.
///
/// The address/data two-step is not atomic, so every hardware access funnels
/// through this one lock.
pub fn config_space() -> spin::MutexGuard<'static, ConfigSpace<HwPortIo>> {
    CONFIG_SPACE.lock()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::vec::Vec;

    /// Configuration space of a flat simulated bus. Functions are keyed by
    /// (bus, device, function) and carry a 64-byte register file; everything
    /// else reads back all-ones like a real empty slot.
    struct SimulatedBus {
        functions: BTreeMap<(u16, u8, u8), [u32; 16]>,
        latched: u32,
        address_writes: Vec<u32>,
        data_reads: usize,
    }

    impl SimulatedBus {
        fn new() -> Self {
            Self {
                functions: BTreeMap::new(),
                latched: 0,
                address_writes: Vec::new(),
                data_reads: 0,
            }
        }

        fn plug(&mut self, bus: u16, device: u8, function: u8, regs: [u32; 16]) {
            self.functions.insert((bus, device, function), regs);
        }

        fn decode(latched: u32) -> ((u16, u8, u8), usize) {
            let bus = ((latched >> PCI_CONFIG_BUS_SHIFT) & 0xFF) as u16;
            let device = ((latched >> PCI_CONFIG_DEVICE_SHIFT) & 0x1F) as u8;
            let function = ((latched >> PCI_CONFIG_FUNCTION_SHIFT) & 0x07) as u8;
            let reg = ((latched & 0xFC) >> 2) as usize;
            ((bus, device, function), reg)
        }
    }

    impl PortIo for SimulatedBus {
        fn out_dword(&mut self, port: u16, value: u32) {
            if port == PCI_CONFIG_ADDRESS {
                self.latched = value;
                self.address_writes.push(value);
            } else if port == PCI_CONFIG_DATA {
                let (key, reg) = Self::decode(self.latched);
                if let Some(regs) = self.functions.get_mut(&key) {
                    regs[reg] = value;
                }
            }
        }

        fn in_dword(&mut self, port: u16) -> u32 {
            if port != PCI_CONFIG_DATA {
                return 0xFFFF_FFFF;
            }
            self.data_reads += 1;
            let (key, reg) = Self::decode(self.latched);
            match self.functions.get(&key) {
                Some(regs) => regs[reg],
                None => 0xFFFF_FFFF,
            }
        }
    }

    fn header_regs(
        vendor_id: u16,
        device_id: u16,
        class_code: u8,
        subclass: u8,
        prog_if: u8,
        header_type: u8,
    ) -> [u32; 16] {
        let mut regs = [0u32; 16];
        regs[0] = (vendor_id as u32) | ((device_id as u32) << 16);
        regs[2] = ((prog_if as u32) << 8) | ((subclass as u32) << 16) | ((class_code as u32) << 24);
        regs[3] = (header_type as u32) << 16;
        regs
    }

    fn scan(bus: &mut SimulatedBus) -> Vec<(PciFunctionAddress, PciHeaderCommon)> {
        let mut config = ConfigSpace::new(bus);
        config.functions().collect()
    }

    #[test]
    fn encode_sets_enable_and_field_positions() {
        let encoded = config_address(PciFunctionAddress::new(0xAB, 0x1F, 0x07), 0xFC);
        assert_eq!(encoded, 0x8000_0000 | (0xAB << 16) | (0x1F << 11) | (0x07 << 8) | 0xFC);
    }

    #[test]
    fn encode_truncates_out_of_range_fields() {
        // Device 0x25 -> 0x05, function 0x0A -> 0x02; encoding never errors.
        let masked = config_address(PciFunctionAddress::new(2, 0x25, 0x0A), 0x10);
        let plain = config_address(PciFunctionAddress::new(2, 0x05, 0x02), 0x10);
        assert_eq!(masked, plain);
    }

    #[test]
    fn encode_aligns_offset_down_to_dword() {
        let a = config_address(PciFunctionAddress::new(0, 0, 0), 0x0D);
        let b = config_address(PciFunctionAddress::new(0, 0, 0), 0x0C);
        assert_eq!(a, b);
        assert_eq!(a & 0x3, 0);
    }

    #[test]
    fn encode_round_trips_masked_triple() {
        for bus in [0u16, 1, 128, 255] {
            for device in [0u8, 7, 31] {
                for function in [0u8, 3, 7] {
                    let encoded = config_address(
                        PciFunctionAddress::new(bus, device, function),
                        0x40,
                    );
                    let (key, reg) = SimulatedBus::decode(encoded);
                    assert_eq!(key, (bus, device, function));
                    assert_eq!(reg, 0x10);
                }
            }
        }
    }

    #[test]
    fn word_and_byte_reads_select_within_dword() {
        let mut bus = SimulatedBus::new();
        let mut regs = header_regs(0x1234, 0x5678, 0, 0, 0, 0);
        regs[1] = 0x4433_2211; // bytes b0..b3 = 11 22 33 44 at offset 0x04
        bus.plug(0, 0, 0, regs);
        let mut config = ConfigSpace::new(&mut bus);

        let addr = PciFunctionAddress::new(0, 0, 0);
        assert_eq!(config.read_word(addr, 0x04), 0x2211);
        assert_eq!(config.read_word(addr, 0x06), 0x4433);
        assert_eq!(config.read_byte(addr, 0x04), 0x11);
        assert_eq!(config.read_byte(addr, 0x05), 0x22);
        assert_eq!(config.read_byte(addr, 0x06), 0x33);
        assert_eq!(config.read_byte(addr, 0x07), 0x44);
    }

    #[test]
    fn narrow_reads_issue_full_dword_accesses() {
        let mut bus = SimulatedBus::new();
        bus.plug(0, 0, 0, header_regs(0x1234, 0x5678, 0, 0, 0, 0));
        let mut config = ConfigSpace::new(&mut bus);

        let addr = PciFunctionAddress::new(0, 0, 0);
        let _ = config.read_byte(addr, 0x06);
        let _ = config.read_word(addr, 0x02);
        // Both accesses latched a dword-aligned address.
        let mut writes = config.ports.address_writes.iter();
        assert_eq!(writes.next().copied(), Some(config_address(addr, 0x04)));
        assert_eq!(writes.next().copied(), Some(config_address(addr, 0x00)));
    }

    #[test]
    fn header_read_populates_fields() {
        let mut bus = SimulatedBus::new();
        bus.plug(0, 2, 0, header_regs(0x8086, 0x24CD, 0x0C, 0x03, 0x20, 0x00));
        let mut config = ConfigSpace::new(&mut bus);

        let header = config.read_header_common(PciFunctionAddress::new(0, 2, 0));
        assert_eq!(header.vendor_id, 0x8086);
        assert_eq!(header.device_id, 0x24CD);
        assert_eq!(header.class_code, 0x0C);
        assert_eq!(header.subclass, 0x03);
        assert_eq!(header.prog_if, 0x20);
        assert_eq!(header.header_type, 0x00);
    }

    #[test]
    fn absent_header_reads_single_dword_and_zeroes_rest() {
        let mut bus = SimulatedBus::new();
        let mut config = ConfigSpace::new(&mut bus);

        let header = config.read_header_common(PciFunctionAddress::new(3, 9, 1));
        assert_eq!(header, PciHeaderCommon::absent());
        // Only the vendor probe touched the bus.
        assert_eq!(config.ports.data_reads, 1);
    }

    #[test]
    fn empty_bus_exhausts_without_yielding() {
        let mut bus = SimulatedBus::new();
        let found = scan(&mut bus);
        assert!(found.is_empty());
        // One vendor probe per (bus, device) pair; functions 1-7 are never
        // candidates when function 0 is absent.
        assert_eq!(bus.data_reads, 256 * 32);
    }

    #[test]
    fn visits_slots_once_in_ascending_order() {
        let mut bus = SimulatedBus::new();
        bus.plug(0, 0, 0, header_regs(0x1111, 0x0001, 0, 0, 0, 0x80));
        bus.plug(0, 0, 1, header_regs(0x1111, 0x0002, 0, 0, 0, 0x00));
        bus.plug(0, 0, 2, header_regs(0x1111, 0x0003, 0, 0, 0, 0x00));
        bus.plug(0, 5, 0, header_regs(0x2222, 0x0001, 0, 0, 0, 0x00));
        bus.plug(1, 0, 0, header_regs(0x3333, 0x0001, 0, 0, 0, 0x80));
        bus.plug(1, 0, 6, header_regs(0x3333, 0x0002, 0, 0, 0, 0x00));
        let found = scan(&mut bus);

        let addresses: Vec<_> = found.iter().map(|(a, _)| *a).collect();
        for pair in addresses.windows(2) {
            assert!(pair[0] < pair[1], "visit order not strictly increasing");
        }
    }

    #[test]
    fn full_scan_terminates_within_slot_budget() {
        let mut bus = SimulatedBus::new();
        // Worst case: every device claims to be multifunction and populates
        // all eight functions.
        for device in 0..32u8 {
            for function in 0..8u8 {
                bus.plug(0, device, function, header_regs(0x1AF4, 0x1000, 0, 0, 0, 0x80));
            }
        }
        let found = scan(&mut bus);
        assert_eq!(found.len(), 32 * 8);
        // Probe count stays within the 256*32*8 candidate-slot bound.
        assert!(bus.data_reads <= 65_536 * 6);
    }

    #[test]
    fn single_function_device_skips_functions_1_to_7() {
        let mut bus = SimulatedBus::new();
        // header_type bit 7 clear: functions 1-7 must never be probed even
        // though slots respond there.
        for function in 0..8u8 {
            bus.plug(0, 3, function, header_regs(0x4444, 0x0001, 0, 0, 0, 0x00));
        }
        bus.plug(0, 4, 0, header_regs(0x5555, 0x0001, 0, 0, 0, 0x00));
        let found = scan(&mut bus);

        let addresses: Vec<_> = found.iter().map(|(a, _)| *a).collect();
        assert_eq!(
            addresses,
            [
                PciFunctionAddress::new(0, 3, 0),
                PciFunctionAddress::new(0, 4, 0),
            ]
        );
    }

    #[test]
    fn multifunction_with_absent_upper_functions_advances_cleanly() {
        let mut bus = SimulatedBus::new();
        bus.plug(0, 1, 0, header_regs(0x6666, 0x0001, 0, 0, 0, 0x80));
        bus.plug(0, 2, 0, header_regs(0x7777, 0x0001, 0, 0, 0, 0x00));
        let found = scan(&mut bus);

        let addresses: Vec<_> = found.iter().map(|(a, _)| *a).collect();
        assert_eq!(
            addresses,
            [
                PciFunctionAddress::new(0, 1, 0),
                PciFunctionAddress::new(0, 2, 0),
            ]
        );
    }

    #[test]
    fn multifunction_device_yields_each_function() {
        let mut bus = SimulatedBus::new();
        bus.plug(0, 7, 0, header_regs(0x8888, 0x0001, 0, 0, 0, 0x80));
        bus.plug(0, 7, 1, header_regs(0x8888, 0x0002, 0, 0, 0, 0x00));
        bus.plug(0, 7, 2, header_regs(0x8888, 0x0003, 0, 0, 0, 0x00));
        let found = scan(&mut bus);

        let ids: Vec<_> = found.iter().map(|(_, h)| h.device_id).collect();
        assert_eq!(ids, [0x0001, 0x0002, 0x0003]);
    }

    #[test]
    fn device_with_absent_function_zero_has_no_functions() {
        let mut bus = SimulatedBus::new();
        // Function 1 responds but function 0 does not: the device is treated
        // as empty and the scan moves on.
        bus.plug(0, 9, 1, header_regs(0x9999, 0x0001, 0, 0, 0, 0x00));
        bus.plug(0, 10, 0, header_regs(0xAAAA, 0x0001, 0, 0, 0, 0x00));
        let found = scan(&mut bus);

        let addresses: Vec<_> = found.iter().map(|(a, _)| *a).collect();
        assert_eq!(addresses, [PciFunctionAddress::new(0, 10, 0)]);
    }

    #[test]
    fn usb_controller_scenario_yields_once_then_exhausts() {
        let mut bus = SimulatedBus::new();
        let mut regs = header_regs(0x8086, 0x24CD, 0x0C, 0x03, 0x20, 0x00);
        for (i, bar) in [0xFEBC_0000u32, 0, 0, 0, 0, 0x0000_C001].iter().enumerate() {
            regs[4 + i] = *bar;
        }
        bus.plug(0, 0, 0, regs);
        let mut config = ConfigSpace::new(&mut bus);

        let mut iter = config.functions();
        let (addr, header) = iter.next().expect("controller not found");
        assert_eq!(addr, PciFunctionAddress::new(0, 0, 0));
        assert_eq!(header.vendor_id, 0x8086);
        assert_eq!(header.device_id, 0x24CD);
        assert_eq!(iter.next(), None);

        assert_eq!(config.read_bar(addr, 0), 0xFEBC_0000);
        assert_eq!(config.read_bar(addr, 5), 0x0000_C001);

        // The six BAR reads latched offsets 0x10, 0x14, .. 0x24.
        config.ports.address_writes.clear();
        for index in 0..6u8 {
            let _ = config.read_bar(addr, index);
        }
        let offsets: Vec<u32> = config
            .ports
            .address_writes
            .iter()
            .map(|a| a & 0xFC)
            .collect();
        assert_eq!(offsets, [0x10, 0x14, 0x18, 0x1C, 0x20, 0x24]);
    }

    #[test]
    fn write_bar_updates_register() {
        let mut bus = SimulatedBus::new();
        bus.plug(0, 0, 0, header_regs(0x8086, 0x24CD, 0x0C, 0x03, 0x20, 0x00));
        let mut config = ConfigSpace::new(&mut bus);

        let addr = PciFunctionAddress::new(0, 0, 0);
        config.write_bar(addr, 2, 0xDEAD_BEE0);
        assert_eq!(config.read_bar(addr, 2), 0xDEAD_BEE0);
    }
}
