//! Multiboot v1 boot information.
//!
//! The bootloader leaves the physical address of its info structure in EBX;
//! the entry stub forwards it here. Only the pieces this kernel consumes are
//! modeled: the flags word and the memory map. The map is exposed as a
//! bounds-checked view over the buffer the bootloader filled in, so no raw
//! address arithmetic leaks past this module.

use core::slice;

bitflags::bitflags! {
    /// Validity bits of the multiboot info structure.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct InfoFlags: u32 {
        const MEMORY = 1 << 0;
        const BOOT_DEVICE = 1 << 1;
        const CMDLINE = 1 << 2;
        const MODULES = 1 << 3;
        const MEM_MAP = 1 << 6;
    }
}

/// The multiboot information structure, as laid out by the bootloader.
#[repr(C, packed)]
pub struct MultibootInfo {
    flags: u32,
    _reserved: [u8; 40],
    mmap_length: u32,
    mmap_addr: u32,
}

impl MultibootInfo {
    /// # Safety
    /// `addr` must be the info-structure address handed over by a multiboot
    /// compliant bootloader, still identity-accessible.
    pub unsafe fn from_addr(addr: u32) -> &'static Self {
        unsafe { &*(addr as usize as *const Self) }
    }

    pub fn flags(&self) -> InfoFlags {
        InfoFlags::from_bits_truncate(self.flags)
    }

    pub fn mmap_length(&self) -> u32 {
        self.mmap_length
    }

    pub fn mmap_addr(&self) -> u32 {
        self.mmap_addr
    }

    /// Bounds-checked view over the memory map buffer, if the bootloader
    /// provided one.
    ///
    /// # Safety
    /// The mmap buffer named by the info structure must be identity
    /// accessible and unaliased for the lifetime of the view.
    pub unsafe fn memory_map(&self) -> Option<MemoryMap<'static>> {
        if !self.flags().contains(InfoFlags::MEM_MAP) {
            return None;
        }
        let bytes = unsafe {
            slice::from_raw_parts(
                self.mmap_addr as usize as *const u8,
                self.mmap_length as usize,
            )
        };
        Some(MemoryMap::new(bytes))
    }
}

/// BIOS address-range type codes, with their ACPI address-range names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegionKind {
    Memory,
    Reserved,
    Acpi,
    Nvs,
    Unusable,
    Undefined(u32),
}

impl RegionKind {
    fn from_raw(raw: u32) -> Self {
        match raw {
            1 => RegionKind::Memory,
            2 => RegionKind::Reserved,
            3 => RegionKind::Acpi,
            4 => RegionKind::Nvs,
            5 => RegionKind::Unusable,
            other => RegionKind::Undefined(other),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RegionKind::Memory => "AddressRangeMemory",
            RegionKind::Reserved => "AddressRangeReserved",
            RegionKind::Acpi => "AddressRangeACPI",
            RegionKind::Nvs => "AddressRangeNVS",
            RegionKind::Unusable => "AddressRangeUnusable",
            RegionKind::Undefined(_) => "Undefined",
        }
    }
}

/// One memory map entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MmapEntry {
    pub base_addr: u64,
    pub length: u64,
    pub kind: RegionKind,
}

/// Bounds-checked view over the memory map buffer.
///
/// Entries are variable-stride: each one names its own size and the walk
/// advances by it. A zero or short stride
/// terminates the walk instead of looping or running off the buffer.
#[derive(Clone, Copy)]
pub struct MemoryMap<'a> {
    bytes: &'a [u8],
}

/// Fixed part of an entry: size, base low/high, length low/high, type.
const MMAP_ENTRY_BYTES: usize = 24;

impl<'a> MemoryMap<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    pub fn entries(&self) -> MmapEntries<'a> {
        MmapEntries {
            bytes: self.bytes,
            offset: 0,
        }
    }
}

pub struct MmapEntries<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl MmapEntries<'_> {
    fn read_u32(&self, at: usize) -> u32 {
        let bytes = &self.bytes[at..at + 4];
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

impl Iterator for MmapEntries<'_> {
    type Item = MmapEntry;

    fn next(&mut self) -> Option<MmapEntry> {
        if self.offset.checked_add(MMAP_ENTRY_BYTES)? > self.bytes.len() {
            return None;
        }

        let entry_size = self.read_u32(self.offset) as usize;
        let base_low = self.read_u32(self.offset + 4);
        let base_high = self.read_u32(self.offset + 8);
        let length_low = self.read_u32(self.offset + 12);
        let length_high = self.read_u32(self.offset + 16);
        let kind = RegionKind::from_raw(self.read_u32(self.offset + 20));

        if entry_size < MMAP_ENTRY_BYTES {
            // A malformed stride would stall or overrun the walk.
            self.offset = self.bytes.len();
            return None;
        }
        self.offset += entry_size;

        Some(MmapEntry {
            base_addr: (u64::from(base_high) << 32) | u64::from(base_low),
            length: (u64::from(length_high) << 32) | u64::from(length_low),
            kind,
        })
    }
}
