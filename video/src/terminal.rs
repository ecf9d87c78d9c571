//! VGA text-mode terminal.
//!
//! The terminal is an explicit object owning its cursor position, color and
//! buffer view; callers hold it and pass it around instead of reaching for
//! ambient globals. The cell buffer is a bounds-checked view constructed
//! once over the hardware region at init (or over a plain array in tests).

use core::fmt;
use core::marker::PhantomData;
use core::ptr;

pub const VGA_WIDTH: usize = 80;
pub const VGA_HEIGHT: usize = 25;
pub const VGA_CELLS: usize = VGA_WIDTH * VGA_HEIGHT;

const VGA_BASE_ADDRESS: usize = 0xB8000;

/// Hardware text mode colors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum VgaColor {
    Black = 0,
    Blue = 1,
    Green = 2,
    Cyan = 3,
    Red = 4,
    Magenta = 5,
    Brown = 6,
    LightGrey = 7,
    DarkGrey = 8,
    LightBlue = 9,
    LightGreen = 10,
    LightCyan = 11,
    LightRed = 12,
    LightMagenta = 13,
    LightBrown = 14,
    White = 15,
}

/// Foreground/background attribute byte of a text cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct ColorCode(u8);

impl ColorCode {
    pub const fn new(foreground: VgaColor, background: VgaColor) -> Self {
        Self((foreground as u8) | ((background as u8) << 4))
    }

    const fn entry(self, byte: u8) -> u16 {
        (byte as u16) | ((self.0 as u16) << 8)
    }
}

impl Default for ColorCode {
    fn default() -> Self {
        Self::new(VgaColor::LightGrey, VgaColor::Black)
    }
}

/// Bounds-checked view over the 80x25 cell region.
///
/// Cells are accessed with volatile loads and stores since the backing
/// memory is hardware-mapped in the kernel; every access asserts the index
/// against the cell count, so no raw address arithmetic escapes this type.
pub struct TextBuffer<'a> {
    cells: *mut u16,
    _backing: PhantomData<&'a mut [u16]>,
}

impl<'a> TextBuffer<'a> {
    /// View over a caller-provided cell array (tests, double buffering).
    pub fn new(cells: &'a mut [u16; VGA_CELLS]) -> Self {
        Self {
            cells: cells.as_mut_ptr(),
            _backing: PhantomData,
        }
    }

    /// View over the VGA hardware region at 0xB8000.
    ///
    /// # Safety
    /// The caller must be running with the legacy VGA text region identity
    /// accessible, and must construct at most one view over it.
    pub unsafe fn vga() -> TextBuffer<'static> {
        TextBuffer {
            cells: VGA_BASE_ADDRESS as *mut u16,
            _backing: PhantomData,
        }
    }

    #[inline]
    fn write_cell(&mut self, index: usize, entry: u16) {
        assert!(index < VGA_CELLS);
        unsafe { ptr::write_volatile(self.cells.add(index), entry) }
    }

    #[inline]
    fn read_cell(&self, index: usize) -> u16 {
        assert!(index < VGA_CELLS);
        unsafe { ptr::read_volatile(self.cells.add(index)) }
    }
}

/// Text terminal with scroll-on-newline semantics.
pub struct Terminal<'a> {
    row: usize,
    column: usize,
    color: ColorCode,
    buffer: TextBuffer<'a>,
}

impl<'a> Terminal<'a> {
    /// Take ownership of a buffer view and clear it.
    pub fn new(buffer: TextBuffer<'a>) -> Self {
        let mut terminal = Self {
            row: 0,
            column: 0,
            color: ColorCode::default(),
            buffer,
        };
        terminal.clear();
        terminal
    }

    pub fn set_color(&mut self, color: ColorCode) {
        self.color = color;
    }

    pub fn clear(&mut self) {
        for index in 0..VGA_CELLS {
            self.buffer.write_cell(index, self.color.entry(b' '));
        }
        self.row = 0;
        self.column = 0;
    }

    fn put_byte_at(&mut self, byte: u8, x: usize, y: usize) {
        self.buffer.write_cell(y * VGA_WIDTH + x, self.color.entry(byte));
    }

    /// Write one byte at the cursor.
    ///
    /// A plain byte wraps the column at the right edge and the row back to
    /// the top of the screen; a newline resets the column and scrolls the
    /// screen up one line once the cursor sits on the bottom row.
    pub fn put_byte(&mut self, byte: u8) {
        if byte != b'\n' {
            self.put_byte_at(byte, self.column, self.row);
            self.column += 1;
            if self.column == VGA_WIDTH {
                self.column = 0;
                self.row += 1;
                if self.row == VGA_HEIGHT {
                    self.row = 0;
                }
            }
            return;
        }

        self.column = 0;
        self.row += 1;
        if self.row == VGA_HEIGHT {
            self.row -= 1;
            self.scroll_up();
        }
    }

    fn scroll_up(&mut self) {
        for y in 0..(VGA_HEIGHT - 1) {
            for x in 0..VGA_WIDTH {
                let index = y * VGA_WIDTH + x;
                let below = self.buffer.read_cell(index + VGA_WIDTH);
                self.buffer.write_cell(index, below);
            }
        }
        for x in 0..VGA_WIDTH {
            self.put_byte_at(b' ', x, self.row);
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.put_byte(byte);
        }
    }

    #[cfg(test)]
    fn cell(&self, x: usize, y: usize) -> u16 {
        self.buffer.read_cell(y * VGA_WIDTH + x)
    }
}

impl fmt::Write for Terminal<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_bytes(s.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write;

    const BLANK: u16 = 0x0720; // space, light grey on black

    fn backing() -> std::boxed::Box<[u16; VGA_CELLS]> {
        std::boxed::Box::new([0u16; VGA_CELLS])
    }

    #[test]
    fn new_clears_screen_to_blanks() {
        let mut cells = backing();
        let terminal = Terminal::new(TextBuffer::new(&mut cells));
        assert_eq!(terminal.cell(0, 0), BLANK);
        assert_eq!(terminal.cell(VGA_WIDTH - 1, VGA_HEIGHT - 1), BLANK);
    }

    #[test]
    fn bytes_land_at_cursor_with_color_attribute() {
        let mut cells = backing();
        let mut terminal = Terminal::new(TextBuffer::new(&mut cells));
        terminal.write_bytes(b"ok");
        assert_eq!(terminal.cell(0, 0), 0x0700 | u16::from(b'o'));
        assert_eq!(terminal.cell(1, 0), 0x0700 | u16::from(b'k'));
    }

    #[test]
    fn column_wraps_at_right_edge() {
        let mut cells = backing();
        let mut terminal = Terminal::new(TextBuffer::new(&mut cells));
        for _ in 0..VGA_WIDTH {
            terminal.put_byte(b'x');
        }
        terminal.put_byte(b'y');
        assert_eq!(terminal.cell(0, 1), 0x0700 | u16::from(b'y'));
    }

    #[test]
    fn newline_on_bottom_row_scrolls() {
        let mut cells = backing();
        let mut terminal = Terminal::new(TextBuffer::new(&mut cells));
        for i in 0..VGA_HEIGHT {
            let byte = b'a' + (i as u8);
            terminal.write_bytes(&[byte]);
            if i < VGA_HEIGHT - 1 {
                terminal.put_byte(b'\n');
            }
        }
        // Cursor sits on the bottom row; the next newline drops row 0.
        terminal.put_byte(b'\n');
        terminal.put_byte(b'z');
        assert_eq!(terminal.cell(0, 0), 0x0700 | u16::from(b'b'));
        assert_eq!(terminal.cell(0, VGA_HEIGHT - 1), 0x0700 | u16::from(b'z'));
        // The scrolled-in bottom row was blanked before the write.
        assert_eq!(terminal.cell(1, VGA_HEIGHT - 1), BLANK);
    }

    #[test]
    fn formatted_writes_render_hex() {
        let mut cells = backing();
        let mut terminal = Terminal::new(TextBuffer::new(&mut cells));
        write!(terminal, "{:#010x}", 0x24CDu32).unwrap();
        let expected = b"0x000024cd";
        for (x, byte) in expected.iter().enumerate() {
            assert_eq!(terminal.cell(x, 0), 0x0700 | u16::from(*byte));
        }
    }
}
