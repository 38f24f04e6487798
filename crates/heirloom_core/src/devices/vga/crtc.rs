/*
    Heirloom

    Copyright 2025-2026 The Heirloom Developers

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    devices::vga::crtc.rs

    The VGA CRT Controller register bank.

*/

use super::*;

pub const CRTC_REGISTERS: usize = 25;

pub const CRTC_HORIZONTAL_TOTAL: usize = 0x00;
pub const CRTC_HORIZONTAL_DISPLAY_END: usize = 0x01;
pub const CRTC_VERTICAL_TOTAL: usize = 0x06;
pub const CRTC_OVERFLOW: usize = 0x07;
pub const CRTC_MAXIMUM_SCANLINE: usize = 0x09;
pub const CRTC_CURSOR_START: usize = 0x0A;
pub const CRTC_CURSOR_END: usize = 0x0B;
pub const CRTC_START_ADDRESS_HI: usize = 0x0C;
pub const CRTC_START_ADDRESS_LO: usize = 0x0D;
pub const CRTC_CURSOR_ADDRESS_HI: usize = 0x0E;
pub const CRTC_CURSOR_ADDRESS_LO: usize = 0x0F;
pub const CRTC_VERTICAL_RETRACE_START: usize = 0x10;
pub const CRTC_VERTICAL_RETRACE_END: usize = 0x11;
pub const CRTC_VERTICAL_DISPLAY_END: usize = 0x12;
pub const CRTC_OFFSET: usize = 0x13;
pub const CRTC_UNDERLINE_LOCATION: usize = 0x14;
pub const CRTC_MODE_CONTROL: usize = 0x17;

const WRITE_PROTECT: u8 = 0b1000_0000;
/// Line compare bit 8 stays writable while registers 0-7 are protected.
const OVERFLOW_LINE_COMPARE: u8 = 0b0001_0000;

pub struct Crtc {
    address: u8,
    regs: [u8; CRTC_REGISTERS],
}

impl Default for Crtc {
    fn default() -> Self {
        Self {
            address: 0,
            regs: [0; CRTC_REGISTERS],
        }
    }
}

impl Crtc {
    pub fn read_address(&self) -> u8 {
        self.address
    }

    pub fn write_address(&mut self, byte: u8) {
        self.address = byte & 0x1F;
    }

    pub fn read_data(&self) -> u8 {
        self.regs.get(self.address as usize).copied().unwrap_or(0xFF)
    }

    /// Write the selected register. Returns whether anything changed.
    pub fn write_data(&mut self, byte: u8) -> bool {
        let index = self.address as usize;
        if index >= CRTC_REGISTERS {
            return false;
        }
        let old = self.regs[index];
        if index <= CRTC_OVERFLOW && self.regs[CRTC_VERTICAL_RETRACE_END] & WRITE_PROTECT != 0 {
            if index == CRTC_OVERFLOW {
                self.regs[index] = (old & !OVERFLOW_LINE_COMPARE) | (byte & OVERFLOW_LINE_COMPARE);
            }
        }
        else {
            self.regs[index] = byte;
        }
        self.regs[index] != old
    }

    #[inline]
    pub fn reg(&self, index: usize) -> u8 {
        self.regs.get(index).copied().unwrap_or(0)
    }

    pub fn horizontal_display_end(&self) -> u32 {
        self.regs[CRTC_HORIZONTAL_DISPLAY_END] as u32
    }

    pub fn horizontal_total(&self) -> u32 {
        self.regs[CRTC_HORIZONTAL_TOTAL] as u32 + 5
    }

    /// Vertical display end with overflow bits 8 and 9.
    pub fn vertical_display_end(&self) -> u32 {
        let overflow = self.regs[CRTC_OVERFLOW] as u32;
        self.regs[CRTC_VERTICAL_DISPLAY_END] as u32 | (overflow & 0x02) << 7 | (overflow & 0x40) << 3
    }

    pub fn vertical_total(&self) -> u32 {
        let overflow = self.regs[CRTC_OVERFLOW] as u32;
        (self.regs[CRTC_VERTICAL_TOTAL] as u32 | (overflow & 0x01) << 8 | (overflow & 0x20) << 4) + 2
    }

    pub fn vertical_retrace_start(&self) -> u32 {
        let overflow = self.regs[CRTC_OVERFLOW] as u32;
        self.regs[CRTC_VERTICAL_RETRACE_START] as u32 | (overflow & 0x04) << 6 | (overflow & 0x80) << 2
    }

    /// First line after the retrace. Only the low four bits are compared by the hardware.
    pub fn vertical_retrace_end(&self) -> u32 {
        let start = self.vertical_retrace_start();
        let mut end = (start & !0x0F) | (self.regs[CRTC_VERTICAL_RETRACE_END] & 0x0F) as u32;
        if end <= start {
            end += 0x10;
        }
        end
    }

    pub fn maximum_scanline(&self) -> u8 {
        self.regs[CRTC_MAXIMUM_SCANLINE] & 0x1F
    }

    pub fn double_scan(&self) -> bool {
        self.regs[CRTC_MAXIMUM_SCANLINE] & 0x80 != 0
    }

    pub fn start_address(&self) -> usize {
        (self.regs[CRTC_START_ADDRESS_HI] as usize) << 8 | self.regs[CRTC_START_ADDRESS_LO] as usize
    }

    pub fn cursor_address(&self) -> usize {
        (self.regs[CRTC_CURSOR_ADDRESS_HI] as usize) << 8 | self.regs[CRTC_CURSOR_ADDRESS_LO] as usize
    }

    /// Cursor scanlines, or None when the cursor is disabled.
    pub fn cursor_scanlines(&self) -> Option<(u8, u8)> {
        let start = self.regs[CRTC_CURSOR_START];
        if start & 0x20 != 0 {
            return None;
        }
        Some((start & 0x1F, self.regs[CRTC_CURSOR_END] & 0x1F))
    }

    pub fn offset(&self) -> usize {
        self.regs[CRTC_OFFSET] as usize
    }

    pub fn dword_mode(&self) -> bool {
        self.regs[CRTC_UNDERLINE_LOCATION] & 0x40 != 0
    }

    /// Word addressing, selected when mode control bit 6 is clear.
    pub fn word_mode(&self) -> bool {
        self.regs[CRTC_MODE_CONTROL] & 0x40 == 0
    }

    #[rustfmt::skip]
    pub fn dump(&self) -> String {
        let mut out = String::from("CRTC");
        for (i, reg) in self.regs.iter().enumerate() {
            if i % 8 == 0 {
                out.push_str(&format!("\n  {:02X}:", i));
            }
            out.push_str(&format!(" {:02X}", reg));
        }
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(crtc: &mut Crtc, index: u8, data: u8) -> bool {
        crtc.write_address(index);
        crtc.write_data(data)
    }

    #[test]
    fn test_write_protect() {
        let mut crtc = Crtc::default();
        write(&mut crtc, 0x00, 0x5F);
        write(&mut crtc, 0x07, 0x1F);
        write(&mut crtc, 0x11, 0x8E);

        assert!(!write(&mut crtc, 0x00, 0x2D));
        assert_eq!(crtc.reg(0x00), 0x5F);

        // Only the line compare bit of the overflow register gets through
        write(&mut crtc, 0x07, 0x00);
        assert_eq!(crtc.reg(0x07), 0x0F);

        // Registers above 7 are unaffected
        assert!(write(&mut crtc, 0x13, 0x28));

        write(&mut crtc, 0x11, 0x0E);
        write(&mut crtc, 0x00, 0x2D);
        assert_eq!(crtc.reg(0x00), 0x2D);
    }

    #[test]
    fn test_vertical_display_end_overflow() {
        let mut crtc = Crtc::default();
        write(&mut crtc, 0x12, 0xDF);
        write(&mut crtc, 0x07, 0x3E);
        assert_eq!(crtc.vertical_display_end() + 1, 480);
        write(&mut crtc, 0x12, 0x8F);
        write(&mut crtc, 0x07, 0x1F);
        assert_eq!(crtc.vertical_display_end() + 1, 400);
    }

    #[test]
    fn test_out_of_range_index() {
        let mut crtc = Crtc::default();
        crtc.write_address(0x19);
        assert_eq!(crtc.read_data(), 0xFF);
        assert!(!crtc.write_data(0x12));
    }
}
