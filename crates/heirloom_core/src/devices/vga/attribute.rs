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

    devices::vga::attribute.rs

    The VGA Attribute Controller.

*/

//! The Attribute Controller shares port 0x3C0 between its address and data registers. An
//! internal flip-flop picks which one a write goes to; reading input status 1 returns the
//! flip-flop to address mode.

use super::*;

pub const ATTRIBUTE_REGISTERS: usize = 0x15;

pub const AC_MODE_CONTROL: usize = 0x10;
pub const AC_OVERSCAN_COLOR: usize = 0x11;
pub const AC_COLOR_PLANE_ENABLE: usize = 0x12;
pub const AC_HORIZONTAL_PEL_PANNING: usize = 0x13;
pub const AC_COLOR_SELECT: usize = 0x14;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum AttributeFlipFlop {
    Address,
    Data,
}

#[bitfield]
#[derive(Copy, Clone)]
pub struct AModeControl {
    pub graphics: bool,
    pub monochrome: bool,
    pub line_graphics: bool,
    pub blink: bool,
    #[skip]
    unused: B1,
    pub pel_panning_compat: bool,
    pub color_8bit: bool,
    pub palette_bits_54_select: bool,
}

pub struct AttributeController {
    flip_flop: AttributeFlipFlop,
    address: u8,
    /// Palette address source. Clear while the palette is being loaded, which blanks the display.
    palette_source: bool,
    regs: [u8; ATTRIBUTE_REGISTERS],
}

impl Default for AttributeController {
    fn default() -> Self {
        Self {
            flip_flop: AttributeFlipFlop::Address,
            address: 0,
            palette_source: false,
            regs: [0; ATTRIBUTE_REGISTERS],
        }
    }
}

impl AttributeController {
    pub fn flip_flop(&self) -> AttributeFlipFlop {
        self.flip_flop
    }

    pub fn reset_flip_flop(&mut self) {
        self.flip_flop = AttributeFlipFlop::Address;
    }

    /// Read of 0x3C0. Returns the address register and leaves the flip-flop alone.
    pub fn read_address(&self) -> u8 {
        self.address | if self.palette_source { 0x20 } else { 0x00 }
    }

    /// Read of 0x3C1.
    pub fn read_data(&self) -> u8 {
        self.regs.get(self.address as usize).copied().unwrap_or(0)
    }

    /// Write to 0x3C0. Returns the register index when a data register was written.
    pub fn write(&mut self, byte: u8) -> Option<usize> {
        match self.flip_flop {
            AttributeFlipFlop::Address => {
                self.address = byte & 0x1F;
                self.palette_source = byte & 0x20 != 0;
                self.flip_flop = AttributeFlipFlop::Data;
                None
            }
            AttributeFlipFlop::Data => {
                self.flip_flop = AttributeFlipFlop::Address;
                let index = self.address as usize;
                match self.regs.get_mut(index) {
                    Some(reg) => {
                        *reg = if index < 0x10 { byte & 0x3F } else { byte };
                        Some(index)
                    }
                    None => None,
                }
            }
        }
    }

    #[inline]
    pub fn palette_source(&self) -> bool {
        self.palette_source
    }

    #[inline]
    pub fn mode_control(&self) -> AModeControl {
        AModeControl::from_bytes([self.regs[AC_MODE_CONTROL]])
    }

    #[inline]
    pub fn color_plane_enable(&self) -> u8 {
        self.regs[AC_COLOR_PLANE_ENABLE] & 0x0F
    }

    /// Resolve a 4-bit pixel value to a DAC index through the palette and colour select.
    pub fn dac_index(&self, color: u8) -> u8 {
        let entry = self.regs[(color & 0x0F) as usize];
        let select = self.regs[AC_COLOR_SELECT];
        let low = if self.mode_control().palette_bits_54_select() {
            (entry & 0x0F) | (select & 0x03) << 4
        }
        else {
            entry & 0x3F
        };
        low | (select & 0x0C) << 4
    }

    #[rustfmt::skip]
    pub fn dump(&self) -> String {
        let mut out = format!("AC flip-flop: {:?} address: {:02X} source: {}\n  palette:", self.flip_flop, self.address, self.palette_source);
        for reg in &self.regs[..0x10] {
            out.push_str(&format!(" {:02X}", reg));
        }
        out.push_str(&format!(
            "\n  mode: {:02X} overscan: {:02X} plane enable: {:02X} panning: {:02X} color select: {:02X}\n",
            self.regs[AC_MODE_CONTROL],
            self.regs[AC_OVERSCAN_COLOR],
            self.regs[AC_COLOR_PLANE_ENABLE],
            self.regs[AC_HORIZONTAL_PEL_PANNING],
            self.regs[AC_COLOR_SELECT]
        ));
        out
    }
}
