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

    devices::vga::modes.rs

    Register tables for the standard BIOS video modes.

*/

//! Programming a mode normally falls to the video BIOS. These tables let a machine without a
//! video BIOS, a test or a benchmark bring the adapter up in a known mode. Video memory is
//! left untouched.

use super::*;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StandardMode {
    /// Mode 03h, 80x25 colour text with a 9x16 cell.
    Text80x25,
    /// Mode 04h, 320x200 in 4 colours.
    Cga320x200,
    /// Mode 12h, 640x480 in 16 colours.
    Planar640x480,
    /// Mode 13h, 320x200 in 256 colours.
    Linear320x200,
}

struct ModeTable {
    misc: u8,
    sequencer: [u8; 5],
    crtc: [u8; 25],
    graphics: [u8; 9],
    attribute: [u8; 21],
}

#[rustfmt::skip]
const MODE_03: ModeTable = ModeTable {
    misc: 0x67,
    sequencer: [0x03, 0x00, 0x03, 0x00, 0x02],
    crtc: [
        0x5F, 0x4F, 0x50, 0x82, 0x55, 0x81, 0xBF, 0x1F, 0x00, 0x4F, 0x0D, 0x0E, 0x00, 0x00, 0x00, 0x00,
        0x9C, 0x8E, 0x8F, 0x28, 0x1F, 0x96, 0xB9, 0xA3, 0xFF,
    ],
    graphics: [0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x0E, 0x00, 0xFF],
    attribute: [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x14, 0x07, 0x38, 0x39, 0x3A, 0x3B, 0x3C, 0x3D, 0x3E, 0x3F,
        0x0C, 0x00, 0x0F, 0x08, 0x00,
    ],
};

#[rustfmt::skip]
const MODE_04: ModeTable = ModeTable {
    misc: 0x63,
    sequencer: [0x03, 0x09, 0x03, 0x00, 0x02],
    crtc: [
        0x2D, 0x27, 0x28, 0x90, 0x2B, 0x80, 0xBF, 0x1F, 0x00, 0xC1, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x9C, 0x8E, 0x8F, 0x14, 0x00, 0x96, 0xB9, 0xA2, 0xFF,
    ],
    graphics: [0x00, 0x00, 0x00, 0x00, 0x00, 0x30, 0x0F, 0x00, 0xFF],
    attribute: [
        0x00, 0x13, 0x15, 0x17, 0x02, 0x04, 0x06, 0x07, 0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17,
        0x01, 0x00, 0x03, 0x00, 0x00,
    ],
};

#[rustfmt::skip]
const MODE_12: ModeTable = ModeTable {
    misc: 0xE3,
    sequencer: [0x03, 0x01, 0x0F, 0x00, 0x06],
    crtc: [
        0x5F, 0x4F, 0x50, 0x82, 0x54, 0x80, 0x0B, 0x3E, 0x00, 0x40, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0xEA, 0x8C, 0xDF, 0x28, 0x00, 0xE7, 0x04, 0xE3, 0xFF,
    ],
    graphics: [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x05, 0x0F, 0xFF],
    attribute: [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x14, 0x07, 0x38, 0x39, 0x3A, 0x3B, 0x3C, 0x3D, 0x3E, 0x3F,
        0x01, 0x00, 0x0F, 0x00, 0x00,
    ],
};

#[rustfmt::skip]
const MODE_13: ModeTable = ModeTable {
    misc: 0x63,
    sequencer: [0x03, 0x01, 0x0F, 0x00, 0x0E],
    crtc: [
        0x5F, 0x4F, 0x50, 0x82, 0x54, 0x80, 0xBF, 0x1F, 0x00, 0x41, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x9C, 0x8E, 0x8F, 0x28, 0x40, 0x96, 0xB9, 0xA3, 0xFF,
    ],
    graphics: [0x00, 0x00, 0x00, 0x00, 0x00, 0x40, 0x05, 0x0F, 0xFF],
    attribute: [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F,
        0x41, 0x00, 0x0F, 0x00, 0x00,
    ],
};

/// The 16 colour EGA palette in 6-bit DAC components.
#[rustfmt::skip]
const EGA_DAC: [[u8; 3]; 16] = [
    [0x00, 0x00, 0x00], [0x00, 0x00, 0x2A], [0x00, 0x2A, 0x00], [0x00, 0x2A, 0x2A],
    [0x2A, 0x00, 0x00], [0x2A, 0x00, 0x2A], [0x2A, 0x15, 0x00], [0x2A, 0x2A, 0x2A],
    [0x15, 0x15, 0x15], [0x15, 0x15, 0x3F], [0x15, 0x3F, 0x15], [0x15, 0x3F, 0x3F],
    [0x3F, 0x15, 0x15], [0x3F, 0x15, 0x3F], [0x3F, 0x3F, 0x15], [0x3F, 0x3F, 0x3F],
];

impl StandardMode {
    fn table(&self) -> &'static ModeTable {
        match self {
            StandardMode::Text80x25 => &MODE_03,
            StandardMode::Cga320x200 => &MODE_04,
            StandardMode::Planar640x480 => &MODE_12,
            StandardMode::Linear320x200 => &MODE_13,
        }
    }
}

impl VgaCard {
    /// Program every register bank for a standard mode, through the same paths port writes
    /// take. The DAC is loaded with the 64 colour EGA layout the BIOS uses for 16 colour modes.
    pub fn set_standard_mode(&mut self, mode: StandardMode) {
        let table = mode.table();
        self.log.debug(format_args!("Setting standard mode {:?}", mode));

        self.port_write(io::MISC_OUTPUT_WRITE, table.misc);
        for (index, value) in table.sequencer.iter().enumerate() {
            self.port_write(io::SEQUENCER_ADDRESS, index as u8);
            self.port_write(io::SEQUENCER_DATA, *value);
        }

        // Lift CRTC write protection before loading registers 0-7.
        self.port_write(io::CGA_CRTC_ADDRESS, 0x11);
        self.port_write(io::CGA_CRTC_DATA, 0x00);
        for (index, value) in table.crtc.iter().enumerate() {
            self.port_write(io::CGA_CRTC_ADDRESS, index as u8);
            self.port_write(io::CGA_CRTC_DATA, *value);
        }

        for (index, value) in table.graphics.iter().enumerate() {
            self.port_write(io::GRAPHICS_ADDRESS, index as u8);
            self.port_write(io::GRAPHICS_DATA, *value);
        }

        self.ac.reset_flip_flop();
        for (index, value) in table.attribute.iter().enumerate() {
            self.port_write(io::ATTRIBUTE_REGISTER, index as u8);
            self.port_write(io::ATTRIBUTE_REGISTER, *value);
        }
        // Hand the palette back to the display.
        self.port_write(io::ATTRIBUTE_REGISTER, 0x20);

        self.port_write(io::PEL_MASK, 0xFF);
        self.port_write(io::PEL_ADDRESS_WRITE_MODE, 0x00);
        for index in 0..64u8 {
            // Each DAC entry takes its colour from the rgbRGB bits of its index.
            let bits = |hi: u8, lo: u8| (if index & hi != 0 { 0x15 } else { 0 }) + (if index & lo != 0 { 0x2A } else { 0 });
            let rgb = [bits(0x20, 0x04), bits(0x10, 0x02), bits(0x08, 0x01)];
            for component in rgb {
                self.port_write(io::PEL_DATA, component);
            }
        }
        if mode == StandardMode::Linear320x200 {
            for (index, rgb) in EGA_DAC.iter().enumerate() {
                self.port_write(io::PEL_ADDRESS_WRITE_MODE, index as u8);
                for component in rgb {
                    self.port_write(io::PEL_DATA, *component);
                }
            }
        }
        self.recalculate_mode();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ega_layout_in_dac() {
        let mut vga = VgaCard::new(LogContext::new(ModuleType::Video));
        vga.set_standard_mode(StandardMode::Text80x25);
        // Attribute palette entry 6 is 0x14, brown
        assert_eq!(vga.dac().entry(0x14), [0x2A, 0x15, 0x00]);
        // Entry 0x3F is bright white
        assert_eq!(vga.dac().entry(0x3F), [0x3F, 0x3F, 0x3F]);
        assert!(vga.display_enabled());
    }
}
