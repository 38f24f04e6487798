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

    devices::vga::io.rs

    Port interface of the video adapter.

*/

use super::*;
use crate::module::{PortAccessible, NO_IO_BYTE};

pub const ATTRIBUTE_REGISTER: u16 = 0x3C0;
pub const ATTRIBUTE_REGISTER_READ: u16 = 0x3C1;
pub const MISC_OUTPUT_WRITE: u16 = 0x3C2;
pub const INPUT_STATUS_REGISTER_0: u16 = 0x3C2;
pub const VGA_ENABLE: u16 = 0x3C3;
pub const SEQUENCER_ADDRESS: u16 = 0x3C4;
pub const SEQUENCER_DATA: u16 = 0x3C5;
pub const PEL_MASK: u16 = 0x3C6;
pub const DAC_STATE_REGISTER: u16 = 0x3C7;
pub const PEL_ADDRESS_READ_MODE: u16 = 0x3C7;
pub const PEL_ADDRESS_WRITE_MODE: u16 = 0x3C8;
pub const PEL_DATA: u16 = 0x3C9;
pub const FEATURE_CONTROL_READ: u16 = 0x3CA;
pub const MISC_OUTPUT_READ: u16 = 0x3CC;
pub const GRAPHICS_ADDRESS: u16 = 0x3CE;
pub const GRAPHICS_DATA: u16 = 0x3CF;
pub const MDA_CRTC_ADDRESS: u16 = 0x3B4;
pub const MDA_CRTC_DATA: u16 = 0x3B5;
pub const INPUT_STATUS_REGISTER_1_MDA: u16 = 0x3BA;
pub const CGA_CRTC_ADDRESS: u16 = 0x3D4;
pub const CGA_CRTC_DATA: u16 = 0x3D5;
pub const INPUT_STATUS_REGISTER_1: u16 = 0x3DA;

impl VgaCard {
    /// Accesses in the monochrome range answer only with monochrome addressing selected, and
    /// the colour range only with colour addressing.
    fn port_mapped(&self, port: u16) -> bool {
        match port {
            0x3B0..=0x3BF => !self.color_addressing(),
            0x3D0..=0x3DF => self.color_addressing(),
            _ => true,
        }
    }

    pub(crate) fn port_read(&mut self, port: u16, now_us: u64) -> u8 {
        if !self.port_mapped(port) {
            return NO_IO_BYTE;
        }
        match port {
            ATTRIBUTE_REGISTER => self.ac.read_address(),
            ATTRIBUTE_REGISTER_READ => self.ac.read_data(),
            INPUT_STATUS_REGISTER_0 => 0x00,
            VGA_ENABLE => self.enabled as u8,
            SEQUENCER_ADDRESS => self.sequencer.read_address(),
            SEQUENCER_DATA => self.sequencer.read_data(),
            PEL_MASK => self.dac.pel_mask(),
            DAC_STATE_REGISTER => self.dac.state(),
            PEL_ADDRESS_WRITE_MODE => self.dac.write_index(),
            PEL_DATA => self.dac.read_data(),
            FEATURE_CONTROL_READ => self.feature_control,
            MISC_OUTPUT_READ => self.misc_output.into_bytes()[0],
            GRAPHICS_ADDRESS => self.gc.read_address(),
            GRAPHICS_DATA => self.gc.read_data(),
            MDA_CRTC_ADDRESS | CGA_CRTC_ADDRESS => self.crtc.read_address(),
            MDA_CRTC_DATA | CGA_CRTC_DATA => self.crtc.read_data(),
            INPUT_STATUS_REGISTER_1_MDA | INPUT_STATUS_REGISTER_1 => self.read_input_status_1(now_us),
            _ => NO_IO_BYTE,
        }
    }

    pub(crate) fn port_write(&mut self, port: u16, data: u8) {
        if !self.port_mapped(port) {
            self.log.debug(format_args!("Write to unmapped video port {:04X} dropped", port));
            return;
        }
        match port {
            ATTRIBUTE_REGISTER => {
                if let Some(index) = self.ac.write(data) {
                    self.palette_dirty = true;
                    // Mode control also selects the pixel width.
                    if index == attribute::AC_MODE_CONTROL {
                        self.recalculate_mode();
                    }
                }
            }
            MISC_OUTPUT_WRITE => {
                self.misc_output = MiscOutputRegister::from_bytes([data]);
            }
            VGA_ENABLE => self.enabled = data & 0x01 != 0,
            SEQUENCER_ADDRESS => self.sequencer.write_address(data),
            SEQUENCER_DATA => {
                if self.sequencer.write_data(data).is_some() {
                    self.recalculate_mode();
                }
            }
            PEL_MASK => {
                self.dac.set_pel_mask(data);
                self.palette_dirty = true;
            }
            PEL_ADDRESS_READ_MODE => self.dac.set_read_index(data),
            PEL_ADDRESS_WRITE_MODE => self.dac.set_write_index(data),
            PEL_DATA => {
                if self.dac.write_data(data).is_some() {
                    self.palette_dirty = true;
                }
            }
            GRAPHICS_ADDRESS => self.gc.write_address(data),
            GRAPHICS_DATA => {
                if self.gc.write_data(data).is_some() {
                    self.recalculate_mode();
                }
            }
            MDA_CRTC_ADDRESS | CGA_CRTC_ADDRESS => self.crtc.write_address(data),
            MDA_CRTC_DATA | CGA_CRTC_DATA => {
                if self.crtc.write_data(data) {
                    self.recalculate_mode();
                }
            }
            INPUT_STATUS_REGISTER_1_MDA | INPUT_STATUS_REGISTER_1 => self.feature_control = data & 0x03,
            _ => {
                self.log.debug(format_args!("Write to read-only video port {:04X}: {:02X}", port, data));
            }
        }
    }
}

impl PortAccessible for VgaCard {
    fn port_list(&self) -> Vec<(String, u16)> {
        let mut ports = vec![
            (String::from("VGA CRTC Address (MDA)"), MDA_CRTC_ADDRESS),
            (String::from("VGA CRTC Data (MDA)"), MDA_CRTC_DATA),
            (String::from("VGA Input Status Register 1 (MDA)"), INPUT_STATUS_REGISTER_1_MDA),
            (String::from("VGA CRTC Address"), CGA_CRTC_ADDRESS),
            (String::from("VGA CRTC Data"), CGA_CRTC_DATA),
            (String::from("VGA Input Status Register 1"), INPUT_STATUS_REGISTER_1),
        ];
        ports.extend((0x3C0..=0x3CF).map(|port| (String::from("VGA Register"), port)));
        ports
    }

    fn read_u8(&mut self, port: u16, ctx: &mut BusContext) -> u8 {
        self.port_read(port, ctx.now_us())
    }

    fn write_u8(&mut self, port: u16, data: u8, _ctx: &mut BusContext) {
        self.port_write(port, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card() -> VgaCard {
        VgaCard::new(LogContext::new(ModuleType::Video))
    }

    #[test]
    fn test_dac_round_trip() {
        let mut vga = card();
        vga.port_write(PEL_ADDRESS_WRITE_MODE, 0x20);
        assert_eq!(vga.port_read(DAC_STATE_REGISTER, 0), 0x03);
        for component in [0x3F, 0x15, 0x2A] {
            vga.port_write(PEL_DATA, component);
        }
        vga.port_write(PEL_ADDRESS_READ_MODE, 0x20);
        assert_eq!(vga.port_read(DAC_STATE_REGISTER, 0), 0x00);
        let read: Vec<u8> = (0..3).map(|_| vga.port_read(PEL_DATA, 0)).collect();
        assert_eq!(read, vec![0x3F, 0x15, 0x2A]);
    }

    #[test]
    fn test_dac_write_counter_through_ports() {
        for count in 0..9u8 {
            let mut vga = card();
            vga.port_write(PEL_ADDRESS_WRITE_MODE, 0xFE);
            for _ in 0..count {
                vga.port_write(PEL_DATA, 0x2A);
            }
            let expected = 0xFEu8.wrapping_add(count / 3);
            assert_eq!(vga.port_read(PEL_ADDRESS_WRITE_MODE, 0), expected, "count {}", count);
            assert_eq!(vga.dac().write_phase(), (count % 3) as usize, "count {}", count);
        }
    }

    #[test]
    fn test_io_address_select() {
        let mut vga = card();
        // Monochrome addressing after reset
        vga.port_write(CGA_CRTC_ADDRESS, 0x0A);
        vga.port_write(MDA_CRTC_ADDRESS, 0x0C);
        assert_eq!(vga.port_read(CGA_CRTC_ADDRESS, 0), 0xFF);
        assert_eq!(vga.port_read(MDA_CRTC_ADDRESS, 0), 0x0C);

        vga.port_write(MISC_OUTPUT_WRITE, 0x67);
        assert_eq!(vga.port_read(MISC_OUTPUT_READ, 0), 0x67);
        assert_eq!(vga.port_read(CGA_CRTC_ADDRESS, 0), 0x0C);
        assert_eq!(vga.port_read(INPUT_STATUS_REGISTER_1_MDA, 0), 0xFF);
    }

    #[test]
    fn test_status_read_resets_flip_flop() {
        let mut vga = card();
        vga.port_write(MISC_OUTPUT_WRITE, 0x67);
        vga.port_write(ATTRIBUTE_REGISTER, 0x05);
        vga.port_read(INPUT_STATUS_REGISTER_1, 0);
        // Treated as an address write again
        vga.port_write(ATTRIBUTE_REGISTER, 0x23);
        assert_eq!(vga.port_read(ATTRIBUTE_REGISTER, 0), 0x23);
    }
}
