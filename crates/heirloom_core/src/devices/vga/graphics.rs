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

    devices::vga::graphics.rs

    The VGA Graphics Controller and its latch/ALU pipeline.

*/

//! The Graphics Controller sits between the CPU and the four planes. Every CPU read loads the
//! four latches; every CPU write passes through one of four write modes that combine the CPU
//! byte, the set/reset registers, the latches and the bit mask.

use super::*;

#[derive(Copy, Clone, Debug)]
pub enum GraphicsRegister {
    SetReset,
    EnableSetReset,
    ColorCompare,
    DataRotate,
    ReadMapSelect,
    Mode,
    Miscellaneous,
    ColorDontCare,
    BitMask,
}

#[derive(Copy, Clone, Debug, PartialEq, BitfieldSpecifier)]
pub enum LogicFunction {
    Replace,
    And,
    Or,
    Xor,
}

#[derive(Copy, Clone, Debug, PartialEq, BitfieldSpecifier)]
pub enum WriteMode {
    Mode0,
    Mode1,
    Mode2,
    Mode3,
}

#[derive(Copy, Clone, Debug, PartialEq, BitfieldSpecifier)]
pub enum ReadMode {
    ReadSelectedPlane,
    ReadComparedPlanes,
}

#[derive(Copy, Clone, Debug, PartialEq, BitfieldSpecifier)]
pub enum ShiftMode {
    Standard,
    CgaCompatible,
    Color256,
    Color256Alt,
}

#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, BitfieldSpecifier)]
pub enum MemoryMap {
    A0000_128K,
    A0000_64K,
    B0000_32K,
    B8000_32K,
}

impl MemoryMap {
    /// Inclusive address window of the map.
    pub fn window(&self) -> (u32, u32) {
        match self {
            MemoryMap::A0000_128K => (0xA0000, 0xBFFFF),
            MemoryMap::A0000_64K => (0xA0000, 0xAFFFF),
            MemoryMap::B0000_32K => (0xB0000, 0xB7FFF),
            MemoryMap::B8000_32K => (0xB8000, 0xBFFFF),
        }
    }
}

#[bitfield]
#[derive(Copy, Clone)]
pub struct GDataRotateRegister {
    pub count: B3,
    #[bits = 2]
    pub function: LogicFunction,
    #[skip]
    unused: B3,
}

#[bitfield]
#[derive(Copy, Clone)]
pub struct GModeRegister {
    #[bits = 2]
    pub write_mode: WriteMode,
    #[skip]
    unused: B1,
    #[bits = 1]
    pub read_mode: ReadMode,
    pub odd_even: bool,
    #[bits = 2]
    pub shift_mode: ShiftMode,
    #[skip]
    unused2: B1,
}

#[bitfield]
#[derive(Copy, Clone)]
pub struct GMiscellaneousRegister {
    pub graphics_mode: bool,
    pub chain_odd_even: bool,
    #[bits = 2]
    pub memory_map: MemoryMap,
    #[skip]
    unused: B4,
}

pub struct GraphicsController {
    address: u8,
    set_reset: u8,
    enable_set_reset: u8,
    color_compare: u8,
    data_rotate: GDataRotateRegister,
    read_map_select: u8,
    mode: GModeRegister,
    miscellaneous: GMiscellaneousRegister,
    color_dont_care: u8,
    bitmask: u8,

    latches: [u8; 4],
}

impl Default for GraphicsController {
    fn default() -> Self {
        Self {
            address: 0,
            set_reset: 0,
            enable_set_reset: 0,
            color_compare: 0,
            data_rotate: GDataRotateRegister::new(),
            read_map_select: 0,
            mode: GModeRegister::new(),
            miscellaneous: GMiscellaneousRegister::new(),
            color_dont_care: 0,
            bitmask: 0xFF,
            latches: [0; 4],
        }
    }
}

impl GraphicsController {
    pub fn read_address(&self) -> u8 {
        self.address
    }

    pub fn write_address(&mut self, byte: u8) {
        self.address = byte & 0x0F;
    }

    fn selected(&self) -> Option<GraphicsRegister> {
        match self.address {
            0x00 => Some(GraphicsRegister::SetReset),
            0x01 => Some(GraphicsRegister::EnableSetReset),
            0x02 => Some(GraphicsRegister::ColorCompare),
            0x03 => Some(GraphicsRegister::DataRotate),
            0x04 => Some(GraphicsRegister::ReadMapSelect),
            0x05 => Some(GraphicsRegister::Mode),
            0x06 => Some(GraphicsRegister::Miscellaneous),
            0x07 => Some(GraphicsRegister::ColorDontCare),
            0x08 => Some(GraphicsRegister::BitMask),
            _ => None,
        }
    }

    pub fn read_data(&self) -> u8 {
        match self.selected() {
            Some(GraphicsRegister::SetReset) => self.set_reset,
            Some(GraphicsRegister::EnableSetReset) => self.enable_set_reset,
            Some(GraphicsRegister::ColorCompare) => self.color_compare,
            Some(GraphicsRegister::DataRotate) => self.data_rotate.into_bytes()[0],
            Some(GraphicsRegister::ReadMapSelect) => self.read_map_select,
            Some(GraphicsRegister::Mode) => self.mode.into_bytes()[0],
            Some(GraphicsRegister::Miscellaneous) => self.miscellaneous.into_bytes()[0],
            Some(GraphicsRegister::ColorDontCare) => self.color_dont_care,
            Some(GraphicsRegister::BitMask) => self.bitmask,
            None => 0xFF,
        }
    }

    pub fn write_data(&mut self, byte: u8) -> Option<GraphicsRegister> {
        let register = self.selected()?;
        match register {
            GraphicsRegister::SetReset => self.set_reset = byte & 0x0F,
            GraphicsRegister::EnableSetReset => self.enable_set_reset = byte & 0x0F,
            GraphicsRegister::ColorCompare => self.color_compare = byte & 0x0F,
            GraphicsRegister::DataRotate => self.data_rotate = GDataRotateRegister::from_bytes([byte]),
            GraphicsRegister::ReadMapSelect => self.read_map_select = byte & 0x03,
            GraphicsRegister::Mode => self.mode = GModeRegister::from_bytes([byte]),
            GraphicsRegister::Miscellaneous => self.miscellaneous = GMiscellaneousRegister::from_bytes([byte]),
            GraphicsRegister::ColorDontCare => self.color_dont_care = byte & 0x0F,
            GraphicsRegister::BitMask => self.bitmask = byte,
        }
        Some(register)
    }

    /// Alphanumeric mode is disabled.
    #[inline]
    pub fn graphics_mode(&self) -> bool {
        self.miscellaneous.graphics_mode()
    }

    #[inline]
    pub fn memory_map(&self) -> MemoryMap {
        self.miscellaneous.memory_map()
    }

    /// CPU reads alternate between even and odd planes.
    #[inline]
    pub fn odd_even(&self) -> bool {
        self.mode.odd_even()
    }

    #[inline]
    pub fn shift_mode(&self) -> ShiftMode {
        self.mode.shift_mode()
    }

    #[inline]
    pub fn color_256(&self) -> bool {
        matches!(self.shift_mode(), ShiftMode::Color256 | ShiftMode::Color256Alt)
    }

    pub fn latches(&self) -> [u8; 4] {
        self.latches
    }

    pub fn load_latches(&mut self, vram: &PlanarMemory, offset: usize) {
        for plane in 0..4 {
            self.latches[plane] = vram.read(plane, offset);
        }
    }

    /// CPU read at a plane offset. All four latches are loaded first.
    pub fn cpu_read(&mut self, vram: &PlanarMemory, offset: usize) -> u8 {
        self.load_latches(vram, offset);
        match self.mode.read_mode() {
            ReadMode::ReadSelectedPlane => {
                let plane = if self.odd_even() {
                    (self.read_map_select as usize & 0x02) | (offset & 0x01)
                }
                else {
                    self.read_map_select as usize
                };
                self.latches[plane]
            }
            ReadMode::ReadComparedPlanes => self.color_compare_result(),
        }
    }

    /// Read mode 1. Bits set where the pixel matches the compare colour in every plane
    /// selected by the don't care mask.
    pub fn color_compare_result(&self) -> u8 {
        let mut mismatch = 0u8;
        for plane in 0..4 {
            if self.color_dont_care & (1 << plane) == 0 {
                continue;
            }
            let target = if self.color_compare & (1 << plane) != 0 { 0xFF } else { 0x00 };
            mismatch |= self.latches[plane] ^ target;
        }
        !mismatch
    }

    /// Run a CPU byte through the write pipeline and store it to the planes enabled by
    /// `plane_mask`. Returns the planes actually written.
    pub fn cpu_write(&mut self, vram: &mut PlanarMemory, offset: usize, plane_mask: u8, byte: u8) -> u8 {
        let rotated = byte.rotate_right(self.data_rotate.count() as u32);
        let mut data = [0u8; 4];
        let mut mask = self.bitmask;

        match self.mode.write_mode() {
            WriteMode::Mode0 => {
                for (plane, value) in data.iter_mut().enumerate() {
                    *value = if self.enable_set_reset & (1 << plane) != 0 {
                        expand_bit(self.set_reset, plane)
                    }
                    else {
                        rotated
                    };
                }
            }
            WriteMode::Mode1 => {
                for plane in 0..4 {
                    if plane_mask & (1 << plane) != 0 {
                        vram.write(plane, offset, self.latches[plane]);
                    }
                }
                return plane_mask & 0x0F;
            }
            WriteMode::Mode2 => {
                for (plane, value) in data.iter_mut().enumerate() {
                    *value = expand_bit(byte, plane);
                }
            }
            WriteMode::Mode3 => {
                mask &= rotated;
                for (plane, value) in data.iter_mut().enumerate() {
                    *value = expand_bit(self.set_reset, plane);
                }
            }
        }

        let function = self.data_rotate.function();
        for plane in 0..4 {
            if plane_mask & (1 << plane) == 0 {
                continue;
            }
            let latch = self.latches[plane];
            let combined = match function {
                LogicFunction::Replace => data[plane],
                LogicFunction::And => data[plane] & latch,
                LogicFunction::Or => data[plane] | latch,
                LogicFunction::Xor => data[plane] ^ latch,
            };
            vram.write(plane, offset, (combined & mask) | (latch & !mask));
        }
        plane_mask & 0x0F
    }

    #[rustfmt::skip]
    pub fn dump(&self) -> String {
        format!(
            "GC set/reset: {:04b} enable: {:04b} compare: {:04b} rotate: {:02X} read map: {} mode: {:02X} misc: {:02X} don't care: {:04b} bitmask: {:08b}\n",
            self.set_reset,
            self.enable_set_reset,
            self.color_compare,
            self.data_rotate.into_bytes()[0],
            self.read_map_select,
            self.mode.into_bytes()[0],
            self.miscellaneous.into_bytes()[0],
            self.color_dont_care,
            self.bitmask
        )
    }
}

#[inline]
fn expand_bit(value: u8, bit: usize) -> u8 {
    if value & (1 << bit) != 0 {
        0xFF
    }
    else {
        0x00
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gc_write(gc: &mut GraphicsController, index: u8, data: u8) {
        gc.write_address(index);
        gc.write_data(data);
    }

    #[test]
    fn test_write_mode_0_set_reset() {
        let mut gc = GraphicsController::default();
        let mut vram = PlanarMemory::new();
        gc_write(&mut gc, 0x00, 0b0101);
        gc_write(&mut gc, 0x01, 0b0011);
        gc.cpu_write(&mut vram, 0x10, 0x0F, 0xA5);
        assert_eq!(vram.read(0, 0x10), 0xFF);
        assert_eq!(vram.read(1, 0x10), 0x00);
        assert_eq!(vram.read(2, 0x10), 0xA5);
        assert_eq!(vram.read(3, 0x10), 0xA5);
    }

    #[test]
    fn test_bitmask_keeps_latched_bits() {
        let mut gc = GraphicsController::default();
        let mut vram = PlanarMemory::new();
        vram.write(0, 0, 0xF0);
        gc.cpu_read(&vram, 0);
        gc_write(&mut gc, 0x08, 0x0F);
        gc.cpu_write(&mut vram, 0, 0x01, 0x33);
        assert_eq!(vram.read(0, 0), 0xF3);
    }

    #[test]
    fn test_write_mode_1_copies_latches() {
        let mut gc = GraphicsController::default();
        let mut vram = PlanarMemory::new();
        for plane in 0..4 {
            vram.write(plane, 0x100, 0x11 * (plane as u8 + 1));
        }
        gc.cpu_read(&vram, 0x100);
        gc_write(&mut gc, 0x05, 0x01);
        gc.cpu_write(&mut vram, 0x200, 0x0F, 0x00);
        for plane in 0..4 {
            assert_eq!(vram.read(plane, 0x200), 0x11 * (plane as u8 + 1));
        }
    }

    #[test]
    fn test_write_mode_2_and_3() {
        let mut gc = GraphicsController::default();
        let mut vram = PlanarMemory::new();
        gc_write(&mut gc, 0x05, 0x02);
        gc.cpu_write(&mut vram, 0, 0x0F, 0b1001);
        assert_eq!([vram.read(0, 0), vram.read(1, 0), vram.read(2, 0), vram.read(3, 0)], [0xFF, 0, 0, 0xFF]);

        // Mode 3: the rotated CPU byte narrows the bit mask, set/reset supplies the colour
        gc.cpu_read(&vram, 1);
        gc_write(&mut gc, 0x05, 0x03);
        gc_write(&mut gc, 0x00, 0b0010);
        gc.cpu_write(&mut vram, 1, 0x0F, 0xF0);
        assert_eq!([vram.read(0, 1), vram.read(1, 1), vram.read(2, 1), vram.read(3, 1)], [0x00, 0xF0, 0x00, 0x00]);
    }

    #[test]
    fn test_logic_functions() {
        let mut gc = GraphicsController::default();
        let mut vram = PlanarMemory::new();
        vram.write(0, 0, 0b1100_1100);
        gc.cpu_read(&vram, 0);
        // XOR
        gc_write(&mut gc, 0x03, 0x18);
        gc.cpu_write(&mut vram, 0, 0x01, 0b1010_1010);
        assert_eq!(vram.read(0, 0), 0b0110_0110);
    }

    #[test]
    fn test_read_mode_1() {
        let mut gc = GraphicsController::default();
        let mut vram = PlanarMemory::new();
        gc_write(&mut gc, 0x05, 0x08);
        // Nothing selected in the don't care mask: every pixel matches
        assert_eq!(gc.cpu_read(&vram, 0), 0xFF);

        // Pixel 7 (bit 0) is colour 5, the rest colour 0
        vram.write(0, 0, 0x01);
        vram.write(2, 0, 0x01);
        gc_write(&mut gc, 0x07, 0x0F);
        gc_write(&mut gc, 0x02, 0x05);
        assert_eq!(gc.cpu_read(&vram, 0), 0x01);
        gc_write(&mut gc, 0x02, 0x00);
        assert_eq!(gc.cpu_read(&vram, 0), 0xFE);
    }
}
