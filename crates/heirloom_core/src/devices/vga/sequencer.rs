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

    devices::vga::sequencer.rs

    The VGA Sequencer register bank.

*/

//! The Sequencer owns the plane write mask and decides how CPU addresses are spread across the
//! four planes: sequential, odd/even, or chain-four.

use super::*;

pub const SEQUENCER_REGISTERS: usize = 5;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SequencerRegister {
    Reset,
    ClockingMode,
    MapMask,
    CharacterMapSelect,
    MemoryMode,
}

#[bitfield]
#[derive(Copy, Clone)]
pub struct SClockingModeRegister {
    /// Set for 8 dot characters, clear for 9
    pub dot8: bool,
    #[skip]
    unused: B1,
    pub shift_load: bool,
    pub dot_clock_half: bool,
    pub shift_four: bool,
    pub screen_off: bool,
    #[skip]
    unused2: B2,
}

#[bitfield]
#[derive(Copy, Clone)]
pub struct SMemoryModeRegister {
    #[skip]
    unused: B1,
    pub extended_memory: bool,
    pub odd_even_disable: bool,
    pub chain4: bool,
    #[skip]
    unused2: B4,
}

pub struct Sequencer {
    address: u8,
    reset: u8,
    clocking_mode: SClockingModeRegister,
    map_mask: u8,
    character_map_select: u8,
    memory_mode: SMemoryModeRegister,
}

impl Default for Sequencer {
    fn default() -> Self {
        Self {
            address: 0,
            reset: 0x03,
            clocking_mode: SClockingModeRegister::new(),
            map_mask: 0,
            character_map_select: 0,
            memory_mode: SMemoryModeRegister::new(),
        }
    }
}

impl Sequencer {
    pub fn read_address(&self) -> u8 {
        self.address
    }

    pub fn write_address(&mut self, byte: u8) {
        self.address = byte & 0x07;
    }

    fn selected(&self) -> Option<SequencerRegister> {
        match self.address {
            0 => Some(SequencerRegister::Reset),
            1 => Some(SequencerRegister::ClockingMode),
            2 => Some(SequencerRegister::MapMask),
            3 => Some(SequencerRegister::CharacterMapSelect),
            4 => Some(SequencerRegister::MemoryMode),
            _ => None,
        }
    }

    pub fn read_data(&self) -> u8 {
        match self.selected() {
            Some(SequencerRegister::Reset) => self.reset,
            Some(SequencerRegister::ClockingMode) => self.clocking_mode.into_bytes()[0],
            Some(SequencerRegister::MapMask) => self.map_mask,
            Some(SequencerRegister::CharacterMapSelect) => self.character_map_select,
            Some(SequencerRegister::MemoryMode) => self.memory_mode.into_bytes()[0],
            None => 0xFF,
        }
    }

    /// Returns the register written, if any.
    pub fn write_data(&mut self, byte: u8) -> Option<SequencerRegister> {
        let register = self.selected()?;
        match register {
            SequencerRegister::Reset => self.reset = byte & 0x03,
            SequencerRegister::ClockingMode => self.clocking_mode = SClockingModeRegister::from_bytes([byte]),
            SequencerRegister::MapMask => self.map_mask = byte & 0x0F,
            SequencerRegister::CharacterMapSelect => self.character_map_select = byte & 0x3F,
            SequencerRegister::MemoryMode => self.memory_mode = SMemoryModeRegister::from_bytes([byte]),
        }
        Some(register)
    }

    #[inline]
    pub fn map_mask(&self) -> u8 {
        self.map_mask
    }

    #[inline]
    pub fn chain4(&self) -> bool {
        self.memory_mode.chain4()
    }

    /// CPU writes alternate between even and odd planes.
    #[inline]
    pub fn odd_even(&self) -> bool {
        !self.memory_mode.odd_even_disable()
    }

    #[inline]
    pub fn dot_clock_half(&self) -> bool {
        self.clocking_mode.dot_clock_half()
    }

    #[inline]
    pub fn char_width(&self) -> u32 {
        if self.clocking_mode.dot8() {
            8
        }
        else {
            9
        }
    }

    #[inline]
    pub fn screen_off(&self) -> bool {
        self.clocking_mode.screen_off()
    }

    pub fn running(&self) -> bool {
        self.reset == 0x03
    }

    /// Plane 2 offsets of character maps A and B.
    ///
    /// Maps 0-3 live at 16K steps, maps 4-7 are interleaved 8K above them.
    pub fn character_maps(&self) -> (usize, usize) {
        let v = self.character_map_select as usize;
        let map_a = ((v >> 2) & 0x03) * 0x4000 + ((v >> 5) & 0x01) * 0x2000;
        let map_b = (v & 0x03) * 0x4000 + ((v >> 4) & 0x01) * 0x2000;
        (map_a, map_b)
    }

    #[rustfmt::skip]
    pub fn dump(&self) -> String {
        format!(
            "SEQ reset: {:02X} clocking: {:02X} map mask: {:04b} char map: {:02X} memory mode: {:02X}\n",
            self.reset,
            self.clocking_mode.into_bytes()[0],
            self.map_mask,
            self.character_map_select,
            self.memory_mode.into_bytes()[0]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_maps() {
        let mut seq = Sequencer::default();
        seq.write_address(3);
        seq.write_data(0b0000_0000);
        assert_eq!(seq.character_maps(), (0x0000, 0x0000));
        // Map A = 5, map B = 2
        seq.write_data(0b0010_0110);
        assert_eq!(seq.character_maps(), (0x6000, 0x8000));
    }

    #[test]
    fn test_unused_index_reads_ff() {
        let mut seq = Sequencer::default();
        seq.write_address(6);
        assert_eq!(seq.read_data(), 0xFF);
        assert_eq!(seq.write_data(0x12), None);
    }
}
