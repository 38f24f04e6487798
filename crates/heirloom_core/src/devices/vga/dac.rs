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

    devices::vga::dac.rs

    The VGA colour DAC (palette RAM).

*/

/// State register value after a read index was loaded.
pub const DAC_STATE_READ: u8 = 0x00;
/// State register value after a write index was loaded.
pub const DAC_STATE_WRITE: u8 = 0x03;

/// 256 colour registers of three 6-bit components. Reads and writes keep separate indices,
/// each with its own red/green/blue phase.
pub struct Dac {
    entries: [[u8; 3]; 256],
    read_index: u8,
    read_phase: usize,
    write_index: u8,
    write_phase: usize,
    state: u8,
    pel_mask: u8,
}

impl Default for Dac {
    fn default() -> Self {
        Self {
            entries: [[0; 3]; 256],
            read_index: 0,
            read_phase: 0,
            write_index: 0,
            write_phase: 0,
            state: DAC_STATE_WRITE,
            pel_mask: 0xFF,
        }
    }
}

impl Dac {
    pub fn pel_mask(&self) -> u8 {
        self.pel_mask
    }

    pub fn set_pel_mask(&mut self, mask: u8) {
        self.pel_mask = mask;
    }

    pub fn state(&self) -> u8 {
        self.state
    }

    pub fn write_index(&self) -> u8 {
        self.write_index
    }

    pub fn read_index(&self) -> u8 {
        self.read_index
    }

    /// Component (0 red, 1 green, 2 blue) the next data write stores.
    pub fn write_phase(&self) -> usize {
        self.write_phase
    }

    pub fn read_phase(&self) -> usize {
        self.read_phase
    }

    pub fn set_read_index(&mut self, index: u8) {
        self.read_index = index;
        self.read_phase = 0;
        self.state = DAC_STATE_READ;
    }

    pub fn set_write_index(&mut self, index: u8) {
        self.write_index = index;
        self.write_phase = 0;
        self.state = DAC_STATE_WRITE;
    }

    pub fn read_data(&mut self) -> u8 {
        let value = self.entries[self.read_index as usize][self.read_phase];
        self.read_phase += 1;
        if self.read_phase == 3 {
            self.read_phase = 0;
            self.read_index = self.read_index.wrapping_add(1);
        }
        value
    }

    /// Store the next component. Returns the entry index once a full triple was written.
    pub fn write_data(&mut self, value: u8) -> Option<u8> {
        let index = self.write_index;
        self.entries[index as usize][self.write_phase] = value & 0x3F;
        self.write_phase += 1;
        if self.write_phase == 3 {
            self.write_phase = 0;
            self.write_index = self.write_index.wrapping_add(1);
            return Some(index);
        }
        None
    }

    pub fn entry(&self, index: u8) -> [u8; 3] {
        self.entries[index as usize]
    }

    /// The entry as 0x00RRGGBB with each 6-bit component scaled to 8 bits.
    pub fn rgb(&self, index: u8) -> u32 {
        let [r, g, b] = self.entries[index as usize];
        let scale = |c: u8| ((c << 2) | (c >> 4)) as u32;
        scale(r) << 16 | scale(g) << 8 | scale(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triples_auto_increment() {
        let mut dac = Dac::default();
        dac.set_write_index(0x10);
        assert_eq!(dac.state(), DAC_STATE_WRITE);
        for component in [0x3F, 0x20, 0x01, 0x02, 0x03, 0x04] {
            dac.write_data(component);
        }
        assert_eq!(dac.write_index(), 0x12);

        dac.set_read_index(0x10);
        assert_eq!(dac.state(), DAC_STATE_READ);
        let read: Vec<u8> = (0..6).map(|_| dac.read_data()).collect();
        assert_eq!(read, vec![0x3F, 0x20, 0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_phase_cycles_per_component() {
        for k in 0..4u8 {
            for r in 0..3usize {
                let mut dac = Dac::default();
                dac.set_write_index(0x40);
                for _ in 0..(3 * k as usize + r) {
                    dac.write_data(0x11);
                }
                assert_eq!(dac.write_index(), 0x40 + k, "k={} r={}", k, r);
                assert_eq!(dac.write_phase(), r, "k={} r={}", k, r);

                dac.set_read_index(0x40);
                for _ in 0..(3 * k as usize + r) {
                    dac.read_data();
                }
                assert_eq!(dac.read_index(), 0x40 + k);
                assert_eq!(dac.read_phase(), r);
            }
        }
    }

    #[test]
    fn test_index_wraps_after_last_entry() {
        let mut dac = Dac::default();
        dac.set_write_index(0xFF);
        assert_eq!(dac.write_data(0x01), None);
        assert_eq!(dac.write_data(0x02), None);
        assert_eq!(dac.write_data(0x03), Some(0xFF));
        assert_eq!(dac.write_index(), 0x00);
        assert_eq!(dac.write_phase(), 0);

        dac.set_read_index(0xFF);
        let read: Vec<u8> = (0..3).map(|_| dac.read_data()).collect();
        assert_eq!(read, vec![0x01, 0x02, 0x03]);
        assert_eq!(dac.read_index(), 0x00);
    }

    #[test]
    fn test_loading_an_index_restarts_the_phase() {
        let mut dac = Dac::default();
        dac.set_write_index(0x05);
        dac.write_data(0x3F);
        assert_eq!(dac.write_phase(), 1);
        dac.set_write_index(0x06);
        assert_eq!(dac.write_phase(), 0);
        dac.write_data(0x01);
        dac.write_data(0x02);
        dac.write_data(0x03);
        assert_eq!(dac.entry(0x06), [0x01, 0x02, 0x03]);
        assert_eq!(dac.write_index(), 0x07);
    }

    #[test]
    fn test_components_are_six_bit() {
        let mut dac = Dac::default();
        dac.set_write_index(0);
        dac.write_data(0xFF);
        dac.write_data(0x00);
        assert_eq!(dac.write_data(0x40), Some(0));
        assert_eq!(dac.entry(0), [0x3F, 0x00, 0x00]);
        assert_eq!(dac.rgb(0), 0x00FF_0000);
    }
}
