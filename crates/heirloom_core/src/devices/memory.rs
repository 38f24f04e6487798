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

    devices::memory.rs

    System RAM with A20 gating and ROM regions.

*/

use crate::{
    bus::BusContext,
    error::ModuleError,
    logging::LogContext,
    module::{Module, ModuleType, PortAccessible, Resettable, Tickable, NO_IO_BYTE},
};

pub const CONVENTIONAL_MEMORY_SIZE: usize = 0x10_0000;
pub const BASE_MEMORY_KB: u32 = 640;
const A20_BIT: usize = 0x10_0000;

struct RomImage {
    offset: usize,
    data: Vec<u8>,
}

impl RomImage {
    fn contains(&self, address: usize) -> bool {
        address >= self.offset && address < self.offset + self.data.len()
    }
}

/// The first megabyte plus any extended memory above it.
///
/// ROM images are kept alongside RAM and copied back in on every reset. Writes landing inside
/// a ROM region are ignored.
pub struct Memory {
    log: LogContext,
    ram: Vec<u8>,
    extended_kb: u32,
    a20: bool,
    roms: Vec<RomImage>,
}

impl Memory {
    pub fn new(log: LogContext, extended_kb: u32) -> Self {
        let size = CONVENTIONAL_MEMORY_SIZE + extended_kb as usize * 1024;
        Self {
            log,
            ram: vec![0; size],
            extended_kb,
            a20: false,
            roms: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.ram.len()
    }

    pub fn base_kb(&self) -> u32 {
        BASE_MEMORY_KB
    }

    pub fn extended_kb(&self) -> u32 {
        self.extended_kb
    }

    pub fn a20_enabled(&self) -> bool {
        self.a20
    }

    pub fn set_a20(&mut self, enabled: bool) {
        if self.a20 != enabled {
            self.log.debug(format_args!("A20 {}", if enabled { "enabled" } else { "disabled" }));
        }
        self.a20 = enabled;
    }

    #[inline]
    fn translate(&self, address: u32) -> usize {
        let address = address as usize;
        if self.a20 {
            address
        }
        else {
            address & !A20_BIT
        }
    }

    pub fn read_u8(&self, address: u32) -> u8 {
        self.ram.get(self.translate(address)).copied().unwrap_or(NO_IO_BYTE)
    }

    pub fn write_u8(&mut self, address: u32, data: u8) {
        let address = self.translate(address);
        if self.roms.iter().any(|rom| rom.contains(address)) {
            return;
        }
        if let Some(byte) = self.ram.get_mut(address) {
            *byte = data;
        }
    }

    pub fn read_u16(&self, address: u32) -> u16 {
        (self.read_u8(address.wrapping_add(1)) as u16) << 8 | self.read_u8(address) as u16
    }

    pub fn write_u16(&mut self, address: u32, data: u16) {
        self.write_u8(address, data as u8);
        self.write_u8(address.wrapping_add(1), (data >> 8) as u8);
    }

    /// Copy a block into RAM, bypassing ROM protection.
    pub fn load(&mut self, address: usize, data: &[u8]) -> Result<(), ModuleError> {
        let end = address.checked_add(data.len()).filter(|&end| end <= self.ram.len());
        match end {
            Some(end) => {
                self.ram[address..end].copy_from_slice(data);
                Ok(())
            }
            None => Err(ModuleError::RomOutOfRange {
                offset: address,
                len: data.len(),
                size: self.ram.len(),
            }),
        }
    }

    /// Install a ROM image. It is copied in now and again on every reset.
    pub fn load_rom(&mut self, offset: usize, data: Vec<u8>) -> Result<(), ModuleError> {
        self.load(offset, &data)?;
        self.log.debug(format_args!(
            "Loaded ROM of {} bytes at {:05X}",
            data.len(),
            offset
        ));
        self.roms.retain(|rom| rom.offset != offset);
        self.roms.push(RomImage { offset, data });
        Ok(())
    }

    pub fn slice(&self, address: usize, len: usize) -> Option<&[u8]> {
        self.ram.get(address..address.checked_add(len)?)
    }

    fn restore_roms(&mut self) {
        for rom in &self.roms {
            let end = rom.offset + rom.data.len();
            if end <= self.ram.len() {
                self.ram[rom.offset..end].copy_from_slice(&rom.data);
            }
        }
    }
}

impl Module for Memory {
    fn module_type(&self) -> ModuleType {
        ModuleType::Memory
    }

    fn required_connections(&self) -> &'static [ModuleType] {
        &[ModuleType::Motherboard]
    }

    fn set_debug(&mut self, debug: bool) {
        self.log.set_debug(debug);
    }

    fn dump(&self) -> String {
        let mut out = format!(
            "size: {} KB ({} KB extended), A20: {}\n",
            self.ram.len() / 1024,
            self.extended_kb,
            self.a20
        );
        for rom in &self.roms {
            out.push_str(&format!(
                "ROM {:05X}-{:05X}\n",
                rom.offset,
                rom.offset + rom.data.len().saturating_sub(1)
            ));
        }
        out
    }
}

impl Resettable for Memory {
    fn reset(&mut self, _ctx: &mut BusContext) -> bool {
        self.ram.fill(0);
        self.restore_roms();
        self.a20 = false;
        true
    }
}

impl PortAccessible for Memory {}
impl Tickable for Memory {}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory(extended_kb: u32) -> Memory {
        Memory::new(LogContext::new(ModuleType::Memory), extended_kb)
    }

    #[test]
    fn test_a20_wraps_high_memory() {
        let mut mem = memory(64);
        mem.write_u8(0x0000_0010, 0xAA);
        assert_eq!(mem.read_u8(0x10_0010), 0xAA);

        mem.set_a20(true);
        mem.write_u8(0x10_0010, 0x55);
        assert_eq!(mem.read_u8(0x10_0010), 0x55);
        assert_eq!(mem.read_u8(0x0000_0010), 0xAA);
    }

    #[test]
    fn test_rom_is_write_protected() {
        let mut mem = memory(0);
        mem.load_rom(0xF0000, vec![0xEA, 0x5B, 0xE0]).unwrap();
        mem.write_u8(0xF0000, 0x00);
        assert_eq!(mem.read_u8(0xF0000), 0xEA);
        assert_eq!(mem.read_u16(0xF0001), 0xE05B);
    }

    #[test]
    fn test_rom_out_of_range() {
        let mut mem = memory(0);
        let err = mem.load_rom(0xFFFF0, vec![0; 32]).unwrap_err();
        assert!(matches!(err, ModuleError::RomOutOfRange { offset: 0xFFFF0, len: 32, .. }));
    }

    #[test]
    fn test_read_beyond_end() {
        let mut mem = memory(0);
        mem.set_a20(true);
        assert_eq!(mem.read_u8(0x10_0000), 0xFF);
    }
}
