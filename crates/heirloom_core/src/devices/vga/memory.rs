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

    devices::vga::memory.rs

    Planar video memory and the CPU access path into it.

*/

//! CPU addresses are first resolved against the memory map window selected in the Graphics
//! Controller, then spread across the planes. Chain-four sends the two low address bits to the
//! plane select. CGA compatible graphics modes store linearly to plane 0. Everything else goes
//! through the Graphics Controller write modes, with odd/even steering even addresses to planes
//! 0 and 2 and odd addresses to planes 1 and 3.

use super::*;
use crate::module::NO_IO_BYTE;

pub const PLANE_SIZE: usize = 0x10000;
const PLANE_MASK: usize = PLANE_SIZE - 1;
/// Size of one character map in plane 2.
const CHARACTER_MAP_SIZE: usize = 0x2000;

pub struct PlanarMemory {
    planes: Vec<u8>,
}

impl Default for PlanarMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanarMemory {
    pub fn new() -> Self {
        Self {
            planes: vec![0; PLANE_SIZE * 4],
        }
    }

    #[inline]
    pub fn read(&self, plane: usize, offset: usize) -> u8 {
        self.planes[(plane & 0x03) * PLANE_SIZE + (offset & PLANE_MASK)]
    }

    #[inline]
    pub fn write(&mut self, plane: usize, offset: usize, byte: u8) {
        self.planes[(plane & 0x03) * PLANE_SIZE + (offset & PLANE_MASK)] = byte;
    }

    pub fn plane(&self, plane: usize) -> &[u8] {
        let base = (plane & 0x03) * PLANE_SIZE;
        &self.planes[base..base + PLANE_SIZE]
    }

    pub fn clear(&mut self) {
        self.planes.fill(0);
    }
}

impl VgaCard {
    /// Offset of an address inside the selected memory map window, masked to a plane.
    fn map_offset(&self, address: u32) -> Option<usize> {
        let (start, end) = self.gc.memory_map().window();
        if address < start || address > end {
            return None;
        }
        Some((address - start) as usize & PLANE_MASK)
    }

    #[inline]
    fn cga_direct(&self) -> bool {
        self.gc.graphics_mode() && self.gc.memory_map() == MemoryMap::B8000_32K
    }

    /// CPU read from the legacy video window. Any read loads all four latches.
    pub fn mem_read_u8(&mut self, address: u32) -> u8 {
        let Some(offset) = self.map_offset(address)
        else {
            return NO_IO_BYTE;
        };

        if self.cga_direct() {
            self.gc.load_latches(&self.vram, offset);
            return self.vram.read(0, offset);
        }
        if self.sequencer.chain4() {
            let base = offset & !0x03;
            self.gc.load_latches(&self.vram, base);
            return self.vram.read(offset & 0x03, base);
        }
        self.gc.cpu_read(&self.vram, offset)
    }

    /// CPU write to the legacy video window. Writes outside the selected window are ignored.
    pub fn mem_write_u8(&mut self, address: u32, data: u8) {
        let Some(offset) = self.map_offset(address)
        else {
            return;
        };

        if self.cga_direct() {
            self.vram.write(0, offset, data);
            self.mark_write(offset);
            return;
        }

        if self.sequencer.chain4() {
            let plane = offset & 0x03;
            if self.sequencer.map_mask() & (1 << plane) != 0 {
                self.vram.write(plane, offset & !0x03, data);
                self.mark_write(offset);
            }
            return;
        }

        let mut plane_mask = self.sequencer.map_mask();
        if self.sequencer.odd_even() {
            plane_mask &= if offset & 0x01 == 0 { 0b0101 } else { 0b1010 };
        }
        let written = self.gc.cpu_write(&mut self.vram, offset, plane_mask, data);
        if written == 0 {
            return;
        }

        if self.text_mode() {
            if written & 0b0100 != 0 && self.in_character_map(offset) {
                self.font_dirty = true;
            }
        }
        else {
            self.mark_write(offset);
        }
    }

    fn in_character_map(&self, offset: usize) -> bool {
        let (map_a, map_b) = self.sequencer.character_maps();
        (map_a..map_a + CHARACTER_MAP_SIZE).contains(&offset) || (map_b..map_b + CHARACTER_MAP_SIZE).contains(&offset)
    }

    /// Mark the tiles showing the memory at `offset`, using the line offset, the horizontal
    /// and vertical scaling and the CGA bank interleave of the current mode.
    fn mark_write(&mut self, offset: usize) {
        let g = self.geometry;
        if g.line_offset == 0 {
            return;
        }
        let rel = offset.wrapping_sub(g.start) & PLANE_MASK;
        let (x_div, y_div) = (g.x_div as usize, g.y_div as usize);

        let (x0, x1, y0, y1) = match g.kind {
            RenderKind::Text => return,
            RenderKind::Planar16 | RenderKind::Unchained256 => {
                let per_byte = if g.kind == RenderKind::Planar16 { 8 } else { 4 };
                let line = rel / g.line_offset;
                let column = rel % g.line_offset;
                let x0 = column * per_byte * x_div;
                (x0, x0 + per_byte * x_div, line * y_div, (line + 1) * y_div)
            }
            RenderKind::Chain256 => {
                let line = rel / g.line_offset;
                let x0 = (rel % g.line_offset) * x_div;
                (x0, x0 + x_div, line * y_div, (line + 1) * y_div)
            }
            RenderKind::Cga2 | RenderKind::Cga4 => {
                let per_byte = if g.kind == RenderKind::Cga4 { 4 } else { 8 };
                let bank = (rel >> 13) & 0x01;
                let within = rel & 0x1FFF;
                let scan = (within / g.line_offset) * 2 + bank;
                let x0 = (within % g.line_offset) * per_byte * x_div;
                (x0, x0 + per_byte * x_div, scan * y_div, (scan + 1) * y_div)
            }
        };

        let clamp = |v: usize| v.min(u32::MAX as usize) as u32;
        self.tiles.mark_region(clamp(x0), clamp(y0), clamp(x1), clamp(y1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(mode: StandardMode) -> VgaCard {
        let mut vga = VgaCard::new(LogContext::new(ModuleType::Video));
        vga.set_standard_mode(mode);
        vga
    }

    fn clear_tiles(vga: &mut VgaCard) {
        let (cols, rows) = vga.tiles.extent();
        for ty in 0..rows {
            for tx in 0..cols {
                vga.tiles.clear(tx, ty);
            }
        }
    }

    #[test]
    fn test_window_selection() {
        let mut vga = card(StandardMode::Planar640x480);
        // Map 1: 0xA0000-0xAFFFF only
        vga.mem_write_u8(0xB8000, 0x55);
        assert_eq!(vga.vram.read(0, 0x8000), 0);
        assert_eq!(vga.vram.read(0, 0x18000), 0);
        assert_eq!(vga.mem_read_u8(0xB8000), 0xFF);

        vga.mem_write_u8(0xA0010, 0x55);
        for plane in 0..4 {
            assert_eq!(vga.vram.read(plane, 0x10), 0x55);
        }
    }

    #[test]
    fn test_chain4_addressing() {
        let mut vga = card(StandardMode::Linear320x200);
        vga.mem_write_u8(0xA0006, 0x42);
        assert_eq!(vga.vram.read(2, 0x04), 0x42);
        assert_eq!(vga.mem_read_u8(0xA0006), 0x42);
        assert_eq!(vga.latches()[2], 0x42);
    }

    #[test]
    fn test_cga_writes_plane_0() {
        let mut vga = card(StandardMode::Cga320x200);
        vga.mem_write_u8(0xB8001, 0xE4);
        vga.mem_write_u8(0xBA000, 0x1B);
        assert_eq!(vga.vram.read(0, 0x0001), 0xE4);
        assert_eq!(vga.vram.read(0, 0x2000), 0x1B);
        assert_eq!(vga.vram.read(1, 0x0001), 0);
    }

    #[test]
    fn test_odd_even_text_planes() {
        let mut vga = card(StandardMode::Text80x25);
        vga.mem_write_u8(0xB8000, b'X');
        vga.mem_write_u8(0xB8001, 0x1F);
        assert_eq!(vga.vram.read(0, 0), b'X');
        assert_eq!(vga.vram.read(1, 1), 0x1F);
        assert_eq!(vga.vram.read(1, 0), 0);
        assert_eq!(vga.mem_read_u8(0xB8001), 0x1F);
    }

    #[test]
    fn test_planar_write_marks_tile() {
        let mut vga = card(StandardMode::Planar640x480);
        vga.tiles.set_surface(640, 480);
        clear_tiles(&mut vga);

        // Line 30, bytes 4-5 cover pixels 32-47: tile column 2, tile row 1
        vga.mem_write_u8(0xA0000 + 30 * 80 + 4, 0xFF);
        assert!(vga.tiles.is_dirty(2, 1));
        assert_eq!(vga.tiles.dirty_count(), 1);
    }

    #[test]
    fn test_double_scan_marks_both_rows() {
        let mut vga = card(StandardMode::Linear320x200);
        vga.tiles.set_surface(640, 400);
        clear_tiles(&mut vga);

        // Memory line 12 shows on surface lines 24 and 25
        vga.mem_write_u8(0xA0000 + 12 * 320, 0x0F);
        assert!(vga.tiles.is_dirty(0, 1));
        assert_eq!(vga.tiles.dirty_count(), 1);

        // Memory line 11 shows on lines 22 and 23, both in tile row 0
        vga.mem_write_u8(0xA0000 + 11 * 320 + 8, 0x0F);
        assert!(vga.tiles.is_dirty(1, 0));
        assert_eq!(vga.tiles.dirty_count(), 2);
    }

    #[test]
    fn test_cga_interleave_marks_odd_scanline() {
        let mut vga = card(StandardMode::Cga320x200);
        vga.tiles.set_surface(640, 400);
        clear_tiles(&mut vga);

        // Bank 1, row 5: scanline 11, surface lines 22-23
        vga.mem_write_u8(0xBA000 + 5 * 80, 0xFF);
        assert!(vga.tiles.is_dirty(0, 0));
        // Bank 0, row 6: scanline 12, surface lines 24-25
        vga.mem_write_u8(0xB8000 + 6 * 80, 0xFF);
        assert!(vga.tiles.is_dirty(0, 1));
        assert_eq!(vga.tiles.dirty_count(), 2);
    }

    #[test]
    fn test_font_write_sets_font_dirty() {
        let mut vga = card(StandardMode::Text80x25);
        // Sequential access to plane 2, as done when loading a font
        vga.port_write(0x3C4, 0x02);
        vga.port_write(0x3C5, 0x04);
        vga.port_write(0x3C4, 0x04);
        vga.port_write(0x3C5, 0x06);
        vga.port_write(0x3CE, 0x05);
        vga.port_write(0x3CF, 0x00);
        vga.port_write(0x3CE, 0x06);
        vga.port_write(0x3CF, 0x04);

        assert!(!vga.font_dirty);
        vga.mem_write_u8(0xA0000 + 0x41 * 32, 0x18);
        assert_eq!(vga.vram.read(2, 0x41 * 32), 0x18);
        assert!(vga.font_dirty);
    }
}
