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

    devices::vga::draw.rs

    Turns plane contents into pixels on the screen surface.

*/

//! Text modes compare every cell against a snapshot of the last drawn character and attribute
//! and redraw only cells that differ, plus the cells the cursor left and entered. Graphics modes
//! redraw only tiles marked dirty by CPU writes, then clear them.

use super::*;

/// Snapshot value no character/attribute pair can produce.
const CELL_STALE: u32 = u32::MAX;

impl VgaCard {
    /// Bring the screen up to date with video memory.
    pub fn render(&mut self, screen: &mut Screen) {
        if !self.display_enabled() {
            return;
        }
        let g = self.geometry;
        if g.kind == RenderKind::Text && self.crtc.maximum_scanline() == 0 {
            // Character height not programmed yet.
            return;
        }
        if g.width == 0 || g.height == 0 {
            return;
        }

        if (screen.width(), screen.height()) != (g.width, g.height) || self.tiles.surface() != (g.width, g.height) {
            screen.resize(g.width, g.height);
            self.tiles.set_surface(g.width, g.height);
            self.text_snapshot.clear();
            self.last_cursor = None;
        }

        if self.palette_dirty {
            self.rebuild_palettes();
            self.tiles.mark_all();
            self.text_snapshot.clear();
            self.palette_dirty = false;
        }

        let mut pixels = std::mem::take(&mut self.pixel_buf);
        if g.kind == RenderKind::Text {
            self.render_text(screen, &g, &mut pixels);
        }
        else {
            self.render_graphics(screen, &g, &mut pixels);
        }
        self.pixel_buf = pixels;
        self.frames = self.frames.wrapping_add(1);
    }

    /// Cursor cell relative to the start of the page with its scanline range. None when the
    /// cursor is disabled, lies before the start address or beyond the last cell.
    fn cursor_cell(&self, g: &Geometry) -> Option<(usize, u8, u8)> {
        let (start, end) = self.crtc.cursor_scanlines()?;
        let address = self.crtc.cursor_address();
        if address < g.start {
            return None;
        }
        let rel = address - g.start;
        let (row, col) = (rel / g.line_offset.max(1), rel % g.line_offset.max(1));
        if row >= g.rows as usize || col >= g.cols as usize {
            return None;
        }
        Some((row * g.cols as usize + col, start, end))
    }

    fn render_text(&mut self, screen: &mut Screen, g: &Geometry, pixels: &mut Vec<u32>) {
        let cells = (g.cols * g.rows) as usize;
        if cells == 0 {
            return;
        }
        if self.font_dirty {
            screen.invalidate_font();
            self.font_dirty = false;
            self.text_snapshot.clear();
        }
        if self.text_snapshot.len() != cells {
            self.text_snapshot = vec![CELL_STALE; cells];
        }

        let cursor = self.cursor_cell(g);
        let cursor_moved = cursor != self.last_cursor;
        let cell_w = g.char_width * g.x_div;
        pixels.resize((cell_w * g.char_height) as usize, 0);

        for row in 0..g.rows as usize {
            for col in 0..g.cols as usize {
                let cell = row * g.cols as usize + col;
                let word = g.start + row * g.line_offset + col;
                let ch = self.vram.read(0, word * 2);
                let attr = self.vram.read(1, word * 2 + 1);
                let value = (attr as u32) << 8 | ch as u32;

                let on_cursor = cursor_moved
                    && (cursor.map(|c| c.0) == Some(cell) || self.last_cursor.map(|c| c.0) == Some(cell));
                if self.text_snapshot[cell] == value && !on_cursor {
                    continue;
                }
                self.text_snapshot[cell] = value;

                let cursor_lines = cursor.filter(|c| c.0 == cell).map(|c| (c.1, c.2));
                self.draw_cell(g, ch, attr, cursor_lines, pixels);
                screen.blit(col as u32 * cell_w, row as u32 * g.char_height, cell_w, g.char_height, pixels);
            }
        }
        self.last_cursor = cursor;
    }

    fn draw_cell(&self, g: &Geometry, ch: u8, attr: u8, cursor: Option<(u8, u8)>, pixels: &mut [u32]) {
        let mode = self.ac.mode_control();
        let (map_a, map_b) = self.sequencer.character_maps();
        let map = if attr & 0x08 != 0 { map_a } else { map_b };
        let fg = self.palette16[(attr & 0x0F) as usize];
        let bg = if mode.blink() {
            self.palette16[((attr >> 4) & 0x07) as usize]
        }
        else {
            self.palette16[(attr >> 4) as usize]
        };
        let line_graphics = mode.line_graphics() && (0xC0..=0xDF).contains(&ch);
        let cell_w = (g.char_width * g.x_div) as usize;

        for line in 0..g.char_height as usize {
            let glyph = if line < 32 { self.vram.read(2, map + ch as usize * 32 + line) } else { 0 };
            let in_cursor = cursor.is_some_and(|(start, end)| start <= end && (start as usize..=end as usize).contains(&line));
            let row = &mut pixels[line * cell_w..(line + 1) * cell_w];
            for (x, px) in row.iter_mut().enumerate() {
                let dot = x / g.x_div as usize;
                let lit = match dot {
                    0..=7 => glyph & (0x80 >> dot) != 0,
                    _ => line_graphics && glyph & 0x01 != 0,
                };
                *px = if lit || in_cursor { fg } else { bg };
            }
        }
    }

    fn render_graphics(&mut self, screen: &mut Screen, g: &Geometry, pixels: &mut Vec<u32>) {
        let (cols, rows) = self.tiles.extent();
        for ty in 0..rows {
            for tx in 0..cols {
                if !self.tiles.is_dirty(tx, ty) {
                    continue;
                }
                let x0 = tx * TILE_WIDTH;
                let y0 = ty * TILE_HEIGHT;
                let w = TILE_WIDTH.min(g.width - x0);
                let h = TILE_HEIGHT.min(g.height - y0);
                pixels.resize((w * h) as usize, 0);

                for y in 0..h {
                    let my = ((y0 + y) / g.y_div) as usize;
                    for x in 0..w {
                        let mx = ((x0 + x) / g.x_div) as usize;
                        pixels[(y * w + x) as usize] = self.pixel_color(g, mx, my);
                    }
                }
                screen.blit(x0, y0, w, h, pixels);
                self.tiles.clear(tx, ty);
            }
        }
    }

    /// Colour of memory pixel (mx, my) for the current render kind.
    fn pixel_color(&self, g: &Geometry, mx: usize, my: usize) -> u32 {
        match g.kind {
            RenderKind::Planar16 => {
                let offset = g.start + my * g.line_offset + mx / 8;
                let bit = 7 - (mx & 0x07);
                let mut color = 0;
                for plane in 0..4 {
                    color |= ((self.vram.read(plane, offset) >> bit) & 0x01) << plane;
                }
                self.palette16[(color & self.ac.color_plane_enable()) as usize]
            }
            RenderKind::Cga4 => {
                let offset = g.start + (my >> 1) * g.line_offset + (my & 0x01) * 0x2000 + mx / 4;
                let shift = 6 - 2 * (mx & 0x03);
                self.palette16[((self.vram.read(0, offset) >> shift) & 0x03) as usize]
            }
            RenderKind::Cga2 => {
                let offset = g.start + (my >> 1) * g.line_offset + (my & 0x01) * 0x2000 + mx / 8;
                let bit = 7 - (mx & 0x07);
                self.palette16[((self.vram.read(0, offset) >> bit) & 0x01) as usize]
            }
            RenderKind::Chain256 => {
                let linear = g.start + my * g.line_offset + mx;
                self.palette256[self.vram.read(linear & 0x03, linear & !0x03) as usize]
            }
            RenderKind::Unchained256 => {
                let offset = g.start + my * g.line_offset + mx / 4;
                self.palette256[self.vram.read(mx & 0x03, offset) as usize]
            }
            RenderKind::Text => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::unbounded;

    use super::*;
    use crate::host::{EventSink, HostEvent};

    fn card(mode: StandardMode) -> VgaCard {
        let mut vga = VgaCard::new(LogContext::new(ModuleType::Video));
        vga.set_standard_mode(mode);
        vga
    }

    fn screen() -> Screen {
        Screen::new(LogContext::new(ModuleType::Screen), EventSink::none())
    }

    #[test]
    fn test_tile_dirty_clean_cycle() {
        let mut vga = card(StandardMode::Planar640x480);
        let mut screen = screen();
        vga.render(&mut screen);
        assert_eq!(vga.tiles().dirty_count(), 0);

        // Line 30, byte 4: pixels 32-39 in tile (2, 1)
        vga.mem_write_u8(0xA0000 + 30 * 80 + 4, 0xFF);
        assert!(vga.tiles().is_dirty(2, 1));
        assert_eq!(vga.tiles().dirty_count(), 1);

        let blits = screen.frames();
        vga.render(&mut screen);
        assert_eq!(vga.tiles().dirty_count(), 0);
        assert_eq!(screen.frames(), blits + 1);

        let white = vga.dac().rgb(0x3F);
        assert_eq!(screen.pixel(32, 30), Some(white));
        assert_eq!(screen.pixel(39, 30), Some(white));
        assert_eq!(screen.pixel(40, 30), Some(vga.dac().rgb(0x00)));
    }

    #[test]
    fn test_resize_precedes_pixels() {
        let (tx, rx) = unbounded();
        let mut screen = Screen::new(LogContext::new(ModuleType::Screen), EventSink::new(tx));
        let mut vga = card(StandardMode::Text80x25);
        vga.render(&mut screen);

        assert_eq!(rx.try_recv().ok(), Some(HostEvent::ScreenResized { width: 720, height: 400 }));
        assert!(screen.frames() > 0);
        assert_eq!(vga.frames(), 1);
    }

    #[test]
    fn test_unprogrammed_char_height_skips() {
        let mut vga = card(StandardMode::Text80x25);
        vga.port_write(0x3D4, 0x09);
        vga.port_write(0x3D5, 0x00);
        let mut screen = screen();
        vga.render(&mut screen);
        assert_eq!((screen.width(), screen.height()), (0, 0));
        assert_eq!(vga.frames(), 0);
    }

    #[test]
    fn test_text_cell_glyph_and_cursor() {
        let mut vga = card(StandardMode::Text80x25);
        // Plane 2 access for the font
        vga.port_write(0x3C4, 0x02);
        vga.port_write(0x3C5, 0x04);
        vga.port_write(0x3C4, 0x04);
        vga.port_write(0x3C5, 0x06);
        vga.port_write(0x3CE, 0x05);
        vga.port_write(0x3CF, 0x00);
        vga.port_write(0x3CE, 0x06);
        vga.port_write(0x3CF, 0x04);
        // A glyph with a solid top line for 'A' and an empty box drawing character
        vga.mem_write_u8(0xA0000 + 0x41 * 32, 0xFF);
        vga.mem_write_u8(0xA0000 + 0xC4 * 32 + 2, 0x01);
        vga.set_standard_mode(StandardMode::Text80x25);

        vga.mem_write_u8(0xB8000, b'A');
        vga.mem_write_u8(0xB8001, 0x1F);
        vga.mem_write_u8(0xB8002, 0xC4);
        vga.mem_write_u8(0xB8003, 0x1F);

        let (tx, rx) = unbounded();
        let mut screen = Screen::new(LogContext::new(ModuleType::Screen), EventSink::new(tx));
        vga.render(&mut screen);
        assert!(rx.try_iter().any(|e| e == HostEvent::FontChanged));

        let fg = vga.dac().rgb(0x3F);
        let bg = vga.dac().rgb(0x01);
        assert_eq!(screen.pixel(0, 0), Some(fg));
        assert_eq!(screen.pixel(8, 0), Some(bg));
        assert_eq!(screen.pixel(0, 1), Some(bg));
        // Cursor at cell 0, scanlines 13-14
        assert_eq!(screen.pixel(4, 13), Some(fg));
        assert_eq!(screen.pixel(4, 15), Some(bg));
        // Line graphics extend the eighth dot into the ninth column
        assert_eq!(screen.pixel(9 + 7, 2), Some(fg));
        assert_eq!(screen.pixel(9 + 8, 2), Some(fg));
    }

    #[test]
    fn test_text_redraws_only_changed_cells() {
        let mut vga = card(StandardMode::Text80x25);
        let mut screen = screen();
        vga.render(&mut screen);
        let blits = screen.frames();

        vga.render(&mut screen);
        assert_eq!(screen.frames(), blits);

        vga.mem_write_u8(0xB8000 + 2 * 160, b'Z');
        vga.render(&mut screen);
        assert_eq!(screen.frames(), blits + 1);

        // Moving the cursor redraws the cell it left and the one it entered
        vga.port_write(0x3D4, 0x0F);
        vga.port_write(0x3D5, 0x05);
        vga.render(&mut screen);
        assert_eq!(screen.frames(), blits + 3);
    }

    #[test]
    fn test_chain4_pixels() {
        let mut vga = card(StandardMode::Linear320x200);
        let mut screen = screen();
        vga.mem_write_u8(0xA0000 + 320 + 3, 0x09);
        vga.render(&mut screen);
        let color = vga.dac().rgb(0x09);
        // Memory pixel (3, 1) covers surface pixels 6-7 on lines 2-3
        assert_eq!(screen.pixel(6, 2), Some(color));
        assert_eq!(screen.pixel(7, 3), Some(color));
        assert_eq!(screen.pixel(8, 2), Some(vga.dac().rgb(0x00)));
    }

    #[test]
    fn test_cga_odd_bank_pixels() {
        let mut vga = card(StandardMode::Cga320x200);
        let mut screen = screen();
        // Scanline 1 comes from the second bank; leftmost pixel colour 3
        vga.mem_write_u8(0xBA000, 0xC0);
        vga.render(&mut screen);
        let color = vga.dac().rgb(vga.ac.dac_index(3));
        assert_eq!(screen.pixel(0, 2), Some(color));
        assert_eq!(screen.pixel(1, 3), Some(color));
        assert_eq!(screen.pixel(0, 0), Some(vga.dac().rgb(vga.ac.dac_index(0))));
    }
}
