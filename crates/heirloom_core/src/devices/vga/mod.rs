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

    devices::vga::mod.rs

    VGA-class video adapter.

*/

//! The video adapter is split the way the hardware is: [sequencer], [crtc], [graphics] and
//! [attribute] register banks, the [dac], and four 64K planes of video memory. CPU accesses to
//! the legacy window run through the Graphics Controller pipeline in [memory]; the [draw]
//! module turns plane contents into pixels on the [Screen] surface, redrawing only dirty
//! [tiles] in graphics modes and only changed cells in text mode.

pub mod attribute;
pub mod crtc;
pub mod dac;
pub mod draw;
pub mod graphics;
pub mod io;
pub mod memory;
pub mod modes;
pub mod sequencer;
pub mod tiles;

use modular_bitfield::prelude::*;

use crate::{
    bus::BusContext,
    devices::screen::{Screen, MAX_SCREEN_HEIGHT, MAX_SCREEN_WIDTH},
    logging::LogContext,
    module::{normalize_interval, Module, ModuleType, Resettable, Tickable},
};

pub use attribute::AttributeController;
pub use crtc::Crtc;
pub use dac::Dac;
pub use graphics::{GraphicsController, MemoryMap, ShiftMode};
pub use memory::{PlanarMemory, PLANE_SIZE};
pub use modes::StandardMode;
pub use sequencer::Sequencer;
pub use tiles::{TileGrid, TILE_HEIGHT, TILE_WIDTH};

pub const DEFAULT_UPDATE_INTERVAL: u32 = 16666;
/// Length of one displayed frame at 60Hz.
pub const FRAME_US: u64 = 16666;

#[bitfield]
#[derive(Copy, Clone)]
pub struct MiscOutputRegister {
    /// Set for colour (0x3Dx) I/O addressing, clear for monochrome (0x3Bx).
    pub io_address_color: bool,
    pub ram_enable: bool,
    pub clock_select: B2,
    #[skip]
    unused: B1,
    pub page_select: bool,
    pub hsync_negative: bool,
    pub vsync_negative: bool,
}

/// How the planes are turned into pixels for the current register state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RenderKind {
    Text,
    /// 16 colours, one bit per plane.
    Planar16,
    /// CGA compatible 2 colour, one bit per pixel from plane 0 with bank interleave.
    Cga2,
    /// CGA compatible 4 colour, two bits per pixel from plane 0 with bank interleave.
    Cga4,
    /// 256 colours with chain-four addressing.
    Chain256,
    /// 256 colours across unchained planes.
    Unchained256,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Geometry {
    pub kind: RenderKind,
    pub width: u32,
    pub height: u32,
    /// Surface pixels per memory pixel, horizontally.
    pub x_div: u32,
    /// Surface lines per memory line.
    pub y_div: u32,
    /// Start of the display in the addressing units of `kind`.
    pub start: usize,
    /// Distance between rows: words per text row, bytes per line otherwise.
    pub line_offset: usize,
    pub char_width: u32,
    pub char_height: u32,
    pub cols: u32,
    pub rows: u32,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            kind: RenderKind::Text,
            width: 0,
            height: 0,
            x_div: 1,
            y_div: 1,
            start: 0,
            line_offset: 0,
            char_width: 9,
            char_height: 16,
            cols: 0,
            rows: 0,
        }
    }
}

pub struct VgaCard {
    log: LogContext,
    misc_output: MiscOutputRegister,
    feature_control: u8,
    enabled: bool,
    sequencer: Sequencer,
    crtc: Crtc,
    gc: GraphicsController,
    ac: AttributeController,
    dac: Dac,
    vram: PlanarMemory,

    geometry: Geometry,
    tiles: TileGrid,
    palette16: [u32; 16],
    palette256: Vec<u32>,
    palette_dirty: bool,
    font_dirty: bool,
    text_snapshot: Vec<u32>,
    /// Cell index and scanline range of the cursor as last drawn.
    last_cursor: Option<(usize, u8, u8)>,
    pixel_buf: Vec<u32>,

    update_interval: u32,
    frames: u64,
}

impl VgaCard {
    pub fn new(log: LogContext) -> Self {
        let mut vga = Self {
            log,
            misc_output: MiscOutputRegister::new(),
            feature_control: 0,
            enabled: true,
            sequencer: Sequencer::default(),
            crtc: Crtc::default(),
            gc: GraphicsController::default(),
            ac: AttributeController::default(),
            dac: Dac::default(),
            vram: PlanarMemory::new(),
            geometry: Geometry::default(),
            tiles: TileGrid::default(),
            palette16: [0; 16],
            palette256: vec![0; 256],
            palette_dirty: true,
            font_dirty: false,
            text_snapshot: Vec::new(),
            last_cursor: None,
            pixel_buf: Vec::new(),
            update_interval: DEFAULT_UPDATE_INTERVAL,
            frames: 0,
        };
        vga.recalculate_mode();
        vga
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn tiles(&self) -> &TileGrid {
        &self.tiles
    }

    pub fn vram(&self) -> &PlanarMemory {
        &self.vram
    }

    pub fn dac(&self) -> &Dac {
        &self.dac
    }

    pub fn latches(&self) -> [u8; 4] {
        self.gc.latches()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    #[inline]
    pub fn text_mode(&self) -> bool {
        !self.gc.graphics_mode()
    }

    #[inline]
    pub fn color_addressing(&self) -> bool {
        self.misc_output.io_address_color()
    }

    /// The display is being driven: the sequencer runs, the screen is on, and the attribute
    /// controller has the palette address source set.
    pub fn display_enabled(&self) -> bool {
        self.enabled && self.sequencer.running() && !self.sequencer.screen_off() && self.ac.palette_source()
    }

    /// Visible surface size implied by the CRTC.
    ///
    /// Width is the horizontal display end in character clocks, height the vertical display
    /// end with its two overflow bits. One planar CRTC signature is reported as 320x240 even
    /// though the generic calculation gives 640x480.
    pub fn determine_screen_size(&self) -> (u32, u32) {
        let hde = self.crtc.horizontal_display_end() + 1;
        let vde = self.crtc.vertical_display_end() + 1;

        if self.text_mode() {
            let mut width = hde * self.sequencer.char_width();
            if self.sequencer.dot_clock_half() {
                width *= 2;
            }
            return (width, vde);
        }

        if !self.gc.color_256()
            && self.crtc.reg(0x06) == 0xBF
            && self.crtc.reg(0x17) == 0xA3
            && self.crtc.reg(0x14) == 0x40
            && self.crtc.reg(0x09) == 0x41
        {
            return (320, 240);
        }

        let mut width = hde * 8;
        if self.sequencer.dot_clock_half() {
            width *= 2;
        }
        (width, vde)
    }

    fn render_kind(&self) -> RenderKind {
        if self.text_mode() {
            RenderKind::Text
        }
        else if self.gc.color_256() {
            if self.sequencer.chain4() {
                RenderKind::Chain256
            }
            else {
                RenderKind::Unchained256
            }
        }
        else if self.gc.shift_mode() == ShiftMode::CgaCompatible {
            RenderKind::Cga4
        }
        else if self.gc.memory_map() == MemoryMap::B8000_32K {
            RenderKind::Cga2
        }
        else {
            RenderKind::Planar16
        }
    }

    /// Recompute the display geometry from the register banks. Any change forces a full redraw.
    pub fn recalculate_mode(&mut self) {
        let (width, height) = self.determine_screen_size();
        let width = width.min(MAX_SCREEN_WIDTH);
        let height = height.min(MAX_SCREEN_HEIGHT);
        let kind = self.render_kind();
        let char_height = self.crtc.maximum_scanline() as u32 + 1;
        let char_width = self.sequencer.char_width();
        let double = if self.crtc.double_scan() { 2 } else { 1 };
        let signature = !self.text_mode() && (width, height) == (320, 240);

        let mut g = Geometry {
            kind,
            width,
            height,
            char_width,
            char_height,
            ..Geometry::default()
        };

        let bytes_per_line = self.crtc.offset() * 2 * if self.crtc.dword_mode() { 4 } else { 1 };
        match kind {
            RenderKind::Text => {
                g.x_div = if self.sequencer.dot_clock_half() { 2 } else { 1 };
                g.start = self.crtc.start_address();
                g.line_offset = self.crtc.offset() * 2;
                g.cols = self.crtc.horizontal_display_end() + 1;
                g.rows = height / char_height;
            }
            RenderKind::Cga2 | RenderKind::Cga4 => {
                g.x_div = if self.sequencer.dot_clock_half() { 2 } else { 1 };
                g.y_div = double;
                g.start = self.crtc.start_address() * 2;
                g.line_offset = self.crtc.offset() * if self.crtc.word_mode() { 4 } else { 2 };
            }
            _ => {
                if !signature {
                    let wide = self.sequencer.dot_clock_half() || self.ac.mode_control().color_8bit();
                    g.x_div = if wide { 2 } else { 1 };
                    g.y_div = char_height * double;
                }
                g.start = if kind == RenderKind::Chain256 {
                    self.crtc.start_address() * 4
                }
                else {
                    self.crtc.start_address()
                };
                g.line_offset = bytes_per_line;
            }
        }

        if g != self.geometry {
            self.log.debug(format_args!(
                "Mode change: {:?} {}x{} start: {:04X} offset: {}",
                g.kind, g.width, g.height, g.start, g.line_offset
            ));
            self.geometry = g;
            self.tiles.mark_all();
            self.text_snapshot.clear();
        }
    }

    /// Rebuild the cached colour tables from the attribute palette and the DAC.
    fn rebuild_palettes(&mut self) {
        let mask = self.dac.pel_mask();
        for (color, rgb) in self.palette16.iter_mut().enumerate() {
            *rgb = self.dac.rgb(self.ac.dac_index(color as u8) & mask);
        }
        for (index, rgb) in self.palette256.iter_mut().enumerate() {
            *rgb = self.dac.rgb(index as u8 & mask);
        }
    }

    /// Input status register 1: bit 3 vertical retrace, bit 0 display disabled. Both are
    /// derived from the virtual clock and the CRTC timing registers. Reading it returns the
    /// attribute flip-flop to address mode.
    pub fn read_input_status_1(&mut self, now_us: u64) -> u8 {
        self.ac.reset_flip_flop();

        let mut vtotal = self.crtc.vertical_total() as u64;
        let mut vde = self.crtc.vertical_display_end() as u64 + 1;
        let mut vr_start = self.crtc.vertical_retrace_start() as u64;
        let mut vr_end = self.crtc.vertical_retrace_end() as u64;
        if vtotal <= vde {
            // Unprogrammed CRTC: assume a 525 line frame.
            vtotal = 525;
            vde = 480;
            vr_start = 490;
            vr_end = 492;
        }

        let frame_pos = now_us % FRAME_US;
        let line_pos = frame_pos * vtotal;
        let line = line_pos / FRAME_US;

        let mut status = 0;
        if line >= vr_start && line < vr_end {
            status |= 0x08;
        }
        if line >= vde {
            status |= 0x01;
        }
        else {
            let htotal = self.crtc.horizontal_total() as u64;
            let hde = self.crtc.horizontal_display_end() as u64 + 1;
            let column = (line_pos % FRAME_US) * htotal / FRAME_US;
            if htotal > hde && column >= hde {
                status |= 0x01;
            }
        }
        status
    }

    /// The visible text page, one line per row with trailing blanks removed. None in graphics
    /// modes.
    pub fn screen_text(&self) -> Option<String> {
        let g = &self.geometry;
        if g.kind != RenderKind::Text || g.cols == 0 {
            return None;
        }
        let mut lines = Vec::with_capacity(g.rows as usize);
        for row in 0..g.rows as usize {
            let mut line = String::with_capacity(g.cols as usize);
            for col in 0..g.cols as usize {
                let word = g.start + row * g.line_offset + col;
                let ch = self.vram.read(0, word * 2);
                line.push(match ch {
                    0x20..=0x7E => ch as char,
                    _ => ' ',
                });
            }
            lines.push(line.trim_end().to_string());
        }
        Some(lines.join("\n"))
    }
}

impl Module for VgaCard {
    fn module_type(&self) -> ModuleType {
        ModuleType::Video
    }

    fn required_connections(&self) -> &'static [ModuleType] {
        &[ModuleType::Motherboard, ModuleType::Screen]
    }

    fn set_debug(&mut self, debug: bool) {
        self.log.set_debug(debug);
    }

    fn dump(&self) -> String {
        let g = &self.geometry;
        let mut out = format!(
            "misc: {:02X} mode: {:?} {}x{} start: {:04X} offset: {} div: {}x{}\n",
            self.misc_output.into_bytes()[0],
            g.kind,
            g.width,
            g.height,
            g.start,
            g.line_offset,
            g.x_div,
            g.y_div
        );
        out.push_str(&self.sequencer.dump());
        out.push_str(&self.crtc.dump());
        out.push_str(&self.gc.dump());
        out.push_str(&self.ac.dump());
        out.push_str(&format!(
            "DAC state: {:02X} write: {:02X}.{} read: {:02X}.{} pel mask: {:02X} dirty tiles: {}\n",
            self.dac.state(),
            self.dac.write_index(),
            self.dac.write_phase(),
            self.dac.read_index(),
            self.dac.read_phase(),
            self.dac.pel_mask(),
            self.tiles.dirty_count()
        ));
        out
    }
}

impl Resettable for VgaCard {
    fn reset(&mut self, _ctx: &mut BusContext) -> bool {
        self.misc_output = MiscOutputRegister::new();
        self.feature_control = 0;
        self.enabled = true;
        self.sequencer = Sequencer::default();
        self.crtc = Crtc::default();
        self.gc = GraphicsController::default();
        self.ac = AttributeController::default();
        self.dac = Dac::default();
        self.palette_dirty = true;
        self.font_dirty = false;
        self.last_cursor = None;
        self.recalculate_mode();
        self.tiles.mark_all();
        self.text_snapshot.clear();
        true
    }
}

impl Tickable for VgaCard {
    fn update_interval(&self) -> Option<u32> {
        Some(self.update_interval)
    }

    fn set_update_interval(&mut self, interval: i64) {
        self.update_interval = normalize_interval(interval, DEFAULT_UPDATE_INTERVAL);
    }

    fn update(&mut self, ctx: &mut BusContext) {
        let Some(screen) = ctx.modules_mut().screen_mut()
        else {
            return;
        };
        self.render(screen);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card() -> VgaCard {
        VgaCard::new(LogContext::new(ModuleType::Video))
    }

    #[test]
    fn test_standard_mode_sizes() {
        let mut vga = card();
        vga.set_standard_mode(StandardMode::Text80x25);
        assert_eq!(vga.determine_screen_size(), (720, 400));
        assert_eq!(vga.geometry().kind, RenderKind::Text);
        assert_eq!((vga.geometry().cols, vga.geometry().rows), (80, 25));

        vga.set_standard_mode(StandardMode::Planar640x480);
        assert_eq!(vga.determine_screen_size(), (640, 480));
        assert_eq!(vga.geometry().kind, RenderKind::Planar16);

        vga.set_standard_mode(StandardMode::Linear320x200);
        assert_eq!(vga.determine_screen_size(), (640, 400));
        assert_eq!(vga.geometry().kind, RenderKind::Chain256);
        assert_eq!((vga.geometry().x_div, vga.geometry().y_div), (2, 2));
        assert_eq!(vga.geometry().line_offset, 320);

        vga.set_standard_mode(StandardMode::Cga320x200);
        assert_eq!(vga.geometry().kind, RenderKind::Cga4);
        assert_eq!(vga.determine_screen_size(), (640, 400));
    }

    #[test]
    fn test_320x240_signature() {
        let mut vga = card();
        vga.set_standard_mode(StandardMode::Planar640x480);
        // The 256 colour CRTC timings on a planar mode
        for (index, value) in [(0x11u8, 0x0Eu8), (0x06, 0xBF), (0x17, 0xA3), (0x14, 0x40), (0x09, 0x41)] {
            vga.port_write(0x3D4, index);
            vga.port_write(0x3D5, value);
        }
        assert_eq!(vga.determine_screen_size(), (320, 240));
        assert_eq!((vga.geometry().x_div, vga.geometry().y_div), (1, 1));

        // The same timings in 256 colour mode are the ordinary 320x200 mode
        vga.set_standard_mode(StandardMode::Linear320x200);
        assert_eq!(vga.determine_screen_size(), (640, 400));
    }

    #[test]
    fn test_retrace_follows_clock() {
        let mut vga = card();
        vga.set_standard_mode(StandardMode::Planar640x480);
        // 525 lines per frame; line 0 is inside the active display
        assert_eq!(vga.read_input_status_1(0) & 0x08, 0);
        let retrace_us = FRAME_US * 491 / 525;
        assert_eq!(vga.read_input_status_1(retrace_us) & 0x09, 0x09);
        let blank_us = FRAME_US * 500 / 525;
        assert_eq!(vga.read_input_status_1(blank_us) & 0x09, 0x01);
    }

    #[test]
    fn test_screen_text() {
        let mut vga = card();
        vga.set_standard_mode(StandardMode::Linear320x200);
        assert_eq!(vga.screen_text(), None);

        vga.set_standard_mode(StandardMode::Text80x25);
        for (i, b) in b"C:\\>".iter().enumerate() {
            vga.mem_write_u8(0xB8000 + i as u32 * 2, *b);
            vga.mem_write_u8(0xB8001 + i as u32 * 2, 0x07);
        }
        vga.mem_write_u8(0xB8000 + 160, b'A');
        let text = vga.screen_text().unwrap_or_default();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 25);
        assert_eq!(lines[0], "C:\\>");
        assert_eq!(lines[1], "A");
    }
}
