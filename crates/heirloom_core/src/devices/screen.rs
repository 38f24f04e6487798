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

    devices::screen.rs

    Output surface the video adapter draws into.

*/

//! The screen is a plain 32-bit xRGB framebuffer. It does not present anything itself: a front
//! end reads the buffer and listens for [HostEvent::ScreenResized] and [HostEvent::FontChanged]
//! on the host event queue.

use crate::{
    bus::BusContext,
    host::{EventSink, HostEvent},
    logging::LogContext,
    module::{Module, ModuleType, PortAccessible, Resettable, Tickable},
};

pub const MAX_SCREEN_WIDTH: u32 = 800;
pub const MAX_SCREEN_HEIGHT: u32 = 600;
pub const DEFAULT_SCREEN_WIDTH: u32 = 640;
pub const DEFAULT_SCREEN_HEIGHT: u32 = 400;

pub struct Screen {
    log: LogContext,
    events: EventSink,
    width: u32,
    height: u32,
    buf: Vec<u32>,
    frames: u64,
}

impl Screen {
    pub fn new(log: LogContext, events: EventSink) -> Self {
        Self {
            log,
            events,
            width: 0,
            height: 0,
            buf: Vec::new(),
            frames: 0,
        }
    }

    /// Bring up the surface at its default size.
    pub fn init(&mut self) -> bool {
        self.resize(DEFAULT_SCREEN_WIDTH, DEFAULT_SCREEN_HEIGHT);
        true
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn framebuffer(&self) -> &[u32] {
        &self.buf
    }

    /// Number of blits since creation. Front ends use it to skip unchanged frames.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.buf.get((y * self.width + x) as usize).copied()
    }

    /// Change the surface size, clamped to the maximum. The contents are cleared and the host
    /// is told before any pixel data at the new size arrives.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        let width = width.clamp(1, MAX_SCREEN_WIDTH);
        let height = height.clamp(1, MAX_SCREEN_HEIGHT);
        if width == self.width && height == self.height {
            return false;
        }
        self.log.debug(format_args!("Screen resized to {}x{}", width, height));
        self.width = width;
        self.height = height;
        self.buf = vec![0; (width * height) as usize];
        self.events.send(HostEvent::ScreenResized { width, height });
        true
    }

    /// Copy a `w` by `h` block of pixels to (x, y). The block is clipped to the surface.
    pub fn blit(&mut self, x: u32, y: u32, w: u32, h: u32, pixels: &[u32]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let copy_w = w.min(self.width - x) as usize;
        let copy_h = h.min(self.height - y);
        for row in 0..copy_h {
            let src = (row * w) as usize;
            let dst = ((y + row) * self.width + x) as usize;
            if let (Some(src), Some(dst)) = (pixels.get(src..src + copy_w), self.buf.get_mut(dst..dst + copy_w)) {
                dst.copy_from_slice(src);
            }
        }
        self.frames = self.frames.wrapping_add(1);
    }

    /// The adapter's glyph data changed; cached glyph renderings on the host are stale.
    pub fn invalidate_font(&mut self) {
        self.events.send(HostEvent::FontChanged);
    }

    pub fn clear(&mut self) {
        self.buf.fill(0);
    }
}

impl Module for Screen {
    fn module_type(&self) -> ModuleType {
        ModuleType::Screen
    }

    fn required_connections(&self) -> &'static [ModuleType] {
        &[]
    }

    fn set_debug(&mut self, debug: bool) {
        self.log.set_debug(debug);
    }

    fn dump(&self) -> String {
        format!("{}x{} frames: {}\n", self.width, self.height, self.frames)
    }
}

impl Resettable for Screen {
    fn reset(&mut self, _ctx: &mut BusContext) -> bool {
        self.clear();
        true
    }
}

impl PortAccessible for Screen {}
impl Tickable for Screen {}

#[cfg(test)]
mod tests {
    use crossbeam_channel::unbounded;

    use super::*;

    #[test]
    fn test_resize_notifies_once() {
        let (tx, rx) = unbounded();
        let mut screen = Screen::new(LogContext::new(ModuleType::Screen), EventSink::new(tx));
        assert!(screen.resize(720, 400));
        assert!(!screen.resize(720, 400));
        assert_eq!(rx.try_recv().ok(), Some(HostEvent::ScreenResized { width: 720, height: 400 }));
        assert!(rx.try_recv().is_err());
        assert_eq!(screen.framebuffer().len(), 720 * 400);
    }

    #[test]
    fn test_resize_clamps() {
        let mut screen = Screen::new(LogContext::new(ModuleType::Screen), EventSink::none());
        screen.resize(1024, 768);
        assert_eq!((screen.width(), screen.height()), (MAX_SCREEN_WIDTH, MAX_SCREEN_HEIGHT));
    }

    #[test]
    fn test_blit_clips() {
        let mut screen = Screen::new(LogContext::new(ModuleType::Screen), EventSink::none());
        screen.resize(20, 10);
        let tile = vec![0x00FF_FFFF; 16 * 24];
        screen.blit(16, 0, 16, 24, &tile);
        assert_eq!(screen.pixel(19, 9), Some(0x00FF_FFFF));
        assert_eq!(screen.pixel(15, 0), Some(0));
        assert_eq!(screen.pixel(20, 0), None);
    }
}
