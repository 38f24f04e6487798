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

    registry.rs

    Arena of emulated modules addressed by handle and looked up by type.

*/

use fxhash::FxHashMap;

use crate::{
    devices::{
        ata::AtaController,
        board::SystemBoard,
        clock::Clock,
        cpu::CpuModule,
        fdc::FloppyController,
        keyboard::Keyboard,
        memory::Memory,
        mouse::Mouse,
        parallel::ParallelPort,
        pic::Pic,
        pit::Pit,
        rtc::Rtc,
        screen::Screen,
        serial::SerialPort,
        vga::VgaCard,
    },
    module::{Module, ModuleDispatch, ModuleHandle, ModuleType},
};

pub struct ModuleSlot {
    kind: ModuleType,
    connected: bool,
    debug: bool,
    module: Option<ModuleDispatch>,
}

impl ModuleSlot {
    pub fn kind(&self) -> ModuleType {
        self.kind
    }
    pub fn is_connected(&self) -> bool {
        self.connected
    }
    pub fn is_debug(&self) -> bool {
        self.debug
    }
}

/// Ordered collection of every module in the machine.
///
/// Modules keep their insertion order for the life of the registry, so handles remain valid and
/// iteration order is the construction order. A module is briefly absent from its slot while
/// the bus dispatches into it; lookups during that window return None.
#[derive(Default)]
pub struct ModuleRegistry {
    slots:   Vec<ModuleSlot>,
    by_type: FxHashMap<ModuleType, ModuleHandle>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module. The first module registered for a type answers lookups by that type.
    pub fn add(&mut self, module: ModuleDispatch) -> ModuleHandle {
        let handle = ModuleHandle(self.slots.len());
        let kind = module.module_type();
        self.slots.push(ModuleSlot {
            kind,
            connected: false,
            debug: false,
            module: Some(module),
        });
        self.by_type.entry(kind).or_insert(handle);
        handle
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn handles(&self) -> impl Iterator<Item = ModuleHandle> {
        (0..self.slots.len()).map(ModuleHandle)
    }

    pub fn contains(&self, kind: ModuleType) -> bool {
        self.by_type.contains_key(&kind)
    }

    pub fn handle_of(&self, kind: ModuleType) -> Option<ModuleHandle> {
        self.by_type.get(&kind).copied()
    }

    pub fn kind_of(&self, handle: ModuleHandle) -> Option<ModuleType> {
        self.slots.get(handle.0).map(|slot| slot.kind)
    }

    pub fn slot(&self, handle: ModuleHandle) -> Option<&ModuleSlot> {
        self.slots.get(handle.0)
    }

    /// First module of the given type.
    pub fn get(&self, kind: ModuleType) -> Option<&ModuleDispatch> {
        let handle = self.handle_of(kind)?;
        self.get_at(handle.0)
    }

    pub fn get_mut(&mut self, kind: ModuleType) -> Option<&mut ModuleDispatch> {
        let handle = self.handle_of(kind)?;
        self.get_at_mut(handle.0)
    }

    /// Positional access in registration order.
    pub fn get_at(&self, index: usize) -> Option<&ModuleDispatch> {
        self.slots.get(index).and_then(|slot| slot.module.as_ref())
    }

    pub fn get_at_mut(&mut self, index: usize) -> Option<&mut ModuleDispatch> {
        self.slots.get_mut(index).and_then(|slot| slot.module.as_mut())
    }

    pub fn is_connected(&self, kind: ModuleType) -> bool {
        self.handle_of(kind)
            .and_then(|h| self.slots.get(h.0))
            .map(|slot| slot.connected)
            .unwrap_or(false)
    }

    pub(crate) fn set_connected(&mut self, handle: ModuleHandle, connected: bool) {
        if let Some(slot) = self.slots.get_mut(handle.0) {
            slot.connected = connected;
        }
    }

    /// Set the debug flag on every module of the given type.
    pub fn set_debug(&mut self, kind: ModuleType, debug: bool) -> bool {
        let mut found = false;
        for slot in self.slots.iter_mut().filter(|slot| slot.kind == kind) {
            slot.debug = debug;
            if let Some(module) = slot.module.as_mut() {
                module.set_debug(debug);
            }
            found = true;
        }
        found
    }

    /// Remove a module from its slot for the duration of a dispatch.
    pub(crate) fn take(&mut self, handle: ModuleHandle) -> Option<ModuleDispatch> {
        self.slots.get_mut(handle.0).and_then(|slot| slot.module.take())
    }

    pub(crate) fn restore(&mut self, handle: ModuleHandle, module: ModuleDispatch) {
        if let Some(slot) = self.slots.get_mut(handle.0) {
            slot.module = Some(module);
        }
    }
}

macro_rules! typed_accessors {
    ($($get:ident, $get_mut:ident => $variant:ident($ty:ty);)*) => {
        impl ModuleRegistry {
            $(
                pub fn $get(&self) -> Option<&$ty> {
                    match self.get(ModuleType::$variant) {
                        Some(ModuleDispatch::$variant(m)) => Some(m),
                        _ => None,
                    }
                }

                pub fn $get_mut(&mut self) -> Option<&mut $ty> {
                    match self.get_mut(ModuleType::$variant) {
                        Some(ModuleDispatch::$variant(m)) => Some(m),
                        _ => None,
                    }
                }
            )*
        }
    };
}

typed_accessors! {
    clock, clock_mut => Clock(Clock);
    memory, memory_mut => Memory(Memory);
    cpu, cpu_mut => Cpu(CpuModule);
    board, board_mut => Motherboard(SystemBoard);
    pic, pic_mut => Pic(Pic);
    rtc, rtc_mut => Rtc(Rtc);
    pit, pit_mut => Pit(Pit);
    ata, ata_mut => Ata(AtaController);
    fdc, fdc_mut => Fdc(FloppyController);
    keyboard, keyboard_mut => Keyboard(Keyboard);
    mouse, mouse_mut => Mouse(Mouse);
    serial, serial_mut => Serial(SerialPort);
    parallel, parallel_mut => Parallel(ParallelPort);
    video, video_mut => Video(VgaCard);
    screen, screen_mut => Screen(Screen);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{devices::clock::Clock, logging::LogContext};

    #[test]
    fn test_add_and_lookup() {
        let mut registry = ModuleRegistry::new();
        let pic = registry.add(Pic::new(LogContext::new(ModuleType::Pic)).into());
        let clock = registry.add(Clock::new(LogContext::new(ModuleType::Clock), 10, 1000).into());

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.handle_of(ModuleType::Pic), Some(pic));
        assert_eq!(registry.kind_of(clock), Some(ModuleType::Clock));
        assert!(registry.pic().is_some());
        assert!(registry.get(ModuleType::Fdc).is_none());
        assert!(registry.get_at(1).is_some());
        assert!(registry.get_at(2).is_none());
    }

    #[test]
    fn test_first_match_wins() {
        let mut registry = ModuleRegistry::new();
        let first = registry.add(Clock::new(LogContext::new(ModuleType::Clock), 10, 1000).into());
        let _second = registry.add(Clock::new(LogContext::new(ModuleType::Clock), 20, 1000).into());
        assert_eq!(registry.handle_of(ModuleType::Clock), Some(first));
        assert_eq!(registry.clock().map(|c| c.speed_mhz()), Some(10));
    }

    #[test]
    fn test_take_and_restore() {
        let mut registry = ModuleRegistry::new();
        let h = registry.add(Pic::new(LogContext::new(ModuleType::Pic)).into());
        let module = registry.take(h).expect("module present");
        assert!(registry.pic().is_none());
        registry.restore(h, module);
        assert!(registry.pic().is_some());
    }
}
