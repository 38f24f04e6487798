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

    module.rs

    The module contract shared by every emulated component.

*/

//! A module is any component of the emulated machine: the CPU, memory, the motherboard itself
//! and every device. Each module implements [Module] and opts into the capabilities it needs:
//! [Resettable], [PortAccessible] and [Tickable]. All concrete modules are variants of the
//! closed [ModuleDispatch] enum, and trait calls on it are dispatched with `enum_dispatch`.

use enum_dispatch::enum_dispatch;
use serde_derive::Deserialize;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    bus::BusContext,
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
};

/// Value returned for a read from an I/O port nothing answers.
pub const NO_IO_BYTE: u8 = 0xFF;

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumString, EnumIter, AsRefStr, IntoStaticStr, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ModuleType {
    Clock,
    Memory,
    Cpu,
    Motherboard,
    Pic,
    Rtc,
    Pit,
    Ata,
    Fdc,
    Keyboard,
    Mouse,
    Serial,
    Parallel,
    Video,
    Screen,
}

impl ModuleType {
    /// Target string used for `log` records emitted by modules of this type.
    pub fn log_target(&self) -> &'static str {
        match self {
            ModuleType::Clock => "heirloom::clock",
            ModuleType::Memory => "heirloom::memory",
            ModuleType::Cpu => "heirloom::cpu",
            ModuleType::Motherboard => "heirloom::motherboard",
            ModuleType::Pic => "heirloom::pic",
            ModuleType::Rtc => "heirloom::rtc",
            ModuleType::Pit => "heirloom::pit",
            ModuleType::Ata => "heirloom::ata",
            ModuleType::Fdc => "heirloom::fdc",
            ModuleType::Keyboard => "heirloom::keyboard",
            ModuleType::Mouse => "heirloom::mouse",
            ModuleType::Serial => "heirloom::serial",
            ModuleType::Parallel => "heirloom::parallel",
            ModuleType::Video => "heirloom::video",
            ModuleType::Screen => "heirloom::screen",
        }
    }
}

/// Stable index of a module within the registry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleHandle(pub(crate) usize);

impl ModuleHandle {
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Identity and wiring requirements of a module.
#[enum_dispatch(ModuleDispatch)]
pub trait Module {
    fn module_type(&self) -> ModuleType;

    /// Module types that must be registered for this module to be considered connected.
    fn required_connections(&self) -> &'static [ModuleType];

    fn set_debug(&mut self, debug: bool);

    /// Human readable register dump.
    fn dump(&self) -> String;
}

/// Modules with state to restore on a warm or cold reset.
#[enum_dispatch(ModuleDispatch)]
pub trait Resettable {
    /// Return the module to its power-on state. Port bindings and timers are re-registered here
    /// because the bus clears both at the start of a reset pass.
    fn reset(&mut self, ctx: &mut BusContext) -> bool;

    /// Called once when emulation stops.
    fn stop(&mut self, _ctx: &mut BusContext) {}
}

/// Modules that answer on I/O ports.
#[enum_dispatch(ModuleDispatch)]
pub trait PortAccessible {
    fn port_list(&self) -> Vec<(String, u16)> {
        Vec::new()
    }

    fn read_u8(&mut self, _port: u16, _ctx: &mut BusContext) -> u8 {
        NO_IO_BYTE
    }

    fn write_u8(&mut self, _port: u16, _data: u8, _ctx: &mut BusContext) {}

    /// Word access for ports whose two bytes belong to this module.
    fn read_u16(&mut self, port: u16, ctx: &mut BusContext) -> u16 {
        let lo = self.read_u8(port, ctx);
        let hi = self.read_u8(port.wrapping_add(1), ctx);
        (hi as u16) << 8 | lo as u16
    }

    fn write_u16(&mut self, port: u16, data: u16, ctx: &mut BusContext) {
        self.write_u8(port, data as u8, ctx);
        self.write_u8(port.wrapping_add(1), (data >> 8) as u8, ctx);
    }
}

/// Modules driven periodically by the bus timer scheduler.
#[enum_dispatch(ModuleDispatch)]
pub trait Tickable {
    /// Current update interval in microseconds, or None for modules that never tick.
    fn update_interval(&self) -> Option<u32> {
        None
    }

    /// Set the update interval. Non-positive values select the module's default.
    fn set_update_interval(&mut self, _interval: i64) {}

    /// Whether the module's timer starts active after a reset.
    fn timer_active_on_reset(&self) -> bool {
        true
    }

    fn update(&mut self, _ctx: &mut BusContext) {}
}

/// Normalize a configured update interval against a module default.
pub fn normalize_interval(interval: i64, default: u32) -> u32 {
    if interval <= 0 {
        default
    }
    else {
        u32::try_from(interval).unwrap_or(u32::MAX)
    }
}

#[enum_dispatch]
pub enum ModuleDispatch {
    Clock(Clock),
    Memory(Memory),
    Cpu(CpuModule),
    Motherboard(SystemBoard),
    Pic(Pic),
    Rtc(Rtc),
    Pit(Pit),
    Ata(AtaController),
    Fdc(FloppyController),
    Keyboard(Keyboard),
    Mouse(Mouse),
    Serial(SerialPort),
    Parallel(ParallelPort),
    Video(VgaCard),
    Screen(Screen),
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_module_type_strings() {
        assert_eq!(ModuleType::Motherboard.to_string(), "motherboard");
        assert_eq!(ModuleType::from_str("video").ok(), Some(ModuleType::Video));
        assert!(ModuleType::from_str("soundblaster").is_err());
    }

    #[test]
    fn test_normalize_interval() {
        assert_eq!(normalize_interval(0, 1000), 1000);
        assert_eq!(normalize_interval(-5, 1000), 1000);
        assert_eq!(normalize_interval(250, 1000), 250);
    }
}
