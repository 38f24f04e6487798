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

    devices::parallel.rs

    Parallel printer port with a capture buffer standing in for the printer.

*/

use modular_bitfield::prelude::*;

use crate::{
    bus::BusContext,
    logging::LogContext,
    module::{Module, ModuleType, PortAccessible, Resettable, Tickable},
};

pub const LPT1_BASE: u16 = 0x378;

const CAPTURE_LIMIT: usize = 64 * 1024;

#[bitfield]
#[derive(Copy, Clone, Default)]
pub struct ParallelStatus {
    #[skip]
    unused: B3,
    /// Active low
    pub error: bool,
    pub select: bool,
    pub paper_out: bool,
    /// Active low
    pub ack: bool,
    /// Inverted: set when the printer is not busy
    pub busy: bool,
}

#[bitfield]
#[derive(Copy, Clone, Default)]
pub struct ParallelControl {
    pub strobe: bool,
    pub auto_line_feed: bool,
    pub initialize: bool,
    pub select_in: bool,
    pub enable_irq: bool,
    #[skip]
    unused: B3,
}

pub struct ParallelPort {
    log: LogContext,
    base: u16,
    data: u8,
    status: ParallelStatus,
    control: ParallelControl,
    printed: Vec<u8>,
    irq: Option<u8>,
}

impl ParallelPort {
    pub fn new(log: LogContext, base: u16) -> Self {
        Self {
            log,
            base,
            data: 0,
            status: ParallelPort::idle_status(),
            control: ParallelControl::new(),
            printed: Vec::new(),
            irq: None,
        }
    }

    fn idle_status() -> ParallelStatus {
        ParallelStatus::new()
            .with_error(true)
            .with_select(true)
            .with_ack(true)
            .with_busy(true)
    }

    /// Bytes the printer has accepted since the last call.
    pub fn take_printed(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.printed)
    }

    fn control_register_write(&mut self, data: u8, ctx: &mut BusContext) {
        let new = ParallelControl::from_bytes([data & 0x1F]);
        // The printer latches data on the falling edge of strobe.
        if self.control.strobe() && !new.strobe() {
            if self.printed.len() < CAPTURE_LIMIT {
                self.printed.push(self.data);
            }
            self.log.trace(format_args!("Printed {:02X}", self.data));
            if new.enable_irq() {
                if let Some(irq) = self.irq {
                    ctx.pulse_irq(irq);
                }
            }
        }
        self.control = new;
    }
}

impl Module for ParallelPort {
    fn module_type(&self) -> ModuleType {
        ModuleType::Parallel
    }

    fn required_connections(&self) -> &'static [ModuleType] {
        &[ModuleType::Motherboard, ModuleType::Pic]
    }

    fn set_debug(&mut self, debug: bool) {
        self.log.set_debug(debug);
    }

    fn dump(&self) -> String {
        format!(
            "base: {:04X} data: {:02X} status: {:02X} control: {:02X} irq: {:?}\n",
            self.base,
            self.data,
            self.status.into_bytes()[0],
            self.control.into_bytes()[0],
            self.irq
        )
    }
}

impl Resettable for ParallelPort {
    fn reset(&mut self, ctx: &mut BusContext) -> bool {
        self.data = 0;
        self.status = ParallelPort::idle_status();
        self.control = ParallelControl::new();
        self.irq = ctx.request_irq_number();
        true
    }
}

impl PortAccessible for ParallelPort {
    fn port_list(&self) -> Vec<(String, u16)> {
        vec![
            (String::from("LPT Data"), self.base),
            (String::from("LPT Status"), self.base + 1),
            (String::from("LPT Control"), self.base + 2),
        ]
    }

    fn read_u8(&mut self, port: u16, _ctx: &mut BusContext) -> u8 {
        match port.wrapping_sub(self.base) {
            0 => self.data,
            1 => self.status.into_bytes()[0] | 0x07,
            2 => self.control.into_bytes()[0] | 0xE0,
            _ => crate::module::NO_IO_BYTE,
        }
    }

    fn write_u8(&mut self, port: u16, data: u8, ctx: &mut BusContext) {
        match port.wrapping_sub(self.base) {
            0 => self.data = data,
            2 => self.control_register_write(data, ctx),
            _ => {}
        }
    }
}

impl Tickable for ParallelPort {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_status() {
        assert_eq!(ParallelPort::idle_status().into_bytes()[0] | 0x07, 0xDF);
    }
}
