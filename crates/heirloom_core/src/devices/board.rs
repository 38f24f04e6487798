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

    devices::board.rs

    The system board's own I/O: POST code latch and System Control Port A.

*/

use crate::{
    bus::BusContext,
    host::{EventSink, HostEvent},
    logging::LogContext,
    module::{Module, ModuleType, PortAccessible, Resettable, Tickable},
};

pub const POST_CODE_PORT: u16 = 0x80;
pub const SYSTEM_CONTROL_PORT_A: u16 = 0x92;

const PORT_A_FAST_RESET: u8 = 0x01;
const PORT_A_A20: u8 = 0x02;

/// The motherboard as a module: the ports that belong to the board itself.
pub struct SystemBoard {
    log: LogContext,
    events: EventSink,
    post_code: u8,
    port_a: u8,
}

impl SystemBoard {
    pub fn new(log: LogContext, events: EventSink) -> Self {
        Self {
            log,
            events,
            post_code: 0,
            port_a: 0,
        }
    }

    pub fn post_code(&self) -> u8 {
        self.post_code
    }
}

impl Module for SystemBoard {
    fn module_type(&self) -> ModuleType {
        ModuleType::Motherboard
    }

    fn required_connections(&self) -> &'static [ModuleType] {
        &[ModuleType::Cpu, ModuleType::Memory]
    }

    fn set_debug(&mut self, debug: bool) {
        self.log.set_debug(debug);
    }

    fn dump(&self) -> String {
        format!("POST code: {:02X}\nport A: {:02X}\n", self.post_code, self.port_a)
    }
}

impl Resettable for SystemBoard {
    fn reset(&mut self, _ctx: &mut BusContext) -> bool {
        self.port_a = 0;
        true
    }
}

impl PortAccessible for SystemBoard {
    fn port_list(&self) -> Vec<(String, u16)> {
        vec![
            (String::from("POST Code"), POST_CODE_PORT),
            (String::from("System Control Port A"), SYSTEM_CONTROL_PORT_A),
        ]
    }

    fn read_u8(&mut self, port: u16, ctx: &mut BusContext) -> u8 {
        match port {
            POST_CODE_PORT => self.post_code,
            SYSTEM_CONTROL_PORT_A => {
                let a20 = ctx.modules().memory().map(|m| m.a20_enabled()).unwrap_or(false);
                (self.port_a & !PORT_A_A20) | if a20 { PORT_A_A20 } else { 0 }
            }
            _ => crate::module::NO_IO_BYTE,
        }
    }

    fn write_u8(&mut self, port: u16, data: u8, ctx: &mut BusContext) {
        match port {
            POST_CODE_PORT => {
                self.post_code = data;
                self.log.debug(format_args!("POST {:02X}", data));
                self.events.send(HostEvent::PostCode(data));
            }
            SYSTEM_CONTROL_PORT_A => {
                self.port_a = data & !PORT_A_FAST_RESET;
                if let Some(memory) = ctx.modules_mut().memory_mut() {
                    memory.set_a20(data & PORT_A_A20 != 0);
                }
                if data & PORT_A_FAST_RESET != 0 {
                    self.log.info(format_args!("Fast reset requested"));
                    ctx.request_system_reset();
                }
            }
            _ => {}
        }
    }
}

impl Tickable for SystemBoard {}
