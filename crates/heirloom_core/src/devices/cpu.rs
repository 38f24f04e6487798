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

    devices::cpu.rs

    The interface between the machine and an instruction-level CPU engine.

*/

//! Heirloom does not contain an instruction set implementation. A CPU engine is supplied by the
//! embedding application as a boxed [CpuEngine] and sees the rest of the machine only through
//! the [SystemBus] it is handed on each call to [CpuEngine::execute].

use crate::{
    bus::BusContext,
    error::CpuError,
    logging::LogContext,
    module::{Module, ModuleType, PortAccessible, Resettable, Tickable},
};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum CpuWidth {
    #[default]
    Bits16,
    Bits32,
}

/// Everything a CPU engine may touch outside itself.
pub trait SystemBus {
    fn mem_read_u8(&mut self, address: u32) -> u8;
    fn mem_write_u8(&mut self, address: u32, data: u8);

    fn mem_read_u16(&mut self, address: u32) -> u16 {
        let lo = self.mem_read_u8(address);
        let hi = self.mem_read_u8(address.wrapping_add(1));
        (hi as u16) << 8 | lo as u16
    }

    fn mem_write_u16(&mut self, address: u32, data: u16) {
        self.mem_write_u8(address, data as u8);
        self.mem_write_u8(address.wrapping_add(1), (data >> 8) as u8);
    }

    fn io_read_u8(&mut self, port: u16) -> u8;
    fn io_write_u8(&mut self, port: u16, data: u8);
    fn io_read_u16(&mut self, port: u16) -> u16;
    fn io_write_u16(&mut self, port: u16, data: u16);

    /// The interrupt controller has an unmasked request. Engines check this between
    /// instructions when their interrupt flag is set.
    fn interrupt_pending(&self) -> bool;

    /// Run the acknowledge cycle and return the vector to dispatch.
    fn interrupt_acknowledge(&mut self) -> u8;
}

pub trait CpuEngine: Send {
    fn width(&self) -> CpuWidth {
        CpuWidth::Bits16
    }

    fn reset(&mut self);

    /// Execute up to `budget` instructions and return how many ran.
    fn execute(&mut self, bus: &mut dyn SystemBus, budget: u32) -> Result<u32, CpuError>;

    /// Stop execution until the next reset.
    fn halt(&mut self) {}

    fn instruction_pointer(&self) -> u32;

    fn dump(&self) -> String {
        format!("ip: {:05X}\n", self.instruction_pointer())
    }
}

/// The CPU as seen by the module registry.
pub struct CpuModule {
    log: LogContext,
    engine: Box<dyn CpuEngine>,
    instructions: u64,
}

impl CpuModule {
    pub fn new(log: LogContext, engine: Box<dyn CpuEngine>) -> Self {
        Self {
            log,
            engine,
            instructions: 0,
        }
    }

    pub fn engine(&self) -> &dyn CpuEngine {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> &mut dyn CpuEngine {
        self.engine.as_mut()
    }

    pub fn instructions(&self) -> u64 {
        self.instructions
    }

    pub fn execute(&mut self, bus: &mut dyn SystemBus, budget: u32) -> Result<u32, CpuError> {
        let executed = self.engine.execute(bus, budget)?;
        self.instructions += executed as u64;
        Ok(executed)
    }

    pub fn halt(&mut self) {
        self.log.debug(format_args!("Halting CPU at {:05X}", self.engine.instruction_pointer()));
        self.engine.halt();
    }
}

impl Module for CpuModule {
    fn module_type(&self) -> ModuleType {
        ModuleType::Cpu
    }

    fn required_connections(&self) -> &'static [ModuleType] {
        &[ModuleType::Memory, ModuleType::Motherboard, ModuleType::Pic]
    }

    fn set_debug(&mut self, debug: bool) {
        self.log.set_debug(debug);
    }

    fn dump(&self) -> String {
        format!(
            "{:?} engine, {} instructions executed\n{}",
            self.engine.width(),
            self.instructions,
            self.engine.dump()
        )
    }
}

impl Resettable for CpuModule {
    fn reset(&mut self, _ctx: &mut BusContext) -> bool {
        self.engine.reset();
        self.instructions = 0;
        true
    }

    fn stop(&mut self, _ctx: &mut BusContext) {
        self.halt();
    }
}

impl PortAccessible for CpuModule {}
impl Tickable for CpuModule {}
