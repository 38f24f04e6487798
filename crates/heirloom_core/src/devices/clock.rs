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

    devices::clock.rs

    The clock module, which sets the pace of the emulation loop.

*/

use crate::{
    bus::BusContext,
    logging::LogContext,
    module::{Module, ModuleType, PortAccessible, Resettable, Tickable},
};

pub const DEFAULT_CPU_SPEED_MHZ: u32 = 10;
pub const DEFAULT_ITERATION_US: u32 = 1000;

/// Instructions per microsecond and the length of one emulation loop iteration.
pub struct Clock {
    log: LogContext,
    speed_mhz: u32,
    iteration_us: u32,
}

impl Clock {
    pub fn new(log: LogContext, speed_mhz: u32, iteration_us: u32) -> Self {
        Self {
            log,
            speed_mhz: if speed_mhz == 0 { DEFAULT_CPU_SPEED_MHZ } else { speed_mhz },
            iteration_us: if iteration_us == 0 {
                DEFAULT_ITERATION_US
            }
            else {
                iteration_us
            },
        }
    }

    pub fn speed_mhz(&self) -> u32 {
        self.speed_mhz
    }

    pub fn set_speed_mhz(&mut self, speed_mhz: u32) {
        if speed_mhz == 0 {
            self.log.warn(format_args!("Ignoring CPU speed of 0 MHz"));
            return;
        }
        self.speed_mhz = speed_mhz;
    }

    pub fn iteration_us(&self) -> u32 {
        self.iteration_us
    }

    /// Treating one instruction as one cycle, the budget of a single loop iteration.
    pub fn instructions_per_iteration(&self) -> u32 {
        self.speed_mhz.saturating_mul(self.iteration_us)
    }
}

impl Module for Clock {
    fn module_type(&self) -> ModuleType {
        ModuleType::Clock
    }

    fn required_connections(&self) -> &'static [ModuleType] {
        &[ModuleType::Motherboard]
    }

    fn set_debug(&mut self, debug: bool) {
        self.log.set_debug(debug);
    }

    fn dump(&self) -> String {
        format!(
            "speed: {} MHz, iteration: {} us, budget: {} instructions\n",
            self.speed_mhz,
            self.iteration_us,
            self.instructions_per_iteration()
        )
    }
}

impl Resettable for Clock {
    fn reset(&mut self, _ctx: &mut BusContext) -> bool {
        true
    }
}

impl PortAccessible for Clock {}
impl Tickable for Clock {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget() {
        let clock = Clock::new(LogContext::new(ModuleType::Clock), 5, 2000);
        assert_eq!(clock.instructions_per_iteration(), 10_000);
        let clock = Clock::new(LogContext::new(ModuleType::Clock), 0, 0);
        assert_eq!(clock.speed_mhz(), DEFAULT_CPU_SPEED_MHZ);
        assert_eq!(clock.iteration_us(), DEFAULT_ITERATION_US);
    }
}
