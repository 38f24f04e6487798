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

    tests::common::mod.rs

    Shared helpers for machine-level tests.

*/

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use heirloom_core::{
    CpuEngine,
    CpuError,
    Emulator,
    EmulatorHandle,
    MachineConfig,
    MemoryImageProvider,
    SystemBus,
};

/// Called once per iteration with the bus and the call number, starting at zero.
pub type Script = Box<dyn FnMut(&mut dyn SystemBus, u64) -> Result<(), CpuError> + Send>;

/// A CPU engine that runs a test script in place of instructions.
pub struct ScriptedEngine {
    script: Script,
    calls: u64,
}

impl ScriptedEngine {
    pub fn new(script: Script) -> Self {
        Self { script, calls: 0 }
    }
}

impl CpuEngine for ScriptedEngine {
    fn reset(&mut self) {}

    fn execute(&mut self, bus: &mut dyn SystemBus, budget: u32) -> Result<u32, CpuError> {
        (self.script)(bus, self.calls)?;
        self.calls += 1;
        Ok(budget)
    }

    fn instruction_pointer(&self) -> u32 {
        self.calls as u32
    }
}

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn config() -> MachineConfig {
    MachineConfig::from_toml("[emulator]\nthrottle = false\n").unwrap()
}

/// Build and set up a default machine driven by a script.
pub fn machine(script: Script) -> Emulator {
    machine_with(config(), &MemoryImageProvider::new(), script)
}

pub fn machine_with(config: MachineConfig, images: &MemoryImageProvider, script: Script) -> Emulator {
    init();
    let mut emu = Emulator::new(config, Some(Box::new(ScriptedEngine::new(script))));
    assert!(emu.setup(images), "machine setup failed");
    emu
}

/// Program both PICs with the standard vector bases and the given masks.
pub fn program_pic(bus: &mut dyn SystemBus, master_mask: u8, slave_mask: u8) {
    bus.io_write_u8(0x20, 0x11);
    bus.io_write_u8(0x21, 0x08);
    bus.io_write_u8(0x21, 0x04);
    bus.io_write_u8(0x21, 0x01);
    bus.io_write_u8(0xA0, 0x11);
    bus.io_write_u8(0xA1, 0x70);
    bus.io_write_u8(0xA1, 0x02);
    bus.io_write_u8(0xA1, 0x01);
    bus.io_write_u8(0x21, master_mask);
    bus.io_write_u8(0xA1, slave_mask);
}

/// Collects values recorded by a script for inspection after the run.
pub fn recorder() -> (Arc<Mutex<Vec<u8>>>, Arc<Mutex<Vec<u8>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    (log.clone(), log)
}

/// Run a host request on another thread while the emulation loop serves it.
pub fn serve<T: Send + 'static>(emu: &mut Emulator, request: impl FnOnce(EmulatorHandle) -> T + Send + 'static) -> T {
    let handle = emu.handle();
    let worker = std::thread::spawn(move || request(handle));
    while !worker.is_finished() {
        if !emu.run_for(1) {
            break;
        }
    }
    worker.join().unwrap()
}
