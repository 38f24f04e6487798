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

    bus::mod.rs

    The motherboard bus. Owns the module registry, the I/O port map and the timer scheduler.

*/

//! The [Motherboard] is the hub every access passes through. It maps each I/O port to the
//! module that owns it and forwards CPU port reads and writes to that module. It also keeps the
//! virtual microsecond clock and fires module update timers as that clock advances.
//!
//! While the bus is inside a module, whether for a port access, an update or a reset, the
//! module is temporarily taken out of the registry and handed a [BusContext]. The context lets
//! it reach the interrupt controller, its own timer and any other registered module by type,
//! all without holding references between modules.

pub mod io;
pub mod timer;

use fxhash::FxHashMap;

pub use timer::TimerScheduler;

use crate::{
    devices::cpu::SystemBus,
    error::{BusError, CpuError, ModuleError},
    logging::LogContext,
    module::{Module, ModuleDispatch, ModuleHandle, ModuleType, PortAccessible, Resettable, Tickable},
    registry::ModuleRegistry,
};

/// Start of the legacy video memory window routed to the video adapter.
pub const VIDEO_WINDOW_START: u32 = 0xA0000;
/// Last address of the legacy video memory window.
pub const VIDEO_WINDOW_END: u32 = 0xBFFFF;

/// Requests raised by modules during dispatch and collected by the bus.
#[derive(Default, Debug)]
pub struct BusSignals {
    faults: Vec<ModuleError>,
    system_reset: bool,
}

/// A module's view of the machine while the bus is dispatching into it.
pub struct BusContext<'a> {
    this:    ModuleHandle,
    kind:    ModuleType,
    modules: &'a mut ModuleRegistry,
    timers:  &'a mut TimerScheduler,
    signals: &'a mut BusSignals,
}

impl<'a> BusContext<'a> {
    #[inline]
    pub fn handle(&self) -> ModuleHandle {
        self.this
    }

    #[inline]
    pub fn module_type(&self) -> ModuleType {
        self.kind
    }

    /// Virtual time in microseconds.
    #[inline]
    pub fn now_us(&self) -> u64 {
        self.timers.now_us()
    }

    pub fn modules(&self) -> &ModuleRegistry {
        self.modules
    }

    pub fn modules_mut(&mut self) -> &mut ModuleRegistry {
        self.modules
    }

    /// Ask the interrupt controller for an IRQ line. Repeated requests return the same line.
    pub fn request_irq_number(&mut self) -> Option<u8> {
        let (this, kind) = (self.this, self.kind);
        self.modules.pic_mut()?.request_irq_number(this, kind)
    }

    /// Claim a specific IRQ line in addition to any line already assigned.
    pub fn claim_irq(&mut self, line: u8) -> bool {
        let (this, kind) = (self.this, self.kind);
        match self.modules.pic_mut() {
            Some(pic) => pic.claim_irq(this, kind, line),
            None => false,
        }
    }

    pub fn raise_irq(&mut self, line: u8) {
        if let Some(pic) = self.modules.pic_mut() {
            pic.set_irq(line);
        }
    }

    pub fn lower_irq(&mut self, line: u8) {
        if let Some(pic) = self.modules.pic_mut() {
            pic.clear_irq(line);
        }
    }

    /// Latch a request without holding the line asserted.
    pub fn pulse_irq(&mut self, line: u8) {
        if let Some(pic) = self.modules.pic_mut() {
            pic.pulse_irq(line);
        }
    }

    /// Register or re-arm this module's update timer.
    pub fn request_timer(&mut self, interval_us: u32, active: bool) -> bool {
        self.timers.request(self.this, interval_us, active)
    }

    pub fn set_timer_active(&mut self, active: bool) -> bool {
        self.timers.set_active(self.this, active)
    }

    pub fn reset_timer(&mut self, interval_us: u32) -> bool {
        self.timers.reset_timer(self.this, interval_us)
    }

    pub fn timer_active(&self) -> bool {
        self.timers.is_active(self.this)
    }

    /// Report a fault that should end the session.
    pub fn report_fault(&mut self, fault: ModuleError) {
        self.signals.faults.push(fault);
    }

    /// Ask for a warm reset of the machine once the current iteration completes.
    pub fn request_system_reset(&mut self) {
        self.signals.system_reset = true;
    }
}

pub struct Motherboard {
    log: LogContext,
    modules: ModuleRegistry,
    io_map: FxHashMap<u16, ModuleHandle>,
    timers: TimerScheduler,
    signals: BusSignals,
    due: Vec<ModuleHandle>,
}

impl Default for Motherboard {
    fn default() -> Self {
        Self::new(LogContext::new(ModuleType::Motherboard))
    }
}

impl Motherboard {
    pub fn new(log: LogContext) -> Self {
        Self {
            log,
            modules: ModuleRegistry::new(),
            io_map: FxHashMap::default(),
            timers: TimerScheduler::new(),
            signals: BusSignals::default(),
            due: Vec::new(),
        }
    }

    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    pub fn modules_mut(&mut self) -> &mut ModuleRegistry {
        &mut self.modules
    }

    pub fn timers(&self) -> &TimerScheduler {
        &self.timers
    }

    pub fn now_us(&self) -> u64 {
        self.timers.now_us()
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.log.set_debug(debug);
    }

    pub fn add_module(&mut self, module: ModuleDispatch) -> ModuleHandle {
        let handle = self.modules.add(module);
        self.log.debug(format_args!(
            "Registered module {} as #{}",
            self.modules.kind_of(handle).map(|k| k.to_string()).unwrap_or_default(),
            handle.index()
        ));
        handle
    }

    /// Run `f` against a module taken out of the registry, with a context for reaching the rest
    /// of the machine. Returns None if the module is absent or already being dispatched.
    pub(crate) fn dispatch<R>(
        &mut self,
        handle: ModuleHandle,
        f: impl FnOnce(&mut ModuleDispatch, &mut BusContext) -> R,
    ) -> Option<R> {
        let kind = self.modules.kind_of(handle)?;
        let mut module = self.modules.take(handle)?;
        let result = {
            let mut ctx = BusContext {
                this: handle,
                kind,
                modules: &mut self.modules,
                timers: &mut self.timers,
                signals: &mut self.signals,
            };
            f(&mut module, &mut ctx)
        };
        self.modules.restore(handle, module);
        Some(result)
    }

    /// Run `f` against the first module of the given type.
    pub fn dispatch_type<R>(
        &mut self,
        kind: ModuleType,
        f: impl FnOnce(&mut ModuleDispatch, &mut BusContext) -> R,
    ) -> Option<R> {
        let handle = self.modules.handle_of(kind)?;
        self.dispatch(handle, f)
    }

    /// Bind an I/O port to a module. Binding a port to its current owner again is a no-op; a
    /// port owned by another module is refused and the existing binding is kept.
    pub fn bind(&mut self, port: u16, owner: ModuleHandle) -> Result<(), BusError> {
        let requested = self
            .modules
            .kind_of(owner)
            .ok_or(BusError::UnknownModule(ModuleType::Motherboard))?;
        match self.io_map.get(&port) {
            Some(&existing) if existing == owner => Ok(()),
            Some(&existing) => {
                let owner = self.modules.kind_of(existing).unwrap_or(requested);
                self.log.error(format_args!(
                    "I/O port {:04X} already bound to {}, refusing {}",
                    port, owner, requested
                ));
                Err(BusError::PortConflict {
                    port,
                    owner,
                    requested,
                })
            }
            None => {
                self.io_map.insert(port, owner);
                Ok(())
            }
        }
    }

    pub fn port_owner(&self, port: u16) -> Option<ModuleHandle> {
        self.io_map.get(&port).copied()
    }

    pub fn bound_ports(&self) -> usize {
        self.io_map.len()
    }

    /// Bind every port a module lists.
    fn bind_module_ports(&mut self, handle: ModuleHandle) -> bool {
        let ports = match self.modules.get_at(handle.index()) {
            Some(module) => module.port_list(),
            None => return true,
        };
        let mut ok = true;
        for (name, port) in ports {
            if self.bind(port, handle).is_err() {
                self.log.warn(format_args!("Couldn't bind {} at {:04X}", name, port));
                ok = false;
            }
        }
        ok
    }

    pub fn request_timer(&mut self, owner: ModuleHandle, interval_us: u32, active: bool) -> bool {
        self.timers.request(owner, interval_us, active)
    }

    pub fn set_timer_active(&mut self, owner: ModuleHandle, active: bool) -> bool {
        self.timers.set_active(owner, active)
    }

    pub fn reset_timer(&mut self, owner: ModuleHandle, interval_us: u32) -> bool {
        self.timers.reset_timer(owner, interval_us)
    }

    /// Change the update interval of the first module of a type. Non-positive values select the
    /// module default. A running timer is re-armed with the new period at once.
    pub fn set_update_interval(&mut self, kind: ModuleType, interval: i64) -> bool {
        let Some(handle) = self.modules.handle_of(kind)
        else {
            self.log.warn(format_args!("Can't set update interval, no {} module", kind));
            return false;
        };
        let Some(module) = self.modules.get_at_mut(handle.index())
        else {
            return false;
        };
        module.set_update_interval(interval);
        match module.update_interval() {
            Some(new_interval) => {
                if self.timers.get(handle).is_some() {
                    self.timers.reset_timer(handle, new_interval);
                }
                true
            }
            None => {
                self.log.warn(format_args!("Module {} has no update timer", kind));
                false
            }
        }
    }

    /// Check every module's required connections against the registry. Modules with missing
    /// dependencies are marked unconnected and logged; the pass always visits every module.
    pub fn connect_modules(&mut self) -> bool {
        let mut all_connected = true;
        let handles: Vec<ModuleHandle> = self.modules.handles().collect();

        for handle in handles {
            let Some(module) = self.modules.get_at(handle.index())
            else {
                continue;
            };
            let kind = module.module_type();
            let missing: Vec<ModuleType> = module
                .required_connections()
                .iter()
                .copied()
                .filter(|required| !self.modules.contains(*required))
                .collect();

            for required in &missing {
                self.log.warn(format_args!("Module {} is missing connection to {}", kind, required));
            }
            let connected = missing.is_empty();
            if connected {
                self.log.debug(format_args!("Module {} connected", kind));
            }
            self.modules.set_connected(handle, connected);
            all_connected &= connected;
        }
        all_connected
    }

    /// Reset every module in registration order. The port map and timers are torn down first
    /// and re-registered from each module as it comes out of reset.
    pub fn reset_modules(&mut self) -> bool {
        self.io_map.clear();
        self.timers.clear();
        self.signals.system_reset = false;

        let mut ok = true;
        let handles: Vec<ModuleHandle> = self.modules.handles().collect();
        for handle in handles {
            let Some(reset_ok) = self.dispatch(handle, |module, ctx| module.reset(ctx))
            else {
                continue;
            };
            let kind = self.modules.kind_of(handle);
            if !reset_ok {
                self.log.error(format_args!("Reset of module {:?} failed", kind));
                ok = false;
            }
            ok &= self.bind_module_ports(handle);

            if let Some(module) = self.modules.get_at(handle.index()) {
                if let Some(interval) = module.update_interval() {
                    let active = module.timer_active_on_reset();
                    self.timers.request(handle, interval, active);
                }
            }
        }
        self.log.debug(format_args!(
            "Reset complete: {} ports bound, {} timers",
            self.io_map.len(),
            self.timers.len()
        ));
        ok
    }

    /// Notify every module that emulation has stopped.
    pub fn stop_modules(&mut self) {
        let handles: Vec<ModuleHandle> = self.modules.handles().collect();
        for handle in handles {
            self.dispatch(handle, |module, ctx| module.stop(ctx));
        }
    }

    /// Advance the virtual clock and run the update of every module whose timer came due.
    pub fn advance_clock(&mut self, delta_us: u64) {
        let mut due = std::mem::take(&mut self.due);
        due.clear();
        self.timers.advance(delta_us, &mut due);
        for &handle in &due {
            // An earlier update in this batch may have stopped the timer.
            if self.timers.is_active(handle) {
                self.dispatch(handle, |module, ctx| module.update(ctx));
            }
        }
        self.due = due;
    }

    pub fn take_faults(&mut self) -> Vec<ModuleError> {
        std::mem::take(&mut self.signals.faults)
    }

    pub fn take_reset_request(&mut self) -> bool {
        std::mem::take(&mut self.signals.system_reset)
    }

    /// Read a byte of physical memory. The legacy video window goes to the video adapter.
    pub fn mem_read_u8(&mut self, address: u32) -> u8 {
        if (VIDEO_WINDOW_START..=VIDEO_WINDOW_END).contains(&address) {
            if let Some(vga) = self.modules.video_mut() {
                return vga.mem_read_u8(address);
            }
        }
        match self.modules.memory() {
            Some(memory) => memory.read_u8(address),
            None => crate::module::NO_IO_BYTE,
        }
    }

    pub fn mem_write_u8(&mut self, address: u32, data: u8) {
        if (VIDEO_WINDOW_START..=VIDEO_WINDOW_END).contains(&address) {
            if let Some(vga) = self.modules.video_mut() {
                vga.mem_write_u8(address, data);
                return;
            }
        }
        if let Some(memory) = self.modules.memory_mut() {
            memory.write_u8(address, data);
        }
    }

    pub fn interrupt_pending(&self) -> bool {
        self.modules.pic().map(|pic| pic.interrupt_pending()).unwrap_or(false)
    }

    pub fn interrupt_acknowledge(&mut self) -> Option<u8> {
        self.modules.pic_mut().map(|pic| pic.interrupt_acknowledge())
    }

    /// Run the CPU for up to `budget` instructions. A machine without a CPU does nothing.
    pub fn run_cpu(&mut self, budget: u32) -> Result<u32, CpuError> {
        let Some(handle) = self.modules.handle_of(ModuleType::Cpu)
        else {
            return Ok(0);
        };
        let Some(mut module) = self.modules.take(handle)
        else {
            return Ok(0);
        };
        let result = match &mut module {
            ModuleDispatch::Cpu(cpu) => {
                let mut bus = CpuBus { board: self };
                cpu.execute(&mut bus, budget)
            }
            _ => Ok(0),
        };
        self.modules.restore(handle, module);
        result
    }
}

/// The bus as seen by a CPU engine.
pub struct CpuBus<'a> {
    board: &'a mut Motherboard,
}

impl<'a> CpuBus<'a> {
    pub fn new(board: &'a mut Motherboard) -> Self {
        Self { board }
    }
}

impl SystemBus for CpuBus<'_> {
    fn mem_read_u8(&mut self, address: u32) -> u8 {
        self.board.mem_read_u8(address)
    }

    fn mem_write_u8(&mut self, address: u32, data: u8) {
        self.board.mem_write_u8(address, data)
    }

    fn io_read_u8(&mut self, port: u16) -> u8 {
        self.board.read_u8(port)
    }

    fn io_write_u8(&mut self, port: u16, data: u8) {
        self.board.write_u8(port, data)
    }

    fn io_read_u16(&mut self, port: u16) -> u16 {
        self.board.read_u16(port)
    }

    fn io_write_u16(&mut self, port: u16, data: u16) {
        self.board.write_u16(port, data)
    }

    fn interrupt_pending(&self) -> bool {
        self.board.interrupt_pending()
    }

    fn interrupt_acknowledge(&mut self) -> u8 {
        self.board.interrupt_acknowledge().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{pic::Pic, serial::SerialPort};

    fn board_with(modules: Vec<ModuleDispatch>) -> (Motherboard, Vec<ModuleHandle>) {
        let mut board = Motherboard::default();
        let handles = modules.into_iter().map(|m| board.add_module(m)).collect();
        (board, handles)
    }

    #[test]
    fn test_bind_is_idempotent_and_unique() {
        let (mut board, h) = board_with(vec![
            Pic::new(LogContext::new(ModuleType::Pic)).into(),
            SerialPort::new(LogContext::new(ModuleType::Serial), 0x3F8).into(),
        ]);

        assert!(board.bind(0x20, h[0]).is_ok());
        assert!(board.bind(0x20, h[0]).is_ok());
        assert_eq!(
            board.bind(0x20, h[1]),
            Err(BusError::PortConflict {
                port: 0x20,
                owner: ModuleType::Pic,
                requested: ModuleType::Serial,
            })
        );
        assert_eq!(board.port_owner(0x20), Some(h[0]));
    }

    #[test]
    fn test_unbound_port_reads_ff() {
        let (mut board, _) = board_with(vec![]);
        assert_eq!(board.read_u8(0x2F8), 0xFF);
        // Dropped without effect
        board.write_u8(0x2F8, 0x12);
        assert_eq!(board.read_u16(0x2F8), 0xFFFF);
    }

    #[test]
    fn test_reset_rebinds_ports() {
        let (mut board, h) = board_with(vec![Pic::new(LogContext::new(ModuleType::Pic)).into()]);
        assert!(board.reset_modules());
        assert_eq!(board.port_owner(0x21), Some(h[0]));
        assert_eq!(board.port_owner(0xA1), Some(h[0]));
        // A second reset clears and rebinds without conflict
        assert!(board.reset_modules());
        assert_eq!(board.bound_ports(), 4);
    }

    #[test]
    fn test_wiring_marks_missing_dependencies() {
        let (mut board, _) = board_with(vec![SerialPort::new(LogContext::new(ModuleType::Serial), 0x3F8).into()]);
        assert!(!board.connect_modules());
        assert!(!board.modules().is_connected(ModuleType::Serial));
    }
}
