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

    emulator.rs

    Builds a machine from its configuration and runs the emulation loop.

*/

//! [Emulator::setup] builds the machine in ten steps. Every step runs even after an earlier
//! one failed, so a single setup reports every problem with a configuration, and the combined
//! result decides whether [Emulator::run] may start.
//!
//! The loop runs on one thread. Each iteration first drains host control messages, then runs
//! the CPU for the clock's instruction budget and advances the bus clock, which fires device
//! timers. Resets, whether requested by the host or by the machine itself, are applied only
//! between iterations, never while a device update is in progress.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{anyhow, bail, Context};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use strum::IntoEnumIterator;
use web_time::Instant;

use crate::{
    bus::Motherboard,
    config::{ImageProvider, MachineConfig},
    devices::{
        ata::AtaController,
        board::SystemBoard,
        clock::Clock,
        cpu::{CpuEngine, CpuModule},
        fdc::{CarrierType, FloppyController},
        keyboard::Keyboard,
        memory::Memory,
        mouse::Mouse,
        parallel::{ParallelPort, LPT1_BASE},
        pic::Pic,
        pit::Pit,
        rtc::{DateTime, Rtc},
        screen::Screen,
        serial::{SerialPort, COM1_BASE},
        vga::{StandardMode, VgaCard},
    },
    host::{ControlMessage, EventSink, HostEvent, KeyboardEvent, MouseEvent},
    logging::LogContext,
    module::{Module, ModuleDispatch, ModuleType, Tickable},
};

/// `log` target of the orchestrator itself.
pub const EMULATOR_LOG_TARGET: &str = "heirloom::emulator";
pub const KEYBOARD_QUEUE_LEN: usize = 64;
pub const MOUSE_QUEUE_LEN: usize = 128;
pub const CONTROL_QUEUE_LEN: usize = 16;
pub const EVENT_QUEUE_LEN: usize = 256;
/// How long a handle waits for the emulation thread to answer a request.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// Why the emulation loop ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    NotReady,
    CpuError(String),
    DeviceFault(String),
}

/// Cloneable host-side handle to a running emulator.
#[derive(Clone)]
pub struct EmulatorHandle {
    control: Sender<ControlMessage>,
    keyboard: Sender<KeyboardEvent>,
    mouse: Sender<MouseEvent>,
    events: Receiver<HostEvent>,
    running: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
}

impl EmulatorHandle {
    /// Queue a key event. Returns false if the keyboard queue is full.
    pub fn notify_keyboard(&self, event: KeyboardEvent) -> bool {
        match self.keyboard.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::debug!(target: EMULATOR_LOG_TARGET, "Keyboard queue full, dropping {:?}", event);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn notify_mouse(&self, event: MouseEvent) -> bool {
        self.mouse.try_send(event).is_ok()
    }

    pub fn insert_floppy(&self, drive: usize, carrier: CarrierType, image: Vec<u8>, write_protected: bool) -> bool {
        let (reply, answer) = bounded(1);
        self.request(
            ControlMessage::InsertFloppy {
                drive,
                carrier,
                image,
                write_protected,
                reply,
            },
            answer,
        )
        .unwrap_or(false)
    }

    pub fn eject_floppy(&self, drive: usize) -> bool {
        let (reply, answer) = bounded(1);
        self.request(ControlMessage::EjectFloppy { drive, reply }, answer)
            .unwrap_or(false)
    }

    /// The text currently on screen, or None in graphics modes.
    pub fn screen_text(&self) -> Option<String> {
        let (reply, answer) = bounded(1);
        self.request(ControlMessage::ScreenText { reply }, answer).flatten()
    }

    /// Ask the loop to stop. The request is latched, so it holds even if the control queue
    /// is full or the loop hasn't started yet.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        _ = self.control.try_send(ControlMessage::Stop);
    }

    pub fn request_reset(&self) {
        _ = self.control.try_send(ControlMessage::Reset);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Events from the machine: status changes, screen resizes, POST codes.
    pub fn events(&self) -> &Receiver<HostEvent> {
        &self.events
    }

    fn request<T>(&self, message: ControlMessage, answer: Receiver<T>) -> Option<T> {
        if self.control.send_timeout(message, REPLY_TIMEOUT).is_err() {
            return None;
        }
        answer.recv_timeout(REPLY_TIMEOUT).ok()
    }
}

pub struct Emulator {
    log: LogContext,
    config: MachineConfig,
    board: Motherboard,
    engine: Option<Box<dyn CpuEngine>>,
    events: EventSink,
    event_rx: Receiver<HostEvent>,
    control_tx: Sender<ControlMessage>,
    control_rx: Receiver<ControlMessage>,
    keyboard_tx: Sender<KeyboardEvent>,
    keyboard_rx: Receiver<KeyboardEvent>,
    mouse_tx: Sender<MouseEvent>,
    mouse_rx: Receiver<MouseEvent>,
    running: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    ready: bool,
    reset_pending: bool,
    stop_reason: Option<StopReason>,
    iterations: u64,
    resets: u64,
}

impl Emulator {
    /// Create an emulator for a machine. Without a CPU engine no CPU module is built, and
    /// modules that require one are left unconnected.
    pub fn new(config: MachineConfig, engine: Option<Box<dyn CpuEngine>>) -> Self {
        let (event_tx, event_rx) = bounded(EVENT_QUEUE_LEN);
        let (control_tx, control_rx) = bounded(CONTROL_QUEUE_LEN);
        let (keyboard_tx, keyboard_rx) = bounded(KEYBOARD_QUEUE_LEN);
        let (mouse_tx, mouse_rx) = bounded(MOUSE_QUEUE_LEN);
        let mut log = LogContext::with_target(EMULATOR_LOG_TARGET);
        log.set_debug(config.emulator.debug_motherboard);
        Self {
            log,
            config,
            board: Motherboard::new(LogContext::new(ModuleType::Motherboard)),
            engine,
            events: EventSink::new(event_tx),
            event_rx,
            control_tx,
            control_rx,
            keyboard_tx,
            keyboard_rx,
            mouse_tx,
            mouse_rx,
            running: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(AtomicBool::new(false)),
            ready: false,
            reset_pending: false,
            stop_reason: None,
            iterations: 0,
            resets: 0,
        }
    }

    pub fn handle(&self) -> EmulatorHandle {
        EmulatorHandle {
            control: self.control_tx.clone(),
            keyboard: self.keyboard_tx.clone(),
            mouse: self.mouse_tx.clone(),
            events: self.event_rx.clone(),
            running: self.running.clone(),
            stop: self.stop.clone(),
        }
    }

    pub fn board(&self) -> &Motherboard {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut Motherboard {
        &mut self.board
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Number of warm resets performed since setup.
    pub fn resets(&self) -> u64 {
        self.resets
    }

    pub fn stop_reason(&self) -> Option<&StopReason> {
        self.stop_reason.as_ref()
    }

    /// Build and prepare the machine. Returns true when every step succeeded.
    pub fn setup(&mut self, images: &dyn ImageProvider) -> bool {
        let mut ok = true;
        ok &= self.run_step("create modules", |emu| emu.create_modules());
        ok &= self.run_step("connect modules", |emu| emu.connect_modules());
        ok &= self.run_step("set timing", |emu| emu.apply_timing());
        ok &= self.run_step("reset modules", |emu| emu.reset_modules());
        ok &= self.run_step("initialize screen", |emu| emu.init_screen());
        ok &= self.run_step("set mouse and memory parameters", |emu| emu.apply_memory_params());
        ok &= self.run_step("load BIOS images", |emu| emu.load_bios(images));
        ok &= self.run_step("set storage parameters", |emu| emu.apply_storage(images));
        ok &= self.run_step("set boot order", |emu| emu.apply_boot_order());
        ok &= self.run_step("set debug flags", |emu| emu.apply_debug_flags());

        self.ready = ok;
        if ok {
            self.log.info(format_args!("Machine ready with {} modules", self.board.modules().len()));
        }
        else {
            self.log.error(format_args!("Machine setup failed, emulation will not start"));
        }
        ok
    }

    fn run_step(&mut self, name: &str, step: impl FnOnce(&mut Self) -> anyhow::Result<()>) -> bool {
        match step(self).with_context(|| format!("Setup step '{}' failed", name)) {
            Ok(()) => {
                self.log.debug(format_args!("Setup step '{}' complete", name));
                true
            }
            Err(e) => {
                self.log.error(format_args!("{:#}", e));
                false
            }
        }
    }

    /// Step 1. Modules are added in dependency order; disabled devices are skipped.
    fn create_modules(&mut self) -> anyhow::Result<()> {
        let cfg = &self.config;
        let mut modules: Vec<ModuleDispatch> = vec![
            Clock::new(
                LogContext::new(ModuleType::Clock),
                cfg.cpu.speed_mhz,
                cfg.emulator.iteration_us,
            )
            .into(),
            Memory::new(LogContext::new(ModuleType::Memory), cfg.memory.extended_kb).into(),
        ];
        match self.engine.take() {
            Some(engine) => modules.push(CpuModule::new(LogContext::new(ModuleType::Cpu), engine).into()),
            None => self.log.warn(format_args!("No CPU engine supplied")),
        }
        modules.push(SystemBoard::new(LogContext::new(ModuleType::Motherboard), self.events.clone()).into());

        let devices = [
            ModuleType::Pic,
            ModuleType::Rtc,
            ModuleType::Pit,
            ModuleType::Ata,
            ModuleType::Fdc,
            ModuleType::Keyboard,
            ModuleType::Mouse,
            ModuleType::Serial,
            ModuleType::Parallel,
            ModuleType::Video,
            ModuleType::Screen,
        ];
        for kind in devices {
            if !cfg.enabled(kind) {
                self.log.debug(format_args!("Module {} disabled", kind));
                continue;
            }
            let log = LogContext::new(kind);
            let module: ModuleDispatch = match kind {
                ModuleType::Pic => Pic::new(log).into(),
                ModuleType::Rtc => Rtc::new(log, DateTime::now()).into(),
                ModuleType::Pit => Pit::new(log).into(),
                ModuleType::Ata => AtaController::new(log, self.events.clone()).into(),
                ModuleType::Fdc => FloppyController::new(log, self.events.clone()).into(),
                ModuleType::Keyboard => Keyboard::new(log, self.events.clone(), Some(self.keyboard_rx.clone())).into(),
                ModuleType::Mouse => Mouse::new(log, Some(self.mouse_rx.clone())).into(),
                ModuleType::Serial => SerialPort::new(log, COM1_BASE).into(),
                ModuleType::Parallel => ParallelPort::new(log, LPT1_BASE).into(),
                ModuleType::Video => VgaCard::new(log).into(),
                ModuleType::Screen => Screen::new(log, self.events.clone()).into(),
                _ => continue,
            };
            modules.push(module);
        }

        for module in modules {
            self.board.add_module(module);
        }
        Ok(())
    }

    /// Step 2.
    fn connect_modules(&mut self) -> anyhow::Result<()> {
        if !self.board.connect_modules() {
            bail!("one or more modules are missing required connections");
        }
        Ok(())
    }

    /// Step 3. Every module with an update timer gets its configured interval.
    fn apply_timing(&mut self) -> anyhow::Result<()> {
        let timed: Vec<ModuleType> = (0..self.board.modules().len())
            .filter_map(|i| self.board.modules().get_at(i))
            .filter(|module| module.update_interval().is_some())
            .map(|module| module.module_type())
            .collect();
        for kind in timed {
            let interval = self.config.device(kind).map(|d| d.update_interval).unwrap_or(0);
            if !self.board.set_update_interval(kind, interval) {
                bail!("couldn't set the update interval of {}", kind);
            }
        }
        Ok(())
    }

    /// Step 4.
    fn reset_modules(&mut self) -> anyhow::Result<()> {
        if !self.board.reset_modules() {
            bail!("one or more modules failed to reset");
        }
        Ok(())
    }

    /// Step 5.
    fn init_screen(&mut self) -> anyhow::Result<()> {
        match self.board.modules_mut().screen_mut() {
            Some(screen) => {
                if !screen.init() {
                    bail!("screen initialization failed");
                }
            }
            None => self.log.debug(format_args!("No screen module")),
        }
        Ok(())
    }

    /// Step 6. Memory sizes and the mouse go into CMOS for the BIOS to find.
    fn apply_memory_params(&mut self) -> anyhow::Result<()> {
        let modules = self.board.modules_mut();
        let (base_kb, extended_kb) = modules
            .memory()
            .map(|m| (m.base_kb(), m.extended_kb()))
            .ok_or_else(|| anyhow!("no memory module"))?;
        let mouse = modules.contains(ModuleType::Mouse);
        let video = modules.contains(ModuleType::Video);

        let rtc = modules.rtc_mut().ok_or_else(|| anyhow!("no RTC to hold machine parameters"))?;
        rtc.set_memory(base_kb, extended_kb);
        rtc.set_mouse_present(mouse);
        if video {
            rtc.set_display_type(0);
        }
        Ok(())
    }

    /// Step 7. An image that is configured but can't be read or placed fails setup.
    fn load_bios(&mut self, images: &dyn ImageProvider) -> anyhow::Result<()> {
        let roms = [("system", self.config.bios.system.clone()), ("video", self.config.bios.video.clone())];
        for (name, rom) in roms {
            let Some(rom) = rom
            else {
                self.log.warn(format_args!("No {} BIOS configured", name));
                continue;
            };
            let image = images
                .read_image(&rom.path)
                .with_context(|| format!("couldn't read {} BIOS", name))?;
            let memory = self
                .board
                .modules_mut()
                .memory_mut()
                .ok_or_else(|| anyhow!("no memory to load the {} BIOS into", name))?;
            memory
                .load_rom(rom.offset as usize, image)
                .with_context(|| format!("couldn't place {} BIOS at {}", name, rom.offset))?;
        }
        self.program_video_without_bios();
        Ok(())
    }

    /// Without a video BIOS nothing would program the adapter, so bring it up in text mode.
    fn program_video_without_bios(&mut self) {
        if self.config.bios.video.is_some() {
            return;
        }
        if let Some(vga) = self.board.modules_mut().video_mut() {
            vga.set_standard_mode(StandardMode::Text80x25);
        }
    }

    /// Step 8. Floppy drive types and media, hard disk images and their CMOS entries.
    fn apply_storage(&mut self, images: &dyn ImageProvider) -> anyhow::Result<()> {
        let floppies = self.config.fdc.floppy.clone();
        let disks = self.config.ata.harddisk.clone();

        if !floppies.is_empty() {
            let fdc = self
                .board
                .modules_mut()
                .fdc_mut()
                .ok_or_else(|| anyhow!("floppy drives configured without a floppy controller"))?;
            for floppy in &floppies {
                let drive = floppy.drive.0;
                fdc.set_drive_type(drive, floppy.drive_type);
                let Some(path) = &floppy.image
                else {
                    continue;
                };
                let image = images
                    .read_image(path)
                    .with_context(|| format!("couldn't read floppy image for drive {}", drive))?;
                let carrier = floppy
                    .format
                    .or_else(|| CarrierType::from_image_size(image.len()))
                    .ok_or_else(|| anyhow!("can't tell the format of a {} byte floppy image", image.len()))?;
                if !fdc.insert_floppy(drive, carrier, image, floppy.write_protected) {
                    bail!("couldn't insert floppy image '{}' in drive {}", path, drive);
                }
            }
        }

        let mut geometries = Vec::new();
        if !disks.is_empty() {
            let ata = self
                .board
                .modules_mut()
                .ata_mut()
                .ok_or_else(|| anyhow!("hard disks configured without an ATA controller"))?;
            for disk in &disks {
                let image = images
                    .read_image(&disk.image)
                    .with_context(|| format!("couldn't read hard disk image '{}'", disk.image))?;
                let geometry = disk
                    .geometry()
                    .unwrap_or_else(|| AtaController::default_geometry(image.len()));
                if !ata.attach_disk(disk.channel, disk.drive, image, geometry) {
                    bail!("couldn't attach hard disk '{}'", disk.image);
                }
                if disk.channel == 0 {
                    geometries.push((disk.drive, geometry));
                }
            }
        }

        let drive_types = self.board.modules().fdc().map(|fdc| fdc.cmos_drive_types());
        if let Some(rtc) = self.board.modules_mut().rtc_mut() {
            if let Some([a, b]) = drive_types {
                rtc.set_floppy_types(a, b);
            }
            for (drive, (cylinders, heads, spt)) in geometries {
                rtc.set_hard_disk(drive, cylinders, heads, spt);
            }
        }
        Ok(())
    }

    /// Step 9.
    fn apply_boot_order(&mut self) -> anyhow::Result<()> {
        let order = self.config.boot.slots();
        let check = self.config.boot.check_floppy_signature;
        let rtc = self
            .board
            .modules_mut()
            .rtc_mut()
            .ok_or_else(|| anyhow!("no RTC to hold the boot order"))?;
        rtc.set_boot_order(order, check);
        Ok(())
    }

    /// Step 10.
    fn apply_debug_flags(&mut self) -> anyhow::Result<()> {
        for kind in ModuleType::iter() {
            if self.config.debug(kind) {
                self.board.modules_mut().set_debug(kind, true);
            }
        }
        self.board.set_debug(self.config.emulator.debug_motherboard);
        Ok(())
    }

    /// Run until stopped. Returns immediately if setup didn't succeed.
    pub fn run(&mut self) -> StopReason {
        if !self.ready {
            self.log.error(format_args!("Refusing to run an unprepared machine"));
            return StopReason::NotReady;
        }
        self.start();
        self.events.send(HostEvent::Started);

        let started = Instant::now();
        let mut virtual_us: u64 = 0;
        while self.run_iteration() {
            virtual_us += self.iteration_us() as u64;
            if self.config.emulator.throttle {
                let host_us = started.elapsed().as_micros() as u64;
                if virtual_us > host_us {
                    std::thread::sleep(Duration::from_micros(virtual_us - host_us));
                }
            }
        }
        self.finish()
    }

    /// Run at most `iterations` loop iterations. Returns false once the machine has stopped.
    pub fn run_for(&mut self, iterations: u64) -> bool {
        if !self.ready || self.stop_reason.is_some() {
            return false;
        }
        self.start();
        for _ in 0..iterations {
            if !self.run_iteration() {
                self.finish();
                return false;
            }
        }
        true
    }

    /// Mark the loop running unless a stop was already requested.
    fn start(&mut self) {
        let stopped = self.stop.load(Ordering::SeqCst);
        self.running.store(!stopped, Ordering::SeqCst);
    }

    fn iteration_us(&self) -> u32 {
        self.board
            .modules()
            .clock()
            .map(|c| c.iteration_us())
            .unwrap_or(crate::devices::clock::DEFAULT_ITERATION_US)
    }

    /// One loop iteration. Returns false when the loop should end.
    fn run_iteration(&mut self) -> bool {
        self.drain_control();
        if self.stop.load(Ordering::SeqCst) || !self.running.load(Ordering::SeqCst) {
            self.stop_reason.get_or_insert(StopReason::Requested);
            return false;
        }
        if std::mem::take(&mut self.reset_pending) {
            self.warm_reset();
        }

        let budget = self
            .board
            .modules()
            .clock()
            .map(|c| c.instructions_per_iteration())
            .unwrap_or(0);
        if let Err(e) = self.board.run_cpu(budget) {
            self.log.error(format_args!("CPU error: {}", e));
            self.stop_reason = Some(StopReason::CpuError(e.to_string()));
            self.running.store(false, Ordering::SeqCst);
            return false;
        }

        self.board.advance_clock(self.iteration_us() as u64);
        self.iterations += 1;

        let faults = self.board.take_faults();
        if let Some(first) = faults.first() {
            for fault in &faults {
                self.log.error(format_args!("Device fault: {}", fault));
            }
            self.stop_reason = Some(StopReason::DeviceFault(first.to_string()));
            self.running.store(false, Ordering::SeqCst);
            return false;
        }

        if self.board.take_reset_request() {
            // Applied at the top of the next iteration, after this one has fully drained.
            self.reset_pending = true;
        }
        true
    }

    /// Handle every queued host request.
    fn drain_control(&mut self) {
        while let Ok(message) = self.control_rx.try_recv() {
            match message {
                ControlMessage::Stop => {
                    self.stop.store(true, Ordering::SeqCst);
                    self.running.store(false, Ordering::SeqCst);
                }
                ControlMessage::Reset => {
                    self.reset_pending = true;
                }
                ControlMessage::InsertFloppy {
                    drive,
                    carrier,
                    image,
                    write_protected,
                    reply,
                } => {
                    let ok = self
                        .board
                        .modules_mut()
                        .fdc_mut()
                        .map(|fdc| fdc.insert_floppy(drive, carrier, image, write_protected))
                        .unwrap_or(false);
                    _ = reply.try_send(ok);
                }
                ControlMessage::EjectFloppy { drive, reply } => {
                    let ok = self
                        .board
                        .modules_mut()
                        .fdc_mut()
                        .map(|fdc| fdc.eject_floppy(drive))
                        .unwrap_or(false);
                    _ = reply.try_send(ok);
                }
                ControlMessage::ScreenText { reply } => {
                    let text = self.board.modules().video().and_then(|vga| vga.screen_text());
                    _ = reply.try_send(text);
                }
            }
        }
    }

    /// Halt the CPU, tear down ports and timers and reset every module. ROM images are copied
    /// back by the memory module as it resets.
    pub fn warm_reset(&mut self) {
        self.log.info(format_args!("Warm reset"));
        if let Some(cpu) = self.board.modules_mut().cpu_mut() {
            cpu.halt();
        }
        if !self.board.reset_modules() {
            self.log.warn(format_args!("One or more modules failed to reset"));
        }
        self.program_video_without_bios();
        self.resets += 1;
    }

    fn finish(&mut self) -> StopReason {
        self.running.store(false, Ordering::SeqCst);
        self.board.stop_modules();
        self.events.send(HostEvent::Stopped);
        let reason = self.stop_reason.get_or_insert(StopReason::Requested).clone();
        self.log.info(format_args!("Emulation stopped: {:?} after {} iterations", reason, self.iterations));
        reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::MemoryImageProvider,
        devices::cpu::SystemBus,
        devices::rtc::{REG_EQUIPMENT, REG_FLOPPY_TYPES},
        error::CpuError,
    };
    use std::sync::atomic::AtomicU32;

    type Step = Box<dyn FnMut(&mut dyn SystemBus, u32) -> Result<u32, CpuError> + Send>;

    struct TestEngine {
        step: Step,
        resets: Arc<AtomicU32>,
    }

    impl CpuEngine for TestEngine {
        fn reset(&mut self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }

        fn execute(&mut self, bus: &mut dyn SystemBus, budget: u32) -> Result<u32, CpuError> {
            (self.step)(bus, budget)
        }

        fn instruction_pointer(&self) -> u32 {
            0xFFFF0
        }
    }

    fn engine(step: Step) -> (Box<dyn CpuEngine>, Arc<AtomicU32>) {
        let resets = Arc::new(AtomicU32::new(0));
        let engine = TestEngine {
            step,
            resets: resets.clone(),
        };
        (Box::new(engine), resets)
    }

    fn idle() -> Step {
        Box::new(|_, budget| Ok(budget))
    }

    fn config(toml: &str) -> MachineConfig {
        MachineConfig::from_toml(toml).unwrap()
    }

    #[test]
    fn test_setup_default_machine() {
        let (cpu, resets) = engine(idle());
        let mut emu = Emulator::new(config("[emulator]\nthrottle = false\n"), Some(cpu));
        assert!(emu.setup(&MemoryImageProvider::new()));
        assert!(emu.is_ready());
        assert_eq!(emu.board().modules().len(), 15);
        assert_eq!(resets.load(Ordering::SeqCst), 1);

        let rtc = emu.board().modules().rtc().unwrap();
        // Mouse present
        assert_eq!(rtc.cmos(REG_EQUIPMENT) & 0x04, 0x04);
        // Without a video BIOS the adapter comes up in 80 column text
        let vga = emu.board().modules().video().unwrap();
        assert!(vga.text_mode());
        assert_eq!(vga.geometry().cols, 80);
    }

    #[test]
    fn test_setup_without_cpu_fails() {
        let mut emu = Emulator::new(MachineConfig::default(), None);
        assert!(!emu.setup(&MemoryImageProvider::new()));
        assert_eq!(emu.run(), StopReason::NotReady);
        assert!(!emu.run_for(1));
    }

    #[test]
    fn test_disabled_modules_are_skipped() {
        let (cpu, _) = engine(idle());
        let mut emu = Emulator::new(config("[serial]\nenabled = false\n[parallel]\nenabled = false\n"), Some(cpu));
        assert!(emu.setup(&MemoryImageProvider::new()));
        assert!(!emu.board().modules().contains(ModuleType::Serial));
        assert!(!emu.board().modules().contains(ModuleType::Parallel));
        assert!(emu.board().modules().contains(ModuleType::Video));
    }

    #[test]
    fn test_missing_dependency_fails_setup() {
        let (cpu, _) = engine(idle());
        // The mouse talks through the keyboard controller
        let mut emu = Emulator::new(config("[keyboard]\nenabled = false\n"), Some(cpu));
        assert!(!emu.setup(&MemoryImageProvider::new()));
    }

    #[test]
    fn test_bios_images() {
        let toml = "[bios.system]\npath = \"bios.bin\"\noffset = 983040\n";
        let mut rom = vec![0x90; 0x10000];
        rom[0xFFF0] = 0xEA;

        let (cpu, _) = engine(idle());
        let mut emu = Emulator::new(config(toml), Some(cpu));
        assert!(emu.setup(&MemoryImageProvider::new().with_image("bios.bin", rom)));
        assert_eq!(emu.board_mut().mem_read_u8(0xFFFF0), 0xEA);

        let (cpu, _) = engine(idle());
        let mut emu = Emulator::new(config(toml), Some(cpu));
        assert!(!emu.setup(&MemoryImageProvider::new()));
    }

    #[test]
    fn test_floppy_setup() {
        let toml = "[[fdc.floppy]]\ndrive = \"A\"\ntype = \"1.44M\"\nimage = \"dos.img\"\n";
        let image = vec![0xF6; CarrierType::Floppy720K.size()];
        let (cpu, _) = engine(idle());
        let mut emu = Emulator::new(config(toml), Some(cpu));
        assert!(emu.setup(&MemoryImageProvider::new().with_image("dos.img", image)));

        let fdc = emu.board().modules().fdc().unwrap();
        assert_eq!(fdc.drive(0).and_then(|d| d.carrier()), Some(CarrierType::Floppy720K));
        let rtc = emu.board().modules().rtc().unwrap();
        assert_eq!(rtc.cmos(REG_FLOPPY_TYPES), 0x40);

        // An image of no known size with no format given
        let (cpu, _) = engine(idle());
        let mut emu = Emulator::new(config(toml), Some(cpu));
        assert!(!emu.setup(&MemoryImageProvider::new().with_image("dos.img", vec![0; 1000])));
    }

    #[test]
    fn test_host_reset_between_iterations() {
        let (cpu, resets) = engine(idle());
        let mut emu = Emulator::new(MachineConfig::default(), Some(cpu));
        assert!(emu.setup(&MemoryImageProvider::new()));
        let handle = emu.handle();

        assert!(emu.run_for(2));
        handle.request_reset();
        assert!(emu.run_for(1));
        assert_eq!(emu.resets(), 1);
        assert_eq!(resets.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_machine_reset_request() {
        let mut writes = 0;
        let (cpu, _) = engine(Box::new(move |bus, budget| {
            if writes == 0 {
                bus.io_write_u8(0x92, 0x01);
            }
            writes += 1;
            Ok(budget)
        }));
        let mut emu = Emulator::new(MachineConfig::default(), Some(cpu));
        assert!(emu.setup(&MemoryImageProvider::new()));

        assert!(emu.run_for(1));
        assert_eq!(emu.resets(), 0);
        assert!(emu.run_for(1));
        assert_eq!(emu.resets(), 1);
    }

    #[test]
    fn test_stop_and_cpu_error() {
        let (cpu, _) = engine(idle());
        let mut emu = Emulator::new(MachineConfig::default(), Some(cpu));
        assert!(emu.setup(&MemoryImageProvider::new()));
        let handle = emu.handle();
        handle.request_stop();
        assert!(!emu.run_for(10));
        assert_eq!(emu.stop_reason(), Some(&StopReason::Requested));
        assert_eq!(emu.iterations(), 0);
        assert!(handle.events().try_iter().any(|e| e == HostEvent::Stopped));

        let (cpu, _) = engine(Box::new(|_, _| Err(CpuError::InvalidOpcode { address: 0x7C00, opcode: 0x0F })));
        let mut emu = Emulator::new(MachineConfig::default(), Some(cpu));
        assert!(emu.setup(&MemoryImageProvider::new()));
        assert!(!emu.run_for(10));
        assert!(matches!(emu.stop_reason(), Some(StopReason::CpuError(_))));
        assert!(!emu.handle().is_running());
    }

    #[test]
    fn test_stop_survives_full_control_queue() {
        let (cpu, resets) = engine(idle());
        let mut emu = Emulator::new(MachineConfig::default(), Some(cpu));
        assert!(emu.setup(&MemoryImageProvider::new()));
        let handle = emu.handle();
        for _ in 0..CONTROL_QUEUE_LEN {
            handle.request_reset();
        }
        // The Stop message itself is dropped here
        handle.request_stop();

        assert!(!emu.run_for(10));
        assert_eq!(emu.stop_reason(), Some(&StopReason::Requested));
        assert_eq!(emu.iterations(), 0);
        assert_eq!(emu.resets(), 0);
        assert_eq!(resets.load(Ordering::SeqCst), 1);
        assert!(!handle.is_running());
    }

    #[test]
    fn test_run_returns_on_stop_requested_before_start() {
        let (cpu, _) = engine(idle());
        let mut emu = Emulator::new(config("[emulator]\nthrottle = false\n"), Some(cpu));
        assert!(emu.setup(&MemoryImageProvider::new()));
        emu.handle().request_stop();
        assert_eq!(emu.run(), StopReason::Requested);
        assert_eq!(emu.iterations(), 0);
    }

    #[test]
    fn test_orchestrator_logs_through_its_own_context() {
        let (cpu, _) = engine(idle());
        let emu = Emulator::new(MachineConfig::default(), Some(cpu));
        assert_eq!(emu.log.target(), EMULATOR_LOG_TARGET);
        assert!(!emu.log.is_debug());

        let (cpu, _) = engine(idle());
        let emu = Emulator::new(config("[emulator]\ndebug_motherboard = true\n"), Some(cpu));
        assert!(emu.log.is_debug());
    }

    #[test]
    fn test_keyboard_queue_bound() {
        let (cpu, _) = engine(idle());
        let emu = Emulator::new(MachineConfig::default(), Some(cpu));
        let handle = emu.handle();
        for _ in 0..KEYBOARD_QUEUE_LEN {
            assert!(handle.notify_keyboard(KeyboardEvent::press(0x1E)));
        }
        assert!(!handle.notify_keyboard(KeyboardEvent::press(0x1E)));
    }
}
