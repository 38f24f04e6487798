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

    devices::fdc.rs

    82077-style floppy disk controller with two sector-image drives.

*/

//! The controller implements the NEC 765 command set most BIOSes and DOS drivers use. Sector
//! data moves through the data register in non-DMA (PIO) mode: after a read or write command
//! the controller enters its execution phase and the CPU moves every byte through port 0x3F5,
//! after which the result phase begins and IRQ 6 is raised.
//!
//! Seek, recalibrate and reset complete after one update interval. The update timer is only
//! active while such an operation is outstanding.

use std::{collections::VecDeque, fmt::Display, str::FromStr};

use modular_bitfield::prelude::*;

use crate::{
    bus::BusContext,
    host::{EventSink, StatusCode},
    logging::LogContext,
    module::{normalize_interval, Module, ModuleType, PortAccessible, Resettable, Tickable, NO_IO_BYTE},
};

pub const FDC_MAX_DRIVES: usize = 2;
pub const FDC_IO_BASE: u16 = 0x3F0;
pub const DEFAULT_UPDATE_INTERVAL: u32 = 200;
pub const SECTOR_SIZE: usize = 512;

pub const FDC_STATUS_REGISTER_A: u16 = 0x00;
pub const FDC_STATUS_REGISTER_B: u16 = 0x01;
pub const FDC_DIGITAL_OUTPUT_REGISTER: u16 = 0x02;
pub const FDC_TAPE_DRIVE_REGISTER: u16 = 0x03;
pub const FDC_STATUS_REGISTER: u16 = 0x04;
pub const FDC_DATA_REGISTER: u16 = 0x05;
pub const FDC_DIGITAL_INPUT_REGISTER: u16 = 0x07;

pub const FDC_STATUS_FDD_A_BUSY: u8 = 0b0000_0001;
pub const FDC_STATUS_FDC_BUSY: u8 = 0b0001_0000;
pub const FDC_STATUS_NON_DMA_MODE: u8 = 0b0010_0000;
pub const FDC_STATUS_DIO: u8 = 0b0100_0000;
pub const FDC_STATUS_MRQ: u8 = 0b1000_0000;

pub const DOR_DRIVE_SELECT_MASK: u8 = 0b0000_0011;
pub const DOR_FDC_RESET: u8 = 0b0000_0100;
pub const DOR_IRQ_ENABLED: u8 = 0b0000_1000;
pub const DOR_MOTOR_FDD_A: u8 = 0b0001_0000;

pub const DSR_SOFTWARE_RESET: u8 = 0b1000_0000;
pub const DIR_DISK_CHANGE: u8 = 0b1000_0000;

pub const ST0_HEAD_ACTIVE: u8 = 0b0000_0100;
pub const ST0_NOT_READY: u8 = 0b0000_1000;
pub const ST0_UNIT_CHECK: u8 = 0b0001_0000;
pub const ST0_SEEK_END: u8 = 0b0010_0000;
pub const ST0_ABNORMAL_TERMINATION: u8 = 0b0100_0000;
pub const ST0_INVALID_OPCODE: u8 = 0b1000_0000;
pub const ST0_ABNORMAL_POLLING: u8 = 0b1100_0000;

pub const ST1_NO_ID: u8 = 0b0000_0001;
pub const ST1_WRITE_PROTECT: u8 = 0b0000_0010;
pub const ST1_NODATA: u8 = 0b0000_0100;

pub const ST3_WRITE_PROTECT: u8 = 0b0100_0000;
pub const ST3_READY: u8 = 0b0010_0000;
pub const ST3_TRACK0: u8 = 0b0001_0000;
pub const ST3_DOUBLESIDED: u8 = 0b0000_1000;
pub const ST3_HEAD: u8 = 0b0000_0100;

const FDC_VERSION: u8 = 0x90;

/// Floppy media types. Standard formats share their value with the CMOS drive type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CarrierType {
    Floppy160K,
    Floppy180K,
    Floppy320K,
    Floppy360K,
    Floppy720K,
    Floppy1200K,
    Floppy1440K,
    Floppy2880K,
}

impl CarrierType {
    /// Drive type byte for CMOS register 0x10.
    pub fn cmos_type(&self) -> u8 {
        match self {
            CarrierType::Floppy360K => 0x01,
            CarrierType::Floppy1200K => 0x02,
            CarrierType::Floppy720K => 0x03,
            CarrierType::Floppy1440K => 0x04,
            CarrierType::Floppy2880K => 0x05,
            // Single sided and 8-sector disks go in a 360K drive.
            CarrierType::Floppy160K | CarrierType::Floppy180K | CarrierType::Floppy320K => 0x01,
        }
    }

    /// (cylinders, heads, sectors per track)
    pub fn geometry(&self) -> (u8, u8, u8) {
        match self {
            CarrierType::Floppy160K => (40, 1, 8),
            CarrierType::Floppy180K => (40, 1, 9),
            CarrierType::Floppy320K => (40, 2, 8),
            CarrierType::Floppy360K => (40, 2, 9),
            CarrierType::Floppy720K => (80, 2, 9),
            CarrierType::Floppy1200K => (80, 2, 15),
            CarrierType::Floppy1440K => (80, 2, 18),
            CarrierType::Floppy2880K => (80, 2, 36),
        }
    }

    pub fn size(&self) -> usize {
        let (c, h, s) = self.geometry();
        c as usize * h as usize * s as usize * SECTOR_SIZE
    }

    /// Guess the media type of a raw sector image from its length.
    pub fn from_image_size(len: usize) -> Option<Self> {
        [
            CarrierType::Floppy160K,
            CarrierType::Floppy180K,
            CarrierType::Floppy320K,
            CarrierType::Floppy360K,
            CarrierType::Floppy720K,
            CarrierType::Floppy1200K,
            CarrierType::Floppy1440K,
            CarrierType::Floppy2880K,
        ]
        .into_iter()
        .find(|carrier| carrier.size() == len)
    }
}

impl Display for CarrierType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            CarrierType::Floppy160K => "160K",
            CarrierType::Floppy180K => "180K",
            CarrierType::Floppy320K => "320K",
            CarrierType::Floppy360K => "360K",
            CarrierType::Floppy720K => "720K",
            CarrierType::Floppy1200K => "1.2M",
            CarrierType::Floppy1440K => "1.44M",
            CarrierType::Floppy2880K => "2.88M",
        };
        write!(f, "{}", label)
    }
}

impl FromStr for CarrierType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "160K" => Ok(CarrierType::Floppy160K),
            "180K" => Ok(CarrierType::Floppy180K),
            "320K" => Ok(CarrierType::Floppy320K),
            "360K" => Ok(CarrierType::Floppy360K),
            "720K" => Ok(CarrierType::Floppy720K),
            "1.2M" | "1200K" => Ok(CarrierType::Floppy1200K),
            "1.44M" | "1440K" => Ok(CarrierType::Floppy1440K),
            "2.88M" | "2880K" => Ok(CarrierType::Floppy2880K),
            _ => Err(format!("unknown floppy format '{}'", s)),
        }
    }
}

/// The commands this controller knows how to handle.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Command {
    #[default]
    NoCommand = 0x00,
    Specify = 0x03,
    SenseDriveStatus = 0x04,
    WriteData = 0x05,
    ReadData = 0x06,
    Recalibrate = 0x07,
    SenseIntStatus = 0x08,
    ReadId = 0x0A,
    FormatTrack = 0x0D,
    DumpRegisters = 0x0E,
    Seek = 0x0F,
    Version = 0x10,
    PerpendicularMode = 0x12,
    Configure = 0x13,
    Lock = 0x14,
    Invalid = 0xFF,
}

impl Command {
    fn decode(byte: u8) -> Self {
        match byte & 0x1F {
            0x03 => Command::Specify,
            0x04 => Command::SenseDriveStatus,
            0x05 => Command::WriteData,
            0x06 => Command::ReadData,
            0x07 => Command::Recalibrate,
            0x08 => Command::SenseIntStatus,
            0x0A => Command::ReadId,
            0x0D => Command::FormatTrack,
            0x0E => Command::DumpRegisters,
            0x0F => Command::Seek,
            0x10 => Command::Version,
            0x12 => Command::PerpendicularMode,
            0x13 => Command::Configure,
            0x14 => Command::Lock,
            _ => Command::Invalid,
        }
    }

    /// Total command phase length including the command byte.
    fn length(&self) -> usize {
        match self {
            Command::NoCommand | Command::Invalid => 1,
            Command::Specify => 3,
            Command::SenseDriveStatus => 2,
            Command::WriteData | Command::ReadData => 9,
            Command::Recalibrate => 2,
            Command::SenseIntStatus => 1,
            Command::ReadId => 2,
            Command::FormatTrack => 6,
            Command::DumpRegisters => 1,
            Command::Seek => 3,
            Command::Version => 1,
            Command::PerpendicularMode => 2,
            Command::Configure => 4,
            Command::Lock => 1,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ControllerPhase {
    CommandPhase,
    ExecutionPhase,
    ResultPhase,
}

#[derive(Debug)]
pub enum InterruptCode {
    NormalTermination,
    AbnormalTermination,
    InvalidCommand,
    AbnormalPolling,
}

#[bitfield]
#[derive(Copy, Clone)]
pub struct CommandByte {
    pub command: B5,
    pub skip: bool,
    pub mfm: bool,
    pub mt: bool,
}

#[bitfield]
#[derive(Copy, Clone)]
pub struct DriveHeadSelect {
    pub drive: B2,
    pub head: B1,
    #[skip]
    unused: B5,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Chs {
    c: u8,
    h: u8,
    r: u8,
}

/// Data moving through the data register during an execution phase.
enum Transfer {
    Read {
        drive: usize,
        buffer: VecDeque<u8>,
        end: Chs,
        n: u8,
    },
    Write {
        drive: usize,
        offset: usize,
        expected: usize,
        buffer: Vec<u8>,
        end: Chs,
        n: u8,
    },
    Format {
        drive: usize,
        head: u8,
        sectors: u8,
        fill: u8,
        ids: Vec<u8>,
    },
}

/// Operations completed on the next timer update.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Delayed {
    Seek { drive: usize, head: u8, cylinder: u8 },
    Reset,
}

#[derive(Default)]
pub struct FloppyDrive {
    carrier: Option<CarrierType>,
    image: Vec<u8>,
    write_protected: bool,
    cylinder: u8,
    head: u8,
    disk_changed: bool,
    drive_type: Option<CarrierType>,
    seeking: bool,
}

impl FloppyDrive {
    pub fn disk_present(&self) -> bool {
        self.carrier.is_some()
    }

    pub fn carrier(&self) -> Option<CarrierType> {
        self.carrier
    }

    pub fn cylinder(&self) -> u8 {
        self.cylinder
    }

    pub fn write_protected(&self) -> bool {
        self.write_protected
    }

    pub fn image(&self) -> &[u8] {
        &self.image
    }

    fn geometry(&self) -> Option<(u8, u8, u8)> {
        self.carrier.map(|c| c.geometry())
    }

    fn offset_of(&self, chs: Chs) -> Option<usize> {
        let (cylinders, heads, spt) = self.geometry()?;
        if chs.c >= cylinders || chs.h >= heads || chs.r == 0 || chs.r > spt {
            return None;
        }
        let lba = (chs.c as usize * heads as usize + chs.h as usize) * spt as usize + (chs.r as usize - 1);
        Some(lba * SECTOR_SIZE)
    }
}

pub struct FloppyController {
    log: LogContext,
    events: EventSink,
    drives: [FloppyDrive; FDC_MAX_DRIVES],
    dor: u8,
    data_rate: u8,
    phase: ControllerPhase,
    command: Command,
    command_bytes: Vec<u8>,
    result: VecDeque<u8>,
    transfer: Option<Transfer>,
    delayed: Vec<Delayed>,
    pending_interrupts: VecDeque<(u8, u8)>,
    in_reset: bool,
    specify: [u8; 2],
    configure: u8,
    precomp: u8,
    locked: bool,
    eot: u8,
    irq: Option<u8>,
    irq_raised: bool,
    interval: u32,
}

impl FloppyController {
    pub fn new(log: LogContext, events: EventSink) -> Self {
        Self {
            log,
            events,
            drives: Default::default(),
            dor: DOR_FDC_RESET | DOR_IRQ_ENABLED,
            data_rate: 0,
            phase: ControllerPhase::CommandPhase,
            command: Command::NoCommand,
            command_bytes: Vec::with_capacity(9),
            result: VecDeque::new(),
            transfer: None,
            delayed: Vec::new(),
            pending_interrupts: VecDeque::new(),
            in_reset: false,
            specify: [0; 2],
            configure: 0,
            precomp: 0,
            locked: false,
            eot: 0,
            irq: None,
            irq_raised: false,
            interval: DEFAULT_UPDATE_INTERVAL,
        }
    }

    pub fn drive(&self, index: usize) -> Option<&FloppyDrive> {
        self.drives.get(index)
    }

    pub fn phase(&self) -> ControllerPhase {
        self.phase
    }

    /// Declare the physical drive type of a drive, reported in CMOS even when empty.
    pub fn set_drive_type(&mut self, drive: usize, carrier: CarrierType) -> bool {
        match self.drives.get_mut(drive) {
            Some(d) => {
                d.drive_type = Some(carrier);
                true
            }
            None => false,
        }
    }

    /// CMOS type nibbles for drives A and B.
    pub fn cmos_drive_types(&self) -> [u8; FDC_MAX_DRIVES] {
        let mut types = [0u8; FDC_MAX_DRIVES];
        for (t, drive) in types.iter_mut().zip(self.drives.iter()) {
            *t = drive.drive_type.or(drive.carrier).map(|c| c.cmos_type()).unwrap_or(0);
        }
        types
    }

    /// Insert a raw sector image. Images shorter than the format are zero padded.
    pub fn insert_floppy(&mut self, drive: usize, carrier: CarrierType, mut image: Vec<u8>, write_protected: bool) -> bool {
        if drive >= FDC_MAX_DRIVES {
            self.log.warn(format_args!("No floppy drive {}", drive));
            return false;
        }
        if image.is_empty() || image.len() > carrier.size() {
            self.log.error(format_args!(
                "Image of {} bytes doesn't fit a {} floppy",
                image.len(),
                carrier
            ));
            return false;
        }
        image.resize(carrier.size(), 0);

        let d = &mut self.drives[drive];
        d.carrier = Some(carrier);
        d.image = image;
        d.write_protected = write_protected;
        d.disk_changed = true;
        if d.drive_type.is_none() {
            d.drive_type = Some(carrier);
        }
        self.log.info(format_args!("Inserted {} floppy in drive {}", carrier, drive));
        self.events.status(StatusCode::FloppyInserted(drive as u8));
        true
    }

    pub fn eject_floppy(&mut self, drive: usize) -> bool {
        let Some(d) = self.drives.get_mut(drive)
        else {
            return false;
        };
        if d.carrier.take().is_none() {
            return false;
        }
        d.image = Vec::new();
        d.disk_changed = true;
        self.log.info(format_args!("Ejected floppy from drive {}", drive));
        self.events.status(StatusCode::FloppyEjected(drive as u8));
        true
    }

    fn selected_drive(&self) -> usize {
        (self.dor & DOR_DRIVE_SELECT_MASK) as usize
    }

    fn raise_interrupt(&mut self, ctx: &mut BusContext) {
        if self.dor & DOR_IRQ_ENABLED == 0 {
            return;
        }
        if let Some(irq) = self.irq {
            ctx.raise_irq(irq);
            self.irq_raised = true;
        }
    }

    fn lower_interrupt(&mut self, ctx: &mut BusContext) {
        if self.irq_raised {
            if let Some(irq) = self.irq {
                ctx.lower_irq(irq);
            }
            self.irq_raised = false;
        }
    }

    pub fn status_register(&self) -> u8 {
        if self.in_reset {
            return 0;
        }
        let mut msr = 0;
        for (i, drive) in self.drives.iter().enumerate() {
            if drive.seeking {
                msr |= FDC_STATUS_FDD_A_BUSY << i;
            }
        }
        match self.phase {
            ControllerPhase::CommandPhase => {
                msr |= FDC_STATUS_MRQ;
                if !self.command_bytes.is_empty() {
                    msr |= FDC_STATUS_FDC_BUSY;
                }
            }
            ControllerPhase::ExecutionPhase => {
                msr |= FDC_STATUS_MRQ | FDC_STATUS_NON_DMA_MODE | FDC_STATUS_FDC_BUSY;
                if matches!(self.transfer, Some(Transfer::Read { .. })) {
                    msr |= FDC_STATUS_DIO;
                }
            }
            ControllerPhase::ResultPhase => {
                msr |= FDC_STATUS_MRQ | FDC_STATUS_DIO | FDC_STATUS_FDC_BUSY;
            }
        }
        msr
    }

    /// Create the ST0 status byte for a drive.
    fn make_st0_byte(&self, interrupt_code: InterruptCode, drive: usize, head: u8, seek_end: bool) -> u8 {
        let mut st0 = (drive as u8) & 0x03;
        if head != 0 {
            st0 |= ST0_HEAD_ACTIVE;
        }
        if drive >= FDC_MAX_DRIVES {
            st0 |= ST0_NOT_READY | ST0_UNIT_CHECK;
        }
        if seek_end {
            st0 |= ST0_SEEK_END;
        }
        st0 | match interrupt_code {
            InterruptCode::NormalTermination => 0,
            InterruptCode::AbnormalTermination => ST0_ABNORMAL_TERMINATION,
            InterruptCode::InvalidCommand => ST0_INVALID_OPCODE,
            InterruptCode::AbnormalPolling => ST0_ABNORMAL_POLLING,
        }
    }

    /// Create the ST3 status byte reported by Sense Drive Status.
    fn make_st3_byte(&self, drive: usize, head: u8) -> u8 {
        let mut st3 = (drive as u8) & 0x03;
        if head != 0 {
            st3 |= ST3_HEAD;
        }
        let Some(d) = self.drives.get(drive)
        else {
            return st3;
        };
        if d.geometry().map(|(_, heads, _)| heads > 1).unwrap_or(true) {
            st3 |= ST3_DOUBLESIDED;
        }
        if d.cylinder == 0 {
            st3 |= ST3_TRACK0;
        }
        // Ready is tied high on AT drives.
        st3 |= ST3_READY;
        if d.write_protected || !d.disk_present() {
            st3 |= ST3_WRITE_PROTECT;
        }
        st3
    }

    fn enter_result(&mut self, bytes: &[u8], interrupt: bool, ctx: &mut BusContext) {
        self.result.clear();
        self.result.extend(bytes.iter().copied());
        self.phase = if self.result.is_empty() {
            ControllerPhase::CommandPhase
        }
        else {
            ControllerPhase::ResultPhase
        };
        self.command_bytes.clear();
        if interrupt {
            self.raise_interrupt(ctx);
        }
    }

    fn finish_command(&mut self) {
        self.phase = ControllerPhase::CommandPhase;
        self.command = Command::NoCommand;
        self.command_bytes.clear();
    }

    /// Controller reset through the DOR or DSR. Four polling interrupts are queued on exit.
    fn enter_reset(&mut self, ctx: &mut BusContext) {
        self.in_reset = true;
        self.transfer = None;
        self.result.clear();
        self.delayed.clear();
        self.pending_interrupts.clear();
        self.finish_command();
        self.lower_interrupt(ctx);
        if !self.locked {
            self.configure = 0;
            self.precomp = 0;
        }
    }

    fn leave_reset(&mut self, ctx: &mut BusContext) {
        self.in_reset = false;
        self.delayed.push(Delayed::Reset);
        ctx.set_timer_active(true);
    }

    fn write_dor(&mut self, data: u8, ctx: &mut BusContext) {
        let was_reset = self.dor & DOR_FDC_RESET == 0;
        self.dor = data;
        if data & DOR_FDC_RESET == 0 {
            if !was_reset {
                self.log.debug(format_args!("Controller reset via DOR: {:02X}", data));
            }
            self.enter_reset(ctx);
        }
        else if was_reset {
            self.leave_reset(ctx);
        }
    }

    fn read_data(&mut self, ctx: &mut BusContext) -> u8 {
        match self.phase {
            ControllerPhase::ResultPhase => {
                self.lower_interrupt(ctx);
                let byte = self.result.pop_front().unwrap_or(0);
                if self.result.is_empty() {
                    self.finish_command();
                }
                byte
            }
            ControllerPhase::ExecutionPhase => self.transfer_read(ctx),
            ControllerPhase::CommandPhase => {
                self.log.debug(format_args!("Data register read in command phase"));
                0
            }
        }
    }

    fn write_data(&mut self, data: u8, ctx: &mut BusContext) {
        match self.phase {
            ControllerPhase::CommandPhase => {
                if self.command_bytes.is_empty() {
                    self.command = Command::decode(data);
                }
                self.command_bytes.push(data);
                if self.command_bytes.len() >= self.command.length() {
                    self.execute_command(ctx);
                }
            }
            ControllerPhase::ExecutionPhase => self.transfer_write(data, ctx),
            ControllerPhase::ResultPhase => {
                self.log.debug(format_args!("Data register write {:02X} in result phase", data));
            }
        }
    }

    fn execute_command(&mut self, ctx: &mut BusContext) {
        let bytes = std::mem::take(&mut self.command_bytes);
        let command_byte = CommandByte::from_bytes([bytes[0]]);
        self.log.trace(format_args!("Command {:?} {:02X?}", self.command, bytes));

        match self.command {
            Command::Specify => {
                self.specify = [bytes[1], bytes[2]];
                self.finish_command();
            }
            Command::SenseDriveStatus => {
                let dhs = DriveHeadSelect::from_bytes([bytes[1]]);
                let st3 = self.make_st3_byte(dhs.drive() as usize, dhs.head());
                self.enter_result(&[st3], false, ctx);
            }
            Command::Recalibrate | Command::Seek => {
                let dhs = DriveHeadSelect::from_bytes([bytes[1]]);
                let drive = dhs.drive() as usize;
                let cylinder = if self.command == Command::Seek { bytes[2] } else { 0 };
                if let Some(d) = self.drives.get_mut(drive) {
                    d.seeking = true;
                }
                self.delayed.push(Delayed::Seek {
                    drive,
                    head: dhs.head(),
                    cylinder,
                });
                ctx.set_timer_active(true);
                self.finish_command();
            }
            Command::SenseIntStatus => {
                self.lower_interrupt(ctx);
                match self.pending_interrupts.pop_front() {
                    Some((st0, pcn)) => self.enter_result(&[st0, pcn], false, ctx),
                    None => self.enter_result(&[ST0_INVALID_OPCODE], false, ctx),
                }
            }
            Command::ReadId => {
                let dhs = DriveHeadSelect::from_bytes([bytes[1]]);
                let drive = dhs.drive() as usize;
                let head = dhs.head();
                let result = match self.drives.get(drive) {
                    Some(d) if d.disk_present() => {
                        let st0 = self.make_st0_byte(InterruptCode::NormalTermination, drive, head, false);
                        [st0, 0, 0, d.cylinder, head, 1, 2]
                    }
                    _ => {
                        let st0 = self.make_st0_byte(InterruptCode::AbnormalTermination, drive, head, false);
                        [st0, ST1_NO_ID, 0, 0, head, 1, 2]
                    }
                };
                self.enter_result(&result, true, ctx);
            }
            Command::ReadData | Command::WriteData => self.start_transfer(command_byte, &bytes, ctx),
            Command::FormatTrack => self.start_format(&bytes, ctx),
            Command::DumpRegisters => {
                let [c0, c1] = [self.drives[0].cylinder, self.drives[1].cylinder];
                let lock = if self.locked { 0x80 } else { 0 };
                let result = [c0, c1, 0, 0, self.specify[0], self.specify[1], self.eot, lock, self.configure, self.precomp];
                self.enter_result(&result, false, ctx);
            }
            Command::Version => self.enter_result(&[FDC_VERSION], false, ctx),
            Command::PerpendicularMode => self.finish_command(),
            Command::Configure => {
                self.configure = bytes[2];
                self.precomp = bytes[3];
                self.finish_command();
            }
            Command::Lock => {
                self.locked = command_byte.mt();
                let lock = if self.locked { 0x10 } else { 0 };
                self.enter_result(&[lock], false, ctx);
            }
            Command::NoCommand | Command::Invalid => {
                self.log.debug(format_args!("Invalid command byte {:02X}", bytes[0]));
                self.enter_result(&[ST0_INVALID_OPCODE], false, ctx);
            }
        }
    }

    fn start_transfer(&mut self, command_byte: CommandByte, bytes: &[u8], ctx: &mut BusContext) {
        let dhs = DriveHeadSelect::from_bytes([bytes[1]]);
        let drive = dhs.drive() as usize;
        let start = Chs {
            c: bytes[2],
            h: bytes[3],
            r: bytes[4],
        };
        let n = bytes[5];
        let eot = bytes[6];
        self.eot = eot;
        let writing = self.command == Command::WriteData;

        let fail = |this: &mut Self, st1: u8, ctx: &mut BusContext| {
            let st0 = this.make_st0_byte(InterruptCode::AbnormalTermination, drive, start.h, false);
            this.enter_result(&[st0, st1, 0, start.c, start.h, start.r, n], true, ctx);
        };

        let media = self
            .drives
            .get(drive)
            .filter(|d| d.disk_present())
            .map(|d| (d.write_protected, d.geometry().map(|(_, h, _)| h).unwrap_or(1)));
        let Some((write_protected, heads)) = media
        else {
            fail(self, ST1_NO_ID, ctx);
            return;
        };
        if n != 2 {
            fail(self, ST1_NODATA, ctx);
            return;
        }
        if writing && write_protected {
            fail(self, ST1_WRITE_PROTECT, ctx);
            return;
        }

        // Walk from the start sector to EOT, onto head 1 for multi-track commands.
        let d = &self.drives[drive];
        let mut sectors = Vec::new();
        let mut chs = start;
        loop {
            let Some(offset) = d.offset_of(chs)
            else {
                break;
            };
            sectors.push(offset);
            if chs.r >= eot {
                if command_byte.mt() && chs.h == 0 && heads > 1 {
                    chs.h = 1;
                    chs.r = 1;
                    continue;
                }
                break;
            }
            chs.r += 1;
        }
        if sectors.is_empty() {
            fail(self, ST1_NODATA, ctx);
            return;
        }

        let end = if chs.r >= eot {
            let mut end = Chs { c: chs.c, h: chs.h, r: 1 };
            if command_byte.mt() {
                end.h ^= 1;
                if end.h == 0 {
                    end.c = end.c.wrapping_add(1);
                }
            }
            else {
                end.c = end.c.wrapping_add(1);
            }
            end
        }
        else {
            Chs { r: chs.r + 1, ..chs }
        };

        self.drives[drive].cylinder = start.c;
        self.drives[drive].head = start.h;
        self.events.status(StatusCode::FloppyTransferStart(drive as u8));

        let transfer = if writing {
            // Sectors walked in order are contiguous in a raw image.
            Transfer::Write {
                drive,
                offset: sectors[0],
                expected: sectors.len() * SECTOR_SIZE,
                buffer: Vec::with_capacity(sectors.len() * SECTOR_SIZE),
                end,
                n,
            }
        }
        else {
            let image = &self.drives[drive].image;
            let mut buffer = VecDeque::with_capacity(sectors.len() * SECTOR_SIZE);
            for offset in sectors {
                buffer.extend(image[offset..offset + SECTOR_SIZE].iter().copied());
            }
            Transfer::Read { drive, buffer, end, n }
        };
        self.transfer = Some(transfer);
        self.phase = ControllerPhase::ExecutionPhase;
        // Non-DMA mode interrupts when data is ready.
        self.raise_interrupt(ctx);
    }

    fn start_format(&mut self, bytes: &[u8], ctx: &mut BusContext) {
        let dhs = DriveHeadSelect::from_bytes([bytes[1]]);
        let drive = dhs.drive() as usize;
        let sectors = bytes[3];
        let fill = bytes[5];
        let ok = self
            .drives
            .get(drive)
            .map(|d| d.disk_present() && !d.write_protected)
            .unwrap_or(false);
        if !ok || bytes[2] != 2 {
            let st0 = self.make_st0_byte(InterruptCode::AbnormalTermination, drive, dhs.head(), false);
            self.enter_result(&[st0, ST1_WRITE_PROTECT, 0, 0, dhs.head(), 1, bytes[2]], true, ctx);
            return;
        }
        self.transfer = Some(Transfer::Format {
            drive,
            head: dhs.head(),
            sectors,
            fill,
            ids: Vec::with_capacity(sectors as usize * 4),
        });
        self.phase = ControllerPhase::ExecutionPhase;
        self.raise_interrupt(ctx);
    }

    fn transfer_read(&mut self, ctx: &mut BusContext) -> u8 {
        self.lower_interrupt(ctx);
        let (byte, done) = match &mut self.transfer {
            Some(Transfer::Read { buffer, .. }) => {
                let byte = buffer.pop_front().unwrap_or(0);
                (byte, buffer.is_empty())
            }
            _ => return 0,
        };
        if done {
            self.complete_transfer(ctx);
        }
        byte
    }

    fn transfer_write(&mut self, data: u8, ctx: &mut BusContext) {
        self.lower_interrupt(ctx);
        let complete = match &mut self.transfer {
            Some(Transfer::Write { buffer, expected, .. }) => {
                buffer.push(data);
                buffer.len() >= *expected
            }
            Some(Transfer::Format { ids, sectors, .. }) => {
                ids.push(data);
                ids.len() >= *sectors as usize * 4
            }
            _ => false,
        };
        if complete {
            self.complete_transfer(ctx);
        }
    }

    fn complete_transfer(&mut self, ctx: &mut BusContext) {
        let Some(transfer) = self.transfer.take()
        else {
            return;
        };
        let result = match transfer {
            Transfer::Read { drive, end, n, .. } => {
                let st0 = self.make_st0_byte(InterruptCode::NormalTermination, drive, self.drives[drive].head, false);
                self.events.status(StatusCode::FloppyTransferStop(drive as u8));
                [st0, 0, 0, end.c, end.h, end.r, n]
            }
            Transfer::Write {
                drive,
                offset,
                buffer,
                end,
                n,
                ..
            } => {
                let d = &mut self.drives[drive];
                let end_offset = (offset + buffer.len()).min(d.image.len());
                d.image[offset..end_offset].copy_from_slice(&buffer[..end_offset - offset]);
                let st0 = self.make_st0_byte(InterruptCode::NormalTermination, drive, self.drives[drive].head, false);
                self.events.status(StatusCode::FloppyTransferStop(drive as u8));
                [st0, 0, 0, end.c, end.h, end.r, n]
            }
            Transfer::Format {
                drive,
                head,
                sectors,
                fill,
                ids,
            } => {
                let cylinder = self.drives[drive].cylinder;
                for id in ids.chunks(4) {
                    let chs = Chs {
                        c: id[0],
                        h: id[1],
                        r: id[2],
                    };
                    if let Some(offset) = self.drives[drive].offset_of(chs) {
                        self.drives[drive].image[offset..offset + SECTOR_SIZE].fill(fill);
                    }
                }
                let st0 = self.make_st0_byte(InterruptCode::NormalTermination, drive, head, false);
                [st0, 0, 0, cylinder, head, sectors, 2]
            }
        };
        self.enter_result(&result, true, ctx);
    }

    fn run_delayed(&mut self, ctx: &mut BusContext) {
        let delayed = std::mem::take(&mut self.delayed);
        let mut interrupt = false;
        for op in delayed {
            match op {
                Delayed::Seek { drive, head, cylinder } => {
                    let st0 = match self.drives.get_mut(drive) {
                        Some(d) => {
                            let max = d.geometry().map(|(c, _, _)| c.saturating_sub(1)).unwrap_or(79);
                            d.cylinder = cylinder.min(max);
                            d.head = head;
                            d.seeking = false;
                            if d.disk_present() {
                                d.disk_changed = false;
                            }
                            self.make_st0_byte(InterruptCode::NormalTermination, drive, head, true)
                        }
                        None => self.make_st0_byte(InterruptCode::AbnormalTermination, drive, head, true),
                    };
                    let pcn = self.drives.get(drive).map(|d| d.cylinder).unwrap_or(0);
                    self.pending_interrupts.push_back((st0, pcn));
                    interrupt = true;
                }
                Delayed::Reset => {
                    for drive in 0..4u8 {
                        let pcn = self.drives.get(drive as usize).map(|d| d.cylinder).unwrap_or(0);
                        self.pending_interrupts.push_back((ST0_ABNORMAL_POLLING | drive, pcn));
                    }
                    interrupt = true;
                }
            }
        }
        if interrupt {
            self.raise_interrupt(ctx);
        }
    }
}

impl Module for FloppyController {
    fn module_type(&self) -> ModuleType {
        ModuleType::Fdc
    }

    fn required_connections(&self) -> &'static [ModuleType] {
        &[ModuleType::Motherboard, ModuleType::Pic, ModuleType::Rtc]
    }

    fn set_debug(&mut self, debug: bool) {
        self.log.set_debug(debug);
    }

    fn dump(&self) -> String {
        let mut out = format!(
            "DOR: {:02X} MSR: {:02X} phase: {:?} command: {:?} irq: {:?}\n",
            self.dor,
            self.status_register(),
            self.phase,
            self.command,
            self.irq
        );
        for (i, d) in self.drives.iter().enumerate() {
            out.push_str(&format!(
                "drive {}: {} cyl {} head {} wp {} changed {}\n",
                i,
                d.carrier.map(|c| c.to_string()).unwrap_or_else(|| String::from("empty")),
                d.cylinder,
                d.head,
                d.write_protected,
                d.disk_changed
            ));
        }
        out
    }
}

impl Resettable for FloppyController {
    fn reset(&mut self, ctx: &mut BusContext) -> bool {
        self.dor = DOR_FDC_RESET | DOR_IRQ_ENABLED;
        self.data_rate = 0;
        self.in_reset = false;
        self.locked = false;
        self.transfer = None;
        self.result.clear();
        self.delayed.clear();
        self.pending_interrupts.clear();
        self.irq_raised = false;
        self.finish_command();
        for d in &mut self.drives {
            d.cylinder = 0;
            d.head = 0;
            d.seeking = false;
        }
        self.irq = ctx.request_irq_number();
        if self.irq.is_none() {
            self.log.warn(format_args!("No IRQ line available for the floppy controller"));
        }
        true
    }
}

impl PortAccessible for FloppyController {
    fn port_list(&self) -> Vec<(String, u16)> {
        vec![
            (String::from("FDC Status Register A"), FDC_IO_BASE + FDC_STATUS_REGISTER_A),
            (String::from("FDC Status Register B"), FDC_IO_BASE + FDC_STATUS_REGISTER_B),
            (String::from("FDC Digital Output Register"), FDC_IO_BASE + FDC_DIGITAL_OUTPUT_REGISTER),
            (String::from("FDC Tape Drive Register"), FDC_IO_BASE + FDC_TAPE_DRIVE_REGISTER),
            (String::from("FDC Main Status Register"), FDC_IO_BASE + FDC_STATUS_REGISTER),
            (String::from("FDC Data Register"), FDC_IO_BASE + FDC_DATA_REGISTER),
            (String::from("FDC Digital Input Register"), FDC_IO_BASE + FDC_DIGITAL_INPUT_REGISTER),
        ]
    }

    fn read_u8(&mut self, port: u16, ctx: &mut BusContext) -> u8 {
        match port.wrapping_sub(FDC_IO_BASE) {
            FDC_DIGITAL_OUTPUT_REGISTER => self.dor,
            FDC_TAPE_DRIVE_REGISTER => 0,
            FDC_STATUS_REGISTER => self.status_register(),
            FDC_DATA_REGISTER => self.read_data(ctx),
            FDC_DIGITAL_INPUT_REGISTER => {
                let drive = self.selected_drive();
                let changed = self.drives.get(drive).map(|d| d.disk_changed).unwrap_or(false);
                if changed {
                    DIR_DISK_CHANGE
                }
                else {
                    0
                }
            }
            _ => NO_IO_BYTE,
        }
    }

    fn write_u8(&mut self, port: u16, data: u8, ctx: &mut BusContext) {
        match port.wrapping_sub(FDC_IO_BASE) {
            FDC_DIGITAL_OUTPUT_REGISTER => self.write_dor(data, ctx),
            FDC_STATUS_REGISTER => {
                // Data rate select register
                self.data_rate = data & 0x03;
                if data & DSR_SOFTWARE_RESET != 0 {
                    self.enter_reset(ctx);
                    self.leave_reset(ctx);
                }
            }
            FDC_DATA_REGISTER => {
                if !self.in_reset {
                    self.write_data(data, ctx);
                }
            }
            FDC_DIGITAL_INPUT_REGISTER => self.data_rate = data & 0x03,
            _ => {}
        }
    }
}

impl Tickable for FloppyController {
    fn update_interval(&self) -> Option<u32> {
        Some(self.interval)
    }

    fn set_update_interval(&mut self, interval: i64) {
        self.interval = normalize_interval(interval, DEFAULT_UPDATE_INTERVAL);
    }

    fn timer_active_on_reset(&self) -> bool {
        false
    }

    fn update(&mut self, ctx: &mut BusContext) {
        self.run_delayed(ctx);
        if self.delayed.is_empty() {
            ctx.set_timer_active(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_carrier_types() {
        assert_eq!(CarrierType::Floppy1440K.cmos_type(), 0x04);
        assert_eq!(CarrierType::Floppy1440K.geometry(), (80, 2, 18));
        assert_eq!(CarrierType::Floppy1440K.size(), 1_474_560);
        assert_eq!(CarrierType::Floppy160K.cmos_type(), 0x01);
        assert_eq!(CarrierType::from_image_size(368_640), Some(CarrierType::Floppy360K));
        assert_eq!("1.44M".parse::<CarrierType>(), Ok(CarrierType::Floppy1440K));
        assert_eq!("720k".parse::<CarrierType>(), Ok(CarrierType::Floppy720K));
        assert!("1.7M".parse::<CarrierType>().is_err());
        assert_eq!(CarrierType::Floppy1200K.to_string(), "1.2M");
    }

    #[test]
    fn test_insert_and_eject() {
        let (tx, rx) = crossbeam_channel::bounded(4);
        let mut fdc = FloppyController::new(LogContext::new(ModuleType::Fdc), EventSink::new(tx));
        assert!(!fdc.insert_floppy(0, CarrierType::Floppy360K, vec![0; 2_000_000], false));
        assert!(fdc.insert_floppy(0, CarrierType::Floppy360K, vec![0xF6; 1024], false));
        assert_eq!(fdc.drive(0).map(|d| d.image().len()), Some(368_640));
        assert_eq!(fdc.cmos_drive_types(), [0x01, 0x00]);
        assert!(fdc.eject_floppy(0));
        assert!(!fdc.eject_floppy(0));
        assert!(!fdc.insert_floppy(2, CarrierType::Floppy360K, vec![0; 512], false));

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                crate::host::HostEvent::StatusChanged(StatusCode::FloppyInserted(0)),
                crate::host::HostEvent::StatusChanged(StatusCode::FloppyEjected(0)),
            ]
        );
    }

    #[test]
    fn test_sector_offsets() {
        let mut drive = FloppyDrive::default();
        drive.carrier = Some(CarrierType::Floppy1440K);
        assert_eq!(drive.offset_of(Chs { c: 0, h: 0, r: 1 }), Some(0));
        assert_eq!(drive.offset_of(Chs { c: 0, h: 1, r: 1 }), Some(18 * 512));
        assert_eq!(drive.offset_of(Chs { c: 1, h: 0, r: 2 }), Some(37 * 512));
        assert_eq!(drive.offset_of(Chs { c: 0, h: 0, r: 0 }), None);
        assert_eq!(drive.offset_of(Chs { c: 80, h: 0, r: 1 }), None);
    }

    #[test]
    fn test_command_lengths() {
        assert_eq!(Command::decode(0xE6), Command::ReadData);
        assert_eq!(Command::decode(0xC5), Command::WriteData);
        assert_eq!(Command::decode(0x94), Command::Lock);
        assert_eq!(Command::ReadData.length(), 9);
        assert_eq!(Command::decode(0x01), Command::Invalid);
    }
}
