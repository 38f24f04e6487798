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

    devices::ata.rs

    Two-channel ATA controller with raw sector-image hard disks.

*/

//! Each channel has a task file shared by its master and slave drive, a control register and
//! a 512-byte sector buffer moved through the 16-bit data register in PIO mode. Disks are raw
//! images addressed in CHS or 28-bit LBA.
//!
//! The primary channel interrupts on the line handed out by the interrupt controller (IRQ 14
//! when free); the secondary channel claims IRQ 15.

use modular_bitfield::prelude::*;

use crate::{
    bus::BusContext,
    host::{EventSink, StatusCode},
    logging::LogContext,
    module::{normalize_interval, Module, ModuleType, PortAccessible, Resettable, Tickable, NO_IO_BYTE},
};

pub const ATA_CHANNELS: usize = 2;
pub const ATA_PRIMARY_BASE: u16 = 0x1F0;
pub const ATA_PRIMARY_CONTROL: u16 = 0x3F6;
pub const ATA_SECONDARY_BASE: u16 = 0x170;
pub const ATA_SECONDARY_CONTROL: u16 = 0x376;
pub const ATA_SECONDARY_IRQ: u8 = 15;
pub const DEFAULT_UPDATE_INTERVAL: u32 = 200;
pub const SECTOR_SIZE: usize = 512;

const REG_DATA: u16 = 0;
const REG_ERROR_FEATURES: u16 = 1;
const REG_SECTOR_COUNT: u16 = 2;
const REG_SECTOR_NUMBER: u16 = 3;
const REG_CYLINDER_LOW: u16 = 4;
const REG_CYLINDER_HIGH: u16 = 5;
const REG_DRIVE_HEAD: u16 = 6;
const REG_STATUS_COMMAND: u16 = 7;

const DRIVE_HEAD_BITS_ON: u8 = 0xA0;
const DRIVE_HEAD_LBA_BIT: u8 = 0x40;
const DRIVE_HEAD_SLAVE_BIT: u8 = 0x10;
const CONTROL_NIEN: u8 = 0x02;
const CONTROL_SRST: u8 = 0x04;

const CAPABILITIES_LBA: u16 = 0b0000_0010_0000_0000;
const DIAGNOSTIC_OK: u8 = 0x01;

#[bitfield]
#[derive(Copy, Clone, Debug)]
pub struct AtaStatusRegister {
    pub err:   bool,
    pub idx:   bool,
    pub corr:  bool,
    pub drq:   bool,
    pub dsc:   bool,
    pub dwf:   bool,
    pub ready: bool,
    pub busy:  bool,
}

#[bitfield]
#[derive(Copy, Clone, Debug)]
pub struct AtaErrorRegister {
    pub amnf: bool,
    pub tk0:  bool,
    pub abrt: bool,
    pub mcr:  bool,
    pub idnf: bool,
    pub mc:   bool,
    pub unc:  bool,
    pub bbk:  bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AtaCommand {
    Recalibrate,
    ReadSectors,
    WriteSectors,
    VerifySectors,
    Seek,
    ExecuteDiagnostic,
    InitializeParameters,
    Identify,
    SetFeatures,
    Unsupported(u8),
}

impl From<u8> for AtaCommand {
    fn from(byte: u8) -> Self {
        match byte {
            0x10..=0x1F => AtaCommand::Recalibrate,
            0x20 | 0x21 => AtaCommand::ReadSectors,
            0x30 | 0x31 => AtaCommand::WriteSectors,
            0x40 | 0x41 => AtaCommand::VerifySectors,
            0x70..=0x7F => AtaCommand::Seek,
            0x90 => AtaCommand::ExecuteDiagnostic,
            0x91 => AtaCommand::InitializeParameters,
            0xEC => AtaCommand::Identify,
            0xEF => AtaCommand::SetFeatures,
            _ => AtaCommand::Unsupported(byte),
        }
    }
}

/// A raw hard disk image and its geometry.
pub struct HardDisk {
    image: Vec<u8>,
    cylinders: u16,
    heads: u8,
    sectors_per_track: u8,
    /// Logical geometry set by INITIALIZE DEVICE PARAMETERS.
    logical_heads: u8,
    logical_sectors: u8,
}

impl HardDisk {
    pub fn new(image: Vec<u8>, cylinders: u16, heads: u8, sectors_per_track: u8) -> Self {
        Self {
            image,
            cylinders,
            heads,
            sectors_per_track,
            logical_heads: heads,
            logical_sectors: sectors_per_track,
        }
    }

    pub fn geometry(&self) -> (u16, u8, u8) {
        (self.cylinders, self.heads, self.sectors_per_track)
    }

    pub fn total_sectors(&self) -> u32 {
        self.cylinders as u32 * self.heads as u32 * self.sectors_per_track as u32
    }

    pub fn image(&self) -> &[u8] {
        &self.image
    }

    fn chs_to_lba(&self, cylinder: u16, head: u8, sector: u8) -> Option<u32> {
        let (heads, spt) = (self.logical_heads as u32, self.logical_sectors as u32);
        if sector == 0 || sector as u32 > spt || head as u32 >= heads {
            return None;
        }
        let lba = (cylinder as u32 * heads + head as u32) * spt + sector as u32 - 1;
        (lba < self.total_sectors()).then_some(lba)
    }

    fn lba_to_chs(&self, lba: u32) -> (u16, u8, u8) {
        let (heads, spt) = (self.logical_heads.max(1) as u32, self.logical_sectors.max(1) as u32);
        let cylinder = lba / (heads * spt);
        let head = (lba / spt) % heads;
        let sector = lba % spt + 1;
        (cylinder as u16, head as u8, sector as u8)
    }

    fn read_sector(&self, lba: u32, buffer: &mut [u8]) -> bool {
        let offset = lba as usize * SECTOR_SIZE;
        match self.image.get(offset..offset + SECTOR_SIZE) {
            Some(sector) => {
                buffer.copy_from_slice(sector);
                true
            }
            None => false,
        }
    }

    fn write_sector(&mut self, lba: u32, buffer: &[u8]) -> bool {
        let offset = lba as usize * SECTOR_SIZE;
        match self.image.get_mut(offset..offset + SECTOR_SIZE) {
            Some(sector) => {
                sector.copy_from_slice(buffer);
                true
            }
            None => false,
        }
    }

    /// Build the 256-word IDENTIFY DEVICE response.
    fn identify(&self) -> [u16; 256] {
        let mut words = [0u16; 256];
        let capacity = self.total_sectors();
        let current = self.cylinders as u32 * self.logical_heads as u32 * self.logical_sectors as u32;

        words[0] = 0x0040;
        words[1] = self.cylinders;
        words[3] = self.heads as u16;
        words[4] = (SECTOR_SIZE * self.sectors_per_track as usize) as u16;
        words[5] = SECTOR_SIZE as u16;
        words[6] = self.sectors_per_track as u16;
        put_ata_string(&mut words[10..20], "HEIRLOOM0000000000001");
        words[20] = 3;
        words[21] = 512;
        put_ata_string(&mut words[23..27], "1.0");
        put_ata_string(&mut words[27..47], "Heirloom Hard Disk");
        words[49] = CAPABILITIES_LBA;
        words[51] = 0x0200;
        words[53] = 0x0001;
        words[54] = self.cylinders;
        words[55] = self.logical_heads as u16;
        words[56] = self.logical_sectors as u16;
        words[57] = current as u16;
        words[58] = (current >> 16) as u16;
        words[60] = capacity as u16;
        words[61] = (capacity >> 16) as u16;
        words
    }
}

/// ATA strings are space padded and stored with the two bytes of each word swapped.
fn put_ata_string(words: &mut [u16], text: &str) {
    let mut bytes = text.bytes().chain(std::iter::repeat(b' '));
    for word in words.iter_mut() {
        let hi = bytes.next().unwrap_or(b' ');
        let lo = bytes.next().unwrap_or(b' ');
        *word = (hi as u16) << 8 | lo as u16;
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Transfer {
    None,
    Read { lba: u32, remaining: u32 },
    Write { lba: u32, remaining: u32 },
    Identify,
}

struct AtaChannel {
    drives: [Option<HardDisk>; 2],
    status: AtaStatusRegister,
    error: AtaErrorRegister,
    features: u8,
    sector_count: u8,
    sector_number: u8,
    cylinder_low: u8,
    cylinder_high: u8,
    drive_head: u8,
    control: u8,
    buffer: Vec<u8>,
    buffer_pos: usize,
    transfer: Transfer,
    irq: Option<u8>,
    irq_raised: bool,
}

impl AtaChannel {
    fn new() -> Self {
        Self {
            drives: [None, None],
            status: AtaStatusRegister::new(),
            error: AtaErrorRegister::new(),
            features: 0,
            sector_count: 1,
            sector_number: 1,
            cylinder_low: 0,
            cylinder_high: 0,
            drive_head: DRIVE_HEAD_BITS_ON,
            control: 0,
            buffer: vec![0; SECTOR_SIZE],
            buffer_pos: SECTOR_SIZE,
            transfer: Transfer::None,
            irq: None,
            irq_raised: false,
        }
    }

    fn selected(&self) -> usize {
        (self.drive_head & DRIVE_HEAD_SLAVE_BIT != 0) as usize
    }

    fn disk(&self) -> Option<&HardDisk> {
        self.drives[self.selected()].as_ref()
    }

    fn has_drives(&self) -> bool {
        self.drives.iter().any(|d| d.is_some())
    }

    /// Return the task file to its power-on signature.
    fn soft_reset(&mut self) {
        self.status = AtaStatusRegister::new().with_ready(true).with_dsc(true);
        self.error = AtaErrorRegister::from_bytes([DIAGNOSTIC_OK]);
        self.sector_count = 1;
        self.sector_number = 1;
        self.cylinder_low = 0;
        self.cylinder_high = 0;
        self.drive_head = DRIVE_HEAD_BITS_ON;
        self.transfer = Transfer::None;
        self.buffer_pos = SECTOR_SIZE;
    }

    fn status_byte(&self) -> u8 {
        if !self.has_drives() {
            return NO_IO_BYTE;
        }
        if self.disk().is_none() {
            return 0;
        }
        self.status.into_bytes()[0]
    }

    fn raise_interrupt(&mut self, ctx: &mut BusContext) {
        if self.control & CONTROL_NIEN != 0 {
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

    /// The address in the task file as an LBA, translating CHS through the logical geometry.
    fn address(&self) -> Option<u32> {
        let disk = self.disk()?;
        if self.drive_head & DRIVE_HEAD_LBA_BIT != 0 {
            let lba = (self.drive_head as u32 & 0x0F) << 24
                | (self.cylinder_high as u32) << 16
                | (self.cylinder_low as u32) << 8
                | self.sector_number as u32;
            (lba < disk.total_sectors()).then_some(lba)
        }
        else {
            let cylinder = (self.cylinder_high as u16) << 8 | self.cylinder_low as u16;
            disk.chs_to_lba(cylinder, self.drive_head & 0x0F, self.sector_number)
        }
    }

    /// Write an address back into the task file in the current addressing mode.
    fn set_address(&mut self, lba: u32) {
        if self.drive_head & DRIVE_HEAD_LBA_BIT != 0 {
            self.sector_number = lba as u8;
            self.cylinder_low = (lba >> 8) as u8;
            self.cylinder_high = (lba >> 16) as u8;
            self.drive_head = (self.drive_head & 0xF0) | ((lba >> 24) as u8 & 0x0F);
        }
        else if let Some(disk) = self.disk() {
            let (cylinder, head, sector) = disk.lba_to_chs(lba);
            self.sector_number = sector;
            self.cylinder_low = cylinder as u8;
            self.cylinder_high = (cylinder >> 8) as u8;
            self.drive_head = (self.drive_head & 0xF0) | (head & 0x0F);
        }
    }

    fn sector_count(&self) -> u32 {
        match self.sector_count {
            0 => 256,
            n => n as u32,
        }
    }

    fn abort(&mut self, ctx: &mut BusContext) {
        self.error = AtaErrorRegister::new().with_abrt(true);
        self.status = AtaStatusRegister::new().with_ready(true).with_dsc(true).with_err(true);
        self.transfer = Transfer::None;
        self.raise_interrupt(ctx);
    }

    fn id_not_found(&mut self, ctx: &mut BusContext) {
        self.error = AtaErrorRegister::new().with_idnf(true);
        self.status = AtaStatusRegister::new().with_ready(true).with_dsc(true).with_err(true);
        self.transfer = Transfer::None;
        self.raise_interrupt(ctx);
    }

    fn complete(&mut self, ctx: &mut BusContext) {
        self.error = AtaErrorRegister::new();
        self.status = AtaStatusRegister::new().with_ready(true).with_dsc(true);
        self.transfer = Transfer::None;
        self.raise_interrupt(ctx);
    }

    fn load_sector(&mut self, lba: u32) -> bool {
        let selected = self.selected();
        let Some(disk) = self.drives[selected].as_ref()
        else {
            return false;
        };
        let ok = disk.read_sector(lba, &mut self.buffer);
        self.buffer_pos = 0;
        ok
    }

    fn data_request(&mut self, ctx: &mut BusContext, interrupt: bool) {
        self.error = AtaErrorRegister::new();
        self.status = AtaStatusRegister::new().with_ready(true).with_dsc(true).with_drq(true);
        if interrupt {
            self.raise_interrupt(ctx);
        }
    }
}

pub struct AtaController {
    log: LogContext,
    events: EventSink,
    channels: [AtaChannel; ATA_CHANNELS],
    interval: u32,
}

impl AtaController {
    pub fn new(log: LogContext, events: EventSink) -> Self {
        Self {
            log,
            events,
            channels: [AtaChannel::new(), AtaChannel::new()],
            interval: DEFAULT_UPDATE_INTERVAL,
        }
    }

    /// Attach a raw image as drive 0 (master) or 1 (slave) of a channel. The image must hold
    /// the full geometry.
    pub fn attach_disk(&mut self, channel: usize, drive: usize, image: Vec<u8>, geometry: (u16, u8, u8)) -> bool {
        let (cylinders, heads, spt) = geometry;
        if channel >= ATA_CHANNELS || drive > 1 {
            self.log.warn(format_args!("No ATA drive slot {}:{}", channel, drive));
            return false;
        }
        if cylinders == 0 || heads == 0 || heads > 16 || spt == 0 || spt > 63 {
            self.log.error(format_args!("Invalid hard disk geometry {}/{}/{}", cylinders, heads, spt));
            return false;
        }
        let size = cylinders as usize * heads as usize * spt as usize * SECTOR_SIZE;
        if image.len() < size {
            self.log.error(format_args!(
                "Hard disk image of {} bytes is smaller than its geometry ({} bytes)",
                image.len(),
                size
            ));
            return false;
        }
        self.log.info(format_args!(
            "Attached hard disk {}:{} with geometry {}/{}/{}",
            channel, drive, cylinders, heads, spt
        ));
        self.channels[channel].drives[drive] = Some(HardDisk::new(image, cylinders, heads, spt));
        true
    }

    /// Pick a translated geometry for an image of unknown layout: 16 heads, 63 sectors.
    pub fn default_geometry(image_len: usize) -> (u16, u8, u8) {
        let sectors = image_len / SECTOR_SIZE;
        let cylinders = (sectors / (16 * 63)).clamp(1, 16383);
        (cylinders as u16, 16, 63)
    }

    pub fn disk(&self, channel: usize, drive: usize) -> Option<&HardDisk> {
        self.channels.get(channel)?.drives.get(drive)?.as_ref()
    }

    fn channel_of(port: u16) -> Option<(usize, u16)> {
        match port {
            ATA_PRIMARY_BASE..=0x1F7 => Some((0, port - ATA_PRIMARY_BASE)),
            ATA_SECONDARY_BASE..=0x177 => Some((1, port - ATA_SECONDARY_BASE)),
            ATA_PRIMARY_CONTROL => Some((0, 0x0E)),
            ATA_SECONDARY_CONTROL => Some((1, 0x0E)),
            _ => None,
        }
    }

    fn read_data_byte(&mut self, index: usize, ctx: &mut BusContext) -> u8 {
        let ch = &mut self.channels[index];
        if !ch.status.drq() || ch.buffer_pos >= SECTOR_SIZE {
            return 0;
        }
        let byte = ch.buffer[ch.buffer_pos];
        ch.buffer_pos += 1;
        if ch.buffer_pos >= SECTOR_SIZE {
            self.sector_read_done(index, ctx);
        }
        byte
    }

    fn write_data_byte(&mut self, index: usize, data: u8, ctx: &mut BusContext) {
        let ch = &mut self.channels[index];
        if !ch.status.drq() || ch.buffer_pos >= SECTOR_SIZE {
            return;
        }
        ch.buffer[ch.buffer_pos] = data;
        ch.buffer_pos += 1;
        if ch.buffer_pos >= SECTOR_SIZE {
            self.sector_write_done(index, ctx);
        }
    }

    /// The host has emptied the sector buffer.
    fn sector_read_done(&mut self, index: usize, ctx: &mut BusContext) {
        let ch = &mut self.channels[index];
        match ch.transfer {
            Transfer::Read { lba, remaining } if remaining > 1 => {
                let next = lba + 1;
                ch.set_address(next);
                if ch.load_sector(next) {
                    ch.transfer = Transfer::Read {
                        lba: next,
                        remaining: remaining - 1,
                    };
                    ch.data_request(ctx, true);
                }
                else {
                    ch.id_not_found(ctx);
                    self.events.status(StatusCode::HardDiskTransferStop);
                }
            }
            Transfer::Read { .. } => {
                ch.status.set_drq(false);
                ch.transfer = Transfer::None;
                self.events.status(StatusCode::HardDiskTransferStop);
            }
            _ => {
                ch.status.set_drq(false);
                ch.transfer = Transfer::None;
            }
        }
    }

    /// The host has filled the sector buffer.
    fn sector_write_done(&mut self, index: usize, ctx: &mut BusContext) {
        let ch = &mut self.channels[index];
        let Transfer::Write { lba, remaining } = ch.transfer
        else {
            ch.status.set_drq(false);
            return;
        };
        let selected = ch.selected();
        let written = match ch.drives[selected].as_mut() {
            Some(disk) => disk.write_sector(lba, &ch.buffer),
            None => false,
        };
        if !written {
            ch.id_not_found(ctx);
            self.events.status(StatusCode::HardDiskTransferStop);
            return;
        }
        if remaining > 1 {
            ch.set_address(lba + 1);
            ch.transfer = Transfer::Write {
                lba: lba + 1,
                remaining: remaining - 1,
            };
            ch.buffer_pos = 0;
            ch.data_request(ctx, true);
        }
        else {
            ch.complete(ctx);
            self.events.status(StatusCode::HardDiskTransferStop);
        }
    }

    fn execute(&mut self, index: usize, byte: u8, ctx: &mut BusContext) {
        let command = AtaCommand::from(byte);
        self.log.trace(format_args!("Channel {} command {:02X} ({:?})", index, byte, command));
        let ch = &mut self.channels[index];
        ch.lower_interrupt(ctx);

        if ch.disk().is_none() && command != AtaCommand::ExecuteDiagnostic {
            // No device answers; leave the task file alone.
            return;
        }

        match command {
            AtaCommand::Identify => {
                if let Some(words) = ch.disk().map(|disk| disk.identify()) {
                    for (i, word) in words.iter().enumerate() {
                        ch.buffer[i * 2] = *word as u8;
                        ch.buffer[i * 2 + 1] = (*word >> 8) as u8;
                    }
                }
                ch.buffer_pos = 0;
                ch.transfer = Transfer::Identify;
                ch.data_request(ctx, true);
            }
            AtaCommand::ReadSectors => {
                let Some(lba) = ch.address()
                else {
                    ch.id_not_found(ctx);
                    return;
                };
                let remaining = ch.sector_count();
                if !ch.load_sector(lba) {
                    ch.id_not_found(ctx);
                    return;
                }
                ch.transfer = Transfer::Read { lba, remaining };
                ch.data_request(ctx, true);
                self.events.status(StatusCode::HardDiskTransferStart);
            }
            AtaCommand::WriteSectors => {
                let Some(lba) = ch.address()
                else {
                    ch.id_not_found(ctx);
                    return;
                };
                ch.transfer = Transfer::Write {
                    lba,
                    remaining: ch.sector_count(),
                };
                ch.buffer_pos = 0;
                // The first sector is requested without an interrupt.
                ch.data_request(ctx, false);
                self.events.status(StatusCode::HardDiskTransferStart);
            }
            AtaCommand::VerifySectors => match ch.address() {
                Some(lba) => {
                    let total = ch.disk().map(|d| d.total_sectors()).unwrap_or(0);
                    let last = lba + ch.sector_count() - 1;
                    if last < total {
                        ch.set_address(last);
                        ch.complete(ctx);
                    }
                    else {
                        ch.id_not_found(ctx);
                    }
                }
                None => ch.id_not_found(ctx),
            },
            AtaCommand::Recalibrate => {
                ch.cylinder_low = 0;
                ch.cylinder_high = 0;
                ch.complete(ctx);
            }
            AtaCommand::Seek => match ch.address() {
                Some(_) => ch.complete(ctx),
                None => ch.id_not_found(ctx),
            },
            AtaCommand::InitializeParameters => {
                let heads = (ch.drive_head & 0x0F) + 1;
                let sectors = ch.sector_count;
                if sectors == 0 {
                    ch.abort(ctx);
                    return;
                }
                let selected = ch.selected();
                if let Some(disk) = ch.drives[selected].as_mut() {
                    disk.logical_heads = heads;
                    disk.logical_sectors = sectors;
                }
                ch.complete(ctx);
            }
            AtaCommand::SetFeatures => {
                self.log.debug(format_args!("Set features {:02X}", ch.features));
                ch.complete(ctx);
            }
            AtaCommand::ExecuteDiagnostic => {
                ch.soft_reset();
                ch.raise_interrupt(ctx);
            }
            AtaCommand::Unsupported(byte) => {
                self.log.debug(format_args!("Unsupported ATA command {:02X}", byte));
                ch.abort(ctx);
            }
        }
    }

    fn write_control(&mut self, index: usize, data: u8) {
        let ch = &mut self.channels[index];
        let was_reset = ch.control & CONTROL_SRST != 0;
        ch.control = data;
        if data & CONTROL_SRST != 0 {
            ch.status = AtaStatusRegister::new().with_busy(true);
            ch.transfer = Transfer::None;
        }
        else if was_reset {
            self.log.debug(format_args!("Channel {} software reset", index));
            ch.soft_reset();
        }
    }
}

impl Module for AtaController {
    fn module_type(&self) -> ModuleType {
        ModuleType::Ata
    }

    fn required_connections(&self) -> &'static [ModuleType] {
        &[ModuleType::Motherboard, ModuleType::Pic, ModuleType::Rtc]
    }

    fn set_debug(&mut self, debug: bool) {
        self.log.set_debug(debug);
    }

    fn dump(&self) -> String {
        let mut out = String::new();
        for (i, ch) in self.channels.iter().enumerate() {
            out.push_str(&format!(
                "channel {}: status {:02X} error {:02X} count {:02X} sector {:02X} cyl {:02X}{:02X} dh {:02X} irq {:?} {:?}\n",
                i,
                ch.status.into_bytes()[0],
                ch.error.into_bytes()[0],
                ch.sector_count,
                ch.sector_number,
                ch.cylinder_high,
                ch.cylinder_low,
                ch.drive_head,
                ch.irq,
                ch.transfer
            ));
            for (d, disk) in ch.drives.iter().enumerate() {
                if let Some(disk) = disk {
                    let (c, h, s) = disk.geometry();
                    out.push_str(&format!("  drive {}: {}/{}/{}\n", d, c, h, s));
                }
            }
        }
        out
    }
}

impl Resettable for AtaController {
    fn reset(&mut self, ctx: &mut BusContext) -> bool {
        for ch in &mut self.channels {
            ch.control = 0;
            ch.irq_raised = false;
            ch.soft_reset();
            for disk in ch.drives.iter_mut().flatten() {
                disk.logical_heads = disk.heads;
                disk.logical_sectors = disk.sectors_per_track;
            }
        }
        self.channels[0].irq = ctx.request_irq_number();
        self.channels[1].irq = ctx.claim_irq(ATA_SECONDARY_IRQ).then_some(ATA_SECONDARY_IRQ);
        if self.channels[0].irq.is_none() {
            self.log.warn(format_args!("No IRQ line available for the primary ATA channel"));
        }
        true
    }
}

impl PortAccessible for AtaController {
    fn port_list(&self) -> Vec<(String, u16)> {
        let mut ports = Vec::new();
        for (name, base, control) in [
            ("Primary", ATA_PRIMARY_BASE, ATA_PRIMARY_CONTROL),
            ("Secondary", ATA_SECONDARY_BASE, ATA_SECONDARY_CONTROL),
        ] {
            for offset in 0..8 {
                ports.push((format!("ATA {} Task File {}", name, offset), base + offset));
            }
            ports.push((format!("ATA {} Control", name), control));
        }
        ports
    }

    fn read_u8(&mut self, port: u16, ctx: &mut BusContext) -> u8 {
        let Some((index, reg)) = Self::channel_of(port)
        else {
            return NO_IO_BYTE;
        };
        let ch = &mut self.channels[index];
        if !ch.has_drives() {
            return NO_IO_BYTE;
        }
        match reg {
            REG_DATA => self.read_data_byte(index, ctx),
            REG_ERROR_FEATURES => ch.error.into_bytes()[0],
            REG_SECTOR_COUNT => ch.sector_count,
            REG_SECTOR_NUMBER => ch.sector_number,
            REG_CYLINDER_LOW => ch.cylinder_low,
            REG_CYLINDER_HIGH => ch.cylinder_high,
            REG_DRIVE_HEAD => ch.drive_head,
            REG_STATUS_COMMAND => {
                ch.lower_interrupt(ctx);
                ch.status_byte()
            }
            // Alternate status doesn't acknowledge the interrupt.
            _ => ch.status_byte(),
        }
    }

    fn write_u8(&mut self, port: u16, data: u8, ctx: &mut BusContext) {
        let Some((index, reg)) = Self::channel_of(port)
        else {
            return;
        };
        let ch = &mut self.channels[index];
        match reg {
            REG_DATA => self.write_data_byte(index, data, ctx),
            REG_ERROR_FEATURES => ch.features = data,
            REG_SECTOR_COUNT => ch.sector_count = data,
            REG_SECTOR_NUMBER => ch.sector_number = data,
            REG_CYLINDER_LOW => ch.cylinder_low = data,
            REG_CYLINDER_HIGH => ch.cylinder_high = data,
            REG_DRIVE_HEAD => ch.drive_head = data | DRIVE_HEAD_BITS_ON,
            REG_STATUS_COMMAND => self.execute(index, data, ctx),
            _ => self.write_control(index, data),
        }
    }

    fn read_u16(&mut self, port: u16, ctx: &mut BusContext) -> u16 {
        match Self::channel_of(port) {
            Some((index, REG_DATA)) => {
                let lo = self.read_data_byte(index, ctx);
                let hi = self.read_data_byte(index, ctx);
                (hi as u16) << 8 | lo as u16
            }
            _ => {
                let lo = self.read_u8(port, ctx);
                let hi = self.read_u8(port.wrapping_add(1), ctx);
                (hi as u16) << 8 | lo as u16
            }
        }
    }

    fn write_u16(&mut self, port: u16, data: u16, ctx: &mut BusContext) {
        match Self::channel_of(port) {
            Some((index, REG_DATA)) => {
                self.write_data_byte(index, data as u8, ctx);
                self.write_data_byte(index, (data >> 8) as u8, ctx);
            }
            _ => {
                self.write_u8(port, data as u8, ctx);
                self.write_u8(port.wrapping_add(1), (data >> 8) as u8, ctx);
            }
        }
    }
}

impl Tickable for AtaController {
    fn update_interval(&self) -> Option<u32> {
        Some(self.interval)
    }

    fn set_update_interval(&mut self, interval: i64) {
        self.interval = normalize_interval(interval, DEFAULT_UPDATE_INTERVAL);
    }

    // Commands complete synchronously; the timer only keeps its configured period.
    fn timer_active_on_reset(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disk() -> HardDisk {
        HardDisk::new(vec![0; 306 * 4 * 17 * SECTOR_SIZE], 306, 4, 17)
    }

    #[test]
    fn test_register_layout() {
        let status = AtaStatusRegister::new().with_ready(true).with_dsc(true).with_drq(true);
        assert_eq!(status.into_bytes()[0], 0x58);
        assert_eq!(AtaErrorRegister::new().with_abrt(true).into_bytes()[0], 0x04);
    }

    #[test]
    fn test_chs_translation() {
        let disk = disk();
        assert_eq!(disk.chs_to_lba(0, 0, 1), Some(0));
        assert_eq!(disk.chs_to_lba(0, 1, 1), Some(17));
        assert_eq!(disk.chs_to_lba(1, 0, 1), Some(68));
        assert_eq!(disk.chs_to_lba(0, 0, 0), None);
        assert_eq!(disk.chs_to_lba(0, 4, 1), None);
        assert_eq!(disk.chs_to_lba(306, 0, 1), None);
        assert_eq!(disk.lba_to_chs(69), (1, 0, 2));
    }

    #[test]
    fn test_identify_words() {
        let words = disk().identify();
        assert_eq!(words[1], 306);
        assert_eq!(words[3], 4);
        assert_eq!(words[6], 17);
        assert_eq!(words[49] & CAPABILITIES_LBA, CAPABILITIES_LBA);
        let total = 306u32 * 4 * 17;
        assert_eq!(words[60] as u32 | (words[61] as u32) << 16, total);
        // "He" stored high byte first
        assert_eq!(words[27], (b'H' as u16) << 8 | b'e' as u16);
    }

    #[test]
    fn test_attach_validates_geometry() {
        let mut ata = AtaController::new(LogContext::new(ModuleType::Ata), EventSink::none());
        assert!(!ata.attach_disk(0, 0, vec![0; 1024], (306, 4, 17)));
        assert!(!ata.attach_disk(0, 0, vec![0; 1024], (1, 17, 1)));
        assert!(!ata.attach_disk(2, 0, vec![0; 512], (1, 1, 1)));
        assert!(ata.attach_disk(0, 1, vec![0; 512], (1, 1, 1)));
        assert!(ata.disk(0, 1).is_some());
        assert_eq!(AtaController::default_geometry(16 * 63 * 512 * 20), (20, 16, 63));
    }
}
