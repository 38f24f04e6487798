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

    devices::rtc.rs

    MC146818 compatible real-time clock and CMOS RAM.

*/

//! The RTC keeps wall-clock time, raises IRQ 8 for its periodic, alarm and update-ended
//! interrupts, and holds the 128 bytes of battery-backed CMOS RAM the BIOS reads its
//! configuration from. The orchestrator fills in floppy types, hard disk parameters, memory
//! sizes and boot order through the setters here before the BIOS runs.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::{
    bus::BusContext,
    logging::LogContext,
    module::{normalize_interval, Module, ModuleType, PortAccessible, Resettable, Tickable},
};

pub const CMOS_ADDRESS_PORT: u16 = 0x70;
pub const CMOS_DATA_PORT: u16 = 0x71;
pub const CMOS_SIZE: usize = 128;
pub const DEFAULT_UPDATE_INTERVAL: u32 = 1000;

pub const REG_SECONDS: usize = 0x00;
pub const REG_SECONDS_ALARM: usize = 0x01;
pub const REG_MINUTES: usize = 0x02;
pub const REG_MINUTES_ALARM: usize = 0x03;
pub const REG_HOURS: usize = 0x04;
pub const REG_HOURS_ALARM: usize = 0x05;
pub const REG_WEEKDAY: usize = 0x06;
pub const REG_DAY: usize = 0x07;
pub const REG_MONTH: usize = 0x08;
pub const REG_YEAR: usize = 0x09;
pub const REG_STATUS_A: usize = 0x0A;
pub const REG_STATUS_B: usize = 0x0B;
pub const REG_STATUS_C: usize = 0x0C;
pub const REG_STATUS_D: usize = 0x0D;
pub const REG_DIAGNOSTIC: usize = 0x0E;
pub const REG_SHUTDOWN: usize = 0x0F;
pub const REG_FLOPPY_TYPES: usize = 0x10;
pub const REG_HD_TYPES: usize = 0x12;
pub const REG_EQUIPMENT: usize = 0x14;
pub const REG_BASE_MEMORY_LO: usize = 0x15;
pub const REG_BASE_MEMORY_HI: usize = 0x16;
pub const REG_EXT_MEMORY_LO: usize = 0x17;
pub const REG_EXT_MEMORY_HI: usize = 0x18;
pub const REG_HD0_EXT_TYPE: usize = 0x19;
pub const REG_HD1_EXT_TYPE: usize = 0x1A;
pub const REG_HD0_PARAMS: usize = 0x1B;
pub const REG_HD1_PARAMS: usize = 0x24;
pub const REG_BOOT_FLAGS: usize = 0x2D;
pub const REG_CHECKSUM_HI: usize = 0x2E;
pub const REG_CHECKSUM_LO: usize = 0x2F;
pub const REG_EXT_MEMORY2_LO: usize = 0x30;
pub const REG_EXT_MEMORY2_HI: usize = 0x31;
pub const REG_CENTURY: usize = 0x32;
pub const REG_BOOT_SEQUENCE_3: usize = 0x38;
pub const REG_BOOT_SEQUENCE_12: usize = 0x3D;

const A_UPDATE_IN_PROGRESS: u8 = 0x80;
const A_RATE_MASK: u8 = 0x0F;
const B_SET: u8 = 0x80;
const B_PERIODIC_IE: u8 = 0x40;
const B_ALARM_IE: u8 = 0x20;
const B_UPDATE_IE: u8 = 0x10;
const B_BINARY: u8 = 0x04;
const B_24_HOUR: u8 = 0x02;
const C_IRQF: u8 = 0x80;
const C_PERIODIC: u8 = 0x40;
const C_ALARM: u8 = 0x20;
const C_UPDATE: u8 = 0x10;
const D_VALID_RAM: u8 = 0x80;

/// The update cycle takes 244us at the end of each second, during which UIP reads set.
const UPDATE_CYCLE_US: u64 = 244;
const ALARM_DONT_CARE: u8 = 0xC0;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BootDevice {
    None,
    Floppy,
    HardDisk,
    CdRom,
}

impl BootDevice {
    fn cmos_code(&self) -> u8 {
        match self {
            BootDevice::None => 0,
            BootDevice::Floppy => 1,
            BootDevice::HardDisk => 2,
            BootDevice::CdRom => 3,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// 1 = Sunday
    pub weekday: u8,
}

impl DateTime {
    pub fn from_unix(seconds: u64) -> Self {
        let days = (seconds / 86_400) as i64;
        let rem = seconds % 86_400;
        let (year, month, day) = civil_from_days(days);
        DateTime {
            year: year as u16,
            month,
            day,
            hour: (rem / 3600) as u8,
            minute: ((rem / 60) % 60) as u8,
            second: (rem % 60) as u8,
            weekday: ((days + 4).rem_euclid(7) + 1) as u8,
        }
    }

    pub fn now() -> Self {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        DateTime::from_unix(seconds)
    }

    fn tick(&mut self) {
        self.second += 1;
        if self.second < 60 {
            return;
        }
        self.second = 0;
        self.minute += 1;
        if self.minute < 60 {
            return;
        }
        self.minute = 0;
        self.hour += 1;
        if self.hour < 24 {
            return;
        }
        self.hour = 0;
        self.weekday = self.weekday % 7 + 1;
        self.day += 1;
        if self.day <= days_in_month(self.year, self.month) {
            return;
        }
        self.day = 1;
        self.month += 1;
        if self.month <= 12 {
            return;
        }
        self.month = 1;
        self.year += 1;
    }
}

fn is_leap_year(year: u16) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        2 if is_leap_year(year) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// Convert days since 1970-01-01 to a (year, month, day) civil date.
fn civil_from_days(days: i64) -> (i64, u8, u8) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u8;
    let year = yoe + era * 400 + if month <= 2 { 1 } else { 0 };
    (year, month, day)
}

#[inline]
fn to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

#[inline]
fn from_bcd(value: u8) -> u8 {
    (value >> 4) * 10 + (value & 0x0F)
}

pub struct Rtc {
    log: LogContext,
    cmos: [u8; CMOS_SIZE],
    index: u8,
    nmi_disabled: bool,
    time: DateTime,
    irq: Option<u8>,
    interval: u32,
    last_us: u64,
    second_acc_us: u64,
    periodic_acc_us: u64,
}

impl Rtc {
    pub fn new(log: LogContext, time: DateTime) -> Self {
        let mut cmos = [0u8; CMOS_SIZE];
        cmos[REG_STATUS_A] = 0x26;
        cmos[REG_STATUS_B] = B_24_HOUR;
        cmos[REG_STATUS_D] = D_VALID_RAM;
        let mut rtc = Self {
            log,
            cmos,
            index: 0,
            nmi_disabled: false,
            time,
            irq: None,
            interval: DEFAULT_UPDATE_INTERVAL,
            last_us: 0,
            second_acc_us: 0,
            periodic_acc_us: 0,
        };
        rtc.update_checksum();
        rtc
    }

    pub fn time(&self) -> DateTime {
        self.time
    }

    pub fn cmos(&self, index: usize) -> u8 {
        self.cmos.get(index).copied().unwrap_or(0)
    }

    /// Write a CMOS byte directly, bypassing the port interface.
    pub fn set_cmos(&mut self, index: usize, value: u8) {
        if let Some(byte) = self.cmos.get_mut(index) {
            *byte = value;
        }
    }

    pub fn nmi_disabled(&self) -> bool {
        self.nmi_disabled
    }

    fn binary_mode(&self) -> bool {
        self.cmos[REG_STATUS_B] & B_BINARY != 0
    }

    fn encode(&self, value: u8) -> u8 {
        if self.binary_mode() {
            value
        }
        else {
            to_bcd(value)
        }
    }

    fn decode(&self, value: u8) -> u8 {
        if self.binary_mode() {
            value
        }
        else {
            from_bcd(value)
        }
    }

    fn encode_hour(&self, hour: u8) -> u8 {
        if self.cmos[REG_STATUS_B] & B_24_HOUR != 0 {
            return self.encode(hour);
        }
        let pm = hour >= 12;
        let h12 = match hour % 12 {
            0 => 12,
            h => h,
        };
        self.encode(h12) | if pm { 0x80 } else { 0 }
    }

    fn decode_hour(&self, value: u8) -> u8 {
        if self.cmos[REG_STATUS_B] & B_24_HOUR != 0 {
            return self.decode(value);
        }
        let pm = value & 0x80 != 0;
        let h12 = self.decode(value & 0x7F) % 12;
        if pm {
            h12 + 12
        }
        else {
            h12
        }
    }

    fn time_register(&self, index: usize) -> u8 {
        match index {
            REG_SECONDS => self.encode(self.time.second),
            REG_MINUTES => self.encode(self.time.minute),
            REG_HOURS => self.encode_hour(self.time.hour),
            REG_WEEKDAY => self.encode(self.time.weekday),
            REG_DAY => self.encode(self.time.day),
            REG_MONTH => self.encode(self.time.month),
            REG_YEAR => self.encode((self.time.year % 100) as u8),
            REG_CENTURY => self.encode((self.time.year / 100) as u8),
            _ => self.cmos[index],
        }
    }

    fn set_time_register(&mut self, index: usize, value: u8) {
        match index {
            REG_SECONDS => self.time.second = self.decode(value) % 60,
            REG_MINUTES => self.time.minute = self.decode(value) % 60,
            REG_HOURS => self.time.hour = self.decode_hour(value) % 24,
            REG_WEEKDAY => self.time.weekday = self.decode(value).clamp(1, 7),
            REG_DAY => self.time.day = self.decode(value).clamp(1, 31),
            REG_MONTH => self.time.month = self.decode(value).clamp(1, 12),
            REG_YEAR => {
                let century = self.time.year / 100;
                self.time.year = century * 100 + self.decode(value) as u16 % 100;
            }
            REG_CENTURY => {
                self.time.year = self.decode(value) as u16 * 100 + self.time.year % 100;
            }
            _ => {}
        }
    }

    fn periodic_period_us(&self) -> Option<u64> {
        let rate = self.cmos[REG_STATUS_A] & A_RATE_MASK;
        let hz: u64 = match rate {
            0 => return None,
            1 => 256,
            2 => 128,
            r => 32_768 >> (r - 1),
        };
        Some(1_000_000 / hz)
    }

    fn alarm_matches(&self) -> bool {
        let field = |alarm: u8, current: u8| alarm & ALARM_DONT_CARE == ALARM_DONT_CARE || alarm == current;
        field(self.cmos[REG_SECONDS_ALARM], self.time_register(REG_SECONDS))
            && field(self.cmos[REG_MINUTES_ALARM], self.time_register(REG_MINUTES))
            && field(self.cmos[REG_HOURS_ALARM], self.time_register(REG_HOURS))
    }

    fn raise_flags(&mut self, flags: u8, enable: u8, ctx: &mut BusContext) {
        self.cmos[REG_STATUS_C] |= flags;
        if self.cmos[REG_STATUS_B] & enable != 0 {
            self.cmos[REG_STATUS_C] |= C_IRQF;
            if let Some(irq) = self.irq {
                ctx.raise_irq(irq);
            }
        }
    }

    fn catch_up(&mut self, ctx: &mut BusContext) {
        let now = ctx.now_us();
        let elapsed = now.saturating_sub(self.last_us);
        self.last_us = now;
        if elapsed == 0 {
            return;
        }

        if let Some(period) = self.periodic_period_us() {
            self.periodic_acc_us += elapsed;
            if self.periodic_acc_us >= period {
                self.periodic_acc_us %= period;
                self.raise_flags(C_PERIODIC, B_PERIODIC_IE, ctx);
            }
        }

        self.second_acc_us += elapsed;
        while self.second_acc_us >= 1_000_000 {
            self.second_acc_us -= 1_000_000;
            if self.cmos[REG_STATUS_B] & B_SET != 0 {
                continue;
            }
            self.time.tick();
            self.raise_flags(C_UPDATE, B_UPDATE_IE, ctx);
            if self.alarm_matches() {
                self.raise_flags(C_ALARM, B_ALARM_IE, ctx);
            }
        }
    }

    /// Recompute the standard checksum over 0x10-0x2D.
    pub fn update_checksum(&mut self) {
        let sum: u16 = self.cmos[REG_FLOPPY_TYPES..=REG_BOOT_FLAGS]
            .iter()
            .map(|&b| b as u16)
            .sum();
        self.cmos[REG_CHECKSUM_HI] = (sum >> 8) as u8;
        self.cmos[REG_CHECKSUM_LO] = sum as u8;
    }

    /// Set the CMOS drive types of floppy drives A and B and the matching equipment bits.
    pub fn set_floppy_types(&mut self, drive_a: u8, drive_b: u8) {
        self.cmos[REG_FLOPPY_TYPES] = (drive_a & 0x0F) << 4 | (drive_b & 0x0F);
        let drives = (drive_a != 0) as u8 + (drive_b != 0) as u8;
        let mut equipment = self.cmos[REG_EQUIPMENT] & !0xC1;
        if drives > 0 {
            equipment |= 0x01 | (drives - 1) << 6;
        }
        self.cmos[REG_EQUIPMENT] = equipment;
        self.update_checksum();
    }

    pub fn set_memory(&mut self, base_kb: u32, extended_kb: u32) {
        let base = base_kb.min(640) as u16;
        let extended = extended_kb.min(0xFFFF) as u16;
        self.cmos[REG_BASE_MEMORY_LO] = base as u8;
        self.cmos[REG_BASE_MEMORY_HI] = (base >> 8) as u8;
        self.cmos[REG_EXT_MEMORY_LO] = extended as u8;
        self.cmos[REG_EXT_MEMORY_HI] = (extended >> 8) as u8;
        self.cmos[REG_EXT_MEMORY2_LO] = extended as u8;
        self.cmos[REG_EXT_MEMORY2_HI] = (extended >> 8) as u8;
        self.update_checksum();
    }

    /// Describe hard disk 0 or 1 as user-defined type 47.
    pub fn set_hard_disk(&mut self, index: usize, cylinders: u16, heads: u8, sectors_per_track: u8) {
        if index > 1 {
            self.log.warn(format_args!("CMOS holds only two hard disks, ignoring disk {}", index));
            return;
        }
        let shift = if index == 0 { 4 } else { 0 };
        self.cmos[REG_HD_TYPES] = (self.cmos[REG_HD_TYPES] & !(0x0F << shift)) | (0x0F << shift);
        self.cmos[REG_HD0_EXT_TYPE + index] = 47;

        let base = if index == 0 { REG_HD0_PARAMS } else { REG_HD1_PARAMS };
        let table = [
            cylinders as u8,
            (cylinders >> 8) as u8,
            heads,
            0xFF,
            0xFF,
            if heads > 8 { 0x08 } else { 0x00 },
            cylinders as u8,
            (cylinders >> 8) as u8,
            sectors_per_track,
        ];
        self.cmos[base..base + table.len()].copy_from_slice(&table);
        // Equipment byte bit 2 isn't used for disks, the BIOS reads 0x12.
        self.update_checksum();
    }

    pub fn set_boot_order(&mut self, order: [BootDevice; 3], check_floppy_signature: bool) {
        self.cmos[REG_BOOT_SEQUENCE_12] = order[1].cmos_code() << 4 | order[0].cmos_code();
        self.cmos[REG_BOOT_SEQUENCE_3] = order[2].cmos_code() << 4 | if check_floppy_signature { 0 } else { 1 };
        // Older BIOSes only look at bit 5: boot from C: before A:.
        if order[0] == BootDevice::HardDisk {
            self.cmos[REG_BOOT_FLAGS] |= 0x20;
        }
        else {
            self.cmos[REG_BOOT_FLAGS] &= !0x20;
        }
        self.update_checksum();
    }

    /// Set the display bits of the equipment byte: 0 for EGA/VGA.
    pub fn set_display_type(&mut self, display: u8) {
        self.cmos[REG_EQUIPMENT] = (self.cmos[REG_EQUIPMENT] & !0x30) | (display & 0x03) << 4;
        self.update_checksum();
    }

    /// Equipment byte bit 2 reports a PS/2 pointing device.
    pub fn set_mouse_present(&mut self, present: bool) {
        if present {
            self.cmos[REG_EQUIPMENT] |= 0x04;
        }
        else {
            self.cmos[REG_EQUIPMENT] &= !0x04;
        }
        self.update_checksum();
    }

    fn read_register(&mut self, ctx: &mut BusContext) -> u8 {
        let index = self.index as usize;
        match index {
            REG_STATUS_A => {
                let uip = if self.second_acc_us >= 1_000_000 - UPDATE_CYCLE_US {
                    A_UPDATE_IN_PROGRESS
                }
                else {
                    0
                };
                (self.cmos[REG_STATUS_A] & !A_UPDATE_IN_PROGRESS) | uip
            }
            REG_STATUS_C => {
                let value = self.cmos[REG_STATUS_C];
                self.cmos[REG_STATUS_C] = 0;
                if let Some(irq) = self.irq {
                    ctx.lower_irq(irq);
                }
                value
            }
            REG_STATUS_D => D_VALID_RAM,
            REG_SECONDS | REG_MINUTES | REG_HOURS | REG_WEEKDAY | REG_DAY | REG_MONTH | REG_YEAR | REG_CENTURY => {
                self.time_register(index)
            }
            _ => self.cmos[index],
        }
    }

    fn write_register(&mut self, value: u8) {
        let index = self.index as usize;
        match index {
            REG_STATUS_A => {
                // UIP is read-only
                self.cmos[REG_STATUS_A] = value & !A_UPDATE_IN_PROGRESS;
                self.periodic_acc_us = 0;
            }
            REG_STATUS_B => {
                if value & B_SET != 0 {
                    self.second_acc_us = 0;
                }
                self.cmos[REG_STATUS_B] = value;
            }
            REG_STATUS_C | REG_STATUS_D => {
                self.log.debug(format_args!("Write to read-only CMOS register {:02X}", index));
            }
            REG_SECONDS | REG_MINUTES | REG_HOURS | REG_WEEKDAY | REG_DAY | REG_MONTH | REG_YEAR | REG_CENTURY => {
                self.set_time_register(index, value);
            }
            _ => self.cmos[index] = value,
        }
    }
}

impl Module for Rtc {
    fn module_type(&self) -> ModuleType {
        ModuleType::Rtc
    }

    fn required_connections(&self) -> &'static [ModuleType] {
        &[ModuleType::Motherboard, ModuleType::Pic]
    }

    fn set_debug(&mut self, debug: bool) {
        self.log.set_debug(debug);
    }

    fn dump(&self) -> String {
        let mut out = format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02} irq {:?}\n",
            self.time.year, self.time.month, self.time.day, self.time.hour, self.time.minute, self.time.second, self.irq
        );
        for (row, chunk) in self.cmos.chunks(16).enumerate() {
            out.push_str(&format!("{:02X}:", row * 16));
            for byte in chunk {
                out.push_str(&format!(" {:02X}", byte));
            }
            out.push('\n');
        }
        out
    }
}

impl Resettable for Rtc {
    fn reset(&mut self, ctx: &mut BusContext) -> bool {
        // CMOS contents survive a reset; only the interrupt state is cleared.
        self.cmos[REG_STATUS_B] &= !(B_PERIODIC_IE | B_ALARM_IE | B_UPDATE_IE);
        self.cmos[REG_STATUS_C] = 0;
        self.index = 0;
        self.last_us = ctx.now_us();
        self.periodic_acc_us = 0;
        self.irq = ctx.request_irq_number();
        if self.irq.is_none() {
            self.log.warn(format_args!("No IRQ line available for the RTC"));
        }
        true
    }
}

impl PortAccessible for Rtc {
    fn port_list(&self) -> Vec<(String, u16)> {
        vec![
            (String::from("CMOS Address"), CMOS_ADDRESS_PORT),
            (String::from("CMOS Data"), CMOS_DATA_PORT),
        ]
    }

    fn read_u8(&mut self, port: u16, ctx: &mut BusContext) -> u8 {
        match port {
            CMOS_DATA_PORT => {
                self.catch_up(ctx);
                self.read_register(ctx)
            }
            // The address register is write-only.
            _ => crate::module::NO_IO_BYTE,
        }
    }

    fn write_u8(&mut self, port: u16, data: u8, ctx: &mut BusContext) {
        match port {
            CMOS_ADDRESS_PORT => {
                self.index = data & 0x7F;
                self.nmi_disabled = data & 0x80 != 0;
            }
            CMOS_DATA_PORT => {
                self.catch_up(ctx);
                self.log.trace(format_args!("CMOS[{:02X}] <- {:02X}", self.index, data));
                self.write_register(data);
            }
            _ => {}
        }
    }
}

impl Tickable for Rtc {
    fn update_interval(&self) -> Option<u32> {
        Some(self.interval)
    }

    fn set_update_interval(&mut self, interval: i64) {
        self.interval = normalize_interval(interval, DEFAULT_UPDATE_INTERVAL);
    }

    fn update(&mut self, ctx: &mut BusContext) {
        self.catch_up(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rtc() -> Rtc {
        // 2000-02-28 23:59:59, a Monday
        Rtc::new(LogContext::new(ModuleType::Rtc), DateTime::from_unix(951_782_399))
    }

    #[test]
    fn test_civil_date() {
        let t = DateTime::from_unix(0);
        assert_eq!((t.year, t.month, t.day, t.weekday), (1970, 1, 1, 5));
        let t = DateTime::from_unix(951_782_399);
        assert_eq!((t.year, t.month, t.day), (2000, 2, 28));
        assert_eq!((t.hour, t.minute, t.second), (23, 59, 59));
        assert_eq!(t.weekday, 2);
    }

    #[test]
    fn test_tick_rolls_into_leap_day() {
        let mut t = DateTime::from_unix(951_782_399);
        t.tick();
        assert_eq!((t.month, t.day, t.hour, t.minute, t.second), (2, 29, 0, 0, 0));
        assert_eq!(t.weekday, 3);
    }

    #[test]
    fn test_bcd_and_12_hour_encoding() {
        let mut rtc = rtc();
        assert_eq!(rtc.time_register(REG_HOURS), 0x23);
        assert_eq!(rtc.time_register(REG_YEAR), 0x00);
        assert_eq!(rtc.time_register(REG_CENTURY), 0x20);

        rtc.cmos[REG_STATUS_B] = 0;
        assert_eq!(rtc.time_register(REG_HOURS), 0x80 | 0x11);
        rtc.cmos[REG_STATUS_B] = B_BINARY | B_24_HOUR;
        assert_eq!(rtc.time_register(REG_MINUTES), 59);
    }

    #[test]
    fn test_time_register_writes() {
        let mut rtc = rtc();
        rtc.index = REG_YEAR as u8;
        rtc.write_register(0x99);
        assert_eq!(rtc.time().year, 2099);
        rtc.index = REG_HOURS as u8;
        rtc.write_register(0x07);
        assert_eq!(rtc.time().hour, 7);
    }

    #[test]
    fn test_periodic_rate() {
        let mut rtc = rtc();
        assert_eq!(rtc.periodic_period_us(), Some(976));
        rtc.cmos[REG_STATUS_A] = 0x20;
        assert_eq!(rtc.periodic_period_us(), None);
        rtc.cmos[REG_STATUS_A] = 0x2F;
        assert_eq!(rtc.periodic_period_us(), Some(500_000));
    }

    #[test]
    fn test_checksum_and_config_setters() {
        let mut rtc = rtc();
        rtc.set_floppy_types(0x04, 0x00);
        assert_eq!(rtc.cmos(REG_FLOPPY_TYPES), 0x40);
        assert_eq!(rtc.cmos(REG_EQUIPMENT) & 0xC1, 0x01);

        rtc.set_memory(640, 15 * 1024);
        assert_eq!(rtc.cmos(REG_BASE_MEMORY_LO), 0x80);
        assert_eq!(rtc.cmos(REG_BASE_MEMORY_HI), 0x02);
        assert_eq!(rtc.cmos(REG_EXT_MEMORY_HI), 0x3C);

        rtc.set_boot_order([BootDevice::HardDisk, BootDevice::Floppy, BootDevice::None], true);
        assert_eq!(rtc.cmos(REG_BOOT_SEQUENCE_12), 0x12);
        assert_eq!(rtc.cmos(REG_BOOT_SEQUENCE_3), 0x00);

        let sum: u16 = (REG_FLOPPY_TYPES..=REG_BOOT_FLAGS).map(|i| rtc.cmos(i) as u16).sum();
        assert_eq!(rtc.cmos(REG_CHECKSUM_HI), (sum >> 8) as u8);
        assert_eq!(rtc.cmos(REG_CHECKSUM_LO), sum as u8);

        rtc.set_mouse_present(true);
        assert_eq!(rtc.cmos(REG_EQUIPMENT) & 0x05, 0x05);
        rtc.set_mouse_present(false);
        assert_eq!(rtc.cmos(REG_EQUIPMENT) & 0x05, 0x01);
    }

    #[test]
    fn test_hard_disk_params() {
        let mut rtc = rtc();
        rtc.set_hard_disk(0, 306, 4, 17);
        assert_eq!(rtc.cmos(REG_HD_TYPES), 0xF0);
        assert_eq!(rtc.cmos(REG_HD0_EXT_TYPE), 47);
        assert_eq!(rtc.cmos(REG_HD0_PARAMS), (306 & 0xFF) as u8);
        assert_eq!(rtc.cmos(REG_HD0_PARAMS + 1), 1);
        assert_eq!(rtc.cmos(REG_HD0_PARAMS + 2), 4);
        assert_eq!(rtc.cmos(REG_HD0_PARAMS + 8), 17);
    }
}
