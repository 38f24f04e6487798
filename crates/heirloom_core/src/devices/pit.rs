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

    devices::pit.rs

    Intel 8254 Programmable Interval Timer and System Control Port B.

*/

//! Three 16-bit counters clocked at 1.193182 MHz. Counter 0 drives IRQ 0, counter 1 is the
//! historical DRAM refresh timer and counter 2 feeds the speaker, gated through port 0x61.
//!
//! Counters are not stepped tick by tick. On each update, and before any port access, the
//! elapsed virtual time is converted to input ticks and every counter is advanced by that many
//! ticks arithmetically.

use modular_bitfield::prelude::*;

use crate::{
    bus::BusContext,
    logging::LogContext,
    module::{normalize_interval, Module, ModuleType, PortAccessible, Resettable, Tickable, NO_IO_BYTE},
};

pub const PIT_CHANNEL_0_DATA_PORT: u16 = 0x40;
pub const PIT_CHANNEL_1_DATA_PORT: u16 = 0x41;
pub const PIT_CHANNEL_2_DATA_PORT: u16 = 0x42;
pub const PIT_COMMAND_REGISTER: u16 = 0x43;
pub const SYSTEM_CONTROL_PORT_B: u16 = 0x61;

pub const PIT_FREQUENCY_HZ: u64 = 1_193_182;
pub const DEFAULT_UPDATE_INTERVAL: u32 = 1000;

const PORT_B_GATE2: u8 = 0x01;
const PORT_B_SPEAKER_DATA: u8 = 0x02;
const PORT_B_REFRESH: u8 = 0x10;
const PORT_B_OUT2: u8 = 0x20;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChannelMode {
    InterruptOnTerminalCount,
    HardwareRetriggerableOneShot,
    RateGenerator,
    SquareWaveGenerator,
    SoftwareTriggeredStrobe,
    HardwareTriggeredStrobe,
}

// Modes 6 and 7 alias modes 2 and 3, so this can't be a BitfieldSpecifier.
impl From<u8> for ChannelMode {
    fn from(orig: u8) -> Self {
        match orig & 0x07 {
            0 => ChannelMode::InterruptOnTerminalCount,
            1 => ChannelMode::HardwareRetriggerableOneShot,
            2 | 6 => ChannelMode::RateGenerator,
            3 | 7 => ChannelMode::SquareWaveGenerator,
            4 => ChannelMode::SoftwareTriggeredStrobe,
            _ => ChannelMode::HardwareTriggeredStrobe,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, BitfieldSpecifier)]
enum RwModeField {
    LatchCommand,
    Lsb,
    Msb,
    LsbMsb,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RwMode {
    Lsb,
    Msb,
    LsbMsb,
}

#[bitfield]
#[derive(Copy, Clone)]
pub struct ControlByte {
    bcd: bool,
    channel_mode: B3,
    rw_mode: RwModeField,
    channel: B2,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum LoadState {
    WaitingForLsb,
    WaitingForMsb,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ReadState {
    Lsb,
    Msb,
}

#[derive(Clone, Debug)]
pub struct Channel {
    index: usize,
    mode: ChannelMode,
    rw_mode: RwMode,
    bcd: bool,
    /// Programmed count. Zero stands for the maximum count.
    reload: u16,
    /// Current count, 1..=65536 while counting.
    count: u32,
    counting: bool,
    armed: bool,
    output: bool,
    gate: bool,
    load_state: LoadState,
    read_state: ReadState,
    lsb: u8,
    count_latch: Option<u16>,
    status_latch: Option<u8>,
    null_count: bool,
}

impl Channel {
    fn new(index: usize) -> Self {
        Self {
            index,
            mode: ChannelMode::InterruptOnTerminalCount,
            rw_mode: RwMode::LsbMsb,
            bcd: false,
            reload: 0,
            count: 0x10000,
            counting: false,
            armed: false,
            output: false,
            gate: index != 2,
            load_state: LoadState::WaitingForLsb,
            read_state: ReadState::Lsb,
            lsb: 0,
            count_latch: None,
            status_latch: None,
            null_count: true,
        }
    }

    pub fn mode(&self) -> ChannelMode {
        self.mode
    }

    pub fn output(&self) -> bool {
        self.output
    }

    pub fn reload_value(&self) -> u32 {
        match (self.reload, self.bcd) {
            (0, false) => 0x10000,
            (0, true) => 10000,
            (r, false) => r as u32,
            (r, true) => from_bcd(r) as u32,
        }
    }

    fn period(&self) -> u32 {
        match self.mode {
            // A count of 1 is illegal in the periodic modes.
            ChannelMode::RateGenerator | ChannelMode::SquareWaveGenerator => self.reload_value().max(2),
            _ => self.reload_value(),
        }
    }

    /// Count as it reads back through the data port.
    pub fn current_count(&self) -> u16 {
        let count = (self.count & 0xFFFF) as u16;
        if self.bcd {
            to_bcd(count % 10000)
        }
        else {
            count
        }
    }

    fn set_mode(&mut self, mode: ChannelMode, rw_mode: RwMode, bcd: bool) {
        self.mode = mode;
        self.rw_mode = rw_mode;
        self.bcd = bcd;
        self.counting = false;
        self.armed = false;
        self.null_count = true;
        self.count_latch = None;
        self.load_state = LoadState::WaitingForLsb;
        self.read_state = ReadState::Lsb;
        // Mode 0 output starts low, every other mode starts high.
        self.output = mode != ChannelMode::InterruptOnTerminalCount;
    }

    fn latch_count(&mut self) {
        if self.count_latch.is_none() {
            self.count_latch = Some(self.current_count());
            self.read_state = ReadState::Lsb;
        }
    }

    fn latch_status(&mut self) {
        if self.status_latch.is_none() {
            let rw = match self.rw_mode {
                RwMode::Lsb => 1,
                RwMode::Msb => 2,
                RwMode::LsbMsb => 3,
            };
            let mode = match self.mode {
                ChannelMode::InterruptOnTerminalCount => 0,
                ChannelMode::HardwareRetriggerableOneShot => 1,
                ChannelMode::RateGenerator => 2,
                ChannelMode::SquareWaveGenerator => 3,
                ChannelMode::SoftwareTriggeredStrobe => 4,
                ChannelMode::HardwareTriggeredStrobe => 5,
            };
            self.status_latch = Some(
                (self.output as u8) << 7 | (self.null_count as u8) << 6 | rw << 4 | mode << 1 | self.bcd as u8,
            );
        }
    }

    fn read_byte(&mut self) -> u8 {
        if let Some(status) = self.status_latch.take() {
            return status;
        }
        let value = self.count_latch.unwrap_or_else(|| self.current_count());
        match self.rw_mode {
            RwMode::Lsb => {
                self.count_latch = None;
                value as u8
            }
            RwMode::Msb => {
                self.count_latch = None;
                (value >> 8) as u8
            }
            RwMode::LsbMsb => match self.read_state {
                ReadState::Lsb => {
                    self.read_state = ReadState::Msb;
                    value as u8
                }
                ReadState::Msb => {
                    self.read_state = ReadState::Lsb;
                    self.count_latch = None;
                    (value >> 8) as u8
                }
            },
        }
    }

    /// Returns true when a complete count has been loaded.
    fn write_byte(&mut self, byte: u8) -> bool {
        match self.rw_mode {
            RwMode::Lsb => self.reload = byte as u16,
            RwMode::Msb => self.reload = (byte as u16) << 8,
            RwMode::LsbMsb => match self.load_state {
                LoadState::WaitingForLsb => {
                    self.lsb = byte;
                    self.load_state = LoadState::WaitingForMsb;
                    if self.mode == ChannelMode::InterruptOnTerminalCount {
                        // Starting a load stops the count in mode 0.
                        self.counting = false;
                    }
                    return false;
                }
                LoadState::WaitingForMsb => {
                    self.reload = (byte as u16) << 8 | self.lsb as u16;
                    self.load_state = LoadState::WaitingForLsb;
                }
            },
        }
        self.load_complete();
        true
    }

    fn load_complete(&mut self) {
        self.null_count = false;
        match self.mode {
            ChannelMode::InterruptOnTerminalCount => {
                self.output = false;
                self.count = self.reload_value();
                self.counting = self.gate;
                self.armed = true;
            }
            ChannelMode::SoftwareTriggeredStrobe => {
                self.count = self.reload_value();
                self.counting = self.gate;
                self.armed = true;
            }
            ChannelMode::RateGenerator | ChannelMode::SquareWaveGenerator => {
                // A new count in a periodic mode takes effect at the next reload unless idle.
                if !self.counting {
                    self.count = self.period();
                    self.counting = self.gate;
                }
            }
            ChannelMode::HardwareRetriggerableOneShot | ChannelMode::HardwareTriggeredStrobe => {
                self.count = self.reload_value();
            }
        }
    }

    fn set_gate(&mut self, gate: bool) {
        let rising = gate && !self.gate;
        self.gate = gate;
        match self.mode {
            ChannelMode::RateGenerator | ChannelMode::SquareWaveGenerator => {
                if rising && !self.null_count {
                    self.count = self.period();
                    self.counting = true;
                }
                else if !gate {
                    self.counting = false;
                    self.output = true;
                }
            }
            ChannelMode::HardwareRetriggerableOneShot | ChannelMode::HardwareTriggeredStrobe => {
                if rising && !self.null_count {
                    self.count = self.reload_value();
                    self.counting = true;
                    self.armed = true;
                    if self.mode == ChannelMode::HardwareRetriggerableOneShot {
                        self.output = false;
                    }
                }
            }
            ChannelMode::InterruptOnTerminalCount | ChannelMode::SoftwareTriggeredStrobe => {
                self.counting = gate && !self.null_count;
            }
        }
    }

    /// Advance by `ticks` input clocks. Returns the number of interrupt-worthy output events.
    fn advance(&mut self, ticks: u64) -> u32 {
        if !self.counting || ticks == 0 {
            return 0;
        }
        match self.mode {
            ChannelMode::RateGenerator | ChannelMode::SquareWaveGenerator => {
                let period = self.period() as u64;
                let count = self.count as u64;
                let (count, events) = if ticks < count {
                    (count - ticks, 0)
                }
                else {
                    let over = ticks - count;
                    (period - over % period, 1 + over / period)
                };
                self.count = count as u32;
                self.output = match self.mode {
                    ChannelMode::SquareWaveGenerator => count as u64 > period / 2,
                    _ => true,
                };
                events.min(u32::MAX as u64) as u32
            }
            _ => {
                let count = self.count as u64;
                if ticks < count {
                    self.count = (count - ticks) as u32;
                    return 0;
                }
                // Terminal count. The counter keeps wrapping but only fires once per load.
                let over = (ticks - count) % 0x10000;
                self.count = (0x10000 - over) as u32;
                if !self.armed {
                    return 0;
                }
                self.armed = false;
                // Strobe modes pulse low for a single clock, which is shorter than any update,
                // so every non-periodic mode ends with its output high.
                self.output = true;
                1
            }
        }
    }
}

fn from_bcd(value: u16) -> u16 {
    ((value >> 12) & 0xF) * 1000 + ((value >> 8) & 0xF) * 100 + ((value >> 4) & 0xF) * 10 + (value & 0xF)
}

fn to_bcd(value: u16) -> u16 {
    ((value / 1000) % 10) << 12 | ((value / 100) % 10) << 8 | ((value / 10) % 10) << 4 | (value % 10)
}

pub struct Pit {
    log: LogContext,
    channels: [Channel; 3],
    irq: Option<u8>,
    interval: u32,
    last_us: u64,
    tick_remainder: u64,
    port_b: u8,
    refresh_toggle: bool,
    irq_count: u64,
}

impl Pit {
    pub fn new(log: LogContext) -> Self {
        Self {
            log,
            channels: [Channel::new(0), Channel::new(1), Channel::new(2)],
            irq: None,
            interval: DEFAULT_UPDATE_INTERVAL,
            last_us: 0,
            tick_remainder: 0,
            port_b: 0,
            refresh_toggle: false,
            irq_count: 0,
        }
    }

    pub fn channel(&self, index: usize) -> Option<&Channel> {
        self.channels.get(index)
    }

    pub fn irq_count(&self) -> u64 {
        self.irq_count
    }

    pub fn speaker_enabled(&self) -> bool {
        self.port_b & (PORT_B_GATE2 | PORT_B_SPEAKER_DATA) == (PORT_B_GATE2 | PORT_B_SPEAKER_DATA)
    }

    /// Bring the counters up to the current virtual time.
    fn catch_up(&mut self, ctx: &mut BusContext) {
        let now = ctx.now_us();
        let elapsed = now.saturating_sub(self.last_us);
        self.last_us = now;
        if elapsed == 0 {
            return;
        }
        let scaled = elapsed * PIT_FREQUENCY_HZ + self.tick_remainder;
        let ticks = scaled / 1_000_000;
        self.tick_remainder = scaled % 1_000_000;
        self.run_ticks(ticks, ctx);
    }

    fn run_ticks(&mut self, ticks: u64, ctx: &mut BusContext) {
        let ch0_before = self.channels[0].output;
        let events = self.channels[0].advance(ticks);
        if let Some(irq) = self.irq {
            match self.channels[0].mode {
                ChannelMode::RateGenerator
                | ChannelMode::SquareWaveGenerator
                | ChannelMode::SoftwareTriggeredStrobe
                | ChannelMode::HardwareTriggeredStrobe => {
                    if events > 0 {
                        ctx.pulse_irq(irq);
                        self.irq_count += 1;
                    }
                }
                ChannelMode::InterruptOnTerminalCount | ChannelMode::HardwareRetriggerableOneShot => {
                    if events > 0 && !ch0_before {
                        ctx.raise_irq(irq);
                        self.irq_count += 1;
                    }
                }
            }
        }
        self.channels[1].advance(ticks);
        self.channels[2].advance(ticks);
    }

    fn write_control(&mut self, byte: u8, ctx: &mut BusContext) {
        let control = ControlByte::from_bytes([byte]);
        let channel = control.channel() as usize;

        if channel == 3 {
            // 8254 read-back: bit 5 clear latches count, bit 4 clear latches status.
            for c in 0..3 {
                if byte & (0x02 << c) != 0 {
                    if byte & 0x20 == 0 {
                        self.channels[c].latch_count();
                    }
                    if byte & 0x10 == 0 {
                        self.channels[c].latch_status();
                    }
                }
            }
            return;
        }

        let rw_mode = match control.rw_mode() {
            RwModeField::LatchCommand => {
                self.channels[channel].latch_count();
                return;
            }
            RwModeField::Lsb => RwMode::Lsb,
            RwModeField::Msb => RwMode::Msb,
            RwModeField::LsbMsb => RwMode::LsbMsb,
        };
        let mode = ChannelMode::from(control.channel_mode());
        self.log.debug(format_args!(
            "Channel {} mode {:?}, rw {:?}, bcd {}",
            channel,
            mode,
            rw_mode,
            control.bcd()
        ));
        self.channels[channel].set_mode(mode, rw_mode, control.bcd());

        if channel == 0 {
            if let Some(irq) = self.irq {
                // Mode 0 output goes low on programming, mode 2 and 3 outputs go high.
                ctx.lower_irq(irq);
            }
        }
    }

    fn write_port_b(&mut self, byte: u8) {
        self.port_b = byte & 0x0F;
        self.channels[2].set_gate(byte & PORT_B_GATE2 != 0);
    }

    fn read_port_b(&mut self) -> u8 {
        self.refresh_toggle = !self.refresh_toggle;
        let mut byte = self.port_b;
        if self.refresh_toggle {
            byte |= PORT_B_REFRESH;
        }
        if self.channels[2].output {
            byte |= PORT_B_OUT2;
        }
        byte
    }
}

impl Module for Pit {
    fn module_type(&self) -> ModuleType {
        ModuleType::Pit
    }

    fn required_connections(&self) -> &'static [ModuleType] {
        &[ModuleType::Motherboard, ModuleType::Pic]
    }

    fn set_debug(&mut self, debug: bool) {
        self.log.set_debug(debug);
    }

    fn dump(&self) -> String {
        let mut out = String::new();
        for c in &self.channels {
            out.push_str(&format!(
                "channel {}: {:?} {:?} reload {} count {} out {} gate {}{}\n",
                c.index,
                c.mode,
                c.rw_mode,
                c.reload_value(),
                c.count,
                c.output as u8,
                c.gate as u8,
                if c.counting { " counting" } else { "" }
            ));
        }
        out.push_str(&format!("port B: {:02X}, irq: {:?}\n", self.port_b, self.irq));
        out
    }
}

impl Resettable for Pit {
    fn reset(&mut self, ctx: &mut BusContext) -> bool {
        self.channels = [Channel::new(0), Channel::new(1), Channel::new(2)];
        self.port_b = 0;
        self.last_us = ctx.now_us();
        self.tick_remainder = 0;
        self.irq = ctx.request_irq_number();
        if self.irq.is_none() {
            self.log.warn(format_args!("No IRQ line available for the timer"));
        }
        true
    }
}

impl PortAccessible for Pit {
    fn port_list(&self) -> Vec<(String, u16)> {
        vec![
            (String::from("PIT Counter 0"), PIT_CHANNEL_0_DATA_PORT),
            (String::from("PIT Counter 1"), PIT_CHANNEL_1_DATA_PORT),
            (String::from("PIT Counter 2"), PIT_CHANNEL_2_DATA_PORT),
            (String::from("PIT Command"), PIT_COMMAND_REGISTER),
            (String::from("System Control Port B"), SYSTEM_CONTROL_PORT_B),
        ]
    }

    fn read_u8(&mut self, port: u16, ctx: &mut BusContext) -> u8 {
        self.catch_up(ctx);
        match port {
            PIT_CHANNEL_0_DATA_PORT..=PIT_CHANNEL_2_DATA_PORT => {
                self.channels[(port - PIT_CHANNEL_0_DATA_PORT) as usize].read_byte()
            }
            SYSTEM_CONTROL_PORT_B => self.read_port_b(),
            // The command register is write-only.
            _ => NO_IO_BYTE,
        }
    }

    fn write_u8(&mut self, port: u16, data: u8, ctx: &mut BusContext) {
        self.catch_up(ctx);
        match port {
            PIT_CHANNEL_0_DATA_PORT..=PIT_CHANNEL_2_DATA_PORT => {
                let c = (port - PIT_CHANNEL_0_DATA_PORT) as usize;
                if self.channels[c].write_byte(data) {
                    self.log.trace(format_args!(
                        "Channel {} reload {}",
                        c,
                        self.channels[c].reload_value()
                    ));
                    if c == 0 && self.channels[0].mode == ChannelMode::InterruptOnTerminalCount {
                        if let Some(irq) = self.irq {
                            ctx.lower_irq(irq);
                        }
                    }
                }
            }
            PIT_COMMAND_REGISTER => self.write_control(data, ctx),
            SYSTEM_CONTROL_PORT_B => self.write_port_b(data),
            _ => {}
        }
    }
}

impl Tickable for Pit {
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

    fn channel(mode: ChannelMode, count: u16) -> Channel {
        let mut c = Channel::new(0);
        c.set_mode(mode, RwMode::LsbMsb, false);
        c.write_byte(count as u8);
        c.write_byte((count >> 8) as u8);
        c
    }

    #[test]
    fn test_rate_generator_events() {
        let mut c = channel(ChannelMode::RateGenerator, 100);
        assert_eq!(c.advance(99), 0);
        assert_eq!(c.current_count(), 1);
        assert_eq!(c.advance(1), 1);
        assert_eq!(c.current_count(), 100);
        assert_eq!(c.advance(250), 2);
        assert_eq!(c.current_count(), 50);
    }

    #[test]
    fn test_terminal_count_fires_once() {
        let mut c = channel(ChannelMode::InterruptOnTerminalCount, 10);
        assert!(!c.output());
        assert_eq!(c.advance(10), 1);
        assert!(c.output());
        assert_eq!(c.advance(0x20000), 0);
        // Reloading re-arms
        c.write_byte(5);
        c.write_byte(0);
        assert!(!c.output());
        assert_eq!(c.advance(5), 1);
    }

    #[test]
    fn test_latched_read() {
        let mut c = channel(ChannelMode::RateGenerator, 0x1234);
        c.latch_count();
        c.advance(0x0200);
        assert_eq!(c.read_byte(), 0x34);
        assert_eq!(c.read_byte(), 0x12);
        assert_eq!(c.read_byte(), 0x34);
        assert_eq!(c.read_byte(), 0x10);
    }

    #[test]
    fn test_zero_reload_is_max_count() {
        let c = channel(ChannelMode::SquareWaveGenerator, 0);
        assert_eq!(c.reload_value(), 0x10000);
    }

    #[test]
    fn test_bcd() {
        assert_eq!(from_bcd(0x1234), 1234);
        assert_eq!(to_bcd(9876), 0x9876);
    }

    #[test]
    fn test_gate_controls_channel2() {
        let mut c = Channel::new(2);
        c.set_mode(ChannelMode::SquareWaveGenerator, RwMode::LsbMsb, false);
        c.write_byte(0x10);
        c.write_byte(0x00);
        assert_eq!(c.advance(100), 0);
        c.set_gate(true);
        assert_eq!(c.advance(16), 1);
    }
}
