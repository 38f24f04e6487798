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

    devices::keyboard.rs

    8042 keyboard controller with an attached AT keyboard.

*/

//! The 8042 sits on ports 0x60 (data) and 0x64 (status/command). It owns the output buffer
//! shared by the keyboard and the PS/2 auxiliary port, so mouse bytes are pulled from the
//! [Mouse](crate::devices::mouse::Mouse) module through the bus context and delivered here.
//!
//! Host key events arrive on a bounded channel and are drained on each update. Scancodes are
//! taken as set 1 and passed through without translation.

use std::collections::VecDeque;

use crossbeam_channel::Receiver;
use modular_bitfield::prelude::*;

use crate::{
    bus::BusContext,
    host::{EventSink, KeyboardEvent, StatusCode},
    logging::LogContext,
    module::{normalize_interval, Module, ModuleType, PortAccessible, Resettable, Tickable},
};

pub const KB_DATA_PORT: u16 = 0x60;
pub const KB_STATUS_PORT: u16 = 0x64;
pub const DEFAULT_UPDATE_INTERVAL: u32 = 200;

/// Bytes the keyboard itself can hold before it starts dropping keys.
const KEYBOARD_BUFFER_SIZE: usize = 16;

const KB_ACK: u8 = 0xFA;
const KB_RESEND: u8 = 0xFE;
const KB_SELF_TEST_OK: u8 = 0xAA;
const KB_ECHO: u8 = 0xEE;
const CTRL_SELF_TEST_OK: u8 = 0x55;
const CTRL_INTERFACE_OK: u8 = 0x00;

const OUTPUT_PORT_RESET: u8 = 0b0000_0001;
const OUTPUT_PORT_A20: u8 = 0b0000_0010;
const INPUT_PORT_DEFAULT: u8 = 0b1000_0000;

#[bitfield]
#[derive(Copy, Clone, Debug)]
pub struct StatusRegister {
    pub output_full: bool,
    pub input_full: bool,
    pub system_flag: bool,
    pub last_was_command: bool,
    pub unlocked: bool,
    pub aux_output_full: bool,
    pub timeout: bool,
    pub parity_error: bool,
}

#[bitfield]
#[derive(Copy, Clone, Debug)]
pub struct CommandByte {
    pub keyboard_irq: bool,
    pub aux_irq: bool,
    pub system_flag: bool,
    #[skip]
    unused0: B1,
    pub keyboard_disabled: bool,
    pub aux_disabled: bool,
    pub translate: bool,
    #[skip]
    unused1: B1,
}

/// Where a byte in the output buffer came from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Source {
    Controller,
    Keyboard,
    Aux,
}

/// Controller commands that take a data byte through port 0x60.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum PendingWrite {
    CommandByte,
    OutputPort,
    KeyboardBuffer,
    AuxBuffer,
    Aux,
}

/// Keyboard commands that take a parameter byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum DeviceParam {
    Leds,
    Typematic,
    ScancodeSet,
}

pub struct Keyboard {
    log: LogContext,
    events: EventSink,
    input: Option<Receiver<KeyboardEvent>>,
    status: StatusRegister,
    command_byte: CommandByte,
    output: Option<(u8, Source)>,
    controller_queue: VecDeque<(u8, Source)>,
    keyboard_queue: VecDeque<u8>,
    pending_write: Option<PendingWrite>,
    device_param: Option<DeviceParam>,
    output_port: u8,
    scanning: bool,
    leds: u8,
    typematic: u8,
    irq: Option<u8>,
    interval: u32,
}

impl Keyboard {
    pub fn new(log: LogContext, events: EventSink, input: Option<Receiver<KeyboardEvent>>) -> Self {
        Self {
            log,
            events,
            input,
            status: StatusRegister::new(),
            command_byte: CommandByte::new(),
            output: None,
            controller_queue: VecDeque::new(),
            keyboard_queue: VecDeque::with_capacity(KEYBOARD_BUFFER_SIZE),
            pending_write: None,
            device_param: None,
            output_port: OUTPUT_PORT_RESET,
            scanning: true,
            leds: 0,
            typematic: 0x2B,
            irq: None,
            interval: DEFAULT_UPDATE_INTERVAL,
        }
    }

    pub fn set_input(&mut self, input: Receiver<KeyboardEvent>) {
        self.input = Some(input);
    }

    pub fn status_byte(&self) -> u8 {
        self.status.into_bytes()[0]
    }

    pub fn command_byte(&self) -> u8 {
        self.command_byte.into_bytes()[0]
    }

    pub fn leds(&self) -> u8 {
        self.leds
    }

    pub fn scanning(&self) -> bool {
        self.scanning
    }

    /// Queue scancode bytes as if the keyboard had sent them.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if self.keyboard_queue.len() >= KEYBOARD_BUFFER_SIZE {
                self.log.debug(format_args!("Keyboard buffer overrun, dropping {:02X}", byte));
                continue;
            }
            self.keyboard_queue.push_back(byte);
        }
    }

    fn drain_input(&mut self) {
        let Some(input) = &self.input
        else {
            return;
        };
        let events: Vec<KeyboardEvent> = input.try_iter().collect();
        for event in events {
            if self.scanning {
                self.push_bytes(&event.to_bytes());
            }
        }
    }

    fn respond(&mut self, byte: u8) {
        self.controller_queue.push_back((byte, Source::Controller));
    }

    fn device_reply(&mut self, byte: u8) {
        self.controller_queue.push_back((byte, Source::Keyboard));
    }

    fn set_a20(&mut self, enabled: bool, ctx: &mut BusContext) {
        if enabled {
            self.output_port |= OUTPUT_PORT_A20;
        }
        else {
            self.output_port &= !OUTPUT_PORT_A20;
        }
        if let Some(memory) = ctx.modules_mut().memory_mut() {
            memory.set_a20(enabled);
        }
    }

    fn mouse_irq(ctx: &BusContext) -> Option<u8> {
        ctx.modules().mouse().and_then(|mouse| mouse.irq())
    }

    /// Move the next byte into an empty output buffer and raise the matching interrupt.
    fn fill_output(&mut self, ctx: &mut BusContext) {
        if self.output.is_some() {
            return;
        }

        let next = if let Some(entry) = self.controller_queue.pop_front() {
            Some(entry)
        }
        else if !self.command_byte.keyboard_disabled() && !self.keyboard_queue.is_empty() {
            self.keyboard_queue.pop_front().map(|byte| (byte, Source::Keyboard))
        }
        else if !self.command_byte.aux_disabled() {
            ctx.modules_mut()
                .mouse_mut()
                .and_then(|mouse| mouse.pop_byte())
                .map(|byte| (byte, Source::Aux))
        }
        else {
            None
        };

        let Some((byte, source)) = next
        else {
            return;
        };

        self.output = Some((byte, source));
        self.status.set_output_full(true);
        self.status.set_aux_output_full(source == Source::Aux);

        match source {
            Source::Aux => {
                if self.command_byte.aux_irq() {
                    if let Some(irq) = Self::mouse_irq(ctx) {
                        ctx.raise_irq(irq);
                    }
                }
            }
            _ => {
                if self.command_byte.keyboard_irq() {
                    if let Some(irq) = self.irq {
                        ctx.raise_irq(irq);
                    }
                }
            }
        }
    }

    fn read_data(&mut self, ctx: &mut BusContext) -> u8 {
        let Some((byte, source)) = self.output.take()
        else {
            // Reading an empty buffer returns the last byte on real hardware; 0 is close enough.
            return 0;
        };
        self.status.set_output_full(false);
        self.status.set_aux_output_full(false);
        match source {
            Source::Aux => {
                if let Some(irq) = Self::mouse_irq(ctx) {
                    ctx.lower_irq(irq);
                }
            }
            _ => {
                if let Some(irq) = self.irq {
                    ctx.lower_irq(irq);
                }
            }
        }
        // Controller replies are queued back to back; keep them flowing.
        if !self.controller_queue.is_empty() {
            self.fill_output(ctx);
        }
        byte
    }

    fn controller_command(&mut self, command: u8, ctx: &mut BusContext) {
        self.log.trace(format_args!("8042 command {:02X}", command));
        match command {
            0x20 => {
                let byte = self.command_byte();
                self.respond(byte);
            }
            0x60 => self.pending_write = Some(PendingWrite::CommandByte),
            0xA7 => self.command_byte.set_aux_disabled(true),
            0xA8 => self.command_byte.set_aux_disabled(false),
            0xA9 => self.respond(CTRL_INTERFACE_OK),
            0xAA => {
                self.status.set_system_flag(true);
                self.command_byte.set_system_flag(true);
                self.respond(CTRL_SELF_TEST_OK);
            }
            0xAB => self.respond(CTRL_INTERFACE_OK),
            0xAD => self.command_byte.set_keyboard_disabled(true),
            0xAE => self.command_byte.set_keyboard_disabled(false),
            0xC0 => self.respond(INPUT_PORT_DEFAULT),
            0xD0 => {
                let port = self.output_port;
                self.respond(port);
            }
            0xD1 => self.pending_write = Some(PendingWrite::OutputPort),
            0xD2 => self.pending_write = Some(PendingWrite::KeyboardBuffer),
            0xD3 => self.pending_write = Some(PendingWrite::AuxBuffer),
            0xD4 => self.pending_write = Some(PendingWrite::Aux),
            0xDD => self.set_a20(false, ctx),
            0xDF => self.set_a20(true, ctx),
            0xF0..=0xFF => {
                // Pulse output port lines; a low bit 0 pulses the CPU reset line.
                if command & 0x01 == 0 {
                    self.log.info(format_args!("System reset through keyboard controller"));
                    ctx.request_system_reset();
                }
            }
            _ => {
                self.log.debug(format_args!("Unhandled 8042 command {:02X}", command));
            }
        }
        self.fill_output(ctx);
    }

    fn write_data(&mut self, data: u8, ctx: &mut BusContext) {
        if let Some(pending) = self.pending_write.take() {
            match pending {
                PendingWrite::CommandByte => {
                    self.command_byte = CommandByte::from_bytes([data]);
                    self.status.set_system_flag(self.command_byte.system_flag());
                }
                PendingWrite::OutputPort => {
                    self.set_a20(data & OUTPUT_PORT_A20 != 0, ctx);
                    self.output_port = data;
                    if data & OUTPUT_PORT_RESET == 0 {
                        ctx.request_system_reset();
                    }
                }
                PendingWrite::KeyboardBuffer => self.controller_queue.push_back((data, Source::Keyboard)),
                PendingWrite::AuxBuffer => self.controller_queue.push_back((data, Source::Aux)),
                PendingWrite::Aux => match ctx.modules_mut().mouse_mut() {
                    Some(mouse) => mouse.write_command(data),
                    None => self.log.debug(format_args!("No mouse for aux byte {:02X}", data)),
                },
            }
            self.fill_output(ctx);
            return;
        }

        if let Some(param) = self.device_param.take() {
            self.device_parameter(param, data);
        }
        else {
            self.device_command(data);
        }
        self.fill_output(ctx);
    }

    fn device_parameter(&mut self, param: DeviceParam, data: u8) {
        match param {
            DeviceParam::Leds => {
                self.leds = data & 0x07;
                self.events.status(StatusCode::KeyboardLeds {
                    scroll: data & 0x01 != 0,
                    num: data & 0x02 != 0,
                    caps: data & 0x04 != 0,
                });
                self.device_reply(KB_ACK);
            }
            DeviceParam::Typematic => {
                self.typematic = data & 0x7F;
                self.device_reply(KB_ACK);
            }
            DeviceParam::ScancodeSet => {
                self.device_reply(KB_ACK);
                if data == 0 {
                    self.device_reply(0x02);
                }
            }
        }
    }

    fn device_command(&mut self, command: u8) {
        self.log.trace(format_args!("Keyboard command {:02X}", command));
        match command {
            0xED => {
                self.device_reply(KB_ACK);
                self.device_param = Some(DeviceParam::Leds);
            }
            0xEE => self.device_reply(KB_ECHO),
            0xF0 => {
                self.device_reply(KB_ACK);
                self.device_param = Some(DeviceParam::ScancodeSet);
            }
            0xF2 => {
                self.device_reply(KB_ACK);
                self.device_reply(0xAB);
                self.device_reply(0x83);
            }
            0xF3 => {
                self.device_reply(KB_ACK);
                self.device_param = Some(DeviceParam::Typematic);
            }
            0xF4 => {
                self.scanning = true;
                self.device_reply(KB_ACK);
            }
            0xF5 => {
                self.scanning = false;
                self.keyboard_queue.clear();
                self.device_reply(KB_ACK);
            }
            0xF6 => {
                self.typematic = 0x2B;
                self.device_reply(KB_ACK);
            }
            0xFF => {
                self.keyboard_queue.clear();
                self.scanning = true;
                self.leds = 0;
                self.device_reply(KB_ACK);
                self.device_reply(KB_SELF_TEST_OK);
            }
            _ => {
                self.log.debug(format_args!("Unknown keyboard command {:02X}", command));
                self.device_reply(KB_RESEND);
            }
        }
    }
}

impl Module for Keyboard {
    fn module_type(&self) -> ModuleType {
        ModuleType::Keyboard
    }

    fn required_connections(&self) -> &'static [ModuleType] {
        &[ModuleType::Motherboard, ModuleType::Pic]
    }

    fn set_debug(&mut self, debug: bool) {
        self.log.set_debug(debug);
    }

    fn dump(&self) -> String {
        format!(
            "status: {:02X} command byte: {:02X} output port: {:02X}\noutput: {:?} queued: {} scanning: {} leds: {:03b} irq: {:?}\n",
            self.status_byte(),
            self.command_byte(),
            self.output_port,
            self.output.map(|(byte, _)| byte),
            self.keyboard_queue.len(),
            self.scanning,
            self.leds,
            self.irq
        )
    }
}

impl Resettable for Keyboard {
    fn reset(&mut self, ctx: &mut BusContext) -> bool {
        self.status = StatusRegister::new().with_unlocked(true);
        self.command_byte = CommandByte::new()
            .with_keyboard_irq(true)
            .with_system_flag(true)
            .with_translate(true);
        self.output = None;
        self.controller_queue.clear();
        self.keyboard_queue.clear();
        self.pending_write = None;
        self.device_param = None;
        self.output_port = OUTPUT_PORT_RESET;
        self.scanning = true;
        self.leds = 0;

        self.irq = ctx.request_irq_number();
        if self.irq.is_none() {
            self.log.warn(format_args!("No IRQ line available for the keyboard"));
        }
        true
    }
}

impl PortAccessible for Keyboard {
    fn port_list(&self) -> Vec<(String, u16)> {
        vec![
            (String::from("Keyboard Data"), KB_DATA_PORT),
            (String::from("Keyboard Status/Command"), KB_STATUS_PORT),
        ]
    }

    fn read_u8(&mut self, port: u16, ctx: &mut BusContext) -> u8 {
        match port {
            KB_DATA_PORT => self.read_data(ctx),
            KB_STATUS_PORT => self.status_byte(),
            _ => crate::module::NO_IO_BYTE,
        }
    }

    fn write_u8(&mut self, port: u16, data: u8, ctx: &mut BusContext) {
        match port {
            KB_DATA_PORT => {
                self.status.set_last_was_command(false);
                self.write_data(data, ctx);
            }
            KB_STATUS_PORT => {
                self.status.set_last_was_command(true);
                self.controller_command(data, ctx);
            }
            _ => {}
        }
    }
}

impl Tickable for Keyboard {
    fn update_interval(&self) -> Option<u32> {
        Some(self.interval)
    }

    fn set_update_interval(&mut self, interval: i64) {
        self.interval = normalize_interval(interval, DEFAULT_UPDATE_INTERVAL);
    }

    fn update(&mut self, ctx: &mut BusContext) {
        self.drain_input();
        self.fill_output(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_layout() {
        let status = StatusRegister::new().with_output_full(true).with_aux_output_full(true);
        assert_eq!(status.into_bytes()[0], 0x21);
        let command = CommandByte::new().with_keyboard_irq(true).with_system_flag(true).with_translate(true);
        assert_eq!(command.into_bytes()[0], 0x45);
    }

    #[test]
    fn test_buffer_overrun_drops_bytes() {
        let mut kb = Keyboard::new(LogContext::new(ModuleType::Keyboard), EventSink::none(), None);
        for i in 0..20u8 {
            kb.push_bytes(&[i]);
        }
        assert_eq!(kb.keyboard_queue.len(), KEYBOARD_BUFFER_SIZE);
        assert_eq!(kb.keyboard_queue.back(), Some(&15));
    }

    #[test]
    fn test_identify_and_unknown_command() {
        let mut kb = Keyboard::new(LogContext::new(ModuleType::Keyboard), EventSink::none(), None);
        kb.device_command(0xF2);
        let replies: Vec<u8> = kb.controller_queue.iter().map(|(b, _)| *b).collect();
        assert_eq!(replies, vec![KB_ACK, 0xAB, 0x83]);
        kb.controller_queue.clear();
        kb.device_command(0x01);
        assert_eq!(kb.controller_queue.front().map(|(b, _)| *b), Some(KB_RESEND));
    }

    #[test]
    fn test_led_command_sends_status() {
        let (tx, rx) = crossbeam_channel::bounded(4);
        let mut kb = Keyboard::new(LogContext::new(ModuleType::Keyboard), EventSink::new(tx), None);
        kb.device_command(0xED);
        let param = kb.device_param.take().unwrap();
        kb.device_parameter(param, 0x04);
        assert_eq!(kb.leds(), 0x04);
        assert_eq!(
            rx.try_recv().unwrap(),
            crate::host::HostEvent::StatusChanged(StatusCode::KeyboardLeds {
                scroll: false,
                num: false,
                caps: true
            })
        );
    }
}
