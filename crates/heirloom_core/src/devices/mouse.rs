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

    devices::mouse.rs

    PS/2 mouse on the keyboard controller's auxiliary port.

*/

use std::collections::VecDeque;

use crossbeam_channel::Receiver;

use crate::{
    bus::BusContext,
    host::MouseEvent,
    logging::LogContext,
    module::{normalize_interval, Module, ModuleType, PortAccessible, Resettable, Tickable},
};

pub const DEFAULT_UPDATE_INTERVAL: u32 = 10_000;

const MOUSE_ACK: u8 = 0xFA;
const MOUSE_RESEND: u8 = 0xFE;
const MOUSE_SELF_TEST_OK: u8 = 0xAA;
const MOUSE_ID: u8 = 0x00;

// Packet byte 0
const PACKET_LEFT: u8 = 0b0000_0001;
const PACKET_RIGHT: u8 = 0b0000_0010;
const PACKET_MIDDLE: u8 = 0b0000_0100;
const PACKET_ALWAYS_ONE: u8 = 0b0000_1000;
const PACKET_X_SIGN: u8 = 0b0001_0000;
const PACKET_Y_SIGN: u8 = 0b0010_0000;
const PACKET_X_OVERFLOW: u8 = 0b0100_0000;
const PACKET_Y_OVERFLOW: u8 = 0b1000_0000;

// Status byte returned by 0xE9
const STATUS_REMOTE: u8 = 0b0100_0000;
const STATUS_ENABLED: u8 = 0b0010_0000;
const STATUS_SCALING: u8 = 0b0001_0000;

/// Stop queueing packets once the host falls this far behind.
const MAX_QUEUED_BYTES: usize = 48;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Param {
    SampleRate,
    Resolution,
}

pub struct Mouse {
    log: LogContext,
    input: Option<Receiver<MouseEvent>>,
    queue: VecDeque<u8>,
    pending: Option<Param>,
    reporting: bool,
    remote_mode: bool,
    scaling_2to1: bool,
    sample_rate: u8,
    resolution: u8,
    buttons: u8,
    dx: i32,
    dy: i32,
    moved: bool,
    irq: Option<u8>,
    interval: u32,
}

impl Mouse {
    pub fn new(log: LogContext, input: Option<Receiver<MouseEvent>>) -> Self {
        Self {
            log,
            input,
            queue: VecDeque::new(),
            pending: None,
            reporting: false,
            remote_mode: false,
            scaling_2to1: false,
            sample_rate: 100,
            resolution: 2,
            buttons: 0,
            dx: 0,
            dy: 0,
            moved: false,
            irq: None,
            interval: DEFAULT_UPDATE_INTERVAL,
        }
    }

    pub fn set_input(&mut self, input: Receiver<MouseEvent>) {
        self.input = Some(input);
    }

    pub fn irq(&self) -> Option<u8> {
        self.irq
    }

    pub fn reporting(&self) -> bool {
        self.reporting
    }

    pub fn has_data(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Take the next byte for the controller's output buffer.
    pub fn pop_byte(&mut self) -> Option<u8> {
        self.queue.pop_front()
    }

    fn set_defaults(&mut self) {
        self.reporting = false;
        self.remote_mode = false;
        self.scaling_2to1 = false;
        self.sample_rate = 100;
        self.resolution = 2;
        self.dx = 0;
        self.dy = 0;
        self.moved = false;
    }

    /// A byte written to the auxiliary device through controller command 0xD4.
    pub fn write_command(&mut self, byte: u8) {
        if let Some(param) = self.pending.take() {
            match param {
                Param::SampleRate => self.sample_rate = byte,
                Param::Resolution => self.resolution = byte & 0x03,
            }
            self.queue.push_back(MOUSE_ACK);
            return;
        }

        self.log.trace(format_args!("Mouse command {:02X}", byte));
        match byte {
            0xE6 => {
                self.scaling_2to1 = false;
                self.queue.push_back(MOUSE_ACK);
            }
            0xE7 => {
                self.scaling_2to1 = true;
                self.queue.push_back(MOUSE_ACK);
            }
            0xE8 => {
                self.pending = Some(Param::Resolution);
                self.queue.push_back(MOUSE_ACK);
            }
            0xE9 => {
                let mut status = self.buttons_byte();
                if self.remote_mode {
                    status |= STATUS_REMOTE;
                }
                if self.reporting {
                    status |= STATUS_ENABLED;
                }
                if self.scaling_2to1 {
                    status |= STATUS_SCALING;
                }
                self.queue.extend([MOUSE_ACK, status, self.resolution, self.sample_rate]);
            }
            0xEA => {
                self.remote_mode = false;
                self.queue.push_back(MOUSE_ACK);
            }
            0xEB => {
                self.queue.push_back(MOUSE_ACK);
                self.push_packet();
            }
            0xF0 => {
                self.remote_mode = true;
                self.queue.push_back(MOUSE_ACK);
            }
            0xF2 => self.queue.extend([MOUSE_ACK, MOUSE_ID]),
            0xF3 => {
                self.pending = Some(Param::SampleRate);
                self.queue.push_back(MOUSE_ACK);
            }
            0xF4 => {
                self.reporting = true;
                self.queue.push_back(MOUSE_ACK);
            }
            0xF5 => {
                self.reporting = false;
                self.queue.push_back(MOUSE_ACK);
            }
            0xF6 => {
                self.set_defaults();
                self.queue.push_back(MOUSE_ACK);
            }
            0xFF => {
                self.set_defaults();
                self.queue.clear();
                self.queue.extend([MOUSE_ACK, MOUSE_SELF_TEST_OK, MOUSE_ID]);
            }
            _ => {
                self.log.debug(format_args!("Unknown mouse command {:02X}", byte));
                self.queue.push_back(MOUSE_RESEND);
            }
        }
    }

    fn buttons_byte(&self) -> u8 {
        self.buttons & (PACKET_LEFT | PACKET_RIGHT | PACKET_MIDDLE)
    }

    fn accumulate(&mut self, event: &MouseEvent) {
        let mut buttons = 0;
        if event.left {
            buttons |= PACKET_LEFT;
        }
        if event.right {
            buttons |= PACKET_RIGHT;
        }
        if event.middle {
            buttons |= PACKET_MIDDLE;
        }
        if buttons != self.buttons || event.dx != 0 || event.dy != 0 {
            self.moved = true;
        }
        self.buttons = buttons;
        self.dx = self.dx.saturating_add(event.dx);
        // PS/2 counts Y upward
        self.dy = self.dy.saturating_sub(event.dy);
    }

    /// Build a movement packet from the accumulated deltas and clear them.
    fn push_packet(&mut self) {
        let mut header = PACKET_ALWAYS_ONE | self.buttons_byte();
        let (dx, dy) = (self.dx, self.dy);
        if dx < 0 {
            header |= PACKET_X_SIGN;
        }
        if dy < 0 {
            header |= PACKET_Y_SIGN;
        }
        if !(-256..=255).contains(&dx) {
            header |= PACKET_X_OVERFLOW;
        }
        if !(-256..=255).contains(&dy) {
            header |= PACKET_Y_OVERFLOW;
        }
        let x = dx.clamp(-256, 255) as u8;
        let y = dy.clamp(-256, 255) as u8;
        self.queue.extend([header, x, y]);
        self.dx = 0;
        self.dy = 0;
        self.moved = false;
    }

    fn drain_input(&mut self) {
        let Some(input) = &self.input
        else {
            return;
        };
        let events: Vec<MouseEvent> = input.try_iter().collect();
        for event in &events {
            self.accumulate(event);
        }
    }
}

impl Module for Mouse {
    fn module_type(&self) -> ModuleType {
        ModuleType::Mouse
    }

    fn required_connections(&self) -> &'static [ModuleType] {
        &[ModuleType::Keyboard]
    }

    fn set_debug(&mut self, debug: bool) {
        self.log.set_debug(debug);
    }

    fn dump(&self) -> String {
        format!(
            "reporting: {} remote: {} rate: {} resolution: {} queued: {} irq: {:?}\n",
            self.reporting,
            self.remote_mode,
            self.sample_rate,
            self.resolution,
            self.queue.len(),
            self.irq
        )
    }
}

impl Resettable for Mouse {
    fn reset(&mut self, ctx: &mut BusContext) -> bool {
        self.set_defaults();
        self.queue.clear();
        self.pending = None;
        self.buttons = 0;
        self.irq = ctx.request_irq_number();
        if self.irq.is_none() {
            self.log.warn(format_args!("No IRQ line available for the mouse"));
        }
        true
    }
}

// The mouse has no ports of its own; the keyboard controller forwards to it.
impl PortAccessible for Mouse {}

impl Tickable for Mouse {
    fn update_interval(&self) -> Option<u32> {
        Some(self.interval)
    }

    fn set_update_interval(&mut self, interval: i64) {
        self.interval = normalize_interval(interval, DEFAULT_UPDATE_INTERVAL);
    }

    fn update(&mut self, _ctx: &mut BusContext) {
        self.drain_input();
        if self.reporting && !self.remote_mode && self.moved && self.queue.len() < MAX_QUEUED_BYTES {
            self.push_packet();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mouse() -> Mouse {
        Mouse::new(LogContext::new(ModuleType::Mouse), None)
    }

    fn drain(mouse: &mut Mouse) -> Vec<u8> {
        std::iter::from_fn(|| mouse.pop_byte()).collect()
    }

    #[test]
    fn test_reset_and_identify() {
        let mut m = mouse();
        m.write_command(0xFF);
        assert_eq!(drain(&mut m), vec![MOUSE_ACK, MOUSE_SELF_TEST_OK, MOUSE_ID]);
        m.write_command(0xF2);
        assert_eq!(drain(&mut m), vec![MOUSE_ACK, MOUSE_ID]);
    }

    #[test]
    fn test_sample_rate_parameter() {
        let mut m = mouse();
        m.write_command(0xF3);
        m.write_command(40);
        assert_eq!(drain(&mut m), vec![MOUSE_ACK, MOUSE_ACK]);
        m.write_command(0xE9);
        assert_eq!(drain(&mut m), vec![MOUSE_ACK, 0x00, 2, 40]);
    }

    #[test]
    fn test_packet_encoding() {
        let mut m = mouse();
        m.accumulate(&MouseEvent {
            dx: -3,
            dy: 5,
            left: true,
            ..Default::default()
        });
        m.push_packet();
        // dy 5 down is -5 in PS/2 terms
        assert_eq!(
            drain(&mut m),
            vec![PACKET_ALWAYS_ONE | PACKET_LEFT | PACKET_X_SIGN | PACKET_Y_SIGN, 0xFD, 0xFB]
        );
    }

    #[test]
    fn test_overflow_is_flagged() {
        let mut m = mouse();
        m.accumulate(&MouseEvent {
            dx: 1000,
            ..Default::default()
        });
        m.push_packet();
        let packet = drain(&mut m);
        assert_eq!(packet[0] & PACKET_X_OVERFLOW, PACKET_X_OVERFLOW);
        assert_eq!(packet[1], 0xFF);
    }
}
