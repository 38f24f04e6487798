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

    bus::io.rs

    I/O port routing for the Motherboard.

*/

//! IO routines for [Motherboard].

use super::Motherboard;
use crate::module::{PortAccessible, NO_IO_BYTE};

impl Motherboard {
    /// Read a byte from an I/O port. Ports nobody owns read as 0xFF.
    pub fn read_u8(&mut self, port: u16) -> u8 {
        let Some(handle) = self.port_owner(port)
        else {
            self.log.debug(format_args!("Read from unbound port {:04X}", port));
            return NO_IO_BYTE;
        };

        let byte = self.dispatch(handle, |module, ctx| module.read_u8(port, ctx));
        match byte {
            Some(byte) => {
                self.log.trace(format_args!("IN {:04X} -> {:02X}", port, byte));
                byte
            }
            None => {
                self.log.debug(format_args!("Owner of port {:04X} is busy", port));
                NO_IO_BYTE
            }
        }
    }

    /// Write a byte to an I/O port. Writes to ports nobody owns are dropped.
    pub fn write_u8(&mut self, port: u16, data: u8) {
        let Some(handle) = self.port_owner(port)
        else {
            self.log.debug(format_args!("Write to unbound port {:04X}: {:02X}", port, data));
            return;
        };
        self.log.trace(format_args!("OUT {:04X} <- {:02X}", port, data));
        if self.dispatch(handle, |module, ctx| module.write_u8(port, data, ctx)).is_none() {
            self.log.debug(format_args!("Owner of port {:04X} is busy", port));
        }
    }

    /// Read a word. When one module owns both bytes it receives a single word access, which is
    /// how the ATA data port moves 16 bits per transfer.
    pub fn read_u16(&mut self, port: u16) -> u16 {
        let next = port.wrapping_add(1);
        match (self.port_owner(port), self.port_owner(next)) {
            (Some(lo), Some(hi)) if lo == hi => self
                .dispatch(lo, |module, ctx| module.read_u16(port, ctx))
                .unwrap_or(0xFFFF),
            _ => {
                let lo = self.read_u8(port);
                let hi = self.read_u8(next);
                (hi as u16) << 8 | lo as u16
            }
        }
    }

    pub fn write_u16(&mut self, port: u16, data: u16) {
        let next = port.wrapping_add(1);
        match (self.port_owner(port), self.port_owner(next)) {
            (Some(lo), Some(hi)) if lo == hi => {
                self.dispatch(lo, |module, ctx| module.write_u16(port, data, ctx));
            }
            _ => {
                self.write_u8(port, data as u8);
                self.write_u8(next, (data >> 8) as u8);
            }
        }
    }
}
