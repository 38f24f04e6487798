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

    devices::serial.rs

    16550 UART with nothing attached to the line.

*/

//! Enough of the 16550 for BIOS detection and for software that drives the port in loopback.
//! Transmitted bytes are kept in a small capture buffer; with MCR loopback set they come back
//! through the receive buffer.

use std::collections::VecDeque;

use crate::{
    bus::BusContext,
    logging::LogContext,
    module::{Module, ModuleType, PortAccessible, Resettable, Tickable},
};

pub const COM1_BASE: u16 = 0x3F8;

const REG_DATA: u16 = 0;
const REG_IER: u16 = 1;
const REG_IIR_FCR: u16 = 2;
const REG_LCR: u16 = 3;
const REG_MCR: u16 = 4;
const REG_LSR: u16 = 5;
const REG_MSR: u16 = 6;
const REG_SCRATCH: u16 = 7;

const IER_RX_AVAILABLE: u8 = 0b0000_0001;
const IER_THR_EMPTY: u8 = 0b0000_0010;

const IIR_NO_INTERRUPT: u8 = 0x01;
const IIR_THR_EMPTY: u8 = 0x02;
const IIR_RX_AVAILABLE: u8 = 0x04;
const IIR_FIFO_ENABLED: u8 = 0xC0;

const LCR_DLAB: u8 = 0b1000_0000;
const MCR_OUT2: u8 = 0b0000_1000;
const MCR_LOOPBACK: u8 = 0b0001_0000;

const LSR_DATA_READY: u8 = 0b0000_0001;
const LSR_THR_EMPTY: u8 = 0b0010_0000;
const LSR_TX_EMPTY: u8 = 0b0100_0000;

const CAPTURE_LIMIT: usize = 4096;

pub struct SerialPort {
    log: LogContext,
    base: u16,
    divisor: u16,
    ier: u8,
    lcr: u8,
    mcr: u8,
    fcr: u8,
    scratch: u8,
    rx: VecDeque<u8>,
    thre_pending: bool,
    transmitted: Vec<u8>,
    irq: Option<u8>,
    irq_raised: bool,
}

impl SerialPort {
    pub fn new(log: LogContext, base: u16) -> Self {
        Self {
            log,
            base,
            divisor: 12,
            ier: 0,
            lcr: 0,
            mcr: 0,
            fcr: 0,
            scratch: 0,
            rx: VecDeque::new(),
            thre_pending: false,
            transmitted: Vec::new(),
            irq: None,
            irq_raised: false,
        }
    }

    pub fn base(&self) -> u16 {
        self.base
    }

    pub fn divisor(&self) -> u16 {
        self.divisor
    }

    /// Bytes written to the transmitter since the last call.
    pub fn take_transmitted(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.transmitted)
    }

    /// Deliver a byte to the receiver as if it arrived on the line.
    pub fn receive(&mut self, byte: u8) {
        self.rx.push_back(byte);
    }

    fn interrupt_id(&self) -> u8 {
        let fifo = if self.fcr & 0x01 != 0 { IIR_FIFO_ENABLED } else { 0 };
        if self.ier & IER_RX_AVAILABLE != 0 && !self.rx.is_empty() {
            fifo | IIR_RX_AVAILABLE
        }
        else if self.ier & IER_THR_EMPTY != 0 && self.thre_pending {
            fifo | IIR_THR_EMPTY
        }
        else {
            fifo | IIR_NO_INTERRUPT
        }
    }

    /// Drive the IRQ line from the interrupt state. OUT2 gates the line on PC hardware.
    fn update_irq(&mut self, ctx: &mut BusContext) {
        let Some(irq) = self.irq
        else {
            return;
        };
        let active = self.mcr & MCR_OUT2 != 0 && self.interrupt_id() & IIR_NO_INTERRUPT == 0;
        if active && !self.irq_raised {
            ctx.raise_irq(irq);
        }
        else if !active && self.irq_raised {
            ctx.lower_irq(irq);
        }
        self.irq_raised = active;
    }

    fn transmit(&mut self, byte: u8) {
        if self.mcr & MCR_LOOPBACK != 0 {
            self.rx.push_back(byte);
        }
        else if self.transmitted.len() < CAPTURE_LIMIT {
            self.transmitted.push(byte);
        }
        // The line is never busy, so the holding register empties at once.
        self.thre_pending = true;
    }
}

impl Module for SerialPort {
    fn module_type(&self) -> ModuleType {
        ModuleType::Serial
    }

    fn required_connections(&self) -> &'static [ModuleType] {
        &[ModuleType::Motherboard, ModuleType::Pic]
    }

    fn set_debug(&mut self, debug: bool) {
        self.log.set_debug(debug);
    }

    fn dump(&self) -> String {
        format!(
            "base: {:04X} divisor: {} IER: {:02X} LCR: {:02X} MCR: {:02X} rx: {} irq: {:?}\n",
            self.base,
            self.divisor,
            self.ier,
            self.lcr,
            self.mcr,
            self.rx.len(),
            self.irq
        )
    }
}

impl Resettable for SerialPort {
    fn reset(&mut self, ctx: &mut BusContext) -> bool {
        self.ier = 0;
        self.lcr = 0;
        self.mcr = 0;
        self.fcr = 0;
        self.rx.clear();
        self.thre_pending = false;
        self.irq_raised = false;
        self.irq = ctx.request_irq_number();
        true
    }
}

impl PortAccessible for SerialPort {
    fn port_list(&self) -> Vec<(String, u16)> {
        vec![
            (String::from("UART Data/Divisor Low"), self.base + REG_DATA),
            (String::from("UART Interrupt Enable/Divisor High"), self.base + REG_IER),
            (String::from("UART Interrupt ID/FIFO Control"), self.base + REG_IIR_FCR),
            (String::from("UART Line Control"), self.base + REG_LCR),
            (String::from("UART Modem Control"), self.base + REG_MCR),
            (String::from("UART Line Status"), self.base + REG_LSR),
            (String::from("UART Modem Status"), self.base + REG_MSR),
            (String::from("UART Scratch"), self.base + REG_SCRATCH),
        ]
    }

    fn read_u8(&mut self, port: u16, ctx: &mut BusContext) -> u8 {
        let dlab = self.lcr & LCR_DLAB != 0;
        let byte = match port.wrapping_sub(self.base) {
            REG_DATA if dlab => self.divisor as u8,
            REG_DATA => self.rx.pop_front().unwrap_or(0),
            REG_IER if dlab => (self.divisor >> 8) as u8,
            REG_IER => self.ier,
            REG_IIR_FCR => {
                let id = self.interrupt_id();
                // Reading the IIR acknowledges a THR empty interrupt.
                if id & 0x0F == IIR_THR_EMPTY {
                    self.thre_pending = false;
                }
                id
            }
            REG_LCR => self.lcr,
            REG_MCR => self.mcr,
            REG_LSR => {
                let dr = if self.rx.is_empty() { 0 } else { LSR_DATA_READY };
                LSR_THR_EMPTY | LSR_TX_EMPTY | dr
            }
            REG_MSR => {
                if self.mcr & MCR_LOOPBACK != 0 {
                    // Loopback ties DTR/RTS/OUT1/OUT2 to DSR/CTS/RI/DCD.
                    (self.mcr & 0x0F) << 4
                }
                else {
                    0
                }
            }
            REG_SCRATCH => self.scratch,
            _ => crate::module::NO_IO_BYTE,
        };
        self.update_irq(ctx);
        byte
    }

    fn write_u8(&mut self, port: u16, data: u8, ctx: &mut BusContext) {
        let dlab = self.lcr & LCR_DLAB != 0;
        match port.wrapping_sub(self.base) {
            REG_DATA if dlab => self.divisor = (self.divisor & 0xFF00) | data as u16,
            REG_DATA => self.transmit(data),
            REG_IER if dlab => self.divisor = (self.divisor & 0x00FF) | (data as u16) << 8,
            REG_IER => {
                let enabling_thre = data & IER_THR_EMPTY != 0 && self.ier & IER_THR_EMPTY == 0;
                self.ier = data & 0x0F;
                if enabling_thre {
                    self.thre_pending = true;
                }
            }
            REG_IIR_FCR => {
                self.fcr = data;
                if data & 0x02 != 0 {
                    self.rx.clear();
                }
            }
            REG_LCR => self.lcr = data,
            REG_MCR => self.mcr = data & 0x1F,
            REG_SCRATCH => self.scratch = data,
            _ => {
                self.log.debug(format_args!("Write to read-only UART register {:04X}", port));
            }
        }
        self.update_irq(ctx);
    }
}

impl Tickable for SerialPort {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_identification() {
        let mut uart = SerialPort::new(LogContext::new(ModuleType::Serial), COM1_BASE);
        assert_eq!(uart.interrupt_id(), IIR_NO_INTERRUPT);
        uart.ier = IER_RX_AVAILABLE | IER_THR_EMPTY;
        uart.mcr = MCR_LOOPBACK;
        uart.transmit(0x41);
        // Received data outranks THR empty
        assert_eq!(uart.interrupt_id(), IIR_RX_AVAILABLE);
        assert_eq!(uart.rx.pop_front(), Some(0x41));
        assert_eq!(uart.interrupt_id(), IIR_THR_EMPTY);
    }

    #[test]
    fn test_transmit_capture() {
        let mut uart = SerialPort::new(LogContext::new(ModuleType::Serial), COM1_BASE);
        uart.transmit(b'O');
        uart.transmit(b'K');
        assert_eq!(uart.take_transmitted(), b"OK".to_vec());
        assert!(uart.take_transmitted().is_empty());
    }
}
