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

    devices::pic.rs

    Cascaded Intel 8259 Programmable Interrupt Controller pair.

*/

//! The master 8259 answers on 0x20/0x21 and the slave on 0xA0/0xA1, giving sixteen IRQ lines
//! numbered 0-15. Line 2 of the master carries the slave's output and is never handed out.
//!
//! Devices don't pick their own lines. Each asks for one with [Pic::request_irq_number], which
//! prefers the line the device historically used and otherwise takes the lowest free line.
//! Lines are then driven with [Pic::set_irq] and [Pic::clear_irq], and the CPU collects the
//! vector of the highest priority request with [Pic::interrupt_acknowledge].

use crate::{
    bus::BusContext,
    logging::LogContext,
    module::{Module, ModuleHandle, ModuleType, PortAccessible, Resettable, Tickable},
};

pub const PIC_MASTER_COMMAND_PORT: u16 = 0x20;
pub const PIC_MASTER_DATA_PORT: u16 = 0x21;
pub const PIC_SLAVE_COMMAND_PORT: u16 = 0xA0;
pub const PIC_SLAVE_DATA_PORT: u16 = 0xA1;

pub const IRQ_LINES: u8 = 16;
pub const CASCADE_LINE: u8 = 2;

pub const MASTER_VECTOR_OFFSET: u8 = 0x08;
pub const SLAVE_VECTOR_OFFSET: u8 = 0x70;

const ICW1_ICW4_NEEDED: u8 = 0b0000_0001;
const ICW1_SINGLE: u8 = 0b0000_0010;
const ICW1_LEVEL_TRIGGERED: u8 = 0b0000_1000;
const ICW1_IS_ICW1: u8 = 0b0001_0000;
const ICW4_AUTO_EOI: u8 = 0b0000_0010;
const OCW_IS_OCW3: u8 = 0b0000_1000;
const OCW3_READ_REGISTER: u8 = 0b0000_0010;
const OCW3_READ_ISR: u8 = 0b0000_0001;
const OCW3_POLL: u8 = 0b0000_0100;
const OCW3_SET_SPECIAL_MASK: u8 = 0b0110_0000;
const OCW3_RESET_SPECIAL_MASK: u8 = 0b0100_0000;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum InitState {
    Normal,
    ExpectingIcw2,
    ExpectingIcw3,
    ExpectingIcw4,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TriggerMode {
    Edge,
    Level,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ReadSelect {
    Irr,
    Isr,
}

#[derive(Copy, Clone, Debug)]
pub struct IrqOwner {
    pub handle: ModuleHandle,
    pub kind: ModuleType,
}

/// Line a module type was wired to on the historical platform.
pub fn preferred_line(kind: ModuleType) -> Option<u8> {
    match kind {
        ModuleType::Pit => Some(0),
        ModuleType::Keyboard => Some(1),
        ModuleType::Serial => Some(4),
        ModuleType::Fdc => Some(6),
        ModuleType::Parallel => Some(7),
        ModuleType::Rtc => Some(8),
        ModuleType::Mouse => Some(12),
        ModuleType::Ata => Some(14),
        _ => None,
    }
}

#[derive(Clone, Debug)]
struct PicChip {
    init_state: InitState,
    vector_offset: u8,
    imr: u8,
    irr: u8,
    isr: u8,
    trigger_mode: TriggerMode,
    read_select: ReadSelect,
    expect_icw4: bool,
    single: bool,
    auto_eoi: bool,
    special_mask: bool,
    poll: bool,
    icw3: u8,
}

impl PicChip {
    fn new(vector_offset: u8) -> Self {
        Self {
            init_state: InitState::Normal,
            vector_offset,
            imr: 0xFF,
            irr: 0,
            isr: 0,
            trigger_mode: TriggerMode::Edge,
            read_select: ReadSelect::Irr,
            expect_icw4: false,
            single: false,
            auto_eoi: false,
            special_mask: false,
            poll: false,
            icw3: 0,
        }
    }

    /// Clear the highest priority in-service bit.
    fn non_specific_eoi(&mut self) -> Option<u8> {
        if self.isr == 0 {
            return None;
        }
        let level = self.isr.trailing_zeros() as u8;
        self.isr &= !(1 << level);
        Some(level)
    }

    fn specific_eoi(&mut self, level: u8) {
        self.isr &= !(1 << (level & 0x07));
    }

    /// Lowest requested and unmasked level below `floor`. In special mask mode only the
    /// level's own in-service bit blocks it.
    fn highest_request(&self, floor: u32) -> Option<u8> {
        let mut eligible = self.irr & !self.imr & !self.isr;
        if !self.special_mask && floor < 8 {
            eligible &= (1u8 << floor).wrapping_sub(1);
        }
        (eligible != 0).then(|| eligible.trailing_zeros() as u8)
    }
}

pub struct Pic {
    log: LogContext,
    chips: [PicChip; 2],
    owners: [Option<IrqOwner>; IRQ_LINES as usize],
    /// Input levels of the sixteen lines as last driven by their devices.
    lines: u16,
    spurious: u64,
}

impl Pic {
    pub fn new(log: LogContext) -> Self {
        Self {
            log,
            chips: [PicChip::new(MASTER_VECTOR_OFFSET), PicChip::new(SLAVE_VECTOR_OFFSET)],
            owners: [None; IRQ_LINES as usize],
            lines: 0,
            spurious: 0,
        }
    }

    #[inline]
    fn chip_of(line: u8) -> (usize, u8) {
        ((line >> 3) as usize & 1, 1 << (line & 0x07))
    }

    /// Hand out an IRQ line to a module. A module asking again gets its existing line. Returns
    /// None once every line other than the cascade is taken.
    pub fn request_irq_number(&mut self, handle: ModuleHandle, kind: ModuleType) -> Option<u8> {
        if let Some(line) = self
            .owners
            .iter()
            .position(|owner| owner.map(|o| o.handle) == Some(handle))
        {
            return Some(line as u8);
        }

        let is_free = |line: u8| line != CASCADE_LINE && self.owners[line as usize].is_none();
        let line = match preferred_line(kind) {
            Some(line) if is_free(line) => Some(line),
            _ => (0..IRQ_LINES).find(|&line| is_free(line)),
        };

        match line {
            Some(line) => {
                self.owners[line as usize] = Some(IrqOwner { handle, kind });
                self.log.debug(format_args!("Assigned IRQ {} to {}", line, kind));
                Some(line)
            }
            None => {
                self.log.warn(format_args!("No free IRQ line for {}", kind));
                None
            }
        }
    }

    /// Claim one specific line, for devices wired to a second fixed IRQ.
    pub fn claim_irq(&mut self, handle: ModuleHandle, kind: ModuleType, line: u8) -> bool {
        if line >= IRQ_LINES || line == CASCADE_LINE {
            return false;
        }
        match self.owners[line as usize] {
            Some(owner) => owner.handle == handle,
            None => {
                self.owners[line as usize] = Some(IrqOwner { handle, kind });
                self.log.debug(format_args!("Assigned IRQ {} to {}", line, kind));
                true
            }
        }
    }

    pub fn irq_owner(&self, line: u8) -> Option<IrqOwner> {
        self.owners.get(line as usize).copied().flatten()
    }

    /// Assert an IRQ line. Asserting a line that is already high has no further effect.
    pub fn set_irq(&mut self, line: u8) {
        if line >= IRQ_LINES {
            self.log.warn(format_args!("set_irq: invalid line {}", line));
            return;
        }
        let mask = 1u16 << line;
        if self.lines & mask == 0 {
            self.lines |= mask;
            let (chip, bit) = Pic::chip_of(line);
            self.chips[chip].irr |= bit;
            self.log.trace(format_args!("IRQ {} raised", line));
        }
    }

    /// Deassert an IRQ line, withdrawing any request not yet acknowledged.
    pub fn clear_irq(&mut self, line: u8) {
        if line >= IRQ_LINES {
            self.log.warn(format_args!("clear_irq: invalid line {}", line));
            return;
        }
        let mask = 1u16 << line;
        if self.lines & mask != 0 {
            self.lines &= !mask;
            let (chip, bit) = Pic::chip_of(line);
            self.chips[chip].irr &= !bit;
            self.log.trace(format_args!("IRQ {} lowered", line));
        }
    }

    /// Latch a request as if the line saw a rising and a falling edge.
    pub fn pulse_irq(&mut self, line: u8) {
        if line >= IRQ_LINES {
            return;
        }
        let (chip, bit) = Pic::chip_of(line);
        self.chips[chip].irr |= bit;
    }

    pub fn is_irq_raised(&self, line: u8) -> bool {
        line < IRQ_LINES && self.lines & (1 << line) != 0
    }

    /// In-service lines of the pair as one 16 bit mask. The master's cascade bit only mirrors
    /// the slave and is left out.
    fn in_service(&self) -> u16 {
        let master = &self.chips[0];
        let mut isr = master.isr as u16;
        if !master.single {
            isr &= !(1 << CASCADE_LINE);
            isr |= (self.chips[1].isr as u16) << 8;
        }
        isr
    }

    /// Lowest numbered line that is requested and unmasked, with no line of equal or higher
    /// priority in service.
    fn pending_line(&self) -> Option<u8> {
        let master = &self.chips[0];
        let slave = &self.chips[1];
        let slave_enabled = master.imr & (1 << CASCADE_LINE) == 0 && !master.single;
        let floor = self.in_service().trailing_zeros();

        let master_line = master
            .highest_request(floor)
            .filter(|&level| level != CASCADE_LINE || master.single);
        let slave_line = if slave_enabled {
            slave.highest_request(floor.saturating_sub(8)).map(|level| level + 8)
        }
        else {
            None
        };

        match (master_line, slave_line) {
            (Some(m), Some(s)) => Some(m.min(s)),
            (m, s) => m.or(s),
        }
    }

    /// True when the CPU should run an interrupt acknowledge cycle.
    pub fn interrupt_pending(&self) -> bool {
        self.pending_line().is_some()
    }

    /// Accept the highest priority request and return its interrupt vector. Edge triggered
    /// requests are consumed by the acknowledge; the line is then in service until an EOI,
    /// unless automatic EOI is selected.
    pub fn interrupt_acknowledge(&mut self) -> u8 {
        let Some(line) = self.pending_line()
        else {
            self.spurious += 1;
            self.log.warn(format_args!("Interrupt acknowledge with no request pending"));
            return self.chips[0].vector_offset.wrapping_add(7);
        };

        let (index, bit) = Pic::chip_of(line);
        let chip = &mut self.chips[index];
        if chip.trigger_mode == TriggerMode::Edge {
            chip.irr &= !bit;
        }
        if !chip.auto_eoi {
            chip.isr |= bit;
        }
        let vector = chip.vector_offset.wrapping_add(line & 0x07);

        if index == 1 && !self.chips[0].auto_eoi {
            self.chips[0].isr |= 1 << CASCADE_LINE;
        }
        self.log.trace(format_args!("Acknowledged IRQ {} as vector {:02X}", line, vector));
        vector
    }

    pub fn imr(&self, slave: bool) -> u8 {
        self.chips[slave as usize].imr
    }

    pub fn isr(&self, slave: bool) -> u8 {
        self.chips[slave as usize].isr
    }

    pub fn irr(&self, slave: bool) -> u8 {
        self.chips[slave as usize].irr
    }

    fn write_command(&mut self, index: usize, byte: u8) {
        let chip = &mut self.chips[index];
        if byte & ICW1_IS_ICW1 != 0 {
            // ICW1 starts initialization and clears the mask and pending state.
            chip.expect_icw4 = byte & ICW1_ICW4_NEEDED != 0;
            chip.single = byte & ICW1_SINGLE != 0;
            chip.trigger_mode = if byte & ICW1_LEVEL_TRIGGERED != 0 {
                TriggerMode::Level
            }
            else {
                TriggerMode::Edge
            };
            chip.imr = 0;
            chip.isr = 0;
            chip.irr = 0;
            chip.auto_eoi = false;
            chip.special_mask = false;
            chip.read_select = ReadSelect::Irr;
            chip.init_state = InitState::ExpectingIcw2;
            self.log.debug(format_args!("PIC {} ICW1: {:02X}", index, byte));
            return;
        }

        if byte & OCW_IS_OCW3 != 0 {
            if byte & OCW3_READ_REGISTER != 0 {
                chip.read_select = if byte & OCW3_READ_ISR != 0 {
                    ReadSelect::Isr
                }
                else {
                    ReadSelect::Irr
                };
            }
            chip.poll = byte & OCW3_POLL != 0;
            match byte & OCW3_SET_SPECIAL_MASK {
                OCW3_SET_SPECIAL_MASK => chip.special_mask = true,
                OCW3_RESET_SPECIAL_MASK => chip.special_mask = false,
                _ => {}
            }
            return;
        }

        // OCW2
        match byte >> 5 {
            0b001 | 0b101 => {
                if let Some(level) = chip.non_specific_eoi() {
                    self.log.trace(format_args!("PIC {} EOI level {}", index, level));
                }
            }
            0b011 | 0b111 => chip.specific_eoi(byte & 0x07),
            0b100 => chip.auto_eoi = true,
            0b000 => chip.auto_eoi = false,
            _ => {
                // Priority rotation is not modelled.
            }
        }
    }

    fn write_data(&mut self, index: usize, byte: u8) {
        let chip = &mut self.chips[index];
        match chip.init_state {
            InitState::ExpectingIcw2 => {
                chip.vector_offset = byte & 0xF8;
                chip.init_state = if !chip.single {
                    InitState::ExpectingIcw3
                }
                else if chip.expect_icw4 {
                    InitState::ExpectingIcw4
                }
                else {
                    InitState::Normal
                };
                self.log.debug(format_args!("PIC {} vector offset {:02X}", index, byte & 0xF8));
            }
            InitState::ExpectingIcw3 => {
                chip.icw3 = byte;
                chip.init_state = if chip.expect_icw4 {
                    InitState::ExpectingIcw4
                }
                else {
                    InitState::Normal
                };
            }
            InitState::ExpectingIcw4 => {
                chip.auto_eoi = byte & ICW4_AUTO_EOI != 0;
                chip.init_state = InitState::Normal;
            }
            InitState::Normal => {
                // OCW1
                chip.imr = byte;
            }
        }
    }

    fn read_command(&mut self, index: usize) -> u8 {
        if self.chips[index].poll {
            self.chips[index].poll = false;
            let base = index as u8 * 8;
            return match self.pending_line() {
                Some(line) if line >= base && line < base + 8 => {
                    self.interrupt_acknowledge();
                    0x80 | (line & 0x07)
                }
                _ => 0,
            };
        }
        let chip = &self.chips[index];
        match chip.read_select {
            ReadSelect::Irr => chip.irr,
            ReadSelect::Isr => chip.isr,
        }
    }
}

impl Module for Pic {
    fn module_type(&self) -> ModuleType {
        ModuleType::Pic
    }

    fn required_connections(&self) -> &'static [ModuleType] {
        &[ModuleType::Motherboard, ModuleType::Cpu]
    }

    fn set_debug(&mut self, debug: bool) {
        self.log.set_debug(debug);
    }

    fn dump(&self) -> String {
        let mut out = String::new();
        for (name, chip) in ["master", "slave"].iter().zip(self.chips.iter()) {
            out.push_str(&format!(
                "{}: offset {:02X} imr {:08b} irr {:08b} isr {:08b} {:?}{}\n",
                name,
                chip.vector_offset,
                chip.imr,
                chip.irr,
                chip.isr,
                chip.trigger_mode,
                if chip.auto_eoi { " auto-eoi" } else { "" }
            ));
        }
        for (line, owner) in self.owners.iter().enumerate() {
            if let Some(owner) = owner {
                out.push_str(&format!("IRQ {:2}: {}\n", line, owner.kind));
            }
        }
        out.push_str(&format!("spurious acknowledges: {}\n", self.spurious));
        out
    }
}

impl Resettable for Pic {
    fn reset(&mut self, _ctx: &mut BusContext) -> bool {
        self.chips = [PicChip::new(MASTER_VECTOR_OFFSET), PicChip::new(SLAVE_VECTOR_OFFSET)];
        self.lines = 0;
        true
    }
}

impl PortAccessible for Pic {
    fn port_list(&self) -> Vec<(String, u16)> {
        vec![
            (String::from("PIC Master Command"), PIC_MASTER_COMMAND_PORT),
            (String::from("PIC Master Data"), PIC_MASTER_DATA_PORT),
            (String::from("PIC Slave Command"), PIC_SLAVE_COMMAND_PORT),
            (String::from("PIC Slave Data"), PIC_SLAVE_DATA_PORT),
        ]
    }

    fn read_u8(&mut self, port: u16, _ctx: &mut BusContext) -> u8 {
        match port {
            PIC_MASTER_COMMAND_PORT => self.read_command(0),
            PIC_MASTER_DATA_PORT => self.chips[0].imr,
            PIC_SLAVE_COMMAND_PORT => self.read_command(1),
            PIC_SLAVE_DATA_PORT => self.chips[1].imr,
            _ => crate::module::NO_IO_BYTE,
        }
    }

    fn write_u8(&mut self, port: u16, data: u8, _ctx: &mut BusContext) {
        match port {
            PIC_MASTER_COMMAND_PORT => self.write_command(0, data),
            PIC_MASTER_DATA_PORT => self.write_data(0, data),
            PIC_SLAVE_COMMAND_PORT => self.write_command(1, data),
            PIC_SLAVE_DATA_PORT => self.write_data(1, data),
            _ => {}
        }
    }
}

impl Tickable for Pic {}

#[cfg(test)]
mod tests {
    use super::*;

    fn pic() -> Pic {
        let mut pic = Pic::new(LogContext::new(ModuleType::Pic));
        pic.chips[0].imr = 0;
        pic.chips[1].imr = 0;
        pic
    }

    /// Program both chips the way the BIOS does.
    fn program(pic: &mut Pic, master_offset: u8, slave_offset: u8) {
        pic.write_command(0, 0x11);
        pic.write_data(0, master_offset);
        pic.write_data(0, 0x04);
        pic.write_data(0, 0x01);
        pic.write_command(1, 0x11);
        pic.write_data(1, slave_offset);
        pic.write_data(1, 0x02);
        pic.write_data(1, 0x01);
        pic.write_data(0, 0x00);
        pic.write_data(1, 0x00);
    }

    #[test]
    fn test_irq_numbers_unique_until_exhausted() {
        let mut pic = pic();
        let mut seen = Vec::new();
        for i in 0..15 {
            let line = pic
                .request_irq_number(ModuleHandle(i), ModuleType::Video)
                .expect("free line");
            assert_ne!(line, CASCADE_LINE);
            assert!(!seen.contains(&line));
            seen.push(line);
        }
        assert_eq!(pic.request_irq_number(ModuleHandle(15), ModuleType::Video), None);
        // An existing owner still gets its line back
        assert_eq!(
            pic.request_irq_number(ModuleHandle(3), ModuleType::Video),
            Some(seen[3])
        );
    }

    #[test]
    fn test_preferred_lines() {
        let mut pic = pic();
        assert_eq!(pic.request_irq_number(ModuleHandle(0), ModuleType::Rtc), Some(8));
        assert_eq!(pic.request_irq_number(ModuleHandle(1), ModuleType::Pit), Some(0));
        assert_eq!(pic.request_irq_number(ModuleHandle(2), ModuleType::Fdc), Some(6));
        // A second PIT can't have line 0 and falls back to the lowest free line.
        assert_eq!(pic.request_irq_number(ModuleHandle(3), ModuleType::Pit), Some(1));
    }

    #[test]
    fn test_claim_second_line() {
        let mut pic = pic();
        assert_eq!(pic.request_irq_number(ModuleHandle(0), ModuleType::Ata), Some(14));
        assert!(pic.claim_irq(ModuleHandle(0), ModuleType::Ata, 15));
        assert!(pic.claim_irq(ModuleHandle(0), ModuleType::Ata, 15));
        assert!(!pic.claim_irq(ModuleHandle(1), ModuleType::Serial, 15));
        assert!(!pic.claim_irq(ModuleHandle(1), ModuleType::Serial, CASCADE_LINE));
        // Asking again still returns the primary line
        assert_eq!(pic.request_irq_number(ModuleHandle(0), ModuleType::Ata), Some(14));
    }

    #[test]
    fn test_acknowledge_returns_vector_and_sets_isr() {
        let mut pic = pic();
        program(&mut pic, 0x08, 0x70);

        pic.set_irq(1);
        assert!(pic.interrupt_pending());
        assert_eq!(pic.interrupt_acknowledge(), 0x09);
        assert_eq!(pic.isr(false), 0x02);
        // Edge triggered request consumed, line still in service
        assert!(!pic.interrupt_pending());

        pic.write_command(0, 0x20);
        assert_eq!(pic.isr(false), 0);
    }

    #[test]
    fn test_priority_is_lowest_line_first() {
        let mut pic = pic();
        program(&mut pic, 0x08, 0x70);
        pic.set_irq(6);
        pic.set_irq(3);
        assert_eq!(pic.interrupt_acknowledge(), 0x0B);
        // IRQ 6 waits for the end of IRQ 3
        assert!(!pic.interrupt_pending());
        pic.write_command(0, 0x20);
        assert_eq!(pic.interrupt_acknowledge(), 0x0E);
    }

    #[test]
    fn test_in_service_line_blocks_lower_priority() {
        let mut pic = pic();
        program(&mut pic, 0x08, 0x70);
        pic.set_irq(0);
        assert_eq!(pic.interrupt_acknowledge(), 0x08);
        pic.set_irq(1);
        assert!(!pic.interrupt_pending());
        assert_eq!(pic.isr(false), 0x01);

        pic.write_command(0, 0x20);
        assert!(pic.interrupt_pending());
        assert_eq!(pic.interrupt_acknowledge(), 0x09);
    }

    #[test]
    fn test_higher_priority_nests_over_in_service() {
        let mut pic = pic();
        program(&mut pic, 0x08, 0x70);
        pic.set_irq(5);
        assert_eq!(pic.interrupt_acknowledge(), 0x0D);
        pic.set_irq(1);
        assert!(pic.interrupt_pending());
        assert_eq!(pic.interrupt_acknowledge(), 0x09);
        assert_eq!(pic.isr(false), 0x22);

        // Non-specific EOI ends IRQ 1 first, IRQ 5 stays in service
        pic.write_command(0, 0x20);
        assert_eq!(pic.isr(false), 0x20);
    }

    #[test]
    fn test_slave_in_service_blocks_lower_slave_lines() {
        let mut pic = pic();
        program(&mut pic, 0x08, 0x70);
        pic.set_irq(12);
        assert_eq!(pic.interrupt_acknowledge(), 0x74);
        pic.set_irq(14);
        assert!(!pic.interrupt_pending());

        // Master lines are numerically higher priority and still get through
        pic.set_irq(4);
        assert_eq!(pic.interrupt_acknowledge(), 0x0C);
        // Specific EOI for IRQ 4 leaves the cascade bit set
        pic.write_command(0, 0x64);
        assert_eq!(pic.isr(false), 0x04);
        assert!(!pic.interrupt_pending());

        pic.write_command(1, 0x20);
        pic.write_command(0, 0x20);
        assert_eq!(pic.interrupt_acknowledge(), 0x76);
    }

    #[test]
    fn test_master_in_service_blocks_slave() {
        let mut pic = pic();
        program(&mut pic, 0x08, 0x70);
        pic.set_irq(3);
        assert_eq!(pic.interrupt_acknowledge(), 0x0B);
        pic.set_irq(8);
        assert!(!pic.interrupt_pending());
        pic.write_command(0, 0x20);
        assert_eq!(pic.interrupt_acknowledge(), 0x70);
    }

    #[test]
    fn test_slave_line_vector_and_cascade_isr() {
        let mut pic = pic();
        program(&mut pic, 0x08, 0x70);
        pic.set_irq(14);
        assert!(pic.interrupt_pending());
        assert_eq!(pic.interrupt_acknowledge(), 0x76);
        assert_eq!(pic.isr(true), 0x40);
        assert_eq!(pic.isr(false), 0x04);
    }

    #[test]
    fn test_set_and_clear_are_idempotent() {
        let mut pic = pic();
        program(&mut pic, 0x08, 0x70);
        pic.set_irq(4);
        pic.set_irq(4);
        assert_eq!(pic.irr(false), 0x10);
        pic.clear_irq(4);
        pic.clear_irq(4);
        assert_eq!(pic.irr(false), 0x00);
        assert!(!pic.interrupt_pending());
    }

    #[test]
    fn test_mask_blocks_request() {
        let mut pic = pic();
        program(&mut pic, 0x08, 0x70);
        pic.write_data(0, 0x01);
        pic.set_irq(0);
        assert!(!pic.interrupt_pending());
        pic.write_data(0, 0x00);
        assert!(pic.interrupt_pending());

        // Masking the cascade input hides the slave
        pic.clear_irq(0);
        pic.write_data(0, 0x04);
        pic.set_irq(8);
        assert!(!pic.interrupt_pending());
    }

    #[test]
    fn test_ocw3_read_select() {
        let mut pic = pic();
        program(&mut pic, 0x08, 0x70);
        pic.set_irq(5);
        assert_eq!(pic.read_command(0), 0x20);
        pic.interrupt_acknowledge();
        pic.write_command(0, 0x0B);
        assert_eq!(pic.read_command(0), 0x20);
    }

    #[test]
    fn test_spurious_acknowledge() {
        let mut pic = pic();
        program(&mut pic, 0x08, 0x70);
        assert_eq!(pic.interrupt_acknowledge(), 0x0F);
    }
}
