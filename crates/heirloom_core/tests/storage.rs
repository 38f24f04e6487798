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

    tests::storage.rs

    Disk controller and RTC interrupt scenarios on a full machine.

*/

mod common;

use common::*;
use heirloom_core::{devices::fdc::CarrierType, MachineConfig, MemoryImageProvider, SystemBus};

fn eoi(bus: &mut dyn SystemBus, slave: bool) {
    if slave {
        bus.io_write_u8(0xA0, 0x20);
    }
    bus.io_write_u8(0x20, 0x20);
}

#[test]
fn test_floppy_seek_sense_and_read() {
    let mut image = vec![0xA5; CarrierType::Floppy360K.size()];
    // Cylinder 5, head 0, sector 1
    image[5 * 2 * 9 * 512] = 0x12;
    let config = MachineConfig::from_toml(
        "[emulator]\nthrottle = false\n[[fdc.floppy]]\ndrive = \"A\"\ntype = \"360K\"\nimage = \"a.img\"\n",
    )
    .unwrap();
    let images = MemoryImageProvider::new().with_image("a.img", image);

    let (record, seen) = recorder();
    let mut stage = 0;
    let mut emu = machine_with(
        config,
        &images,
        Box::new(move |bus, _| {
            match stage {
                0 => {
                    program_pic(bus, 0xBF, 0xFF);
                    for byte in [0x0F, 0x00, 0x05] {
                        bus.io_write_u8(0x3F5, byte);
                    }
                    stage = 1;
                }
                1 if bus.interrupt_pending() => {
                    let mut record = record.lock().unwrap();
                    record.push(bus.interrupt_acknowledge());
                    bus.io_write_u8(0x3F5, 0x08);
                    record.push(bus.io_read_u8(0x3F5));
                    record.push(bus.io_read_u8(0x3F5));
                    eoi(bus, false);

                    for byte in [0x46, 0x00, 0x05, 0x00, 0x01, 0x02, 0x01, 0x1B, 0xFF] {
                        bus.io_write_u8(0x3F5, byte);
                    }
                    record.push(bus.io_read_u8(0x3F4));
                    let data: Vec<u8> = (0..512).map(|_| bus.io_read_u8(0x3F5)).collect();
                    record.extend_from_slice(&data[..2]);
                    for _ in 0..7 {
                        record.push(bus.io_read_u8(0x3F5));
                    }
                    // Back in the command phase
                    record.push(bus.io_read_u8(0x3F4));
                    stage = 2;
                }
                _ => {}
            }
            Ok(())
        }),
    );

    assert!(emu.run_for(5));
    assert_eq!(
        seen.lock().unwrap().as_slice(),
        &[0x0E, 0x20, 0x05, 0xF0, 0x12, 0xA5, 0x00, 0x00, 0x00, 0x06, 0x00, 0x01, 0x02, 0x80]
    );
    let fdc = emu.board().modules().fdc().unwrap();
    assert_eq!(fdc.drive(0).map(|d| d.cylinder()), Some(5));
}

#[test]
fn test_hard_disk_identify_and_read() {
    let mut image = vec![0u8; 20 * 2 * 17 * 512];
    image[5 * 512] = 0xBE;
    image[5 * 512 + 1] = 0xEF;
    let config = MachineConfig::from_toml(
        "[emulator]\nthrottle = false\n[[ata.harddisk]]\nimage = \"c.img\"\ncylinders = 20\nheads = 2\nsectors_per_track = 17\n",
    )
    .unwrap();
    let images = MemoryImageProvider::new().with_image("c.img", image);

    let (record, seen) = recorder();
    let mut stage = 0;
    let mut emu = machine_with(
        config,
        &images,
        Box::new(move |bus, _| {
            let mut record = record.lock().unwrap();
            match stage {
                0 => {
                    program_pic(bus, 0xFB, 0xBF);
                    bus.io_write_u8(0x1F6, 0xA0);
                    bus.io_write_u8(0x1F7, 0xEC);
                    stage = 1;
                }
                1 if bus.interrupt_pending() => {
                    record.push(bus.interrupt_acknowledge());
                    record.push(bus.io_read_u8(0x1F7));
                    let words: Vec<u16> = (0..256).map(|_| bus.io_read_u16(0x1F0)).collect();
                    record.extend([words[1] as u8, words[3] as u8, words[6] as u8]);
                    eoi(bus, true);

                    // LBA 5, one sector
                    bus.io_write_u8(0x1F6, 0xE0);
                    bus.io_write_u8(0x1F2, 0x01);
                    bus.io_write_u8(0x1F3, 0x05);
                    bus.io_write_u8(0x1F4, 0x00);
                    bus.io_write_u8(0x1F5, 0x00);
                    bus.io_write_u8(0x1F7, 0x20);
                    stage = 2;
                }
                2 if bus.interrupt_pending() => {
                    record.push(bus.interrupt_acknowledge());
                    record.push(bus.io_read_u8(0x1F7));
                    let first = bus.io_read_u16(0x1F0);
                    record.extend(first.to_le_bytes());
                    for _ in 1..256 {
                        bus.io_read_u16(0x1F0);
                    }
                    record.push(bus.io_read_u8(0x1F7));
                    eoi(bus, true);
                    stage = 3;
                }
                _ => {}
            }
            Ok(())
        }),
    );

    assert!(emu.run_for(4));
    assert_eq!(
        seen.lock().unwrap().as_slice(),
        &[0x76, 0x58, 20, 2, 17, 0x76, 0x58, 0xBE, 0xEF, 0x50]
    );
}

#[test]
fn test_rtc_periodic_interrupt() {
    let (record, seen) = recorder();
    let mut emu = machine(Box::new(move |bus, call| {
        if call == 0 {
            program_pic(bus, 0xFB, 0xFE);
            // 1024 Hz periodic rate, periodic interrupt enabled
            bus.io_write_u8(0x70, 0x0A);
            bus.io_write_u8(0x71, 0x26);
            bus.io_write_u8(0x70, 0x0B);
            bus.io_write_u8(0x71, 0x42);
            return Ok(());
        }
        if bus.interrupt_pending() {
            let mut record = record.lock().unwrap();
            record.push(bus.interrupt_acknowledge());
            bus.io_write_u8(0x70, 0x0C);
            record.push(bus.io_read_u8(0x71));
            eoi(bus, true);
        }
        Ok(())
    }));

    assert!(emu.run_for(6));
    let seen = seen.lock().unwrap();
    assert!(seen.len() >= 6);
    for pair in seen.chunks(2) {
        assert_eq!(pair, &[0x70, 0xC0]);
    }
}
