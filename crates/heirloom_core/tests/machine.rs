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

    tests::machine.rs

    Whole-machine tests driven by scripted CPU engines.

*/

mod common;

use common::*;
use heirloom_core::{
    devices::{
        board::SystemBoard,
        cpu::CpuModule,
        fdc::{CarrierType, FloppyController},
        memory::Memory,
        pic::Pic,
        pit::Pit,
        rtc::{DateTime, Rtc, REG_FLOPPY_TYPES},
    },
    logging::LogContext,
    EventSink,
    FileImageProvider,
    HostEvent,
    KeyboardEvent,
    MachineConfig,
    MemoryImageProvider,
    ModuleType,
    Motherboard,
    StatusCode,
    StopReason,
};

#[test]
fn test_timer_interrupts_reach_cpu() {
    let (vectors, seen) = recorder();
    let mut emu = machine(Box::new(move |bus, call| {
        if call == 0 {
            program_pic(bus, 0xFE, 0xFF);
            // Counter 0, rate generator, ~1ms period
            bus.io_write_u8(0x43, 0x34);
            bus.io_write_u8(0x40, 0xA9);
            bus.io_write_u8(0x40, 0x04);
            return Ok(());
        }
        if bus.interrupt_pending() {
            let vector = bus.interrupt_acknowledge();
            vectors.lock().unwrap().push(vector);
            bus.io_write_u8(0x20, 0x20);
        }
        Ok(())
    }));

    assert!(emu.run_for(10));
    let seen = seen.lock().unwrap();
    assert!(seen.len() >= 5, "only {} timer interrupts", seen.len());
    assert!(seen.iter().all(|v| *v == 0x08));
}

#[test]
fn test_line_in_service_blocks_until_eoi() {
    let (vectors, seen) = recorder();
    let mut emu = machine(Box::new(move |bus, call| {
        if call == 0 {
            program_pic(bus, 0xFE, 0xFF);
            bus.io_write_u8(0x43, 0x34);
            bus.io_write_u8(0x40, 0xA9);
            bus.io_write_u8(0x40, 0x04);
            return Ok(());
        }
        if bus.interrupt_pending() {
            vectors.lock().unwrap().push(bus.interrupt_acknowledge());
        }
        // Only acknowledge the first interrupt after a while
        if call == 8 {
            bus.io_write_u8(0x20, 0x20);
        }
        Ok(())
    }));

    assert!(emu.run_for(8));
    assert_eq!(seen.lock().unwrap().as_slice(), &[0x08]);
    assert!(emu.run_for(4));
    assert!(seen.lock().unwrap().len() > 1);
}

#[test]
fn test_key_press_delivered_through_irq1() {
    let (codes, seen) = recorder();
    let mut emu = machine(Box::new(move |bus, call| {
        if call == 0 {
            program_pic(bus, 0xFD, 0xFF);
            return Ok(());
        }
        if bus.interrupt_pending() {
            assert_eq!(bus.interrupt_acknowledge(), 0x09);
            codes.lock().unwrap().push(bus.io_read_u8(0x60));
            bus.io_write_u8(0x20, 0x20);
        }
        Ok(())
    }));

    assert!(emu.run_for(1));
    let handle = emu.handle();
    assert!(handle.notify_keyboard(KeyboardEvent::press(0x1E)));
    assert!(handle.notify_keyboard(KeyboardEvent::release(0x1E)));
    assert!(emu.run_for(10));
    assert_eq!(seen.lock().unwrap().as_slice(), &[0x1E, 0x9E]);
}

#[test]
fn test_video_memory_and_dac_through_bus() {
    let (values, seen) = recorder();
    let mut emu = machine(Box::new(move |bus, call| {
        if call == 0 {
            for (i, ch) in b"Hello".iter().enumerate() {
                bus.mem_write_u8(0xB8000 + i as u32 * 2, *ch);
                bus.mem_write_u8(0xB8001 + i as u32 * 2, 0x07);
            }
            bus.io_write_u8(0x3C8, 0x10);
            for component in [0x3F, 0x20, 0x01] {
                bus.io_write_u8(0x3C9, component);
            }
            bus.io_write_u8(0x3C7, 0x10);
            let mut values = values.lock().unwrap();
            for _ in 0..3 {
                values.push(bus.io_read_u8(0x3C9));
            }
            values.push(bus.mem_read_u8(0xB8000));
        }
        Ok(())
    }));

    // Long enough for the adapter to draw a frame
    assert!(emu.run_for(20));
    assert_eq!(seen.lock().unwrap().as_slice(), &[0x3F, 0x20, 0x01, b'H']);

    let screen = emu.board().modules().screen().unwrap();
    assert_eq!((screen.width(), screen.height()), (720, 400));
    assert!(screen.frames() > 0);

    let text = serve(&mut emu, |handle| handle.screen_text()).unwrap();
    assert_eq!(text.lines().next(), Some("Hello"));
}

#[test]
fn test_post_codes_reach_host() {
    let mut emu = machine(Box::new(|bus, call| {
        if call < 3 {
            bus.io_write_u8(0x80, 0x10 + call as u8);
        }
        Ok(())
    }));
    let handle = emu.handle();
    assert!(emu.run_for(4));
    let codes: Vec<u8> = handle
        .events()
        .try_iter()
        .filter_map(|event| match event {
            HostEvent::PostCode(code) => Some(code),
            _ => None,
        })
        .collect();
    assert_eq!(codes, vec![0x10, 0x11, 0x12]);
}

#[test]
fn test_reset_waits_for_iteration_end() {
    let mut rom = vec![0x00; 0x10000];
    rom[0xFFF0] = 0xEA;
    let images = MemoryImageProvider::new().with_image("bios.bin", rom);
    let config = MachineConfig::from_toml(
        "[emulator]\nthrottle = false\n[bios.system]\npath = \"bios.bin\"\noffset = 983040\n",
    )
    .unwrap();

    let mut emu = machine_with(
        config,
        &images,
        Box::new(|bus, call| {
            if call == 0 {
                bus.mem_write_u8(0x500, 0x42);
                bus.io_write_u8(0x92, 0x01);
                // The rest of the iteration still sees memory as written
                assert_eq!(bus.mem_read_u8(0x500), 0x42);
                // ROM ignores writes
                bus.mem_write_u8(0xFFFF0, 0x00);
            }
            Ok(())
        }),
    );

    assert!(emu.run_for(1));
    assert_eq!(emu.resets(), 0);
    assert_eq!(emu.board_mut().mem_read_u8(0x500), 0x42);

    assert!(emu.run_for(1));
    assert_eq!(emu.resets(), 1);
    assert_eq!(emu.board_mut().mem_read_u8(0x500), 0x00);
    assert_eq!(emu.board_mut().mem_read_u8(0xFFFF0), 0xEA);
}

#[test]
fn test_floppy_swap_from_host_thread() {
    let mut emu = machine(Box::new(|_, _| Ok(())));
    let image = vec![0xE5; CarrierType::Floppy360K.size()];

    assert!(serve(&mut emu, move |handle| handle.insert_floppy(0, CarrierType::Floppy360K, image, false)));
    let fdc = emu.board().modules().fdc().unwrap();
    assert_eq!(fdc.drive(0).and_then(|d| d.carrier()), Some(CarrierType::Floppy360K));

    assert!(serve(&mut emu, |handle| handle.eject_floppy(0)));
    assert!(!serve(&mut emu, |handle| handle.eject_floppy(0)));
    assert!(!serve(&mut emu, |handle| handle.eject_floppy(5)));
}

#[test]
fn test_cpu_error_ends_session() {
    let mut emu = machine(Box::new(|_, call| {
        if call == 2 {
            return Err(heirloom_core::CpuError::Halted(0x7C00));
        }
        Ok(())
    }));
    let handle = emu.handle();
    assert_eq!(emu.run(), StopReason::CpuError("CPU halted with interrupts disabled at 07C00".to_string()));
    assert_eq!(emu.iterations(), 2);
    let events: Vec<HostEvent> = handle.events().try_iter().collect();
    assert!(events.contains(&HostEvent::Started));
    assert_eq!(events.last(), Some(&HostEvent::Stopped));
}

#[test]
fn test_images_from_disk() {
    let dir = std::env::temp_dir().join(format!("heirloom-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("bios.bin"), vec![0xCB; 0x2000]).unwrap();

    let config = MachineConfig::from_toml("[bios.system]\npath = \"bios.bin\"\noffset = 1040384\n").unwrap();
    let mut emu = heirloom_core::Emulator::new(config, Some(Box::new(ScriptedEngine::new(Box::new(|_, _| Ok(()))))));
    assert!(emu.setup(&FileImageProvider::with_base(dir.clone())));
    assert_eq!(emu.board_mut().mem_read_u8(0xFE000), 0xCB);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_minimal_machine_wires_up() {
    init();
    let mut board = Motherboard::new(LogContext::new(ModuleType::Motherboard));
    let engine = Box::new(ScriptedEngine::new(Box::new(|_, _| Ok(()))));
    let handles = [
        board.add_module(CpuModule::new(LogContext::new(ModuleType::Cpu), engine).into()),
        board.add_module(Memory::new(LogContext::new(ModuleType::Memory), 0).into()),
        board.add_module(SystemBoard::new(LogContext::new(ModuleType::Motherboard), EventSink::none()).into()),
        board.add_module(Pic::new(LogContext::new(ModuleType::Pic)).into()),
        board.add_module(Rtc::new(LogContext::new(ModuleType::Rtc), DateTime::now()).into()),
        board.add_module(Pit::new(LogContext::new(ModuleType::Pit)).into()),
        board.add_module(FloppyController::new(LogContext::new(ModuleType::Fdc), EventSink::none()).into()),
    ];

    assert!(board.connect_modules());
    for handle in handles {
        let slot = board.modules().slot(handle).unwrap();
        assert!(slot.is_connected(), "{} not connected", slot.kind());
    }
}

#[test]
fn test_configured_floppy_is_inserted() {
    let config = MachineConfig::from_toml(
        "[emulator]\nthrottle = false\n\n[[fdc.floppy]]\ndrive = \"A\"\ntype = \"1.44M\"\nformat = \"1.44M\"\nimage = \"boot.img\"\n",
    )
    .unwrap();
    let images = MemoryImageProvider::new().with_image("boot.img", vec![0; CarrierType::Floppy1440K.size()]);
    let emu = machine_with(config, &images, Box::new(|_, _| Ok(())));

    let carrier = emu.board().modules().fdc().unwrap().drive(0).and_then(|d| d.carrier()).unwrap();
    assert_eq!(carrier, CarrierType::Floppy1440K);
    assert_eq!(carrier.cmos_type(), 0x04);
    assert_eq!(emu.board().modules().rtc().unwrap().cmos(REG_FLOPPY_TYPES), 0x40);

    let handle = emu.handle();
    assert!(handle
        .events()
        .try_iter()
        .any(|e| e == HostEvent::StatusChanged(StatusCode::FloppyInserted(0))));
}
