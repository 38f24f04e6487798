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

    vga_bench.rs

    Benchmarks for VGA memory access and rendering.

*/

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use heirloom_core::{
    devices::{
        screen::Screen,
        vga::{StandardMode, VgaCard},
    },
    host::EventSink,
    logging::LogContext,
    module::ModuleType,
};

fn card(mode: StandardMode) -> VgaCard {
    let mut vga = VgaCard::new(LogContext::new(ModuleType::Video));
    vga.set_standard_mode(mode);
    vga
}

pub fn vga_memory_bench(c: &mut Criterion) {
    c.bench_function("vga_bench_planar_write", |b| {
        let mut vga = card(StandardMode::Planar640x480);
        b.iter(|| {
            for offset in 0..0x9600u32 {
                vga.mem_write_u8(0xA0000 + offset, black_box(0x5A));
            }
        });
    });

    c.bench_function("vga_bench_planar_read", |b| {
        let mut vga = card(StandardMode::Planar640x480);
        b.iter(|| {
            let mut sum = 0u32;
            for offset in 0..0x9600u32 {
                sum += vga.mem_read_u8(0xA0000 + offset) as u32;
            }
            black_box(sum)
        });
    });

    c.bench_function("vga_bench_chain4_write", |b| {
        let mut vga = card(StandardMode::Linear320x200);
        b.iter(|| {
            for offset in 0..64000u32 {
                vga.mem_write_u8(0xA0000 + offset, black_box(offset as u8));
            }
        });
    });
}

pub fn vga_render_bench(c: &mut Criterion) {
    c.bench_function("vga_bench_render_planar_full", |b| {
        let mut vga = card(StandardMode::Planar640x480);
        let mut screen = Screen::new(LogContext::new(ModuleType::Screen), EventSink::none());
        b.iter(|| {
            // A 16 pixel tile spans two bytes of a planar scanline
            for offset in (0..0x9600u32).step_by(2) {
                vga.mem_write_u8(0xA0000 + offset, 0xFF);
            }
            vga.render(&mut screen);
        });
    });

    c.bench_function("vga_bench_render_text", |b| {
        let mut vga = card(StandardMode::Text80x25);
        let mut screen = Screen::new(LogContext::new(ModuleType::Screen), EventSink::none());
        let mut ch = 0u8;
        b.iter(|| {
            ch = ch.wrapping_add(1);
            for cell in 0..2000u32 {
                vga.mem_write_u8(0xB8000 + cell * 2, ch);
            }
            vga.render(&mut screen);
        });
    });
}

criterion_group!(benches, vga_memory_bench, vga_render_bench);
criterion_main!(benches);
