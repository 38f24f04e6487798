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

    error.rs

    Error types for the emulation core.

*/

use thiserror::Error;

use crate::module::ModuleType;

/// Errors raised by the motherboard bus while binding ports or scheduling timers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("I/O port {port:04X} is already owned by {owner}, rejected bind from {requested}")]
    PortConflict {
        port: u16,
        owner: ModuleType,
        requested: ModuleType,
    },
    #[error("no module of type {0} is registered")]
    UnknownModule(ModuleType),
    #[error("module {0} has no timer")]
    NoTimer(ModuleType),
}

/// Errors a module may report while running. Reported faults end the session cleanly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModuleError {
    #[error("{module}: {message}")]
    Device { module: ModuleType, message: String },
    #[error("ROM image of {len} bytes at {offset:05X} does not fit in {size} bytes of memory")]
    RomOutOfRange { offset: usize, len: usize, size: usize },
    #[error("module {0} is required but not present")]
    Missing(ModuleType),
}

/// Errors from loading machine configuration or its disk and ROM images.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("couldn't read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("couldn't parse machine configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("no image named '{0}'")]
    MissingImage(String),
}

/// Errors returned by a CPU engine from a call to execute.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CpuError {
    #[error("CPU halted with interrupts disabled at {0:05X}")]
    Halted(u32),
    #[error("invalid opcode {opcode:02X} at {address:05X}")]
    InvalidOpcode { address: u32, opcode: u8 },
    #[error("CPU fault: {0}")]
    Fault(String),
}
