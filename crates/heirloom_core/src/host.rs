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

    host.rs

    Messages exchanged between the emulation thread and the host.

*/

//! Events flow from the emulator to the host through an [EventSink]. Input and control
//! requests flow the other way as [ControlMessage]s and input events, all carried on
//! crossbeam channels so the emulation thread never shares mutable state with the host.

use crossbeam_channel::{Sender, TrySendError};

use crate::devices::fdc::CarrierType;

/// Status changes a front end may reflect, such as drive activity lights.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StatusCode {
    FloppyInserted(u8),
    FloppyEjected(u8),
    FloppyTransferStart(u8),
    FloppyTransferStop(u8),
    HardDiskTransferStart,
    HardDiskTransferStop,
    KeyboardLeds { scroll: bool, num: bool, caps: bool },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostEvent {
    StatusChanged(StatusCode),
    ScreenResized { width: u32, height: u32 },
    FontChanged,
    PostCode(u8),
    Started,
    Stopped,
}

/// A set-1 scancode. Extended keys carry the 0xE0 prefix in the high byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct KeyboardEvent {
    pub scancode: u16,
    pub pressed:  bool,
}

impl KeyboardEvent {
    pub fn press(scancode: u16) -> Self {
        Self {
            scancode,
            pressed: true,
        }
    }

    pub fn release(scancode: u16) -> Self {
        Self {
            scancode,
            pressed: false,
        }
    }

    /// The bytes the keyboard sends for this event. Breaks set bit 7 of the final byte.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(2);
        if self.scancode > 0xFF {
            bytes.push((self.scancode >> 8) as u8);
        }
        let code = (self.scancode & 0x7F) as u8;
        bytes.push(if self.pressed { code } else { code | 0x80 });
        bytes
    }
}

/// Relative mouse motion. Positive `dy` means the mouse moved down the screen.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MouseEvent {
    pub dx: i32,
    pub dy: i32,
    pub left: bool,
    pub right: bool,
    pub middle: bool,
}

/// Requests the emulation thread drains at the top of each loop iteration.
#[derive(Debug)]
pub enum ControlMessage {
    Stop,
    Reset,
    InsertFloppy {
        drive: usize,
        carrier: CarrierType,
        image: Vec<u8>,
        write_protected: bool,
        reply: Sender<bool>,
    },
    EjectFloppy {
        drive: usize,
        reply: Sender<bool>,
    },
    ScreenText {
        reply: Sender<Option<String>>,
    },
}

/// Cloneable sender side of the host event queue. Full queues drop events.
#[derive(Clone, Debug, Default)]
pub struct EventSink {
    sender: Option<Sender<HostEvent>>,
}

impl EventSink {
    pub fn new(sender: Sender<HostEvent>) -> Self {
        Self { sender: Some(sender) }
    }

    pub fn none() -> Self {
        Self { sender: None }
    }

    pub fn send(&self, event: HostEvent) {
        if let Some(sender) = &self.sender {
            match sender.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) => {
                    log::debug!("Host event queue full, dropping {:?}", event);
                }
                Err(TrySendError::Disconnected(_)) => {}
            }
        }
    }

    pub fn status(&self, code: StatusCode) {
        self.send(HostEvent::StatusChanged(code));
    }
}
